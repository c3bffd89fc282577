#![allow(unreachable_pub)]

mod error;
mod request;
mod result;

pub use error::{ErrorKind, FailureKind, Result};
pub use request::FetchRequest;
pub use result::{FetchResult, FetchStatus, FetchedResponse};
