//! Runtime plumbing shared by the sockbridge crates.
//!
//! Every crate in the workspace reaches tokio, tokio-util and the lock types
//! through here so that the runtime surface lives in one place.
#![forbid(unsafe_code)]

pub mod shared;
pub mod standard;

pub use standard::locks::*;
pub use standard::spawn::*;

pub use tokio;
pub use tokio_util;
