//! Client for the remote canonical store.
//!
//! The remote speaks the libSQL HTTP pipeline protocol: each call posts one
//! `execute` request followed by `close`, authenticated with a bearer token.
//! Only what the replica layer needs is implemented: running a statement and
//! decoding its typed result rows.

mod client;
mod error;
mod retry;
mod types;

pub use client::{RemoteClient, RemoteStore};
pub use error::{ApiRetryClass, RemoteError, Result};
pub use retry::RetryPolicy;
pub use types::{QueryResult, RemoteValue};
