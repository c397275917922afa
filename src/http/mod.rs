//! HTTP/1.1 plumbing for the echo server
//!
//! This module provides the wire codec, the [`Handler`] abstraction hosted by
//! the managed server, an exact-path [`Router`] with middleware, and a small
//! client used by tests and benchmarks.

pub mod client;
pub mod codec;
pub mod handler;
pub mod middleware;
pub mod router;


pub use client::{ClientConfig, HttpClient};
pub use codec::{HttpError, HttpStream};
pub use handler::Handler;
pub use middleware::{Middleware, RequestHead, RequestId, RequestLogger, X_REQUEST_ID};
pub use router::{ALL_METHODS, Router, plain_response};
