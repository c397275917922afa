//! The echo request handler
//!
//! Every request is answered with `200 OK` and its own body. The request's
//! `Content-Type` is copied onto the response. Sending `X-Hako-Status` with
//! a status code asks for that status instead.

mod handler;

pub use handler::{EchoHandler, HAKO_STATUS};
