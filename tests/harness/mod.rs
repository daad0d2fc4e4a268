//! Shared fixtures for the session integration tests.
//!
//! [`TestServer`] is an in-process WebSocket peer on its own runtime, built
//! from the crate's server-role codec. [`Recorder`] and [`pump`] play the
//! host: they install handlers and poll a registry until a condition holds.

#![allow(dead_code)]

mod host;
mod server;

pub use host::{Recorder, pump};
pub use server::{Behavior, TestServer};
