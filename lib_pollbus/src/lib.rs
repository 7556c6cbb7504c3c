//! # lib_pollbus
//!
//! Shared library behind the polling publish/subscribe pipeline. Each folder
//! is a module gated behind a cargo feature of the same name so binaries only
//! pull in what they use.
//!
//! - **`retrieve`**: the HTTP `Fetcher`.
//! - **`broker`**: message bus connections (Redis Pub/Sub, in-process).
//! - **`sessions`**: publisher, subscriber and REST polling sessions.
//! - **`loggers`**: console and file logging for the binaries.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "broker")]
pub mod broker;

#[cfg(feature = "sessions")]
pub mod sessions;

#[cfg(feature = "loggers")]
pub mod loggers;
