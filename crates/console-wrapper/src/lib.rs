//! Supervised child-process wrapper
//!
//! This crate launches an external executable, optionally redirects its
//! standard streams, converts line-buffered output into observer callbacks
//! and a replayable in-memory buffer, and enforces a strict
//! created → executing → terminated → disposed lifecycle with safe
//! concurrent shutdown.

#![warn(missing_docs)]

pub mod buffer;
pub mod error;
pub mod registry;
pub mod settings;
pub mod signal;
pub mod wrapper;

mod observer;
mod stdin;

pub use buffer::{StreamBuffer, StreamSource};
pub use error::{Error, Result};
pub use settings::{Encoding, EncodingSettings, WrapperSettings, WrapperSettingsBuilder};
pub use signal::CompletionSignal;
pub use wrapper::{ConsoleWrapper, WrapperState};
