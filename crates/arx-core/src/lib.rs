//! Foundational low-level utilities shared across Arx crates.
//!
//! Provides atomic file-write helpers and epoch time utilities used by the
//! vault store, diagnostics recorders, and profile timestamping.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
