//! Best-effort credential encryption for the profile vault.
//!
//! [`EncryptionService`] wraps an optional [`EncryptionAdapter`] and converts
//! every adapter failure into a transparent plaintext fallback annotated with
//! a warning and a structured fallback event. The service never returns an
//! error to callers; degraded operation is the expected mode on machines
//! without a usable key source.

pub mod adapter;
pub mod service;

pub use adapter::{EncryptionAdapter, MachineKeyAdapter};
pub use service::{
    EncryptionFallbackEvent, EncryptionOperation, EncryptionOutcome, EncryptionService,
    EncryptionStatus, FallbackReason, NormalizedAdapterError,
};
