//! Profile CRUD orchestration: validation, business rules, redaction, and
//! diagnostics breadcrumbs.
//!
//! [`ProfileService`] sits between callers (routes/IPC, out of scope) and the
//! vault. It validates payloads before any mutation, enforces the
//! single-active rule, passes new credentials through the encryption layer,
//! and never returns a raw API key to a caller.

pub mod error;
pub mod service;
pub mod types;
pub mod validate;

pub use error::{FieldIssue, ProfileError, ValidationIssues};
pub use service::ProfileService;
pub use types::{
    ActivateProfileResult, CreateProfilePayload, CreateProfileResult, DeleteProfilePayload,
    DeleteProfileResult, RedactedProfile, UpdateProfilePayload, UpdateProfileResult,
    REDACTED_API_KEY,
};
