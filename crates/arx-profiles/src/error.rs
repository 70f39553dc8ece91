use arx_vault::VaultError;
use thiserror::Error;

/// One field-level schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The full issue list carried by a `VALIDATION_ERROR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssues(pub Vec<FieldIssue>);

impl std::fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}

#[derive(Debug, Error)]
/// Failure taxonomy for profile operations, with stable machine codes.
pub enum ProfileError {
    #[error("validation failed: {0}")]
    Validation(ValidationIssues),
    #[error("alternate profile '{0}' was not found")]
    AlternateNotFound(String),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl ProfileError {
    pub fn code(&self) -> &'static str {
        match self {
            ProfileError::Validation(_) => "VALIDATION_ERROR",
            ProfileError::AlternateNotFound(_) => "ALTERNATE_NOT_FOUND",
            ProfileError::Vault(error) => error.code(),
        }
    }

    pub fn validation(issues: Vec<FieldIssue>) -> Self {
        ProfileError::Validation(ValidationIssues(issues))
    }
}
