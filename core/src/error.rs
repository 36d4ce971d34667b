use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarginError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Reload required: {reason}")]
    ReloadRequired { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MarginError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied { reason: reason.into() }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Stable code used in admin-tool replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_)              => "database",
            Self::Serialization(_)         => "serialization",
            Self::AuthenticationRequired   => "authentication_required",
            Self::PermissionDenied { .. }  => "permission_denied",
            Self::Validation { .. }        => "validation_error",
            Self::NotFound { .. }          => "not_found",
            Self::ReloadRequired { .. }    => "reload_required",
            Self::Other(_)                 => "internal",
        }
    }
}

pub type MarginResult<T> = Result<T, MarginError>;
