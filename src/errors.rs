use thiserror::Error;

pub type Result<T> = std::result::Result<T, AkvError>;

#[derive(Debug, Error)]
pub enum AkvError {
    /// Malformed store path, missing tenant list, missing alias, bad tags JSON.
    /// Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The token endpoint rejected the credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Some items of a bulk operation failed; the rest succeeded.
    #[error("{failed} of {total} items failed: {message}")]
    PartialFailure {
        failed: usize,
        total: usize,
        message: String,
    },

    /// Every item of an inventory failed to load.
    #[error("inventory failed: {0}")]
    Inventory(String),

    /// The provider answered with a non-success status.
    #[error("provider error ({status}) {code}: {message}")]
    Provider {
        status: u16,
        code: String,
        message: String,
    },

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AkvError {
    pub fn config(msg: impl Into<String>) -> Self {
        AkvError::Configuration(msg.into())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AkvError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AkvError::NotFound(_)) || self.status() == Some(404)
    }

    /// Single-line rendering used for job results and discovery warnings.
    pub fn one_line(&self) -> String {
        self.to_string()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<reqwest::Error> for AkvError {
    fn from(e: reqwest::Error) -> Self {
        AkvError::Http(e.to_string())
    }
}

impl From<reqwest_middleware::Error> for AkvError {
    fn from(e: reqwest_middleware::Error) -> Self {
        // reqwest-middleware errors are compound, but to_string() gives details
        AkvError::Http(e.to_string())
    }
}
