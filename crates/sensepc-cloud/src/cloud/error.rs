use sensepc_viewer::ViewerError;
use thiserror::Error;

/// Errors from the cloud adapters.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("not signed in or the session has expired")]
    Unauthorized,
    #[error("token store: {0}")]
    Storage(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Viewer(#[from] ViewerError),
}

impl CloudError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<std::io::Error> for CloudError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
