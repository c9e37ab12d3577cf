pub type WikigraphResult<T> = Result<T, WikigraphError>;

/// Failure taxonomy for one graph-render request.
///
/// Every variant is local to a single request: the orchestrator cleans up
/// partial artifacts before returning, so a retry always starts from a
/// consistent "nothing cached" state.
#[derive(thiserror::Error, Debug)]
pub enum WikigraphError {
    #[error("empty graph description")]
    EmptyInput,

    /// Returned by [`crate::upload::UploadStore::check_upload_allowed`]
    /// implementations when the host cannot accept uploads at all (feature
    /// switched off, storage unavailable).
    #[error("uploads are unavailable: {0}")]
    MissingUploadCapability(String),

    #[error("failed to create cache directory '{0}'")]
    DirectoryCreateFailed(String),

    #[error("the '{0}' attribute is not allowed in graph descriptions")]
    ForbiddenAttribute(String),

    #[error("invalid {0} attribute value: not the name of an uploaded file")]
    InvalidImageReference(String),

    #[error("unrecognized preparse value '{0}' (expected 'static' or 'dynamic')")]
    UnrecognizedPreparseMode(String),

    #[error("failed to read the stored graph source")]
    SourceReadFailed,

    #[error("failed to write the graph source")]
    SourceWriteFailed,

    #[error("failed to write the graph map")]
    MapWriteFailed,

    #[error("graph renderer failed: {0}")]
    RendererInvocationFailed(String),

    #[error("graph renderer timed out after {0} seconds")]
    RendererTimeout(u64),

    #[error("upload not permitted: {0}")]
    UploadNotPermitted(String),

    #[error("upload verification failed: {0}")]
    UploadVerificationFailed(String),

    #[error("a conflicting change is in progress, please reload the page and try again")]
    RetryRequired,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WikigraphError {
    pub fn renderer(diagnostic: impl Into<String>) -> Self {
        Self::RendererInvocationFailed(diagnostic.into())
    }

    pub fn forbidden(attribute: impl Into<String>) -> Self {
        Self::ForbiddenAttribute(attribute.into())
    }

    pub fn upload_denied(reason: impl Into<String>) -> Self {
        Self::UploadNotPermitted(reason.into())
    }

    /// Whether the caller may simply resubmit the request (transient
    /// structural conflicts rather than bad input).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryRequired | Self::RendererTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_attribute() {
        let err = WikigraphError::forbidden("imagepath");
        assert!(err.to_string().contains("imagepath"));
    }

    #[test]
    fn retryable_classification() {
        assert!(WikigraphError::RetryRequired.is_retryable());
        assert!(WikigraphError::RendererTimeout(30).is_retryable());
        assert!(!WikigraphError::EmptyInput.is_retryable());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = WikigraphError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
