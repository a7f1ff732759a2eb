//! Fetch error taxonomy.

/// Errors produced by a registry fetch.
///
/// The split matters to the resolver: [`is_retryable`](FetchError::is_retryable)
/// errors get exponential backoff, while credential and unknown-ref failures
/// are terminal until the project configuration changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The registry rejected the request's credentials.
    #[error("registry rejected the request credentials")]
    Unauthorized,

    /// The graph id or variant does not exist in the registry.
    #[error("unknown graph ref: {graph_ref}")]
    NotFound { graph_ref: String },

    /// Transport-level failure (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The registry responded but signalled a server-side failure.
    #[error("registry server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The response arrived but could not be understood.
    #[error("malformed registry response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether a retry with backoff is worthwhile.
    ///
    /// Network and server errors are transient; everything else will keep
    /// failing until the user fixes credentials or configuration.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Network("connect refused".into()).is_retryable());
        assert!(FetchError::Server {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());

        assert!(!FetchError::Unauthorized.is_retryable());
        assert!(!FetchError::NotFound {
            graph_ref: "g@current".into()
        }
        .is_retryable());
        assert!(!FetchError::Malformed("truncated".into()).is_retryable());
    }
}
