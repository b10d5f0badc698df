use juris_credentials::{CredentialDomain, ReauthReason};

/// Failure taxonomy for the request pipeline.
///
/// Cheap to clone: a single refresh outcome fans out to every caller
/// coalesced onto it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// A credential was rejected (locally or by the server) and the
    /// pipeline could not recover. Carries the reason code for the
    /// re-authentication screen.
    #[error("{domain} credential rejected ({reason})")]
    Unauthorized {
        domain: CredentialDomain,
        reason: ReauthReason,
    },

    /// The session refresh call itself failed.
    #[error("session refresh failed: {0}")]
    Refresh(String),

    /// Network-level failure before any HTTP status was produced.
    #[error("transport failure: {0}")]
    Http(String),

    /// Non-2xx response from a typed endpoint call.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// 2xx response whose body did not match the expected shape.
    #[error("malformed response body: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn unauthorized(domain: CredentialDomain, reason: ReauthReason) -> Self {
        Self::Unauthorized { domain, reason }
    }
}
