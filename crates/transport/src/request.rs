use {
    reqwest::Method,
    secrecy::{ExposeSecret, SecretString},
    serde::Serialize,
};

use crate::error::TransportError;

/// Header carrying the elevated operator credential.
pub const PLATFORM_KEY_HEADER: &str = "x-platform-admin-key";

/// Endpoints the pipeline treats specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// Operator endpoints authenticated by the platform key header.
    Platform,
    /// Identity-lifecycle endpoints; a 401 here is never recovered
    /// (recovering login/refresh/logout with a refresh would be circular).
    AuthLifecycle,
    /// Everything else: cookie-authenticated tenant endpoints.
    Ordinary,
}

const LIFECYCLE_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/refresh",
    "/auth/logout",
    "/auth/register-tenant",
    "/auth/accept-invite",
];

pub fn classify(path: &str) -> EndpointClass {
    if path == "/platform" || path.starts_with("/platform/") {
        EndpointClass::Platform
    } else if LIFECYCLE_PATHS.contains(&path) {
        EndpointClass::AuthLifecycle
    } else {
        EndpointClass::Ordinary
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A replayable description of one API call.
///
/// The pipeline may re-issue the exact same request once after a successful
/// refresh, so the body is held as a value rather than a stream.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<RequestBody>,
    /// Explicitly supplied platform key. When set, the store is not
    /// consulted and no local expiry check applies.
    pub platform_key: Option<SecretString>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            platform_key: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json(mut self, body: &impl Serialize) -> Result<Self, TransportError> {
        let value = serde_json::to_value(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn with_platform_key(mut self, key: SecretString) -> Self {
        self.platform_key = Some(key);
        self
    }
}

/// Credential state fetched explicitly for one send attempt.
///
/// The primary session cookie is carried by the HTTP client's cookie store
/// and never appears here.
#[derive(Debug, Clone, Default)]
pub struct CredentialSnapshot {
    pub platform_key: Option<SecretString>,
}

/// Pure attachment: the transport layer performs no hidden storage reads.
pub fn attach(
    builder: reqwest::RequestBuilder,
    snapshot: &CredentialSnapshot,
) -> reqwest::RequestBuilder {
    match &snapshot.platform_key {
        Some(key) => builder.header(PLATFORM_KEY_HEADER, key.expose_secret().as_str()),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(classify("/platform/tenants"), EndpointClass::Platform);
        assert_eq!(classify("/platform/ping"), EndpointClass::Platform);
        assert_eq!(classify("/auth/login"), EndpointClass::AuthLifecycle);
        assert_eq!(classify("/auth/refresh"), EndpointClass::AuthLifecycle);
        assert_eq!(classify("/auth/logout"), EndpointClass::AuthLifecycle);
        assert_eq!(classify("/auth/register-tenant"), EndpointClass::AuthLifecycle);
        assert_eq!(classify("/auth/accept-invite"), EndpointClass::AuthLifecycle);
        // Identity lookups are ordinary: a 401 on them is recoverable.
        assert_eq!(classify("/auth/me"), EndpointClass::Ordinary);
        assert_eq!(classify("/clients"), EndpointClass::Ordinary);
    }

    #[test]
    fn request_is_replayable() {
        let req = ApiRequest::post("/clients")
            .json(&serde_json::json!({"name": "Acme"}))
            .unwrap();
        let replay = req.clone();
        assert_eq!(replay.path, req.path);
        assert!(matches!(replay.body, Some(RequestBody::Json(_))));
    }

    #[test]
    fn platform_key_never_leaks_via_debug() {
        let req = ApiRequest::get("/platform/ping")
            .with_platform_key(SecretString::new("super-secret".into()));
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
