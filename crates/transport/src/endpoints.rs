//! Typed wrappers over the consumed API contract. Every call goes through
//! [`ApiClient::execute`], so the pipeline's credential and recovery rules
//! apply uniformly.

use {
    secrecy::SecretString,
    serde::{Deserialize, Serialize, de::DeserializeOwned},
};

use crate::{client::ApiClient, error::TransportError, request::ApiRequest};

/// Identity lookup result (`GET /auth/me`).
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub tenant_id: String,
}

/// Tenant lookup result (`GET /tenant/me`), gated on a successful identity
/// lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantProfile {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub plan: Option<String>,
}

/// Payload for `POST /auth/register-tenant`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterTenantRequest {
    pub tenant_name: String,
    pub tenant_document_kind: String,
    pub tenant_document: String,
    pub tenant_slug: String,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl ApiClient {
    /// Establish the primary session. The server answers by setting the
    /// httpOnly session cookie; nothing credential-shaped comes back to
    /// client code.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), TransportError> {
        // The server's form contract names the email field "username".
        let request =
            ApiRequest::post("/auth/login").form(&[("username", email), ("password", password)]);
        let response = self.execute(&request).await?;
        ok_or_status(response).await.map(drop)
    }

    /// Revoke the primary session server-side.
    pub async fn logout(&self) -> Result<(), TransportError> {
        let response = self.execute(&ApiRequest::post("/auth/logout")).await?;
        ok_or_status(response).await.map(drop)
    }

    pub async fn me(&self) -> Result<UserProfile, TransportError> {
        let response = self.execute(&ApiRequest::get("/auth/me")).await?;
        decode_json(response).await
    }

    pub async fn tenant_me(&self) -> Result<TenantProfile, TransportError> {
        let response = self.execute(&ApiRequest::get("/tenant/me")).await?;
        decode_json(response).await
    }

    /// Validate the stored platform key. Any non-2xx means invalid.
    pub async fn platform_ping(&self) -> Result<(), TransportError> {
        let response = self.execute(&ApiRequest::get("/platform/ping")).await?;
        ok_or_status(response).await.map(drop)
    }

    /// Validate a candidate key before storing it (operator login screen).
    pub async fn platform_ping_with(&self, key: SecretString) -> Result<(), TransportError> {
        let request = ApiRequest::get("/platform/ping").with_platform_key(key);
        let response = self.execute(&request).await?;
        ok_or_status(response).await.map(drop)
    }

    pub async fn register_tenant(
        &self,
        payload: &RegisterTenantRequest,
    ) -> Result<(), TransportError> {
        let request = ApiRequest::post("/auth/register-tenant").json(payload)?;
        let response = self.execute(&request).await?;
        ok_or_status(response).await.map(drop)
    }

    /// Finish an invite flow; afterwards the caller should refresh the
    /// session state, since server-side identity changed underneath it.
    pub async fn accept_invite(&self, token: &str, password: &str) -> Result<(), TransportError> {
        let request = ApiRequest::post("/auth/accept-invite")
            .json(&serde_json::json!({ "token": token, "password": password }))?;
        let response = self.execute(&request).await?;
        ok_or_status(response).await.map(drop)
    }
}

async fn ok_or_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let response = ok_or_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| TransportError::Decode(e.to_string()))
}
