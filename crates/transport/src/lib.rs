//! Request/response interceptor pipeline and single-flight refresh
//! coordination for the session core.

mod client;
mod endpoints;
mod error;
mod refresh;
mod request;

pub use {
    client::ApiClient,
    endpoints::{RegisterTenantRequest, TenantProfile, UserProfile},
    error::TransportError,
    refresh::RefreshCoordinator,
    request::{
        ApiRequest, CredentialSnapshot, EndpointClass, PLATFORM_KEY_HEADER, RequestBody, attach,
        classify,
    },
};
