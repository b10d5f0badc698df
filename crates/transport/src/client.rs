//! The interceptor pipeline: the single choke point every outbound API
//! call passes through.
//!
//! Request phase: attach credentials (platform header; the primary session
//! cookie rides in the HTTP client's cookie store untouched). Response
//! phase: classify 401s, recover via single-flight refresh where policy
//! allows, replay at most once, and emit invalidation signals everywhere
//! recovery is off the table.

use std::sync::Arc;

use {
    reqwest::{Response, StatusCode},
    tracing::{debug, warn},
};

use juris_credentials::{
    CredentialDomain, IdleTracker, PlatformKeyStore, ReauthReason, Signal, SignalBus, now_ms,
};

use crate::{
    error::TransportError,
    refresh::RefreshCoordinator,
    request::{ApiRequest, CredentialSnapshot, EndpointClass, RequestBody, attach, classify},
};

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    refresh: RefreshCoordinator,
    idle: Arc<IdleTracker>,
    platform: Arc<PlatformKeyStore>,
    bus: SignalBus,
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        idle: Arc<IdleTracker>,
        platform: Arc<PlatformKeyStore>,
        bus: SignalBus,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                refresh: RefreshCoordinator::new(),
                idle,
                platform,
                bus,
            }),
        })
    }

    pub fn bus(&self) -> &SignalBus {
        &self.inner.bus
    }

    pub fn idle(&self) -> &IdleTracker {
        &self.inner.idle
    }

    pub fn platform(&self) -> &PlatformKeyStore {
        &self.inner.platform
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Send a request through the full pipeline.
    ///
    /// Returns the response for every status except an unauthorized the
    /// pipeline owns: platform 401s and unrecoverable primary 401s become
    /// [`TransportError::Unauthorized`]; 401s on identity-lifecycle
    /// endpoints pass through for the caller to interpret.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response, TransportError> {
        let class = classify(&request.path);
        let mut retried = false;

        loop {
            let builder = self.prepare(request, class)?;
            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            match class {
                EndpointClass::Platform => {
                    // Platform keys are never silently refreshed: clear
                    // local state, tell the world, surface the failure.
                    self.inner.platform.clear();
                    self.inner.bus.publish(Signal::PlatformInvalidated);
                    return Err(TransportError::unauthorized(
                        CredentialDomain::Platform,
                        ReauthReason::Unauthorized,
                    ));
                },
                EndpointClass::AuthLifecycle => {
                    return Ok(response);
                },
                EndpointClass::Ordinary => {
                    if retried {
                        // The replay failed too. The retried flag is the
                        // structural guard against an infinite loop.
                        return Err(TransportError::unauthorized(
                            CredentialDomain::Primary,
                            ReauthReason::Unauthorized,
                        ));
                    }

                    let now = now_ms();
                    if self.inner.idle.is_idle_expired(now) {
                        // An intentional session boundary: refreshing here
                        // would only mask the timeout.
                        debug!(path = %request.path, "session idle-expired, not refreshing");
                        self.logout_best_effort().await;
                        self.inner.bus.publish(Signal::PrimaryInvalidated);
                        return Err(TransportError::unauthorized(
                            CredentialDomain::Primary,
                            ReauthReason::Idle,
                        ));
                    }

                    retried = true;
                    let refresh = self.refresh_call();
                    match self.inner.refresh.ensure_refreshed(move || refresh).await {
                        Ok(()) => {
                            debug!(path = %request.path, "session refreshed, replaying request");
                            continue;
                        },
                        Err(e) => {
                            warn!(path = %request.path, error = %e, "session refresh failed");
                            self.inner.bus.publish(Signal::PrimaryInvalidated);
                            return Err(TransportError::unauthorized(
                                CredentialDomain::Primary,
                                ReauthReason::Unauthorized,
                            ));
                        },
                    }
                },
            }
        }
    }

    /// Request phase: body and credential attachment.
    fn prepare(
        &self,
        request: &ApiRequest,
        class: EndpointClass,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), self.url(&request.path));

        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        if class == EndpointClass::Platform {
            let snapshot = self.platform_snapshot(request)?;
            builder = attach(builder, &snapshot);
        }

        Ok(builder)
    }

    /// Fetch the platform credential for one send attempt, rejecting
    /// locally-expired keys before any network round-trip is wasted.
    fn platform_snapshot(
        &self,
        request: &ApiRequest,
    ) -> Result<CredentialSnapshot, TransportError> {
        // An explicitly supplied key (operator login screen probing a
        // candidate) bypasses the store and its expiry clocks.
        if let Some(key) = &request.platform_key {
            return Ok(CredentialSnapshot {
                platform_key: Some(key.clone()),
            });
        }

        let now = now_ms();
        let state = self.inner.platform.session_state(now);
        if !state.valid {
            self.inner.bus.publish(Signal::PlatformInvalidated);
            let reason = state
                .reason
                .map(ReauthReason::from)
                .unwrap_or(ReauthReason::Unauthorized);
            return Err(TransportError::unauthorized(
                CredentialDomain::Platform,
                reason,
            ));
        }

        let Some(key) = self.inner.platform.key() else {
            return Err(TransportError::unauthorized(
                CredentialDomain::Platform,
                ReauthReason::Unauthorized,
            ));
        };

        // Sending a platform request counts as activity.
        self.inner.platform.touch(now);
        Ok(CredentialSnapshot {
            platform_key: Some(key),
        })
    }

    /// The refresh call handed to the single-flight coordinator. The server
    /// answers by rotating the session cookie; the body is drained so the
    /// settlement time covers the whole exchange.
    fn refresh_call(&self) -> impl Future<Output = Result<(), TransportError>> + Send + 'static {
        let http = self.inner.http.clone();
        let url = self.url("/auth/refresh");
        async move {
            let response = http
                .post(url)
                .send()
                .await
                .map_err(|e| TransportError::Refresh(e.to_string()))?;
            let status = response.status();
            let _ = response.bytes().await;
            if status.is_success() {
                Ok(())
            } else {
                Err(TransportError::Refresh(format!(
                    "refresh endpoint returned {status}"
                )))
            }
        }
    }

    /// Revoke the session server-side, ignoring the outcome. Used when the
    /// pipeline is already tearing the session down.
    pub(crate) async fn logout_best_effort(&self) {
        let url = self.url("/auth/logout");
        match self.inner.http.post(url).send().await {
            Ok(_) => {},
            Err(e) => debug!(error = %e, "best-effort logout failed (ignored)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use {
        mockito::Matcher,
        secrecy::SecretString,
        tokio::sync::broadcast::error::TryRecvError,
    };

    use juris_credentials::{
        CredentialRecord, CredentialStore, ExpiryPolicy, FileActivityStore, InvalidReason,
    };

    use super::*;

    const MIN_MS: u64 = 60_000;

    struct Harness {
        client: ApiClient,
        platform: Arc<PlatformKeyStore>,
        activity: Arc<FileActivityStore>,
        bus: SignalBus,
        _dir: tempfile::TempDir,
    }

    fn harness(server_url: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let activity = Arc::new(FileActivityStore::new(dir.path().join("activity.json")));
        // Seed a fresh activity record so idle expiry starts disarmed.
        activity.write(&CredentialRecord::new(now_ms())).unwrap();
        let idle = Arc::new(IdleTracker::new(
            activity.clone(),
            Duration::from_secs(30 * 60),
            Duration::from_secs(5),
            now_ms(),
        ));
        let platform = Arc::new(PlatformKeyStore::new(
            ExpiryPolicy::with_ttl(Duration::from_secs(8 * 3600), Duration::from_secs(30 * 60)),
            dir.path().join("platform_key.json"),
        ));
        let bus = SignalBus::new();
        let client = ApiClient::new(server_url, idle, platform.clone(), bus.clone()).unwrap();
        Harness {
            client,
            platform,
            activity,
            bus,
            _dir: dir,
        }
    }

    fn expire_primary_idle(h: &Harness) {
        // Last activity 31 minutes ago with a 30 minute timeout.
        let now = now_ms();
        h.activity
            .write(&CredentialRecord {
                issued_at_ms: now - 60 * MIN_MS,
                last_activity_at_ms: now - 31 * MIN_MS,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn ordinary_success_passes_through() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/processes")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let h = harness(&server.url());
        let resp = h.client.execute(&ApiRequest::get("/processes")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn non_401_failures_are_not_interpreted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/processes")
            .with_status(500)
            .create_async()
            .await;

        let h = harness(&server.url());
        let resp = h.client.execute(&ApiRequest::get("/processes")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh_and_both_replay() {
        let mut server = mockito::Server::new_async().await;

        // Originals carry no cookie and get 401.
        let unauthorized = server
            .mock("GET", "/processes")
            .match_header("cookie", Matcher::Missing)
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        // One refresh, taking ~200ms, rotating the session cookie.
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("set-cookie", "sid=fresh; Path=/")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(200));
                w.write_all(b"{}")
            })
            .expect(1)
            .create_async()
            .await;

        // Replays carry the rotated cookie and succeed.
        let replayed = server
            .mock("GET", "/processes")
            .match_header("cookie", Matcher::Regex("sid=fresh".into()))
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;

        let h = harness(&server.url());
        let started = std::time::Instant::now();
        let first = ApiRequest::get("/processes");
        let second = ApiRequest::get("/processes");
        let (a, b) = tokio::join!(h.client.execute(&first), h.client.execute(&second),);

        assert_eq!(a.unwrap().status(), StatusCode::OK);
        assert_eq!(b.unwrap().status(), StatusCode::OK);
        assert!(started.elapsed() >= Duration::from_millis(200));

        unauthorized.assert_async().await;
        refresh.assert_async().await;
        replayed.assert_async().await;
    }

    #[tokio::test]
    async fn replay_is_never_retried_a_second_time() {
        let mut server = mockito::Server::new_async().await;

        // Always 401: original plus exactly one replay.
        let endpoint = server
            .mock("GET", "/processes")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url());
        let err = h
            .client
            .execute(&ApiRequest::get("/processes"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Unauthorized {
                domain: CredentialDomain::Primary,
                reason: ReauthReason::Unauthorized,
            }
        ));
        endpoint.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn idle_expiry_takes_precedence_over_refresh() {
        let mut server = mockito::Server::new_async().await;

        let endpoint = server
            .mock("GET", "/processes")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;
        let logout = server
            .mock("POST", "/auth/logout")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url());
        expire_primary_idle(&h);
        let mut signals = h.bus.subscribe();

        let err = h
            .client
            .execute(&ApiRequest::get("/processes"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Unauthorized {
                domain: CredentialDomain::Primary,
                reason: ReauthReason::Idle,
            }
        ));
        assert_eq!(signals.try_recv().unwrap(), Signal::PrimaryInvalidated);
        endpoint.assert_async().await;
        refresh.assert_async().await;
        logout.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_failure_fans_out_to_all_waiters() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/processes")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(100));
                w.write_all(b"{}")
            })
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url());
        let mut signals = h.bus.subscribe();
        let first = ApiRequest::get("/processes");
        let second = ApiRequest::get("/processes");
        let (a, b) = tokio::join!(h.client.execute(&first), h.client.execute(&second),);

        for result in [a, b] {
            assert!(matches!(
                result.unwrap_err(),
                TransportError::Unauthorized {
                    domain: CredentialDomain::Primary,
                    ..
                }
            ));
        }
        assert_eq!(signals.try_recv().unwrap(), Signal::PrimaryInvalidated);
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn lifecycle_401_passes_through_unrecovered() {
        let mut server = mockito::Server::new_async().await;

        let login = server
            .mock("POST", "/auth/login")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let h = harness(&server.url());
        let req = ApiRequest::post("/auth/login").form(&[("username", "a"), ("password", "b")]);
        let resp = h.client.execute(&req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        login.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn expired_platform_key_is_rejected_without_network() {
        let mut server = mockito::Server::new_async().await;
        let endpoint = server
            .mock("GET", "/platform/tenants")
            .expect(0)
            .create_async()
            .await;

        let h = harness(&server.url());
        // Older than the 8h TTL, used recently: TTL still wins.
        let now = now_ms();
        h.platform
            .set_key(SecretString::new("op-key".into()), now - 9 * 3600 * 1000);
        h.platform.touch(now - 1_000);
        let mut signals = h.bus.subscribe();

        let err = h
            .client
            .execute(&ApiRequest::get("/platform/tenants"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Unauthorized {
                domain: CredentialDomain::Platform,
                reason: ReauthReason::Ttl,
            }
        ));
        assert_eq!(signals.try_recv().unwrap(), Signal::PlatformInvalidated);
        endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn missing_platform_key_fails_fast() {
        let mut server = mockito::Server::new_async().await;
        let endpoint = server
            .mock("GET", "/platform/tenants")
            .expect(0)
            .create_async()
            .await;

        let h = harness(&server.url());
        let err = h
            .client
            .execute(&ApiRequest::get("/platform/tenants"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Unauthorized {
                domain: CredentialDomain::Platform,
                reason: ReauthReason::Unauthorized,
            }
        ));
        endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn platform_request_attaches_key_and_counts_as_activity() {
        let mut server = mockito::Server::new_async().await;
        let ping = server
            .mock("GET", "/platform/ping")
            .match_header("x-platform-admin-key", "op-key")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url());
        let issued = now_ms() - 10 * MIN_MS;
        h.platform.set_key(SecretString::new("op-key".into()), issued);

        let resp = h
            .client
            .execute(&ApiRequest::get("/platform/ping"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // The send bumped the activity clock past the issue time.
        assert!(h.platform.record().unwrap().last_activity_at_ms > issued);
        ping.assert_async().await;
    }

    #[tokio::test]
    async fn platform_401_clears_the_key_and_signals() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/platform/tenants")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let h = harness(&server.url());
        h.platform
            .set_key(SecretString::new("revoked".into()), now_ms());
        let mut signals = h.bus.subscribe();

        let err = h
            .client
            .execute(&ApiRequest::get("/platform/tenants"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Unauthorized {
                domain: CredentialDomain::Platform,
                reason: ReauthReason::Unauthorized,
            }
        ));
        assert!(h.platform.key().is_none());
        assert_eq!(signals.try_recv().unwrap(), Signal::PlatformInvalidated);
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn explicit_platform_key_bypasses_store_and_expiry() {
        let mut server = mockito::Server::new_async().await;
        let ping = server
            .mock("GET", "/platform/ping")
            .match_header("x-platform-admin-key", "candidate")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url());
        // Store is empty; the explicit key must still go out.
        let req = ApiRequest::get("/platform/ping")
            .with_platform_key(SecretString::new("candidate".into()));
        let resp = h.client.execute(&req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        ping.assert_async().await;
    }

    #[tokio::test]
    async fn idle_signal_carries_no_refresh_reason_confusion() {
        // Sanity: an idle-expired platform key reports idle, not ttl.
        let dir = tempfile::tempdir().unwrap();
        let platform = PlatformKeyStore::new(
            ExpiryPolicy::with_ttl(Duration::from_secs(8 * 3600), Duration::from_secs(30 * 60)),
            dir.path().join("platform_key.json"),
        );
        let now = now_ms();
        platform.set_key(SecretString::new("k".into()), now - 31 * MIN_MS);
        let state = platform.session_state(now);
        assert_eq!(state.reason, Some(InvalidReason::Idle));
    }

    #[tokio::test]
    async fn signals_are_not_published_on_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/clients")
            .with_status(200)
            .create_async()
            .await;

        let h = harness(&server.url());
        let mut signals = h.bus.subscribe();
        h.client.execute(&ApiRequest::get("/clients")).await.unwrap();
        assert!(matches!(signals.try_recv(), Err(TryRecvError::Empty)));
    }
}
