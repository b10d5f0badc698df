//! Credential records, expiry policy, and per-domain stores for the
//! session coordination core.

mod activity;
mod platform;
mod policy;
mod record;
mod signal;

pub use {
    activity::{CredentialStore, FileActivityStore, IdleTracker},
    platform::PlatformKeyStore,
    policy::{ExpiryPolicy, InvalidReason, ReauthReason, SessionState},
    record::{CredentialDomain, CredentialRecord, now_ms},
    signal::{Signal, SignalBus},
};
