//! Session lifecycle: the auth state machine, the platform-key watchdog
//! and the one-shot wiring that assembles the whole core.

mod core;
mod machine;
mod watchdog;

pub use {
    self::core::SessionCore,
    machine::{AuthSession, AuthStatus, QueryState, derive_status},
    watchdog::spawn_platform_watchdog,
};
