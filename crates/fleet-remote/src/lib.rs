//! `fleet-remote`: process-backed providers for `fleet-core`.
//!
//! Every remote action is a single shell command executed on a target, either
//! over ssh or, for tests and single-host use, through the local shell.
//!
//! # Architecture
//!
//! ```text
//! RemoteConfig
//!     │
//!     ▼
//! RemoteRunner          ← spawns `ssh … host -- cmd` or `sh -c cmd`
//!     │                    captures stdout/stderr, enforces a deadline
//!     ├──▶ SshServiceController   (ServiceController)
//!     └──▶ SshWebTier             (WebTierController)
//!
//! PingProber            ← local `ping -c 1`, one ProbeUnit per attempt
//! ```

pub(crate) mod process;
pub mod probe;
pub mod service;
pub mod web;

pub use probe::PingProber;
pub use process::RemoteRunner;
pub use service::SshServiceController;
pub use web::SshWebTier;
