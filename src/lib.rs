//! Application-layer BLE session controller.
//!
//! Sits on top of an external GAP/SMP/GATT host stack and keeps the
//! application's view of it consistent:
//!
//! 1. **Device state** - boot-time setup, then Idle / Scanning / Advertising
//! 2. **Links** - a bounded registry of live connections keyed by handle
//! 3. **Bonding** - pairing with a tiered retry policy, bonded-peer table
//! 4. **Profiles** - per-link client sessions, cached discovery results
//!    and the record access control point gate
//!
//! Everything is plain synchronous logic driven by messages, so it runs and
//! tests on the host. The optional `embedded` feature adds an async loop
//! that moves those messages over Embassy channels.
//!
//! Usage: `cargo test` (host), `cargo test --features embedded` for the loop.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod ble;
pub mod config;
pub mod controller;
pub mod error;
pub mod message;
pub mod profile;
pub mod slots;

#[cfg(feature = "embedded")]
pub mod runtime;

pub use controller::SessionController;
pub use error::{Error, Result};
pub use message::{AppCommand, AppEvent, StackEvent, StackRequest};
