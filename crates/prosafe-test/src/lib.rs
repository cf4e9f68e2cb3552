//! Test infrastructure for ProSAFE VLAN reconciliation
//!
//! Provides:
//! - [`FakeSwitch`], an in-memory [`prosafe_common::SwitchDriver`] that
//!   records every call, keeps a snapshot after every mutation and enforces
//!   the same PVID rules as the real firmware
//! - State fixtures for common scenarios
//! - Verification helpers for call logs and connectivity history

pub mod fake_switch;
pub mod fixtures;
mod verification;

pub use fake_switch::{DriverCall, FakeSwitch};
pub use fixtures::*;
pub use verification::*;
