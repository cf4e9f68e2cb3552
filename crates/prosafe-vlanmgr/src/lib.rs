//! prosafe-vlanmgr - VLAN reconciliation for NETGEAR ProSAFE switches
//!
//! Reads the live VLAN membership and PVIDs of a switch, computes an
//! order-safe plan to reach the state described by a configuration file and
//! applies it through a [`prosafe_common::SwitchDriver`].
//!
//! - [`plan`]: pure planning ([`ReconcilePlan::compute`])
//! - [`reconciler`]: fetch, plan and execute against one driver
//! - [`config`]: TOML desired-state loader
//! - [`orchestrator`]: per-switch login, backup, reconcile, restore, logout

pub mod config;
pub mod orchestrator;
pub mod plan;
pub mod reconciler;

pub use config::{Config, ConfigError, ConfigResult, Options, PortConfig, SwitchConfig};
pub use orchestrator::{
    ApplyError, ApplyOptions, ApplySummary, DriverFactory, HttpDriverFactory, Orchestrator,
    RestoreOutcome, SwitchOutcome, SwitchStatus,
};
pub use plan::{PlanOp, ReconcilePlan};
pub use reconciler::{ReconcileReport, VlanReconciler};
