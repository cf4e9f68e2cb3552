//! Common infrastructure for ProSAFE switch VLAN management.
//!
//! This crate provides the pieces shared by every switch driver and by the
//! reconciliation engine:
//!
//! - [`types`]: VLAN/port data model and switch models
//! - [`SwitchDriver`]: the primitive-operation contract a model implements
//! - [`SessionState`]: per-driver login state and token
//! - [`error`]: the error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use prosafe_common::{SwitchDriver, SwitchResult};
//!
//! async fn dump(driver: &mut dyn SwitchDriver) -> SwitchResult<()> {
//!     driver.login().await?;
//!     let vlans = driver.fetch_vlan_membership().await;
//!     driver.logout().await;
//!     println!("{:?}", vlans?);
//!     Ok(())
//! }
//! ```

pub mod driver;
pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use driver::{
    validate_membership, validate_ports, validate_vlan_id, SessionState, SwitchDriver,
};
pub use error::{SwitchError, SwitchResult};
pub use types::{
    all_ignored, all_ports, format_port_map, materialize_port_map, PortId, PortMap,
    PortMembership, PvidAssignment, SwitchInfo, SwitchModel, SwitchState, VlanId,
    VlanMembership, MAX_VLAN_ID,
};
