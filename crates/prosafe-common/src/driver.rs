//! Switch driver contract and session state.
//!
//! Every supported switch model implements [`SwitchDriver`]. The
//! reconciliation engine is written once against `dyn SwitchDriver` and
//! never sees model-specific page layouts or form fields.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::{SwitchError, SwitchResult};
use crate::types::{
    all_ports, PortId, PortMap, PvidAssignment, SwitchInfo, SwitchModel, VlanId, VlanMembership,
    MAX_VLAN_ID,
};

/// Authentication state of a driver instance.
///
/// `LoggedOut -> login -> LoggedIn { token } -> logout -> LoggedOut`.
/// The token is the device's anti-forgery value (a form hash or secure
/// random string) and lives only inside the driver that obtained it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No session; only `login` is accepted.
    #[default]
    LoggedOut,
    /// Authenticated session.
    LoggedIn {
        /// Token to send with every mutating form.
        token: String,
    },
}

impl SessionState {
    /// Returns true if a session is established.
    pub fn is_logged_in(&self) -> bool {
        matches!(self, SessionState::LoggedIn { .. })
    }

    /// Returns the session token or refuses `operation`.
    pub fn token(&self, operation: &str) -> SwitchResult<&str> {
        match self {
            SessionState::LoggedIn { token } => Ok(token),
            SessionState::LoggedOut => Err(SwitchError::not_logged_in(operation)),
        }
    }

    /// Fails with `NotLoggedIn` unless a session is established.
    pub fn require(&self, operation: &str) -> SwitchResult<()> {
        self.token(operation).map(|_| ())
    }

    /// Drops the token.
    pub fn clear(&mut self) {
        *self = SessionState::LoggedOut;
    }
}

/// Primitive operations every switch model provides.
///
/// All primitives below `login` fail with [`SwitchError::NotLoggedIn`]
/// outside an authenticated session. Unexpected device responses surface as
/// [`SwitchError::Protocol`] with the device's diagnostic text.
#[async_trait]
pub trait SwitchDriver: Send {
    /// The model this driver talks to.
    fn model(&self) -> SwitchModel;

    /// Number of ports on the device.
    fn port_count(&self) -> u8 {
        self.model().port_count()
    }

    /// Returns true while an authenticated session is held.
    fn is_logged_in(&self) -> bool;

    /// Establishes an authenticated session and caches the device token.
    async fn login(&mut self) -> SwitchResult<()>;

    /// Ends the session. Best effort: never fails, always ends `LoggedOut`.
    async fn logout(&mut self);

    /// Reads descriptive device properties.
    async fn fetch_information(&mut self) -> SwitchResult<SwitchInfo>;

    /// Reads the membership of every VLAN defined on the device,
    /// materialized over all ports.
    async fn fetch_vlan_membership(&mut self) -> SwitchResult<VlanMembership>;

    /// Reads the PVID of every port.
    async fn fetch_pvids(&mut self) -> SwitchResult<PvidAssignment>;

    /// Creates a VLAN.
    async fn add_vlan(&mut self, vid: VlanId) -> SwitchResult<()>;

    /// Removes VLAN definitions. Ids are resolved against the device's VLAN
    /// list fetched immediately before the delete.
    async fn delete_vlans(&mut self, vids: &[VlanId]) -> SwitchResult<()>;

    /// Overwrites the membership of one VLAN. `membership` must cover every
    /// port exactly.
    async fn set_vlan_membership(&mut self, vid: VlanId, membership: &PortMap) -> SwitchResult<()>;

    /// Assigns the same PVID to a batch of ports in one device call.
    async fn set_ports_pvid(&mut self, ports: &[PortId], vid: VlanId) -> SwitchResult<()>;

    /// Captures the raw configuration blob.
    async fn backup(&mut self) -> SwitchResult<Vec<u8>>;

    /// Uploads a configuration blob previously returned by `backup`.
    async fn restore(&mut self, config: &[u8]) -> SwitchResult<()>;
}

/// Checks that `vid` is a usable 802.1Q id.
pub fn validate_vlan_id(vid: VlanId) -> SwitchResult<()> {
    if vid == 0 || vid > MAX_VLAN_ID {
        return Err(SwitchError::validation(
            "vid",
            format!("VLAN id {} outside 1..={}", vid, MAX_VLAN_ID),
        ));
    }
    Ok(())
}

/// Checks that `membership` covers exactly the ports `1..=port_count`.
pub fn validate_membership(membership: &PortMap, port_count: u8) -> SwitchResult<()> {
    let expected: BTreeSet<PortId> = all_ports(port_count).collect();
    let given: BTreeSet<PortId> = membership.keys().copied().collect();

    let missing: Vec<_> = expected.difference(&given).collect();
    if !missing.is_empty() {
        return Err(SwitchError::validation(
            "membership",
            format!(
                "membership must cover all {} ports, missing {:?}",
                port_count, missing
            ),
        ));
    }

    let extra: Vec<_> = given.difference(&expected).collect();
    if !extra.is_empty() {
        return Err(SwitchError::validation(
            "membership",
            format!("ports {:?} exceed port count {}", extra, port_count),
        ));
    }

    Ok(())
}

/// Checks that every port lies in `1..=port_count`.
pub fn validate_ports(ports: &[PortId], port_count: u8) -> SwitchResult<()> {
    if let Some(bad) = ports.iter().find(|p| **p == 0 || **p > port_count) {
        return Err(SwitchError::validation(
            "ports",
            format!("port {} out of range, expect 1 <= port <= {}", bad, port_count),
        ));
    }
    Ok(())
}
