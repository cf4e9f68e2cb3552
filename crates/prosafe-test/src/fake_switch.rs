//! In-memory switch driver
//!
//! `FakeSwitch` holds a [`SwitchState`] and applies driver primitives to it
//! the way a ProSAFE switch does. Clones share the same device, so a test
//! can hand one clone to the code under test (boxed, through a factory) and
//! inspect the other afterwards.

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use prosafe_common::{
    all_ignored, validate_membership, validate_ports, validate_vlan_id, PortId, PortMap,
    PvidAssignment, SessionState, SwitchDriver, SwitchError, SwitchInfo, SwitchModel,
    SwitchResult, SwitchState, VlanId, VlanMembership,
};

/// One driver call as seen by the fake device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Login,
    Logout,
    FetchInformation,
    FetchVlanMembership,
    FetchPvids,
    AddVlan(VlanId),
    DeleteVlans(Vec<VlanId>),
    SetVlanMembership(VlanId, PortMap),
    SetPortsPvid(Vec<PortId>, VlanId),
    Backup,
    Restore(usize),
}

impl DriverCall {
    /// Name of the driver primitive.
    pub fn operation(&self) -> &'static str {
        match self {
            DriverCall::Login => "login",
            DriverCall::Logout => "logout",
            DriverCall::FetchInformation => "fetch_information",
            DriverCall::FetchVlanMembership => "fetch_vlan_membership",
            DriverCall::FetchPvids => "fetch_pvids",
            DriverCall::AddVlan(_) => "add_vlan",
            DriverCall::DeleteVlans(_) => "delete_vlans",
            DriverCall::SetVlanMembership(..) => "set_vlan_membership",
            DriverCall::SetPortsPvid(..) => "set_ports_pvid",
            DriverCall::Backup => "backup",
            DriverCall::Restore(_) => "restore",
        }
    }

    /// True for calls that change VLAN configuration.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            DriverCall::AddVlan(_)
                | DriverCall::DeleteVlans(_)
                | DriverCall::SetVlanMembership(..)
                | DriverCall::SetPortsPvid(..)
                | DriverCall::Restore(_)
        )
    }
}

impl fmt::Display for DriverCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverCall::AddVlan(vid) => write!(f, "add_vlan({})", vid),
            DriverCall::DeleteVlans(vids) => write!(f, "delete_vlans({:?})", vids),
            DriverCall::SetVlanMembership(vid, ports) => write!(
                f,
                "set_vlan_membership({}, {})",
                vid,
                prosafe_common::format_port_map(ports)
            ),
            DriverCall::SetPortsPvid(ports, vid) => {
                write!(f, "set_ports_pvid({:?}, {})", ports, vid)
            }
            DriverCall::Restore(len) => write!(f, "restore({} bytes)", len),
            other => f.write_str(other.operation()),
        }
    }
}

type FailurePredicate = Box<dyn Fn(&DriverCall) -> bool + Send>;

struct Device {
    model: SwitchModel,
    state: SwitchState,
    info: SwitchInfo,
    session: SessionState,
    calls: Vec<DriverCall>,
    history: Vec<SwitchState>,
    backups: Vec<SwitchState>,
    backup_supported: bool,
    fail_when: Option<FailurePredicate>,
}

impl Device {
    fn record(&mut self, call: DriverCall) -> SwitchResult<()> {
        debug!(call = %call, "Fake switch call");
        let fail = self.fail_when.as_ref().is_some_and(|f| f(&call));
        let operation = call.operation();
        self.calls.push(call);
        if !fail {
            return Ok(());
        }
        Err(match operation {
            "login" => SwitchError::auth("injected failure"),
            op => SwitchError::protocol(op, "injected failure"),
        })
    }

    fn snapshot(&mut self) {
        self.history.push(self.state.clone());
    }

    fn vlan_mut(&mut self, vid: VlanId, operation: &str) -> SwitchResult<&mut PortMap> {
        self.state
            .membership
            .get_mut(&vid)
            .ok_or_else(|| SwitchError::protocol(operation, format!("VLAN {} does not exist", vid)))
    }
}

/// Fake ProSAFE switch.
///
/// Rejects, like the firmware, a membership change that removes a port from
/// its PVID VLAN, a PVID pointing at a VLAN the port is not a member of, and
/// the deletion of a VLAN still used as a PVID.
#[derive(Clone)]
pub struct FakeSwitch {
    device: Arc<Mutex<Device>>,
}

impl FakeSwitch {
    /// Create a fake `model` switch holding `state` (materialized to all ports).
    pub fn new(model: SwitchModel, state: SwitchState) -> Self {
        let state = state.materialized(model.port_count());
        let info: SwitchInfo = [
            ("Product Name".to_string(), model.as_str().to_uppercase()),
            ("Switch Name".to_string(), "fake".to_string()),
        ]
        .into_iter()
        .collect();
        Self {
            device: Arc::new(Mutex::new(Device {
                model,
                history: vec![state.clone()],
                state,
                info,
                session: SessionState::LoggedOut,
                calls: Vec::new(),
                backups: Vec::new(),
                backup_supported: model == SwitchModel::Gs108ev3,
                fail_when: None,
            })),
        }
    }

    fn device(&self) -> MutexGuard<'_, Device> {
        self.device.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call matching `predicate` fail after being recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&DriverCall) -> bool + Send + 'static,
    {
        self.device().fail_when = Some(Box::new(predicate));
    }

    /// Toggle backup/restore support.
    pub fn set_backup_supported(&self, supported: bool) {
        self.device().backup_supported = supported;
    }

    /// Current device state.
    pub fn state(&self) -> SwitchState {
        self.device().state.clone()
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.device().calls.clone()
    }

    /// Calls that changed VLAN configuration.
    pub fn mutations(&self) -> Vec<DriverCall> {
        self.calls().into_iter().filter(|c| c.is_mutation()).collect()
    }

    /// Initial state followed by the state after every applied mutation.
    pub fn history(&self) -> Vec<SwitchState> {
        self.device().history.clone()
    }
}

#[async_trait]
impl SwitchDriver for FakeSwitch {
    fn model(&self) -> SwitchModel {
        self.device().model
    }

    fn is_logged_in(&self) -> bool {
        self.device().session.is_logged_in()
    }

    async fn login(&mut self) -> SwitchResult<()> {
        let mut dev = self.device();
        dev.record(DriverCall::Login)?;
        dev.session = SessionState::LoggedIn {
            token: "fake-token".to_string(),
        };
        Ok(())
    }

    async fn logout(&mut self) {
        let mut dev = self.device();
        // logout never fails, even when told to
        let _ = dev.record(DriverCall::Logout);
        dev.session.clear();
    }

    async fn fetch_information(&mut self) -> SwitchResult<SwitchInfo> {
        let mut dev = self.device();
        dev.session.require("fetch_information")?;
        dev.record(DriverCall::FetchInformation)?;
        Ok(dev.info.clone())
    }

    async fn fetch_vlan_membership(&mut self) -> SwitchResult<VlanMembership> {
        let mut dev = self.device();
        dev.session.require("fetch_vlan_membership")?;
        dev.record(DriverCall::FetchVlanMembership)?;
        Ok(dev.state.membership.clone())
    }

    async fn fetch_pvids(&mut self) -> SwitchResult<PvidAssignment> {
        let mut dev = self.device();
        dev.session.require("fetch_pvids")?;
        dev.record(DriverCall::FetchPvids)?;
        Ok(dev.state.pvids.clone())
    }

    async fn add_vlan(&mut self, vid: VlanId) -> SwitchResult<()> {
        let mut dev = self.device();
        dev.session.require("add_vlan")?;
        validate_vlan_id(vid)?;
        dev.record(DriverCall::AddVlan(vid))?;

        if dev.state.membership.contains_key(&vid) {
            return Err(SwitchError::protocol(
                "add_vlan",
                format!("VLAN {} already exists", vid),
            ));
        }
        let ports = all_ignored(dev.model.port_count());
        dev.state.membership.insert(vid, ports);
        dev.snapshot();
        Ok(())
    }

    async fn delete_vlans(&mut self, vids: &[VlanId]) -> SwitchResult<()> {
        let mut dev = self.device();
        dev.session.require("delete_vlans")?;
        if vids.is_empty() {
            return Ok(());
        }
        dev.record(DriverCall::DeleteVlans(vids.to_vec()))?;

        for vid in vids {
            if !dev.state.membership.contains_key(vid) {
                return Err(SwitchError::protocol(
                    "delete_vlans",
                    format!("VLAN {} not found in device VLAN list", vid),
                ));
            }
            if let Some((port, _)) = dev.state.pvids.iter().find(|(_, pvid)| *pvid == vid) {
                return Err(SwitchError::protocol(
                    "delete_vlans",
                    format!("VLAN {} is the PVID of port {}", vid, port),
                ));
            }
        }
        for vid in vids {
            dev.state.membership.remove(vid);
        }
        dev.snapshot();
        Ok(())
    }

    async fn set_vlan_membership(&mut self, vid: VlanId, membership: &PortMap) -> SwitchResult<()> {
        let mut dev = self.device();
        dev.session.require("set_vlan_membership")?;
        validate_membership(membership, dev.model.port_count())?;
        dev.record(DriverCall::SetVlanMembership(vid, membership.clone()))?;

        let orphaned: Vec<PortId> = dev
            .state
            .pvids
            .iter()
            .filter(|(port, pvid)| {
                **pvid == vid && membership.get(*port).is_some_and(|m| !m.is_member())
            })
            .map(|(port, _)| *port)
            .collect();
        if !orphaned.is_empty() {
            return Err(SwitchError::protocol(
                "set_vlan_membership",
                format!("ports {:?} cannot leave their PVID VLAN {}", orphaned, vid),
            ));
        }

        *dev.vlan_mut(vid, "set_vlan_membership")? = membership.clone();
        dev.snapshot();
        Ok(())
    }

    async fn set_ports_pvid(&mut self, ports: &[PortId], vid: VlanId) -> SwitchResult<()> {
        let mut dev = self.device();
        dev.session.require("set_ports_pvid")?;
        validate_ports(ports, dev.model.port_count())?;
        if ports.is_empty() {
            return Ok(());
        }
        dev.record(DriverCall::SetPortsPvid(ports.to_vec(), vid))?;

        let vlan = dev.vlan_mut(vid, "set_ports_pvid")?.clone();
        if let Some(port) = ports
            .iter()
            .find(|p| !vlan.get(*p).is_some_and(|m| m.is_member()))
        {
            return Err(SwitchError::protocol(
                "set_ports_pvid",
                format!("port {} is not a member of VLAN {}", port, vid),
            ));
        }
        for port in ports {
            dev.state.pvids.insert(*port, vid);
        }
        dev.snapshot();
        Ok(())
    }

    async fn backup(&mut self) -> SwitchResult<Vec<u8>> {
        let mut dev = self.device();
        dev.session.require("backup")?;
        if !dev.backup_supported {
            return Err(SwitchError::unsupported("backup", dev.model));
        }
        dev.record(DriverCall::Backup)?;

        let blob = format!("fake-backup-{}", dev.backups.len()).into_bytes();
        let state = dev.state.clone();
        dev.backups.push(state);
        Ok(blob)
    }

    async fn restore(&mut self, config: &[u8]) -> SwitchResult<()> {
        let mut dev = self.device();
        dev.session.require("restore")?;
        if !dev.backup_supported {
            return Err(SwitchError::unsupported("restore", dev.model));
        }
        dev.record(DriverCall::Restore(config.len()))?;

        let state = std::str::from_utf8(config)
            .ok()
            .and_then(|s| s.strip_prefix("fake-backup-"))
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| dev.backups.get(n).cloned())
            .ok_or_else(|| SwitchError::validation("config", "not a backup of this device"))?;
        dev.state = state;
        dev.snapshot();
        // the device restarts and drops the session
        dev.session.clear();
        Ok(())
    }
}
