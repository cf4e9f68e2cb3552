//! Reconciliation planning
//!
//! A plan moves a switch from its current VLAN configuration to a desired one
//! without ever cutting a port off its PVID VLAN:
//!
//! 1. create new VLANs
//! 2. widen: each kept VLAN gets the union of old and new membership
//!    (per port the most connected of the two), new VLANs get their target
//! 3. move PVIDs
//! 4. narrow: every VLAN gets its target, dropped VLANs lose all members
//! 5. delete dropped VLANs
//!
//! Ports the desired state never mentions as members ("preserved" ports)
//! keep their membership in their current PVID VLAN, and that VLAN is never
//! deleted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use prosafe_common::{
    all_ignored, all_ports, format_port_map, validate_ports, validate_vlan_id, PortId, PortMap,
    SwitchError, SwitchResult, SwitchState, VlanId, VlanMembership,
};

/// One driver primitive call of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOp {
    /// `add_vlan(vid)`
    AddVlan(VlanId),
    /// `set_vlan_membership(vid, ports)`; `ports` covers every port
    SetMembership { vid: VlanId, ports: PortMap },
    /// `set_ports_pvid(ports, vid)`
    SetPvid { vid: VlanId, ports: Vec<PortId> },
    /// `delete_vlans(vids)`
    DeleteVlans(Vec<VlanId>),
}

impl fmt::Display for PlanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOp::AddVlan(vid) => write!(f, "add VLAN {}", vid),
            PlanOp::SetMembership { vid, ports } => {
                write!(f, "set VLAN {} members to {}", vid, format_port_map(ports))
            }
            PlanOp::SetPvid { vid, ports } => write!(f, "set PVID {} on ports {:?}", vid, ports),
            PlanOp::DeleteVlans(vids) => write!(f, "delete VLANs {:?}", vids),
        }
    }
}

/// Ordered list of operations reconciling one switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    ops: Vec<PlanOp>,
    preserved_ports: BTreeSet<PortId>,
    kept_vlans: BTreeSet<VlanId>,
}

impl ReconcilePlan {
    /// Computes the plan taking a `port_count` switch from `current` to
    /// `desired`.
    ///
    /// Writes that would leave a VLAN as it already is are left out, so a
    /// switch already in the desired state yields an empty plan.
    pub fn compute(
        port_count: u8,
        current: &SwitchState,
        desired: &SwitchState,
    ) -> SwitchResult<Self> {
        validate_desired(port_count, desired)?;
        let old = current.materialized(port_count);
        let new = desired.materialized(port_count);

        // Ports
        let active: BTreeSet<PortId> = new
            .membership
            .values()
            .flat_map(|ports| ports.iter())
            .filter(|(_, m)| m.is_member())
            .map(|(p, _)| *p)
            .collect();
        let preserved_ports: BTreeSet<PortId> =
            all_ports(port_count).filter(|p| !active.contains(p)).collect();

        // VLANs
        let old_vids: BTreeSet<VlanId> = old.membership.keys().copied().collect();
        let new_vids: BTreeSet<VlanId> = new.membership.keys().copied().collect();
        let to_add: Vec<VlanId> = new_vids.difference(&old_vids).copied().collect();
        let mut to_remove: BTreeSet<VlanId> = old_vids.difference(&new_vids).copied().collect();

        let mut step1 = VlanMembership::new();
        let mut step2 = VlanMembership::new();
        for vid in &to_add {
            step1.insert(*vid, new.membership[vid].clone());
        }
        for vid in &to_remove {
            step2.insert(*vid, all_ignored(port_count));
        }
        for vid in new_vids.intersection(&old_vids) {
            let (target, was) = (&new.membership[vid], &old.membership[vid]);
            let widened = target
                .iter()
                .map(|(p, m)| (*p, (*m).min(was[p])))
                .collect();
            step1.insert(*vid, widened);
            step2.insert(*vid, target.clone());
        }

        // Preserved ports stay in their PVID VLAN
        let mut kept_vlans = BTreeSet::new();
        for port in &preserved_ports {
            let Some(pvid) = old.pvids.get(port) else {
                // A member port without a PVID would lose its membership
                if let Some(vid) = old.vlans_of(*port).next() {
                    return Err(SwitchError::protocol(
                        "reconcile",
                        format!(
                            "port {} is a member of VLAN {} but the device reported no PVID for it",
                            port, vid
                        ),
                    ));
                }
                continue;
            };
            let was = old.membership.get(pvid).ok_or_else(|| {
                SwitchError::protocol(
                    "reconcile",
                    format!(
                        "port {} has PVID {} but VLAN {} is not defined on the device",
                        port, pvid, pvid
                    ),
                )
            })?;
            if let Some(ports) = step2.get_mut(pvid) {
                ports.insert(*port, was[port]);
            }
            if to_remove.remove(pvid) {
                kept_vlans.insert(*pvid);
            }
        }

        // PVID moves, grouped by target VLAN
        let mut pvid_groups: BTreeMap<VlanId, Vec<PortId>> = BTreeMap::new();
        for (port, vid) in &new.pvids {
            if old.pvids.get(port) != Some(vid) {
                pvid_groups.entry(*vid).or_default().push(*port);
            }
        }

        // Emit, skipping writes that match what the device holds by then
        let mut device = old.membership;
        let mut ops = Vec::new();
        for vid in to_add {
            ops.push(PlanOp::AddVlan(vid));
            device.insert(vid, all_ignored(port_count));
        }
        push_membership_writes(&mut ops, &mut device, step1);
        for (vid, ports) in pvid_groups {
            ops.push(PlanOp::SetPvid { vid, ports });
        }
        push_membership_writes(&mut ops, &mut device, step2);
        if !to_remove.is_empty() {
            ops.push(PlanOp::DeleteVlans(to_remove.into_iter().collect()));
        }

        Ok(Self {
            ops,
            preserved_ports,
            kept_vlans,
        })
    }

    /// Operations in execution order.
    pub fn ops(&self) -> &[PlanOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Ports the desired state leaves alone.
    pub fn preserved_ports(&self) -> &BTreeSet<PortId> {
        &self.preserved_ports
    }

    /// VLANs missing from the desired state that stay because a preserved
    /// port uses them as PVID.
    pub fn kept_vlans(&self) -> &BTreeSet<VlanId> {
        &self.kept_vlans
    }
}

impl fmt::Display for ReconcilePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return writeln!(f, "nothing to do");
        }
        for (i, op) in self.ops.iter().enumerate() {
            writeln!(f, "{:>3}. {}", i + 1, op)?;
        }
        Ok(())
    }
}

fn push_membership_writes(
    ops: &mut Vec<PlanOp>,
    device: &mut VlanMembership,
    writes: VlanMembership,
) {
    for (vid, ports) in writes {
        if device.get(&vid) == Some(&ports) {
            continue;
        }
        device.insert(vid, ports.clone());
        ops.push(PlanOp::SetMembership { vid, ports });
    }
}

/// Rejects desired states no device could hold.
fn validate_desired(port_count: u8, desired: &SwitchState) -> SwitchResult<()> {
    for (vid, ports) in &desired.membership {
        validate_vlan_id(*vid)?;
        validate_ports(&ports.keys().copied().collect::<Vec<_>>(), port_count)?;
    }
    validate_ports(&desired.pvids.keys().copied().collect::<Vec<_>>(), port_count)?;

    for (port, vid) in &desired.pvids {
        if !desired.membership_of(*vid, *port).is_member() {
            return Err(SwitchError::validation(
                "pvids",
                format!("port {} has PVID {} but is not a member of VLAN {}", port, vid, vid),
            ));
        }
    }

    let members: BTreeSet<PortId> = desired
        .membership
        .values()
        .flat_map(|ports| ports.iter())
        .filter(|(_, m)| m.is_member())
        .map(|(p, _)| *p)
        .collect();
    if let Some(port) = members.iter().find(|p| !desired.pvids.contains_key(p)) {
        return Err(SwitchError::validation(
            "pvids",
            format!("port {} is a VLAN member but has no PVID", port),
        ));
    }
    Ok(())
}
