//! Test fixtures for switch states
//!
//! Port maps are written the way the tools print them, `"1:U 2:T"`, with
//! unlisted ports left out (they materialize to `Ignored`).

use prosafe_common::{
    all_ports, PortId, PortMap, PortMembership, PvidAssignment, SwitchState, VlanId,
    VlanMembership,
};

/// Parse `"1:U 2:T 5:N"` into a port map. `"-"` or `""` is empty.
///
/// Panics on malformed input.
pub fn port_map(spec: &str) -> PortMap {
    spec.split_whitespace()
        .filter(|entry| *entry != "-")
        .map(|entry| {
            let (port, status) = entry
                .split_once(':')
                .unwrap_or_else(|| panic!("bad port map entry '{}'", entry));
            let port: PortId = port
                .parse()
                .unwrap_or_else(|_| panic!("bad port in '{}'", entry));
            let status = status
                .chars()
                .next()
                .and_then(PortMembership::from_token)
                .unwrap_or_else(|| panic!("bad status in '{}'", entry));
            (port, status)
        })
        .collect()
}

/// Build a membership table from `(vid, port map spec)` pairs.
pub fn membership(vlans: &[(VlanId, &str)]) -> VlanMembership {
    vlans
        .iter()
        .map(|(vid, spec)| (*vid, port_map(spec)))
        .collect()
}

/// Build a PVID table from `(port, vid)` pairs.
pub fn pvids(entries: &[(PortId, VlanId)]) -> PvidAssignment {
    entries.iter().copied().collect()
}

/// Shorthand for a state built from the two tables above.
pub fn state(vlans: &[(VlanId, &str)], pvid_entries: &[(PortId, VlanId)]) -> SwitchState {
    SwitchState::new(membership(vlans), pvids(pvid_entries))
}

/// Out-of-the-box switch: every port untagged in VLAN 1 with PVID 1.
pub fn factory_default(port_count: u8) -> SwitchState {
    let ports: PortMap = all_ports(port_count)
        .map(|p| (p, PortMembership::Untagged))
        .collect();
    let pvids = all_ports(port_count).map(|p| (p, 1)).collect();
    SwitchState::new([(1, ports)].into_iter().collect(), pvids)
}

/// Ready-made `(current, desired)` pairs.
pub mod scenarios {
    use super::*;

    /// Port 2 moves from VLAN 10 to a new VLAN 20; port 1 stays on 10.
    pub fn move_port_to_new_vlan() -> (SwitchState, SwitchState) {
        let current = state(&[(10, "1:U 2:U")], &[(1, 10), (2, 10)]);
        let desired = state(&[(10, "1:U"), (20, "2:U")], &[(1, 10), (2, 20)]);
        (current, desired)
    }

    /// Port 3 is never mentioned by the desired state and keeps its
    /// PVID 99, a VLAN the desired state drops.
    pub fn unmanaged_port_on_dropped_vlan() -> (SwitchState, SwitchState) {
        let current = state(
            &[(1, "1:U 2:U"), (99, "3:U")],
            &[(1, 1), (2, 1), (3, 99)],
        );
        let desired = state(&[(1, "1:U 2:U")], &[(1, 1), (2, 1)]);
        (current, desired)
    }

    /// Factory default 8-port switch split into a trunk, two access VLANs
    /// and an untouched remainder.
    pub fn office_split() -> (SwitchState, SwitchState) {
        let current = factory_default(8);
        let desired = state(
            &[
                (1, "1:U 2:N 3:N 4:N"),
                (10, "1:T 2:U 3:U"),
                (20, "1:T 4:U"),
            ],
            &[(1, 1), (2, 10), (3, 10), (4, 20)],
        );
        (current, desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_port_map() {
        let map = port_map("1:U 3:T 4:N");
        assert_eq!(map.len(), 3);
        assert_eq!(map[&1], PortMembership::Untagged);
        assert_eq!(map[&3], PortMembership::Tagged);
        assert_eq!(map[&4], PortMembership::Ignored);
        assert!(port_map("-").is_empty());
    }

    #[test]
    #[should_panic(expected = "bad status")]
    fn test_port_map_rejects_bad_status() {
        port_map("1:X");
    }

    #[test]
    fn test_factory_default() {
        let s = factory_default(8);
        assert_eq!(s.membership[&1].len(), 8);
        assert_eq!(s.pvids.len(), 8);
        assert!(s.pvids.values().all(|v| *v == 1));
    }
}
