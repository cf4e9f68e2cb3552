//! Type definitions shared by drivers and the reconciliation engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 802.1Q VLAN identifier.
pub type VlanId = u16;

/// Physical port number, `1..=port_count`.
pub type PortId = u8;

/// Highest VLAN id a switch accepts.
pub const MAX_VLAN_ID: VlanId = 4094;

/// Membership of one port in one VLAN.
///
/// Variants are declared from most to least connected and the derived
/// ordering relies on it: `Untagged < Tagged < Ignored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortMembership {
    /// Frames leave the port without a tag.
    Untagged,
    /// Frames carry the VLAN tag.
    Tagged,
    /// Port is not a member.
    Ignored,
}

impl PortMembership {
    /// Digit used by the gs108ev3 membership string ("12133333").
    pub fn as_digit(&self) -> char {
        match self {
            PortMembership::Untagged => '1',
            PortMembership::Tagged => '2',
            PortMembership::Ignored => '3',
        }
    }

    /// Parse a gs108ev3 membership digit.
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '1' => Some(PortMembership::Untagged),
            '2' => Some(PortMembership::Tagged),
            '3' => Some(PortMembership::Ignored),
            _ => None,
        }
    }

    /// Status letter used in configuration tokens ("10U").
    pub fn as_token(&self) -> char {
        match self {
            PortMembership::Untagged => 'U',
            PortMembership::Tagged => 'T',
            PortMembership::Ignored => 'N',
        }
    }

    /// Parse a configuration status letter.
    pub fn from_token(c: char) -> Option<Self> {
        match c {
            'U' => Some(PortMembership::Untagged),
            'T' => Some(PortMembership::Tagged),
            'N' => Some(PortMembership::Ignored),
            _ => None,
        }
    }

    /// True unless the port is `Ignored`.
    pub fn is_member(&self) -> bool {
        !matches!(self, PortMembership::Ignored)
    }
}

impl fmt::Display for PortMembership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

/// Membership of every port in a single VLAN.
pub type PortMap = BTreeMap<PortId, PortMembership>;

/// Membership of every VLAN defined on a switch.
pub type VlanMembership = BTreeMap<VlanId, PortMap>;

/// PVID of each port.
pub type PvidAssignment = BTreeMap<PortId, VlanId>;

/// Descriptive device properties (name, firmware, serial number...).
pub type SwitchInfo = BTreeMap<String, String>;

/// Iterate over every port of a switch with `port_count` ports.
pub fn all_ports(port_count: u8) -> impl Iterator<Item = PortId> {
    1..=port_count
}

/// A port map with every port `Ignored`.
pub fn all_ignored(port_count: u8) -> PortMap {
    all_ports(port_count)
        .map(|p| (p, PortMembership::Ignored))
        .collect()
}

/// Fill every port missing from `map` with `Ignored`.
pub fn materialize_port_map(map: &PortMap, port_count: u8) -> PortMap {
    all_ports(port_count)
        .map(|p| (p, map.get(&p).copied().unwrap_or(PortMembership::Ignored)))
        .collect()
}

/// Render a port map compactly, e.g. `1:U 2:T` (ignored ports omitted).
pub fn format_port_map(map: &PortMap) -> String {
    let members: Vec<String> = map
        .iter()
        .filter(|(_, m)| m.is_member())
        .map(|(p, m)| format!("{}:{}", p, m))
        .collect();
    if members.is_empty() {
        "-".to_string()
    } else {
        members.join(" ")
    }
}

/// VLAN membership plus PVIDs; used for both the live and the target state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    /// VLAN id -> port -> membership
    pub membership: VlanMembership,
    /// Port -> PVID
    pub pvids: PvidAssignment,
}

impl SwitchState {
    /// Create a new SwitchState
    pub fn new(membership: VlanMembership, pvids: PvidAssignment) -> Self {
        Self { membership, pvids }
    }

    /// Returns a copy where every VLAN covers all ports `1..=port_count`.
    pub fn materialized(&self, port_count: u8) -> Self {
        let membership = self
            .membership
            .iter()
            .map(|(vid, ports)| (*vid, materialize_port_map(ports, port_count)))
            .collect();
        Self {
            membership,
            pvids: self.pvids.clone(),
        }
    }

    /// Membership of `port` in `vid`, `Ignored` when either is unknown.
    pub fn membership_of(&self, vid: VlanId, port: PortId) -> PortMembership {
        self.membership
            .get(&vid)
            .and_then(|ports| ports.get(&port))
            .copied()
            .unwrap_or(PortMembership::Ignored)
    }

    /// VLANs `port` is a member of, tagged or untagged.
    pub fn vlans_of(&self, port: PortId) -> impl Iterator<Item = VlanId> + '_ {
        self.membership
            .iter()
            .filter(move |(_, ports)| ports.get(&port).is_some_and(|m| m.is_member()))
            .map(|(vid, _)| *vid)
    }
}

/// Supported switch models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchModel {
    /// GS108Ev3, 8 ports
    Gs108ev3,
    /// GS116Ev2, 16 ports
    Gs116ev2,
}

impl SwitchModel {
    /// Number of front panel ports.
    pub fn port_count(&self) -> u8 {
        match self {
            SwitchModel::Gs108ev3 => 8,
            SwitchModel::Gs116ev2 => 16,
        }
    }

    /// Model selector as written in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchModel::Gs108ev3 => "gs108ev3",
            SwitchModel::Gs116ev2 => "gs116ev2",
        }
    }
}

impl fmt::Display for SwitchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwitchModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gs108ev3" => Ok(SwitchModel::Gs108ev3),
            "gs116ev2" => Ok(SwitchModel::Gs116ev2),
            other => Err(format!(
                "unknown switch model '{}', expected gs108ev3 or gs116ev2",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_membership_order() {
        assert!(PortMembership::Untagged < PortMembership::Tagged);
        assert!(PortMembership::Tagged < PortMembership::Ignored);
        assert_eq!(
            PortMembership::Ignored.min(PortMembership::Untagged),
            PortMembership::Untagged
        );
    }

    #[test]
    fn test_membership_digits() {
        assert_eq!(PortMembership::Untagged.as_digit(), '1');
        assert_eq!(PortMembership::from_digit('2'), Some(PortMembership::Tagged));
        assert_eq!(PortMembership::from_digit('3'), Some(PortMembership::Ignored));
        assert_eq!(PortMembership::from_digit('4'), None);
    }

    #[test]
    fn test_membership_tokens() {
        assert_eq!(PortMembership::from_token('U'), Some(PortMembership::Untagged));
        assert_eq!(PortMembership::from_token('N'), Some(PortMembership::Ignored));
        assert_eq!(PortMembership::from_token('u'), None);
        assert_eq!(PortMembership::Tagged.to_string(), "T");
    }

    #[test]
    fn test_materialize_port_map() {
        let partial: PortMap = [(2, PortMembership::Tagged)].into_iter().collect();
        let full = materialize_port_map(&partial, 4);
        assert_eq!(full.len(), 4);
        assert_eq!(full[&1], PortMembership::Ignored);
        assert_eq!(full[&2], PortMembership::Tagged);
    }

    #[test]
    fn test_switch_state_materialized() {
        let mut membership = VlanMembership::new();
        membership.insert(10, [(1, PortMembership::Untagged)].into_iter().collect());
        let state = SwitchState::new(membership, PvidAssignment::new()).materialized(8);
        assert_eq!(state.membership[&10].len(), 8);
        assert_eq!(state.membership_of(10, 1), PortMembership::Untagged);
        assert_eq!(state.membership_of(10, 8), PortMembership::Ignored);
        assert_eq!(state.membership_of(99, 1), PortMembership::Ignored);
    }

    #[test]
    fn test_vlans_of() {
        let mut membership = VlanMembership::new();
        membership.insert(1, [(1, PortMembership::Untagged)].into_iter().collect());
        membership.insert(20, [(1, PortMembership::Tagged)].into_iter().collect());
        let state = SwitchState::new(membership, PvidAssignment::new()).materialized(4);
        assert_eq!(state.vlans_of(1).collect::<Vec<_>>(), vec![1, 20]);
        assert_eq!(state.vlans_of(3).count(), 0);
    }

    #[test]
    fn test_format_port_map() {
        let map: PortMap = [
            (1, PortMembership::Untagged),
            (2, PortMembership::Ignored),
            (3, PortMembership::Tagged),
        ]
        .into_iter()
        .collect();
        assert_eq!(format_port_map(&map), "1:U 3:T");
        assert_eq!(format_port_map(&all_ignored(3)), "-");
    }

    #[test]
    fn test_switch_model() {
        assert_eq!(SwitchModel::Gs108ev3.port_count(), 8);
        assert_eq!(SwitchModel::Gs116ev2.port_count(), 16);
        assert_eq!("GS116Ev2".parse::<SwitchModel>(), Ok(SwitchModel::Gs116ev2));
        assert!("gs105e".parse::<SwitchModel>().is_err());
    }
}
