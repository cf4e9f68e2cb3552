//! Extraction of the JavaScript state embedded in GS116Ev2 pages.

use once_cell::sync::Lazy;
use regex::Regex;

use prosafe_common::{
    all_ignored, PortMembership, PvidAssignment, SwitchError, SwitchInfo, SwitchResult, VlanId,
    VlanMembership,
};

use crate::http::excerpt;

static SECURE_RAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var secureRand = '([A-Za-z0-9]+)';").expect("Invalid regex pattern"));
static GENERAL_INFO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"var sysGeneInfor = '([A-Za-z0-9.?:\- ]+)';").expect("Invalid regex pattern")
});
static VLAN_MEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var vlanMem = '([TU0-9,?]+)';").expect("Invalid regex pattern"));
static PVID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var pvid = '([0-9?]+)';").expect("Invalid regex pattern"));

/// Field order of `sysGeneInfor`, separated by `?`.
const INFO_FIELDS: &[&str] = &[
    "Product Name",
    "Switch Name",
    "MAC Address",
    "Firmware Version",
    "DHCP Mode",
    "IP Address",
    "Subnet Mask",
    "Gateway Address",
    "Serial Number",
];

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn parse_vid(raw: &str, operation: &str) -> SwitchResult<VlanId> {
    raw.parse()
        .map_err(|_| SwitchError::protocol(operation, format!("invalid VLAN id '{}'", raw)))
}

/// Session token set by the index page after login.
pub fn secure_rand(html: &str) -> Option<String> {
    capture(&SECURE_RAND_RE, html).map(|s| s.to_string())
}

/// Switch properties; empty when the page carries no info variable.
pub fn switch_info(html: &str) -> SwitchInfo {
    let Some(raw) = capture(&GENERAL_INFO_RE, html) else {
        return SwitchInfo::new();
    };
    INFO_FIELDS
        .iter()
        .zip(raw.split('?'))
        .map(|(label, value)| (label.to_string(), value.to_string()))
        .collect()
}

/// VLAN ids and membership from `vlanMem`.
///
/// Format: comma separated groups `vid?p1?p2?...`, each port entry being
/// `U`, `T` or empty for non-members.
pub fn vlan_membership(html: &str, port_count: u8) -> SwitchResult<VlanMembership> {
    const OP: &str = "fetch_vlan_membership";
    let raw = capture(&VLAN_MEM_RE, html).ok_or_else(|| {
        SwitchError::protocol(
            OP,
            format!("no VLAN information found: {}", excerpt(html)),
        )
    })?;

    let mut membership = VlanMembership::new();
    for group in raw.split(',') {
        let mut fields = group.split('?');
        let vid = parse_vid(fields.next().unwrap_or_default(), OP)?;
        let fields: Vec<&str> = fields.collect();
        // A bare vid is a VLAN without members
        if !fields.is_empty() && fields.len() != port_count as usize {
            return Err(SwitchError::protocol(
                OP,
                format!(
                    "VLAN {} lists {} ports, expected {}",
                    vid,
                    fields.len(),
                    port_count
                ),
            ));
        }
        let ports = membership
            .entry(vid)
            .or_insert_with(|| all_ignored(port_count));

        for (port, status) in (1..=port_count).zip(fields) {
            let status = match status {
                "U" => PortMembership::Untagged,
                "T" => PortMembership::Tagged,
                "" => PortMembership::Ignored,
                other => {
                    return Err(SwitchError::protocol(
                        OP,
                        format!("VLAN {} port {} has unknown status '{}'", vid, port, other),
                    ))
                }
            };
            ports.insert(port, status);
        }
    }
    Ok(membership)
}

/// PVID of every port from `pvid`, `?` separated, port 1 first.
pub fn pvids(html: &str, port_count: u8) -> SwitchResult<PvidAssignment> {
    const OP: &str = "fetch_pvids";
    let raw = capture(&PVID_RE, html).ok_or_else(|| {
        SwitchError::protocol(OP, format!("no PVID information found: {}", excerpt(html)))
    })?;

    let values: Vec<&str> = raw.split('?').collect();
    if values.len() != port_count as usize {
        return Err(SwitchError::protocol(
            OP,
            format!("expected {} PVIDs, found {}", port_count, values.len()),
        ));
    }

    (1..=port_count)
        .zip(values)
        .map(|(port, raw)| parse_vid(raw, OP).map(|vid| (port, vid)))
        .collect()
}

/// Bit mask with bit `port` set for every port in `ports` (bit 0 unused).
pub fn port_mask<'a>(ports: impl IntoIterator<Item = &'a u8>) -> u32 {
    ports.into_iter().fold(0, |mask, port| mask | (1u32 << port))
}
