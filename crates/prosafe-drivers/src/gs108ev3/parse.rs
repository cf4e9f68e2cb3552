//! HTML scraping for GS108Ev3 pages.
//!
//! Every function takes a page body and returns owned data, so parsed
//! documents never live across an `.await`.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;

use prosafe_common::{
    PortId, PortMap, PortMembership, PvidAssignment, SwitchError, SwitchInfo, SwitchResult,
    VlanId,
};

use crate::http::excerpt;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

static RAND: Lazy<Selector> = Lazy::new(|| selector("#rand"));
static ERR_MSG: Lazy<Selector> = Lazy::new(|| selector("#err_msg"));
static HASH: Lazy<Selector> = Lazy::new(|| selector("input#hash"));
static VLAN_OPTIONS: Lazy<Selector> = Lazy::new(|| selector("select#vlanIdOption option"));
static VLAN_ID_HD: Lazy<Selector> = Lazy::new(|| selector("input[name=\"VLAN_ID_HD\"]"));
static HIDDEN_MEM: Lazy<Selector> = Lazy::new(|| selector("input#hiddenMem"));
static PORT_ROWS: Lazy<Selector> = Lazy::new(|| selector("tr.portID"));
static PVID_CELL: Lazy<Selector> = Lazy::new(|| selector("td.def[sel=\"input\"]"));
static HIDDEN_INPUT: Lazy<Selector> = Lazy::new(|| selector("input[type=\"hidden\"]"));
static VLAN_NUM: Lazy<Selector> = Lazy::new(|| selector("input[name=\"vlanNum\"]"));
static CONFIG_SIZE: Lazy<Selector> = Lazy::new(|| selector("#configSize"));
static TD: Lazy<Selector> = Lazy::new(|| selector("td"));

/// Editable fields on the info page: label -> input id.
const INFO_INPUTS: &[(&str, &str)] = &[("Switch Name", "switch_name"), ("DHCP Mode", "dhcp_mode")];

/// Read-only rows on the info page, rendered as `<td>label</td><td>value</td>`.
const INFO_ROWS: &[&str] = &[
    "Serial Number",
    "MAC Address",
    "Bootloader Version",
    "Firmware Version",
];

fn value_of(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(|v| v.to_string())
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str, operation: &str) -> SwitchResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| SwitchError::protocol(operation, format!("invalid {} '{}'", what, raw)))
}

/// Random number served with the login form.
pub fn login_rand(html: &str) -> SwitchResult<String> {
    let doc = Html::parse_document(html);
    value_of(&doc, &RAND).ok_or_else(|| {
        SwitchError::auth(format!(
            "cannot find the login random number in the login page: {}",
            excerpt(html)
        ))
    })
}

/// Error message field. `None` when the page has no such field.
pub fn error_message(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&ERR_MSG)
        .next()
        .map(|el| el.value().attr("value").unwrap_or_default().to_string())
}

/// Checks the acknowledgement of a mutating form.
///
/// The response must carry the error field and it must be empty.
pub fn check_ack(html: &str, operation: &str) -> SwitchResult<()> {
    match error_message(html) {
        Some(msg) if msg.is_empty() => Ok(()),
        Some(msg) => Err(SwitchError::protocol(operation, msg)),
        None => Err(SwitchError::protocol(
            operation,
            format!("response carries no status field: {}", excerpt(html)),
        )),
    }
}

/// Anti-forgery hash embedded in most pages once logged in.
pub fn session_hash(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    value_of(&doc, &HASH)
}

/// VLAN ids listed in the membership page selector.
pub fn vlan_ids(html: &str) -> SwitchResult<BTreeSet<VlanId>> {
    let doc = Html::parse_document(html);
    let mut vids = BTreeSet::new();
    for option in doc.select(&VLAN_OPTIONS) {
        if let Some(value) = option.value().attr("value") {
            vids.insert(parse_number(value, "VLAN id", "fetch_vlan_membership")?);
        }
    }
    Ok(vids)
}

/// Membership of one VLAN from the membership page posted for `vid`.
pub fn vlan_membership(html: &str, vid: VlanId, port_count: u8) -> SwitchResult<PortMap> {
    const OP: &str = "fetch_vlan_membership";
    let doc = Html::parse_document(html);

    let shown = value_of(&doc, &VLAN_ID_HD).unwrap_or_default();
    if shown != vid.to_string() {
        return Err(SwitchError::protocol(
            OP,
            format!("requested VLAN {} but the device returned VLAN '{}'", vid, shown),
        ));
    }

    // "12122223": one digit per port, port 1 first
    let encoded = value_of(&doc, &HIDDEN_MEM).ok_or_else(|| {
        SwitchError::protocol(OP, format!("no membership field for VLAN {}", vid))
    })?;
    if encoded.chars().count() != port_count as usize {
        return Err(SwitchError::protocol(
            OP,
            format!(
                "VLAN {} membership '{}' does not cover {} ports",
                vid, encoded, port_count
            ),
        ));
    }

    encoded
        .chars()
        .zip(1..=port_count)
        .map(|(c, port)| {
            PortMembership::from_digit(c)
                .map(|m| (port, m))
                .ok_or_else(|| {
                    SwitchError::protocol(OP, format!("unknown membership digit '{}'", c))
                })
        })
        .collect()
}

/// PVID of each port from the PVID page.
pub fn pvids(html: &str) -> SwitchResult<PvidAssignment> {
    const OP: &str = "fetch_pvids";
    let doc = Html::parse_document(html);
    let mut pvids = PvidAssignment::new();
    for row in doc.select(&PORT_ROWS) {
        let pvid = row
            .select(&PVID_CELL)
            .next()
            .map(text_of)
            .ok_or_else(|| SwitchError::protocol(OP, "port row without a PVID cell"))?;
        let port = row
            .select(&HIDDEN_INPUT)
            .next()
            .and_then(|el| el.value().attr("value"))
            .ok_or_else(|| SwitchError::protocol(OP, "port row without a port id"))?;
        let port: PortId = parse_number(port, "port id", OP)?;
        pvids.insert(port, parse_number(&pvid, "PVID", OP)?);
    }
    Ok(pvids)
}

/// Number of VLANs the device reports on the 802.1Q configuration page.
pub fn vlan_count(html: &str, operation: &str) -> SwitchResult<u32> {
    let doc = Html::parse_document(html);
    let raw = value_of(&doc, &VLAN_NUM)
        .ok_or_else(|| SwitchError::protocol(operation, "no VLAN count on 802.1Q page"))?;
    parse_number(&raw, "VLAN count", operation)
}

/// Largest configuration blob the restore form accepts.
pub fn config_size_limit(html: &str) -> SwitchResult<usize> {
    let doc = Html::parse_document(html);
    let raw = value_of(&doc, &CONFIG_SIZE)
        .ok_or_else(|| SwitchError::protocol("restore", "no size limit on restore page"))?;
    parse_number(&raw, "configuration size limit", "restore")
}

/// Switch properties from the info page.
pub fn switch_info(html: &str) -> SwitchInfo {
    let doc = Html::parse_document(html);
    let mut info = SwitchInfo::new();

    for (label, id) in INFO_INPUTS {
        let sel = selector(&format!("input#{}", id));
        let value = value_of(&doc, &sel).unwrap_or_else(|| "not found".to_string());
        info.insert(label.to_string(), value);
    }

    let cells: Vec<ElementRef<'_>> = doc.select(&TD).collect();
    for label in INFO_ROWS {
        let value = cells
            .iter()
            .position(|cell| text_of(*cell) == *label)
            .and_then(|idx| cells.get(idx + 1))
            .map(|cell| text_of(*cell))
            .unwrap_or_else(|| "not found".to_string());
        info.insert(label.to_string(), value);
    }

    info
}
