//! Page paths and form ids of the GS108Ev3 web interface.
//!
//! Latest firmware requires GETs against `.htm` pages and POSTs against the
//! matching `.cgi` endpoint; older firmware accepts either.

pub const LOGIN_PAGE: &str = "/login.htm";
pub const LOGIN_CGI: &str = "/login.cgi";
pub const LOGOUT_CGI: &str = "/logout.cgi";

pub const INFO_PAGE: &str = "/switch_info.htm";

pub const VLAN_CFG_PAGE: &str = "/8021qCf.htm";
pub const VLAN_CFG_CGI: &str = "/8021qCf.cgi";
pub const VLAN_MEMBERSHIP_PAGE: &str = "/8021qMembe.htm";
pub const VLAN_MEMBERSHIP_CGI: &str = "/8021qMembe.cgi";
pub const PVID_PAGE: &str = "/portPVID.htm";
pub const PVID_CGI: &str = "/portPVID.cgi";

pub const BACKUP_BIN: &str = "/config_data.bin";
pub const RESTORE_PAGE: &str = "/restore_conf.htm";
pub const RESTORE_CGI: &str = "/restore_conf.cgi";

/// Multipart field (and file name) the restore form expects.
pub const RESTORE_FILE_FIELD: &str = "backup.cfg";

/// Shown once an uploaded configuration is accepted; the device reboots.
pub const RESTORE_NOTICE: &str = "The device is restarting. Wait until the process is complete.";

/// Marker of a successful login response.
pub const LOGIN_OK_MARKER: &str = "top.location.href = \"index.htm\";";
