//! Page paths, form ids and constants of the GS116Ev2 web interface.
//!
//! Unlike the GS108Ev3, every page and form lives on a single `.html`
//! endpoint and state is embedded in JavaScript variables.

pub const LOGIN_PAGE: &str = "/login.html";
pub const INDEX_PAGE: &str = "/index.html";
pub const INFO_PAGE: &str = "/iss/specific/sysInfo.html";
pub const VLAN_CFG_PAGE: &str = "/iss/specific/dot1qConf.html";
pub const VLAN_MEMBERSHIP_PAGE: &str = "/iss/specific/dot1qMembership.html";
pub const PVID_PAGE: &str = "/iss/specific/dot1qPvid.html";

/// Key of the HMAC-MD5 applied to the padded password by the login script.
pub const HMAC_MD5_KEY: &str = "YOU_CAN_NOT_PASS";

/// Length the password is padded to before hashing.
pub const PASSWORD_BLOCK_LEN: usize = 2048;

/// File name part of a page path; form responses redirect back to it.
pub fn page_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_name() {
        assert_eq!(page_name(VLAN_CFG_PAGE), "dot1qConf.html");
        assert_eq!(page_name("index.html"), "index.html");
    }
}
