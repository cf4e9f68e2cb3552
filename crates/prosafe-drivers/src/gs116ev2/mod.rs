//! Driver for the NETGEAR GS116Ev2 (16 ports).
//!
//! Forms are tagged with a `submitId` and protected by the `secureRand`
//! token published on the index page. A successful form post answers with a
//! redirect script pointing back at the page that was edited, which is the
//! only acknowledgement the firmware gives.

mod consts;
mod kdf;
pub mod parse;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use prosafe_common::{
    validate_membership, validate_ports, validate_vlan_id, PortId, PortMap, PortMembership,
    PvidAssignment, SessionState, SwitchDriver, SwitchError, SwitchInfo, SwitchModel,
    SwitchResult, VlanId, VlanMembership,
};

use crate::http::{excerpt, FormFields, SwitchSession};
use consts::*;

pub use kdf::password_kdf;

/// GS116Ev2 web UI driver.
///
/// Configuration backup and restore are not offered by this firmware.
pub struct Gs116ev2 {
    http: SwitchSession,
    password: String,
    session: SessionState,
}

impl Gs116ev2 {
    /// Create a driver for the switch at `address`. No request is sent.
    pub fn new(address: &str, password: impl Into<String>, timeout: Duration) -> SwitchResult<Self> {
        Ok(Self {
            http: SwitchSession::new(address, timeout)?,
            password: password.into(),
            session: SessionState::LoggedOut,
        })
    }

    /// Fails unless `response` redirects back to `expect`.
    fn check_redirect(response: &str, expect: &str, operation: &str) -> SwitchResult<()> {
        if response.contains(expect) {
            Ok(())
        } else {
            Err(SwitchError::protocol(
                operation,
                format!("device did not acknowledge the change: {}", excerpt(response)),
            ))
        }
    }

    async fn vlan_page(&self, operation: &str) -> SwitchResult<String> {
        self.http.get_text(VLAN_CFG_PAGE, operation).await
    }
}

#[async_trait]
impl SwitchDriver for Gs116ev2 {
    fn model(&self) -> SwitchModel {
        SwitchModel::Gs116ev2
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    #[instrument(skip(self), fields(switch = %self.http.base()))]
    async fn login(&mut self) -> SwitchResult<()> {
        // Fetch the login page first so the device issues its session cookie
        self.http.get_text(LOGIN_PAGE, "login").await?;

        let form: FormFields = crate::form! {
            "submitId" => "pwdLogin",
            "password" => password_kdf(&self.password),
            "submitEnd" => "",
        };
        let response = self.http.post_form(LOGIN_PAGE, &form, "login").await?;
        if !response.contains(&format!("{}?0", page_name(INDEX_PAGE))) {
            return Err(SwitchError::auth("login failed, check your password"));
        }

        let index = self.http.get_text(INDEX_PAGE, "login").await?;
        let token = parse::secure_rand(&index)
            .ok_or_else(|| SwitchError::auth("secure rand missing from index page"))?;
        self.session = SessionState::LoggedIn { token };

        info!("Logged in");
        Ok(())
    }

    #[instrument(skip(self), fields(switch = %self.http.base()))]
    async fn logout(&mut self) {
        let token = match self.session.token("logout") {
            Ok(token) => token.to_string(),
            Err(_) => return,
        };
        self.session.clear();

        let form: FormFields = crate::form! {
            "submitId" => "logoutBtn",
            "secureRand" => token,
            "submitEnd" => "",
        };
        if let Err(e) = self.http.post_form(INDEX_PAGE, &form, "logout").await {
            warn!("Logout request failed: {}", e);
        }
        info!("Logged out");
    }

    async fn fetch_information(&mut self) -> SwitchResult<SwitchInfo> {
        self.session.require("fetch_information")?;
        let page = self.http.get_text(INFO_PAGE, "fetch_information").await?;
        Ok(parse::switch_info(&page))
    }

    #[instrument(skip(self))]
    async fn fetch_vlan_membership(&mut self) -> SwitchResult<VlanMembership> {
        self.session.require("fetch_vlan_membership")?;
        let page = self.vlan_page("fetch_vlan_membership").await?;
        let membership = parse::vlan_membership(&page, self.port_count())?;
        debug!(vlans = membership.len(), "Fetched VLAN membership");
        Ok(membership)
    }

    #[instrument(skip(self))]
    async fn fetch_pvids(&mut self) -> SwitchResult<PvidAssignment> {
        self.session.require("fetch_pvids")?;
        let page = self.vlan_page("fetch_pvids").await?;
        parse::pvids(&page, self.port_count())
    }

    #[instrument(skip(self))]
    async fn add_vlan(&mut self, vid: VlanId) -> SwitchResult<()> {
        let token = self.session.token("add_vlan")?.to_string();
        validate_vlan_id(vid)?;

        let form: FormFields = crate::form! {
            "submitId" => "vlanDot1VidCfg",
            "secureRand" => token,
            "addVid" => vid,
            "submitEnd" => "",
        };
        let response = self.http.post_form(VLAN_CFG_PAGE, &form, "add_vlan").await?;
        Self::check_redirect(&response, page_name(VLAN_CFG_PAGE), "add_vlan")?;

        info!("Added VLAN {}", vid);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_vlans(&mut self, vids: &[VlanId]) -> SwitchResult<()> {
        let token = self.session.token("delete_vlans")?.to_string();
        if vids.is_empty() {
            return Ok(());
        }

        let page = self.vlan_page("delete_vlans").await?;
        let current = parse::vlan_membership(&page, self.port_count())?;

        let mut form: FormFields = crate::form! {
            "submitId" => "vlanDot1VidCfg",
            "secureRand" => token,
        };
        for vid in vids {
            if !current.contains_key(vid) {
                return Err(SwitchError::protocol(
                    "delete_vlans",
                    format!(
                        "VLAN {} not found in device VLAN list {:?}",
                        vid,
                        current.keys().collect::<Vec<_>>()
                    ),
                ));
            }
            form.push(("delVid".to_string(), vid.to_string()));
        }
        form.push(("submitEnd".to_string(), String::new()));

        let response = self.http.post_form(VLAN_CFG_PAGE, &form, "delete_vlans").await?;
        Self::check_redirect(&response, page_name(VLAN_CFG_PAGE), "delete_vlans")?;

        info!("Deleted VLANs {:?}", vids);
        Ok(())
    }

    #[instrument(skip(self, membership))]
    async fn set_vlan_membership(&mut self, vid: VlanId, membership: &PortMap) -> SwitchResult<()> {
        let token = self.session.token("set_vlan_membership")?.to_string();
        validate_membership(membership, self.port_count())?;

        let members: Vec<PortId> = membership
            .iter()
            .filter(|(_, m)| m.is_member())
            .map(|(p, _)| *p)
            .collect();
        let tagged: Vec<PortId> = membership
            .iter()
            .filter(|(_, m)| **m == PortMembership::Tagged)
            .map(|(p, _)| *p)
            .collect();

        let form: FormFields = crate::form! {
            "submitId" => "vlanDot1TagCfg",
            "secureRand" => token,
            "vid" => vid,
            "member" => parse::port_mask(&members),
            "tag" => parse::port_mask(&tagged),
            "submitEnd" => "",
        };
        let response = self
            .http
            .post_form(VLAN_MEMBERSHIP_PAGE, &form, "set_vlan_membership")
            .await?;
        // Success redirects to the membership page showing this VLAN
        let expect = format!("{}?{}", page_name(VLAN_MEMBERSHIP_PAGE), vid);
        Self::check_redirect(&response, &expect, "set_vlan_membership")?;

        info!("Set VLAN {} membership (members {:?}, tagged {:?})", vid, members, tagged);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_ports_pvid(&mut self, ports: &[PortId], vid: VlanId) -> SwitchResult<()> {
        let token = self.session.token("set_ports_pvid")?.to_string();
        validate_ports(ports, self.port_count())?;
        if ports.is_empty() {
            return Ok(());
        }

        // Repeated port/pvid pairs; order matters to the firmware
        let mut form: FormFields = crate::form! {
            "submitId" => "vlanDot1PvidCfg",
            "secureRand" => token,
        };
        for port in ports {
            form.push(("port".to_string(), port.to_string()));
            form.push(("pvid".to_string(), vid.to_string()));
        }
        form.push(("submitEnd".to_string(), String::new()));

        let response = self.http.post_form(PVID_PAGE, &form, "set_ports_pvid").await?;
        Self::check_redirect(&response, page_name(PVID_PAGE), "set_ports_pvid")?;

        info!("Set PVID {} on ports {:?}", vid, ports);
        Ok(())
    }

    async fn backup(&mut self) -> SwitchResult<Vec<u8>> {
        self.session.require("backup")?;
        Err(SwitchError::unsupported("backup", self.model()))
    }

    async fn restore(&mut self, _config: &[u8]) -> SwitchResult<()> {
        self.session.require("restore")?;
        Err(SwitchError::unsupported("restore", self.model()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged_in() -> Gs116ev2 {
        let mut sw = Gs116ev2::new("127.0.0.1:9", "password", Duration::from_secs(1)).unwrap();
        sw.session = SessionState::LoggedIn {
            token: "9F3A77B2".to_string(),
        };
        sw
    }

    #[test]
    fn test_check_redirect() {
        let ok = "<script>location.href='dot1qConf.html';</script>";
        assert!(Gs116ev2::check_redirect(ok, "dot1qConf.html", "add_vlan").is_ok());
        assert!(Gs116ev2::check_redirect("<p>error</p>", "dot1qConf.html", "add_vlan").is_err());
    }

    #[tokio::test]
    async fn test_backup_unsupported() {
        let mut sw = logged_in();
        assert!(matches!(
            sw.backup().await,
            Err(SwitchError::Unsupported { .. })
        ));
        assert!(matches!(
            sw.restore(b"cfg").await,
            Err(SwitchError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_requires_login() {
        let mut sw = Gs116ev2::new("127.0.0.1:9", "password", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            sw.fetch_vlan_membership().await,
            Err(SwitchError::NotLoggedIn { .. })
        ));
        assert!(matches!(
            sw.backup().await,
            Err(SwitchError::NotLoggedIn { .. })
        ));
    }

    #[tokio::test]
    async fn test_partial_membership_rejected() {
        let mut sw = logged_in();
        let partial: PortMap = [(1, PortMembership::Untagged)].into_iter().collect();
        assert!(matches!(
            sw.set_vlan_membership(10, &partial).await,
            Err(SwitchError::Validation { .. })
        ));
    }
}
