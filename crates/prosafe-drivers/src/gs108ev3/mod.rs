//! Driver for the NETGEAR GS108Ev3 (8 ports).
//!
//! The web UI authenticates with a salted MD5 of the password and protects
//! every form with a per-session `hash` value scraped from the pages.

mod consts;
mod kdf;
pub mod parse;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use prosafe_common::{
    all_ports, validate_membership, validate_ports, validate_vlan_id, PortId, PortMap,
    PvidAssignment, SessionState, SwitchDriver, SwitchError, SwitchInfo, SwitchModel,
    SwitchResult, VlanId, VlanMembership,
};

use crate::http::{excerpt, FormFields, SwitchSession};
use consts::*;

pub use kdf::password_kdf;

/// Renders a total membership map as the device's digit string.
pub fn membership_string(membership: &PortMap) -> String {
    membership.values().map(|m| m.as_digit()).collect()
}

/// GS108Ev3 web UI driver.
pub struct Gs108ev3 {
    http: SwitchSession,
    password: String,
    session: SessionState,
}

impl Gs108ev3 {
    /// Create a driver for the switch at `address`. No request is sent.
    pub fn new(address: &str, password: impl Into<String>, timeout: Duration) -> SwitchResult<Self> {
        Ok(Self {
            http: SwitchSession::new(address, timeout)?,
            password: password.into(),
            session: SessionState::LoggedOut,
        })
    }

    /// VLAN ids currently listed by the device, ascending.
    async fn current_vlans(&self, operation: &str) -> SwitchResult<Vec<VlanId>> {
        let page = self.http.get_text(VLAN_MEMBERSHIP_PAGE, operation).await?;
        Ok(parse::vlan_ids(&page)?.into_iter().collect())
    }

    async fn vlan_count(&self, operation: &str) -> SwitchResult<u32> {
        let page = self.http.get_text(VLAN_CFG_PAGE, operation).await?;
        parse::vlan_count(&page, operation)
    }

    async fn load_vlan(&self, vid: VlanId, token: &str) -> SwitchResult<PortMap> {
        let form: FormFields = crate::form! {
            "VLAN_ID" => vid,
            "hash" => token,
        };
        let page = self
            .http
            .post_form(VLAN_MEMBERSHIP_CGI, &form, "fetch_vlan_membership")
            .await?;
        parse::vlan_membership(&page, vid, self.port_count())
    }
}

#[async_trait]
impl SwitchDriver for Gs108ev3 {
    fn model(&self) -> SwitchModel {
        SwitchModel::Gs108ev3
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    #[instrument(skip(self), fields(switch = %self.http.base()))]
    async fn login(&mut self) -> SwitchResult<()> {
        let page = self.http.get_text(LOGIN_PAGE, "login").await?;
        let rand = parse::login_rand(&page)?;

        let form: FormFields = crate::form! {
            "password" => password_kdf(&self.password, &rand),
        };
        let response = self.http.post_form(LOGIN_CGI, &form, "login").await?;
        if let Some(msg) = parse::error_message(&response) {
            return Err(SwitchError::auth(format!("login error: {}", msg)));
        }
        if !response.contains(LOGIN_OK_MARKER) {
            return Err(SwitchError::auth("unable to login, no redirect to index page"));
        }

        let info = self.http.get_text(INFO_PAGE, "login").await?;
        let token = parse::session_hash(&info)
            .ok_or_else(|| SwitchError::auth("cannot get a valid session hash"))?;
        self.session = SessionState::LoggedIn { token };

        info!("Logged in");
        Ok(())
    }

    #[instrument(skip(self), fields(switch = %self.http.base()))]
    async fn logout(&mut self) {
        if !self.session.is_logged_in() {
            return;
        }
        self.session.clear();
        if let Err(e) = self.http.get_text(LOGOUT_CGI, "logout").await {
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
        let token = self.session.token("fetch_vlan_membership")?.to_string();
        let mut membership = VlanMembership::new();
        for vid in self.current_vlans("fetch_vlan_membership").await? {
            membership.insert(vid, self.load_vlan(vid, &token).await?);
        }
        debug!(vlans = membership.len(), "Fetched VLAN membership");
        Ok(membership)
    }

    #[instrument(skip(self))]
    async fn fetch_pvids(&mut self) -> SwitchResult<PvidAssignment> {
        self.session.require("fetch_pvids")?;
        let page = self.http.get_text(PVID_PAGE, "fetch_pvids").await?;
        let pvids = parse::pvids(&page)?;
        if !pvids.keys().copied().eq(all_ports(self.port_count())) {
            return Err(SwitchError::protocol(
                "fetch_pvids",
                format!(
                    "expected PVIDs for ports 1..={}, found ports {:?}",
                    self.port_count(),
                    pvids.keys().collect::<Vec<_>>()
                ),
            ));
        }
        Ok(pvids)
    }

    #[instrument(skip(self))]
    async fn add_vlan(&mut self, vid: VlanId) -> SwitchResult<()> {
        let token = self.session.token("add_vlan")?.to_string();
        validate_vlan_id(vid)?;

        let vlan_num = self.vlan_count("add_vlan").await?;
        let form: FormFields = crate::form! {
            "status" => "Enable",
            "hiddVlan" => "",
            "ADD_VLANID" => vid,
            "vlanNum" => vlan_num,
            "hash" => token,
            "ACTION" => "Add",
        };
        let response = self.http.post_form(VLAN_CFG_CGI, &form, "add_vlan").await?;
        parse::check_ack(&response, "add_vlan")?;

        info!("Added VLAN {}", vid);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_vlans(&mut self, vids: &[VlanId]) -> SwitchResult<()> {
        let token = self.session.token("delete_vlans")?.to_string();
        if vids.is_empty() {
            return Ok(());
        }

        // The form addresses VLANs by their position in the device's list,
        // so the list is read right before the delete.
        let vlan_num = self.vlan_count("delete_vlans").await?;
        let current = self.current_vlans("delete_vlans").await?;

        let mut form: FormFields = crate::form! {
            "status" => "Enable",
            "hiddVlan" => "",
            "ADD_VLANID" => "",
            "vlanNum" => vlan_num,
            "hash" => token,
            "ACTION" => "Delete",
        };
        for vid in vids {
            let index = current.iter().position(|v| v == vid).ok_or_else(|| {
                SwitchError::protocol(
                    "delete_vlans",
                    format!("VLAN {} not found in device VLAN list {:?}", vid, current),
                )
            })?;
            form.push((format!("vlanck{}", index), vid.to_string()));
        }

        let response = self.http.post_form(VLAN_CFG_CGI, &form, "delete_vlans").await?;
        parse::check_ack(&response, "delete_vlans")?;

        info!("Deleted VLANs {:?}", vids);
        Ok(())
    }

    #[instrument(skip(self, membership))]
    async fn set_vlan_membership(&mut self, vid: VlanId, membership: &PortMap) -> SwitchResult<()> {
        let token = self.session.token("set_vlan_membership")?.to_string();
        validate_membership(membership, self.port_count())?;

        let encoded = membership_string(membership);
        let form: FormFields = crate::form! {
            "VLAN_ID" => vid,
            "VLAN_ID_HD" => vid,
            "hash" => token,
            "hiddenMem" => encoded,
        };
        let response = self
            .http
            .post_form(VLAN_MEMBERSHIP_CGI, &form, "set_vlan_membership")
            .await?;
        parse::check_ack(&response, "set_vlan_membership")?;

        info!("Set VLAN {} membership to {}", vid, encoded);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_ports_pvid(&mut self, ports: &[PortId], vid: VlanId) -> SwitchResult<()> {
        let token = self.session.token("set_ports_pvid")?.to_string();
        validate_ports(ports, self.port_count())?;
        if ports.is_empty() {
            return Ok(());
        }

        let mut form: FormFields = crate::form! {
            "pvid" => vid,
            "hash" => token,
        };
        for port in ports {
            form.push((format!("port{}", port), "checked".to_string()));
        }
        let response = self.http.post_form(PVID_CGI, &form, "set_ports_pvid").await?;
        parse::check_ack(&response, "set_ports_pvid")?;

        info!("Set PVID {} on ports {:?}", vid, ports);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn backup(&mut self) -> SwitchResult<Vec<u8>> {
        self.session.require("backup")?;
        let config = self.http.get_bytes(BACKUP_BIN, "backup").await?;
        info!(bytes = config.len(), "Configuration backed up");
        Ok(config)
    }

    #[instrument(skip(self, config), fields(bytes = config.len()))]
    async fn restore(&mut self, config: &[u8]) -> SwitchResult<()> {
        let token = self.session.token("restore")?.to_string();

        let page = self.http.get_text(RESTORE_PAGE, "restore").await?;
        let limit = parse::config_size_limit(&page)?;
        if config.len() > limit {
            return Err(SwitchError::validation(
                "config",
                format!("configuration too large ({} > {} bytes)", config.len(), limit),
            ));
        }

        let form: FormFields = crate::form! { "hash" => token };
        let response = self
            .http
            .post_file(RESTORE_CGI, &form, RESTORE_FILE_FIELD, config.to_vec(), "restore")
            .await?;

        match parse::error_message(&response) {
            Some(msg) if !msg.is_empty() => Err(SwitchError::protocol("restore", msg)),
            Some(_) => Ok(()),
            None if response.contains(RESTORE_NOTICE) => {
                info!("Configuration uploaded, device is restarting; session ends");
                self.logout().await;
                Ok(())
            }
            None => Err(SwitchError::protocol(
                "restore",
                format!("unrecognised restore response: {}", excerpt(&response)),
            )),
        }
    }
}
