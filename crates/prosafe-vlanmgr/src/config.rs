//! Desired-state configuration file
//!
//! ```toml
//! [options]
//! continue_on_error = false
//! timeout_secs = 30
//!
//! [switches.office]
//! address = "192.168.0.239"
//! password = "secret"
//! model = "gs108ev3"
//!
//! [switches.office.ports.1]
//! pvid = 1
//! vlans = ["1U", "10T"]
//! ```
//!
//! Each entry of `vlans` is a VLAN id followed by `U` (untagged), `T`
//! (tagged) or `N` (not a member). Ports left out of `ports` are not managed.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use prosafe_common::{
    all_ignored, PortId, PortMembership, PvidAssignment, SwitchModel, SwitchState, VlanId,
    VlanMembership, MAX_VLAN_ID,
};

/// Errors raised while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config, please specify your switches under [switches]")]
    MissingSwitches,

    #[error("Invalid option {option}: {message}")]
    InvalidOption { option: String, message: String },

    #[error("Switch '{switch}': {message}")]
    Switch { switch: String, message: String },

    #[error("Switch '{switch}' port {port}: {message}")]
    Port {
        switch: String,
        port: String,
        message: String,
    },
}

impl ConfigError {
    fn switch(switch: &str, message: impl Into<String>) -> Self {
        Self::Switch {
            switch: switch.to_string(),
            message: message.into(),
        }
    }

    fn port(switch: &str, port: &str, message: impl Into<String>) -> Self {
        Self::Port {
            switch: switch.to_string(),
            port: port.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Run-wide options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Options {
    /// Keep going with the next switch after a failure
    #[serde(default)]
    pub continue_on_error: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Options {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Options {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    options: Options,
    switches: Option<BTreeMap<String, RawSwitch>>,
}

#[derive(Debug, Deserialize)]
struct RawSwitch {
    address: String,
    password: String,
    model: String,
    // TOML keys are strings; parsed into port numbers during validation
    #[serde(default)]
    ports: BTreeMap<String, RawPort>,
}

#[derive(Debug, Deserialize)]
struct RawPort {
    pvid: VlanId,
    vlans: Vec<String>,
}

/// Desired VLAN setup of one port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub pvid: VlanId,
    pub vlans: BTreeMap<VlanId, PortMembership>,
}

/// One switch to reconcile
#[derive(Clone, PartialEq, Eq)]
pub struct SwitchConfig {
    pub name: String,
    pub address: String,
    pub password: String,
    pub model: SwitchModel,
    pub ports: BTreeMap<PortId, PortConfig>,
}

impl fmt::Debug for SwitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchConfig")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("model", &self.model)
            .field("ports", &self.ports)
            .finish()
    }
}

impl SwitchConfig {
    /// Membership of every VLAN mentioned by any port, over all ports.
    ///
    /// A VLAN only ever mentioned with `N` still appears (with no members).
    pub fn desired_membership(&self) -> VlanMembership {
        let port_count = self.model.port_count();
        let mut membership = VlanMembership::new();
        for (port, cfg) in &self.ports {
            for (vid, status) in &cfg.vlans {
                membership
                    .entry(*vid)
                    .or_insert_with(|| all_ignored(port_count))
                    .insert(*port, *status);
            }
        }
        membership
    }

    /// PVID of every configured port.
    pub fn desired_pvids(&self) -> PvidAssignment {
        self.ports
            .iter()
            .map(|(port, cfg)| (*port, cfg.pvid))
            .collect()
    }

    pub fn desired_state(&self) -> SwitchState {
        SwitchState::new(self.desired_membership(), self.desired_pvids())
    }
}

/// A validated configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub options: Options,
    /// Switches by name, iterated in name order
    pub switches: BTreeMap<String, SwitchConfig>,
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let raw: RawConfig = toml::from_str(content)?;
        if raw.options.timeout_secs == 0 {
            return Err(ConfigError::InvalidOption {
                option: "timeout_secs".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let raw_switches = raw.switches.ok_or(ConfigError::MissingSwitches)?;
        let mut switches = BTreeMap::new();
        for (name, sw) in raw_switches {
            let cfg = validate_switch(&name, sw)?;
            switches.insert(name, cfg);
        }

        Ok(Self {
            options: raw.options,
            switches,
        })
    }

    pub fn switch(&self, name: &str) -> Option<&SwitchConfig> {
        self.switches.get(name)
    }
}

/// Switch names double as backup file names under the backup directory.
fn valid_switch_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn validate_switch(name: &str, raw: RawSwitch) -> ConfigResult<SwitchConfig> {
    if !valid_switch_name(name) {
        return Err(ConfigError::switch(
            name,
            "name may only contain letters, digits, '-', '_' and '.', and must not start with '.'",
        ));
    }
    if raw.address.trim().is_empty() {
        return Err(ConfigError::switch(name, "address is empty"));
    }
    let model: SwitchModel = raw
        .model
        .parse()
        .map_err(|e: String| ConfigError::switch(name, e))?;
    let port_count = model.port_count();

    let mut ports = BTreeMap::new();
    for (key, port) in raw.ports {
        let id: PortId = key
            .trim()
            .parse()
            .ok()
            .filter(|p| (1..=port_count).contains(p))
            .ok_or_else(|| {
                ConfigError::port(
                    name,
                    &key,
                    format!(
                        "port id out of range [1, {}] for model {}",
                        port_count, model
                    ),
                )
            })?;

        let vlans = parse_vlan_tokens(&port.vlans).map_err(|m| ConfigError::port(name, &key, m))?;
        match vlans.get(&port.pvid) {
            None => {
                return Err(ConfigError::port(
                    name,
                    &key,
                    format!("assigned pvid {} but it's not in VLAN {}", port.pvid, port.pvid),
                ))
            }
            Some(PortMembership::Ignored) => {
                return Err(ConfigError::port(
                    name,
                    &key,
                    format!("pvid {} is marked N (not a member)", port.pvid),
                ))
            }
            Some(_) => {}
        }

        ports.insert(
            id,
            PortConfig {
                pvid: port.pvid,
                vlans,
            },
        );
    }

    Ok(SwitchConfig {
        name: name.to_string(),
        address: raw.address,
        password: raw.password,
        model,
        ports,
    })
}

/// Parses `["1U", "10T", "20N"]`.
fn parse_vlan_tokens(tokens: &[String]) -> Result<BTreeMap<VlanId, PortMembership>, String> {
    let mut vlans = BTreeMap::new();
    for token in tokens {
        let token = token.trim();
        let mut chars = token.chars();
        let status = chars
            .next_back()
            .and_then(|c| PortMembership::from_token(c.to_ascii_uppercase()))
            .ok_or_else(|| {
                format!(
                    "unsupported status in '{}', should be one of U, T, N",
                    token
                )
            })?;
        let vid: VlanId = chars
            .as_str()
            .parse()
            .ok()
            .filter(|v| (1..=MAX_VLAN_ID).contains(v))
            .ok_or_else(|| format!("invalid VLAN id in '{}'", token))?;
        if vlans.insert(vid, status).is_some() {
            return Err(format!("duplicate VLAN id {}", vid));
        }
    }
    Ok(vlans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const EXAMPLE: &str = r#"
[options]
continue_on_error = true

[switches.office]
address = "192.168.0.239"
password = "secret"
model = "gs108ev3"

[switches.office.ports.1]
pvid = 1
vlans = ["1U", "10T", "20T"]

[switches.office.ports.2]
pvid = 10
vlans = ["10U", "30N"]

[switches.lab]
address = "http://10.0.0.2"
password = "pw"
model = "GS116Ev2"
"#;

    fn switch_with_port(port: &str, pvid: u16, vlans: &str) -> String {
        format!(
            r#"
[switches.sw]
address = "10.0.0.1"
password = "pw"
model = "gs108ev3"

[switches.sw.ports.{}]
pvid = {}
vlans = [{}]
"#,
            port, pvid, vlans
        )
    }

    #[test]
    fn test_parse_example() {
        let config = Config::parse(EXAMPLE).unwrap();
        assert!(config.options.continue_on_error);
        assert_eq!(config.options.timeout(), Duration::from_secs(30));

        let names: Vec<_> = config.switches.keys().cloned().collect();
        assert_eq!(names, vec!["lab", "office"]);

        let lab = config.switch("lab").unwrap();
        assert_eq!(lab.model, SwitchModel::Gs116ev2);
        assert!(lab.ports.is_empty());

        let office = config.switch("office").unwrap();
        assert_eq!(office.ports[&2].pvid, 10);
        assert_eq!(office.ports[&1].vlans[&10], PortMembership::Tagged);
    }

    #[test]
    fn test_desired_state() {
        let config = Config::parse(EXAMPLE).unwrap();
        let office = config.switch("office").unwrap();

        let membership = office.desired_membership();
        assert_eq!(membership.keys().copied().collect::<Vec<_>>(), vec![1, 10, 20, 30]);
        assert_eq!(membership[&10].len(), 8);
        assert_eq!(membership[&10][&1], PortMembership::Tagged);
        assert_eq!(membership[&10][&2], PortMembership::Untagged);
        assert_eq!(membership[&10][&3], PortMembership::Ignored);
        assert!(membership[&30].values().all(|m| !m.is_member()));

        let pvids = office.desired_pvids();
        assert_eq!(pvids.len(), 2);
        assert_eq!(pvids[&2], 10);
        assert_eq!(office.desired_state().pvids, pvids);
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("[switches]").unwrap();
        assert_eq!(config.options, Options::default());
        assert!(config.switches.is_empty());
    }

    #[test]
    fn test_missing_switches() {
        assert!(matches!(
            Config::parse("[options]\ncontinue_on_error = true"),
            Err(ConfigError::MissingSwitches)
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            Config::parse("[options]\ntimeout_secs = 0\n[switches]"),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_port_out_of_range() {
        let err = Config::parse(&switch_with_port("9", 1, r#""1U""#)).unwrap_err();
        assert!(matches!(err, ConfigError::Port { ref port, .. } if port == "9"));

        let err = Config::parse(&switch_with_port("0", 1, r#""1U""#)).unwrap_err();
        assert!(matches!(err, ConfigError::Port { .. }));
    }

    #[test]
    fn test_bad_tokens() {
        let err = Config::parse(&switch_with_port("1", 1, r#""1U", "10X""#)).unwrap_err();
        assert!(err.to_string().contains("should be one of U, T, N"));

        let err = Config::parse(&switch_with_port("1", 1, r#""1U", "U""#)).unwrap_err();
        assert!(err.to_string().contains("invalid VLAN id"));

        let err = Config::parse(&switch_with_port("1", 1, r#""1U", "5000T""#)).unwrap_err();
        assert!(err.to_string().contains("invalid VLAN id"));

        let err = Config::parse(&switch_with_port("1", 1, r#""1U", "1T""#)).unwrap_err();
        assert!(err.to_string().contains("duplicate VLAN id 1"));
    }

    #[test]
    fn test_pvid_must_be_member() {
        let err = Config::parse(&switch_with_port("1", 5, r#""1U""#)).unwrap_err();
        assert!(err.to_string().contains("not in VLAN 5"));

        let err = Config::parse(&switch_with_port("1", 5, r#""1U", "5N""#)).unwrap_err();
        assert!(err.to_string().contains("marked N"));

        assert!(Config::parse(&switch_with_port("1", 5, r#""1N", "5T""#)).is_ok());
    }

    #[test]
    fn test_switch_name_must_be_a_plain_file_name() {
        for name in ["../x", "a/b", ".hidden", "", "sw 1"] {
            let text = format!(
                "[switches.\"{}\"]\naddress = \"10.0.0.1\"\npassword = \"pw\"\nmodel = \"gs108ev3\"\n",
                name
            );
            assert!(
                matches!(Config::parse(&text), Err(ConfigError::Switch { .. })),
                "name {:?} accepted",
                name
            );
        }

        let ok = Config::parse(
            "[switches.\"core-1.lab\"]\naddress = \"10.0.0.1\"\npassword = \"pw\"\nmodel = \"gs108ev3\"\n",
        )
        .unwrap();
        assert!(ok.switch("core-1.lab").is_some());
    }

    #[test]
    fn test_unknown_model() {
        let toml = r#"
[switches.x]
address = "10.0.0.1"
password = "pw"
model = "gs105e"
"#;
        let err = Config::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Switch { .. }));
        assert!(err.to_string().contains("gs105e"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.switches.len(), 2);

        assert!(matches!(
            Config::load("/nonexistent/prosafe.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = Config::parse(EXAMPLE).unwrap();
        let dump = format!("{:?}", config.switch("office").unwrap());
        assert!(!dump.contains("secret"));
    }
}
