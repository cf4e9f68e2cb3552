//! Web UI drivers for NETGEAR ProSAFE Plus switches.
//!
//! Each supported model implements [`prosafe_common::SwitchDriver`] on top
//! of an HTTP session ([`http::SwitchSession`]) that scrapes the firmware's
//! pages and posts its forms:
//!
//! | Model | Driver | Page format |
//! |-------|--------|-------------|
//! | `gs108ev3` | [`Gs108ev3`] | HTML forms, scraped with CSS selectors |
//! | `gs116ev2` | [`Gs116ev2`] | JavaScript variables, matched with regexes |
//!
//! Use [`connect`] to build the right driver for a configured model.

pub mod gs108ev3;
pub mod gs116ev2;
pub mod http;

use std::time::Duration;

use prosafe_common::{SwitchDriver, SwitchModel, SwitchResult};

pub use gs108ev3::Gs108ev3;
pub use gs116ev2::Gs116ev2;
pub use http::{normalize_address, SwitchSession, DEFAULT_TIMEOUT};

/// Builds the driver for `model`. The driver starts logged out.
pub fn connect(
    model: SwitchModel,
    address: &str,
    password: &str,
    timeout: Duration,
) -> SwitchResult<Box<dyn SwitchDriver>> {
    Ok(match model {
        SwitchModel::Gs108ev3 => Box::new(Gs108ev3::new(address, password, timeout)?),
        SwitchModel::Gs116ev2 => Box::new(Gs116ev2::new(address, password, timeout)?),
    })
}
