//! Serial/protocol settings carried alongside the register map.
//!
//! Settings are opaque `{var_name, value, description}` triples grouped by the
//! role they apply to. Values of well-known variables are range checked;
//! anything else is stored as given.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::Role;
use crate::error::{Error, Result};

/// Slave-group variable mirroring the device slave id.
pub const SLAVE_ID_SETTING: &str = "MODBUS_SLAVE_ID";

const SLAVE_ID_DESCRIPTION: &str = "Modbus slave address (1-247)";

const BAUD_RATES: [i64; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// A single named setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub var_name: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
}

impl Setting {
    pub fn new(
        var_name: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            var_name: var_name.into(),
            value: value.into(),
            description: description.into(),
        }
    }

    /// Integer value, if the setting holds one.
    pub fn as_integer(&self) -> Option<i64> {
        self.value.trim().parse().ok()
    }
}

/// Which settings group a variable belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsGroup {
    Common,
    Master,
    Slave,
}

impl SettingsGroup {
    pub const ALL: [SettingsGroup; 3] = [
        SettingsGroup::Common,
        SettingsGroup::Master,
        SettingsGroup::Slave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsGroup::Common => "common",
            SettingsGroup::Master => "master",
            SettingsGroup::Slave => "slave",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// The role-specific group for `role`.
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Master => SettingsGroup::Master,
            Role::Slave => SettingsGroup::Slave,
        }
    }
}

impl fmt::Display for SettingsGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All three settings groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub common: Vec<Setting>,
    #[serde(default)]
    pub master: Vec<Setting>,
    #[serde(default)]
    pub slave: Vec<Setting>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            common: vec![
                Setting::new("MODBUS_BAUDRATE", "9600", "UART baudrate"),
                Setting::new("MODBUS_DATA_BITS", "8", "Data bits: 7 or 8"),
                Setting::new("MODBUS_PARITY", "0", "Parity: 0=None, 1=Even, 2=Odd"),
                Setting::new("MODBUS_STOP_BITS", "1", "Stop bits: 1 or 2"),
            ],
            master: vec![
                Setting::new("MODBUS_TIMEOUT_MS", "1000", "Response timeout (ms)"),
                Setting::new(
                    "MODBUS_FRAME_INTERVAL_MS",
                    "10",
                    "Time between frames in one cycle (ms)",
                ),
                Setting::new(
                    "MODBUS_CYCLE_INTERVAL_MS",
                    "100",
                    "Time between complete cycles (ms)",
                ),
                Setting::new("MODBUS_MAX_RETRIES", "3", "Maximum retry attempts"),
            ],
            slave: vec![
                Setting::new(SLAVE_ID_SETTING, "1", SLAVE_ID_DESCRIPTION),
                Setting::new("MODBUS_RESPONSE_DELAY_MS", "0", "Response delay (ms)"),
            ],
        }
    }
}

impl Settings {
    pub fn group(&self, group: SettingsGroup) -> &[Setting] {
        match group {
            SettingsGroup::Common => &self.common,
            SettingsGroup::Master => &self.master,
            SettingsGroup::Slave => &self.slave,
        }
    }

    fn group_mut(&mut self, group: SettingsGroup) -> &mut Vec<Setting> {
        match group {
            SettingsGroup::Common => &mut self.common,
            SettingsGroup::Master => &mut self.master,
            SettingsGroup::Slave => &mut self.slave,
        }
    }

    pub fn get(&self, group: SettingsGroup, var_name: &str) -> Option<&Setting> {
        self.group(group).iter().find(|s| s.var_name == var_name)
    }

    /// Find a variable in any group.
    pub fn find(&self, var_name: &str) -> Option<(SettingsGroup, &Setting)> {
        SettingsGroup::ALL
            .into_iter()
            .find_map(|g| self.get(g, var_name).map(|s| (g, s)))
    }

    /// Set a value, adding the variable to `group` if it is not there yet.
    ///
    /// The value is validated first; on error nothing changes.
    pub fn set(&mut self, group: SettingsGroup, var_name: &str, value: &str) -> Result<()> {
        let value = value.trim();
        validate_value(var_name, value)?;

        let settings = self.group_mut(group);
        match settings.iter_mut().find(|s| s.var_name == var_name) {
            Some(setting) => setting.value = value.to_string(),
            None => settings.push(Setting::new(var_name, value, "")),
        }
        Ok(())
    }

    /// Store the device slave id in the slave group.
    pub(crate) fn sync_slave_id(&mut self, id: u8) {
        let value = id.to_string();
        match self.slave.iter_mut().find(|s| s.var_name == SLAVE_ID_SETTING) {
            Some(setting) => setting.value = value,
            None => self
                .slave
                .push(Setting::new(SLAVE_ID_SETTING, value, SLAVE_ID_DESCRIPTION)),
        }
    }

    /// Check every known variable in every group.
    pub fn validate(&self) -> Result<()> {
        for group in SettingsGroup::ALL {
            for setting in self.group(group) {
                validate_value(&setting.var_name, &setting.value)?;
            }
        }
        Ok(())
    }

    /// Settings emitted for a device of `role`: common first, then the
    /// role's own group.
    pub fn for_role(&self, role: Role) -> impl Iterator<Item = &Setting> {
        self.common
            .iter()
            .chain(self.group(SettingsGroup::for_role(role)).iter())
    }
}

/// Validate a value against the constraints of a well-known variable.
pub fn validate_value(var_name: &str, value: &str) -> Result<()> {
    let check = |allowed: &dyn Fn(i64) -> bool, reason: &str| -> Result<()> {
        match value.trim().parse::<i64>() {
            Ok(v) if allowed(v) => Ok(()),
            Ok(_) => Err(Error::invalid_setting(var_name, value, reason)),
            Err(_) => Err(Error::invalid_setting(var_name, value, "expected an integer")),
        }
    };

    match var_name {
        "MODBUS_BAUDRATE" => check(
            &|v| BAUD_RATES.contains(&v),
            "expected one of 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200",
        ),
        "MODBUS_DATA_BITS" => check(&|v| v == 7 || v == 8, "expected 7 or 8"),
        "MODBUS_PARITY" => check(&|v| (0..=2).contains(&v), "expected 0 (none), 1 (even) or 2 (odd)"),
        "MODBUS_STOP_BITS" => check(&|v| v == 1 || v == 2, "expected 1 or 2"),
        SLAVE_ID_SETTING => check(&|v| (1..=247).contains(&v), "expected 1-247"),
        "MODBUS_TIMEOUT_MS"
        | "MODBUS_FRAME_INTERVAL_MS"
        | "MODBUS_CYCLE_INTERVAL_MS"
        | "MODBUS_RESPONSE_DELAY_MS" => {
            check(&|v| (0..=60000).contains(&v), "expected 0-60000 ms")
        }
        "MODBUS_MAX_RETRIES" => check(&|v| (1..=10).contains(&v), "expected 1-10"),
        _ => Ok(()),
    }
}
