//! Save and load complete device configurations.
//!
//! The document layout is shared with other tools, so field names are fixed:
//!
//! ```json
//! {
//!   "slave_id": 1,
//!   "is_master": true,
//!   "target_slaves": [3, 7],
//!   "slave_registers": { "3": [ ... ], "7": [ ... ] },
//!   "registers": [ ... ],
//!   "settings": { "common": [ ... ], "master": [ ... ], "slave": [ ... ] }
//! }
//! ```
//!
//! Both register shapes are stored whatever the role, so switching role and
//! back loses nothing.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::{DeviceConfig, MIN_SLAVE_ID, Role, validate_slave_id};
use crate::error::{Error, Result};
use crate::register::RegisterDescriptor;
use crate::serialization::{self, Format};
use crate::settings::Settings;

fn default_slave_id() -> u16 {
    u16::from(MIN_SLAVE_ID)
}

/// On-disk shape of a [`DeviceConfig`].
///
/// Slave ids are read wide so out-of-range values are reported as a
/// malformed document rather than a type error.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default = "default_slave_id")]
    slave_id: u16,
    #[serde(default)]
    is_master: bool,
    #[serde(default)]
    target_slaves: Vec<u16>,
    #[serde(default)]
    slave_registers: BTreeMap<u16, Vec<RegisterDescriptor>>,
    #[serde(default)]
    registers: Vec<RegisterDescriptor>,
    #[serde(default)]
    settings: Settings,
}

impl ConfigDocument {
    fn from_config(config: &DeviceConfig) -> Self {
        Self {
            slave_id: u16::from(config.slave_id()),
            is_master: config.role().is_master(),
            target_slaves: config
                .target_slave_ids()
                .iter()
                .map(|&id| u16::from(id))
                .collect(),
            slave_registers: config
                .slave_registers()
                .iter()
                .map(|(&id, regs)| (u16::from(id), regs.clone()))
                .collect(),
            registers: config.local_registers().to_vec(),
            settings: config.settings.clone(),
        }
    }

    fn into_config(self) -> Result<DeviceConfig> {
        let slave_id =
            validate_slave_id(self.slave_id).map_err(|e| Error::malformed(e.to_string()))?;

        let mut targets = Vec::with_capacity(self.target_slaves.len());
        for id in self.target_slaves {
            let id = validate_slave_id(id).map_err(|e| Error::malformed(e.to_string()))?;
            if targets.contains(&id) {
                return Err(Error::malformed(format!("slave ID {} listed twice", id)));
            }
            targets.push(id);
        }

        let mut slave_registers = BTreeMap::new();
        for (id, list) in self.slave_registers {
            let known = u8::try_from(id).ok().filter(|id| targets.contains(id));
            let Some(id) = known else {
                return Err(Error::malformed(format!(
                    "register list for slave {} which is not a target slave",
                    id
                )));
            };
            slave_registers.insert(id, list);
        }
        for id in &targets {
            slave_registers.entry(*id).or_insert_with(Vec::new);
        }

        let role = if self.is_master {
            Role::Master
        } else {
            Role::Slave
        };
        let config = DeviceConfig::from_parts(
            role,
            slave_id,
            targets,
            self.registers,
            slave_registers,
            self.settings,
        );
        config
            .validate()
            .map_err(|e| Error::malformed(e.to_string()))?;

        if let Err(e) = config.settings.validate() {
            warn!("Loaded configuration has an invalid setting: {}", e);
        }
        Ok(config)
    }
}

/// Encode a configuration in `format`.
pub fn to_bytes(config: &DeviceConfig, format: Format) -> Result<Vec<u8>> {
    serialization::encode(&ConfigDocument::from_config(config), format)
}

/// Decode a configuration in `format`.
pub fn from_bytes(data: &[u8], format: Format) -> Result<DeviceConfig> {
    let doc: ConfigDocument = serialization::decode(data, format)?;
    doc.into_config()
}

/// Serialize to the JSON document.
pub fn save(config: &DeviceConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ConfigDocument::from_config(config))?)
}

/// Parse the JSON document.
pub fn load(text: &str) -> Result<DeviceConfig> {
    from_bytes(text.as_bytes(), Format::Json)
}

/// Write a configuration file. `.cbor` paths get the CBOR snapshot,
/// everything else JSON.
pub fn save_file(config: &DeviceConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = Format::from_path(path);
    let bytes = to_bytes(config, format)?;
    std::fs::write(path, bytes)?;
    debug!(format = ?format, "Saved configuration to {}", path.display());
    Ok(())
}

/// Read a configuration file in either format.
pub fn load_file(path: impl AsRef<Path>) -> Result<DeviceConfig> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let format = serialization::detect_format(&data);
    debug!(format = ?format, "Loading configuration from {}", path.display());
    from_bytes(&data, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::RegionType;
    use crate::register::{Access, Mode};
    use crate::settings::SettingsGroup;

    fn hr(address: u16) -> RegisterDescriptor {
        RegisterDescriptor::with_default_tag(address, RegionType::HoldingRegister)
    }

    fn master_config() -> DeviceConfig {
        let mut config = DeviceConfig::with_role(Role::Master);
        for id in [3u16, 7, 12] {
            config.add_target_slave(id).unwrap();
        }
        config.add_register(Some(3), hr(0)).unwrap();
        config.add_register(Some(3), hr(1)).unwrap();
        config
            .add_register(
                Some(7),
                RegisterDescriptor::new(Some("VALVE"), 4, RegionType::Coil)
                    .unwrap()
                    .with_access(Access::write(Mode::Cyclic)),
            )
            .unwrap();
        config
            .quick_add_consecutive(Some(12), 100, RegionType::InputRegister, 3, Access::read())
            .unwrap();
        config
    }

    #[test]
    fn test_empty_slave_roundtrip() {
        let config = DeviceConfig::new();
        let text = save(&config).unwrap();
        assert_eq!(load(&text).unwrap(), config);
    }

    #[test]
    fn test_master_roundtrip() {
        let config = master_config();
        let text = save(&config).unwrap();
        let loaded = load(&text).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.target_slave_ids(), &[3, 7, 12]);
        assert_eq!(loaded.get_registers(Some(7)).unwrap()[0].access(), Access::write(Mode::Cyclic));
    }

    #[test]
    fn test_custom_settings_roundtrip() {
        let mut config = DeviceConfig::new();
        config
            .settings
            .set(SettingsGroup::Common, "MODBUS_PARITY", "2")
            .unwrap();
        config
            .settings
            .set(SettingsGroup::Slave, "VENDOR_OPTION", "x")
            .unwrap();
        assert_eq!(load(&save(&config).unwrap()).unwrap(), config);
    }

    #[test]
    fn test_document_fields() {
        let text = save(&master_config()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["is_master"], true);
        assert_eq!(value["target_slaves"], serde_json::json!([3, 7, 12]));
        let reg = &value["slave_registers"]["3"][1];
        assert_eq!(reg["tag_name"], "HR_0001");
        assert_eq!(reg["mapped_address"], 40002);
        assert_eq!(reg["type"], 3);
        assert_eq!(reg["modbus_type"], 4);
        assert_eq!(reg["type_name"], "Holding Register (4x)");
        assert_eq!(reg["operation"], "Read");
        assert_eq!(reg["mode"], "N/A");
    }

    #[test]
    fn test_missing_fields_default() {
        let config = load("{}").unwrap();
        assert_eq!(config, DeviceConfig::new());

        let config = load(r#"{"slave_id": 9, "registers": []}"#).unwrap();
        assert_eq!(config.slave_id(), 9);
        assert_eq!(config.settings.common, Settings::default().common);
        assert_eq!(config.settings.master, Settings::default().master);
    }

    #[test]
    fn test_load_syncs_slave_id_setting() {
        let config = load(
            r#"{"slave_id": 9, "settings": {"slave": [{"var_name": "MODBUS_SLAVE_ID", "value": "3"}]}}"#,
        )
        .unwrap();
        let setting = config.settings.get(SettingsGroup::Slave, "MODBUS_SLAVE_ID").unwrap();
        assert_eq!(setting.value, "9");
    }

    #[test]
    fn test_legacy_register_without_tag() {
        let config = load(
            r#"{"registers": [{"internal_address": 5, "type": 3, "mapped_address": 40006}]}"#,
        )
        .unwrap();
        assert_eq!(config.local_registers()[0].tag_name, "HR_0005");
    }

    #[test]
    fn test_target_without_list_gets_empty_list() {
        let config = load(r#"{"is_master": true, "target_slaves": [4]}"#).unwrap();
        assert!(config.get_registers(Some(4)).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_documents() {
        let cases = [
            r#"{"slave_id": 0}"#,
            r#"{"is_master": true, "target_slaves": [300]}"#,
            r#"{"is_master": true, "target_slaves": [2, 2]}"#,
            r#"{"is_master": true, "target_slaves": [], "slave_registers": {"5": []}}"#,
            r#"{"registers": [{"internal_address": 1, "type": 9}]}"#,
            r#"{"registers": [{"internal_address": 1, "type": 0}, {"internal_address": 1, "type": 0, "tag_name": "X"}]}"#,
            r#"{"registers": [{"internal_address": 1, "type": 0, "modbus_type": 4}]}"#,
            "not json",
        ];
        for case in cases {
            assert!(
                matches!(load(case), Err(Error::MalformedConfig(_))),
                "expected malformed: {}",
                case
            );
        }
    }

    #[test]
    fn test_file_formats() {
        let dir = tempfile::tempdir().unwrap();
        let config = master_config();

        let json_path = dir.path().join("plant.json");
        let cbor_path = dir.path().join("plant.cbor");
        save_file(&config, &json_path).unwrap();
        save_file(&config, &cbor_path).unwrap();

        let json = std::fs::read(&json_path).unwrap();
        let cbor = std::fs::read(&cbor_path).unwrap();
        assert_eq!(json.first(), Some(&b'{'));
        assert!(cbor.len() < json.len());

        assert_eq!(load_file(&json_path).unwrap(), config);
        assert_eq!(load_file(&cbor_path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_file(dir.path().join("missing.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
