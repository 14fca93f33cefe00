//! Rebuild a [`DeviceConfig`] from a generated header.
//!
//! The header format is lossy, so this is best effort:
//!
//! - the role comes from the `MODBUS_DEVICE_TYPE_MASTER` define,
//! - target slaves come from the `Target slave IDs` comment,
//! - registers come from their address defines; tag and access are taken
//!   from the trailing comment when there is one.
//!
//! In master role an address define without a `_SLAVE<id>` suffix cannot be
//! attributed to a slave. Such registers go to the first target slave, and
//! are dropped when the header lists no targets.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::address::RegionType;
use crate::codegen::{SLAVE_DEFINE, SLAVE_ID_DEFINE};
use crate::device::{DeviceConfig, Role};
use crate::error::{Error, Result};
use crate::register::{Access, Mode, Operation, RegisterDescriptor};
use crate::settings::SettingsGroup;

// Any integer define: #define NAME (123)
static DEFINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*#define[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]+\([ \t]*(-?\d+)[ \t]*\)")
        .unwrap()
});

// Register address define with optional slave suffix and trailing comment.
static REGISTER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*#define[ \t]+MODBUS_(COIL|DI|INPUT_REG|HOLDING_REG)_(\d+)(?:_SLAVE(\d+))?[ \t]+\([ \t]*(\d+)[ \t]*\)[ \t]*(?:/\*[ \t]*(.*?)[ \t]*\*/)?",
    )
    .unwrap()
});

// Role marker, whatever value it carries.
static MASTER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*#define[ \t]+MODBUS_DEVICE_TYPE_MASTER\b").unwrap()
});

static TARGETS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\*\s*Target slave IDs:\s*([0-9,\s]*?)\s*\*/").unwrap());

// Comment body: "TAG", "Slave 3: TAG [Read]" or "Slave 3: TAG [Write/Cyclic]"
static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Slave\s+\d+:\s*)?([A-Z0-9_]+)(?:\s+\[(Read|Write)(?:/(One-time|Cyclic))?\])?$")
        .unwrap()
});

/// One register define found in a header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedRegister {
    region: RegionType,
    internal_address: u16,
    slave_id: Option<u16>,
    tag: Option<String>,
    access: Option<Access>,
}

fn parse_comment(comment: &str) -> (Option<String>, Option<Access>) {
    let Some(caps) = COMMENT_REGEX.captures(comment) else {
        return (None, None);
    };

    let tag = caps.get(1).map(|m| m.as_str().to_string());
    let access = caps.get(2).map(|op| {
        let operation = match op.as_str() {
            "Write" => Operation::Write,
            _ => Operation::Read,
        };
        let mode = match caps.get(3).map(|m| m.as_str()) {
            Some("Cyclic") => Mode::Cyclic,
            Some(_) => Mode::OneTime,
            None => Mode::NotApplicable,
        };
        Access::new(operation, mode)
    });
    (tag, access)
}

fn parse_registers(text: &str) -> Vec<ParsedRegister> {
    let mut registers = Vec::new();

    for caps in REGISTER_REGEX.captures_iter(text) {
        let Some(region) = caps
            .get(1)
            .and_then(|m| RegionType::from_identifier_prefix(m.as_str()))
        else {
            continue;
        };
        let Some(literal) = caps.get(4).map(|m| m.as_str()) else {
            continue;
        };
        let Ok(internal_address) = literal.parse::<u16>() else {
            warn!("Skipping {} register with address {} (above 65535)", region.label(), literal);
            continue;
        };

        let identifier_address = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        if identifier_address != Some(u32::from(internal_address)) {
            warn!(
                "Identifier address {:?} disagrees with value {}; using the value",
                identifier_address, internal_address
            );
        }

        let slave_id = match caps.get(3) {
            Some(m) => match m.as_str().parse::<u16>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Skipping register with unreadable slave suffix {}", m.as_str());
                    continue;
                }
            },
            None => None,
        };

        let (tag, access) = caps
            .get(5)
            .map(|m| parse_comment(m.as_str()))
            .unwrap_or((None, None));

        registers.push(ParsedRegister {
            region,
            internal_address,
            slave_id,
            tag,
            access,
        });
    }

    registers
}

/// Parse generated header text back into a configuration.
pub fn parse(text: &str) -> Result<DeviceConfig> {
    let defines: HashMap<&str, i64> = DEFINE_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str().parse().ok()?;
            Some((name, value))
        })
        .collect();
    let registers = parse_registers(text);

    let role = if MASTER_REGEX.is_match(text) {
        Role::Master
    } else {
        Role::Slave
    };
    if role == Role::Slave && !defines.contains_key(SLAVE_DEFINE) && registers.is_empty() {
        return Err(Error::malformed(
            "no device type or register definitions found in header",
        ));
    }

    let mut config = DeviceConfig::with_role(role);

    if let Some(&id) = defines.get(SLAVE_ID_DEFINE) {
        let id = u16::try_from(id).unwrap_or(0);
        if let Err(e) = config.set_slave_id(id) {
            warn!("Ignoring slave ID from header: {}", e);
        }
    }

    restore_settings(&mut config, &defines);

    if role == Role::Master
        && let Some(caps) = TARGETS_REGEX.captures(text)
    {
        let list = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        for id in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match id.parse::<u16>() {
                Ok(id) => {
                    if let Err(e) = config.add_target_slave(id) {
                        warn!("Ignoring target slave {}: {}", id, e);
                    }
                }
                Err(_) => warn!("Ignoring unreadable target slave ID {:?}", id),
            }
        }
    }

    let mut dropped = 0usize;
    for parsed in &registers {
        let slave = match role {
            Role::Slave => None,
            Role::Master => match owner_slave(&mut config, parsed) {
                Some(id) => Some(id),
                None => {
                    dropped += 1;
                    continue;
                }
            },
        };
        insert_register(&mut config, slave, parsed);
    }
    if dropped > 0 {
        warn!(
            "Dropped {} register(s) without a slave suffix: header lists no target slaves",
            dropped
        );
    }

    info!(
        role = %role,
        registers = config.all_registers().len(),
        targets = config.target_slave_ids().len(),
        "Parsed register header"
    );
    Ok(config)
}

/// Read and parse a header file.
pub fn import_file(path: impl AsRef<Path>) -> Result<DeviceConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    debug!("Importing {}", path.display());
    parse(&text)
}

fn restore_settings(config: &mut DeviceConfig, defines: &HashMap<&str, i64>) {
    let names: Vec<(SettingsGroup, String)> = SettingsGroup::ALL
        .into_iter()
        .flat_map(|group| {
            config
                .settings
                .group(group)
                .iter()
                .map(move |s| (group, s.var_name.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    for (group, name) in names {
        if let Some(value) = defines.get(name.as_str()) {
            if let Err(e) = config.set_setting(group, &name, &value.to_string()) {
                warn!("Keeping default for {}: {}", name, e);
            }
        }
    }
}

/// Slave a master-role register belongs to, registering suffix slaves that
/// the target comment did not mention.
fn owner_slave(config: &mut DeviceConfig, parsed: &ParsedRegister) -> Option<u8> {
    match parsed.slave_id {
        Some(id) => {
            if let Ok(known) = u8::try_from(id)
                && config.target_slave_ids().contains(&known)
            {
                return Some(known);
            }
            match config.add_target_slave(id) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Skipping register of slave {}: {}", id, e);
                    None
                }
            }
        }
        None => config.target_slave_ids().first().copied(),
    }
}

fn insert_register(config: &mut DeviceConfig, slave: Option<u8>, parsed: &ParsedRegister) {
    let mut register = RegisterDescriptor::new(
        parsed.tag.as_deref(),
        parsed.internal_address,
        parsed.region,
    )
    .unwrap_or_else(|_| {
        RegisterDescriptor::with_default_tag(parsed.internal_address, parsed.region)
    });
    if let Some(access) = parsed.access {
        register.set_access(access);
    }

    let fallback = RegisterDescriptor {
        tag_name: crate::register::default_tag_name(parsed.internal_address, parsed.region),
        ..register.clone()
    };

    match config.add_register(slave, register) {
        Ok(()) => {}
        Err(Error::DuplicateTag(tag)) if tag != fallback.tag_name => {
            debug!("Tag {} already used; falling back to {}", tag, fallback.tag_name);
            if let Err(e) = config.add_register(slave, fallback) {
                warn!("Skipping duplicate register: {}", e);
            }
        }
        Err(e) => warn!("Skipping duplicate register: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate;

    #[test]
    fn test_parse_comment() {
        assert_eq!(parse_comment("PUMP"), (Some("PUMP".to_string()), None));
        assert_eq!(
            parse_comment("Slave 3: VALVE [Write/Cyclic]"),
            (
                Some("VALVE".to_string()),
                Some(Access::new(Operation::Write, Mode::Cyclic))
            )
        );
        assert_eq!(
            parse_comment("Slave 3: HR_0001 [Read]").1,
            Some(Access::new(Operation::Read, Mode::NotApplicable))
        );
        // Legacy comments carry only the slave.
        assert_eq!(parse_comment("Slave 3"), (None, None));
    }

    #[test]
    fn test_parse_slave_header() {
        let header = "\
#define MODBUS_DEVICE_TYPE_SLAVE            (1)
#define MODBUS_SLAVE_ID                     (42)
#define MODBUS_COIL_0000                    (0)
#define MODBUS_INPUT_REG_0010               (10)  /* FLOW */
#define MODBUS_HOLDING_REG_0005             (5)
";
        let config = parse(header).unwrap();
        assert_eq!(config.role(), Role::Slave);
        assert_eq!(config.slave_id(), 42);

        let regs = config.get_registers(None).unwrap();
        assert_eq!(regs.len(), 3);
        assert_eq!(regs[0].tag_name, "COIL_0000");
        assert_eq!(regs[1].tag_name, "FLOW");
        assert_eq!(regs[1].mapped_address(), 30011);
        assert_eq!(regs[2].region_type, RegionType::HoldingRegister);
        assert_eq!(regs[2].mapped_address(), 40006);
    }

    #[test]
    fn test_parse_master_legacy_header() {
        let header = "\
#define MODBUS_DEVICE_TYPE_MASTER           (1)
/* Target slave IDs: 4, 2 */
#define MODBUS_HOLDING_REG_0001             (1)
#define MODBUS_HOLDING_REG_0002_SLAVE2      (2)  /* Slave 2 */
";
        let config = parse(header).unwrap();
        assert_eq!(config.role(), Role::Master);
        assert_eq!(config.target_slave_ids(), &[4, 2]);
        // Unsuffixed defines land on the first target.
        assert_eq!(config.get_registers(Some(4)).unwrap()[0].internal_address, 1);
        assert_eq!(config.get_registers(Some(2)).unwrap()[0].internal_address, 2);
    }

    #[test]
    fn test_master_define_without_parentheses() {
        let header = "\
#define MODBUS_DEVICE_TYPE_MASTER 1
/* Target slave IDs: 4, 2 */
#define MODBUS_COIL_0001_SLAVE2             (1)
#define MODBUS_COIL_0001_SLAVE4             (1)
";
        let config = parse(header).unwrap();
        assert_eq!(config.role(), Role::Master);
        assert_eq!(config.target_slave_ids(), &[4, 2]);
        assert_eq!(config.get_registers(Some(2)).unwrap().len(), 1);
        assert_eq!(config.get_registers(Some(4)).unwrap().len(), 1);
    }

    #[test]
    fn test_master_define_prefix_is_not_master() {
        let header = "#define MODBUS_DEVICE_TYPE_MASTERY (1)\n#define MODBUS_COIL_0001 (1)\n";
        assert_eq!(parse(header).unwrap().role(), Role::Slave);
    }

    #[test]
    fn test_parse_master_without_targets_drops_unsuffixed() {
        let header = "\
#define MODBUS_DEVICE_TYPE_MASTER           (1)
#define MODBUS_COIL_0001                    (1)
#define MODBUS_COIL_0002_SLAVE9             (2)
";
        let config = parse(header).unwrap();
        assert_eq!(config.target_slave_ids(), &[9]);
        assert_eq!(config.all_registers().len(), 1);
    }

    #[test]
    fn test_parse_skips_duplicates() {
        let header = "\
#define MODBUS_DEVICE_TYPE_SLAVE            (1)
#define MODBUS_COIL_0001                    (1)  /* A */
#define MODBUS_COIL_0001                    (1)  /* B */
#define MODBUS_COIL_0002                    (2)  /* A */
";
        let config = parse(header).unwrap();
        let tags: Vec<&str> = config
            .get_registers(None)
            .unwrap()
            .iter()
            .map(|r| r.tag_name.as_str())
            .collect();
        assert_eq!(tags, vec!["A", "COIL_0002"]);
    }

    #[test]
    fn test_value_literal_wins() {
        let header = "#define MODBUS_DEVICE_TYPE_SLAVE (1)\n#define MODBUS_DI_0003 (7)\n";
        let config = parse(header).unwrap();
        assert_eq!(config.get_registers(None).unwrap()[0].internal_address, 7);
    }

    #[test]
    fn test_parse_restores_settings() {
        let mut config = DeviceConfig::new();
        config
            .settings
            .set(SettingsGroup::Common, "MODBUS_BAUDRATE", "19200")
            .unwrap();
        config
            .settings
            .set(SettingsGroup::Slave, "MODBUS_RESPONSE_DELAY_MS", "5")
            .unwrap();

        let parsed = parse(&generate(&config).header).unwrap();
        assert_eq!(
            parsed
                .settings
                .get(SettingsGroup::Common, "MODBUS_BAUDRATE")
                .unwrap()
                .value,
            "19200"
        );
        assert_eq!(
            parsed
                .settings
                .get(SettingsGroup::Slave, "MODBUS_RESPONSE_DELAY_MS")
                .unwrap()
                .value,
            "5"
        );
    }

    #[test]
    fn test_rejects_unrelated_text() {
        assert!(matches!(
            parse("int main(void) { return 0; }"),
            Err(Error::MalformedConfig(_))
        ));
    }

    #[test]
    fn test_bad_slave_id_is_ignored() {
        let header = "#define MODBUS_DEVICE_TYPE_SLAVE (1)\n#define MODBUS_SLAVE_ID (999)\n";
        let config = parse(header).unwrap();
        assert_eq!(config.slave_id(), 1);
    }
}
