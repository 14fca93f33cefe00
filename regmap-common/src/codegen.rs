//! C header/source generation for a register map.
//!
//! The header carries the device role, communication settings, one address
//! define per register and the range table declaration. The source carries
//! the range table itself and three small accessor functions.
//!
//! ```text
//! #define MODBUS_HOLDING_REG_0005             (5)  /* PUMP_SPEED */
//! #define MODBUS_COIL_0001_SLAVE3             (1)  /* Slave 3: VALVE [Write/Cyclic] */
//! ```

use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::device::{DeviceConfig, OwnedRegister, Role};
use crate::error::Result;
use crate::optimizer::{RegisterRange, optimize};
use crate::register::{Operation, RegisterDescriptor};

pub const DEFAULT_HEADER_NAME: &str = "modbus_registers.h";
pub const DEFAULT_SOURCE_NAME: &str = "modbus_registers.c";

/// Define emitted for master devices.
pub const MASTER_DEFINE: &str = "MODBUS_DEVICE_TYPE_MASTER";
/// Define emitted for slave devices.
pub const SLAVE_DEFINE: &str = "MODBUS_DEVICE_TYPE_SLAVE";
/// Define carrying the slave address of a slave device.
pub const SLAVE_ID_DEFINE: &str = "MODBUS_SLAVE_ID";
/// Define carrying the number of entries in the range table.
pub const RANGES_COUNT_DEFINE: &str = "MODBUS_REGISTER_RANGES_COUNT";

const NAME_WIDTH: usize = 35;

/// Identifier of a register's address define.
///
/// Master devices append `_SLAVE<id>` so that registers of different slaves
/// sharing an address get distinct names.
pub fn register_identifier(register: &RegisterDescriptor, slave_id: Option<u8>) -> String {
    let mut name = format!(
        "MODBUS_{}_{:04}",
        register.region_type.identifier_prefix(),
        register.internal_address
    );
    if let Some(id) = slave_id {
        let _ = write!(name, "_SLAVE{}", id);
    }
    name
}

/// Header guard macro for a header file name, e.g. `MODBUS_REGISTERS_H`.
pub fn include_guard(header_name: &str) -> String {
    header_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The two generated artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub header: String,
    pub source: String,
}

/// Paths of artifacts written by [`CodeGenerator::export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub header_path: PathBuf,
    pub source_path: PathBuf,
    pub files: GeneratedFiles,
}

/// Renders a [`DeviceConfig`] into C code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenerator {
    header_name: String,
    source_name: String,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
            source_name: DEFAULT_SOURCE_NAME.to_string(),
        }
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom file names. The header name also drives the include
    /// guard and the source's `#include`.
    pub fn with_names(header_name: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            source_name: source_name.into(),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Render header and source text.
    pub fn generate(&self, config: &DeviceConfig) -> GeneratedFiles {
        let registers = config.all_registers();
        let ranges = optimize(registers.iter().map(|r| r.register));
        debug!(
            registers = registers.len(),
            ranges = ranges.len(),
            role = %config.role(),
            "Generating register map"
        );

        let header = Header {
            generator: self,
            config,
            registers: &registers,
            ranges: &ranges,
        }
        .to_string();
        let source = Source {
            generator: self,
            ranges: &ranges,
        }
        .to_string();

        GeneratedFiles { header, source }
    }

    /// Render and write both files into `dir`.
    ///
    /// Both files are staged next to their targets before either is renamed
    /// into place. If the source cannot be moved in, the new header is
    /// removed again so the pair never disagrees.
    pub fn export(&self, config: &DeviceConfig, dir: impl AsRef<Path>) -> Result<ExportedFiles> {
        let dir = dir.as_ref();
        let files = self.generate(config);

        let header_path = dir.join(&self.header_name);
        let source_path = dir.join(&self.source_name);
        let staged_header = stage(dir, &files.header)?;
        let staged_source = stage(dir, &files.source)?;

        staged_header.persist(&header_path).map_err(|e| e.error)?;
        if let Err(e) = staged_source.persist(&source_path) {
            if let Err(cleanup) = std::fs::remove_file(&header_path) {
                warn!("Failed to remove {}: {}", header_path.display(), cleanup);
            }
            return Err(e.error.into());
        }

        info!(
            "Exported {} and {} to {}",
            self.header_name,
            self.source_name,
            dir.display()
        );

        Ok(ExportedFiles {
            header_path,
            source_path,
            files,
        })
    }
}

fn stage(dir: &Path, contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Render with the default file names.
pub fn generate(config: &DeviceConfig) -> GeneratedFiles {
    CodeGenerator::default().generate(config)
}

fn write_define(f: &mut fmt::Formatter<'_>, name: &str, value: impl fmt::Display) -> fmt::Result {
    write!(f, "#define {:<width$} ({})", name, value, width = NAME_WIDTH)
}

struct Header<'a> {
    generator: &'a CodeGenerator,
    config: &'a DeviceConfig,
    registers: &'a [OwnedRegister<'a>],
    ranges: &'a [RegisterRange],
}

impl Header<'_> {
    fn write_device(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/* Device Configuration */")?;
        match self.config.role() {
            Role::Master => {
                write_define(f, MASTER_DEFINE, 1)?;
                writeln!(f)?;
                let targets = self.config.target_slave_ids();
                if !targets.is_empty() {
                    let ids: Vec<String> = targets.iter().map(u8::to_string).collect();
                    writeln!(f, "/* Target slave IDs: {} */", ids.join(", "))?;
                }
            }
            Role::Slave => {
                write_define(f, SLAVE_DEFINE, 1)?;
                writeln!(f)?;
                write_define(f, SLAVE_ID_DEFINE, self.config.slave_id())?;
                writeln!(f)?;
            }
        }
        Ok(())
    }

    fn write_settings(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = self.config.role();
        let settings: Vec<_> = self
            .config
            .settings
            .for_role(role)
            // The device slave id define already covers this one.
            .filter(|s| !(role == Role::Slave && s.var_name == SLAVE_ID_DEFINE))
            .filter(|s| is_c_identifier(&s.var_name))
            .filter_map(|s| s.as_integer().map(|v| (s, v)))
            .collect();

        if settings.is_empty() {
            return Ok(());
        }

        writeln!(f, "\n/* Communication Settings */")?;
        for (setting, value) in settings {
            write_define(f, &setting.var_name, value)?;
            if setting.description.is_empty() {
                writeln!(f)?;
            } else {
                writeln!(f, "  /* {} */", setting.description.replace("*/", "* /"))?;
            }
        }
        Ok(())
    }

    fn write_registers(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n/* Register Address Definitions */")?;
        for owned in self.registers {
            let reg = owned.register;
            write_define(
                f,
                &register_identifier(reg, owned.slave_id),
                reg.internal_address,
            )?;
            match owned.slave_id {
                Some(id) => {
                    write!(f, "  /* Slave {}: {} [{}", id, reg.tag_name, reg.operation)?;
                    if reg.operation == Operation::Write {
                        write!(f, "/{}", reg.mode)?;
                    }
                    writeln!(f, "] */")?;
                }
                None => writeln!(f, "  /* {} */", reg.tag_name)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Header<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = include_guard(&self.generator.header_name);

        writeln!(f, "#ifndef {}", guard)?;
        writeln!(f, "#define {}", guard)?;
        writeln!(f)?;
        writeln!(f, "#include <stdint.h>")?;
        writeln!(f, "#include <stdbool.h>")?;
        writeln!(f)?;
        writeln!(f, "/**")?;
        writeln!(f, " * @file    {}", self.generator.header_name)?;
        writeln!(f, " * @brief   Modbus register mapping definitions")?;
        writeln!(f, " * @note    Generated by Modbus Configuration Tool")?;
        writeln!(f, " */")?;
        writeln!(f)?;

        self.write_device(f)?;
        self.write_settings(f)?;
        self.write_registers(f)?;

        writeln!(f, "\n/* Register Ranges Configuration */")?;
        write_define(f, RANGES_COUNT_DEFINE, self.ranges.len())?;
        writeln!(f)?;
        writeln!(f)?;
        f.write_str(
            "/* Register range structure */
typedef struct {
    uint16_t start_addr;        /* Starting internal address */
    uint16_t count;             /* Number of consecutive registers */
    uint8_t  reg_type;          /* Register type (0=coil, 1=DI, 3=IR, 4=HR) */
} modbus_register_range_t;

/* External variable declarations */
extern const modbus_register_range_t g_modbus_register_ranges[];

/* Function prototypes */
bool modbus_is_register_valid(uint16_t addr, uint8_t reg_type);
int modbus_get_register_ranges(const modbus_register_range_t **ranges);
void modbus_registers_init(void);
",
        )?;
        writeln!(f)?;
        writeln!(f, "#endif /* {} */", guard)
    }
}

struct Source<'a> {
    generator: &'a CodeGenerator,
    ranges: &'a [RegisterRange],
}

impl fmt::Display for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#include \"{}\"", self.generator.header_name)?;
        writeln!(f)?;
        writeln!(f, "/**")?;
        writeln!(f, " * @file    {}", self.generator.source_name)?;
        writeln!(f, " * @brief   Modbus register mapping implementation")?;
        writeln!(f, " * @note    Generated by Modbus Configuration Tool")?;
        writeln!(f, " */")?;
        writeln!(f)?;

        writeln!(
            f,
            "/* Optimized register ranges ({} ranges) */",
            self.ranges.len()
        )?;
        writeln!(
            f,
            "const modbus_register_range_t g_modbus_register_ranges[{}] = {{",
            self.ranges.len().max(1)
        )?;
        if self.ranges.is_empty() {
            writeln!(f, "    {{0, 0, 0}}  /* No registers defined */")?;
        }
        for (i, range) in self.ranges.iter().enumerate() {
            let separator = if i + 1 < self.ranges.len() { "," } else { "" };
            writeln!(
                f,
                "    {{{:4}, {:2}, {}}}{}  /* {} */",
                range.start_addr,
                range.count,
                range.region_type.code(),
                separator,
                range.describe()
            )?;
        }
        writeln!(f, "}};")?;
        writeln!(f)?;

        f.write_str(
            "/**
 * @brief   Check if register address is valid for given type
 * @param   addr: Internal register address (0-based)
 * @param   reg_type: Register type (0=coil, 1=DI, 3=IR, 4=HR)
 * @return  true if register is valid, false otherwise
 */
bool
modbus_is_register_valid(uint16_t addr, uint8_t reg_type) {
    for (int i = 0; i < MODBUS_REGISTER_RANGES_COUNT; i++) {
        const modbus_register_range_t *range = &g_modbus_register_ranges[i];
        if (range->reg_type == reg_type &&
            addr >= range->start_addr &&
            addr < range->start_addr + range->count) {
            return true;
        }
    }
    return false;
}

/**
 * @brief   Get pointer to register ranges array
 * @param   ranges: Pointer to store ranges array pointer
 * @return  Number of ranges
 */
int
modbus_get_register_ranges(const modbus_register_range_t **ranges) {
    if (ranges != NULL) {
        *ranges = g_modbus_register_ranges;
    }
    return MODBUS_REGISTER_RANGES_COUNT;
}

/**
 * @brief   Initialize register values to default
 * @note    User can modify this function to set initial values
 */
void
modbus_registers_init(void) {
    /* Initialize register values if needed */
    /* User implementation goes here */
}
",
        )
    }
}
