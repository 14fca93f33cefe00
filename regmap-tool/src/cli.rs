//! Command-line definitions.
//!
//! Every editing command loads the configuration file given as its first
//! argument, applies one change and writes the file back.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use regmap_common::{Mode, Operation, RegionType, Role, SettingsGroup};

/// Edit Modbus RTU register maps and generate C code from them.
#[derive(Parser, Debug)]
#[command(name = "regmap")]
#[command(about = "Modbus RTU register map configurator")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Path to tool configuration file (JSON5 format)
    #[arg(short, long, default_value = "regmap.json5", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a new configuration file
    New(NewArgs),

    /// Switch the device role
    Role(RoleArgs),

    /// Add one register
    Add(AddArgs),

    /// Add a run of consecutive registers, skipping existing ones
    #[command(name = "quick-add")]
    QuickAdd(QuickAddArgs),

    /// Remove the register at an index
    Remove(RemoveArgs),

    /// Remove every register of the current context
    Clear(ContextArgs),

    /// Add a target slave (master role)
    #[command(name = "add-slave")]
    AddSlave(SlaveArgs),

    /// Delete a target slave and its registers (master role)
    #[command(name = "delete-slave")]
    DeleteSlave(SlaveArgs),

    /// Change operation and mode of a register (master role)
    #[command(name = "set-access")]
    SetAccess(SetAccessArgs),

    /// Set the slave ID or a communication setting
    Set(SetArgs),

    /// Show the configuration
    List(ListArgs),

    /// Show the optimized register ranges
    Optimize(OptimizeArgs),

    /// Generate the C header and source
    Export(ExportArgs),

    /// Rebuild a configuration from a generated header
    Import(ImportArgs),

    /// Convert an internal address to its protocol address
    Map(MapArgs),

    /// Convert a protocol address back to the internal address
    Unmap(UnmapArgs),
}

/// Arguments for the `new` command.
#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Configuration file to create (`.cbor` for a binary snapshot)
    pub file: PathBuf,

    /// Device role
    #[arg(long, default_value = "slave", value_parser = parse_role)]
    pub role: Role,

    /// Slave ID of the device (slave role)
    #[arg(long, default_value_t = 1)]
    pub slave_id: u16,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the `role` command.
#[derive(Args, Debug, Clone)]
pub struct RoleArgs {
    pub file: PathBuf,

    /// New role: slave or master
    #[arg(value_parser = parse_role)]
    pub role: Role,
}

/// Register list selection shared by register commands.
#[derive(Args, Debug, Clone)]
pub struct ContextArgs {
    pub file: PathBuf,

    /// Target slave whose list is edited (master role; defaults to the
    /// first target)
    #[arg(short, long)]
    pub slave: Option<u8>,
}

/// Operation and mode options.
#[derive(Args, Debug, Clone, Default)]
pub struct AccessArgs {
    /// Operation: read or write (master role)
    #[arg(long, value_parser = parse_operation)]
    pub operation: Option<Operation>,

    /// Write mode: one-time or cyclic (master role)
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<Mode>,
}

/// Arguments for the `add` command.
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[command(flatten)]
    pub context: ContextArgs,

    /// Internal (0-based) address
    pub address: u16,

    /// Region: coil, di, ir or hr
    #[arg(value_parser = parse_region)]
    pub region: RegionType,

    /// Tag name (generated from region and address when omitted)
    #[arg(short, long)]
    pub tag: Option<String>,

    #[command(flatten)]
    pub access: AccessArgs,
}

/// Arguments for the `quick-add` command.
#[derive(Args, Debug, Clone)]
pub struct QuickAddArgs {
    #[command(flatten)]
    pub context: ContextArgs,

    /// First internal address
    pub start: u16,

    /// Region: coil, di, ir or hr
    #[arg(value_parser = parse_region)]
    pub region: RegionType,

    /// Number of registers
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub count: u16,

    #[command(flatten)]
    pub access: AccessArgs,
}

/// Arguments for the `remove` command.
#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub context: ContextArgs,

    /// Index as shown by `list`
    pub index: usize,
}

/// Arguments for the `add-slave` and `delete-slave` commands.
#[derive(Args, Debug, Clone)]
pub struct SlaveArgs {
    pub file: PathBuf,

    /// Slave ID (1-247)
    pub id: u16,
}

/// Arguments for the `set-access` command.
#[derive(Args, Debug, Clone)]
pub struct SetAccessArgs {
    #[command(flatten)]
    pub context: ContextArgs,

    /// Index as shown by `list`
    pub index: usize,

    #[command(flatten)]
    pub access: AccessArgs,
}

/// Arguments for the `set` command.
#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    pub file: PathBuf,

    /// `slave-id` or a setting variable such as MODBUS_BAUDRATE
    pub name: String,

    pub value: String,

    /// Settings group for a variable that does not exist yet
    #[arg(short, long, value_parser = parse_group)]
    pub group: Option<SettingsGroup>,
}

/// Arguments for the `list` command.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    pub file: PathBuf,

    /// Only list this target slave (master role)
    #[arg(short, long)]
    pub slave: Option<u8>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `optimize` command.
#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    pub file: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `export` command.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    pub file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
}

/// Arguments for the `import` command.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Generated header to read
    pub header: PathBuf,

    /// Configuration file to write
    pub file: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the `map` command.
#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    /// Internal (0-based) address
    pub address: u16,

    /// Region: coil, di, ir or hr
    #[arg(value_parser = parse_region)]
    pub region: RegionType,
}

/// Arguments for the `unmap` command.
#[derive(Args, Debug, Clone)]
pub struct UnmapArgs {
    /// Protocol address, e.g. 40001
    pub mapped: u32,

    /// Region: coil, di, ir or hr
    #[arg(value_parser = parse_region)]
    pub region: RegionType,
}

fn parse_region(s: &str) -> Result<RegionType, String> {
    RegionType::from_keyword(s).ok_or_else(|| format!("unknown region '{}' (coil, di, ir, hr)", s))
}

fn parse_role(s: &str) -> Result<Role, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "slave" => Ok(Role::Slave),
        "master" => Ok(Role::Master),
        _ => Err(format!("unknown role '{}' (slave, master)", s)),
    }
}

fn parse_operation(s: &str) -> Result<Operation, String> {
    Operation::from_keyword(s).ok_or_else(|| format!("unknown operation '{}' (read, write)", s))
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    Mode::from_keyword(s).ok_or_else(|| format!("unknown mode '{}' (one-time, cyclic)", s))
}

fn parse_group(s: &str) -> Result<SettingsGroup, String> {
    SettingsGroup::from_name(s)
        .ok_or_else(|| format!("unknown settings group '{}' (common, master, slave)", s))
}
