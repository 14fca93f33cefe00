//! Command implementations.
//!
//! Each command is a thin adapter: load the configuration into a
//! [`Session`], call one session operation, save. Human-readable output goes
//! to the writer passed in; logs go to stderr.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regmap_common::{
    Access, DeviceConfig, FieldId, Operation, RangeStats, RegisterDescriptor, RegisterRange,
    Role, Session, ToolConfig, import, map_address, mode_enabled, persistence, unmap_address,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::{
    AccessArgs, AddArgs, Command, ContextArgs, ExportArgs, ImportArgs, ListArgs, MapArgs,
    NewArgs, OptimizeArgs, QuickAddArgs, RemoveArgs, RoleArgs, SetAccessArgs, SetArgs,
    SlaveArgs, UnmapArgs,
};

/// Execute `command`, writing its output to `out`.
pub fn run(command: &Command, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::New(args) => new(args, out),
        Command::Role(args) => role(args, tool, out),
        Command::Add(args) => add(args, tool, out),
        Command::QuickAdd(args) => quick_add(args, tool, out),
        Command::Remove(args) => remove(args, tool, out),
        Command::Clear(args) => clear(args, tool, out),
        Command::AddSlave(args) => add_slave(args, tool, out),
        Command::DeleteSlave(args) => delete_slave(args, tool, out),
        Command::SetAccess(args) => set_access(args, tool, out),
        Command::Set(args) => set(args, tool, out),
        Command::List(args) => list(args, tool, out),
        Command::Optimize(args) => optimize(args, tool, out),
        Command::Export(args) => export(args, tool, out),
        Command::Import(args) => import_header(args, out),
        Command::Map(args) => map(args, out),
        Command::Unmap(args) => unmap(args, out),
    }
}

fn open(path: &Path, tool: &ToolConfig) -> Result<Session> {
    let config = persistence::load_file(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    debug!("Loaded configuration from {:?}", path);
    Ok(Session::from_config(config).with_generator(tool.export.generator()))
}

fn save(session: &Session, path: &Path) -> Result<()> {
    session
        .save(path)
        .with_context(|| format!("Failed to save configuration to {:?}", path))
}

/// Load and select the register list named by `context`.
fn open_context(context: &ContextArgs, tool: &ToolConfig) -> Result<Session> {
    let mut session = open(&context.file, tool)?;
    match (session.role(), context.slave) {
        (Role::Master, Some(id)) => session
            .select_slave(id)
            .with_context(|| format!("Slave {} is not a target slave", id))?,
        (Role::Master, None) => match session.selected_slave() {
            Some(id) => debug!("No --slave given; using slave {}", id),
            None => bail!("No target slaves; add one with `regmap add-slave`"),
        },
        (Role::Slave, Some(_)) => bail!("--slave only applies to master configurations"),
        (Role::Slave, None) => {}
    }
    Ok(session)
}

fn access_for(args: &AccessArgs, role: Role) -> Result<Access> {
    if role == Role::Slave && (args.operation.is_some() || args.mode.is_some()) {
        bail!("--operation and --mode only apply to master configurations");
    }
    let operation = args.operation.unwrap_or(match args.mode {
        Some(_) => Operation::Write,
        None => Operation::Read,
    });
    if args.mode.is_some() && !mode_enabled(operation) {
        bail!("--mode only applies to write registers");
    }
    Ok(Access::new(operation, args.mode.unwrap_or_default()).normalized_for(role))
}

fn ensure_absent(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{:?} already exists; use --force to overwrite", path);
    }
    Ok(())
}

fn new(args: &NewArgs, out: &mut dyn Write) -> Result<()> {
    ensure_absent(&args.file, args.force)?;

    let mut session = Session::new();
    session.set_role(args.role);
    session.set_slave_id(args.slave_id)?;
    save(&session, &args.file)?;

    writeln!(
        out,
        "Created {} configuration {}",
        args.role,
        args.file.display()
    )?;
    Ok(())
}

fn role(args: &RoleArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open(&args.file, tool)?;
    session.set_role(args.role);
    save(&session, &args.file)?;
    writeln!(out, "Device role: {}", args.role)?;
    Ok(())
}

fn add(args: &AddArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open_context(&args.context, tool)?;
    let access = access_for(&args.access, session.role())?;

    let register = RegisterDescriptor::new(args.tag.as_deref(), args.address, args.region)?
        .with_access(access);
    let tag = register.tag_name.clone();
    let mapped = register.mapped_address();
    session.add_register(register)?;
    save(&session, &args.context.file)?;

    writeln!(out, "Added {} at {} ({})", tag, mapped, args.region.label())?;
    Ok(())
}

fn quick_add(args: &QuickAddArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open_context(&args.context, tool)?;
    let access = access_for(&args.access, session.role())?;

    let added = session.quick_add_consecutive(args.start, args.region, args.count, access)?;
    save(&session, &args.context.file)?;

    writeln!(
        out,
        "Added {} of {} registers ({} skipped)",
        added,
        args.count,
        usize::from(args.count) - added
    )?;
    Ok(())
}

fn remove(args: &RemoveArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open_context(&args.context, tool)?;
    let removed = session.remove_register(args.index)?;
    save(&session, &args.context.file)?;
    writeln!(
        out,
        "Removed {} at {}",
        removed.tag_name,
        removed.mapped_address()
    )?;
    Ok(())
}

fn clear(args: &ContextArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open_context(args, tool)?;
    let removed = session.remove_all()?;
    save(&session, &args.file)?;
    writeln!(out, "Removed {} registers", removed)?;
    Ok(())
}

fn add_slave(args: &SlaveArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open(&args.file, tool)?;
    let id = session.add_target_slave(args.id)?;
    save(&session, &args.file)?;
    writeln!(out, "Added target slave {}", id)?;
    Ok(())
}

fn delete_slave(args: &SlaveArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open(&args.file, tool)?;
    let Ok(id) = u8::try_from(args.id) else {
        bail!("Slave {} is not a target slave", args.id);
    };
    let removed = session.delete_target_slave(id)?;
    save(&session, &args.file)?;
    writeln!(
        out,
        "Deleted target slave {} and {} registers",
        id, removed
    )?;
    Ok(())
}

fn set_access(args: &SetAccessArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open_context(&args.context, tool)?;
    if session.role() != Role::Master {
        bail!("Operation and mode only apply to master configurations");
    }
    if args.access.operation.is_none() && args.access.mode.is_none() {
        bail!("Nothing to change; pass --operation and/or --mode");
    }

    let mut access = None;
    if let Some(operation) = args.access.operation {
        access = Some(session.set_operation(args.index, operation)?);
    }
    if let Some(mode) = args.access.mode {
        access = Some(session.set_mode(args.index, mode)?);
    }
    save(&session, &args.context.file)?;

    if let Some(access) = access {
        writeln!(out, "Register {}: {}", args.index, format_access(&access))?;
    }
    Ok(())
}

fn set(args: &SetArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let mut session = open(&args.file, tool)?;

    let name = args.name.trim();
    if name.eq_ignore_ascii_case("slave-id") || name.eq_ignore_ascii_case("slave_id") {
        let id: u16 = args
            .value
            .trim()
            .parse()
            .with_context(|| format!("Invalid slave ID {:?}", args.value))?;
        session.set_slave_id(id)?;
    } else {
        let group = match args.group {
            Some(group) => group,
            None => match session.config().settings.find(name) {
                Some((group, _)) => group,
                None => bail!("Unknown setting {}; pass --group to add it", name),
            },
        };
        session.set_setting(group, name, &args.value)?;
    }
    save(&session, &args.file)?;

    writeln!(out, "{} = {}", name, args.value.trim())?;
    Ok(())
}

fn format_access(access: &Access) -> String {
    if mode_enabled(access.operation) {
        format!("{}/{}", access.operation, access.mode)
    } else {
        access.operation.to_string()
    }
}

/// One register as shown by `list`.
#[derive(Debug, Serialize)]
struct RegisterRow {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    slave_id: Option<u8>,
    tag: String,
    address: u16,
    region: String,
    mapped: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
}

#[derive(Debug, Serialize)]
struct Listing {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    slave_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_slaves: Option<Vec<u8>>,
    registers: Vec<RegisterRow>,
}

fn listing(config: &DeviceConfig, only: Option<u8>) -> Listing {
    let master = config.role().is_master();
    let mut registers = Vec::new();
    let mut index = 0;
    let mut current = None;

    for owned in config.all_registers() {
        if owned.slave_id != current {
            current = owned.slave_id;
            index = 0;
        }
        if only.is_none() || owned.slave_id == only {
            let reg = owned.register;
            registers.push(RegisterRow {
                index,
                slave_id: owned.slave_id,
                tag: reg.tag_name.clone(),
                address: reg.internal_address,
                region: reg.region_type.display_name().to_string(),
                mapped: reg.mapped_address(),
                operation: master.then(|| reg.operation.to_string()),
                mode: (master && mode_enabled(reg.operation)).then(|| reg.mode.to_string()),
            });
        }
        index += 1;
    }

    Listing {
        role: config.role().to_string(),
        slave_id: (!master).then(|| config.slave_id()),
        target_slaves: master.then(|| config.target_slave_ids().to_vec()),
        registers,
    }
}

fn list(args: &ListArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let session = open(&args.file, tool)?;
    let config = session.config();
    if let Some(id) = args.slave {
        if !config.role().is_master() || !config.target_slave_ids().contains(&id) {
            bail!("Slave {} is not a target slave", id);
        }
    }

    let listing = listing(config, args.slave);
    if args.json {
        serde_json::to_writer_pretty(&mut *out, &listing)?;
        writeln!(out)?;
        return Ok(());
    }

    let fields = session.visible_fields();
    writeln!(out, "Role: {}", listing.role)?;
    if let Some(id) = listing.slave_id {
        writeln!(out, "{}: {}", FieldId::SlaveId, id)?;
    }
    if let Some(targets) = &listing.target_slaves {
        let ids: Vec<String> = targets.iter().map(u8::to_string).collect();
        writeln!(out, "{}: {}", FieldId::TargetSlaves, ids.join(", "))?;
    }
    if listing.registers.is_empty() {
        writeln!(out, "No registers")?;
        return Ok(());
    }

    write!(
        out,
        "{:>5}  {:<20} {:>7}  {:<22} {:>7}",
        "#",
        FieldId::Tag,
        FieldId::Address,
        FieldId::Region,
        FieldId::MappedAddress
    )?;
    if fields.contains(&FieldId::Operation) {
        write!(out, "  {:<10} {}", FieldId::Operation, FieldId::Mode)?;
    }
    writeln!(out)?;

    let mut current = None;
    for row in &listing.registers {
        if row.slave_id.is_some() && row.slave_id != current {
            current = row.slave_id;
            if let Some(id) = row.slave_id {
                writeln!(out, "Slave {}:", id)?;
            }
        }
        write!(
            out,
            "{:>5}  {:<20} {:>7}  {:<22} {:>7}",
            row.index, row.tag, row.address, row.region, row.mapped
        )?;
        if let Some(operation) = &row.operation {
            write!(
                out,
                "  {:<10} {}",
                operation,
                row.mode.as_deref().unwrap_or("-")
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct RangeReport<'a> {
    ranges: &'a [RegisterRange],
    registers: usize,
    reduction_pct: Option<f64>,
}

fn optimize(args: &OptimizeArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let session = open(&args.file, tool)?;
    let ranges = session.optimize();
    let stats = RangeStats::new(session.config().all_registers().len(), ranges.len());

    if args.json {
        let report = RangeReport {
            ranges: &ranges,
            registers: stats.registers,
            reduction_pct: stats.reduction_pct(),
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    for range in &ranges {
        writeln!(
            out,
            "{:<24} start {:>5}  count {:>5}  type {}",
            range.describe(),
            range.start_addr,
            range.count,
            range.region_type.code()
        )?;
    }
    writeln!(out, "{}", stats)?;
    Ok(())
}

fn export(args: &ExportArgs, tool: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let session = open(&args.file, tool)?;
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {:?}", args.out_dir))?;
    let exported = session
        .export(&args.out_dir)
        .with_context(|| format!("Failed to export to {:?}", args.out_dir))?;

    writeln!(out, "Wrote {}", exported.header_path.display())?;
    writeln!(out, "Wrote {}", exported.source_path.display())?;
    writeln!(out, "{}", session.stats())?;
    Ok(())
}

fn import_header(args: &ImportArgs, out: &mut dyn Write) -> Result<()> {
    ensure_absent(&args.file, args.force)?;

    let config = import::import_file(&args.header)
        .with_context(|| format!("Failed to import {:?}", args.header))?;
    let session = Session::from_config(config);
    save(&session, &args.file)?;
    info!("Imported {:?} into {:?}", args.header, args.file);

    writeln!(
        out,
        "Imported {} registers ({} role) into {}",
        session.config().all_registers().len(),
        session.role(),
        args.file.display()
    )?;
    Ok(())
}

fn map(args: &MapArgs, out: &mut dyn Write) -> Result<()> {
    let (mapped, label) = map_address(args.address, args.region);
    writeln!(out, "{} ({})", mapped, label)?;
    Ok(())
}

fn unmap(args: &UnmapArgs, out: &mut dyn Write) -> Result<()> {
    let Some(internal) = unmap_address(args.mapped, args.region) else {
        bail!(
            "{} is outside the {} address window",
            args.mapped,
            args.region.display_name()
        );
    };
    writeln!(out, "{}", internal)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmap_common::Mode;

    #[test]
    fn test_access_for_master() {
        let args = AccessArgs::default();
        assert_eq!(access_for(&args, Role::Master).unwrap(), Access::read());

        let args = AccessArgs {
            operation: None,
            mode: Some(Mode::Cyclic),
        };
        assert_eq!(
            access_for(&args, Role::Master).unwrap(),
            Access::write(Mode::Cyclic)
        );

        let args = AccessArgs {
            operation: Some(Operation::Write),
            mode: None,
        };
        assert_eq!(
            access_for(&args, Role::Master).unwrap(),
            Access::write(Mode::OneTime)
        );

        let args = AccessArgs {
            operation: Some(Operation::Read),
            mode: Some(Mode::Cyclic),
        };
        assert!(access_for(&args, Role::Master).is_err());
    }

    #[test]
    fn test_access_for_slave() {
        assert_eq!(
            access_for(&AccessArgs::default(), Role::Slave).unwrap(),
            Access::default()
        );
        let args = AccessArgs {
            operation: Some(Operation::Write),
            mode: None,
        };
        assert!(access_for(&args, Role::Slave).is_err());
    }

    #[test]
    fn test_map_and_unmap() {
        let mut out = Vec::new();
        map(
            &MapArgs {
                address: 0,
                region: regmap_common::RegionType::HoldingRegister,
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "40001 (HR)\n");

        let mut out = Vec::new();
        unmap(
            &UnmapArgs {
                mapped: 30011,
                region: regmap_common::RegionType::InputRegister,
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "10\n");

        let mut out = Vec::new();
        assert!(
            unmap(
                &UnmapArgs {
                    mapped: 5,
                    region: regmap_common::RegionType::HoldingRegister,
                },
                &mut out,
            )
            .is_err()
        );
    }
}
