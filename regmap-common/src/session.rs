//! Editing session over one device configuration.
//!
//! A [`Session`] owns its [`DeviceConfig`] together with the slave currently
//! selected for register edits. Register operations act on the selected
//! slave's list in master role and on the local list in slave role.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info};

use crate::address::RegionType;
use crate::codegen::{CodeGenerator, ExportedFiles};
use crate::device::{DeviceConfig, Role};
use crate::error::{Error, Result};
use crate::fields::{FieldId, visible_fields};
use crate::import;
use crate::optimizer::{RangeStats, RegisterRange, optimize};
use crate::persistence;
use crate::register::{Access, Mode, Operation, RegisterDescriptor};
use crate::settings::SettingsGroup;

#[derive(Debug, Clone, Default)]
pub struct Session {
    config: DeviceConfig,
    selected_slave: Option<u8>,
    generator: CodeGenerator,
}

impl Session {
    /// Fresh slave configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing configuration. The first target slave, if any, is
    /// selected.
    pub fn from_config(config: DeviceConfig) -> Self {
        let mut session = Self {
            config,
            ..Self::default()
        };
        session.select_first_target();
        session
    }

    /// Use `generator` for exports.
    pub fn with_generator(mut self, generator: CodeGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn into_config(self) -> DeviceConfig {
        self.config
    }

    pub fn role(&self) -> Role {
        self.config.role()
    }

    pub fn selected_slave(&self) -> Option<u8> {
        self.selected_slave
    }

    fn select_first_target(&mut self) {
        self.selected_slave = match self.config.role() {
            Role::Master => self.config.target_slave_ids().first().copied(),
            Role::Slave => None,
        };
    }

    /// Make `id` the slave register edits apply to.
    pub fn select_slave(&mut self, id: u8) -> Result<()> {
        if self.config.role() != Role::Master {
            return Err(Error::WrongRole {
                required: Role::Master,
            });
        }
        if !self.config.target_slave_ids().contains(&id) {
            return Err(Error::NoSelection);
        }
        self.selected_slave = Some(id);
        Ok(())
    }

    /// Registers of the current context.
    pub fn registers(&self) -> Result<&[RegisterDescriptor]> {
        self.config.get_registers(self.selected_slave)
    }

    pub fn set_role(&mut self, role: Role) {
        if role == self.config.role() {
            return;
        }
        self.config.set_role(role);
        self.select_first_target();
        info!("Switched device role to {}", role);
    }

    pub fn set_slave_id(&mut self, id: u16) -> Result<()> {
        self.config.set_slave_id(id)?;
        info!("Slave ID set to {}", id);
        Ok(())
    }

    /// Add a target slave and select it.
    pub fn add_target_slave(&mut self, id: u16) -> Result<u8> {
        let id = self.config.add_target_slave(id)?;
        self.selected_slave = Some(id);
        info!("Added target slave {}", id);
        Ok(id)
    }

    /// Delete a target slave with all of its registers.
    pub fn delete_target_slave(&mut self, id: u8) -> Result<usize> {
        let removed = self.config.delete_target_slave(id)?;
        if self.selected_slave == Some(id) {
            self.selected_slave = None;
        }
        info!(
            "Deleted target slave {} ({} registers)",
            id,
            removed.len()
        );
        Ok(removed.len())
    }

    pub fn add_register(&mut self, register: RegisterDescriptor) -> Result<()> {
        let tag = register.tag_name.clone();
        let mapped = register.mapped_address();
        self.config.add_register(self.selected_slave, register)?;
        debug!(slave = ?self.selected_slave, "Added register {} at {}", tag, mapped);
        Ok(())
    }

    pub fn remove_register(&mut self, index: usize) -> Result<RegisterDescriptor> {
        let removed = self.config.remove_register(self.selected_slave, index)?;
        debug!(slave = ?self.selected_slave, "Removed register {}", removed.tag_name);
        Ok(removed)
    }

    /// Add up to `count` registers from `start`; slots already taken are
    /// skipped. Returns how many were added.
    pub fn quick_add_consecutive(
        &mut self,
        start: u16,
        region: RegionType,
        count: u16,
        access: Access,
    ) -> Result<usize> {
        let added =
            self.config
                .quick_add_consecutive(self.selected_slave, start, region, count, access)?;
        info!(
            "Added {} of {} consecutive {} registers from {}",
            added,
            count,
            region.label(),
            start
        );
        Ok(added)
    }

    pub fn remove_all(&mut self) -> Result<usize> {
        let removed = self.config.remove_all(self.selected_slave)?;
        info!("Removed {} registers", removed);
        Ok(removed)
    }

    pub fn set_operation(&mut self, index: usize, operation: Operation) -> Result<Access> {
        self.config
            .set_operation(self.selected_slave, index, operation)
    }

    pub fn set_mode(&mut self, index: usize, mode: Mode) -> Result<Access> {
        self.config.set_mode(self.selected_slave, index, mode)
    }

    pub fn set_setting(&mut self, group: SettingsGroup, var_name: &str, value: &str) -> Result<()> {
        self.config.set_setting(group, var_name, value)?;
        info!("Setting {}.{} = {}", group, var_name, value.trim());
        Ok(())
    }

    /// Ranges over every register the export would contain.
    pub fn optimize(&self) -> Vec<RegisterRange> {
        let registers = self.config.all_registers();
        optimize(registers.iter().map(|r| r.register))
    }

    pub fn stats(&self) -> RangeStats {
        let registers = self.config.all_registers().len();
        RangeStats::new(registers, self.optimize().len())
    }

    pub fn visible_fields(&self) -> BTreeSet<FieldId> {
        visible_fields(self.config.role())
    }

    /// Write header and source into `dir`.
    pub fn export(&self, dir: impl AsRef<Path>) -> Result<ExportedFiles> {
        self.generator.export(&self.config, dir)
    }

    /// Replace the configuration with one parsed from a generated header.
    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.config = import::import_file(path)?;
        self.select_first_target();
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persistence::save_file(&self.config, path)
    }

    /// Replace the configuration with a persisted one. On error the
    /// session is unchanged.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.config = persistence::load_file(path)?;
        self.select_first_target();
        info!("Loaded {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hr(address: u16) -> RegisterDescriptor {
        RegisterDescriptor::with_default_tag(address, RegionType::HoldingRegister)
    }

    #[test]
    fn test_slave_session() {
        let mut session = Session::new();
        session.set_slave_id(12).unwrap();
        for addr in [0, 1, 2, 5, 6] {
            session.add_register(hr(addr)).unwrap();
        }

        assert_eq!(session.registers().unwrap().len(), 5);
        assert_eq!(session.optimize().len(), 2);
        assert_eq!(session.stats().reduction_pct(), Some(60.0));
        assert!(session.visible_fields().contains(&FieldId::SlaveId));
    }

    #[test]
    fn test_master_needs_selection() {
        let mut session = Session::new();
        session.set_role(Role::Master);
        assert!(matches!(
            session.add_register(hr(0)),
            Err(Error::NoSelection)
        ));

        session.add_target_slave(3).unwrap();
        assert_eq!(session.selected_slave(), Some(3));
        session.add_register(hr(0)).unwrap();

        session.add_target_slave(4).unwrap();
        session.add_register(hr(0)).unwrap();
        session.select_slave(3).unwrap();
        assert_eq!(session.registers().unwrap().len(), 1);

        // Same address on two slaves merges into one range.
        assert_eq!(session.optimize().len(), 1);
        assert_eq!(session.stats().registers, 2);
    }

    #[test]
    fn test_delete_selected_slave_clears_selection() {
        let mut session = Session::new();
        session.set_role(Role::Master);
        session.add_target_slave(3).unwrap();
        session.add_register(hr(1)).unwrap();

        assert_eq!(session.delete_target_slave(3).unwrap(), 1);
        assert_eq!(session.selected_slave(), None);
        assert!(matches!(session.select_slave(3), Err(Error::NoSelection)));
    }

    #[test]
    fn test_select_slave_requires_master() {
        let mut session = Session::new();
        assert!(matches!(
            session.select_slave(1),
            Err(Error::WrongRole { .. })
        ));
    }

    #[test]
    fn test_role_switch_keeps_both_lists() {
        let mut session = Session::new();
        session.add_register(hr(9)).unwrap();

        session.set_role(Role::Master);
        session.add_target_slave(2).unwrap();
        session.add_register(hr(1)).unwrap();

        session.set_role(Role::Slave);
        assert_eq!(session.selected_slave(), None);
        assert_eq!(session.registers().unwrap()[0].internal_address, 9);

        session.set_role(Role::Master);
        assert_eq!(session.selected_slave(), Some(2));
        assert_eq!(session.registers().unwrap()[0].internal_address, 1);
    }

    #[test]
    fn test_access_edits() {
        let mut session = Session::new();
        session.set_role(Role::Master);
        session.add_target_slave(5).unwrap();
        session.add_register(hr(0)).unwrap();

        assert!(matches!(
            session.set_mode(0, Mode::Cyclic),
            Err(Error::ModeRequiresWrite(_))
        ));
        assert_eq!(
            session.set_operation(0, Operation::Write).unwrap(),
            Access::write(Mode::OneTime)
        );
        assert_eq!(
            session.set_mode(0, Mode::Cyclic).unwrap(),
            Access::write(Mode::Cyclic)
        );
    }

    #[test]
    fn test_save_load_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new();
        session.set_role(Role::Master);
        session.add_target_slave(7).unwrap();
        session
            .quick_add_consecutive(10, RegionType::Coil, 5, Access::read())
            .unwrap();

        let path = dir.path().join("device.json");
        session.save(&path).unwrap();

        let mut loaded = Session::new();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.config(), session.config());
        assert_eq!(loaded.selected_slave(), Some(7));

        let exported = session.export(dir.path()).unwrap();
        let mut imported = Session::new();
        imported.import(&exported.header_path).unwrap();
        assert_eq!(imported.config().target_slave_ids(), &[7]);
        assert_eq!(imported.registers().unwrap().len(), 5);
    }

    #[test]
    fn test_failed_load_keeps_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"slave_id\": 0}").unwrap();

        let mut session = Session::new();
        session.add_register(hr(1)).unwrap();
        assert!(session.load(&path).is_err());
        assert_eq!(session.registers().unwrap().len(), 1);
    }
}
