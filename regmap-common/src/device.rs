//! Device configuration and the per-context register store.
//!
//! A slave device owns a single register list. A master owns one list per
//! target slave; lists are created by [`DeviceConfig::add_target_slave`] and
//! removed with the slave, never fabricated on lookup.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::RegionType;
use crate::error::{Error, Result};
use crate::register::{Access, Mode, Operation, RegisterDescriptor, default_tag_name, is_valid_tag};
use crate::settings::{SLAVE_ID_SETTING, Settings, SettingsGroup, validate_value};

/// Lowest valid Modbus slave address.
pub const MIN_SLAVE_ID: u8 = 1;
/// Highest valid Modbus slave address.
pub const MAX_SLAVE_ID: u8 = 247;

/// Check that `id` is a valid slave address.
pub fn validate_slave_id(id: u16) -> Result<u8> {
    match u8::try_from(id) {
        Ok(id) if (MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&id) => Ok(id),
        _ => Err(Error::InvalidSlaveId(id)),
    }
}

/// Device role on the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Slave,
    Master,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Slave => "Slave",
            Role::Master => "Master",
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A register together with the slave it belongs to (master role only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedRegister<'a> {
    pub slave_id: Option<u8>,
    pub register: &'a RegisterDescriptor,
}

/// Complete device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    role: Role,
    slave_id: u8,
    target_slave_ids: Vec<u8>,
    registers: Vec<RegisterDescriptor>,
    slave_registers: BTreeMap<u8, Vec<RegisterDescriptor>>,
    pub settings: Settings,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            role: Role::Slave,
            slave_id: MIN_SLAVE_ID,
            target_slave_ids: Vec::new(),
            registers: Vec::new(),
            slave_registers: BTreeMap::new(),
            settings: Settings::default(),
        }
    }
}

impl DeviceConfig {
    /// Fresh slave configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh configuration for `role`.
    pub fn with_role(role: Role) -> Self {
        Self {
            role,
            ..Self::new()
        }
    }

    pub(crate) fn from_parts(
        role: Role,
        slave_id: u8,
        target_slave_ids: Vec<u8>,
        registers: Vec<RegisterDescriptor>,
        slave_registers: BTreeMap<u8, Vec<RegisterDescriptor>>,
        settings: Settings,
    ) -> Self {
        let mut config = Self {
            role,
            slave_id,
            target_slave_ids,
            registers,
            slave_registers,
            settings,
        };
        config.settings.sync_slave_id(slave_id);
        config
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Switch role. Both register shapes are kept; only the active one
    /// changes.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn set_slave_id(&mut self, id: u16) -> Result<()> {
        self.slave_id = validate_slave_id(id)?;
        self.settings.sync_slave_id(self.slave_id);
        Ok(())
    }

    /// Set a setting. `MODBUS_SLAVE_ID` changes the device slave id,
    /// whichever group is given.
    pub fn set_setting(&mut self, group: SettingsGroup, var_name: &str, value: &str) -> Result<()> {
        if var_name != SLAVE_ID_SETTING {
            return self.settings.set(group, var_name, value);
        }
        validate_value(var_name, value)?;
        let id = value
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::invalid_setting(var_name, value, "expected 1-247"))?;
        self.set_slave_id(id)
    }

    /// Target slaves in the order they were added.
    pub fn target_slave_ids(&self) -> &[u8] {
        &self.target_slave_ids
    }

    /// The slave-role register list, regardless of the current role.
    pub fn local_registers(&self) -> &[RegisterDescriptor] {
        &self.registers
    }

    /// Register lists of all target slaves.
    pub fn slave_registers(&self) -> &BTreeMap<u8, Vec<RegisterDescriptor>> {
        &self.slave_registers
    }

    /// Register a new target slave with an empty register list.
    pub fn add_target_slave(&mut self, id: u16) -> Result<u8> {
        self.require_role(Role::Master)?;
        let id = validate_slave_id(id)?;
        if self.target_slave_ids.contains(&id) {
            return Err(Error::DuplicateSlave(id));
        }
        self.target_slave_ids.push(id);
        self.slave_registers.insert(id, Vec::new());
        Ok(id)
    }

    /// Remove a target slave and its whole register list.
    pub fn delete_target_slave(&mut self, id: u8) -> Result<Vec<RegisterDescriptor>> {
        self.require_role(Role::Master)?;
        let pos = self
            .target_slave_ids
            .iter()
            .position(|&t| t == id)
            .ok_or(Error::NoSelection)?;
        self.target_slave_ids.remove(pos);
        Ok(self.slave_registers.remove(&id).unwrap_or_default())
    }

    /// The active register list.
    ///
    /// In slave role `slave` is ignored. In master role it must name an
    /// existing target slave.
    pub fn get_registers(&self, slave: Option<u8>) -> Result<&[RegisterDescriptor]> {
        match self.role {
            Role::Slave => Ok(&self.registers),
            Role::Master => slave
                .and_then(|id| self.slave_registers.get(&id))
                .map(Vec::as_slice)
                .ok_or(Error::NoSelection),
        }
    }

    fn registers_mut(&mut self, slave: Option<u8>) -> Result<&mut Vec<RegisterDescriptor>> {
        match self.role {
            Role::Slave => Ok(&mut self.registers),
            Role::Master => slave
                .and_then(|id| self.slave_registers.get_mut(&id))
                .ok_or(Error::NoSelection),
        }
    }

    /// Append a register to the active list.
    ///
    /// The register's access is normalized for the current role.
    pub fn add_register(&mut self, slave: Option<u8>, register: RegisterDescriptor) -> Result<()> {
        let role = self.role;
        let list = self.registers_mut(slave)?;
        check_insertable(list, &register)?;

        let access = register.access().normalized_for(role);
        list.push(register.with_access(access));
        Ok(())
    }

    /// Remove the register at `index` from the active list.
    pub fn remove_register(&mut self, slave: Option<u8>, index: usize) -> Result<RegisterDescriptor> {
        let list = self.registers_mut(slave)?;
        if index >= list.len() {
            return Err(Error::OutOfRange {
                index,
                len: list.len(),
            });
        }
        Ok(list.remove(index))
    }

    /// Clear the active list, returning how many registers were removed.
    pub fn remove_all(&mut self, slave: Option<u8>) -> Result<usize> {
        let list = self.registers_mut(slave)?;
        let removed = list.len();
        list.clear();
        Ok(removed)
    }

    /// Add `count` registers starting at `start`, skipping any slot (or
    /// generated tag) that is already taken. Returns how many were added.
    pub fn quick_add_consecutive(
        &mut self,
        slave: Option<u8>,
        start: u16,
        region: RegionType,
        count: u16,
        access: Access,
    ) -> Result<usize> {
        let access = access.normalized_for(self.role);
        let list = self.registers_mut(slave)?;

        let mut added = 0;
        for offset in 0..count {
            let Some(address) = start.checked_add(offset) else {
                break;
            };
            let register = RegisterDescriptor {
                tag_name: default_tag_name(address, region),
                internal_address: address,
                region_type: region,
                operation: access.operation,
                mode: access.mode,
            };
            if check_insertable(list, &register).is_ok() {
                list.push(register);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Change the operation of an existing register.
    ///
    /// Switching to read clears the mode; switching to write defaults it to
    /// one-time.
    pub fn set_operation(
        &mut self,
        slave: Option<u8>,
        index: usize,
        operation: Operation,
    ) -> Result<Access> {
        self.require_role(Role::Master)?;
        let register = self.register_mut(slave, index)?;
        let access = Access::new(operation, register.mode).normalized_for(Role::Master);
        register.set_access(access);
        Ok(access)
    }

    /// Change the write mode of an existing write register.
    pub fn set_mode(&mut self, slave: Option<u8>, index: usize, mode: Mode) -> Result<Access> {
        self.require_role(Role::Master)?;
        let register = self.register_mut(slave, index)?;
        if register.operation != Operation::Write {
            return Err(Error::ModeRequiresWrite(register.tag_name.clone()));
        }
        let access = Access::write(mode);
        register.set_access(access);
        Ok(access)
    }

    fn register_mut(&mut self, slave: Option<u8>, index: usize) -> Result<&mut RegisterDescriptor> {
        let list = self.registers_mut(slave)?;
        let len = list.len();
        list.get_mut(index)
            .ok_or(Error::OutOfRange { index, len })
    }

    /// Every register the exporter sees.
    ///
    /// Slave role yields the local list. Master role yields each target's
    /// list in target order, tagged with the slave id.
    pub fn all_registers(&self) -> Vec<OwnedRegister<'_>> {
        match self.role {
            Role::Slave => self
                .registers
                .iter()
                .map(|register| OwnedRegister {
                    slave_id: None,
                    register,
                })
                .collect(),
            Role::Master => self
                .target_slave_ids
                .iter()
                .filter_map(|id| self.slave_registers.get(id).map(|regs| (*id, regs)))
                .flat_map(|(id, regs)| {
                    regs.iter().map(move |register| OwnedRegister {
                        slave_id: Some(id),
                        register,
                    })
                })
                .collect(),
        }
    }

    /// Check every structural invariant. Used after decoding persisted data.
    pub fn validate(&self) -> Result<()> {
        validate_slave_id(u16::from(self.slave_id))?;

        for (i, id) in self.target_slave_ids.iter().enumerate() {
            validate_slave_id(u16::from(*id))?;
            if self.target_slave_ids[..i].contains(id) {
                return Err(Error::DuplicateSlave(*id));
            }
            if !self.slave_registers.contains_key(id) {
                return Err(Error::NoSelection);
            }
        }
        if self.slave_registers.len() != self.target_slave_ids.len() {
            return Err(Error::NoSelection);
        }

        validate_list(&self.registers)?;
        for list in self.slave_registers.values() {
            validate_list(list)?;
        }
        Ok(())
    }

    fn require_role(&self, required: Role) -> Result<()> {
        if self.role == required {
            Ok(())
        } else {
            Err(Error::WrongRole { required })
        }
    }
}

fn check_insertable(list: &[RegisterDescriptor], register: &RegisterDescriptor) -> Result<()> {
    if !is_valid_tag(&register.tag_name) {
        return Err(Error::InvalidTagFormat(register.tag_name.clone()));
    }
    if list.iter().any(|r| r.tag_name == register.tag_name) {
        return Err(Error::DuplicateTag(register.tag_name.clone()));
    }
    if list.iter().any(|r| r.same_slot(register)) {
        return Err(Error::DuplicateAddress {
            mapped: register.mapped_address(),
            label: register.mapped_label(),
        });
    }
    Ok(())
}

fn validate_list(list: &[RegisterDescriptor]) -> Result<()> {
    for (i, register) in list.iter().enumerate() {
        check_insertable(&list[..i], register)?;
    }
    Ok(())
}
