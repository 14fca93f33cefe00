//! Which editor fields apply to a role.
//!
//! The core only stores the role; front ends ask here what to show.

use std::collections::BTreeSet;
use std::fmt;

use crate::device::Role;
use crate::register::Operation;

/// An editable or displayed field of the register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldId {
    SlaveId,
    TargetSlaves,
    Tag,
    Address,
    Region,
    MappedAddress,
    Operation,
    Mode,
}

impl FieldId {
    pub fn label(&self) -> &'static str {
        match self {
            FieldId::SlaveId => "Slave ID",
            FieldId::TargetSlaves => "Target Slaves",
            FieldId::Tag => "Tag",
            FieldId::Address => "Address",
            FieldId::Region => "Type",
            FieldId::MappedAddress => "Mapped",
            FieldId::Operation => "Operation",
            FieldId::Mode => "Mode",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const COMMON_FIELDS: [FieldId; 4] = [
    FieldId::Tag,
    FieldId::Address,
    FieldId::Region,
    FieldId::MappedAddress,
];

/// Fields shown for a device of `role`.
pub fn visible_fields(role: Role) -> BTreeSet<FieldId> {
    let mut fields: BTreeSet<FieldId> = COMMON_FIELDS.into_iter().collect();
    match role {
        Role::Slave => {
            fields.insert(FieldId::SlaveId);
        }
        Role::Master => {
            fields.extend([FieldId::TargetSlaves, FieldId::Operation, FieldId::Mode]);
        }
    }
    fields
}

/// The mode field only applies to write registers.
pub fn mode_enabled(operation: Operation) -> bool {
    operation == Operation::Write
}
