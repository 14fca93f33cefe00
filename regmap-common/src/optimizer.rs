//! Coalesce registers into contiguous address ranges.
//!
//! Each range is one Modbus request: a start address, a count and a region.
//! Registers are grouped by region (ascending protocol code, so the output is
//! stable across runs) and consecutive internal addresses are merged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::RegionType;
use crate::register::RegisterDescriptor;

/// Longest run one range can describe; the generated table stores counts as
/// `uint16_t`.
pub const MAX_RANGE_COUNT: u16 = u16::MAX;

/// A maximal run of consecutive addresses within one region, at most
/// [`MAX_RANGE_COUNT`] long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterRange {
    pub start_addr: u16,
    pub count: u16,
    pub region_type: RegionType,
}

impl RegisterRange {
    /// Last address covered by this range.
    pub fn end_addr(&self) -> u16 {
        // count >= 1 and the run never passes u16::MAX
        (u32::from(self.start_addr) + u32::from(self.count) - 1) as u16
    }

    /// Whether `addr` of `region` is served by this range.
    pub fn contains(&self, addr: u16, region: RegionType) -> bool {
        region == self.region_type
            && u32::from(addr) >= u32::from(self.start_addr)
            && u32::from(addr) < u32::from(self.start_addr) + u32::from(self.count)
    }

    /// Comment text used next to the range in generated code,
    /// e.g. `Holding Regs 0-2` or `Coils 7`.
    pub fn describe(&self) -> String {
        if self.count == 1 {
            format!("{} {}", self.region_type.range_name(), self.start_addr)
        } else {
            format!(
                "{} {}-{}",
                self.region_type.range_name(),
                self.start_addr,
                self.end_addr()
            )
        }
    }
}

/// Compute the ranges for a set of registers.
pub fn optimize<'a, I>(registers: I) -> Vec<RegisterRange>
where
    I: IntoIterator<Item = &'a RegisterDescriptor>,
{
    let mut groups: BTreeMap<u8, (RegionType, Vec<u16>)> = BTreeMap::new();
    for reg in registers {
        groups
            .entry(reg.region_type.code())
            .or_insert_with(|| (reg.region_type, Vec::new()))
            .1
            .push(reg.internal_address);
    }

    let mut ranges = Vec::new();
    for (region, mut addresses) in groups.into_values() {
        addresses.sort_unstable();
        // Merged multi-slave exports can repeat an address.
        addresses.dedup();
        collapse_runs(&addresses, region, &mut ranges);
    }
    ranges
}

fn collapse_runs(sorted: &[u16], region: RegionType, out: &mut Vec<RegisterRange>) {
    let Some((&first, rest)) = sorted.split_first() else {
        return;
    };

    let mut start = first;
    let mut previous = first;
    let mut count = 1u16;

    for &addr in rest {
        if u32::from(addr) == u32::from(previous) + 1 && count < MAX_RANGE_COUNT {
            count += 1;
        } else {
            out.push(RegisterRange {
                start_addr: start,
                count,
                region_type: region,
            });
            start = addr;
            count = 1;
        }
        previous = addr;
    }

    out.push(RegisterRange {
        start_addr: start,
        count,
        region_type: region,
    });
}

/// Whether any range of `region` contains `addr`.
pub fn is_register_valid(ranges: &[RegisterRange], addr: u16, region: RegionType) -> bool {
    ranges.iter().any(|r| r.contains(addr, region))
}

/// Register/range counts of an optimization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStats {
    pub registers: usize,
    pub ranges: usize,
}

impl RangeStats {
    pub fn new(registers: usize, ranges: usize) -> Self {
        Self { registers, ranges }
    }

    /// Percentage of requests saved; `None` when there are no registers.
    pub fn reduction_pct(&self) -> Option<f64> {
        if self.registers == 0 {
            return None;
        }
        let registers = self.registers as f64;
        Some((registers - self.ranges as f64) / registers * 100.0)
    }
}

impl fmt::Display for RangeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reduction_pct() {
            Some(pct) => write!(
                f,
                "Statistics: {} registers, {} ranges ({:.1}% reduction)",
                self.registers, self.ranges, pct
            ),
            None => write!(f, "Statistics: 0 registers, 0 ranges"),
        }
    }
}
