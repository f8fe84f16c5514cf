//! Search predicate over laptops.

use crate::pb::{Filter, Laptop, Memory, MemoryUnit};

/// Returns true when `laptop` satisfies every threshold in `filter`.
///
/// An absent filter matches everything.
pub fn matches(filter: Option<&Filter>, laptop: &Laptop) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    if filter.max_price_usd > 0.0 && laptop.price_usd > filter.max_price_usd {
        return false;
    }

    let (cores, ghz) = laptop
        .cpu
        .as_ref()
        .map(|cpu| (cpu.number_cores, cpu.min_ghz))
        .unwrap_or((0, 0.0));
    if cores < filter.min_cpu_cores || ghz < filter.min_cpu_ghz {
        return false;
    }

    match &filter.min_ram {
        Some(min_ram) => {
            let ram = laptop.ram.as_ref().map(to_bits).unwrap_or(0);
            ram >= to_bits(min_ram)
        }
        None => true,
    }
}

/// Normalizes a memory amount to bits so different units compare.
pub fn to_bits(memory: &Memory) -> u64 {
    let factor: u64 = match memory.unit() {
        MemoryUnit::Unknown => 0,
        MemoryUnit::Bit => 1,
        MemoryUnit::Byte => 8,
        MemoryUnit::Kilobyte => 8 << 10,
        MemoryUnit::Megabyte => 8 << 20,
        MemoryUnit::Gigabyte => 8 << 30,
        MemoryUnit::Terabyte => 8 << 40,
    };
    memory.value.saturating_mul(factor)
}
