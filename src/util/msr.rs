use msru::{Accessor, Msr};
use std::io;

/// Reads a value from a Model-Specific Register (MSR)
///
/// # Arguments
///
/// * `msr_address` - The address of the MSR to read
/// * `cpu_id` - The CPU ID to read the MSR from
///
/// # Returns
///
/// The value read from the MSR, or an io::Error if the device file cannot be
/// opened (msr module missing, insufficient privileges) or the read fails
pub fn read_msr(msr_address: u32, cpu_id: usize) -> io::Result<u64> {
	let cpu = u16::try_from(cpu_id)
		.map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("CPU id {} out of range", cpu_id)))?;

	Msr::new(msr_address, cpu).map_err(io::Error::other)?.read().map_err(io::Error::other)
}

/// Reads an energy status register, keeping only its 32-bit counter field
pub fn read_energy_status(msr_address: u32, cpu_id: usize) -> io::Result<u64> {
	read_msr(msr_address, cpu_id).map(|value| value & crate::constants::RAPL_COUNTER_MAX)
}

/// Decodes the energy status unit of a RAPL power unit register into joules per count
///
/// Bits 12:8 hold the exponent `n` of a 1/2^n J unit on both Intel and AMD.
pub fn energy_unit_joules(unit_msr: u64) -> f64 {
	let exponent = (unit_msr >> 8) & 0x1F;
	0.5f64.powi(exponent as i32)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_sandy_bridge_energy_unit() {
		// Typical value: power 1/8 W, energy 1/2^16 J, time 1/1024 s
		let unit = energy_unit_joules(0x000A_1003);
		assert_eq!(unit, 1.0 / 65536.0);
	}

	#[test]
	fn ignores_power_and_time_fields() {
		assert_eq!(energy_unit_joules(0x000F_000F), 1.0);
		assert_eq!(energy_unit_joules(0x0E << 8), 1.0 / 16384.0);
	}
}
