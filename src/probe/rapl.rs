use tracing::{debug, info};

use crate::constants::*;
use crate::cpu_type::{CpuInfo, CpuType, detect_cpu_info};
use crate::energy::{CounterReading, EnergyDomain, EnergyScale};
use crate::error::{ProbeError, Result};
use crate::probe::CounterProbe;
use crate::util::msr::{energy_unit_joules, read_energy_status, read_msr};

const PROBE_NAME: &str = "rapl-msr";

/// Energy status register for each domain on the detected CPU
///
/// AMD only exposes a package-wide counter; its core counters are per core
/// and cannot be summed without tracking each wrap separately.
pub fn energy_registers(info: &CpuInfo, domains: &[EnergyDomain]) -> Vec<(EnergyDomain, u32)> {
	domains
		.iter()
		.filter_map(|&domain| {
			let address = match (info.cpu_type, domain) {
				(CpuType::Intel, EnergyDomain::Package) => INTEL_PKG_ENERGY_MSR,
				(CpuType::Intel, EnergyDomain::Core) => INTEL_PP0_ENERGY_MSR,
				(CpuType::Intel, EnergyDomain::Uncore) => INTEL_PP1_ENERGY_MSR,
				(CpuType::Intel, EnergyDomain::Dram) if info.has_dram_domain() => INTEL_DRAM_ENERGY_MSR,
				(CpuType::Amd, EnergyDomain::Package) => AMD_ENERGY_PKG_MSR,
				_ => return None,
			};
			Some((domain, address))
		})
		.collect()
}

/// Builds the joules-per-count scale from the raw power unit register
pub fn energy_scale(info: &CpuInfo, unit_msr: u64) -> EnergyScale {
	let scale = EnergyScale::uniform(energy_unit_joules(unit_msr), RAPL_COUNTER_MAX);
	if info.has_fixed_dram_unit() {
		scale.with_domain_unit(EnergyDomain::Dram, 0.5f64.powi(HASWELL_EP_DRAM_UNIT_EXPONENT as i32))
	} else {
		scale
	}
}

/// CPU energy counters read from RAPL model-specific registers
#[derive(Debug, Clone)]
pub struct RaplMsrProbe {
	cpu_id: usize,
	domains: Vec<EnergyDomain>,
	registers: Vec<(EnergyDomain, u32)>,
}

impl RaplMsrProbe {
	pub fn new(cpu_id: usize, domains: Vec<EnergyDomain>) -> Self {
		Self {
			cpu_id,
			domains,
			registers: Vec::new(),
		}
	}

	fn unit_register(info: &CpuInfo) -> Result<u32, ProbeError> {
		match info.cpu_type {
			CpuType::Intel => Ok(INTEL_POWER_UNIT_MSR),
			CpuType::Amd => Ok(AMD_ENERGY_UNIT_MSR),
			CpuType::Unsupported => Err(ProbeError::unavailable(PROBE_NAME, "CPU vendor has no supported RAPL interface")),
		}
	}
}

impl CounterProbe for RaplMsrProbe {
	fn name(&self) -> &'static str {
		PROBE_NAME
	}

	fn init(&mut self) -> Result<EnergyScale, ProbeError> {
		self.registers.clear();

		let info = detect_cpu_info();
		info!(cpu_type = ?info.cpu_type, family = ?info.family, model = ?info.model, "detected CPU");

		let unit_msr = read_msr(Self::unit_register(&info)?, self.cpu_id).map_err(|e| {
			ProbeError::unavailable(PROBE_NAME, format!("cannot read MSRs of CPU {}: {}", self.cpu_id, e))
		})?;
		let scale = energy_scale(&info, unit_msr);

		// Keep only the registers this model actually implements
		for (domain, address) in energy_registers(&info, &self.domains) {
			match read_energy_status(address, self.cpu_id) {
				Ok(_) => self.registers.push((domain, address)),
				Err(e) => debug!(%domain, address = format_args!("{:#x}", address), error = %e, "skipping RAPL domain"),
			}
		}

		if self.registers.is_empty() {
			return Err(ProbeError::unavailable(PROBE_NAME, "no readable RAPL energy registers"));
		}

		info!(
			cpu = self.cpu_id,
			domains = ?self.registers.iter().map(|(domain, _)| *domain).collect::<Vec<_>>(),
			joules_per_count = scale.unit(EnergyDomain::Package),
			"RAPL counters ready"
		);

		Ok(scale)
	}

	fn fetch_raw_energy(&mut self) -> Result<CounterReading, ProbeError> {
		let mut reading = CounterReading::new();
		for &(domain, address) in &self.registers {
			let count = read_energy_status(address, self.cpu_id).map_err(|e| ProbeError::read(PROBE_NAME, e))?;
			reading.set(domain, count);
		}
		Ok(reading)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn intel(model: u32) -> CpuInfo {
		CpuInfo {
			cpu_type: CpuType::Intel,
			family: Some(6),
			model: Some(model),
		}
	}

	#[test]
	fn haswell_ep_reads_all_domains_with_fixed_dram_unit() {
		let info = intel(CPU_HASWELL_EP);
		let registers = energy_registers(&info, &EnergyDomain::ALL);
		assert_eq!(registers.len(), 4);
		assert!(registers.contains(&(EnergyDomain::Dram, INTEL_DRAM_ENERGY_MSR)));

		let scale = energy_scale(&info, 0x000A_0E03);
		assert_eq!(scale.unit(EnergyDomain::Package), 1.0 / 16384.0);
		assert_eq!(scale.unit(EnergyDomain::Dram), 1.0 / 65536.0);
		assert_eq!(scale.counter_max, RAPL_COUNTER_MAX);
	}

	#[test]
	fn client_parts_without_dram_skip_it() {
		let registers = energy_registers(&intel(142), &EnergyDomain::ALL);
		assert_eq!(
			registers.iter().map(|(domain, _)| *domain).collect::<Vec<_>>(),
			vec![EnergyDomain::Package, EnergyDomain::Core, EnergyDomain::Uncore]
		);
	}

	#[test]
	fn amd_exposes_package_only() {
		let info = CpuInfo {
			cpu_type: CpuType::Amd,
			family: Some(25),
			model: Some(33),
		};
		assert_eq!(
			energy_registers(&info, &EnergyDomain::ALL),
			vec![(EnergyDomain::Package, AMD_ENERGY_PKG_MSR)]
		);
	}

	#[test]
	fn configured_domains_limit_registers() {
		let registers = energy_registers(&intel(CPU_HASWELL), &[EnergyDomain::Package]);
		assert_eq!(registers, vec![(EnergyDomain::Package, INTEL_PKG_ENERGY_MSR)]);
	}

	#[test]
	fn unsupported_vendor_is_unavailable() {
		let info = CpuInfo {
			cpu_type: CpuType::Unsupported,
			family: None,
			model: None,
		};
		assert!(matches!(
			RaplMsrProbe::unit_register(&info),
			Err(ProbeError::Unavailable { .. })
		));
	}
}
