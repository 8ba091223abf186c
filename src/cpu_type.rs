use std::fs;

use crate::constants::{CPU_BROADWELL, CPU_HASWELL, CPU_HASWELL_EP, CPU_IVYBRIDGE_EP, CPU_SANDYBRIDGE_EP};

/// Represents CPU manufacturer types that can be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuType {
	/// Intel CPU architecture
	Intel,
	/// AMD CPU architecture
	Amd,
	/// Any other CPU architecture not explicitly supported
	Unsupported,
}

/// Vendor, family and model of the first processor listed in `/proc/cpuinfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuInfo {
	pub cpu_type: CpuType,
	pub family: Option<u32>,
	pub model: Option<u32>,
}

impl CpuInfo {
	/// Whether the RAPL DRAM energy register exists on this model
	pub fn has_dram_domain(&self) -> bool {
		self.cpu_type == CpuType::Intel
			&& matches!(
				self.model,
				Some(CPU_SANDYBRIDGE_EP | CPU_IVYBRIDGE_EP | CPU_HASWELL_EP | CPU_HASWELL | CPU_BROADWELL)
			)
	}

	/// Haswell-EP uses a fixed DRAM energy unit instead of the one in the unit MSR
	pub fn has_fixed_dram_unit(&self) -> bool {
		self.cpu_type == CpuType::Intel && self.model == Some(CPU_HASWELL_EP)
	}
}

/// Parses the contents of `/proc/cpuinfo`
///
/// Only the first processor block is inspected; all cores of a package report
/// the same vendor and model.
pub fn parse_cpuinfo(cpuinfo: &str) -> CpuInfo {
	let mut cpu_type = CpuType::Unsupported;
	let mut family = None;
	let mut model = None;

	for line in cpuinfo.lines() {
		if line.trim().is_empty() {
			// End of the first processor block
			if family.is_some() || model.is_some() || cpu_type != CpuType::Unsupported {
				break;
			}
			continue;
		}

		let Some((key, value)) = line.split_once(':') else {
			continue;
		};
		let value = value.trim();

		match key.trim() {
			"vendor_id" => {
				cpu_type = match value {
					"GenuineIntel" => CpuType::Intel,
					"AuthenticAMD" => CpuType::Amd,
					_ => CpuType::Unsupported,
				};
			},
			"cpu family" => family = value.parse().ok(),
			"model" => model = value.parse().ok(),
			_ => {},
		}
	}

	CpuInfo { cpu_type, family, model }
}

/// Detects the CPU vendor, family and model by reading /proc/cpuinfo
pub fn detect_cpu_info() -> CpuInfo {
	let cpuinfo = fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
	parse_cpuinfo(&cpuinfo)
}

#[cfg(test)]
mod tests {
	use super::*;

	const HASWELL_EP: &str = "processor\t: 0\n\
		vendor_id\t: GenuineIntel\n\
		cpu family\t: 6\n\
		model\t\t: 63\n\
		model name\t: Intel(R) Xeon(R) CPU E5-2630 v3 @ 2.40GHz\n\
		\n\
		processor\t: 1\n\
		vendor_id\t: GenuineIntel\n\
		cpu family\t: 6\n\
		model\t\t: 99\n";

	#[test]
	fn parses_first_processor_block() {
		let info = parse_cpuinfo(HASWELL_EP);
		assert_eq!(info.cpu_type, CpuType::Intel);
		assert_eq!(info.family, Some(6));
		assert_eq!(info.model, Some(63));
		assert!(info.has_dram_domain());
		assert!(info.has_fixed_dram_unit());
	}

	#[test]
	fn model_name_does_not_shadow_model() {
		let info = parse_cpuinfo("vendor_id : AuthenticAMD\ncpu family : 25\nmodel : 33\nmodel name : AMD Ryzen 9\n");
		assert_eq!(info.cpu_type, CpuType::Amd);
		assert_eq!(info.model, Some(33));
		assert!(!info.has_dram_domain());
	}

	#[test]
	fn unknown_vendor_is_unsupported() {
		let info = parse_cpuinfo("processor : 0\nBogoMIPS : 48.00\nCPU implementer : 0x41\n");
		assert_eq!(info.cpu_type, CpuType::Unsupported);
		assert_eq!(info.model, None);
	}
}
