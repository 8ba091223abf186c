use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
	ARM_I2C_ADDRESS, ARM_I2C_BUS, ARM_SHUNT_RESISTANCE_MILLIOHM, DEFAULT_MEASURE_PERIOD_SECS, NVIDIA_SMI_COMMAND,
	RELIABLE_SAMPLE_COUNT,
};
use crate::energy::EnergyDomain;
use crate::error::{MonitorError, Result};

/// Measurement backends that can be attached to a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
	/// RAPL energy counters read from model-specific registers (CPU)
	CpuCounter,
	/// Instantaneous board power reported by the NVIDIA driver (GPU)
	GpuPower,
	/// INA3221 rail sensor on an embedded board (CPU and GPU rails)
	ArmSensor,
}

/// What to do when a device read fails during a sampling tick
///
/// The failed device skips that sample either way; other devices and the
/// tick itself are still recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReadFailurePolicy {
	/// Skip the sample quietly
	#[default]
	Skip,
	/// Skip the sample with a warning and report the failures when the window closes
	Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaplConfig {
	/// Logical CPU whose MSRs are read
	pub cpu_id: usize,
	/// Domains read and summed into the CPU total
	pub domains: Vec<EnergyDomain>,
}

impl Default for RaplConfig {
	fn default() -> Self {
		Self {
			cpu_id: 0,
			domains: EnergyDomain::ALL.to_vec(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NvidiaConfig {
	pub command: String,
	pub gpu_index: u32,
}

impl Default for NvidiaConfig {
	fn default() -> Self {
		Self {
			command: NVIDIA_SMI_COMMAND.to_string(),
			gpu_index: 0,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArmSensorConfig {
	pub i2c_bus: u8,
	pub address: u16,
	pub shunt_milliohm: f64,
}

impl Default for ArmSensorConfig {
	fn default() -> Self {
		Self {
			i2c_bus: ARM_I2C_BUS,
			address: ARM_I2C_ADDRESS,
			shunt_milliohm: ARM_SHUNT_RESISTANCE_MILLIOHM,
		}
	}
}

/// Runtime configuration of a resource monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
	/// Nominal time between background samples
	pub period_secs: f64,
	pub backends: Vec<BackendKind>,
	/// Windows with fewer samples than this are reported as unreliable
	pub reliable_samples: usize,
	pub read_failures: ReadFailurePolicy,
	pub rapl: RaplConfig,
	pub nvidia: NvidiaConfig,
	pub arm: ArmSensorConfig,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			period_secs: DEFAULT_MEASURE_PERIOD_SECS,
			backends: vec![BackendKind::CpuCounter, BackendKind::GpuPower],
			reliable_samples: RELIABLE_SAMPLE_COUNT,
			read_failures: ReadFailurePolicy::default(),
			rapl: RaplConfig::default(),
			nvidia: NvidiaConfig::default(),
			arm: ArmSensorConfig::default(),
		}
	}
}

impl MonitorConfig {
	/// Reads and validates a TOML configuration file
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = fs::read_to_string(path).map_err(|e| {
			MonitorError::Config(format!("failed to read config file {}: {}", path.display(), e))
		})?;

		let config: MonitorConfig = toml::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks values that serde cannot
	pub fn validate(&self) -> Result<()> {
		period_from_secs(self.period_secs)?;

		for (i, backend) in self.backends.iter().enumerate() {
			if self.backends[..i].contains(backend) {
				return Err(MonitorError::Config(format!("backend {:?} listed twice", backend)));
			}
		}

		if self.backends.contains(&BackendKind::ArmSensor) && self.backends.len() > 1 {
			return Err(MonitorError::Config(
				"arm-sensor provides both CPU and GPU rails and cannot be combined with other backends".to_string(),
			));
		}

		if self.backends.contains(&BackendKind::CpuCounter) {
			let cpus = num_cpus::get();
			if self.rapl.cpu_id >= cpus {
				return Err(MonitorError::Config(format!(
					"rapl.cpu_id {} out of range, this system has {} logical CPUs",
					self.rapl.cpu_id, cpus
				)));
			}
		}

		if !(self.arm.shunt_milliohm.is_finite() && self.arm.shunt_milliohm > 0.0) {
			return Err(MonitorError::Config(format!(
				"arm.shunt_milliohm must be positive, got {}",
				self.arm.shunt_milliohm
			)));
		}

		Ok(())
	}
}

/// Converts a sampling period in seconds, rejecting zero, negative and non-finite values
pub fn period_from_secs(seconds: f64) -> Result<Duration> {
	if !(seconds.is_finite() && seconds > 0.0) {
		return Err(MonitorError::InvalidPeriod(seconds));
	}
	Duration::try_from_secs_f64(seconds).map_err(|_| MonitorError::InvalidPeriod(seconds))
}
