pub mod arm;
pub mod nvidia;
pub mod rapl;
pub mod synthetic;

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{BackendKind, MonitorConfig};
use crate::energy::{CounterReading, EnergyScale};
use crate::error::{ProbeError, Result};
use crate::probe::arm::{ArmRail, ArmRailProbe, Ina3221};
use crate::probe::nvidia::NvidiaSmiProbe;
use crate::probe::rapl::RaplMsrProbe;

/// A backend that reports a monotonically accumulating energy counter
pub trait CounterProbe: Debug + Send {
	/// Short name used in diagnostics
	fn name(&self) -> &'static str;

	/// Prepares the probe and returns the scale of its counters
	///
	/// Fails with [`ProbeError::Unavailable`] when the hardware cannot be reached.
	fn init(&mut self) -> Result<EnergyScale, ProbeError>;

	/// Reads the current counter values
	fn fetch_raw_energy(&mut self) -> Result<CounterReading, ProbeError>;
}

/// A backend that reports instantaneous power in watts
pub trait PowerProbe: Debug + Send {
	/// Short name used in diagnostics
	fn name(&self) -> &'static str;

	/// Prepares the probe
	///
	/// Fails with [`ProbeError::Unavailable`] when the hardware cannot be reached.
	fn init(&mut self) -> Result<(), ProbeError>;

	/// Reads the current power draw in watts
	fn fetch_instant_power(&mut self) -> Result<f64, ProbeError>;
}

/// A probe of either capability shape
#[derive(Debug)]
pub enum Probe {
	Counter(Box<dyn CounterProbe>),
	Power(Box<dyn PowerProbe>),
}

impl Probe {
	pub fn counter(probe: impl CounterProbe + 'static) -> Self {
		Probe::Counter(Box::new(probe))
	}

	pub fn power(probe: impl PowerProbe + 'static) -> Self {
		Probe::Power(Box::new(probe))
	}

	pub fn name(&self) -> &'static str {
		match self {
			Probe::Counter(probe) => probe.name(),
			Probe::Power(probe) => probe.name(),
		}
	}
}

/// The probes a monitor samples, at most one per device
#[derive(Debug, Default)]
pub struct ProbeSet {
	pub cpu: Option<Probe>,
	pub gpu: Option<Probe>,
}

impl ProbeSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cpu(mut self, probe: Probe) -> Self {
		self.cpu = Some(probe);
		self
	}

	pub fn with_gpu(mut self, probe: Probe) -> Self {
		self.gpu = Some(probe);
		self
	}
}

/// Factory function to create the probes selected by the configuration
///
/// Probes are only constructed here; reaching the hardware happens in `init`.
pub fn create_probes(config: &MonitorConfig) -> Result<ProbeSet> {
	config.validate()?;

	let mut probes = ProbeSet::new();

	for backend in &config.backends {
		debug!(?backend, "configuring backend");
		match backend {
			BackendKind::CpuCounter => {
				probes.cpu = Some(Probe::counter(RaplMsrProbe::new(
					config.rapl.cpu_id,
					config.rapl.domains.clone(),
				)));
			},
			BackendKind::GpuPower => {
				probes.gpu = Some(Probe::power(NvidiaSmiProbe::new(
					config.nvidia.command.clone(),
					config.nvidia.gpu_index,
				)));
			},
			BackendKind::ArmSensor => {
				let sensor = Arc::new(Mutex::new(Ina3221::new(
					config.arm.i2c_bus,
					config.arm.address,
					config.arm.shunt_milliohm,
				)));
				probes.cpu = Some(Probe::power(ArmRailProbe::new(sensor.clone(), ArmRail::Cpu)));
				probes.gpu = Some(Probe::power(ArmRailProbe::new(sensor, ArmRail::Gpu)));
			},
		}
	}

	Ok(probes)
}
