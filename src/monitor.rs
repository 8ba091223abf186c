use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::config::{MonitorConfig, ReadFailurePolicy};
use crate::constants::MIN_SAMPLES;
use crate::energy::EnergyDomain;
use crate::error::{MonitorError, Result};
use crate::meter::Meter;
use crate::power::{MeasurementSummary, PowerHistory};
use crate::probe::{ProbeSet, create_probes};
use crate::sample::{Device, seconds_between};

/// Logs a failed query and substitutes zero
fn or_zero<T: Default>(result: Result<T>, query: &str) -> T {
	result.unwrap_or_else(|e| {
		warn!(query, error = %e, "returning zero");
		T::default()
	})
}

/// Samples the configured probes and derives energy and power from the buffer
///
/// The monitor itself is single-threaded. [`crate::ThreadedMonitor`] wraps it
/// behind a lock and drives `sample` from a background thread.
#[derive(Debug)]
pub struct Monitor {
	cpu: Option<Meter>,
	gpu: Option<Meter>,
	ticks: Vec<Instant>,
	failed_reads: usize,
	policy: ReadFailurePolicy,
	window_start: Option<Instant>,
	window_end: Option<Instant>,
}

impl Monitor {
	pub fn new(probes: ProbeSet) -> Self {
		Self {
			cpu: probes.cpu.map(Meter::from),
			gpu: probes.gpu.map(Meter::from),
			ticks: Vec::new(),
			failed_reads: 0,
			policy: ReadFailurePolicy::default(),
			window_start: None,
			window_end: None,
		}
	}

	/// Builds a monitor with the probes and failure policy of a configuration
	pub fn from_config(config: &MonitorConfig) -> Result<Self> {
		Ok(Self::new(create_probes(config)?).with_failure_policy(config.read_failures))
	}

	pub fn with_failure_policy(mut self, policy: ReadFailurePolicy) -> Self {
		self.policy = policy;
		self
	}

	fn meters_mut(&mut self) -> impl Iterator<Item = (Device, &mut Meter)> {
		[(Device::Cpu, self.cpu.as_mut()), (Device::Gpu, self.gpu.as_mut())]
			.into_iter()
			.filter_map(|(device, meter)| meter.map(|meter| (device, meter)))
	}

	/// Clears the buffer and initialises every probe
	///
	/// A probe that cannot be reached is logged and left out of sampling; its
	/// queries report [`MonitorError::DeviceUnavailable`].
	pub fn init(&mut self) {
		self.clear_data();
		for (device, meter) in self.meters_mut() {
			match meter.init() {
				Ok(()) => debug!(%device, probe = meter.name(), "probe initialised"),
				Err(e) => warn!(%device, error = %e, "probe unavailable, its measurements will read as zero"),
			}
		}
	}

	/// Whether a probe is attached to `device` and initialised
	pub fn is_ready(&self, device: Device) -> bool {
		self.meter(device).is_some_and(Meter::is_ready)
	}

	pub fn clear_data(&mut self) {
		self.ticks.clear();
		self.failed_reads = 0;
		self.window_start = None;
		self.window_end = None;
		for (_, meter) in self.meters_mut() {
			meter.clear();
		}
	}

	/// Takes one sample from every ready probe under a shared timestamp
	///
	/// Devices are recorded independently: a failed read is counted and
	/// leaves a gap in that device's series only. Returns whether every ready
	/// device was recorded.
	pub fn sample(&mut self) -> bool {
		let timestamp = Instant::now();
		let policy = self.policy;
		self.ticks.push(timestamp);

		let mut failed = 0;
		for (device, meter) in self.meters_mut().filter(|(_, meter)| meter.is_ready()) {
			if let Err(error) = meter.record(timestamp) {
				failed += 1;
				match policy {
					ReadFailurePolicy::Skip => debug!(%device, %error, "skipping sample"),
					ReadFailurePolicy::Count => warn!(%device, %error, "skipping sample"),
				}
			}
		}

		self.failed_reads += failed;
		trace!(samples = self.ticks.len(), failed, "sample taken");
		failed == 0
	}

	/// Clears the buffer and takes the opening sample of a window
	pub fn begin_window(&mut self) {
		self.clear_data();
		self.sample();
		self.window_start = self.ticks.first().copied();
	}

	/// Takes the closing sample of a window
	pub fn close_window(&mut self) {
		self.sample();
		self.window_end = self.ticks.last().copied();
	}

	/// Opening and closing timestamps of the last window
	pub fn window(&self) -> Option<(Instant, Instant)> {
		self.window_start.zip(self.window_end)
	}

	/// Number of sampling ticks taken
	pub fn num_data(&self) -> usize {
		self.ticks.len()
	}

	/// Samples recorded for `device`, lower than `num_data` after failed reads
	pub fn device_samples(&self, device: Device) -> usize {
		self.meter(device).map_or(0, Meter::len)
	}

	/// Timestamps of every sampling tick in the order they were taken
	pub fn timestamps(&self) -> &[Instant] {
		&self.ticks
	}

	pub fn has_data(&self) -> bool {
		!self.ticks.is_empty()
	}

	/// Device reads that failed since the buffer was cleared
	pub fn failed_reads(&self) -> usize {
		self.failed_reads
	}

	pub fn failure_policy(&self) -> ReadFailurePolicy {
		self.policy
	}

	fn meter(&self, device: Device) -> Option<&Meter> {
		match device {
			Device::Cpu => self.cpu.as_ref(),
			Device::Gpu => self.gpu.as_ref(),
		}
	}

	fn ready_meter(&self, device: Device) -> Result<&Meter> {
		self.meter(device)
			.filter(|meter| meter.is_ready())
			.ok_or(MonitorError::DeviceUnavailable(device))
	}

	fn require_ticks(&self, what: &'static str) -> Result<()> {
		let found = self.ticks.len();
		if found < MIN_SAMPLES {
			return Err(MonitorError::InsufficientSamples { what, found });
		}
		Ok(())
	}

	pub fn try_total_exec_time(&self) -> Result<f64> {
		self.require_ticks("execution time")?;
		Ok(match (self.ticks.first(), self.ticks.last()) {
			(Some(&first), Some(&last)) => seconds_between(first, last),
			_ => 0.0,
		})
	}

	pub fn try_total_energy(&self, device: Device) -> Result<f64> {
		self.ready_meter(device)?.total_energy()
	}

	pub fn try_average_power(&self, device: Device) -> Result<f64> {
		self.ready_meter(device)?.average_power()
	}

	/// CPU energy in joules per counter domain
	pub fn try_energy_by_domain(&self) -> Result<Vec<(EnergyDomain, f64)>> {
		self.ready_meter(Device::Cpu)?.energy_by_domain()
	}

	/// Interval lengths and per-device interval power
	///
	/// Intervals follow the samples of the first device with a usable series,
	/// CPU before GPU, or the sampling ticks when neither has one. The other
	/// device reports the power of its own interval covering each one. A
	/// device without a usable series contributes zeros so that both series
	/// keep the length of the interval list.
	pub fn try_power_history(&self) -> Result<PowerHistory> {
		self.require_ticks("power history")?;

		let boundaries = [Device::Cpu, Device::Gpu]
			.into_iter()
			.filter_map(|device| self.ready_meter(device).ok())
			.find(|meter| meter.len() >= MIN_SAMPLES)
			.map_or_else(|| self.ticks.clone(), Meter::timestamps);

		let interval_secs: Vec<f64> = boundaries.windows(2).map(|pair| seconds_between(pair[0], pair[1])).collect();
		let device_powers = |device: Device| -> Vec<f64> {
			let watts = self.ready_meter(device).and_then(|meter| {
				boundaries
					.windows(2)
					.map(|pair| meter.power_during(pair[0], pair[1]))
					.collect::<Result<Vec<f64>>>()
			});
			watts.unwrap_or_else(|e| {
				warn!(%device, error = %e, "power history filled with zeros");
				vec![0.0; interval_secs.len()]
			})
		};

		let cpu_watts = device_powers(Device::Cpu);
		let gpu_watts = device_powers(Device::Gpu);
		Ok(PowerHistory {
			interval_secs,
			cpu_watts,
			gpu_watts,
		})
	}

	/// Seconds between the first and last sample, zero when unavailable
	pub fn total_exec_time(&self) -> f64 {
		or_zero(self.try_total_exec_time(), "total execution time")
	}

	/// CPU energy in joules, zero when unavailable
	pub fn total_energy_cpu(&self) -> f64 {
		or_zero(self.try_total_energy(Device::Cpu), "total CPU energy")
	}

	/// GPU energy in joules, zero when unavailable
	pub fn total_energy_gpu(&self) -> f64 {
		or_zero(self.try_total_energy(Device::Gpu), "total GPU energy")
	}

	pub fn average_power_cpu(&self) -> f64 {
		or_zero(self.try_average_power(Device::Cpu), "average CPU power")
	}

	pub fn average_power_gpu(&self) -> f64 {
		or_zero(self.try_average_power(Device::Gpu), "average GPU power")
	}

	pub fn power_history(&self) -> PowerHistory {
		or_zero(self.try_power_history(), "power history")
	}

	/// Aggregates of the buffered window under a caller-chosen label
	pub fn summary(&self, label: impl Into<String>) -> MeasurementSummary {
		MeasurementSummary {
			label: label.into(),
			exec_time_secs: self.total_exec_time(),
			avg_power_cpu_w: self.average_power_cpu(),
			avg_power_gpu_w: self.average_power_gpu(),
			energy_cpu_j: self.total_energy_cpu(),
			energy_gpu_j: self.total_energy_gpu(),
			samples: self.num_data(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::energy::{CounterReading, EnergyScale};
	use crate::probe::Probe;
	use crate::probe::synthetic::{FlakyPowerProbe, ScriptedCounterProbe, ScriptedPowerProbe, UnavailableProbe};

	fn counter_probe() -> Probe {
		let scale = EnergyScale::uniform(1.0, u64::MAX);
		Probe::counter(ScriptedCounterProbe::ramp(scale, 0, 10))
	}

	#[test]
	fn ticks_record_every_ready_device() {
		let probes = ProbeSet::new()
			.with_cpu(counter_probe())
			.with_gpu(Probe::power(ScriptedPowerProbe::constant(50.0)));
		let mut monitor = Monitor::new(probes);
		monitor.init();

		for _ in 0..4 {
			assert!(monitor.sample());
		}

		assert_eq!(monitor.num_data(), 4);
		assert_eq!(monitor.try_total_energy(Device::Cpu).unwrap(), 30.0);
		assert_eq!(monitor.try_average_power(Device::Gpu).unwrap(), 50.0);
		let history = monitor.try_power_history().unwrap();
		assert_eq!(history.len(), 3);
		assert_eq!(history.gpu_watts, vec![50.0; 3]);
	}

	#[test]
	fn unavailable_device_reads_zero() {
		let probes = ProbeSet::new()
			.with_cpu(counter_probe())
			.with_gpu(Probe::power(UnavailableProbe));
		let mut monitor = Monitor::new(probes);
		monitor.init();
		monitor.sample();
		monitor.sample();

		assert!(!monitor.is_ready(Device::Gpu));
		assert!(matches!(
			monitor.try_total_energy(Device::Gpu),
			Err(MonitorError::DeviceUnavailable(Device::Gpu))
		));
		assert_eq!(monitor.total_energy_gpu(), 0.0);
		assert_eq!(monitor.average_power_gpu(), 0.0);
		assert_eq!(monitor.total_energy_cpu(), 10.0);
		assert_eq!(monitor.power_history().gpu_watts, vec![0.0]);
	}

	#[test]
	fn failed_read_keeps_other_devices() {
		let probes = ProbeSet::new()
			.with_cpu(counter_probe())
			.with_gpu(Probe::power(FlakyPowerProbe::new(ScriptedPowerProbe::constant(5.0), 2)));
		let mut monitor = Monitor::new(probes).with_failure_policy(ReadFailurePolicy::Count);
		monitor.init();

		let recorded: Vec<bool> = (0..5).map(|_| monitor.sample()).collect();
		assert_eq!(recorded, vec![true, false, true, false, true]);
		assert_eq!(monitor.num_data(), 5);
		assert_eq!(monitor.device_samples(Device::Cpu), 5);
		assert_eq!(monitor.device_samples(Device::Gpu), 3);
		assert_eq!(monitor.failed_reads(), 2);
		assert_eq!(monitor.try_total_energy(Device::Cpu).unwrap(), 40.0);

		let history = monitor.try_power_history().unwrap();
		assert_eq!(history.len(), 4);
		assert_eq!(history.gpu_watts, vec![5.0; 4]);
		assert_eq!(history.cpu_watts.len(), 4);
	}

	#[test]
	fn always_failing_gpu_keeps_cpu_window() {
		let probes = ProbeSet::new()
			.with_cpu(counter_probe())
			.with_gpu(Probe::power(FlakyPowerProbe::new(ScriptedPowerProbe::constant(50.0), 1)));
		let mut monitor = Monitor::new(probes);
		monitor.init();

		monitor.begin_window();
		monitor.close_window();

		assert_eq!(monitor.num_data(), 2);
		assert_eq!(monitor.device_samples(Device::Cpu), 2);
		assert_eq!(monitor.device_samples(Device::Gpu), 0);
		assert_eq!(monitor.failed_reads(), 2);
		assert_eq!(monitor.try_total_energy(Device::Cpu).unwrap(), 10.0);
		assert!(monitor.try_total_exec_time().is_ok());
		assert!(matches!(
			monitor.try_average_power(Device::Gpu),
			Err(MonitorError::InsufficientSamples { found: 0, .. })
		));

		let history = monitor.try_power_history().unwrap();
		assert_eq!(history.len(), 1);
		assert_eq!(history.gpu_watts, vec![0.0]);
	}

	#[test]
	fn failed_closing_read_keeps_cpu_window() {
		let probes = ProbeSet::new()
			.with_cpu(counter_probe())
			.with_gpu(Probe::power(FlakyPowerProbe::new(ScriptedPowerProbe::constant(50.0), 2)));
		let mut monitor = Monitor::new(probes);
		monitor.init();

		monitor.begin_window();
		monitor.close_window();

		assert_eq!(monitor.device_samples(Device::Cpu), 2);
		assert_eq!(monitor.device_samples(Device::Gpu), 1);
		assert_eq!(monitor.try_total_energy(Device::Cpu).unwrap(), 10.0);
		assert_eq!(monitor.total_energy_gpu(), 0.0);
		let (start, end) = monitor.window().unwrap();
		assert_eq!(monitor.timestamps(), &[start, end]);
	}

	#[test]
	fn queries_need_two_samples() {
		let mut monitor = Monitor::new(ProbeSet::new().with_cpu(counter_probe()));
		monitor.init();
		monitor.sample();

		assert!(matches!(
			monitor.try_total_exec_time(),
			Err(MonitorError::InsufficientSamples { found: 1, .. })
		));
		assert_eq!(monitor.total_exec_time(), 0.0);
		assert!(monitor.power_history().is_empty());
	}

	#[test]
	fn window_keeps_guaranteed_samples_at_both_ends() {
		let mut monitor = Monitor::new(ProbeSet::new().with_cpu(counter_probe()));
		monitor.init();
		monitor.begin_window();
		monitor.sample();
		monitor.close_window();

		let (start, end) = monitor.window().unwrap();
		assert!(start <= end);
		assert_eq!(monitor.num_data(), 3);
		assert_eq!(monitor.try_energy_by_domain().unwrap()[0], (EnergyDomain::Package, 20.0));
	}

	#[test]
	fn begin_window_discards_previous_data() {
		let scale = EnergyScale::uniform(1.0, u64::MAX);
		let readings = [0, 100, 1000].map(CounterReading::package).to_vec();
		let mut monitor = Monitor::new(ProbeSet::new().with_cpu(Probe::counter(ScriptedCounterProbe::new(scale, readings))));
		monitor.init();
		monitor.sample();
		monitor.sample();
		monitor.begin_window();

		assert_eq!(monitor.num_data(), 1);
		assert!(monitor.window().is_none());
	}

	#[test]
	fn summary_collects_lenient_aggregates() {
		let probes = ProbeSet::new().with_gpu(Probe::power(ScriptedPowerProbe::constant(12.0)));
		let mut monitor = Monitor::new(probes);
		monitor.init();
		monitor.sample();
		monitor.sample();

		let summary = monitor.summary("gpu-only");
		assert_eq!(summary.label, "gpu-only");
		assert_eq!(summary.samples, 2);
		assert_eq!(summary.avg_power_gpu_w, 12.0);
		assert_eq!(summary.energy_cpu_j, 0.0);
	}
}
