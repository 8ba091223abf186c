use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, trace, warn};

use crate::config::{MonitorConfig, ReadFailurePolicy, period_from_secs};
use crate::constants::{MIN_SAMPLES, RELIABLE_SAMPLE_COUNT, SAMPLING_THREAD_NAME};
use crate::energy::EnergyDomain;
use crate::error::{MonitorError, Result};
use crate::monitor::Monitor;
use crate::power::{MeasurementSummary, PowerHistory};
use crate::sample::Device;

/// Everything the sampling thread needs, moved into it at spawn
struct SamplingTask {
	monitor: Arc<Mutex<Monitor>>,
	stop: Receiver<()>,
	period: Duration,
}

impl SamplingTask {
	fn run(self) {
		trace!(period = ?self.period, "sampling thread started");
		loop {
			match self.stop.recv_timeout(self.period) {
				Err(RecvTimeoutError::Timeout) => {
					let mut monitor = self.monitor.lock();
					// Once stop is sent the closing sample must stay the last one
					match self.stop.try_recv() {
						Err(TryRecvError::Empty) => {
							monitor.sample();
						},
						Ok(()) | Err(TryRecvError::Disconnected) => break,
					}
				},
				Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
			}
		}
		trace!("sampling thread finished");
	}
}

/// Handles of an active measurement window
struct SamplingRun {
	stop: Sender<()>,
	handle: JoinHandle<()>,
}

/// A [`Monitor`] sampled by a background thread between
/// [`start_monitoring`](Self::start_monitoring) and
/// [`end_monitoring`](Self::end_monitoring)
///
/// The buffer lock around the monitor is held by the sampling thread only
/// while it takes a sample. The lifecycle lock and the running flag are never
/// touched by that thread, so flag checks do not wait on a slow probe.
///
/// Queries refuse to read while a window is open: the lenient ones log and
/// return zero, the `try_*` ones fail with [`MonitorError::WindowOpen`].
pub struct ThreadedMonitor {
	monitor: Arc<Mutex<Monitor>>,
	run: Mutex<Option<SamplingRun>>,
	running: AtomicBool,
	reliable_samples: usize,
}

impl ThreadedMonitor {
	pub fn new(monitor: Monitor) -> Self {
		Self {
			monitor: Arc::new(Mutex::new(monitor)),
			run: Mutex::new(None),
			running: AtomicBool::new(false),
			reliable_samples: RELIABLE_SAMPLE_COUNT,
		}
	}

	pub fn from_config(config: &MonitorConfig) -> Result<Self> {
		Ok(Self::new(Monitor::from_config(config)?).with_reliable_samples(config.reliable_samples))
	}

	/// Sample count below which a closed window is reported as unreliable
	pub fn with_reliable_samples(mut self, samples: usize) -> Self {
		self.reliable_samples = samples;
		self
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	/// Clears the buffer and initialises the probes
	pub fn init(&self) -> Result<()> {
		let run = self.run.lock();
		if run.is_some() {
			warn!("tried to initialise a resource monitor that is running");
			return Err(MonitorError::AlreadyRunning);
		}
		self.monitor.lock().init();
		Ok(())
	}

	/// Opens a measurement window sampled every `period_secs` seconds
	///
	/// One sample is taken before this returns.
	pub fn start_monitoring(&self, period_secs: f64) -> Result<()> {
		let mut run = self.run.lock();
		if run.is_some() {
			warn!("tried to start a resource monitor that is already running");
			return Err(MonitorError::AlreadyRunning);
		}

		let period = period_from_secs(period_secs).inspect_err(|e| warn!(error = %e, "not starting monitor"))?;

		self.monitor.lock().begin_window();

		let (stop, stop_rx) = mpsc::channel();
		let task = SamplingTask {
			monitor: Arc::clone(&self.monitor),
			stop: stop_rx,
			period,
		};
		let handle = thread::Builder::new()
			.name(SAMPLING_THREAD_NAME.to_string())
			.spawn(move || task.run())
			.map_err(MonitorError::Spawn)?;

		*run = Some(SamplingRun { stop, handle });
		self.running.store(true, Ordering::Release);
		debug!(period_secs, "monitoring started");
		Ok(())
	}

	/// Closes the measurement window and waits for the sampling thread
	///
	/// One more sample is taken before the thread is joined, so a window
	/// always holds at least two ticks. A device whose reads failed at either
	/// end may hold fewer samples; that is logged.
	pub fn end_monitoring(&self) -> Result<()> {
		let mut run = self.run.lock();
		let Some(SamplingRun { stop, handle }) = run.take() else {
			warn!("tried to end a resource monitor that is not running");
			return Err(MonitorError::NotRunning);
		};

		// The thread may have exited already if it panicked
		let _ = stop.send(());
		self.monitor.lock().close_window();

		trace!("joining sampling thread");
		if handle.join().is_err() {
			error!("sampling thread panicked, the window may be missing samples");
		}
		self.running.store(false, Ordering::Release);

		let monitor = self.monitor.lock();
		let samples = monitor.num_data();
		let failed = monitor.failed_reads();
		if samples < MIN_SAMPLES {
			warn!(samples, "resource monitor holds fewer than 2 measurements after ending");
		} else if samples < self.reliable_samples {
			warn!(
				samples,
				reliable = self.reliable_samples,
				"few measurements in window, averages may be unreliable"
			);
		}
		for device in [Device::Cpu, Device::Gpu] {
			let recorded = monitor.device_samples(device);
			if monitor.is_ready(device) && recorded < MIN_SAMPLES {
				warn!(%device, recorded, "too few readings of device, its measurements will read as zero");
			}
		}
		if failed > 0 && monitor.failure_policy() == ReadFailurePolicy::Count {
			warn!(failed, samples, "probe reads failed during the window");
		}

		debug!(samples, "monitoring ended");
		Ok(())
	}

	/// Whether `device` has an initialised probe
	pub fn is_ready(&self, device: Device) -> bool {
		self.monitor.lock().is_ready(device)
	}

	/// Samples buffered so far; safe to call while the window is open
	pub fn num_data(&self) -> usize {
		self.monitor.lock().num_data()
	}

	/// Samples recorded for `device`; safe to call while the window is open
	pub fn device_samples(&self, device: Device) -> usize {
		self.monitor.lock().device_samples(device)
	}

	/// Copy of the tick timestamps buffered so far
	pub fn timestamps(&self) -> Vec<Instant> {
		self.monitor.lock().timestamps().to_vec()
	}

	pub fn has_data(&self) -> bool {
		self.monitor.lock().has_data()
	}

	pub fn failed_reads(&self) -> usize {
		self.monitor.lock().failed_reads()
	}

	pub fn clear_data(&self) -> Result<()> {
		let _run = self.run.lock();
		if self.is_running() {
			warn!("tried to clear the data of a resource monitor that is running");
			return Err(MonitorError::AlreadyRunning);
		}
		self.monitor.lock().clear_data();
		Ok(())
	}

	/// The monitor, once no window is open
	fn closed(&self) -> Result<MutexGuard<'_, Monitor>> {
		if self.is_running() {
			return Err(MonitorError::WindowOpen);
		}
		Ok(self.monitor.lock())
	}

	fn closed_or_zero<T: Default>(&self, query: &str, read: impl FnOnce(&Monitor) -> T) -> T {
		match self.closed() {
			Ok(monitor) => read(&*monitor),
			Err(e) => {
				warn!(query, error = %e, "returning zero");
				T::default()
			},
		}
	}

	pub fn try_total_exec_time(&self) -> Result<f64> {
		self.closed()?.try_total_exec_time()
	}

	pub fn try_total_energy(&self, device: Device) -> Result<f64> {
		self.closed()?.try_total_energy(device)
	}

	pub fn try_average_power(&self, device: Device) -> Result<f64> {
		self.closed()?.try_average_power(device)
	}

	pub fn try_energy_by_domain(&self) -> Result<Vec<(EnergyDomain, f64)>> {
		self.closed()?.try_energy_by_domain()
	}

	pub fn try_power_history(&self) -> Result<PowerHistory> {
		self.closed()?.try_power_history()
	}

	pub fn total_exec_time(&self) -> f64 {
		self.closed_or_zero("total execution time", Monitor::total_exec_time)
	}

	pub fn total_energy_cpu(&self) -> f64 {
		self.closed_or_zero("total CPU energy", Monitor::total_energy_cpu)
	}

	pub fn total_energy_gpu(&self) -> f64 {
		self.closed_or_zero("total GPU energy", Monitor::total_energy_gpu)
	}

	pub fn average_power_cpu(&self) -> f64 {
		self.closed_or_zero("average CPU power", Monitor::average_power_cpu)
	}

	pub fn average_power_gpu(&self) -> f64 {
		self.closed_or_zero("average GPU power", Monitor::average_power_gpu)
	}

	pub fn power_history(&self) -> PowerHistory {
		self.closed_or_zero("power history", Monitor::power_history)
	}

	pub fn summary(&self, label: &str) -> MeasurementSummary {
		match self.closed() {
			Ok(monitor) => monitor.summary(label),
			Err(e) => {
				warn!(error = %e, "summary left empty");
				MeasurementSummary {
					label: label.to_string(),
					..MeasurementSummary::default()
				}
			},
		}
	}
}

impl Drop for ThreadedMonitor {
	fn drop(&mut self) {
		if let Some(SamplingRun { stop, handle }) = self.run.get_mut().take() {
			debug!("stopping sampling thread of a dropped monitor");
			let _ = stop.send(());
			let _ = handle.join();
		}
	}
}

impl std::fmt::Debug for ThreadedMonitor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ThreadedMonitor")
			.field("running", &self.is_running())
			.field("reliable_samples", &self.reliable_samples)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::energy::EnergyScale;
	use crate::probe::synthetic::{ScriptedCounterProbe, ScriptedPowerProbe};
	use crate::probe::{Probe, ProbeSet};

	fn monitor() -> ThreadedMonitor {
		let probes = ProbeSet::new()
			.with_cpu(Probe::counter(ScriptedCounterProbe::ramp(
				EnergyScale::uniform(0.5, u64::MAX),
				0,
				4,
			)))
			.with_gpu(Probe::power(ScriptedPowerProbe::constant(20.0)));
		let monitor = ThreadedMonitor::new(Monitor::new(probes));
		monitor.init().unwrap();
		monitor
	}

	#[test]
	fn long_period_window_has_exactly_two_samples() {
		let monitor = monitor();
		monitor.start_monitoring(60.0).unwrap();
		assert!(monitor.is_running());
		monitor.end_monitoring().unwrap();

		assert!(!monitor.is_running());
		assert_eq!(monitor.num_data(), 2);
		assert_eq!(monitor.total_energy_cpu(), 2.0);
		assert_eq!(monitor.average_power_gpu(), 20.0);
	}

	#[test]
	fn lifecycle_misuse_is_rejected() {
		let monitor = monitor();
		assert!(matches!(monitor.end_monitoring(), Err(MonitorError::NotRunning)));

		monitor.start_monitoring(60.0).unwrap();
		assert!(matches!(monitor.start_monitoring(60.0), Err(MonitorError::AlreadyRunning)));
		assert!(matches!(monitor.init(), Err(MonitorError::AlreadyRunning)));
		assert!(matches!(monitor.clear_data(), Err(MonitorError::AlreadyRunning)));
		monitor.end_monitoring().unwrap();
	}

	#[test]
	fn queries_wait_for_closed_window() {
		let monitor = monitor();
		monitor.start_monitoring(60.0).unwrap();

		assert_eq!(monitor.total_energy_cpu(), 0.0);
		assert!(matches!(monitor.try_total_exec_time(), Err(MonitorError::WindowOpen)));
		assert_eq!(monitor.num_data(), 1);

		monitor.end_monitoring().unwrap();
		assert!(monitor.try_total_exec_time().is_ok());
	}

	#[test]
	fn invalid_period_leaves_monitor_stopped() {
		let monitor = monitor();
		assert!(matches!(monitor.start_monitoring(0.0), Err(MonitorError::InvalidPeriod(_))));
		assert!(!monitor.is_running());
		assert!(!monitor.has_data());
	}

	#[test]
	fn background_thread_keeps_sampling() {
		let monitor = monitor();
		monitor.start_monitoring(0.001).unwrap();
		thread::sleep(Duration::from_millis(50));
		monitor.end_monitoring().unwrap();

		assert!(monitor.num_data() > 2);
		let history = monitor.power_history();
		assert_eq!(history.len(), monitor.num_data() - 1);
	}

	#[test]
	fn tick_timestamps_never_decrease() {
		let monitor = monitor();
		monitor.start_monitoring(0.001).unwrap();
		thread::sleep(Duration::from_millis(30));
		monitor.end_monitoring().unwrap();

		let timestamps = monitor.timestamps();
		assert_eq!(timestamps.len(), monitor.num_data());
		assert!(timestamps.len() >= 2);
		assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));
	}

	#[test]
	fn dropping_a_running_monitor_stops_the_thread() {
		let monitor = monitor();
		monitor.start_monitoring(0.001).unwrap();
		drop(monitor);
	}
}
