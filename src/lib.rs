pub mod aggregate;
pub mod config;
pub mod constants;
pub mod cpu_type;
pub mod display;
pub mod energy;
pub mod error;
pub mod meter;
pub mod monitor;
pub mod power;
pub mod probe;
pub mod sample;
pub mod threaded;
pub mod util;

pub use crate::config::{BackendKind, MonitorConfig, ReadFailurePolicy};
pub use crate::energy::EnergyDomain;
pub use crate::error::{MonitorError, ProbeError, Result};
pub use crate::monitor::Monitor;
pub use crate::power::{MeasurementSummary, MeasurementTally, PowerHistory};
pub use crate::probe::{CounterProbe, PowerProbe, Probe, ProbeSet};
pub use crate::sample::Device;
pub use crate::threaded::ThreadedMonitor;

/// Runs `work` inside one measurement window and summarises it
///
/// The window is closed even when `work` panics; the panic then resumes.
pub fn profile<R>(
	monitor: &ThreadedMonitor,
	period_secs: f64,
	label: &str,
	work: impl FnOnce() -> R,
) -> Result<(R, MeasurementSummary)> {
	monitor.start_monitoring(period_secs)?;

	let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));
	monitor.end_monitoring()?;

	match outcome {
		Ok(value) => Ok((value, monitor.summary(label))),
		Err(panic) => std::panic::resume_unwind(panic),
	}
}

#[cfg(test)]
mod tests {
	use std::thread;
	use std::time::Duration;

	use super::*;
	use crate::probe::synthetic::ScriptedPowerProbe;

	#[test]
	fn profile_returns_work_result_and_summary() {
		let monitor = ThreadedMonitor::new(Monitor::new(
			ProbeSet::new().with_gpu(Probe::power(ScriptedPowerProbe::constant(30.0))),
		));
		monitor.init().unwrap();

		let (value, summary) = profile(&monitor, 0.005, "sleep", || {
			thread::sleep(Duration::from_millis(20));
			7
		})
		.unwrap();

		assert_eq!(value, 7);
		assert_eq!(summary.label, "sleep");
		assert!(summary.samples >= 2);
		assert!(summary.exec_time_secs >= 0.02);
		assert_eq!(summary.avg_power_gpu_w, 30.0);
		assert!(!monitor.is_running());
	}
}
