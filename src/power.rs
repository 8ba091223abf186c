use serde::{Deserialize, Serialize};

/// Per-interval power of a measurement window
///
/// The three series are parallel: entry `i` covers the interval between
/// samples `i` and `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerHistory {
	/// Length of each interval in seconds
	pub interval_secs: Vec<f64>,
	pub cpu_watts: Vec<f64>,
	pub gpu_watts: Vec<f64>,
}

impl PowerHistory {
	pub fn len(&self) -> usize {
		self.interval_secs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.interval_secs.is_empty()
	}

	/// Seconds from the window start to the end of each interval
	pub fn elapsed_secs(&self) -> Vec<f64> {
		self.interval_secs
			.iter()
			.scan(0.0, |elapsed, secs| {
				*elapsed += secs;
				Some(*elapsed)
			})
			.collect()
	}

	/// Rows of `(interval seconds, CPU watts, GPU watts)`
	pub fn rows(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
		self.interval_secs
			.iter()
			.zip(&self.cpu_watts)
			.zip(&self.gpu_watts)
			.map(|((&secs, &cpu), &gpu)| (secs, cpu, gpu))
	}
}

/// Aggregates of one completed measurement window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSummary {
	pub label: String,
	pub exec_time_secs: f64,
	pub avg_power_cpu_w: f64,
	pub avg_power_gpu_w: f64,
	pub energy_cpu_j: f64,
	pub energy_gpu_j: f64,
	/// Samples the aggregates were derived from
	pub samples: usize,
}

/// Running totals over many measurement windows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementTally {
	pub windows: usize,
	pub exec_time_secs: f64,
	pub energy_cpu_j: f64,
	pub energy_gpu_j: f64,
	pub samples: usize,
}

impl MeasurementTally {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, summary: &MeasurementSummary) {
		self.windows += 1;
		self.exec_time_secs += summary.exec_time_secs;
		self.energy_cpu_j += summary.energy_cpu_j;
		self.energy_gpu_j += summary.energy_gpu_j;
		self.samples += summary.samples;
	}

	/// Average power over all windows: accumulated energy over accumulated time
	pub fn average_power_cpu(&self) -> f64 {
		if self.exec_time_secs > 0.0 {
			self.energy_cpu_j / self.exec_time_secs
		} else {
			0.0
		}
	}

	pub fn average_power_gpu(&self) -> f64 {
		if self.exec_time_secs > 0.0 {
			self.energy_gpu_j / self.exec_time_secs
		} else {
			0.0
		}
	}

	/// The totals expressed as a summary row
	pub fn to_summary(&self, label: impl Into<String>) -> MeasurementSummary {
		MeasurementSummary {
			label: label.into(),
			exec_time_secs: self.exec_time_secs,
			avg_power_cpu_w: self.average_power_cpu(),
			avg_power_gpu_w: self.average_power_gpu(),
			energy_cpu_j: self.energy_cpu_j,
			energy_gpu_j: self.energy_gpu_j,
			samples: self.samples,
		}
	}
}

impl<'a> Extend<&'a MeasurementSummary> for MeasurementTally {
	fn extend<I: IntoIterator<Item = &'a MeasurementSummary>>(&mut self, iter: I) {
		for summary in iter {
			self.add(summary);
		}
	}
}
