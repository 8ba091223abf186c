use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Hardware subsystem a meter reports for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
	Cpu,
	Gpu,
}

impl Device {
	pub fn as_str(&self) -> &'static str {
		match self {
			Device::Cpu => "CPU",
			Device::Gpu => "GPU",
		}
	}
}

impl fmt::Display for Device {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One timestamped raw reading from one probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
	pub timestamp: Instant,
	pub value: T,
}

impl<T> Sample<T> {
	pub fn new(timestamp: Instant, value: T) -> Self {
		Self { timestamp, value }
	}
}

/// Seconds elapsed between two instants, zero if `end` precedes `start`
pub fn seconds_between(start: Instant, end: Instant) -> f64 {
	end.saturating_duration_since(start).as_secs_f64()
}
