use std::io;

use thiserror::Error;

use crate::sample::Device;

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

/// Failures reported by a probe
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error("{probe} is unavailable: {reason}")]
	Unavailable { probe: &'static str, reason: String },

	#[error("{probe} read failed: {source}")]
	Read {
		probe: &'static str,
		#[source]
		source: io::Error,
	},

	#[error("{probe} returned malformed data: {detail}")]
	Malformed { probe: &'static str, detail: String },
}

impl ProbeError {
	pub fn unavailable(probe: &'static str, reason: impl ToString) -> Self {
		ProbeError::Unavailable {
			probe,
			reason: reason.to_string(),
		}
	}

	pub fn read(probe: &'static str, source: io::Error) -> Self {
		ProbeError::Read { probe, source }
	}

	pub fn malformed(probe: &'static str, detail: impl ToString) -> Self {
		ProbeError::Malformed {
			probe,
			detail: detail.to_string(),
		}
	}
}

/// Errors surfaced by the monitor and its configuration
#[derive(Debug, Error)]
pub enum MonitorError {
	#[error(transparent)]
	Probe(#[from] ProbeError),

	#[error("no usable {0} probe")]
	DeviceUnavailable(Device),

	#[error("resource monitor is already running")]
	AlreadyRunning,

	#[error("resource monitor is not running")]
	NotRunning,

	#[error("measurement window is still open")]
	WindowOpen,

	#[error("{what} needs at least two measurements, found {found}")]
	InsufficientSamples { what: &'static str, found: usize },

	#[error("invalid sampling period {0} s")]
	InvalidPeriod(f64),

	#[error("failed to spawn sampling thread: {0}")]
	Spawn(#[source] io::Error),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
}
