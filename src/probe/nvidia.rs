use std::io;
use std::process::Command;

use tracing::info;

use crate::error::{ProbeError, Result};
use crate::probe::PowerProbe;

const PROBE_NAME: &str = "nvidia-smi";

/// Parses the first line of `--format=csv,noheader,nounits` output as a number
///
/// The driver prints `[N/A]` or `[Not Supported]` for boards without power
/// sensing, which yields `None`.
pub fn parse_query_value(output: &str) -> Option<f64> {
	let value: f64 = output.lines().next()?.trim().parse().ok()?;
	value.is_finite().then_some(value)
}

/// GPU board power queried through the NVIDIA driver's command-line tool
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
	command: String,
	gpu_index: u32,
}

impl NvidiaSmiProbe {
	pub fn new(command: impl Into<String>, gpu_index: u32) -> Self {
		Self {
			command: command.into(),
			gpu_index,
		}
	}

	fn query(&self, field: &str) -> io::Result<String> {
		let output = Command::new(&self.command)
			.arg(format!("--query-gpu={}", field))
			.arg("--format=csv,noheader,nounits")
			.arg(format!("--id={}", self.gpu_index))
			.output()?;

		if !output.status.success() {
			return Err(io::Error::other(format!(
				"{} exited with {}: {}",
				self.command,
				output.status,
				String::from_utf8_lossy(&output.stderr).trim()
			)));
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

impl PowerProbe for NvidiaSmiProbe {
	fn name(&self) -> &'static str {
		PROBE_NAME
	}

	fn init(&mut self) -> Result<(), ProbeError> {
		let name = self
			.query("name")
			.map_err(|e| ProbeError::unavailable(PROBE_NAME, format!("GPU {} is not monitored: {}", self.gpu_index, e)))?;

		// Boards without power sensing answer the query but never with a number
		let power = self
			.query("power.draw")
			.map_err(|e| ProbeError::unavailable(PROBE_NAME, e))?;
		if parse_query_value(&power).is_none() {
			return Err(ProbeError::unavailable(
				PROBE_NAME,
				format!("GPU {} does not report power draw ({})", self.gpu_index, power.trim()),
			));
		}

		info!(gpu = self.gpu_index, name = name.trim(), "GPU power probe ready");
		Ok(())
	}

	fn fetch_instant_power(&mut self) -> Result<f64, ProbeError> {
		let output = self.query("power.draw").map_err(|e| ProbeError::read(PROBE_NAME, e))?;
		parse_query_value(&output).ok_or_else(|| ProbeError::malformed(PROBE_NAME, output.trim()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_power_draw() {
		assert_eq!(parse_query_value("45.23\n"), Some(45.23));
		assert_eq!(parse_query_value("  120.5  \n87.0\n"), Some(120.5));
	}

	#[test]
	fn rejects_unsupported_readings() {
		assert_eq!(parse_query_value("[N/A]\n"), None);
		assert_eq!(parse_query_value("[Not Supported]"), None);
		assert_eq!(parse_query_value(""), None);
		assert_eq!(parse_query_value("NaN"), None);
	}

	#[test]
	fn missing_tool_is_unavailable() {
		let mut probe = NvidiaSmiProbe::new("/nonexistent/nvidia-smi", 0);
		assert!(matches!(probe.init(), Err(ProbeError::Unavailable { .. })));
		assert!(matches!(probe.fetch_instant_power(), Err(ProbeError::Read { .. })));
	}
}
