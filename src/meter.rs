use std::time::Instant;

use tracing::warn;

use crate::aggregate;
use crate::constants::MIN_SAMPLES;
use crate::energy::{CounterReading, EnergyDomain, EnergyScale};
use crate::error::{MonitorError, ProbeError, Result};
use crate::probe::{CounterProbe, PowerProbe, Probe};
use crate::sample::Sample;

/// A counter probe together with the readings it produced
#[derive(Debug)]
pub struct CounterMeter {
	probe: Box<dyn CounterProbe>,
	scale: Option<EnergyScale>,
	samples: Vec<Sample<CounterReading>>,
}

/// A power probe together with the readings it produced
#[derive(Debug)]
pub struct PowerMeter {
	probe: Box<dyn PowerProbe>,
	ready: bool,
	samples: Vec<Sample<f64>>,
}

/// A probe and its sample series
///
/// Every meter keeps its own timestamps. A failed read leaves a gap in one
/// series without touching the others.
#[derive(Debug)]
pub enum Meter {
	Counter(CounterMeter),
	Power(PowerMeter),
}

impl From<Probe> for Meter {
	fn from(probe: Probe) -> Self {
		match probe {
			Probe::Counter(probe) => Meter::Counter(CounterMeter {
				probe,
				scale: None,
				samples: Vec::new(),
			}),
			Probe::Power(probe) => Meter::Power(PowerMeter {
				probe,
				ready: false,
				samples: Vec::new(),
			}),
		}
	}
}

impl Meter {
	pub fn name(&self) -> &'static str {
		match self {
			Meter::Counter(meter) => meter.probe.name(),
			Meter::Power(meter) => meter.probe.name(),
		}
	}

	/// Whether the last `init` reached the hardware
	pub fn is_ready(&self) -> bool {
		match self {
			Meter::Counter(meter) => meter.scale.is_some(),
			Meter::Power(meter) => meter.ready,
		}
	}

	/// Clears the series and initialises the probe
	///
	/// On failure the meter stays unready and takes no samples.
	pub fn init(&mut self) -> Result<(), ProbeError> {
		self.clear();
		match self {
			Meter::Counter(meter) => {
				meter.scale = None;
				meter.scale = Some(meter.probe.init()?);
			},
			Meter::Power(meter) => {
				meter.ready = false;
				meter.probe.init()?;
				meter.ready = true;
			},
		}
		Ok(())
	}

	pub fn clear(&mut self) {
		match self {
			Meter::Counter(meter) => meter.samples.clear(),
			Meter::Power(meter) => meter.samples.clear(),
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Meter::Counter(meter) => meter.samples.len(),
			Meter::Power(meter) => meter.samples.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Reads the probe and appends the value under `timestamp`
	///
	/// Nothing is recorded when the read fails.
	pub fn record(&mut self, timestamp: Instant) -> Result<(), ProbeError> {
		match self {
			Meter::Counter(meter) => {
				let value = meter.probe.fetch_raw_energy()?;
				meter.samples.push(Sample::new(timestamp, value));
			},
			Meter::Power(meter) => {
				let value = meter.probe.fetch_instant_power()?;
				meter.samples.push(Sample::new(timestamp, value));
			},
		}
		Ok(())
	}

	pub fn timestamps(&self) -> Vec<Instant> {
		match self {
			Meter::Counter(meter) => meter.samples.iter().map(|sample| sample.timestamp).collect(),
			Meter::Power(meter) => meter.samples.iter().map(|sample| sample.timestamp).collect(),
		}
	}

	fn require_intervals(&self, what: &'static str) -> Result<()> {
		let found = self.len();
		if found < MIN_SAMPLES {
			return Err(MonitorError::InsufficientSamples { what, found });
		}
		Ok(())
	}

	/// Total energy in joules over the recorded window
	pub fn total_energy(&self) -> Result<f64> {
		self.require_intervals("total energy")?;
		Ok(match self {
			Meter::Counter(meter) => aggregate::counter_total_energy(&meter.samples, &meter.scale()),
			Meter::Power(meter) => aggregate::power_total_energy(&meter.samples),
		})
	}

	/// Average power in watts over the recorded window
	pub fn average_power(&self) -> Result<f64> {
		self.require_intervals("average power")?;
		Ok(match self {
			Meter::Counter(meter) => aggregate::counter_average_power(&meter.samples, &meter.scale()),
			Meter::Power(meter) => aggregate::power_average_power(&meter.samples),
		})
	}

	/// Average power of the recorded interval covering `start..end`
	///
	/// The interval is looked up at the midpoint of the span, so series with
	/// gaps can be read on another series' boundaries.
	pub fn power_during(&self, start: Instant, end: Instant) -> Result<f64> {
		self.require_intervals("power history")?;
		let midpoint = start + end.saturating_duration_since(start) / 2;
		Ok(match self {
			Meter::Counter(meter) => {
				let i = aggregate::interval_at(&meter.samples, midpoint);
				aggregate::counter_interval_power(&meter.samples, &meter.scale(), i)
			},
			Meter::Power(meter) => {
				let i = aggregate::interval_at(&meter.samples, midpoint);
				aggregate::power_interval_power(&meter.samples, i)
			},
		})
	}

	/// Per-domain energy, only meaningful for counter meters
	pub fn energy_by_domain(&self) -> Result<Vec<(EnergyDomain, f64)>> {
		self.require_intervals("energy by domain")?;
		match self {
			Meter::Counter(meter) => {
				let scale = meter.scale();
				Ok(EnergyDomain::ALL
					.iter()
					.map(|&domain| (domain, aggregate::counter_domain_energy(&meter.samples, &scale, domain)))
					.collect())
			},
			Meter::Power(_) => {
				warn!(probe = self.name(), "power probes do not report energy domains");
				Ok(Vec::new())
			},
		}
	}
}

impl CounterMeter {
	/// The scale reported by `init`; samples only exist once it is set
	fn scale(&self) -> EnergyScale {
		self.scale.unwrap_or(EnergyScale::uniform(0.0, u64::MAX))
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::probe::synthetic::{FlakyPowerProbe, ScriptedCounterProbe, ScriptedPowerProbe, UnavailableProbe};

	#[test]
	fn counter_meter_integrates_recorded_samples() {
		let scale = EnergyScale::uniform(1.0, u64::MAX);
		let readings = [100, 400, 900].map(CounterReading::package).to_vec();
		let mut meter = Meter::from(Probe::counter(ScriptedCounterProbe::new(scale, readings)));
		meter.init().unwrap();

		let origin = Instant::now();
		for secs in [0, 1, 3] {
			meter.record(origin + Duration::from_secs(secs)).unwrap();
		}

		assert_eq!(meter.len(), 3);
		assert!((meter.total_energy().unwrap() - 800.0).abs() < 1e-9);
		assert!((meter.average_power().unwrap() - 266.666_666).abs() < 1e-3);

		let first = meter.power_during(origin, origin + Duration::from_secs(1)).unwrap();
		let second = meter.power_during(origin + Duration::from_secs(1), origin + Duration::from_secs(3)).unwrap();
		assert_eq!((first, second), (300.0, 250.0));
	}

	#[test]
	fn failed_reads_leave_a_gap() {
		let mut meter = Meter::from(Probe::power(FlakyPowerProbe::new(ScriptedPowerProbe::new(vec![1.0, 3.0]), 2)));
		meter.init().unwrap();

		let origin = Instant::now();
		meter.record(origin).unwrap();
		assert!(meter.record(origin + Duration::from_secs(1)).is_err());
		meter.record(origin + Duration::from_secs(2)).unwrap();

		assert_eq!(meter.len(), 2);
		assert_eq!(meter.timestamps(), vec![origin, origin + Duration::from_secs(2)]);
		// 1 W and 3 W across 2 s
		assert!((meter.total_energy().unwrap() - 4.0).abs() < 1e-9);
		// both halves of the gap fall into the one recorded interval
		assert_eq!(meter.power_during(origin, origin + Duration::from_secs(1)).unwrap(), 2.0);
		assert_eq!(
			meter.power_during(origin + Duration::from_secs(1), origin + Duration::from_secs(2)).unwrap(),
			2.0
		);
	}

	#[test]
	fn failed_init_leaves_meter_unready() {
		let mut meter = Meter::from(Probe::power(UnavailableProbe));
		assert!(meter.init().is_err());
		assert!(!meter.is_ready());
		assert!(meter.is_empty());
	}

	#[test]
	fn single_sample_is_insufficient() {
		let mut meter = Meter::from(Probe::power(ScriptedPowerProbe::constant(5.0)));
		meter.init().unwrap();
		meter.record(Instant::now()).unwrap();

		assert!(matches!(
			meter.average_power(),
			Err(MonitorError::InsufficientSamples { found: 1, .. })
		));
	}
}
