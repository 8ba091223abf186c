use std::io;

use crate::energy::{CounterReading, EnergyDomain, EnergyScale};
use crate::error::{ProbeError, Result};
use crate::probe::{CounterProbe, PowerProbe};

/// Replays counter readings in order, then keeps advancing by the last step
///
/// Scripted probes stand in for hardware on machines without power sensors
/// and make measurements reproducible.
#[derive(Debug, Clone)]
pub struct ScriptedCounterProbe {
	scale: EnergyScale,
	readings: Vec<CounterReading>,
	next: usize,
	step: u64,
	current: CounterReading,
}

impl ScriptedCounterProbe {
	pub fn new(scale: EnergyScale, readings: Vec<CounterReading>) -> Self {
		Self {
			scale,
			readings,
			next: 0,
			step: 0,
			current: CounterReading::new(),
		}
	}

	/// A package counter that grows by `step` counts per read
	pub fn ramp(scale: EnergyScale, start: u64, step: u64) -> Self {
		let mut probe = Self::new(scale, vec![CounterReading::package(start)]);
		probe.step = step;
		probe
	}
}

impl CounterProbe for ScriptedCounterProbe {
	fn name(&self) -> &'static str {
		"scripted-counter"
	}

	fn init(&mut self) -> Result<EnergyScale, ProbeError> {
		self.next = 0;
		Ok(self.scale)
	}

	fn fetch_raw_energy(&mut self) -> Result<CounterReading, ProbeError> {
		if let Some(reading) = self.readings.get(self.next) {
			self.current = *reading;
			self.next += 1;
		} else {
			let count = self.current.get(EnergyDomain::Package).wrapping_add(self.step) & self.scale.counter_max;
			self.current.set(EnergyDomain::Package, count);
		}
		Ok(self.current)
	}
}

/// Replays power readings in order, then repeats the last one
#[derive(Debug, Clone)]
pub struct ScriptedPowerProbe {
	watts: Vec<f64>,
	next: usize,
}

impl ScriptedPowerProbe {
	pub fn new(watts: Vec<f64>) -> Self {
		Self { watts, next: 0 }
	}

	pub fn constant(watts: f64) -> Self {
		Self::new(vec![watts])
	}
}

impl PowerProbe for ScriptedPowerProbe {
	fn name(&self) -> &'static str {
		"scripted-power"
	}

	fn init(&mut self) -> Result<(), ProbeError> {
		self.next = 0;
		Ok(())
	}

	fn fetch_instant_power(&mut self) -> Result<f64, ProbeError> {
		let index = self.next.min(self.watts.len().saturating_sub(1));
		self.next += 1;
		self.watts
			.get(index)
			.copied()
			.ok_or_else(|| ProbeError::malformed("scripted-power", "no readings scripted"))
	}
}

/// A probe whose hardware is never reachable
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableProbe;

impl CounterProbe for UnavailableProbe {
	fn name(&self) -> &'static str {
		"unavailable"
	}

	fn init(&mut self) -> Result<EnergyScale, ProbeError> {
		Err(ProbeError::unavailable("unavailable", "no such device"))
	}

	fn fetch_raw_energy(&mut self) -> Result<CounterReading, ProbeError> {
		Err(ProbeError::read("unavailable", io::Error::from(io::ErrorKind::NotFound)))
	}
}

impl PowerProbe for UnavailableProbe {
	fn name(&self) -> &'static str {
		"unavailable"
	}

	fn init(&mut self) -> Result<(), ProbeError> {
		Err(ProbeError::unavailable("unavailable", "no such device"))
	}

	fn fetch_instant_power(&mut self) -> Result<f64, ProbeError> {
		Err(ProbeError::read("unavailable", io::Error::from(io::ErrorKind::NotFound)))
	}
}

/// Wraps a power probe and fails every `period`-th read after initialisation
#[derive(Debug, Clone)]
pub struct FlakyPowerProbe<P> {
	inner: P,
	period: usize,
	reads: usize,
}

impl<P: PowerProbe> FlakyPowerProbe<P> {
	pub fn new(inner: P, period: usize) -> Self {
		Self {
			inner,
			period: period.max(1),
			reads: 0,
		}
	}
}

impl<P: PowerProbe> PowerProbe for FlakyPowerProbe<P> {
	fn name(&self) -> &'static str {
		"flaky-power"
	}

	fn init(&mut self) -> Result<(), ProbeError> {
		self.reads = 0;
		self.inner.init()
	}

	fn fetch_instant_power(&mut self) -> Result<f64, ProbeError> {
		self.reads += 1;
		if self.reads % self.period == 0 {
			return Err(ProbeError::read("flaky-power", io::Error::from(io::ErrorKind::TimedOut)));
		}
		self.inner.fetch_instant_power()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scripted_counter_replays_then_ramps() {
		let scale = EnergyScale::uniform(1.0, u64::MAX);
		let mut probe = ScriptedCounterProbe::ramp(scale, 10, 5);
		probe.init().unwrap();

		let counts: Vec<u64> = (0..3)
			.map(|_| probe.fetch_raw_energy().unwrap().get(EnergyDomain::Package))
			.collect();
		assert_eq!(counts, vec![10, 15, 20]);
	}

	#[test]
	fn ramp_wraps_at_counter_max() {
		let scale = EnergyScale::uniform(1.0, 0xFF);
		let mut probe = ScriptedCounterProbe::ramp(scale, 0xFE, 3);
		probe.init().unwrap();

		assert_eq!(probe.fetch_raw_energy().unwrap().get(EnergyDomain::Package), 0xFE);
		assert_eq!(probe.fetch_raw_energy().unwrap().get(EnergyDomain::Package), 0x01);
	}

	#[test]
	fn scripted_power_repeats_last_value() {
		let mut probe = ScriptedPowerProbe::new(vec![1.0, 2.0]);
		let watts: Vec<f64> = (0..4).map(|_| probe.fetch_instant_power().unwrap()).collect();
		assert_eq!(watts, vec![1.0, 2.0, 2.0, 2.0]);
	}

	#[test]
	fn flaky_probe_fails_on_schedule() {
		let mut probe = FlakyPowerProbe::new(ScriptedPowerProbe::constant(3.0), 3);
		probe.init().unwrap();
		let results: Vec<bool> = (0..6).map(|_| probe.fetch_instant_power().is_ok()).collect();
		assert_eq!(results, vec![true, true, false, true, true, false]);
	}
}
