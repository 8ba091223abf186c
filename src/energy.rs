use std::fmt;

use serde::{Deserialize, Serialize};

/// RAPL energy domains exposed by counter probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnergyDomain {
	/// Whole processor package
	Package,
	/// Cores (power plane 0)
	Core,
	/// Uncore devices such as the integrated GPU (power plane 1)
	Uncore,
	/// Attached memory
	Dram,
}

impl EnergyDomain {
	pub const ALL: [EnergyDomain; 4] = [
		EnergyDomain::Package,
		EnergyDomain::Core,
		EnergyDomain::Uncore,
		EnergyDomain::Dram,
	];

	const fn index(self) -> usize {
		match self {
			EnergyDomain::Package => 0,
			EnergyDomain::Core => 1,
			EnergyDomain::Uncore => 2,
			EnergyDomain::Dram => 3,
		}
	}

	/// Returns a human-readable name for the domain
	pub fn as_str(&self) -> &'static str {
		match self {
			EnergyDomain::Package => "package",
			EnergyDomain::Core => "core",
			EnergyDomain::Uncore => "uncore",
			EnergyDomain::Dram => "dram",
		}
	}
}

impl fmt::Display for EnergyDomain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Snapshot of raw energy counters, one per domain
///
/// Domains a probe does not read stay at zero, which makes them contribute
/// nothing to deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterReading {
	counts: [u64; 4],
}

impl CounterReading {
	pub fn new() -> Self {
		Self::default()
	}

	/// A reading with only the package counter set
	pub fn package(count: u64) -> Self {
		Self::new().with(EnergyDomain::Package, count)
	}

	pub fn with(mut self, domain: EnergyDomain, count: u64) -> Self {
		self.set(domain, count);
		self
	}

	pub fn set(&mut self, domain: EnergyDomain, count: u64) {
		self.counts[domain.index()] = count;
	}

	pub fn get(&self, domain: EnergyDomain) -> u64 {
		self.counts[domain.index()]
	}
}

/// Subtracts two counter values assuming at most one wraparound in between
///
/// `max` is the largest value the counter can hold before wrapping to zero.
pub const fn overflow_sub(start: u64, end: u64, max: u64) -> u64 {
	if start <= end {
		end - start
	} else {
		// start > end, so this cannot overflow even with max == u64::MAX
		(max - start) + end + 1
	}
}

/// Conversion from raw counts to joules for one counter probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyScale {
	joules_per_count: [f64; 4],
	/// Largest raw value before the counters wrap
	pub counter_max: u64,
}

impl EnergyScale {
	/// Same unit for every domain
	pub fn uniform(joules_per_count: f64, counter_max: u64) -> Self {
		Self {
			joules_per_count: [joules_per_count; 4],
			counter_max,
		}
	}

	pub fn with_domain_unit(mut self, domain: EnergyDomain, joules_per_count: f64) -> Self {
		self.joules_per_count[domain.index()] = joules_per_count;
		self
	}

	pub fn unit(&self, domain: EnergyDomain) -> f64 {
		self.joules_per_count[domain.index()]
	}

	/// Energy in joules consumed in one domain between two readings
	pub fn domain_joules(&self, start: &CounterReading, end: &CounterReading, domain: EnergyDomain) -> f64 {
		let delta = overflow_sub(start.get(domain), end.get(domain), self.counter_max);
		delta as f64 * self.unit(domain)
	}

	/// Energy in joules between two readings, summed over all domains
	pub fn joules_between(&self, start: &CounterReading, end: &CounterReading) -> f64 {
		EnergyDomain::ALL
			.iter()
			.map(|&domain| self.domain_joules(start, end, domain))
			.sum()
	}
}
