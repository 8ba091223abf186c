use std::time::Instant;

use crate::energy::{CounterReading, EnergyDomain, EnergyScale};
use crate::sample::{Sample, seconds_between};

/// Power over an interval, zero when no time elapsed
fn rate(joules: f64, seconds: f64) -> f64 {
	if seconds > 0.0 { joules / seconds } else { 0.0 }
}

/// Seconds covered by interval `i`
///
/// Elapsed time always comes from the stored timestamps. Interval indices run
/// over `0..samples.len() - 1` and callers guarantee at least two samples.
pub fn interval_seconds<T>(samples: &[Sample<T>], i: usize) -> f64 {
	seconds_between(samples[i].timestamp, samples[i + 1].timestamp)
}

/// Seconds between the first and last sample
pub fn span_seconds<T>(samples: &[Sample<T>]) -> f64 {
	match (samples.first(), samples.last()) {
		(Some(first), Some(last)) => seconds_between(first.timestamp, last.timestamp),
		_ => 0.0,
	}
}

/// Index of the interval that contains `at`
///
/// Instants before the first or after the last sample map to the nearest
/// interval. Needs at least two samples.
pub fn interval_at<T>(samples: &[Sample<T>], at: Instant) -> usize {
	let after = samples.partition_point(|sample| sample.timestamp <= at);
	after.saturating_sub(1).min(samples.len().saturating_sub(2))
}

/// Energy consumed during interval `i` of a counter series
///
/// Counter samples accumulate energy, so this is the wrap-safe difference of
/// the interval's endpoints.
pub fn counter_interval_energy(samples: &[Sample<CounterReading>], scale: &EnergyScale, i: usize) -> f64 {
	scale.joules_between(&samples[i].value, &samples[i + 1].value)
}

/// Average power during interval `i` of a counter series
pub fn counter_interval_power(samples: &[Sample<CounterReading>], scale: &EnergyScale, i: usize) -> f64 {
	rate(counter_interval_energy(samples, scale, i), interval_seconds(samples, i))
}

/// Total energy of a counter series
///
/// Taken once across the whole span rather than summed per interval, so the
/// conversion error does not compound.
pub fn counter_total_energy(samples: &[Sample<CounterReading>], scale: &EnergyScale) -> f64 {
	match (samples.first(), samples.last()) {
		(Some(first), Some(last)) => scale.joules_between(&first.value, &last.value),
		_ => 0.0,
	}
}

/// Total energy of a counter series for one domain
pub fn counter_domain_energy(samples: &[Sample<CounterReading>], scale: &EnergyScale, domain: EnergyDomain) -> f64 {
	match (samples.first(), samples.last()) {
		(Some(first), Some(last)) => scale.domain_joules(&first.value, &last.value, domain),
		_ => 0.0,
	}
}

/// Average power of a counter series: total energy over total time
pub fn counter_average_power(samples: &[Sample<CounterReading>], scale: &EnergyScale) -> f64 {
	rate(counter_total_energy(samples, scale), span_seconds(samples))
}

/// Mean of the two endpoint readings of interval `i`
pub fn power_interval_power(samples: &[Sample<f64>], i: usize) -> f64 {
	(samples[i].value + samples[i + 1].value) / 2.0
}

/// Trapezoidal energy estimate of interval `i` of an instant-power series
pub fn power_interval_energy(samples: &[Sample<f64>], i: usize) -> f64 {
	power_interval_power(samples, i) * interval_seconds(samples, i)
}

/// Total energy of a power series: sum of the interval estimates
pub fn power_total_energy(samples: &[Sample<f64>]) -> f64 {
	(0..samples.len().saturating_sub(1))
		.map(|i| power_interval_energy(samples, i))
		.sum()
}

/// Average power of a power series
///
/// Simple mean of the interval powers, not total energy over total time.
pub fn power_average_power(samples: &[Sample<f64>]) -> f64 {
	let intervals = samples.len().saturating_sub(1);
	if intervals == 0 {
		return 0.0;
	}

	let total: f64 = (0..intervals).map(|i| power_interval_power(samples, i)).sum();
	total / intervals as f64
}
