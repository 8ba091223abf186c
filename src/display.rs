use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use crate::energy::EnergyDomain;
use crate::power::{MeasurementSummary, PowerHistory};

pub const PROFILE_CSV_HEADER: &str =
	"label, time (s), avg power CPU (W), avg power GPU (W), energy CPU (J), energy GPU (J), num values";

/// Writes a human-readable summary of one measurement window
pub fn write_summary_table(out: &mut impl Write, summary: &MeasurementSummary) -> io::Result<()> {
	writeln!(out, "Measurement: {}", summary.label)?;
	writeln!(out, "Time:        {:10.3} s ({} samples)", summary.exec_time_secs, summary.samples)?;
	writeln!(
		out,
		"CPU:         {:10.3} J | {:8.2} W avg",
		summary.energy_cpu_j, summary.avg_power_cpu_w
	)?;
	writeln!(
		out,
		"GPU:         {:10.3} J | {:8.2} W avg",
		summary.energy_gpu_j, summary.avg_power_gpu_w
	)?;
	Ok(())
}

/// Writes the CPU energy of each counter domain, skipping domains that read zero
pub fn write_domain_table(out: &mut impl Write, domains: &[(EnergyDomain, f64)]) -> io::Result<()> {
	for (domain, joules) in domains.iter().filter(|(_, joules)| *joules > 0.0) {
		writeln!(out, "  {:<8} {:10.3} J", domain.as_str(), joules)?;
	}
	Ok(())
}

/// One CSV row in the column order of [`PROFILE_CSV_HEADER`]
pub fn csv_row(summary: &MeasurementSummary) -> String {
	format!(
		"{}, {}, {}, {}, {}, {}, {}",
		summary.label,
		summary.exec_time_secs,
		summary.avg_power_cpu_w,
		summary.avg_power_gpu_w,
		summary.energy_cpu_j,
		summary.energy_gpu_j,
		summary.samples
	)
}

pub fn write_csv(out: &mut impl Write, summary: &MeasurementSummary) -> io::Result<()> {
	writeln!(out, "{}", PROFILE_CSV_HEADER)?;
	writeln!(out, "{}", csv_row(summary))
}

/// Appends a summary row to a profile file, writing the header if the file is new or empty
pub fn append_profile_row(path: &Path, summary: &MeasurementSummary) -> io::Result<()> {
	let mut file = OpenOptions::new().create(true).append(true).open(path)?;
	if file.metadata()?.len() == 0 {
		writeln!(file, "{}", PROFILE_CSV_HEADER)?;
	}
	writeln!(file, "{}", csv_row(summary))
}

/// Writes one line per interval: elapsed time, interval length, CPU and GPU power
pub fn write_history(out: &mut impl Write, history: &PowerHistory) -> io::Result<()> {
	writeln!(out, "{:>10} {:>10} {:>10} {:>10}", "t (s)", "dt (s)", "CPU (W)", "GPU (W)")?;
	for (elapsed, (secs, cpu, gpu)) in history.elapsed_secs().into_iter().zip(history.rows()) {
		writeln!(out, "{:10.4} {:10.4} {:10.2} {:10.2}", elapsed, secs, cpu, gpu)?;
	}
	Ok(())
}
