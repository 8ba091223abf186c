use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::constants::*;
use crate::error::{ProbeError, Result};
use crate::probe::PowerProbe;
use crate::util::i2c::I2cDevice;

/// Power rails wired to the board's INA3221 channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmRail {
	Cpu,
	Gpu,
}

impl ArmRail {
	pub fn name(&self) -> &'static str {
		match self {
			ArmRail::Cpu => "arm-cpu-rail",
			ArmRail::Gpu => "arm-gpu-rail",
		}
	}

	/// Shunt voltage and bus voltage registers of the rail's channel
	pub fn registers(&self) -> (u8, u8) {
		match self {
			ArmRail::Cpu => (ARM_CPU_SHUNT_VOLTAGE_REG, ARM_CPU_BUS_VOLTAGE_REG),
			ArmRail::Gpu => (ARM_GPU_SHUNT_VOLTAGE_REG, ARM_GPU_BUS_VOLTAGE_REG),
		}
	}
}

/// Converts raw INA3221 register words (already in chip byte order) to watts
///
/// Both registers keep their value in bits 14:3. The shunt LSB is 40 µV and
/// the bus LSB is 8 mV.
pub fn rail_watts(shunt_raw: u16, bus_raw: u16, shunt_milliohm: f64) -> f64 {
	let shunt_uv = f64::from((shunt_raw & 0x7FFF) >> 3) * SHUNT_VOLTAGE_LSB_UV;
	let bus_mv = f64::from((bus_raw & 0x7FFF) >> 3) * BUS_VOLTAGE_LSB_MV;

	// µV / mΩ = mA, and mA * mV = µW
	let current_ma = shunt_uv / shunt_milliohm;
	current_ma * bus_mv / 1_000_000.0
}

/// INA3221 current/voltage monitor shared by the rail probes
#[derive(Debug)]
pub struct Ina3221 {
	bus: u8,
	address: u16,
	shunt_milliohm: f64,
	device: Option<I2cDevice>,
}

impl Ina3221 {
	pub fn new(bus: u8, address: u16, shunt_milliohm: f64) -> Self {
		Self {
			bus,
			address,
			shunt_milliohm,
			device: None,
		}
	}

	/// Opens the bus once; later calls are no-ops
	fn open(&mut self, probe: &'static str) -> Result<(), ProbeError> {
		if self.device.is_some() {
			return Ok(());
		}

		let device = I2cDevice::open(self.bus, self.address).map_err(|e| {
			ProbeError::unavailable(
				probe,
				format!("cannot access /dev/i2c-{} address {:#04x}: {}", self.bus, self.address, e),
			)
		})?;
		info!(bus = self.bus, address = self.address, "INA3221 power sensor ready");
		self.device = Some(device);
		Ok(())
	}

	fn read_rail(&self, rail: ArmRail) -> Result<f64, ProbeError> {
		let device = self
			.device
			.as_ref()
			.ok_or_else(|| ProbeError::unavailable(rail.name(), "sensor not initialised"))?;

		let (shunt_reg, bus_reg) = rail.registers();
		let shunt = device.read_word_swapped(shunt_reg).map_err(|e| ProbeError::read(rail.name(), e))?;
		let bus = device.read_word_swapped(bus_reg).map_err(|e| ProbeError::read(rail.name(), e))?;

		Ok(rail_watts(shunt, bus, self.shunt_milliohm))
	}
}

/// One rail of a shared INA3221 exposed as a power probe
#[derive(Debug, Clone)]
pub struct ArmRailProbe {
	sensor: Arc<Mutex<Ina3221>>,
	rail: ArmRail,
}

impl ArmRailProbe {
	pub fn new(sensor: Arc<Mutex<Ina3221>>, rail: ArmRail) -> Self {
		Self { sensor, rail }
	}
}

impl PowerProbe for ArmRailProbe {
	fn name(&self) -> &'static str {
		self.rail.name()
	}

	fn init(&mut self) -> Result<(), ProbeError> {
		self.sensor.lock().open(self.rail.name())
	}

	fn fetch_instant_power(&mut self) -> Result<f64, ProbeError> {
		self.sensor.lock().read_rail(self.rail)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn converts_register_words_to_watts() {
		// 100 shunt steps = 4 mV over 10 mΩ = 400 mA; 625 bus steps = 5 V
		let watts = rail_watts(100 << 3, 625 << 3, 10.0);
		assert!((watts - 2.0).abs() < 1e-12);
	}

	#[test]
	fn ignores_sign_bit_and_low_bits() {
		let clean = rail_watts(100 << 3, 625 << 3, 10.0);
		let noisy = rail_watts(0x8000 | (100 << 3) | 0b111, 0x8000 | (625 << 3) | 0b101, 10.0);
		assert_eq!(clean, noisy);
	}

	#[test]
	fn rails_use_their_own_channels() {
		assert_eq!(ArmRail::Cpu.registers(), (0x05, 0x06));
		assert_eq!(ArmRail::Gpu.registers(), (0x03, 0x04));
	}

	#[test]
	fn unopened_sensor_reports_unavailable() {
		let sensor = Arc::new(Mutex::new(Ina3221::new(250, 0x40, 10.0)));
		let mut probe = ArmRailProbe::new(sensor, ArmRail::Gpu);
		assert!(matches!(probe.fetch_instant_power(), Err(ProbeError::Unavailable { .. })));
		assert!(matches!(probe.init(), Err(ProbeError::Unavailable { .. })));
	}
}
