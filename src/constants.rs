// AMD RAPL MSR addresses
pub const AMD_ENERGY_UNIT_MSR: u32 = 0xC001_0299;
pub const AMD_ENERGY_PKG_MSR: u32 = 0xC001_029B;

// Intel RAPL MSR addresses
pub const INTEL_POWER_UNIT_MSR: u32 = 0x606;
pub const INTEL_PKG_ENERGY_MSR: u32 = 0x611;
pub const INTEL_PP0_ENERGY_MSR: u32 = 0x639;
pub const INTEL_PP1_ENERGY_MSR: u32 = 0x641;
pub const INTEL_DRAM_ENERGY_MSR: u32 = 0x619;

// Energy status registers only use their low 32 bits
pub const RAPL_COUNTER_MAX: u64 = 0xFFFF_FFFF;

// Haswell-EP reports DRAM energy in fixed 15.3 µJ units
pub const HASWELL_EP_DRAM_UNIT_EXPONENT: u32 = 16;

// Intel family 6 model numbers with RAPL DRAM support
pub const CPU_SANDYBRIDGE_EP: u32 = 45;
pub const CPU_IVYBRIDGE_EP: u32 = 62;
pub const CPU_HASWELL: u32 = 60;
pub const CPU_HASWELL_EP: u32 = 63;
pub const CPU_BROADWELL: u32 = 61;

// INA3221 power monitor on the embedded board's I2C bus
pub const ARM_I2C_BUS: u8 = 1;
pub const ARM_I2C_ADDRESS: u16 = 0x40;
pub const ARM_GPU_SHUNT_VOLTAGE_REG: u8 = 0x03;
pub const ARM_GPU_BUS_VOLTAGE_REG: u8 = 0x04;
pub const ARM_CPU_SHUNT_VOLTAGE_REG: u8 = 0x05;
pub const ARM_CPU_BUS_VOLTAGE_REG: u8 = 0x06;
pub const ARM_SHUNT_RESISTANCE_MILLIOHM: f64 = 10.0;
pub const SHUNT_VOLTAGE_LSB_UV: f64 = 40.0;
pub const BUS_VOLTAGE_LSB_MV: f64 = 8.0;

// NVIDIA driver query tool
pub const NVIDIA_SMI_COMMAND: &str = "nvidia-smi";

// Monitoring settings
pub const DEFAULT_MEASURE_PERIOD_SECS: f64 = 0.1;
pub const MIN_SAMPLES: usize = 2;
pub const RELIABLE_SAMPLE_COUNT: usize = 20;
pub const SAMPLING_THREAD_NAME: &str = "resource-monitor";
