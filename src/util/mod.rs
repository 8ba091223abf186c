pub mod i2c;
pub mod msr;
