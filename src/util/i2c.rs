use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;

// From <linux/i2c-dev.h> and <linux/i2c.h>
const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_SMBUS: libc::c_ulong = 0x0720;
const I2C_SMBUS_READ: u8 = 1;
const I2C_SMBUS_WORD_DATA: u32 = 3;
const I2C_SMBUS_BLOCK_MAX: usize = 32;

// Layout of the kernel's i2c_smbus_data; only `word` is used
#[allow(dead_code)]
#[repr(C)]
union I2cSmbusData {
	byte: u8,
	word: u16,
	block: [u8; I2C_SMBUS_BLOCK_MAX + 2],
}

#[repr(C)]
struct I2cSmbusIoctlData {
	read_write: u8,
	command: u8,
	size: u32,
	data: *mut I2cSmbusData,
}

/// A character device on an I2C bus bound to one slave address
#[derive(Debug)]
pub struct I2cDevice {
	file: File,
}

impl I2cDevice {
	/// Opens `/dev/i2c-<bus>` and selects the slave at `address`
	pub fn open(bus: u8, address: u16) -> io::Result<Self> {
		let path = format!("/dev/i2c-{}", bus);
		let file = OpenOptions::new().read(true).write(true).open(&path)?;

		// SAFETY: the descriptor is open for the duration of the call and
		// I2C_SLAVE takes the address by value.
		let result = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, libc::c_ulong::from(address)) };
		if result < 0 {
			return Err(io::Error::last_os_error());
		}

		Ok(Self { file })
	}

	/// SMBus "read word data" as the kernel returns it, low byte first
	pub fn read_word_data(&self, register: u8) -> io::Result<u16> {
		let mut data = I2cSmbusData { word: 0 };
		let mut args = I2cSmbusIoctlData {
			read_write: I2C_SMBUS_READ,
			command: register,
			size: I2C_SMBUS_WORD_DATA,
			data: &mut data,
		};

		// SAFETY: `args` and `data` outlive the call and match the kernel's
		// i2c_smbus_ioctl_data layout.
		let result = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_SMBUS as _, &mut args as *mut I2cSmbusIoctlData) };
		if result < 0 {
			return Err(io::Error::last_os_error());
		}

		// SAFETY: a word transfer fills the `word` member.
		Ok(unsafe { data.word })
	}

	/// Reads a register of a big-endian chip
	pub fn read_word_swapped(&self, register: u8) -> io::Result<u16> {
		self.read_word_data(register).map(u16::swap_bytes)
	}
}
