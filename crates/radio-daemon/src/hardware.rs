/// Hardware access: selector switches on host GPIO, volume encoder on I2C.
///
/// ```text
///   host GPIO (sysfs)          I2C bus
///   ├── station BCD x4         └── seesaw @0x36
///   ├── bank BCD x4                ├── encoder position
///   └── play/pause toggle          └── encoder push button
/// ```
///
/// Reads are synchronous and short.  The control loop only sees the
/// [`Hardware`] trait so tests can script pin levels.
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use radio_proto::config::{EncoderConfig, PinsConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("gpio {pin}: {source}")]
    Gpio {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("gpio {pin}: unexpected value {value:?}")]
    GpioValue { pin: u32, value: String },
    #[error("i2c {bus}: {source}")]
    I2c {
        bus: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no seesaw at 0x{address:02x} (hardware id 0x{id:02x})")]
    UnknownDevice { address: u16, id: u8 },
    #[error("encoder button pin {0} out of range (0-31)")]
    InvalidPin(u32),
}

/// What the control loop needs from the board.
pub trait Hardware {
    fn read_pin(&mut self, pin: u32) -> Result<Level, HardwareError>;
    /// Absolute encoder count; deltas are taken by the caller.
    fn encoder_position(&mut self) -> Result<i32, HardwareError>;
    fn encoder_button(&mut self) -> Result<Level, HardwareError>;
    /// Give pins back on shutdown.
    fn release(&mut self) {}
}

/// 4-bit active-low BCD value, bit0 first.
pub fn read_bcd<H: Hardware>(hw: &mut H, pins: &[u32; 4]) -> Result<u8, HardwareError> {
    let mut value = 0u8;
    for (bit, pin) in pins.iter().enumerate() {
        if hw.read_pin(*pin)? == Level::Low {
            value |= 1 << bit;
        }
    }
    Ok(value)
}

// ── sysfs GPIO ────────────────────────────────────────────────────────────────

const SYSFS_GPIO: &str = "/sys/class/gpio";

/// Input lines through `/sys/class/gpio`.  Pull-ups come from the device
/// tree; sysfs cannot set them.  Lines exported here are unexported again on
/// drop, including when `open` fails part way.
pub struct SysfsGpio {
    root: PathBuf,
    base: u32,
    exported: Vec<u32>,
}

impl SysfsGpio {
    pub fn open(pins: &[u32], base: u32) -> Result<Self, HardwareError> {
        Self::open_at(Path::new(SYSFS_GPIO), pins, base)
    }

    fn open_at(root: &Path, pins: &[u32], base: u32) -> Result<Self, HardwareError> {
        let mut gpio = Self {
            root: root.to_path_buf(),
            base,
            exported: Vec::new(),
        };
        for &pin in pins {
            gpio.export_input(pin)?;
        }
        Ok(gpio)
    }

    fn line_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", self.base + pin))
    }

    fn export_input(&mut self, pin: u32) -> Result<(), HardwareError> {
        let err = |source| HardwareError::Gpio { pin, source };
        let line = self.base + pin;
        if !self.line_dir(pin).exists() {
            std::fs::write(self.root.join("export"), line.to_string())
                .map_err(err)?;
            // udev needs a moment to fix permissions on the new node
            std::thread::sleep(Duration::from_millis(100));
            self.exported.push(pin);
        }
        std::fs::write(self.line_dir(pin).join("direction"), "in").map_err(err)?;
        debug!("gpio {} (line {}) configured as input", pin, line);
        Ok(())
    }

    pub fn read(&self, pin: u32) -> Result<Level, HardwareError> {
        let raw = std::fs::read_to_string(self.line_dir(pin).join("value"))
            .map_err(|source| HardwareError::Gpio { pin, source })?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(HardwareError::GpioValue {
                pin,
                value: other.to_string(),
            }),
        }
    }

    pub fn release(&mut self) {
        for pin in self.exported.drain(..) {
            let line = self.base + pin;
            if let Err(e) = std::fs::write(self.root.join("unexport"), line.to_string()) {
                warn!("gpio {}: unexport failed: {}", pin, e);
            }
        }
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        self.release();
    }
}

// ── seesaw rotary encoder ─────────────────────────────────────────────────────

/// `I2C_SLAVE` ioctl request from linux/i2c-dev.h.
const I2C_SLAVE: libc::c_ulong = 0x0703;

const STATUS_BASE: u8 = 0x00;
const STATUS_HW_ID: u8 = 0x01;
const GPIO_BASE: u8 = 0x01;
const GPIO_DIRCLR_BULK: u8 = 0x03;
const GPIO_BULK: u8 = 0x04;
const GPIO_BULK_SET: u8 = 0x05;
const GPIO_PULLENSET: u8 = 0x0B;
const ENCODER_BASE: u8 = 0x11;
const ENCODER_POSITION: u8 = 0x30;

/// Product ids the seesaw firmware reports (SAMD09, ATtiny8x7, ATtiny16x7).
const KNOWN_HW_IDS: [u8; 3] = [0x55, 0x87, 0x84];

/// Bit for `pin` in the seesaw's 32-bit GPIO bank.
fn button_mask(pin: u32) -> Result<u32, HardwareError> {
    1u32.checked_shl(pin).ok_or(HardwareError::InvalidPin(pin))
}

/// Adafruit I2C rotary encoder (seesaw firmware).
pub struct Seesaw {
    bus: PathBuf,
    file: File,
    button_mask: u32,
}

impl Seesaw {
    pub fn open(config: &EncoderConfig) -> Result<Self, HardwareError> {
        let button_mask = button_mask(config.button_pin)?;
        let bus = config.i2c_bus.clone();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&bus)
            .map_err(|source| HardwareError::I2c {
                bus: bus.clone(),
                source,
            })?;

        // SAFETY: plain ioctl on an owned, open fd with an integer argument.
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(config.address),
            )
        };
        if rc < 0 {
            return Err(HardwareError::I2c {
                bus,
                source: std::io::Error::last_os_error(),
            });
        }

        let mut seesaw = Self {
            bus,
            file,
            button_mask,
        };
        let mut id = [0u8; 1];
        seesaw.read_register(STATUS_BASE, STATUS_HW_ID, &mut id, Duration::from_millis(1))?;
        if !KNOWN_HW_IDS.contains(&id[0]) {
            return Err(HardwareError::UnknownDevice {
                address: config.address,
                id: id[0],
            });
        }

        // Button as input with pull-up.
        let mask = button_mask.to_be_bytes();
        seesaw.write_register(GPIO_BASE, GPIO_DIRCLR_BULK, &mask)?;
        seesaw.write_register(GPIO_BASE, GPIO_PULLENSET, &mask)?;
        seesaw.write_register(GPIO_BASE, GPIO_BULK_SET, &mask)?;

        info!("Volume encoder ready at 0x{:02x}", config.address);
        Ok(seesaw)
    }

    fn io_err(&self, source: std::io::Error) -> HardwareError {
        HardwareError::I2c {
            bus: self.bus.clone(),
            source,
        }
    }

    fn write_register(&mut self, base: u8, reg: u8, data: &[u8]) -> Result<(), HardwareError> {
        let mut buf = Vec::with_capacity(2 + data.len());
        buf.extend_from_slice(&[base, reg]);
        buf.extend_from_slice(data);
        self.file.write_all(&buf).map_err(|e| self.io_err(e))
    }

    fn read_register(
        &mut self,
        base: u8,
        reg: u8,
        out: &mut [u8],
        delay: Duration,
    ) -> Result<(), HardwareError> {
        self.write_register(base, reg, &[])?;
        std::thread::sleep(delay);
        self.file.read_exact(out).map_err(|e| self.io_err(e))
    }

    /// Position with the Adafruit driver's sign convention (negated count).
    pub fn position(&mut self) -> Result<i32, HardwareError> {
        let mut buf = [0u8; 4];
        self.read_register(
            ENCODER_BASE,
            ENCODER_POSITION,
            &mut buf,
            Duration::from_millis(8),
        )?;
        Ok(i32::from_be_bytes(buf).wrapping_neg())
    }

    pub fn button(&mut self) -> Result<Level, HardwareError> {
        let mut buf = [0u8; 4];
        self.read_register(GPIO_BASE, GPIO_BULK, &mut buf, Duration::from_millis(1))?;
        if u32::from_be_bytes(buf) & self.button_mask != 0 {
            Ok(Level::High)
        } else {
            Ok(Level::Low)
        }
    }
}

// ── board ─────────────────────────────────────────────────────────────────────

/// The radio's real hardware.
pub struct Board {
    gpio: SysfsGpio,
    encoder: Seesaw,
}

impl Board {
    pub fn open(pins: &PinsConfig, encoder: &EncoderConfig) -> Result<Self, HardwareError> {
        let mut lines: Vec<u32> = pins.station.to_vec();
        lines.extend_from_slice(&pins.bank);
        lines.push(pins.play_pause);
        let gpio = SysfsGpio::open(&lines, pins.sysfs_base)?;
        let encoder = Seesaw::open(encoder)?;
        Ok(Self { gpio, encoder })
    }
}

impl Hardware for Board {
    fn read_pin(&mut self, pin: u32) -> Result<Level, HardwareError> {
        self.gpio.read(pin)
    }

    fn encoder_position(&mut self) -> Result<i32, HardwareError> {
        self.encoder.position()
    }

    fn encoder_button(&mut self) -> Result<Level, HardwareError> {
        self.encoder.button()
    }

    fn release(&mut self) {
        self.gpio.release();
    }
}
