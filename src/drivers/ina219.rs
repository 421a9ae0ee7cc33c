//! INA219 bus voltage / current monitor over `embedded_hal::i2c::I2c`.
//!
//! Registers are 16-bit big-endian.  The current and power registers are
//! only meaningful once the calibration register is loaded, and the chip
//! loses it on a brown-out, so it is rewritten before every such read.

use core::fmt;

use embedded_hal::i2c::I2c;
use log::info;

/// A0 = A1 = GND.
pub const DEFAULT_ADDR: u8 = 0x40;

const REG_CONFIG: u8 = 0x00;
const REG_SHUNT_VOLTAGE: u8 = 0x01;
const REG_BUS_VOLTAGE: u8 = 0x02;
const REG_POWER: u8 = 0x03;
const REG_CURRENT: u8 = 0x04;
const REG_CALIBRATION: u8 = 0x05;

const CONFIG_RESET: u16 = 0x8000;

const BUS_RANGE_16V: u16 = 0x0000;
const BUS_RANGE_32V: u16 = 0x2000;
const GAIN_1_40MV: u16 = 0x0000;
const GAIN_8_320MV: u16 = 0x1800;
const BUS_ADC_12BIT_128S: u16 = 0x0780;
const SHUNT_ADC_12BIT_128S: u16 = 0x0078;
const MODE_SHUNT_BUS_CONTINUOUS: u16 = 0x0007;

const AVERAGED_CONTINUOUS: u16 = BUS_ADC_12BIT_128S | SHUNT_ADC_12BIT_128S | MODE_SHUNT_BUS_CONTINUOUS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
    Bus,
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "INA219 bus transaction failed"),
        }
    }
}

/// Calibration preset for a 0.1 Ω shunt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub config: u16,
    pub cal: u16,
    /// Current LSBs per mA.
    pub current_div: f32,
    /// mW per power LSB.
    pub power_mul: f32,
}

impl Calibration {
    /// 32 V, up to 3.2 A (100 µA/bit).
    pub const RANGE_32V_2A: Self = Self {
        config: BUS_RANGE_32V | GAIN_8_320MV | AVERAGED_CONTINUOUS,
        cal: 4096,
        current_div: 10.0,
        power_mul: 2.0,
    };

    /// 32 V, up to 1.3 A (40 µA/bit).
    pub const RANGE_32V_1A: Self = Self {
        config: BUS_RANGE_32V | GAIN_8_320MV | AVERAGED_CONTINUOUS,
        cal: 10240,
        current_div: 25.0,
        power_mul: 0.8,
    };

    /// 16 V, up to 400 mA (50 µA/bit).
    pub const RANGE_16V_400MA: Self = Self {
        config: BUS_RANGE_16V | GAIN_1_40MV | AVERAGED_CONTINUOUS,
        cal: 8192,
        current_div: 20.0,
        power_mul: 1.0,
    };
}

pub struct Ina219<I2C> {
    i2c: I2C,
    addr: u8,
    calibration: Calibration,
}

impl<I2C: I2c> Ina219<I2C> {
    /// Wrap the bus.  Call [`init`](Self::init) before reading.
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self {
            i2c,
            addr,
            calibration: Calibration::RANGE_32V_2A,
        }
    }

    /// Reset the chip and load the 32 V / 2 A calibration.
    pub fn init(&mut self) -> Result<(), MonitorError> {
        self.write_reg(REG_CONFIG, CONFIG_RESET)?;
        self.set_calibration(Calibration::RANGE_32V_2A)?;
        info!("ina219: initialized at {:#04x}", self.addr);
        Ok(())
    }

    pub fn set_calibration(&mut self, calibration: Calibration) -> Result<(), MonitorError> {
        self.calibration = calibration;
        self.write_reg(REG_CALIBRATION, calibration.cal)?;
        self.write_reg(REG_CONFIG, calibration.config)
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn shunt_voltage_mv(&mut self) -> Result<f32, MonitorError> {
        let raw = self.read_reg(REG_SHUNT_VOLTAGE)? as i16;
        Ok(f32::from(raw) * 0.01)
    }

    pub fn bus_voltage_v(&mut self) -> Result<f32, MonitorError> {
        let raw = self.read_reg(REG_BUS_VOLTAGE)? as i16;
        // bits 15..3 hold the value in 4 mV steps
        let mv = i32::from(raw >> 3) * 4;
        Ok(mv as f32 * 0.001)
    }

    pub fn current_ma(&mut self) -> Result<f32, MonitorError> {
        self.write_reg(REG_CALIBRATION, self.calibration.cal)?;
        let raw = self.read_reg(REG_CURRENT)? as i16;
        Ok(f32::from(raw) / self.calibration.current_div)
    }

    pub fn power_mw(&mut self) -> Result<f32, MonitorError> {
        self.write_reg(REG_CALIBRATION, self.calibration.cal)?;
        let raw = self.read_reg(REG_POWER)? as i16;
        Ok(f32::from(raw) * self.calibration.power_mul)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_reg(&mut self, reg: u8, value: u16) -> Result<(), MonitorError> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.addr, &[reg, hi, lo])
            .map_err(|_| MonitorError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u16, MonitorError> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(|_| MonitorError::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }
}
