//! Pin modes and capabilities

use serde::{Deserialize, Serialize};

/// Firmata pin mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PinMode {
    /// Digital input
    Input = 0,
    /// Digital output
    Output = 1,
    /// Analog input
    AnalogInput = 2,
    /// PWM output
    Pwm = 3,
    /// Servo control
    Servo = 4,
    /// I2C bus
    I2c = 6,
    /// One-wire bus
    OneWire = 7,
    /// Stepper control
    Stepper = 8,
    /// Rotary encoder
    Encoder = 9,
    /// Serial port
    Serial = 10,
    /// Digital input with pull-up
    InputPullup = 11,
    /// SPI bus
    Spi = 12,
    /// Frequency counter
    Frequency = 16,
}

impl PinMode {
    /// Decode a mode byte
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::Input,
            1 => Self::Output,
            2 => Self::AnalogInput,
            3 => Self::Pwm,
            4 => Self::Servo,
            6 => Self::I2c,
            7 => Self::OneWire,
            8 => Self::Stepper,
            9 => Self::Encoder,
            10 => Self::Serial,
            11 => Self::InputPullup,
            12 => Self::Spi,
            16 => Self::Frequency,
            _ => return None,
        })
    }

    /// Mode byte
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

/// One mode a pin supports, with its resolution in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedMode {
    /// Raw mode byte; unknown modes are kept
    pub mode: u8,
    /// Resolution in bits
    pub resolution: u8,
}

/// Modes one pin supports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCapability {
    /// Pin number
    pub pin: u8,
    /// Supported modes in report order
    pub modes: Vec<SupportedMode>,
}

impl PinCapability {
    /// Whether the pin supports `mode`
    pub fn supports(&self, mode: PinMode) -> bool {
        self.modes.iter().any(|m| m.mode == mode.to_byte())
    }
}
