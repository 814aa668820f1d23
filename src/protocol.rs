/*!
 # Triones wire protocol codec

 Pure, stateless encoding and decoding for the fixed-length Triones command
 and status frames. Nothing in this module performs I/O; the session layer
 feeds encoded frames to the transport and hands received notification
 payloads back here for decoding.
*/

use thiserror::Error;

use crate::mode::Mode;

/// Status frame length in bytes.
pub const STATUS_FRAME_LEN: usize = 12;
/// First byte of every status frame.
pub const STATUS_HEADER: u8 = 0x66;
/// Last byte of every status frame.
pub const STATUS_TRAILER: u8 = 0x99;
/// Power byte reported (and sent) for "on".
pub const POWER_ON_BYTE: u8 = 0x23;
/// Power byte reported (and sent) for "off".
pub const POWER_OFF_BYTE: u8 = 0x24;

/// A caller-supplied value outside its declared domain.
///
/// Raised before any byte is produced or written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A numeric argument is outside its documented range
    #[error("{what} value {value} out of range ({min}..={max})")]
    OutOfRange {
        what: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// A hex color string is not six hex digits (with optional `#` prefix)
    #[error("invalid hex color: {0:?}")]
    InvalidHexColor(String),

    /// The mode cannot be set through the built-in mode command
    #[error("mode {0} cannot be set as a built-in effect")]
    UnsupportedMode(Mode),
}

/// A received frame that fails the structural contract.
///
/// Never repaired or partially interpreted; the raw frame is discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not exactly [`STATUS_FRAME_LEN`] bytes
    #[error("status frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The first byte is not [`STATUS_HEADER`]
    #[error("status frame header mismatch: expected {expected:#04x}, got {found:#04x}")]
    BadHeader { expected: u8, found: u8 },

    /// The last byte is not [`STATUS_TRAILER`]
    #[error("status frame trailer mismatch: expected {expected:#04x}, got {found:#04x}")]
    BadTrailer { expected: u8, found: u8 },
}

/// Four-channel RGBW color. Channel values are inherently in range by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    /// Red component (0-255)
    pub red: u8,
    /// Green component (0-255)
    pub green: u8,
    /// Blue component (0-255)
    pub blue: u8,
    /// White component (0-255)
    pub white: u8,
}

impl Color {
    /// Creates an RGB color with the white channel off.
    pub fn rgb(red: u8, green: u8, blue: u8) -> Color {
        Color {
            red,
            green,
            blue,
            white: 0,
        }
    }

    /// Parses a six-hex-digit color string such as `"#FF0000"` or `"ff0000"`.
    pub fn from_hex(hex: &str) -> Result<Color, ValidationError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidHexColor(hex.to_string()));
        }

        // Length and digit checks above make these parses infallible
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ValidationError::InvalidHexColor(hex.to_string()))
        };
        Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// A single typed controller command, mapping to exactly one wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set a static RGB color
    SetRgb { red: u8, green: u8, blue: u8 },
    /// Switch to white-only output at the given intensity
    SetWhite { intensity: u8 },
    /// Turn the controller on
    PowerOn,
    /// Turn the controller off
    PowerOff,
    /// Start a built-in effect at the given public speed (0-100)
    SetMode { mode: Mode, speed: u8 },
    /// Request a status notification
    QueryStatus,
}

impl Command {
    /// Encodes this command into its fixed-length wire frame.
    ///
    /// Validation happens before any byte is produced: an out-of-domain
    /// speed or a non-settable mode yields a [`ValidationError`] and no
    /// partial frame.
    pub fn encode(&self) -> Result<Vec<u8>, ValidationError> {
        match *self {
            Command::SetRgb { red, green, blue } => {
                Ok(vec![0x56, red, green, blue, 0x00, 0xF0, 0xAA])
            }
            Command::SetWhite { intensity } => {
                Ok(vec![0x56, 0x00, 0x00, 0x00, intensity, 0x0F, 0xAA])
            }
            Command::PowerOn => Ok(vec![0xCC, POWER_ON_BYTE, 0x33]),
            Command::PowerOff => Ok(vec![0xCC, POWER_OFF_BYTE, 0x33]),
            Command::SetMode { mode, speed } => {
                if !mode.is_built_in_effect() {
                    return Err(ValidationError::UnsupportedMode(mode));
                }
                Ok(vec![0xBB, mode.to_wire(), speed_to_wire(speed)?, 0x44])
            }
            Command::QueryStatus => Ok(vec![0xEF, 0x01, 0x77]),
        }
    }
}

/// Decoded controller status snapshot.
///
/// Produced only by [`Status::decode`]; all fields come from fixed offsets
/// of a structurally valid status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Whether the controller output is on
    pub is_on: bool,
    /// Mode reported by the firmware
    pub mode: Mode,
    /// Effect speed, rescaled to the public 0-100 range (100 = fastest)
    pub speed: u8,
    /// Current color, all four channels
    pub color: Color,
}

impl Status {
    /// Decodes a raw status notification payload.
    ///
    /// The frame must be exactly [`STATUS_FRAME_LEN`] bytes, start with
    /// [`STATUS_HEADER`] and end with [`STATUS_TRAILER`]; any deviation is a
    /// [`ProtocolError`]. Over well-formed frames decoding is total: the
    /// mode byte always maps to some [`Mode`].
    pub fn decode(frame: &[u8]) -> Result<Status, ProtocolError> {
        if frame.len() != STATUS_FRAME_LEN {
            return Err(ProtocolError::LengthMismatch {
                expected: STATUS_FRAME_LEN,
                actual: frame.len(),
            });
        }
        if frame[0] != STATUS_HEADER {
            return Err(ProtocolError::BadHeader {
                expected: STATUS_HEADER,
                found: frame[0],
            });
        }
        if frame[11] != STATUS_TRAILER {
            return Err(ProtocolError::BadTrailer {
                expected: STATUS_TRAILER,
                found: frame[11],
            });
        }

        Ok(Status {
            is_on: frame[2] == POWER_ON_BYTE,
            mode: Mode::from_wire(frame[3]),
            speed: speed_from_wire(frame[5]),
            color: Color {
                red: frame[6],
                green: frame[7],
                blue: frame[8],
                white: frame[9],
            },
        })
    }

    /// RGB values as a tuple.
    pub fn rgb_tuple(&self) -> (u8, u8, u8) {
        (self.color.red, self.color.green, self.color.blue)
    }

    /// RGBW values as a tuple.
    pub fn rgbw_tuple(&self) -> (u8, u8, u8, u8) {
        (
            self.color.red,
            self.color.green,
            self.color.blue,
            self.color.white,
        )
    }

    /// RGB color as a `#rrggbb` hex string.
    pub fn rgb_hex(&self) -> String {
        format!(
            "#{:02x}{:02x}{:02x}",
            self.color.red, self.color.green, self.color.blue
        )
    }
}

/// Rescales a public speed (0-100, 100 = fastest) to the device-native
/// byte (1-255, 1 = fastest).
///
/// Uses rounded linear scaling so that [`speed_from_wire`] is an exact
/// inverse over the whole public domain.
pub fn speed_to_wire(speed: u8) -> Result<u8, ValidationError> {
    if speed > 100 {
        return Err(ValidationError::OutOfRange {
            what: "speed",
            value: speed as u32,
            min: 0,
            max: 100,
        });
    }
    let inverted = (100 - speed) as u16;
    Ok((1 + (inverted * 254 + 50) / 100) as u8)
}

/// Rescales a device-native speed byte back to the public 0-100 range.
///
/// Total over all byte values; a zero byte (never produced by encoding,
/// but observed from some firmware) reads as fastest.
pub fn speed_from_wire(wire: u8) -> u8 {
    let wire = wire.max(1) as u16;
    (100 - ((wire - 1) * 100 + 127) / 254) as u8
}

/// Approximates the RGB rendering of a black-body color temperature.
///
/// Standard piecewise log/power fit over 1000-10000 K, clamped per channel.
pub fn kelvin_to_rgb(kelvin: u32) -> (u8, u8, u8) {
    let t = kelvin as f64 / 100.0;

    let red = if t <= 66.0 {
        255.0
    } else {
        329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2)
    };
    let green = if t <= 66.0 {
        99.470_802_586_1 * t.ln() - 161.119_568_166_1
    } else {
        288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2)
    };
    let blue = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7
    };

    (
        red.clamp(0.0, 255.0) as u8,
        green.clamp(0.0, 255.0) as u8,
        blue.clamp(0.0, 255.0) as u8,
    )
}
