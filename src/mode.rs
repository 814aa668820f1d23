/*!
 # Built-in lighting modes for Triones controllers

 This module defines the closed set of lighting modes supported by Triones
 firmware, together with a total, bidirectional mapping to the wire byte
 values used by the built-in mode command and the status response.
*/

/// A Triones lighting mode.
///
/// Covers the 20 built-in animated effects (wire bytes `0x25..=0x38`) plus
/// `StaticColor` (`0x41`), which is the mode a controller reports while
/// showing a fixed RGB or white color. Wire bytes outside the documented set
/// decode to [`Mode::Unknown`] so that firmware variants with undocumented
/// modes never make a status frame undecodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Static color (reported in status, not settable as an effect)
    StaticColor,
    /// Cross-fade through all seven colors
    SevenColorCrossFade,
    /// Red gradual fade
    RedGradual,
    /// Green gradual fade
    GreenGradual,
    /// Blue gradual fade
    BlueGradual,
    /// Yellow gradual fade
    YellowGradual,
    /// Cyan gradual fade
    CyanGradual,
    /// Purple gradual fade
    PurpleGradual,
    /// White gradual fade
    WhiteGradual,
    /// Red/green cross-fade
    RedGreenCrossFade,
    /// Red/blue cross-fade
    RedBlueCrossFade,
    /// Green/blue cross-fade
    GreenBlueCrossFade,
    /// Strobe through all seven colors
    SevenColorStrobe,
    /// Red strobe
    RedStrobe,
    /// Green strobe
    GreenStrobe,
    /// Blue strobe
    BlueStrobe,
    /// Yellow strobe
    YellowStrobe,
    /// Cyan strobe
    CyanStrobe,
    /// Purple strobe
    PurpleStrobe,
    /// White strobe
    WhiteStrobe,
    /// Jump through all seven colors
    SevenColorJumping,
    /// A wire byte not covered by the documented mode set
    Unknown(u8),
}

impl Mode {
    /// The 20 built-in animated effects, in wire-byte order.
    pub const BUILT_IN: [Mode; 20] = [
        Mode::SevenColorCrossFade,
        Mode::RedGradual,
        Mode::GreenGradual,
        Mode::BlueGradual,
        Mode::YellowGradual,
        Mode::CyanGradual,
        Mode::PurpleGradual,
        Mode::WhiteGradual,
        Mode::RedGreenCrossFade,
        Mode::RedBlueCrossFade,
        Mode::GreenBlueCrossFade,
        Mode::SevenColorStrobe,
        Mode::RedStrobe,
        Mode::GreenStrobe,
        Mode::BlueStrobe,
        Mode::YellowStrobe,
        Mode::CyanStrobe,
        Mode::PurpleStrobe,
        Mode::WhiteStrobe,
        Mode::SevenColorJumping,
    ];

    /// Decodes a wire byte into a mode. Total: unknown bytes become
    /// [`Mode::Unknown`] rather than an error.
    pub fn from_wire(byte: u8) -> Mode {
        match byte {
            0x41 => Mode::StaticColor,
            0x25 => Mode::SevenColorCrossFade,
            0x26 => Mode::RedGradual,
            0x27 => Mode::GreenGradual,
            0x28 => Mode::BlueGradual,
            0x29 => Mode::YellowGradual,
            0x2A => Mode::CyanGradual,
            0x2B => Mode::PurpleGradual,
            0x2C => Mode::WhiteGradual,
            0x2D => Mode::RedGreenCrossFade,
            0x2E => Mode::RedBlueCrossFade,
            0x2F => Mode::GreenBlueCrossFade,
            0x30 => Mode::SevenColorStrobe,
            0x31 => Mode::RedStrobe,
            0x32 => Mode::GreenStrobe,
            0x33 => Mode::BlueStrobe,
            0x34 => Mode::YellowStrobe,
            0x35 => Mode::CyanStrobe,
            0x36 => Mode::PurpleStrobe,
            0x37 => Mode::WhiteStrobe,
            0x38 => Mode::SevenColorJumping,
            other => Mode::Unknown(other),
        }
    }

    /// The wire byte for this mode.
    pub fn to_wire(self) -> u8 {
        match self {
            Mode::StaticColor => 0x41,
            Mode::SevenColorCrossFade => 0x25,
            Mode::RedGradual => 0x26,
            Mode::GreenGradual => 0x27,
            Mode::BlueGradual => 0x28,
            Mode::YellowGradual => 0x29,
            Mode::CyanGradual => 0x2A,
            Mode::PurpleGradual => 0x2B,
            Mode::WhiteGradual => 0x2C,
            Mode::RedGreenCrossFade => 0x2D,
            Mode::RedBlueCrossFade => 0x2E,
            Mode::GreenBlueCrossFade => 0x2F,
            Mode::SevenColorStrobe => 0x30,
            Mode::RedStrobe => 0x31,
            Mode::GreenStrobe => 0x32,
            Mode::BlueStrobe => 0x33,
            Mode::YellowStrobe => 0x34,
            Mode::CyanStrobe => 0x35,
            Mode::PurpleStrobe => 0x36,
            Mode::WhiteStrobe => 0x37,
            Mode::SevenColorJumping => 0x38,
            Mode::Unknown(byte) => byte,
        }
    }

    /// Whether this mode can be set via the built-in mode command.
    ///
    /// Firmware only accepts effect bytes `0x25..=0x38`; `StaticColor` is
    /// entered by sending an RGB or white color command instead.
    pub fn is_built_in_effect(self) -> bool {
        matches!(self.to_wire(), 0x25..=0x38)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::StaticColor => write!(f, "static_color"),
            Mode::SevenColorCrossFade => write!(f, "seven_color_cross_fade"),
            Mode::RedGradual => write!(f, "red_gradual"),
            Mode::GreenGradual => write!(f, "green_gradual"),
            Mode::BlueGradual => write!(f, "blue_gradual"),
            Mode::YellowGradual => write!(f, "yellow_gradual"),
            Mode::CyanGradual => write!(f, "cyan_gradual"),
            Mode::PurpleGradual => write!(f, "purple_gradual"),
            Mode::WhiteGradual => write!(f, "white_gradual"),
            Mode::RedGreenCrossFade => write!(f, "red_green_cross_fade"),
            Mode::RedBlueCrossFade => write!(f, "red_blue_cross_fade"),
            Mode::GreenBlueCrossFade => write!(f, "green_blue_cross_fade"),
            Mode::SevenColorStrobe => write!(f, "seven_color_strobe"),
            Mode::RedStrobe => write!(f, "red_strobe"),
            Mode::GreenStrobe => write!(f, "green_strobe"),
            Mode::BlueStrobe => write!(f, "blue_strobe"),
            Mode::YellowStrobe => write!(f, "yellow_strobe"),
            Mode::CyanStrobe => write!(f, "cyan_strobe"),
            Mode::PurpleStrobe => write!(f, "purple_strobe"),
            Mode::WhiteStrobe => write!(f, "white_strobe"),
            Mode::SevenColorJumping => write!(f, "seven_color_jumping"),
            Mode::Unknown(byte) => write!(f, "unknown({byte:#04x})"),
        }
    }
}
