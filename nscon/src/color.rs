//! Color values as the controller stores them.

use std::{fmt, str::FromStr};

use num_enum::{FromPrimitive, IntoPrimitive};
use thiserror::Error;

use crate::hex::{self, ParseHexError};

/// A single RGB color as stored in the controller's flash memory: three raw
/// bytes, red first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Extracts the raw bytes in flash order.
    pub fn bytes(self) -> [u8; 3] {
        self.0
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", hex::to_hex(&self.0, ""))
    }
}

impl FromStr for Rgb {
    type Err = ParseColorError;

    /// Parses a `#rrggbb` string. The leading `#` is optional.
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let digits = src.strip_prefix('#').unwrap_or(src);
        let bytes = hex::parse_hex(digits)?;

        bytes
            .try_into()
            .map(Rgb)
            .map_err(|_| ParseColorError::InvalidLength)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Represents an error that occurred while parsing a color string.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ParseColorError {
    /// Indicates that the color digits could not be parsed as hex.
    #[error("the color is no valid hex string")]
    InvalidHex(#[from] ParseHexError),

    /// Indicates that the color does not consist of exactly three bytes.
    #[error("colors consist of exactly 6 hex digits")]
    InvalidLength,
}

/// The four colors a controller stores, in flash order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ColorSet {
    /// The color of the body shell.
    pub body: Rgb,

    /// The color of the buttons.
    pub button: Rgb,

    /// The color of the left grip. Only the Pro Controller displays grips,
    /// but every controller stores the bytes.
    pub left_grip: Rgb,

    /// The color of the right grip.
    pub right_grip: Rgb,
}

impl ColorSet {
    /// Concatenates the four colors into the 12-byte buffer the device color
    /// flash region stores.
    pub fn to_flash_bytes(self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..3].copy_from_slice(&self.body.0);
        buf[3..6].copy_from_slice(&self.button.0);
        buf[6..9].copy_from_slice(&self.left_grip.0);
        buf[9..12].copy_from_slice(&self.right_grip.0);
        buf
    }

    /// Splits a device color flash block into its four colors.
    pub fn from_flash_bytes(buf: [u8; 12]) -> Self {
        Self {
            body: Rgb(buf[0..3].try_into().unwrap()),
            button: Rgb(buf[3..6].try_into().unwrap()),
            left_grip: Rgb(buf[6..9].try_into().unwrap()),
            right_grip: Rgb(buf[9..12].try_into().unwrap()),
        }
    }
}

/// The stored marker indicating which of the color fields the controller
/// actually uses.
///
/// Firmware revisions that predate grip customization leave this at
/// [`ColorType::Default`]; only [`ColorType::FullCustom`] makes the two grip
/// colors independent of the body color.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ColorType {
    /// Factory colors, no customization recorded.
    ///
    /// Unknown marker bytes map here as well, so they behave like the
    /// uncustomized case everywhere the marker is compared against
    /// [`ColorType::FullCustom`].
    #[num_enum(default)]
    Default = 0,

    /// Body and button colors were customized, grips still mirror the body.
    BodyAndButton = 1,

    /// All four colors are stored independently.
    FullCustom = 2,
}
