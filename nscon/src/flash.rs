//! Implements addressed access to the controller's SPI flash memory, built on
//! top of the sub-command layer.

use thiserror::Error;
use tracing::debug;

use crate::{
    channel::ReportChannel,
    subcommand::{self, SubCommand, SubCommandError},
};

/// The offset of the echoed little-endian address inside a flash read reply
/// payload.
const ECHO_ADDRESS_OFFSET: usize = 14;

/// The offset of the echoed length inside a flash read reply payload.
const ECHO_LENGTH_OFFSET: usize = 18;

/// The header both flash accesses start their sub-command body with: a 32-bit
/// little-endian address followed by a length byte. Read replies repeat it in
/// front of the data.
const ACCESS_HEADER_LENGTH: usize = 5;

/// Represents a named address + length pair inside the controller's flash
/// memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FlashRegion {
    /// The start address of the region.
    pub address: u16,

    /// The length of the region in bytes.
    pub length: u8,
}

/// The serial number, stored as 16 characters.
pub const SERIAL_NUMBER: FlashRegion = FlashRegion {
    address: 0x6000,
    length: 16,
};

/// The device type byte.
pub const TYPE_INFO: FlashRegion = FlashRegion {
    address: 0x6012,
    length: 1,
};

/// The color type marker byte, see [`crate::color::ColorType`].
pub const COLOR_TYPE: FlashRegion = FlashRegion {
    address: 0x601b,
    length: 1,
};

/// The four stored device colors, three bytes each.
pub const DEVICE_COLOR: FlashRegion = FlashRegion {
    address: 0x6050,
    length: 12,
};

fn access_header(address: u16, length: u8) -> [u8; ACCESS_HEADER_LENGTH] {
    let mut header = [0u8; ACCESS_HEADER_LENGTH];
    header[..4].copy_from_slice(&u32::from(address).to_le_bytes());
    header[4] = length;
    header
}

/// Reads a region of flash memory.
///
/// Read replies echo the requested address and length, and frames where
/// either differs from the request are rejected even though they echo the
/// read opcode — a stale reply for a different region must not answer this
/// request.
///
/// Returns exactly [`FlashRegion::length`] bytes on success.
pub async fn read(chan: &ReportChannel, region: FlashRegion) -> Result<Vec<u8>, FlashError> {
    let FlashRegion { address, length } = region;
    debug!("reading {length} bytes from flash address {address:#06x}");

    let reply = subcommand::send_sub_command(
        chan,
        SubCommand::ReadSpiFlash,
        &access_header(address, length),
        move |payload: &[u8]| {
            let echoed_address = payload
                .get(ECHO_ADDRESS_OFFSET..ECHO_ADDRESS_OFFSET + 2)
                .map(|bytes| u16::from_le_bytes(bytes.try_into().unwrap()));

            echoed_address == Some(address) && payload.get(ECHO_LENGTH_OFFSET) == Some(&length)
        },
        subcommand::DEFAULT_TIMEOUT,
        subcommand::DEFAULT_RETRIES,
    )
    .await
    .map_err(|source| FlashError::Read {
        address,
        length,
        source,
    })?;

    reply
        .get(ACCESS_HEADER_LENGTH..ACCESS_HEADER_LENGTH + usize::from(length))
        .map(<[u8]>::to_vec)
        .ok_or(FlashError::ShortReply { address })
}

/// Writes bytes to flash memory.
///
/// The reply carries a status byte. Anything but zero — including a reply too
/// short to carry one — rejects the write; an ambiguous response is never
/// treated as success.
pub async fn write(chan: &ReportChannel, address: u16, data: &[u8]) -> Result<(), FlashError> {
    let Ok(length) = u8::try_from(data.len()) else {
        return Err(FlashError::TooLong {
            address,
            length: data.len(),
        });
    };
    debug!("writing {length} bytes to flash address {address:#06x}");

    let mut body = Vec::with_capacity(ACCESS_HEADER_LENGTH + data.len());
    body.extend_from_slice(&access_header(address, length));
    body.extend_from_slice(data);

    let reply = subcommand::send_sub_command(
        chan,
        SubCommand::WriteSpiFlash,
        &body,
        |_| true,
        subcommand::DEFAULT_TIMEOUT,
        subcommand::DEFAULT_RETRIES,
    )
    .await
    .map_err(|source| FlashError::Write { address, source })?;

    match reply.first() {
        Some(0) => Ok(()),
        Some(&status) => Err(FlashError::WriteRejected { address, status }),
        None => Err(FlashError::ShortReply { address }),
    }
}

/// Represents an error that occurred while accessing flash memory.
#[derive(Debug, Error)]
pub enum FlashError {
    /// Indicates that the read sub-command failed.
    #[error("reading {length} bytes from flash address {address:#06x} failed")]
    Read {
        /// The address the read started at.
        address: u16,

        /// The amount of bytes the read requested.
        length: u8,

        /// The sub-command error that caused the failure.
        #[source]
        source: SubCommandError,
    },

    /// Indicates that the write sub-command failed.
    #[error("writing to flash address {address:#06x} failed")]
    Write {
        /// The address the write started at.
        address: u16,

        /// The sub-command error that caused the failure.
        #[source]
        source: SubCommandError,
    },

    /// Indicates that the controller answered the write with a non-zero
    /// status byte.
    #[error("the controller rejected the write to flash address {address:#06x} with status {status:#04x}")]
    WriteRejected {
        /// The address the write started at.
        address: u16,

        /// The status byte the controller answered with.
        status: u8,
    },

    /// Indicates that a reply was too short to carry the expected data or
    /// status byte.
    #[error("the flash reply for address {address:#06x} is shorter than expected")]
    ShortReply {
        /// The address the access started at.
        address: u16,
    },

    /// Indicates that the data does not fit into a single write frame.
    #[error("{length} bytes do not fit into a single write to flash address {address:#06x}")]
    TooLong {
        /// The address the write started at.
        address: u16,

        /// The amount of bytes the caller tried to write.
        length: usize,
    },
}
