//! Implements the sub-command layer multiplexed over a single output report.
//!
//! Sub-commands are application-level requests identified by an opcode. The
//! firmware echoes the opcode in every reply, which is what replies are
//! matched on.

use std::time::Duration;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::channel::{ChannelError, Report, ReportChannel};

/// The output report id carrying sub-command requests.
pub const SUBCOMMAND_REPORT_ID: u8 = 0x01;

/// The input report id carrying sub-command replies.
pub const REPLY_REPORT_ID: u8 = 0x21;

/// The offset of the echoed opcode inside a reply payload.
const REPLY_COMMAND_OFFSET: usize = 13;

/// The offset of the reply body inside a reply payload. Everything before it
/// is the standard input report header (timer, battery, buttons, sticks and
/// the acknowledgment byte).
const REPLY_DATA_OFFSET: usize = 14;

/// The packet counter byte of a request frame. The firmware does not require
/// it to change between frames.
const PACKET_NUMBER: u8 = 0x01;

/// Neutral rumble data for both motors. Every sub-command frame carries a
/// rumble segment; these bytes keep the motors idle.
const NEUTRAL_RUMBLE: [u8; 8] = [0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40];

/// The default time to wait for a sub-command reply before resending.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// The default amount of resends after the first unanswered request.
pub const DEFAULT_RETRIES: u32 = 3;

/// Represents the sub-command opcodes used by this crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum SubCommand {
    /// Requests controller identity: firmware version, kind and MAC address.
    DeviceInfo = 0x02,

    /// Reads a chunk of SPI flash memory.
    ReadSpiFlash = 0x10,

    /// Writes a chunk of SPI flash memory.
    WriteSpiFlash = 0x11,

    /// Requests the current battery voltage.
    Voltage = 0x50,
}

/// Builds the output report frame for a sub-command request.
fn build_request(command: SubCommand, body: &[u8]) -> Report {
    let mut payload = Vec::with_capacity(10 + body.len());
    payload.push(PACKET_NUMBER);
    payload.extend_from_slice(&NEUTRAL_RUMBLE);
    payload.push(command.into());
    payload.extend_from_slice(body);

    Report::new(SUBCOMMAND_REPORT_ID, payload)
}

/// Sends a sub-command across a channel and waits for its reply.
///
/// A reply is accepted when it arrives on the reply report id, echoes the
/// requested opcode and satisfies `reply_filter` over the full reply payload.
/// The opcode echo alone is ambiguous for some sub-commands — a flash read
/// reply, for example, is only identified by its echoed address and length —
/// which is what the additional filter is for. Sub-commands without that
/// problem pass `|_| true`.
///
/// On success the payload is sliced down to the reply body, dropping the
/// input report header.
pub async fn send_sub_command<F>(
    chan: &ReportChannel,
    command: SubCommand,
    body: &[u8],
    reply_filter: F,
    timeout: Duration,
    retries: u32,
) -> Result<Vec<u8>, SubCommandError>
where
    F: Fn(&[u8]) -> bool + Send + Sync + 'static,
{
    let request = build_request(command, body);
    let opcode: u8 = command.into();

    let response = chan
        .request(
            &request,
            move |report: &Report| {
                report.id == REPLY_REPORT_ID
                    && report.payload.get(REPLY_COMMAND_OFFSET) == Some(&opcode)
                    && reply_filter(&report.payload)
            },
            timeout,
            retries,
        )
        .await
        .map_err(|err| match err {
            ChannelError::RequestTimeout { .. } => SubCommandError::Timeout { command },
            other => SubCommandError::Channel {
                command,
                source: other,
            },
        })?;

    // The filter checked the opcode echo, so the payload reaches at least up
    // to the body.
    Ok(response.payload[REPLY_DATA_OFFSET..].to_vec())
}

/// Represents an error that occurred while executing a sub-command.
#[derive(Debug, Error)]
pub enum SubCommandError {
    /// Indicates that the underlying report channel returned an error.
    #[error("the report channel failed while sending sub-command {command:?}")]
    Channel {
        /// The sub-command that was being executed.
        command: SubCommand,

        /// The channel error that caused the failure.
        #[source]
        source: ChannelError,
    },

    /// Indicates that no matching reply arrived within the configured timeout,
    /// including all retries.
    #[error("request timeout: sub-command {command:?} received no matching reply")]
    Timeout {
        /// The sub-command that was being executed.
        command: SubCommand,
    },
}
