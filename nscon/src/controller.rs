//! Implements a session with a single connected controller.

use std::{fmt, sync::Arc, time::Duration};

use num_enum::{FromPrimitive, IntoPrimitive};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    channel::{ChannelError, RawHidTransport, Report, ReportChannel},
    color::{ColorSet, ColorType, Rgb},
    flash::{self, FlashError},
    hex,
    subcommand::{self, SubCommand, SubCommandError},
};

/// The output report id of the USB command set used during connection setup.
const USB_COMMAND_REPORT_ID: u8 = 0x80;

/// The input report id USB command acknowledgments arrive on. The
/// acknowledged command is echoed as the first payload byte.
const USB_ACK_REPORT_ID: u8 = 0x81;

/// USB command: leave low-power mode.
const USB_COMMAND_WAKE: u8 = 0x05;

/// USB command: perform the connection handshake.
const USB_COMMAND_HANDSHAKE: u8 = 0x02;

/// USB command: switch to full-rate HID mode, dropping the initial baud-rate
/// limit.
const USB_COMMAND_FULL_RATE: u8 = 0x04;

/// The time to wait for a handshake acknowledgment before resending.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// The amount of handshake resends after the first unacknowledged attempt.
const HANDSHAKE_RETRIES: u32 = 3;

/// The raw little-endian voltage reading divided by this yields volts.
const VOLTAGE_DIVISOR: f64 = 400.0;

/// The voltage of an empty battery, used for the charge estimate.
const BATTERY_EMPTY_VOLTS: f64 = 3.3;

/// The voltage of a full battery, used for the charge estimate.
const BATTERY_FULL_VOLTS: f64 = 4.2;

/// Represents the kind of a connected controller, as reported in the device
/// information reply.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum ControllerKind {
    /// Reported for kind bytes this crate does not know.
    #[num_enum(default)]
    Unknown = 0,

    /// The left half of a Joy-Con pair.
    LeftJoyCon = 1,

    /// The right half of a Joy-Con pair.
    RightJoyCon = 2,

    /// The Pro Controller. The only kind that displays its grip colors.
    ProController = 3,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::LeftJoyCon => "left-joycon",
            Self::RightJoyCon => "right-joycon",
            Self::ProController => "procon",
        })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ControllerKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Represents an established session with a single physical controller.
///
/// A value of this type only exists once connection setup and the initial
/// information fetch have completed; dropping it releases the underlying
/// report channel. The session is the sole writer of the controller's flash
/// memory for its lifetime.
///
/// The color fields form a local draft: they are freely editable via
/// [`Self::colors_mut`] without any device I/O, compared against the
/// connect-time snapshot by [`Self::reset_colors`], and only written back by
/// [`Self::submit_color`].
pub struct Controller {
    /// The report channel owned by this session.
    chan: Arc<ReportChannel>,

    /// The product name the HID layer reports for the device.
    product_name: String,

    kind: ControllerKind,
    firmware: String,
    mac_addr: String,
    serial_number: String,
    voltage: f64,

    /// The stored color type marker, as read at connect time.
    color_type: ColorType,

    /// The editable color draft.
    colors: ColorSet,

    /// The colors read from the device when the session was established.
    original: ColorSet,
}

impl Controller {
    /// Establishes a session over a raw HID transport.
    ///
    /// This performs the connection setup exchange (skipped when the device
    /// does not expose the USB command output report) and fetches identity,
    /// color and battery data. Any failure during the information fetch
    /// aborts the whole connect.
    pub async fn connect<T: RawHidTransport>(raw: T) -> Result<Self, ControllerError> {
        let chan = Arc::new(ReportChannel::open(raw));
        let product_name = chan.product_name();

        match chan.supports_output_report(USB_COMMAND_REPORT_ID).await {
            // Some controller variants connect without the USB command set.
            Ok(false) => debug!("no USB command report, skipping connection setup"),
            Ok(true) => start_connection(&chan).await?,
            Err(err) => {
                debug!("could not inspect the report descriptor, attempting connection setup anyway: {err}");
                start_connection(&chan).await?;
            },
        }

        let mut controller = Self {
            chan,
            product_name,
            kind: ControllerKind::Unknown,
            firmware: String::new(),
            mac_addr: String::new(),
            serial_number: String::new(),
            voltage: 0.0,
            color_type: ColorType::Default,
            colors: ColorSet {
                body: Rgb([0; 3]),
                button: Rgb([0; 3]),
                left_grip: Rgb([0; 3]),
                right_grip: Rgb([0; 3]),
            },
            original: ColorSet {
                body: Rgb([0; 3]),
                button: Rgb([0; 3]),
                left_grip: Rgb([0; 3]),
                right_grip: Rgb([0; 3]),
            },
        };

        controller.fetch_device_info().await?;
        controller.original = controller.colors;

        Ok(controller)
    }

    /// Fetches identity, color and battery data into the session fields.
    async fn fetch_device_info(&mut self) -> Result<(), ControllerError> {
        let info = subcommand::send_sub_command(
            &self.chan,
            SubCommand::DeviceInfo,
            &[],
            |_| true,
            subcommand::DEFAULT_TIMEOUT,
            subcommand::DEFAULT_RETRIES,
        )
        .await?;
        if info.len() < 10 {
            return Err(ControllerError::MalformedReply {
                command: SubCommand::DeviceInfo,
            });
        }

        self.firmware = format!("{}.{}", info[0], info[1]);
        self.kind = ControllerKind::from(info[2]);
        self.mac_addr = hex::to_hex(&info[4..10], ":");

        let color_type = flash::read(&self.chan, flash::COLOR_TYPE).await?;
        self.color_type = ColorType::from(color_type[0]);

        let device_color = flash::read(&self.chan, flash::DEVICE_COLOR).await?;
        self.colors = ColorSet::from_flash_bytes(device_color.try_into().unwrap());
        normalize_grip_colors(&mut self.colors, self.kind, self.color_type);

        let serial = flash::read(&self.chan, flash::SERIAL_NUMBER).await?;
        self.serial_number = decode_serial(&serial);

        let voltage = subcommand::send_sub_command(
            &self.chan,
            SubCommand::Voltage,
            &[],
            |_| true,
            subcommand::DEFAULT_TIMEOUT,
            subcommand::DEFAULT_RETRIES,
        )
        .await?;
        if voltage.len() < 2 {
            return Err(ControllerError::MalformedReply {
                command: SubCommand::Voltage,
            });
        }
        self.voltage =
            f64::from(u16::from_le_bytes(voltage[..2].try_into().unwrap())) / VOLTAGE_DIVISOR;

        Ok(())
    }

    /// Writes the current color draft back to the controller.
    ///
    /// A controller outside full custom mode mirrors its grip colors from the
    /// body color, so the marker is promoted first when the draft contains
    /// independent grip colors. A failed promotion is reported but does not
    /// stop the color write; a failed color write is the commit failure and
    /// is returned to the caller.
    ///
    /// There is no rollback: if the color write fails after a successful
    /// promotion, the controller stays in full custom mode with its old color
    /// bytes.
    pub async fn submit_color(&mut self) -> Result<(), ControllerError> {
        let buf = self.colors.to_flash_bytes();

        if self.kind == ControllerKind::ProController
            && self.color_type != ColorType::FullCustom
            && (self.colors.left_grip != self.colors.body
                || self.colors.right_grip != self.colors.body)
        {
            let marker = [u8::from(ColorType::FullCustom)];
            if let Err(err) = flash::write(&self.chan, flash::COLOR_TYPE.address, &marker).await {
                warn!("could not switch the controller to full custom colors: {err}");
            }
        }

        flash::write(&self.chan, flash::DEVICE_COLOR.address, &buf).await?;
        Ok(())
    }

    /// The product name the HID layer reports for the device.
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    /// The firmware version, formatted as `major.minor`.
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// The MAC address, formatted as colon-separated hex bytes.
    pub fn mac_addr(&self) -> &str {
        &self.mac_addr
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// The battery voltage in volts, as sampled at connect time.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Estimates the battery charge as a fraction between 0 and 1 from the
    /// sampled voltage.
    pub fn battery_level(&self) -> f64 {
        ((self.voltage - BATTERY_EMPTY_VOLTS) / (BATTERY_FULL_VOLTS - BATTERY_EMPTY_VOLTS))
            .clamp(0.0, 1.0)
    }

    /// The stored color type marker, as read at connect time.
    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    /// The current color draft.
    pub fn colors(&self) -> ColorSet {
        self.colors
    }

    /// Mutable access to the color draft. Edits stay local until
    /// [`Self::submit_color`] is called.
    pub fn colors_mut(&mut self) -> &mut ColorSet {
        &mut self.colors
    }

    /// The colors read from the device when the session was established.
    pub fn original_colors(&self) -> ColorSet {
        self.original
    }

    /// Restores the color draft to the connect-time snapshot.
    pub fn reset_colors(&mut self) {
        self.colors = self.original;
    }
}

/// Performs the connection setup exchange.
///
/// The handshake acknowledgment is best-effort: some transports and firmware
/// revisions never send one, so an unacknowledged handshake is logged and
/// dropped instead of propagated. Failures to transmit any of the three
/// commands are real transport errors and do propagate.
async fn start_connection(chan: &ReportChannel) -> Result<(), ControllerError> {
    chan.send(&Report::new(USB_COMMAND_REPORT_ID, [USB_COMMAND_WAKE]))
        .await?;

    let handshake = Report::new(USB_COMMAND_REPORT_ID, [USB_COMMAND_HANDSHAKE]);
    let acknowledged = chan
        .request(
            &handshake,
            |report: &Report| {
                report.id == USB_ACK_REPORT_ID
                    && report.payload.first() == Some(&USB_COMMAND_HANDSHAKE)
            },
            HANDSHAKE_TIMEOUT,
            HANDSHAKE_RETRIES,
        )
        .await;
    if let Err(err) = acknowledged {
        warn!("the connection handshake went unacknowledged, proceeding: {err}");
    }

    chan.send(&Report::new(USB_COMMAND_REPORT_ID, [USB_COMMAND_FULL_RATE]))
        .await?;

    Ok(())
}

/// Applies the grip color rules to freshly read colors.
///
/// Outside full custom mode a Pro Controller stores a single body color and
/// the grip bytes hold placeholder data, so both grips mirror the body color.
///
/// Two factory presets additionally store a null placeholder grip color on
/// known firmware revisions; their retail grip colors are restored from a
/// fixed two-entry table. The table entries are reproduced verbatim from the
/// retail units and are not derivable from the stored bytes.
fn normalize_grip_colors(colors: &mut ColorSet, kind: ControllerKind, color_type: ColorType) {
    if kind == ControllerKind::ProController && color_type != ColorType::FullCustom {
        colors.left_grip = colors.body;
        colors.right_grip = colors.body;
    }

    const WHITE: Rgb = Rgb([0xff, 0xff, 0xff]);
    if colors.button == WHITE && colors.body == Rgb([0x31, 0x32, 0x32]) {
        colors.left_grip = Rgb([0x1e, 0xdc, 0x00]);
        colors.right_grip = Rgb([0xff, 0x32, 0x78]);
    } else if colors.button == WHITE && colors.body == Rgb([0x32, 0x31, 0x32]) {
        colors.left_grip = Rgb([0xb0, 0x42, 0x56]);
        colors.right_grip = Rgb([0xb0, 0x42, 0x56]);
    }
}

/// Decodes the stored serial number characters: `0xff` marks an unprogrammed
/// position and becomes `*`, `0x00` padding is dropped.
fn decode_serial(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&byte| byte != 0x00)
        .map(|&byte| if byte == 0xff { '*' } else { char::from(byte) })
        .collect()
}

/// Represents a session-specific error.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Indicates that the underlying report channel returned an error.
    #[error("the report channel returned an error")]
    Channel(#[from] ChannelError),

    /// Indicates that a sub-command failed.
    #[error("a sub-command failed")]
    SubCommand(#[from] SubCommandError),

    /// Indicates that a flash access failed.
    #[error("a flash access failed")]
    Flash(#[from] FlashError),

    /// Indicates that a sub-command reply was too short to parse.
    #[error("the reply to sub-command {command:?} is shorter than expected")]
    MalformedReply {
        /// The sub-command whose reply could not be parsed.
        command: SubCommand,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors(body: &str, button: &str, left: &str, right: &str) -> ColorSet {
        ColorSet {
            body: body.parse().unwrap(),
            button: button.parse().unwrap(),
            left_grip: left.parse().unwrap(),
            right_grip: right.parse().unwrap(),
        }
    }

    #[test]
    fn procon_grips_mirror_body_outside_full_custom() {
        for color_type in [ColorType::Default, ColorType::BodyAndButton] {
            let mut set = colors("#0ab9e6", "#e6ff00", "#000000", "#000000");
            normalize_grip_colors(&mut set, ControllerKind::ProController, color_type);
            assert_eq!(set.left_grip, set.body);
            assert_eq!(set.right_grip, set.body);
        }
    }

    #[test]
    fn full_custom_grips_are_kept() {
        let mut set = colors("#0ab9e6", "#e6ff00", "#1edc00", "#ff3278");
        let expected = set;
        normalize_grip_colors(&mut set, ControllerKind::ProController, ColorType::FullCustom);
        assert_eq!(set, expected);
    }

    #[test]
    fn joycon_grips_are_kept() {
        let mut set = colors("#0ab9e6", "#e6ff00", "#123456", "#654321");
        let expected = set;
        normalize_grip_colors(&mut set, ControllerKind::LeftJoyCon, ColorType::Default);
        assert_eq!(set, expected);
    }

    #[test]
    fn splatoon_preset_grips_are_restored() {
        let mut set = colors("#313232", "#ffffff", "#000000", "#000000");
        normalize_grip_colors(&mut set, ControllerKind::ProController, ColorType::Default);
        assert_eq!(set.left_grip, "#1edc00".parse().unwrap());
        assert_eq!(set.right_grip, "#ff3278".parse().unwrap());
    }

    #[test]
    fn smash_preset_grips_are_restored() {
        let mut set = colors("#323132", "#ffffff", "#000000", "#000000");
        normalize_grip_colors(&mut set, ControllerKind::ProController, ColorType::Default);
        assert_eq!(set.left_grip, "#b04256".parse().unwrap());
        assert_eq!(set.right_grip, "#b04256".parse().unwrap());
    }

    #[test]
    fn serial_decoding_maps_unprogrammed_and_drops_padding() {
        let raw = [
            0xff, 0xff, b'X', b'K', b'W', b'1', b'0', b'0', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        assert_eq!(decode_serial(&raw), "**XKW100");
    }

    #[test]
    fn kind_bytes_map_to_variants() {
        assert_eq!(ControllerKind::from(3), ControllerKind::ProController);
        assert_eq!(ControllerKind::from(1), ControllerKind::LeftJoyCon);
        assert_eq!(ControllerKind::from(0x7f), ControllerKind::Unknown);
        assert_eq!(ControllerKind::ProController.to_string(), "procon");
    }
}
