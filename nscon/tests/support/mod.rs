//! A scripted in-memory HID transport for driving the protocol stack without
//! hardware.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use nscon::{
    async_trait,
    channel::{RawHidTransport, TransportError},
};

/// Records every raw frame a test transport was asked to write.
#[derive(Default)]
pub struct TransportLog {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl TransportLog {
    /// All written frames, oldest first.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    /// The amount of written frames with the given report id.
    pub fn count_with_id(&self, report_id: u8) -> usize {
        self.frames()
            .iter()
            .filter(|frame| frame.first() == Some(&report_id))
            .count()
    }
}

/// An in-memory [`RawHidTransport`] backed by a responder function.
///
/// Every written frame is handed to the responder, and whatever raw frames it
/// returns are queued for subsequent reads. A responder that returns nothing
/// emulates a device that stays silent.
pub struct ScriptedTransport {
    responder: Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>,
    log: Arc<TransportLog>,
    inbound_tx: flume::Sender<Vec<u8>>,
    inbound_rx: flume::Receiver<Vec<u8>>,
    usb_command_hint: Option<bool>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> (Self, Arc<TransportLog>)
    where
        F: Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        let log = Arc::new(TransportLog::default());
        let (inbound_tx, inbound_rx) = flume::unbounded();

        (
            Self {
                responder: Box::new(responder),
                log: Arc::clone(&log),
                inbound_tx,
                inbound_rx,
                usb_command_hint: Some(true),
            },
            log,
        )
    }

    /// Reports the USB command output report (`0x80`) as absent, like a
    /// controller variant that connects without it.
    pub fn without_usb_commands(mut self) -> Self {
        self.usb_command_hint = Some(false);
        self
    }
}

#[async_trait]
impl RawHidTransport for ScriptedTransport {
    fn product_name(&self) -> String {
        "Pro Controller".to_owned()
    }

    fn supports_output_report(&self, _report_id: u8) -> Option<bool> {
        self.usb_command_hint
    }

    async fn get_report_descriptor(&self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Err("the scripted transport has no report descriptor".into())
    }

    async fn write_report(&self, src: &[u8]) -> Result<usize, TransportError> {
        self.log.frames.lock().unwrap().push(src.to_vec());

        for frame in (self.responder)(src) {
            let _ = self.inbound_tx.send(frame);
        }

        Ok(src.len())
    }

    async fn read_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let frame = self
            .inbound_rx
            .recv_async()
            .await
            .map_err(|err| Box::new(err) as TransportError)?;

        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }
}

/// Builds a raw `0x21` sub-command reply frame with the opcode echo in place
/// and `data` as the reply body.
pub fn subcommand_reply(opcode: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 15 + data.len()];
    frame[0] = 0x21;
    frame[13] = 0x80; // acknowledgment byte
    frame[14] = opcode;
    frame[15..].copy_from_slice(data);
    frame
}

/// Builds the reply body of a flash read: the echoed access header followed
/// by the stored bytes.
pub fn flash_read_body(address: u16, content: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 5 + content.len()];
    body[..4].copy_from_slice(&u32::from(address).to_le_bytes());
    body[4] = content.len() as u8;
    body[5..].copy_from_slice(content);
    body
}

/// Extracts all flash writes from a frame log as `(address, data)` pairs.
pub fn spi_writes(frames: &[Vec<u8>]) -> Vec<(u16, Vec<u8>)> {
    frames
        .iter()
        .filter(|frame| frame.first() == Some(&0x01) && frame.get(10) == Some(&0x11))
        .map(|frame| {
            let address = u16::from_le_bytes([frame[11], frame[12]]);
            let length = usize::from(frame[15]);
            (address, frame[16..16 + length].to_vec())
        })
        .collect()
}

/// A full scripted controller: answers the connection handshake and the four
/// sub-commands the session uses, serving configurable flash content.
pub struct MockController {
    pub kind: u8,
    pub firmware: (u8, u8),
    pub mac: [u8; 6],
    /// The raw little-endian voltage reading. `200` decodes to 0.5 V.
    pub voltage_raw: u16,
    pub color_type: u8,
    pub device_color: [u8; 12],
    pub serial: [u8; 16],
    /// Flash writes to this address are answered with a non-zero status.
    pub reject_writes_to: Option<u16>,
    /// When set, the `0x80`/`0x02` handshake is never acknowledged.
    pub mute_handshake: bool,
}

impl Default for MockController {
    fn default() -> Self {
        let mut serial = [0u8; 16];
        serial[..2].copy_from_slice(&[0xff, 0xff]);
        serial[2..8].copy_from_slice(b"XKW100");

        Self {
            kind: 3,
            firmware: (3, 0x88),
            mac: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            voltage_raw: 200,
            color_type: 2,
            device_color: [
                0x0a, 0xb9, 0xe6, // body
                0xe6, 0xff, 0x00, // button
                0x1e, 0xdc, 0x00, // left grip
                0xff, 0x32, 0x78, // right grip
            ],
            serial,
            reject_writes_to: None,
            mute_handshake: false,
        }
    }
}

impl MockController {
    pub fn into_transport(self) -> (ScriptedTransport, Arc<TransportLog>) {
        ScriptedTransport::new(move |frame| self.respond(frame))
    }

    fn respond(&self, frame: &[u8]) -> Vec<Vec<u8>> {
        match frame.first() {
            Some(&0x80) => {
                if frame.get(1) == Some(&0x02) && !self.mute_handshake {
                    vec![vec![0x81, 0x02, 0x00, 0x00]]
                } else {
                    Vec::new()
                }
            },
            Some(&0x01) => self.respond_sub_command(frame),
            _ => Vec::new(),
        }
    }

    fn respond_sub_command(&self, frame: &[u8]) -> Vec<Vec<u8>> {
        // Outbound layout: id, packet counter, 8 rumble bytes, opcode, body.
        let opcode = frame[10];
        let body = &frame[11..];

        match opcode {
            0x02 => {
                let mut data = vec![0u8; 10];
                data[0] = self.firmware.0;
                data[1] = self.firmware.1;
                data[2] = self.kind;
                data[3] = 0x02;
                data[4..10].copy_from_slice(&self.mac);
                vec![subcommand_reply(opcode, &data)]
            },
            0x10 => {
                let address = u16::from_le_bytes([body[0], body[1]]);
                let length = body[4];
                let content = self.flash_content(address, length);
                vec![subcommand_reply(
                    opcode,
                    &flash_read_body(address, &content),
                )]
            },
            0x11 => {
                let address = u16::from_le_bytes([body[0], body[1]]);
                let status = if self.reject_writes_to == Some(address) {
                    0x01
                } else {
                    0x00
                };
                vec![subcommand_reply(opcode, &[status])]
            },
            0x50 => vec![subcommand_reply(opcode, &self.voltage_raw.to_le_bytes())],
            _ => Vec::new(),
        }
    }

    fn flash_content(&self, address: u16, length: u8) -> Vec<u8> {
        let mut content = match address {
            0x6000 => self.serial.to_vec(),
            0x601b => vec![self.color_type],
            0x6050 => self.device_color.to_vec(),
            _ => Vec::new(),
        };

        content.resize(usize::from(length), 0x00);
        content
    }
}
