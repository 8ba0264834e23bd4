//! Tests for the addressed flash accessor.

mod support;

use nscon::{
    channel::ReportChannel,
    flash::{self, FlashError},
};
use support::{MockController, ScriptedTransport, flash_read_body, spi_writes, subcommand_reply};

#[tokio::test]
async fn reads_return_exactly_the_requested_bytes() {
    let mock = MockController::default();
    let expected_colors = mock.device_color;
    let expected_serial = mock.serial;
    let (transport, _log) = mock.into_transport();
    let chan = ReportChannel::open(transport);

    let colors = flash::read(&chan, flash::DEVICE_COLOR).await.unwrap();
    assert_eq!(colors, expected_colors);

    let serial = flash::read(&chan, flash::SERIAL_NUMBER).await.unwrap();
    assert_eq!(serial, expected_serial);
}

#[tokio::test]
async fn mismatched_read_echoes_are_rejected() {
    // Replies echoing the read opcode but the wrong address or length must
    // not answer the request, even though they arrive first.
    let (transport, _log) = ScriptedTransport::new(|frame| {
        if frame.first() != Some(&0x01) {
            return Vec::new();
        }

        vec![
            subcommand_reply(0x10, &flash_read_body(0x6012, &[0x99])),
            subcommand_reply(0x10, &flash_read_body(0x601b, &[0x99, 0x99])),
            subcommand_reply(0x10, &flash_read_body(0x601b, &[0x02])),
        ]
    });
    let chan = ReportChannel::open(transport);

    let data = flash::read(&chan, flash::COLOR_TYPE).await.unwrap();
    assert_eq!(data, vec![0x02]);
}

#[tokio::test]
async fn truncated_read_replies_fail() {
    // The reply echoes the correct address and length but carries fewer data
    // bytes than announced.
    let (transport, _log) = ScriptedTransport::new(|frame| {
        if frame.first() != Some(&0x01) {
            return Vec::new();
        }

        let mut body = vec![0u8; 9];
        body[..4].copy_from_slice(&0x6050u32.to_le_bytes());
        body[4] = 12;
        vec![subcommand_reply(0x10, &body)]
    });
    let chan = ReportChannel::open(transport);

    let result = flash::read(&chan, flash::DEVICE_COLOR).await;
    assert!(matches!(
        result,
        Err(FlashError::ShortReply { address: 0x6050 })
    ));
}

#[tokio::test]
async fn accepted_writes_carry_the_access_header() {
    let (transport, log) = MockController::default().into_transport();
    let chan = ReportChannel::open(transport);

    flash::write(&chan, 0x601b, &[0x02]).await.unwrap();

    assert_eq!(spi_writes(&log.frames()), vec![(0x601b, vec![0x02])]);
}

#[tokio::test]
async fn rejected_writes_surface_the_status() {
    let mock = MockController {
        reject_writes_to: Some(0x6050),
        ..Default::default()
    };
    let (transport, _log) = mock.into_transport();
    let chan = ReportChannel::open(transport);

    let result = flash::write(&chan, 0x6050, &[0u8; 12]).await;
    assert!(matches!(
        result,
        Err(FlashError::WriteRejected {
            address: 0x6050,
            status: 0x01
        })
    ));
}
