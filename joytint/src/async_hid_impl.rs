//! Implements HID communication using the `async-hid` crate.

use std::{fs::File, io::Read};

use anyhow::{Result, anyhow, bail};
use async_hid::{
    AsyncHidRead,
    AsyncHidWrite,
    Device,
    DeviceId,
    DeviceInfo,
    DeviceReader,
    DeviceWriter,
    HidBackend,
};
use futures_lite::StreamExt;
use itertools::Itertools;
use nscon::{
    async_trait,
    channel::{RawHidTransport, TransportError},
};
use tokio::sync::Mutex;

/// The USB vendor id shared by all supported controllers.
const NINTENDO_VENDOR_ID: u16 = 0x057e;

pub struct AsyncHidDevice(Mutex<DeviceReader>, Mutex<DeviceWriter>, DeviceInfo);

#[async_trait]
impl RawHidTransport for AsyncHidDevice {
    fn product_name(&self) -> String {
        self.2.name.clone()
    }

    fn supports_output_report(&self, _report_id: u8) -> Option<bool> {
        None
    }

    async fn get_report_descriptor(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let DeviceId::DevPath(ref path) = self.2.id else {
            return Err(
                anyhow!("report descriptors are currently only supported on Linux")
                    .into_boxed_dyn_error(),
            );
        };

        let descriptor_path = path.join("device/report_descriptor");
        let mut file = File::open(descriptor_path)?;
        Ok(file.read(buf)?)
    }

    async fn write_report(&self, src: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.1.lock().await;
        guard.write_output_report(src).await?;
        Ok(src.len())
    }

    async fn read_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut guard = self.0.lock().await;
        Ok(guard.read_input_report(buf).await?)
    }
}

/// Tries to find the one connected controller and opens it.
///
/// Zero candidates and more than one candidate are both hard errors: with
/// several controllers attached there is no way to tell which one should be
/// recolored.
pub async fn open_controller() -> Result<AsyncHidDevice> {
    let hid = HidBackend::default();
    let mut candidates: Vec<Device> = hid
        .enumerate()
        .await?
        .collect::<Vec<Device>>()
        .await
        .into_iter()
        .unique_by(|x| x.id.clone())
        .filter(|x| x.vendor_id == NINTENDO_VENDOR_ID)
        .collect();

    if candidates.is_empty() {
        bail!("no controller was found — connect a Joy-Con or Pro Controller and try again");
    }
    if candidates.len() > 1 {
        bail!(
            "{} controllers were found — connect only one at a time",
            candidates.len()
        );
    }

    let device = candidates.remove(0);
    let opened = device.open().await?;

    Ok(AsyncHidDevice(
        Mutex::new(opened.0),
        Mutex::new(opened.1),
        device.to_device_info(),
    ))
}
