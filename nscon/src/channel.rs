//! Implements basic report messaging across a raw HID channel.
//!
//! This includes mapping incoming reports to previously sent requests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::channel::oneshot;
use hidreport::ReportDescriptor;
use thiserror::Error;
use tracing::debug;

/// hidapi defines this as the maximum EXPECTED size of report descriptors.
/// We will trust this for now, but a workaround may be required if devices do
/// in fact return longer descriptors.
const MAX_REPORT_DESCRIPTOR_LENGTH: usize = 4096;

/// This is the size of the buffer incoming reports are read into.
/// The largest report a controller emits is the `0x31` input report carrying
/// an NFC/IR data trailer, at 362 bytes.
const MAX_INPUT_REPORT_LENGTH: usize = 362;

/// A boxed error returned by a [`RawHidTransport`] implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Represents a single numbered HID report, either inbound or outbound.
///
/// The payload does not include the report id byte.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Report {
    /// The report id.
    pub id: u8,

    /// The opaque payload bytes following the report id.
    pub payload: Vec<u8>,
}

impl Report {
    pub fn new(id: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Tries to read a report from raw data, with the report id as the first
    /// byte.
    pub fn read_raw(data: &[u8]) -> Option<Self> {
        let (&id, payload) = data.split_first()?;

        Some(Self {
            id,
            payload: payload.to_vec(),
        })
    }

    /// Writes the report in its raw byte form, with the report id as the
    /// first byte.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(1 + self.payload.len());
        raw.push(self.id);
        raw.extend_from_slice(&self.payload);
        raw
    }
}

/// Represents an arbitrary HID communication channel that is both readable and
/// writable. It has to support async I/O.
///
/// Any type this trait is implemented for can be used to talk to a
/// controller. The trait defines async methods using the `async_trait`
/// attribute, which is re-exported from the crate root for annotating
/// implementations.
#[async_trait]
pub trait RawHidTransport: Send + Sync + 'static {
    /// The product name the HID layer reports for the device.
    fn product_name(&self) -> String;

    /// If the implementation already knows whether the device exposes an
    /// output report with the given id, it should return `Some` from this
    /// method.
    ///
    /// In this case, the report descriptor will not be read and parsed.
    fn supports_output_report(&self, report_id: u8) -> Option<bool>;

    /// Retrieves the raw HID report descriptor from the channel.
    ///
    /// This is used to determine whether the device exposes a specific output
    /// report.
    ///
    /// Returns the exact size of the report descriptor on success.
    async fn get_report_descriptor(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Writes a raw report to the channel. The first byte of `src` is the
    /// report id.
    ///
    /// Returns the exact amount of written bytes on success.
    async fn write_report(&self, src: &[u8]) -> Result<usize, TransportError>;

    /// Reads a raw report from the channel. The first byte of the result is
    /// the report id.
    ///
    /// If the buffer is not large enough to fit the whole report, its
    /// remainder should be discarded and must not be returned by any
    /// succeeding call to [`Self::read_report`].
    ///
    /// Returns the exact amount of read bytes on success.
    async fn read_report(&self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Represents a request that was sent and is waiting for a response.
struct PendingReport {
    /// Accepts the inbound report that answers the request.
    ///
    /// The controller multiplexes unsolicited input reports (button state and
    /// the like) onto the same stream, so responses are matched by content,
    /// never by position.
    filter: Arc<dyn Fn(&Report) -> bool + Send + Sync>,

    /// The oneshot sender used to provide the response report to the waiting
    /// request.
    sender: oneshot::Sender<Report>,
}

/// Represents a bidirectional HID report channel to a single controller.
///
/// The channel holds at most one pending request at any time: responses carry
/// no request id, so two outstanding requests with the same opcode would be
/// indistinguishable. Callers issue requests strictly one after another.
pub struct ReportChannel {
    /// The underlying raw HID transport.
    raw: Arc<dyn RawHidTransport>,

    /// The single slot for a sent request that is waiting for a response.
    pending: Arc<Mutex<Option<PendingReport>>>,

    /// The handle to the task draining inbound reports. Aborted on drop.
    read_task: tokio::task::JoinHandle<()>,
}

impl Drop for ReportChannel {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

impl ReportChannel {
    /// Constructs a report channel from a raw HID transport and starts the
    /// inbound read task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<T: RawHidTransport>(raw: T) -> Self {
        let raw_rc: Arc<dyn RawHidTransport> = Arc::new(raw);
        let pending_rc = Arc::new(Mutex::new(None::<PendingReport>));

        let read_task = tokio::spawn({
            let raw = Arc::clone(&raw_rc);
            let pending = Arc::clone(&pending_rc);

            async move {
                let mut buf = [0u8; MAX_INPUT_REPORT_LENGTH];

                loop {
                    let len = match raw.read_report(&mut buf).await {
                        Ok(len) => len,
                        Err(err) => {
                            // A closed transport fails every read; pending
                            // requests fail through their timer instead.
                            debug!("stopping the read task: {err}");
                            break;
                        },
                    };

                    let Some(report) = Report::read_raw(&buf[..len]) else {
                        continue;
                    };

                    let Ok(mut guard) = pending.lock() else {
                        continue;
                    };

                    if guard
                        .as_ref()
                        .is_some_and(|waiting| (waiting.filter)(&report))
                    {
                        let waiting = guard.take().unwrap();
                        let _ = waiting.sender.send(report);
                    }
                }
            }
        });

        Self {
            raw: raw_rc,
            pending: pending_rc,
            read_task,
        }
    }

    /// The product name the HID layer reports for the device.
    pub fn product_name(&self) -> String {
        self.raw.product_name()
    }

    /// Checks whether the device exposes an output report with the given id.
    ///
    /// If the transport does not answer the question itself, the raw report
    /// descriptor is retrieved and parsed.
    pub async fn supports_output_report(&self, report_id: u8) -> Result<bool, ChannelError> {
        if let Some(known) = self.raw.supports_output_report(report_id) {
            return Ok(known);
        }

        let mut raw_descriptor = vec![0u8; MAX_REPORT_DESCRIPTOR_LENGTH];
        let descriptor_size = self
            .raw
            .get_report_descriptor(&mut raw_descriptor)
            .await
            .map_err(ChannelError::Transport)?;

        let descriptor = ReportDescriptor::try_from(&raw_descriptor[..descriptor_size])
            .map_err(ChannelError::ReportDescriptor)?;

        Ok(descriptor.find_output_report(&[report_id]).is_some())
    }

    /// Sends a report across the channel and does not wait for a response.
    ///
    /// If a response is expected, use [`Self::request`].
    pub async fn send(&self, report: &Report) -> Result<(), ChannelError> {
        debug!(
            "sending report {:#04x} ({} bytes)",
            report.id,
            report.payload.len()
        );

        self.raw
            .write_report(&report.to_raw())
            .await
            .map(|_| ())
            .map_err(ChannelError::Transport)
    }

    /// Sends a report across the channel and waits for the first inbound
    /// report accepted by `filter`.
    ///
    /// If no accepted report arrives within `timeout`, the identical request
    /// is sent again, up to `retries` times, so a never-answered request
    /// performs `retries + 1` send attempts before failing with
    /// [`ChannelError::RequestTimeout`].
    ///
    /// The pending filter is removed on every exit path. A stale filter left
    /// behind would let a late response of this request answer an unrelated
    /// later one.
    pub async fn request<F>(
        &self,
        report: &Report,
        filter: F,
        timeout: Duration,
        retries: u32,
    ) -> Result<Report, ChannelError>
    where
        F: Fn(&Report) -> bool + Send + Sync + 'static,
    {
        let filter: Arc<dyn Fn(&Report) -> bool + Send + Sync> = Arc::new(filter);

        for attempt in 0..=retries {
            if attempt != 0 {
                debug!("retrying request for report {:#04x} (attempt {attempt})", report.id);
            }

            let (sender, receiver) = oneshot::channel::<Report>();
            *self.pending.lock().unwrap() = Some(PendingReport {
                filter: Arc::clone(&filter),
                sender,
            });

            if let Err(err) = self.send(report).await {
                self.pending.lock().unwrap().take();
                return Err(err);
            }

            match tokio::time::timeout(timeout, receiver).await {
                Ok(Ok(response)) => return Ok(response),
                // A cancelled receiver means the sender was dropped without a
                // response; treat it like an elapsed timer.
                Ok(Err(oneshot::Canceled)) | Err(_) => {
                    self.pending.lock().unwrap().take();
                },
            }
        }

        Err(ChannelError::RequestTimeout {
            report_id: report.id,
        })
    }
}

/// Represents an error that occurred when creating or interacting with a
/// report channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Indicates that the concrete implementation of [`RawHidTransport`]
    /// returned an error.
    #[error("the HID transport implementation returned an error")]
    Transport(#[source] TransportError),

    /// Indicates that the HID report descriptor could not be parsed.
    #[error("the report descriptor could not be parsed")]
    ReportDescriptor(hidreport::ParserError),

    /// Indicates that no matching response arrived within the configured
    /// timeout, including all retries.
    #[error("the request for report id {report_id:#04x} timed out")]
    RequestTimeout {
        /// The id of the report the request was sent with.
        report_id: u8,
    },
}
