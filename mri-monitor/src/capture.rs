//! Raw frame capture.
//!
//! Frames are read from a datalink channel on a dedicated thread and handed to the async side
//! through a bounded channel, exposed as a [`Stream`] of frames. Read errors close the channel
//! and a new one is opened after a short backoff, so the stream outlives transient failures.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
    thread,
    time::Duration,
};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::CaptureError;

/// Frames buffered between the capture thread and the consumer.
pub const DEFAULT_BUFFER: usize = 1024;

/// Wait before reopening a failed channel.
const REOPEN_BACKOFF: Duration = Duration::from_millis(100);

/// Bounds how long a read blocks, so the thread notices a dropped stream.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// The frames captured on one interface.
#[derive(Debug)]
pub struct CaptureStream {
    interface: String,
    frames: ReceiverStream<Bytes>,
}

impl CaptureStream {
    /// Name of the interface frames are read from.
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl Stream for CaptureStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_next_unpin(cx)
    }
}

/// Starts capturing on `interface`.
///
/// Fails if the interface does not exist or the first channel cannot be opened (usually a
/// permission problem). Capture stops once the returned stream is dropped.
pub fn open(interface: &str, buffer: usize) -> Result<CaptureStream, CaptureError> {
    let network = datalink::interfaces()
        .into_iter()
        .find(|candidate| candidate.name == interface)
        .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_owned()))?;

    let rx = open_channel(&network)?;
    let (tx, frames) = mpsc::channel(buffer.max(1));

    thread::Builder::new()
        .name(format!("capture-{interface}"))
        .spawn(move || capture(network, rx, tx))?;

    info!(%interface, "Capturing frames");

    Ok(CaptureStream { interface: interface.to_owned(), frames: ReceiverStream::new(frames) })
}

fn open_channel(network: &NetworkInterface) -> Result<Box<dyn DataLinkReceiver>, CaptureError> {
    let config = Config { read_timeout: Some(READ_TIMEOUT), ..Default::default() };

    match datalink::channel(network, config)? {
        Channel::Ethernet(_, rx) => Ok(rx),
        _ => Err(CaptureError::UnsupportedChannel(network.name.clone())),
    }
}

/// The capture thread.
fn capture(network: NetworkInterface, mut rx: Box<dyn DataLinkReceiver>, tx: mpsc::Sender<Bytes>) {
    loop {
        match rx.next() {
            Ok(frame) => {
                if tx.blocking_send(Bytes::copy_from_slice(frame)).is_err() {
                    debug!(interface = %network.name, "Capture stream dropped");
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                if tx.is_closed() {
                    debug!(interface = %network.name, "Capture stream dropped");
                    return;
                }
            }
            Err(e) => {
                warn!(interface = %network.name, err = %e, "Capture failed, reopening channel");

                rx = loop {
                    thread::sleep(REOPEN_BACKOFF);
                    if tx.is_closed() {
                        return;
                    }

                    match open_channel(&network) {
                        Ok(rx) => break rx,
                        Err(e) => warn!(interface = %network.name, err = %e, "Failed to reopen channel"),
                    }
                };
            }
        }
    }
}
