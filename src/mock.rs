/*!
 # Deterministic in-memory transport

 A [`Transport`] implementation backed by a simulated controller, used by
 the integration tests (and handy for driving the library without radio
 hardware). The simulated controller applies every decoded command frame to
 an internal state snapshot and answers status requests with a status frame
 built from that snapshot, so a `set_rgb` followed by `query_status` behaves
 like real firmware.

 Writes are recorded as split fragments with a scheduling point between
 them, which makes any violation of the one-frame-in-flight guarantee
 observable as interleaved fragments in the log.
*/

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{POWER_OFF_BYTE, POWER_ON_BYTE, STATUS_HEADER, STATUS_TRAILER};
use crate::transport::{Advertisement, Connection, Transport};
use crate::{Error, Result};

/// An injected failure for the next write on the mock connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// Cleanly reported link loss
    LinkDown,
    /// An ambiguous transport error
    Ambiguous,
    /// The write never completes; the caller is expected to time out
    Hang,
}

/// One recorded piece of a write, tagged with the write call it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFragment {
    /// Monotonic id of the write call
    pub write_id: u64,
    /// Characteristic the fragment was written to
    pub characteristic: Uuid,
    /// The fragment bytes
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct DeviceState {
    is_on: bool,
    rgb: (u8, u8, u8),
    white: u8,
    mode_byte: u8,
    wire_speed: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            is_on: false,
            rgb: (0, 0, 0),
            white: 0,
            mode_byte: 0x41,
            wire_speed: 0x01,
        }
    }
}

/// The simulated controller behind a [`MockTransport`].
///
/// Tests hold this through [`MockTransport::device`] to inject failures and
/// inspect recorded traffic.
pub struct MockDevice {
    write_log: Mutex<Vec<WriteFragment>>,
    frames: Mutex<Vec<Vec<u8>>>,
    next_write_id: AtomicU64,
    state: Mutex<DeviceState>,
    notify_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    pending_failure: Mutex<Option<WriteFailure>>,
    suppress_status: AtomicBool,
    status_override: Mutex<Option<Vec<u8>>>,
    disconnected: AtomicBool,
}

impl MockDevice {
    fn new() -> Arc<MockDevice> {
        Arc::new(MockDevice {
            write_log: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            next_write_id: AtomicU64::new(0),
            state: Mutex::new(DeviceState::default()),
            notify_tx: Mutex::new(None),
            pending_failure: Mutex::new(None),
            suppress_status: AtomicBool::new(false),
            status_override: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        })
    }

    /// Makes the next write fail in the given way.
    pub fn fail_next_write(&self, failure: WriteFailure) {
        *self.pending_failure.lock() = Some(failure);
    }

    /// Stops answering status requests (to provoke a query timeout).
    pub fn suppress_status_replies(&self) {
        self.suppress_status.store(true, Ordering::SeqCst);
    }

    /// Answers the next status requests with this raw frame instead of the
    /// simulated state.
    pub fn override_status_frame(&self, frame: Vec<u8>) {
        *self.status_override.lock() = Some(frame);
    }

    /// All recorded write fragments, in arrival order.
    pub fn write_fragments(&self) -> Vec<WriteFragment> {
        self.write_log.lock().clone()
    }

    /// All complete frames written so far, in completion order.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    /// Whether the connection has been torn down.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn status_frame(&self) -> Vec<u8> {
        if let Some(frame) = self.status_override.lock().clone() {
            return frame;
        }
        let state = *self.state.lock();
        let power = if state.is_on {
            POWER_ON_BYTE
        } else {
            POWER_OFF_BYTE
        };
        vec![
            STATUS_HEADER,
            0x15,
            power,
            state.mode_byte,
            0x20,
            state.wire_speed,
            state.rgb.0,
            state.rgb.1,
            state.rgb.2,
            state.white,
            0x06,
            STATUS_TRAILER,
        ]
    }

    async fn apply_frame(&self, frame: &[u8]) {
        match frame {
            [0x56, r, g, b, w, selector, 0xAA] => {
                let mut state = self.state.lock();
                match selector {
                    0xF0 => {
                        state.rgb = (*r, *g, *b);
                        state.mode_byte = 0x41;
                    }
                    0x0F => {
                        state.white = *w;
                        state.mode_byte = 0x41;
                    }
                    _ => {}
                }
            }
            [0xCC, power, 0x33] => {
                self.state.lock().is_on = *power == POWER_ON_BYTE;
            }
            [0xBB, mode, speed, 0x44] => {
                let mut state = self.state.lock();
                state.mode_byte = *mode;
                state.wire_speed = *speed;
            }
            [0xEF, 0x01, 0x77] => {
                if self.suppress_status.load(Ordering::SeqCst) {
                    return;
                }
                let tx = self.notify_tx.lock().clone();
                if let Some(tx) = tx {
                    let _ = tx.send(self.status_frame()).await;
                }
            }
            _ => {}
        }
    }
}

/// In-memory [`Transport`] over one simulated controller and a scripted
/// advertisement sequence.
pub struct MockTransport {
    advertisements: Vec<Advertisement>,
    device: Arc<MockDevice>,
    connect_delay: Mutex<Option<Duration>>,
    refuse_connect: AtomicBool,
}

impl MockTransport {
    /// A transport that advertises nothing.
    pub fn new() -> MockTransport {
        Self::with_advertisements(Vec::new())
    }

    /// A transport that replays the given advertisement sequence, in order
    /// and with duplicates preserved, on every scan.
    pub fn with_advertisements(advertisements: Vec<Advertisement>) -> MockTransport {
        MockTransport {
            advertisements,
            device: MockDevice::new(),
            connect_delay: Mutex::new(None),
            refuse_connect: AtomicBool::new(false),
        }
    }

    /// The simulated controller, for failure injection and traffic
    /// inspection.
    pub fn device(&self) -> Arc<MockDevice> {
        self.device.clone()
    }

    /// Delays connection establishment (to provoke a connect timeout).
    pub fn delay_connect(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    /// Makes every connect attempt fail with a link error.
    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn scan(&self, _timeout: Duration) -> Result<mpsc::Receiver<Advertisement>> {
        let (tx, rx) = mpsc::channel(self.advertisements.len().max(1));
        let advertisements = self.advertisements.clone();
        tokio::spawn(async move {
            for adv in advertisements {
                if tx.send(adv).await.is_err() {
                    break;
                }
            }
            // Dropping the sender closes the scan early; the scanner treats
            // that as the end of the discovery window.
        });
        Ok(rx)
    }

    async fn connect(&self, address: &str, _timeout: Duration) -> Result<Self::Connection> {
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(Error::Connection("peer refused connection".into()));
        }

        let known: HashSet<&str> = self
            .advertisements
            .iter()
            .map(|adv| adv.address.as_str())
            .collect();
        if !known.contains(address) {
            return Err(Error::Connection(format!("unknown peer: {address}")));
        }

        self.device.disconnected.store(false, Ordering::SeqCst);
        Ok(MockConnection {
            device: self.device.clone(),
        })
    }
}

/// Connection handle to the simulated controller.
pub struct MockConnection {
    device: Arc<MockDevice>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        if self.device.disconnected.load(Ordering::SeqCst) {
            return Err(Error::Connection("not connected".into()));
        }
        let pending = self.device.pending_failure.lock().take();
        if let Some(failure) = pending {
            match failure {
                WriteFailure::LinkDown => {
                    return Err(Error::Connection("link down".into()));
                }
                WriteFailure::Ambiguous => {
                    return Err(Error::BtlePlugError(btleplug::Error::Other(
                        "injected ambiguous failure".to_string().into(),
                    )));
                }
                WriteFailure::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    return Err(Error::Connection("hang elapsed".into()));
                }
            }
        }

        let write_id = self.device.next_write_id.fetch_add(1, Ordering::SeqCst);
        let mid = payload.len() / 2;

        // Two fragments with a scheduling point between them: a second
        // writer running concurrently would land its fragments in the gap.
        self.device.write_log.lock().push(WriteFragment {
            write_id,
            characteristic,
            bytes: payload[..mid].to_vec(),
        });
        tokio::task::yield_now().await;
        self.device.write_log.lock().push(WriteFragment {
            write_id,
            characteristic,
            bytes: payload[mid..].to_vec(),
        });

        self.device.frames.lock().push(payload.to_vec());
        self.device.apply_frame(payload).await;
        Ok(())
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(8);
        *self.device.notify_tx.lock() = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        self.device.disconnected.store(true, Ordering::SeqCst);
        *self.device.notify_tx.lock() = None;
        Ok(())
    }
}
