/*!
 # Device session

 Owns one controller's connection lifecycle and a serialized command
 pipeline. All wire traffic for a session flows through a single internal
 lock, so at most one command frame is ever in flight per controller;
 concurrent callers on the same session queue behind each other instead of
 interleaving frames on the write characteristic.
*/

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as StateCell;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::mode::Mode;
use crate::protocol::{kelvin_to_rgb, Color, Command, Status, ValidationError};
use crate::scanner::DeviceIdentity;
use crate::transport::{
    Connection, Transport, NOTIFY_CHARACTERISTIC, NOTIFY_CHARACTERISTIC_ALT, WRITE_CHARACTERISTIC,
};
use crate::{Error, Result};

/// Lowest color temperature accepted by [`LedSession::set_temperature`].
pub const MIN_TEMPERATURE_K: u32 = 1000;
/// Highest color temperature accepted by [`LedSession::set_temperature`].
pub const MAX_TEMPERATURE_K: u32 = 10000;

/// Connection lifecycle state of a session.
///
/// Transitions: `Disconnected → Connecting → Connected` on a successful
/// connect; any failure during connect returns to `Disconnected`. From
/// `Connected`, a cleanly reported link loss returns to `Disconnected`,
/// while an ambiguous failure mid-command moves to `Faulted`, from which
/// only [`LedSession::disconnect`] is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link; `connect` is permitted
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// Link established; commands and queries are permitted
    Connected,
    /// The link is in an unknown state; only `disconnect` is permitted
    Faulted,
}

/// Timeouts applied to the session's suspended operations.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for connection establishment
    pub connect_timeout: Duration,
    /// Deadline for a single command write
    pub command_timeout: Duration,
    /// Deadline for the status notification following a query
    pub status_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(2),
            status_timeout: Duration::from_secs(3),
        }
    }
}

/// Link state guarded by the session's command lock.
struct Link<C> {
    connection: Option<C>,
    notifications: Option<mpsc::Receiver<Vec<u8>>>,
}

/// One controller's connection lifecycle and serialized command pipeline.
///
/// Sessions are created unconnected by the [`crate::scanner::Scanner`] (or
/// directly from a known identity) and are independent of each other; all
/// methods take `&self`, so a session can be shared across tasks behind an
/// [`Arc`].
pub struct LedSession<T: Transport> {
    transport: Arc<T>,
    identity: DeviceIdentity,
    config: SessionConfig,
    state: StateCell<SessionState>,
    // Held across every wire exchange: the single-in-flight guarantee
    link: Mutex<Link<T::Connection>>,
}

impl<T: Transport> LedSession<T> {
    /// Creates an unconnected session with default timeouts.
    pub fn new(transport: Arc<T>, identity: DeviceIdentity) -> LedSession<T> {
        Self::with_config(transport, identity, SessionConfig::default())
    }

    /// Creates an unconnected session with caller-supplied timeouts.
    pub fn with_config(
        transport: Arc<T>,
        identity: DeviceIdentity,
        config: SessionConfig,
    ) -> LedSession<T> {
        LedSession {
            transport,
            identity,
            config,
            state: StateCell::new(SessionState::Disconnected),
            link: Mutex::new(Link {
                connection: None,
                notifications: None,
            }),
        }
    }

    /// The discovered identity of this controller.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Transport-level address of this controller.
    pub fn address(&self) -> &str {
        &self.identity.address
    }

    /// Advertised name of this controller, if it broadcast one.
    pub fn name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Connects to the controller. Permitted only while `Disconnected`.
    ///
    /// On timeout or transport failure the session returns to
    /// `Disconnected` and the error is surfaced; no retries are performed.
    #[instrument(skip(self), fields(address = %self.identity.address))]
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;

        {
            let mut state = self.state.lock();
            if *state != SessionState::Disconnected {
                return Err(Error::InvalidState(*state));
            }
            *state = SessionState::Connecting;
        }

        debug!("Connecting to controller");
        let timeout = self.config.connect_timeout;
        let connection = match time::timeout(
            timeout,
            self.transport.connect(&self.identity.address, timeout),
        )
        .await
        {
            Err(_) => {
                *self.state.lock() = SessionState::Disconnected;
                warn!("Connect attempt timed out after {:?}", timeout);
                return Err(Error::Timeout(timeout));
            }
            Ok(Err(e)) => {
                *self.state.lock() = SessionState::Disconnected;
                error!("Connect attempt failed: {e}");
                return Err(e);
            }
            Ok(Ok(connection)) => connection,
        };

        // Some firmware revisions notify on the alternate characteristic
        let notifications = match connection.subscribe(NOTIFY_CHARACTERISTIC).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                debug!("Primary notify characteristic unavailable ({e}), trying fallback");
                match connection.subscribe(NOTIFY_CHARACTERISTIC_ALT).await {
                    Ok(rx) => Some(rx),
                    Err(e) => {
                        warn!("No notification characteristic available ({e}); status queries will fail");
                        None
                    }
                }
            }
        };

        link.connection = Some(connection);
        link.notifications = notifications;
        *self.state.lock() = SessionState::Connected;
        info!("Connected to {}", self.identity);
        Ok(())
    }

    /// Disconnects from the controller.
    ///
    /// Permitted from any state, idempotent, and always leaves the session
    /// `Disconnected`. Transport errors during teardown are logged, not
    /// surfaced.
    #[instrument(skip(self), fields(address = %self.identity.address))]
    pub async fn disconnect(&self) -> Result<()> {
        let mut link = self.link.lock().await;

        if let Some(connection) = link.connection.take() {
            if let Err(e) = connection.disconnect().await {
                warn!("Error while disconnecting: {e}");
            } else {
                info!("Disconnected from {}", self.identity);
            }
        }
        link.notifications = None;
        *self.state.lock() = SessionState::Disconnected;
        Ok(())
    }

    /// Encodes and writes one typed command. Permitted only while
    /// `Connected`.
    ///
    /// Commands on one session are strictly serialized; a concurrent caller
    /// queues until the in-flight write completes. On a cleanly reported
    /// link failure the session drops to `Disconnected`; on an ambiguous
    /// failure or timeout it moves to `Faulted`.
    #[instrument(skip(self), fields(address = %self.identity.address))]
    pub async fn send_command(&self, command: Command) -> Result<()> {
        // Validation happens before any I/O and before taking the lock
        let frame = command.encode()?;

        let mut link = self.link.lock().await;
        self.ensure_connected()?;
        self.write_frame(&mut link, &frame).await
    }

    /// Queries the controller's status. Permitted only while `Connected`.
    ///
    /// Issues the status request and then awaits exactly one notification,
    /// decoded into a [`Status`]. Serialized with [`Self::send_command`];
    /// the request/response exchange never interleaves with another
    /// command's wire traffic.
    #[instrument(skip(self), fields(address = %self.identity.address))]
    pub async fn query_status(&self) -> Result<Status> {
        let frame = Command::QueryStatus.encode()?;

        let mut link = self.link.lock().await;
        self.ensure_connected()?;

        // Drain anything stale so the next notification pairs with this
        // request
        match link.notifications.as_mut() {
            Some(rx) => while rx.try_recv().is_ok() {},
            None => {
                return Err(Error::Connection(
                    "no notification channel available".into(),
                ))
            }
        }

        self.write_frame(&mut link, &frame).await?;

        let rx = link
            .notifications
            .as_mut()
            .ok_or_else(|| Error::Connection("no notification channel available".into()))?;
        let outcome = time::timeout(self.config.status_timeout, rx.recv()).await;
        match outcome {
            Err(_) => {
                // The controller's state is unknown mid-exchange
                self.fault();
                warn!(
                    "No status notification within {:?}",
                    self.config.status_timeout
                );
                Err(Error::Timeout(self.config.status_timeout))
            }
            Ok(None) => {
                self.drop_link(&mut link);
                Err(Error::Connection("notification channel closed".into()))
            }
            Ok(Some(payload)) => {
                trace!(payload = ?payload, "Received status notification");
                let status = Status::decode(&payload)?;
                debug!(?status, "Decoded controller status");
                Ok(status)
            }
        }
    }

    /// Turns the controller on.
    pub async fn power_on(&self) -> Result<()> {
        debug!("Turning controller on");
        self.send_command(Command::PowerOn).await
    }

    /// Turns the controller off.
    pub async fn power_off(&self) -> Result<()> {
        debug!("Turning controller off");
        self.send_command(Command::PowerOff).await
    }

    /// Sets a static RGB color.
    pub async fn set_rgb(&self, red: u8, green: u8, blue: u8) -> Result<()> {
        debug!("Setting color to RGB({red}, {green}, {blue})");
        self.send_command(Command::SetRgb { red, green, blue }).await
    }

    /// Switches to white-only output at the given intensity (0-255).
    pub async fn set_white(&self, intensity: u8) -> Result<()> {
        debug!("Setting white intensity to {intensity}");
        self.send_command(Command::SetWhite { intensity }).await
    }

    /// Starts a built-in effect at the given public speed (0-100,
    /// 100 = fastest).
    pub async fn set_built_in_mode(&self, mode: Mode, speed: u8) -> Result<()> {
        debug!("Setting mode {mode} at speed {speed}");
        self.send_command(Command::SetMode { mode, speed }).await
    }

    /// Sets a static color from a six-hex-digit string such as `"#ff0000"`.
    pub async fn set_color_hex(&self, hex: &str) -> Result<()> {
        let color = Color::from_hex(hex)?;
        self.set_rgb(color.red, color.green, color.blue).await
    }

    /// Approximates a black-body color temperature on the RGB channels.
    ///
    /// `kelvin` must be within 1000-10000 K and `brightness` within 0-100.
    pub async fn set_temperature(&self, kelvin: u32, brightness: u8) -> Result<()> {
        if !(MIN_TEMPERATURE_K..=MAX_TEMPERATURE_K).contains(&kelvin) {
            return Err(ValidationError::OutOfRange {
                what: "color temperature",
                value: kelvin,
                min: MIN_TEMPERATURE_K,
                max: MAX_TEMPERATURE_K,
            }
            .into());
        }
        if brightness > 100 {
            return Err(ValidationError::OutOfRange {
                what: "brightness",
                value: brightness as u32,
                min: 0,
                max: 100,
            }
            .into());
        }

        let (r, g, b) = kelvin_to_rgb(kelvin);
        let scale = |channel: u8| (channel as u16 * brightness as u16 / 100) as u8;
        debug!("Setting temperature {kelvin}K at {brightness}% brightness");
        self.set_rgb(scale(r), scale(g), scale(b)).await
    }

    fn ensure_connected(&self) -> Result<()> {
        let state = *self.state.lock();
        if state != SessionState::Connected {
            return Err(Error::InvalidState(state));
        }
        Ok(())
    }

    /// Writes one already-encoded frame while holding the command lock.
    async fn write_frame(&self, link: &mut Link<T::Connection>, frame: &[u8]) -> Result<()> {
        let connection = link
            .connection
            .as_ref()
            .ok_or(Error::InvalidState(SessionState::Disconnected))?;

        trace!(frame = ?frame, "Writing command frame");
        match time::timeout(
            self.config.command_timeout,
            connection.write(WRITE_CHARACTERISTIC, frame),
        )
        .await
        {
            Err(_) => {
                // The write may or may not have reached the controller
                self.fault();
                warn!(
                    "Command write timed out after {:?}",
                    self.config.command_timeout
                );
                Err(Error::Timeout(self.config.command_timeout))
            }
            Ok(Err(Error::Connection(msg))) => {
                warn!("Link down during write: {msg}");
                self.drop_link(link);
                Err(Error::Connection(msg))
            }
            Ok(Err(e)) => {
                error!("Write failed ambiguously: {e}");
                self.fault();
                Err(e)
            }
            Ok(Ok(())) => {
                trace!("Command frame written");
                Ok(())
            }
        }
    }

    fn fault(&self) {
        *self.state.lock() = SessionState::Faulted;
    }

    fn drop_link(&self, link: &mut Link<T::Connection>) {
        link.connection = None;
        link.notifications = None;
        *self.state.lock() = SessionState::Disconnected;
    }
}

impl<T: Transport> std::fmt::Debug for LedSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedSession")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}
