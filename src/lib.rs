/*!
 # Triones Bluetooth LED Controller Library

 A Rust library for controlling Triones RGBW Bluetooth LED controllers.
 Implements the fixed Triones byte protocol: typed command encoding, status
 frame decoding, and a per-device session with serialized command dispatch.

 ## Features

 * Power on/off control
 * RGB and white channel control
 * 20 built-in effect modes with speed control
 * Status queries (power, color, mode, speed)
 * Discovery by name or address
 * Pluggable transport, with a deterministic mock for tests

 ## Example

 ```no_run
 use std::time::Duration;
 use triones_led_controller::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     // Find and connect to a controller
     let session = connect_by_address("aa:bb:cc:dd:ee:ff", Duration::from_secs(10)).await?;

     // Basic operations
     session.power_on().await?;
     session.set_rgb(255, 0, 0).await?; // Set to red
     let status = session.query_status().await?;
     println!("controller now shows {}", status.rgb_hex());

     session.disconnect().await?;
     Ok(())
 }
 ```
*/

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Custom error types for the Triones controller library
#[derive(Error, Debug)]
pub enum Error {
    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// Discovery found no matching peer within the deadline
    #[error("No matching controller found within {0:?}")]
    NotFound(Duration),

    /// Caller-supplied value out of its declared domain
    #[error(transparent)]
    Validation(#[from] protocol::ValidationError),

    /// A received frame failed structural expectations
    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    /// Transport reported a link failure during connect/write/read
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failed to find a required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// An operation did not complete within the caller's deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation is not permitted in the session's current state
    #[error("Operation not permitted while session is {0:?}")]
    InvalidState(session::SessionState),

    /// Error from btleplug
    #[error(transparent)]
    BtlePlugError(#[from] btleplug::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod ble;
pub mod mock;
pub mod mode;
pub mod protocol;
pub mod scanner;
pub mod session;
pub mod transport;

// Re-export key types
pub use ble::BleTransport;
pub use mode::Mode;
pub use protocol::{Color, Command, ProtocolError, Status, ValidationError};
pub use scanner::{DeviceIdentity, NameFilter, Scanner};
pub use session::{LedSession, SessionConfig, SessionState};
pub use transport::{Advertisement, Connection, Transport};

/// Default advertised-name prefix of Triones controllers.
pub const TRIONES_NAME_PREFIX: &str = "Triones";

/// Discovers all Triones controllers reachable within `timeout`, returning
/// unconnected sessions in first-seen order.
pub async fn discover(timeout: Duration) -> Result<Vec<LedSession<BleTransport>>> {
    let transport = Arc::new(BleTransport::new().await?);
    Scanner::new(transport)
        .discover(timeout, NameFilter::prefix(TRIONES_NAME_PREFIX))
        .await
}

/// Finds a controller by its advertised name and connects to it.
pub async fn connect_by_name(name: &str, timeout: Duration) -> Result<LedSession<BleTransport>> {
    let transport = Arc::new(BleTransport::new().await?);
    let session = Scanner::new(transport).find_by_name(name, timeout).await?;
    session.connect().await?;
    Ok(session)
}

/// Finds a controller by address and connects to it.
pub async fn connect_by_address(
    address: &str,
    timeout: Duration,
) -> Result<LedSession<BleTransport>> {
    let transport = Arc::new(BleTransport::new().await?);
    let session = Scanner::new(transport)
        .find_by_address(address, timeout)
        .await?;
    session.connect().await?;
    Ok(session)
}
