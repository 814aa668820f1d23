/*!
 # Transport interface

 The narrow capability set the core consumes from a wireless transport:
 scan for advertising peers, connect to one by address, write command bytes
 to a characteristic, subscribe to a notification characteristic, and
 disconnect. The production implementation lives in [`crate::ble`]; a
 deterministic in-memory implementation for tests lives in [`crate::mock`].
*/

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::{uuid, Uuid};

use crate::Result;

/// GATT service exposed by Triones controllers.
pub const SERVICE_UUID: Uuid = uuid!("0000ffd5-0000-1000-8000-00805f9b34fb");
/// Characteristic used for writing command frames.
pub const WRITE_CHARACTERISTIC: Uuid = uuid!("0000ffd9-0000-1000-8000-00805f9b34fb");
/// Characteristic that carries status notifications.
pub const NOTIFY_CHARACTERISTIC: Uuid = uuid!("0000ffda-0000-1000-8000-00805f9b34fb");
/// Fallback notification characteristic used by some firmware revisions.
pub const NOTIFY_CHARACTERISTIC_ALT: Uuid = uuid!("0000ffd4-0000-1000-8000-00805f9b34fb");

/// One discovery event: an advertising peer as seen by the transport.
///
/// The transport may report the same peer more than once; de-duplication is
/// the scanner's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Advertised local name, if the peer broadcasts one
    pub name: Option<String>,
    /// Transport-level address of the peer
    pub address: String,
    /// Raw manufacturer data bytes from the advertisement, if any
    pub manufacturer_data: Vec<u8>,
}

/// A wireless transport capable of discovery and connection establishment.
///
/// Implementations must be shareable across sessions; every method takes
/// `&self`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The per-peer connection handle this transport produces.
    type Connection: Connection;

    /// Starts a discovery pass and returns a channel of advertisement
    /// events. The channel closes once `timeout` has elapsed (or earlier if
    /// the transport stops scanning).
    async fn scan(&self, timeout: Duration) -> Result<mpsc::Receiver<Advertisement>>;

    /// Connects to the peer with the given address, failing once `timeout`
    /// has elapsed without an established link.
    async fn connect(&self, address: &str, timeout: Duration) -> Result<Self::Connection>;
}

/// An established link to one peer.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Writes one complete frame to the given characteristic.
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()>;

    /// Subscribes to notifications on the given characteristic, returning a
    /// channel of raw notification payloads.
    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Tears the link down. Must be safe to call more than once.
    async fn disconnect(&self) -> Result<()>;
}
