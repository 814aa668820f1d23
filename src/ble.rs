/*!
 # btleplug-backed transport

 The production [`Transport`] implementation over a system Bluetooth
 adapter. Discovery polls the adapter's peripheral list for the duration of
 the scan window; connections resolve a peripheral by address, establish the
 link, and expose the Triones write/notify characteristics.
*/

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, error, instrument, trace, warn};
use uuid::Uuid;

use crate::transport::{Advertisement, Connection, Transport, SERVICE_UUID};
use crate::{Error, Result};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let mut adapters = manager.adapters().await?;
    if adapters.is_empty() {
        error!("No Bluetooth adapters found");
        return Err(Error::NoBluetoothAdapters);
    }
    Ok(adapters.remove(0))
}

/// [`Transport`] over the first system Bluetooth adapter.
pub struct BleTransport {
    adapter: Adapter,
}

impl BleTransport {
    /// Opens the default adapter.
    #[instrument]
    pub async fn new() -> Result<BleTransport> {
        let manager = Manager::new().await?;
        let adapter = get_central(&manager).await?;
        Ok(BleTransport { adapter })
    }
}

fn peripheral_matches(peripheral: &Peripheral, address: &str) -> bool {
    peripheral.address().to_string().eq_ignore_ascii_case(address)
        || peripheral.id().to_string().eq_ignore_ascii_case(address)
}

#[async_trait]
impl Transport for BleTransport {
    type Connection = BleConnection;

    async fn scan(&self, timeout: Duration) -> Result<mpsc::Receiver<Advertisement>> {
        debug!("Starting BLE scan for {timeout:?}");
        self.adapter.start_scan(ScanFilter::default()).await?;

        let (tx, rx) = mpsc::channel(32);
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                let peripherals = match adapter.peripherals().await {
                    Ok(peripherals) => peripherals,
                    Err(e) => {
                        warn!("Scan poll failed: {e}");
                        break;
                    }
                };
                trace!("Scan poll saw {} peripherals", peripherals.len());

                for peripheral in peripherals {
                    if let Ok(Some(props)) = peripheral.properties().await {
                        let manufacturer_data = props
                            .manufacturer_data
                            .values()
                            .next()
                            .cloned()
                            .unwrap_or_default();
                        let advertisement = Advertisement {
                            name: props.local_name,
                            address: peripheral.address().to_string(),
                            manufacturer_data,
                        };
                        if tx.send(advertisement).await.is_err() {
                            // Receiver dropped; the caller is done scanning
                            let _ = adapter.stop_scan().await;
                            return;
                        }
                    }
                }
                time::sleep(SCAN_POLL_INTERVAL).await;
            }
            let _ = adapter.stop_scan().await;
        });

        Ok(rx)
    }

    #[instrument(skip(self))]
    async fn connect(&self, address: &str, timeout: Duration) -> Result<BleConnection> {
        debug!("Resolving peripheral {address}");
        self.adapter.start_scan(ScanFilter::default()).await?;

        let deadline = Instant::now() + timeout;
        let peripheral = 'search: loop {
            for peripheral in self.adapter.peripherals().await? {
                if peripheral_matches(&peripheral, address) {
                    break 'search peripheral;
                }
            }
            if Instant::now() >= deadline {
                let _ = self.adapter.stop_scan().await;
                warn!("Peripheral {address} not seen within {timeout:?}");
                return Err(Error::NotFound(timeout));
            }
            time::sleep(SCAN_POLL_INTERVAL).await;
        };
        let _ = self.adapter.stop_scan().await;

        debug!("Connecting to peripheral");
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }

        debug!("Discovering services");
        peripheral.discover_services().await?;
        if !peripheral
            .services()
            .iter()
            .any(|service| service.uuid == SERVICE_UUID)
        {
            warn!("Peripheral does not expose the Triones service {SERVICE_UUID}");
        }

        Ok(BleConnection { peripheral })
    }
}

/// Connection handle over one btleplug peripheral.
pub struct BleConnection {
    peripheral: Peripheral,
}

impl BleConnection {
    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::CharacteristicNotFound(uuid.to_string()))
    }
}

/// Maps btleplug failures so that a clean link loss is distinguishable from
/// ambiguous errors.
fn map_link_error(e: btleplug::Error) -> Error {
    match e {
        btleplug::Error::NotConnected => Error::Connection("peer not connected".into()),
        btleplug::Error::DeviceNotFound => Error::Connection("peer no longer present".into()),
        other => Error::BtlePlugError(other),
    }
}

#[async_trait]
impl Connection for BleConnection {
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let characteristic = self.find_characteristic(characteristic)?;

        // Prefer WriteWithResponse when the characteristic supports it
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        trace!("Writing {} bytes to {}", payload.len(), characteristic.uuid);
        self.peripheral
            .write(&characteristic, payload, write_type)
            .await
            .map_err(map_link_error)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>> {
        let target = self.find_characteristic(characteristic)?;
        self.peripheral
            .subscribe(&target)
            .await
            .map_err(map_link_error)?;

        let mut notifications = self.peripheral.notifications().await?;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(event) = notifications.next().await {
                if event.uuid != characteristic {
                    continue;
                }
                trace!("Notification on {}: {} bytes", event.uuid, event.value.len());
                if tx.send(event.value).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}
