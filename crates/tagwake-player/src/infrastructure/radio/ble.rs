//! Bluetooth LE central backed by `btleplug`.
//!
//! The first adapter reported by the platform manager is used.  Central events
//! are pumped into [`RadioEvent`]s by a background task; peer operations are
//! spawned so that each completion arrives on the event channel like any
//! other radio callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures_util::StreamExt;
use tagwake_core::{AttributeId, AttributePath, PeerAddress, ReadOutcome};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{RadioAdapter, RadioError, RadioEvent};

#[derive(Default)]
struct PeerTable {
    by_address: HashMap<PeerAddress, Peripheral>,
    by_id: HashMap<PeripheralId, PeerAddress>,
}

/// [`RadioAdapter`] over the host's Bluetooth LE adapter.
pub struct BleRadio {
    central: Adapter,
    events: mpsc::Sender<RadioEvent>,
    peers: Arc<Mutex<PeerTable>>,
}

impl BleRadio {
    /// Opens the first Bluetooth adapter and starts the event pump.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::Unavailable`] when no adapter is present or the
    /// platform stack refuses access.
    pub async fn open(events: mpsc::Sender<RadioEvent>) -> Result<Self, RadioError> {
        let manager = Manager::new()
            .await
            .map_err(|e| RadioError::Unavailable(e.to_string()))?;
        let central = manager
            .adapters()
            .await
            .map_err(|e| RadioError::Unavailable(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| RadioError::Unavailable("no bluetooth adapter found".to_string()))?;

        if let Ok(description) = central.adapter_info().await {
            info!(adapter = %description, "bluetooth adapter opened");
        }

        let radio = Self {
            central,
            events,
            peers: Arc::new(Mutex::new(PeerTable::default())),
        };
        radio.spawn_event_pump().await?;
        Ok(radio)
    }

    async fn spawn_event_pump(&self) -> Result<(), RadioError> {
        let mut stream = self
            .central
            .events()
            .await
            .map_err(|e| RadioError::Unavailable(e.to_string()))?;
        let central = self.central.clone();
        let events = self.events.clone();
        let peers = Arc::clone(&self.peers);

        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let translated = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let Ok(peripheral) = central.peripheral(&id).await else {
                            continue;
                        };
                        let name = peripheral
                            .properties()
                            .await
                            .ok()
                            .flatten()
                            .and_then(|p| p.local_name);
                        let address = PeerAddress::new(peripheral.address().to_string());
                        {
                            let mut table = peers.lock().expect("lock poisoned");
                            table.by_id.insert(id, address.clone());
                            table.by_address.insert(address.clone(), peripheral);
                        }
                        RadioEvent::Advertisement {
                            peer: address,
                            name,
                        }
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        let address = peers.lock().expect("lock poisoned").by_id.get(&id).cloned();
                        match address {
                            Some(peer) => RadioEvent::Disconnected { peer },
                            None => continue,
                        }
                    }
                    _ => continue,
                };
                if events.send(translated).await.is_err() {
                    break;
                }
            }
            debug!("bluetooth event pump finished");
        });
        Ok(())
    }

    fn peripheral(&self, address: &PeerAddress) -> Result<Peripheral, RadioError> {
        self.peers
            .lock()
            .expect("lock poisoned")
            .by_address
            .get(address)
            .cloned()
            .ok_or_else(|| RadioError::UnknownPeer(address.clone()))
    }
}

#[async_trait]
impl RadioAdapter for BleRadio {
    async fn start_scan(&self) -> Result<(), RadioError> {
        self.central
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| RadioError::Unavailable(e.to_string()))
    }

    async fn stop_scan(&self) {
        if let Err(e) = self.central.stop_scan().await {
            warn!(error = %e, "failed to stop bluetooth scan");
        }
    }

    fn connect(&self, address: &PeerAddress) -> Result<(), RadioError> {
        let peripheral = self.peripheral(address)?;
        let events = self.events.clone();
        let peer = address.clone();
        tokio::spawn(async move {
            let event = match peripheral.connect().await {
                Ok(()) => RadioEvent::Connected { peer },
                Err(e) => RadioEvent::ConnectFailed {
                    peer,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event).await;
        });
        Ok(())
    }

    fn discover_attributes(&self, address: &PeerAddress) -> Result<(), RadioError> {
        let peripheral = self.peripheral(address)?;
        let events = self.events.clone();
        let peer = address.clone();
        tokio::spawn(async move {
            let result = match peripheral.discover_services().await {
                Ok(()) => Ok(peripheral
                    .characteristics()
                    .iter()
                    .map(|c| {
                        AttributePath::new(AttributeId::new(c.service_uuid), AttributeId::new(c.uuid))
                    })
                    .collect()),
                Err(e) => Err(e.to_string()),
            };
            let _ = events
                .send(RadioEvent::AttributesDiscovered { peer, result })
                .await;
        });
        Ok(())
    }

    fn read_attribute(&self, address: &PeerAddress, attribute: AttributePath) -> Result<(), RadioError> {
        let peripheral = self.peripheral(address)?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                AttributeId::new(c.service_uuid) == attribute.service
                    && AttributeId::new(c.uuid) == attribute.attribute
            })
            .ok_or_else(|| RadioError::Operation(format!("{attribute} not declared by {address}")))?;

        let events = self.events.clone();
        let peer = address.clone();
        tokio::spawn(async move {
            let outcome = match peripheral.read(&characteristic).await {
                Ok(bytes) => ReadOutcome::Success(bytes),
                Err(e) => ReadOutcome::Failure(e.to_string()),
            };
            let _ = events
                .send(RadioEvent::ReadCompleted {
                    peer,
                    attribute,
                    outcome,
                })
                .await;
        });
        Ok(())
    }

    fn disconnect(&self, address: &PeerAddress) {
        let Ok(peripheral) = self.peripheral(address) else {
            return;
        };
        let peer = address.clone();
        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                debug!(peer = %peer, error = %e, "bluetooth disconnect failed");
            }
        });
    }
}
