//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to talk to the BlueZ daemon via D-Bus.
//! It requires the `bluetoothd` daemon to be running.

use super::{EVENT_CHANNEL_BUFFER_SIZE, ScanError};
use crate::address::DeviceAddress;
use crate::event::{ScanEvent, VendorPayloads};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start LE discovery on the default adapter.
///
/// BlueZ reports a device again whenever its advertised properties change,
/// so repeated advertisements from the same device produce repeated events.
pub async fn start_scan() -> Result<mpsc::Receiver<ScanEvent>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    // Keep every advertisement, not just the first per device.
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let mut events = Box::pin(adapter.discover_devices_with_changes().await?);
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        // Discovery stops when the session is dropped.
        let _session = session;

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            match scan_event(&adapter, address).await {
                Ok(Some(scan_event)) => {
                    if tx.send(scan_event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => log::debug!("skipping {address}: no signal strength cached"),
                Err(e) => log::debug!("skipping {address}: {e}"),
            }
        }
        log::info!("bluer discovery stream ended");
    });

    Ok(rx)
}

/// Read the cached advertisement properties of a device into a `ScanEvent`.
///
/// Returns `None` when BlueZ has no signal strength for the device, which
/// happens for devices known from earlier sessions that are not advertising.
async fn scan_event(adapter: &Adapter, address: Address) -> Result<Option<ScanEvent>, ScanError> {
    let device = adapter.device(address)?;

    let name = device.name().await?;
    let rssi = device.rssi().await?;
    let manufacturer_data = device.manufacturer_data().await?;

    Ok(event_from_properties(address, name, rssi, manufacturer_data))
}

fn event_from_properties(
    address: Address,
    name: Option<String>,
    rssi: Option<i16>,
    manufacturer_data: Option<HashMap<u16, Vec<u8>>>,
) -> Option<ScanEvent> {
    let rssi = rssi?;
    let vendor_payloads: VendorPayloads = manufacturer_data
        .map(|data| data.into_iter().collect())
        .unwrap_or_default();

    Some(ScanEvent {
        address: DeviceAddress::from(address),
        name,
        rssi,
        vendor_payloads,
    })
}
