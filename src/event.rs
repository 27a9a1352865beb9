//! Raw advertisement events as delivered by a scanner backend.

use crate::address::DeviceAddress;
use std::collections::BTreeMap;

/// Vendor-tagged payloads of one advertisement, keyed by company identifier.
pub type VendorPayloads = BTreeMap<u16, Vec<u8>>;

/// One received advertisement.
///
/// Backends build these from whatever their platform hands them; nothing in
/// the event has been validated or decoded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// Address of the advertising device
    pub address: DeviceAddress,
    /// Local name, if the device advertised one
    pub name: Option<String>,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Manufacturer-specific data, possibly empty
    pub vendor_payloads: VendorPayloads,
}

impl ScanEvent {
    pub fn new(address: DeviceAddress, name: Option<String>, rssi: i16) -> Self {
        Self {
            address,
            name,
            rssi,
            vendor_payloads: VendorPayloads::new(),
        }
    }

    /// Attach a payload for `vendor_id`, replacing any earlier one.
    pub fn with_payload(mut self, vendor_id: u16, payload: impl Into<Vec<u8>>) -> Self {
        self.vendor_payloads.insert(vendor_id, payload.into());
        self
    }
}
