//! Advertisement decoding.
//!
//! Sensor readings travel in the manufacturer-specific data of an
//! advertisement, tagged with the vendor's 16-bit company identifier. The
//! payload is not self-describing; the layout is fixed:
//!
//! | Offset | Content                          |
//! |--------|----------------------------------|
//! | 0-17   | ignored                          |
//! | 18-19  | temperature, big-endian `u16`    |
//! | 20-21  | humidity, big-endian `u16`       |
//! | 22..   | ignored                          |
//!
//! Values are raw sensor counts. No scaling is applied here.

use crate::address::DeviceAddress;
use crate::event::ScanEvent;
use thiserror::Error;

/// Company identifier the decoder filters on unless configured otherwise.
pub const DEFAULT_VENDOR_ID: u16 = 0x004C;

/// Shortest payload accepted by [`decode`].
pub const MIN_PAYLOAD_LEN: usize = 23;

const TEMPERATURE_OFFSET: usize = 18;
const HUMIDITY_OFFSET: usize = 20;

/// Why an advertisement did not produce a reading.
///
/// Neither variant is fatal. `NoVendorPayload` is the normal outcome for the
/// bulk of nearby devices and should be skipped without logging.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("no payload for vendor id {0:#06x}")]
    NoVendorPayload(u16),
    #[error("payload too short: {len} bytes, need at least {min}", min = MIN_PAYLOAD_LEN)]
    PayloadTooShort { len: usize },
}

/// A successfully decoded advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReading {
    pub address: DeviceAddress,
    pub name: Option<String>,
    pub rssi: i16,
    /// Raw temperature counts
    pub temperature: u16,
    /// Raw humidity counts
    pub humidity: u16,
}

/// Decode the payload `event` carries for `vendor_id`.
///
/// Pure and deterministic; safe to call from any thread. Bytes past the
/// humidity field are ignored so longer payload revisions still decode.
pub fn decode(event: &ScanEvent, vendor_id: u16) -> Result<DecodedReading, RejectReason> {
    let payload = event
        .vendor_payloads
        .get(&vendor_id)
        .ok_or(RejectReason::NoVendorPayload(vendor_id))?;

    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(RejectReason::PayloadTooShort { len: payload.len() });
    }

    Ok(DecodedReading {
        address: event.address,
        name: event.name.clone(),
        rssi: event.rssi,
        temperature: read_be_u16(payload, TEMPERATURE_OFFSET),
        humidity: read_be_u16(payload, HUMIDITY_OFFSET),
    })
}

#[inline]
fn read_be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Parse a vendor id given as decimal (`76`) or hex (`0x004C`).
pub fn parse_vendor_id(src: &str) -> Result<u16, String> {
    let src = src.trim();
    let parsed = match src
        .strip_prefix("0x")
        .or_else(|| src.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => src.parse(),
    };
    parsed.map_err(|_| format!("invalid vendor id: {src}"))
}
