use crate::address::DeviceAddress;
use crate::decoder::{DEFAULT_VENDOR_ID, DecodedReading};
use crate::event::ScanEvent;

/// A stable address for unit tests.
pub const TEST_ADDRESS: DeviceAddress = DeviceAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Build a zero-filled payload of `len` bytes with the two sensor fields set.
///
/// `len` must be at least 22 so both fields fit.
pub fn payload(len: usize, temperature: u16, humidity: u16) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[18..20].copy_from_slice(&temperature.to_be_bytes());
    data[20..22].copy_from_slice(&humidity.to_be_bytes());
    data
}

/// An unnamed event carrying `data` under the default vendor id.
pub fn sensor_event(address: DeviceAddress, data: Vec<u8>) -> ScanEvent {
    ScanEvent::new(address, None, -60).with_payload(DEFAULT_VENDOR_ID, data)
}

/// A reading as the decoder would produce it, without a name.
pub fn reading(address: DeviceAddress, temperature: u16, humidity: u16) -> DecodedReading {
    DecodedReading {
        address,
        name: None,
        rssi: -60,
        temperature,
        humidity,
    }
}
