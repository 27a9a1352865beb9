//! `ble-receptor` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The decoding core lives in [`decoder`] and [`registry`];
//! [`app`] wires them to a scanner and an output stream.

pub mod address;
pub mod app;
pub mod decoder;
pub mod duration;
pub mod event;
pub mod output;
pub mod registry;
pub mod scanner;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use address::{DeviceAddress, ParseAddressError};
pub use decoder::{DEFAULT_VENDOR_ID, DecodedReading, RejectReason, decode};
pub use event::{ScanEvent, VendorPayloads};
pub use output::influxdb::InfluxDbFormatter;
pub use output::text::TextFormatter;
pub use output::{OutputFormat, OutputFormatter};
pub use registry::{DeviceRecord, DeviceRegistry, ObservePolicy};
pub use scanner::{Backend, ScanError};
