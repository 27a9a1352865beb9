//! Plain-text device list.

use crate::output::OutputFormatter;
use crate::registry::DeviceRecord;

/// One line per device, plus a short block for the selected one.
///
/// Readings are printed as raw sensor counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn format(&self, r: &DeviceRecord) -> String {
        format!(
            "{}  {}  rssi={} dBm  temperature={}  humidity={}",
            r.address, r.name, r.rssi, r.temperature, r.humidity
        )
    }

    fn format_selected(&self, r: &DeviceRecord) -> String {
        format!(
            "Selected: {}\n  Name: {}\n  Temperature: {}\n  Humidity: {}",
            r.address, r.name, r.temperature, r.humidity
        )
    }
}
