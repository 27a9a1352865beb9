//! Output formatters for listed devices.
//!
//! The registry decides *when* something is printed; formatters only decide
//! how a single [`DeviceRecord`] looks.

pub mod influxdb;
pub mod text;

use crate::registry::DeviceRecord;

/// Trait for turning a device record into one line of output.
pub trait OutputFormatter: Send + Sync {
    /// Format a record for the device list.
    fn format(&self, record: &DeviceRecord) -> String;

    /// Format the detail view of the selected device.
    ///
    /// Defaults to the list format.
    fn format_selected(&self, record: &DeviceRecord) -> String {
        self.format(record)
    }
}

/// Output formats selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable device list
    #[default]
    Text,
    /// InfluxDB line protocol, suitable for Telegraf's execd input
    Influxdb,
}

impl OutputFormat {
    /// Build the formatter for this format.
    ///
    /// `measurement_name` is only used by the InfluxDB formatter.
    pub fn formatter(self, measurement_name: &str) -> Box<dyn OutputFormatter> {
        match self {
            OutputFormat::Text => Box::new(text::TextFormatter),
            OutputFormat::Influxdb => {
                Box::new(influxdb::InfluxDbFormatter::new(measurement_name.to_string()))
            }
        }
    }
}
