//! InfluxDB line protocol output formatter.

use crate::output::OutputFormatter;
use crate::registry::DeviceRecord;
use std::collections::BTreeMap;
use std::fmt;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Integer(num) => write!(f, "{num}i"),
        }
    }
}

/// Escape commas, spaces and equals signs in tag keys and values.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Data point in InfluxDB line protocol.
///
/// No timestamp is written; the consumer stamps lines on arrival.
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement.replace(',', "\\,").replace(' ', "\\ "))?;
        for (key, value) in &self.tag_set {
            write!(fmt, ",{}={}", escape_tag(key), escape_tag(value))?;
        }
        for (i, (key, value)) in self.field_set.iter().enumerate() {
            let separator = if i == 0 { ' ' } else { ',' };
            write!(fmt, "{separator}{}={value}", escape_tag(key))?;
        }
        Ok(())
    }
}

/// Formats device records as InfluxDB line protocol.
///
/// The address and name become tags; signal strength and the raw readings
/// become integer fields.
pub struct InfluxDbFormatter {
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    fn to_data_point(&self, record: &DeviceRecord) -> DataPoint {
        let tag_set = BTreeMap::from([
            ("address".to_string(), record.address.to_string()),
            ("name".to_string(), record.name.clone()),
        ]);
        let field_set = BTreeMap::from([
            ("rssi".to_string(), FieldValue::Integer(record.rssi.into())),
            (
                "temperature".to_string(),
                FieldValue::Integer(record.temperature.into()),
            ),
            (
                "humidity".to_string(),
                FieldValue::Integer(record.humidity.into()),
            ),
        ]);

        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set,
            field_set,
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, record: &DeviceRecord) -> String {
        self.to_data_point(record).to_string()
    }
}
