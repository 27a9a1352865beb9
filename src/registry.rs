//! Append-only registry of devices that produced a valid reading.
//!
//! The registry keeps one [`DeviceRecord`] per address in first-seen order and
//! an optional selection on top of it. Records are never removed, so a
//! selection taken earlier stays valid however much the registry grows.
//!
//! # Concurrency
//!
//! There is no internal locking. `observe` takes `&mut self`, so writers must
//! be serialised by the caller, typically by draining a single channel in one
//! task as [`crate::app::run_with_io`] does. Integrators that read from other
//! threads while a scan is running need their own consistent-read mechanism,
//! e.g. an `RwLock<DeviceRegistry>` or cloning the snapshot.

use crate::address::DeviceAddress;
use crate::decoder::DecodedReading;
use std::collections::HashMap;

/// Display name used for devices that did not advertise one.
pub const UNKNOWN_NAME: &str = "Unknown";

/// What happens when a reading arrives for an address already in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservePolicy {
    /// Keep the first reading and drop later ones.
    #[default]
    FirstWins,
    /// Overwrite the stored fields with the latest reading, keeping its position.
    LatestWins,
}

/// One listed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub name: String,
    pub address: DeviceAddress,
    pub rssi: i16,
    pub temperature: u16,
    pub humidity: u16,
}

impl From<DecodedReading> for DeviceRecord {
    fn from(reading: DecodedReading) -> Self {
        Self {
            name: reading.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            address: reading.address,
            rssi: reading.rssi,
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    records: Vec<DeviceRecord>,
    /// Position of each address in `records`
    index: HashMap<DeviceAddress, usize>,
    selected: Option<usize>,
    policy: ObservePolicy,
}

impl DeviceRegistry {
    /// An empty registry using the first-wins policy.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ObservePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ObservePolicy {
        self.policy
    }

    /// Fold a reading into the registry.
    ///
    /// Returns `true` if a new record was appended and `false` if the address
    /// was already known. Under [`ObservePolicy::FirstWins`] the `false` case
    /// leaves the registry untouched.
    pub fn observe(&mut self, reading: DecodedReading) -> bool {
        match self.index.get(&reading.address) {
            Some(&position) => {
                if self.policy == ObservePolicy::LatestWins {
                    self.records[position] = reading.into();
                }
                false
            }
            None => {
                self.index.insert(reading.address, self.records.len());
                self.records.push(reading.into());
                true
            }
        }
    }

    /// All records in the order their addresses were first observed.
    pub fn snapshot(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<&DeviceRecord> {
        self.index.get(address).map(|&position| &self.records[position])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Select the record for `address`.
    ///
    /// An unknown address returns `None` and keeps the current selection.
    pub fn select(&mut self, address: &DeviceAddress) -> Option<&DeviceRecord> {
        let position = *self.index.get(address)?;
        self.selected = Some(position);
        Some(&self.records[position])
    }

    pub fn selected(&self) -> Option<&DeviceRecord> {
        self.selected.map(|position| &self.records[position])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_ADDRESS, reading};

    fn address(last: u8) -> DeviceAddress {
        DeviceAddress([0x10, 0x20, 0x30, 0x40, 0x50, last])
    }

    #[test]
    fn test_observe_inserts_new_address() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.observe(reading(TEST_ADDRESS, 25, 50)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].address, TEST_ADDRESS);
    }

    #[test]
    fn test_observe_same_address_twice_keeps_one_record() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.observe(reading(TEST_ADDRESS, 25, 50)));
        assert!(!registry.observe(reading(TEST_ADDRESS, 25, 50)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_wins_drops_later_values() {
        let mut registry = DeviceRegistry::new();
        registry.observe(reading(TEST_ADDRESS, 25, 50));
        let mut later = reading(TEST_ADDRESS, 99, 98);
        later.name = Some("Renamed".into());
        later.rssi = -30;
        assert!(!registry.observe(later));

        let record = registry.get(&TEST_ADDRESS).unwrap();
        assert_eq!(record.temperature, 25);
        assert_eq!(record.humidity, 50);
        assert_eq!(record.rssi, -60);
        assert_eq!(record.name, UNKNOWN_NAME);
    }

    #[test]
    fn test_latest_wins_updates_in_place() {
        let mut registry = DeviceRegistry::with_policy(ObservePolicy::LatestWins);
        assert_eq!(registry.policy(), ObservePolicy::LatestWins);
        registry.observe(reading(address(1), 10, 10));
        registry.observe(reading(address(2), 20, 20));
        assert!(!registry.observe(reading(address(1), 11, 12)));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].address, address(1));
        assert_eq!((snapshot[0].temperature, snapshot[0].humidity), (11, 12));
    }

    #[test]
    fn test_snapshot_preserves_arrival_order() {
        let mut registry = DeviceRegistry::new();
        // Field values deliberately out of order; nothing should sort on them.
        let inputs = [(9, 500, -20), (3, 100, -90), (7, 300, -50), (1, 200, -70)];
        for (last, temperature, rssi) in inputs {
            let mut r = reading(address(last), temperature, 0);
            r.rssi = rssi;
            assert!(registry.observe(r));
        }

        let order: Vec<u8> = registry.snapshot().iter().map(|r| r.address.0[5]).collect();
        assert_eq!(order, vec![9, 3, 7, 1]);
    }

    #[test]
    fn test_missing_name_falls_back_to_unknown() {
        let mut registry = DeviceRegistry::new();
        registry.observe(reading(TEST_ADDRESS, 1, 2));
        assert_eq!(registry.snapshot()[0].name, "Unknown");

        let mut named = reading(address(2), 1, 2);
        named.name = Some("Cellar".into());
        registry.observe(named);
        assert_eq!(registry.snapshot()[1].name, "Cellar");
    }

    #[test]
    fn test_select_known_address() {
        let mut registry = DeviceRegistry::new();
        registry.observe(reading(address(1), 1, 1));
        registry.observe(reading(address(2), 2, 2));

        let selected = registry.select(&address(2)).unwrap();
        assert_eq!(selected.temperature, 2);
        assert_eq!(registry.selected().unwrap().address, address(2));
    }

    #[test]
    fn test_select_unknown_address_keeps_previous_selection() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.select(&TEST_ADDRESS).is_none());
        assert!(registry.selected().is_none());
        assert!(registry.is_empty());

        registry.observe(reading(address(1), 1, 1));
        registry.select(&address(1));
        assert!(registry.select(&address(9)).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.selected().unwrap().address, address(1));
    }

    #[test]
    fn test_selection_survives_growth() {
        let mut registry = DeviceRegistry::new();
        registry.observe(reading(address(0), 0, 0));
        registry.select(&address(0));
        for last in 1..=200 {
            registry.observe(reading(address(last), u16::from(last), 0));
        }
        assert_eq!(registry.len(), 201);
        assert_eq!(registry.selected().unwrap().address, address(0));
    }
}
