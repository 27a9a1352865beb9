//! Raw HCI socket backend.
//!
//! This backend uses raw Linux HCI sockets to receive LE advertising reports
//! without the BlueZ daemon. It requires CAP_NET_RAW and CAP_NET_ADMIN
//! capabilities or root privileges.

use super::{EVENT_CHANNEL_BUFFER_SIZE, ScanError};
use crate::address::DeviceAddress;
use crate::event::{ScanEvent, VendorPayloads};
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const HCI_FILTER: c_int = 2;

// HCI packet types
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan types
const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

// AD types
const AD_TYPE_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

// Event type, address type, address, data length
const REPORT_HEADER_LEN: usize = 9;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// LE Set Scan Parameters command
#[repr(C, packed)]
struct LeSetScanParametersCmd {
    scan_type: u8,
    interval: u16,
    window: u16,
    own_address_type: u8,
    filter_policy: u8,
}

/// LE Set Scan Enable command
#[repr(C, packed)]
struct LeSetScanEnableCmd {
    enable: u8,
    filter_dup: u8,
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(0x01); // HCI command packet type
    packet.push((opcode & 0xFF) as u8);
    packet.push((opcode >> 8) as u8);
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Open a raw HCI socket
fn open_hci_socket() -> Result<OwnedFd, ScanError> {
    // Create a raw Bluetooth HCI socket using libc directly
    // since nix doesn't support BTPROTO_HCI
    // SOCK_NONBLOCK is required for AsyncFd to work properly
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };

    if fd < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to create HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> Result<(), ScanError> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: 0, // HCI_CHANNEL_RAW
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to bind HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Set HCI socket filter
fn set_hci_filter(fd: &OwnedFd) -> Result<(), ScanError> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_LE_META_EVENT);

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            0, // SOL_HCI
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to set HCI filter: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Send an HCI command
fn send_hci_command(fd: &OwnedFd, packet: &[u8]) -> Result<(), ScanError> {
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to send HCI command: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Configure LE scanning parameters
fn configure_le_scan(fd: &OwnedFd) -> Result<(), ScanError> {
    // Set scan parameters: passive scan, 10ms interval, 10ms window
    let params = LeSetScanParametersCmd {
        scan_type: LE_SCAN_PASSIVE,
        interval: 0x0010, // 10ms in 0.625ms units
        window: 0x0010,   // 10ms in 0.625ms units
        own_address_type: LE_PUBLIC_ADDRESS,
        filter_policy: FILTER_POLICY_ACCEPT_ALL,
    };

    let params_bytes = unsafe {
        std::slice::from_raw_parts(
            &params as *const LeSetScanParametersCmd as *const u8,
            mem::size_of::<LeSetScanParametersCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, params_bytes);
    send_hci_command(fd, &packet)?;

    // Enable scanning
    let enable = LeSetScanEnableCmd {
        enable: 0x01,
        filter_dup: 0x00, // Don't filter duplicates
    };

    let enable_bytes = unsafe {
        std::slice::from_raw_parts(
            &enable as *const LeSetScanEnableCmd as *const u8,
            mem::size_of::<LeSetScanEnableCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, enable_bytes);
    send_hci_command(fd, &packet)?;

    Ok(())
}

/// Parse the AD structures of one advertisement.
///
/// Returns the advertised local name (complete preferred over shortened) and
/// every manufacturer-specific payload keyed by its company id. Parsing stops
/// at the first malformed structure; whatever was collected so far is kept.
fn parse_ad_structures(ad_data: &[u8]) -> (Option<String>, VendorPayloads) {
    let mut complete_name = None;
    let mut short_name = None;
    let mut payloads = VendorPayloads::new();

    let mut offset = 0;
    while offset + 2 <= ad_data.len() {
        let len = ad_data[offset] as usize;
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }

        let ad_type = ad_data[offset + 1];
        let value = &ad_data[offset + 2..offset + 1 + len];

        match ad_type {
            AD_TYPE_MANUFACTURER_DATA if value.len() >= 2 => {
                let company_id = u16::from_le_bytes([value[0], value[1]]);
                payloads.insert(company_id, value[2..].to_vec());
            }
            AD_TYPE_COMPLETE_LOCAL_NAME => {
                complete_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_SHORTENED_LOCAL_NAME => {
                short_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            _ => {}
        }

        offset += 1 + len;
    }

    (complete_name.or(short_name), payloads)
}

/// Parse the parameters of an LE Advertising Report event into scan events.
///
/// `params` starts at the report count, i.e. after the packet type, event
/// code, parameter length and sub-event bytes. Each report is laid out as
/// event type (1), address type (1), address (6, little-endian),
/// data length (1), data, RSSI (1, signed). Truncated reports are dropped.
fn parse_advertising_report(params: &[u8]) -> Vec<ScanEvent> {
    let Some((&num_reports, mut rest)) = params.split_first() else {
        return Vec::new();
    };

    let mut events = Vec::with_capacity(num_reports as usize);
    for _ in 0..num_reports {
        if rest.len() < REPORT_HEADER_LEN {
            log::debug!("advertising report truncated in header");
            break;
        }

        let mut addr = [0u8; 6];
        addr.copy_from_slice(&rest[2..8]);
        let data_len = rest[8] as usize;

        // Data plus the trailing RSSI byte
        if rest.len() < REPORT_HEADER_LEN + data_len + 1 {
            log::debug!("advertising report truncated in data");
            break;
        }

        let ad_data = &rest[REPORT_HEADER_LEN..REPORT_HEADER_LEN + data_len];
        let rssi = rest[REPORT_HEADER_LEN + data_len] as i8;
        let (name, vendor_payloads) = parse_ad_structures(ad_data);

        events.push(ScanEvent {
            address: DeviceAddress::from_le_bytes(addr),
            name,
            rssi: i16::from(rssi),
            vendor_payloads,
        });

        rest = &rest[REPORT_HEADER_LEN + data_len + 1..];
    }

    events
}

/// Start scanning using raw HCI sockets.
///
/// Opens a raw HCI socket on `hci0`, enables passive LE scanning and forwards
/// every advertising report as a [`ScanEvent`]. Runs until the socket fails
/// or the receiver is dropped.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan() -> Result<mpsc::Receiver<ScanEvent>, ScanError> {
    // Socket for receiving events
    let fd = open_hci_socket()?;
    bind_hci_socket(&fd, 0)?;
    set_hci_filter(&fd)?;

    // Separate socket for commands
    let cmd_fd = open_hci_socket()?;
    bind_hci_socket(&cmd_fd, 0)?;
    configure_le_scan(&cmd_fd)?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);

    let async_fd = AsyncFd::new(fd)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {e}")))?;

    tokio::spawn(async move {
        let _cmd_fd = cmd_fd; // Keep command socket alive
        let mut buf = [0u8; 258]; // Max HCI event size

        'read: loop {
            let mut guard = match async_fd.readable().await {
                Ok(guard) => guard,
                Err(e) => {
                    log::warn!("HCI socket poll failed: {e}");
                    break;
                }
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| {
                    let ret = unsafe {
                        libc::read(
                            inner.as_raw_fd(),
                            buf.as_mut_ptr() as *mut c_void,
                            buf.len(),
                        )
                    };
                    if ret < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(ret as usize)
                    }
                }) {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => break,
                    Ok(Err(e)) => {
                        log::warn!("HCI socket read failed: {e}");
                        break;
                    }
                    Err(_would_block) => break,
                };

                if n > 4
                    && buf[0] == HCI_EVENT_PKT
                    && buf[1] == EVT_LE_META_EVENT
                    && buf[3] == EVT_LE_ADVERTISING_REPORT
                {
                    for event in parse_advertising_report(&buf[4..n]) {
                        if tx.send(event).await.is_err() {
                            break 'read;
                        }
                    }
                }
            }
        }
        log::info!("HCI scan stopped");
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hci_filter_setup() {
        let mut filter = HciFilter::new();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        // Verify filter is set correctly
        // HCI_EVENT_PKT (0x04) sets bit 4 in type_mask
        assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
        // EVT_LE_META_EVENT (0x3E = 62) sets bit 30 in event_mask[1]
        assert_eq!(filter.event_mask[1], 1 << (EVT_LE_META_EVENT % 32));
    }

    #[test]
    fn test_hci_command_packet() {
        let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00]);

        assert_eq!(packet[0], 0x01); // Command packet type
        assert_eq!(packet.len(), 6); // Header + 2 params
    }

    fn report(addr_le: [u8; 6], ad_data: &[u8], rssi: i8) -> Vec<u8> {
        let mut r = vec![0x00, 0x00];
        r.extend_from_slice(&addr_le);
        r.push(ad_data.len() as u8);
        r.extend_from_slice(ad_data);
        r.push(rssi as u8);
        r
    }

    fn manufacturer_ad(company_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut ad = vec![(payload.len() + 3) as u8, AD_TYPE_MANUFACTURER_DATA];
        ad.extend_from_slice(&company_id.to_le_bytes());
        ad.extend_from_slice(payload);
        ad
    }

    #[test]
    fn test_parse_ad_structures_name_and_payloads() {
        let mut ad = vec![0x02, 0x01, 0x06]; // flags
        ad.extend_from_slice(&[0x04, AD_TYPE_SHORTENED_LOCAL_NAME, b'T', b'm', b'p']);
        ad.extend_from_slice(&[0x05, AD_TYPE_COMPLETE_LOCAL_NAME, b'T', b'e', b'm', b'p']);
        ad.extend(manufacturer_ad(0x004C, &[1, 2, 3]));
        ad.extend(manufacturer_ad(0x0499, &[4]));

        let (name, payloads) = parse_ad_structures(&ad);
        assert_eq!(name.as_deref(), Some("Temp"));
        assert_eq!(payloads.get(&0x004C), Some(&vec![1, 2, 3]));
        assert_eq!(payloads.get(&0x0499), Some(&vec![4]));
    }

    #[test]
    fn test_parse_ad_structures_stops_at_overrun() {
        let mut ad = manufacturer_ad(0x004C, &[9, 9]);
        ad.extend_from_slice(&[0x10, AD_TYPE_COMPLETE_LOCAL_NAME, b'x']);

        let (name, payloads) = parse_ad_structures(&ad);
        assert!(name.is_none());
        assert_eq!(payloads.len(), 1);
    }

    #[test]
    fn test_parse_advertising_report_single() {
        let ad = manufacturer_ad(0x004C, &[0xAB; 23]);
        let mut params = vec![1];
        params.extend(report([0x02, 0x1B, 0x6A, 0x8D, 0x7C, 0xC4], &ad, -75));

        let events = parse_advertising_report(&params);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.address.to_string(), "C4:7C:8D:6A:1B:02");
        assert_eq!(event.rssi, -75);
        assert!(event.name.is_none());
        assert_eq!(event.vendor_payloads[&0x004C].len(), 23);
    }

    #[test]
    fn test_parse_advertising_report_multiple() {
        let mut params = vec![2];
        params.extend(report([1, 0, 0, 0, 0, 0], &manufacturer_ad(0x004C, &[1]), -40));
        params.extend(report([2, 0, 0, 0, 0, 0], &[], -90));

        let events = parse_advertising_report(&params);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].address.0[5], 1);
        assert_eq!(events[1].address.0[5], 2);
        assert_eq!(events[1].rssi, -90);
        assert!(events[1].vendor_payloads.is_empty());
    }

    #[test]
    fn test_parse_advertising_report_truncated() {
        assert!(parse_advertising_report(&[]).is_empty());
        assert!(parse_advertising_report(&[1, 0x00, 0x00, 0x01]).is_empty());

        // Declared data length runs past the buffer
        let mut params = vec![1];
        let mut r = report([1, 0, 0, 0, 0, 0], &[0x02, 0x01, 0x06], -50);
        r.truncate(r.len() - 2);
        params.extend(r);
        assert!(parse_advertising_report(&params).is_empty());
    }
}
