pub mod decode;
pub mod packet;

pub use decode::{decode, LinkKind};
pub use packet::{LayerType, Metadata, NetworkLayer, Packet, TransportLayer};

use crate::{ExporterError, Result};
use pcap::{Active, Capture, Device};
use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Wildcard device name that captures on every interface.
pub const ANY_DEVICE: &str = "any";

/// Read timeout of the live handle, bounds how long a stop request waits on a quiet link.
pub const READ_TIMEOUT_MS: i32 = 100;

/// Source of decoded packets consumed by the ingestion loop.
pub trait PacketSource: Send + 'static {
    /// Returns `Ok(None)` when no packet arrived within the read timeout.
    /// `Err(ExporterError::CaptureExhausted)` means the source will never yield again.
    fn next_packet(&mut self) -> Result<Option<Packet>>;
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub device: String,
    pub snaplen: i32,
    pub promiscuous: bool,
    pub filter: String,
}

/// Live capture handle. Dropping it closes the underlying pcap handle.
pub struct PcapSource {
    capture: Capture<Active>,
    link: LinkKind,
}

impl PacketSource for PcapSource {
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        match self.capture.next_packet() {
            Ok(raw) => {
                let metadata = Metadata {
                    capture_length: raw.header.caplen as usize,
                    length: raw.header.len as usize,
                    timestamp: timestamp(raw.header.ts.tv_sec, raw.header.ts.tv_usec),
                };
                Ok(Some(decode(self.link, raw.data, metadata)))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(pcap::Error::NoMorePackets) => Err(ExporterError::CaptureExhausted),
            Err(e) => Err(ExporterError::Capture(e)),
        }
    }
}

fn timestamp<S, U>(secs: S, micros: U) -> SystemTime
where
    u64: TryFrom<S>,
    u32: TryFrom<U>,
{
    let secs = u64::try_from(secs).unwrap_or(0);
    let micros = u32::try_from(micros).unwrap_or(0);
    UNIX_EPOCH + Duration::new(secs, micros.saturating_mul(1000))
}

/// Opens a live capture and installs the filter expression.
///
/// Both failures are fatal to startup and are not retried.
pub fn open_live(options: &CaptureOptions) -> Result<PcapSource> {
    info!("Opening capture on interface: {}", options.device);

    let open_err = |source| ExporterError::CaptureOpen {
        device: options.device.clone(),
        source,
    };

    let mut capture = Capture::from_device(options.device.as_str())
        .map_err(open_err)?
        .snaplen(options.snaplen)
        .promisc(options.promiscuous)
        .timeout(READ_TIMEOUT_MS)
        .open()
        .map_err(open_err)?;

    capture
        .filter(&options.filter, true)
        .map_err(|source| ExporterError::InvalidFilter {
            filter: options.filter.clone(),
            source,
        })?;

    let datalink = capture.get_datalink();
    let link = LinkKind::from_datalink(datalink.0);
    debug!("Capture datalink {} decoded as {:?}", datalink.0, link);

    Ok(PcapSource { capture, link })
}

#[derive(Debug, Clone)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    pub netmask: Option<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub description: Option<String>,
    pub addresses: Vec<InterfaceAddress>,
}

impl std::fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(
            f,
            "Description: {}",
            self.description.as_deref().unwrap_or_default()
        )?;
        writeln!(f, "Addresses:")?;
        for address in &self.addresses {
            writeln!(f, " - IP address: {}", address.ip)?;
            match address.netmask {
                Some(mask) => writeln!(f, "   Subnet mask: {}", mask)?,
                None => writeln!(f, "   Subnet mask: -")?,
            }
        }
        Ok(())
    }
}

pub fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    let devices = Device::list()?;

    Ok(devices
        .into_iter()
        .map(|device| InterfaceInfo {
            name: device.name,
            description: device.desc,
            addresses: device
                .addresses
                .into_iter()
                .map(|address| InterfaceAddress {
                    ip: address.addr,
                    netmask: address.netmask,
                })
                .collect(),
        })
        .collect())
}
