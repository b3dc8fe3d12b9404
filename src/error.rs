use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Unable to open pcap live capture on {device}: {source}")]
    CaptureOpen {
        device: String,
        #[source]
        source: pcap::Error,
    },

    #[error("Unable to set BPF filter '{filter}' for the pcap capture: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("Pcap error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("Packet source has no more packets")]
    CaptureExhausted,

    #[error(
        "ip address lookup has failed before and is in miss cache, not trying to lookup again: {ip}"
    )]
    PreviouslyFailed { ip: String },

    #[error("Reverse lookup of {ip} failed: {source}")]
    LookupFailed {
        ip: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not an ip address: {0}")]
    InvalidAddress(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Unable to bind exporter to {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
