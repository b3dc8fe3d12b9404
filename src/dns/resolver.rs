use std::io;
use std::net::IpAddr;

/// Reverse (PTR) lookup backend behind [`crate::dns::DnsCache`].
pub trait ReverseResolver: Send + Sync {
    /// Returns the first name the address resolves to.
    fn reverse(&self, ip: IpAddr) -> io::Result<String>;
}

/// Resolver using the system's `getnameinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl ReverseResolver for SystemResolver {
    fn reverse(&self, ip: IpAddr) -> io::Result<String> {
        let name = dns_lookup::lookup_addr(&ip)?;
        // getnameinfo falls back to the numeric form when there is no PTR record
        if name == ip.to_string() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no PTR record for {}", ip),
            ));
        }
        Ok(name)
    }
}
