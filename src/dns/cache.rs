//! Reverse DNS cache shared by every packet analysis worker.
//!
//! Successful lookups land in the hit table, failed ones in the miss table.
//! Both tables sit behind one mutex so an address is never present in both.
//! There is no per-entry expiry: a background loop wipes everything on a
//! fixed period.

use crate::dns::resolver::ReverseResolver;
use crate::shutdown::{self, StopHandle, StopTimeouts};
use crate::{ExporterError, Result};
use crossbeam_channel::{select, tick};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Period of the full cache flush.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub const EVICTION_STOP_TIMEOUTS: StopTimeouts =
    StopTimeouts::new(Duration::from_millis(200), Duration::from_millis(200));

#[derive(Debug, Default)]
struct Tables {
    hits: Option<HashMap<String, String>>,
    misses: Option<HashMap<String, bool>>,
}

/// Result of a successful [`DnsCache::reverse_lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub hostname: String,
    /// Time spent on the network query, zero when served from the cache.
    pub duration: Duration,
}

pub struct DnsCache {
    tables: Mutex<Tables>,
    resolver: Box<dyn ReverseResolver>,
}

impl DnsCache {
    pub fn new(resolver: impl ReverseResolver + 'static) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            resolver: Box::new(resolver),
        }
    }

    pub fn get_hit(&self, ip: &str) -> Option<String> {
        let tables = self.tables.lock();
        let record = tables.hits.as_ref().and_then(|hits| hits.get(ip)).cloned();
        drop(tables);

        match record {
            Some(_) => debug!("cache hit for ip {}", ip),
            None => debug!("cache miss for ip {}", ip),
        }
        record
    }

    /// `true` if resolving `ip` failed before and must not be retried.
    pub fn get_miss(&self, ip: &str) -> bool {
        let tables = self.tables.lock();
        let missed = tables
            .misses
            .as_ref()
            .and_then(|misses| misses.get(ip))
            .copied()
            .unwrap_or(false);
        drop(tables);

        if missed {
            debug!("ip {} is in miss cache", ip);
        }
        missed
    }

    pub fn add_hit(&self, ip: &str, record: &str) {
        let mut tables = self.tables.lock();
        if let Some(misses) = tables.misses.as_mut() {
            misses.remove(ip);
        }
        tables
            .hits
            .get_or_insert_with(HashMap::new)
            .insert(ip.to_string(), record.to_string());
        drop(tables);

        debug!("added ip {} with record {} to dns hit cache", ip, record);
    }

    pub fn add_miss(&self, ip: &str) {
        let mut tables = self.tables.lock();
        if let Some(hits) = tables.hits.as_mut() {
            hits.remove(ip);
        }
        tables
            .misses
            .get_or_insert_with(HashMap::new)
            .insert(ip.to_string(), true);
        drop(tables);

        debug!("added ip {} to dns miss cache", ip);
    }

    pub fn clear(&self) {
        *self.tables.lock() = Tables::default();
        debug!("cleared dns cache");
    }

    /// Number of (hit, miss) entries.
    pub fn len(&self) -> (usize, usize) {
        let tables = self.tables.lock();
        (
            tables.hits.as_ref().map_or(0, HashMap::len),
            tables.misses.as_ref().map_or(0, HashMap::len),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }

    /// Resolves `ip` to a hostname, consulting the miss table, then the hit
    /// table, and only then the resolver.
    ///
    /// The lock is not held during the network query; two workers racing on
    /// the same new address may both query it.
    pub fn reverse_lookup(&self, ip: &str) -> Result<Resolved> {
        if self.get_miss(ip) {
            return Err(ExporterError::PreviouslyFailed { ip: ip.to_string() });
        }

        if let Some(hostname) = self.get_hit(ip) {
            return Ok(Resolved {
                hostname,
                duration: Duration::ZERO,
            });
        }

        let addr: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => {
                self.add_miss(ip);
                return Err(ExporterError::InvalidAddress(ip.to_string()));
            }
        };

        let start = Instant::now();
        let lookup = self.resolver.reverse(addr);
        let duration = start.elapsed();

        match lookup {
            Ok(hostname) => {
                self.add_hit(ip, &hostname);
                Ok(Resolved { hostname, duration })
            }
            Err(source) => {
                self.add_miss(ip);
                Err(ExporterError::LookupFailed {
                    ip: ip.to_string(),
                    source,
                })
            }
        }
    }

    /// Starts the loop that clears the whole cache every `interval`.
    ///
    /// A zero interval would clear the cache continuously and falls back to
    /// [`DEFAULT_FLUSH_INTERVAL`].
    pub fn start_eviction(self: &Arc<Self>, interval: Duration) -> std::io::Result<StopHandle> {
        let interval = if interval.is_zero() {
            warn!(
                "dns cache flush interval must not be zero, using {}s",
                DEFAULT_FLUSH_INTERVAL.as_secs()
            );
            DEFAULT_FLUSH_INTERVAL
        } else {
            interval
        };
        let cache = Arc::clone(self);
        let handle = shutdown::spawn("dns cache", EVICTION_STOP_TIMEOUTS, move |signal| {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(signal.receiver()) -> _ => break,
                    recv(ticker) -> _ => cache.clear(),
                }
            }
            signal.acknowledge();
        })?;

        info!("started dns cache");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct CountingResolver {
        calls: Arc<AtomicUsize>,
        answer: Option<&'static str>,
    }

    impl ReverseResolver for CountingResolver {
        fn reverse(&self, _ip: IpAddr) -> io::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(name) => Ok(name.to_string()),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no PTR record")),
            }
        }
    }

    fn cache_with(answer: Option<&'static str>) -> (DnsCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CountingResolver {
            calls: Arc::clone(&calls),
            answer,
        };
        (DnsCache::new(resolver), calls)
    }

    #[test]
    fn test_unknown_ip_is_neither_hit_nor_miss() {
        let (cache, _) = cache_with(None);

        assert_eq!(cache.get_hit("10.0.0.1"), None);
        assert!(!cache.get_miss("10.0.0.1"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_and_miss_are_exclusive() {
        let (cache, _) = cache_with(None);

        cache.add_hit("10.0.0.1", "host.example");
        assert_eq!(cache.get_hit("10.0.0.1").as_deref(), Some("host.example"));
        assert!(!cache.get_miss("10.0.0.1"));

        cache.add_miss("10.0.0.1");
        assert!(cache.get_miss("10.0.0.1"));
        assert_eq!(cache.get_hit("10.0.0.1"), None);

        cache.add_hit("10.0.0.1", "again.example");
        assert!(!cache.get_miss("10.0.0.1"));
        assert_eq!(cache.len(), (1, 0));
    }

    #[test]
    fn test_clear_empties_both_tables() {
        let (cache, _) = cache_with(None);
        cache.add_hit("10.0.0.1", "a.example");
        cache.add_miss("10.0.0.2");
        assert_eq!(cache.len(), (1, 1));

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get_hit("10.0.0.1"), None);
        assert!(!cache.get_miss("10.0.0.2"));
    }

    #[test]
    fn test_failed_lookup_is_not_retried() {
        let (cache, calls) = cache_with(None);

        let first = cache.reverse_lookup("192.0.2.7").unwrap_err();
        assert!(matches!(first, ExporterError::LookupFailed { .. }));
        let second = cache.reverse_lookup("192.0.2.7").unwrap_err();
        assert!(matches!(second, ExporterError::PreviouslyFailed { ref ip } if ip == "192.0.2.7"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.get_miss("192.0.2.7"));
    }

    #[test]
    fn test_successful_lookup_is_served_from_cache() {
        let (cache, calls) = cache_with(Some("router.lan"));

        let first = cache.reverse_lookup("192.168.1.1").unwrap();
        assert_eq!(first.hostname, "router.lan");

        let second = cache.reverse_lookup("192.168.1.1").unwrap();
        assert_eq!(second.hostname, "router.lan");
        assert_eq!(second.duration, Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_address_goes_to_miss_cache() {
        let (cache, calls) = cache_with(Some("unused"));

        let err = cache.reverse_lookup("not-an-ip").unwrap_err();
        assert!(matches!(err, ExporterError::InvalidAddress(_)));
        assert!(cache.get_miss("not-an-ip"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_retried_after_clear() {
        let (cache, calls) = cache_with(None);

        let _ = cache.reverse_lookup("192.0.2.9");
        cache.clear();
        let _ = cache.reverse_lookup("192.0.2.9");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_eviction_loop_clears_and_stops() {
        let (cache, _) = cache_with(None);
        let cache = Arc::new(cache);
        cache.add_hit("10.0.0.1", "a.example");

        let handle = cache.start_eviction(Duration::from_millis(10)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !cache.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(cache.is_empty());
        assert!(handle.stop());
    }

    #[test]
    fn test_zero_eviction_interval_keeps_entries() {
        let (cache, _) = cache_with(None);
        let cache = Arc::new(cache);

        let handle = cache.start_eviction(Duration::ZERO).unwrap();
        cache.add_hit("10.0.0.1", "a.example");
        thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.get_hit("10.0.0.1").as_deref(), Some("a.example"));
        assert!(handle.stop());
    }
}
