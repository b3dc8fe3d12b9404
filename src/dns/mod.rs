pub mod cache;
pub mod resolver;

pub use cache::{DnsCache, Resolved, DEFAULT_FLUSH_INTERVAL};
pub use resolver::{ReverseResolver, SystemResolver};
