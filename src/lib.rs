pub mod capture;
pub mod cli;
pub mod dns;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod shutdown;

pub use error::{ExporterError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
