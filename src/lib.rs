pub mod error;
pub mod interfaces;
pub mod liveness;
pub mod models;
pub mod parser;
pub mod settings;
pub mod utils;

// Re-export the main proxy types for easier access
pub use models::{ProxyRecord, ProxySet, ProxyType};

pub use error::{CuratorError, Result};
pub use interfaces::{Curator, CuratorConfig, CuratorConfigBuilder};
pub use settings::CuratorSettings;
