pub mod base64;
pub mod file;
pub mod http;
pub mod string;

// Re-export common utilities
pub use file::{FileStore, ProxyStore, SaveOutcome};
pub use http::{subscription_file_stem, web_get, HttpConfig};
