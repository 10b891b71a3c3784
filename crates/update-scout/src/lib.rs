//! update-scout: find the newest signature update a firewall console offers,
//! record it in a document store and archive its release notes.

pub mod audit;
pub mod auth;
pub mod config;
pub mod driver;
pub mod error;
pub mod extract;
pub mod navigator;
pub mod persist;
pub mod session;
pub mod store;
pub mod types;
pub mod workflow;

pub use audit::{RunEntry, RunLog};
pub use config::{resolve_config_path, Config};
pub use driver::chromium::ChromiumDriver;
pub use driver::{Locator, UiDriver};
pub use error::{DiscoveryError, Stage};
pub use session::DriverSession;
pub use store::elastic::ElasticStore;
pub use store::{DocumentStore, MemoryStore, WriteMode};
pub use types::*;
pub use workflow::{RunReport, Scout};
