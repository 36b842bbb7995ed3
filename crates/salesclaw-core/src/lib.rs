//! # SalesClaw Core
//!
//! Shared building blocks for the trigger automation workspace:
//! error type, priority/type/category enums, the account directory and
//! the TOML configuration system.

pub mod config;
pub mod error;
pub mod payload;
pub mod types;

pub use config::SalesClawConfig;
pub use error::{Result, SalesClawError};
pub use types::{AccountDirectory, Priority, TriggerCategory, TriggerType};
