//! Protocol module - register map, status codes and configuration block.

pub mod config_status;
pub mod registers;
pub mod status;

pub use config_status::{ConfigError, ConfigurationDescriptor, Identity, Version};
pub use registers::{Region, RegisterError, RegisterMap};
pub use status::{Command, SocStatus};
