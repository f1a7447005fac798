//! Configuration for the package manager.
//!
//! Two layers:
//!
//! - [`RetryConfig`] groups the retry/backoff knobs used by the HTTP layer
//!   and can be built directly in code.
//! - [`Settings`] is the user-level `~/.dlang/config.ini` file, which
//!   overlays defaults and produces the runtime configs.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dlang_pkg::config::RetryConfig;
//!
//! let config = RetryConfig::new()
//!     .with_max_retries(4)
//!     .with_initial_delay(Duration::from_millis(500));
//! assert_eq!(config.max_retries(), 4);
//! ```

mod defaults;
mod file;
mod parser;
mod retry;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, SettingsError};
pub use retry::RetryConfig;
pub use settings::{InstallSettings, NetworkSettings, Settings};
