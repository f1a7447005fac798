//! dlang-pkg - package management for DLang modeling workspaces
//!
//! This library installs model packages hosted in git repositories into a
//! workspace-local cache and resolves imports against them.
//!
//! # High-Level API
//!
//! ```ignore
//! use dlang_pkg::config::Settings;
//! use dlang_pkg::install::{InstallOptions, InstallService};
//!
//! let settings = Settings::load()?;
//! let service = InstallService::from_settings(&settings)?;
//! let result = service.install(InstallOptions::new(workspace_root)).await?;
//! println!("{} installed, {} cached", result.installed, result.cached);
//! ```
//!
//! # Modules
//!
//! - [`manifest`] - `model.yaml` / `model.lock` loading and validation
//! - [`install`] - dependency installation with integrity checks
//! - [`resolver`] - import specifier resolution
//! - [`cache`] - commit-keyed package cache
//! - [`githost`] - git host API (tags, refs, tarballs)
//! - [`http`] - transport abstraction and retrying fetcher
//! - [`credentials`] - git host credential lookup
//! - [`updates`] - outdated dependency detection
//! - [`version`] - release tag comparison

pub mod cache;
pub mod config;
pub mod credentials;
pub mod githost;
pub mod http;
pub mod install;
pub mod logging;
pub mod manifest;
pub mod resolver;
pub mod updates;
pub mod version;

/// Version of the dlang-pkg library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
