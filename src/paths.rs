//! Centralized filesystem paths for tokgate.
//!
//! Single source of truth for every path the orchestrator touches. Uses the
//! [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/tokgate/` | `~/.config/tokgate/` |
//! | Data (managed binaries) | `~/Library/Application Support/tokgate/` | `~/.local/share/tokgate/` |
//!
//! # Environment Overrides
//!
//! - `TOKGATE_CONFIG_DIR` — overrides [`config_dir`]
//! - `TOKGATE_DATA_DIR` — overrides [`data_dir`]

use std::path::PathBuf;

/// Filename stem of the gateway executable; platform release assets and the
/// post-extract scan both key off this prefix.
pub const GATEWAY_BINARY_PREFIX: &str = "tokligence-gateway";

/// Application config directory.
///
/// Holds `config.toml` and `consent.toml`. Resolves to
/// `dirs::config_dir()/tokgate/` by default. Override with the
/// `TOKGATE_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TOKGATE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("tokgate"))
        .unwrap_or_else(|| PathBuf::from("/tmp/tokgate-config"))
}

/// Application data directory.
///
/// Holds the managed `bin/` directory with installed gateway binaries.
/// Resolves to `dirs::data_dir()/tokgate/` by default. Override with the
/// `TOKGATE_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TOKGATE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("tokgate"))
        .unwrap_or_else(|| PathBuf::from("/tmp/tokgate-data"))
}

/// Managed binary install directory (`data_dir()/bin/`).
#[must_use]
pub fn bin_dir() -> PathBuf {
    data_dir().join("bin")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted consent grants (`config_dir()/consent.toml`).
#[must_use]
pub fn consent_file() -> PathBuf {
    config_dir().join("consent.toml")
}

/// Platform-specific filename of the installed gateway executable.
#[must_use]
pub fn gateway_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "tokligence-gateway.exe"
    } else {
        "tokligence-gateway"
    }
}

/// Canonical path of the managed gateway binary (`bin_dir()/<name>`).
#[must_use]
pub fn managed_binary_path() -> PathBuf {
    bin_dir().join(gateway_binary_name())
}
