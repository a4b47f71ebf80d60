//! Consent gating for actions that touch the local machine.
//!
//! Spawning the gateway and downloading its binary each require a one-time
//! user authorization. A [`ConsentGate`] answers `authorize` from three
//! sources, in order: a persisted "always allow" grant (`consent.toml`), a
//! grant given earlier in the same session, or a fresh prompt through the
//! [`ConsentPrompt`] seam. The prompt offers the three-way choice
//! allow-once / always-allow / cancel.
//!
//! "Always" grants can be withdrawn with [`ConsentGate::revoke`].

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// A machine-touching action that requires user consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentKind {
    /// Spawning the gateway as a local child process.
    Start,
    /// Downloading a gateway binary to the local disk.
    Download,
}

impl ConsentKind {
    /// Return all consent kinds.
    pub fn all() -> &'static [ConsentKind] {
        &[ConsentKind::Start, ConsentKind::Download]
    }
}

impl fmt::Display for ConsentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsentKind::Start => "start",
            ConsentKind::Download => "download",
        };
        f.write_str(s)
    }
}

impl FromStr for ConsentKind {
    type Err = ConsentParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(ConsentKind::Start),
            "download" => Ok(ConsentKind::Download),
            _ => Err(ConsentParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an unknown consent kind string.
#[derive(Debug, Clone)]
pub struct ConsentParseError(pub String);

impl fmt::Display for ConsentParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown consent kind: {:?}", self.0)
    }
}

impl std::error::Error for ConsentParseError {}

/// The user's answer to a consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    /// Allow this one action; ask again next session.
    AllowOnce,
    /// Allow and remember; never ask again for this kind.
    AlwaysAllow,
    /// Refuse the action.
    Cancel,
}

/// UI seam for asking the user. Implemented by the terminal prompt in the
/// CLI and by scripted prompters in tests.
pub trait ConsentPrompt: Send {
    /// Present the three-way choice for `kind` and return the decision.
    /// No response is reported as [`ConsentDecision::Cancel`].
    fn request(&self, kind: ConsentKind) -> ConsentDecision;
}

/// A persisted "always allow" grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Which action kind this grant covers.
    pub kind: ConsentKind,
    /// Epoch seconds when the grant was given.
    pub granted_at: Option<u64>,
}

/// Persistent store of "always allow" grants.
///
/// Serializes to `consent.toml`. Only "always" decisions are stored;
/// "once" grants live in [`ConsentGate`] session memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentStore {
    /// Grant records, one per consented kind.
    #[serde(default)]
    grants: Vec<ConsentRecord>,
}

impl ConsentStore {
    /// Load the store from a TOML file. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Save the store, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| GatewayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Read-only access to the grant records.
    pub fn grants(&self) -> &[ConsentRecord] {
        &self.grants
    }

    /// Check whether an "always" grant exists for `kind`.
    pub fn is_granted(&self, kind: ConsentKind) -> bool {
        self.grants.iter().any(|g| g.kind == kind)
    }

    /// Record an "always" grant, updating the timestamp if one exists.
    pub fn grant(&mut self, kind: ConsentKind) {
        let now = epoch_seconds();
        if let Some(existing) = self.grants.iter_mut().find(|g| g.kind == kind) {
            existing.granted_at = Some(now);
        } else {
            self.grants.push(ConsentRecord {
                kind,
                granted_at: Some(now),
            });
        }
    }

    /// Remove an "always" grant. Unknown kinds are a no-op.
    pub fn revoke(&mut self, kind: ConsentKind) {
        self.grants.retain(|g| g.kind != kind);
    }
}

/// Gate that answers "may this action touch the machine?".
pub struct ConsentGate {
    store: ConsentStore,
    store_path: PathBuf,
    /// Kinds allowed once for the lifetime of this process.
    session_grants: Vec<ConsentKind>,
    prompt: Box<dyn ConsentPrompt>,
}

impl ConsentGate {
    /// Build a gate over the store at `store_path`, prompting through
    /// `prompt` when no grant exists. A missing store file starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing store file cannot be parsed.
    pub fn load(store_path: PathBuf, prompt: Box<dyn ConsentPrompt>) -> Result<Self> {
        let store = ConsentStore::load(&store_path)?;
        Ok(Self {
            store,
            store_path,
            session_grants: Vec::new(),
            prompt,
        })
    }

    /// Ask whether `kind` may proceed.
    ///
    /// Returns `true` without prompting when a persisted "always" grant or a
    /// session grant exists. Otherwise prompts; "always" answers are
    /// persisted before returning. Declining is not an error; the caller
    /// treats `false` as a no-op path.
    pub fn authorize(&mut self, kind: ConsentKind) -> bool {
        if self.store.is_granted(kind) {
            debug!(%kind, "consent satisfied by persisted grant");
            return true;
        }
        if self.session_grants.contains(&kind) {
            debug!(%kind, "consent satisfied by session grant");
            return true;
        }

        match self.prompt.request(kind) {
            ConsentDecision::AllowOnce => {
                self.session_grants.push(kind);
                true
            }
            ConsentDecision::AlwaysAllow => {
                self.store.grant(kind);
                if let Err(e) = self.store.save(&self.store_path) {
                    // The user said yes; a persistence failure only means
                    // they will be asked again next session.
                    warn!(%kind, error = %e, "failed to persist consent grant");
                }
                true
            }
            ConsentDecision::Cancel => {
                debug!(%kind, "consent declined");
                false
            }
        }
    }

    /// Withdraw a persisted "always" grant and save the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn revoke(&mut self, kind: ConsentKind) -> Result<()> {
        self.store.revoke(kind);
        self.session_grants.retain(|k| *k != kind);
        self.store.save(&self.store_path)
    }

    /// Persisted grant records, for display.
    pub fn grants(&self) -> &[ConsentRecord] {
        self.store.grants()
    }
}

impl fmt::Debug for ConsentGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentGate")
            .field("store", &self.store)
            .field("store_path", &self.store_path)
            .field("session_grants", &self.session_grants)
            .finish_non_exhaustive()
    }
}

/// Current epoch time in seconds (returns 0 on clock error).
fn epoch_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
