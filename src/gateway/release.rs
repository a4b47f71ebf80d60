//! Release resolution for gateway provisioning.
//!
//! Given a version tag, fetches the release metadata document from the
//! configured feed (GitHub releases API shape) and selects the downloadable
//! asset for the running OS and architecture. Asset names are matched by
//! canonical OS label (`windows`/`darwin`/`linux`) plus any accepted
//! architecture alias; among matches, packaging decides: `.tar.gz` beats
//! `.zip` beats a raw binary.

use crate::error::{GatewayError, Result};
use serde::Deserialize;
use tracing::debug;

/// Inferred packaging of a release asset.
///
/// Variant order is selection preference: earlier variants win ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArchiveKind {
    /// Gzip-compressed tarball (`.tar.gz` / `.tgz`).
    TarGz,
    /// Zip archive.
    Zip,
    /// Raw executable, no unpacking required.
    Raw,
}

impl ArchiveKind {
    /// Infer the packaging from an asset filename.
    #[must_use]
    pub fn infer(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if lower.ends_with(".zip") {
            ArchiveKind::Zip
        } else {
            ArchiveKind::Raw
        }
    }
}

/// A single downloadable asset from a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// Asset filename (e.g. "tokligence-gateway-linux-amd64.tar.gz").
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

impl ReleaseAsset {
    /// Packaging inferred from the asset name.
    #[must_use]
    pub fn archive_kind(&self) -> ArchiveKind {
        ArchiveKind::infer(&self.name)
    }
}

/// A release as returned by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Tag name (e.g. "v0.4.2").
    #[serde(default)]
    pub tag_name: String,
    /// Downloadable assets.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Canonical OS label used in gateway asset names.
///
/// macOS assets are labelled `darwin`. Unknown platforms fall through to the
/// raw OS string, which simply matches no asset.
#[must_use]
pub fn os_label() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Architecture aliases accepted in gateway asset names.
///
/// Empty on architectures the gateway does not ship for.
#[must_use]
pub fn arch_aliases() -> &'static [&'static str] {
    match std::env::consts::ARCH {
        "x86_64" => &["amd64", "x86_64", "x64"],
        "aarch64" => &["arm64", "aarch64"],
        _ => &[],
    }
}

/// Whether an asset name targets the given platform.
///
/// The name must contain the OS label and at least one architecture alias;
/// comparison is case-insensitive.
fn matches_platform(name: &str, os: &str, aliases: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains(os) && aliases.iter().any(|alias| lower.contains(alias))
}

/// Select the asset for the given platform from a release's asset list.
///
/// Among platform matches, packaging preference is total: `.tar.gz`, then
/// `.zip`, then raw. Ties within one kind keep the first listed asset.
#[must_use]
pub fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    os: &str,
    aliases: &[&str],
) -> Option<&'a ReleaseAsset> {
    assets
        .iter()
        .filter(|a| matches_platform(&a.name, os, aliases))
        .min_by_key(|a| a.archive_kind())
}

/// Resolves a version tag to the platform's downloadable asset.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: reqwest::Client,
    feed_url: String,
}

impl ReleaseResolver {
    /// Create a resolver against a release feed base URL.
    pub fn new(client: reqwest::Client, feed_url: impl Into<String>) -> Self {
        let feed_url = feed_url.into().trim_end_matches('/').to_owned();
        Self { client, feed_url }
    }

    /// URL of the metadata document for `tag`.
    ///
    /// The distinguished tag `latest` uses the feed's latest-release
    /// endpoint rather than a tag lookup.
    fn release_url(&self, tag: &str) -> String {
        if tag == "latest" {
            format!("{}/latest", self.feed_url)
        } else {
            format!("{}/tags/{tag}", self.feed_url)
        }
    }

    /// Fetch release metadata for `tag` and select this machine's asset.
    ///
    /// # Errors
    ///
    /// `NoReleaseFound` if the tag does not exist, `NoMatchingAsset` if the
    /// release carries nothing for this OS/architecture, and
    /// `ResolveTransport` for network or protocol failures.
    pub async fn resolve(&self, tag: &str) -> Result<ReleaseAsset> {
        let url = self.release_url(tag);
        debug!(%url, "fetching release metadata");

        let resp = self
            .client
            .get(&url)
            .header(
                reqwest::header::USER_AGENT,
                concat!("tokgate/", env!("CARGO_PKG_VERSION")),
            )
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| GatewayError::ResolveTransport(format!("{url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NoReleaseFound(tag.to_owned()));
        }
        if !resp.status().is_success() {
            return Err(GatewayError::ResolveTransport(format!(
                "{url}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let release: Release = resp
            .json()
            .await
            .map_err(|e| GatewayError::ResolveTransport(format!("{url}: {e}")))?;

        let os = os_label();
        let aliases = arch_aliases();
        match select_asset(&release.assets, os, aliases) {
            Some(asset) => {
                debug!(asset = %asset.name, "selected release asset");
                Ok(asset.clone())
            }
            None => {
                let names: Vec<&str> = release.assets.iter().map(|a| a.name.as_str()).collect();
                Err(GatewayError::NoMatchingAsset(format!(
                    "no asset for {os}/{} in release '{}' (assets: [{}])",
                    std::env::consts::ARCH,
                    release.tag_name,
                    names.join(", ")
                )))
            }
        }
    }
}
