//! Download and installation of gateway release assets.
//!
//! Streams the selected asset to a `.download` temp file inside the managed
//! bin directory, unpacks it according to its packaging (tar.gz, zip, or a
//! raw executable), locates the gateway binary among the extracted entries,
//! and marks it executable. Archive entries that would escape the
//! destination directory abort the install.

use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::release::{ArchiveKind, ReleaseAsset};
use crate::paths;

/// Callback for download progress: bytes downloaded so far, and the total
/// size when the server reported a Content-Length.
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Result of a successful install.
#[derive(Debug, Clone)]
pub struct InstalledBinary {
    /// Path of the gateway executable inside the destination directory.
    pub path: PathBuf,
    /// Whether the executable bit could be set (always true on non-Unix).
    pub executable: bool,
}

/// Installs release assets into a destination directory.
pub struct ArchiveInstaller {
    client: reqwest::Client,
    dest_dir: PathBuf,
}

impl ArchiveInstaller {
    /// Create an installer targeting `dest_dir` (created on demand).
    pub fn new(client: reqwest::Client, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dest_dir: dest_dir.into(),
        }
    }

    /// Download and unpack `asset`, returning the installed binary.
    ///
    /// The temp download file is removed whether or not the install
    /// succeeds. Extraction runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// `Download` for transfer failures, `Extract` for unpack failures
    /// (including entries that try to escape the destination), and
    /// `BinaryNotFoundAfterExtract` when nothing matching the gateway
    /// binary name came out of the archive.
    pub async fn install(
        &self,
        asset: &ReleaseAsset,
        progress: Option<ProgressCallback>,
    ) -> Result<InstalledBinary> {
        tokio::fs::create_dir_all(&self.dest_dir).await?;
        let temp = self.dest_dir.join(format!("{}.download", asset.name));

        if let Err(e) = self
            .download_to(&asset.browser_download_url, &temp, progress.as_deref())
            .await
        {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        match asset.archive_kind() {
            ArchiveKind::Raw => {
                let target = self.dest_dir.join(paths::gateway_binary_name());
                tokio::fs::rename(&temp, &target).await?;
            }
            kind => {
                let archive = temp.clone();
                let dest = self.dest_dir.clone();
                let outcome = tokio::task::spawn_blocking(move || match kind {
                    ArchiveKind::TarGz => extract_tar_gz(&archive, &dest),
                    ArchiveKind::Zip => extract_zip(&archive, &dest),
                    ArchiveKind::Raw => Ok(()),
                })
                .await
                .map_err(|e| GatewayError::Extract(format!("extraction task failed: {e}")))?;
                let _ = tokio::fs::remove_file(&temp).await;
                outcome?;
            }
        }

        let Some(path) = find_gateway_binary(&self.dest_dir) else {
            return Err(GatewayError::BinaryNotFoundAfterExtract(format!(
                "no file named '{}*' in {} after unpacking {}",
                paths::GATEWAY_BINARY_PREFIX,
                self.dest_dir.display(),
                asset.name
            )));
        };

        let executable = make_executable(&path);
        if !executable {
            warn!(path = %path.display(), "could not mark gateway binary executable");
        }
        info!(path = %path.display(), "gateway binary installed");
        Ok(InstalledBinary { path, executable })
    }

    async fn download_to(
        &self,
        url: &str,
        path: &Path,
        progress: Option<&(dyn Fn(u64, Option<u64>) + Send + Sync)>,
    ) -> Result<()> {
        debug!(%url, "downloading release asset");
        let resp = self
            .client
            .get(url)
            .header(
                reqwest::header::USER_AGENT,
                concat!("tokgate/", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await
            .map_err(|e| GatewayError::Download(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(GatewayError::Download(format!(
                "{url}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let total = resp.content_length();
        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = resp.bytes_stream();
        let mut downloaded: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GatewayError::Download(format!("{url}: {e}")))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(downloaded, total);
            }
        }
        file.flush().await?;
        Ok(())
    }
}

/// Find the gateway binary inside `dir`.
///
/// The canonical platform name wins; otherwise the first file (sorted by
/// name) whose filename starts with the gateway prefix is taken. In-flight
/// `.download` temp files never match.
#[must_use]
pub fn find_gateway_binary(dir: &Path) -> Option<PathBuf> {
    let canonical = dir.join(paths::gateway_binary_name());
    if canonical.is_file() {
        return Some(canonical);
    }

    let entries = std::fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(paths::GATEWAY_BINARY_PREFIX) && !name.ends_with(".download")
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Reject archive entry paths that could land outside the destination.
fn ensure_safe_entry(path: &Path) -> Result<()> {
    let escapes = path.is_absolute()
        || path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(GatewayError::Extract(format!(
            "archive entry '{}' escapes the destination directory",
            path.display()
        )));
    }
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let decoder = GzDecoder::new(std::io::BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|e| GatewayError::Extract(format!("read tar archive: {e}")))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| GatewayError::Extract(format!("read tar entry: {e}")))?;
        let rel = entry
            .path()
            .map_err(|e| GatewayError::Extract(format!("tar entry path: {e}")))?
            .into_owned();
        ensure_safe_entry(&rel)?;
        let out = dest.join(&rel);
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&out)
            .map_err(|e| GatewayError::Extract(format!("unpack '{}': {e}", rel.display())))?;
    }
    Ok(())
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| GatewayError::Extract(format!("open zip archive: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| GatewayError::Extract(format!("read zip entry: {e}")))?;
        let Some(rel) = entry.enclosed_name() else {
            return Err(GatewayError::Extract(format!(
                "zip entry '{}' escapes the destination directory",
                entry.name()
            )));
        };
        ensure_safe_entry(&rel)?;
        let out = dest.join(&rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut target = std::fs::File::create(&out)?;
            std::io::copy(&mut entry, &mut target)
                .map_err(|e| GatewayError::Extract(format!("unpack '{}': {e}", rel.display())))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).is_ok()
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> bool {
    true
}
