//! End-to-end install flow: download a served archive, unpack it into a
//! temp directory, and locate the resulting binary.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write as _;
use std::sync::{Arc, Mutex};
use tokgate::error::GatewayError;
use tokgate::gateway::install::{ArchiveInstaller, ProgressCallback, find_gateway_binary};
use tokgate::gateway::release::ReleaseAsset;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCRIPT: &[u8] = b"#!/bin/sh\nexit 0\n";

fn tar_gz_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        // `set_path` refuses `..` components, which escape fixtures need,
        // so write the name bytes straight into the header.
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_cksum();
        builder.append(&header, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn asset_for(server: &MockServer, name: &str) -> ReleaseAsset {
    ReleaseAsset {
        name: name.to_owned(),
        browser_download_url: format!("{}/download/{name}", server.uri()),
    }
}

async fn serve(server: &MockServer, name: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Happy paths per archive kind
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tar_gz_release_installs_and_is_located() {
    let server = MockServer::start().await;
    let name = "tokligence-gateway_linux_amd64.tar.gz";
    serve(&server, name, tar_gz_with(&[("tokligence-gateway", SCRIPT)])).await;

    let dest = tempfile::tempdir().unwrap();
    let installer = ArchiveInstaller::new(reqwest::Client::new(), dest.path());
    let installed = installer
        .install(&asset_for(&server, name), None)
        .await
        .unwrap();

    assert_eq!(installed.path, dest.path().join("tokligence-gateway"));
    assert!(installed.path.is_file());
    #[cfg(unix)]
    assert!(installed.executable);

    // The temp download must not linger.
    assert!(!dest.path().join(format!("{name}.download")).exists());
    // And the locator agrees with the installer.
    assert_eq!(find_gateway_binary(dest.path()), Some(installed.path));
}

#[tokio::test]
async fn zip_release_installs() {
    let server = MockServer::start().await;
    let name = "tokligence-gateway_linux_amd64.zip";
    serve(&server, name, zip_with(&[("tokligence-gateway", SCRIPT)])).await;

    let dest = tempfile::tempdir().unwrap();
    let installer = ArchiveInstaller::new(reqwest::Client::new(), dest.path());
    let installed = installer
        .install(&asset_for(&server, name), None)
        .await
        .unwrap();

    assert!(installed.path.is_file());
    assert_eq!(std::fs::read(&installed.path).unwrap(), SCRIPT);
}

#[tokio::test]
async fn raw_asset_is_renamed_to_canonical_binary() {
    let server = MockServer::start().await;
    let name = "tokligence-gateway-linux-amd64";
    serve(&server, name, SCRIPT.to_vec()).await;

    let dest = tempfile::tempdir().unwrap();
    let installer = ArchiveInstaller::new(reqwest::Client::new(), dest.path());
    let installed = installer
        .install(&asset_for(&server, name), None)
        .await
        .unwrap();

    assert_eq!(
        installed.path,
        dest.path().join(tokgate::paths::gateway_binary_name())
    );
    assert_eq!(std::fs::read(&installed.path).unwrap(), SCRIPT);
    assert!(!dest.path().join(format!("{name}.download")).exists());
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_callback_sees_cumulative_bytes_and_total() {
    let server = MockServer::start().await;
    let name = "tokligence-gateway_linux_amd64.tar.gz";
    let body = tar_gz_with(&[("tokligence-gateway", SCRIPT)]);
    let body_len = body.len() as u64;
    serve(&server, name, body).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress: ProgressCallback = Box::new(move |done, total| {
        sink.lock().unwrap().push((done, total));
    });

    let dest = tempfile::tempdir().unwrap();
    let installer = ArchiveInstaller::new(reqwest::Client::new(), dest.path());
    installer
        .install(&asset_for(&server, name), Some(progress))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty(), "progress should be reported");
    let (last_done, last_total) = *seen.last().unwrap();
    assert_eq!(last_done, body_len);
    assert_eq!(last_total, Some(body_len));
    // Cumulative count never goes backwards.
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn escaping_archive_entry_aborts_the_install() {
    let server = MockServer::start().await;
    let name = "tokligence-gateway_linux_amd64.tar.gz";
    serve(&server, name, tar_gz_with(&[("../escape", b"owned")])).await;

    let dest = tempfile::tempdir().unwrap();
    let installer = ArchiveInstaller::new(reqwest::Client::new(), dest.path());
    let err = installer
        .install(&asset_for(&server, name), None)
        .await
        .unwrap_err();

    assert!(
        matches!(err, GatewayError::Extract(_)),
        "unexpected error: {err}"
    );
    // Nothing was written outside the destination.
    assert!(!dest.path().parent().unwrap().join("escape").exists());
}

#[tokio::test]
async fn http_failure_leaves_no_partial_files() {
    let server = MockServer::start().await;
    let name = "tokligence-gateway_linux_amd64.tar.gz";
    Mock::given(method("GET"))
        .and(path(format!("/download/{name}")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dest = tempfile::tempdir().unwrap();
    let installer = ArchiveInstaller::new(reqwest::Client::new(), dest.path());
    let err = installer
        .install(&asset_for(&server, name), None)
        .await
        .unwrap_err();

    assert!(
        matches!(err, GatewayError::Download(_)),
        "unexpected error: {err}"
    );
    let leftovers: Vec<_> = std::fs::read_dir(dest.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "no files should remain: {leftovers:?}");
}

#[tokio::test]
async fn archive_without_gateway_binary_is_an_error() {
    let server = MockServer::start().await;
    let name = "tokligence-gateway_linux_amd64.tar.gz";
    serve(&server, name, tar_gz_with(&[("README.md", b"docs only")])).await;

    let dest = tempfile::tempdir().unwrap();
    let installer = ArchiveInstaller::new(reqwest::Client::new(), dest.path());
    let err = installer
        .install(&asset_for(&server, name), None)
        .await
        .unwrap_err();

    assert!(
        matches!(err, GatewayError::BinaryNotFoundAfterExtract(_)),
        "unexpected error: {err}"
    );
}
