//! Integration tests: runtime_cache.
use std::fs;
use std::io::Write;
use std::path::Path;

use carton_core::workspace::{READY_MARKER, RUNTIME_DIR};
use carton_core::{RuntimeError, RuntimeSource, Workspace, WorkspaceConfig};
use carton_schema::{Hash, HashAlgorithm, RuntimeFormat};
use futures::StreamExt;
use futures::future::join_all;
use tempfile::TempDir;

/// A gzip tarball with a single top-level directory, like vendor JDK builds.
fn jdk_tarball() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, mode, data) in [
        ("jdk-21.0.2+13/bin/java", 0o755, &b"#!/bin/java"[..]),
        ("jdk-21.0.2+13/release", 0o644, &b"JAVA_VERSION=\"21.0.2\""[..]),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

fn sha256(data: &[u8]) -> Hash {
    Hash::compute(HashAlgorithm::Sha256, data).unwrap()
}

fn workspace(base: &Path, url: String, hash: Hash) -> Workspace {
    let config = WorkspaceConfig::new(
        base,
        RuntimeSource {
            url,
            hash,
            format: RuntimeFormat::TarGz,
        },
    );
    Workspace::open(config, carton_core::default_http_client().unwrap()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_download() {
    let body = jdk_tarball();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/jdk.tar.gz")
        .with_status(200)
        .with_body(&body)
        .expect(1)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        sha256(&body),
    );

    let results = join_all((0..8).map(|_| ws.java_runtime())).await;

    mock.assert_async().await;
    let expected = tmp.path().join(RUNTIME_DIR);
    for result in results {
        assert_eq!(result.unwrap(), expected);
    }
    assert!(tmp.path().join(READY_MARKER).exists());
    assert!(tmp.path().join("jdk-archive").exists());
    assert!(!tmp.path().join("jdk-archive.tmp").exists());
    assert_eq!(fs::read(expected.join("bin/java")).unwrap(), b"#!/bin/java");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(expected.join("bin/java")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o760);
    }

    assert_eq!(ws.java_runtime().await.unwrap(), expected);
    mock.assert_async().await;
}

#[tokio::test]
async fn ready_marker_skips_the_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/jdk.tar.gz")
        .expect(0)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(RUNTIME_DIR)).unwrap();
    fs::write(tmp.path().join(READY_MARKER), b"").unwrap();

    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        sha256(b"irrelevant"),
    );
    let path = ws.java_runtime().await.unwrap();
    let progress: Vec<_> = ws.java_runtime_download().collect().await;

    assert_eq!(path, tmp.path().join(RUNTIME_DIR));
    assert!(progress.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn checksum_mismatch_never_reaches_extraction() {
    let body = jdk_tarball();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/jdk.tar.gz")
        .with_body(&body)
        .expect(2)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        sha256(b"something else"),
    );

    let err = ws.java_runtime().await.unwrap_err();
    assert!(matches!(*err, RuntimeError::ChecksumMismatch { .. }));
    assert_eq!(err.kind(), "checksum-mismatch");
    assert!(err.attributes().iter().any(|(key, _)| *key == "uri"));
    assert!(!tmp.path().join(RUNTIME_DIR).exists());
    assert!(!tmp.path().join(READY_MARKER).exists());
    assert!(!tmp.path().join("jdk-archive.tmp").exists());

    // Failure resets the workspace, so the next call tries again.
    let err = ws.java_runtime().await.unwrap_err();
    assert_eq!(err.kind(), "checksum-mismatch");
    mock.assert_async().await;
}

#[tokio::test]
async fn http_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/jdk.tar.gz")
        .with_status(404)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        sha256(b""),
    );

    let err = ws.java_runtime().await.unwrap_err();
    let RuntimeError::Http { status, .. } = &*err else {
        panic!("expected HTTP error, got {err:?}");
    };
    assert_eq!(*status, 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_reaches_every_subscriber() {
    let body = jdk_tarball();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/jdk.tar.gz")
        .with_body(&body)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        sha256(&body),
    );

    let first = tokio::spawn(ws.java_runtime_download().collect::<Vec<_>>());
    let second = tokio::spawn(ws.java_runtime_download().collect::<Vec<_>>());
    ws.java_runtime().await.unwrap();

    for events in [first.await.unwrap(), second.await.unwrap()] {
        let last = events.last().expect("at least one progress event");
        assert_eq!(last.transferred, body.len() as u64);
        assert!(events.windows(2).all(|w| w[0].transferred <= w[1].transferred));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_follows_a_retry_after_failure() {
    let body = jdk_tarball();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/jdk.tar.gz")
        .with_body(&body)
        .expect(2)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        sha256(b"not the body"),
    );

    let first = tokio::spawn(ws.java_runtime_download().collect::<Vec<_>>());
    assert!(ws.java_runtime().await.is_err());
    assert!(!first.await.unwrap().is_empty());

    let retry = tokio::spawn(ws.java_runtime_download().collect::<Vec<_>>());
    assert!(ws.java_runtime().await.is_err());
    let events = retry.await.unwrap();
    assert_eq!(events.last().unwrap().transferred, body.len() as u64);
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_aborts_an_in_flight_download() {
    // Large enough to arrive in many chunks.
    let body = vec![7u8; 4 << 20];
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/jdk.tar.gz")
        .with_body(&body)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        sha256(&body),
    );

    // An unread subscriber holds the download after its first events.
    let mut stalled = ws.java_runtime_download();
    let runtime = ws.java_runtime();
    assert!(stalled.next().await.is_some());

    ws.close();
    let err = runtime.await.unwrap_err();

    assert_eq!(err.kind(), "closed");
    let buffered: Vec<_> = stalled.collect().await;
    assert!(buffered.len() <= 1);
    assert!(!tmp.path().join(READY_MARKER).exists());
    assert!(!tmp.path().join(RUNTIME_DIR).exists());
    assert_eq!(ws.java_runtime().await.unwrap_err().kind(), "closed");
}

#[tokio::test]
async fn unsupported_algorithm_fails_before_download() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/jdk.tar.gz")
        .expect(0)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let ws = workspace(
        tmp.path(),
        format!("{}/jdk.tar.gz", server.url()),
        Hash::new("MD5", "00"),
    );

    let err = ws.java_runtime().await.unwrap_err();
    assert_eq!(err.kind(), "hash-algorithm-unsupported");
    mock.assert_async().await;
}

#[tokio::test]
async fn work_directories_are_unique() {
    let tmp = TempDir::new().unwrap();
    let ws = workspace(tmp.path(), "http://127.0.0.1:9/jdk.tar.gz".into(), sha256(b""));

    let first = ws.create_work_directory().unwrap();
    let second = ws.create_work_directory().unwrap();

    assert_ne!(first, second);
    assert!(first.is_dir() && second.is_dir());
    assert!(first.starts_with(tmp.path().join("work")));
}

#[tokio::test]
async fn closed_workspace_refuses_work() {
    let tmp = TempDir::new().unwrap();
    let ws = workspace(tmp.path(), "http://127.0.0.1:9/jdk.tar.gz".into(), sha256(b""));

    ws.close();
    ws.close();

    assert_eq!(ws.java_runtime().await.unwrap_err().kind(), "closed");
    assert_eq!(ws.create_work_directory().unwrap_err().kind(), "closed");
    let events: Vec<_> = ws.java_runtime_download().collect().await;
    assert!(events.is_empty());
}

#[test]
fn opening_outside_a_runtime_fails() {
    let config = WorkspaceConfig::new(
        "/nonexistent",
        RuntimeSource {
            url: "http://127.0.0.1:9/jdk.zip".into(),
            hash: sha256(b""),
            format: RuntimeFormat::Zip,
        },
    );
    let err = Workspace::open(config, reqwest::Client::new()).unwrap_err();
    assert_eq!(err.kind(), "no-executor");
}

#[tokio::test]
async fn config_file_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("workspace.toml");
    fs::write(
        &path,
        format!(
            "base_dir = {:?}\n\n[runtime]\nurl = \"https://example.com/jdk-21.tar.gz\"\ndigest = \"abc\"\n",
            tmp.path().join("cache").display().to_string()
        ),
    )
    .unwrap();

    let config = WorkspaceConfig::load(&path).await.unwrap();

    assert_eq!(config.base_dir, tmp.path().join("cache"));
    assert_eq!(config.runtime.format, RuntimeFormat::TarGz);
    assert_eq!(config.runtime.hash, Hash::sha256("abc"));
}
