//! Integration tests: cli.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use carton_schema::{
    FileName, Hash, HashAlgorithm, Manifest, ManifestEntry, PackageDeclaration, Platform,
    ResourceRole, RuntimeFormat, RuntimeRequirement,
};
use tempfile::TempDir;

/// Test context with an isolated carton home and a payload directory
struct TestContext {
    temp_dir: TempDir,
    carton_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let carton_home = temp_dir.path().join(".carton");
        fs::create_dir_all(&carton_home).expect("failed to create carton home");
        Self {
            temp_dir,
            carton_home,
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    fn carton_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_carton");
        let mut cmd = Command::new(bin_path);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("CARTON_HOME", &self.carton_home);
        cmd.env_remove("CARTON_CACHE_DIR");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.carton_cmd()
            .args(args)
            .output()
            .expect("failed to run carton")
    }

    /// Write payload files plus a matching declaration; returns the
    /// declaration path.
    fn author(&self, files: &[(&str, &[u8])], runtimes: Vec<RuntimeRequirement>) -> PathBuf {
        let payload = self.path("payload");
        let mut entries = Vec::new();
        for (name, content) in files {
            let path = payload.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();

            let file_name = FileName::new(name).unwrap();
            let hash = Hash::compute(HashAlgorithm::Sha256, *content).unwrap();
            entries.push(if name.starts_with("meta/") {
                ManifestEntry::resource(file_name, ResourceRole::License, hash)
            } else {
                ManifestEntry::module(file_name, hash)
            });
        }

        let mut declaration =
            PackageDeclaration::new("hello", "0.1.0", Manifest::new(entries).unwrap());
        declaration.vendor = Some("Example Corp".into());
        declaration.runtimes = runtimes;

        let path = self.path("PACKAGE.XML");
        fs::write(&path, declaration.to_xml().unwrap()).unwrap();
        path
    }

    fn pack(&self, declaration: &Path) -> PathBuf {
        let output = self.path("hello.carton");
        let result = self.run(&[
            "pack",
            "--declaration",
            declaration.to_str().unwrap(),
            "--from",
            self.path("payload").to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ]);
        assert!(
            result.status.success(),
            "pack failed: {}",
            String::from_utf8_lossy(&result.stderr)
        );
        output
    }
}

const FILES: &[(&str, &[u8])] = &[
    ("lib/hello.jar", b"hello classes"),
    ("meta/LICENSE", b"MIT"),
];

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_pack_inspect_verify() {
    let ctx = TestContext::new();
    let declaration = ctx.author(FILES, Vec::new());
    let package = ctx.pack(&declaration);
    assert!(package.exists());
    assert!(!ctx.path("hello.carton.tmp").exists());

    let output = ctx.run(&["inspect", package.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello 0.1.0"));
    assert!(stdout.contains("Example Corp"));
    assert!(stdout.contains("lib/hello.jar"));

    let output = ctx.run(&["verify", package.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("2 entries OK"));
}

#[test]
fn test_pack_fails_on_changed_payload() {
    let ctx = TestContext::new();
    let declaration = ctx.author(FILES, Vec::new());
    fs::write(ctx.path("payload/lib/hello.jar"), b"tampered").unwrap();

    let output = ctx.run(&[
        "pack",
        "--declaration",
        declaration.to_str().unwrap(),
        "--from",
        ctx.path("payload").to_str().unwrap(),
        "--output",
        ctx.path("hello.carton").to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(!ctx.path("hello.carton").exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("hash mismatch"));
}

#[test]
fn test_unpack_layout() {
    let ctx = TestContext::new();
    let package = ctx.pack(&ctx.author(FILES, Vec::new()));
    let out = ctx.path("out");

    let output = ctx.run(&["unpack", package.to_str().unwrap(), out.to_str().unwrap()]);
    assert!(output.status.success());

    assert_eq!(fs::read(out.join("lib/hello.jar")).unwrap(), b"hello classes");
    assert_eq!(fs::read(out.join("meta/LICENSE")).unwrap(), b"MIT");
    assert!(out.join("META-INF/CARTON/PACKAGE.XML").is_file());
}

#[test]
fn test_hash_command() {
    let ctx = TestContext::new();
    let file = ctx.path("empty.txt");
    fs::write(&file, b"").unwrap();

    let output = ctx.run(&["hash", file.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stdout)
            .starts_with("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
    );

    let output = ctx.run(&["hash", "--algorithm", "md5", file.to_str().unwrap()]);
    assert!(!output.status.success());
}

fn jdk_tarball() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let data = b"#!/bin/java";
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "jdk-21/bin/java", &data[..])
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_runtime_download() {
    let body = jdk_tarball();
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/jdk.tar.gz")
        .with_body(&body)
        .expect(1)
        .create();

    let ctx = TestContext::new();
    let platform = Platform::current();
    let runtime = RuntimeRequirement {
        os: platform.os,
        arch: platform.arch,
        format: RuntimeFormat::TarGz,
        version: Some("21".into()),
        url: format!("{}/jdk.tar.gz", server.url()),
        hash: Hash::compute(HashAlgorithm::Sha256, body.as_slice()).unwrap(),
    };
    let package = ctx.pack(&ctx.author(FILES, vec![runtime]));
    let cache = ctx.path("cache");

    for _ in 0..2 {
        let output = ctx
            .carton_cmd()
            .args(["runtime", package.to_str().unwrap()])
            .env("CARTON_CACHE_DIR", &cache)
            .output()
            .expect("failed to run carton");
        assert!(
            output.status.success(),
            "runtime failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.trim(), cache.join("jdk").display().to_string());
    }

    mock.assert();
    assert!(cache.join("jdk/bin/java").is_file());
}

#[test]
fn test_runtime_missing_for_platform() {
    let ctx = TestContext::new();
    let package = ctx.pack(&ctx.author(FILES, Vec::new()));

    let output = ctx.run(&["runtime", package.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no runtime"));
}
