// Integration test utilities and registry fixtures for CHAI.

use std::sync::Once;

use chai_core::config::ChaiConfig;
use chai_core::pipeline::{IngestPipeline, IngestStats};
use chai_core::store::MemoryStore;
use chai_registries::{NormalizerRegistry, Registry};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process. Honors `RUST_LOG`, defaulting
/// to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Pipeline for `registry` with the given config.
pub fn pipeline(registry: Registry, config: ChaiConfig) -> anyhow::Result<IngestPipeline> {
    let normalizer = NormalizerRegistry::new()
        .get(registry)
        .ok_or_else(|| anyhow::anyhow!("no normalizer for {registry}"))?;
    Ok(IngestPipeline::new(normalizer, config))
}

/// Ingest `records` into `store` with the default config.
pub async fn ingest(
    store: &MemoryStore,
    registry: Registry,
    records: &[Value],
) -> anyhow::Result<IngestStats> {
    let stats = pipeline(registry, ChaiConfig::default())?
        .run(store, records)
        .await?;
    Ok(stats)
}

/// Fixture batch for `registry`. Every batch is self-contained: each
/// dependency names a package in the same batch, except where noted.
pub fn fixture(registry: Registry) -> Vec<Value> {
    match registry {
        Registry::Crates => crates_batch(),
        Registry::Homebrew => homebrew_batch(),
        Registry::Debian => debian_batch(),
        Registry::Pkgx => pkgx_batch(),
        Registry::Npm => npm_batch(),
    }
}

/// serde (1) ← `serde_json` (2), tokio (3) dev-depends on serde.
pub fn crates_batch() -> Vec<Value> {
    vec![
        json!({
            "id": 1,
            "name": "serde",
            "readme": "A generic serialization framework",
            "homepage": "https://serde.rs",
            "repository": "https://github.com/serde-rs/serde",
            "documentation": "https://docs.rs/serde",
            "latest_version": { "num": "1.0.210", "license": "MIT OR Apache-2.0", "dependencies": [] }
        }),
        json!({
            "id": 2,
            "name": "serde_json",
            "repository": "https://github.com/serde-rs/json",
            "latest_version": {
                "num": "1.0.128",
                "dependencies": [{ "dependency_id": 1, "kind": "normal" }]
            }
        }),
        json!({
            "id": 3,
            "name": "tokio",
            "homepage": "https://tokio.rs",
            "latest_version": {
                "num": "1.40.0",
                "dependencies": [
                    { "dependency_id": 1, "kind": "dev" },
                    { "dependency_id": 2, "kind": "dev" }
                ]
            }
        }),
    ]
}

/// wget and curl depend on openssl@3, which depends on ca-certificates.
/// wget also names libidn2, which the batch does not contain.
pub fn homebrew_batch() -> Vec<Value> {
    vec![
        json!({
            "formula": "wget",
            "description": "Internet file retriever",
            "license": "GPL-3.0-or-later",
            "version": "1.24.5",
            "homepage": "https://www.gnu.org/software/wget/",
            "source": "https://ftp.gnu.org/gnu/wget/wget-1.24.5.tar.gz",
            "dependencies": ["openssl@3", "libidn2"],
            "build_dependencies": ["pkgconf"]
        }),
        json!({
            "formula": "curl",
            "description": "Get a file from an HTTP, HTTPS or FTP server",
            "homepage": "https://curl.se",
            "repository": "https://github.com/curl/curl",
            "dependencies": ["openssl@3"],
            "build_dependencies": ["pkgconf"]
        }),
        json!({
            "formula": "openssl@3",
            "description": "Cryptography and SSL/TLS Toolkit",
            "homepage": "https://openssl-library.org",
            "dependencies": ["ca-certificates"]
        }),
        json!({ "formula": "ca-certificates", "homepage": "https://curl.se/docs/caextract.html" }),
        json!({ "formula": "pkgconf", "homepage": "https://github.com/pkgconf/pkgconf" }),
    ]
}

/// A binary and a source paragraph for curl, plus libc6 and libssl3.
pub fn debian_batch() -> Vec<Value> {
    vec![
        json!({
            "package": "curl",
            "version": "8.5.0-2",
            "description": "command line tool for transferring data with URL syntax",
            "homepage": "https://curl.se/",
            "vcs_git": "https://github.com/curl/curl.git",
            "depends": [{ "package": "libc6" }, { "package": "libssl3" }]
        }),
        json!({
            "package": "curl",
            "version": "8.5.0-2",
            "description": "command line tool for transferring data with URL syntax",
            "build_depends": [{ "package": "libssl3" }]
        }),
        json!({ "package": "libc6", "version": "2.37-12", "description": "GNU C Library" }),
        json!({
            "package": "libssl3",
            "version": "3.0.13-1",
            "description": "Secure Sockets Layer toolkit",
            "vcs_browser": "https://salsa.debian.org/debian/openssl",
            "depends": [{ "package": "libc6" }]
        }),
    ]
}

pub fn pkgx_batch() -> Vec<Value> {
    vec![
        json!({
            "project": "curl.se",
            "homepage": "https://curl.se",
            "distributable": [{ "url": "https://curl.se/download/curl-{{version}}.tar.bz2" }],
            "versions": { "github": "curl/curl" },
            "dependencies": [
                { "platform": "all", "dependencies": [{ "name": "openssl.org", "semver": "^1.1" }] }
            ],
            "build": {
                "dependencies": [
                    { "platform": "all", "dependencies": [{ "name": "gnu.org/make", "semver": "*" }] }
                ]
            }
        }),
        json!({ "project": "openssl.org", "homepage": "https://www.openssl.org" }),
        json!({ "project": "gnu.org/make", "homepage": "https://www.gnu.org/software/make/" }),
    ]
}

pub fn npm_batch() -> Vec<Value> {
    vec![
        json!({
            "name": "express",
            "version": "4.21.0",
            "description": "Fast, unopinionated, minimalist web framework",
            "license": "MIT",
            "homepage": "http://expressjs.com/",
            "repository": { "type": "git", "url": "git+https://github.com/expressjs/express.git" },
            "dependencies": { "debug": "2.6.9", "qs": "6.13.0" },
            "devDependencies": { "mocha": "10.7.3" }
        }),
        json!({ "name": "debug", "version": "2.6.9", "repository": "github:debug-js/debug" }),
        json!({ "name": "qs", "version": "6.13.0" }),
        json!({ "name": "mocha", "version": "10.7.3" }),
    ]
}
