pub mod registries;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use registries::{Normalizer, NormalizerRegistry};

/// Error type for the normalizers.
#[derive(thiserror::Error, Debug)]
pub enum NormalizeError {
    /// A record is missing (or carries an unusable) identity field.
    #[error("Malformed {registry} record {record}: {reason}")]
    MalformedRecord {
        registry: Registry,
        /// Best-effort identifier of the offending record (`<unknown>` if none).
        record: String,
        reason: String,
    },

    #[error("Unknown registry: {0}")]
    UnknownRegistry(String),
}

pub type Result<T> = std::result::Result<T, NormalizeError>;

// ── Registries ─────────────────────────────────────────────────────

/// Upstream package manager a record was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registry {
    Crates,
    Homebrew,
    Debian,
    Pkgx,
    Npm,
}

impl Registry {
    pub const ALL: [Self; 5] = [
        Self::Crates,
        Self::Homebrew,
        Self::Debian,
        Self::Pkgx,
        Self::Npm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crates => "crates",
            Self::Homebrew => "homebrew",
            Self::Debian => "debian",
            Self::Pkgx => "pkgx",
            Self::Npm => "npm",
        }
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Registry {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| NormalizeError::UnknownRegistry(s.to_string()))
    }
}

// ── Dependency types ───────────────────────────────────────────────

/// Normalized dependency type shared by every registry.
///
/// Ordering follows priority: `Runtime` is the greatest value and
/// `Recommended` the least, so `max()` over a set of claims yields the
/// canonical type for an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Runtime,
    Build,
    Test,
    Development,
    Optional,
    Recommended,
}

impl DependencyType {
    /// All types, highest priority first.
    pub const ALL: [Self; 6] = [
        Self::Runtime,
        Self::Build,
        Self::Test,
        Self::Development,
        Self::Optional,
        Self::Recommended,
    ];

    /// Priority rank, 1 = highest (`Runtime`), 6 = lowest (`Recommended`).
    pub fn priority(self) -> u8 {
        match self {
            Self::Runtime => 1,
            Self::Build => 2,
            Self::Test => 3,
            Self::Development => 4,
            Self::Optional => 5,
            Self::Recommended => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::Build => "build",
            Self::Test => "test",
            Self::Development => "development",
            Self::Optional => "optional",
            Self::Recommended => "recommended",
        }
    }
}

impl Ord for DependencyType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.priority().cmp(&self.priority())
    }
}

impl PartialOrd for DependencyType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── URL roles ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlType {
    Homepage,
    Repository,
    Documentation,
    Source,
}

impl UrlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Homepage => "homepage",
            Self::Repository => "repository",
            Self::Documentation => "documentation",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for UrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Normalized output ──────────────────────────────────────────────

/// A URL a package exposes, keyed the same way the catalog keys URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UrlClaim {
    pub url: String,
    pub url_type: UrlType,
}

/// One raw "depends on" statement. Several claims may name the same dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyClaim {
    /// The dependency's `import_id` within the same registry namespace.
    pub name: String,
    pub dependency_type: DependencyType,
}

/// Registry-agnostic view of one fetched record.
///
/// Links are implied: every entry in `urls` is a URL this package exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPackage {
    pub registry: Registry,
    pub import_id: String,
    pub name: String,
    /// `<registry>/<name>`, stable across registries.
    pub derived_id: String,
    pub readme: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub urls: Vec<UrlClaim>,
    pub dependencies: Vec<DependencyClaim>,
}

impl NormalizedPackage {
    pub fn new(registry: Registry, import_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            registry,
            import_id: import_id.into(),
            derived_id: format!("{registry}/{name}"),
            name,
            readme: None,
            metadata: BTreeMap::new(),
            urls: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Add a URL claim, ignoring blank URLs and exact duplicates.
    pub fn push_url(&mut self, url: Option<&str>, url_type: UrlType) {
        let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            return;
        };
        let claim = UrlClaim {
            url: url.to_string(),
            url_type,
        };
        if !self.urls.contains(&claim) {
            self.urls.push(claim);
        }
    }

    /// Add dependency claims of one type, skipping empty names.
    pub fn push_dependencies<'a, I>(&mut self, names: I, dependency_type: DependencyType)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            self.dependencies.push(DependencyClaim {
                name: name.to_string(),
                dependency_type,
            });
        }
    }
}
