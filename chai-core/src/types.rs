use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use chai_registries::{DependencyType, Registry, UrlType};

// ── Typed ID wrappers ──────────────────────────────────────────────

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            /// Fresh random id for an entity about to be inserted.
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(PackageId);
typed_id!(UrlId);
typed_id!(PackageUrlId);
typed_id!(DependencyId);

// ── Catalog entities ───────────────────────────────────────────────

/// A package in the catalog, identified by `import_id` within its registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub registry: Registry,
    pub import_id: String,
    /// `<registry>/<name>`.
    pub derived_id: String,
    pub name: String,
    pub readme: Option<String>,
    /// Registry-specific attributes (version, license, …).
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    /// Whether any attribute the diff tracks differs from `other`.
    ///
    /// Ids and timestamps are not tracked.
    pub fn tracked_differs(&self, other: &Self) -> bool {
        self.name != other.name
            || self.derived_id != other.derived_id
            || self.readme != other.readme
            || self.metadata != other.metadata
    }
}

/// Identity key of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UrlKey {
    pub url: String,
    pub url_type: UrlType,
}

impl UrlKey {
    pub fn new(url: impl Into<String>, url_type: UrlType) -> Self {
        Self {
            url: url.into(),
            url_type,
        }
    }
}

impl From<&chai_registries::UrlClaim> for UrlKey {
    fn from(claim: &chai_registries::UrlClaim) -> Self {
        Self::new(claim.url.clone(), claim.url_type)
    }
}

/// A URL. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    pub id: UrlId,
    pub url: String,
    pub url_type: UrlType,
    pub created_at: DateTime<Utc>,
}

impl Url {
    pub fn key(&self) -> UrlKey {
        UrlKey::new(self.url.clone(), self.url_type)
    }
}

/// "Package P exposes URL U".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUrl {
    pub id: PackageUrlId,
    pub package_id: PackageId,
    pub url_id: UrlId,
    pub created_at: DateTime<Utc>,
}

impl PackageUrl {
    pub fn key(&self) -> (PackageId, UrlId) {
        (self.package_id, self.url_id)
    }
}

/// Identity of a dependency edge: `(dependent, dependency)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub package_id: PackageId,
    pub dependency_id: PackageId,
}

/// A directed dependency edge: `package_id` depends on `dependency_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyDependency {
    pub id: DependencyId,
    pub package_id: PackageId,
    pub dependency_id: PackageId,
    pub dependency_type: DependencyType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LegacyDependency {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            package_id: self.package_id,
            dependency_id: self.dependency_id,
        }
    }

    pub fn is_self_edge(&self) -> bool {
        self.package_id == self.dependency_id
    }
}

/// Raw catalog contents as read by a store, before indexing into a
/// [`Cache`](crate::cache::Cache).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub packages: Vec<Package>,
    pub urls: Vec<Url>,
    pub package_urls: Vec<PackageUrl>,
    pub dependencies: Vec<LegacyDependency>,
}

// ── Entity kinds ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Package,
    Url,
    PackageUrl,
    Dependency,
}

impl EntityKind {
    /// Order in which inserts and updates must be applied. Deletes apply in
    /// reverse, so no entity ever references a row that is not there.
    pub const APPLY_ORDER: [Self; 4] = [Self::Package, Self::Url, Self::PackageUrl, Self::Dependency];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Url => "url",
            Self::PackageUrl => "package_url",
            Self::Dependency => "dependency",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
