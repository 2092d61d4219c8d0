use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DependencyType, NormalizedPackage, Registry, Result, UrlType};

use super::Normalizer;
use super::helpers::{decode, null_as_empty, require, string_field};

/// The `latest` manifest of an npm package, as returned by the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NpmRecord {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<NpmRepository>,
    #[serde(deserialize_with = "null_as_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
}

/// `repository` is either a bare string or `{ "type": "git", "url": "…" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NpmRepository {
    Url(String),
    Object {
        #[serde(default, rename = "type")]
        kind: Option<String>,
        url: String,
    },
}

impl NpmRepository {
    /// Browsable URL: strips `git+`, expands `github:owner/repo` shorthand.
    pub fn normalized_url(&self) -> String {
        let raw = match self {
            Self::Url(url) | Self::Object { url, .. } => url.trim(),
        };
        if let Some(rest) = raw.strip_prefix("github:") {
            return format!("https://github.com/{rest}");
        }
        raw.strip_prefix("git+").unwrap_or(raw).to_string()
    }
}

#[derive(Debug)]
pub struct NpmNormalizer;

impl NpmNormalizer {
    pub fn normalize_manifest(
        &self,
        record: &serde_json::Value,
        manifest: &NpmRecord,
    ) -> Result<NormalizedPackage> {
        let name = require(Registry::Npm, record, "name", manifest.name.as_deref())?;
        let version = require(Registry::Npm, record, "version", manifest.version.as_deref())?;

        let mut pkg = NormalizedPackage::new(Registry::Npm, name, name);
        pkg.readme.clone_from(&manifest.description);
        pkg.metadata
            .insert("version".into(), serde_json::Value::from(version));
        if let Some(license) = &manifest.license {
            pkg.metadata
                .insert("license".into(), serde_json::Value::from(license.as_str()));
        }

        pkg.push_url(manifest.homepage.as_deref(), UrlType::Homepage);
        let repository = manifest.repository.as_ref().map(NpmRepository::normalized_url);
        pkg.push_url(repository.as_deref(), UrlType::Repository);

        let maps = [
            (&manifest.dependencies, DependencyType::Runtime),
            (&manifest.peer_dependencies, DependencyType::Runtime),
            (&manifest.dev_dependencies, DependencyType::Development),
            (&manifest.optional_dependencies, DependencyType::Optional),
        ];
        for (deps, dep_type) in maps {
            pkg.push_dependencies(deps.keys().map(String::as_str), dep_type);
        }

        Ok(pkg)
    }
}

impl Normalizer for NpmNormalizer {
    fn registry(&self) -> Registry {
        Registry::Npm
    }

    fn normalize(&self, record: &serde_json::Value) -> Result<NormalizedPackage> {
        let manifest: NpmRecord = decode(Registry::Npm, record)?;
        self.normalize_manifest(record, &manifest)
    }

    fn import_id_hint(&self, record: &serde_json::Value) -> Option<String> {
        string_field(record, "name").map(str::to_string)
    }
}
