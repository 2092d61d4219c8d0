use serde::{Deserialize, Serialize};

use crate::{DependencyType, NormalizedPackage, Registry, Result, UrlType};

use super::Normalizer;
use super::helpers::{decode, is_github_url, null_as_empty, require, string_field};

/// A paragraph from a Debian `Packages`/`Sources` index, already parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebianRecord {
    pub package: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub vcs_git: Option<String>,
    pub vcs_browser: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub depends: Vec<DebianDepends>,
    #[serde(deserialize_with = "null_as_empty")]
    pub build_depends: Vec<DebianDepends>,
    #[serde(deserialize_with = "null_as_empty")]
    pub recommends: Vec<DebianDepends>,
    #[serde(deserialize_with = "null_as_empty")]
    pub suggests: Vec<DebianDepends>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebianDepends {
    pub package: String,
    pub semver: Option<String>,
}

/// Debian import ids live under a `debian/` prefix.
pub fn debian_import_id(package: &str) -> String {
    format!("debian/{package}")
}

#[derive(Debug)]
pub struct DebianNormalizer;

impl DebianNormalizer {
    pub fn normalize_paragraph(
        &self,
        record: &serde_json::Value,
        data: &DebianRecord,
    ) -> Result<NormalizedPackage> {
        let name = require(Registry::Debian, record, "package", data.package.as_deref())?;

        let mut pkg = NormalizedPackage::new(Registry::Debian, debian_import_id(name), name);
        pkg.readme.clone_from(&data.description);
        if let Some(version) = &data.version {
            pkg.metadata
                .insert("version".into(), serde_json::Value::from(version.as_str()));
        }

        pkg.push_url(data.homepage.as_deref(), UrlType::Homepage);
        let vcs = data.vcs_git.as_deref().or(data.vcs_browser.as_deref());
        pkg.push_url(vcs, UrlType::Source);
        if is_github_url(vcs) {
            pkg.push_url(vcs, UrlType::Repository);
        }

        // Recommends and Suggests are treated as runtime edges, matching how the
        // catalog has always recorded them.
        let lists = [
            (&data.depends, DependencyType::Runtime),
            (&data.build_depends, DependencyType::Build),
            (&data.recommends, DependencyType::Runtime),
            (&data.suggests, DependencyType::Runtime),
        ];
        for (deps, dep_type) in lists {
            let ids: Vec<String> = deps
                .iter()
                .filter(|d| !d.package.trim().is_empty())
                .map(|d| debian_import_id(d.package.trim()))
                .collect();
            pkg.push_dependencies(ids.iter().map(String::as_str), dep_type);
        }

        Ok(pkg)
    }
}

impl Normalizer for DebianNormalizer {
    fn registry(&self) -> Registry {
        Registry::Debian
    }

    fn normalize(&self, record: &serde_json::Value) -> Result<NormalizedPackage> {
        let data: DebianRecord = decode(Registry::Debian, record)?;
        self.normalize_paragraph(record, &data)
    }

    fn import_id_hint(&self, record: &serde_json::Value) -> Option<String> {
        string_field(record, "package").map(debian_import_id)
    }
}
