use serde::{Deserialize, Serialize};

use crate::{DependencyType, NormalizedPackage, Registry, Result, UrlType};

use super::Normalizer;
use super::helpers::{decode, null_as_empty, require, string_field};

/// A pantry `package.yml`, decoded into dependency blocks per platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PkgxRecord {
    /// Project path, e.g. `gnu.org/wget`.
    pub project: Option<String>,
    pub homepage: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub distributable: Vec<Distributable>,
    pub versions: Option<PkgxVersions>,
    #[serde(deserialize_with = "null_as_empty")]
    pub dependencies: Vec<DependencyBlock>,
    pub build: Option<PkgxStage>,
    pub test: Option<PkgxStage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Distributable {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PkgxVersions {
    /// `owner/repo` on GitHub, when versions are tracked from releases.
    pub github: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PkgxStage {
    #[serde(deserialize_with = "null_as_empty")]
    pub dependencies: Vec<DependencyBlock>,
}

/// Dependencies that apply on one platform (`all`, `darwin`, `linux/x86-64`, …).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyBlock {
    pub platform: String,
    pub dependencies: Vec<PkgxDependency>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PkgxDependency {
    pub name: String,
    pub semver: String,
}

fn block_names(blocks: &[DependencyBlock]) -> impl Iterator<Item = &str> {
    blocks
        .iter()
        .flat_map(|b| b.dependencies.iter().map(|d| d.name.as_str()))
}

#[derive(Debug)]
pub struct PkgxNormalizer;

impl PkgxNormalizer {
    pub fn normalize_pantry(
        &self,
        record: &serde_json::Value,
        data: &PkgxRecord,
    ) -> Result<NormalizedPackage> {
        let project = require(Registry::Pkgx, record, "project", data.project.as_deref())?;

        // The pantry carries no description.
        let mut pkg = NormalizedPackage::new(Registry::Pkgx, project, project);

        pkg.push_url(data.homepage.as_deref(), UrlType::Homepage);
        pkg.push_url(
            data.distributable.first().map(|d| d.url.as_str()),
            UrlType::Source,
        );
        let github = data
            .versions
            .as_ref()
            .and_then(|v| v.github.as_deref())
            .map(|repo| format!("https://github.com/{}", repo.trim_matches('/')));
        pkg.push_url(github.as_deref(), UrlType::Repository);

        pkg.push_dependencies(block_names(&data.dependencies), DependencyType::Runtime);
        if let Some(build) = &data.build {
            pkg.push_dependencies(block_names(&build.dependencies), DependencyType::Build);
        }
        if let Some(test) = &data.test {
            pkg.push_dependencies(block_names(&test.dependencies), DependencyType::Test);
        }

        Ok(pkg)
    }
}

impl Normalizer for PkgxNormalizer {
    fn registry(&self) -> Registry {
        Registry::Pkgx
    }

    fn normalize(&self, record: &serde_json::Value) -> Result<NormalizedPackage> {
        let data: PkgxRecord = decode(Registry::Pkgx, record)?;
        self.normalize_pantry(record, &data)
    }

    fn import_id_hint(&self, record: &serde_json::Value) -> Option<String> {
        string_field(record, "project").map(str::to_string)
    }
}
