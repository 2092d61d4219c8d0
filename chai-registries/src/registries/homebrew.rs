use serde::{Deserialize, Serialize};

use crate::{DependencyType, NormalizedPackage, Registry, Result, UrlType};

use super::Normalizer;
use super::helpers::{decode, null_as_empty, require, string_field};

/// A formula as served by the Homebrew JSON API, flattened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomebrewFormula {
    pub formula: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub version: Option<String>,
    pub homepage: Option<String>,
    pub source: Option<String>,
    pub repository: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub dependencies: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub build_dependencies: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub test_dependencies: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub recommended_dependencies: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub optional_dependencies: Vec<String>,
}

#[derive(Debug)]
pub struct HomebrewNormalizer;

impl HomebrewNormalizer {
    pub fn normalize_formula(
        &self,
        record: &serde_json::Value,
        formula: &HomebrewFormula,
    ) -> Result<NormalizedPackage> {
        let name = require(Registry::Homebrew, record, "formula", formula.formula.as_deref())?;

        let mut pkg = NormalizedPackage::new(Registry::Homebrew, name, name);
        pkg.readme.clone_from(&formula.description);
        for (key, value) in [("version", &formula.version), ("license", &formula.license)] {
            if let Some(v) = value {
                pkg.metadata.insert(key.into(), serde_json::Value::from(v.as_str()));
            }
        }

        pkg.push_url(formula.homepage.as_deref(), UrlType::Homepage);
        pkg.push_url(formula.source.as_deref(), UrlType::Source);
        pkg.push_url(formula.repository.as_deref(), UrlType::Repository);

        let lists = [
            (&formula.dependencies, DependencyType::Runtime),
            (&formula.build_dependencies, DependencyType::Build),
            (&formula.test_dependencies, DependencyType::Test),
            (&formula.recommended_dependencies, DependencyType::Recommended),
            (&formula.optional_dependencies, DependencyType::Optional),
        ];
        for (names, dep_type) in lists {
            pkg.push_dependencies(names.iter().map(String::as_str), dep_type);
        }

        Ok(pkg)
    }
}

impl Normalizer for HomebrewNormalizer {
    fn registry(&self) -> Registry {
        Registry::Homebrew
    }

    fn normalize(&self, record: &serde_json::Value) -> Result<NormalizedPackage> {
        let formula: HomebrewFormula = decode(Registry::Homebrew, record)?;
        self.normalize_formula(record, &formula)
    }

    fn import_id_hint(&self, record: &serde_json::Value) -> Option<String> {
        string_field(record, "formula").map(str::to_string)
    }
}
