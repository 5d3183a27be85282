//! Domain selection
//!
//! A route's external domain is `<name>.<namespace>.<suffix>`, where the suffix
//! comes from an ordered list of `(suffix, selector)` rules. The matching rule
//! with the most selector constraints wins; ties go to the earlier rule.

use std::collections::BTreeMap;
use std::path::Path;

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use lattice_common::crd::Route;

/// Suffix used when no rule matches
pub const DEFAULT_DOMAIN_SUFFIX: &str = "example.com";

/// One domain rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainRule {
    /// Domain suffix, e.g. `example.com`
    pub suffix: String,

    /// Labels the route must carry; empty matches every route
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

impl DomainRule {
    /// Rule matching every route
    pub fn fallback(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            selector: BTreeMap::new(),
        }
    }

    /// Rule restricted to routes carrying all of `selector`
    pub fn selecting<K, V>(
        suffix: impl Into<String>,
        selector: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            suffix: suffix.into(),
            selector: selector
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selector
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Ordered domain rules
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    #[serde(default)]
    pub domains: Vec<DomainRule>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            domains: vec![DomainRule::fallback(DEFAULT_DOMAIN_SUFFIX)],
        }
    }
}

impl DomainConfig {
    pub fn new(domains: Vec<DomainRule>) -> Self {
        Self { domains }
    }

    /// Parse the YAML form
    ///
    /// ```yaml
    /// domains:
    ///   - suffix: example.com
    ///   - suffix: prod.example.com
    ///     selector:
    ///       app: prod
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, lattice_common::Error> {
        let config: Self = serde_yaml::from_str(yaml)?;
        if let Some(rule) = config.domains.iter().find(|r| r.suffix.trim().is_empty()) {
            return Err(lattice_common::Error::validation(format!(
                "domain rule with selector {:?} has an empty suffix",
                rule.selector
            )));
        }
        Ok(config)
    }

    /// Load the YAML form from a file
    pub fn load(path: &Path) -> Result<Self, lattice_common::Error> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            lattice_common::Error::config(path.display().to_string(), e.to_string())
        })?;
        Self::from_yaml(&yaml)
    }

    /// Suffix for a set of route labels
    pub fn suffix_for(&self, labels: &BTreeMap<String, String>) -> &str {
        let mut best: Option<&DomainRule> = None;
        for rule in self.domains.iter().filter(|r| r.matches(labels)) {
            if best.map_or(true, |b| rule.selector.len() > b.selector.len()) {
                best = Some(rule);
            }
        }
        best.map_or(DEFAULT_DOMAIN_SUFFIX, |rule| rule.suffix.as_str())
    }

    /// External domain of a route
    pub fn domain_for(&self, route: &Route) -> String {
        format!(
            "{}.{}.{}",
            route.name_any(),
            route.namespace().unwrap_or_default(),
            self.suffix_for(route.labels())
        )
    }
}
