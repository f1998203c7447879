//! Bundle and template data models.
//!
//! A [`Bundle`] is the portable, order-independent collection of [`Template`]s
//! captured from a source catalog. Templates are keyed by the source
//! environment's item id (`owner_id`) and carry the placeholder-bearing
//! documents needed to recreate the item elsewhere.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "metadata": { "version": 1, "resourceStorageItemId": "f00d..." },
//!   "templates": [
//!     {
//!       "itemId": "abc",
//!       "type": "Web Map",
//!       "key": "i1a2b3c4",
//!       "item": { "id": "{{abc.id}}", "title": "Parcels" },
//!       "data": { "operationalLayers": [] },
//!       "resources": [],
//!       "dependencies": ["def"],
//!       "estimatedDeploymentCostFactor": 2
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::core::{ItemKind, Result, SolutionError};

/// Bundle format version written by this crate.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Reference to a binary resource (thumbnail, attachment) stored alongside the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// Path of the resource inside the storage item.
    pub path: String,
    /// Original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A captured, placeholder-bearing representation of one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Source-environment identifier.
    #[serde(rename = "itemId")]
    pub owner_id: String,
    /// Catalog item type.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Short local handle, generated once and stable for the template's lifetime.
    pub key: String,
    /// Item description document.
    #[serde(rename = "item")]
    pub base_doc: Value,
    /// Item data document, when the item has one.
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub data_doc: Option<Value>,
    /// Binary resources stored with the bundle.
    #[serde(rename = "resources", default)]
    pub resource_refs: Vec<ResourceRef>,
    /// Source ids of the templates this one must be deployed after.
    #[serde(rename = "dependencies", default)]
    pub dependency_ids: Vec<String>,
    /// Kind specific extras; for composites this holds the service definition
    /// and its `layers`/`tables`.
    #[serde(rename = "properties", default, skip_serializing_if = "Option::is_none")]
    pub extra_props: Option<Value>,
    /// Relative deployment cost used for progress accounting.
    #[serde(rename = "estimatedDeploymentCostFactor", default = "default_cost_factor")]
    pub estimated_cost_factor: u32,
}

fn default_cost_factor() -> u32 {
    1
}

impl Template {
    /// Create a template for a freshly captured item with a new key.
    pub fn new(owner_id: impl Into<String>, kind: ItemKind, base_doc: Value) -> Self {
        Self {
            owner_id: owner_id.into(),
            kind,
            key: generate_key(),
            base_doc,
            data_doc: None,
            resource_refs: Vec::new(),
            dependency_ids: Vec::new(),
            extra_props: None,
            estimated_cost_factor: default_cost_factor(),
        }
    }

    /// Builder-style helper setting the dependency ids.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependency_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper setting the data document.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data_doc = Some(data);
        self
    }

    /// Builder-style helper setting the kind specific properties.
    #[must_use]
    pub fn with_properties(mut self, props: Value) -> Self {
        self.extra_props = Some(props);
        self
    }

    /// Title from the item document, falling back to the owner id.
    pub fn title(&self) -> &str {
        self.base_doc.get("title").and_then(Value::as_str).unwrap_or(&self.owner_id)
    }

    /// Service name from the item document, used to match view sources.
    pub fn name(&self) -> Option<&str> {
        self.base_doc.get("name").and_then(Value::as_str)
    }

    /// Whether the composite item is a view over other services.
    pub fn is_view(&self) -> bool {
        let from_props = self
            .extra_props
            .as_ref()
            .and_then(|p| p.pointer("/service/isView"))
            .and_then(Value::as_bool);
        let from_keywords = self
            .base_doc
            .get("typeKeywords")
            .and_then(Value::as_array)
            .is_some_and(|kw| kw.iter().any(|k| k.as_str() == Some("View Service")));
        from_props.unwrap_or(false) || from_keywords
    }
}

/// Generate a short collision-resistant local handle, e.g. `i4f1c2a9b`.
pub fn generate_key() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("i{}", &id[..8])
}

/// Bundle-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Format version of the bundle.
    pub version: u32,
    /// Item holding the bundle's binary resources, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_storage_item_id: Option<String>,
}

impl Default for BundleMetadata {
    fn default() -> Self {
        Self {
            version: BUNDLE_FORMAT_VERSION,
            resource_storage_item_id: None,
        }
    }
}

/// The full set of templates needed to recreate a group of related items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Bundle metadata.
    #[serde(default)]
    pub metadata: BundleMetadata,
    /// Templates, in no particular order.
    pub templates: Vec<Template>,
}

impl Bundle {
    /// Create a bundle from templates with default metadata.
    pub fn new(templates: Vec<Template>) -> Self {
        Self {
            metadata: BundleMetadata::default(),
            templates,
        }
    }

    /// Find a template by its source id.
    pub fn get(&self, owner_id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.owner_id == owner_id)
    }

    /// Sum of the templates' estimated cost factors.
    pub fn total_cost(&self) -> u64 {
        self.templates.iter().map(|t| u64::from(t.estimated_cost_factor)).sum()
    }

    /// Check that every dependency resolves inside the bundle and owner ids are unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for template in &self.templates {
            if !seen.insert(template.owner_id.as_str()) {
                return Err(SolutionError::malformed(
                    &template.owner_id,
                    "owner id appears more than once in the bundle",
                ));
            }
        }
        for template in &self.templates {
            for dep in &template.dependency_ids {
                if !seen.contains(dep.as_str()) {
                    return Err(SolutionError::malformed(
                        &template.owner_id,
                        format!("dependency '{dep}' is not part of the bundle"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Load a bundle from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| SolutionError::BundleParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Write the bundle as pretty JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        crate::utils::fs::write_json(path, self).await
    }
}
