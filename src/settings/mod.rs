//! Deployment settings registry.
//!
//! The [`SettingsRegistry`] maps each source item id to the identity its copy
//! received in the destination catalog, plus the per-layer field rename maps
//! read back from deployed services. It is the one piece of state shared
//! across items during a deployment run.
//!
//! # Discipline
//!
//! - Each item owns exactly one key and [`register`](SettingsRegistry::register)s
//!   it once, right after the item is created. Registering a key twice fails.
//! - Entries are merge-only: field rename maps are added or extended, never
//!   removed mid-run.
//! - Items only read the settled keys of their dependencies, which the
//!   topological order guarantees are complete.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::{Result, SolutionError};

/// Lower-cased original field name → field name as deployed.
pub type FieldRenameMap = BTreeMap<String, String>;

/// Layer id → field rename map for that layer.
pub type LayerFieldInfos = BTreeMap<i64, FieldRenameMap>;

/// Redeployed identity of one source item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSettings {
    /// Id assigned by the destination catalog.
    pub new_id: String,
    /// Url of the deployed copy, for services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_url: Option<String>,
    /// Name of the deployed copy, for services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    /// Field rename maps of the deployed layers and tables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_infos: LayerFieldInfos,
    /// Field settings of the services a view draws from, keyed by source id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_field_infos: BTreeMap<String, LayerFieldInfos>,
    /// Backend-assigned id of each sub-part, keyed by its captured local id.
    /// Only recorded when the two differ.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub part_ids: BTreeMap<i64, i64>,
}

impl ItemSettings {
    /// Settings for a created item with only its new id.
    pub fn new(new_id: impl Into<String>) -> Self {
        Self {
            new_id: new_id.into(),
            ..Self::default()
        }
    }

    /// Builder-style helper setting the url.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.new_url = Some(url.into());
        self
    }

    /// Builder-style helper setting the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.new_name = Some(name.into());
        self
    }

    /// Deployed name of a layer field, addressed by its lower-cased original name.
    pub fn field_name(&self, layer_id: i64, lowercase_name: &str) -> Option<&str> {
        self.field_infos.get(&layer_id)?.get(lowercase_name).map(String::as_str)
    }

    /// Deployed id of the sub-part captured as `local_id`.
    pub fn part_id(&self, local_id: i64) -> i64 {
        self.part_ids.get(&local_id).copied().unwrap_or(local_id)
    }
}

/// Run-time map from original item id to its redeployed identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsRegistry {
    /// Per-item settings.
    #[serde(default)]
    items: BTreeMap<String, ItemSettings>,
    /// Deployment-wide values resolving literal placeholder paths
    /// (`organization.helperServices.geometry.url`).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    globals: Value,
}

impl SettingsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry resolving literal paths against `globals`.
    pub fn with_globals(globals: Value) -> Self {
        Self {
            items: BTreeMap::new(),
            globals,
        }
    }

    /// Deployment-wide settings tree.
    pub fn globals(&self) -> &Value {
        &self.globals
    }

    /// Record the settings of a newly created item.
    ///
    /// Fails when the key was already written: every item writes exactly one key.
    pub fn register(&mut self, owner_id: &str, settings: ItemSettings) -> Result<()> {
        if self.items.contains_key(owner_id) {
            return Err(SolutionError::malformed(
                owner_id,
                "settings for this item were already registered in this deployment",
            ));
        }
        tracing::debug!("Registered settings for {} → {}", owner_id, settings.new_id);
        self.items.insert(owner_id.to_string(), settings);
        Ok(())
    }

    /// Settled settings of an item.
    pub fn get(&self, owner_id: &str) -> Option<&ItemSettings> {
        self.items.get(owner_id)
    }

    /// Whether the item has been registered.
    pub fn contains(&self, owner_id: &str) -> bool {
        self.items.contains_key(owner_id)
    }

    /// Registered source ids.
    pub fn owner_ids(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Merge a layer's field rename map into an item's entry.
    ///
    /// Existing entries for the same field are overwritten with the newer read-back,
    /// others are kept.
    pub fn merge_field_infos(
        &mut self,
        owner_id: &str,
        layer_id: i64,
        renames: FieldRenameMap,
    ) -> Result<()> {
        let entry = self.items.get_mut(owner_id).ok_or_else(|| {
            SolutionError::malformed(owner_id, "field infos merged before the item was registered")
        })?;
        entry.field_infos.entry(layer_id).or_default().extend(renames);
        Ok(())
    }

    /// Copy the settled field settings of a view's sources into the view's entry.
    ///
    /// Must run after every source's own assembly completed; a source without a
    /// registered entry is an error.
    pub fn inherit_source_field_infos(&mut self, view_owner_id: &str, sources: &[String]) -> Result<()> {
        let mut inherited = BTreeMap::new();
        for source in sources {
            let settings = self.items.get(source).ok_or_else(|| {
                SolutionError::malformed(
                    view_owner_id,
                    format!("source service '{source}' has not been deployed before the view"),
                )
            })?;
            inherited.insert(source.clone(), settings.field_infos.clone());
        }
        let entry = self.items.get_mut(view_owner_id).ok_or_else(|| {
            SolutionError::malformed(view_owner_id, "view settings are not registered")
        })?;
        entry.source_field_infos.extend(inherited);
        Ok(())
    }

    /// Record the ids the backend assigned to a composite's sub-parts.
    ///
    /// Only renumbered parts are kept; a part deployed under its local id
    /// needs no entry.
    pub fn record_part_ids(&mut self, owner_id: &str, assigned: &BTreeMap<i64, i64>) -> Result<()> {
        let entry = self.items.get_mut(owner_id).ok_or_else(|| {
            SolutionError::malformed(owner_id, "part ids recorded before the item was registered")
        })?;
        entry
            .part_ids
            .extend(assigned.iter().filter(|(local, new)| local != new).map(|(l, n)| (*l, *n)));
        Ok(())
    }

    /// Field settings of `source_id` as inherited by a view deployed from it.
    ///
    /// Lets a registry that only holds the view (the source was deployed in an
    /// earlier run) still resolve the source's field placeholders.
    pub fn inherited_field_infos(&self, source_id: &str) -> Option<&LayerFieldInfos> {
        self.items.values().find_map(|settings| settings.source_field_infos.get(source_id))
    }

    /// Load a registry from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| SolutionError::BundleParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Build a layer's rename map from its captured and its deployed field lists.
///
/// Fields are matched case-insensitively; the map records, for each matched
/// source field, the deployed spelling under the lower-cased source name.
/// Source fields with no case-insensitive counterpart are left out, so genuine
/// renames are not resolvable.
///
/// ```rust
/// use serde_json::json;
/// use solution_deployer::settings::build_field_rename_map;
///
/// let map = build_field_rename_map(
///     &[json!({"name": "OwnerName"}), json!({"name": "Gone"})],
///     &[json!({"name": "ownername"})],
/// );
/// assert_eq!(map.get("ownername").map(String::as_str), Some("ownername"));
/// assert!(!map.contains_key("gone"));
/// ```
pub fn build_field_rename_map(source_fields: &[Value], new_fields: &[Value]) -> FieldRenameMap {
    let deployed: Vec<&str> =
        new_fields.iter().filter_map(|f| f.get("name").and_then(Value::as_str)).collect();
    source_fields
        .iter()
        .filter_map(|f| f.get("name").and_then(Value::as_str))
        .filter_map(|source| {
            let key = source.to_lowercase();
            deployed
                .iter()
                .find(|name| name.to_lowercase() == key)
                .map(|name| (key, (*name).to_string()))
        })
        .collect()
}
