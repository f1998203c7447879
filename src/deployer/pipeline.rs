//! Serial assembly of composite items.
//!
//! The backend cannot structurally modify one composite from two requests at a
//! time, so sub-parts are added strictly one by one, in ascending local id
//! order. The loop is a fold over the sorted parts carrying three side tables
//! forward:
//!
//! - `field_infos`: the part's source field list plus the field-bearing
//!   properties the backend must not receive before field names are settled
//! - `admin_layer_infos`: view definitions
//! - `popup_infos`: popup configuration from the item's data document
//!
//! The first failed submission ends the fold with
//! [`SolutionError::PartialCompositeFailure`]; parts already added stay added.
//!
//! Once every part is in, the backend's field lists are read back, turned into
//! field rename maps and merged into the [`SettingsRegistry`]. The side tables
//! are then resolved against the completed registry and the deferred
//! definitions applied with one update per part.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::progress::{ProgressReporter, ProgressStatus};
use crate::catalog::CatalogClient;
use crate::constants::PART_BASE_COST;
use crate::core::{RemoteRequestError, Result, SolutionError};
use crate::models::Template;
use crate::settings::{SettingsRegistry, build_field_rename_map};
use crate::templating::composite::{PART_COLLECTIONS, sorted_parts};
use crate::templating::{
    Detemplatizer, DependencySource, layer_id, templatize_admin_layer_info,
};

/// Field-bearing part properties applied only after assembly.
pub const DEFERRED_PROPERTIES: [&str; 7] = [
    "displayField",
    "templates",
    "relationships",
    "drawingInfo",
    "timeInfo",
    "viewDefinitionQuery",
    "types",
];

/// Cached alongside the deferred properties but still sent with the part,
/// because the backend only accepts it at creation.
pub const KEPT_CACHED_PROPERTIES: [&str; 1] = ["editFieldsInfo"];

/// Key of the source field list inside a `field_infos` entry.
pub const SOURCE_FIELDS_KEY: &str = "sourceFields";

/// Per-part caches keyed by pre-deployment local id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideTables {
    /// Source fields and deferred properties.
    pub field_infos: BTreeMap<i64, Map<String, Value>>,
    /// View definitions.
    pub admin_layer_infos: BTreeMap<i64, Value>,
    /// Popup configurations.
    pub popup_infos: BTreeMap<i64, Value>,
}

/// Result of a completed assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyOutcome {
    /// Backend id of each part, by local id.
    pub assigned_ids: BTreeMap<i64, i64>,
    /// Popups resolved against the completed registry, by local id.
    pub resolved_popups: BTreeMap<i64, Value>,
    /// Number of parts added.
    pub parts_added: usize,
}

/// Inputs of one composite's assembly.
pub struct AssemblyContext<'a> {
    /// The composite's template (already templatized).
    pub template: &'a Template,
    /// Url of the created, still empty composite.
    pub composite_url: &'a str,
    /// Services a view draws from.
    pub dependencies: &'a [DependencySource],
}

/// Outgoing part and its side-table entries.
struct PreparedPart {
    local_id: i64,
    outgoing: Value,
    field_info: Map<String, Value>,
    admin_layer_info: Option<Value>,
    relationship_count: u64,
}

/// Remove the deferred properties from a part and cache them.
///
/// `admin_dependencies` are used to make sure a view definition addresses its
/// sources through placeholders before it is cached.
fn prepare_part(part: &Value, admin_dependencies: &[DependencySource]) -> Option<PreparedPart> {
    let local_id = layer_id(part)?;
    let mut outgoing = part.as_object()?.clone();
    let mut field_info = Map::new();

    if let Some(fields) = outgoing.get("fields") {
        field_info.insert(SOURCE_FIELDS_KEY.to_string(), fields.clone());
    }
    let relationship_count =
        outgoing.get("relationships").and_then(Value::as_array).map_or(0, Vec::len) as u64;
    for prop in DEFERRED_PROPERTIES {
        if let Some(value) = outgoing.get_mut(prop) {
            field_info.insert(prop.to_string(), value.take());
        }
    }
    for prop in KEPT_CACHED_PROPERTIES {
        if let Some(value) = outgoing.get(prop) {
            field_info.insert(prop.to_string(), value.clone());
        }
    }
    let admin_layer_info = outgoing
        .get_mut("adminLayerInfo")
        .map(Value::take)
        .filter(|v| !v.is_null())
        .map(|admin| templatize_admin_layer_info(&admin, admin_dependencies));

    Some(PreparedPart {
        local_id,
        outgoing: Value::Object(outgoing),
        field_info,
        admin_layer_info,
        relationship_count,
    })
}

/// Popup configurations of a composite's data document, by layer id.
fn cache_popups(data: Option<&Value>) -> BTreeMap<i64, Value> {
    let Some(data) = data else {
        return BTreeMap::new();
    };
    PART_COLLECTIONS
        .iter()
        .filter_map(|c| data.get(*c).and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| Some((layer_id(entry)?, entry.get("popupInfo")?.clone())))
        .filter(|(_, popup)| !popup.is_null())
        .collect()
}

/// Add a composite's sub-parts one at a time and settle its field names.
///
/// The item's settings must already be registered. For a view, the settled
/// field settings of its dependencies are copied into its entry before the
/// first part is submitted.
pub async fn assemble_composite(
    client: &dyn CatalogClient,
    context: &AssemblyContext<'_>,
    registry: &mut SettingsRegistry,
    progress: &mut ProgressReporter<'_>,
) -> Result<AssemblyOutcome> {
    let template = context.template;
    let owner = template.owner_id.as_str();
    let props = template.extra_props.as_ref().ok_or_else(|| {
        SolutionError::malformed(owner, "composite item has no sub-resource properties recorded")
    })?;

    if template.is_view() {
        registry.inherit_source_field_infos(owner, &template.dependency_ids)?;
    }

    let parts = sorted_parts(props);
    info!("Assembling {} part(s) of {}", parts.len(), owner);
    let mut tables = SideTables {
        popup_infos: cache_popups(template.data_doc.as_ref()),
        ..SideTables::default()
    };
    let mut outcome = AssemblyOutcome::default();

    for (index, part) in parts.iter().enumerate() {
        let Some(prepared) = prepare_part(part, context.dependencies) else {
            return Err(SolutionError::malformed(owner, format!("part {index} has no numeric id")));
        };
        let outgoing = Detemplatizer::new(registry).resolve_value(&prepared.outgoing);

        debug!("Adding part {} of {}", prepared.local_id, owner);
        let response = match client
            .add_composite_sub_parts(context.composite_url, std::slice::from_ref(&outgoing))
            .await
        {
            Ok(response) => response,
            Err(SolutionError::RemoteRequest(source)) => {
                return Err(SolutionError::PartialCompositeFailure {
                    owner_id: owner.to_string(),
                    part_id: prepared.local_id,
                    attempted: index + 1,
                    source,
                });
            }
            Err(other) => return Err(other),
        };

        let Some(assigned) = response.assigned_ids.first().copied() else {
            return Err(SolutionError::PartialCompositeFailure {
                owner_id: owner.to_string(),
                part_id: prepared.local_id,
                attempted: index + 1,
                source: RemoteRequestError::message(
                    "addToDefinition",
                    format!("no id was assigned to part {}", prepared.local_id),
                ),
            });
        };
        if assigned != prepared.local_id {
            debug!("Part {} of {} was deployed as {}", prepared.local_id, owner, assigned);
        }
        outcome.assigned_ids.insert(prepared.local_id, assigned);
        tables.field_infos.insert(prepared.local_id, prepared.field_info);
        if let Some(admin) = prepared.admin_layer_info {
            tables.admin_layer_infos.insert(prepared.local_id, admin);
        }
        outcome.parts_added += 1;
        progress.charge(PART_BASE_COST + prepared.relationship_count);
        progress.emit(owner, ProgressStatus::AddedPart);
    }

    registry.record_part_ids(owner, &outcome.assigned_ids)?;
    settle_field_names(client, context, registry, &tables, &outcome.assigned_ids).await?;
    apply_deferred(client, context, registry, &tables, &outcome.assigned_ids).await?;
    progress.emit(owner, ProgressStatus::Updated);

    let resolver = Detemplatizer::new(registry);
    outcome.resolved_popups =
        tables.popup_infos.iter().map(|(id, popup)| (*id, resolver.resolve_value(popup))).collect();
    Ok(outcome)
}

/// Read back each part's fields and merge the rename maps into the registry.
async fn settle_field_names(
    client: &dyn CatalogClient,
    context: &AssemblyContext<'_>,
    registry: &mut SettingsRegistry,
    tables: &SideTables,
    assigned_ids: &BTreeMap<i64, i64>,
) -> Result<()> {
    let owner = context.template.owner_id.as_str();
    for (local_id, info) in &tables.field_infos {
        let assigned = assigned_ids.get(local_id).copied().unwrap_or(*local_id);
        let stored = client.fetch_composite_part(context.composite_url, assigned).await?;
        let source_fields = info.get(SOURCE_FIELDS_KEY).and_then(Value::as_array);
        let new_fields = stored.get("fields").and_then(Value::as_array);
        let renames = match (source_fields, new_fields) {
            (Some(source), Some(new)) => build_field_rename_map(source, new),
            _ => continue,
        };
        debug!("Part {} of {}: {} field(s) matched", local_id, owner, renames.len());
        registry.merge_field_infos(owner, *local_id, renames)?;
    }
    Ok(())
}

/// Resolve the cached definitions and apply them, one update per part.
async fn apply_deferred(
    client: &dyn CatalogClient,
    context: &AssemblyContext<'_>,
    registry: &SettingsRegistry,
    tables: &SideTables,
    assigned_ids: &BTreeMap<i64, i64>,
) -> Result<()> {
    let resolver = Detemplatizer::new(registry);
    for (local_id, assigned) in assigned_ids {
        let mut patch = Map::new();
        if let Some(info) = tables.field_infos.get(local_id) {
            for prop in DEFERRED_PROPERTIES {
                if let Some(value) = info.get(prop).filter(|v| !v.is_null()) {
                    patch.insert(prop.to_string(), resolver.resolve_value(value));
                }
            }
        }
        if let Some(admin) = tables.admin_layer_infos.get(local_id) {
            patch.insert("adminLayerInfo".to_string(), resolver.resolve_value(admin));
        }
        if patch.is_empty() {
            continue;
        }
        client
            .update_composite_part_definition(context.composite_url, *assigned, &Value::Object(patch))
            .await?;
    }
    Ok(())
}
