//! View layer templatization.
//!
//! A view layer's `adminLayerInfo.viewLayerDefinition` names the source
//! service (`sourceServiceName`), the source layer (`sourceLayerId`) and the
//! source fields it exposes. Those names belong to *another* item, so the
//! placeholders written here are addressed through the dependency's owner id,
//! which is what lets the view be fixed up after the source service has been
//! deployed and possibly renamed.

use serde_json::{Map, Value};

use super::layer::{array_objects_mut, map_string};
use super::{
    field_base_path, is_templatized, templatize_field_list, templatize_property, templatize_term,
};

/// A deployed-before dependency a view may draw from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySource {
    /// Source-environment item id.
    pub id: String,
    /// Service name, as referenced by `sourceServiceName`.
    pub name: String,
}

impl DependencySource {
    /// Create a dependency source.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Templatize a view layer's `adminLayerInfo`.
///
/// Tables whose `sourceServiceName` matches none of `dependencies` are left
/// unchanged. Re-templatizing recovers the dependency id from the existing
/// `{{<id>.name}}` placeholder, so the operation is idempotent.
pub fn templatize_admin_layer_info(admin: &Value, dependencies: &[DependencySource]) -> Value {
    let mut out = admin.clone();
    let Some(Value::Object(table)) = out.pointer_mut("/viewLayerDefinition/table") else {
        return out;
    };
    templatize_view_table(table, dependencies);
    for related in array_objects_mut(table, "relatedTables") {
        templatize_view_table(related, dependencies);
    }
    out
}

fn templatize_view_table(table: &mut Map<String, Value>, dependencies: &[DependencySource]) {
    let Some(dependency_id) = source_dependency_id(table, dependencies) else {
        return;
    };
    if let Some(Value::String(name)) = table.get_mut("sourceServiceName") {
        if !is_templatized(name) {
            *name = templatize_term(&dependency_id, "name");
        }
    }
    let Some(source_layer) = table.get("sourceLayerId").and_then(Value::as_i64) else {
        return;
    };
    let base_path = field_base_path(&dependency_id, source_layer);
    for field in array_objects_mut(table, "sourceLayerFields") {
        templatize_property(field, "name", &base_path);
        templatize_property(field, "source", &base_path);
    }
    if let Some(Value::Object(top_filter)) = table.get_mut("topFilter") {
        map_string(top_filter, "groupByFields", |v| templatize_field_list(v, &base_path));
        map_string(top_filter, "orderByFields", |v| templatize_field_list(v, &base_path));
    }
}

/// Owner id of the service a view table reads from.
fn source_dependency_id(
    table: &Map<String, Value>,
    dependencies: &[DependencySource],
) -> Option<String> {
    let name = table.get("sourceServiceName")?.as_str()?;
    if is_templatized(name) {
        return name.strip_prefix("{{")?.strip_suffix(".name}}").map(str::to_string);
    }
    dependencies.iter().find(|d| d.name == name).map(|d| d.id.clone())
}
