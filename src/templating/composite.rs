//! Whole-template entry point for composite items.

use serde_json::Value;

use super::admin::{DependencySource, templatize_admin_layer_info};
use super::layer::{templatize_layer, templatize_popup_info};
use super::{is_templatized, layer_id, templatize_term};
use crate::models::Template;

/// Property lists holding the sub-parts of a composite item.
pub const PART_COLLECTIONS: [&str; 2] = ["layers", "tables"];

/// Templatize a captured composite template.
///
/// Rewrites the item id and url, every layer and table recorded under
/// `properties`, their view definitions (against `dependencies`), and the popup
/// info stored in the data document. Templates of other kinds and templates
/// missing the expected shapes come back unchanged apart from what could be
/// matched. Applying it twice gives the same result as applying it once.
pub fn templatize_composite(template: &Template, dependencies: &[DependencySource]) -> Template {
    let mut out = template.clone();
    if !template.kind.is_composite() {
        return out;
    }
    let owner = template.owner_id.as_str();

    if let Some(base) = out.base_doc.as_object_mut() {
        for (prop, category) in [("url", "url"), ("id", "id")] {
            if let Some(Value::String(current)) = base.get_mut(prop) {
                if !current.is_empty() && !is_templatized(current) {
                    *current = templatize_term(owner, category);
                }
            }
        }
    }

    if let Some(props) = out.extra_props.as_mut() {
        for collection in PART_COLLECTIONS {
            let Some(Value::Array(parts)) = props.get_mut(collection) else {
                continue;
            };
            for part in parts.iter_mut() {
                *part = templatize_part(part, owner, dependencies);
            }
        }
    }

    let Some(original_props) = template.extra_props.as_ref() else {
        return out;
    };
    if let Some(data) = out.data_doc.as_mut() {
        for collection in PART_COLLECTIONS {
            let Some(Value::Array(entries)) = data.get_mut(collection) else {
                continue;
            };
            for entry in entries.iter_mut() {
                let Some(layer) = layer_id(entry).and_then(|id| find_part(original_props, id)) else {
                    continue;
                };
                if let Some(popup) = entry.get_mut("popupInfo") {
                    *popup = templatize_popup_info(popup, layer, owner);
                }
            }
        }
    }
    out
}

fn templatize_part(part: &Value, owner: &str, dependencies: &[DependencySource]) -> Value {
    let mut out = templatize_layer(part, owner);
    let Some(obj) = out.as_object_mut() else {
        return out;
    };
    if let Some(Value::String(service_item)) = obj.get_mut("serviceItemId") {
        if !is_templatized(service_item) {
            *service_item = templatize_term(owner, "id");
        }
    }
    if let Some(admin) = obj.get_mut("adminLayerInfo") {
        *admin = templatize_admin_layer_info(admin, dependencies);
    }
    out
}

/// Layer or table with the given id among a composite's recorded parts.
pub fn find_part(props: &Value, id: i64) -> Option<&Value> {
    PART_COLLECTIONS
        .iter()
        .filter_map(|c| props.get(*c).and_then(Value::as_array))
        .flatten()
        .find(|part| layer_id(part) == Some(id))
}

/// Every layer and table of a composite, sorted by ascending id.
///
/// Parts without a numeric id sort last, keeping their recorded order.
pub fn sorted_parts(props: &Value) -> Vec<&Value> {
    let mut parts: Vec<&Value> = PART_COLLECTIONS
        .iter()
        .filter_map(|c| props.get(*c).and_then(Value::as_array))
        .flatten()
        .collect();
    parts.sort_by_key(|p| layer_id(p).unwrap_or(i64::MAX));
    parts
}
