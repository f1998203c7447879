//! Identifier templatization and de-templatization.
//!
//! Captured documents embed identifiers that the destination catalog will
//! assign differently: item ids, service urls and field names. This module
//! replaces them with path-addressable placeholders and later resolves those
//! placeholders against the [`SettingsRegistry`](crate::settings::SettingsRegistry)
//! built up during deployment.
//!
//! # Placeholder grammar
//!
//! ```text
//! "{{" + ownerId + "." + categoryPath + "}}"
//! ```
//!
//! `categoryPath` is one of `id`, `url`, `name`, `layer<N>.url`, `layer<N>.id`,
//! `fieldInfos.layer<N>.fields.<lowercaseFieldName>`, or a literal path into the
//! deployment's global settings (`organization.helperServices.geometry.url`).
//! The owner id and every non-leaf segment keep their case; the leaf field name
//! is always lower-cased because the backend lower-cases field names on write.
//!
//! # Components
//!
//! - [`expressions`] - rewrites field references inside expression snippets
//! - [`layer`] - structural rewrites of one layer or table and its popup
//! - [`admin`] - view (admin layer info) rewrites that point at source services
//! - [`composite`] - whole-template entry points
//! - [`references`] - item id and url references between templates
//! - [`resolver`] - the inverse operation
//!
//! Everything here is pure and synchronous: no I/O, no suspension points.

pub mod admin;
pub mod composite;
pub mod expressions;
pub mod layer;
pub mod references;
pub mod resolver;

use serde_json::{Map, Value};

pub use admin::{DependencySource, templatize_admin_layer_info};
pub use composite::templatize_composite;
pub use layer::{templatize_layer, templatize_popup_info};
pub use references::{ItemReference, templatize_references};
pub use resolver::Detemplatizer;

/// Opening token of every placeholder.
pub const PLACEHOLDER_OPEN: &str = "{{";

/// Closing token of every placeholder.
pub const PLACEHOLDER_CLOSE: &str = "}}";

/// Wrap a path into a placeholder token.
///
/// ```rust
/// use solution_deployer::templating::placeholder;
///
/// assert_eq!(placeholder("abc.url"), "{{abc.url}}");
/// ```
pub fn placeholder(path: &str) -> String {
    format!("{PLACEHOLDER_OPEN}{path}{PLACEHOLDER_CLOSE}")
}

/// Placeholder for an item level category (`id`, `url`, `name`, `layer0.url`).
pub fn templatize_term(owner_id: &str, category: &str) -> String {
    placeholder(&format!("{owner_id}.{category}"))
}

/// Base path under which a layer's field names are addressed.
///
/// ```rust
/// use solution_deployer::templating::field_base_path;
///
/// assert_eq!(field_base_path("AbC", 3), "AbC.fieldInfos.layer3.fields");
/// ```
pub fn field_base_path(owner_id: &str, layer_id: i64) -> String {
    format!("{owner_id}.fieldInfos.layer{layer_id}.fields")
}

/// Whether a value already starts with the placeholder open token.
pub fn is_templatized(value: &str) -> bool {
    value.starts_with(PLACEHOLDER_OPEN)
}

/// Replace a concrete field name with its placeholder.
///
/// Empty strings and values that are already placeholders are returned
/// unchanged, which makes every structural rewrite idempotent.
pub fn templatize_name(base_path: &str, value: &str) -> String {
    if value.is_empty() || is_templatized(value) {
        return value.to_string();
    }
    placeholder(&format!("{base_path}.{}", value.to_lowercase()))
}

/// Templatize `object[property]` in place when it holds a non-empty string.
///
/// ```rust
/// use serde_json::json;
/// use solution_deployer::templating::templatize_property;
///
/// let mut obj = json!({"someProp": "NaMe"});
/// templatize_property(obj.as_object_mut().unwrap(), "someProp", "abc.fieldInfos.layer0.fields");
/// assert_eq!(obj["someProp"], "{{abc.fieldInfos.layer0.fields.name}}");
/// ```
pub fn templatize_property(object: &mut Map<String, Value>, property: &str, base_path: &str) {
    if let Some(Value::String(current)) = object.get_mut(property) {
        if !current.is_empty() {
            *current = templatize_name(base_path, current);
        }
    }
}

/// Templatize a comma separated list of field names (`"A,B"` or `"A ASC, B DESC"`).
///
/// Only the first whitespace separated token of each entry is a field name;
/// the rest (sort direction) is kept verbatim together with the separators.
pub fn templatize_field_list(value: &str, base_path: &str) -> String {
    value
        .split(',')
        .map(|entry| {
            let leading = entry.len() - entry.trim_start().len();
            let trimmed = entry.trim_start();
            let name_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
            let (name, rest) = trimmed.split_at(name_end);
            format!("{}{}{}", &entry[..leading], templatize_name(base_path, name), rest)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Field names declared by a layer or table document (`fields[].name`), in order.
pub fn layer_field_names(layer: &Value) -> Vec<String> {
    layer
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Numeric id of a layer or table document.
pub fn layer_id(layer: &Value) -> Option<i64> {
    layer.get("id").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_templatize_property_folds_leaf_only() {
        let base = "AbC.fieldInfos.layer0.fields";
        let mut obj = json!({"someProp": "NaMe"});
        templatize_property(obj.as_object_mut().unwrap(), "someProp", base);
        assert_eq!(obj, json!({"someProp": format!("{{{{{base}.name}}}}")}));
    }

    #[test]
    fn test_templatize_property_ignores_missing_and_empty() {
        let mut obj = json!({"a": "", "b": 3});
        templatize_property(obj.as_object_mut().unwrap(), "a", "x");
        templatize_property(obj.as_object_mut().unwrap(), "b", "x");
        templatize_property(obj.as_object_mut().unwrap(), "c", "x");
        assert_eq!(obj, json!({"a": "", "b": 3}));
    }

    #[test]
    fn test_templatize_name_is_idempotent() {
        let once = templatize_name("abc.fieldInfos.layer1.fields", "STATUS");
        assert_eq!(once, "{{abc.fieldInfos.layer1.fields.status}}");
        assert_eq!(templatize_name("abc.fieldInfos.layer1.fields", &once), once);
    }

    #[test]
    fn test_templatize_field_list_keeps_direction() {
        let out = templatize_field_list("NAME ASC, Type DESC", "b");
        assert_eq!(out, "{{b.name}} ASC, {{b.type}} DESC");
        assert_eq!(templatize_field_list("A,B", "b"), "{{b.a}},{{b.b}}");
    }

    #[test]
    fn test_layer_field_names_in_order() {
        let layer = json!({"id": 2, "fields": [{"name": "B"}, {"name": "A"}, {"alias": "x"}]});
        assert_eq!(layer_field_names(&layer), vec!["B", "A"]);
        assert_eq!(layer_id(&layer), Some(2));
        assert!(layer_field_names(&json!({})).is_empty());
    }
}
