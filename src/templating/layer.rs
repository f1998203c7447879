//! Structural templatization of one layer or table document.
//!
//! The rewriter is shape driven: each known property holding a field name is
//! rewritten when present and skipped otherwise. Documents without an `id` are
//! returned unchanged because their field placeholders could not be addressed.
//! No keys are added or removed.

use serde_json::{Map, Value};

use super::expressions::{
    templatize_curly, templatize_expression, templatize_simple_names, templatize_square,
};
use super::{
    field_base_path, layer_field_names, layer_id, templatize_field_list, templatize_name,
    templatize_property,
};

/// Layer level properties holding a single field name.
const FIELD_PROPERTIES: [&str; 4] = ["displayField", "objectIdField", "globalIdField", "typeIdField"];

const EDIT_FIELDS_INFO_PROPERTIES: [&str; 4] =
    ["creationDateField", "creatorField", "editDateField", "editorField"];

const TIME_INFO_PROPERTIES: [&str; 3] = ["startTimeField", "endTimeField", "trackIdField"];

/// Layer level SQL filters.
const FILTER_PROPERTIES: [&str; 3] = ["definitionExpression", "viewDefinitionQuery", "definitionQuery"];

const RENDERER_FIELD_PROPERTIES: [&str; 5] =
    ["field", "field1", "field2", "field3", "normalizationField"];

/// Field addressing shared by every rewrite of one layer.
struct LayerScope<'a> {
    owner_id: &'a str,
    base_path: String,
    field_names: Vec<String>,
}

/// Templatize every field reference held by a layer or table document.
///
/// ```rust
/// use serde_json::json;
/// use solution_deployer::templating::templatize_layer;
///
/// let layer = json!({"id": 0, "displayField": "NAME", "fields": [{"name": "NAME"}]});
/// let out = templatize_layer(&layer, "abc");
/// assert_eq!(out["displayField"], "{{abc.fieldInfos.layer0.fields.name}}");
/// assert_eq!(out["fields"], layer["fields"]);
/// ```
pub fn templatize_layer(layer: &Value, owner_id: &str) -> Value {
    let mut out = layer.clone();
    let Some(id) = layer_id(layer) else {
        return out;
    };
    let scope = LayerScope {
        owner_id,
        base_path: field_base_path(owner_id, id),
        field_names: layer_field_names(layer),
    };
    let Some(obj) = out.as_object_mut() else {
        return out;
    };

    for prop in FIELD_PROPERTIES {
        templatize_property(obj, prop, &scope.base_path);
    }
    if let Some(Value::Object(info)) = obj.get_mut("editFieldsInfo") {
        for prop in EDIT_FIELDS_INFO_PROPERTIES {
            templatize_property(info, prop, &scope.base_path);
        }
    }
    if let Some(Value::Object(info)) = obj.get_mut("timeInfo") {
        for prop in TIME_INFO_PROPERTIES {
            templatize_property(info, prop, &scope.base_path);
        }
    }
    for relationship in array_objects_mut(obj, "relationships") {
        templatize_property(relationship, "keyField", &scope.base_path);
    }
    for index in array_objects_mut(obj, "indexes") {
        map_string(index, "fields", |v| templatize_field_list(v, &scope.base_path));
    }
    for prop in FILTER_PROPERTIES {
        map_string(obj, prop, |v| templatize_simple_names(v, &scope.base_path, &scope.field_names));
    }
    if let Some(Value::Object(drawing)) = obj.get_mut("drawingInfo") {
        templatize_drawing_info(drawing, &scope);
    }
    templatize_edit_templates(obj, &scope.base_path);
    for sub_type in array_objects_mut(obj, "types") {
        templatize_edit_templates(sub_type, &scope.base_path);
        if let Some(Value::Object(domains)) = sub_type.get_mut("domains") {
            *domains = templatize_keys(domains, &scope.base_path);
        }
    }
    if let Some(Value::Object(editor)) = obj.get_mut("definitionEditor") {
        map_string(editor, "parameterizedExpression", |v| {
            templatize_simple_names(v, &scope.base_path, &scope.field_names)
        });
        for input in array_objects_mut(editor, "inputs") {
            for parameter in array_objects_mut(input, "parameters") {
                templatize_property(parameter, "fieldName", &scope.base_path);
            }
        }
    }
    tracing::trace!("Templatized layer {} of {}", id, scope.owner_id);
    out
}

/// Templatize a popup configuration belonging to `layer`.
///
/// `layer` is the service definition of the same layer; it supplies the field
/// list and the relationship list used to address `relationships/<i>/<field>`
/// references.
pub fn templatize_popup_info(popup: &Value, layer: &Value, owner_id: &str) -> Value {
    let mut out = popup.clone();
    let Some(id) = layer_id(layer) else {
        return out;
    };
    let scope = LayerScope {
        owner_id,
        base_path: field_base_path(owner_id, id),
        field_names: layer_field_names(layer),
    };
    let Some(obj) = out.as_object_mut() else {
        return out;
    };

    for prop in ["title", "description"] {
        map_string(obj, prop, |v| templatize_curly(v, &scope.base_path, &scope.field_names));
    }
    templatize_field_infos(obj, layer, &scope);
    for info in array_objects_mut(obj, "expressionInfos") {
        map_string(info, "expression", |v| {
            templatize_expression(v, &scope.base_path, &scope.field_names)
        });
    }
    templatize_media_infos(obj, &scope);
    for element in array_objects_mut(obj, "popupElements") {
        map_string(element, "text", |v| templatize_curly(v, &scope.base_path, &scope.field_names));
        templatize_field_infos(element, layer, &scope);
        templatize_media_infos(element, &scope);
        if let Some(Value::Object(info)) = element.get_mut("expressionInfo") {
            map_string(info, "expression", |v| {
                templatize_expression(v, &scope.base_path, &scope.field_names)
            });
        }
    }
    if let Some(Value::Object(related)) = obj.get_mut("relatedRecordsInfo") {
        for order in array_objects_mut(related, "orderByFields") {
            map_string(order, "field", |v| templatize_field_name(v, layer, owner_id, &scope.base_path));
        }
    }
    out
}

/// Templatize a popup field name, following relationship references.
///
/// `relationships/<index>/<field>` names a field of the related layer: the index
/// is resolved through the layer's relationship list (or, for a view, the
/// related tables of its view definition) and the field is addressed under the
/// related layer's id. Expression references (`expression/expr0`) are not fields
/// and stay unchanged, as does any reference whose index cannot be resolved.
pub fn templatize_field_name(name: &str, layer: &Value, owner_id: &str, base_path: &str) -> String {
    if let Some(rest) = name.strip_prefix("relationships/") {
        let Some((index, field)) = rest.split_once('/') else {
            return name.to_string();
        };
        let related = index.parse::<usize>().ok().and_then(|i| related_layer_id(layer, i));
        return match related {
            Some(related_id) => {
                let related_base = field_base_path(owner_id, related_id);
                format!("relationships/{index}/{}", templatize_name(&related_base, field))
            }
            None => name.to_string(),
        };
    }
    if name.starts_with("expression/") {
        return name.to_string();
    }
    templatize_name(base_path, name)
}

/// Id of the layer reached through relationship `index` of `layer`.
fn related_layer_id(layer: &Value, index: usize) -> Option<i64> {
    if is_view_layer(layer) {
        let table = layer
            .pointer("/adminLayerInfo/viewLayerDefinition/table/relatedTables")?
            .as_array()?
            .get(index)?;
        return table.get("id").or_else(|| table.get("sourceLayerId")).and_then(Value::as_i64);
    }
    layer
        .get("relationships")?
        .as_array()?
        .get(index)?
        .get("relatedTableId")
        .and_then(Value::as_i64)
}

/// Whether the document describes a view layer.
pub fn is_view_layer(layer: &Value) -> bool {
    layer.get("isView").and_then(Value::as_bool).unwrap_or(false)
        || layer.pointer("/adminLayerInfo/viewLayerDefinition").is_some()
}

fn templatize_drawing_info(drawing: &mut Map<String, Value>, scope: &LayerScope<'_>) {
    if let Some(Value::Object(renderer)) = drawing.get_mut("renderer") {
        templatize_renderer(renderer, scope);
    }
    for label in array_objects_mut(drawing, "labelingInfo") {
        map_string(label, "labelExpression", |v| {
            templatize_square(v, &scope.base_path, &scope.field_names)
        });
        map_string(label, "where", |v| {
            templatize_simple_names(v, &scope.base_path, &scope.field_names)
        });
        if let Some(Value::Object(info)) = label.get_mut("labelExpressionInfo") {
            map_string(info, "expression", |v| {
                templatize_expression(v, &scope.base_path, &scope.field_names)
            });
            map_string(info, "value", |v| templatize_curly(v, &scope.base_path, &scope.field_names));
        }
        for field_info in array_objects_mut(label, "fieldInfos") {
            templatize_property(field_info, "fieldName", &scope.base_path);
        }
    }
}

fn templatize_renderer(renderer: &mut Map<String, Value>, scope: &LayerScope<'_>) {
    for prop in RENDERER_FIELD_PROPERTIES {
        templatize_property(renderer, prop, &scope.base_path);
    }
    map_string(renderer, "rotationExpression", |v| {
        templatize_square(v, &scope.base_path, &scope.field_names)
    });
    map_string(renderer, "valueExpression", |v| {
        templatize_expression(v, &scope.base_path, &scope.field_names)
    });
    for variable in array_objects_mut(renderer, "visualVariables") {
        templatize_property(variable, "field", &scope.base_path);
        templatize_property(variable, "normalizationField", &scope.base_path);
        map_string(variable, "valueExpression", |v| {
            templatize_expression(v, &scope.base_path, &scope.field_names)
        });
    }
    if let Some(Value::Object(authoring)) = renderer.get_mut("authoringInfo") {
        templatize_property(authoring, "field1", &scope.base_path);
        templatize_property(authoring, "field2", &scope.base_path);
        for variable in array_objects_mut(authoring, "visualVariables") {
            templatize_property(variable, "field", &scope.base_path);
        }
    }
}

/// Rewrite `templates[].prototype.attributes` keys.
fn templatize_edit_templates(obj: &mut Map<String, Value>, base_path: &str) {
    for template in array_objects_mut(obj, "templates") {
        if let Some(Value::Object(attributes)) = template.pointer_mut_obj("prototype", "attributes") {
            *attributes = templatize_keys(attributes, base_path);
        }
    }
}

fn templatize_field_infos(obj: &mut Map<String, Value>, layer: &Value, scope: &LayerScope<'_>) {
    for info in array_objects_mut(obj, "fieldInfos") {
        map_string(info, "fieldName", |v| {
            templatize_field_name(v, layer, scope.owner_id, &scope.base_path)
        });
    }
}

fn templatize_media_infos(obj: &mut Map<String, Value>, scope: &LayerScope<'_>) {
    for media in array_objects_mut(obj, "mediaInfos") {
        for prop in ["title", "caption"] {
            map_string(media, prop, |v| templatize_curly(v, &scope.base_path, &scope.field_names));
        }
        let Some(Value::Object(value)) = media.get_mut("value") else {
            continue;
        };
        if let Some(Value::Array(fields)) = value.get_mut("fields") {
            for field in fields.iter_mut() {
                if let Value::String(name) = field {
                    *name = templatize_name(&scope.base_path, name);
                }
            }
        }
        templatize_property(value, "normalizeField", &scope.base_path);
        templatize_property(value, "tooltipField", &scope.base_path);
        for prop in ["linkURL", "sourceURL"] {
            map_string(value, prop, |v| templatize_curly(v, &scope.base_path, &scope.field_names));
        }
    }
}

/// Copy of `map` with every key templatized, preserving key order.
pub(crate) fn templatize_keys(map: &Map<String, Value>, base_path: &str) -> Map<String, Value> {
    map.iter().map(|(k, v)| (templatize_name(base_path, k), v.clone())).collect()
}

/// Apply `f` to `obj[prop]` when it is a string.
pub(crate) fn map_string(obj: &mut Map<String, Value>, prop: &str, f: impl FnOnce(&str) -> String) {
    if let Some(Value::String(current)) = obj.get_mut(prop) {
        let next = f(current);
        *current = next;
    }
}

/// Mutable iterator over the object elements of `obj[prop]` when it is an array.
pub(crate) fn array_objects_mut<'a>(
    obj: &'a mut Map<String, Value>,
    prop: &str,
) -> impl Iterator<Item = &'a mut Map<String, Value>> {
    obj.get_mut(prop)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flat_map(|items| items.iter_mut().filter_map(Value::as_object_mut))
}

trait NestedObject {
    fn pointer_mut_obj(&mut self, outer: &str, inner: &str) -> Option<&mut Value>;
}

impl NestedObject for Map<String, Value> {
    fn pointer_mut_obj(&mut self, outer: &str, inner: &str) -> Option<&mut Value> {
        self.get_mut(outer)?.as_object_mut()?.get_mut(inner)
    }
}
