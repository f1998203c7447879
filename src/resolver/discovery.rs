//! Placeholder-based reference discovery.
//!
//! Declared dependencies are authoritative for ordering. These helpers look at
//! what a template's documents actually reference so that missing declarations
//! can be reported before a deployment leaves placeholders unresolved.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::models::{Bundle, Template};

static OWNER_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}\s.]+)\.[^{}\s]+\}\}").ok());

/// Owner ids named by the placeholders of a document, keys included.
///
/// ```rust
/// use serde_json::json;
/// use solution_deployer::resolver::referenced_owner_ids;
///
/// let doc = json!({"url": "{{def.layer0.url}}", "q": "{{abc.fieldInfos.layer1.fields.x}} > 1"});
/// let ids: Vec<String> = referenced_owner_ids(&doc).into_iter().collect();
/// assert_eq!(ids, vec!["abc", "def"]);
/// ```
pub fn referenced_owner_ids(value: &Value) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    collect_owner_ids(value, &mut ids);
    ids
}

fn collect_owner_ids(value: &Value, ids: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => collect_from_str(s, ids),
        Value::Array(items) => items.iter().for_each(|v| collect_owner_ids(v, ids)),
        Value::Object(map) => {
            for (key, v) in map {
                collect_from_str(key, ids);
                collect_owner_ids(v, ids);
            }
        }
        _ => {}
    }
}

fn collect_from_str(text: &str, ids: &mut BTreeSet<String>) {
    let Some(re) = OWNER_TOKEN.as_ref() else {
        return;
    };
    ids.extend(re.captures_iter(text).map(|caps| caps[1].to_string()));
}

/// Items of `bundle` referenced by `template` but missing from its dependencies.
///
/// References to the template itself and to ids outside the bundle (global
/// settings paths) are not reported.
pub fn undeclared_references(template: &Template, bundle: &Bundle) -> Vec<String> {
    let mut referenced = referenced_owner_ids(&template.base_doc);
    for doc in [template.data_doc.as_ref(), template.extra_props.as_ref()].into_iter().flatten() {
        referenced.extend(referenced_owner_ids(doc));
    }
    referenced
        .into_iter()
        .filter(|id| *id != template.owner_id)
        .filter(|id| !template.dependency_ids.contains(id))
        .filter(|id| bundle.get(id).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ItemKind;
    use serde_json::json;

    #[test]
    fn test_collects_from_keys_and_nested_strings() {
        let doc = json!({
            "{{svc.fieldInfos.layer0.fields.a}}": [ "x {{map.id}} y", {"z": "{{{svc.url}}}"} ],
            "plain": "{{ not a token }}",
            "n": 1
        });
        let ids: Vec<String> = referenced_owner_ids(&doc).into_iter().collect();
        assert_eq!(ids, vec!["map", "svc"]);
    }

    #[test]
    fn test_undeclared_references() {
        let app = Template::new("app", ItemKind::WebMappingApplication, json!({"id": "{{app.id}}"}))
            .with_data(json!({"map": "{{map.id}}", "svc": "{{svc.url}}", "geo": "{{organization.geometry.url}}"}))
            .with_dependencies(["map"]);
        let bundle = Bundle::new(vec![
            app.clone(),
            Template::new("map", ItemKind::WebMap, json!({})),
            Template::new("svc", ItemKind::FeatureService, json!({})),
        ]);
        assert_eq!(undeclared_references(&app, &bundle), vec!["svc"]);
    }
}
