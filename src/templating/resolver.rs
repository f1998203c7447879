//! Placeholder resolution against the deployment settings.
//!
//! [`Detemplatizer`] is the inverse of the templatizing rewrites: it scans
//! every string (and every object key) of a document for `{{path}}` tokens and
//! replaces each one it can resolve. Tokens that cannot be resolved are kept
//! verbatim so a later pass, with more of the registry settled, can finish the
//! job.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::settings::{ItemSettings, LayerFieldInfos, SettingsRegistry};

static TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}\s]+)\}\}").ok());

static LAYER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^layer(\d+)$").ok());

/// Resolves placeholders against a [`SettingsRegistry`].
///
/// ```rust
/// use serde_json::json;
/// use solution_deployer::settings::{ItemSettings, SettingsRegistry};
/// use solution_deployer::templating::Detemplatizer;
///
/// let mut registry = SettingsRegistry::new();
/// registry.register("abc", ItemSettings::new("n3w").with_url("https://new/FeatureServer")).unwrap();
/// let resolver = Detemplatizer::new(&registry);
/// let out = resolver.resolve_value(&json!({"url": "{{abc.layer2.url}}", "id": "{{abc.id}}"}));
/// assert_eq!(out, json!({"url": "https://new/FeatureServer/2", "id": "n3w"}));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Detemplatizer<'a> {
    registry: &'a SettingsRegistry,
}

impl<'a> Detemplatizer<'a> {
    /// Create a resolver reading from `registry`.
    pub fn new(registry: &'a SettingsRegistry) -> Self {
        Self { registry }
    }

    /// Resolve every placeholder in a JSON document, keys included.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Object(map) => Value::Object(self.resolve_map(map)),
            other => other.clone(),
        }
    }

    fn resolve_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter().map(|(k, v)| (self.resolve_str(k), self.resolve_value(v))).collect()
    }

    /// Resolve every placeholder in one string.
    pub fn resolve_str(&self, text: &str) -> String {
        let Some(re) = TOKEN.as_ref() else {
            return text.to_string();
        };
        if !text.contains(super::PLACEHOLDER_OPEN) {
            return text.to_string();
        }
        re.replace_all(text, |caps: &Captures| {
            self.resolve_path(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }

    /// Resolve a single placeholder path (the text between the braces).
    pub fn resolve_path(&self, path: &str) -> Option<String> {
        let (owner, category) = path.split_once('.')?;
        match self.registry.get(owner) {
            Some(settings) => resolve_item_path(settings, category),
            None => {
                // a view's copy of its source's field settings
                let inherited = self
                    .registry
                    .inherited_field_infos(owner)
                    .and_then(|infos| resolve_field_path(infos, category));
                let resolved =
                    inherited.or_else(|| lookup_global(self.registry.globals(), path));
                if resolved.is_none() {
                    tracing::trace!("Leaving unresolved placeholder {{{{{}}}}}", path);
                }
                resolved
            }
        }
    }
}

fn resolve_item_path(settings: &ItemSettings, category: &str) -> Option<String> {
    let segments: Vec<&str> = category.split('.').collect();
    match segments.as_slice() {
        ["id"] | ["itemId"] => Some(settings.new_id.clone()),
        ["url"] => settings.new_url.clone(),
        ["name"] => settings.new_name.clone(),
        [layer, "url"] => {
            let n = settings.part_id(layer_number(layer)?);
            let url = settings.new_url.as_deref()?;
            Some(format!("{}/{n}", url.trim_end_matches('/')))
        }
        [layer, "id"] => layer_number(layer).map(|n| settings.part_id(n).to_string()),
        ["fieldInfos", ..] => resolve_field_path(&settings.field_infos, category),
        _ => None,
    }
}

/// `fieldInfos.layer<N>.fields.<leaf>`: the deployed spelling, else the leaf.
fn resolve_field_path(field_infos: &LayerFieldInfos, category: &str) -> Option<String> {
    let segments: Vec<&str> = category.split('.').collect();
    let ["fieldInfos", layer, "fields", leaf] = segments.as_slice() else {
        return None;
    };
    let n = layer_number(layer)?;
    let deployed = field_infos.get(&n).and_then(|fields| fields.get(*leaf));
    Some(deployed.map_or_else(|| (*leaf).to_string(), String::clone))
}

fn layer_number(segment: &str) -> Option<i64> {
    let caps = LAYER.as_ref()?.captures(segment)?;
    caps[1].parse().ok()
}

/// Walk a dot separated path through the global settings tree.
fn lookup_global(globals: &Value, path: &str) -> Option<String> {
    let node = path.split('.').try_fold(globals, |node, key| node.get(key))?;
    match node {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
