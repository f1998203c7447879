//! Item id and url references between templates.
//!
//! Maps, dashboards and applications point at the items they depend on by id
//! and by service url. Replacing those with `{{<id>.id}}`, `{{<id>.url}}` and
//! `{{<id>.layer<N>.url}}` placeholders lets the deployed copy point at the
//! deployed dependencies instead of the originals.

use regex::Regex;
use serde_json::Value;

use super::{PLACEHOLDER_OPEN, templatize_term};

/// An item another document may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReference {
    /// Source-environment item id.
    pub id: String,
    /// Service url, for items that have one.
    pub url: Option<String>,
}

impl ItemReference {
    /// Reference by id only.
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
        }
    }

    /// Reference by id and service url.
    pub fn with_url(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: Some(url.into()),
        }
    }
}

/// Replace references to `references` in every string of `value`.
///
/// Urls are replaced before ids (longest url first) so that a url containing
/// an id becomes one url placeholder rather than a url with an id placeholder
/// inside it.
///
/// ```rust
/// use serde_json::json;
/// use solution_deployer::templating::{ItemReference, templatize_references};
///
/// let refs = vec![ItemReference::with_url("def", "https://host/rest/services/Parcels/FeatureServer")];
/// let doc = json!({"itemId": "def", "url": "https://host/rest/services/Parcels/FeatureServer/2"});
/// let out = templatize_references(&doc, &refs);
/// assert_eq!(out, json!({"itemId": "{{def.id}}", "url": "{{def.layer2.url}}"}));
/// ```
pub fn templatize_references(value: &Value, references: &[ItemReference]) -> Value {
    let mut ordered: Vec<&ItemReference> = references.iter().collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.url.as_ref().map_or(0, String::len)));
    let rewriters: Vec<Rewriter<'_>> = ordered.into_iter().filter_map(Rewriter::new).collect();
    let urls_done =
        rewrite_strings(value, &|s| rewriters.iter().fold(s.to_string(), |acc, r| r.apply_url(&acc)));
    rewrite_strings(&urls_done, &|s| rewriters.iter().fold(s.to_string(), |acc, r| r.apply_id(&acc)))
}

struct Rewriter<'a> {
    reference: &'a ItemReference,
    layer_url: Option<Regex>,
    id: Regex,
}

impl<'a> Rewriter<'a> {
    fn new(reference: &'a ItemReference) -> Option<Self> {
        if reference.id.is_empty() {
            return None;
        }
        let layer_url = match &reference.url {
            Some(url) if !url.is_empty() => {
                let base = regex::escape(url.trim_end_matches('/'));
                Regex::new(&format!(r"{base}/(\d+)\b")).ok()
            }
            _ => None,
        };
        let id = Regex::new(&format!(r"\b{}\b", regex::escape(&reference.id))).ok()?;
        Some(Self {
            reference,
            layer_url,
            id,
        })
    }

    fn apply_url(&self, text: &str) -> String {
        let Some(url) = self.reference.url.as_deref().map(|u| u.trim_end_matches('/')) else {
            return text.to_string();
        };
        if url.is_empty() || !text.contains(url) {
            return text.to_string();
        }
        let owner = &self.reference.id;
        let text = match &self.layer_url {
            Some(re) => re
                .replace_all(text, |caps: &regex::Captures| {
                    templatize_term(owner, &format!("layer{}.url", &caps[1]))
                })
                .into_owned(),
            None => text.to_string(),
        };
        text.replace(url, &templatize_term(owner, "url"))
    }

    fn apply_id(&self, text: &str) -> String {
        let token = templatize_term(&self.reference.id, "id");
        let mut result = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.id.find_iter(text) {
            if text[..m.start()].ends_with(PLACEHOLDER_OPEN) {
                continue;
            }
            result.push_str(&text[last..m.start()]);
            result.push_str(&token);
            last = m.end();
        }
        result.push_str(&text[last..]);
        result
    }
}

/// Copy of `value` with `f` applied to every string value.
fn rewrite_strings(value: &Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite_strings(v, f)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), rewrite_strings(v, f))).collect())
        }
        other => other.clone(),
    }
}
