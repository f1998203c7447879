//! Capturing items into templates.

use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::CatalogClient;
use crate::core::{ItemKind, Result, SolutionError};
use crate::models::{Bundle, Template};
use crate::templating::{
    DependencySource, ItemReference, is_templatized, templatize_composite, templatize_references,
};

/// Capture a live item as a templatized [`Template`].
///
/// The item's `dependencies` list, when present, becomes the template's
/// dependency ids; each dependency is fetched so that references to it (by id,
/// url or, for views, service name) can be templatized. For composites the
/// service definition recorded under `properties` becomes the template's
/// sub-resource properties.
pub async fn capture_template(client: &dyn CatalogClient, id: &str) -> Result<Template> {
    let mut item = client.fetch_item(id).await?;
    let kind: ItemKind = match item.get("type") {
        Some(kind) => serde_json::from_value(kind.clone())?,
        None => return Err(SolutionError::malformed(id, "item has no type")),
    };
    let data = client.fetch_data(id).await?;
    let resources = client.fetch_resources(id).await?;

    let doc = item
        .as_object_mut()
        .ok_or_else(|| SolutionError::malformed(id, "item document is not an object"))?;
    let dependency_ids: Vec<String> = doc
        .remove("dependencies")
        .and_then(|deps| serde_json::from_value(deps).ok())
        .unwrap_or_default();
    let properties = if kind.is_composite() {
        doc.remove("properties")
    } else {
        None
    };

    let mut template = Template::new(id, kind, item).with_dependencies(dependency_ids);
    template.data_doc = data;
    template.resource_refs = resources;
    template.extra_props = properties;

    let mut references = Vec::with_capacity(template.dependency_ids.len());
    let mut sources = Vec::new();
    for dep in &template.dependency_ids {
        let dep_item = client.fetch_item(dep).await?;
        let url = dep_item.get("url").and_then(Value::as_str).filter(|u| !u.is_empty());
        references.push(match url {
            Some(url) => ItemReference::with_url(dep, url),
            None => ItemReference::id(dep),
        });
        if let Some(name) = dep_item.get("name").and_then(Value::as_str) {
            sources.push(DependencySource::new(dep, name));
        }
    }
    debug!("{} has {} dependenc(ies)", id, references.len());

    let template = templatize_template(&template, &references, &sources);
    info!("Captured {} ({})", id, template.kind);
    Ok(template)
}

/// Templatize every template of a bundle against the other templates in it.
///
/// References are derived from the templates' own item documents, so the
/// bundle should be templatized once, before any of its urls are replaced.
/// Templatizing an already templatized bundle changes nothing.
pub fn templatize_bundle(bundle: &Bundle) -> Bundle {
    let mut out = bundle.clone();
    out.templates = bundle
        .templates
        .iter()
        .map(|template| {
            let deps: Vec<&Template> =
                template.dependency_ids.iter().filter_map(|id| bundle.get(id)).collect();
            let references: Vec<ItemReference> = deps
                .iter()
                .map(|dep| match dep.base_doc.get("url").and_then(Value::as_str) {
                    Some(url) if !url.is_empty() && !is_templatized(url) => {
                        ItemReference::with_url(&dep.owner_id, url)
                    }
                    _ => ItemReference::id(&dep.owner_id),
                })
                .collect();
            let sources: Vec<DependencySource> = deps
                .iter()
                .filter_map(|dep| Some(DependencySource::new(&dep.owner_id, dep.name()?)))
                .collect();
            templatize_template(template, &references, &sources)
        })
        .collect();
    out
}

/// Templatize one template's references and, for composites, its parts.
pub fn templatize_template(
    template: &Template,
    references: &[ItemReference],
    sources: &[DependencySource],
) -> Template {
    let mut out = templatize_composite(template, sources);
    out.base_doc = templatize_references(&out.base_doc, references);
    out.data_doc = out.data_doc.map(|data| templatize_references(&data, references));
    out
}
