//! Test fixtures for creating sample layers, templates and bundles.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use crate::core::ItemKind;
use crate::models::{Bundle, Template};

/// Url of the source service used by the fixtures.
pub const SOURCE_SERVICE_URL: &str = "https://source.example.com/rest/services/Parcels/FeatureServer";

/// A layer document with the given fields, a display field, an editor
/// tracking block and a definition expression over its first field.
pub fn layer(id: i64, name: &str, fields: &[&str]) -> Value {
    let first = fields.first().copied().unwrap_or("OBJECTID");
    json!({
        "id": id,
        "name": name,
        "type": "Feature Layer",
        "displayField": first,
        "objectIdField": "OBJECTID",
        "fields": fields.iter().map(|f| json!({"name": f, "alias": f})).collect::<Vec<_>>(),
        "editFieldsInfo": {"creatorField": "Creator", "editorField": "Editor"},
        "definitionExpression": format!("{first} IS NOT NULL"),
        "relationships": []
    })
}

/// A view layer over layer `source_layer_id` of the service named `source_service`.
pub fn view_layer(id: i64, source_service: &str, source_layer_id: i64, fields: &[&str]) -> Value {
    let mut view = layer(id, &format!("{source_service}_view"), fields);
    view["isView"] = json!(true);
    view["adminLayerInfo"] = json!({
        "viewLayerDefinition": {
            "table": {
                "name": format!("{source_service}_view"),
                "sourceServiceName": source_service,
                "sourceLayerId": source_layer_id,
                "sourceLayerFields": fields
                    .iter()
                    .map(|f| json!({"name": f, "alias": f, "source": f}))
                    .collect::<Vec<_>>()
            }
        }
    });
    view
}

/// A named bundle that can be written to disk.
#[derive(Clone, Debug)]
pub struct TemplateFixture {
    /// File stem used by [`write_to`](Self::write_to).
    pub name: String,
    /// The bundle.
    pub bundle: Bundle,
}

impl TemplateFixture {
    /// `abc` depends on `ghi` and `def`, which depend on nothing.
    pub fn ordering() -> Self {
        Self {
            name: "ordering".to_string(),
            bundle: Bundle::new(vec![
                web_map("abc", &["ghi", "def"]),
                web_map("def", &[]),
                web_map("ghi", &[]),
            ]),
        }
    }

    /// `abc` → `ghi` → `def` → `abc`.
    pub fn cyclic() -> Self {
        Self {
            name: "cyclic".to_string(),
            bundle: Bundle::new(vec![
                web_map("abc", &["ghi"]),
                web_map("ghi", &["def"]),
                web_map("def", &["abc"]),
            ]),
        }
    }

    /// A two layer service `svc` and a map `map` drawing from both layers.
    ///
    /// Templates are captured (not yet templatized): they hold the source
    /// ids and urls.
    pub fn service_and_map() -> Self {
        let service = feature_service(
            "svc",
            "Parcels",
            vec![
                layer(0, "Parcels", &["OWNER", "Status"]),
                layer(1, "Buildings", &["HEIGHT", "OWNER"]),
            ],
        );
        let map = Template::new(
            "map",
            ItemKind::WebMap,
            json!({"id": "map", "title": "Parcels map", "type": "Web Map"}),
        )
        .with_dependencies(["svc"])
        .with_data(json!({
            "operationalLayers": [
                {"id": "parcels", "itemId": "svc", "url": format!("{SOURCE_SERVICE_URL}/0")},
                {"id": "buildings", "itemId": "svc", "url": format!("{SOURCE_SERVICE_URL}/1")}
            ]
        }));
        Self {
            name: "service_and_map".to_string(),
            bundle: Bundle::new(vec![map, service]),
        }
    }

    /// Write the bundle as `<dir>/<name>.json`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}.json", self.name));
        let content = serde_json::to_string_pretty(&self.bundle)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write fixture {}", path.display()))?;
        Ok(path)
    }
}

/// A web map template with the given dependencies.
pub fn web_map(id: &str, deps: &[&str]) -> Template {
    Template::new(id, ItemKind::WebMap, json!({"id": id, "title": format!("Map {id}")}))
        .with_dependencies(deps.iter().copied())
}

/// A captured feature service template named `name` with the given layers.
pub fn feature_service(id: &str, name: &str, layers: Vec<Value>) -> Template {
    let popups: Vec<Value> = layers
        .iter()
        .filter_map(|l| {
            let first = l.pointer("/fields/0/name")?.as_str()?;
            Some(json!({"id": l.get("id")?, "popupInfo": {"title": format!("{{{first}}}")}}))
        })
        .collect();
    Template::new(
        id,
        ItemKind::FeatureService,
        json!({"id": id, "name": name, "title": name, "url": SOURCE_SERVICE_URL}),
    )
    .with_properties(json!({"service": {"capabilities": "Query,Create,Update"}, "layers": layers}))
    .with_data(json!({"layers": popups}))
}
