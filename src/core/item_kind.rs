//! Catalog item kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of catalog item a template captures.
///
/// Kinds serialize with the catalog's own type names so that templates
/// captured from a live catalog deserialize without translation.
///
/// ```rust
/// use solution_deployer::core::ItemKind;
///
/// let kind: ItemKind = serde_json::from_str("\"Feature Service\"").unwrap();
/// assert_eq!(kind, ItemKind::FeatureService);
/// assert!(kind.is_composite());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Multi-layer data service assembled one sub-part at a time.
    #[serde(rename = "Feature Service")]
    FeatureService,

    /// Map document referencing services by id and url.
    #[serde(rename = "Web Map")]
    WebMap,

    /// Dashboard referencing maps and layers.
    #[serde(rename = "Dashboard")]
    Dashboard,

    /// Application referencing maps and groups.
    #[serde(rename = "Web Mapping Application")]
    WebMappingApplication,

    /// Sharing group.
    #[serde(rename = "Group")]
    Group,

    /// Any other catalog type, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

impl ItemKind {
    /// Whether the item is built from independently added sub-parts.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::FeatureService)
    }

    /// Whether the item is a group rather than a content item.
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group)
    }

    /// The catalog type name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::FeatureService => "Feature Service",
            Self::WebMap => "Web Map",
            Self::Dashboard => "Dashboard",
            Self::WebMappingApplication => "Web Mapping Application",
            Self::Group => "Group",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
