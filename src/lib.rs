//! Solution deployer: capture interrelated catalog items and redeploy them.
//!
//! A *solution* is a group of catalog items that reference each other: data
//! services, maps built on them, dashboards and applications built on the
//! maps. This crate captures such items into a portable, order-independent
//! template [`Bundle`](models::Bundle) and later recreates the bundle in another
//! catalog, reconstructing every id, url and field name the destination assigns
//! differently.
//!
//! # Architecture Overview
//!
//! - Capture replaces environment specific identifiers with placeholders such
//!   as `{{abc.url}}` or `{{abc.fieldInfos.layer0.fields.owner}}` ([`templating`]).
//! - Deployment sequences the templates so that every item comes after the
//!   items it depends on ([`resolver`]), creates them one by one, and records
//!   each created item's new identity in a [`SettingsRegistry`](settings::SettingsRegistry).
//! - Composite items (multi-layer services) are assembled one sub-part at a
//!   time because the backend does not accept concurrent structural changes
//!   ([`deployer::pipeline`]).
//! - Placeholders are resolved against the registry as soon as the items they
//!   name exist ([`templating::resolver`]).
//!
//! # Core Modules
//!
//! - [`core`] - error types and item kinds
//! - [`models`] - templates and bundles
//! - [`templating`] - templatization and de-templatization
//! - [`settings`] - the settings registry and field rename maps
//! - [`resolver`] - dependency graph, deployment order, reference discovery
//! - [`catalog`] - catalog client trait and its REST implementation
//! - [`deployer`] - orchestration, serial assembly, progress reporting, capture
//!
//! # Supporting Modules
//!
//! - [`cli`] - the `soldeploy` command line
//! - [`config`] - user configuration (`~/.soldeploy/config.toml`)
//! - [`constants`] - shared constants
//! - [`utils`] - file writes and progress bars
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use solution_deployer::core::ItemKind;
//! use solution_deployer::models::Template;
//! use solution_deployer::resolver::sequence;
//!
//! let templates = vec![
//!     Template::new("abc", ItemKind::WebMap, json!({})).with_dependencies(["ghi", "def"]),
//!     Template::new("def", ItemKind::FeatureService, json!({})),
//!     Template::new("ghi", ItemKind::FeatureService, json!({})),
//! ];
//! assert_eq!(sequence(&templates).unwrap(), vec!["ghi", "def", "abc"]);
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod deployer;
pub mod models;
pub mod resolver;
pub mod settings;
pub mod templating;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
