//! Dependency resolution and deployment ordering.
//!
//! Templates declare the items they depend on through `dependency_ids`. This
//! module turns those declarations into a [`DependencyGraph`] and produces the
//! deployment order, failing before any backend call when the declarations
//! form a cycle or name an item that is not in the bundle.
//!
//! # Ordering
//!
//! [`sequence`] is a depth first topological sort:
//!
//! 1. Templates are visited in bundle order.
//! 2. Each template's dependencies are visited, in declaration order, before
//!    the template itself is emitted.
//! 3. Reaching a template that is still on the visiting path is a cycle and
//!    aborts with [`SolutionError::CyclicDependency`](crate::core::SolutionError).
//!
//! The tie break between independent templates is bundle order. It has no
//! meaning for the deployment itself but keeps the output reproducible.
//!
//! Sequencing is pure and synchronous.
//!
//! # Discovery
//!
//! [`referenced_owner_ids`] and [`undeclared_references`] inspect placeholders
//! to find references the declarations missed. They are diagnostics and never
//! change the order.

pub mod dependency_graph;
pub mod discovery;

pub use dependency_graph::{DependencyGraph, DependencyNode, dependency_edges, sequence};
pub use discovery::{referenced_owner_ids, undeclared_references};
