//! Core types shared by every layer of the deployer: the error taxonomy and
//! the catalog item kinds.

pub mod error;
mod item_kind;

pub use error::{ErrorContext, RemoteRequestError, Result, SolutionError, user_friendly_error};
pub use item_kind::ItemKind;
