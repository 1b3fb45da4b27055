pub mod catalog;
pub mod engine;
pub mod error;
pub mod schema;
pub mod translate;
pub mod value;

pub use catalog::{CatalogBuilder, SchemaCatalog};
pub use error::*;
pub use schema::*;
pub use translate::{Decoded, Outcome, Translator, VersionPairing};
pub use value::{Record, Value};
