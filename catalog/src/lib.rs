//! Class Representation Engine: packed record codec, domain resolver,
//! class representation builder, and the `db_class`/`db_attribute`/
//! `db_index` catalog mirror (§1 "CRE", §4.1-§4.4).
pub mod domain;
pub mod error;
pub mod heap;
pub mod mirror;
pub mod record;
pub mod repr;
pub mod stats;

pub use error::{CatalogError, CatalogResult};
