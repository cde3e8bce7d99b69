// src/catalog/mod.rs
pub mod naming;
pub mod resolver;

pub use naming::{DateKey, IndexName, NameParseError, PeriodKey, StatKey};
pub use resolver::{Catalog, Listing};
