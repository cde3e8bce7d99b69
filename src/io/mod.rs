// src/io/mod.rs
pub mod reader;
pub mod writer;

pub use reader::{read_layer, GeoInfo, Layer};
pub use writer::ChvWriter;
