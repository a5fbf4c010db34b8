//! Create, update, delete and search over the track catalog.

pub mod service;

pub use service::{CatalogService, Upload};
