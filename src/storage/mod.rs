pub mod blob;
pub mod db;
pub mod repository;
pub(crate) mod schema;
