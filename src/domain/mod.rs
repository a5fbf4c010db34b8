pub mod mapping;
pub mod page;
pub mod track;
