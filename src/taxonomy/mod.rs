pub mod catalog;
pub mod selector;

pub use catalog::CategoryCatalog;
pub use selector::{CategorySelection, CategorySelector};
