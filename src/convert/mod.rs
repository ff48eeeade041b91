pub mod csv_io;
pub mod expand;
pub mod grouping;
pub mod models;
pub mod pricing;

pub use csv_io::{read_output_rows, read_source_rows, write_output_rows};
pub use expand::{ExpandOptions, SkuSequence, expand_all};
pub use grouping::group_rows;
pub use models::{GroupedProducts, OutputRow};
