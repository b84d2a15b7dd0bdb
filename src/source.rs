//! Row sources: the ordered input rows a run selects its work from.

pub mod csv_source;
pub mod rows;

pub use csv_source::CsvRowSource;
pub use rows::{ColumnNames, RowAnomaly, RowSource, SourceRow};
