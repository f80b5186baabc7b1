//! RowService: generic row operations using the safe SQL builder.

mod rows;
pub use rows::{RowService, TableData};
