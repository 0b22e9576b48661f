//! Row values handed to executor callbacks.

mod row;

pub use row::{ColumnShape, Row};
