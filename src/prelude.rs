//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::blob::{BlobRef, create_blob, read_range, stream_insert, write_chunk};
pub use crate::context::ExecContext;
pub use crate::error::PoolExecError;
pub use crate::exec::{RowCallback, execute, execute_script, execute_transactional};
pub use crate::pool::{DbPool, Lease, PoolOptions, PoolOptionsBuilder};
pub use crate::results::Row;
pub use crate::types::{ExtraColumns, NamedParams, RowValues};
