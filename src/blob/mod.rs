//! Chunked blob I/O on pooled connections.
//!
//! A blob cell is reserved at a fixed size with `zeroblob(n)` and then read or written through
//! an incremental blob handle. Bytes move between the blocking worker and the caller's
//! `AsyncRead`/`AsyncWrite` in [`CHUNK_SIZE`] pieces over a bounded channel, so neither side
//! holds the whole value.

mod handle;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::context::ExecContext;
use crate::error::PoolExecError;
use crate::pool::{DbPool, join};
use crate::types::ExtraColumns;

use handle::Feed;

/// Transfer unit between the blob handle and the caller's reader or writer.
pub const CHUNK_SIZE: usize = 64 * 1024;

const CHUNK_CHANNEL_DEPTH: usize = 4;

/// Table and column holding a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef {
    pub table: String,
    pub column: String,
}

impl BlobRef {
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Insert a row holding `size` zero bytes in the blob column plus `extra` columns.
///
/// # Errors
/// `Insert` when the row cannot be inserted (constraint violation, missing table, size above
/// the engine limit); acquisition errors from [`DbPool::acquire`].
pub async fn create_blob(
    pool: &DbPool,
    ctx: &ExecContext,
    blob: &BlobRef,
    size: u64,
    extra: &ExtraColumns,
) -> Result<i64, PoolExecError> {
    let lease = pool.acquire(ctx).await?;
    let blob = blob.clone();
    let extra = extra.clone();
    lease
        .with_connection(move |conn| handle::insert_zeroblob(conn, &blob, size, &extra))
        .await
}

/// Overwrite `data.len()` bytes at `offset` in an existing blob.
///
/// The cell never grows: a write that would run past its reserved size fails with
/// `WriteLengthMismatch` and leaves the cell unchanged.
///
/// # Errors
/// `RowNotFound`, `WriteLengthMismatch`, `BlobIo`, or acquisition errors.
pub async fn write_chunk(
    pool: &DbPool,
    ctx: &ExecContext,
    blob: &BlobRef,
    row_id: i64,
    offset: u64,
    data: &[u8],
) -> Result<(), PoolExecError> {
    let lease = pool.acquire(ctx).await?;
    let blob = blob.clone();
    let data = data.to_vec();
    lease
        .with_connection(move |conn| handle::write_at(conn, &blob, row_id, offset, &data))
        .await
}

/// Copy a byte range of a blob into `sink` and return the number of bytes copied.
///
/// `length == None` copies to the end of the blob. A range that runs past the end stops at
/// the end. The sink is flushed before returning.
///
/// # Errors
/// `RowNotFound` when the row, table or column does not address a blob; `BlobIo` for a seek
/// past the end; `Io` when the sink fails.
pub async fn read_range<W>(
    pool: &DbPool,
    ctx: &ExecContext,
    blob: &BlobRef,
    row_id: i64,
    offset: u64,
    length: Option<u64>,
    sink: &mut W,
) -> Result<u64, PoolExecError>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let lease = pool.acquire(ctx).await?;
    let blob = blob.clone();
    let (tx, mut rx) = mpsc::channel(CHUNK_CHANNEL_DEPTH);
    let worker = lease.spawn_blocking(move |conn| {
        handle::read_chunks(conn, &blob, row_id, offset, length, &tx)
    });

    let mut copied = 0_u64;
    let mut sink_result = Ok(());
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = sink.write_all(&chunk).await {
            sink_result = Err(e);
            break;
        }
        copied += chunk.len() as u64;
    }
    drop(rx);
    let read = join(worker).await;
    drop(lease);

    sink_result?;
    read?;
    sink.flush().await?;
    tracing::debug!(row_id, copied, "blob range read");
    Ok(copied)
}

/// Insert a new blob row and fill it from `source` in one transaction.
///
/// The source must yield exactly `declared_size` bytes. Too many bytes fail as soon as the
/// excess is seen, too few once the source ends; either way, and on any other failure, the
/// transaction rolls back and no row remains.
///
/// # Errors
/// `SizeMismatch`, `Insert`, `Io` (from the source), `BlobIo`, transaction errors, or
/// acquisition errors.
pub async fn stream_insert<R>(
    pool: &DbPool,
    ctx: &ExecContext,
    blob: &BlobRef,
    declared_size: u64,
    source: &mut R,
    extra: &ExtraColumns,
) -> Result<i64, PoolExecError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let lease = pool.acquire(ctx).await?;
    let blob = blob.clone();
    let extra = extra.clone();
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_DEPTH);
    let worker = lease.spawn_blocking(move |conn| {
        handle::insert_streamed(conn, &blob, declared_size, &extra, rx)
    });

    let mut source_err = None;
    let mut buf = vec![0_u8; CHUNK_SIZE];
    loop {
        match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                // A closed channel means the writer already failed; its error wins.
                if tx.send(Feed::Data(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Feed::Abort).await;
                source_err = Some(e);
                break;
            }
        }
    }
    drop(tx);
    let inserted = join(worker).await;
    drop(lease);

    if let Some(e) = source_err {
        return Err(PoolExecError::Io(e));
    }
    let row_id = inserted?;
    tracing::debug!(row_id, declared_size, "blob streamed");
    Ok(row_id)
}
