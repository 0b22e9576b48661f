use std::io::{Read, Seek, SeekFrom, Write};

use rusqlite::blob::Blob;
use rusqlite::types::Value;
use rusqlite::{Connection, DatabaseName};
use tokio::sync::mpsc;

use super::{BlobRef, CHUNK_SIZE};
use crate::error::PoolExecError;
use crate::transaction::TxGuard;
use crate::types::ExtraColumns;

/// Message from the async reader side of a streamed insert.
pub(crate) enum Feed {
    Data(Vec<u8>),
    Abort,
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Insert a row whose blob column is `size` zero bytes. Returns the new rowid.
pub(crate) fn insert_zeroblob(
    conn: &Connection,
    blob: &BlobRef,
    size: u64,
    extra: &ExtraColumns,
) -> Result<i64, PoolExecError> {
    let size = i64::try_from(size)
        .map_err(|_| PoolExecError::Config(format!("blob size {size} does not fit in i64")))?;

    let mut columns = vec![quote_ident(&blob.column)];
    let mut placeholders = vec!["zeroblob(?1)".to_owned()];
    let mut values = vec![Value::Integer(size)];
    for (idx, (name, value)) in extra.iter().enumerate() {
        columns.push(quote_ident(name));
        placeholders.push(format!("?{}", idx + 2));
        values.push(value.to_sqlite_value());
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&blob.table),
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(|source| PoolExecError::Insert {
            table: blob.table.clone(),
            source,
        })?;
    let row_id = conn.last_insert_rowid();
    tracing::debug!(table = %blob.table, row_id, size, "zeroblob row inserted");
    Ok(row_id)
}

pub(crate) fn open_blob<'c>(
    conn: &'c Connection,
    blob: &BlobRef,
    row_id: i64,
    read_only: bool,
) -> Result<Blob<'c>, PoolExecError> {
    conn.blob_open(DatabaseName::Main, &blob.table, &blob.column, row_id, read_only)
        .map_err(|source| PoolExecError::RowNotFound {
            table: blob.table.clone(),
            column: blob.column.clone(),
            row_id,
            source,
        })
}

/// Positional write that never grows or truncates the cell.
pub(crate) fn write_at(
    conn: &Connection,
    blob: &BlobRef,
    row_id: i64,
    offset: u64,
    data: &[u8],
) -> Result<(), PoolExecError> {
    let mut handle = open_blob(conn, blob, row_id, false)?;
    let expected = data.len();
    let size = u64::try_from(handle.size()).unwrap_or(0);
    let fits = offset
        .checked_add(expected as u64)
        .is_some_and(|end| end <= size);
    if !fits {
        return Err(PoolExecError::WriteLengthMismatch {
            row_id,
            written: 0,
            expected,
        });
    }
    let io = |source| PoolExecError::BlobIo { row_id, source };
    handle.seek(SeekFrom::Start(offset)).map_err(io)?;
    let written = handle.write(data).map_err(io)?;
    if written != expected {
        return Err(PoolExecError::WriteLengthMismatch {
            row_id,
            written,
            expected,
        });
    }
    Ok(())
}

/// Send `length` bytes (or everything to the end) starting at `offset` as chunks.
pub(crate) fn read_chunks(
    conn: &Connection,
    blob: &BlobRef,
    row_id: i64,
    offset: u64,
    length: Option<u64>,
    out: &mpsc::Sender<Vec<u8>>,
) -> Result<(), PoolExecError> {
    let mut handle = open_blob(conn, blob, row_id, true)?;
    let io = |source| PoolExecError::BlobIo { row_id, source };
    if offset > 0 {
        handle.seek(SeekFrom::Start(offset)).map_err(io)?;
    }

    let mut remaining = length;
    let mut buf = vec![0_u8; CHUNK_SIZE];
    loop {
        let want = match remaining {
            Some(0) => break,
            Some(n) => usize::try_from(n).map_or(CHUNK_SIZE, |n| n.min(CHUNK_SIZE)),
            None => CHUNK_SIZE,
        };
        let n = handle.read(&mut buf[..want]).map_err(io)?;
        if n == 0 {
            break;
        }
        out.blocking_send(buf[..n].to_vec())
            .map_err(|_| PoolExecError::RowConsumerClosed)?;
        if let Some(r) = remaining.as_mut() {
            *r -= n as u64;
        }
    }
    Ok(())
}

/// Insert a zeroblob row and fill it from `feed` inside one transaction.
pub(crate) fn insert_streamed(
    conn: &Connection,
    blob: &BlobRef,
    declared: u64,
    extra: &ExtraColumns,
    mut feed: mpsc::Receiver<Feed>,
) -> Result<i64, PoolExecError> {
    let tx = TxGuard::begin(conn)?;
    let row_id = insert_zeroblob(tx.conn(), blob, declared, extra)?;
    let mut handle = open_blob(tx.conn(), blob, row_id, false)?;

    let mut written = 0_u64;
    while let Some(msg) = feed.blocking_recv() {
        let Feed::Data(chunk) = msg else {
            return Err(PoolExecError::StreamAborted);
        };
        let total = written + chunk.len() as u64;
        if total > declared {
            return Err(PoolExecError::SizeMismatch {
                declared,
                actual: total,
            });
        }
        let n = handle
            .write(&chunk)
            .map_err(|source| PoolExecError::BlobIo { row_id, source })?;
        if n != chunk.len() {
            return Err(PoolExecError::WriteLengthMismatch {
                row_id,
                written: n,
                expected: chunk.len(),
            });
        }
        written = total;
    }
    if written != declared {
        return Err(PoolExecError::SizeMismatch {
            declared,
            actual: written,
        });
    }

    // An open blob handle keeps the transaction busy.
    drop(handle);
    tx.commit()?;
    Ok(row_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_double_quoted() {
        assert_eq!(quote_ident("files"), "\"files\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn write_past_end_is_rejected_without_partial_write() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB)")
            .expect("schema");
        let blob = BlobRef::new("files", "data");
        let row_id = insert_zeroblob(&conn, &blob, 4, &ExtraColumns::new()).expect("insert");

        let err = write_at(&conn, &blob, row_id, 2, b"abcd").unwrap_err();
        assert!(matches!(
            err,
            PoolExecError::WriteLengthMismatch {
                written: 0,
                expected: 4,
                ..
            }
        ));
        let data: Vec<u8> = conn
            .query_row("SELECT data FROM files WHERE id = ?1", [row_id], |r| r.get(0))
            .expect("select");
        assert_eq!(data, vec![0; 4]);
    }
}
