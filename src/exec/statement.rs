use rusqlite::types::Value;
use rusqlite::{Connection, Statement};
use tokio::sync::mpsc;

use crate::error::PoolExecError;
use crate::results::{ColumnShape, Row};
use crate::transaction::TxGuard;
use crate::types::{NamedParams, RowValues};

/// One statement paired with its parameter set.
pub(crate) type Batch = Vec<(String, NamedParams)>;

pub(crate) type RowSender = mpsc::Sender<(usize, Row)>;

/// Trim whitespace and one trailing `;`. `None` when nothing executable remains.
pub(crate) fn effective_sql(sql: &str) -> Option<&str> {
    let trimmed = sql.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Bind every declared parameter by name. Unmatched and positional parameters bind NULL.
pub(crate) fn bind_named(stmt: &mut Statement<'_>, params: &NamedParams) -> rusqlite::Result<()> {
    for idx in 1..=stmt.parameter_count() {
        let value = stmt
            .parameter_name(idx)
            .and_then(|name| params.lookup(name))
            .map_or(Value::Null, RowValues::to_sqlite_value);
        stmt.raw_bind_parameter(idx, value)?;
    }
    Ok(())
}

/// Blocking body of an executor call: optionally inside one transaction.
pub(crate) fn run_batch(
    conn: &Connection,
    batch: &[(String, NamedParams)],
    transactional: bool,
    sink: Option<&RowSender>,
) -> Result<(), PoolExecError> {
    if !transactional {
        return run_statements(conn, batch, sink);
    }
    let tx = TxGuard::begin(conn)?;
    run_statements(tx.conn(), batch, sink)?;
    tx.commit()
}

fn run_statements(
    conn: &Connection,
    batch: &[(String, NamedParams)],
    sink: Option<&RowSender>,
) -> Result<(), PoolExecError> {
    // Blank entries are skipped without consuming an index.
    let effective = batch
        .iter()
        .filter_map(|(sql, params)| effective_sql(sql).map(|sql| (sql, params)));
    for (idx, (sql, params)) in effective.enumerate() {
        run_one(conn, idx, sql, params, sink)?;
    }
    Ok(())
}

fn run_one(
    conn: &Connection,
    idx: usize,
    sql: &str,
    params: &NamedParams,
    sink: Option<&RowSender>,
) -> Result<(), PoolExecError> {
    let fail = |source: rusqlite::Error| PoolExecError::Statement {
        index: idx + 1,
        source,
    };

    let mut stmt = conn.prepare(sql).map_err(fail)?;
    bind_named(&mut stmt, params).map_err(fail)?;
    let shape = sink.map(|_| {
        ColumnShape::new(stmt.column_names().into_iter().map(str::to_owned).collect())
    });

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(fail)? {
        let (Some(tx), Some(shape)) = (sink, shape.as_ref()) else {
            continue;
        };
        let values = (0..shape.len())
            .map(|i| row.get_ref(i).map(RowValues::from_value_ref))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(fail)?;
        tx.blocking_send((idx, shape.row(values)))
            .map_err(|_| PoolExecError::RowConsumerClosed)?;
    }
    Ok(())
}
