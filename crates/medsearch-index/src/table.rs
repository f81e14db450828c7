//! LanceDB connection helpers shared by the loader and the writer.

use anyhow::Result;
use arrow_array::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

/// Read every row of `name`. The explicit limit keeps the scan from stopping at
/// the query default.
pub async fn read_all(conn: &Connection, name: &str) -> Result<Vec<RecordBatch>> {
    let t = conn.open_table(name).execute().await?;
    let rows = t.count_rows(None).await?;
    if rows == 0 { return Ok(Vec::new()); }
    let mut stream = t.query().limit(rows).execute().await?;
    let mut batches = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        if batch.num_rows() > 0 { batches.push(batch); }
    }
    Ok(batches)
}
