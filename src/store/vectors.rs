//! Vector table operations
//!
//! `vault_vec` holds at most one embedding per `vault` rowid as a
//! little-endian f32 blob. Nearest-neighbour lookup is a batched brute-force
//! L2 scan — personal vaults top out in the low tens of thousands of vectors,
//! well inside brute-force territory.

use std::collections::HashMap;

use crate::math::l2_distance;

use super::helpers::{decode_embedding, StoreError};
use super::Store;

/// Rows fetched per scan batch; bounds memory to O(batch).
const SCAN_BATCH_SIZE: i64 = 5000;

pub(crate) async fn insert_vector_conn(
    conn: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    rowid: i64,
    blob: &[u8],
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO vault_vec (rowid, embedding) VALUES (?1, ?2)")
        .bind(rowid)
        .bind(blob)
        .execute(&mut **conn)
        .await?;
    Ok(())
}

pub(crate) async fn delete_vector_conn(
    conn: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    rowid: i64,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM vault_vec WHERE rowid = ?1")
        .bind(rowid)
        .execute(&mut **conn)
        .await?;
    Ok(())
}

impl Store {
    /// Number of stored vectors.
    pub fn vector_count(&self) -> Result<u64, StoreError> {
        self.rt.block_on(async {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vault_vec")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        })
    }

    /// The `k` nearest vectors to `query` by L2 distance, ascending.
    pub(crate) fn nearest_vectors(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(i64, f32)>, StoreError> {
        if k == 0 {
            return Ok(vec![]);
        }
        self.rt.block_on(async {
            let mut scored: Vec<(i64, f32)> = Vec::new();
            let mut last_rowid: i64 = i64::MIN;
            loop {
                let batch: Vec<(i64, Vec<u8>)> = sqlx::query_as(
                    "SELECT rowid, embedding FROM vault_vec
                     WHERE rowid > ?1 ORDER BY rowid ASC LIMIT ?2",
                )
                .bind(last_rowid)
                .bind(SCAN_BATCH_SIZE)
                .fetch_all(&self.pool)
                .await?;

                if batch.is_empty() {
                    break;
                }
                last_rowid = batch.last().map(|(r, _)| *r).unwrap_or(last_rowid);

                for (rowid, blob) in &batch {
                    let Some(embedding) = decode_embedding(blob) else {
                        continue;
                    };
                    let Some(dist) = l2_distance(query, &embedding) else {
                        continue;
                    };
                    scored.push((*rowid, dist));
                }
            }

            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
            scored.truncate(k);
            Ok(scored)
        })
    }

    /// Fetch stored embeddings for a set of rowids (for MMR and duplicate
    /// suppression).
    pub(crate) fn embeddings_for_rowids(
        &self,
        rowids: &[i64],
    ) -> Result<HashMap<i64, Vec<f32>>, StoreError> {
        if rowids.is_empty() {
            return Ok(HashMap::new());
        }
        self.rt.block_on(async {
            let placeholders: Vec<&str> = rowids.iter().map(|_| "?").collect();
            let sql = format!(
                "SELECT rowid, embedding FROM vault_vec WHERE rowid IN ({})",
                placeholders.join(",")
            );
            let mut q = sqlx::query_as::<_, (i64, Vec<u8>)>(&sql);
            for rowid in rowids {
                q = q.bind(rowid);
            }
            let rows = q.fetch_all(&self.pool).await?;
            Ok(rows
                .into_iter()
                .filter_map(|(rowid, blob)| decode_embedding(&blob).map(|e| (rowid, e)))
                .collect())
        })
    }
}
