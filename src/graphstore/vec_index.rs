//! Persistent ANN index over `TextChunk` vectors (spec §6: "a vector index
//! over a named node label+property... exposing top-k nearest by cosine with
//! a pre-filter on a property"), backed by `sqlite-vec`'s `vec0` virtual
//! table when the `embeddings` feature is enabled. Grounded on
//! `src/storage/sqlite_vec.rs::SqliteVecStore` (vec0 + `PARTITION KEY` for
//! tenant isolation, L2-distance-to-cosine conversion on L2-normalized
//! vectors). Without the feature, every method here is a no-op and
//! `SqliteGraphStore::vector_search_chunks` falls back to the brute-force
//! cosine scan it already has.
//!
//! The virtual table's dimension is fixed at `CREATE VIRTUAL TABLE` time, but
//! `SqliteGraphStore::open`/`open_in_memory` take no dimension argument, so
//! creation is deferred to the first chunk embedding this index ever sees
//! (spec §3 invariant: "dimensionality changes require a full re-index", so
//! one group's first embedding fixes it for the table's lifetime).

#[cfg(feature = "embeddings")]
mod inner {
    use rusqlite::Connection;
    use sqlite_vec::sqlite3_vec_init;
    use std::sync::{Mutex, Once};

    static INIT: Once = Once::new();

    fn register_extension() {
        INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        });
    }

    fn f32_slice_as_bytes(slice: &[f32]) -> &[u8] {
        // SAFETY: f32 has no padding and a fixed layout; this is a trivial
        // reinterpretation, mirroring the teacher's `SqliteVecStore`.
        unsafe { std::slice::from_raw_parts(slice.as_ptr() as *const u8, std::mem::size_of_val(slice)) }
    }

    fn l2_normalize(v: &mut [f32]) {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
    }

    /// Lazily-created `vec_chunks` virtual table, one per `SqliteGraphStore`
    /// connection. `group_id` is the vec0 partition key so a query against
    /// one tenant never scans another's rows (universal invariant 1).
    pub struct VecIndex {
        dimensions: Mutex<Option<usize>>,
    }

    impl VecIndex {
        pub fn new() -> Self {
            register_extension();
            Self { dimensions: Mutex::new(None) }
        }

        fn ensure_table(&self, conn: &Connection, dims: usize) -> rusqlite::Result<bool> {
            let mut guard = self.dimensions.lock().unwrap();
            match *guard {
                Some(existing) => Ok(existing == dims),
                None => {
                    conn.execute_batch(&format!(
                        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(\
                             group_id TEXT PARTITION KEY, chunk_id TEXT, embedding float[{dims}])"
                    ))?;
                    *guard = Some(dims);
                    Ok(true)
                }
            }
        }

        /// Index (or re-index) one chunk's embedding. Silently skipped if the
        /// embedding's dimension doesn't match the table's fixed dimension —
        /// the brute-force fallback in `SqliteGraphStore` still covers it,
        /// and a dimension change is a data error the caller should catch via
        /// a full re-index (spec §3), not a panic here.
        pub fn upsert(&self, conn: &Connection, group_id: &str, chunk_id: &str, embedding: &[f32]) {
            if embedding.is_empty() {
                return;
            }
            match self.ensure_table(conn, embedding.len()) {
                Ok(true) => {}
                _ => return,
            }
            let mut normalized = embedding.to_vec();
            l2_normalize(&mut normalized);
            let bytes = f32_slice_as_bytes(&normalized);
            let _ = conn.execute(
                "DELETE FROM vec_chunks WHERE group_id = ?1 AND chunk_id = ?2",
                rusqlite::params![group_id, chunk_id],
            );
            let _ = conn.execute(
                "INSERT INTO vec_chunks(group_id, chunk_id, embedding) VALUES (?1, ?2, ?3)",
                rusqlite::params![group_id, chunk_id, bytes],
            );
        }

        pub fn delete_chunk(&self, conn: &Connection, group_id: &str, chunk_id: &str) {
            if self.dimensions.lock().unwrap().is_none() {
                return;
            }
            let _ = conn.execute(
                "DELETE FROM vec_chunks WHERE group_id = ?1 AND chunk_id = ?2",
                rusqlite::params![group_id, chunk_id],
            );
        }

        pub fn delete_group(&self, conn: &Connection, group_id: &str) {
            if self.dimensions.lock().unwrap().is_none() {
                return;
            }
            let _ = conn.execute("DELETE FROM vec_chunks WHERE group_id = ?1", rusqlite::params![group_id]);
        }

        /// Top-`top_k` nearest chunks by cosine similarity, or `None` if the
        /// table hasn't been created yet (no chunk ever indexed) or `query`'s
        /// dimension doesn't match — callers fall back to the brute-force
        /// scan in both cases.
        pub fn search(&self, conn: &Connection, group_id: &str, query: &[f32], top_k: usize) -> Option<Vec<(String, f32)>> {
            let dims = (*self.dimensions.lock().unwrap())?;
            if query.len() != dims || top_k == 0 {
                return None;
            }
            let mut normalized = query.to_vec();
            l2_normalize(&mut normalized);
            let bytes = f32_slice_as_bytes(&normalized);

            let mut stmt = conn
                .prepare(
                    "SELECT chunk_id, distance FROM vec_chunks \
                     WHERE embedding MATCH ?1 AND group_id = ?2 AND k = ?3",
                )
                .ok()?;
            let rows = stmt
                .query_map(rusqlite::params![bytes, group_id, top_k as i64], |row| {
                    let chunk_id: String = row.get(0)?;
                    let distance: f32 = row.get(1)?;
                    Ok((chunk_id, distance))
                })
                .ok()?;

            let mut out = Vec::new();
            for row in rows.flatten() {
                let (chunk_id, distance) = row;
                // Vectors are L2-normalized on insert, so L2 distance converts
                // to cosine similarity via sim = 1 - dist^2 / 2.
                let similarity = 1.0 - (distance * distance) / 2.0;
                out.push((chunk_id, similarity));
            }
            out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            Some(out)
        }
    }
}

#[cfg(not(feature = "embeddings"))]
mod inner {
    use rusqlite::Connection;

    /// No-op stand-in when the `embeddings` feature is off: every query
    /// returns `None` so callers unconditionally fall back to the
    /// brute-force cosine scan.
    #[derive(Default)]
    pub struct VecIndex;

    impl VecIndex {
        pub fn new() -> Self {
            Self
        }
        pub fn upsert(&self, _conn: &Connection, _group_id: &str, _chunk_id: &str, _embedding: &[f32]) {}
        pub fn delete_chunk(&self, _conn: &Connection, _group_id: &str, _chunk_id: &str) {}
        pub fn delete_group(&self, _conn: &Connection, _group_id: &str) {}
        pub fn search(&self, _conn: &Connection, _group_id: &str, _query: &[f32], _top_k: usize) -> Option<Vec<(String, f32)>> {
            None
        }
    }
}

pub use inner::VecIndex;
