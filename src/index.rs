//! Brute-force cosine similarity index over pre-computed embeddings

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::SnapshotStore;
use crate::Metadata;

/// Result from a similarity query
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: usize,
    vectors: &'a [Vec<f32>],
    metadata: &'a [Metadata],
    ids: &'a [String],
}

#[derive(Deserialize)]
struct Snapshot {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Metadata>,
    ids: Vec<String>,
}

/// Fixed-dimension vector index with cosine ranking
///
/// `vectors`, `metadata` and `ids` are index-aligned at all times.
pub struct EmbeddingIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Metadata>,
    ids: Vec<String>,
    next_seq: u64,
    store: Option<Box<dyn SnapshotStore>>,
}

impl EmbeddingIndex {
    /// Create an empty, process-lifetime index
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            metadata: Vec::new(),
            ids: Vec::new(),
            next_seq: 0,
            store: None,
        }
    }

    /// Create an index backed by `store`, loading whatever snapshot it holds
    ///
    /// A snapshot with a different dimension or misaligned arrays is logged
    /// and discarded; the index then starts empty.
    pub fn open(dimension: usize, store: Box<dyn SnapshotStore>) -> Self {
        let mut index = Self::new(dimension);
        match store.load() {
            Ok(Some(document)) => match serde_json::from_str::<Snapshot>(&document) {
                Ok(snapshot) => index.restore(snapshot, &store.describe()),
                Err(e) => warn!(
                    location = %store.describe(),
                    error = %e,
                    "Discarding malformed embedding snapshot"
                ),
            },
            Ok(None) => {}
            Err(e) => warn!(
                location = %store.describe(),
                error = %e,
                "Failed to read embedding snapshot, starting empty"
            ),
        }
        index.store = Some(store);
        index
    }

    fn restore(&mut self, snapshot: Snapshot, location: &str) {
        if snapshot.dimension != self.dimension {
            warn!(
                location = %location,
                stored = snapshot.dimension,
                configured = self.dimension,
                "Discarding embedding snapshot with mismatched dimension"
            );
            return;
        }
        let aligned = snapshot.vectors.len() == snapshot.metadata.len()
            && snapshot.vectors.len() == snapshot.ids.len();
        let well_formed = snapshot
            .vectors
            .iter()
            .all(|v| v.len() == self.dimension && v.iter().all(|x| x.is_finite()));
        if !aligned || !well_formed {
            warn!(location = %location, "Discarding inconsistent embedding snapshot");
            return;
        }

        self.next_seq = snapshot.ids.len() as u64;
        self.vectors = snapshot.vectors;
        self.metadata = snapshot.metadata;
        self.ids = snapshot.ids;
        debug!(location = %location, count = self.ids.len(), "Loaded embedding snapshot");
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Right length and every component finite
    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, vector.len()));
        }
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(Error::invalid_input(format!(
                "Embedding component {} is not finite",
                pos
            )));
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|existing| existing == id)
    }

    fn generate_id(&mut self) -> String {
        loop {
            let candidate = self.next_seq.to_string();
            self.next_seq += 1;
            if self.position(&candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Append a vector, returning its id
    pub fn insert(
        &mut self,
        vector: Vec<f32>,
        metadata: Metadata,
        id: Option<String>,
    ) -> Result<String> {
        self.check_vector(&vector)?;

        let id = match id {
            Some(id) if self.position(&id).is_some() => {
                return Err(Error::invalid_input(format!(
                    "Embedding id already exists: {}",
                    id
                )));
            }
            Some(id) => id,
            None => self.generate_id(),
        };

        self.vectors.push(vector);
        self.metadata.push(metadata);
        self.ids.push(id.clone());
        debug!(embedding_id = %id, count = self.ids.len(), "Inserted embedding");

        self.persist();
        Ok(id)
    }

    /// Look up an entry without ranking
    pub fn get(&self, id: &str) -> Option<(&[f32], &Metadata)> {
        self.position(id)
            .map(|pos| (self.vectors[pos].as_slice(), &self.metadata[pos]))
    }

    /// The `k` entries most similar to `vector`, best first
    ///
    /// Ties keep insertion order. Entries (or queries) with a zero norm, or
    /// whose similarity is not finite, score `0.0`; that condition is reported
    /// once per query.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_vector(vector)?;
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(vector);
        let mut degenerate = query_norm == 0.0;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, candidate)| {
                let candidate_norm = norm(candidate);
                if candidate_norm == 0.0 || query_norm == 0.0 {
                    degenerate = true;
                    return (pos, 0.0);
                }
                let score = (dot(candidate, vector) / (candidate_norm * query_norm)) as f32;
                if !score.is_finite() {
                    degenerate = true;
                    return (pos, 0.0);
                }
                // -0.0 would order below 0.0 under total_cmp
                (pos, if score == 0.0 { 0.0 } else { score })
            })
            .collect();

        if degenerate {
            warn!(
                dimension = self.dimension,
                entries = self.len(),
                "Degenerate vector in similarity query, affected scores set to 0.0"
            );
        }

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| SearchHit {
                id: self.ids[pos].clone(),
                metadata: self.metadata[pos].clone(),
                score,
            })
            .collect())
    }

    /// Remove an entry; `false` if the id is unknown
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.vectors.remove(pos);
        self.metadata.remove(pos);
        self.ids.remove(pos);
        debug!(embedding_id = %id, "Deleted embedding");

        self.persist();
        true
    }

    /// Remove every entry and forget the stored snapshot
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.metadata.clear();
        self.ids.clear();
        self.next_seq = 0;

        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(
                    location = %store.describe(),
                    error = %e,
                    "Failed to clear embedding snapshot, continuing in memory"
                );
            }
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = SnapshotRef {
            dimension: self.dimension,
            vectors: &self.vectors,
            metadata: &self.metadata,
            ids: &self.ids,
        };
        let result = serde_json::to_string(&snapshot)
            .map_err(Error::from)
            .and_then(|document| store.save(&document));
        if let Err(e) = result {
            warn!(
                location = %store.describe(),
                error = %e,
                "Failed to persist embedding index, continuing in memory"
            );
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum()
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}
