//! Node embeddings of the knowledge graph.

use std::{io::Write, path::Path, time::Instant};

use indexmap::IndexMap;
use prost::Message;
use sha2::{Digest, Sha256};
use thousands::Separable;

use crate::{common::io::open_write_maybe_gz, graph::Graph, pbs};

pub mod node2vec;

/// Parameters for the embedding.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EmbeddingParams {
    /// The number of dimensions of feature vectors.
    pub dimensions: usize,
    /// The number of nodes in each random walk.
    pub walk_length: usize,
    /// Controls the probability for a walk to visit immediately back to the
    /// previous node.
    pub p: f64,
    /// Controls the probability for a walk to visit previously unexplored
    /// neighborhoods in the graph.
    pub q: f64,
    /// Number of random walks to be generated from each node in the graph.
    pub num_walks: usize,
    /// Limit on the number of words in each context.
    pub window: usize,
    /// Minimal number of occurrences of a node in the walks to be embedded.
    pub min_count: usize,
    /// Number of words after which the learning rate is updated.
    pub batch_words: usize,
    /// Seed for generating the random walks.
    pub seed_embedding: u64,
    /// Seed for fitting the model.
    pub seed_fit: u64,
}

impl Default for EmbeddingParams {
    fn default() -> Self {
        Self {
            dimensions: 300,
            walk_length: 60,
            p: 1.7987535798694703,
            q: 3.875406134463754,
            num_walks: 10,
            window: 4,
            min_count: 1,
            batch_words: 4,
            seed_embedding: 1,
            seed_fit: 1,
        }
    }
}

impl EmbeddingParams {
    /// Default parameters with seeds derived from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed_embedding: seed.wrapping_add(23),
            seed_fit: seed.wrapping_add(42),
            ..Default::default()
        }
    }

    /// Load from JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("problem reading {:?}: {}", path.as_ref(), e))?;
        serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("problem parsing {:?}: {}", path.as_ref(), e))
    }

    /// Write as pretty-printed JSON file.
    pub fn write_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)? + "\n")
            .map_err(|e| anyhow::anyhow!("problem writing {:?}: {}", path.as_ref(), e))
    }

    /// Hex digest over the compact JSON representation; used for naming runs.
    pub fn content_hash(&self) -> Result<String, anyhow::Error> {
        let json = serde_json::to_string(self)?;
        let digest = Sha256::digest(json.as_bytes());
        Ok(base16ct::lower::encode_string(&digest))
    }
}

/// Table of embedding vectors by node ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embedding {
    /// Number of dimensions of each vector.
    dimensions: usize,
    /// The vectors in vocabulary order.
    vectors: IndexMap<String, Vec<f32>>,
}

impl Embedding {
    /// Construct empty table with the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: IndexMap::new(),
        }
    }

    /// Insert vector for `node`.
    pub fn insert(&mut self, node: &str, vector: Vec<f32>) -> Result<(), anyhow::Error> {
        if vector.len() != self.dimensions {
            anyhow::bail!(
                "vector for {} has {} dimensions, expected {}",
                node,
                vector.len(),
                self.dimensions
            );
        }
        self.vectors.insert(node.to_string(), vector);
        Ok(())
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The vector for `node`, if any.
    pub fn get(&self, node: &str) -> Option<&[f32]> {
        self.vectors.get(node).map(Vec::as_slice)
    }

    /// Iterate over node IDs and vectors in vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.vectors
            .iter()
            .map(|(node, vector)| (node.as_str(), vector.as_slice()))
    }

    /// Convert to protocol buffers representation.
    pub fn to_pbs(&self) -> pbs::Embedding {
        pbs::Embedding {
            dimensions: self.dimensions as u32,
            records: self
                .vectors
                .iter()
                .map(|(node, vector)| pbs::EmbeddingRecord {
                    node: node.clone(),
                    vector: vector.clone(),
                })
                .collect(),
        }
    }

    /// Construct from protocol buffers representation.
    pub fn from_pbs(embedding: pbs::Embedding) -> Result<Self, anyhow::Error> {
        let mut result = Self::new(embedding.dimensions as usize);
        for record in embedding.records {
            result.insert(&record.node, record.vector)?;
        }
        Ok(result)
    }

    /// Write as protocol buffers to `path`.
    pub fn write_bin<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        tracing::info!("Saving embedding to {:?}...", path.as_ref());
        std::fs::write(path.as_ref(), self.to_pbs().encode_to_vec())
            .map_err(|e| anyhow::anyhow!("error writing {:?}: {}", path.as_ref(), e))?;
        tracing::info!("... done saving embedding");
        Ok(())
    }

    /// Load from protocol buffers file at `path`.
    pub fn load_bin<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("Loading embedding from {:?}...", path.as_ref());
        let before_loading = Instant::now();
        let fcontents = std::fs::read(path.as_ref())
            .map_err(|e| anyhow::anyhow!("error reading {:?}: {}", path.as_ref(), e))?;
        let embedding = pbs::Embedding::decode(&fcontents[..])
            .map_err(|e| anyhow::anyhow!("error decoding {:?}: {}", path.as_ref(), e))?;
        let result = Self::from_pbs(embedding)
            .map_err(|e| anyhow::anyhow!("error in {:?}: {}", path.as_ref(), e))?;
        tracing::info!(
            "... done loading {} vectors in {:?}",
            result.len().separate_with_commas(),
            before_loading.elapsed()
        );
        Ok(result)
    }

    /// Write in the word2vec text format (gzip by file extension).
    pub fn write_word2vec<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        tracing::debug!("writing word2vec text to {:?}", path.as_ref());
        let mut writer = open_write_maybe_gz(&path)?;
        writeln!(writer, "{} {}", self.len(), self.dimensions)?;
        for (node, vector) in self.iter() {
            write!(writer, "{}", node)?;
            for value in vector {
                write!(writer, " {}", value)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Dot product of two vectors of the same length.
pub fn dot(lhs: &[f32], rhs: &[f32]) -> f32 {
    lhs.iter().zip(rhs.iter()).map(|(a, b)| a * b).sum()
}

/// Capability of computing node embeddings for a graph.
pub trait Embedder {
    /// Compute one vector per graph node.
    fn embed(&self, graph: &Graph, params: &EmbeddingParams) -> Result<Embedding, anyhow::Error>;
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Embedding, EmbeddingParams};

    #[test]
    fn params_with_seed() {
        let params = EmbeddingParams::with_seed(1);
        assert_eq!(params.seed_embedding, 24);
        assert_eq!(params.seed_fit, 43);
        assert_eq!(params.dimensions, 300);
    }

    #[test]
    fn params_partial_json_uses_defaults() -> Result<(), anyhow::Error> {
        let params: EmbeddingParams = serde_json::from_str(r#"{"dimensions": 16, "p": 1.0}"#)?;
        assert_eq!(params.dimensions, 16);
        assert_eq!(params.p, 1.0);
        assert_eq!(params.walk_length, 60);
        Ok(())
    }

    #[test]
    fn params_json_file_roundtrip_and_hash() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("embedding_params.json");
        let params = EmbeddingParams::with_seed(7);

        params.write_json_file(&path)?;
        let loaded = EmbeddingParams::from_json_file(&path)?;

        assert_eq!(loaded, params);
        assert_eq!(loaded.content_hash()?, params.content_hash()?);
        assert_eq!(params.content_hash()?.len(), 64);
        assert_ne!(
            params.content_hash()?,
            EmbeddingParams::with_seed(8).content_hash()?
        );

        Ok(())
    }

    #[test]
    fn params_default_p_survives_json_file() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("embedding_params.json");
        let params = EmbeddingParams::default();

        params.write_json_file(&path)?;
        let loaded = EmbeddingParams::from_json_file(&path)?;

        assert_eq!(loaded.p.to_bits(), 1.7987535798694703f64.to_bits());
        assert_eq!(loaded.q.to_bits(), params.q.to_bits());
        assert_eq!(loaded.content_hash()?, params.content_hash()?);

        Ok(())
    }

    #[test]
    fn params_with_seed_near_max() {
        let params = EmbeddingParams::with_seed(u64::MAX);
        assert_eq!(params.seed_embedding, 22);
        assert_eq!(params.seed_fit, 41);
    }

    #[test]
    fn insert_checks_dimensions() {
        let mut embedding = Embedding::new(2);
        assert!(embedding.insert("A", vec![1.0, 2.0]).is_ok());
        assert!(embedding.insert("B", vec![1.0]).is_err());
        assert_eq!(embedding.len(), 1);
        assert_eq!(embedding.get("A"), Some(&[1.0f32, 2.0][..]));
        assert_eq!(embedding.get("B"), None);
    }

    #[test]
    fn dot() {
        assert_eq!(super::dot(&[1.0, 2.0, 3.0], &[4.0, -5.0, 6.0]), 12.0);
    }

    #[test]
    fn write_and_load_bin() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("embedding.bin");
        let mut embedding = Embedding::new(3);
        embedding.insert("HP:0000001", vec![0.5, -0.25, 1.0])?;
        embedding.insert("HGNC:1", vec![0.0, 2.0, -1.5])?;

        embedding.write_bin(&path)?;
        let loaded = Embedding::load_bin(&path)?;

        assert_eq!(loaded, embedding);
        assert_eq!(
            loaded.iter().map(|(node, _)| node).collect::<Vec<_>>(),
            vec!["HP:0000001", "HGNC:1"]
        );

        Ok(())
    }

    #[test]
    fn write_word2vec() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("embedding.txt");
        let mut embedding = Embedding::new(2);
        embedding.insert("HGNC:1", vec![0.5, -1.0])?;

        embedding.write_word2vec(&path)?;

        assert_eq!(std::fs::read_to_string(&path)?, "1 2\nHGNC:1 0.5 -1\n");

        Ok(())
    }
}
