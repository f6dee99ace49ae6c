//! Node2vec embedding: biased second-order random walks followed by
//! skip-gram training with negative sampling.
//!
//! Results only depend on the graph and the seeds in the parameters, not on
//! the number of worker threads.

use std::time::Instant;

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use thousands::Separable;

use super::{dot, Embedder, Embedding, EmbeddingParams};
use crate::graph::Graph;

/// Number of passes over the walks.
const EPOCHS: usize = 5;
/// Number of negative samples per positive pair.
const NEGATIVE: usize = 5;
/// Initial learning rate.
const ALPHA: f32 = 0.025;
/// Final learning rate.
const MIN_ALPHA: f32 = 0.0001;
/// Exponent for the negative sampling distribution.
const NS_EXPONENT: f64 = 0.75;
/// Clamp for the sigmoid argument.
const MAX_EXP: f32 = 6.0;

/// The node2vec embedder.
#[derive(Debug, Clone)]
pub struct Node2Vec {
    /// Number of worker threads used for generating the walks.
    pub workers: usize,
}

impl Default for Node2Vec {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

/// Derive the seed for walk number `walk_no`.
fn walk_seed(seed: u64, walk_no: usize) -> u64 {
    seed.wrapping_add(walk_no as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Sample the next node of the walk after `prev -> curr`.
fn next_node(graph: &Graph, prev: usize, curr: usize, p: f64, q: f64, rng: &mut StdRng) -> usize {
    let neighbors = graph.neighbors(curr);
    let weights = neighbors
        .iter()
        .map(|&x| {
            if x == prev {
                1.0 / p
            } else if graph.has_edge(x, prev) {
                1.0
            } else {
                1.0 / q
            }
        })
        .collect::<Vec<f64>>();
    let total: f64 = weights.iter().sum();
    let mut threshold = rng.gen::<f64>() * total;
    for (idx, weight) in weights.iter().enumerate() {
        if threshold < *weight {
            return neighbors[idx];
        }
        threshold -= weight;
    }
    neighbors[neighbors.len() - 1]
}

/// Generate one walk starting at `start`.
fn walk(graph: &Graph, start: usize, params: &EmbeddingParams, rng: &mut StdRng) -> Vec<usize> {
    let mut result = Vec::with_capacity(params.walk_length);
    result.push(start);
    while result.len() < params.walk_length {
        let curr = result[result.len() - 1];
        let neighbors = graph.neighbors(curr);
        if neighbors.is_empty() {
            break;
        }
        let next = if result.len() == 1 {
            neighbors[rng.gen_range(0..neighbors.len())]
        } else {
            let prev = result[result.len() - 2];
            next_node(graph, prev, curr, params.p, params.q, rng)
        };
        result.push(next);
    }
    result
}

/// Generate `num_walks` walks from each node; the walks of each round are
/// shuffled.
pub fn generate_walks(graph: &Graph, params: &EmbeddingParams) -> Vec<Vec<usize>> {
    let node_count = graph.node_count();
    let mut walks = (0..params.num_walks * node_count)
        .into_par_iter()
        .map(|walk_no| {
            let mut rng = StdRng::seed_from_u64(walk_seed(params.seed_embedding, walk_no));
            walk(graph, walk_no % node_count, params, &mut rng)
        })
        .collect::<Vec<_>>();
    let mut rng = StdRng::seed_from_u64(params.seed_embedding);
    for round in walks.chunks_mut(node_count.max(1)) {
        round.shuffle(&mut rng);
    }
    walks
}

fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-MAX_EXP, MAX_EXP);
    1.0 / (1.0 + (-x).exp())
}

/// Skip-gram model with negative sampling over the walk "sentences".
struct SkipGram {
    dimensions: usize,
    /// Input vectors, these become the embedding.
    syn0: Vec<f32>,
    /// Output vectors for negative sampling.
    syn1neg: Vec<f32>,
    /// Cumulative negative sampling distribution.
    cum_table: Vec<f64>,
}

impl SkipGram {
    fn new(counts: &[usize], dimensions: usize, rng: &mut StdRng) -> Self {
        let vocab_size = counts.len();
        let syn0 = (0..vocab_size * dimensions)
            .map(|_| (rng.gen::<f32>() - 0.5) / dimensions as f32)
            .collect();
        let mut cum_table = Vec::with_capacity(vocab_size);
        let mut acc = 0.0;
        for count in counts {
            acc += (*count as f64).powf(NS_EXPONENT);
            cum_table.push(acc);
        }
        Self {
            dimensions,
            syn0,
            syn1neg: vec![0.0; vocab_size * dimensions],
            cum_table,
        }
    }

    fn sample_negative(&self, rng: &mut StdRng) -> usize {
        let total = self.cum_table[self.cum_table.len() - 1];
        let threshold = rng.gen::<f64>() * total;
        self.cum_table
            .partition_point(|x| *x <= threshold)
            .min(self.cum_table.len() - 1)
    }

    /// Update for the pair of input word `input` and predicted word `target`.
    fn train_pair(&mut self, input: usize, target: usize, alpha: f32, rng: &mut StdRng) {
        let d = self.dimensions;
        let l1 = self.syn0[input * d..(input + 1) * d].to_vec();
        let mut neu1e = vec![0.0f32; d];
        for k in 0..=NEGATIVE {
            let (word, label) = if k == 0 {
                (target, 1.0)
            } else {
                let word = self.sample_negative(rng);
                if word == target {
                    continue;
                }
                (word, 0.0)
            };
            let l2 = &mut self.syn1neg[word * d..(word + 1) * d];
            let g = (label - sigmoid(dot(&l1, l2))) * alpha;
            for i in 0..d {
                neu1e[i] += g * l2[i];
                l2[i] += g * l1[i];
            }
        }
        for (v, e) in self.syn0[input * d..(input + 1) * d]
            .iter_mut()
            .zip(neu1e.iter())
        {
            *v += e;
        }
    }

    fn vector(&self, word: usize) -> Vec<f32> {
        self.syn0[word * self.dimensions..(word + 1) * self.dimensions].to_vec()
    }
}

/// Fit skip-gram vectors on the walks and return the embedding for all
/// nodes that occur at least `min_count` times.
pub fn fit(graph: &Graph, walks: &[Vec<usize>], params: &EmbeddingParams) -> Embedding {
    // Build vocabulary in graph node order.
    let mut node_counts = vec![0usize; graph.node_count()];
    for walk in walks {
        for node in walk {
            node_counts[*node] += 1;
        }
    }
    let mut vocab_idx = vec![None; graph.node_count()];
    let mut vocab = Vec::new();
    let mut counts = Vec::new();
    for (node, count) in node_counts.iter().enumerate() {
        if *count > 0 && *count >= params.min_count {
            vocab_idx[node] = Some(vocab.len());
            vocab.push(node);
            counts.push(*count);
        }
    }
    let mut embedding = Embedding::new(params.dimensions);
    if vocab.is_empty() {
        return embedding;
    }

    let sentences = walks
        .iter()
        .map(|walk| {
            walk.iter()
                .filter_map(|node| vocab_idx[*node])
                .collect::<Vec<usize>>()
        })
        .collect::<Vec<_>>();
    let total_words = EPOCHS * sentences.iter().map(Vec::len).sum::<usize>();
    let batch_words = params.batch_words.max(1);
    let window = params.window.max(1);

    let mut rng = StdRng::seed_from_u64(params.seed_fit);
    let mut model = SkipGram::new(&counts, params.dimensions, &mut rng);
    let mut processed = 0usize;
    let mut alpha = ALPHA;
    for _ in 0..EPOCHS {
        for sentence in &sentences {
            for (pos, &word) in sentence.iter().enumerate() {
                let reduced = window - rng.gen_range(0..window);
                let begin = pos.saturating_sub(reduced);
                let end = (pos + reduced + 1).min(sentence.len());
                for (ctx_pos, &ctx) in sentence.iter().enumerate().take(end).skip(begin) {
                    if ctx_pos != pos {
                        model.train_pair(ctx, word, alpha, &mut rng);
                    }
                }
                processed += 1;
                if processed % batch_words == 0 {
                    let progress = processed as f32 / total_words as f32;
                    alpha = (ALPHA - (ALPHA - MIN_ALPHA) * progress).max(MIN_ALPHA);
                }
            }
        }
    }

    for (word, node) in vocab.iter().enumerate() {
        if let Some(node_id) = graph.node(*node) {
            embedding.vectors.insert(node_id.to_string(), model.vector(word));
        }
    }
    embedding
}

impl Embedder for Node2Vec {
    fn embed(&self, graph: &Graph, params: &EmbeddingParams) -> Result<Embedding, anyhow::Error> {
        if params.dimensions == 0 {
            anyhow::bail!("embedding dimensions must be positive");
        }
        if params.p <= 0.0 || params.q <= 0.0 {
            anyhow::bail!("p and q must be positive, got p={}, q={}", params.p, params.q);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .build()?;

        tracing::info!("Computing the embedding / model fit...");
        tracing::info!("- generating random walks");
        let before_walks = Instant::now();
        let walks = pool.install(|| generate_walks(graph, params));
        tracing::info!(
            "  ... generated {} walks in {:?}",
            walks.len().separate_with_commas(),
            before_walks.elapsed()
        );

        tracing::info!("- fitting model");
        let before_fit = Instant::now();
        let embedding = fit(graph, &walks, params);
        tracing::info!(
            "  ... fitted {} vectors in {:?}",
            embedding.len().separate_with_commas(),
            before_fit.elapsed()
        );
        tracing::info!("... done computing the embedding");

        Ok(embedding)
    }
}
