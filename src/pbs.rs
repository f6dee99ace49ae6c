//! Protocol buffer messages for persisting trained models.

/// Serialized knowledge graph.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Graph {
    /// Node identifiers in insertion order.
    #[prost(string, repeated, tag = "1")]
    pub nodes: Vec<String>,
    /// Left-hand node index of each edge, in insertion order.
    #[prost(uint32, repeated, tag = "2")]
    pub edge_lhs: Vec<u32>,
    /// Right-hand node index of each edge, in insertion order.
    #[prost(uint32, repeated, tag = "3")]
    pub edge_rhs: Vec<u32>,
}

/// Embedding vector of one node.
#[derive(Clone, PartialEq, prost::Message)]
pub struct EmbeddingRecord {
    /// Node identifier.
    #[prost(string, tag = "1")]
    pub node: String,
    /// The vector.
    #[prost(float, repeated, tag = "2")]
    pub vector: Vec<f32>,
}

/// Serialized node embedding table.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Embedding {
    /// Number of dimensions of each vector.
    #[prost(uint32, tag = "1")]
    pub dimensions: u32,
    /// One record per node, in vocabulary order.
    #[prost(message, repeated, tag = "2")]
    pub records: Vec<EmbeddingRecord>,
}
