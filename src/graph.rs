//! The knowledge graph of genes and phenotype terms.

use std::{path::Path, time::Instant};

use indexmap::IndexSet;
use prost::Message;
use thousands::Separable;

use crate::{
    links::{yield_gene2phen_edges, yield_hpo_edges, PhenotypeLink},
    ontology::{Ontology, TermCanonicalizer},
    pbs,
};

/// Undirected, unweighted simple graph over string node IDs.
///
/// Nodes are kept in order of first insertion and neighbors in order of edge
/// insertion.  Everything that iterates the graph (and thus the tie-breaking
/// in the gene ranking) follows this order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    /// Node IDs in first-insertion order.
    nodes: IndexSet<String>,
    /// Neighbor indices of each node.
    adjacency: Vec<IndexSet<usize>>,
    /// Edges in insertion order as pairs of node indices.
    edges: Vec<(usize, usize)>,
}

impl Graph {
    /// Construct empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add node if not present yet and return its index.
    pub fn add_node(&mut self, node: &str) -> usize {
        if let Some(idx) = self.nodes.get_index_of(node) {
            idx
        } else {
            self.adjacency.push(IndexSet::new());
            self.nodes.insert_full(node.to_string()).0
        }
    }

    /// Add undirected edge; adding an existing edge again has no effect.
    pub fn add_edge(&mut self, lhs: &str, rhs: &str) {
        let lhs = self.add_node(lhs);
        let rhs = self.add_node(rhs);
        if self.adjacency[lhs].insert(rhs) {
            self.adjacency[rhs].insert(lhs);
            self.edges.push((lhs, rhs));
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node IDs in first-insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// ID of the node with the given index.
    pub fn node(&self, idx: usize) -> Option<&str> {
        self.nodes.get_index(idx).map(String::as_str)
    }

    /// Index of the node with the given ID.
    pub fn node_index(&self, node: &str) -> Option<usize> {
        self.nodes.get_index_of(node)
    }

    /// Whether the graph contains the node.
    pub fn contains_node(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Neighbor indices of the node with index `idx`.
    pub fn neighbors(&self, idx: usize) -> &IndexSet<usize> {
        &self.adjacency[idx]
    }

    /// Whether the nodes with indices `lhs` and `rhs` are adjacent.
    pub fn has_edge(&self, lhs: usize, rhs: usize) -> bool {
        self.adjacency
            .get(lhs)
            .map(|neighbors| neighbors.contains(&rhs))
            .unwrap_or(false)
    }

    /// Edges in insertion order as pairs of node IDs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .map(|(lhs, rhs)| (self.nodes[*lhs].as_str(), self.nodes[*rhs].as_str()))
    }

    /// Convert to protocol buffers representation.
    pub fn to_pbs(&self) -> pbs::Graph {
        pbs::Graph {
            nodes: self.nodes.iter().cloned().collect(),
            edge_lhs: self.edges.iter().map(|(lhs, _)| *lhs as u32).collect(),
            edge_rhs: self.edges.iter().map(|(_, rhs)| *rhs as u32).collect(),
        }
    }

    /// Construct from protocol buffers representation.
    pub fn from_pbs(graph: pbs::Graph) -> Result<Self, anyhow::Error> {
        if graph.edge_lhs.len() != graph.edge_rhs.len() {
            anyhow::bail!(
                "corrupt graph: {} left-hand but {} right-hand edge nodes",
                graph.edge_lhs.len(),
                graph.edge_rhs.len()
            );
        }
        let mut result = Self::new();
        for node in &graph.nodes {
            result.add_node(node);
        }
        if result.node_count() != graph.nodes.len() {
            anyhow::bail!("corrupt graph: duplicate node IDs");
        }
        for (lhs, rhs) in graph.edge_lhs.iter().zip(graph.edge_rhs.iter()) {
            let (lhs, rhs) = (*lhs as usize, *rhs as usize);
            if lhs >= result.node_count() || rhs >= result.node_count() {
                anyhow::bail!("corrupt graph: edge ({}, {}) out of range", lhs, rhs);
            }
            if result.adjacency[lhs].insert(rhs) {
                result.adjacency[rhs].insert(lhs);
                result.edges.push((lhs, rhs));
            }
        }
        Ok(result)
    }

    /// Write graph as protocol buffers to `path`.
    pub fn write_bin<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        tracing::info!("Saving graph to {:?}...", path.as_ref());
        std::fs::write(path.as_ref(), self.to_pbs().encode_to_vec())
            .map_err(|e| anyhow::anyhow!("error writing {:?}: {}", path.as_ref(), e))?;
        tracing::info!("... done saving graph");
        Ok(())
    }

    /// Load graph from protocol buffers file at `path`.
    pub fn load_bin<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("Loading graph from {:?}...", path.as_ref());
        let before_loading = Instant::now();
        let fcontents = std::fs::read(path.as_ref())
            .map_err(|e| anyhow::anyhow!("error reading {:?}: {}", path.as_ref(), e))?;
        let graph = pbs::Graph::decode(&fcontents[..])
            .map_err(|e| anyhow::anyhow!("error decoding {:?}: {}", path.as_ref(), e))?;
        let result = Self::from_pbs(graph)
            .map_err(|e| anyhow::anyhow!("error in {:?}: {}", path.as_ref(), e))?;
        tracing::info!(
            "... done loading graph with {} nodes and {} edges in {:?}",
            result.node_count().separate_with_commas(),
            result.edge_count().separate_with_commas(),
            before_loading.elapsed()
        );
        Ok(result)
    }
}

/// Build the training graph from the ontology hierarchy and gene to
/// phenotype links.
///
/// Hierarchy edges come first, followed by the link edges in the order of
/// `link_lists`.  Phenotype IDs of links are canonicalized through the
/// ontology's alternative ID table.
pub fn build_graph(ontology: &Ontology, link_lists: &[&[PhenotypeLink]]) -> Graph {
    tracing::info!("Constructing training graph ...");
    let before_building = Instant::now();
    let canonicalizer = TermCanonicalizer::from_ontology(ontology);

    let mut graph = Graph::new();
    let mut edge_count = 0usize;
    for (lhs, rhs) in yield_hpo_edges(ontology) {
        graph.add_edge(&lhs, &rhs);
        edge_count += 1;
    }
    for links in link_lists {
        for (hgnc_id, hpo_term) in yield_gene2phen_edges(links) {
            graph.add_edge(&hgnc_id, canonicalizer.canonicalize(&hpo_term));
            edge_count += 1;
        }
    }

    tracing::info!(
        "... done constructing training graph with {} edges ({} distinct) and {} nodes in {:?}",
        edge_count.separate_with_commas(),
        graph.edge_count().separate_with_commas(),
        graph.node_count().separate_with_commas(),
        before_building.elapsed()
    );
    graph
}
