//! The trained model artifact: gene identifiers, graph, and embedding.

use std::path::{Path, PathBuf};

use crate::{
    embed::{Embedding, EmbeddingParams},
    genes::GeneIdRegistry,
    graph::Graph,
};

/// File name of the flattened gene identifier table.
pub const HGNC_INFO_JSONL: &str = "hgnc_info.jsonl";
/// File name of the serialized graph.
pub const GRAPH_BIN: &str = "graph.bin";
/// File name of the serialized embedding.
pub const EMBEDDING_BIN: &str = "embedding.bin";
/// File name of the word2vec text export of the embedding.
pub const EMBEDDING_TXT: &str = "embedding.txt";
/// File name of the embedding parameters.
pub const EMBEDDING_PARAMS_JSON: &str = "embedding_params.json";
/// File name of the copied ontology.
pub const HP_OBO: &str = "hp.obo";

/// Where to find graph and embedding of a model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelLayout {
    /// Everything lives in the model directory.
    #[default]
    Standard,
    /// Graph and embedding live in the directory structure of an older
    /// release rooted at the given path.
    Legacy(PathBuf),
}

impl ModelLayout {
    /// Construct from an optional legacy root path.
    pub fn from_legacy_path(legacy_path: Option<&Path>) -> Self {
        match legacy_path {
            Some(path) => ModelLayout::Legacy(path.to_path_buf()),
            None => ModelLayout::Standard,
        }
    }

    /// Path to the graph file.
    pub fn path_graph(&self, path_model: &Path) -> PathBuf {
        match self {
            ModelLayout::Standard => path_model.join(GRAPH_BIN),
            ModelLayout::Legacy(legacy) => legacy
                .join("data")
                .join("processed")
                .join("knowledge_graph")
                .join("unweighted")
                .join("train100.bin"),
        }
    }

    /// Path to the embedding file.
    pub fn path_embedding(&self, path_model: &Path) -> PathBuf {
        match self {
            ModelLayout::Standard => path_model.join(EMBEDDING_BIN),
            ModelLayout::Legacy(legacy) => legacy
                .join("models")
                .join("unweighted")
                .join("node2vec.bin"),
        }
    }
}

/// Read-only handle to a trained model.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Gene identifier registry.
    pub genes: GeneIdRegistry,
    /// The knowledge graph the embedding was fitted on.
    pub graph: Graph,
    /// One vector per graph node.
    pub embedding: Embedding,
    /// The parameters used for the embedding, if recorded.
    pub params: Option<EmbeddingParams>,
}

impl TrainedModel {
    /// Load model from `path_model`.
    ///
    /// The gene identifier table is always read from the model directory;
    /// graph and embedding are located through `layout`.
    pub fn load<P: AsRef<Path>>(
        path_model: P,
        layout: &ModelLayout,
    ) -> Result<Self, anyhow::Error> {
        let path_model = path_model.as_ref();
        if !path_model.is_dir() {
            anyhow::bail!("model directory {:?} does not exist", path_model);
        }
        if let ModelLayout::Legacy(legacy) = layout {
            tracing::info!("(using legacy model paths from {:?})", legacy);
        }

        let genes = GeneIdRegistry::from_jsonl(path_model.join(HGNC_INFO_JSONL))?;
        let graph = Graph::load_bin(layout.path_graph(path_model))?;
        let embedding = Embedding::load_bin(layout.path_embedding(path_model))?;
        let path_params = path_model.join(EMBEDDING_PARAMS_JSON);
        let params = if path_params.exists() {
            Some(EmbeddingParams::from_json_file(&path_params)?)
        } else {
            None
        };

        Ok(Self {
            genes,
            graph,
            embedding,
            params,
        })
    }

    /// Path to the ontology copied into the model directory, if present.
    pub fn path_obo<P: AsRef<Path>>(path_model: P) -> Option<PathBuf> {
        let path = path_model.as_ref().join(HP_OBO);
        path.exists().then_some(path)
    }
}

/// Write graph and embedding into the model directory `path_out`.
pub fn write_graph_and_model<P: AsRef<Path>>(
    path_out: P,
    graph: &Graph,
    embedding: &Embedding,
) -> Result<(), anyhow::Error> {
    let path_out = path_out.as_ref();
    std::fs::create_dir_all(path_out)
        .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", path_out, e))?;
    graph.write_bin(path_out.join(GRAPH_BIN))?;
    embedding.write_bin(path_out.join(EMBEDDING_BIN))?;
    embedding.write_word2vec(path_out.join(EMBEDDING_TXT))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{write_graph_and_model, ModelLayout, TrainedModel};
    use crate::{
        embed::{Embedding, EmbeddingParams},
        genes::{test::gene_ids, write_hgnc_info_jsonl},
        graph::Graph,
    };

    #[test]
    fn layout_paths() {
        let model = Path::new("model");
        assert_eq!(
            ModelLayout::Standard.path_graph(model),
            Path::new("model/graph.bin")
        );
        let legacy = ModelLayout::from_legacy_path(Some(Path::new("legacy")));
        assert_eq!(
            legacy.path_graph(model),
            Path::new("legacy/data/processed/knowledge_graph/unweighted/train100.bin")
        );
        assert_eq!(
            legacy.path_embedding(model),
            Path::new("legacy/models/unweighted/node2vec.bin")
        );
    }

    #[test]
    fn write_and_load() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path_model = tmp_dir.join("model");
        let mut graph = Graph::new();
        graph.add_edge("HGNC:1", "HP:0000001");
        let mut embedding = Embedding::new(2);
        embedding.insert("HGNC:1", vec![1.0, 0.0])?;
        embedding.insert("HP:0000001", vec![0.5, 0.5])?;

        write_graph_and_model(&path_model, &graph, &embedding)?;
        write_hgnc_info_jsonl(
            path_model.join("hgnc_info.jsonl"),
            &[gene_ids("AAA", "HGNC:1", "1")],
        )?;
        EmbeddingParams::with_seed(1).write_json_file(path_model.join("embedding_params.json"))?;

        let model = TrainedModel::load(&path_model, &ModelLayout::Standard)?;

        assert_eq!(model.graph, graph);
        assert_eq!(model.embedding, embedding);
        assert_eq!(model.genes.len(), 1);
        assert_eq!(model.params, Some(EmbeddingParams::with_seed(1)));
        assert!(path_model.join("embedding.txt").exists());
        assert_eq!(TrainedModel::path_obo(&path_model), None);

        Ok(())
    }

    #[test]
    fn load_missing_dir_fails() {
        assert!(TrainedModel::load("does/not/exist", &ModelLayout::Standard).is_err());
    }
}
