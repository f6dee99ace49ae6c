//! Training of the embedding model (`train` sub command).

use std::{path::PathBuf, time::Instant};

use clap::Parser;

use crate::{
    common::{io::open_read_maybe_gz, trace_rss_now},
    embed::{node2vec::Node2Vec, Embedder, EmbeddingParams},
    genes::{load_hgnc_json, write_hgnc_info_jsonl},
    graph::build_graph,
    links::{load_clinvar_gen2phen, load_hpo_gen2phen},
    model::{write_graph_and_model, EMBEDDING_PARAMS_JSON, HGNC_INFO_JSONL, HP_OBO},
    ontology::Ontology,
};

/// Command line arguments for `train` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Train the gene prioritization model", long_about = None)]
pub struct Args {
    /// Path to the output model directory.
    #[arg(long)]
    pub path_out: PathBuf,
    /// Path to the HGNC complete set JSON file.
    #[arg(long)]
    pub path_hgnc_json: PathBuf,
    /// Path to the clinical gene-phenotype links JSONL file.
    #[arg(long)]
    pub path_gene_hpo_links: PathBuf,
    /// Path to the HPO `genes_to_phenotype.txt` file.
    #[arg(long)]
    pub path_hpo_genes_to_phenotype: PathBuf,
    /// Path to the HPO OBO file.
    #[arg(long)]
    pub path_hpo_obo: PathBuf,
    /// Optional path to JSON file with embedding parameters.
    #[arg(long)]
    pub path_embedding_params: Option<PathBuf>,
    /// Number of worker threads for the embedding.
    #[arg(long, default_value_t = 1)]
    pub cpus: usize,
}

/// Main entry point for the `train` sub command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `train`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let before_training = Instant::now();
    let embedding_params = match &args.path_embedding_params {
        Some(path) => {
            tracing::info!("Loading embedding params from {:?}", path);
            EmbeddingParams::from_json_file(path)?
        }
        None => EmbeddingParams::default(),
    };
    tracing::debug!("embedding params = {:?}", &embedding_params);

    // load all data
    let (ncbi_to_hgnc, gene_ids) = load_hgnc_json(&args.path_hgnc_json)?;
    let clinvar_links = load_clinvar_gen2phen(&args.path_gene_hpo_links)?;
    let hpo_links = load_hpo_gen2phen(&args.path_hpo_genes_to_phenotype, &ncbi_to_hgnc)?;
    let ontology = Ontology::from_obo(&args.path_hpo_obo)?;
    trace_rss_now();

    // build graph and fit model
    let graph = build_graph(&ontology, &[&hpo_links, &clinvar_links]);
    let embedding = Node2Vec { workers: args.cpus }.embed(&graph, &embedding_params)?;
    trace_rss_now();

    // write out everything the model directory needs
    write_graph_and_model(&args.path_out, &graph, &embedding)?;
    write_hgnc_info_jsonl(args.path_out.join(HGNC_INFO_JSONL), &gene_ids)?;
    embedding_params.write_json_file(args.path_out.join(EMBEDDING_PARAMS_JSON))?;
    copy_obo(&args.path_hpo_obo, &args.path_out.join(HP_OBO))?;

    tracing::info!(
        "... done training model in {:?}",
        before_training.elapsed()
    );
    Ok(())
}

/// Copy the ontology into the model directory, decompressing it if needed.
fn copy_obo(src: &std::path::Path, dst: &std::path::Path) -> Result<(), anyhow::Error> {
    let mut reader = open_read_maybe_gz(src)?;
    let mut writer = std::fs::File::create(dst)
        .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", dst, e))?;
    std::io::copy(&mut reader, &mut writer)
        .map_err(|e| anyhow::anyhow!("could not copy {:?} to {:?}: {}", src, dst, e))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use std::path::{Path, PathBuf};

    use pretty_assertions::assert_eq;

    use super::{run, Args};
    use crate::model::{ModelLayout, TrainedModel};

    pub(crate) fn train_args(path_out: &Path) -> Args {
        Args {
            path_out: path_out.to_path_buf(),
            path_hgnc_json: PathBuf::from("tests/data/hgnc_complete_set.json"),
            path_gene_hpo_links: PathBuf::from("tests/data/links.jsonl"),
            path_hpo_genes_to_phenotype: PathBuf::from("tests/data/genes_to_phenotype.txt"),
            path_hpo_obo: PathBuf::from("tests/data/hp.obo"),
            path_embedding_params: Some(PathBuf::from("tests/data/embedding_params.json")),
            cpus: 1,
        }
    }

    #[test]
    fn smoke_test() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path_out = tmp_dir.join("model");
        let args_common = Default::default();

        run(&args_common, &train_args(&path_out))?;

        for name in [
            "graph.bin",
            "embedding.bin",
            "embedding.txt",
            "hgnc_info.jsonl",
            "embedding_params.json",
            "hp.obo",
        ] {
            assert!(path_out.join(name).exists(), "missing {}", name);
        }

        let model = TrainedModel::load(&path_out, &ModelLayout::Standard)?;
        assert_eq!(model.genes.len(), 4);
        assert_eq!(model.embedding.dimensions(), 8);
        assert_eq!(model.embedding.len(), model.graph.node_count());
        assert!(model.graph.contains_node("HGNC:10585"));
        assert!(model.graph.contains_node("HGNC:12403"));
        assert!(!model.graph.contains_node("HP:0002279"));
        assert_eq!(model.params.map(|p| p.dimensions), Some(8));

        Ok(())
    }

    #[test]
    fn smoke_test_is_deterministic() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let args_common = Default::default();

        run(&args_common, &train_args(&tmp_dir.join("first")))?;
        run(
            &args_common,
            &Args {
                cpus: 2,
                ..train_args(&tmp_dir.join("second"))
            },
        )?;

        assert_eq!(
            std::fs::read(tmp_dir.join("first").join("embedding.bin"))?,
            std::fs::read(tmp_dir.join("second").join("embedding.bin"))?
        );
        assert_eq!(
            std::fs::read(tmp_dir.join("first").join("graph.bin"))?,
            std::fs::read(tmp_dir.join("second").join("graph.bin"))?
        );

        Ok(())
    }
}
