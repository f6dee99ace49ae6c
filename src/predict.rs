//! Gene prioritization for a phenotype query (`predict` sub command).

use std::{collections::HashSet, io::Write, path::PathBuf, time::Instant};

use clap::Parser;
use indexmap::{IndexMap, IndexSet};

use crate::{
    common::{io::open_write_maybe_gz, parse_id_list, trace_rss_now},
    embed::{dot, Embedding},
    err::ScoreError,
    genes::{GeneIdRegistry, GeneKey},
    graph::Graph,
    model::{ModelLayout, TrainedModel},
    ontology::{Ontology, TermCanonicalizer},
};

/// Prefix of gene nodes in the graph.
pub const HGNC_PREFIX: &str = "HGNC:";
/// Prefix of gene nodes in graphs of older releases.
pub const LEGACY_ENTREZ_PREFIX: &str = "Entrez:";

/// How gene nodes are recognized in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneNodeScheme {
    /// Gene nodes are `HGNC:` IDs.
    #[default]
    Hgnc,
    /// Additionally accept `Entrez:` nodes and translate them to HGNC IDs.
    LegacyEntrez,
}

impl GeneNodeScheme {
    /// Scheme to use for the given model layout.
    pub fn for_layout(layout: &ModelLayout) -> Self {
        match layout {
            ModelLayout::Standard => GeneNodeScheme::Hgnc,
            ModelLayout::Legacy(_) => GeneNodeScheme::LegacyEntrez,
        }
    }

    /// The HGNC ID of the gene at graph node `node`, or `None` if the node
    /// is no gene or cannot be translated.
    pub fn hgnc_id_of_node<'a>(&self, node: &'a str, genes: &'a GeneIdRegistry) -> Option<&'a str> {
        match self {
            GeneNodeScheme::LegacyEntrez if node.starts_with(LEGACY_ENTREZ_PREFIX) => {
                let ncbi_gene_id = &node[LEGACY_ENTREZ_PREFIX.len()..];
                match genes.get(GeneKey::NcbiId(ncbi_gene_id)) {
                    Some(gene_ids) => Some(gene_ids.hgnc_id.as_str()),
                    None => {
                        tracing::warn!(
                            "skipping legacy gene id {} as cannot translate to HGNC",
                            node
                        );
                        None
                    }
                }
            }
            _ if node.starts_with(HGNC_PREFIX) => Some(node),
            _ => None,
        }
    }
}

/// Score all genes in the graph for the query.
///
/// Returns the query terms that were used and the gene scores keyed by HGNC
/// ID; the iteration order of the map is the rank order.  Genes with equal
/// scores keep the order of their nodes in the graph.  With
/// `GeneNodeScheme::LegacyEntrez`, a gene may have both an `Entrez:` and an
/// `HGNC:` node; the score of the node coming last in the graph is used, at
/// the graph position of the first one.
pub fn run_prediction<S: AsRef<str>>(
    query_terms: &[S],
    genes: Option<&[S]>,
    registry: &GeneIdRegistry,
    graph: &Graph,
    embedding: &Embedding,
    scheme: GeneNodeScheme,
) -> Result<(Vec<String>, IndexMap<String, f32>), ScoreError> {
    // Lookup query term vectors, duplicates are used once.
    let mut term_vectors: IndexMap<&str, &[f32]> = IndexMap::new();
    for term in query_terms {
        let term = term.as_ref();
        match embedding.get(term) {
            Some(vector) => {
                term_vectors.insert(term, vector);
            }
            None => tracing::warn!("skipping HPO term {} as it is not in the model", term),
        }
    }
    if term_vectors.is_empty() {
        tracing::error!("no valid HPO terms in model");
        return Err(ScoreError::NoValidQueryTerms);
    }

    // Map restriction genes to HGNC IDs, unknown ones are used verbatim.
    let allowed = genes.map(|genes| {
        let mut warned_about = HashSet::new();
        genes
            .iter()
            .map(|gene| {
                let gene = gene.as_ref();
                match registry.resolve(gene) {
                    Some(gene_ids) => gene_ids.hgnc_id.clone(),
                    None => {
                        if warned_about.insert(gene.to_string()) {
                            tracing::warn!("could not resolve gene {}, using it verbatim", gene);
                        }
                        gene.to_string()
                    }
                }
            })
            .collect::<IndexSet<String>>()
    });

    tracing::debug!("Generating scores...");
    let mut scores: IndexMap<String, f32> = IndexMap::new();
    for node in graph.nodes() {
        let Some(hgnc_id) = scheme.hgnc_id_of_node(node, registry) else {
            continue;
        };
        if let Some(allowed) = &allowed {
            if !allowed.contains(hgnc_id) {
                continue;
            }
        }
        let gene_vector = embedding
            .get(node)
            .ok_or_else(|| ScoreError::MissingEmbedding(node.to_string()))?;
        let total: f32 = term_vectors
            .values()
            .map(|term_vector| dot(term_vector, gene_vector))
            .sum();
        // A later node of the same gene overrides the score but not the position.
        scores.insert(hgnc_id.to_string(), total / term_vectors.len() as f32);
    }
    scores.sort_by(|_, lhs, _, rhs| rhs.total_cmp(lhs));

    let used_terms = term_vectors.keys().map(|term| term.to_string()).collect();
    Ok((used_terms, scores))
}

/// Write the ranking as TSV to `out`.
pub fn write_predictions<W: Write>(
    out: &mut W,
    used_terms: &[String],
    scores: &IndexMap<String, f32>,
    registry: &GeneIdRegistry,
) -> Result<(), anyhow::Error> {
    writeln!(
        out,
        "# query (len={}): {}",
        used_terms.len(),
        used_terms.join(",")
    )?;
    writeln!(out, "rank\tscore\tgene_symbol\tncbi_gene_id\thgnc_id")?;
    for (rank, (hgnc_id, score)) in scores.iter().enumerate() {
        let (symbol, ncbi_gene_id) = match registry.get(GeneKey::HgncId(hgnc_id)) {
            Some(gene_ids) => (gene_ids.symbol.as_str(), gene_ids.ncbi_gene_id.as_str()),
            None => (".", "."),
        };
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            rank + 1,
            score,
            symbol,
            ncbi_gene_id,
            hgnc_id
        )?;
    }
    Ok(())
}

/// Command line arguments for `predict` sub command.
#[derive(Parser, Debug)]
#[command(about = "Prioritize genes for a phenotype query", long_about = None)]
pub struct Args {
    /// Path to the model directory.
    #[arg(long)]
    pub path_model: PathBuf,
    /// HPO terms, comma-separated or path to a file with one term per line.
    #[arg(long)]
    pub hpo_terms: String,
    /// Optional genes to restrict to, comma-separated or path to a file;
    /// symbols, HGNC, NCBI, and ENSEMBL IDs are accepted.
    #[arg(long)]
    pub genes: Option<String>,
    /// Root of a model directory structure of an older release.
    #[arg(long)]
    pub path_legacy: Option<PathBuf>,
    /// Optional path to the output TSV file; written to stdout if missing.
    #[arg(long)]
    pub path_output: Option<PathBuf>,
}

/// Main entry point for the `predict` sub command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `predict`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let query_terms = parse_id_list(&args.hpo_terms)?;
    let genes = args.genes.as_deref().map(parse_id_list).transpose()?;

    let layout = ModelLayout::from_legacy_path(args.path_legacy.as_deref());
    let model = TrainedModel::load(&args.path_model, &layout)?;
    let query_terms = match TrainedModel::path_obo(&args.path_model) {
        Some(path_obo) => {
            let ontology = Ontology::from_obo(path_obo)?;
            let canonicalizer = TermCanonicalizer::from_ontology(&ontology);
            let hpo_id_to_name = ontology.hpo_id_to_name();
            query_terms
                .iter()
                .map(|term| {
                    let term = canonicalizer.canonicalize(term);
                    match hpo_id_to_name.get(term) {
                        Some(name) => tracing::info!("- query term {} ({})", term, name),
                        None => tracing::info!("- query term {} (unknown)", term),
                    }
                    term.to_string()
                })
                .collect()
        }
        None => query_terms,
    };
    trace_rss_now();

    tracing::info!("Scoring genes...");
    let before_scoring = Instant::now();
    let (used_terms, scores) = run_prediction(
        &query_terms,
        genes.as_deref(),
        &model.genes,
        &model.graph,
        &model.embedding,
        GeneNodeScheme::for_layout(&layout),
    )?;
    tracing::info!(
        "... done scoring {} genes in {:?}",
        scores.len(),
        before_scoring.elapsed()
    );

    match &args.path_output {
        Some(path_output) => {
            let mut out = open_write_maybe_gz(path_output)?;
            write_predictions(&mut out, &used_terms, &scores, &model.genes)?;
            out.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            write_predictions(&mut out, &used_terms, &scores, &model.genes)?;
            out.flush()?;
        }
    }

    Ok(())
}
