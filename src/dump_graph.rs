//! Inspection of model graphs (`dump-graph` sub command).

use std::{io::Write, path::PathBuf};

use clap::Parser;

use crate::{
    genes::{GeneIdRegistry, GeneKey},
    graph::Graph,
    predict::{HGNC_PREFIX, LEGACY_ENTREZ_PREFIX},
};

/// Translation of gene nodes when dumping.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum GeneNotation {
    /// Write `HGNC:` gene nodes, translating `Entrez:` nodes.
    #[default]
    Hgnc,
    /// Write `Entrez:` gene nodes, translating `HGNC:` nodes.
    Entrez,
}

impl GeneNotation {
    /// Translate `node`, returning `None` if it is a gene that cannot be
    /// translated.
    fn translate(&self, node: &str, genes: &GeneIdRegistry) -> Option<String> {
        let gene_ids = match self {
            GeneNotation::Hgnc => match node.strip_prefix(LEGACY_ENTREZ_PREFIX) {
                Some(ncbi_gene_id) => genes.get(GeneKey::NcbiId(ncbi_gene_id)),
                None => return Some(node.to_string()),
            },
            GeneNotation::Entrez if node.starts_with(HGNC_PREFIX) => {
                genes.get(GeneKey::HgncId(node))
            }
            GeneNotation::Entrez => return Some(node.to_string()),
        };
        match (self, gene_ids) {
            (GeneNotation::Hgnc, Some(gene_ids)) => Some(gene_ids.hgnc_id.clone()),
            (GeneNotation::Entrez, Some(gene_ids)) => Some(format!(
                "{}{}",
                LEGACY_ENTREZ_PREFIX, gene_ids.ncbi_gene_id
            )),
            (_, None) => {
                tracing::warn!("cannot translate gene node {}", node);
                None
            }
        }
    }
}

/// Write the edges of `graph` as TSV to `out`, sorted after translation.
///
/// Edges with a gene node that cannot be translated are skipped.
pub fn dump_graph<W: Write>(
    out: &mut W,
    graph: &Graph,
    genes: &GeneIdRegistry,
    notation: GeneNotation,
) -> Result<(), anyhow::Error> {
    let mut edges = graph
        .edges()
        .filter_map(|(lhs, rhs)| {
            Some((
                notation.translate(lhs, genes)?,
                notation.translate(rhs, genes)?,
            ))
        })
        .collect::<Vec<_>>();
    edges.sort();
    for (lhs, rhs) in edges {
        writeln!(out, "{}\t{}", lhs, rhs)?;
    }
    Ok(())
}

/// Command line arguments for `dump-graph` sub command.
#[derive(Parser, Debug)]
#[command(about = "Dump the edges of a model graph", long_about = None)]
pub struct Args {
    /// Path to the graph file.
    #[arg(long)]
    pub path_graph: PathBuf,
    /// Path to the `hgnc_info.jsonl` file.
    #[arg(long)]
    pub path_hgnc_info: PathBuf,
    /// Notation to use for gene nodes.
    #[arg(long, value_enum, default_value_t = GeneNotation::Hgnc)]
    pub gene_notation: GeneNotation,
}

/// Main entry point for the `dump-graph` sub command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `dump-graph`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let genes = GeneIdRegistry::from_jsonl(&args.path_hgnc_info)?;
    let graph = Graph::load_bin(&args.path_graph)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    dump_graph(&mut out, &graph, &genes, args.gene_notation)?;
    out.flush()?;

    Ok(())
}
