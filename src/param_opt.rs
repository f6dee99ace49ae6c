//! Evaluation of embedding parameters (`param-opt` sub command).
//!
//! The clinical links are split into training, validation, and test sets, a
//! model is trained on the training links, and the rank of the linked gene
//! is determined for each validation link.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Instant,
};

use clap::Parser;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use thousands::Separable;

use crate::{
    common::trace_rss_now,
    embed::EmbeddingParams,
    err::{ConfigError, ScoreError},
    links::{
        load_clinical_records, make_links_unique_by_submitter, write_clinical_records_jsonl,
        ClinicalRecord,
    },
    model::{ModelLayout, TrainedModel, EMBEDDING_PARAMS_JSON},
    ontology::{Ontology, TermCanonicalizer},
    predict::{run_prediction, GeneNodeScheme},
    train,
};

/// Default seed value.
pub const DEFAULT_SEED: u64 = 1;

/// Rank thresholds to report the accuracy for.
pub const THRESHOLDS: [u32; 5] = [1, 5, 10, 50, 100];

/// Fraction of the usable links that make up the training pool.
const TRAINING_FRACTION: f64 = 0.6;

/// Percentage of validation links with the gene at rank <= threshold.
pub type Report = BTreeMap<u32, f64>;

/// How to obtain the validation links.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitMode {
    /// Split the links themselves; use the given fraction of the training
    /// pool for training.
    Fraction {
        fraction_links: f64,
        fraction_usable: f64,
    },
    /// Train on all links and validate on the links from the given file.
    ExplicitValidation(PathBuf),
}

impl SplitMode {
    /// Construct from command line settings, validating them.
    pub fn new(
        fraction_links: Option<f64>,
        fraction_usable: Option<f64>,
        path_validation_links: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let check = |f: f64| {
            if f > 0.0 && f <= 1.0 {
                Ok(f)
            } else {
                Err(ConfigError::InvalidFraction(f))
            }
        };
        match (fraction_links, path_validation_links) {
            (Some(_), Some(_)) => Err(ConfigError::SplitModeConflict),
            (None, None) => Err(ConfigError::SplitModeMissing),
            (Some(fraction_links), None) => Ok(SplitMode::Fraction {
                fraction_links: check(fraction_links)?,
                fraction_usable: check(fraction_usable.unwrap_or(1.0))?,
            }),
            (None, Some(path)) => Ok(SplitMode::ExplicitValidation(path.to_path_buf())),
        }
    }

    /// Name prefix of the run directory.
    fn run_prefix(&self) -> String {
        match self {
            SplitMode::Fraction { fraction_links, .. } => {
                format!("{}", (fraction_links * 100.0) as u32)
            }
            SplitMode::ExplicitValidation(_) => "explicit-validation".to_string(),
        }
    }
}

/// Sizes of the splits in fraction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCounts {
    pub usable: usize,
    pub training_all: usize,
    pub training: usize,
    pub validation: usize,
    pub test: usize,
}

/// Compute the split sizes for `total` links.
///
/// The rounding is done in two steps: first the training pool, then the
/// training fraction of the pool.
pub fn split_counts(total: usize, fraction_links: f64, fraction_usable: f64) -> SplitCounts {
    let usable = (fraction_usable * total as f64).floor() as usize;
    let training_all = (TRAINING_FRACTION * usable as f64).floor() as usize;
    let training = (fraction_links * training_all as f64).floor() as usize;
    let validation = (usable - training_all) / 2;
    SplitCounts {
        usable,
        training_all,
        training,
        validation,
        test: validation,
    }
}

/// The link splits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Splits {
    pub training: Vec<ClinicalRecord>,
    pub validation: Vec<ClinicalRecord>,
    pub test: Vec<ClinicalRecord>,
}

/// Split already deduplicated and shuffled `links` in fraction mode.
///
/// Validation and test links follow the training links directly.
pub fn split_links(
    links: &[ClinicalRecord],
    fraction_links: f64,
    fraction_usable: f64,
) -> (SplitCounts, Splits) {
    let counts = split_counts(links.len(), fraction_links, fraction_usable);
    let validation_start = counts.training;
    let test_start = validation_start + counts.validation;
    let splits = Splits {
        training: links[..counts.training].to_vec(),
        validation: links[validation_start..test_start].to_vec(),
        test: links[test_start..test_start + counts.test].to_vec(),
    };
    (counts, splits)
}

/// Load, deduplicate, and shuffle the clinical links, then split them.
pub fn load_links(
    path_links: &Path,
    split_mode: &SplitMode,
    seed: u64,
) -> Result<Splits, anyhow::Error> {
    tracing::info!("Loading phenotype links...");
    let mut links = make_links_unique_by_submitter(load_clinical_records(path_links)?);
    tracing::info!("- randomizing");
    let mut rng = StdRng::seed_from_u64(seed);
    links.shuffle(&mut rng);
    tracing::info!(
        "... done loading {} links",
        links.len().separate_with_commas()
    );

    let splits = match split_mode {
        SplitMode::Fraction {
            fraction_links,
            fraction_usable,
        } => {
            let (counts, splits) = split_links(&links, *fraction_links, *fraction_usable);
            tracing::info!("Counts in split...");
            tracing::info!("- total:        {:>6}", links.len());
            tracing::info!("- usable:       {:>6}", counts.usable);
            tracing::info!("- training-all: {:>6}", counts.training_all);
            tracing::info!("- training:     {:>6}", splits.training.len());
            tracing::info!("- validation:   {:>6}", splits.validation.len());
            tracing::info!("- test:         {:>6}", splits.test.len());
            splits
        }
        SplitMode::ExplicitValidation(path_validation_links) => {
            let orig_validation = load_clinical_records(path_validation_links)?;
            let orig_len = orig_validation.len();
            let splits = Splits {
                training: links,
                validation: make_links_unique_by_submitter(orig_validation),
                test: Vec::new(),
            };
            tracing::info!("Counts in explicit validation set...");
            tracing::info!("- training:   {:>6}", splits.training.len());
            tracing::info!(
                "- validation: {:>6} (non-unique: {})",
                splits.validation.len(),
                orig_len
            );
            tracing::info!("- test:       {:>6}", splits.test.len());
            splits
        }
    };
    Ok(splits)
}

/// Paths of a prepared run.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub path_out: PathBuf,
    pub path_links_training: PathBuf,
    pub path_links_validation: PathBuf,
    pub path_links_test: PathBuf,
    pub path_embedding_params: PathBuf,
}

/// Resolve the embedding parameters and write everything needed for
/// reproducing the run below `path_out`.
pub fn prepare_training(
    path_out: &Path,
    splits: &Splits,
    split_mode: &SplitMode,
    path_embedding_params: Option<&Path>,
    seed: u64,
) -> Result<PreparedRun, anyhow::Error> {
    tracing::info!("Preparing training...");
    let embedding_params = match path_embedding_params {
        Some(path) => {
            tracing::info!("- loading embedding params from {:?}", path);
            EmbeddingParams::from_json_file(path)?
        }
        None => {
            tracing::info!("- using default embedding params");
            EmbeddingParams::with_seed(seed)
        }
    };
    let params_name = embedding_params.content_hash()?;
    let path_out = path_out.join(format!(
        "{}.{}.{}",
        split_mode.run_prefix(),
        seed,
        params_name
    ));
    std::fs::create_dir_all(&path_out)
        .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", &path_out, e))?;
    tracing::info!("- output path: {:?}", &path_out);
    tracing::info!("- embedding params: {:?}", &embedding_params);

    let result = PreparedRun {
        path_links_training: path_out.join("links_training.jsonl"),
        path_links_validation: path_out.join("links_validation.jsonl"),
        path_links_test: path_out.join("links_test.jsonl"),
        path_embedding_params: path_out.join(EMBEDDING_PARAMS_JSON),
        path_out,
    };
    embedding_params.write_json_file(&result.path_embedding_params)?;
    write_clinical_records_jsonl(&result.path_links_training, &splits.training)?;
    write_clinical_records_jsonl(&result.path_links_validation, &splits.validation)?;
    write_clinical_records_jsonl(&result.path_links_test, &splits.test)?;
    tracing::info!("... done preparing training");

    Ok(result)
}

/// Train the model of the prepared run into `<run>/model`.
pub fn run_training(
    common_args: &crate::common::Args,
    run: &PreparedRun,
    args: &Args,
) -> Result<(), anyhow::Error> {
    tracing::info!("Running training...");
    let before_training = Instant::now();
    train::run(
        common_args,
        &train::Args {
            path_out: run.path_out.join("model"),
            path_hgnc_json: args.path_hgnc_json.clone(),
            path_gene_hpo_links: run.path_links_training.clone(),
            path_hpo_genes_to_phenotype: args.path_hpo_genes_to_phenotype.clone(),
            path_hpo_obo: args.path_hpo_obo.clone(),
            path_embedding_params: Some(run.path_embedding_params.clone()),
            cpus: args.cpus,
        },
    )?;
    tracing::info!(
        "... done running training in {:?}",
        before_training.elapsed()
    );
    Ok(())
}

/// Rank of `hgnc_id` in `ranked` (1-based), one past the end if absent.
pub fn rank_of<'a, I>(ranked: I, hgnc_id: &str) -> usize
where
    I: IntoIterator<Item = &'a String>,
{
    let mut len = 0;
    for (idx, gene) in ranked.into_iter().enumerate() {
        if gene == hgnc_id {
            return idx + 1;
        }
        len = idx + 1;
    }
    len + 1
}

/// Turn hit counts into percentages.
fn hits_to_report(hits: &BTreeMap<u32, usize>, total: usize) -> Report {
    hits.iter()
        .map(|(threshold, count)| {
            let percentage = if total > 0 {
                100.0 * *count as f64 / total as f64
            } else {
                0.0
            };
            (*threshold, percentage)
        })
        .collect()
}

/// Compute the accuracy report of `model` on the validation links.
pub fn validate(
    model: &TrainedModel,
    canonicalizer: &TermCanonicalizer,
    links_validation: &[ClinicalRecord],
) -> Result<Report, anyhow::Error> {
    let mut total = 0usize;
    let mut hits = THRESHOLDS
        .iter()
        .map(|threshold| (*threshold, 0usize))
        .collect::<BTreeMap<_, _>>();

    for link in links_validation {
        let hgnc_id = match link.hgnc_ids.as_slice() {
            [hgnc_id] => hgnc_id,
            _ => {
                tracing::warn!(
                    "skipping submission {} with {} genes",
                    &link.scv,
                    link.hgnc_ids.len()
                );
                continue;
            }
        };

        let hpo_terms = canonicalizer.canonicalize_all(&link.hpo_terms);
        let scores = match run_prediction(
            &hpo_terms,
            None,
            &model.genes,
            &model.graph,
            &model.embedding,
            GeneNodeScheme::Hgnc,
        ) {
            Ok((_, scores)) => scores,
            Err(ScoreError::NoValidQueryTerms) => {
                tracing::warn!("no valid HPO terms in {:?} (skipped)", &link.hpo_terms);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        total += 1;
        let rank = rank_of(scores.keys(), hgnc_id);
        for (threshold, count) in hits.iter_mut() {
            if rank <= *threshold as usize {
                *count += 1;
            }
        }
    }

    tracing::debug!("evaluated {} validation links", total);
    Ok(hits_to_report(&hits, total))
}

/// Run validation of the model in `<run>/model` on the links from
/// `path_links_validation`.
pub fn run_validation(
    path_out: &Path,
    path_links_validation: &Path,
) -> Result<Report, anyhow::Error> {
    tracing::info!("Running validation...");
    let before_validation = Instant::now();
    let path_model = path_out.join("model");
    tracing::info!("- model: {:?}", &path_model);
    let model = TrainedModel::load(&path_model, &ModelLayout::Standard)?;
    let path_obo = TrainedModel::path_obo(&path_model)
        .ok_or_else(|| anyhow::anyhow!("no ontology in model directory {:?}", &path_model))?;
    let canonicalizer = TermCanonicalizer::from_ontology(&Ontology::from_obo(path_obo)?);
    let links_validation = load_clinical_records(path_links_validation)?;

    let report = validate(&model, &canonicalizer, &links_validation)?;
    tracing::info!(
        "... done running validation in {:?}",
        before_validation.elapsed()
    );
    Ok(report)
}

/// Command line arguments for `param-opt` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Train with embedding parameters and validate", long_about = None)]
pub struct Args {
    /// Path to the output directory; runs are written to sub directories.
    #[arg(long)]
    pub path_out: PathBuf,
    /// Path to the HGNC complete set JSON file.
    #[arg(long)]
    pub path_hgnc_json: PathBuf,
    /// Path to the HPO `genes_to_phenotype.txt` file.
    #[arg(long)]
    pub path_hpo_genes_to_phenotype: PathBuf,
    /// Path to the HPO OBO file.
    #[arg(long)]
    pub path_hpo_obo: PathBuf,
    /// Path to the clinical gene-phenotype links JSONL file.
    #[arg(long)]
    pub path_clinvar_phenotype_links: PathBuf,
    /// Fraction of the training pool to train on.
    #[arg(long)]
    pub fraction_links: Option<f64>,
    /// Fraction of all links to use at all, defaults to 1.
    #[arg(long)]
    pub fraction_usable: Option<f64>,
    /// Path to JSONL file with explicit validation links.
    #[arg(long)]
    pub path_validation_links: Option<PathBuf>,
    /// Optional path to JSON file with embedding parameters.
    #[arg(long)]
    pub path_embedding_params: Option<PathBuf>,
    /// Seed for shuffling and for the default embedding parameters.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Number of worker threads for the embedding.
    #[arg(long, default_value_t = 1)]
    pub cpus: usize,
    /// Optional path to write the JSON report to.
    #[arg(long)]
    pub path_report: Option<PathBuf>,
}

/// Train a model and validate it, returning the accuracy report.
pub fn train_and_validate(
    common_args: &crate::common::Args,
    args: &Args,
) -> Result<Report, anyhow::Error> {
    let split_mode = SplitMode::new(
        args.fraction_links,
        args.fraction_usable,
        args.path_validation_links.as_deref(),
    )?;
    let seed = args.seed.unwrap_or(DEFAULT_SEED);

    let splits = load_links(&args.path_clinvar_phenotype_links, &split_mode, seed)?;
    let run = prepare_training(
        &args.path_out,
        &splits,
        &split_mode,
        args.path_embedding_params.as_deref(),
        seed,
    )?;
    run_training(common_args, &run, args)?;
    trace_rss_now();
    run_validation(&run.path_out, &run.path_links_validation)
}

/// Main entry point for the `param-opt` sub command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `param-opt`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let report = train_and_validate(common_args, args)?;
    let report_json = serde_json::to_string_pretty(&report)?;
    if let Some(path_report) = &args.path_report {
        std::fs::write(path_report, report_json.clone() + "\n")
            .map_err(|e| anyhow::anyhow!("problem writing {:?}: {}", path_report, e))?;
    }
    println!("{}", report_json);

    Ok(())
}
