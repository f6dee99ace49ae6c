//! Loading of gene to phenotype links from the different sources.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    io::{BufRead, Write},
    path::Path,
    time::Instant,
};

use indexmap::IndexMap;
use itertools::Itertools;
use thousands::Separable;

use crate::{
    common::io::{open_read_maybe_gz, open_write_maybe_gz},
    ontology::Ontology,
};

/// Submitter used for links derived from the HPO gene annotation table.
pub const HPO_SUBMITTER: &str = "HPO";

/// Clinical significance of a submission.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
)]
pub enum ClinSig {
    #[serde(rename = "benign")]
    #[strum(serialize = "benign")]
    Benign,
    #[serde(rename = "likely benign")]
    #[strum(serialize = "likely benign")]
    LikelyBenign,
    #[serde(rename = "uncertain significance")]
    #[strum(serialize = "uncertain significance")]
    Uncertain,
    #[serde(rename = "likely pathogenic")]
    #[strum(serialize = "likely pathogenic")]
    LikelyPathogenic,
    #[serde(rename = "pathogenic")]
    #[strum(serialize = "pathogenic")]
    Pathogenic,
}

impl ClinSig {
    /// Whether the significance is likely pathogenic or pathogenic.
    pub fn is_pathogenic(&self) -> bool {
        match self {
            ClinSig::LikelyPathogenic | ClinSig::Pathogenic => true,
            ClinSig::Benign | ClinSig::LikelyBenign | ClinSig::Uncertain => false,
        }
    }
}

/// Full record from the clinical submission JSONL feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClinicalRecord {
    /// RCV accession.
    #[serde(default)]
    pub rcv: String,
    /// SCV accession.
    #[serde(default)]
    pub scv: String,
    /// Clinical significance.
    #[serde(default)]
    pub clinsig: Option<ClinSig>,
    /// Submitter.
    #[serde(default)]
    pub submitter: Option<String>,
    /// HGNC IDs of the linked genes.
    #[serde(default)]
    pub hgnc_ids: Vec<String>,
    /// Linked OMIM terms.
    #[serde(default)]
    pub omim_terms: Vec<String>,
    /// Linked MONDO terms.
    #[serde(default)]
    pub mondo_terms: Vec<String>,
    /// Linked HPO terms.
    #[serde(default)]
    pub hpo_terms: Vec<String>,
}

impl ClinicalRecord {
    /// Key used for making records unique: submitter, sorted genes, sorted terms.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.submitter.as_deref().unwrap_or_default(),
            self.hgnc_ids.iter().sorted().join(","),
            self.hpo_terms.iter().sorted().join(",")
        )
    }

    /// Convert into a link if the record is pathogenic, has exactly one gene,
    /// and a non-empty submitter.
    pub fn to_link(&self) -> Option<PhenotypeLink> {
        let is_pathogenic = self.clinsig.map(|c| c.is_pathogenic()).unwrap_or(false);
        match (is_pathogenic, self.submitter.as_deref(), self.hgnc_ids.as_slice()) {
            (true, Some(submitter), [hgnc_id]) if !submitter.is_empty() => Some(
                PhenotypeLink::new(submitter, hgnc_id, self.hpo_terms.iter().cloned()),
            ),
            _ => None,
        }
    }
}

/// Minimal link record between one gene and a set of phenotype terms.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct PhenotypeLink {
    /// Submitter of the link.
    pub submitter: String,
    /// HGNC ID of the gene.
    pub hgnc_id: String,
    /// Sorted and unique HPO term IDs.
    pub hpo_terms: Vec<String>,
}

impl PhenotypeLink {
    /// Construct, sorting and deduplicating the terms.
    pub fn new<I>(submitter: &str, hgnc_id: &str, hpo_terms: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            submitter: submitter.to_string(),
            hgnc_id: hgnc_id.to_string(),
            hpo_terms: hpo_terms
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }
}

/// An undirected edge between two node IDs.
pub type Edge = (String, String);

/// Hierarchy edges from each ontology term to each of its direct superclasses.
pub fn yield_hpo_edges(ontology: &Ontology) -> impl Iterator<Item = Edge> + '_ {
    ontology.terms().iter().flat_map(|term| {
        term.parents
            .iter()
            .filter(move |parent| **parent != term.id)
            .map(move |parent| (term.id.clone(), parent.clone()))
    })
}

/// One edge per gene and phenotype term of each link.
pub fn yield_gene2phen_edges(links: &[PhenotypeLink]) -> impl Iterator<Item = Edge> + '_ {
    links.iter().flat_map(|link| {
        link.hpo_terms
            .iter()
            .map(move |hpo_term| (link.hgnc_id.clone(), hpo_term.clone()))
    })
}

/// Read clinical records from a JSONL file (optionally gzip compressed).
///
/// Lines that cannot be parsed are skipped with a warning.
pub fn load_clinical_records<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<ClinicalRecord>, anyhow::Error> {
    let reader = open_read_maybe_gz(&path)?;
    let mut records = Vec::new();
    for line in reader.lines() {
        let line =
            line.map_err(|e| anyhow::anyhow!("error reading from {:?}: {}", path.as_ref(), e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ClinicalRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("error deserializing JSONL record: \"{}\" in {}", e, &line);
                continue;
            }
        }
    }
    Ok(records)
}

/// Write clinical records to a JSONL file (optionally gzip compressed).
pub fn write_clinical_records_jsonl<P: AsRef<Path>>(
    path: P,
    records: &[ClinicalRecord],
) -> Result<(), anyhow::Error> {
    let mut writer = open_write_maybe_gz(&path)?;
    for record in records {
        writeln!(writer, "{}", serde_json::to_string(record)?)?;
    }
    writer.flush()?;
    Ok(())
}

/// Make records unique by submitter, gene, and terms, keeping single-gene
/// records only.
///
/// The position of the first occurrence of a key is kept.
pub fn make_links_unique_by_submitter<I>(records: I) -> Vec<ClinicalRecord>
where
    I: IntoIterator<Item = ClinicalRecord>,
{
    let mut by_key = IndexMap::new();
    for record in records {
        if record.hgnc_ids.len() == 1 {
            by_key.insert(record.dedup_key(), record);
        }
    }
    by_key.into_values().collect()
}

/// Convert clinical records into sorted, unique links.
pub fn clinical_links<I>(records: I) -> Vec<PhenotypeLink>
where
    I: IntoIterator<Item = ClinicalRecord>,
{
    records
        .into_iter()
        .filter_map(|record| record.to_link())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Load the gene to phenotype links from the clinical JSONL feed.
pub fn load_clinvar_gen2phen<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<PhenotypeLink>, anyhow::Error> {
    tracing::info!(
        "Loading ClinVar gene-phenotype links from {:?}...",
        path.as_ref()
    );
    let before_loading = Instant::now();
    let records = load_clinical_records(&path)?;
    let total = records.len();
    let links = clinical_links(records);
    tracing::info!(
        "... done loading {} links from {} records in {:?}",
        links.len().separate_with_commas(),
        total.separate_with_commas(),
        before_loading.elapsed()
    );
    Ok(links)
}

/// One row of the HPO `genes_to_phenotype.txt` file; other columns are ignored.
#[derive(Debug, Clone, serde::Deserialize)]
struct GenesToPhenotypeRow {
    /// NCBI gene ID.
    #[serde(alias = "entrez_id")]
    ncbi_gene_id: String,
    /// HPO term ID.
    hpo_id: String,
}

/// Group `(ncbi_gene_id, hpo_id)` pairs into one link per gene.
///
/// Pairs whose NCBI gene ID cannot be mapped are dropped; a warning is
/// emitted once for each such ID.
pub fn group_hpo_gen2phen<I>(rows: I, ncbi_to_hgnc: &HashMap<String, String>) -> Vec<PhenotypeLink>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut warned_about = HashSet::new();
    let mut hpo_by_gene: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (ncbi_gene_id, hpo_id) in rows {
        let Some(hgnc_id) = ncbi_to_hgnc.get(&ncbi_gene_id) else {
            if warned_about.insert(ncbi_gene_id.clone()) {
                tracing::warn!("No HGNC entry for Entrez {} found", &ncbi_gene_id);
            }
            continue;
        };
        hpo_by_gene
            .entry(hgnc_id.clone())
            .or_default()
            .insert(hpo_id);
    }

    hpo_by_gene
        .into_iter()
        .map(|(hgnc_id, hpo_terms)| PhenotypeLink::new(HPO_SUBMITTER, &hgnc_id, hpo_terms))
        .collect()
}

/// Load the gene to phenotype links from the HPO gene annotation table.
pub fn load_hpo_gen2phen<P: AsRef<Path>>(
    path: P,
    ncbi_to_hgnc: &HashMap<String, String>,
) -> Result<Vec<PhenotypeLink>, anyhow::Error> {
    tracing::info!(
        "Loading HPO gene-phenotype links from {:?}...",
        path.as_ref()
    );
    let before_loading = Instant::now();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(open_read_maybe_gz(&path)?);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: GenesToPhenotypeRow =
            result.map_err(|e| anyhow::anyhow!("problem parsing {:?}: {}", path.as_ref(), e))?;
        rows.push((row.ncbi_gene_id, row.hpo_id));
    }
    let links = group_hpo_gen2phen(rows, ncbi_to_hgnc);
    tracing::info!(
        "... done loading {} links in {:?}",
        links.len().separate_with_commas(),
        before_loading.elapsed()
    );
    Ok(links)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{ClinSig, ClinicalRecord, PhenotypeLink};
    use crate::ontology::{test::MINI_OBO, Ontology};

    fn record(
        clinsig: Option<ClinSig>,
        submitter: Option<&str>,
        hgnc_ids: &[&str],
        hpo_terms: &[&str],
    ) -> ClinicalRecord {
        ClinicalRecord {
            rcv: "RCV000000001".into(),
            scv: "SCV000000001".into(),
            clinsig,
            submitter: submitter.map(String::from),
            hgnc_ids: hgnc_ids.iter().map(|s| s.to_string()).collect(),
            hpo_terms: hpo_terms.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(Some(ClinSig::Pathogenic), Some("Lab"), &["HGNC:1"], true)]
    #[case(Some(ClinSig::LikelyPathogenic), Some("Lab"), &["HGNC:1"], true)]
    #[case(Some(ClinSig::Uncertain), Some("Lab"), &["HGNC:1"], false)]
    #[case(Some(ClinSig::LikelyBenign), Some("Lab"), &["HGNC:1"], false)]
    #[case(Some(ClinSig::Benign), Some("Lab"), &["HGNC:1"], false)]
    #[case(None, Some("Lab"), &["HGNC:1"], false)]
    #[case(Some(ClinSig::Pathogenic), None, &["HGNC:1"], false)]
    #[case(Some(ClinSig::Pathogenic), Some(""), &["HGNC:1"], false)]
    #[case(Some(ClinSig::Pathogenic), Some("Lab"), &["HGNC:1", "HGNC:2"], false)]
    #[case(Some(ClinSig::Pathogenic), Some("Lab"), &[], false)]
    fn record_to_link(
        #[case] clinsig: Option<ClinSig>,
        #[case] submitter: Option<&str>,
        #[case] hgnc_ids: &[&str],
        #[case] expected: bool,
    ) {
        let record = record(clinsig, submitter, hgnc_ids, &["HP:0000002", "HP:0000001"]);

        let link = record.to_link();

        assert_eq!(link.is_some(), expected);
        if let Some(link) = link {
            assert_eq!(link.submitter, "Lab");
            assert_eq!(link.hgnc_id, "HGNC:1");
            assert_eq!(link.hpo_terms, vec!["HP:0000001", "HP:0000002"]);
        }
    }

    #[test]
    fn clinsig_serde() -> Result<(), anyhow::Error> {
        let clinsig: ClinSig = serde_json::from_str("\"likely pathogenic\"")?;
        assert_eq!(clinsig, ClinSig::LikelyPathogenic);
        assert_eq!(
            serde_json::to_string(&ClinSig::Uncertain)?,
            "\"uncertain significance\""
        );
        assert_eq!(ClinSig::Pathogenic.to_string(), "pathogenic");
        Ok(())
    }

    #[test]
    fn clinical_links_dedup() {
        let records = vec![
            record(Some(ClinSig::Pathogenic), Some("Lab"), &["HGNC:1"], &["HP:0000001"]),
            record(Some(ClinSig::Pathogenic), Some("Lab"), &["HGNC:1"], &["HP:0000001"]),
            record(
                Some(ClinSig::LikelyPathogenic),
                Some("Lab"),
                &["HGNC:1"],
                &["HP:0000001"],
            ),
            record(Some(ClinSig::Pathogenic), Some("Other"), &["HGNC:1"], &["HP:0000001"]),
        ];

        let links = super::clinical_links(records);

        assert_eq!(
            links,
            vec![
                PhenotypeLink::new("Lab", "HGNC:1", vec!["HP:0000001".to_string()]),
                PhenotypeLink::new("Other", "HGNC:1", vec!["HP:0000001".to_string()]),
            ]
        );
    }

    #[test]
    fn make_links_unique_by_submitter() {
        let mut first = record(
            Some(ClinSig::Pathogenic),
            Some("Lab"),
            &["HGNC:1"],
            &["HP:0000002", "HP:0000001"],
        );
        first.scv = "SCV1".into();
        let mut second = record(
            Some(ClinSig::Pathogenic),
            Some("Lab"),
            &["HGNC:1"],
            &["HP:0000001", "HP:0000002"],
        );
        second.scv = "SCV2".into();
        let other = record(Some(ClinSig::Pathogenic), Some("Lab"), &["HGNC:2"], &["HP:0000001"]);
        let multi = record(
            Some(ClinSig::Pathogenic),
            Some("Lab"),
            &["HGNC:1", "HGNC:2"],
            &["HP:0000001"],
        );

        let unique = super::make_links_unique_by_submitter(vec![first, other, second, multi]);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].hgnc_ids, vec!["HGNC:1"]);
        assert_eq!(unique[0].scv, "SCV2");
        assert_eq!(unique[1].hgnc_ids, vec!["HGNC:2"]);
    }

    #[test]
    fn hpo_edges_direct_parents_only() -> Result<(), anyhow::Error> {
        let ontology = Ontology::from_reader(MINI_OBO.as_bytes())?;

        let edges = super::yield_hpo_edges(&ontology).collect::<Vec<_>>();

        assert_eq!(
            edges,
            vec![
                ("HP:0000118".to_string(), "HP:0000001".to_string()),
                ("HP:0000707".to_string(), "HP:0000118".to_string()),
                ("HP:0001250".to_string(), "HP:0000707".to_string()),
                ("HP:0001250".to_string(), "HP:0000118".to_string()),
            ]
        );

        Ok(())
    }

    #[test]
    fn gene2phen_edges() {
        let links = vec![PhenotypeLink::new(
            "Lab",
            "HGNC:1",
            vec!["HP:0000002".to_string(), "HP:0000001".to_string()],
        )];

        let edges = super::yield_gene2phen_edges(&links).collect::<Vec<_>>();

        assert_eq!(
            edges,
            vec![
                ("HGNC:1".to_string(), "HP:0000001".to_string()),
                ("HGNC:1".to_string(), "HP:0000002".to_string()),
            ]
        );
    }

    #[tracing_test::traced_test]
    #[test]
    fn group_hpo_gen2phen_warns_once() {
        let ncbi_to_hgnc = HashMap::from([
            ("1".to_string(), "HGNC:5".to_string()),
            ("2".to_string(), "HGNC:7".to_string()),
        ]);
        let rows = vec![
            ("2", "HP:0000003"),
            ("1", "HP:0000002"),
            ("999", "HP:0000001"),
            ("1", "HP:0000001"),
            ("999", "HP:0000002"),
            ("1", "HP:0000002"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()));

        let links = super::group_hpo_gen2phen(rows, &ncbi_to_hgnc);

        assert_eq!(
            links,
            vec![
                PhenotypeLink::new(
                    "HPO",
                    "HGNC:5",
                    vec!["HP:0000001".to_string(), "HP:0000002".to_string()]
                ),
                PhenotypeLink::new("HPO", "HGNC:7", vec!["HP:0000003".to_string()]),
            ]
        );
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("No HGNC entry for Entrez 999 found"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {}", n)),
            }
        });
    }

    #[test]
    fn load_hpo_gen2phen() -> Result<(), anyhow::Error> {
        let (ncbi_to_hgnc, _) = crate::genes::load_hgnc_json("tests/data/hgnc_complete_set.json")?;

        let links = super::load_hpo_gen2phen("tests/data/genes_to_phenotype.txt", &ncbi_to_hgnc)?;

        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|link| link.submitter == "HPO"));
        let mut sorted = links.clone();
        sorted.sort();
        assert_eq!(links, sorted);

        Ok(())
    }

    #[rstest]
    #[case("tests/data/links.jsonl")]
    #[case("tests/data/links.jsonl.gz")]
    fn load_clinvar_gen2phen(#[case] path: &str) -> Result<(), anyhow::Error> {
        let links = super::load_clinvar_gen2phen(path)?;

        assert_eq!(links.len(), 4);
        assert!(links.iter().all(|link| !link.submitter.is_empty()));

        Ok(())
    }

    #[test]
    fn write_and_load_clinical_records() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("records.jsonl");
        let records = vec![
            record(Some(ClinSig::Pathogenic), Some("Lab"), &["HGNC:1"], &["HP:0000001"]),
            record(None, None, &[], &[]),
        ];

        super::write_clinical_records_jsonl(&path, &records)?;
        let loaded = super::load_clinical_records(&path)?;

        assert_eq!(loaded, records);

        Ok(())
    }
}
