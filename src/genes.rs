//! Gene identifier registry based on the HGNC complete set.

use std::{
    collections::HashMap,
    io::{BufRead, Write},
    path::Path,
    time::Instant,
};

use thousands::Separable;

use crate::common::io::{open_read_maybe_gz, open_write_maybe_gz};

/// Mapping between the identifiers of one gene.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GeneIds {
    /// Official HGNC gene symbol.
    pub symbol: String,
    /// HGNC identifier, e.g., `HGNC:1100`.
    pub hgnc_id: String,
    /// NCBI / Entrez gene identifier, e.g., `672`.
    pub ncbi_gene_id: String,
    /// ENSEMBL gene identifier, e.g., `ENSG00000012048`.
    #[serde(default)]
    pub ensembl_gene_id: Option<String>,
}

/// Key for looking up a gene in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneKey<'a> {
    Symbol(&'a str),
    HgncId(&'a str),
    NcbiId(&'a str),
    EnsemblId(&'a str),
}

/// One entry of `response.docs` in the HGNC JSON file.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct HgncDoc {
    pub symbol: Option<String>,
    pub hgnc_id: Option<String>,
    pub entrez_id: Option<String>,
    pub ensembl_gene_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct HgncResponse {
    docs: Vec<HgncDoc>,
}

#[derive(Debug, serde::Deserialize)]
struct HgncJson {
    response: HgncResponse,
}

/// Build the NCBI to HGNC mapping and the gene identifier records.
///
/// Only documents with a symbol and an NCBI gene ID (and the HGNC ID that
/// every HGNC document carries) are used, the others are skipped silently.
pub fn build_gene_ids<I>(docs: I) -> (HashMap<String, String>, Vec<GeneIds>)
where
    I: IntoIterator<Item = HgncDoc>,
{
    let mut ncbi_to_hgnc = HashMap::new();
    let mut gene_ids = Vec::new();
    for doc in docs {
        if let (Some(symbol), Some(hgnc_id), Some(ncbi_gene_id)) =
            (doc.symbol, doc.hgnc_id, doc.entrez_id)
        {
            ncbi_to_hgnc.insert(ncbi_gene_id.clone(), hgnc_id.clone());
            gene_ids.push(GeneIds {
                symbol,
                hgnc_id,
                ncbi_gene_id,
                ensembl_gene_id: doc.ensembl_gene_id,
            });
        }
    }
    (ncbi_to_hgnc, gene_ids)
}

/// Load the HGNC complete set JSON file.
pub fn load_hgnc_json<P: AsRef<Path>>(
    path: P,
) -> Result<(HashMap<String, String>, Vec<GeneIds>), anyhow::Error> {
    tracing::info!("Loading HGNC info from {:?}...", path.as_ref());
    let before_loading = Instant::now();
    let reader = open_read_maybe_gz(&path)?;
    let hgnc_json: HgncJson = serde_json::from_reader(reader)
        .map_err(|e| anyhow::anyhow!("problem parsing {:?}: {}", path.as_ref(), e))?;
    let (ncbi_to_hgnc, gene_ids) = build_gene_ids(hgnc_json.response.docs);
    tracing::info!(
        "... done loading {} records in {:?}",
        gene_ids.len().separate_with_commas(),
        before_loading.elapsed()
    );
    Ok((ncbi_to_hgnc, gene_ids))
}

/// Write out the flattened gene identifier table as JSONL.
pub fn write_hgnc_info_jsonl<P: AsRef<Path>>(
    path: P,
    gene_ids: &[GeneIds],
) -> Result<(), anyhow::Error> {
    tracing::debug!("writing {} gene records to {:?}", gene_ids.len(), path.as_ref());
    let mut writer = open_write_maybe_gz(&path)?;
    for gene_id in gene_ids {
        writeln!(writer, "{}", serde_json::to_string(gene_id)?)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read the flattened gene identifier table from JSONL.
pub fn load_hgnc_info_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<GeneIds>, anyhow::Error> {
    let mut result = Vec::new();
    for line in open_read_maybe_gz(&path)?.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: GeneIds = serde_json::from_str(&line).map_err(|e| {
            anyhow::anyhow!("problem parsing {:?} line {:?}: {}", path.as_ref(), &line, e)
        })?;
        result.push(record);
    }
    Ok(result)
}

/// Index of gene identifiers that can be queried by any of the four ID types.
#[derive(Debug, Clone, Default)]
pub struct GeneIdRegistry {
    /// The gene identifier records.
    records: Vec<GeneIds>,
    /// Index from symbol to record.
    by_symbol: HashMap<String, usize>,
    /// Index from HGNC ID to record.
    by_hgnc_id: HashMap<String, usize>,
    /// Index from NCBI gene ID to record.
    by_ncbi_id: HashMap<String, usize>,
    /// Index from ENSEMBL gene ID to record.
    by_ensembl_id: HashMap<String, usize>,
}

impl GeneIdRegistry {
    /// Construct from gene identifier records.
    pub fn new(records: Vec<GeneIds>) -> Self {
        let mut result = Self::default();
        for (idx, record) in records.iter().enumerate() {
            result.by_symbol.insert(record.symbol.clone(), idx);
            result.by_hgnc_id.insert(record.hgnc_id.clone(), idx);
            result.by_ncbi_id.insert(record.ncbi_gene_id.clone(), idx);
            if let Some(ensembl_gene_id) = &record.ensembl_gene_id {
                result.by_ensembl_id.insert(ensembl_gene_id.clone(), idx);
            }
        }
        result.records = records;
        result
    }

    /// Load from a `hgnc_info.jsonl` file.
    pub fn from_jsonl<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("Loading HGNC info from {:?}...", path.as_ref());
        let records = load_hgnc_info_jsonl(path)?;
        tracing::info!(
            "... done loading {} records",
            records.len().separate_with_commas()
        );
        Ok(Self::new(records))
    }

    /// All records in input order.
    pub fn records(&self) -> &[GeneIds] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lookup by a typed key.
    pub fn get(&self, key: GeneKey<'_>) -> Option<&GeneIds> {
        let idx = match key {
            GeneKey::Symbol(symbol) => self.by_symbol.get(symbol),
            GeneKey::HgncId(hgnc_id) => self.by_hgnc_id.get(hgnc_id),
            GeneKey::NcbiId(ncbi_id) => self.by_ncbi_id.get(ncbi_id),
            GeneKey::EnsemblId(ensembl_id) => self.by_ensembl_id.get(ensembl_id),
        };
        idx.map(|idx| &self.records[*idx])
    }

    /// Lookup by an identifier of unknown type.
    ///
    /// The identifier types are tried in the order HGNC ID, NCBI gene ID,
    /// ENSEMBL gene ID, symbol.
    pub fn resolve(&self, gene_id: &str) -> Option<&GeneIds> {
        self.get(GeneKey::HgncId(gene_id))
            .or_else(|| self.get(GeneKey::NcbiId(gene_id)))
            .or_else(|| self.get(GeneKey::EnsemblId(gene_id)))
            .or_else(|| self.get(GeneKey::Symbol(gene_id)))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::{GeneIdRegistry, GeneIds, GeneKey, HgncDoc};

    pub(crate) fn gene_ids(symbol: &str, hgnc_id: &str, ncbi_gene_id: &str) -> GeneIds {
        GeneIds {
            symbol: symbol.into(),
            hgnc_id: hgnc_id.into(),
            ncbi_gene_id: ncbi_gene_id.into(),
            ensembl_gene_id: None,
        }
    }

    fn doc(
        symbol: Option<&str>,
        hgnc_id: &str,
        entrez_id: Option<&str>,
        ensembl_gene_id: Option<&str>,
    ) -> HgncDoc {
        HgncDoc {
            symbol: symbol.map(String::from),
            hgnc_id: Some(hgnc_id.into()),
            entrez_id: entrez_id.map(String::from),
            ensembl_gene_id: ensembl_gene_id.map(String::from),
        }
    }

    #[test]
    fn build_gene_ids_skips_incomplete() {
        let docs = vec![
            doc(Some("A1BG"), "HGNC:5", Some("1"), Some("ENSG00000121410")),
            doc(Some("NOENTREZ"), "HGNC:6", None, None),
            doc(None, "HGNC:7", Some("3"), None),
            doc(Some("A2M"), "HGNC:7", Some("2"), None),
        ];

        let (ncbi_to_hgnc, gene_ids) = super::build_gene_ids(docs);

        assert_eq!(gene_ids.len(), 2);
        assert_eq!(ncbi_to_hgnc.len(), 2);
        assert_eq!(ncbi_to_hgnc.get("1"), Some(&String::from("HGNC:5")));
        assert_eq!(ncbi_to_hgnc.get("2"), Some(&String::from("HGNC:7")));
        assert_eq!(gene_ids[1].ensembl_gene_id, None);
    }

    #[test]
    fn load_hgnc_json() -> Result<(), anyhow::Error> {
        let (ncbi_to_hgnc, gene_ids) = super::load_hgnc_json("tests/data/hgnc_complete_set.json")?;

        assert_eq!(gene_ids.len(), 4);
        assert_eq!(ncbi_to_hgnc.get("672"), Some(&String::from("HGNC:1100")));
        assert_eq!(gene_ids[0].symbol, "BRCA1");

        Ok(())
    }

    #[rstest::rstest]
    #[case(GeneKey::Symbol("BRCA1"))]
    #[case(GeneKey::HgncId("HGNC:1100"))]
    #[case(GeneKey::NcbiId("672"))]
    #[case(GeneKey::EnsemblId("ENSG00000012048"))]
    fn registry_get_by_any_key(#[case] key: GeneKey) {
        let mut brca1 = gene_ids("BRCA1", "HGNC:1100", "672");
        brca1.ensembl_gene_id = Some("ENSG00000012048".into());
        let registry = GeneIdRegistry::new(vec![gene_ids("TTN", "HGNC:12403", "7273"), brca1]);

        assert_eq!(
            registry.get(key).map(|g| g.hgnc_id.as_str()),
            Some("HGNC:1100")
        );
    }

    #[rstest::rstest]
    #[case("BRCA1", Some("HGNC:1100"))]
    #[case("HGNC:1100", Some("HGNC:1100"))]
    #[case("672", Some("HGNC:1100"))]
    #[case("7273", Some("HGNC:12403"))]
    #[case("FOO", None)]
    fn registry_resolve(#[case] query: &str, #[case] expected: Option<&str>) {
        let registry = GeneIdRegistry::new(vec![
            gene_ids("BRCA1", "HGNC:1100", "672"),
            gene_ids("TTN", "HGNC:12403", "7273"),
        ]);

        assert_eq!(
            registry.resolve(query).map(|g| g.hgnc_id.as_str()),
            expected
        );
    }

    #[test]
    fn registry_wrong_key_type() {
        let registry = GeneIdRegistry::new(vec![gene_ids("BRCA1", "HGNC:1100", "672")]);

        assert_eq!(registry.get(GeneKey::Symbol("672")), None);
        assert_eq!(registry.get(GeneKey::NcbiId("BRCA1")), None);
    }

    #[rstest::rstest]
    #[case("hgnc_info.jsonl")]
    #[case("hgnc_info.jsonl.gz")]
    fn write_and_load_jsonl(#[case] filename: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join(filename);
        let mut brca1 = gene_ids("BRCA1", "HGNC:1100", "672");
        brca1.ensembl_gene_id = Some("ENSG00000012048".into());
        let records = vec![brca1, gene_ids("TTN", "HGNC:12403", "7273")];

        super::write_hgnc_info_jsonl(&path, &records)?;
        let registry = GeneIdRegistry::from_jsonl(&path)?;

        assert_eq!(registry.records(), &records[..]);
        assert_eq!(registry.len(), 2);

        Ok(())
    }
}
