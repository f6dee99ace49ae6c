//! Minimal reader for the HPO ontology in OBO format.
//!
//! Only the parts needed for building the knowledge graph are extracted:
//! term ID, name, alternative IDs, `is_a` parents, and the obsolete flag.

use std::{collections::HashMap, io::BufRead, path::Path, time::Instant};

use thousands::Separable;

use crate::common::io::open_read_maybe_gz;

/// One `[Term]` stanza of the OBO file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Term {
    /// The term ID, e.g., `HP:0000118`.
    pub id: String,
    /// The term name.
    pub name: String,
    /// Alternative (deprecated) IDs that map to this term.
    pub alt_ids: Vec<String>,
    /// IDs of the direct superclasses, in file order.
    pub parents: Vec<String>,
    /// Whether the term is marked as obsolete.
    pub is_obsolete: bool,
}

/// The parsed ontology.
#[derive(Debug, Clone, Default)]
pub struct Ontology {
    /// The ontology's `data-version` header value, if any.
    pub data_version: Option<String>,
    /// All terms in file order.
    terms: Vec<Term>,
}

/// Strip trailing `! comment` and qualifier blocks from a tag value.
fn strip_value(value: &str) -> &str {
    let value = value.split(" ! ").next().unwrap_or(value);
    let value = value.split(" {").next().unwrap_or(value);
    value.trim()
}

impl Ontology {
    /// Parse OBO from a reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, anyhow::Error> {
        let mut result = Self::default();
        let mut current: Option<Term> = None;
        let mut in_header = true;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();
            if line.starts_with('[') {
                in_header = false;
                if let Some(term) = current.take() {
                    result.terms.push(term);
                }
                if line == "[Term]" {
                    current = Some(Term::default());
                }
                continue;
            }

            let Some((tag, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim_start();

            if in_header {
                if tag == "data-version" {
                    result.data_version = Some(value.to_string());
                }
                continue;
            }

            if let Some(term) = current.as_mut() {
                match tag {
                    "id" => term.id = strip_value(value).to_string(),
                    "name" => term.name = value.trim().to_string(),
                    "alt_id" => term.alt_ids.push(strip_value(value).to_string()),
                    "is_a" => term.parents.push(strip_value(value).to_string()),
                    "is_obsolete" => term.is_obsolete = strip_value(value) == "true",
                    _ => (),
                }
            }
        }
        if let Some(term) = current.take() {
            result.terms.push(term);
        }

        Ok(result)
    }

    /// Load the ontology from an OBO file, gzip compression is detected by
    /// file extension.
    pub fn from_obo<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("Loading HPO OBO from {:?}...", path.as_ref());
        let before_loading = Instant::now();
        let result = Self::from_reader(open_read_maybe_gz(&path)?)
            .map_err(|e| anyhow::anyhow!("problem parsing {:?}: {}", path.as_ref(), e))?;
        tracing::info!(
            "... done loading {} terms (version {}) in {:?}",
            result.terms.len().separate_with_commas(),
            result.data_version.as_deref().unwrap_or("unknown"),
            before_loading.elapsed()
        );
        Ok(result)
    }

    /// All terms in file order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether there are no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms that can be used for the lookup tables; these need ID and name.
    fn named_terms(&self) -> impl Iterator<Item = &Term> {
        self.terms
            .iter()
            .filter(|term| !term.id.is_empty() && !term.name.is_empty())
    }

    /// Mapping from alternative ID to canonical term ID.
    pub fn hpo_id_from_alt(&self) -> HashMap<String, String> {
        self.named_terms()
            .flat_map(|term| {
                term.alt_ids
                    .iter()
                    .map(|alt_id| (alt_id.clone(), term.id.clone()))
            })
            .collect()
    }

    /// Mapping from term ID (including alternative IDs) to term name.
    pub fn hpo_id_to_name(&self) -> HashMap<String, String> {
        let mut result = HashMap::new();
        for term in self.named_terms() {
            result.insert(term.id.clone(), term.name.clone());
            for alt_id in &term.alt_ids {
                result.insert(alt_id.clone(), term.name.clone());
            }
        }
        result
    }
}

/// Canonicalization of phenotype term IDs through the alternative ID table.
#[derive(Debug, Clone, Default)]
pub struct TermCanonicalizer {
    hpo_id_from_alt: HashMap<String, String>,
}

impl TermCanonicalizer {
    /// Construct from the alternative ID table.
    pub fn new(hpo_id_from_alt: HashMap<String, String>) -> Self {
        Self { hpo_id_from_alt }
    }

    /// Construct from the ontology.
    pub fn from_ontology(ontology: &Ontology) -> Self {
        Self::new(ontology.hpo_id_from_alt())
    }

    /// Map `term_id` to its canonical ID, unknown IDs are returned verbatim.
    pub fn canonicalize<'a>(&'a self, term_id: &'a str) -> &'a str {
        self.hpo_id_from_alt
            .get(term_id)
            .map(String::as_str)
            .unwrap_or(term_id)
    }

    /// Canonicalize, sort, and deduplicate the given term IDs.
    pub fn canonicalize_all<S: AsRef<str>>(&self, term_ids: &[S]) -> Vec<String> {
        let mut result = term_ids
            .iter()
            .map(|term_id| self.canonicalize(term_id.as_ref()).to_string())
            .collect::<Vec<_>>();
        result.sort();
        result.dedup();
        result
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::{Ontology, TermCanonicalizer};

    pub(crate) const MINI_OBO: &str = "format-version: 1.2
data-version: hp/releases/2023-06-06

[Term]
id: HP:0000001
name: All

[Term]
id: HP:0000118
name: Phenotypic abnormality
is_a: HP:0000001 ! All

[Term]
id: HP:0000707
name: Abnormality of the nervous system
alt_id: HP:0001333
is_a: HP:0000118 ! Phenotypic abnormality

[Term]
id: HP:0001250
name: Seizure
alt_id: HP:0002279
alt_id: HP:0002391
is_a: HP:0000707 ! Abnormality of the nervous system
is_a: HP:0000118 ! Phenotypic abnormality

[Term]
id: HP:0000005
name: obsolete Mode of inheritance
is_obsolete: true

[Typedef]
id: part_of
name: part of
";

    #[test]
    fn parse_mini_obo() -> Result<(), anyhow::Error> {
        let ontology = Ontology::from_reader(MINI_OBO.as_bytes())?;

        assert_eq!(ontology.len(), 5);
        assert_eq!(
            ontology.data_version.as_deref(),
            Some("hp/releases/2023-06-06")
        );
        let seizure = &ontology.terms()[3];
        assert_eq!(seizure.id, "HP:0001250");
        assert_eq!(seizure.name, "Seizure");
        assert_eq!(seizure.alt_ids, vec!["HP:0002279", "HP:0002391"]);
        assert_eq!(seizure.parents, vec!["HP:0000707", "HP:0000118"]);
        assert!(ontology.terms()[4].is_obsolete);
        assert!(ontology.terms()[0].parents.is_empty());

        Ok(())
    }

    #[test]
    fn alt_and_name_tables() -> Result<(), anyhow::Error> {
        let ontology = Ontology::from_reader(MINI_OBO.as_bytes())?;

        let from_alt = ontology.hpo_id_from_alt();
        assert_eq!(from_alt.len(), 3);
        assert_eq!(from_alt.get("HP:0002279"), Some(&String::from("HP:0001250")));
        assert_eq!(from_alt.get("HP:0001333"), Some(&String::from("HP:0000707")));

        let to_name = ontology.hpo_id_to_name();
        assert_eq!(to_name.get("HP:0002391"), Some(&String::from("Seizure")));
        assert_eq!(to_name.get("HP:0000001"), Some(&String::from("All")));

        Ok(())
    }

    #[test]
    fn canonicalize() -> Result<(), anyhow::Error> {
        let ontology = Ontology::from_reader(MINI_OBO.as_bytes())?;
        let canonicalizer = TermCanonicalizer::from_ontology(&ontology);

        assert_eq!(canonicalizer.canonicalize("HP:0002279"), "HP:0001250");
        assert_eq!(canonicalizer.canonicalize("HP:0001250"), "HP:0001250");
        assert_eq!(canonicalizer.canonicalize("HP:9999999"), "HP:9999999");
        assert_eq!(
            canonicalizer.canonicalize_all(&["HP:0002391", "HP:0001250", "HP:0000118"]),
            vec!["HP:0000118", "HP:0001250"]
        );

        Ok(())
    }

    #[test]
    fn from_obo_file() -> Result<(), anyhow::Error> {
        let ontology = Ontology::from_obo("tests/data/hp.obo")?;

        assert!(!ontology.is_empty());
        assert!(ontology.terms().iter().any(|t| t.id == "HP:0000118"));

        Ok(())
    }
}
