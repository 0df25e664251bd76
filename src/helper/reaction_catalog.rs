use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::helper::gene_table::GeneScoreTable;

/// EC numbers as they appear in the optional second catalog column,
/// e.g. `1.1.1.1` or `2.7.1.-`.
static EC_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.(\d+|-))*$").unwrap());

#[derive(Debug, Error)]
pub enum ReactionCatalogError {
    #[error("cannot read reaction catalog {path}: {source}")]
    Unreadable { path: String, source: io::Error },
    #[error("reaction catalog {path} contains no reactions")]
    Empty { path: String },
}

/// Static bidirectional map between reactions and their member gene
/// families. Loaded once per run; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReactionCatalog {
    reactions_to_genes: HashMap<String, Vec<String>>,
    genes_to_reactions: HashMap<String, Vec<String>>,
}

impl ReactionCatalog {
    pub fn new() -> Self {
        ReactionCatalog::default()
    }

    /// Registers a gene-reaction pair in both directions. Re-adding an
    /// existing pair is a no-op, so repeated catalog lines cannot duplicate
    /// membership.
    pub fn add(&mut self, reaction: &str, gene: &str) {
        let genes = self.reactions_to_genes.entry(reaction.to_string()).or_default();
        if !genes.iter().any(|g| g == gene) {
            genes.push(gene.to_string());
        }
        let reactions = self.genes_to_reactions.entry(gene.to_string()).or_default();
        if !reactions.iter().any(|r| r == reaction) {
            reactions.push(reaction.to_string());
        }
    }

    pub fn find_genes(&self, reaction: &str) -> Option<&[String]> {
        self.reactions_to_genes.get(reaction).map(|v| v.as_slice())
    }

    pub fn find_reactions(&self, gene: &str) -> Option<&[String]> {
        self.genes_to_reactions.get(gene).map(|v| v.as_slice())
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions_to_genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions_to_genes.is_empty()
    }

    /// Parses one record per line: `reaction \t [EC] \t gene ...`, genes
    /// tab- or comma-delimited. The EC column is recognized by shape and
    /// skipped; it is not part of the membership map.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut catalog = ReactionCatalog::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let Some(reaction) = fields.next() else {
                continue;
            };
            let reaction = reaction.trim();
            if reaction.is_empty() {
                continue;
            }
            for (i, field) in fields.enumerate() {
                if i == 0 && EC_PATTERN.is_match(field.trim()) {
                    continue;
                }
                for gene in field.split(',') {
                    let gene = gene.trim();
                    if !gene.is_empty() {
                        catalog.add(reaction, gene);
                    }
                }
            }
        }
        Ok(catalog)
    }

    /// Loads the catalog from disk. A missing or unreadable file is fatal:
    /// the run cannot proceed without its static catalogs.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ReactionCatalogError> {
        let path_str = path.as_ref().display().to_string();
        let file = File::open(&path).map_err(|source| ReactionCatalogError::Unreadable {
            path: path_str.clone(),
            source,
        })?;
        let catalog = ReactionCatalog::from_reader(BufReader::new(file)).map_err(|source| {
            ReactionCatalogError::Unreadable {
                path: path_str.clone(),
                source,
            }
        })?;
        if catalog.is_empty() {
            return Err(ReactionCatalogError::Empty { path: path_str });
        }
        Ok(catalog)
    }
}

/// Per-taxon reaction scores: taxon -> reaction -> summed member-gene score.
pub type TaxonReactionScores = HashMap<String, HashMap<String, f64>>;

/// Folds gene scores into reaction scores for every taxon in the table.
/// A reaction's score is the sum of its member genes' scores; reactions
/// with no scored member are absent (absence = 0).
pub fn score_reactions(table: &GeneScoreTable, catalog: &ReactionCatalog) -> TaxonReactionScores {
    let mut scores = TaxonReactionScores::new();
    for taxon in table.taxa() {
        let Some(row) = table.row(taxon) else {
            continue;
        };
        let mut reaction_row: HashMap<String, f64> = HashMap::new();
        for (gene, score) in row {
            if *score <= 0.0 {
                continue;
            }
            if let Some(reactions) = catalog.find_reactions(gene) {
                for reaction in reactions {
                    *reaction_row.entry(reaction.clone()).or_insert(0.0) += score;
                }
            }
        }
        if !reaction_row.is_empty() {
            scores.insert(taxon.clone(), reaction_row);
        }
    }
    scores
}
