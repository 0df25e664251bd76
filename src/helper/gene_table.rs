use std::collections::HashMap;
use std::io::BufRead;

use serde::{Deserialize, Serialize};

/// Reserved taxon key holding the community-wide aggregate row.
pub const COMMUNITY: &str = "all";

/// Sparse taxon x gene-family matrix of abundance scores (RPK units).
///
/// A gene family absent from a taxon's map has implicit score 0, and scores
/// are never negative. The `"all"` row is the sum over all taxa and is kept
/// up to date on every insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneScoreTable {
    scores: HashMap<String, HashMap<String, f64>>,
}

impl GeneScoreTable {
    pub fn new() -> Self {
        GeneScoreTable {
            scores: HashMap::new(),
        }
    }

    /// Adds `delta` to the (taxon, gene) cell and to the community row.
    /// Non-positive deltas are ignored so absence stays indistinguishable
    /// from zero.
    pub fn add(&mut self, taxon: &str, gene: &str, delta: f64) {
        if !(delta > 0.0) || !delta.is_finite() {
            return;
        }
        *self
            .scores
            .entry(taxon.to_string())
            .or_default()
            .entry(gene.to_string())
            .or_insert(0.0) += delta;
        if taxon != COMMUNITY {
            *self
                .scores
                .entry(COMMUNITY.to_string())
                .or_default()
                .entry(gene.to_string())
                .or_insert(0.0) += delta;
        }
    }

    pub fn get(&self, taxon: &str, gene: &str) -> f64 {
        self.scores
            .get(taxon)
            .and_then(|row| row.get(gene))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn row(&self, taxon: &str) -> Option<&HashMap<String, f64>> {
        self.scores.get(taxon)
    }

    /// All taxon keys, community row included.
    pub fn taxa(&self) -> impl Iterator<Item = &String> {
        self.scores.keys()
    }

    /// Total gene abundance for a taxon (0 for an unknown taxon).
    pub fn total_abundance(&self, taxon: &str) -> f64 {
        self.scores
            .get(taxon)
            .map(|row| row.values().sum())
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Alternate entry point: a pre-computed gene table, one line per gene:
    /// `gene \t score` or `gene|taxon \t score`. Rows are finished scores, so
    /// no competitive normalization is applied. Lines with an unparsable
    /// score are skipped.
    pub fn from_gene_table_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut table = GeneScoreTable::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (Some(id), Some(value)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Ok(score) = value.trim().parse::<f64>() else {
                continue;
            };
            let (gene, taxon) = match id.split_once('|') {
                Some((gene, taxon)) if !taxon.is_empty() => (gene, taxon),
                _ => (id, COMMUNITY),
            };
            table.add(taxon, gene, score);
        }
        Ok(table)
    }
}
