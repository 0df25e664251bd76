use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

use chrono::{DateTime, Local};
use getset::{Getters, Setters};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::helper::gene_table::COMMUNITY;

/// Final per-scope pathway values (one instance for abundance, one for
/// coverage): taxon -> pathway -> value. Zero or non-finite values are
/// never stored; absence means 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathwayScores {
    scores: HashMap<String, HashMap<String, f64>>,
}

impl PathwayScores {
    pub fn new() -> Self {
        PathwayScores::default()
    }

    pub fn insert(&mut self, taxon: &str, pathway: &str, value: f64) {
        if value > 0.0 && value.is_finite() {
            self.scores
                .entry(taxon.to_string())
                .or_default()
                .insert(pathway.to_string(), value);
        }
    }

    pub fn get(&self, taxon: &str, pathway: &str) -> f64 {
        self.scores
            .get(taxon)
            .and_then(|row| row.get(pathway))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn row(&self, taxon: &str) -> Option<&HashMap<String, f64>> {
        self.scores.get(taxon)
    }

    pub fn taxa(&self) -> impl Iterator<Item = &String> {
        self.scores.keys()
    }

    pub fn insert_row(&mut self, taxon: &str, row: HashMap<String, f64>) {
        for (pathway, value) in row {
            self.insert(taxon, &pathway, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scores.values().all(|row| row.is_empty())
    }

    /// Writes the table as TSV: community rows first (`pathway \t value`,
    /// sorted by pathway), then stratified rows (`pathway|taxon \t value`,
    /// sorted by pathway then taxon).
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P, label: &str) -> Result<(), Box<dyn Error>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        writer.write_record(["Pathway", label])?;

        if let Some(row) = self.scores.get(COMMUNITY) {
            for (pathway, value) in row.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
                writer.write_record([pathway.clone(), value.to_string()])?;
            }
        }

        let mut stratified: Vec<(&String, &String, &f64)> = Vec::new();
        for (taxon, row) in &self.scores {
            if taxon == COMMUNITY {
                continue;
            }
            for (pathway, value) in row {
                stratified.push((pathway, taxon, value));
            }
        }
        stratified.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        for (pathway, taxon, value) in stratified {
            writer.write_record([format!("{}|{}", pathway, taxon), value.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum QuantWarning {
    #[error("pruner produced no output for taxon {0}; using static membership")]
    PrunerUnavailable(String),
    #[error("pruner failed for taxon {0}: {1}; using static membership")]
    PrunerFailed(String, String),
    #[error("significance filter unavailable: {0}; keeping all pathways")]
    SignificanceFilterUnavailable(String),
    #[error("{0} malformed pathway records skipped during catalog load")]
    SkippedPathwayRecords(usize),
    #[error("{0} alignment records skipped as malformed")]
    SkippedAlignmentRecords(u64),
}

/// Run summary written alongside the output tables.
#[derive(Debug, Clone, Serialize, Deserialize, Getters, Setters)]
pub struct QuantReport {
    #[getset(get = "pub", set = "pub")]
    process_start_time: DateTime<Local>,
    #[getset(get = "pub", set = "pub")]
    current_version: String,
    #[getset(get = "pub", set = "pub")]
    input_file: String,

    #[getset(get = "pub", set = "pub")]
    total_reads: u64,
    #[getset(get = "pub", set = "pub")]
    aligned_reads: u64,
    #[getset(get = "pub", set = "pub")]
    alignment_hits: u64,

    #[getset(get = "pub", set = "pub")]
    taxa_profiled: usize,
    #[getset(get = "pub", set = "pub")]
    pathways_reported: usize,

    warnings: Vec<QuantWarning>,
    errors: Vec<String>,
    process_end_time: DateTime<Local>,
}

impl QuantReport {
    pub fn new() -> Self {
        QuantReport {
            process_start_time: Local::now(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: String::new(),
            total_reads: 0,
            aligned_reads: 0,
            alignment_hits: 0,
            taxa_profiled: 0,
            pathways_reported: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            process_end_time: Local::now(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn warnings(&self) -> &[QuantWarning] {
        &self.warnings
    }

    pub fn add_warning(&mut self, warning: QuantWarning) {
        self.warnings.push(warning);
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn finish(&mut self) {
        self.process_end_time = Local::now();
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl Default for QuantReport {
    fn default() -> Self {
        QuantReport::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_never_stored() {
        let mut scores = PathwayScores::new();
        scores.insert("bug1", "PWY1", 0.0);
        scores.insert("bug1", "PWY2", -1.0);
        scores.insert("bug1", "PWY3", f64::NAN);
        scores.insert("bug1", "PWY4", 2.5);
        assert_eq!(scores.get("bug1", "PWY1"), 0.0);
        assert_eq!(scores.get("bug1", "PWY4"), 2.5);
        assert_eq!(scores.row("bug1").unwrap().len(), 1);
    }

    #[test]
    fn test_write_tsv_orders_community_then_stratified() {
        let dir = std::env::temp_dir().join(format!("metaquant_report_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("abundance.tsv");

        let mut scores = PathwayScores::new();
        scores.insert(COMMUNITY, "PWY2", 2.0);
        scores.insert(COMMUNITY, "PWY1", 1.0);
        scores.insert("bug1", "PWY1", 0.6);
        scores.insert("bug2", "PWY1", 0.4);
        scores.write_tsv(&path, "Abundance").unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "Pathway\tAbundance");
        assert_eq!(lines[1], "PWY1\t1");
        assert_eq!(lines[2], "PWY2\t2");
        assert_eq!(lines[3], "PWY1|bug1\t0.6");
        assert_eq!(lines[4], "PWY1|bug2\t0.4");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_report_tracks_warnings_and_errors() {
        let mut report = QuantReport::new();
        assert!(report.is_successful());
        report.add_warning(QuantWarning::PrunerUnavailable("bug1".to_string()));
        assert!(report.is_successful());
        report.add_error("catalog load failed".to_string());
        assert!(!report.is_successful());
        assert_eq!(report.warnings().len(), 1);
    }
}
