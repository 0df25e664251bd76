use std::collections::HashMap;
use std::io::{self, BufRead};

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};

use crate::helper::gene_table::GeneScoreTable;
use crate::helper::hit_store::HitStore;

/// Taxon assigned to hits whose reference annotation carries no organism.
pub const UNCLASSIFIED: &str = "unclassified";

/// Substitute for a missing or zero reference length (bases).
pub const DEFAULT_REFERENCE_LENGTH: u32 = 1000;

/// One raw alignment hit: a read matched to a reference gene with a
/// confidence value already converted to `exp(-evalue)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentHit {
    pub query: String,
    pub taxon: String,
    pub gene: String,
    /// Reference length in bases; 0 means unknown and is treated as
    /// [`DEFAULT_REFERENCE_LENGTH`] at normalization time.
    pub reference_length: u32,
    pub score: f64,
}

/// Gene, length and taxon decoded from a reference id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAnnotation {
    pub gene: String,
    pub length: u32,
    pub taxon: String,
}

impl ReferenceAnnotation {
    fn unannotated(raw: &str) -> Self {
        ReferenceAnnotation {
            gene: raw.to_string(),
            length: 0,
            taxon: UNCLASSIFIED.to_string(),
        }
    }
}

/// External override for reference-id parsing: reference -> (gene, length, taxon).
pub type IdMapping = HashMap<String, ReferenceAnnotation>;

/// Loads an id-mapping table, one line per reference:
/// `reference \t gene \t length \t taxon`. Malformed lines are skipped.
pub fn load_id_mapping<R: BufRead>(reader: R) -> io::Result<IdMapping> {
    let mut mapping = IdMapping::new();
    for line in reader.lines() {
        let line = line?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            continue;
        }
        let length = fields[2].trim().parse::<u32>().unwrap_or(0);
        mapping.insert(
            fields[0].to_string(),
            ReferenceAnnotation {
                gene: fields[1].to_string(),
                length,
                taxon: fields[3].to_string(),
            },
        );
    }
    Ok(mapping)
}

/// Decodes a pipe-delimited reference id into gene, length and taxon.
///
/// Recognized layouts: `gene|length`, `length|gene`, `gene|length|taxon`, and
/// the long reference-catalog form (7+ fields) with the taxon in field 5 and
/// the gene family in the last field. Anything else degrades to the raw
/// string as the gene id, unknown length, and the unclassified taxon.
pub fn parse_reference_annotation(raw: &str, mapping: Option<&IdMapping>) -> ReferenceAnnotation {
    if let Some(annotation) = mapping.and_then(|m| m.get(raw)) {
        return annotation.clone();
    }

    let fields: Vec<&str> = raw.split('|').collect();
    match fields.len() {
        1 => ReferenceAnnotation::unannotated(raw),
        2 => {
            if let Ok(length) = fields[1].parse::<u32>() {
                ReferenceAnnotation {
                    gene: fields[0].to_string(),
                    length,
                    taxon: UNCLASSIFIED.to_string(),
                }
            } else if let Ok(length) = fields[0].parse::<u32>() {
                ReferenceAnnotation {
                    gene: fields[1].to_string(),
                    length,
                    taxon: UNCLASSIFIED.to_string(),
                }
            } else {
                ReferenceAnnotation::unannotated(raw)
            }
        }
        3 => ReferenceAnnotation {
            gene: fields[0].to_string(),
            length: fields[1].parse::<u32>().unwrap_or(0),
            taxon: fields[2].to_string(),
        },
        n if n >= 7 => ReferenceAnnotation {
            gene: fields[n - 1].to_string(),
            length: 0,
            taxon: fields[5].to_string(),
        },
        _ => ReferenceAnnotation::unannotated(raw),
    }
}

/// Converts an e-value to a hit score. Overflowing conversions fail closed
/// to 0 so one absurd record cannot dominate a gene.
pub fn hit_score_from_evalue(evalue: f64) -> f64 {
    let score = (-evalue).exp();
    if score.is_finite() { score } else { 0.0 }
}

/// Parses one tab-delimited aligner record into a hit, or None if the record
/// is too short or its confidence value is not numeric. Full 12-field
/// tabular-alignment records carry the e-value in field 10; minimal records
/// carry it in field 2.
pub fn parse_hit_line(line: &str, mapping: Option<&IdMapping>) -> Option<AlignmentHit> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return None;
    }
    let evalue_field = if fields.len() >= 11 { fields[10] } else { fields[2] };
    let evalue = evalue_field.trim().parse::<f64>().ok()?;

    let annotation = parse_reference_annotation(fields[1], mapping);
    Some(AlignmentHit {
        query: fields[0].to_string(),
        taxon: annotation.taxon,
        gene: annotation.gene,
        reference_length: annotation.length,
        score: hit_score_from_evalue(evalue),
    })
}

/// Length-normalization policy for finalization, passed in explicitly so the
/// resulting table is a pure function of the hit set and these options.
#[derive(Debug, Clone, Copy)]
pub struct ScoringOptions {
    pub read_length_normalization: bool,
    pub average_read_length: u32,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        ScoringOptions {
            read_length_normalization: false,
            average_read_length: 0,
        }
    }
}

fn normalized_length_kb(reference_length: u32, options: &ScoringOptions) -> f64 {
    let length = if reference_length == 0 {
        DEFAULT_REFERENCE_LENGTH
    } else {
        reference_length
    };
    if options.read_length_normalization {
        (((length as i64 - options.average_read_length as i64).abs() + 1) as f64) / 1000.0
    } else {
        length as f64 / 1000.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct QueryTally {
    total_score: f64,
    hits: u32,
}

/// Counters from one ingestion pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    pub lines: u64,
    pub hits: u64,
    pub skipped: u64,
}

/// Accumulates raw hits and converts them into a competitively-normalized,
/// length-adjusted [`GeneScoreTable`].
///
/// Scoring is two-pass: hits are staged in the storage backend while
/// per-query totals accumulate, and only at finalization is each hit's
/// competitive weight known. A query with a single hit contributes its full
/// weight; a multi-hit query splits weight 1.0 across its genes in
/// proportion to each hit's score.
pub struct AlignmentStore {
    storage: Box<dyn HitStore>,
    query_totals: HashMap<String, QueryTally>,
}

impl AlignmentStore {
    pub fn new(storage: Box<dyn HitStore>) -> Self {
        AlignmentStore {
            storage,
            query_totals: HashMap::new(),
        }
    }

    pub fn add_hit(&mut self, hit: AlignmentHit) -> io::Result<()> {
        let tally = self.query_totals.entry(hit.query.clone()).or_default();
        tally.total_score += hit.score;
        tally.hits += 1;
        self.storage.put(hit)
    }

    /// Number of distinct query ids seen so far. Reads not in this set never
    /// aligned and feed the UNMAPPED row.
    pub fn aligned_query_count(&self) -> u64 {
        self.query_totals.len() as u64
    }

    pub fn hit_count(&self) -> usize {
        self.storage.len()
    }

    /// Ingests tab-delimited aligner records. Records that fail to parse are
    /// counted and skipped, never fatal.
    pub fn ingest_reader<R: BufRead>(
        &mut self,
        reader: R,
        mapping: Option<&IdMapping>,
        progress: Option<&ProgressBar>,
    ) -> io::Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        for line in reader.lines() {
            let line = line?;
            summary.lines += 1;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            if line.is_empty() || line.starts_with('#') {
                summary.skipped += 1;
                continue;
            }
            match parse_hit_line(&line, mapping) {
                Some(hit) => {
                    self.add_hit(hit)?;
                    summary.hits += 1;
                }
                None => summary.skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Folds every staged hit into per-(taxon, gene) scores, applying the
    /// competitive multi-hit rule and length normalization. Consumes the
    /// store; the per-query accumulator dies with it.
    pub fn finalize(mut self, options: &ScoringOptions) -> io::Result<GeneScoreTable> {
        let mut table = GeneScoreTable::new();
        let query_totals = &self.query_totals;
        self.storage.for_each(&mut |hit| {
            let weight = match query_totals.get(&hit.query) {
                Some(tally) if tally.hits > 1 => {
                    if tally.total_score > 0.0 {
                        hit.score / tally.total_score
                    } else {
                        0.0
                    }
                }
                Some(_) => 1.0,
                None => 0.0,
            };
            let contribution = weight / normalized_length_kb(hit.reference_length, options);
            table.add(&hit.taxon, &hit.gene, contribution);
        })?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::gene_table::COMMUNITY;
    use crate::helper::hit_store::MemoryHitStore;

    const EPS: f64 = 1e-9;

    fn hit(query: &str, taxon: &str, gene: &str, length: u32, score: f64) -> AlignmentHit {
        AlignmentHit {
            query: query.to_string(),
            taxon: taxon.to_string(),
            gene: gene.to_string(),
            reference_length: length,
            score,
        }
    }

    fn finalize_hits(hits: Vec<AlignmentHit>) -> GeneScoreTable {
        let mut store = AlignmentStore::new(Box::new(MemoryHitStore::new()));
        for h in hits {
            store.add_hit(h).unwrap();
        }
        store.finalize(&ScoringOptions::default()).unwrap()
    }

    #[test]
    fn test_reference_annotation_layouts() {
        let a = parse_reference_annotation("geneX|600", None);
        assert_eq!(a.gene, "geneX");
        assert_eq!(a.length, 600);
        assert_eq!(a.taxon, UNCLASSIFIED);

        let b = parse_reference_annotation("600|geneX", None);
        assert_eq!(b.gene, "geneX");
        assert_eq!(b.length, 600);

        let c = parse_reference_annotation("geneX|600|bug1", None);
        assert_eq!(c.gene, "geneX");
        assert_eq!(c.length, 600);
        assert_eq!(c.taxon, "bug1");

        let d = parse_reference_annotation(
            "gi|83644929|ref|YP_099106.1|GeneID:3840394|g__Bacteroides.s__fragilis|fam90_X|fam50_X",
            None,
        );
        assert_eq!(d.taxon, "g__Bacteroides.s__fragilis");
        assert_eq!(d.gene, "fam50_X");
        assert_eq!(d.length, 0);
    }

    #[test]
    fn test_malformed_annotation_degrades_to_raw() {
        let a = parse_reference_annotation("geneX|geneY", None);
        assert_eq!(a.gene, "geneX|geneY");
        assert_eq!(a.length, 0);
        assert_eq!(a.taxon, UNCLASSIFIED);
    }

    #[test]
    fn test_id_mapping_overrides_string_parsing() {
        let mapping = load_id_mapping("ref1\tgeneZ\t500\tbug9\nshort\tline\n".as_bytes()).unwrap();
        let a = parse_reference_annotation("ref1", Some(&mapping));
        assert_eq!(a.gene, "geneZ");
        assert_eq!(a.length, 500);
        assert_eq!(a.taxon, "bug9");
    }

    #[test]
    fn test_parse_hit_line_full_and_minimal() {
        // 12-field tabular alignment record: e-value in field 10
        let full = "q1\tgeneX|1000|bug1\t98.2\t100\t1\t0\t1\t100\t5\t105\t1e-3\t180.0";
        let hit = parse_hit_line(full, None).unwrap();
        assert_eq!(hit.query, "q1");
        assert_eq!(hit.gene, "geneX");
        assert_eq!(hit.taxon, "bug1");
        assert!((hit.score - (-0.001f64).exp()).abs() < EPS);

        let minimal = "q2\tgeneY|500\t0.5";
        let hit = parse_hit_line(minimal, None).unwrap();
        assert_eq!(hit.gene, "geneY");
        assert!((hit.score - (-0.5f64).exp()).abs() < EPS);

        assert!(parse_hit_line("q3\tgeneZ", None).is_none());
        assert!(parse_hit_line("q4\tgeneZ|100\tnot-a-number", None).is_none());
    }

    #[test]
    fn test_evalue_overflow_fails_closed() {
        assert_eq!(hit_score_from_evalue(-1e6), 0.0);
        assert!((hit_score_from_evalue(0.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_competitive_split_conserves_mass() {
        // queryA hits geneX (0.9) and geneY (0.1); both length 1000 so the
        // 1/length factor is 1.0 and the weights must sum to exactly 1.0.
        let table = finalize_hits(vec![
            hit("queryA", "bug1", "geneX", 1000, 0.9),
            hit("queryA", "bug1", "geneY", 1000, 0.1),
        ]);
        assert!((table.get("bug1", "geneX") - 0.9).abs() < EPS);
        assert!((table.get("bug1", "geneY") - 0.1).abs() < EPS);
        let total = table.get("bug1", "geneX") + table.get("bug1", "geneY");
        assert!((total - 1.0).abs() < EPS);
        assert!((table.get(COMMUNITY, "geneX") - 0.9).abs() < EPS);
    }

    #[test]
    fn test_single_hit_contributes_undiminished() {
        let table = finalize_hits(vec![hit("q1", "bug1", "geneX", 500, 0.3)]);
        // weight 1.0, length 0.5 kb
        assert!((table.get("bug1", "geneX") - 2.0).abs() < EPS);
    }

    #[test]
    fn test_zero_reference_length_treated_as_default() {
        let table = finalize_hits(vec![hit("q1", "bug1", "geneX", 0, 0.3)]);
        assert!((table.get("bug1", "geneX") - 1.0).abs() < EPS);
    }

    #[test]
    fn test_read_length_normalization() {
        let options = ScoringOptions {
            read_length_normalization: true,
            average_read_length: 100,
        };
        let mut store = AlignmentStore::new(Box::new(MemoryHitStore::new()));
        store.add_hit(hit("q1", "bug1", "geneX", 600, 0.5)).unwrap();
        let table = store.finalize(&options).unwrap();
        // (|600 - 100| + 1) / 1000 = 0.501 kb
        assert!((table.get("bug1", "geneX") - 1.0 / 0.501).abs() < EPS);
    }

    #[test]
    fn test_order_independence() {
        let hits = vec![
            hit("q1", "bug1", "geneX", 1000, 0.9),
            hit("q1", "bug1", "geneY", 1000, 0.1),
            hit("q2", "bug2", "geneX", 500, 0.4),
        ];
        let mut reversed = hits.clone();
        reversed.reverse();

        let a = finalize_hits(hits);
        let b = finalize_hits(reversed);
        for taxon in ["bug1", "bug2", COMMUNITY] {
            for gene in ["geneX", "geneY"] {
                assert!((a.get(taxon, gene) - b.get(taxon, gene)).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_ingest_skips_malformed_records() {
        let input = "q1\tgeneX|1000|bug1\t0.1\n\
                     # comment\n\
                     tooshort\n\
                     q2\tgeneY|1000|bug1\tbad-evalue\n\
                     q3\tgeneY|1000|bug1\t0.2\n";
        let mut store = AlignmentStore::new(Box::new(MemoryHitStore::new()));
        let summary = store.ingest_reader(input.as_bytes(), None, None).unwrap();
        assert_eq!(summary.lines, 5);
        assert_eq!(summary.hits, 2);
        assert_eq!(summary.skipped, 3);
        assert_eq!(store.aligned_query_count(), 2);
    }
}
