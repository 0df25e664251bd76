use std::collections::HashMap;
use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::helper::alignments::{AlignmentStore, ScoringOptions, load_id_mapping};
use crate::helper::gene_table::{COMMUNITY, GeneScoreTable};
use crate::helper::hit_store::{DiskHitStore, HitStore, MemoryHitStore};
use crate::helper::params::{HitStorageMode, QuantParams};
use crate::helper::pathway_helper::{
    AssignmentFallback, PathwayCatalog, assign_pathways, evaluate_abundance, evaluate_coverage,
    median_score, union_reaction_scores,
};
use crate::helper::pruner::{PathwayPruner, SubprocessPruner};
use crate::helper::reaction_catalog::{ReactionCatalog, score_reactions};
use crate::helper::report::{PathwayScores, QuantReport, QuantWarning};
use crate::helper::significance::{SignificanceFilter, SubprocessFilter, apply_nominations};
use crate::helper::unmapped::annotate_unmapped;

pub fn log_line(writer: &mut BufWriter<File>, message: &str) -> std::io::Result<()> {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(writer, "[{}] {}", now, message)?;
    writer.flush()?;
    Ok(())
}

/// Runs the full quantification pipeline: alignment hits (or a pre-computed
/// gene table when `precomputed_genes` is set) through gene, reaction and
/// pathway scoring into the abundance/coverage tables and run report under
/// `output`.
pub fn quantify(
    input: &str,
    param: &str,
    output: &str,
    precomputed_genes: bool,
) -> Result<(), Box<dyn Error>> {
    let input_path = Path::new(input);
    if !input_path.is_file() {
        return Err(format!("Input file {} does not exist", input).into());
    }
    let output_dir = Path::new(output);
    fs::create_dir_all(output_dir)?;

    let logfile = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_dir.join("run_log.txt"))?;
    let mut logger = BufWriter::new(logfile);

    log_line(&mut logger, "Starting quantification pipeline")?;
    log_line(&mut logger, &format!("Input file: {}", input))?;
    log_line(&mut logger, &format!("Param file input: {}", param))?;
    log_line(&mut logger, &format!("Output directory: {}", output))?;
    log_line(
        &mut logger,
        &format!("Pre-computed gene table: {}", precomputed_genes),
    )?;

    if let Err(e) = run_quantify_pipeline(input_path, param, output_dir, precomputed_genes, &mut logger)
    {
        log_line(&mut logger, &format!("Error running pipeline: {}", e))?;
        return Err(e);
    }

    log_line(&mut logger, "Quantification pipeline completed")?;
    Ok(())
}

struct TaxonEvaluation {
    taxon: String,
    abundance: HashMap<String, f64>,
    coverage: HashMap<String, f64>,
    pruned: bool,
    fallback: Option<AssignmentFallback>,
}

fn run_quantify_pipeline(
    input: &Path,
    param: &str,
    output_dir: &Path,
    precomputed_genes: bool,
    logger: &mut BufWriter<File>,
) -> Result<(), Box<dyn Error>> {
    log_line(logger, "Reading param file")?;
    let params = QuantParams::from_json_str(&fs::read_to_string(param)?)?;
    log_line(logger, "Validating params")?;
    params.validate()?;

    let mut report = QuantReport::new();
    report.set_input_file(input.display().to_string());
    report.set_total_reads(params.total_reads);

    // catalog load failures are fatal; nothing downstream can run without them
    log_line(logger, "Loading reaction catalog")?;
    let reaction_catalog = ReactionCatalog::from_path(&params.reactions_database)?;
    log_line(
        logger,
        &format!("Loaded {} reactions", reaction_catalog.reaction_count()),
    )?;

    log_line(logger, "Loading pathway catalog")?;
    let pathway_catalog = PathwayCatalog::from_path(
        &params.pathways_database,
        params.pathways_structured,
        params.recurse_flat_pathways,
    )?;
    log_line(
        logger,
        &format!("Loaded {} pathways", pathway_catalog.pathway_count()),
    )?;
    if pathway_catalog.skipped_records() > 0 {
        report.add_warning(QuantWarning::SkippedPathwayRecords(
            pathway_catalog.skipped_records(),
        ));
        log_line(
            logger,
            &format!(
                "Skipped {} malformed pathway records",
                pathway_catalog.skipped_records()
            ),
        )?;
    }

    let gene_table = if precomputed_genes {
        log_line(logger, "Loading pre-computed gene table")?;
        GeneScoreTable::from_gene_table_reader(open_input_reader(input)?)?
    } else {
        log_line(logger, "Ingesting alignment hits")?;
        let mapping = match &params.id_mapping {
            Some(path) => Some(load_id_mapping(BufReader::new(File::open(path)?))?),
            None => None,
        };
        let storage: Box<dyn HitStore> = match params.hit_storage {
            HitStorageMode::Memory => Box::new(MemoryHitStore::new()),
            HitStorageMode::Disk => Box::new(DiskHitStore::create(&params.temp_dir)?),
        };
        let mut store = AlignmentStore::new(storage);

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} Ingesting alignments: {pos} records")
                .unwrap(),
        );
        let summary = store.ingest_reader(open_input_reader(input)?, mapping.as_ref(), Some(&spinner))?;
        spinner.finish_and_clear();

        log_line(
            logger,
            &format!(
                "Ingested {} hits from {} records ({} skipped)",
                summary.hits, summary.lines, summary.skipped
            ),
        )?;
        report.set_alignment_hits(summary.hits);
        report.set_aligned_reads(store.aligned_query_count());
        if summary.skipped > 0 {
            report.add_warning(QuantWarning::SkippedAlignmentRecords(summary.skipped));
        }

        let options = ScoringOptions {
            read_length_normalization: params.read_length_normalization,
            average_read_length: params.average_read_length,
        };
        log_line(logger, "Finalizing gene scores")?;
        store.finalize(&options)?
    };

    let unaligned_reads = params.total_reads.saturating_sub(*report.aligned_reads());

    log_line(logger, "Scoring reactions")?;
    let reaction_scores = score_reactions(&gene_table, &reaction_catalog);
    log_line(
        logger,
        &format!("Scored reactions for {} taxa", reaction_scores.len()),
    )?;

    let subprocess_pruner = params
        .pruner_command
        .as_ref()
        .map(|cmd| SubprocessPruner::new(cmd, PathBuf::from(&params.temp_dir)));
    let pruner: Option<&dyn PathwayPruner> =
        subprocess_pruner.as_ref().map(|p| p as &dyn PathwayPruner);

    // each taxon is independent work: catalogs are shared read-only, and a
    // pruner failure for one taxon must not affect the others
    log_line(
        logger,
        &format!("Evaluating pathways on {} threads", params.threads),
    )?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.threads as usize)
        .build()?;
    let evaluations: Vec<TaxonEvaluation> = pool.install(|| {
        reaction_scores
            .par_iter()
            .map(|(taxon, scores_row)| {
                let outcome = assign_pathways(taxon, scores_row, &pathway_catalog, pruner);
                let union = union_reaction_scores(&outcome.pathways);
                let median = median_score(&union);

                let mut abundance = HashMap::new();
                let mut coverage = HashMap::new();
                for (pathway, reactions) in &outcome.pathways {
                    let Some(definition) = pathway_catalog.get(pathway) else {
                        continue;
                    };
                    abundance.insert(pathway.clone(), evaluate_abundance(definition, reactions));
                    coverage.insert(
                        pathway.clone(),
                        evaluate_coverage(definition, reactions, median),
                    );
                }
                TaxonEvaluation {
                    taxon: taxon.clone(),
                    abundance,
                    coverage,
                    pruned: outcome.pruned,
                    fallback: outcome.fallback,
                }
            })
            .collect()
    });

    let mut abundance_rows: HashMap<String, HashMap<String, f64>> = HashMap::new();
    let mut coverage_rows: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for evaluation in evaluations {
        if evaluation.pruned {
            log_line(
                logger,
                &format!("Pruner refined membership for taxon {}", evaluation.taxon),
            )?;
        }
        match &evaluation.fallback {
            Some(AssignmentFallback::NoOutput) => {
                log_line(
                    logger,
                    &format!(
                        "Warning: pruner produced no output for taxon {}; using static membership",
                        evaluation.taxon
                    ),
                )?;
                report.add_warning(QuantWarning::PrunerUnavailable(evaluation.taxon.clone()));
            }
            Some(AssignmentFallback::Failed(reason)) => {
                log_line(
                    logger,
                    &format!(
                        "Warning: pruner failed for taxon {}: {}; using static membership",
                        evaluation.taxon, reason
                    ),
                )?;
                report.add_warning(QuantWarning::PrunerFailed(
                    evaluation.taxon.clone(),
                    reason.clone(),
                ));
            }
            None => {}
        }
        abundance_rows.insert(evaluation.taxon.clone(), evaluation.abundance);
        coverage_rows.insert(evaluation.taxon, evaluation.coverage);
    }

    if let Some(command) = &params.significance_command {
        if let (Some(community_abundance), Some(community_coverage)) = (
            abundance_rows.get_mut(COMMUNITY),
            coverage_rows.get_mut(COMMUNITY),
        ) {
            log_line(logger, "Running significance filter")?;
            let coverages: Vec<(String, f64)> = community_coverage
                .iter()
                .map(|(pathway, value)| (pathway.clone(), *value))
                .collect();
            let filter = SubprocessFilter::new(command);
            match filter.run(&coverages) {
                Ok(nominations) => {
                    let removed = apply_nominations(
                        &nominations,
                        params.significance_probability,
                        params.significance_bin,
                        community_abundance,
                        community_coverage,
                    );
                    log_line(
                        logger,
                        &format!(
                            "Significance filter removed {} of {} nominated pathways",
                            removed.len(),
                            nominations.len()
                        ),
                    )?;
                }
                Err(e) => {
                    log_line(
                        logger,
                        &format!("Warning: significance filter unavailable: {}", e),
                    )?;
                    report.add_warning(QuantWarning::SignificanceFilterUnavailable(e.to_string()));
                }
            }
        }
    }

    let mut abundance = PathwayScores::new();
    let mut coverage = PathwayScores::new();
    for (taxon, row) in abundance_rows {
        abundance.insert_row(&taxon, row);
    }
    for (taxon, row) in coverage_rows {
        coverage.insert_row(&taxon, row);
    }

    log_line(logger, "Reconciling unmapped and unintegrated abundance")?;
    annotate_unmapped(
        &mut abundance,
        &gene_table,
        &pathway_catalog,
        &reaction_catalog,
        unaligned_reads,
    );

    report.set_taxa_profiled(
        abundance
            .taxa()
            .filter(|taxon| taxon.as_str() != COMMUNITY)
            .count(),
    );
    report.set_pathways_reported(abundance.row(COMMUNITY).map_or(0, |row| row.len()));

    let abundance_path = output_dir.join("pathway_abundance.tsv");
    let coverage_path = output_dir.join("pathway_coverage.tsv");
    log_line(
        logger,
        &format!("Writing {}", abundance_path.display()),
    )?;
    abundance.write_tsv(&abundance_path, "Abundance")?;
    log_line(logger, &format!("Writing {}", coverage_path.display()))?;
    coverage.write_tsv(&coverage_path, "Coverage")?;

    report.finish();
    report.write_json(output_dir.join("run_report.json"))?;
    Ok(())
}

/// Opens the input for reading, transparently decompressing `.gz` files.
fn open_input_reader(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let is_gz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(
            file,
        )))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
