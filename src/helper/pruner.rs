use std::collections::HashMap;
use std::error::Error;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::helper::pathway_helper::catalog::PathwayCatalog;

/// Report lines starting the next pathway block, e.g. `* PWY-5100`.
static PATHWAY_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\s*(\S+)").unwrap());

/// Refined membership from the pruner: reaction -> pathways it was kept in.
pub type PrunerReport = HashMap<String, Vec<String>>;

pub type PrunerResult = Result<Option<PrunerReport>, Box<dyn Error + Send + Sync>>;

/// The external pathway-selection optimizer. Injected so assignment logic
/// can be tested against a fake without spawning a process. `Ok(None)`
/// means the collaborator produced nothing for this taxon; the caller
/// falls back to static catalog membership.
pub trait PathwayPruner: Sync {
    fn run(
        &self,
        taxon: &str,
        reaction_scores: &HashMap<String, f64>,
        catalog: &PathwayCatalog,
    ) -> PrunerResult;
}

/// Parses a pruner report: a pathway-marker line establishes the current
/// pathway, every following non-empty line names a reaction belonging to
/// it. Reaction lines before any marker are ignored.
pub fn parse_pruner_report<R: BufRead>(reader: R) -> std::io::Result<PrunerReport> {
    let mut report = PrunerReport::new();
    let mut current: Option<String> = None;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = PATHWAY_MARKER.captures(line) {
            current = Some(caps[1].to_string());
            continue;
        }
        if let Some(pathway) = &current {
            let reaction = line.split_whitespace().next().unwrap_or(line);
            let pathways = report.entry(reaction.to_string()).or_default();
            if !pathways.iter().any(|p| p == pathway) {
                pathways.push(pathway.clone());
            }
        }
    }
    Ok(report)
}

/// Runs the pruner as a subprocess:
/// `<command> <reactions_file> <membership_file> <report_file>`.
///
/// The reactions file carries the taxon's non-zero reaction scores, the
/// membership file the flattened pathway database. Input and report files
/// are named per taxon so concurrent per-taxon invocations cannot collide.
pub struct SubprocessPruner {
    command: String,
    work_dir: PathBuf,
}

impl SubprocessPruner {
    pub fn new(command: &str, work_dir: PathBuf) -> Self {
        SubprocessPruner {
            command: command.to_string(),
            work_dir,
        }
    }

    fn write_inputs(
        &self,
        tag: &str,
        reaction_scores: &HashMap<String, f64>,
        catalog: &PathwayCatalog,
    ) -> std::io::Result<(PathBuf, PathBuf)> {
        let reactions_path = self.work_dir.join(format!("pruner_{}_reactions.tsv", tag));
        let mut writer = BufWriter::new(File::create(&reactions_path)?);
        let mut reactions: Vec<(&String, &f64)> = reaction_scores.iter().collect();
        reactions.sort_by(|a, b| a.0.cmp(b.0));
        for (reaction, score) in reactions {
            writeln!(writer, "{}\t{}", reaction, score)?;
        }
        writer.flush()?;

        let membership_path = self.work_dir.join(format!("pruner_{}_pathways.tsv", tag));
        let mut writer = BufWriter::new(File::create(&membership_path)?);
        let mut pathways: Vec<_> = catalog.pathways().collect();
        pathways.sort_by(|a, b| a.0.cmp(b.0));
        for (pathway, definition) in pathways {
            write!(writer, "{}", pathway)?;
            for member in definition.members() {
                write!(writer, "\t{}", member)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;

        Ok((reactions_path, membership_path))
    }
}

impl PathwayPruner for SubprocessPruner {
    fn run(
        &self,
        taxon: &str,
        reaction_scores: &HashMap<String, f64>,
        catalog: &PathwayCatalog,
    ) -> PrunerResult {
        let tag: String = taxon
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let (reactions_path, membership_path) =
            self.write_inputs(&tag, reaction_scores, catalog)?;
        let report_path = self.work_dir.join(format!("pruner_{}_report.txt", tag));

        let status = Command::new(&self.command)
            .arg(&reactions_path)
            .arg(&membership_path)
            .arg(&report_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        let _ = fs::remove_file(&reactions_path);
        let _ = fs::remove_file(&membership_path);

        if !status.success() {
            let _ = fs::remove_file(&report_path);
            return Err(format!("pruner command failed with status: {}", status).into());
        }

        let report = match File::open(&report_path) {
            Ok(file) => parse_pruner_report(BufReader::new(file))?,
            // absent report: not fatal, the caller falls back
            Err(_) => return Ok(None),
        };
        let _ = fs::remove_file(&report_path);

        if report.is_empty() {
            Ok(None)
        } else {
            Ok(Some(report))
        }
    }
}
