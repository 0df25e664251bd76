use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::helper::pathway_helper::structure::PathwayStructure;

#[derive(Debug, Error)]
pub enum PathwayCatalogError {
    #[error("cannot read pathway catalog {path}: {source}")]
    Unreadable { path: String, source: io::Error },
    #[error("pathway catalog {path} contains no pathways")]
    Empty { path: String },
}

/// How a pathway is defined: a full AND/OR/optional tree, or a flat member
/// list with no ordering information (evaluated by the coarser fallback).
#[derive(Debug, Clone, PartialEq)]
pub enum PathwayDefinition {
    Structured(PathwayStructure),
    Flat(Vec<String>),
}

impl PathwayDefinition {
    /// Every member reaction id, optional leaves included.
    pub fn members(&self) -> Vec<String> {
        match self {
            PathwayDefinition::Structured(s) => s.root.reactions(),
            PathwayDefinition::Flat(members) => members.clone(),
        }
    }
}

/// Static map pathway id -> definition, with a reverse reaction -> pathways
/// index for membership lookups. Loaded once per run; immutable afterwards.
/// Each pathway owns its tree; no node is shared across pathways.
#[derive(Debug, Clone, Default)]
pub struct PathwayCatalog {
    pathways: HashMap<String, PathwayDefinition>,
    reactions_to_pathways: HashMap<String, Vec<String>>,
    skipped_records: usize,
}

impl PathwayCatalog {
    pub fn get(&self, pathway: &str) -> Option<&PathwayDefinition> {
        self.pathways.get(pathway)
    }

    pub fn pathways(&self) -> impl Iterator<Item = (&String, &PathwayDefinition)> {
        self.pathways.iter()
    }

    pub fn pathways_for_reaction(&self, reaction: &str) -> Option<&[String]> {
        self.reactions_to_pathways.get(reaction).map(|v| v.as_slice())
    }

    pub fn pathway_count(&self) -> usize {
        self.pathways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }

    /// Structure records that failed to parse and were skipped during load.
    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }

    /// Structured form: one line per pathway, `pathway \t <structure text>`.
    /// Records whose structure fails to parse are counted and skipped,
    /// not fatal.
    pub fn from_structured_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut catalog = PathwayCatalog::default();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((pathway, text)) = line.split_once('\t') else {
                catalog.skipped_records += 1;
                continue;
            };
            match PathwayStructure::from_str(text) {
                Ok(structure) => {
                    catalog.insert(pathway.trim(), PathwayDefinition::Structured(structure));
                }
                Err(_) => catalog.skipped_records += 1,
            }
        }
        catalog.build_reverse_index();
        Ok(catalog)
    }

    /// Flat form: one line per pathway, `pathway \t reaction \t reaction ...`.
    /// With `recurse`, members that are themselves pathway ids are expanded
    /// into their own members (cycles are cut, not followed).
    pub fn from_flat_reader<R: BufRead>(reader: R, recurse: bool) -> io::Result<Self> {
        let mut raw: HashMap<String, Vec<String>> = HashMap::new();
        let mut catalog = PathwayCatalog::default();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let Some(pathway) = fields.next() else {
                continue;
            };
            let pathway = pathway.trim();
            let members: Vec<String> = fields
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            if pathway.is_empty() || members.is_empty() {
                catalog.skipped_records += 1;
                continue;
            }
            raw.entry(pathway.to_string()).or_default().extend(members);
        }

        for pathway in raw.keys() {
            let members = if recurse {
                let mut visited = HashSet::new();
                visited.insert(pathway.clone());
                let mut resolved = Vec::new();
                resolve_members(pathway, &raw, &mut visited, &mut resolved);
                resolved
            } else {
                dedup_members(&raw[pathway])
            };
            catalog
                .pathways
                .insert(pathway.clone(), PathwayDefinition::Flat(members));
        }
        catalog.build_reverse_index();
        Ok(catalog)
    }

    /// Loads the catalog from disk. A missing or unreadable file is fatal:
    /// the run cannot proceed without its static catalogs.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        structured: bool,
        recurse: bool,
    ) -> Result<Self, PathwayCatalogError> {
        let path_str = path.as_ref().display().to_string();
        let file = File::open(&path).map_err(|source| PathwayCatalogError::Unreadable {
            path: path_str.clone(),
            source,
        })?;
        let reader = BufReader::new(file);
        let catalog = if structured {
            PathwayCatalog::from_structured_reader(reader)
        } else {
            PathwayCatalog::from_flat_reader(reader, recurse)
        }
        .map_err(|source| PathwayCatalogError::Unreadable {
            path: path_str.clone(),
            source,
        })?;
        if catalog.is_empty() {
            return Err(PathwayCatalogError::Empty { path: path_str });
        }
        Ok(catalog)
    }

    fn insert(&mut self, pathway: &str, definition: PathwayDefinition) {
        self.pathways.insert(pathway.to_string(), definition);
    }

    fn build_reverse_index(&mut self) {
        self.reactions_to_pathways.clear();
        for (pathway, definition) in &self.pathways {
            for reaction in definition.members() {
                let entry = self.reactions_to_pathways.entry(reaction).or_default();
                if !entry.iter().any(|p| p == pathway) {
                    entry.push(pathway.clone());
                }
            }
        }
    }
}

fn dedup_members(members: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(members.len());
    for member in members {
        if !out.iter().any(|m| m == member) {
            out.push(member.clone());
        }
    }
    out
}

fn resolve_members(
    pathway: &str,
    raw: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    let Some(members) = raw.get(pathway) else {
        return;
    };
    for member in members {
        if raw.contains_key(member) {
            if visited.insert(member.clone()) {
                resolve_members(member, raw, visited, out);
            }
        } else if !out.iter().any(|m| m == member) {
            out.push(member.clone());
        }
    }
}
