use std::collections::HashMap;

use crate::helper::pathway_helper::catalog::PathwayCatalog;
use crate::helper::pruner::PathwayPruner;

/// Per-taxon intermediate: pathway -> (reaction -> score), holding only
/// reactions the taxon actually has non-zero scores for.
pub type PathwaysAndReactions = HashMap<String, HashMap<String, f64>>;

/// The pruner is only worth consulting when a taxon has more than this many
/// scored reactions; below it, static membership is used directly.
pub const MIN_REACTIONS_FOR_PRUNING: usize = 3;

/// Why static membership was used even though a pruner was consulted.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentFallback {
    /// The pruner ran but produced no output for this taxon.
    NoOutput,
    /// The pruner invocation failed outright.
    Failed(String),
}

/// Result of assigning one taxon's reactions to pathways.
#[derive(Debug, Default)]
pub struct AssignmentOutcome {
    pub pathways: PathwaysAndReactions,
    /// True when the pruner's refined membership was used.
    pub pruned: bool,
    /// Set when the pruner was consulted but could not refine; static
    /// membership was used instead.
    pub fallback: Option<AssignmentFallback>,
}

/// Decides which pathways are present enough to evaluate for one taxon.
///
/// With a configured pruner and enough scored reactions, the pruner's
/// refined reaction -> pathway membership is used; a reaction it dropped
/// contributes to nothing. Otherwise every pathway containing a present
/// reaction is assigned. Pruner failure is local to the taxon: logged by
/// the caller via `fallback`, never fatal.
pub fn assign_pathways(
    taxon: &str,
    reaction_scores: &HashMap<String, f64>,
    catalog: &PathwayCatalog,
    pruner: Option<&dyn PathwayPruner>,
) -> AssignmentOutcome {
    let present: Vec<(&String, f64)> = reaction_scores
        .iter()
        .filter(|(_, score)| **score > 0.0)
        .map(|(reaction, score)| (reaction, *score))
        .collect();

    let mut outcome = AssignmentOutcome::default();

    let refined = match pruner {
        Some(pruner) if present.len() > MIN_REACTIONS_FOR_PRUNING => {
            match pruner.run(taxon, reaction_scores, catalog) {
                Ok(Some(report)) => {
                    outcome.pruned = true;
                    Some(report)
                }
                Ok(None) => {
                    outcome.fallback = Some(AssignmentFallback::NoOutput);
                    None
                }
                Err(e) => {
                    outcome.fallback = Some(AssignmentFallback::Failed(e.to_string()));
                    None
                }
            }
        }
        _ => None,
    };

    for (reaction, score) in present {
        let pathways: &[String] = match &refined {
            Some(report) => report
                .get(reaction)
                .map(|p| p.as_slice())
                .unwrap_or_default(),
            None => catalog
                .pathways_for_reaction(reaction)
                .unwrap_or_default(),
        };
        for pathway in pathways {
            outcome
                .pathways
                .entry(pathway.clone())
                .or_default()
                .insert(reaction.clone(), score);
        }
    }
    outcome
}

/// Union of a taxon's assigned reaction scores across all its pathways,
/// deduplicated by reaction. Feeds the per-taxon median for coverage.
pub fn union_reaction_scores(pathways: &PathwaysAndReactions) -> HashMap<String, f64> {
    let mut union = HashMap::new();
    for reactions in pathways.values() {
        for (reaction, score) in reactions {
            union.insert(reaction.clone(), *score);
        }
    }
    union
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::pathway_helper::catalog::PathwayCatalog;
    use crate::helper::pruner::{PrunerReport, PrunerResult};

    const FLAT: &str = "PWY1\tA\tB\tC\n\
                        PWY2\tC\tD\n";

    struct FakePruner {
        report: Option<PrunerReport>,
        fail: bool,
    }

    impl PathwayPruner for FakePruner {
        fn run(
            &self,
            _taxon: &str,
            _reaction_scores: &HashMap<String, f64>,
            _catalog: &PathwayCatalog,
        ) -> PrunerResult {
            if self.fail {
                return Err("boom".into());
            }
            Ok(self.report.clone())
        }
    }

    fn catalog() -> PathwayCatalog {
        PathwayCatalog::from_flat_reader(FLAT.as_bytes(), false).unwrap()
    }

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(r, v)| (r.to_string(), *v)).collect()
    }

    #[test]
    fn test_static_membership_assignment() {
        let s = scores(&[("A", 1.0), ("C", 2.0), ("Z", 3.0), ("D", 0.0)]);
        let outcome = assign_pathways("bug1", &s, &catalog(), None);
        assert!(!outcome.pruned);
        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.pathways["PWY1"]["A"], 1.0);
        assert_eq!(outcome.pathways["PWY1"]["C"], 2.0);
        assert_eq!(outcome.pathways["PWY2"]["C"], 2.0);
        // zero-score and unknown reactions contribute nothing
        assert!(!outcome.pathways["PWY2"].contains_key("D"));
        assert_eq!(outcome.pathways.len(), 2);
    }

    #[test]
    fn test_pruner_refines_membership() {
        let mut report = PrunerReport::new();
        report.insert("A".to_string(), vec!["PWY1".to_string()]);
        report.insert("C".to_string(), vec!["PWY1".to_string()]);
        let pruner = FakePruner {
            report: Some(report),
            fail: false,
        };
        // 4 scored reactions: above the pruning threshold
        let s = scores(&[("A", 1.0), ("B", 1.0), ("C", 2.0), ("D", 3.0)]);
        let outcome = assign_pathways("bug1", &s, &catalog(), Some(&pruner));
        assert!(outcome.pruned);
        // the pruner kept C only in PWY1, and dropped B and D entirely
        assert!(!outcome.pathways.contains_key("PWY2"));
        assert_eq!(outcome.pathways["PWY1"].len(), 2);
    }

    #[test]
    fn test_too_few_reactions_skips_pruner() {
        let pruner = FakePruner {
            report: None,
            fail: true,
        };
        let s = scores(&[("A", 1.0), ("C", 2.0)]);
        let outcome = assign_pathways("bug1", &s, &catalog(), Some(&pruner));
        // the failing pruner was never consulted
        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.pathways.len(), 2);
    }

    #[test]
    fn test_pruner_failure_falls_back_to_static() {
        let pruner = FakePruner {
            report: None,
            fail: true,
        };
        let s = scores(&[("A", 1.0), ("B", 1.0), ("C", 2.0), ("D", 3.0)]);
        let outcome = assign_pathways("bug1", &s, &catalog(), Some(&pruner));
        assert!(!outcome.pruned);
        assert!(outcome.fallback.is_some());
        assert!(outcome.pathways.contains_key("PWY1"));
        assert!(outcome.pathways.contains_key("PWY2"));
    }

    #[test]
    fn test_empty_pruner_output_falls_back_to_static() {
        let pruner = FakePruner {
            report: None,
            fail: false,
        };
        let s = scores(&[("A", 1.0), ("B", 1.0), ("C", 2.0), ("D", 3.0)]);
        let outcome = assign_pathways("bug1", &s, &catalog(), Some(&pruner));
        assert!(!outcome.pruned);
        assert!(outcome.fallback.is_some());
        assert_eq!(outcome.pathways.len(), 2);
    }

    #[test]
    fn test_union_reaction_scores() {
        let s = scores(&[("A", 1.0), ("C", 2.0)]);
        let outcome = assign_pathways("bug1", &s, &catalog(), None);
        let union = union_reaction_scores(&outcome.pathways);
        assert_eq!(union.len(), 2);
        assert_eq!(union["C"], 2.0);
    }
}
