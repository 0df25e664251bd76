use std::cmp::Ordering;
use std::collections::HashMap;

use itertools::Itertools;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::statistics::{Data, OrderStatistics};

use crate::helper::pathway_helper::catalog::PathwayDefinition;
use crate::helper::pathway_helper::structure::{JoinKind, PathwayNode};

/// Harmonic mean with the bottleneck convention: an empty set, or any
/// non-positive value, yields 0. A zero anywhere kills an AND branch.
fn harmonic_mean(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| *v <= 0.0) {
        return 0.0;
    }
    values.len() as f64 / values.iter().map(|v| 1.0 / v).sum::<f64>()
}

/// Chi-square CDF used as the coverage transform. A distribution that
/// cannot be constructed (degrees of freedom <= 0) yields 0, as does a
/// non-positive score.
pub fn chi2cdf(score: f64, freedom: f64) -> f64 {
    if score <= 0.0 {
        return 0.0;
    }
    match ChiSquared::new(freedom) {
        Ok(dist) => dist.cdf(score),
        Err(_) => 0.0,
    }
}

/// Median over a taxon's reaction scores, the scalar parameterizing the
/// coverage transform. Computed once per taxon; 0 when there are no scores.
pub fn median_score(reaction_scores: &HashMap<String, f64>) -> f64 {
    if reaction_scores.is_empty() {
        return 0.0;
    }
    let mut data = Data::new(reaction_scores.values().copied().collect::<Vec<f64>>());
    data.median()
}

/// Imputation over a pathway's key reactions, applied once before tree
/// evaluation:
/// - exactly one key reaction missing: give it the minimum present score
///   (the pathway is not penalized for one undetected step, nor credited
///   beyond its weakest observed one)
/// - none missing: replace the single lowest present score with the
///   second-lowest, so one anomalously low call cannot suppress the
///   harmonic mean on its own
/// - two or more missing: leave the zeros in place; they will kill their
///   AND branch
pub fn gap_fill<'a, I>(key_reactions: I, scores: &mut HashMap<String, f64>)
where
    I: IntoIterator<Item = &'a String>,
{
    let key: Vec<&String> = key_reactions.into_iter().collect();
    let mut present: Vec<(&String, f64)> = key
        .iter()
        .filter_map(|r| {
            let v = scores.get(*r).copied().unwrap_or(0.0);
            if v > 0.0 { Some((*r, v)) } else { None }
        })
        .collect();
    let missing = key.len() - present.len();

    if missing == 1 && !present.is_empty() {
        let min = present
            .iter()
            .map(|(_, v)| *v)
            .fold(f64::INFINITY, f64::min);
        for reaction in &key {
            if scores.get(*reaction).copied().unwrap_or(0.0) <= 0.0 {
                scores.insert((*reaction).clone(), min);
            }
        }
    } else if missing == 0 && present.len() >= 2 {
        present.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        let lowest = present[0].0.clone();
        let second_lowest = present[1].1;
        scores.insert(lowest, second_lowest);
    }
}

/// Recursive tree walk shared by abundance and coverage; `leaf_value` is
/// identity for abundance and the chi-square transform for coverage.
///
/// AND: harmonic mean over the required children; optional children fold in
/// through a second harmonic mean only when they beat the required-only
/// value, so an exceeding-expectation optional branch helps and a weak one
/// cannot drag the score down. OR: the best-performing branch wins.
pub fn evaluate_tree<F>(node: &PathwayNode, scores: &HashMap<String, f64>, leaf_value: &F) -> f64
where
    F: Fn(f64) -> f64,
{
    match node {
        PathwayNode::Leaf { reaction, .. } => {
            leaf_value(scores.get(reaction).copied().unwrap_or(0.0))
        }
        PathwayNode::Join {
            kind: JoinKind::Or,
            children,
        } => children
            .iter()
            .map(|c| evaluate_tree(c, scores, leaf_value))
            .fold(0.0, f64::max),
        PathwayNode::Join {
            kind: JoinKind::And,
            children,
        } => {
            let mut required = Vec::new();
            let mut optional = Vec::new();
            for child in children {
                let value = evaluate_tree(child, scores, leaf_value);
                if child.has_required_leaf() {
                    required.push(value);
                } else {
                    optional.push(value);
                }
            }
            let base = harmonic_mean(&required);
            let required_len = required.len();
            let mut folded = required;
            folded.extend(optional.into_iter().filter(|v| *v > base));
            if folded.len() == required_len {
                base
            } else {
                harmonic_mean(&folded)
            }
        }
    }
}

/// Pathway abundance: gap-fill over the key reactions, then the structured
/// tree walk, or the unstructured upper-half-mean fallback when no ordering
/// information exists.
pub fn evaluate_abundance(
    definition: &PathwayDefinition,
    reaction_scores: &HashMap<String, f64>,
) -> f64 {
    match definition {
        PathwayDefinition::Structured(structure) => {
            let mut scores = reaction_scores.clone();
            gap_fill(structure.key_reactions.iter(), &mut scores);
            evaluate_tree(&structure.root, &scores, &|v| v)
        }
        PathwayDefinition::Flat(members) => {
            let mut scores = reaction_scores.clone();
            gap_fill(members.iter(), &mut scores);
            let values: Vec<f64> = members
                .iter()
                .map(|m| scores.get(m).copied().unwrap_or(0.0))
                .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .collect();
            if values.is_empty() {
                return 0.0;
            }
            let upper = &values[values.len() / 2..];
            upper.iter().sum::<f64>() / upper.len() as f64
        }
    }
}

/// Pathway coverage in [0, 1]: the same walk with every leaf passed through
/// `chi2cdf(score, median)`, or, unstructured, the fraction of members whose
/// raw score exceeds the taxon median.
pub fn evaluate_coverage(
    definition: &PathwayDefinition,
    reaction_scores: &HashMap<String, f64>,
    median: f64,
) -> f64 {
    match definition {
        PathwayDefinition::Structured(structure) => {
            let mut scores = reaction_scores.clone();
            gap_fill(structure.key_reactions.iter(), &mut scores);
            evaluate_tree(&structure.root, &scores, &|v| chi2cdf(v, median))
        }
        PathwayDefinition::Flat(members) => {
            if members.is_empty() {
                return 0.0;
            }
            let above = members
                .iter()
                .filter(|m| reaction_scores.get(*m).copied().unwrap_or(0.0) > median)
                .count();
            above as f64 / members.len() as f64
        }
    }
}
