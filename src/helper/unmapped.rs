use std::collections::HashSet;

use crate::helper::gene_table::{COMMUNITY, GeneScoreTable};
use crate::helper::pathway_helper::catalog::PathwayCatalog;
use crate::helper::reaction_catalog::ReactionCatalog;
use crate::helper::report::PathwayScores;

/// Synthetic row: reads that never aligned at all, in pathway-equivalent
/// abundance units.
pub const UNMAPPED: &str = "UNMAPPED";

/// Synthetic row: gene abundance that aligned but was not absorbed into any
/// present pathway.
pub const UNINTEGRATED: &str = "UNINTEGRATED";

/// Per-scope ratio converting gene-abundance units into pathway-equivalent
/// units; 0 when nothing was absorbed.
pub fn compression_constant(pathway_total: f64, absorbed_abundance: f64) -> f64 {
    if absorbed_abundance > 0.0 {
        pathway_total / absorbed_abundance
    } else {
        0.0
    }
}

/// Reconciles total gene abundance against what the present pathways
/// absorbed, appending the UNMAPPED/UNINTEGRATED rows to the abundance
/// table. Both rows use the same per-scope compression constant so every
/// row shares comparable units.
///
/// UNINTEGRATED is written per scope; UNMAPPED only community-wide, since
/// a read that never aligned carries no taxon.
pub fn annotate_unmapped(
    abundance: &mut PathwayScores,
    gene_table: &GeneScoreTable,
    pathway_catalog: &PathwayCatalog,
    reaction_catalog: &ReactionCatalog,
    unaligned_reads: u64,
) {
    let taxa: Vec<String> = abundance.taxa().cloned().collect();
    for taxon in taxa {
        let Some(row) = abundance.row(&taxon) else {
            continue;
        };

        let mut absorbed_genes: HashSet<&String> = HashSet::new();
        for pathway in row.keys() {
            let Some(definition) = pathway_catalog.get(pathway) else {
                continue;
            };
            for reaction in definition.members() {
                if let Some(genes) = reaction_catalog.find_genes(&reaction) {
                    absorbed_genes.extend(genes);
                }
            }
        }

        let absorbed_abundance: f64 = absorbed_genes
            .iter()
            .map(|gene| gene_table.get(&taxon, gene.as_str()))
            .sum();
        let pathway_total: f64 = row.values().sum();
        let compression = compression_constant(pathway_total, absorbed_abundance);

        let unintegrated =
            compression * (gene_table.total_abundance(&taxon) - absorbed_abundance).max(0.0);
        abundance.insert(&taxon, UNINTEGRATED, unintegrated);

        if taxon == COMMUNITY {
            abundance.insert(&taxon, UNMAPPED, compression * unaligned_reads as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn setup() -> (PathwayCatalog, ReactionCatalog, GeneScoreTable) {
        let pathway_catalog =
            PathwayCatalog::from_flat_reader("PWY1\tRXN1\tRXN2\n".as_bytes(), false).unwrap();
        let reaction_catalog =
            ReactionCatalog::from_reader("RXN1\tgeneA\nRXN2\tgeneB\n".as_bytes()).unwrap();
        let mut gene_table = GeneScoreTable::new();
        gene_table.add("bug1", "geneA", 2.0);
        gene_table.add("bug1", "geneB", 2.0);
        // geneC is aligned but belongs to no pathway reaction
        gene_table.add("bug1", "geneC", 4.0);
        (pathway_catalog, reaction_catalog, gene_table)
    }

    #[test]
    fn test_unintegrated_and_unmapped_rows() {
        let (pathway_catalog, reaction_catalog, gene_table) = setup();
        let mut abundance = PathwayScores::new();
        abundance.insert(COMMUNITY, "PWY1", 2.0);
        abundance.insert("bug1", "PWY1", 2.0);

        annotate_unmapped(
            &mut abundance,
            &gene_table,
            &pathway_catalog,
            &reaction_catalog,
            10,
        );

        // absorbed = geneA + geneB = 4, pathway total = 2, compression = 0.5
        // unintegrated = 0.5 * (8 - 4) = 2
        assert!((abundance.get(COMMUNITY, UNINTEGRATED) - 2.0).abs() < EPS);
        assert!((abundance.get("bug1", UNINTEGRATED) - 2.0).abs() < EPS);
        // unmapped = 0.5 * 10 = 5, community-wide only
        assert!((abundance.get(COMMUNITY, UNMAPPED) - 5.0).abs() < EPS);
        assert_eq!(abundance.get("bug1", UNMAPPED), 0.0);
    }

    #[test]
    fn test_zero_absorbed_abundance_zeroes_compression() {
        let (pathway_catalog, reaction_catalog, _) = setup();
        let gene_table = GeneScoreTable::new();
        let mut abundance = PathwayScores::new();
        abundance.insert(COMMUNITY, "PWY1", 2.0);

        annotate_unmapped(
            &mut abundance,
            &gene_table,
            &pathway_catalog,
            &reaction_catalog,
            10,
        );

        // compression 0: synthetic rows evaluate to 0 and are never stored
        assert_eq!(abundance.get(COMMUNITY, UNINTEGRATED), 0.0);
        assert_eq!(abundance.get(COMMUNITY, UNMAPPED), 0.0);
        assert!(!abundance.row(COMMUNITY).unwrap().contains_key(UNMAPPED));
    }
}
