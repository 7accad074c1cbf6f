//! Entry classification: decides how a PDB's residue differences relate to
//! the UniProt reference before chain vectors are repaired.

use crate::cif::DifRow;

const ENGINEERED_MUTATION: &str = "engineered mutation";
const MICROHETEROGENEITY: &str = "microheterogeneity";

/// Classification outcome for one PDB entry against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No usable differences: identical to the reference, or differences
    /// reduce to microheterogeneity alone.
    Normal,
    /// A small number of single-residue substitutions, no indels.
    Substitution,
    /// Duplicated `(strand_id, accession)` rows, or duplicated strand-ids
    /// across the full unfiltered table.
    Chimera,
    /// A matching chain has a duplicated `seq_num` or `db_seq_num` among its
    /// own descriptors.
    Delins,
    /// No chain of this PDB references any of the accessions.
    Mismatch,
}

pub struct MutationClassifier;

impl MutationClassifier {
    /// Classifies a PDB entry from its matching chains' `struct_ref_seq_dif`
    /// rows, grouped one `Vec` per chain (chimera/mismatch are decided by the
    /// caller before this is reached). Decision order follows
    /// `mutationjudge`: empty descriptors, then `engineered mutation`, then
    /// microheterogeneity-only, then a per-chain seq_num/db_seq_num
    /// duplicate check.
    pub fn classify(dif_rows_by_chain: &[Vec<&DifRow>], engineered_mutation: bool) -> Classification {
        let all_rows: Vec<&&DifRow> = dif_rows_by_chain.iter().flatten().collect();
        if all_rows.is_empty() {
            return Classification::Normal;
        }

        if engineered_mutation || all_rows.iter().any(|d| d.details == ENGINEERED_MUTATION) {
            return Classification::Substitution;
        }

        if all_rows.iter().all(|d| d.details.contains(MICROHETEROGENEITY)) {
            return Classification::Normal;
        }

        let any_chain_has_duplicates = dif_rows_by_chain.iter().any(|chain_rows| Self::has_duplicate_numbering(chain_rows));
        if any_chain_has_duplicates {
            return Classification::Delins;
        }

        Classification::Substitution
    }

    /// True if `chain_rows` (one chain's descriptors) repeats a `seq_num` or
    /// `db_seq_num` value.
    fn has_duplicate_numbering(chain_rows: &[&DifRow]) -> bool {
        let seq_nums: Vec<&String> = chain_rows.iter().map(|d| &d.seq_num).collect();
        let db_seq_nums: Vec<&String> = chain_rows.iter().map(|d| &d.db_seq_num).collect();
        has_duplicates(&seq_nums) || has_duplicates(&db_seq_nums)
    }
}

fn has_duplicates<T: PartialEq>(values: &[T]) -> bool {
    for i in 0..values.len() {
        for j in (i + 1)..values.len() {
            if values[i] == values[j] {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dif(strand_id: &str, seq_num: &str, db_seq_num: &str, details: &str) -> DifRow {
        DifRow {
            strand_id: strand_id.to_string(),
            seq_num: seq_num.to_string(),
            db_seq_num: db_seq_num.to_string(),
            details: details.to_string(),
        }
    }

    fn by_chain<'a>(rows: &'a [DifRow]) -> Vec<Vec<&'a DifRow>> {
        let mut groups: std::collections::BTreeMap<&str, Vec<&DifRow>> = std::collections::BTreeMap::new();
        for row in rows {
            groups.entry(row.strand_id.as_str()).or_default().push(row);
        }
        groups.into_values().collect()
    }

    #[test]
    fn empty_dif_is_normal() {
        assert_eq!(MutationClassifier::classify(&[], false), Classification::Normal);
    }

    #[test]
    fn pure_substitution() {
        let rows = vec![dif("A", "12", "12", "conflict")];
        assert_eq!(MutationClassifier::classify(&by_chain(&rows), false), Classification::Substitution);
    }

    #[test]
    fn microheterogeneity_only_is_normal() {
        let rows = vec![dif("A", "12", "12", "microheterogeneity"), dif("A", "13", "13", "microheterogeneity")];
        assert_eq!(MutationClassifier::classify(&by_chain(&rows), false), Classification::Normal);
    }

    #[test]
    fn routine_deletion_and_insertion_in_one_chain_is_substitution() {
        // Ordinary ChainBuilder-repairable del+ins pair: distinct seq_num/
        // db_seq_num values within the single chain, no duplicates.
        let rows = vec![dif("A", "?", "30", "insertion"), dif("A", "15", "?", "deletion")];
        assert_eq!(MutationClassifier::classify(&by_chain(&rows), false), Classification::Substitution);
    }

    #[test]
    fn shared_seq_num_across_distinct_chains_is_not_delins() {
        // Homodimer: chains A and B each carry one descriptor with the same
        // seq_num, but neither chain has an internal duplicate.
        let rows = vec![dif("A", "12", "12", "conflict"), dif("B", "12", "12", "conflict")];
        assert_eq!(MutationClassifier::classify(&by_chain(&rows), false), Classification::Substitution);
    }

    #[test]
    fn duplicated_seq_num_within_one_chain_is_delins() {
        let rows = vec![dif("A", "15", "15", "conflict"), dif("A", "15", "16", "conflict")];
        assert_eq!(MutationClassifier::classify(&by_chain(&rows), false), Classification::Delins);
    }
}
