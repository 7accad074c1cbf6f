//! Reference-indexed chain vector construction: slice the flat per-residue
//! list for one chain, then repair it against its mutation descriptors.
//!
//! Stages run in a fixed order (deletion, insertion, delins/seq-num,
//! delins/db-seq-num) and each builds a new vector rather than mutating the
//! one under iteration.

use crate::cif::{CifRecord, DifRow, StructRefSeqRow};

pub struct ChainBuilder;

impl ChainBuilder {
    /// Builds the repaired chain vector for `row` within `record`.
    pub fn build(record: &CifRecord, row: &StructRefSeqRow) -> Vec<Option<String>> {
        let beg = row.sort_index + row.seq_align_beg as usize - 1;
        let end = row.sort_index + row.seq_align_end as usize;
        let slice: Vec<Option<String>> = record
            .chain
            .get(beg..end.min(record.chain.len()))
            .unwrap_or(&[])
            .iter()
            .map(|cell| cell.as_ref().map(|c| c.cell()))
            .collect();

        let mut descriptors: Vec<&DifRow> =
            record.struct_ref_seq_dif.iter().filter(|d| d.strand_id == row.strand_id).collect();

        let chain = Self::repair_deletions(slice, &mut descriptors);
        let chain = Self::repair_insertions(chain, &mut descriptors);
        let chain = Self::repair_delins_seq_num(chain, &mut descriptors);
        Self::repair_delins_db_seq_num(chain, &mut descriptors)
    }

    /// Stage 1: consume `seq_num == "?"` descriptors, then insert `stride`
    /// null placeholders wherever consecutive `pdb_seq_num` values jump by
    /// something other than 1.
    fn repair_deletions(slice: Vec<Option<String>>, descriptors: &mut Vec<&DifRow>) -> Vec<Option<String>> {
        descriptors.retain(|d| d.seq_num != "?");

        let mut out = Vec::with_capacity(slice.len());
        let mut prev_num: Option<i64> = None;
        for cell in slice {
            if let Some(num) = cell.as_deref().and_then(pdb_seq_num) {
                if let Some(prev) = prev_num {
                    let stride = num - prev;
                    if stride != 1 {
                        for _ in 0..stride {
                            out.push(None);
                        }
                    }
                }
                prev_num = Some(num);
            }
            out.push(cell);
        }
        out
    }

    /// Stage 2: remove the slice entry matching each `db_seq_num == "?"`
    /// descriptor's `seq_num`, consuming the descriptor.
    fn repair_insertions(chain: Vec<Option<String>>, descriptors: &mut Vec<&DifRow>) -> Vec<Option<String>> {
        let mut targets: Vec<String> = descriptors
            .iter()
            .filter(|d| d.db_seq_num == "?")
            .map(|d| d.seq_num.clone())
            .collect();
        descriptors.retain(|d| d.db_seq_num != "?");

        let mut out = Vec::with_capacity(chain.len());
        for cell in chain {
            if let Some(num) = cell.as_deref().and_then(pdb_seq_num_str) {
                if let Some(pos) = targets.iter().position(|t| t == &num) {
                    targets.remove(pos);
                    continue;
                }
            }
            out.push(cell);
        }
        out
    }

    /// Stage 3: duplicated `seq_num` descriptors each add `k-1` null
    /// placeholders right after the matching slice entry.
    fn repair_delins_seq_num(chain: Vec<Option<String>>, descriptors: &mut Vec<&DifRow>) -> Vec<Option<String>> {
        let dup_seq_nums = duplicated_values(descriptors, |d| &d.seq_num);
        if dup_seq_nums.is_empty() {
            return chain;
        }
        let extra_counts: std::collections::HashMap<String, usize> = dup_seq_nums
            .iter()
            .map(|seq_num| {
                let count = descriptors.iter().filter(|d| &d.seq_num == seq_num).count();
                (seq_num.clone(), count.saturating_sub(1))
            })
            .collect();
        descriptors.retain(|d| !dup_seq_nums.contains(&d.seq_num));

        let mut out = Vec::with_capacity(chain.len());
        for cell in chain {
            let extra = cell.as_deref().and_then(pdb_seq_num_str).and_then(|n| extra_counts.get(&n).copied());
            out.push(cell);
            if let Some(n) = extra {
                for _ in 0..n {
                    out.push(None);
                }
            }
        }
        out
    }

    /// Stage 4: duplicated `db_seq_num` descriptors keep only their first
    /// occurrence; the rest are treated as pseudo-insertions and their
    /// matching slice entries are removed.
    fn repair_delins_db_seq_num(chain: Vec<Option<String>>, descriptors: &mut Vec<&DifRow>) -> Vec<Option<String>> {
        let dup_db_seq_nums = duplicated_values(descriptors, |d| &d.db_seq_num);
        if dup_db_seq_nums.is_empty() {
            return chain;
        }

        let mut removal_targets = Vec::new();
        for db_seq_num in &dup_db_seq_nums {
            let mut group: Vec<&&DifRow> =
                descriptors.iter().filter(|d| &d.db_seq_num == db_seq_num).collect();
            if group.is_empty() {
                continue;
            }
            group.remove(0);
            removal_targets.extend(group.iter().map(|d| d.seq_num.clone()));
        }
        descriptors.retain(|d| !dup_db_seq_nums.contains(&d.db_seq_num));

        let mut out = Vec::with_capacity(chain.len());
        for cell in chain {
            if let Some(num) = cell.as_deref().and_then(pdb_seq_num_str) {
                if let Some(pos) = removal_targets.iter().position(|t| t == &num) {
                    removal_targets.remove(pos);
                    continue;
                }
            }
            out.push(cell);
        }
        out
    }
}

fn pdb_seq_num(cell: &str) -> Option<i64> {
    cell.split_once(", ").and_then(|(_, num)| num.parse().ok())
}

fn pdb_seq_num_str(cell: &str) -> Option<String> {
    cell.split_once(", ").map(|(_, num)| num.to_string())
}

fn duplicated_values<F>(descriptors: &[&DifRow], key: F) -> std::collections::HashSet<String>
where
    F: Fn(&DifRow) -> &String,
{
    let mut seen = std::collections::HashSet::new();
    let mut dup = std::collections::HashSet::new();
    for d in descriptors {
        let k = key(d).clone();
        if !seen.insert(k.clone()) {
            dup.insert(k);
        }
    }
    dup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cif::PolyResidue;

    fn residue(mon: &str, num: &str) -> Option<PolyResidue> {
        Some(PolyResidue { mon_id: mon.to_string(), pdb_seq_num: num.to_string() })
    }

    fn record_with_chain(chain: Vec<Option<PolyResidue>>, dif: Vec<DifRow>) -> CifRecord {
        let n = chain.len();
        CifRecord {
            pdb_id: "TEST".to_string(),
            struct_ref_seq: Vec::new(),
            struct_ref_seq_dif: dif,
            chain,
            chain_ids: vec!["A".to_string(); n],
        }
    }

    fn row(strand_id: &str, beg: u32, end: u32) -> StructRefSeqRow {
        StructRefSeqRow { strand_id: strand_id.to_string(), accession: "P0".to_string(), seq_align_beg: beg, seq_align_end: end, sort_index: 0 }
    }

    #[test]
    fn no_descriptors_returns_slice_unchanged() {
        let chain = vec![residue("ALA", "1"), residue("CYS", "2"), residue("ASP", "3")];
        let record = record_with_chain(chain, Vec::new());
        let built = ChainBuilder::build(&record, &row("A", 1, 3));
        assert_eq!(built, vec![Some("ALA, 1".to_string()), Some("CYS, 2".to_string()), Some("ASP, 3".to_string())]);
    }

    #[test]
    fn deletion_stride_inserts_placeholders() {
        let chain = vec![residue("ALA", "1"), residue("CYS", "4")];
        let dif = vec![DifRow { strand_id: "A".to_string(), seq_num: "?".to_string(), db_seq_num: "2".to_string(), details: "deletion".to_string() }];
        let record = record_with_chain(chain, dif);
        let built = ChainBuilder::build(&record, &row("A", 1, 2));
        assert_eq!(built, vec![Some("ALA, 1".to_string()), None, None, None, Some("CYS, 4".to_string())]);
    }

    #[test]
    fn insertion_removes_matching_entry() {
        let chain = vec![residue("ALA", "1"), residue("CYS", "2"), residue("ASP", "3")];
        let dif = vec![DifRow { strand_id: "A".to_string(), seq_num: "2".to_string(), db_seq_num: "?".to_string(), details: "insertion".to_string() }];
        let record = record_with_chain(chain, dif);
        let built = ChainBuilder::build(&record, &row("A", 1, 3));
        assert_eq!(built, vec![Some("ALA, 1".to_string()), Some("ASP, 3".to_string())]);
    }
}
