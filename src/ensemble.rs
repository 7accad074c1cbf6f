//! Ensemble matrix assembly and trimming (`sort_sequence`).
//!
//! A matrix is the reference column plus one column per surviving chain,
//! each cell either a `(three_letter_code, pdb_seq_num)` pair or a gap.

use crate::error::DsaError;

/// One matrix cell: `None` is a gap, `Some((residue, pdb_seq_num))` otherwise.
pub type Cell = Option<(String, String)>;

pub struct EnsembleMatrix {
    pub reference: Vec<Cell>,
    /// `(pdb_id, strand_id)` label paired with its column.
    pub columns: Vec<((String, String), Vec<Cell>)>,
}

impl EnsembleMatrix {
    pub fn row_count(&self) -> usize {
        self.reference.len()
    }

    fn select_rows(&mut self, keep: &[bool]) {
        self.reference = filter_rows(&self.reference, keep);
        for (_, col) in &mut self.columns {
            *col = filter_rows(col, keep);
        }
    }
}

fn filter_rows(col: &[Cell], keep: &[bool]) -> Vec<Cell> {
    col.iter().zip(keep).filter(|(_, k)| **k).map(|(c, _)| c.clone()).collect()
}

fn cell_to_string(cell: &Cell) -> Option<String> {
    cell.as_ref().map(|(res, num)| format!("{res}, {num}"))
}

pub struct EnsembleTrimmer {
    pub seq_ratio: f64,
}

const OFFSET_SCAN: [i64; 98] = build_offset_scan();

const fn build_offset_scan() -> [i64; 98] {
    let mut out = [0i64; 98];
    let mut i = 0usize;
    let mut n = 1i64;
    while n <= 49 {
        out[i] = n;
        i += 1;
        out[i] = -n;
        i += 1;
        n += 1;
    }
    out
}

impl EnsembleTrimmer {
    pub fn new(seq_ratio: f64) -> Self {
        Self { seq_ratio }
    }

    /// Runs the full five-step trim and returns the surviving matrix.
    pub fn trim(&self, mut matrix: EnsembleMatrix) -> EnsembleMatrix {
        self.coverage_filter(&mut matrix);
        self.reference_dedup(&mut matrix);
        self.offset_recovery(&mut matrix);
        self.coverage_filter(&mut matrix);
        self.pdb_seq_num_dedup(&mut matrix);
        matrix
    }

    /// Step 1: drop null-reference rows, then low-coverage columns, then any
    /// row still containing a null.
    fn coverage_filter(&self, matrix: &mut EnsembleMatrix) {
        let keep: Vec<bool> = matrix.reference.iter().map(Option::is_some).collect();
        matrix.select_rows(&keep);

        let total = matrix.row_count();
        if total == 0 {
            return;
        }
        let min_count = (self.seq_ratio / 100.0 * total as f64).ceil() as usize;
        matrix.columns.retain(|(_, col)| col.iter().filter(|c| c.is_some()).count() >= min_count);

        let keep: Vec<bool> = (0..matrix.row_count())
            .map(|i| matrix.reference[i].is_some() && matrix.columns.iter().all(|(_, col)| col[i].is_some()))
            .collect();
        matrix.select_rows(&keep);
    }

    /// Step 2: keep the first occurrence of each distinct reference residue
    /// value, dropping later rows with an identical reference value.
    fn reference_dedup(&self, matrix: &mut EnsembleMatrix) {
        let mut seen = std::collections::HashSet::new();
        let keep: Vec<bool> = matrix
            .reference
            .iter()
            .map(|cell| match cell_to_string(cell) {
                Some(value) => seen.insert(value),
                None => true,
            })
            .collect();
        matrix.select_rows(&keep);
    }

    /// Step 3: per chain, try to realign against the reference by a constant
    /// `pdb_seq_num` offset; drop chains that can't be recovered.
    fn offset_recovery(&self, matrix: &mut EnsembleMatrix) {
        let reference = matrix.reference.clone();
        let mut survivors = Vec::new();

        for (label, column) in std::mem::take(&mut matrix.columns) {
            if Self::disagreements(&reference, &column).is_empty() {
                survivors.push((label, column));
                continue;
            }

            let mut recovered = None;
            for offset in OFFSET_SCAN {
                let shifted = shift_by_offset(&column, offset);
                if Self::matches(&reference, &shifted) > 10 {
                    recovered = Some(shifted);
                    break;
                }
            }

            match recovered {
                Some(shifted) => survivors.push((label, shifted)),
                None => {
                    let failure = DsaError::AlignmentFailure { pdb_id: label.0, strand_id: label.1 };
                    eprintln!("{failure}");
                }
            }
        }

        matrix.columns = survivors;
    }

    fn disagreements(reference: &[Cell], column: &[Cell]) -> Vec<usize> {
        reference
            .iter()
            .zip(column)
            .enumerate()
            .filter_map(|(i, (r, c))| match (r, c) {
                (Some((r_res, _)), Some((c_res, _))) if r_res != c_res => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Counts equal reference/chain residues after dropping pair-nulls and
    /// deduplicating on the reference column.
    fn matches(reference: &[Cell], column: &[Cell]) -> usize {
        let mut seen = std::collections::HashSet::new();
        reference
            .iter()
            .zip(column)
            .filter(|(r, c)| r.is_some() && c.is_some())
            .filter(|(r, _)| seen.insert(cell_to_string(r)))
            .filter(|(r, c)| {
                let r_res = r.as_ref().map(|(res, _)| res.as_str());
                let c_res = c.as_ref().map(|(res, _)| res.as_str());
                r_res == c_res
            })
            .count()
    }

    /// Step 5: drop rows where any chain's `pdb_seq_num` repeats one already
    /// seen in an earlier row of that same chain; union dropped rows globally.
    fn pdb_seq_num_dedup(&self, matrix: &mut EnsembleMatrix) {
        let n = matrix.row_count();
        let mut keep = vec![true; n];

        for (_, column) in &matrix.columns {
            let mut seen = std::collections::HashSet::new();
            for (i, cell) in column.iter().enumerate() {
                if let Some((_, num)) = cell {
                    if !seen.insert(num.clone()) {
                        keep[i] = false;
                    }
                }
            }
        }

        matrix.select_rows(&keep);
    }
}

fn shift_by_offset(column: &[Cell], offset: i64) -> Vec<Cell> {
    column
        .iter()
        .map(|cell| {
            cell.as_ref().and_then(|(res, num)| {
                let parsed: i64 = num.parse().ok()?;
                Some((res.clone(), (parsed + offset).to_string()))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(res: &str, num: &str) -> Cell {
        Some((res.to_string(), num.to_string()))
    }

    #[test]
    fn coverage_filter_drops_null_reference_and_low_coverage_columns() {
        let matrix = EnsembleMatrix {
            reference: vec![cell("ALA", "1"), None, cell("CYS", "3")],
            columns: vec![
                (("1ABC".to_string(), "A".to_string()), vec![cell("ALA", "1"), cell("GLY", "2"), None]),
            ],
        };
        let trimmer = EnsembleTrimmer::new(50.0);
        let mut m = matrix;
        trimmer.coverage_filter(&mut m);
        assert_eq!(m.row_count(), 1);
    }

    #[test]
    fn offset_recovery_shifts_chain_when_constant_offset_matches() {
        let reference = vec![cell("ALA", "1"); 12];
        let column: Vec<Cell> = (1..=12).map(|i| cell("ALA", &(i + 5).to_string())).collect();
        let matrix = EnsembleMatrix { reference, columns: vec![(("1ABC".to_string(), "A".to_string()), column)] };
        let trimmer = EnsembleTrimmer::new(0.0);
        let mut m = matrix;
        trimmer.offset_recovery(&mut m);
        assert_eq!(m.columns.len(), 1);
    }

    #[test]
    fn pdb_seq_num_dedup_drops_repeated_rows() {
        let reference = vec![cell("ALA", "1"), cell("CYS", "2"), cell("ASP", "3")];
        let column = vec![cell("ALA", "1"), cell("CYS", "1"), cell("ASP", "3")];
        let matrix = EnsembleMatrix { reference, columns: vec![(("1ABC".to_string(), "A".to_string()), column)] };
        let trimmer = EnsembleTrimmer::new(0.0);
        let mut m = matrix;
        trimmer.pdb_seq_num_dedup(&mut m);
        assert_eq!(m.row_count(), 2);
    }
}
