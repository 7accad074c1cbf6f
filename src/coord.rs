//! Coordinate resolution (`getcoord`): maps each trimmed matrix row to its
//! Cα coordinate per chain, using the cached per-PDB atom CSV.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::ensemble::EnsembleMatrix;
use crate::error::DsaError;

#[derive(Debug, Deserialize)]
struct AtomCsvRow {
    #[allow(dead_code)]
    model_num: String,
    #[allow(dead_code)]
    asym_id: String,
    comp_id: String,
    seq_id: String,
    atom_id: String,
    #[serde(rename = "Cartn_x")]
    cartn_x: f64,
    #[serde(rename = "Cartn_y")]
    cartn_y: f64,
    #[serde(rename = "Cartn_z")]
    cartn_z: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Per-chain resolved coordinates, one entry per surviving matrix row.
pub struct ResolvedChain {
    pub pdb_id: String,
    pub strand_id: String,
    pub residues: Vec<String>,
    pub coords: Vec<Coord>,
}

pub struct CoordResolver;

impl CoordResolver {
    /// Resolves Cα coordinates for every retained chain column in `matrix`.
    /// Returns the resolved chains plus the row-keep mask after dropping
    /// any row missing a Cα in some chain.
    pub fn resolve(matrix: &EnsembleMatrix, atom_coord_dir: &Path) -> Result<(Vec<ResolvedChain>, Vec<bool>), DsaError> {
        let n = matrix.row_count();
        let mut keep = vec![true; n];
        let mut chains = Vec::with_capacity(matrix.columns.len());

        for ((pdb_id, strand_id), column) in &matrix.columns {
            let lookup = Self::load_ca_lookup(pdb_id, atom_coord_dir)?;
            let mut residues = Vec::with_capacity(n);
            let mut coords = Vec::with_capacity(n);

            for (i, cell) in column.iter().enumerate() {
                match cell.as_ref().and_then(|(_, num)| lookup.get(num)) {
                    Some(row) => {
                        residues.push(row.comp_id.clone());
                        coords.push(Coord { x: row.cartn_x, y: row.cartn_y, z: row.cartn_z });
                    }
                    None => {
                        keep[i] = false;
                        residues.push(String::new());
                        coords.push(Coord { x: 0.0, y: 0.0, z: 0.0 });
                    }
                }
            }

            chains.push(ResolvedChain { pdb_id: pdb_id.clone(), strand_id: strand_id.clone(), residues, coords });
        }

        Ok((chains, keep))
    }

    /// Loads the cached atom CSV, keeping only `atom_id == "CA"` rows and
    /// the first row per `seq_id` on duplicates.
    fn load_ca_lookup(pdb_id: &str, atom_coord_dir: &Path) -> Result<HashMap<String, AtomCsvRow>, DsaError> {
        let path = atom_coord_dir.join(format!("{pdb_id}.csv"));
        let mut reader = csv::Reader::from_path(&path)?;
        let mut lookup = HashMap::new();
        for record in reader.deserialize() {
            let row: AtomCsvRow = record?;
            if row.atom_id != "CA" {
                continue;
            }
            lookup.entry(row.seq_id.clone()).or_insert(row);
        }
        Ok(lookup)
    }
}

/// Drops every row in `chains`/row-indexed data where `keep[i]` is false.
pub fn apply_keep_mask(chains: &mut [ResolvedChain], keep: &[bool]) {
    for chain in chains {
        let residues = std::mem::take(&mut chain.residues);
        let coords = std::mem::take(&mut chain.coords);
        chain.residues = residues.into_iter().zip(keep).filter(|(_, k)| **k).map(|(r, _)| r).collect();
        chain.coords = coords.into_iter().zip(keep).filter(|(_, k)| **k).map(|(c, _)| c).collect();
    }
}
