//! mmCIF ingestion for one PDB entry: download/cache, generic CIF-loop
//! parsing via `bioshell-cif`, and the atom-coordinate CSV cache.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use bioshell_cif::{read_cif_buffer, CifTable};
use flate2::read::GzDecoder;
use log::debug;

use crate::error::DsaError;

const RCSB_DOWNLOAD_BASE: &str = "https://files.rcsb.org/download";

/// A `struct_ref_seq` row, chain-order-canonicalized (see `CifLoader::load`).
#[derive(Debug, Clone)]
pub struct StructRefSeqRow {
    pub strand_id: String,
    pub accession: String,
    pub seq_align_beg: u32,
    pub seq_align_end: u32,
    /// Offset of this strand's first residue into the flattened,
    /// hetero-folded `poly_seq_scheme` chain list.
    pub sort_index: usize,
}

/// A retained `struct_ref_seq_dif` descriptor (excluded-detail rows already dropped).
#[derive(Debug, Clone)]
pub struct DifRow {
    pub strand_id: String,
    /// `"?"` marks a deletion (residue present in the reference, absent here).
    pub seq_num: String,
    /// `"?"` marks an insertion (residue present here, absent in the reference).
    pub db_seq_num: String,
    pub details: String,
}

/// One folded `poly_seq_scheme` residue, or `None` for a `pdb_mon_id == "?"` gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyResidue {
    pub mon_id: String,
    pub pdb_seq_num: String,
}

impl PolyResidue {
    pub fn cell(&self) -> String {
        format!("{}, {}", self.mon_id, self.pdb_seq_num)
    }
}

#[derive(Debug, Clone)]
pub struct AtomRow {
    pub asym_id: String,
    pub comp_id: String,
    pub seq_id: String,
    pub atom_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Parsed tables for one PDB entry.
#[derive(Debug, Clone)]
pub struct CifRecord {
    pub pdb_id: String,
    pub struct_ref_seq: Vec<StructRefSeqRow>,
    pub struct_ref_seq_dif: Vec<DifRow>,
    /// Folded per-residue list: `chain[i]` is the residue at flattened index `i`.
    pub chain: Vec<Option<PolyResidue>>,
    /// Strand id for each entry of `chain`, same length.
    pub chain_ids: Vec<String>,
}

const EXCLUDED_DIF_DETAILS: [&str; 4] =
    ["expression tag", "linker", "conflict", "microgeterogeneity"];

pub struct CifLoader;

impl CifLoader {
    /// Ensures `{pdb_dir}/{pdbid}.cif.gz` exists (downloading it if not),
    /// parses it, and writes `{atom_coord_dir}/{PDBID}.csv` exactly once.
    pub fn load(pdb_id: &str, pdb_dir: &Path, atom_coord_dir: &Path) -> Result<CifRecord, DsaError> {
        let cif_text = Self::fetch_cif_text(pdb_id, pdb_dir)?;
        let data_blocks = read_cif_buffer(&mut cif_text.as_bytes()).map_err(|e| DsaError::Parse {
            what: format!("mmCIF {pdb_id}"),
            details: e.to_string(),
        })?;
        let block = data_blocks.first().ok_or_else(|| DsaError::Parse {
            what: format!("mmCIF {pdb_id}"),
            details: "no data block".to_string(),
        })?;

        let (chain, chain_ids) = Self::parse_poly_seq_scheme(block, pdb_id)?;
        let struct_ref_seq = Self::parse_struct_ref_seq(block, pdb_id, &chain_ids)?;
        let struct_ref_seq_dif = Self::parse_struct_ref_seq_dif(block);

        Self::write_atom_coord_csv(block, pdb_id, atom_coord_dir)?;

        Ok(CifRecord { pdb_id: pdb_id.to_string(), struct_ref_seq, struct_ref_seq_dif, chain, chain_ids })
    }

    fn fetch_cif_text(pdb_id: &str, pdb_dir: &Path) -> Result<String, DsaError> {
        fs::create_dir_all(pdb_dir)?;
        let path = pdb_dir.join(format!("{}.cif.gz", pdb_id.to_lowercase()));

        if !path.exists() {
            let url = format!("{RCSB_DOWNLOAD_BASE}/{pdb_id}.cif.gz");
            debug!("downloading {url}");
            let bytes = reqwest::blocking::get(&url)
                .and_then(reqwest::blocking::Response::error_for_status)
                .map_err(|source| DsaError::Fetch { url, source })?
                .bytes()
                .map_err(|source| DsaError::Fetch { url: path.display().to_string(), source })?;
            fs::write(&path, &bytes)?;
        }

        let file = fs::File::open(&path)?;
        let mut text = String::new();
        GzDecoder::new(file).read_to_string(&mut text)?;
        Ok(text)
    }

    /// Folds `pdbx_poly_seq_scheme` rows per §3: repeating hetero rows are
    /// recorded only as a dropped index, everything else is appended.
    fn parse_poly_seq_scheme(
        block: &bioshell_cif::CifData,
        pdb_id: &str,
    ) -> Result<(Vec<Option<PolyResidue>>, Vec<String>), DsaError> {
        let table = CifTable::new(
            block,
            "_pdbx_poly_seq_scheme.",
            ["pdb_mon_id", "pdb_seq_num", "hetero", "pdb_strand_id"],
        )
        .map_err(|e| DsaError::Parse { what: format!("mmCIF {pdb_id} poly_seq_scheme"), details: e.to_string() })?;

        let mut chain = Vec::new();
        let mut chain_ids = Vec::new();
        let mut hetero_pdb_seq_num = String::new();

        for tokens in table.iter() {
            let mon_id = tokens[0].to_string();
            let seq_num = tokens[1].to_string();
            let hetero = tokens[2];
            let strand_id = tokens[3].to_string();

            if hetero == "n" {
                hetero_pdb_seq_num.clear();
                push_residue(&mut chain, &mon_id, &seq_num);
                chain_ids.push(strand_id);
            } else if seq_num == hetero_pdb_seq_num {
                // repeated hetero row: folded away, not appended to either list.
                continue;
            } else {
                push_residue(&mut chain, &mon_id, &seq_num);
                chain_ids.push(strand_id);
                hetero_pdb_seq_num = seq_num;
            }
        }

        Ok((chain, chain_ids))
    }

    fn parse_struct_ref_seq(
        block: &bioshell_cif::CifData,
        pdb_id: &str,
        chain_ids: &[String],
    ) -> Result<Vec<StructRefSeqRow>, DsaError> {
        let table = CifTable::new(
            block,
            "_struct_ref_seq.",
            ["pdbx_strand_id", "pdbx_db_accession", "seq_align_beg", "seq_align_end"],
        )
        .map_err(|e| DsaError::Parse { what: format!("mmCIF {pdb_id} struct_ref_seq"), details: e.to_string() })?;

        // First pass: order by first occurrence in the raw (unfolded) strand-id
        // list, mirroring the source's two-stage sort_index computation.
        let raw_strand_order: Vec<String> = table.iter().map(|t| t[0].to_string()).collect();

        let mut rows: Vec<StructRefSeqRow> = table
            .iter()
            .map(|tokens| {
                let strand_id = tokens[0].to_string();
                let accession = tokens[1].to_uppercase();
                let seq_align_beg: u32 = tokens[2].parse().unwrap_or(1);
                let seq_align_end: u32 = tokens[3].parse().unwrap_or(seq_align_beg);
                StructRefSeqRow { strand_id, accession, seq_align_beg, seq_align_end, sort_index: 0 }
            })
            .collect();

        rows.sort_by_key(|r| first_index(&raw_strand_order, &r.strand_id));

        for row in &mut rows {
            row.sort_index = first_index(chain_ids, &row.strand_id);
        }

        Ok(rows)
    }

    fn parse_struct_ref_seq_dif(block: &bioshell_cif::CifData) -> Vec<DifRow> {
        let table = match CifTable::new(
            block,
            "_struct_ref_seq_dif.",
            ["pdbx_pdb_strand_id", "pdbx_auth_seq_num", "pdbx_seq_db_seq_num", "details"],
        ) {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };

        table
            .iter()
            .map(|tokens| DifRow {
                strand_id: tokens[0].to_string(),
                seq_num: tokens[1].to_string(),
                db_seq_num: tokens[2].to_string(),
                details: tokens[3].to_lowercase(),
            })
            .filter(|row| !EXCLUDED_DIF_DETAILS.contains(&row.details.as_str()))
            .collect()
    }

    /// Writes the atom-coordinate cache. ATOM-only, first-alt-loc-wins,
    /// original insertion order preserved; written once per PDB ID.
    fn write_atom_coord_csv(
        block: &bioshell_cif::CifData,
        pdb_id: &str,
        atom_coord_dir: &Path,
    ) -> Result<(), DsaError> {
        fs::create_dir_all(atom_coord_dir)?;
        let path = atom_coord_dir.join(format!("{pdb_id}.csv"));
        if path.exists() {
            return Ok(());
        }

        let table = CifTable::new(
            block,
            "_atom_site.",
            [
                "pdbx_PDB_model_num",
                "auth_asym_id",
                "auth_comp_id",
                "auth_seq_id",
                "auth_atom_id",
                "Cartn_x",
                "Cartn_y",
                "Cartn_z",
                "label_alt_id",
                "group_PDB",
            ],
        )
        .map_err(|e| DsaError::Parse { what: format!("mmCIF {pdb_id} atom_site"), details: e.to_string() })?;

        let mut seen_alt: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();
        let mut rows: Vec<(String, AtomRow)> = Vec::new();

        for tokens in table.iter() {
            if tokens[9] != "ATOM" {
                continue;
            }
            let alt_id = tokens[8];
            let seq_id = tokens[3].to_string();
            let atom_id = tokens[4].to_string();
            if alt_id != "." {
                let key = (seq_id.clone(), atom_id.clone());
                if !seen_alt.insert(key) {
                    continue;
                }
            }
            let x: f64 = tokens[5].parse().unwrap_or(f64::NAN);
            let y: f64 = tokens[6].parse().unwrap_or(f64::NAN);
            let z: f64 = tokens[7].parse().unwrap_or(f64::NAN);
            rows.push((
                tokens[0].to_string(),
                AtomRow { asym_id: tokens[1].to_string(), comp_id: tokens[2].to_string(), seq_id, atom_id, x, y, z },
            ));
        }

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["model_num", "asym_id", "comp_id", "seq_id", "atom_id", "Cartn_x", "Cartn_y", "Cartn_z"])?;
        for (model_num, row) in &rows {
            writer.write_record([
                model_num,
                &row.asym_id,
                &row.comp_id,
                &row.seq_id,
                &row.atom_id,
                &row.x.to_string(),
                &row.y.to_string(),
                &row.z.to_string(),
            ])?;
        }
        writer.flush()?;
        debug!("wrote atom coordinate cache {}", path.display());
        Ok(())
    }
}

fn push_residue(chain: &mut Vec<Option<PolyResidue>>, mon_id: &str, pdb_seq_num: &str) {
    if mon_id == "?" {
        chain.push(None);
    } else {
        chain.push(Some(PolyResidue { mon_id: mon_id.to_string(), pdb_seq_num: pdb_seq_num.to_string() }));
    }
}

fn first_index(haystack: &[String], needle: &str) -> usize {
    haystack.iter().position(|s| s == needle).unwrap_or(usize::MAX)
}
