//! Five-stage pipeline orchestration: fetch, prepare, filter, score, plot.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::chain::ChainBuilder;
use crate::cif::CifLoader;
use crate::coord::{apply_keep_mask, CoordResolver};
use crate::ensemble::{Cell, EnsembleMatrix, EnsembleTrimmer};
use crate::error::DsaError;
use crate::mutation::{Classification, MutationClassifier};
use crate::plotting;
use crate::refmap::RefMap;
use crate::scorer::{arithmetic_mean, sample_std, Scorer};

const ALL_METHODS: [&str; 3] = ["X-ray", "NMR", "EM"];
const CHAIN_THRESHOLD: usize = 3;

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub uniprot: String,

    #[arg(long)]
    pub out: PathBuf,

    #[arg(long = "sequence-ratio", default_value_t = 0.7)]
    pub sequence_ratio: f64,

    #[arg(long = "min-structures", default_value_t = 5)]
    pub min_structures: usize,

    #[arg(long, default_value = "X-ray")]
    pub method: String,

    #[arg(long = "negative-pdbid", default_value = "")]
    pub negative_pdbid: String,

    #[arg(long = "cis-threshold", default_value_t = 3.3)]
    pub cis_threshold: f64,

    #[arg(long = "proc-cis", default_value_t = true)]
    pub proc_cis: bool,

    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

struct Workspace {
    out_dir: PathBuf,
    pdb_dir: PathBuf,
    atom_coord_dir: PathBuf,
}

/// Runs the `run` subcommand end to end. Returns the process exit code.
pub fn run(args: &RunArgs) -> i32 {
    match run_inner(args) {
        Ok(code) => code,
        Err(err) => {
            let ws = Workspace::new(args);
            let _ = ws.write_failure(args, &err.to_string(), 0);
            eprintln!("Error: {err}");
            1
        }
    }
}

fn run_inner(args: &RunArgs) -> Result<i32, DsaError> {
    let ws = Workspace::new(args);
    fs::create_dir_all(&ws.out_dir)?;
    fs::create_dir_all(&ws.pdb_dir)?;
    fs::create_dir_all(&ws.atom_coord_dir)?;

    let method = args.method.clone();
    let negative = parse_negative_pdbids(&args.negative_pdbid);

    eprintln!("STEP 1/5: Checking PDB availability...");
    let refmap = RefMap::fetch(&args.uniprot)?;

    let mut method_counts = serde_json::Map::new();
    let mut total_count = 0usize;
    for m in ALL_METHODS {
        let count = refmap.references(Some(m)).len();
        method_counts.insert(m.to_string(), json!(count));
        total_count += count;
    }

    let pdblist: Vec<String> = refmap
        .references(Some(&method))
        .iter()
        .map(|r| r.id.clone())
        .filter(|id| !negative.contains(&id.to_uppercase()))
        .collect();

    if pdblist.is_empty() {
        let message = no_data_message(&args.uniprot, &method, &method_counts, total_count, &args.negative_pdbid);
        ws.write_result(json!({
            "status": "failed",
            "error": message,
            "uniprot_id": args.uniprot,
            "method": if method.is_empty() { "all".to_string() } else { method.clone() },
            "pdb_counts": method_counts,
            "total_pdb_count": total_count,
        }))?;
        ws.write_status("failed", 20, &message)?;
        return Ok(1);
    }

    eprintln!("STEP 2/5: Preparing data...");
    let reference_three_letter = refmap.three_letter_sequence()?;
    let mut matrix = EnsembleMatrix { reference: reference_three_letter.iter().map(|r| Some((r.clone(), String::new()))).collect(), columns: Vec::new() };

    let mut normal = Vec::new();
    let mut substitution = Vec::new();
    let mut chimera = Vec::new();
    let mut delins = Vec::new();

    for (n, pdb_id) in pdblist.iter().enumerate() {
        if args.verbose {
            eprintln!(" ({}/{}) preparing {pdb_id}", n + 1, pdblist.len());
        }
        let record = match CifLoader::load(pdb_id, &ws.pdb_dir, &ws.atom_coord_dir) {
            Ok(record) => record,
            Err(err) => {
                warn!("{pdb_id} skipped: {err}");
                continue;
            }
        };

        let accessions = refmap.accessions();
        let matching: Vec<_> = record.struct_ref_seq.iter().filter(|r| accessions.contains(&r.accession)).collect();
        if matching.is_empty() {
            continue;
        }

        let filtered_pairs: Vec<(&str, &str)> =
            matching.iter().map(|r| (r.strand_id.as_str(), r.accession.as_str())).collect();
        let unique_filtered_pairs: HashSet<(&str, &str)> = filtered_pairs.iter().copied().collect();
        let dup_filtered_pair = filtered_pairs.len() != unique_filtered_pairs.len();

        let full_strand_ids: Vec<&str> = record.struct_ref_seq.iter().map(|r| r.strand_id.as_str()).collect();
        let unique_full_strands: HashSet<&str> = full_strand_ids.iter().copied().collect();
        let dup_full_strand = full_strand_ids.len() != unique_full_strands.len();

        let chimera_by_duplication = dup_filtered_pair || dup_full_strand;

        let strand_ids: Vec<&str> = matching.iter().map(|r| r.strand_id.as_str()).collect();
        let dif_rows: Vec<_> = record.struct_ref_seq_dif.iter().filter(|d| strand_ids.contains(&d.strand_id.as_str())).collect();
        let engineered = dif_rows.iter().any(|d| d.details == "engineered mutation");

        let dif_rows_by_chain: Vec<Vec<&crate::cif::DifRow>> = strand_ids
            .iter()
            .map(|strand_id| dif_rows.iter().copied().filter(|d| d.strand_id == *strand_id).collect())
            .collect();

        let classification = if chimera_by_duplication {
            Classification::Chimera
        } else {
            MutationClassifier::classify(&dif_rows_by_chain, engineered)
        };

        match classification {
            Classification::Normal => normal.push(pdb_id.clone()),
            Classification::Substitution => substitution.push(pdb_id.clone()),
            Classification::Chimera => {
                chimera.push(pdb_id.clone());
                debug!("{}", skip_reason(pdb_id, "chimera"));
                continue;
            }
            Classification::Delins => {
                delins.push(pdb_id.clone());
                debug!("{}", skip_reason(pdb_id, "delins"));
                continue;
            }
            Classification::Mismatch => {
                debug!("{}", skip_reason(pdb_id, "mismatch"));
                continue;
            }
        }

        let Some((beg, _end)) = refmap.range(pdb_id) else { continue };
        let len_seqdata = reference_three_letter.len();

        for row in matching.iter().copied() {
            let built = ChainBuilder::build(&record, row);
            let mut column: Vec<Cell> = Vec::with_capacity(len_seqdata);
            column.extend(std::iter::repeat(None).take((beg as usize).saturating_sub(1)));
            column.extend(built.into_iter().map(|cell| cell.and_then(|c| split_cell(&c))));
            column.resize(len_seqdata, None);
            matrix.columns.push(((pdb_id.clone(), row.strand_id.clone()), column));
        }
    }

    let retained_pdb_count = normal.len() + substitution.len();
    if retained_pdb_count < args.min_structures {
        let text = insufficient_data_message(retained_pdb_count, args.min_structures, &args.negative_pdbid);
        let message = DsaError::InsufficientData { message: text }.to_string();
        ws.write_result(json!({
            "status": "failed",
            "error": message,
            "uniprot_id": args.uniprot,
            "found_structures": retained_pdb_count,
            "required_structures": args.min_structures,
        }))?;
        ws.write_status("failed", 40, &message)?;
        return Ok(1);
    }

    eprintln!("STEP 3/5: Processing {retained_pdb_count} PDB entries...");
    let keep_pdb: HashSet<&String> = normal.iter().chain(substitution.iter()).collect();
    matrix.columns.retain(|((pdb_id, _), _)| keep_pdb.contains(pdb_id));

    eprintln!("STEP 4/5: Running DSA analysis...");
    let trimmer = EnsembleTrimmer::new(args.sequence_ratio * 100.0);
    let trimmed = trimmer.trim(matrix);

    if trimmed.columns.len() < CHAIN_THRESHOLD {
        let message = "Less than 3 chains".to_string();
        ws.write_result(json!({ "status": "failed", "uniprot_id": args.uniprot, "error": message }))?;
        ws.write_status("failed", 80, &message)?;
        return Ok(1);
    }

    let residues: Vec<String> = trimmed.reference.iter().map(|c| c.as_ref().map(|(r, _)| r.clone()).unwrap_or_default()).collect();
    let (mut resolved_chains, keep) = CoordResolver::resolve(&trimmed, &ws.atom_coord_dir)?;
    apply_keep_mask(&mut resolved_chains, &keep);
    let residues: Vec<String> = residues.into_iter().zip(&keep).filter(|(_, k)| **k).map(|(r, _)| r).collect();

    let rows = Scorer::score(&residues, &resolved_chains);

    let pdb_ids: Vec<String> = {
        let mut ids: Vec<String> = resolved_chains.iter().map(|c| c.pdb_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    };

    let umf = {
        let scores: Vec<f64> = rows.iter().map(|r| r.score).collect();
        round_to(arithmetic_mean(&scores), 1)
    };
    let length_percent = round_to(residues.len() as f64 * 100.0 / reference_three_letter.len() as f64, 1);

    let resolution = {
        let mut values = Vec::new();
        for pdb_id in &pdb_ids {
            if let Some(reference) = refmap.references(None).iter().find(|r| &r.id == pdb_id) {
                if let Some(res) = reference.resolution.as_deref().and_then(numeric_resolution) {
                    values.push(res);
                }
            }
        }
        if values.is_empty() { None } else { Some(round_half_up(arithmetic_mean(&values), 2)) }
    };

    let mut statistics = json!({
        "uniprot_id": args.uniprot,
        "entries": pdb_ids.len(),
        "chains": resolved_chains.len(),
        "length": residues.len(),
        "length_percent": length_percent,
        "umf": umf,
        "resolution": resolution,
        "pdb_ids": pdb_ids,
    });

    if args.proc_cis {
        let cis = Scorer::cis_analysis(&rows, Some(args.cis_threshold));
        statistics["cis_analysis"] = json!({
            "cis_dist_mean": round_to(cis.cis_dist_mean, 2),
            "cis_dist_std": round_to(cis.cis_dist_std, 2),
            "cis_score_mean": round_to(cis.cis_score_mean, 2),
            "cis_num": cis.cis_num,
            "mix": cis.mix,
            "threshold": cis.threshold,
            "cis_pair_list": cis.sample_keys,
        });
    }

    eprintln!("STEP 5/5: Generating plots...");
    let heatmap_path = ws.out_dir.join("heatmap.png");
    plotting::plot_heatmap(&rows, residues.len(), &heatmap_path, &format!("DSA Score Heatmap - {}", args.uniprot))?;
    let scatter_path = ws.out_dir.join("dist_score.png");
    plotting::plot_distance_score(&rows, &scatter_path, &format!("Distance vs Score - {}", args.uniprot))?;

    let scores: Vec<f64> = rows.iter().map(|r| r.score).collect();
    let means: Vec<f64> = rows.iter().map(|r| r.mean).collect();
    let stds: Vec<f64> = rows.iter().map(|r| r.std).collect();

    let result = json!({
        "status": "success",
        "uniprot_id": args.uniprot,
        "parameters": {
            "sequence_ratio": args.sequence_ratio,
            "min_structures": args.min_structures,
            "method": if method.is_empty() { "all".to_string() } else { method.clone() },
            "negative_pdbid": args.negative_pdbid,
            "cis_threshold": args.cis_threshold,
            "proc_cis": args.proc_cis,
        },
        "statistics": statistics,
        "score_summary": {
            "total_pairs": rows.len(),
            "mean_score": arithmetic_mean(&scores),
            "std_score": sample_std(&scores),
            "max_score": scores.iter().cloned().fold(f64::MIN, f64::max),
            "min_score": scores.iter().cloned().fold(f64::MAX, f64::min),
            "mean_distance": arithmetic_mean(&means),
            "mean_std": arithmetic_mean(&stds),
        },
    });
    ws.write_result(result)?;
    ws.write_status("done", 100, "Analysis completed successfully")?;

    info!("DSA analysis completed for {}", args.uniprot);
    eprintln!("Analysis completed successfully");
    Ok(0)
}

impl Workspace {
    fn new(args: &RunArgs) -> Self {
        let work_dir = args.out.join("work");
        Self { pdb_dir: work_dir.join("pdb_files"), atom_coord_dir: work_dir.join("atom_coord"), out_dir: args.out.clone() }
    }

    fn write_result(&self, value: Value) -> Result<(), DsaError> {
        fs::create_dir_all(&self.out_dir)?;
        fs::write(self.out_dir.join("result.json"), serde_json::to_vec_pretty(&value)?)?;
        Ok(())
    }

    fn write_status(&self, status: &str, progress: u32, message: &str) -> Result<(), DsaError> {
        fs::create_dir_all(&self.out_dir)?;
        let value = json!({ "status": status, "progress": progress, "message": message });
        fs::write(self.out_dir.join("status.json"), serde_json::to_vec_pretty(&value)?)?;
        Ok(())
    }

    fn write_failure(&self, args: &RunArgs, message: &str, progress: u32) -> Result<(), DsaError> {
        self.write_result(json!({ "status": "failed", "error": message, "uniprot_id": args.uniprot }))?;
        self.write_status("failed", progress, message)
    }
}

fn skip_reason(pdb_id: &str, classification: &str) -> DsaError {
    DsaError::ClassificationSkip { pdb_id: pdb_id.to_string(), classification: classification.to_string() }
}

fn split_cell(cell: &str) -> Option<(String, String)> {
    cell.split_once(", ").map(|(res, num)| (res.to_string(), num.to_string()))
}

fn parse_negative_pdbids(raw: &str) -> HashSet<String> {
    raw.trim().split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()).map(str::to_uppercase).collect()
}

fn numeric_resolution(raw: &str) -> Option<f64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn round_half_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor + 0.5).floor() / factor
}

fn no_data_message(uniprot: &str, method: &str, counts: &serde_json::Map<String, Value>, total: usize, negative: &str) -> String {
    let method_name = if method == "X-ray" { "X-ray crystallography only" } else { "all structure determination methods" };
    let mut lines = vec![
        "No data matching the analysis requirements was found.".to_string(),
        String::new(),
        format!("UniProt ID: {uniprot}"),
        format!("Search condition: {method_name}"),
        String::new(),
        "Structures found:".to_string(),
        format!("  - X-ray: {}", counts.get("X-ray").cloned().unwrap_or(json!(0))),
        format!("  - NMR: {}", counts.get("NMR").cloned().unwrap_or(json!(0))),
        format!("  - EM: {}", counts.get("EM").cloned().unwrap_or(json!(0))),
        format!("  - total: {total}"),
    ];
    if method == "X-ray" {
        lines.push(String::new());
        lines.push("Widen --method from X-ray to an empty string to include NMR and EM structures.".to_string());
    }
    if !negative.is_empty() {
        lines.push(format!("  - excluded PDB IDs: {negative}"));
    }
    lines.join("\n")
}

fn insufficient_data_message(found: usize, required: usize, negative: &str) -> String {
    let mut message = format!(
        "解析に必要なデータの数が足りません。\n\n\
         【現在の状況】:\n\
         \u{0020}- 見つかったデータの数: {found}件\n\
         \u{0020}- 必要な最小構造数: {required}件\n\
         \u{0020}- 不足している数: {}件\n\n\
         【解決方法】:\n\
         \u{0020}方法1: 解析画面の「最小構造数」を {found} 以下に下げる\n\
         \u{0020}方法2: 「Method (PDB filter)」を「All」に変更してNMR/EM構造も含める\n",
        required.saturating_sub(found)
    );
    if !negative.is_empty() {
        message.push_str(&format!("\u{0020}方法3: 除外しているPDB ID（{negative}）を見直す\n"));
    }
    message
}
