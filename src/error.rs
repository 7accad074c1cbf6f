use thiserror::Error;

/// Error kinds surfaced by the DSA pipeline.
///
/// Fetch/Parse failures against a single PDB entry are not propagated as
/// this type at the call site that skips the entry — see `driver::run_inner`,
/// which logs and continues instead. This enum is for errors that are fatal
/// to the whole run, or that a caller explicitly wants typed.
#[derive(Debug, Error)]
pub enum DsaError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse {what}: {details}")]
    Parse { what: String, details: String },

    #[error("{pdb_id} skipped ({classification})")]
    ClassificationSkip { pdb_id: String, classification: String },

    #[error("{pdb_id} {strand_id} is not used due to sequence alignment failure")]
    AlignmentFailure { pdb_id: String, strand_id: String },

    #[error("{message}")]
    InsufficientData { message: String },

    #[error("unknown one-letter residue code '{0}'")]
    UnknownResidue(char),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
