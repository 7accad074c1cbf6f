//! One-letter <-> three-letter amino acid code tables.

use crate::error::DsaError;

/// Converts a one-letter residue code to its three-letter representation.
///
/// 20 canonical residues plus the expanded set used by UniProt FASTA records:
/// `O`/`U`/`X` map to `HYP`/`SEC`/`any`, and the ambiguity codes `B`/`Z` map to
/// the pipe-joined tokens `D|N` / `E|Q`.
pub fn one_to_three(code: char) -> Result<&'static str, DsaError> {
    let three = match code.to_ascii_uppercase() {
        'A' => "ALA",
        'B' => "D|N",
        'C' => "CYS",
        'D' => "ASP",
        'E' => "GLU",
        'F' => "PHE",
        'G' => "GLY",
        'H' => "HIS",
        'I' => "ILE",
        'K' => "LYS",
        'L' => "LEU",
        'M' => "MET",
        'N' => "ASN",
        'O' => "HYP",
        'P' => "PRO",
        'Q' => "GLN",
        'R' => "ARG",
        'S' => "SER",
        'T' => "THR",
        'U' => "SEC",
        'V' => "VAL",
        'W' => "TRP",
        'X' => "any",
        'Y' => "TYR",
        'Z' => "E|Q",
        other => return Err(DsaError::UnknownResidue(other)),
    };
    Ok(three)
}

/// Converts a one-letter sequence string to its three-letter-code vector.
pub fn sequence_to_three(sequence: &str) -> Result<Vec<String>, DsaError> {
    sequence.chars().map(|c| one_to_three(c).map(str::to_string)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_residues_round_trip() {
        assert_eq!(one_to_three('A').unwrap(), "ALA");
        assert_eq!(one_to_three('a').unwrap(), "ALA");
        assert_eq!(one_to_three('Y').unwrap(), "TYR");
    }

    #[test]
    fn ambiguity_and_rare_codes() {
        assert_eq!(one_to_three('B').unwrap(), "D|N");
        assert_eq!(one_to_three('Z').unwrap(), "E|Q");
        assert_eq!(one_to_three('O').unwrap(), "HYP");
        assert_eq!(one_to_three('U').unwrap(), "SEC");
        assert_eq!(one_to_three('X').unwrap(), "any");
    }

    #[test]
    fn unknown_code_errors() {
        assert!(one_to_three('J').is_err());
    }

    #[test]
    fn sequence_conversion() {
        let three = sequence_to_three("ACDY").unwrap();
        assert_eq!(three, vec!["ALA", "CYS", "ASP", "TYR"]);
    }
}
