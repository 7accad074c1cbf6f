//! UniProt XML fetch + parse: reference sequence, accessions, PDB cross-references.

use std::time::Duration;

use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::DsaError;
use crate::residue;

const UNIPROT_URL_BASE: &str = "https://www.uniprot.org/uniprot";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One `<dbReference type="PDB">` entry from a UniProt XML record.
#[derive(Debug, Clone, PartialEq)]
pub struct PdbRef {
    pub id: String,
    pub method: String,
    pub resolution: Option<String>,
    /// Raw `chains`/`position` property value, e.g. `"A/B=1-147"` or
    /// `"A=1-100, B=101-200"`.
    pub position: String,
}

/// Parsed UniProt XML record for one accession.
#[derive(Debug, Clone)]
pub struct RefMap {
    accessions: Vec<String>,
    sequence: String,
    references: Vec<PdbRef>,
}

impl RefMap {
    /// Fetches and parses the UniProt XML record for `accession`.
    pub fn fetch(accession: &str) -> Result<Self, DsaError> {
        let url = format!("{UNIPROT_URL_BASE}/{accession}.xml");
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| DsaError::Fetch { url: url.clone(), source })?;

        let response = client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|source| DsaError::Fetch { url: url.clone(), source })?;

        let body = response
            .text()
            .map_err(|source| DsaError::Fetch { url: url.clone(), source })?;

        Self::parse(&body)
    }

    /// Parses a UniProt XML document already fetched into memory.
    pub fn parse(xml: &str) -> Result<Self, DsaError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut accessions = Vec::new();
        let mut sequence = String::new();
        let mut references = Vec::new();

        let mut path: Vec<String> = Vec::new();
        let mut in_pdb_ref = false;
        let mut current_id = String::new();
        let mut current_props: Vec<Option<String>> = Vec::new();
        let mut saw_entry = false;

        loop {
            match reader.read_event().map_err(|e| DsaError::Parse {
                what: "UniProt XML".to_string(),
                details: e.to_string(),
            })? {
                Event::Start(tag) => {
                    let name = local_name(&tag);
                    if name == "entry" {
                        saw_entry = true;
                    }
                    if name == "dbReference" && path.last().map(String::as_str) == Some("entry") {
                        if attr_value(&tag, "type").as_deref() == Some("PDB") {
                            in_pdb_ref = true;
                            current_id = attr_value(&tag, "id").unwrap_or_default();
                            current_props.clear();
                        }
                    }
                    path.push(name);
                }
                Event::Empty(tag) => {
                    let name = local_name(&tag);
                    if name == "property" && in_pdb_ref {
                        push_property(&tag, &mut current_props);
                    }
                    if name == "dbReference" && path.last().map(String::as_str) == Some("entry") {
                        // self-closing dbReference with no properties; nothing to record.
                    }
                }
                Event::End(tag) => {
                    let name = local_name(&tag);
                    if name == "dbReference" && in_pdb_ref {
                        if let Some(reference) = finish_pdb_ref(&current_id, &current_props) {
                            references.push(reference);
                        }
                        in_pdb_ref = false;
                    }
                    path.pop();
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| DsaError::Parse {
                            what: "UniProt XML text".to_string(),
                            details: e.to_string(),
                        })?
                        .trim()
                        .to_string();
                    if value.is_empty() {
                        continue;
                    }
                    match path.last().map(String::as_str) {
                        Some("accession") if path.get(path.len().wrapping_sub(2)).map(String::as_str) == Some("entry") => {
                            accessions.push(value);
                        }
                        Some("sequence") if path.get(path.len().wrapping_sub(2)).map(String::as_str) == Some("entry") => {
                            sequence.push_str(&value);
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_entry {
            return Err(DsaError::Parse {
                what: "UniProt XML".to_string(),
                details: "document has no <entry> root".to_string(),
            });
        }
        if accessions.is_empty() || sequence.is_empty() {
            return Err(DsaError::Parse {
                what: "UniProt XML".to_string(),
                details: "entry missing accession or sequence".to_string(),
            });
        }

        debug!(
            "parsed UniProt record {}: {} residues, {} PDB references",
            accessions[0],
            sequence.len(),
            references.len()
        );

        Ok(RefMap { accessions, sequence, references })
    }

    /// All `<accession>` values, primary first.
    pub fn accessions(&self) -> &[String] {
        &self.accessions
    }

    /// One-letter reference sequence.
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Reference sequence as three-letter codes.
    pub fn three_letter_sequence(&self) -> Result<Vec<String>, DsaError> {
        residue::sequence_to_three(&self.sequence)
    }

    /// PDB cross-references, optionally filtered by method. An empty or
    /// absent filter passes every method through.
    pub fn references(&self, method_filter: Option<&str>) -> Vec<&PdbRef> {
        self.references
            .iter()
            .filter(|r| match method_filter {
                None => true,
                Some(m) if m.is_empty() => true,
                Some(m) => r.method == m,
            })
            .collect()
    }

    /// Resolved `(begin, end)` residue range for a PDB reference's `position`
    /// property: a single `begin-end`, or multiple comma-joined ranges
    /// collapsed to `[min(begins), max(ends)]`.
    pub fn range(&self, pdb_id: &str) -> Option<(u32, u32)> {
        let reference = self.references.iter().find(|r| r.id == pdb_id)?;
        parse_position(&reference.position)
    }
}

fn local_name(tag: &quick_xml::events::BytesStart) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

fn attr_value(tag: &quick_xml::events::BytesStart, key: &str) -> Option<String> {
    tag.attributes().flatten().find(|a| a.key.as_ref() == key.as_bytes()).map(|a| {
        String::from_utf8_lossy(&a.value).into_owned()
    })
}

/// Mirrors the source's property-accumulation quirk: an `NMR` method value is
/// immediately followed by a placeholder slot, since NMR cross-references
/// carry no `resolution` property but the record still needs three aligned
/// columns (method, resolution, position).
fn push_property(tag: &quick_xml::events::BytesStart, props: &mut Vec<Option<String>>) {
    if let Some(value) = attr_value(tag, "value") {
        let is_nmr = value == "NMR";
        props.push(Some(value));
        if is_nmr {
            props.push(None);
        }
    }
}

fn finish_pdb_ref(id: &str, props: &[Option<String>]) -> Option<PdbRef> {
    let method = props.first()?.clone()?;
    let resolution = props.get(1).cloned().flatten();
    let position = props.get(2).cloned().flatten().unwrap_or_default();
    Some(PdbRef { id: id.to_string(), method, resolution, position })
}

fn parse_position(position: &str) -> Option<(u32, u32)> {
    let mut begins = Vec::new();
    let mut ends = Vec::new();
    for part in position.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (_, range) = part.split_once('=')?;
        let (beg, end) = range.split_once('-')?;
        begins.push(beg.trim().parse::<u32>().ok()?);
        ends.push(end.trim().parse::<u32>().ok()?);
    }
    if begins.is_empty() {
        return None;
    }
    Some((*begins.iter().min()?, *ends.iter().max()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<uniprot xmlns="http://uniprot.org/uniprot">
  <entry dataset="Swiss-Prot">
    <accession>P00698</accession>
    <accession>Q90X14</accession>
    <name>LYSC_CHICK</name>
    <sequence length="10" checksum="X" modified="2024-01-01" version="1">KVFGRCELAA</sequence>
    <dbReference type="PDB" id="1LMA">
      <property type="method" value="X-ray"/>
      <property type="resolution" value="1.80 A"/>
      <property type="chains" value="A=1-10"/>
    </dbReference>
    <dbReference type="PDB" id="1AKI">
      <property type="method" value="NMR"/>
      <property type="chains" value="A/B=1-10, C=2-5"/>
    </dbReference>
  </entry>
</uniprot>"#;

    #[test]
    fn parses_accessions_sequence_and_references() {
        let refmap = RefMap::parse(SAMPLE_XML).unwrap();
        assert_eq!(refmap.accessions(), &["P00698", "Q90X14"]);
        assert_eq!(refmap.sequence(), "KVFGRCELAA");
        assert_eq!(refmap.references(None).len(), 2);
    }

    #[test]
    fn method_filter_selects_xray_only() {
        let refmap = RefMap::parse(SAMPLE_XML).unwrap();
        let xray = refmap.references(Some("X-ray"));
        assert_eq!(xray.len(), 1);
        assert_eq!(xray[0].id, "1LMA");
        assert_eq!(xray[0].resolution.as_deref(), Some("1.80 A"));
    }

    #[test]
    fn nmr_reference_has_no_resolution() {
        let refmap = RefMap::parse(SAMPLE_XML).unwrap();
        let nmr = refmap.references(Some("NMR"));
        assert_eq!(nmr.len(), 1);
        assert_eq!(nmr[0].resolution, None);
    }

    #[test]
    fn range_collapses_multiple_segments() {
        let refmap = RefMap::parse(SAMPLE_XML).unwrap();
        assert_eq!(refmap.range("1LMA"), Some((1, 10)));
        assert_eq!(refmap.range("1AKI"), Some((1, 10)));
    }

    #[test]
    fn empty_method_filter_passes_all() {
        let refmap = RefMap::parse(SAMPLE_XML).unwrap();
        assert_eq!(refmap.references(Some("")).len(), 2);
    }
}
