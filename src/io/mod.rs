use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::bail;
use itertools::Itertools;
use log::info;

use crate::alignment::{Alignment, Metadata, MultiLocusDataset, TaxonPairs, MODEL_KEY};
use crate::errors::format_error;
use crate::Result;

/// Column at which sequence data starts in fixed-width alignment text, minus one.
/// Strict PHYLIP expects the first character state on column 11.
pub const LABEL_WIDTH: usize = 10;

const RECORD_END: char = ';';
const METADATA_SEP: char = ':';

/// Splits a oneliner record into its metadata and taxon/sequence pairs.
///
/// The record is `<k1=v1,k2=v2,...>:<taxon1,seq1,taxon2,seq2,...>;`; the trailing `;` and
/// surrounding whitespace are optional. A record without `:` has no metadata.
/// Bails with a format error if a metadata token is not a single `key=value`, if the payload
/// is empty or if the payload does not alternate taxa and sequences.
///
/// # Example
/// ```
/// use cloudforest::io::decode;
/// let (metadata, pairs) = decode("chrm=chr1_1036,model=GTR:A,ACGT,B,ACGA;").unwrap();
/// assert_eq!(metadata["chrm"], "chr1_1036");
/// assert_eq!(metadata["model"], "GTR");
/// assert_eq!(pairs[1], (String::from("B"), String::from("ACGA")));
/// ```
pub fn decode(line: &str) -> Result<(Metadata, TaxonPairs)> {
    let record = line.trim().trim_end_matches(RECORD_END).trim_end();
    let (prefix, payload) = match record.split_once(METADATA_SEP) {
        Some((prefix, payload)) => (prefix, payload),
        None => ("", record),
    };
    Ok((decode_metadata(prefix)?, decode_payload(payload)?))
}

/// Same as [`decode`], but inserts `model=<default_model>` when the record names no model.
pub fn decode_with_default_model(
    line: &str,
    default_model: &str,
) -> Result<(Metadata, TaxonPairs)> {
    let (mut metadata, pairs) = decode(line)?;
    metadata
        .entry(MODEL_KEY.to_string())
        .or_insert_with(|| default_model.to_string());
    Ok((metadata, pairs))
}

fn decode_metadata(prefix: &str) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    if prefix.trim().is_empty() {
        return Ok(metadata);
    }
    for token in prefix.split(',') {
        let mut parts = token.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.is_empty() => {
                metadata.insert(key.to_string(), value.to_string());
            }
            _ => bail!(format_error(format!(
                "Metadata token '{token}' is not a single key=value pair"
            ))),
        }
    }
    Ok(metadata)
}

fn decode_payload(payload: &str) -> Result<TaxonPairs> {
    if payload.trim().is_empty() {
        bail!(format_error("Record contains no alignment payload"));
    }
    let tokens: Vec<&str> = payload.split(',').collect();
    if tokens.len() % 2 != 0 {
        bail!(format_error(format!(
            "Payload has {} tokens, expected alternating taxa and sequences",
            tokens.len()
        )));
    }
    Ok(tokens
        .into_iter()
        .tuples::<(&str, &str)>()
        .map(|(taxon, seq)| (taxon.trim().to_string(), seq.trim().to_string()))
        .collect())
}

/// Serialises metadata and taxon/sequence pairs into a canonical oneliner record.
///
/// Metadata keys are emitted in lexicographic order, pairs in the order supplied.
/// Bails with a format error if the record could not be decoded back to the same data: a
/// key, value, taxon or sequence containing one of the record separators or padded with
/// whitespace, an empty key, or no pairs at all.
///
/// # Example
/// ```
/// use cloudforest::alignment::Metadata;
/// use cloudforest::io::encode;
/// let mut metadata = Metadata::new();
/// metadata.insert(String::from("model"), String::from("GTR"));
/// metadata.insert(String::from("chrm"), String::from("c1"));
/// let pairs = vec![(String::from("A"), String::from("AC"))];
/// assert_eq!(encode(&metadata, &pairs).unwrap(), "chrm=c1,model=GTR:A,AC;");
/// ```
pub fn encode(metadata: &Metadata, pairs: &TaxonPairs) -> Result<String> {
    for (key, value) in metadata {
        if key.is_empty() || !is_encodable(key, true) || !is_encodable(value, true) {
            bail!(format_error(format!(
                "Metadata entry '{key}={value}' cannot be encoded"
            )));
        }
    }
    if pairs.is_empty() {
        bail!(format_error("Cannot encode a record without taxa"));
    }
    for (taxon, seq) in pairs {
        if !is_encodable(taxon, false) || !is_encodable(seq, false) {
            bail!(format_error(format!(
                "Taxon '{taxon}' with sequence '{seq}' cannot be encoded"
            )));
        }
    }
    let prefix = metadata
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .join(",");
    let payload = pairs
        .iter()
        .map(|(taxon, seq)| format!("{taxon},{seq}"))
        .join(",");
    Ok(format!("{prefix}{METADATA_SEP}{payload}{RECORD_END}"))
}

/// Whether `token` survives decoding unchanged. `=` is only reserved inside metadata.
fn is_encodable(token: &str, in_metadata: bool) -> bool {
    let reserved = |c: char| {
        matches!(c, ',' | METADATA_SEP | RECORD_END) || (in_metadata && c == '=')
    };
    !token.contains(reserved) && token.trim() == token
}

/// Decodes a oneliner record into a validated alignment.
pub fn alignment_from_oneliner(line: &str) -> Result<Alignment> {
    let (metadata, pairs) = decode(line)?;
    Alignment::new(metadata, pairs)
}

/// Encodes an alignment as a canonical oneliner record.
pub fn alignment_to_oneliner(alignment: &Alignment) -> Result<String> {
    encode(alignment.metadata(), &alignment.pairs())
}

/// Splits a dataset line, i.e. concatenated `;`-terminated oneliners, into its records.
pub fn split_dataset(line: &str) -> Vec<&str> {
    line.trim()
        .split(RECORD_END)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .collect()
}

/// Decodes every locus of a dataset line.
pub fn dataset_from_line(line: &str) -> Result<MultiLocusDataset> {
    let loci = split_dataset(line)
        .into_iter()
        .map(alignment_from_oneliner)
        .collect::<Result<Vec<_>>>()?;
    if loci.is_empty() {
        bail!(format_error("Dataset line contains no loci"));
    }
    Ok(MultiLocusDataset::new(loci))
}

/// Encodes all loci of a dataset as one line of concatenated oneliners.
pub fn dataset_to_line(dataset: &MultiLocusDataset) -> Result<String> {
    Ok(dataset
        .iter()
        .map(alignment_to_oneliner)
        .collect::<Result<Vec<_>>>()?
        .concat())
}

/// Writes taxon/sequence pairs as fixed-width alignment text: a `<ntaxa> <nsites>` header
/// followed by one line per taxon with the label left-aligned in a [`LABEL_WIDTH`] column
/// (widened if a label would otherwise touch its sequence).
/// Bails with a format error if there are no taxa or the sequence lengths differ.
///
/// # Example
/// ```
/// use cloudforest::io::to_fixed_width_text;
/// let pairs = vec![
///     (String::from("A"), String::from("ACGT")),
///     (String::from("B"), String::from("ACGA")),
/// ];
/// let text = to_fixed_width_text(&pairs).unwrap();
/// assert_eq!(text, "2 4\nA         ACGT\nB         ACGA\n");
/// ```
pub fn to_fixed_width_text(pairs: &TaxonPairs) -> Result<String> {
    if pairs.is_empty() {
        bail!(format_error("Alignment has no taxa"));
    }
    let nsites = pairs[0].1.len();
    if let Some((taxon, seq)) = pairs.iter().find(|(_, seq)| seq.len() != nsites) {
        bail!(format_error(format!(
            "Sequence for taxon {taxon} has length {}, expected {nsites}",
            seq.len()
        )));
    }
    let width = pairs
        .iter()
        .map(|(taxon, _)| taxon.len() + 1)
        .max()
        .unwrap_or_default()
        .max(LABEL_WIDTH);
    let mut text = format!("{} {}\n", pairs.len(), nsites);
    for (taxon, seq) in pairs {
        text.push_str(&format!("{taxon:<width$}{seq}\n"));
    }
    Ok(text)
}

/// Reads fixed-width alignment text back into taxon/sequence pairs.
///
/// Sequential and interleaved layouts are accepted: the first block carries the labels,
/// later blocks continue the sequences in taxon order. Whitespace inside sequence data and
/// blank lines between blocks are ignored.
pub fn from_fixed_width_text(text: &str) -> Result<TaxonPairs> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| format_error("Empty alignment text"))?;
    let (ntaxa, nsites) = parse_header(header)?;

    let mut pairs = TaxonPairs::with_capacity(ntaxa);
    for (count, line) in lines.enumerate() {
        if count < ntaxa {
            let mut fields = line.split_whitespace();
            let taxon = fields.next().unwrap_or_default().to_string();
            pairs.push((taxon, fields.collect()));
        } else {
            let seq: String = line.split_whitespace().collect();
            pairs[count % ntaxa].1.push_str(&seq);
        }
    }
    if pairs.len() != ntaxa {
        bail!(format_error(format!(
            "Expected {ntaxa} taxa but found {}",
            pairs.len()
        )));
    }
    if let Some((taxon, seq)) = pairs.iter().find(|(_, seq)| seq.len() != nsites) {
        bail!(format_error(format!(
            "Sequence for taxon {taxon} has length {}, expected {nsites}",
            seq.len()
        )));
    }
    Ok(pairs)
}

fn parse_header(header: &str) -> Result<(usize, usize)> {
    let dims: Vec<usize> = header
        .split_whitespace()
        .map(str::parse::<usize>)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| format_error(format!("Invalid alignment header '{header}'")))?;
    match dims.as_slice() {
        [ntaxa, nsites] if *ntaxa > 0 => Ok((*ntaxa, *nsites)),
        _ => bail!(format_error(format!(
            "Invalid alignment header '{header}', expected 'ntaxa nsites'"
        ))),
    }
}

/// Reads non-empty lines from a file, typically one oneliner or dataset line each.
pub fn read_lines_from_file(path: &Path) -> Result<Vec<String>> {
    info!("Reading records from file {}", path.display());
    let content = fs::read_to_string(path)?;
    let lines: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();
    info!("Read {} record(s) successfully", lines.len());
    Ok(lines)
}

/// Writes lines to the given file path. Will return an error if the file already exists.
pub fn write_lines_to_file(lines: &[String], path: &Path) -> Result<()> {
    info!("Writing {} record(s) to file {}", lines.len(), path.display());
    if path.exists() {
        bail!(format_error(format!(
            "File {} already exists",
            path.display()
        )));
    }
    let mut writer = File::create(path)?;
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    info!("Finished writing successfully");
    Ok(())
}
