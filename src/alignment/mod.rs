use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display};

use anyhow::bail;
use nalgebra::DMatrix;

use crate::errors::format_error;
use crate::sequences::is_residue_word;
use crate::Result;

/// Key/value annotations carried by a locus, e.g. `chrm` (locus id) and `model`.
/// Kept in a sorted map so that every serialisation is canonical.
pub type Metadata = BTreeMap<String, String>;

/// Taxon label and sequence literal pairs in record order.
pub type TaxonPairs = Vec<(String, String)>;

/// Rows are taxa, columns are aligned sites.
pub type SiteMatrix = DMatrix<u8>;

pub const MAX_LABEL_LEN: usize = 8;

pub const MODEL_KEY: &str = "model";
pub const LOGL_KEY: &str = "lnL";

/// A single locus: an ordered set of taxa with equal-length aligned sequences plus metadata.
///
/// Alignments are immutable once built; resampling and model selection only ever produce
/// new instances.
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    metadata: Metadata,
    taxa: Vec<String>,
    seqs: Vec<String>,
}

impl Alignment {
    /// Builds an alignment from metadata and taxon/sequence pairs.
    /// Bails with a format error if there are no taxa, a label is empty, too long, repeated
    /// or contains a record separator, or if the sequences are empty, not over the residue
    /// alphabet or of different lengths.
    ///
    /// # Example
    /// ```
    /// use cloudforest::alignment::{Alignment, Metadata};
    /// let pairs = vec![
    ///     (String::from("A"), String::from("ACGT")),
    ///     (String::from("B"), String::from("ACGA")),
    /// ];
    /// let alignment = Alignment::new(Metadata::new(), pairs).unwrap();
    /// assert_eq!(alignment.taxa_count(), 2);
    /// assert_eq!(alignment.site_count(), 4);
    /// ```
    pub fn new(metadata: Metadata, pairs: TaxonPairs) -> Result<Alignment> {
        validate_pairs(&pairs)?;
        let (taxa, seqs): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        Ok(Alignment {
            metadata,
            taxa,
            seqs,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    pub fn seqs(&self) -> &[String] {
        &self.seqs
    }

    pub fn taxa_count(&self) -> usize {
        self.taxa.len()
    }

    pub fn site_count(&self) -> usize {
        self.seqs[0].len()
    }

    /// Returns the taxon/sequence pairs in taxon order.
    pub fn pairs(&self) -> TaxonPairs {
        self.taxa
            .iter()
            .cloned()
            .zip(self.seqs.iter().cloned())
            .collect()
    }

    /// Returns the residues of site `idx` for every taxon, top to bottom.
    pub fn column(&self, idx: usize) -> Vec<u8> {
        self.seqs.iter().map(|seq| seq.as_bytes()[idx]).collect()
    }

    pub fn model(&self) -> Option<&str> {
        self.metadata.get(MODEL_KEY).map(String::as_str)
    }

    /// Returns a copy of the alignment with different metadata.
    pub fn with_metadata(&self, metadata: Metadata) -> Alignment {
        Alignment {
            metadata,
            taxa: self.taxa.clone(),
            seqs: self.seqs.clone(),
        }
    }

    /// Converts the alignment into its site matrix, see [`to_matrix`].
    pub fn to_matrix(&self) -> Result<(Vec<String>, SiteMatrix)> {
        to_matrix(&self.pairs())
    }

    /// Builds a new alignment with the given metadata from a taxon order and a site matrix.
    pub fn from_matrix(
        metadata: Metadata,
        taxa: &[String],
        matrix: &SiteMatrix,
    ) -> Result<Alignment> {
        Alignment::new(metadata, from_matrix(taxa, matrix)?)
    }
}

impl Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (taxon, seq) in self.taxa.iter().zip(self.seqs.iter()) {
            writeln!(f, "{taxon}\t{seq}")?;
        }
        Ok(())
    }
}

fn validate_pairs(pairs: &TaxonPairs) -> Result<()> {
    if pairs.is_empty() {
        bail!(format_error("Alignment has no taxa"));
    }
    let mut seen = HashSet::with_capacity(pairs.len());
    for (taxon, _) in pairs {
        validate_label(taxon)?;
        if !seen.insert(taxon.as_str()) {
            bail!(format_error(format!("Duplicate taxon label {taxon}")));
        }
    }
    let nsites = pairs[0].1.len();
    if nsites == 0 {
        bail!(format_error(format!("Empty sequence for taxon {}", pairs[0].0)));
    }
    for (taxon, seq) in pairs {
        if seq.len() != nsites {
            bail!(format_error(format!(
                "Sequence for taxon {taxon} has length {}, expected {nsites}",
                seq.len()
            )));
        }
        if !is_residue_word(seq.as_bytes()) {
            bail!(format_error(format!(
                "Invalid genetic sequence encountered for taxon {taxon}"
            )));
        }
    }
    Ok(())
}

fn validate_label(taxon: &str) -> Result<()> {
    if taxon.is_empty() {
        bail!(format_error("Empty taxon label"));
    }
    if taxon.len() > MAX_LABEL_LEN {
        bail!(format_error(format!(
            "Taxon label {taxon} is longer than {MAX_LABEL_LEN} characters"
        )));
    }
    if taxon
        .chars()
        .any(|c| c.is_whitespace() || c == ',' || c == ':' || c == ';')
    {
        bail!(format_error(format!(
            "Taxon label {taxon} contains a reserved character"
        )));
    }
    Ok(())
}

/// Converts taxon/sequence pairs into the taxon order and a site matrix with one row per
/// taxon and one column per aligned site.
/// Bails with a format error if there are no taxa, if a sequence is not ASCII or if the
/// sequence lengths differ.
pub fn to_matrix(pairs: &TaxonPairs) -> Result<(Vec<String>, SiteMatrix)> {
    if pairs.is_empty() {
        bail!(format_error("Alignment has no taxa"));
    }
    let nsites = pairs[0].1.len();
    let mut data = Vec::with_capacity(pairs.len() * nsites);
    for (taxon, seq) in pairs {
        if !seq.is_ascii() {
            bail!(format_error(format!(
                "Non-ascii character found in sequence for taxon {taxon}"
            )));
        }
        if seq.len() != nsites {
            bail!(format_error(format!(
                "Sequence for taxon {taxon} has length {}, expected {nsites}",
                seq.len()
            )));
        }
        data.extend_from_slice(seq.as_bytes());
    }
    let taxa = pairs.iter().map(|(taxon, _)| taxon.clone()).collect();
    Ok((taxa, SiteMatrix::from_row_slice(pairs.len(), nsites, &data)))
}

/// Exact inverse of [`to_matrix`]: row `i` of the matrix becomes the sequence of `taxa[i]`.
pub fn from_matrix(taxa: &[String], matrix: &SiteMatrix) -> Result<TaxonPairs> {
    if taxa.len() != matrix.nrows() {
        bail!(format_error(format!(
            "Got {} taxa for a matrix with {} rows",
            taxa.len(),
            matrix.nrows()
        )));
    }
    taxa.iter()
        .zip(matrix.row_iter())
        .map(|(taxon, row)| -> Result<(String, String)> {
            let seq = String::from_utf8(row.iter().copied().collect())
                .map_err(|_| format_error(format!("Non-ascii row for taxon {taxon}")))?;
            Ok((taxon.clone(), seq))
        })
        .collect()
}

/// All loci of a multi-locus dataset in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiLocusDataset {
    pub loci: Vec<Alignment>,
}

impl MultiLocusDataset {
    pub fn new(loci: Vec<Alignment>) -> MultiLocusDataset {
        MultiLocusDataset { loci }
    }

    pub fn len(&self) -> usize {
        self.loci.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loci.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alignment> {
        self.loci.iter()
    }
}
