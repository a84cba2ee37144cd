use anyhow::bail;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alignment::{Alignment, MultiLocusDataset, SiteMatrix, MODEL_KEY};
use crate::errors::format_error;
use crate::Result;

/// One resampled copy of a multi-locus dataset, tagged with its replicate index.
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapReplicate {
    pub index: usize,
    pub loci: Vec<Alignment>,
}

impl BootstrapReplicate {
    pub fn len(&self) -> usize {
        self.loci.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loci.is_empty()
    }
}

/// Creates the generator for a single replicate.
///
/// With a base seed the generator depends only on the seed, the replicate index and the
/// stream (the position of the replicate's input line), so replicates come out identical no
/// matter which worker produces them. The three are mixed rather than added: seed 1 with
/// replicate 2 and seed 2 with replicate 1 get unrelated generators, and so do two lines
/// carrying the same replicate index. Without a seed the generator is drawn from system
/// entropy. Generators must never be shared between workers.
pub fn replicate_rng(seed: Option<u64>, replicate: usize, stream: usize) -> StdRng {
    match seed {
        Some(seed) => {
            let state = mix_seed(mix_seed(mix_seed(seed) ^ replicate as u64) ^ stream as u64);
            StdRng::seed_from_u64(state)
        }
        None => StdRng::from_entropy(),
    }
}

/// SplitMix64 step.
fn mix_seed(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draws `n` indices uniformly from `[0, n)` with replacement.
fn draw_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Resamples whole loci with replacement.
///
/// Draws as many indices as there are loci and returns the selected loci in draw order
/// together with the drawn indices, so that `resampled[k] == loci[indices[k]]`.
pub fn resample_loci<R: Rng + ?Sized>(
    loci: &[Alignment],
    rng: &mut R,
) -> (Vec<Alignment>, Vec<usize>) {
    let indices = draw_indices(loci.len(), rng);
    let resampled = indices.iter().map(|&i| loci[i].clone()).collect();
    (resampled, indices)
}

/// Resamples the sites (columns) of an alignment with replacement.
///
/// Column `k` of the result is column `indices[k]` of the input for every taxon at once, so
/// residues that share a column stay together. Metadata and taxon order are kept.
pub fn resample_sites<R: Rng + ?Sized>(
    alignment: &Alignment,
    rng: &mut R,
) -> Result<(Alignment, Vec<usize>)> {
    let (taxa, matrix) = alignment.to_matrix()?;
    let indices = draw_indices(matrix.ncols(), rng);
    let resampled = select_columns(&matrix, &indices)?;
    let alignment = Alignment::from_matrix(alignment.metadata().clone(), &taxa, &resampled)?;
    Ok((alignment, indices))
}

fn select_columns(matrix: &SiteMatrix, indices: &[usize]) -> Result<SiteMatrix> {
    if let Some(&idx) = indices.iter().find(|&&idx| idx >= matrix.ncols()) {
        bail!(format_error(format!(
            "Column {idx} is out of range for {} sites",
            matrix.ncols()
        )));
    }
    Ok(SiteMatrix::from_fn(
        matrix.nrows(),
        indices.len(),
        |row, col| matrix[(row, indices[col])],
    ))
}

/// Generates one bootstrap replicate of a dataset.
///
/// Loci are resampled first, then every selected locus has its sites resampled with its
/// own draw. Each produced locus keeps the metadata of its source; a locus without a model
/// gets `default_model`.
pub fn generate_replicate<R: Rng + ?Sized>(
    dataset: &MultiLocusDataset,
    index: usize,
    default_model: &str,
    rng: &mut R,
) -> Result<BootstrapReplicate> {
    if dataset.is_empty() {
        bail!(format_error("Cannot bootstrap a dataset without loci"));
    }
    let (loci, locus_indices) = resample_loci(&dataset.loci, rng);
    debug!("Replicate {index}: resampled loci {locus_indices:?}");

    let loci = loci
        .iter()
        .map(|locus| -> Result<Alignment> {
            let (resampled, _) = resample_sites(locus, &mut *rng)?;
            let mut metadata = locus.metadata().clone();
            metadata
                .entry(MODEL_KEY.to_string())
                .or_insert_with(|| default_model.to_string());
            Ok(resampled.with_metadata(metadata))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BootstrapReplicate { index, loci })
}
