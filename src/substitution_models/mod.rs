use anyhow::bail;
use lazy_static::lazy_static;

use crate::errors::ForestError;
use crate::Result;

/// A nucleotide substitution model as understood by the inference tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelCandidate {
    pub name: &'static str,
    /// Menu keystrokes that configure PhyML for this model.
    pub directive: &'static str,
    /// Free parameters of the model, branch lengths excluded.
    pub free_params: usize,
}

/// Immutable lookup table of model candidates, in evaluation order.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelTable {
    candidates: Vec<ModelCandidate>,
}

impl ModelTable {
    pub fn new(candidates: Vec<ModelCandidate>) -> ModelTable {
        ModelTable { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelCandidate> {
        self.candidates.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.name.to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ModelCandidate> {
        self.candidates.iter().find(|c| c.name == name)
    }

    /// Same as [`ModelTable::get`], but bails with an invalid model error for unknown names.
    pub fn candidate(&self, name: &str) -> Result<&ModelCandidate> {
        match self.get(name) {
            Some(candidate) => Ok(candidate),
            None => {
                let mut available = self.names();
                available.sort();
                bail!(ForestError::InvalidModel {
                    requested: name.to_string(),
                    available,
                })
            }
        }
    }
}

macro_rules! candidate {
    ($name:expr, $directive:expr, $params:expr) => {
        ModelCandidate {
            name: $name,
            directive: $directive,
            free_params: $params,
        }
    };
}

lazy_static! {
    /// The 24 nucleotide models evaluated during model selection: JC69, F81, K2P, HKY, SYM and
    /// GTR, each plain, with invariant sites (I), gamma rates (G) and both (IG).
    /// Directives follow the PhyML menu layout used by MrAIC.
    pub static ref MODEL_TABLE: ModelTable = ModelTable::new(vec![
        candidate!("JC69", "+\nM\nM\nM\nM\nM\nR\nY\n", 0),
        candidate!("JC69I", "+\nM\nM\nM\nM\nM\nV\nY\nR\nY\n", 1),
        candidate!("JC69G", "+\nM\nM\nM\nM\nM\nY\n", 1),
        candidate!("JC69IG", "+\nM\nM\nM\nM\nM\nV\nY\nY\n", 2),
        candidate!("F81", "+\nM\nM\nM\nM\nM\nM\nM\nF\nR\nY\n", 3),
        candidate!("F81I", "+\nM\nM\nM\nM\nM\nM\nM\nF\nV\nY\nR\nY\n", 4),
        candidate!("F81G", "+\nM\nM\nM\nM\nM\nM\nM\nF\nY\n", 4),
        candidate!("F81IG", "+\nM\nM\nM\nM\nM\nM\nM\nF\nV\nY\nY\n", 5),
        candidate!("K2P", "+\nM\nM\nM\nM\nM\nM\nT\nY\nR\nY\n", 1),
        candidate!("K2PI", "+\nM\nM\nM\nM\nM\nM\nT\nY\nR\nV\nY\nY\n", 2),
        candidate!("K2PG", "+\nM\nM\nM\nM\nM\nM\nT\nY\nY\n", 2),
        candidate!("K2PIG", "+\nM\nM\nM\nM\nM\nM\nT\nY\nV\nY\nY\n", 3),
        candidate!("HKY", "+\nF\nT\nY\nR\nY\n", 4),
        candidate!("HKYI", "+\nF\nT\nY\nR\nV\nY\nY\n", 5),
        candidate!("HKYG", "+\nF\nT\nY\nY\n", 5),
        candidate!("HKYIG", "+\nF\nT\nY\nV\nY\nY\n", 6),
        candidate!(
            "SYM",
            "+\nM\nM\nM\nM\nE\n0.25\n0.25\n0.25\n0.25\nK\n012345\n1.00\n1.00\n1.00\n1.00\n1.00\n1.00\nR\nY\n",
            5
        ),
        candidate!(
            "SYMI",
            "+\nM\nM\nM\nM\nE\n0.25\n0.25\n0.25\n0.25\nK\n012345\n1.00\n1.00\n1.00\n1.00\n1.00\n1.00\nR\nV\nY\nY\n",
            6
        ),
        candidate!(
            "SYMG",
            "+\nM\nM\nM\nM\nE\n0.25\n0.25\n0.25\n0.25\nK\n012345\n1.00\n1.00\n1.00\n1.00\n1.00\n1.00\nY\n",
            6
        ),
        candidate!(
            "SYMIG",
            "+\nM\nM\nM\nM\nE\n0.25\n0.25\n0.25\n0.25\nK\n012345\n1.00\n1.00\n1.00\n1.00\n1.00\n1.00\nV\nY\nY\n",
            7
        ),
        candidate!("GTR", "+\nM\nM\nM\nF\nR\nY\n", 8),
        candidate!("GTRI", "+\nM\nM\nM\nF\nR\nV\nY\nY\n", 9),
        candidate!("GTRG", "+\nM\nM\nM\nF\nY\n", 9),
        candidate!("GTRIG", "+\nM\nM\nM\nF\nV\nY\nY\n", 10),
    ]);
}

/// Number of branch lengths of an unrooted binary tree with `taxa` leaves.
pub fn branch_count(taxa: usize) -> usize {
    (2 * taxa).saturating_sub(3)
}

/// Corrected Akaike Information Criterion of a fitted model:
/// `AICc = -2 lnL + 2k + 2k(k + 1) / (n - k - 1)`.
///
/// `n` is the number of alignment sites and `k` the free model parameters, plus the branch
/// lengths of the tree when `count_branches` is set. Bails with a domain error when
/// `n - k - 1` is not positive, i.e. the alignment is too short for the model.
///
/// # Example
/// ```
/// use cloudforest::substitution_models::compute_aicc;
/// let aicc = compute_aicc(20.0, 1, 430, 10, true).unwrap();
/// assert!((aicc - -2.335766).abs() < 1e-4);
/// ```
pub fn compute_aicc(
    log_likelihood: f64,
    free_params: usize,
    sites: usize,
    taxa: usize,
    count_branches: bool,
) -> Result<f64> {
    let k = if count_branches {
        free_params + branch_count(taxa)
    } else {
        free_params
    } as f64;
    let n = sites as f64;
    let denominator = n - k - 1.0;
    if denominator <= 0.0 {
        bail!(ForestError::Domain(format!(
            "Alignment of {sites} sites is shorter than necessary to compute AICc with {k} \
             parameters, ensure alignments are longer than (# taxa + 10)"
        )));
    }
    Ok(-2.0 * log_likelihood + 2.0 * k + (2.0 * k * (k + 1.0)) / denominator)
}

#[cfg(test)]
mod tests;
