use anyhow::bail;
use log::{debug, info};
use ordered_float::OrderedFloat;

use crate::alignment::Alignment;
use crate::substitution_models::{compute_aicc, ModelCandidate, ModelTable, MODEL_TABLE};
use crate::Result;

mod phyml;
pub use phyml::*;

/// Capability of running maximum-likelihood tree inference for one alignment and one model.
///
/// `directive` is the model's run directive from the [`ModelTable`]. Returns the
/// log-likelihood of the inferred tree and the tree itself in Newick format.
pub trait ExternalInferenceTool: Sync {
    fn run(&self, alignment: &Alignment, directive: &str) -> Result<(f64, String)>;
}

/// Outcome of evaluating one model candidate against an alignment.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResult {
    pub model: String,
    pub log_likelihood: f64,
    pub aicc: f64,
    pub tree: String,
}

/// Picks the substitution model that best fits an alignment by AICc.
///
/// Every candidate of the model table is run through the inference tool once, results are
/// kept in evaluation order and reused by all later queries on the same selector.
pub struct ModelSelector<'a, T: ExternalInferenceTool + ?Sized> {
    alignment: &'a Alignment,
    tool: &'a T,
    table: &'a ModelTable,
    count_branches: bool,
    results: Option<Vec<ModelResult>>,
}

impl<'a, T: ExternalInferenceTool + ?Sized> ModelSelector<'a, T> {
    /// Creates a selector over the default [`MODEL_TABLE`], counting branch lengths as
    /// AICc parameters.
    pub fn new(alignment: &'a Alignment, tool: &'a T) -> ModelSelector<'a, T> {
        ModelSelector {
            alignment,
            tool,
            table: &MODEL_TABLE,
            count_branches: true,
            results: None,
        }
    }

    /// Replaces the model table candidates are drawn from.
    pub fn table(mut self, table: &'a ModelTable) -> ModelSelector<'a, T> {
        self.table = table;
        self.results = None;
        self
    }

    /// Sets whether the `2 * taxa - 3` branch lengths count as free parameters in AICc.
    pub fn count_branches(mut self, count_branches: bool) -> ModelSelector<'a, T> {
        self.count_branches = count_branches;
        self.results = None;
        self
    }

    /// Evaluates all candidates of the model table, in table order.
    ///
    /// The first failing candidate aborts the whole evaluation and its error is returned,
    /// nothing is cached in that case. Once successful, the results are memoised.
    pub fn evaluate_all(&mut self) -> Result<&[ModelResult]> {
        if self.results.is_none() {
            info!(
                "Evaluating {} models on an alignment of {} taxa and {} sites",
                self.table.len(),
                self.alignment.taxa_count(),
                self.alignment.site_count()
            );
            let results = self
                .table
                .iter()
                .map(|candidate| self.evaluate(candidate))
                .collect::<Result<Vec<_>>>()?;
            self.results = Some(results);
        }
        Ok(self.results.as_deref().unwrap_or_default())
    }

    fn evaluate(&self, candidate: &ModelCandidate) -> Result<ModelResult> {
        let (log_likelihood, tree) = self.tool.run(self.alignment, candidate.directive)?;
        let aicc = compute_aicc(
            log_likelihood,
            candidate.free_params,
            self.alignment.site_count(),
            self.alignment.taxa_count(),
            self.count_branches,
        )?;
        debug!("{}: lnL {log_likelihood}, AICc {aicc}", candidate.name);
        Ok(ModelResult {
            model: candidate.name.to_string(),
            log_likelihood,
            aicc,
            tree,
        })
    }

    /// Result with the lowest AICc. Ties go to the candidate evaluated first.
    pub fn best(&mut self) -> Result<&ModelResult> {
        let results = self.evaluate_all()?;
        match results.iter().min_by_key(|result| OrderedFloat(result.aicc)) {
            Some(best) => {
                info!("Best model is {} with AICc {}", best.model, best.aicc);
                Ok(best)
            }
            None => bail!("Model table is empty, no model to select"),
        }
    }

    pub fn best_model(&mut self) -> Result<String> {
        Ok(self.best()?.model.clone())
    }

    /// Log-likelihood and tree of the best model.
    pub fn best_tree(&mut self) -> Result<(f64, String)> {
        let best = self.best()?;
        Ok((best.log_likelihood, best.tree.clone()))
    }

    pub fn best_model_and_tree(&mut self) -> Result<(String, String)> {
        let best = self.best()?;
        Ok((best.model.clone(), best.tree.clone()))
    }

    /// All results ordered by ascending AICc, ties kept in evaluation order.
    pub fn aicc_table(&mut self) -> Result<Vec<ModelResult>> {
        let mut table = self.evaluate_all()?.to_vec();
        table.sort_by_key(|result| OrderedFloat(result.aicc));
        Ok(table)
    }

    /// Runs the inference tool once for the named model, without evaluating the others.
    /// Bails with an invalid model error if the name is not in the model table.
    pub fn run(&self, model: &str) -> Result<(f64, String)> {
        let candidate = self.table.candidate(model)?;
        info!("Running model {model}");
        self.tool.run(self.alignment, candidate.directive)
    }
}
