use std::fmt;

use log::info;

use crate::alignment::{Alignment, LOGL_KEY, MODEL_KEY};
use crate::annotation::annotate;
use crate::bootstrap::{generate_replicate, replicate_rng};
use crate::io::{alignment_to_oneliner, dataset_from_line, decode, decode_with_default_model};
use crate::model_selection::{ExternalInferenceTool, ModelSelector};
use crate::Result;

/// Key under which best-model oneliners are emitted, so that a following
/// [`Stage::Concatenate`] gathers all loci into one dataset line.
pub const CONCATENATION_KEY: &str = "1";

/// A record passed between stages, optionally prefixed by a `<key>\t` grouping key.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyedLine {
    pub key: Option<String>,
    pub value: String,
}

impl KeyedLine {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> KeyedLine {
        KeyedLine {
            key: Some(key.into()),
            value: value.into(),
        }
    }

    pub fn unkeyed(value: impl Into<String>) -> KeyedLine {
        KeyedLine {
            key: None,
            value: value.into(),
        }
    }

    /// Splits off a leading `<key>\t`. Lines with no tab, or with more than one, are taken
    /// as unkeyed values.
    ///
    /// # Example
    /// ```
    /// use cloudforest::pipeline::KeyedLine;
    /// let line = KeyedLine::parse("3\tchrm=c1:A,ACGT,B,ACGA;\n");
    /// assert_eq!(line.key.as_deref(), Some("3"));
    /// assert_eq!(line.value, "chrm=c1:A,ACGT,B,ACGA;");
    /// ```
    pub fn parse(line: &str) -> KeyedLine {
        match line.split_once('\t') {
            Some((key, value)) if !value.contains('\t') => KeyedLine::new(key.trim(), value.trim()),
            _ => KeyedLine::unkeyed(line.trim()),
        }
    }
}

impl fmt::Display for KeyedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}\t{}", key, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// One step of a gene tree / bootstrap workflow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stage {
    /// Tree per locus under the model named in its metadata (or the default model).
    GeneTrees,
    /// Tree per locus under the model with the lowest AICc.
    BestModelTrees,
    /// Locus oneliner annotated with the model with the lowest AICc.
    BestModelOneliners,
    /// Every line repeated with keys `n, n - 1, ..., 1`.
    Duplicate(usize),
    /// Lines sharing a key joined into one dataset line.
    Concatenate,
    /// Dataset line resampled into one bootstrap replicate, one oneliner per locus.
    Bootstrap,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::GeneTrees => write!(f, "gene trees"),
            Stage::BestModelTrees => write!(f, "best model trees"),
            Stage::BestModelOneliners => write!(f, "best model oneliners"),
            Stage::Duplicate(reps) => write!(f, "duplicate x{reps}"),
            Stage::Concatenate => write!(f, "concatenate"),
            Stage::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

/// Stages of a complete analysis: pick the best model per locus, gather the loci into one
/// dataset, and infer gene trees for `bootreps` bootstrap replicates of it.
pub fn full_analysis(bootreps: usize) -> Vec<Stage> {
    vec![
        Stage::BestModelOneliners,
        Stage::Concatenate,
        Stage::Duplicate(bootreps),
        Stage::Bootstrap,
        Stage::GeneTrees,
    ]
}

/// Settings shared by all stages.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Model used for loci whose metadata names none.
    pub default_model: String,
    /// Base seed for bootstrap replicates, drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Count branch lengths as free parameters in AICc.
    pub count_branches: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            default_model: String::from("GTR"),
            seed: None,
            count_branches: true,
        }
    }
}

cfg_if::cfg_if! {
if #[cfg(feature = "parallel")] {
fn map_lines<R, F>(lines: &[KeyedLine], f: F) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(usize, &KeyedLine) -> Result<R> + Sync + Send,
{
    use rayon::prelude::*;
    lines
        .par_iter()
        .enumerate()
        .map(|(position, line)| f(position, line))
        .collect()
}
} else {
fn map_lines<R, F>(lines: &[KeyedLine], f: F) -> Result<Vec<R>>
where
    F: Fn(usize, &KeyedLine) -> Result<R>,
{
    lines
        .iter()
        .enumerate()
        .map(|(position, line)| f(position, line))
        .collect()
}
}
}

/// Runs a single stage over all input lines. Per-line work is independent; with the
/// `parallel` feature it is spread over the rayon thread pool. Output order follows input
/// order either way.
pub fn run_stage<T: ExternalInferenceTool + ?Sized>(
    stage: Stage,
    lines: &[KeyedLine],
    tool: &T,
    config: &PipelineConfig,
) -> Result<Vec<KeyedLine>> {
    info!("Running stage '{stage}' on {} line(s)", lines.len());
    let output = match stage {
        Stage::GeneTrees => map_lines(lines, |_, line| gene_tree(line, tool, config))?,
        Stage::BestModelTrees => map_lines(lines, |_, line| best_model_tree(line, tool, config))?,
        Stage::BestModelOneliners => {
            map_lines(lines, |_, line| best_model_oneliner(line, tool, config))?
        }
        Stage::Duplicate(reps) => lines
            .iter()
            .flat_map(|line| duplicate_oneliner(line, reps))
            .collect(),
        Stage::Concatenate => concatenate_oneliners(lines),
        Stage::Bootstrap => map_lines(lines, |position, line| {
            bootstrap_replicate(line, position, config)
        })?
        .into_iter()
        .flatten()
        .collect(),
    };
    info!("Stage '{stage}' produced {} line(s)", output.len());
    Ok(output)
}

/// Feeds the output of every stage into the next one.
pub fn run_pipeline<T: ExternalInferenceTool + ?Sized>(
    stages: &[Stage],
    lines: Vec<KeyedLine>,
    tool: &T,
    config: &PipelineConfig,
) -> Result<Vec<KeyedLine>> {
    stages
        .iter()
        .try_fold(lines, |lines, stage| run_stage(*stage, &lines, tool, config))
}

/// Infers the tree of one locus under its own model and emits it annotated with the locus
/// metadata, the model and the log-likelihood.
pub fn gene_tree<T: ExternalInferenceTool + ?Sized>(
    line: &KeyedLine,
    tool: &T,
    config: &PipelineConfig,
) -> Result<KeyedLine> {
    let (metadata, pairs) = decode_with_default_model(&line.value, &config.default_model)?;
    let alignment = Alignment::new(metadata, pairs)?;
    let model = alignment.model().unwrap_or(&config.default_model);
    let (log_likelihood, tree) = ModelSelector::new(&alignment, tool).run(model)?;

    let mut metadata = alignment.metadata().clone();
    metadata.insert(LOGL_KEY.to_string(), log_likelihood.to_string());
    Ok(KeyedLine {
        key: line.key.clone(),
        value: annotate(&tree, &metadata),
    })
}

fn select_best_model<T: ExternalInferenceTool + ?Sized>(
    line: &KeyedLine,
    tool: &T,
    config: &PipelineConfig,
) -> Result<(Alignment, String)> {
    let (metadata, pairs) = decode(&line.value)?;
    let alignment = Alignment::new(metadata, pairs)?;
    let (model, tree) = ModelSelector::new(&alignment, tool)
        .count_branches(config.count_branches)
        .best_model_and_tree()?;
    let mut metadata = alignment.metadata().clone();
    metadata.insert(MODEL_KEY.to_string(), model);
    Ok((alignment.with_metadata(metadata), tree))
}

/// Selects the best model of one locus and emits its tree annotated with that model.
pub fn best_model_tree<T: ExternalInferenceTool + ?Sized>(
    line: &KeyedLine,
    tool: &T,
    config: &PipelineConfig,
) -> Result<KeyedLine> {
    let (alignment, tree) = select_best_model(line, tool, config)?;
    Ok(KeyedLine {
        key: line.key.clone(),
        value: annotate(&tree, alignment.metadata()),
    })
}

/// Selects the best model of one locus and emits the locus oneliner with `model` set to it,
/// under [`CONCATENATION_KEY`].
pub fn best_model_oneliner<T: ExternalInferenceTool + ?Sized>(
    line: &KeyedLine,
    tool: &T,
    config: &PipelineConfig,
) -> Result<KeyedLine> {
    let (alignment, _) = select_best_model(line, tool, config)?;
    Ok(KeyedLine::new(
        CONCATENATION_KEY,
        alignment_to_oneliner(&alignment)?,
    ))
}

/// Repeats a line `reps` times, keyed `reps` down to 1.
pub fn duplicate_oneliner(line: &KeyedLine, reps: usize) -> Vec<KeyedLine> {
    (1..=reps)
        .rev()
        .map(|rep| KeyedLine::new(rep.to_string(), line.value.clone()))
        .collect()
}

/// Joins the values of lines sharing a key, in input order. Keys are emitted in order of
/// first appearance.
pub fn concatenate_oneliners(lines: &[KeyedLine]) -> Vec<KeyedLine> {
    let mut groups: Vec<KeyedLine> = Vec::new();
    for line in lines {
        match groups.iter_mut().find(|group| group.key == line.key) {
            Some(group) => group.value.push_str(&line.value),
            None => groups.push(line.clone()),
        }
    }
    groups
}

/// Turns one dataset line into one bootstrap replicate.
///
/// The replicate index is the numeric line key, or the 1-based line position when the key
/// is missing or not a number. Every resampled locus is emitted as its own oneliner under
/// the replicate index. The generator is derived from the seed, the index and `position`,
/// so lines sharing a key still get independent replicates.
pub fn bootstrap_replicate(
    line: &KeyedLine,
    position: usize,
    config: &PipelineConfig,
) -> Result<Vec<KeyedLine>> {
    let index = line
        .key
        .as_deref()
        .and_then(|key| key.parse::<usize>().ok())
        .unwrap_or(position + 1);
    let dataset = dataset_from_line(&line.value)?;
    let mut rng = replicate_rng(config.seed, index, position);
    let replicate = generate_replicate(&dataset, index, &config.default_model, &mut rng)?;
    replicate
        .loci
        .iter()
        .map(|locus| -> Result<KeyedLine> {
            Ok(KeyedLine::new(index.to_string(), alignment_to_oneliner(locus)?))
        })
        .collect()
}

#[cfg(test)]
mod tests;
