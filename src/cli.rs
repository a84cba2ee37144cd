use std::fmt::{self, Display};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::LevelFilter;

use cloudforest::model_selection::PhymlTool;
use cloudforest::pipeline::{full_analysis, PipelineConfig, Stage};
use cloudforest::substitution_models::MODEL_TABLE;

use crate::Result;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Cli {
    /// Input file with one oneliner or dataset line per line, optionally keyed as "<key>\t<line>"
    #[arg(short, long, value_name = "INPUT_FILE")]
    pub(super) input: PathBuf,

    /// Output file, must not exist yet
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    pub(super) output: PathBuf,

    /// PhyML executable
    #[arg(long, value_name = "PHYML", default_value = "phyml")]
    pub(super) phyml: PathBuf,

    /// Extra argument passed to PhyML, can be repeated
    #[arg(long = "phyml-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub(super) phyml_args: Vec<String>,

    /// Directory in which per-run scratch directories are created
    #[arg(long, value_name = "SCRATCH_DIR")]
    pub(super) scratch: Option<PathBuf>,

    /// Seconds after which a PhyML run is killed, 0 for no limit
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    pub(super) timeout: u64,

    /// Substitution model for loci that do not name one
    #[arg(short, long, value_name = "MODEL", default_value = "GTR")]
    pub(super) model: String,

    /// Base seed for bootstrap replicates
    #[arg(long, value_name = "SEED")]
    pub(super) seed: Option<u64>,

    /// Do not count branch lengths as free parameters in AICc
    #[arg(long)]
    pub(super) no_branch_params: bool,

    /// Logging level
    #[arg(long, value_name = "LEVEL", default_value_t = LevelFilter::Info)]
    pub(super) log_level: LevelFilter,

    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub(super) enum Commands {
    /// Infers a tree per locus under the model named in its metadata
    GeneTrees,
    /// Selects the best substitution model per locus by AICc and outputs its tree
    BestModel {
        /// Output the locus oneliner annotated with the best model instead of the tree
        #[arg(long)]
        oneliners: bool,
    },
    /// Repeats every line once per bootstrap replicate
    Duplicate {
        #[arg(short, long, default_value_t = 500)]
        bootreps: usize,
    },
    /// Joins lines sharing a key into one dataset line
    Concatenate,
    /// Resamples every dataset line into one bootstrap replicate
    Bootstrap,
    /// Best models, then gene trees for every bootstrap replicate
    Full {
        #[arg(short, long, default_value_t = 500)]
        bootreps: usize,
    },
}

impl Commands {
    fn stages(&self) -> Vec<Stage> {
        match self {
            Commands::GeneTrees => vec![Stage::GeneTrees],
            Commands::BestModel { oneliners: false } => vec![Stage::BestModelTrees],
            Commands::BestModel { oneliners: true } => vec![Stage::BestModelOneliners],
            Commands::Duplicate { bootreps } => vec![Stage::Duplicate(*bootreps)],
            Commands::Concatenate => vec![Stage::Concatenate],
            Commands::Bootstrap => vec![Stage::Bootstrap],
            Commands::Full { bootreps } => full_analysis(*bootreps),
        }
    }

    fn bootreps(&self) -> Option<usize> {
        match self {
            Commands::Duplicate { bootreps } | Commands::Full { bootreps } => Some(*bootreps),
            _ => None,
        }
    }
}

pub(super) struct ConfigBuilder {
    cli: Cli,
}

impl From<Cli> for ConfigBuilder {
    fn from(cli: Cli) -> Self {
        ConfigBuilder { cli }
    }
}

impl ConfigBuilder {
    /// Validates the command line values and assembles the run configuration.
    pub(super) fn setup(self) -> Result<Config> {
        let cli = self.cli;
        if !cli.input.is_file() {
            bail!("Input file {} does not exist", cli.input.display());
        }
        if cli.output.exists() {
            bail!("Output file {} already exists", cli.output.display());
        }
        if let Some(scratch) = &cli.scratch {
            if !scratch.is_dir() {
                bail!("Scratch directory {} does not exist", scratch.display());
            }
        }
        MODEL_TABLE.candidate(&cli.model)?;
        if cli.command.bootreps() == Some(0) {
            bail!("Number of bootstrap replicates must be positive");
        }

        let timeout = (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout));
        Ok(Config {
            stages: cli.command.stages(),
            tool: PhymlTool::new(cli.phyml)
                .args(cli.phyml_args)
                .scratch_root(cli.scratch)
                .timeout(timeout),
            pipeline: PipelineConfig {
                default_model: cli.model,
                seed: cli.seed,
                count_branches: !cli.no_branch_params,
            },
            input: cli.input,
            output: cli.output,
        })
    }
}

pub(super) struct Config {
    pub(super) input: PathBuf,
    pub(super) output: PathBuf,
    pub(super) stages: Vec<Stage>,
    pub(super) tool: PhymlTool,
    pub(super) pipeline: PipelineConfig,
}

impl Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Input file: {}", self.input.display())?;
        writeln!(f, "  Output file: {}", self.output.display())?;
        writeln!(f, "  Stages: {}", self.stages.iter().join(" -> "))?;
        writeln!(f, "  Inference tool: {:?}", self.tool)?;
        writeln!(f, "  Default model: {}", self.pipeline.default_model)?;
        match self.pipeline.seed {
            Some(seed) => writeln!(f, "  Seed: {seed}")?,
            None => writeln!(f, "  Seed: from entropy")?,
        }
        write!(
            f,
            "  Branch lengths counted in AICc: {}",
            self.pipeline.count_branches
        )
    }
}
