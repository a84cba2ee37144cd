use std::result::Result::Ok;

use anyhow::{anyhow, bail, Error};
use clap::Parser;
use ftail::Ftail;
use log::info;

use cloudforest::io::{read_lines_from_file, write_lines_to_file};
use cloudforest::pipeline::{run_pipeline, KeyedLine};

mod cli;
use crate::cli::{Cli, ConfigBuilder};

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => error.exit(),
        Err(error) => {
            bail!("Unable to parse command line arguments: \n {}", error)
        }
    };
    Ftail::new()
        .console(cli.log_level)
        .init()
        .map_err(|e| anyhow!("Unable to set up logging: {e:?}"))?;
    info!("Successfully parsed the command line parameters");

    let cfg_build: ConfigBuilder = cli.into();
    let cfg = cfg_build.setup()?;

    info!("CloudForest run started.");
    info!("{}", cfg);

    let lines: Vec<KeyedLine> = read_lines_from_file(&cfg.input)?
        .iter()
        .map(|line| KeyedLine::parse(line))
        .collect();
    let output = run_pipeline(&cfg.stages, lines, &cfg.tool, &cfg.pipeline)?;

    info!("Putting {} result line(s) in {}", output.len(), cfg.output.display());
    let output: Vec<String> = output.iter().map(ToString::to_string).collect();
    write_lines_to_file(&output, &cfg.output)?;

    Ok(())
}
