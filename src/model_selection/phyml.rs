use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use log::{debug, warn};
use tempfile::{Builder, TempDir};

use crate::alignment::Alignment;
use crate::errors::ForestError;
use crate::io::to_fixed_width_text;
use crate::model_selection::ExternalInferenceTool;
use crate::Result;

/// Name of the alignment file written into the scratch directory. PhyML names its outputs
/// after it.
pub const ALIGNMENT_FILE: &str = "locus.phylip";
pub const STATS_SUFFIX: &str = "_phyml_stats.txt";
pub const TREE_SUFFIX: &str = "_phyml_tree.txt";
const STDERR_FILE: &str = "phyml.stderr";
const LOGL_MARKER: &str = "Log-likelihood:";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs PhyML as a child process, one fresh scratch directory per run.
///
/// The alignment is written as fixed-width text and PhyML is driven through its interactive
/// menu: the file name and the model directive are sent on stdin. The scratch directory is
/// removed on every exit path, so concurrent runs never share output files.
#[derive(Clone, Debug, PartialEq)]
pub struct PhymlTool {
    executable: PathBuf,
    args: Vec<String>,
    scratch_root: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl PhymlTool {
    /// Creates a tool running `executable` with no extra arguments, scratch directories in
    /// the system temporary directory and no timeout.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use cloudforest::model_selection::PhymlTool;
    /// let tool = PhymlTool::new("phyml")
    ///     .scratch_root(Some(std::env::temp_dir()))
    ///     .timeout(Some(Duration::from_secs(600)));
    /// ```
    pub fn new(executable: impl Into<PathBuf>) -> PhymlTool {
        PhymlTool {
            executable: executable.into(),
            args: Vec::new(),
            scratch_root: None,
            timeout: None,
        }
    }

    /// Extra arguments passed before anything is written on stdin.
    pub fn args(mut self, args: Vec<String>) -> PhymlTool {
        self.args = args;
        self
    }

    /// Directory in which per-run scratch directories are created.
    pub fn scratch_root(mut self, scratch_root: Option<PathBuf>) -> PhymlTool {
        self.scratch_root = scratch_root;
        self
    }

    /// Maximum wall time of one run, the process is killed once it is exceeded.
    pub fn timeout(mut self, timeout: Option<Duration>) -> PhymlTool {
        self.timeout = timeout;
        self
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = Builder::new();
        builder.prefix("cloudforest-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|e| {
            ForestError::ToolInvocation(format!("Cannot create scratch directory: {e}")).into()
        })
    }

    fn program(&self) -> Result<PathBuf> {
        // The child runs inside the scratch directory, relative paths would resolve there.
        if self.executable.is_relative() && self.executable.components().count() > 1 {
            return Ok(std::path::absolute(&self.executable)?);
        }
        Ok(self.executable.clone())
    }

    fn run_in(&self, dir: &Path, alignment: &Alignment, directive: &str) -> Result<(f64, String)> {
        fs::write(dir.join(ALIGNMENT_FILE), to_fixed_width_text(&alignment.pairs())?)?;
        let stderr = File::create(dir.join(STDERR_FILE))?;

        let program = self.program()?;
        debug!("Launching {} in {}", program.display(), dir.display());
        let mut command = Command::new(&program);
        command
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));
        // Own process group, so a timeout also stops anything a wrapper script started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|e| {
            ForestError::ToolInvocation(format!("Cannot launch {}: {e}", program.display()))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // PhyML may exit before consuming the whole menu input.
            if let Err(e) = stdin.write_all(format!("{ALIGNMENT_FILE}\n{directive}").as_bytes()) {
                debug!("Could not write the full directive to stdin: {e}");
            }
        }

        let stats_file = format!("{ALIGNMENT_FILE}{STATS_SUFFIX}");
        let tree_file = format!("{ALIGNMENT_FILE}{TREE_SUFFIX}");
        match self.wait(&mut child)? {
            None => bail!(ForestError::MissingOutput {
                artifact: tree_file,
                reason: format!(
                    "timed out after {}s",
                    self.timeout.unwrap_or_default().as_secs_f64()
                ),
            }),
            Some(status) if !status.success() => {
                log_stderr(dir);
                bail!(ForestError::MissingOutput {
                    artifact: stats_file,
                    reason: format!("{} exited with {status}", program.display()),
                })
            }
            Some(_) => {}
        }

        let log_likelihood = parse_log_likelihood(&read_artifact(dir, &stats_file)?)
            .map_err(|reason| ForestError::MissingOutput {
                artifact: stats_file,
                reason,
            })?;
        let tree = parse_tree(&read_artifact(dir, &tree_file)?).ok_or_else(|| {
            ForestError::MissingOutput {
                artifact: tree_file,
                reason: String::from("file holds no tree"),
            }
        })?;
        Ok((log_likelihood, tree))
    }

    fn wait(&self, child: &mut Child) -> Result<Option<ExitStatus>> {
        let Some(timeout) = self.timeout else {
            return Ok(Some(child.wait().map_err(wait_error)?));
        };
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(wait_error)? {
                return Ok(Some(status));
            }
            if start.elapsed() >= timeout {
                warn!("PhyML exceeded {timeout:?}, killing process {}", child.id());
                if let Err(e) = kill_process_tree(child) {
                    warn!("Could not stop process {}: {e}", child.id());
                }
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ExternalInferenceTool for PhymlTool {
    fn run(&self, alignment: &Alignment, directive: &str) -> Result<(f64, String)> {
        let scratch = self.scratch_dir()?;
        let result = self.run_in(scratch.path(), alignment, directive);
        let path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("Could not remove scratch directory {}: {e}", path.display());
        }
        result
    }
}

/// Kills the child together with its process group on Unix, or the child alone elsewhere or
/// when the group cannot be signalled, then reaps it.
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => return child.wait().map(|_| ()),
            Ok(status) => debug!("kill of process group {group} exited with {status}"),
            Err(e) => debug!("Cannot run kill for process group {group}: {e}"),
        }
    }
    child.kill()?;
    child.wait().map(|_| ())
}

fn wait_error(e: std::io::Error) -> anyhow::Error {
    ForestError::ToolInvocation(format!("Cannot wait for PhyML: {e}")).into()
}

fn read_artifact(dir: &Path, name: &str) -> Result<String> {
    let content = fs::read_to_string(dir.join(name)).map_err(|e| ForestError::MissingOutput {
        artifact: name.to_string(),
        reason: e.to_string(),
    })?;
    if content.trim().is_empty() {
        bail!(ForestError::MissingOutput {
            artifact: name.to_string(),
            reason: String::from("file is empty"),
        });
    }
    Ok(content)
}

fn log_stderr(dir: &Path) {
    match fs::read_to_string(dir.join(STDERR_FILE)) {
        Ok(stderr) if !stderr.trim().is_empty() => warn!("PhyML stderr:\n{}", stderr.trim_end()),
        _ => {}
    }
}

/// Extracts the log-likelihood from the content of a PhyML statistics file, i.e. the value
/// following the first `Log-likelihood:` marker.
pub fn parse_log_likelihood(stats: &str) -> std::result::Result<f64, String> {
    let value = stats
        .lines()
        .find_map(|line| line.split_once(LOGL_MARKER).map(|(_, value)| value.trim()))
        .ok_or_else(|| String::from("no log-likelihood found"))?;
    value
        .parse::<f64>()
        .map_err(|_| format!("cannot parse log-likelihood '{value}'"))
}

/// Extracts the Newick tree from the content of a PhyML tree file.
pub fn parse_tree(content: &str) -> Option<String> {
    let tree = content.trim().trim_matches('"').trim();
    (!tree.is_empty()).then(|| tree.to_string())
}
