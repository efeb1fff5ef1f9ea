//! External collaborators
//!
//! The tagging/parsing engine and the trainer are opaque to the cycle. The
//! orchestrator talks to them through the traits below; the default
//! implementations spawn the command lines from the `[external]` config
//! section with `tokio::process`.

use async_trait::async_trait;
use bpt_common::config::ExternalConfig;
use bpt_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Inputs and outputs of one corpus parse
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub model: PathBuf,
    pub corpus: PathBuf,
    /// Decision trace written by the parser
    pub trace: PathBuf,
    /// Parsed corpus written by the parser
    pub output: PathBuf,
}

/// How a service shutdown completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// Exited within the grace period
    Graceful,
    /// Killed after the grace period elapsed
    Forced,
    NotRunning,
}

/// Long-running tagging/parsing service restarted between iterations
#[async_trait]
pub trait ParsingService: Send + Sync {
    async fn start(&mut self, model: &Path) -> Result<()>;

    /// Block until the service has stopped, forcing termination after `grace`
    async fn shutdown(&mut self, grace: Duration) -> Result<ShutdownKind>;
}

#[async_trait]
pub trait CorpusParser: Send + Sync {
    /// Parse the corpus with `model`, producing a fresh decision trace
    async fn parse_corpus(&self, request: &ParseRequest) -> Result<()>;

    /// Diagnostic evaluation of `model` against a held-out set
    async fn evaluate(&self, model: &Path, test_set: &Path, output: &Path) -> Result<()>;
}

#[async_trait]
pub trait ModelTrainer: Send + Sync {
    /// Train a base model from a treebank
    async fn train_seed(&self, treebank: &Path, model_out: &Path) -> Result<()>;

    /// Retrain on relabelled examples, writing the new model to `model_out`
    async fn train(&self, examples: &Path, base_model: &Path, model_out: &Path) -> Result<()>;
}

/// The three collaborators a training cycle needs
pub struct Collaborators {
    pub service: Box<dyn ParsingService>,
    pub parser: Box<dyn CorpusParser>,
    pub trainer: Box<dyn ModelTrainer>,
}

impl Collaborators {
    /// Child-process collaborators built from the `[external]` section
    pub fn from_config(config: &ExternalConfig) -> Self {
        Self {
            service: Box::new(ChildProcessService::new(CommandSpec::new(config.service.clone()))),
            parser: Box::new(CommandParser {
                parse: CommandSpec::new(config.parse.clone()),
                test: CommandSpec::new(config.test.clone()),
            }),
            trainer: Box::new(CommandTrainer {
                seed_train: CommandSpec::new(config.seed_train.clone()),
                train: CommandSpec::new(config.train.clone()),
            }),
        }
    }
}

/// An argv vector with `{name}` placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<String>,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Substitute every `{name}` with the matching path
    pub fn render(&self, vars: &[(&str, &Path)]) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, path)| {
                    acc.replace(&format!("{{{}}}", name), &path.display().to_string())
                })
            })
            .collect()
    }

    fn command(&self, stage: &'static str, vars: &[(&str, &Path)]) -> Result<Command> {
        let argv = self.render(vars);
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::External {
                stage,
                message: "no command configured".to_string(),
            });
        };

        debug!(stage, program = %program, args = ?args, "Spawning external command");
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
    }

    /// Run to completion; a non-zero exit is an external failure
    pub async fn run(&self, stage: &'static str, vars: &[(&str, &Path)]) -> Result<()> {
        let output = self
            .command(stage, vars)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::External {
                stage,
                message: format!("failed to execute: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::External {
                stage,
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }
}

/// Parser driven by the `parse` and `test` command lines
pub struct CommandParser {
    parse: CommandSpec,
    test: CommandSpec,
}

#[async_trait]
impl CorpusParser for CommandParser {
    async fn parse_corpus(&self, request: &ParseRequest) -> Result<()> {
        self.parse
            .run(
                "parse",
                &[
                    ("model", request.model.as_path()),
                    ("corpus", request.corpus.as_path()),
                    ("trace", request.trace.as_path()),
                    ("output", request.output.as_path()),
                ],
            )
            .await
    }

    async fn evaluate(&self, model: &Path, test_set: &Path, output: &Path) -> Result<()> {
        if self.test.is_empty() {
            debug!("No test command configured, skipping evaluation");
            return Ok(());
        }
        self.test
            .run(
                "test",
                &[("model", model), ("test_set", test_set), ("output", output)],
            )
            .await
    }
}

/// Trainer driven by the `seed_train` and `train` command lines
pub struct CommandTrainer {
    seed_train: CommandSpec,
    train: CommandSpec,
}

#[async_trait]
impl ModelTrainer for CommandTrainer {
    async fn train_seed(&self, treebank: &Path, model_out: &Path) -> Result<()> {
        self.seed_train
            .run("seed_train", &[("treebank", treebank), ("output", model_out)])
            .await
    }

    async fn train(&self, examples: &Path, base_model: &Path, model_out: &Path) -> Result<()> {
        self.train
            .run(
                "train",
                &[
                    ("examples", examples),
                    ("model", base_model),
                    ("output", model_out),
                ],
            )
            .await
    }
}

/// Service kept alive as a child process
///
/// Closing its stdin asks it to stop. An empty command line makes the
/// service a no-op, for parsers that need no resident process.
pub struct ChildProcessService {
    command: CommandSpec,
    child: Option<Child>,
}

impl ChildProcessService {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            child: None,
        }
    }
}

#[async_trait]
impl ParsingService for ChildProcessService {
    async fn start(&mut self, model: &Path) -> Result<()> {
        if self.command.is_empty() {
            debug!("No service command configured");
            return Ok(());
        }
        if self.child.is_some() {
            return Err(Error::External {
                stage: "service",
                message: "service already running".to_string(),
            });
        }

        let child = self
            .command
            .command("service", &[("model", model)])?
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::External {
                stage: "service",
                message: format!("failed to spawn: {}", e),
            })?;

        info!(pid = ?child.id(), model = %model.display(), "Parsing service started");
        self.child = Some(child);
        Ok(())
    }

    async fn shutdown(&mut self, grace: Duration) -> Result<ShutdownKind> {
        let Some(mut child) = self.child.take() else {
            return Ok(ShutdownKind::NotRunning);
        };

        drop(child.stdin.take());

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "Parsing service stopped");
                Ok(ShutdownKind::Graceful)
            }
            Ok(Err(e)) => Err(Error::External {
                stage: "service",
                message: format!("wait failed: {}", e),
            }),
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "Parsing service did not stop, killing");
                child.kill().await.map_err(|e| Error::External {
                    stage: "service",
                    message: format!("kill failed: {}", e),
                })?;
                Ok(ShutdownKind::Forced)
            }
        }
    }
}
