//! `colmap` command-line client.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::command::{
    BundleAdjustment, EngineCommand, ExhaustiveMatching, FeatureExtraction, ImageRegistration,
    Mapping, Subcommand, Undistortion, VocabTreeMatching,
};
use crate::engine::{EngineError, EngineOutput, ReconstructionEngine};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag that aborts the engine invocation currently waited on.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs engine subcommands as `<program> [leading args] <subcommand> <flags>`.
///
/// stdout and stderr are captured for error reporting. Without a timeout or
/// cancel token the call waits for the child indefinitely.
#[derive(Clone, Debug)]
pub struct ColmapCli {
    program: PathBuf,
    leading_args: Vec<OsString>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl Default for ColmapCli {
    fn default() -> Self {
        Self::new("colmap")
    }
}

impl ColmapCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: None,
            cancel: None,
        }
    }

    /// Arguments inserted before the subcommand, e.g. a wrapper script.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill and fail any invocation running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(subcommand = C::SUBCOMMAND.as_str()))
    )]
    fn run<C: EngineCommand>(&self, cmd: &C) -> Result<EngineOutput, EngineError> {
        let subcommand = C::SUBCOMMAND;
        let args = cmd.args();
        log::info!("running {subcommand}");
        log::debug!(
            "{} {} {} {}",
            self.program.display(),
            join_lossy(&self.leading_args),
            subcommand,
            join_lossy(&args)
        );

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg(subcommand.as_str())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                subcommand,
                program: self.program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // On timeout/cancel the readers are detached: a grandchild may still
        // hold the pipes open.
        let status = self.wait(&mut child, subcommand)?;
        let output = EngineOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
        };

        if status.success() {
            log::debug!("{subcommand} finished");
            Ok(output)
        } else {
            Err(EngineError::Invocation {
                subcommand,
                status: status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }

    fn wait(&self, child: &mut Child, subcommand: Subcommand) -> Result<ExitStatus, EngineError> {
        let wait_err = |source: std::io::Error| EngineError::Wait { subcommand, source };
        if self.timeout.is_none() && self.cancel.is_none() {
            return child.wait().map_err(wait_err);
        }

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(status);
            }
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                kill(child, subcommand);
                return Err(EngineError::Cancelled { subcommand });
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    kill(child, subcommand);
                    return Err(EngineError::TimedOut {
                        subcommand,
                        after: limit,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill(child: &mut Child, subcommand: Subcommand) {
    log::warn!("killing {subcommand} (pid {})", child.id());
    if let Err(err) = child.kill() {
        log::warn!("failed to kill {subcommand}: {err}");
    }
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn join_lossy(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

impl ReconstructionEngine for ColmapCli {
    fn extract_features(&mut self, cmd: &FeatureExtraction) -> Result<EngineOutput, EngineError> {
        self.run(cmd)
    }

    fn match_exhaustive(
        &mut self,
        cmd: &ExhaustiveMatching,
    ) -> Result<EngineOutput, EngineError> {
        self.run(cmd)
    }

    fn map_build(&mut self, cmd: &Mapping) -> Result<EngineOutput, EngineError> {
        self.run(cmd)
    }

    fn register_images(&mut self, cmd: &ImageRegistration) -> Result<EngineOutput, EngineError> {
        self.run(cmd)
    }

    fn match_vocab_tree(
        &mut self,
        cmd: &VocabTreeMatching,
    ) -> Result<EngineOutput, EngineError> {
        self.run(cmd)
    }

    fn bundle_adjust(&mut self, cmd: &BundleAdjustment) -> Result<EngineOutput, EngineError> {
        self.run(cmd)
    }

    fn undistort(&mut self, cmd: &Undistortion) -> Result<EngineOutput, EngineError> {
        self.run(cmd)
    }
}
