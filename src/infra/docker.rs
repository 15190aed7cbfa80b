//! Image builders
//!
//! [`DockerBuilder`] drives the `docker` CLI. [`EmitBuilder`] writes each
//! stage to a file instead, for dry runs and for inspecting what would be
//! built.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::config::defaults;
use crate::core::orchestrator::ArtifactBuilder;
use crate::error::BuilderError;

/// Proxy variables forwarded to builds as build arguments
const PROXY_VARS: &[&str] = &["http_proxy", "https_proxy", "no_proxy"];

/// Builder backed by the docker executable
#[derive(Debug, Clone)]
pub struct DockerBuilder {
    /// Path to the docker binary
    docker: PathBuf,
    /// `--build-arg` pairs
    build_args: Vec<(String, String)>,
}

impl DockerBuilder {
    /// Use the given docker binary
    pub fn new(docker: PathBuf) -> Self {
        Self {
            docker,
            build_args: Vec::new(),
        }
    }

    /// Find docker in PATH
    pub fn locate() -> Result<Self, BuilderError> {
        which::which("docker")
            .map(Self::new)
            .map_err(|_| BuilderError::ToolNotFound {
                tool: "docker".to_string(),
            })
    }

    /// Forward proxy settings of this process to every build
    #[must_use]
    pub fn with_proxy_from_env(mut self) -> Self {
        for var in PROXY_VARS {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    self.build_args.push(((*var).to_string(), value));
                }
            }
        }
        self
    }

    /// Add a build argument
    #[must_use]
    pub fn with_build_arg(mut self, key: &str, value: &str) -> Self {
        self.build_args.push((key.to_string(), value.to_string()));
        self
    }

    /// Arguments of `docker build` for `tag`, reading the stage from stdin
    pub fn build_args(&self, tag: &str) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--network=host".to_string(),
            "--force-rm".to_string(),
            "-t".to_string(),
            tag.to_string(),
        ];
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("-".to_string());
        args
    }
}

impl ArtifactBuilder for DockerBuilder {
    fn exists(&self, tag: &str) -> Result<bool, BuilderError> {
        let status = Command::new(&self.docker)
            .args(["image", "inspect", "--format", "{{.Id}}", tag])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| BuilderError::SpawnFailed {
                tag: tag.to_string(),
                error: e.to_string(),
            })?;
        Ok(status.success())
    }

    fn build(&self, stage: &str, tag: &str, instructions: &str) -> Result<(), BuilderError> {
        tracing::info!("Building image {tag} for stage {stage}");

        let mut cmd = Command::new(&self.docker);
        cmd.args(self.build_args(tag));
        let (status, stderr_tail) =
            run_streaming(cmd, instructions, stage).map_err(|e| BuilderError::SpawnFailed {
                tag: tag.to_string(),
                error: e.to_string(),
            })?;

        if !status.success() {
            return Err(BuilderError::BuildFailed {
                tag: tag.to_string(),
                status: status.to_string(),
                stderr: stderr_tail,
            });
        }
        Ok(())
    }
}

/// A line of child output
enum StreamLine {
    Stdout(String),
    Stderr(String),
}

/// Run `cmd` with `input` on stdin, logging its output line by line while it runs.
///
/// Returns the exit status and the last stderr lines.
fn run_streaming(mut cmd: Command, input: &str, label: &str) -> io::Result<(ExitStatus, String)> {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (tx, rx) = mpsc::channel::<StreamLine>();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || forward_lines(out, &tx, StreamLine::Stdout));
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || forward_lines(err, &tx, StreamLine::Stderr));
    }
    drop(tx);

    // stdin is closed when the writer finishes, which starts the build
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_string();
        thread::spawn(move || stdin.write_all(input.as_bytes()))
    });

    let mut tail = VecDeque::with_capacity(defaults::BUILD_ERROR_TAIL_LINES);
    for line in rx {
        match line {
            StreamLine::Stdout(line) => tracing::debug!("[{label}] {line}"),
            StreamLine::Stderr(line) => {
                tracing::debug!("[{label}] {line}");
                if tail.len() == defaults::BUILD_ERROR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    }

    let written = match writer {
        Some(writer) => writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
        None => Ok(()),
    };
    let status = child.wait()?;
    // A child that exits early closes its stdin; report the exit status instead
    if status.success() {
        written?;
    }
    Ok((status, Vec::from(tail).join("\n")))
}

fn forward_lines<R: Read>(reader: R, tx: &mpsc::Sender<StreamLine>, wrap: fn(String) -> StreamLine) {
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        if tx.send(wrap(line)).is_err() {
            break;
        }
    }
}

/// Builder that writes `<stage>.Dockerfile` files instead of building
///
/// Never reports an existing image, so every stage is emitted.
#[derive(Debug, Clone)]
pub struct EmitBuilder {
    dir: PathBuf,
}

impl EmitBuilder {
    /// Write stages into `dir`
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a stage is written to
    pub fn stage_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{stage}.Dockerfile"))
    }
}

impl ArtifactBuilder for EmitBuilder {
    fn exists(&self, _tag: &str) -> Result<bool, BuilderError> {
        Ok(false)
    }

    fn build(&self, stage: &str, tag: &str, instructions: &str) -> Result<(), BuilderError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| BuilderError::IoError {
            path: self.dir.clone(),
            error: e.to_string(),
        })?;
        let path = self.stage_path(stage);
        std::fs::write(&path, format!("# tag: {tag}\n{instructions}")).map_err(|e| {
            BuilderError::IoError {
                path: path.clone(),
                error: e.to_string(),
            }
        })?;
        tracing::info!("Wrote {}", path.display());
        Ok(())
    }
}
