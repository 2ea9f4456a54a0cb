//! Execution backends for the client under test.
//!
//! A [`CommandRunner`] turns an entrypoint plus protocol arguments into the
//! concrete argv to execute, and executes it. [`LocalRunner`] runs the
//! entrypoint directly; [`ContainerRunner`] treats the entrypoint as an image
//! tag and runs it with the current directory mounted as the working volume.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Mount point of the working directory inside the client container.
pub const CONTAINER_VOLUME: &str = "/mnt/volume";

/// Environment variables forwarded into the client container.
pub const CONTAINER_PASSTHROUGH_ENV: [&str; 3] = [
    "GITHUB_ACTIONS",
    "ACTIONS_ID_TOKEN_REQUEST_TOKEN",
    "ACTIONS_ID_TOKEN_REQUEST_URL",
];

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: OsString,
    /// Arguments, not including the program.
    pub args: Vec<OsString>,
}

impl CommandSpec {
    /// The program followed by its arguments.
    pub fn argv(&self) -> impl Iterator<Item = &OsStr> {
        std::iter::once(self.program.as_os_str()).chain(self.args.iter().map(OsString::as_os_str))
    }
}

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// Exit code, `None` if terminated by a signal.
    pub status: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// Backend that executes the client under test.
pub trait CommandRunner: Send + Sync {
    /// Builds the argv that runs `entrypoint` with `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner needs filesystem context it cannot
    /// obtain.
    fn command(&self, entrypoint: &OsStr, args: &[OsString]) -> io::Result<CommandSpec>;

    /// Executes `spec` to completion with stdin closed and output captured.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or waited on.
    fn run(&self, spec: &CommandSpec) -> io::Result<RawOutput> {
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(RawOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn command(&self, entrypoint: &OsStr, args: &[OsString]) -> io::Result<CommandSpec> {
        (**self).command(entrypoint, args)
    }

    fn run(&self, spec: &CommandSpec) -> io::Result<RawOutput> {
        (**self).run(spec)
    }
}

/// Runs the entrypoint as a local executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl CommandRunner for LocalRunner {
    fn command(&self, entrypoint: &OsStr, args: &[OsString]) -> io::Result<CommandSpec> {
        Ok(CommandSpec {
            program: entrypoint.to_owned(),
            args: args.to_vec(),
        })
    }
}

/// Runs the entrypoint as a container image via the docker CLI.
#[derive(Debug, Clone)]
pub struct ContainerRunner {
    docker: PathBuf,
    volume: Option<PathBuf>,
}

impl Default for ContainerRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRunner {
    /// Creates a runner using `docker` from `PATH`, mounting the current
    /// directory at invocation time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            docker: PathBuf::from("docker"),
            volume: None,
        }
    }

    /// Uses a different container CLI, e.g. `podman`.
    #[must_use]
    pub fn with_program(mut self, docker: impl Into<PathBuf>) -> Self {
        self.docker = docker.into();
        self
    }

    /// Mounts `volume` instead of the current directory.
    #[must_use]
    pub fn with_volume(mut self, volume: impl Into<PathBuf>) -> Self {
        self.volume = Some(volume.into());
        self
    }
}

impl CommandRunner for ContainerRunner {
    fn command(&self, entrypoint: &OsStr, args: &[OsString]) -> io::Result<CommandSpec> {
        let host_dir = match &self.volume {
            Some(volume) => volume.clone(),
            None => std::env::current_dir()?,
        };
        let mut mount = host_dir.into_os_string();
        mount.push(":");
        mount.push(CONTAINER_VOLUME);

        let mut container_args: Vec<OsString> = vec![
            "run".into(),
            "--rm".into(),
            "-v".into(),
            mount,
            "-w".into(),
            CONTAINER_VOLUME.into(),
        ];
        for name in CONTAINER_PASSTHROUGH_ENV {
            container_args.push("-e".into());
            container_args.push(name.into());
        }
        container_args.push(entrypoint.to_owned());
        container_args.extend(args.iter().cloned());

        Ok(CommandSpec {
            program: self.docker.clone().into_os_string(),
            args: container_args,
        })
    }
}
