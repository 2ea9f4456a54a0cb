//! Captured client invocations and their classification.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::fmt;

use shell_escape::escape;

/// Placeholder substituted for secret arguments in rendered command lines.
pub const REDACTED: &str = "[REDACTED]";

/// Renders an argv as a copy-pasteable shell command line.
///
/// Every argument equal to `secret` is replaced with [`REDACTED`] so that
/// identity tokens never reach logs or failure reports.
#[must_use]
pub fn render_command<'a, I>(argv: I, secret: Option<&str>) -> String
where
    I: IntoIterator<Item = &'a OsStr>,
{
    argv.into_iter()
        .map(|arg| {
            let arg = arg.to_string_lossy();
            if secret.is_some_and(|secret| !secret.is_empty() && arg == secret) {
                Cow::Borrowed(REDACTED)
            } else {
                escape(arg)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One completed run of the client under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Rendered command line, secrets redacted.
    pub command: String,
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl Invocation {
    /// Whether the client exited with status 0.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exit_code = self
            .exit_code
            .map_or_else(|| "none (terminated by signal)".to_string(), |code| code.to_string());
        write!(
            f,
            "\nCommand: {}\nExit code: {exit_code}\n\n\
             !!! STDOUT !!!\n==============\n\n{}\n\n\
             !!! STDERR !!!\n==============\n\n{}\n",
            self.command, self.stdout, self.stderr
        )
    }
}

/// Classified result of one adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The client exited 0.
    Completed(Invocation),
    /// The client exited non-zero or was killed.
    Failed(Invocation),
}

impl Outcome {
    /// Classifies an invocation by its exit code. Any non-zero exit, and
    /// any signal termination, counts as a failure.
    #[must_use]
    pub fn classify(invocation: Invocation) -> Self {
        if invocation.succeeded() {
            Self::Completed(invocation)
        } else {
            Self::Failed(invocation)
        }
    }

    /// The underlying invocation.
    #[must_use]
    pub const fn invocation(&self) -> &Invocation {
        match self {
            Self::Completed(invocation) | Self::Failed(invocation) => invocation,
        }
    }

    /// Whether this is [`Outcome::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
