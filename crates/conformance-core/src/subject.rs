//! Verification subjects: an artifact on disk or its precomputed digest.

use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Prefix of digest subjects.
pub const SHA256_PREFIX: &str = "sha256:";

/// What a verification checks the signature against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The artifact file itself.
    Path(PathBuf),
    /// A `sha256:<hex>` digest of the artifact.
    Digest(String),
}

impl Subject {
    /// Hashes the file at `path` into a [`Subject::Digest`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn digest_of(path: &Path) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut file = File::open(path)?;
        io::copy(&mut file, &mut hasher)?;
        Ok(Self::Digest(format!(
            "{SHA256_PREFIX}{}",
            hex::encode(hasher.finalize())
        )))
    }

    /// Whether this is a digest subject.
    #[must_use]
    pub const fn is_digest(&self) -> bool {
        matches!(self, Self::Digest(_))
    }

    /// The trailing positional argument passed to the client.
    #[must_use]
    pub fn as_arg(&self) -> &OsStr {
        match self {
            Self::Path(path) => path.as_os_str(),
            Self::Digest(digest) => OsStr::new(digest),
        }
    }
}

impl From<PathBuf> for Subject {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for Subject {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Digest(digest) => f.write_str(digest),
        }
    }
}
