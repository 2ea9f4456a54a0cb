//! Verification materials consumed and produced by sign/verify operations.
//!
//! A materials value names the files a client writes when signing and reads
//! when verifying. Exactly one variant is active per value, and every
//! consumer matches on [`VerificationMaterials`] exhaustively.
//!
//! # Default paths
//!
//! | Variant | Derived from input `X` |
//! |---------|------------------------|
//! | Bundle | `X.sigstore.json` (legacy `X.sigstore`) |
//! | Signature/certificate | `X.sig`, `X.crt` |
//!
//! Derivation never touches the filesystem.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix of a bundle derived from an input artifact.
pub const BUNDLE_SUFFIX: &str = ".sigstore.json";

/// Suffix of a bundle in the pre-`.json` naming scheme.
pub const LEGACY_BUNDLE_SUFFIX: &str = ".sigstore";

/// Suffix of a detached signature.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Suffix of a detached certificate.
pub const CERTIFICATE_SUFFIX: &str = ".crt";

/// Appends `suffix` to the final component of `path` without normalising it.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

/// The kind of materials a scenario runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialsKind {
    /// A single combined bundle.
    Bundle,
    /// A detached signature and certificate pair.
    SignatureCertificate,
}

impl MaterialsKind {
    /// All kinds, in parametrisation order.
    pub const ALL: [Self; 2] = [Self::Bundle, Self::SignatureCertificate];

    /// Short identifier used in scenario ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bundle => "bundle",
            Self::SignatureCertificate => "sigcrt",
        }
    }
}

impl fmt::Display for MaterialsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materials for the bundle flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMaterials {
    /// Bundle written by `sign-bundle` and read by `verify-bundle`.
    pub bundle: PathBuf,
    /// Trusted root override, passed as `--trusted-root`.
    pub trusted_root: Option<PathBuf>,
    /// Signing config override, passed as `--signing-config` when signing.
    pub signing_config: Option<PathBuf>,
}

impl BundleMaterials {
    /// Materials pointing at an existing bundle file.
    #[must_use]
    pub fn from_path(bundle: impl Into<PathBuf>) -> Self {
        Self {
            bundle: bundle.into(),
            trusted_root: None,
            signing_config: None,
        }
    }

    /// Derives `X.sigstore.json` from the input artifact `X`.
    #[must_use]
    pub fn from_input(input: &Path) -> Self {
        Self::from_path(with_suffix(input, BUNDLE_SUFFIX))
    }

    /// Derives the legacy `X.sigstore` bundle name from the input artifact `X`.
    #[must_use]
    pub fn from_input_legacy(input: &Path) -> Self {
        Self::from_path(with_suffix(input, LEGACY_BUNDLE_SUFFIX))
    }

    /// Sets the trusted root override.
    #[must_use]
    pub fn with_trusted_root(mut self, trusted_root: impl Into<PathBuf>) -> Self {
        self.trusted_root = Some(trusted_root.into());
        self
    }

    /// Sets the signing config override.
    #[must_use]
    pub fn with_signing_config(mut self, signing_config: impl Into<PathBuf>) -> Self {
        self.signing_config = Some(signing_config.into());
        self
    }

    /// Whether the bundle file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.bundle.is_file()
    }
}

/// Materials for the detached signature/certificate flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCertificateMaterials {
    /// Detached signature.
    pub signature: PathBuf,
    /// Signing certificate (PEM).
    pub certificate: PathBuf,
    /// Trusted root override, passed as `--trusted-root` when verifying.
    pub trusted_root: Option<PathBuf>,
}

impl SignatureCertificateMaterials {
    /// Materials pointing at an explicit signature and certificate.
    #[must_use]
    pub fn new(signature: impl Into<PathBuf>, certificate: impl Into<PathBuf>) -> Self {
        Self {
            signature: signature.into(),
            certificate: certificate.into(),
            trusted_root: None,
        }
    }

    /// Derives `X.sig` and `X.crt` from the input artifact `X`.
    #[must_use]
    pub fn from_input(input: &Path) -> Self {
        Self::new(
            with_suffix(input, SIGNATURE_SUFFIX),
            with_suffix(input, CERTIFICATE_SUFFIX),
        )
    }

    /// Sets the trusted root override.
    #[must_use]
    pub fn with_trusted_root(mut self, trusted_root: impl Into<PathBuf>) -> Self {
        self.trusted_root = Some(trusted_root.into());
        self
    }

    /// Whether both the signature and the certificate exist.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.signature.is_file() && self.certificate.is_file()
    }
}

/// What a sign operation writes and a verify operation reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationMaterials {
    /// Single combined artifact.
    Bundle(BundleMaterials),
    /// Detached signature and certificate.
    SignatureCertificate(SignatureCertificateMaterials),
}

impl VerificationMaterials {
    /// Derives default materials of `kind` for the input artifact.
    #[must_use]
    pub fn from_input(kind: MaterialsKind, input: &Path) -> Self {
        match kind {
            MaterialsKind::Bundle => Self::Bundle(BundleMaterials::from_input(input)),
            MaterialsKind::SignatureCertificate => {
                Self::SignatureCertificate(SignatureCertificateMaterials::from_input(input))
            },
        }
    }

    /// Which variant this is.
    #[must_use]
    pub const fn kind(&self) -> MaterialsKind {
        match self {
            Self::Bundle(_) => MaterialsKind::Bundle,
            Self::SignatureCertificate(_) => MaterialsKind::SignatureCertificate,
        }
    }

    /// Whether every required file exists. Optional overrides are not checked.
    #[must_use]
    pub fn exists(&self) -> bool {
        match self {
            Self::Bundle(materials) => materials.exists(),
            Self::SignatureCertificate(materials) => materials.exists(),
        }
    }

    /// The trusted root override, if any.
    #[must_use]
    pub fn trusted_root(&self) -> Option<&Path> {
        match self {
            Self::Bundle(materials) => materials.trusted_root.as_deref(),
            Self::SignatureCertificate(materials) => materials.trusted_root.as_deref(),
        }
    }

    /// Replaces the trusted root override.
    pub fn set_trusted_root(&mut self, trusted_root: Option<PathBuf>) {
        match self {
            Self::Bundle(materials) => materials.trusted_root = trusted_root,
            Self::SignatureCertificate(materials) => materials.trusted_root = trusted_root,
        }
    }
}

impl From<BundleMaterials> for VerificationMaterials {
    fn from(materials: BundleMaterials) -> Self {
        Self::Bundle(materials)
    }
}

impl From<SignatureCertificateMaterials> for VerificationMaterials {
    fn from(materials: SignatureCertificateMaterials) -> Self {
        Self::SignatureCertificate(materials)
    }
}
