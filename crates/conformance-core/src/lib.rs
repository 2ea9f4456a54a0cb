//! Core of the Sigstore client conformance harness.
//!
//! The harness checks independent Sigstore clients against shared
//! expectations by driving each client's command-line interface and
//! asserting on exit codes and produced files. It never signs or verifies
//! anything itself.
//!
//! # Modules
//!
//! - [`materials`]: the files a sign operation writes and a verify operation
//!   reads
//! - [`identity`]: acquisition, validation and caching of short-lived OIDC
//!   identity tokens
//! - [`client`]: the CLI protocol adapter and its execution backends
//! - [`config`]: run configuration from TOML, environment and flags
//! - [`workspace`]: isolated per-scenario working directories
//! - [`subject`] and [`matrix`]: scenario parameters
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use conformance_core::client::SigstoreClient;
//! use conformance_core::materials::{MaterialsKind, VerificationMaterials};
//! use conformance_core::subject::Subject;
//!
//! let mut client = SigstoreClient::new("/usr/local/bin/my-client", None, false);
//! let materials = VerificationMaterials::from_input(MaterialsKind::Bundle, Path::new("a.txt"));
//!
//! // A corrupted bundle must be rejected.
//! client
//!     .raises(|c| c.verify(&materials, &Subject::from(Path::new("a.txt"))))
//!     .unwrap();
//! ```

pub mod client;
pub mod config;
pub mod identity;
pub mod materials;
pub mod matrix;
pub mod subject;
pub mod workspace;

pub use client::{
    CERTIFICATE_IDENTITY, CERTIFICATE_OIDC_ISSUER, ClientError, Invocation, Outcome,
    SigstoreClient,
};
pub use config::{ConfigError, HarnessConfig};
pub use identity::{IdentityToken, IdentityTokenProvider, TokenError};
pub use materials::{
    BundleMaterials, MaterialsKind, SignatureCertificateMaterials, VerificationMaterials,
};
pub use subject::Subject;
pub use workspace::{Workspace, WorkspaceError};
