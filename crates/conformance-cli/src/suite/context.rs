//! Per-case state handed to scenario bodies.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, ensure};
use conformance_core::client::CommandRunner;
use conformance_core::materials::{MaterialsKind, VerificationMaterials};
use conformance_core::matrix::ArtifactInput;
use conformance_core::{SigstoreClient, Subject};

/// The client under test plus the case's parameters.
pub struct ScenarioContext {
    client: SigstoreClient<Box<dyn CommandRunner>>,
    input: Option<ArtifactInput>,
    kind: Option<MaterialsKind>,
}

impl ScenarioContext {
    /// Wraps a client for one case.
    #[must_use]
    pub fn new(
        client: SigstoreClient<Box<dyn CommandRunner>>,
        input: Option<ArtifactInput>,
        kind: Option<MaterialsKind>,
    ) -> Self {
        Self {
            client,
            input,
            kind,
        }
    }

    /// Default materials for `input`, of the case's kind (bundle if the case
    /// does not expand over kinds).
    #[must_use]
    pub fn materials(&self, input: &str) -> (PathBuf, VerificationMaterials) {
        self.materials_of(self.kind.unwrap_or(MaterialsKind::Bundle), input)
    }

    /// Default materials of an explicit kind.
    #[must_use]
    pub fn materials_of(&self, kind: MaterialsKind, input: &str) -> (PathBuf, VerificationMaterials) {
        let input = PathBuf::from(input);
        let materials = VerificationMaterials::from_input(kind, &input);
        (input, materials)
    }

    /// The verification subject for `artifact` under the case's input
    /// parameter (the path if the case does not expand over inputs).
    ///
    /// # Errors
    ///
    /// Returns an error if a digest is needed and the artifact is unreadable.
    pub fn subject(&self, artifact: &Path) -> Result<Subject> {
        self.input
            .unwrap_or(ArtifactInput::Path)
            .subject(artifact)
            .with_context(|| format!("failed to hash {}", artifact.display()))
    }

    /// Signs `artifact` and checks that every output was written.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or leaves outputs missing.
    pub fn sign(&mut self, materials: &VerificationMaterials, artifact: &Path) -> Result<()> {
        self.client.sign(materials, artifact)?;
        ensure!(
            materials.exists(),
            "client reported success but did not write {} materials for {}",
            materials.kind(),
            artifact.display()
        );
        Ok(())
    }

    /// Expects verification of `artifact` against `materials` to succeed.
    ///
    /// # Errors
    ///
    /// Returns the client failure.
    pub fn expect_accept(&mut self, materials: &VerificationMaterials, artifact: &Path) -> Result<()> {
        let subject = self.subject(artifact)?;
        self.client.verify(materials, &subject)?;
        Ok(())
    }

    /// Expects verification of `artifact` against `materials` to be
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the client accepts.
    pub fn expect_reject(&mut self, materials: &VerificationMaterials, artifact: &Path) -> Result<()> {
        let subject = self.subject(artifact)?;
        self.client.raises(|c| c.verify(materials, &subject))?;
        Ok(())
    }
}
