//! Conformance scenario catalogue.
//!
//! A [`Scenario`] is one named expectation about client behavior. Scenarios
//! expand into [`Case`]s over their parameter axes: how the artifact is
//! passed (`PATH` / `DIGEST`) and which materials carry the signature
//! (`bundle` / `sigcrt`). Case ids look like `bundle::test_verify[DIGEST]`.
//!
//! Most scenarios are fixture checks: verify pre-built materials from the
//! asset directory and expect acceptance or rejection. The rest are custom
//! bodies that sign first.

mod bundle;
mod certificate;
mod context;
pub mod report;
pub mod runner;
mod sign_verify;

use std::fmt;
use std::path::Path;

use anyhow::Result;
use conformance_core::materials::{
    BundleMaterials, MaterialsKind, SignatureCertificateMaterials, VerificationMaterials,
};
use conformance_core::matrix::ArtifactInput;
pub use context::ScenarioContext;

/// Signature of a custom scenario body.
pub type ScenarioFn = fn(&mut ScenarioContext) -> Result<()>;

/// Whether a fixture must be accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Verification must succeed.
    Accept,
    /// Verification must fail.
    Reject,
}

/// Pre-built materials from the asset directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureMaterials {
    /// The bundle path derived from the input artifact.
    DefaultBundle,
    /// A named bundle file.
    Bundle(&'static str),
    /// A detached signature and certificate.
    Detached {
        /// Signature file.
        signature: &'static str,
        /// Certificate file.
        certificate: &'static str,
    },
}

/// A verification of pre-built materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixture {
    /// Artifact to verify.
    pub input: &'static str,
    /// Materials to verify it with.
    pub materials: FixtureMaterials,
    /// Trusted root override.
    pub trusted_root: Option<&'static str>,
    /// Expected verdict.
    pub expect: Expect,
}

impl Fixture {
    /// Builds the materials this fixture names.
    #[must_use]
    pub fn materials(&self) -> VerificationMaterials {
        let input = Path::new(self.input);
        let mut materials: VerificationMaterials = match self.materials {
            FixtureMaterials::DefaultBundle => BundleMaterials::from_input(input).into(),
            FixtureMaterials::Bundle(bundle) => BundleMaterials::from_path(bundle).into(),
            FixtureMaterials::Detached {
                signature,
                certificate,
            } => SignatureCertificateMaterials::new(signature, certificate).into(),
        };
        materials.set_trusted_root(self.trusted_root.map(Into::into));
        materials
    }

    fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        let materials = self.materials();
        let input = Path::new(self.input);
        match self.expect {
            Expect::Accept => ctx.expect_accept(&materials, input),
            Expect::Reject => ctx.expect_reject(&materials, input),
        }
    }
}

/// What a scenario does.
#[derive(Clone, Copy)]
pub enum Body {
    /// Verify pre-built materials.
    Fixture(Fixture),
    /// Arbitrary logic.
    Custom(ScenarioFn),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixture(fixture) => f.debug_tuple("Fixture").field(fixture).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named conformance expectation.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    /// Group the scenario belongs to.
    pub module: &'static str,
    /// Name, matched against the expected-failure list.
    pub name: &'static str,
    /// Needs an identity token.
    pub signing: bool,
    /// Runs against staging infrastructure too.
    pub staging: bool,
    /// Expands over [`ArtifactInput`].
    pub over_inputs: bool,
    /// Expands over [`MaterialsKind`].
    pub over_kinds: bool,
    /// What to run.
    pub body: Body,
}

impl Scenario {
    /// A fixture check.
    #[must_use]
    pub const fn fixture(module: &'static str, name: &'static str, fixture: Fixture) -> Self {
        let over_inputs = !matches!(fixture.materials, FixtureMaterials::Detached { .. });
        Self {
            module,
            name,
            signing: false,
            staging: false,
            over_inputs,
            over_kinds: false,
            body: Body::Fixture(fixture),
        }
    }

    /// A custom scenario.
    #[must_use]
    pub const fn custom(module: &'static str, name: &'static str, body: ScenarioFn) -> Self {
        Self {
            module,
            name,
            signing: false,
            staging: false,
            over_inputs: false,
            over_kinds: false,
            body: Body::Custom(body),
        }
    }

    /// Marks the scenario as needing signing.
    #[must_use]
    pub const fn signing(mut self) -> Self {
        self.signing = true;
        self
    }

    /// Marks the scenario as supported on staging.
    #[must_use]
    pub const fn staging(mut self) -> Self {
        self.staging = true;
        self
    }

    /// Expands the scenario over artifact inputs.
    #[must_use]
    pub const fn over_inputs(mut self) -> Self {
        self.over_inputs = true;
        self
    }

    /// Expands the scenario over materials kinds.
    #[must_use]
    pub const fn over_kinds(mut self) -> Self {
        self.over_kinds = true;
        self
    }

    /// Every parameter combination of this scenario.
    #[must_use]
    pub fn cases(&self) -> Vec<Case> {
        let inputs: Vec<Option<ArtifactInput>> = if self.over_inputs {
            ArtifactInput::ALL.into_iter().map(Some).collect()
        } else {
            vec![None]
        };
        let kinds: Vec<Option<MaterialsKind>> = if self.over_kinds {
            MaterialsKind::ALL.into_iter().map(Some).collect()
        } else {
            vec![None]
        };

        let mut cases = Vec::with_capacity(inputs.len() * kinds.len());
        for kind in &kinds {
            for input in &inputs {
                cases.push(Case {
                    scenario: *self,
                    input: *input,
                    kind: *kind,
                });
            }
        }
        cases
    }
}

/// One parameterised run of a scenario.
#[derive(Debug, Clone, Copy)]
pub struct Case {
    /// The scenario.
    pub scenario: Scenario,
    /// Artifact input parameter, if the scenario expands over it.
    pub input: Option<ArtifactInput>,
    /// Materials kind parameter, if the scenario expands over it.
    pub kind: Option<MaterialsKind>,
}

impl Case {
    /// Stable id, e.g. `bundle::test_verify[PATH]`.
    #[must_use]
    pub fn id(&self) -> String {
        let params: Vec<&str> = self
            .input
            .map(ArtifactInput::as_str)
            .into_iter()
            .chain(self.kind.map(MaterialsKind::as_str))
            .collect();
        if params.is_empty() {
            format!("{}::{}", self.scenario.module, self.scenario.name)
        } else {
            format!(
                "{}::{}[{}]",
                self.scenario.module,
                self.scenario.name,
                params.join("-")
            )
        }
    }

    /// Runs the case body.
    ///
    /// # Errors
    ///
    /// Returns the scenario's failure.
    pub fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        match self.scenario.body {
            Body::Fixture(fixture) => fixture.run(ctx),
            Body::Custom(body) => body(ctx),
        }
    }
}

/// Every scenario, in execution order.
#[must_use]
pub fn catalogue() -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    scenarios.extend(bundle::scenarios());
    scenarios.extend(sign_verify::scenarios());
    scenarios.extend(certificate::scenarios());
    scenarios
}

/// Every case of every scenario, in execution order.
#[must_use]
pub fn all_cases() -> Vec<Case> {
    catalogue().iter().flat_map(Scenario::cases).collect()
}
