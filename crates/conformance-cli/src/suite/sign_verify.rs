//! Sign-then-verify scenarios.

use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result, ensure};
use conformance_core::materials::{
    MaterialsKind, SignatureCertificateMaterials, VerificationMaterials,
};

use super::{Scenario, ScenarioContext};

const MODULE: &str = "sign_verify";

/// Checks that the artifact is in the workspace and nothing is signed yet.
fn ensure_unsigned(input: &Path, materials: &VerificationMaterials) -> Result<()> {
    ensure!(input.exists(), "{} is missing from the workspace", input.display());
    ensure!(
        !materials.exists(),
        "{} materials for {} exist before signing",
        materials.kind(),
        input.display()
    );
    Ok(())
}

pub(super) fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::custom(MODULE, "test_verify_empty", verify_empty)
            .signing()
            .staging()
            .over_kinds(),
        Scenario::custom(MODULE, "test_verify_mismatch", verify_mismatch)
            .signing()
            .staging()
            .over_kinds(),
        Scenario::custom(MODULE, "test_verify_sigcrt", verify_sigcrt).signing(),
    ]
}

fn touch(path: &Path) -> Result<()> {
    fs::write(path, b"").with_context(|| format!("failed to create {}", path.display()))
}

/// Materials for one artifact must not verify an empty artifact.
fn verify_empty(ctx: &mut ScenarioContext) -> Result<()> {
    let (input, materials) = ctx.materials("a.txt");
    ensure_unsigned(&input, &materials)?;
    ctx.sign(&materials, &input)?;

    let blank = Path::new("blank.txt");
    touch(blank)?;
    ctx.expect_reject(&materials, blank)?;

    ctx.expect_accept(&materials, &input)
}

/// Materials for one artifact must not verify a different artifact.
fn verify_mismatch(ctx: &mut ScenarioContext) -> Result<()> {
    let (a_input, a_materials) = ctx.materials("a.txt");
    ensure_unsigned(&a_input, &a_materials)?;
    ctx.sign(&a_materials, &a_input)?;

    let (b_input, b_materials) = ctx.materials("b.txt");
    ctx.sign(&b_materials, &b_input)?;

    ctx.expect_reject(&a_materials, &b_input)?;

    ctx.expect_accept(&a_materials, &a_input)
}

/// Detached signatures and certificates must both be present and belong
/// together.
fn verify_sigcrt(ctx: &mut ScenarioContext) -> Result<()> {
    let (a_input, a_materials) = ctx.materials_of(MaterialsKind::SignatureCertificate, "a.txt");
    let (b_input, b_materials) = ctx.materials_of(MaterialsKind::SignatureCertificate, "b.txt");
    ctx.sign(&a_materials, &a_input)?;
    ctx.sign(&b_materials, &b_input)?;

    let a = SignatureCertificateMaterials::from_input(&a_input);
    let b = SignatureCertificateMaterials::from_input(&b_input);
    let blank = Path::new("blank.txt");
    touch(blank)?;

    let rejected = [
        ("blank signature", SignatureCertificateMaterials::new(blank, &a.certificate)),
        ("blank certificate", SignatureCertificateMaterials::new(&a.signature, blank)),
        ("mismatched certificate", SignatureCertificateMaterials::new(&a.signature, &b.certificate)),
        ("mismatched signature", SignatureCertificateMaterials::new(&b.signature, &a.certificate)),
    ];
    for (what, materials) in rejected {
        ctx.expect_reject(&materials.into(), &a_input)
            .with_context(|| format!("{what} was not rejected"))?;
    }

    ctx.expect_accept(&a.into(), &a_input)
}
