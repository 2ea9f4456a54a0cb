//! Bundle verification scenarios.
//!
//! Each fixture bundle in the asset directory is crafted to exercise one
//! verification check. All but the happy paths must be rejected.

use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result, bail, ensure};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use conformance_core::materials::{MaterialsKind, VerificationMaterials};
use x509_parser::parse_x509_certificate;

use super::{Expect, Fixture, FixtureMaterials, Scenario, ScenarioContext};

const MODULE: &str = "bundle";

const fn bundle(input: &'static str, bundle: &'static str, expect: Expect) -> Fixture {
    Fixture {
        input,
        materials: FixtureMaterials::Bundle(bundle),
        trusted_root: None,
        expect,
    }
}

const fn with_d_root(mut fixture: Fixture) -> Fixture {
    fixture.trusted_root = Some("trusted_root.d.json");
    fixture
}

pub(super) fn scenarios() -> Vec<Scenario> {
    use Expect::{Accept, Reject};

    let fixtures = [
        ("test_verify", bundle("a.txt", "a.txt.good.sigstore.json", Accept)),
        ("test_verify_v_0_3", bundle("a.txt", "a.txt.good.v0.3.sigstore", Accept)),
        (
            "test_verify_dsse_bundle_with_trust_root",
            with_d_root(bundle("d.txt", "d.txt.good.sigstore.json", Accept)),
        ),
        (
            "test_verify_rejects_root",
            Fixture {
                input: "has_root_in_chain.txt",
                materials: FixtureMaterials::DefaultBundle,
                trusted_root: None,
                expect: Reject,
            },
        ),
        (
            "test_verify_rejects_staging_cert",
            bundle("a.txt", "a.txt.staging.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_invalid_set",
            bundle("a.txt", "a.txt.invalid_set.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_invalid_signature",
            bundle("a.txt", "a.txt.invalid_signature.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_invalid_key",
            bundle("a.txt", "a.txt.invalid_key.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_invalid_inclusion_proof",
            bundle("a.txt", "a.txt.invalid_inclusion_proof.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_different_materials",
            bundle("b.txt", "a.txt.good.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_expired_certificate",
            with_d_root(bundle("d.txt", "d.txt.cert-expired.sigstore.json", Reject)),
        ),
        (
            "test_verify_rejects_missing_inclusion_proof",
            with_d_root(bundle("d.txt", "d.txt.no-inclusion-proof.sigstore.json", Reject)),
        ),
        (
            "test_verify_rejects_bad_tlog_timestamp",
            with_d_root(bundle("d.txt", "d.txt.tlog-timestamp-error.sigstore.json", Reject)),
        ),
        (
            "test_verify_rejects_bad_tlog_entry",
            with_d_root(bundle("d.txt", "d.txt.tlog-body-error.sigstore.json", Reject)),
        ),
        (
            "test_verify_rejects_bad_tsa_timestamp",
            with_d_root(bundle("d.txt", "d.txt.tsa-timestamp-error.sigstore.json", Reject)),
        ),
        (
            "test_verify_rejects_bad_checkpoint",
            bundle("a.txt", "a.txt.checkpoint_invalid_signature.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_valid_but_mismatched_checkpoint",
            bundle("a.txt", "a.txt.checkpoint_wrong_roothash.sigstore.json", Reject),
        ),
        (
            "test_verify_rejects_checkpoint_with_no_matching_key",
            bundle("a.txt", "a.txt.checkpoint_bad_keyhint.sigstore.json", Reject),
        ),
    ];

    let mut scenarios: Vec<Scenario> = fixtures
        .into_iter()
        .map(|(name, fixture)| Scenario::fixture(MODULE, name, fixture))
        .collect();
    // Runs right after the root rejection check.
    let position = scenarios
        .iter()
        .position(|s| s.name == "test_verify_rejects_root")
        .map_or(scenarios.len(), |i| i + 1);
    scenarios.insert(
        position,
        Scenario::custom(
            MODULE,
            "test_sign_does_not_produce_root",
            sign_does_not_produce_root,
        )
        .signing()
        .over_inputs(),
    );
    scenarios
}

/// A freshly signed bundle must not carry a CA certificate.
fn sign_does_not_produce_root(ctx: &mut ScenarioContext) -> Result<()> {
    let (input, materials) = ctx.materials_of(MaterialsKind::Bundle, "a.txt");
    ensure!(!materials.exists(), "bundle exists before signing");

    ctx.sign(&materials, &input)?;

    let VerificationMaterials::Bundle(bundle) = &materials else {
        bail!("expected bundle materials");
    };
    let ca_count = count_ca_certificates(&bundle.bundle)?;
    ensure!(
        ca_count == 0,
        "signed bundle contains {ca_count} CA certificate(s) in its chain"
    );
    Ok(())
}

/// Counts certificates with `BasicConstraints: CA:TRUE` in a bundle's
/// verification material. A missing `BasicConstraints` extension counts as
/// a leaf.
pub(crate) fn count_ca_certificates(bundle_path: &Path) -> Result<usize> {
    let contents = fs::read(bundle_path)
        .with_context(|| format!("failed to read bundle {}", bundle_path.display()))?;
    let bundle: serde_json::Value =
        serde_json::from_slice(&contents).context("bundle is not valid JSON")?;

    let material = &bundle["verificationMaterial"];
    let raw_certs: Vec<&str> = match (
        material["x509CertificateChain"]["certificates"].as_array(),
        material["certificate"]["rawBytes"].as_str(),
    ) {
        (Some(chain), _) => chain
            .iter()
            .map(|cert| {
                cert["rawBytes"]
                    .as_str()
                    .context("chain certificate has no rawBytes")
            })
            .collect::<Result<_>>()?,
        (None, Some(single)) => vec![single],
        (None, None) => Vec::new(),
    };

    let mut ca_count = 0;
    for (index, raw) in raw_certs.iter().enumerate() {
        let der = STANDARD
            .decode(raw)
            .with_context(|| format!("certificate {index} is not base64"))?;
        let (_, cert) = parse_x509_certificate(&der)
            .map_err(|e| anyhow::anyhow!("certificate {index} is not DER X.509: {e}"))?;
        let is_ca = cert
            .basic_constraints()
            .map_err(|e| anyhow::anyhow!("certificate {index} has bad BasicConstraints: {e}"))?
            .is_some_and(|ext| ext.value.ca);
        if is_ca {
            ca_count += 1;
        }
    }
    Ok(ca_count)
}
