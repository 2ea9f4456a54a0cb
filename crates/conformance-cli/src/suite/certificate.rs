//! Detached signature and certificate scenarios.

use super::{Expect, Fixture, FixtureMaterials, Scenario};

const MODULE: &str = "certificate";

const fn detached(
    signature: &'static str,
    certificate: &'static str,
    trusted_root: Option<&'static str>,
    expect: Expect,
) -> Fixture {
    Fixture {
        input: "a.txt",
        materials: FixtureMaterials::Detached {
            signature,
            certificate,
        },
        trusted_root,
        expect,
    }
}

pub(super) fn scenarios() -> Vec<Scenario> {
    use Expect::{Accept, Reject};

    [
        (
            "test_verify_invalid_certificate_chain",
            detached("a.txt.invalid.sig", "a.txt.invalid.crt", None, Reject),
        ),
        (
            "test_verify_with_trust_root",
            detached(
                "a.txt.good.sig",
                "a.txt.good.crt",
                Some("trusted_root.public_good.json"),
                Accept,
            ),
        ),
        (
            "test_verify_trust_root_with_invalid_ct_keys",
            detached(
                "a.txt.good.sig",
                "a.txt.good.crt",
                Some("trusted_root.bad_ct.json"),
                Reject,
            ),
        ),
        (
            // The chain is valid but the log entry only covers the leaf.
            "test_verify_valid_cert_chain_but_only_leaf_on_log",
            detached("a.txt.good.sig", "a.txt.good.full_crt", None, Reject),
        ),
    ]
    .into_iter()
    .map(|(name, fixture)| Scenario::fixture(MODULE, name, fixture))
    .collect()
}
