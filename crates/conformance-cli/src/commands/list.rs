//! `list`: print case ids, or the client implementation matrix.

use std::io::{self, Write as _};

use anyhow::Result;
use clap::Args;
use conformance_core::matrix::{each_impl, impl_pairs};

use crate::suite::all_cases;

/// Arguments for `list`.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// List client implementations and their cross-verification pairs
    /// instead of cases
    #[arg(long)]
    pub implementations: bool,
}

/// Prints every case id with its scenario flags, one per line.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn list(args: &ListArgs) -> Result<()> {
    let mut out = io::stdout().lock();
    if args.implementations {
        for implementation in each_impl() {
            writeln!(out, "{implementation}")?;
        }
        for (signer, verifier) in impl_pairs() {
            writeln!(out, "{signer} x {verifier}")?;
        }
        return Ok(());
    }

    for case in all_cases() {
        let mut flags = Vec::new();
        if case.scenario.signing {
            flags.push("signing");
        }
        if case.scenario.staging {
            flags.push("staging");
        }
        if flags.is_empty() {
            writeln!(out, "{}", case.id())?;
        } else {
            writeln!(out, "{} ({})", case.id(), flags.join(", "))?;
        }
    }
    Ok(())
}
