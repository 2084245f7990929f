//! Simulation scenarios.

use std::fmt;

use clap::ValueEnum;

/// A load pattern plus the invariant it checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Random concurrent transfers; total balance is conserved and no
    /// account goes negative.
    TransferStorm,
    /// Concurrent +1 deposits on one account; no update is lost.
    DepositStorm,
    /// Concurrent signups under one username; exactly one wins.
    DuplicateSignup,
    /// Transfers while the store fails commits at random; conservation
    /// still holds.
    FlakyStore,
}

impl Scenario {
    pub fn description(&self) -> &'static str {
        match self {
            Scenario::TransferStorm => "random concurrent transfers between accounts",
            Scenario::DepositStorm => "concurrent unit deposits into a single account",
            Scenario::DuplicateSignup => "concurrent account creation with one username",
            Scenario::FlakyStore => "transfers with injected transient commit failures",
        }
    }

    /// Whether the scenario drives transfers over a population.
    pub fn transfers(&self) -> bool {
        matches!(self, Scenario::TransferStorm | Scenario::FlakyStore)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::TransferStorm => "transfer-storm",
            Scenario::DepositStorm => "deposit-storm",
            Scenario::DuplicateSignup => "duplicate-signup",
            Scenario::FlakyStore => "flaky-store",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_names_match_display() {
        for scenario in Scenario::value_variants() {
            let parsed = Scenario::from_str(&scenario.to_string(), false).unwrap();
            assert_eq!(parsed, *scenario);
        }
    }
}
