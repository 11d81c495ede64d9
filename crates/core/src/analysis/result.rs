use nalgebra::{DMatrix, DVector};

use crate::estimate::{Dispersion, LocationEstimate};
use crate::inference::{ContrastTest, EffectSize};
use crate::types::RESULTS_LEN;

/// Bootstrap null distribution kept with the result.
#[derive(Debug, Clone)]
pub struct BootstrapSummary {
    pub n_simulations: usize,
    /// Seed of the random stream actually used.
    pub seed: u64,
    pub statistics: Vec<f64>,
    pub n_nan: usize,
    /// Resamples with a zero-variance cell.
    pub n_degenerate: usize,
}

/// The result of a Welch-James test.
#[derive(Debug, Clone)]
pub struct WelchJamesResult {
    pub location: LocationEstimate,
    pub dispersion: Dispersion,
    pub test: ContrastTest,
    /// Closed-form or bootstrap p-value.
    pub p_value: f64,
    pub p_value_method: String,
    pub bootstrap: Option<BootstrapSummary>,
    /// Present only when effect sizes were enabled.
    pub effect_size: Option<EffectSize>,
    pub group_sizes: Vec<usize>,
    pub n_conditions: usize,
    /// Rows removed by the missing-value filter.
    pub n_dropped: usize,
}

impl WelchJamesResult {
    /// Cell locations, group-major then condition-minor.
    pub fn muhat(&self) -> &DVector<f64> {
        &self.location.muhat
    }

    pub fn sigma(&self) -> &DMatrix<f64> {
        &self.dispersion.sigma
    }

    /// Covariance rescaled for standardizing effect sizes.
    pub fn standardizer(&self) -> &DMatrix<f64> {
        &self.dispersion.standardizer
    }

    pub fn mse(&self) -> f64 {
        self.test.mse
    }

    /// Fixed result layout: F statistic, df1, df2, p-value, |effect size|,
    /// CI lower, CI upper, effect size multiplier. Effect size slots are NaN
    /// when no effect size was computed.
    pub fn results(&self) -> [f64; RESULTS_LEN] {
        let es = self.effect_size.unwrap_or_else(EffectSize::undefined);
        [
            self.test.f_statistic,
            self.test.df1,
            self.test.df2,
            self.p_value,
            es.estimate,
            es.ci_lower,
            es.ci_upper,
            es.multiplier,
        ]
    }

    /// Print a formatted summary of the test.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("=== Welch-James ADF Test ===\n\n");
        s.push_str(&format!(
            "Subjects: {}   Groups: {}   Conditions: {}\n",
            self.group_sizes.iter().sum::<usize>(),
            self.group_sizes.len(),
            self.n_conditions
        ));
        if self.n_dropped > 0 {
            s.push_str(&format!("Rows dropped (missing): {}\n", self.n_dropped));
        }
        s.push_str(&format!("p-value method: {}\n\n", self.p_value_method));

        s.push_str("--- Cell Locations ---\n");
        for (cell, m) in self.muhat().iter().enumerate() {
            let group = cell / self.n_conditions.max(1);
            let condition = cell % self.n_conditions.max(1);
            s.push_str(&format!("  group {} condition {}: {:.6}\n", group + 1, condition + 1, m));
        }

        s.push_str("\n--- Contrast Test ---\n");
        s.push_str(&format!(
            "{:>12} {:>10} {:>8} {:>10} {:>12}\n",
            "T", "F-stat", "NumDF", "DenDF", "Pr(>F)"
        ));
        s.push_str(&format!("{}\n", "-".repeat(56)));
        s.push_str(&format!(
            "{:>12.4} {:>10.4} {:>8} {:>10.2} {:>12.4e} {}\n",
            self.test.t_statistic,
            self.test.f_statistic,
            self.test.df1,
            self.test.df2,
            self.p_value,
            significance(self.p_value)
        ));
        s.push_str("---\nSignif. codes:  0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1 ' ' 1\n");
        s.push_str(&format!("MSE: {:.6}\n", self.mse()));

        if let Some(ref boot) = self.bootstrap {
            s.push_str(&format!(
                "\nBootstrap: {} resamples (seed {}), {} NaN, {} degenerate\n",
                boot.n_simulations, boot.seed, boot.n_nan, boot.n_degenerate
            ));
        }

        if let Some(es) = self.effect_size {
            s.push_str(&format!(
                "\nEffect size: {:.4}  CI [{:.4}, {:.4}]  multiplier {:.3}\n",
                es.estimate, es.ci_lower, es.ci_upper, es.multiplier
            ));
        }

        s
    }
}

fn significance(p: f64) -> &'static str {
    if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < 0.05 {
        "*"
    } else if p < 0.1 {
        "."
    } else {
        ""
    }
}
