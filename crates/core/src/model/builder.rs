use nalgebra::DMatrix;

use crate::analysis::{self, WelchJamesResult};
use crate::data::{count_missing, drop_missing};
use crate::error::{Result, WjglmError};
use crate::estimate::{Trimming, MAX_TRIM_FRACTION};
use crate::inference::{BootstrapConfig, EffectSizeConfig, PValueMethod};

use super::design::GroupLayout;
use super::fit::TestDesign;

/// Trimming fraction used when trimming is switched on without a value.
pub const DEFAULT_TRIM_FRACTION: f64 = 0.20;

/// Options of one Welch-James analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub trimming: Trimming,
    /// Bootstrap null distribution; `None` uses the closed-form p-value.
    pub bootstrap: Option<BootstrapConfig>,
    /// Effect size request; only honoured with `enable_experimental`.
    pub effect_size: Option<EffectSizeConfig>,
    pub alpha: f64,
    /// Rows containing this code are removed before fitting.
    pub missing_value: Option<f64>,
    pub p_value_method: PValueMethod,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trimming: Trimming::None,
            bootstrap: None,
            effect_size: None,
            alpha: 0.05,
            missing_value: None,
            p_value_method: PValueMethod::PaulsonApprox,
        }
    }
}

/// A validated analysis, ready to run.
#[derive(Debug, Clone)]
pub struct WelchJamesModel {
    /// Observations after missing-value filtering.
    pub y: DMatrix<f64>,
    pub design: TestDesign,
    pub config: AnalysisConfig,
    /// Rows removed by the missing-value filter.
    pub n_dropped: usize,
}

impl WelchJamesModel {
    /// Fit the test and compute the p-value (and effect size, if enabled).
    pub fn run(&self) -> Result<WelchJamesResult> {
        analysis::run(self)
    }
}

/// Builder for constructing a [`WelchJamesModel`].
#[derive(Debug, Clone, Default)]
pub struct WelchJamesBuilder {
    y: Option<DMatrix<f64>>,
    group_sizes: Vec<usize>,
    between: Option<DMatrix<f64>>,
    within: Option<DMatrix<f64>>,
    config: AnalysisConfig,
}

impl WelchJamesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the (N x W) observation matrix, group blocks stacked in order.
    pub fn data(mut self, y: DMatrix<f64>) -> Self {
        self.y = Some(y);
        self
    }

    /// Set the group sizes. An empty list means a single group.
    pub fn group_sizes(mut self, sizes: &[usize]) -> Self {
        self.group_sizes = sizes.to_vec();
        self
    }

    /// Set the between-subject contrast C (rows x G).
    pub fn between(mut self, c: DMatrix<f64>) -> Self {
        self.between = Some(c);
        self
    }

    /// Set the within-subject contrast U (W x columns).
    pub fn within(mut self, u: DMatrix<f64>) -> Self {
        self.within = Some(u);
        self
    }

    pub fn trimming(mut self, trimming: Trimming) -> Self {
        self.config.trimming = trimming;
        self
    }

    /// Symmetric trimming with the given per-tail fraction.
    pub fn trim(self, fraction: f64) -> Self {
        self.trimming(Trimming::Symmetric(fraction))
    }

    pub fn bootstrap(mut self, config: BootstrapConfig) -> Self {
        self.config.bootstrap = Some(config);
        self
    }

    pub fn effect_size(mut self, config: EffectSizeConfig) -> Self {
        self.config.effect_size = Some(config);
        self
    }

    /// Set the significance level for the effect size interval (default: 0.05).
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;
        self
    }

    pub fn missing_value(mut self, code: f64) -> Self {
        self.config.missing_value = Some(code);
        self
    }

    pub fn p_value_method(mut self, method: PValueMethod) -> Self {
        self.config.p_value_method = method;
        self
    }

    /// Replace every option at once.
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Normalize defaults, validate the inputs and assemble the design.
    ///
    /// An empty C or `[0]` becomes `[1]`, an empty U or `[0]` becomes the
    /// W x W identity. All shape checks happen here so that no output is
    /// produced for an inconsistent call.
    pub fn build(self) -> Result<WelchJamesModel> {
        let y = self
            .y
            .ok_or_else(|| WjglmError::Data("No observation matrix provided".into()))?;
        if y.nrows() == 0 || y.ncols() == 0 {
            return Err(WjglmError::Data("observation matrix is empty".into()));
        }

        let sizes = if self.group_sizes.is_empty() {
            vec![y.nrows()]
        } else {
            self.group_sizes
        };
        let c = match self.between {
            Some(c) if !is_placeholder(&c) => c,
            _ => DMatrix::from_element(1, 1, 1.0),
        };
        let u = match self.within {
            Some(u) if !is_placeholder(&u) => u,
            _ => DMatrix::identity(y.ncols(), y.ncols()),
        };

        if sizes.len() != c.ncols() {
            return Err(WjglmError::DimensionMismatch {
                expected: c.ncols(),
                got: sizes.len(),
                context: "number of between group cells vs. terms in contrast C".into(),
            });
        }
        if y.ncols() != u.nrows() {
            return Err(WjglmError::DimensionMismatch {
                expected: u.nrows(),
                got: y.ncols(),
                context: "number of within group cells vs. terms in contrast U".into(),
            });
        }
        if u.ncols() > u.nrows() {
            return Err(WjglmError::InvalidParameter(format!(
                "within contrast has {} columns but only {} conditions",
                u.ncols(),
                u.nrows()
            )));
        }

        let config = self.config;
        validate_config(&config, sizes.len(), y.ncols())?;

        if config.missing_value.is_none() {
            let n_nan = count_missing(&y, f64::NAN);
            if n_nan > 0 {
                log::warn!(
                    "{} NaN cells and no missing-value code; they will propagate into the results",
                    n_nan
                );
            }
        }

        let (y, sizes, n_dropped) = match config.missing_value {
            Some(code) => {
                let filtered = drop_missing(&y, &sizes, code)?;
                (filtered.y, filtered.group_sizes, filtered.n_dropped)
            }
            None => (y, sizes, 0),
        };

        let total: usize = sizes.iter().sum();
        if total != y.nrows() {
            return Err(WjglmError::DimensionMismatch {
                expected: y.nrows(),
                got: total,
                context: "number of subjects vs. sum of group sizes".into(),
            });
        }

        let layout = GroupLayout::new(&sizes)?;
        let design = TestDesign::new(layout, &c, &u, config.trimming)?;

        log::debug!(
            "design: N = {}, G = {}, W = {}, df1 = {}, trimming = {:.2}",
            y.nrows(),
            sizes.len(),
            y.ncols(),
            design.df1(),
            config.trimming.fraction()
        );

        Ok(WelchJamesModel {
            y,
            design,
            config,
            n_dropped,
        })
    }
}

fn is_placeholder(m: &DMatrix<f64>) -> bool {
    m.is_empty() || (m.shape() == (1, 1) && m[(0, 0)] == 0.0)
}

fn validate_config(config: &AnalysisConfig, n_groups: usize, n_conditions: usize) -> Result<()> {
    let per = config.trimming.fraction();
    if !(0.0..=MAX_TRIM_FRACTION).contains(&per) {
        return Err(WjglmError::InvalidParameter(format!(
            "trimming fraction must lie in [0, {}], got {}",
            MAX_TRIM_FRACTION, per
        )));
    }
    if !(config.alpha > 0.0 && config.alpha < 1.0) {
        return Err(WjglmError::InvalidParameter(format!(
            "alpha must lie in (0, 1), got {}",
            config.alpha
        )));
    }
    if let Some(ref boot) = config.bootstrap {
        if boot.n_simulations == 0 {
            return Err(WjglmError::InvalidParameter(
                "bootstrap needs at least one simulation".into(),
            ));
        }
    }
    if let Some(ref es) = config.effect_size {
        if es.n_simulations == 0 {
            return Err(WjglmError::InvalidParameter(
                "effect size interval needs at least one simulation".into(),
            ));
        }
        es.standardizer.validate(n_groups, n_conditions)?;
    }
    Ok(())
}
