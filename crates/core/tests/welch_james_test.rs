//! End-to-end tests of the Welch-James ADF analysis through the public API.

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use wjglm_core::data::ObservationTable;
use wjglm_core::inference::{BootstrapConfig, EffectSizeConfig, PValueMethod, Standardizer};
use wjglm_core::model::WelchJamesBuilder;
use wjglm_core::{Trimming, WjglmError};

const GROUP_A: [f64; 10] = [12.1, 9.8, 11.4, 10.2, 13.5, 8.9, 10.7, 11.9, 9.5, 12.6];
const GROUP_B: [f64; 10] = [15.2, 18.9, 13.1, 21.4, 16.8, 12.2, 19.5, 17.3, 14.6, 22.0];

fn two_groups() -> DMatrix<f64> {
    let values: Vec<f64> = GROUP_A.iter().chain(GROUP_B.iter()).copied().collect();
    DMatrix::from_column_slice(20, 1, &values)
}

fn mean_var(x: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

fn difference() -> DMatrix<f64> {
    DMatrix::from_row_slice(1, 2, &[1.0, -1.0])
}

#[test]
fn test_two_group_welch_statistic() {
    let result = WelchJamesBuilder::new()
        .data(two_groups())
        .group_sizes(&[10, 10])
        .between(difference())
        .build()
        .unwrap()
        .run()
        .unwrap();

    // Welch t-test computed by hand
    let (ma, va) = mean_var(&GROUP_A);
    let (mb, vb) = mean_var(&GROUP_B);
    let (wa, wb) = (va / 10.0, vb / 10.0);
    let t2 = (ma - mb).powi(2) / (wa + wb);
    let welch_df = (wa + wb).powi(2) / (wa * wa / 9.0 + wb * wb / 9.0);

    let r = result.results();
    assert_relative_eq!(r[0], t2, epsilon = 1e-6);
    assert_relative_eq!(r[1], 1.0);
    assert_relative_eq!(r[2], welch_df, epsilon = 1e-6);
    assert!(r[3] < 0.01, "groups differ clearly, p = {}", r[3]);
    assert!(r[4..].iter().all(|v| v.is_nan()));

    assert_relative_eq!(result.muhat()[0], ma, epsilon = 1e-10);
    assert_relative_eq!(result.muhat()[1], mb, epsilon = 1e-10);
}

#[test]
fn test_exact_p_value_close_to_approximation() {
    let build = |method| {
        WelchJamesBuilder::new()
            .data(two_groups())
            .group_sizes(&[10, 10])
            .between(difference())
            .p_value_method(method)
            .build()
            .unwrap()
            .run()
            .unwrap()
    };
    let approx = build(PValueMethod::PaulsonApprox);
    let exact = build(PValueMethod::IncompleteBeta);
    assert_eq!(approx.test.f_statistic, exact.test.f_statistic);
    assert!((approx.p_value - exact.p_value).abs() < 0.01);
    assert_eq!(exact.p_value_method, "IncompleteBeta");
}

#[test]
fn test_trimmed_mean_single_group() {
    // 1..=20 with the extremes replaced by outliers
    let mut values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
    values[0] = -500.0;
    values[19] = 900.0;
    let y = DMatrix::from_column_slice(20, 1, &values);

    let result = WelchJamesBuilder::new()
        .data(y)
        .trim(0.05)
        .build()
        .unwrap()
        .run()
        .unwrap();

    // g = floor(0.05 * 20) = 1 per tail: mean of 2..=19
    let central: f64 = (2..=19).map(|v| v as f64).sum::<f64>() / 18.0;
    assert_relative_eq!(result.muhat()[0], central, epsilon = 1e-10);
    assert_relative_eq!(result.location.df[0], 17.0);
    // Winsorized data replaces the outliers by the trim boundaries
    assert_eq!(result.location.y_transformed[(0, 0)], 2.0);
    assert_eq!(result.location.y_transformed[(19, 0)], 19.0);
}

#[test]
fn test_zero_trimming_matches_ordinary_means() {
    let plain = WelchJamesBuilder::new()
        .data(two_groups())
        .group_sizes(&[10, 10])
        .between(difference())
        .build()
        .unwrap()
        .run()
        .unwrap();
    let trimmed = WelchJamesBuilder::new()
        .data(two_groups())
        .group_sizes(&[10, 10])
        .between(difference())
        .trimming(Trimming::Symmetric(0.0))
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_relative_eq!(plain.test.f_statistic, trimmed.test.f_statistic, max_relative = 1e-10);
    assert_relative_eq!(plain.test.df2, trimmed.test.df2, max_relative = 1e-10);
    assert_eq!(plain.location.df, trimmed.location.df);
}

#[test]
fn test_within_contrast_equals_difference_scores() {
    let pre = [4.0, 5.5, 6.1, 3.9, 5.0, 7.2, 6.6, 5.8, 4.4, 6.9, 7.5, 8.1];
    let post = [5.1, 6.0, 7.9, 4.2, 6.3, 9.8, 8.0, 9.1, 6.0, 9.9, 10.4, 11.2];
    let mut y = DMatrix::zeros(12, 2);
    for i in 0..12 {
        y[(i, 0)] = pre[i];
        y[(i, 1)] = post[i];
    }
    let diffs = DMatrix::from_fn(12, 1, |i, _| pre[i] - post[i]);

    let repeated = WelchJamesBuilder::new()
        .data(y)
        .group_sizes(&[5, 7])
        .between(difference())
        .within(DMatrix::from_row_slice(2, 1, &[1.0, -1.0]))
        .build()
        .unwrap()
        .run()
        .unwrap();
    let scores = WelchJamesBuilder::new()
        .data(diffs)
        .group_sizes(&[5, 7])
        .between(difference())
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_relative_eq!(repeated.test.f_statistic, scores.test.f_statistic, max_relative = 1e-8);
    assert_relative_eq!(repeated.test.df2, scores.test.df2, max_relative = 1e-8);
    assert_eq!(repeated.muhat().len(), 4);
}

#[test]
fn test_multivariate_omnibus() {
    let y = DMatrix::from_fn(18, 3, |i, k| ((i * 7 + k * 3) % 11) as f64 + if i >= 9 { k as f64 } else { 0.0 });
    let result = WelchJamesBuilder::new()
        .data(y)
        .group_sizes(&[9, 9])
        .between(difference())
        .build()
        .unwrap()
        .run()
        .unwrap();

    // C (1 x 2) with U = I_3: three simultaneous constraints
    assert_eq!(result.test.df1, 3.0);
    assert!(result.test.df2 > 0.0);
    assert!((0.0..=1.0).contains(&result.p_value));
    assert_eq!(result.standardizer().shape(), (6, 6));
}

#[test]
fn test_bootstrap_is_deterministic() {
    let run = |parallel| {
        WelchJamesBuilder::new()
            .data(two_groups())
            .group_sizes(&[10, 10])
            .between(difference())
            .trim(0.1)
            .bootstrap(BootstrapConfig {
                n_simulations: 500,
                seed: Some(20240611),
                parallel,
                ..Default::default()
            })
            .build()
            .unwrap()
            .run()
            .unwrap()
    };
    let first = run(true);
    let second = run(false);

    let bits = |r: [f64; 8]| r.map(f64::to_bits);
    assert_eq!(bits(first.results()), bits(second.results()));
    assert_eq!(
        first.bootstrap.as_ref().unwrap().statistics,
        second.bootstrap.as_ref().unwrap().statistics
    );
    assert!((0.0..=1.0).contains(&first.p_value));
    assert_eq!(first.p_value_method, "bootstrap");
}

#[test]
fn test_bootstrap_p_value_stable_across_seeds() {
    let p_for = |seed| {
        WelchJamesBuilder::new()
            .data(two_groups())
            .group_sizes(&[10, 10])
            .between(DMatrix::from_row_slice(1, 2, &[1.0, -1.0]))
            .bootstrap(BootstrapConfig {
                n_simulations: 2000,
                seed: Some(seed),
                ..Default::default()
            })
            .build()
            .unwrap()
            .run()
            .unwrap()
            .p_value
    };
    let a = p_for(1);
    let b = p_for(2);
    assert!((0.0..=1.0).contains(&a) && (0.0..=1.0).contains(&b));
    assert!((a - b).abs() < 0.02, "p-values {} and {} differ too much", a, b);
}

#[test]
fn test_bootstrap_with_constant_group() {
    let mut values: Vec<f64> = GROUP_A.to_vec();
    values.extend(std::iter::repeat(5.0).take(8));
    let y = DMatrix::from_column_slice(18, 1, &values);

    let result = WelchJamesBuilder::new()
        .data(y)
        .group_sizes(&[10, 8])
        .between(difference())
        .bootstrap(BootstrapConfig {
            n_simulations: 1000,
            seed: Some(7),
            ..Default::default()
        })
        .build()
        .unwrap()
        .run()
        .unwrap();

    let boot = result.bootstrap.as_ref().unwrap();
    assert_eq!(boot.n_degenerate, 1000);
    assert!(result.p_value.is_finite());
    assert!((0.0..=1.0).contains(&result.p_value));
}

#[test]
fn test_effect_size_requires_opt_in() {
    let base = || {
        WelchJamesBuilder::new()
            .data(two_groups())
            .group_sizes(&[10, 10])
            .between(difference())
    };
    let gated = base()
        .effect_size(EffectSizeConfig::default())
        .build()
        .unwrap()
        .run()
        .unwrap();
    assert!(gated.effect_size.is_none());
    assert!(gated.results()[4..].iter().all(|v| v.is_nan()));

    let enabled = base()
        .effect_size(EffectSizeConfig {
            n_simulations: 600,
            standardizer: Standardizer::from_loc(1, 1).unwrap(),
            enable_experimental: true,
            seed: Some(99),
            ..Default::default()
        })
        .build()
        .unwrap()
        .run()
        .unwrap();
    let r = enabled.results();

    // |mean_A - mean_B| / sd_A
    let (ma, va) = mean_var(&GROUP_A);
    let (mb, _) = mean_var(&GROUP_B);
    assert_relative_eq!(r[4], (ma - mb).abs() / va.sqrt(), epsilon = 1e-10);
    assert!(r[5] <= r[4] && r[4] <= r[6], "CI [{}, {}] misses {}", r[5], r[6], r[4]);
    assert_eq!(r[7], 1.0);
}

#[test]
fn test_missing_rows_are_dropped() {
    let mut values: Vec<f64> = GROUP_A.iter().chain(GROUP_B.iter()).copied().collect();
    values[3] = -999.0;
    values[15] = -999.0;
    let y = DMatrix::from_column_slice(20, 1, &values);

    let filtered = WelchJamesBuilder::new()
        .data(y)
        .group_sizes(&[10, 10])
        .between(difference())
        .missing_value(-999.0)
        .build()
        .unwrap()
        .run()
        .unwrap();

    let kept: Vec<f64> = values.iter().copied().filter(|&v| v != -999.0).collect();
    let manual = WelchJamesBuilder::new()
        .data(DMatrix::from_column_slice(18, 1, &kept))
        .group_sizes(&[9, 9])
        .between(difference())
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(filtered.n_dropped, 2);
    assert_eq!(filtered.group_sizes, vec![9, 9]);
    assert_eq!(filtered.results()[..4], manual.results()[..4]);
}

#[test]
fn test_fatal_inputs() {
    let too_few = WelchJamesBuilder::new()
        .data(DMatrix::from_column_slice(5, 1, &[1.0, 2.0, 3.0, 4.0, 5.0]))
        .group_sizes(&[4, 1])
        .between(difference())
        .build()
        .unwrap()
        .run();
    assert!(matches!(too_few, Err(WjglmError::DegenerateGroup { group: 1, .. })));

    let empty_group = WelchJamesBuilder::new()
        .data(two_groups())
        .group_sizes(&[20, 0])
        .between(difference())
        .build();
    assert!(matches!(empty_group, Err(WjglmError::DegenerateGroup { .. })));
}

#[test]
fn test_csv_to_result() {
    use std::io::Write;

    let mut csv = String::from("subject,group,score\n");
    for (i, v) in GROUP_A.iter().enumerate() {
        csv.push_str(&format!("s{},control,{}\n", 2 * i, v));
        csv.push_str(&format!("s{},treated,{}\n", 2 * i + 1, GROUP_B[i]));
    }
    let path = std::env::temp_dir().join(format!("test_wjglm_end_to_end_{}.csv", std::process::id()));
    std::fs::File::create(&path)
        .unwrap()
        .write_all(csv.as_bytes())
        .unwrap();

    let table = ObservationTable::from_csv(&path, "group", &["score"]).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(table.group_names, vec!["control", "treated"]);
    let from_csv = WelchJamesBuilder::new()
        .data(table.y)
        .group_sizes(&table.group_sizes)
        .between(difference())
        .build()
        .unwrap()
        .run()
        .unwrap();
    let direct = WelchJamesBuilder::new()
        .data(two_groups())
        .group_sizes(&[10, 10])
        .between(difference())
        .build()
        .unwrap()
        .run()
        .unwrap();
    assert_relative_eq!(from_csv.test.f_statistic, direct.test.f_statistic, max_relative = 1e-12);
}

#[test]
fn test_equal_cell_means_give_unit_p_value() {
    // Different spreads, identical means (exactly 3.0 in both groups)
    let y = DMatrix::from_column_slice(10, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 0.0, 3.0, 3.0, 6.0, 3.0]);
    for method in [PValueMethod::PaulsonApprox, PValueMethod::IncompleteBeta] {
        let result = WelchJamesBuilder::new()
            .data(y.clone())
            .group_sizes(&[5, 5])
            .between(difference())
            .trimming(Trimming::Symmetric(0.0))
            .p_value_method(method)
            .build()
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(result.test.f_statistic, 0.0);
        assert_eq!(result.results()[3], 1.0, "{:?}", method);
    }
}
