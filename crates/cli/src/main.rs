use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nalgebra::DMatrix;

use wjglm_core as core;
use core::data::ObservationTable;
use core::inference::{BootstrapConfig, DegeneratePolicy, EffectSizeConfig, PValueMethod, Standardizer};
use core::model::{WelchJamesBuilder, DEFAULT_TRIM_FRACTION};
use core::WelchJamesResult;

#[derive(Parser)]
#[command(name = "wjglm")]
#[command(version)]
#[command(about = "Robust Welch-James ADF tests for between x within designs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test a between x within contrast with the Welch-James ADF statistic
    Test {
        /// Path to data CSV file (one row per subject)
        #[arg(short, long)]
        data: String,

        /// Group column name
        #[arg(short, long)]
        group: String,

        /// Comma-separated condition columns (e.g. "pre,post,followup")
        #[arg(short, long)]
        columns: String,

        /// Between-subject contrast, rows separated by ';' (e.g. "1,-1,0;0,1,-1").
        /// Defaults to a single-group test of the cell means.
        #[arg(long, allow_hyphen_values = true)]
        between: Option<String>,

        /// Within-subject contrasts over the conditions, one per ';'-separated
        /// entry. Defaults to the identity.
        #[arg(long, allow_hyphen_values = true)]
        within: Option<String>,

        /// Symmetric trimming fraction per tail (flag alone uses 0.20)
        #[arg(long)]
        trim: Option<Option<f64>>,

        /// Number of bootstrap resamples for the p-value
        #[arg(long)]
        bootstrap: Option<usize>,

        /// Random seed (0 = derive from the clock)
        #[arg(long)]
        seed: Option<u64>,

        /// Drop bootstrap resamples with a zero-variance cell
        #[arg(long)]
        exclude_degenerate: bool,

        /// Evaluate bootstrap resamples on a single thread
        #[arg(long)]
        sequential: bool,

        /// Missing-value code; rows containing it are dropped. Empty/NA cells
        /// are dropped by default when no code is given.
        #[arg(long, allow_hyphen_values = true)]
        missing: Option<f64>,

        /// Significance level for the effect size interval
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Closed-form p-value: "approx" (default) or "exact"
        #[arg(long, default_value = "approx")]
        p_value: String,

        /// Request an effect size with a bootstrap interval
        #[arg(long)]
        effect_size: bool,

        /// Actually compute the requested effect size
        #[arg(long)]
        experimental_effect_size: bool,

        /// Resamples for the effect size interval
        #[arg(long, default_value = "999")]
        effect_size_resamples: usize,

        /// Standardizer group: 99 = none, 0 = pooled cells, else 1-based group
        #[arg(long, default_value = "1")]
        loc1: usize,

        /// Standardizer condition (1-based)
        #[arg(long, default_value = "1")]
        loc2: usize,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Test {
            data,
            group,
            columns,
            between,
            within,
            trim,
            bootstrap,
            seed,
            exclude_degenerate,
            sequential,
            missing,
            alpha,
            p_value,
            effect_size,
            experimental_effect_size,
            effect_size_resamples,
            loc1,
            loc2,
            format,
        } => {
            let columns: Vec<&str> = columns.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
            let table = ObservationTable::from_csv(&data, &group, &columns)
                .with_context(|| format!("Failed to load data from '{}'", data))?;

            eprintln!(
                "Loaded {} subjects in {} groups ({}) over {} conditions from '{}'",
                table.y.nrows(),
                table.group_sizes.len(),
                table.group_names.join(", "),
                table.y.ncols(),
                data
            );

            let mut builder = WelchJamesBuilder::new()
                .data(table.y.clone())
                .group_sizes(&table.group_sizes)
                .alpha(alpha);

            if let Some(rows) = between {
                builder = builder.between(parse_rows(&rows).context("Invalid --between contrast")?);
            }
            if let Some(text) = within {
                let rows = parse_rows(&text).context("Invalid --within contrast")?;
                builder = builder.within(rows.transpose());
            }
            if let Some(per) = trim {
                builder = builder.trim(per.unwrap_or(DEFAULT_TRIM_FRACTION));
            }
            match missing {
                Some(code) => builder = builder.missing_value(code),
                None if table.n_missing_cells > 0 => {
                    eprintln!(
                        "{} empty or NA cells found; dropping those rows (use --missing to choose another code)",
                        table.n_missing_cells
                    );
                    builder = builder.missing_value(f64::NAN);
                }
                None => {}
            }

            let parallel = !sequential;
            if let Some(n_simulations) = bootstrap {
                builder = builder.bootstrap(BootstrapConfig {
                    n_simulations,
                    seed,
                    parallel,
                    degenerate_policy: if exclude_degenerate {
                        DegeneratePolicy::Exclude
                    } else {
                        DegeneratePolicy::Keep
                    },
                });
            }
            if effect_size {
                let standardizer = Standardizer::from_loc(loc1, loc2).context("Invalid --loc1/--loc2")?;
                builder = builder.effect_size(EffectSizeConfig {
                    n_simulations: effect_size_resamples,
                    standardizer,
                    enable_experimental: experimental_effect_size,
                    parallel,
                    seed,
                    ..Default::default()
                });
            }

            let method = match p_value.to_lowercase().as_str() {
                "approx" | "paulson" => PValueMethod::PaulsonApprox,
                "exact" | "beta" => PValueMethod::IncompleteBeta,
                other => anyhow::bail!("Unknown p-value method '{}'. Use 'approx' (default) or 'exact'.", other),
            };

            let model = builder
                .p_value_method(method)
                .build()
                .context("Failed to set up the Welch-James test")?;
            let result = model.run().context("Welch-James test failed")?;

            match format.to_lowercase().as_str() {
                "json" => print_json(&result, &table)?,
                _ => println!("{}", result.summary()),
            }
            Ok(())
        }
    }
}

/// Parse "a,b;c,d" into a row-major matrix.
fn parse_rows(text: &str) -> Result<DMatrix<f64>> {
    let rows: Vec<Vec<f64>> = text
        .split(';')
        .map(|row| {
            row.split(',')
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .with_context(|| format!("'{}' is not a number", v.trim()))
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<_>>()?;

    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != ncols) {
        anyhow::bail!("every contrast row needs {} entries", ncols);
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(DMatrix::from_row_slice(rows.len(), ncols, &flat))
}

fn print_json(result: &WelchJamesResult, table: &ObservationTable) -> Result<()> {
    let mut map = serde_json::Map::new();

    map.insert("groups".to_string(), serde_json::json!(table.group_names));
    map.insert("conditions".to_string(), serde_json::json!(table.condition_names));
    map.insert("group_sizes".to_string(), serde_json::json!(result.group_sizes));
    map.insert("n_dropped".to_string(), serde_json::json!(result.n_dropped));
    map.insert(
        "muhat".to_string(),
        serde_json::json!(result.muhat().iter().copied().collect::<Vec<f64>>()),
    );

    let test = &result.test;
    map.insert(
        "test".to_string(),
        serde_json::json!({
            "t_statistic": test.t_statistic,
            "f_statistic": test.f_statistic,
            "df1": test.df1,
            "df2": test.df2,
            "adf_correction": test.adf_correction,
            "p_value": result.p_value,
            "p_value_method": result.p_value_method,
            "mse": test.mse,
        }),
    );
    map.insert("results".to_string(), serde_json::json!(result.results().to_vec()));

    let stdizer = result.standardizer();
    let rows: Vec<Vec<f64>> = (0..stdizer.nrows())
        .map(|i| stdizer.row(i).iter().copied().collect())
        .collect();
    map.insert("standardizer".to_string(), serde_json::json!(rows));

    if let Some(ref boot) = result.bootstrap {
        map.insert(
            "bootstrap".to_string(),
            serde_json::json!({
                "n_simulations": boot.n_simulations,
                "seed": boot.seed,
                "n_nan": boot.n_nan,
                "n_degenerate": boot.n_degenerate,
            }),
        );
    }
    if let Some(es) = result.effect_size {
        map.insert(
            "effect_size".to_string(),
            serde_json::json!({
                "estimate": es.estimate,
                "ci_lower": es.ci_lower,
                "ci_upper": es.ci_upper,
                "multiplier": es.multiplier,
            }),
        );
    }

    let json_str = serde_json::to_string_pretty(&serde_json::Value::Object(map))?;
    println!("{}", json_str);
    Ok(())
}
