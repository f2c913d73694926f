use std::sync::Arc;

use clap::{Parser, Subcommand};

use admitdash::{
    FixtureGateway, MetricKind, MetricSeries, MetricsClient, PeriodType, RetrievalRequest, Tier,
};

#[derive(Parser)]
#[command(name = "admitdash", about = "Admissions pipeline metrics CLI")]
struct Cli {
    /// JSON fixture file backing the gateway (default: none, every metric
    /// degrades to synthetic data)
    #[arg(long)]
    fixture: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one metric family over the lookback window
    Show {
        /// Metric name, e.g. leads-created, closed-won, cumulative-arr
        metric: String,
        /// Bucket granularity: day, week, or month
        #[arg(long, default_value = "week")]
        period_type: String,
        /// Number of periods to look back
        #[arg(long, default_value = "12")]
        lookback: u32,
        /// Filter to one campus
        #[arg(long)]
        campus: Option<String>,
        /// Output the full series as JSON
        #[arg(long)]
        json: bool,
    },
    /// Latest totals and period-over-period change for every metric family
    Summary {
        /// Bucket granularity: day, week, or month
        #[arg(long, default_value = "week")]
        period_type: String,
        /// Number of periods to look back
        #[arg(long, default_value = "12")]
        lookback: u32,
        /// Filter to one campus
        #[arg(long)]
        campus: Option<String>,
    },
    /// List the available metric families
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let gateway = match &cli.fixture {
        Some(path) => FixtureGateway::from_file(path)?,
        None => FixtureGateway::new(),
    };
    let client = MetricsClient::new(Arc::new(gateway));

    match cli.command {
        Commands::Show {
            metric,
            period_type,
            lookback,
            campus,
            json,
        } => {
            let kind = MetricKind::parse(&metric)?;
            let request = RetrievalRequest {
                period_type: PeriodType::parse(&period_type)?,
                lookback_units: lookback,
                campus_filter: campus,
                ..Default::default()
            };
            let outcome = client.fetch(kind, &request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.series)?);
            } else {
                print_series(kind, &outcome.series, outcome.tier);
            }
        }
        Commands::Summary {
            period_type,
            lookback,
            campus,
        } => {
            let request = RetrievalRequest {
                period_type: PeriodType::parse(&period_type)?,
                lookback_units: lookback,
                campus_filter: campus,
                ..Default::default()
            };
            println!(
                "{:<24} {:>14} {:>10} {:>9}  {}",
                "METRIC", "LATEST", "CHANGE", "CHANGE%", "SOURCE"
            );
            for kind in MetricKind::all() {
                let outcome = client.fetch(kind, &request).await?;
                let series = &outcome.series;
                let (raw, pct) = latest_change(series);
                println!(
                    "{:<24} {:>14.0} {:>10} {:>9}  {}",
                    kind.to_string(),
                    series.latest_total,
                    raw,
                    pct,
                    outcome.tier
                );
            }
        }
        Commands::List => {
            for kind in MetricKind::all() {
                println!("{}", kind.config().name.replace('_', "-"));
            }
        }
    }

    Ok(())
}

/// Latest period's deltas formatted for display; the oldest period (and an
/// empty series) shows as a dash, not a measured zero.
fn latest_change(series: &MetricSeries) -> (String, String) {
    let latest = match series.latest_period {
        Some(p) => p,
        None => return ("—".into(), "—".into()),
    };
    if series.periods.len() < 2 {
        return ("—".into(), "—".into());
    }
    let raw = series.changes.raw.get(&latest).copied().unwrap_or(0.0);
    let pct = series
        .changes
        .percentage
        .get(&latest)
        .copied()
        .unwrap_or(0.0);
    (format!("{raw:+.0}"), format!("{pct:+.1}%"))
}

fn print_series(kind: MetricKind, series: &MetricSeries, tier: Tier) {
    println!("{} (served by {tier})", kind);
    if series.is_empty() {
        println!("  no data in window");
        return;
    }

    println!("{:<18} {:>12} {:>10} {:>9}", "PERIOD", "TOTAL", "CHANGE", "CHANGE%");
    for (i, entry) in series.time_series.iter().enumerate() {
        let (raw, pct) = if i == 0 {
            ("—".to_string(), "—".to_string())
        } else {
            (
                format!("{:+.0}", series.changes.raw[&entry.period]),
                format!("{:+.1}%", series.changes.percentage[&entry.period]),
            )
        };
        println!(
            "{:<18} {:>12.0} {:>10} {:>9}",
            entry.display_label, entry.total, raw, pct
        );
    }

    println!();
    println!("{:<18} {:>12}", "CAMPUS", "TOTAL");
    for (campus, total) in &series.campus_totals {
        println!("{campus:<18} {total:>12.0}");
    }
}
