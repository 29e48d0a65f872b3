//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::backend::{DataBackend, open_data_port};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report::JsonReportAdapter;
use crate::domain::config_validation::{RunSettings, load_candidate_filter, load_run_settings};
use crate::domain::error::PortfolioError;
use crate::domain::pipeline::{BacktestReport, Selection, execute};
use crate::domain::screening::{BacktestingPeriod, Condition, InvestmentStyle};
use crate::domain::selection::parse_names;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "portfolio-backtester",
    about = "Mean-variance portfolio allocation and buy-and-hold backtesting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Screen candidates from [screening] and backtest them
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Backtest an explicit list of instrument names
    Specific {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated instrument names
        #[arg(short, long)]
        names: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Search instruments whose name contains a fragment
    Search {
        #[arg(short, long)]
        config: PathBuf,
        fragment: String,
    },
    /// List every instrument name
    ListNames {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a screening condition and print the resolved style preset
    Condition {
        #[arg(long)]
        n_stock: i64,
        /// Minimum dividend yield in percent
        #[arg(long)]
        min_dividend: f64,
        #[arg(long)]
        style: String,
        #[arg(long)]
        start_year: i32,
        #[arg(long)]
        start_month: u32,
        #[arg(long)]
        end_year: i32,
        #[arg(long)]
        end_month: u32,
    },
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_ref())
            }
        }
        Command::Specific {
            config,
            names,
            output,
        } => run_specific(&config, &names, output.as_ref()),
        Command::Search { config, fragment } => run_search(&config, &fragment),
        Command::ListNames { config } => run_list_names(&config),
        Command::Condition {
            n_stock,
            min_dividend,
            style,
            start_year,
            start_month,
            end_year,
            end_month,
        } => run_condition(Condition {
            n_stock,
            min_dividend,
            investment_style: style,
            backtesting_period: BacktestingPeriod {
                start_year,
                start_month,
                end_year,
                end_month,
            },
        }),
        Command::Serve { config } => run_serve(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PortfolioError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: PortfolioError) -> ExitCode {
    tracing::error!(kind = err.kind(), "{err}");
    eprintln!("error: {err}");
    (&err).into()
}

fn run_backtest(config_path: &PathBuf, output_path: Option<&PathBuf>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let settings = match load_run_settings(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let filter = match load_candidate_filter(&config) {
        Ok(f) => f,
        Err(e) => return fail(e),
    };
    eprintln!("Screening: {filter}");

    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    run_pipeline(&*data_port, &settings, Selection::Screen(filter), output_path)
}

fn run_specific(config_path: &PathBuf, names: &str, output_path: Option<&PathBuf>) -> ExitCode {
    let names = match parse_names(names) {
        Ok(n) => n,
        Err(e) => return fail(e),
    };

    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let settings = match load_run_settings(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    eprintln!("Instruments: {}", names.join(", "));

    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    run_pipeline(&*data_port, &settings, Selection::Explicit(names), output_path)
}

/// Runs the pipeline, prints the console summary and writes the report.
///
/// Without `--output` the metrics JSON goes to stdout.
pub fn run_pipeline(
    data_port: &dyn DataPort,
    settings: &RunSettings,
    selection: Selection,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    let request = settings.request(selection);
    eprintln!(
        "Running backtest {} to {} (capital {:.0})",
        request.start_date, request.end_date, request.initial_capital
    );

    let report = match execute(data_port, &request) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    print_summary(&report);

    match output_path {
        Some(path) => {
            let path_str = path.display().to_string();
            if let Err(e) = JsonReportAdapter.write(&report, &path_str) {
                return fail(e);
            }
            eprintln!("\nReport written to {path_str}");
        }
        None => match serde_json::to_string_pretty(&report.metrics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                return fail(PortfolioError::Computation {
                    reason: format!("failed to serialize metrics: {e}"),
                });
            }
        },
    }
    ExitCode::SUCCESS
}

fn print_summary(report: &BacktestReport) {
    let p = &report.metrics.portfolio;
    let b = &report.metrics.benchmark;

    eprintln!("\nComposition:");
    for entry in &p.composition {
        eprintln!(
            "  {:<10} {:<20} {:>7.2}%  (dividend {:.2}%)",
            entry.code,
            entry.name,
            entry.weight * 100.0,
            entry.dividend_yield * 100.0
        );
    }

    if !report.dropped.is_empty() {
        eprintln!("\nDropped instruments:");
        for d in &report.dropped {
            eprintln!("  {} ({}): {}", d.code, d.name, d.reason);
        }
    }

    eprintln!("\nResults:");
    eprintln!("  {:<20} {:>18} {:>18}", "", "Portfolio", "Benchmark");
    eprintln!(
        "  {:<20} {:>18.2} {:>18.2}",
        "Final Value", p.final_value, b.final_value
    );
    eprintln!(
        "  {:<20} {:>17.2}% {:>17.2}%",
        "Total Return",
        p.total_return * 100.0,
        b.total_return * 100.0
    );
    eprintln!(
        "  {:<20} {:>17.2}% {:>17.2}%",
        "Annual Volatility",
        p.annual_volatility * 100.0,
        b.annual_volatility * 100.0
    );
    eprintln!("  {:<20} {:>18.4}", "Sharpe Ratio", p.sharpe_ratio);
    eprintln!("  {:<20} {:>17.2}%", "Max Drawdown", p.max_drawdown * 100.0);
    eprintln!("  {:<20} {:>17.2}%", "Win Rate", p.win_rate * 100.0);

    if !report.metrics.individual_stocks.is_empty() {
        eprintln!("\nIndividual instruments:");
        for s in &report.metrics.individual_stocks {
            eprintln!(
                "  {:<10} {:<20} return {:>8.2}%  volatility {:>7.2}%",
                s.code,
                s.name,
                s.total_return * 100.0,
                s.volatility * 100.0
            );
        }
    }
}

pub fn run_dry_run(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let settings = match load_run_settings(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let filter = match load_candidate_filter(&config) {
        Ok(f) => f,
        Err(e) => return fail(e),
    };
    let backend = match DataBackend::from_config(&config) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    eprintln!("Config validated successfully");

    eprintln!("\nBacktest:");
    eprintln!("  window: {} to {}", settings.start_date, settings.end_date);
    eprintln!("  initial_capital: {:.0}", settings.initial_capital);
    eprintln!("  risk_free_rate: {}", settings.risk_free_rate);

    let c = &settings.constraints;
    eprintln!("\nAllocation:");
    eprintln!("  weights: [{}, {}]", c.min_weight, c.max_weight);
    eprintln!("  target_return: {}", c.target_return);
    eprintln!(
        "  solver: {} iterations, {} ms",
        settings.solver.max_iterations,
        settings.solver.timeout.as_millis()
    );

    eprintln!("\nScreening:");
    eprintln!("  {filter}");
    eprintln!("\nData backend: {backend}");

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_search(config_path: &PathBuf, fragment: &str) -> ExitCode {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return fail(PortfolioError::validation("fragment", "must not be empty"));
    }

    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let rows = match data_port.search_names(fragment) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if rows.is_empty() {
        eprintln!("No instruments match '{fragment}'");
    } else {
        for row in &rows {
            println!(
                "{}\t{}\treturn={:.4}\tvolatility={:.4}\tdividend={:.4}",
                row.code, row.name, row.annual_return, row.volatility, row.dividend_yield
            );
        }
        eprintln!("{} instruments found", rows.len());
    }
    ExitCode::SUCCESS
}

fn run_list_names(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let names = match data_port.list_names() {
        Ok(n) => n,
        Err(e) => return fail(e),
    };

    if names.is_empty() {
        eprintln!("No instruments found");
    } else {
        for name in &names {
            println!("{name}");
        }
        eprintln!("{} instruments found", names.len());
    }
    ExitCode::SUCCESS
}

fn run_condition(condition: Condition) -> ExitCode {
    let resolved = match condition.resolve() {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Label lookup cannot fail once resolve succeeded.
    if let Ok(style) = resolved.condition.investment_style.parse::<InvestmentStyle>() {
        eprintln!("Style: {} ({})", style.key(), style.label());
    }
    eprintln!("  max_volatility: {}", resolved.max_volatility);
    eprintln!("  target_return: {}", resolved.target_return);
    eprintln!("  screening: {}", resolved.candidate_filter());

    match serde_json::to_string_pretty(&resolved) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(PortfolioError::Computation {
            reason: format!("failed to serialize condition: {e}"),
        }),
    }
}

fn run_serve(config_path: &PathBuf) -> ExitCode {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, DEFAULT_LISTEN, build_router};
        use crate::ports::config_port::ConfigPort;
        use std::net::SocketAddr;
        use std::sync::Arc;

        eprintln!("Loading config from {}", config_path.display());
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let data_port: Arc<dyn DataPort + Send + Sync> = match open_data_port(&config) {
            Ok(p) => Arc::from(p),
            Err(e) => return fail(e),
        };

        let listen = config
            .get_string("web", "listen")
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let addr: SocketAddr = match listen.parse() {
            Ok(a) => a,
            Err(e) => {
                return fail(PortfolioError::ConfigInvalid {
                    section: "web".into(),
                    key: "listen".into(),
                    reason: format!("{e}"),
                });
            }
        };

        let router = build_router(AppState {
            data_port,
            config: Arc::new(config),
        });

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(r) => r,
            Err(e) => return fail(e.into()),
        };

        eprintln!("Starting web server on {addr}");
        let served: Result<(), std::io::Error> = runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await
        });

        match served {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(e.into()),
        }
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        eprintln!("error: web feature is required for serve");
        ExitCode::from(1)
    }
}
