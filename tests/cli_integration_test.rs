//! CLI integration tests.
//!
//! Tests cover:
//! - Dry-run validation of real INI files on disk
//! - Screened and explicit backtests against a CSV data directory
//! - The `condition` command
//! - `run_pipeline` with a mock data port

mod common;

use common::*;
use portfolio_backtester::cli::{self, Cli, Command};
use portfolio_backtester::domain::config_validation::load_run_settings;
use portfolio_backtester::domain::pipeline::Selection;
use portfolio_backtester::domain::screening::CandidateFilter;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// ExitCode has no PartialEq; compare through Debug.
fn assert_exit(actual: ExitCode, expected: ExitCode) {
    assert_eq!(format!("{actual:?}"), format!("{expected:?}"));
}

fn prices_csv(points: &[PricePoint]) -> String {
    let mut out = String::from("date,close\n");
    for p in points {
        writeln!(out, "{},{}", p.date.format("%Y-%m-%d"), p.close).unwrap();
    }
    out
}

fn write_csv_dataset(dir: &Path) {
    let mut analysis =
        String::from("code,name,annual_return,volatility,dividend_yield,liquidity\n");
    fs::create_dir_all(dir.join("prices")).unwrap();
    for (info, points) in [alpha(), beta(), gamma()] {
        writeln!(
            analysis,
            "{},{},{},{},{},{}",
            info.code,
            info.name,
            info.annual_return,
            info.volatility,
            info.dividend_yield,
            info.liquidity
        )
        .unwrap();
        fs::write(
            dir.join("prices").join(format!("{}.csv", info.code)),
            prices_csv(&points),
        )
        .unwrap();
    }
    fs::write(dir.join("stock_analysis.csv"), analysis).unwrap();
    fs::write(dir.join("benchmark.csv"), prices_csv(&benchmark_series())).unwrap();
}

fn csv_ini(dir: &Path) -> String {
    format!(
        r#"
[database]
backend = csv
csv_dir = {}

[backtest]
start_date = {}
end_date = {}
initial_capital = 100000000
risk_free_rate = 0.03

[portfolio]
min_weight = 0.05
max_weight = 0.9
target_return = 0.05

[screening]
n_stocks = 5
min_dividend = 1.0
min_liquidity = 500

[solver]
max_iterations = 500
timeout_ms = 5000
"#,
        dir.display(),
        start(),
        end()
    )
}

mod dry_run {
    use super::*;

    #[test]
    fn valid_config_succeeds() {
        let data = tempfile::TempDir::new().unwrap();
        let ini = write_temp_ini(&csv_ini(data.path()));
        let code = cli::run_dry_run(&ini.path().to_path_buf());
        assert_exit(code, ExitCode::SUCCESS);
    }

    #[test]
    fn missing_backend_is_config_error() {
        let ini = write_temp_ini("[backtest]\ninitial_capital = 1000\n");
        assert_exit(cli::run_dry_run(&ini.path().to_path_buf()), ExitCode::from(2));
    }

    #[test]
    fn unknown_backend_is_config_error() {
        let ini = write_temp_ini("[database]\nbackend = oracle\n");
        assert_exit(cli::run_dry_run(&ini.path().to_path_buf()), ExitCode::from(2));
    }

    #[test]
    fn inverted_weights_are_config_error() {
        let ini = write_temp_ini(
            "[database]\nbackend = csv\n[portfolio]\nmin_weight = 0.6\nmax_weight = 0.4\n",
        );
        assert_exit(cli::run_dry_run(&ini.path().to_path_buf()), ExitCode::from(2));
    }

    #[test]
    fn missing_file_fails_to_load() {
        let result = cli::load_config(&PathBuf::from("/nonexistent/portfolio.ini"));
        assert!(result.is_err());
    }
}

mod csv_backtests {
    use super::*;

    #[test]
    fn screened_backtest_writes_report() {
        let data = tempfile::TempDir::new().unwrap();
        write_csv_dataset(data.path());
        let ini = write_temp_ini(&csv_ini(data.path()));
        let out = data.path().join("report.json");

        let code = cli::run(Cli {
            command: Command::Backtest {
                config: ini.path().to_path_buf(),
                output: Some(out.clone()),
                dry_run: false,
            },
        });
        assert_exit(code, ExitCode::SUCCESS);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["portfolio"]["composition"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn dividend_screen_narrows_candidates() {
        let data = tempfile::TempDir::new().unwrap();
        write_csv_dataset(data.path());
        let ini = write_temp_ini(
            &csv_ini(data.path()).replace("min_dividend = 1.0", "min_dividend = 2.8"),
        );
        let out = data.path().join("report.json");

        let code = cli::run(Cli {
            command: Command::Backtest {
                config: ini.path().to_path_buf(),
                output: Some(out.clone()),
                dry_run: false,
            },
        });
        assert_exit(code, ExitCode::SUCCESS);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        let codes: Vec<&str> = json["portfolio"]["composition"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes.len(), 2);
        assert!(!codes.contains(&"B002"));
    }

    #[test]
    fn specific_backtest_with_names() {
        let data = tempfile::TempDir::new().unwrap();
        write_csv_dataset(data.path());
        let ini = write_temp_ini(&csv_ini(data.path()));
        let out = data.path().join("specific.json");

        let code = cli::run(Cli {
            command: Command::Specific {
                config: ini.path().to_path_buf(),
                names: "Alpha, Gamma".to_string(),
                output: Some(out.clone()),
            },
        });
        assert_exit(code, ExitCode::SUCCESS);
        assert!(out.exists());
    }

    #[test]
    fn specific_backtest_with_unknown_name_fails() {
        let data = tempfile::TempDir::new().unwrap();
        write_csv_dataset(data.path());
        let ini = write_temp_ini(&csv_ini(data.path()));

        let code = cli::run(Cli {
            command: Command::Specific {
                config: ini.path().to_path_buf(),
                names: "Alpha,Nowhere".to_string(),
                output: None,
            },
        });
        assert_exit(code, ExitCode::from(2));
    }

    #[test]
    fn search_and_list_names_succeed() {
        let data = tempfile::TempDir::new().unwrap();
        write_csv_dataset(data.path());
        let ini = write_temp_ini(&csv_ini(data.path()));

        let code = cli::run(Cli {
            command: Command::Search {
                config: ini.path().to_path_buf(),
                fragment: "amm".to_string(),
            },
        });
        assert_exit(code, ExitCode::SUCCESS);

        let code = cli::run(Cli {
            command: Command::ListNames {
                config: ini.path().to_path_buf(),
            },
        });
        assert_exit(code, ExitCode::SUCCESS);
    }

    #[test]
    fn missing_data_directory_is_database_error() {
        let ini = write_temp_ini(&csv_ini(Path::new("/nonexistent/krx")));
        let code = cli::run(Cli {
            command: Command::ListNames {
                config: ini.path().to_path_buf(),
            },
        });
        assert_exit(code, ExitCode::from(3));
    }
}

mod condition_command {
    use super::*;

    fn condition(style: &str, end_month: u32) -> Command {
        Command::Condition {
            n_stock: 5,
            min_dividend: 2.0,
            style: style.to_string(),
            start_year: 2020,
            start_month: 1,
            end_year: 2023,
            end_month,
        }
    }

    #[test]
    fn valid_condition_succeeds() {
        assert_exit(
            cli::run(Cli {
                command: condition("aggressive", 12),
            }),
            ExitCode::SUCCESS,
        );
    }

    #[test]
    fn korean_label_is_accepted() {
        assert_exit(
            cli::run(Cli {
                command: condition("안전추구형", 6),
            }),
            ExitCode::SUCCESS,
        );
    }

    #[test]
    fn invalid_month_is_validation_error() {
        assert_exit(
            cli::run(Cli {
                command: condition("neutral", 13),
            }),
            ExitCode::from(2),
        );
    }

    #[test]
    fn unknown_style_is_validation_error() {
        assert_exit(
            cli::run(Cli {
                command: condition("reckless", 12),
            }),
            ExitCode::from(2),
        );
    }
}

mod pipeline_with_mock {
    use super::*;

    #[test]
    fn run_pipeline_succeeds_with_mock_port() {
        let data = tempfile::TempDir::new().unwrap();
        let ini = write_temp_ini(&csv_ini(data.path()));
        let config = cli::load_config(&ini.path().to_path_buf()).unwrap();
        let settings = load_run_settings(&config).unwrap();

        let out = data.path().join("mock.json");
        let code = cli::run_pipeline(
            &standard_port(),
            &settings,
            Selection::Screen(CandidateFilter::default()),
            Some(&out),
        );
        assert_exit(code, ExitCode::SUCCESS);
        assert!(out.exists());
    }

    #[test]
    fn run_pipeline_maps_benchmark_failure_to_data_exit_code() {
        let data = tempfile::TempDir::new().unwrap();
        let ini = write_temp_ini(&csv_ini(data.path()));
        let config = cli::load_config(&ini.path().to_path_buf()).unwrap();
        let settings = load_run_settings(&config).unwrap();

        let code = cli::run_pipeline(
            &standard_port().with_benchmark_error("offline"),
            &settings,
            Selection::Screen(CandidateFilter::default()),
            None,
        );
        assert_exit(code, ExitCode::from(5));
    }
}
