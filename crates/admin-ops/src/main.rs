//! 선물 데이터 관리 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 데이터베이스와 게이트웨이 연결 테스트
//! futures-admin test
//!
//! # NQ 계약 검색 및 데이터 보유 현황 확인
//! futures-admin search NQ --exchange CME
//!
//! # 최근 7일 분봉 다운로드
//! futures-admin download NQH24 ESH24 --days 7 --minutes
//!
//! # 스키마 초기화 / 요약 조회
//! futures-admin init
//! futures-admin view
//! ```

use admin_core::{init_logging, AppConfig, BarKind, DatabaseOperations, OperationResult, ProgressSink};
use admin_data::TimescaleOperations;
use admin_gateway::{
    ConfigCredentials, ConnectionManager, ConnectionSettings, SimulatedClientFactory,
    SimulatedGateway,
};
use admin_ops::OperationsCoordinator;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "futures-admin")]
#[command(about = "Futures market data admin tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (기본: config/admin.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 결과를 JSON envelope으로 출력
    #[arg(long, global = true, default_value = "false")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 데이터베이스와 게이트웨이 연결 테스트
    Test,

    /// 심볼 검색 및 데이터베이스 보유 현황 확인
    Search {
        /// 검색어 (와일드카드 `*`, `?` 지원, 예: NQ, NQ?24)
        term: String,

        /// 거래소
        #[arg(short, long, default_value = "CME")]
        exchange: String,
    },

    /// 과거 데이터 다운로드
    Download {
        /// 계약 코드 (예: NQH24, ESM24.CME)
        #[arg(required = true)]
        contracts: Vec<String>,

        /// 다운로드 기간 (일, 기본: 설정값)
        #[arg(short, long)]
        days: Option<u32>,

        /// 초봉만 다운로드
        #[arg(long, conflicts_with = "minutes")]
        seconds: bool,

        /// 분봉만 다운로드
        #[arg(long)]
        minutes: bool,
    },

    /// 데이터베이스 요약 조회
    View,

    /// 데이터베이스 스키마 초기화
    Init,

    /// 시스템 상태 조회
    Status,
}

fn bar_kinds(seconds: bool, minutes: bool) -> Vec<BarKind> {
    match (seconds, minutes) {
        (true, false) => vec![BarKind::Seconds],
        (false, true) => vec![BarKind::Minutes],
        _ => vec![BarKind::Seconds, BarKind::Minutes],
    }
}

fn progress_bar(hidden: bool) -> anyhow::Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn print_result(result: &OperationResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if result.is_success() {
        println!("{}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
    }
    Ok(())
}

async fn run(
    coordinator: &OperationsCoordinator,
    command: Commands,
    default_days: u32,
    pb: &ProgressBar,
) -> OperationResult {
    match command {
        Commands::Test => coordinator.test_connections().await,
        Commands::Search { term, exchange } => {
            coordinator.search_and_check_symbols(&term, &exchange).await
        }
        Commands::Download {
            contracts,
            days,
            seconds,
            minutes,
        } => {
            let kinds = bar_kinds(seconds, minutes);
            let result = coordinator
                .download_historical_data(&contracts, days.unwrap_or(default_days), &kinds)
                .await;
            pb.finish_with_message(if result.is_success() { "done" } else { "failed" });
            result
        }
        Commands::View => coordinator.view_database().await,
        Commands::Init => coordinator.initialize_database().await,
        Commands::Status => coordinator.get_system_status(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_logging(config.logging.to_log_config())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    info!("Futures admin 시작");

    let database: Option<Arc<dyn DatabaseOperations>> =
        match TimescaleOperations::from_config(&config.database) {
            Ok(ops) => Some(Arc::new(
                ops.with_batch_size(config.download.insert_batch_size),
            )),
            Err(e) => {
                warn!(error = %e, database = %config.database.display_target(), "데이터베이스 사용 불가");
                None
            }
        };

    let factory = Arc::new(SimulatedClientFactory::new(Arc::new(SimulatedGateway::default())));
    let credentials = Arc::new(ConfigCredentials::new(cli.config.clone()));
    let connection =
        ConnectionManager::new(ConnectionSettings::from_config(&config), credentials, factory);

    let pb = progress_bar(cli.json || !matches!(cli.command, Commands::Download { .. }))?;
    let sink = {
        let pb = pb.clone();
        ProgressSink::new(move |message: &str, percent: f64| {
            pb.set_position(percent as u64);
            pb.set_message(message.to_string());
        })
    };
    let coordinator = OperationsCoordinator::new(&config, connection, database).with_progress(sink);

    let outcome = tokio::select! {
        result = run(&coordinator, cli.command, config.download.default_days, &pb) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let code = match outcome {
        Some(result) => {
            print_result(&result, cli.json)?;
            if result.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        None => {
            pb.abandon_with_message("interrupted");
            warn!("종료 신호 수신, 정리 중...");
            ExitCode::FAILURE
        }
    };

    coordinator.cleanup().await;
    info!("Futures admin 종료");

    Ok(code)
}
