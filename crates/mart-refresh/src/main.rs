//! Price mart refresh CLI.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use mart_core::{init_logging, MartConfig, DEFAULT_CONFIG_PATH};
use mart_refresh::{
    reports, MartStore, MemoryStore, PgMartStore, RefreshConfig, RefreshCoordinator,
    RefreshOutcome, RefreshScope, SubsetFilter,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mart-refresh")]
#[command(about = "Daily price star schema refresh", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (없으면 기본값 + 환경변수)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 로그 레벨 (trace, debug, info, warn, error), 설정 파일보다 우선
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 전체 리프레시 (차원 → 팩트 → 파생 지표 → 게시)
    Full {
        /// 게시하지 않고 메모리에서만 실행
        #[arg(long)]
        dry_run: bool,
    },

    /// 심볼/기간 부분 리프레시
    Subset {
        /// 대상 심볼 (쉼표로 구분, 예: "AAPL,MSFT")
        #[arg(long)]
        symbols: Option<String>,

        /// 시작일 (YYYY-MM-DD, 포함)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// 종료일 (YYYY-MM-DD, 포함)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// 게시하지 않고 메모리에서만 실행
        #[arg(long)]
        dry_run: bool,
    },

    /// 게시 테이블 정합성 점검
    Check,

    /// 심볼 구간 요약 (수익률, 변동성, 샤프, 최대 낙폭)
    Summary {
        /// 심볼
        #[arg(long)]
        symbol: String,

        /// 시작일 (YYYY-MM-DD, 포함)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// 종료일 (YYYY-MM-DD, 포함)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 설정 로드
    let mut config = RefreshConfig::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.mart.logging.level = level;
    }

    // 로깅 초기화
    init_logging(config.mart.logging.clone().with_env_overrides())?;
    tracing::info!(config = %cli.config.display(), "Price Mart Refresh 시작");

    // DB 연결
    let pool = config.connect().await?;
    let store = Arc::new(PgMartStore::new(pool.clone(), &config.mart));

    // 명령 실행
    let code = match cli.command {
        Commands::Full { dry_run } => {
            run_refresh(&store, &config.mart, RefreshScope::Full, dry_run).await?
        }
        Commands::Subset {
            symbols,
            from,
            to,
            dry_run,
        } => {
            let filter = SubsetFilter::new(
                symbols.as_deref().map(SubsetFilter::parse_symbols),
                from,
                to,
            );
            run_refresh(&store, &config.mart, RefreshScope::Subset(filter), dry_run).await?
        }
        Commands::Check => {
            let violations = reports::check_published(store.as_ref()).await?;
            for violation in &violations {
                println!("{}", violation);
            }
            if violations.is_empty() {
                println!("all checks passed");
                ExitCode::SUCCESS
            } else {
                println!("{} violation(s)", violations.len());
                ExitCode::FAILURE
            }
        }
        Commands::Summary { symbol, from, to } => {
            match reports::summarize_symbol(store.as_ref(), &symbol, from, to).await? {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => println!("no data for {}", symbol.trim().to_uppercase()),
            }
            ExitCode::SUCCESS
        }
    };

    pool.close().await;
    tracing::info!("Price Mart Refresh 종료");

    Ok(code)
}

/// 리프레시 실행. `--dry-run`이면 게시 상태를 복사한 메모리 저장소에서 실행합니다.
async fn run_refresh(
    store: &Arc<PgMartStore>,
    config: &MartConfig,
    scope: RefreshScope,
    dry_run: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let outcome = if dry_run {
        let memory = MemoryStore::new(store.load_observations().await?);
        let memory = match (store.load_assets().await?, &scope) {
            (None, _) => memory,
            (Some(assets), RefreshScope::Full) => memory.with_assets(&assets),
            (Some(_), RefreshScope::Subset(_)) => memory.with_published(
                store.load_published().await?,
                store.published_ma_columns().await?,
            ),
        };
        tracing::info!("dry-run: 게시하지 않습니다");
        RefreshCoordinator::new(Arc::new(memory), config)?
            .run(scope)
            .await
    } else {
        RefreshCoordinator::new(Arc::clone(store), config)?
            .run(scope)
            .await
    };

    report_outcome(&outcome)?;
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report_outcome(outcome: &RefreshOutcome) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "run {} ({} → {}{}): {}",
        outcome.run_id,
        outcome.requested,
        outcome.effective,
        if outcome.escalated { ", escalated" } else { "" },
        outcome.state
    );
    println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
    if let Some(error) = &outcome.error {
        println!("error: {}", error);
    }
    Ok(())
}
