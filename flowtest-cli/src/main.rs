//! flowtest -- 워크플로 e2e 시나리오 실행기
//!
//! 설정 로드 → 로깅 초기화 → (선택) 메트릭 엔드포인트 → 하위 명령 실행 순서로
//! 동작하며, 실패는 [`CliError::exit_code`]로 프로세스 종료 코드에 반영됩니다.

mod catalog;
mod cli;
mod commands;
mod error;
mod logging;
mod metrics_server;
mod output;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match commands::load_config(&cli.config).await {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }

    logging::init_tracing(&config.general)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    if matches!(&cli.command, Commands::Run(args) if args.metrics || config.metrics.enabled) {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let writer = OutputWriter::new(cli.output);
    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, &writer).await,
        Commands::List(args) => commands::list::execute(args, &writer),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        exit_with(&e);
    }
    Ok(())
}

fn exit_with(e: &CliError) -> ! {
    eprintln!("error: {e}");
    std::process::exit(e.exit_code());
}
