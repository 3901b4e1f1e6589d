//! 推广引擎命令行入口

use anyhow::Result;
use clap::Parser;
use promo_shared::observability::{self, ObservabilityConfig};
use tracing::info;

use promo_engine::PromoConfig;
use promo_engine::cli::{Cli, Commands, SERVICE_NAME, SimulationRunner};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG 优先，否则使用命令行指定的级别
    let mut obs_config = ObservabilityConfig::from_env(SERVICE_NAME);
    if std::env::var("RUST_LOG").is_err() {
        obs_config.log_level = cli.log_level.clone();
    }
    let _guard = observability::init(&obs_config)?;

    let config = PromoConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "加载配置失败，使用默认配置");
        PromoConfig::default()
    });
    info!(base_url = %config.app.base_url, "配置已加载");

    let runner = SimulationRunner::new(config);
    match cli.command {
        Commands::Simulate {
            influencers,
            redeem,
            fast_forward_secs,
            store,
        } => {
            let summary = runner
                .run_simulate(influencers, redeem, fast_forward_secs, store)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
