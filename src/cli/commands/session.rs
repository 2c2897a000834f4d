//! Live and paper session commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use trading_broker::{LiveBroker, PaperBroker, RateLimitedClient, RestMarketApi};
use trading_config::{AppConfig, FileStateStore};
use trading_core::error::TradingError;
use trading_core::traits::{MarketApi, MarketFeed, OrderGateway, StateStore};
use trading_core::types::TradingMode;
use trading_data::WsMarketFeed;
use trading_engine::Engine;
use trading_monitor::Dashboard;

use crate::cli::SessionArgs;

pub async fn run(mode: TradingMode, args: SessionArgs, mut config: AppConfig) -> Result<()> {
    config.session.mode = mode;
    if let Some(universe) = args.universe {
        config.session.universe = universe.to_ascii_uppercase();
    }

    let api: Arc<dyn MarketApi> = Arc::new(
        RestMarketApi::new(config.api.rest_config()?).context("failed to build the REST client")?,
    );
    let client = RateLimitedClient::new(api, config.api.rate_limit.clone());
    let feed: Arc<dyn MarketFeed> = Arc::new(WsMarketFeed::new(config.feed.websocket.clone()));
    let gateway: Arc<dyn OrderGateway> = match mode {
        TradingMode::Live => Arc::new(LiveBroker::new(client.clone())),
        TradingMode::Paper => Arc::new(PaperBroker::new().with_slippage(config.session.paper_slippage_pct)),
    };
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::from_settings(&config.state));
    if store.emergency_stop().await? {
        warn!("Emergency stop is raised; the session will stop on its first tick");
    }

    let engine = Arc::new(Engine::new(config, client, feed, gateway, store)?);
    let start = engine.start_session();
    tokio::pin!(start);
    let started = tokio::select! {
        started = &mut start => started,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Ctrl-C received during startup");
            let (stopped, started) = tokio::join!(engine.stop_session(), &mut start);
            stopped?;
            started
        }
    };
    let report = match started {
        Ok(report) => report,
        Err(TradingError::Cancelled) => {
            println!("Startup cancelled");
            return Ok(());
        }
        Err(e) => return Err(e).context("session startup failed"),
    };
    println!("Startup verified: {}", report.summary());

    if args.dashboard {
        let status_engine = engine.clone();
        let refresh_ms = args.refresh_ms;
        tokio::task::spawn_blocking(move || Dashboard::new(refresh_ms).run(|| status_engine.status()))
            .await
            .context("dashboard task failed")??;
    } else {
        println!("Session running; press Ctrl-C to stop.");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Ctrl-C received");
            }
            _ = engine.wait_for_exit() => {}
        }
    }

    engine.stop_session().await?;

    let status = engine.status();
    println!();
    println!("Session {}", status.health.phase);
    if let Some(reason) = &status.health.stop_reason {
        println!("Stop reason: {}", reason);
    }
    println!("{}", serde_json::to_string_pretty(&status.stats)?);

    Ok(())
}
