use std::time::Duration;

use playwatch::{
    bot::{self, BotContext, Cadence, ExitReason},
    common::{
        banner::{BannerInfo, print_banner},
        clock::{self, Clock},
        errors::StartupError,
        lock::InstanceLock,
        logger,
        types::AnyResult,
    },
    configs::Config,
    gateway::GatewaySession,
    log_println,
    rest::DiscordRest,
    tracker::TrackerService,
    transport,
};
use time::UtcOffset;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Grace period for the gateway to close its socket on shutdown.
const GATEWAY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

fn main() {
    // Must run before any worker thread exists.
    let local_offset = clock::local_offset();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log_println!("Failed to start the async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(async {
        match run(local_offset).await {
            Ok(code) => code,
            Err(e) => {
                error!("Fatal: {}", e);
                log_println!("Fatal: {}", e);
                1
            }
        }
    });
    std::process::exit(code);
}

async fn run(local_offset: Option<UtcOffset>) -> AnyResult<i32> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log_println!("Failed to load configuration: {}", e);
            return Ok(1);
        }
    };

    logger::init(config.logging.as_ref());
    print_banner(&BannerInfo::default());

    let mut lock = match InstanceLock::acquire(&config.tracker.lock_file) {
        Ok(lock) => lock,
        Err(e @ StartupError::AlreadyRunning(_)) => {
            error!("{}; exiting", e);
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };

    let rest = DiscordRest::new(&config.discord)?;
    let tracker = TrackerService::new(&config.tracker);
    info!(
        "Tracking {} ({}) for {} title(s); ledger at {}",
        config.tracker.display_name,
        config.tracker.user_id,
        config.tracker.games.len(),
        tracker.store().path().display()
    );
    let clock = Clock::resolve(config.tracker.utc_offset_hours, local_offset);
    info!("Timestamps use UTC offset {}", clock.offset());
    let mut ctx = BotContext::new(&config, tracker, rest).with_clock(clock);

    let cancel = CancellationToken::new();

    if config.server.enabled {
        let server_config = config.server.clone();
        let server_cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = transport::serve(&server_config, server_cancel).await {
                error!("Keep-alive server stopped: {}", e);
            }
        });
    }

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let gateway = GatewaySession::new(
        config.discord.token.clone(),
        config.discord.gateway_url.clone(),
        vec![config.tracker.user_id],
        event_tx,
        cancel.child_token(),
    );
    let gateway_task = tokio::spawn(async move {
        if let Err(e) = gateway.run().await {
            error!("Gateway stopped: {}", e);
        }
    });

    let reason = bot::run(
        &mut ctx,
        &mut event_rx,
        Cadence::from(&config.tracker),
        bot::shutdown_signal(),
    )
    .await;

    cancel.cancel();
    let _ = tokio::time::timeout(GATEWAY_SHUTDOWN_TIMEOUT, gateway_task).await;
    lock.release();
    info!("Goodbye");

    Ok(match reason {
        ExitReason::Signal => 0,
        ExitReason::GatewayClosed => 1,
    })
}
