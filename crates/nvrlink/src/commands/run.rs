//! `nvrlink run`: one connection manager per NVR host, alarms to the webhook.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nvrlink_config::Config;
use nvrlink_core::{ConnectionManager, CoreError, Signal, SignalReceiver};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::relay::MotionRelay;

pub async fn handle(config: Config, global: &GlobalOpts) -> Result<(), CliError> {
    let targets = config.targets()?;

    let mut manager_config = config.defaults.manager_config();
    if let Some(secs) = global.reconnect_delay {
        manager_config.reconnect_delay = Duration::from_secs(secs);
    }

    let relay = Arc::new(MotionRelay::new(&config.defaults, config.cameras)?);

    let mut handles = Vec::with_capacity(targets.len());
    let mut routers = JoinSet::new();
    for target in targets {
        let manager = ConnectionManager::new(target, manager_config.clone())?;
        routers.spawn(route(manager.channel().subscribe(), Arc::clone(&relay)));
        handles.push(manager.spawn());
    }

    info!(
        targets = handles.len(),
        reconnect_delay_secs = manager_config.reconnect_delay.as_secs(),
        "relaying alarms, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for handle in &handles {
        handle.shutdown();
    }
    let joins = handles
        .into_iter()
        .map(|handle| (handle.host().to_string(), handle.join()))
        .collect();
    join_all(joins, routers).await?;
    Ok(())
}

/// Wait for every manager, then every router.
///
/// Failures are logged as they come; the first one is returned.
async fn join_all<F>(
    managers: Vec<(String, F)>,
    mut routers: JoinSet<()>,
) -> Result<(), CoreError>
where
    F: Future<Output = Result<(), CoreError>>,
{
    let mut first_err = None;
    for (host, join) in managers {
        if let Err(e) = join.await {
            warn!(host = %host, error = %e, "connection manager did not stop cleanly");
            first_err.get_or_insert(e);
        }
    }

    // Every channel is closed now; routers finish any in-flight webhook.
    while let Some(res) = routers.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "alarm router task failed");
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Forward one target's signals to the webhook and the log.
async fn route(mut signals: SignalReceiver, relay: Arc<MotionRelay>) {
    while let Some(signal) = signals.recv().await {
        match signal.as_ref() {
            Signal::Alarm(alarm) => {
                relay.relay(alarm).await;
            }
            Signal::Error(report) => error!(details = %report.details, "{}", report.summary),
            Signal::Reconnecting(message) => info!("{message}"),
            Signal::Debug(message) => debug!("{message}"),
        }
    }
}
