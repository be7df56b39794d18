use super::config::AppConfig;
use anyhow::{Context, Result};
use lib_rislive::ingestors::RisLiveHandle;
use lib_rislive::validate::RoutinatorValidator;
use lib_rislive::{IngestStats, Ingestor, KillSwitch, ResultWriter};
use tokio::signal;

/// Runs one `subscribe` session until its deadline or a shutdown signal.
pub async fn run(config: &AppConfig) -> Result<IngestStats> {
    let validator = connect_validator(config).await?;
    let ingestor = Ingestor::new(config.ingest_options(), validator)?;

    let url = config.rislive.feed_url();
    log::info!(
        "Subscribing to {} for {}s (emit policy '{}', unknown verdicts: {:?})",
        url,
        config.rislive.duration,
        config.ingest.emit_policy,
        config.ingest.unknown_policy
    );
    let mut handle = RisLiveHandle::connect(
        &url,
        config.rislive.filter.clone(),
        config.rislive.session_length(),
        config.rislive.stream_config(),
    )
    .await
    .context("RIS Live subscription failed")?;

    let mut sink = ResultWriter::create(&config.ingest.output)
        .await
        .with_context(|| format!("failed to create result file {}", config.ingest.output.display()))?;

    let kill_switch = handle.kill_switch();
    let signals = tokio::spawn(kill_on_signal(kill_switch.clone()));

    let outcome = ingestor.run(handle.queue_mut(), &kill_switch, &mut sink).await;

    signals.abort();
    let received = handle.messages_received();
    handle.shutdown().await;

    let stats = outcome?;
    let lines = sink.lines();
    sink.finish().await?;

    log::info!(
        "Session over: {} frames received, {} messages ingested, {} pongs, {} skipped, {} facts written, {} rejected",
        received,
        stats.messages,
        stats.pongs,
        stats.skipped,
        lines,
        stats.rejected
    );
    Ok(stats)
}

/// A validator that is down only matters when the emit policy consults it.
async fn connect_validator(config: &AppConfig) -> Result<Option<RoutinatorValidator>> {
    let policy = config.ingest.emit_policy;
    match RoutinatorValidator::connect(&config.validate_url, &config.ingest.client_options()).await {
        Ok(validator) => Ok(Some(validator)),
        Err(e) if !policy.needs_validator() => {
            log::warn!("{}; continuing without validation (emit policy '{}')", e, policy);
            Ok(None)
        }
        Err(e) => Err(e).context("RPKI validator check failed"),
    }
}

async fn kill_on_signal(kill_switch: KillSwitch) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {}
    }

    kill_switch.kill();
}
