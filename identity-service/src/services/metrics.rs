use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Safe to call more than once; only
/// the first call installs.
pub fn init_metrics() -> Result<(), anyhow::Error> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("Metrics handle already initialized"))?;

    Ok(())
}

/// Render all metrics in Prometheus text exposition format.
pub fn get_metrics() -> String {
    match METRICS_HANDLE.get() {
        Some(handle) => handle.render(),
        None => "# Metrics recorder not initialized\n".to_string(),
    }
}

/// Count an authentication event (`register`, `login`, `logout`) by outcome.
pub fn record_auth_event(event: &'static str, outcome: &'static str) {
    counter!("identity_auth_events_total", "event" => event, "outcome" => outcome).increment(1);
}

/// Count an authorization decision for an org operation.
pub fn record_authz_decision(action: &'static str, allowed: bool) {
    let decision = if allowed { "allow" } else { "deny" };
    counter!("identity_authz_decisions_total", "action" => action, "decision" => decision)
        .increment(1);
}
