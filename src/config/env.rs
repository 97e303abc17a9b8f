use super::GatewayConfig;

/// Overlay environment variables on a loaded configuration.
///
/// Unparseable numeric values are ignored, keeping the file/default value.
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides(config: &mut GatewayConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SYSGATE_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Some(v) = lookup("SYSGATE_PUBLIC_URL") {
        config.server.public_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = lookup("NATS_URL") {
        config.nats.url = v;
    }
    if let Some(v) = lookup("SYSGATE_NATS_ENABLED") {
        if let Ok(b) = v.parse::<bool>() {
            config.nats.enabled = b;
        }
    }
    if let Some(v) = lookup("SYSGATE_REFRESH_INTERVAL_SECONDS") {
        if let Ok(n) = v.parse::<u64>() {
            config.refresh.interval_seconds = n;
        }
    }
    if let Some(v) = lookup("SYSGATE_NETWORK_TIMEOUT_SECONDS") {
        if let Ok(n) = v.parse::<u64>() {
            config.connections.network_timeout_seconds = n;
        }
    }
    if let Some(v) = lookup("SYSGATE_AUTH_ENABLED") {
        if let Ok(b) = v.parse::<bool>() {
            config.auth.enabled = b;
        }
    }
}
