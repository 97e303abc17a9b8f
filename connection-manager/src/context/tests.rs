use super::*;
use crate::testing::{Handshake, Probe, ScriptedAdapter, COMPLETION_PATH, NAME};
use std::sync::atomic::Ordering;

fn context_for(adapter: &ScriptedAdapter) -> ConnectionContext {
    ConnectionContext::new("alice", "main", adapter.boxed(), RetryLimits::default())
}

async fn connected(adapter: &ScriptedAdapter) -> ConnectionContext {
    let context = context_for(adapter);
    assert_eq!(context.connect().await.unwrap(), Some(ConnectionResult::Connected));
    context
}

fn age_last_refresh(context: &ConnectionContext, seconds: i64) {
    context.lifecycle().last_refresh = Utc::now() - chrono::Duration::seconds(seconds);
}

// --- connect ---

#[tokio::test]
async fn test_new_context_is_disconnected() {
    let context = context_for(&ScriptedAdapter::new(Handshake::Immediate));
    assert_eq!(context.status(), ConnectionStatus::Disconnected);
    assert!(context.connected_since().is_none());
    assert!(!context.needs_refresh());
    assert_eq!(context.refresh_retries(), 5);
    assert!(Uuid::parse_str(context.instance_code()).is_ok());
}

#[tokio::test]
async fn test_immediate_connect() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate).with_token_exp(60);
    let context = connected(&adapter).await;

    assert_eq!(context.status(), ConnectionStatus::Connected);
    assert!(context.connected_since().is_some());
    assert!(!context.needs_refresh());
}

#[tokio::test]
async fn test_connect_guard_skips_adapter() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate);
    let context = connected(&adapter).await;

    assert_eq!(context.connect().await.unwrap(), None);
    assert_eq!(context.try_begin_connect(), Err(ConnectionStatus::Connected));
    assert_eq!(Probe::count(&adapter.probe.connect_calls), 1);
}

#[tokio::test]
async fn test_proxied_connect_stays_connecting() {
    let adapter = ScriptedAdapter::new(Handshake::Proxied);
    let context = context_for(&adapter);

    let result = context.connect().await.unwrap();
    assert_eq!(result, Some(ConnectionResult::NeedsProxiedLogin));
    assert_eq!(context.status(), ConnectionStatus::Connecting);
    assert_eq!(context.try_begin_connect(), Err(ConnectionStatus::Connecting));
}

#[tokio::test]
async fn test_reservation_reports_connecting() {
    let context = context_for(&ScriptedAdapter::new(Handshake::Immediate));
    assert!(context.try_begin_connect().is_ok());
    assert_eq!(context.status(), ConnectionStatus::Connecting);

    context.run_connect().await.unwrap();
    assert_eq!(context.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_connect_error_disconnects() {
    let context = context_for(&ScriptedAdapter::new(Handshake::Fail));

    let err = context.connect().await.unwrap_err();
    assert_eq!(err.to_string(), "bad credentials");
    assert_eq!(context.status(), ConnectionStatus::Disconnected);
    assert!(context.try_begin_connect().is_ok());
}

// --- disconnect ---

#[tokio::test]
async fn test_disconnect() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate);
    let context = connected(&adapter).await;

    assert!(context.disconnect().await);
    assert_eq!(context.status(), ConnectionStatus::Disconnected);
    assert!(context.connected_since().is_none());

    assert!(!context.disconnect().await);
    assert_eq!(Probe::count(&adapter.probe.disconnect_calls), 1);
}

// --- needs_refresh ---

#[tokio::test]
async fn test_needs_refresh_without_expiry() {
    let context = connected(&ScriptedAdapter::new(Handshake::Immediate)).await;
    age_last_refresh(&context, 100_000);
    assert!(!context.needs_refresh());
}

#[tokio::test]
async fn test_needs_refresh_short_expiry() {
    let context = connected(&ScriptedAdapter::new(Handshake::Immediate).with_token_exp(60)).await;

    age_last_refresh(&context, 59);
    assert!(!context.needs_refresh());

    age_last_refresh(&context, 61);
    assert!(context.needs_refresh());
}

#[tokio::test]
async fn test_needs_refresh_keeps_margin_on_long_expiry() {
    let context = connected(&ScriptedAdapter::new(Handshake::Immediate).with_token_exp(1200)).await;

    age_last_refresh(&context, 1000);
    assert!(!context.needs_refresh());

    age_last_refresh(&context, 1081);
    assert!(context.needs_refresh());
}

#[tokio::test]
async fn test_needs_refresh_below_margin_threshold() {
    let context = connected(&ScriptedAdapter::new(Handshake::Immediate).with_token_exp(149)).await;

    age_last_refresh(&context, 100);
    assert!(!context.needs_refresh());

    age_last_refresh(&context, 150);
    assert!(context.needs_refresh());
}

#[tokio::test]
async fn test_needs_refresh_only_when_connected() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate).with_token_exp(60);
    let context = connected(&adapter).await;
    context.disconnect().await;

    age_last_refresh(&context, 1000);
    assert!(!context.needs_refresh());
}

// --- refresh_token ---

#[tokio::test]
async fn test_refresh_failures_until_disconnect() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate).with_token_exp(60);
    adapter.probe.failing_refreshes.store(5, Ordering::SeqCst);
    let context = connected(&adapter).await;

    for retries_left in (1..=4).rev() {
        assert!(context.refresh_token().await.is_ok());
        assert_eq!(context.status(), ConnectionStatus::Connected);
        assert_eq!(context.refresh_retries(), retries_left);
    }

    let err = context.refresh_token().await.unwrap_err();
    assert_eq!(err.to_string(), "token expired");
    assert_eq!(context.status(), ConnectionStatus::Disconnected);
    assert_eq!(context.refresh_retries(), 0);
}

#[tokio::test]
async fn test_refresh_success_resets_retries() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate).with_token_exp(60);
    adapter.probe.failing_refreshes.store(3, Ordering::SeqCst);
    let context = connected(&adapter).await;

    for _ in 0..3 {
        context.refresh_token().await.unwrap();
    }
    assert_eq!(context.refresh_retries(), 2);

    age_last_refresh(&context, 61);
    context.refresh_token().await.unwrap();
    assert_eq!(context.refresh_retries(), 5);
    assert!(!context.needs_refresh());
}

#[tokio::test]
async fn test_refresh_skipped_when_not_connected() {
    let adapter = ScriptedAdapter::new(Handshake::Proxied).with_token_exp(60);
    let context = context_for(&adapter);
    context.connect().await.unwrap();

    context.refresh_token().await.unwrap();
    assert_eq!(Probe::count(&adapter.probe.refresh_calls), 0);
}

// --- price bars ---

#[tokio::test]
async fn test_price_bars_retries_timeouts() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate);
    adapter.probe.bar_timeouts.store(4, Ordering::SeqCst);
    let context = connected(&adapter).await;

    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let bars = context.price_bars("ESH4", date).await.unwrap();
    assert!(!bars.timeout);
    assert_eq!(Probe::count(&adapter.probe.bars_calls), 5);
}

#[tokio::test]
async fn test_price_bars_exhausted() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate);
    adapter.probe.bar_timeouts.store(5, Ordering::SeqCst);
    let context = connected(&adapter).await;

    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let err = context.price_bars("ESH4", date).await.unwrap_err();
    assert!(matches!(err, GatewayError::ExhaustedRetries(ref name) if name == NAME));
    assert_eq!(err.to_string(), "Maximum number of retries exceeded: Scripted");
    assert_eq!(Probe::count(&adapter.probe.bars_calls), 5);
}

#[tokio::test]
async fn test_unsupported_service_passes_through() {
    let context = connected(&ScriptedAdapter::new(Handshake::Immediate)).await;
    let err = context.accounts().await.unwrap_err();
    assert!(matches!(err, GatewayError::Unsupported { .. }));
}

// --- web login ---

#[tokio::test]
async fn test_web_login_completes_once() {
    let adapter = ScriptedAdapter::new(Handshake::Proxied).with_token_exp(60);
    let context = context_for(&adapter);
    context.connect().await.unwrap();

    assert!(context.is_web_login_completed(200, COMPLETION_PATH).await);
    assert!(!context.is_web_login_completed(302, COMPLETION_PATH).await);

    let headers = HeaderMap::new();
    assert!(context.complete_web_login(&headers, &[]).await.unwrap());
    assert_eq!(context.status(), ConnectionStatus::Connected);
    assert!(context.connected_since().is_some());

    assert!(!context.complete_web_login(&headers, &[]).await.unwrap());
    assert_eq!(Probe::count(&adapter.probe.init_calls), 1);
}

#[tokio::test]
async fn test_web_login_failure() {
    let adapter = ScriptedAdapter::new(Handshake::Proxied).failing_init();
    let context = context_for(&adapter);
    context.connect().await.unwrap();

    let err = context.complete_web_login(&HeaderMap::new(), &[]).await.unwrap_err();
    assert_eq!(err.to_string(), "session rejected");
    assert_eq!(context.status(), ConnectionStatus::Disconnected);

    assert!(!context.complete_web_login(&HeaderMap::new(), &[]).await.unwrap());
    assert_eq!(Probe::count(&adapter.probe.init_calls), 1);
}

#[tokio::test]
async fn test_web_login_ignored_without_pending_login() {
    let adapter = ScriptedAdapter::new(Handshake::Immediate);
    let context = connected(&adapter).await;

    assert!(!context.complete_web_login(&HeaderMap::new(), &[]).await.unwrap());
    assert_eq!(Probe::count(&adapter.probe.init_calls), 0);
}

#[tokio::test]
async fn test_descriptor_and_change() {
    let context = connected(&ScriptedAdapter::new(Handshake::Immediate)).await;

    let descriptor = context.descriptor();
    assert_eq!(descriptor.connection_code, "main");
    assert_eq!(descriptor.system_name, NAME);
    assert_eq!(descriptor.status, ConnectionStatus::Connected);

    let change = context.change();
    assert_eq!(change.username, "alice");
    assert_eq!(change.system_code, "SCRIPTED");
    assert_eq!(change.status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_debug_names_connection_without_secrets() {
    let context = connected(&ScriptedAdapter::new(Handshake::Immediate)).await;

    let printed = format!("{:?}", context);
    assert!(printed.starts_with("ConnectionContext {"));
    assert!(printed.contains("username: \"alice\""));
    assert!(printed.contains("connection_code: \"main\""));
    assert!(printed.contains("status: Connected"));
    assert!(!printed.contains("adapter"));
}
