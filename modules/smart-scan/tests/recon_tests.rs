use smart_scan::{ScanMode, SmartScanManager, TargetHealth};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn recon_records_target_profile() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("server", "nginx/1.25.3"))
        .mount(&server)
        .await;

    let mut m = SmartScanManager::new(server.uri(), ScanMode::Conservative)
        .with_probe_timeout(Duration::from_secs(5));
    let report = m.perform_initial_recon().await;

    assert!(report.can_proceed);
    assert!(report.recommendations.iter().any(|r| r.contains("nginx")));
    let profile = m.profile();
    assert_eq!(profile.last_status_code, Some(200));
    assert_eq!(profile.server_banner.as_deref(), Some("nginx/1.25.3"));
    assert!(profile.last_response_time_ms.is_some());
}

#[tokio::test]
async fn recon_fast_adaptive_target_raises_volume() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let mut m = SmartScanManager::new(server.uri(), ScanMode::Adaptive);
    let report = m.perform_initial_recon().await;

    assert!(report.can_proceed);
    assert!(report.recommendations.iter().any(|r| r.contains("fast target")));
    assert_eq!(m.current_scan_params().payload_count, 15);
}

#[tokio::test]
async fn recon_rate_limit_headers_override_posture() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("retry-after", "120"))
        .mount(&server)
        .await;

    // aggressive starts at 25 payloads; the clamp applies regardless
    let mut m = SmartScanManager::new(server.uri(), ScanMode::Aggressive);
    let report = m.perform_initial_recon().await;

    assert!(report.can_proceed);
    assert!(report.recommendations.iter().any(|r| r.contains("rate limiting")));
    let params = m.current_scan_params();
    assert_eq!(params.delay_ms, 5000);
    assert!(params.payload_count <= 5);
}

#[tokio::test]
async fn recon_security_headers_slow_the_scan() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-frame-options", "DENY")
                .insert_header("content-security-policy", "default-src 'self'")
                .insert_header("strict-transport-security", "max-age=63072000"),
        )
        .mount(&server)
        .await;

    let mut m = SmartScanManager::new(server.uri(), ScanMode::Conservative);
    let report = m.perform_initial_recon().await;

    assert!(report.recommendations.iter().any(|r| r.contains("stealth")));
    assert_eq!(m.current_scan_params().delay_ms, 2000);
}

#[tokio::test]
async fn recon_cloudflare_banner_raises_delay_floor() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(403).insert_header("server", "cloudflare"))
        .mount(&server)
        .await;

    let mut m = SmartScanManager::new(server.uri(), ScanMode::Conservative);
    let report = m.perform_initial_recon().await;

    // a 403 still counts as reachable; only transport failures abort
    assert!(report.can_proceed);
    assert!(report.recommendations.iter().any(|r| r.contains("cloudflare")));
    assert_eq!(m.current_scan_params().delay_ms, 1500);
}

#[tokio::test]
async fn recon_unreachable_target_aborts_without_panicking() {
    // port 1 on loopback: connection refused, no DNS involved
    let mut m = SmartScanManager::new("http://127.0.0.1:1/", ScanMode::Adaptive)
        .with_probe_timeout(Duration::from_secs(2));
    let report = m.perform_initial_recon().await;

    assert!(!report.can_proceed);
    assert_eq!(
        report.recommendations,
        vec!["target unreachable or blocking requests - aborting scan".to_string()]
    );
    // the manager stays usable for display even after an aborted recon
    assert_eq!(m.target_health(), TargetHealth::Healthy);
}

#[tokio::test]
async fn recon_honors_probe_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut m = SmartScanManager::new(server.uri(), ScanMode::Adaptive)
        .with_probe_timeout(Duration::from_millis(200));
    let report = m.perform_initial_recon().await;

    assert!(!report.can_proceed);
}

#[tokio::test]
async fn recon_sends_scanner_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(wiremock::matchers::header("user-agent", "ABSpider/1.0 (Security Scanner)"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut m = SmartScanManager::new(server.uri(), ScanMode::Adaptive);
    let report = m.perform_initial_recon().await;
    assert!(report.can_proceed);
}
