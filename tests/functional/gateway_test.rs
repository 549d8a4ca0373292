//! Functional tests for the gateway's HTTP surface over a fake backend pool

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use std::time::Duration;

use crate::common::{gateway, request, send, settings};

#[tokio::test]
async fn test_five_requests_round_robin_then_rate_limited() {
    let gw = gateway(settings(&["e1", "e2", "e3"])).await;

    let mut served = Vec::new();
    for i in 0..5 {
        let (status, headers, body) = send(&gw.app, request("GET", "/api/data", "10.0.0.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-ratelimit-limit"], "5");
        assert_eq!(headers["x-ratelimit-remaining"], (4 - i).to_string().as_str());
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        served.push(body["service"].as_str().unwrap().to_string());
        assert_eq!(headers["x-backend-service"], served[i].as_str());
    }
    assert_eq!(served, vec!["e1", "e2", "e3", "e1", "e2"]);

    gw.clock.advance(Duration::from_secs(20));
    let (status, headers, body) = send(&gw.app, request("GET", "/api/data", "10.0.0.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "40");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert_eq!(body["error"]["code"], "rate_limit_exceeded");
    assert_eq!(body["error"]["retry_after"], 40);

    // The rejected request never reached a backend
    assert_eq!(gw.backend.calls.lock().len(), 5);

    // Other clients keep their own quota
    let (status, _, _) = send(&gw.app, request("GET", "/api/data", "10.0.0.2")).await;
    assert_eq!(status, StatusCode::OK);

    // Acceptance resumes once the window has elapsed
    gw.clock.advance(Duration::from_secs(40));
    let (status, headers, _) = send(&gw.app, request("GET", "/api/data", "10.0.0.1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-ratelimit-remaining"], "4");
}

#[tokio::test]
async fn test_forwards_method_path_query_and_body() {
    let gw = gateway(settings(&["e1"])).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/data?verbose=1")
        .header("x-forwarded-for", "10.0.0.9")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-request-id", "req-42")
        .body(Body::from(r#"{"name":"widget"}"#))
        .unwrap();

    let (status, _, body) = send(&gw.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/data?verbose=1");
    assert_eq!(body["body"], r#"{"name":"widget"}"#);
    assert_eq!(body["request_id"], "req-42");
}

#[tokio::test]
async fn test_request_id_added_when_missing() {
    let gw = gateway(settings(&["e1"])).await;
    let (_, _, body) = send(&gw.app, request("GET", "/api/data", "10.0.0.9")).await;
    assert!(body["request_id"].as_str().map(|id| id.len() == 36).unwrap_or(false));
}

#[tokio::test]
async fn test_downed_endpoint_excluded_after_probe() {
    let gw = gateway(settings(&["e1", "e2", "e3"])).await;
    gw.backend.take_down("e2");
    gw.state.health_prober.probe_all().await;

    let mut served = Vec::new();
    for i in 0..4 {
        let client = format!("10.1.0.{}", i);
        let (status, _, body) = send(&gw.app, request("GET", "/api/data", &client)).await;
        assert_eq!(status, StatusCode::OK);
        served.push(body["service"].as_str().unwrap().to_string());
    }
    assert_eq!(served, vec!["e1", "e3", "e1", "e3"]);
}

#[tokio::test]
async fn test_forwarding_failure_marks_endpoint_unhealthy() {
    let gw = gateway(settings(&["e1", "e2"])).await;
    // e1 fails between probes
    gw.backend.take_down("e1");

    let (status, _, body) = send(&gw.app, request("GET", "/api/data", "10.2.0.1")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "backend_unavailable");

    let (_, _, services) = send(&gw.app, request("GET", "/services", "10.2.0.1")).await;
    assert_eq!(services["services"][0]["state"], "unhealthy");
    assert_eq!(services["healthy_services"], 1);

    for _ in 0..3 {
        let (status, _, body) = send(&gw.app, request("GET", "/api/data", "10.2.0.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "e2");
    }

    // Next probe brings it back
    gw.backend.bring_up("e1");
    gw.state.health_prober.probe_all().await;
    let (_, _, services) = send(&gw.app, request("GET", "/services", "10.2.0.1")).await;
    assert_eq!(services["healthy_services"], 2);
}

#[tokio::test]
async fn test_no_healthy_endpoints_is_503() {
    let gw = gateway(settings(&["e1"])).await;
    gw.backend.take_down("e1");
    gw.state.health_prober.probe_all().await;

    let (status, _, body) = send(&gw.app, request("GET", "/api/data", "10.3.0.1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "no_healthy_endpoints");
    assert!(gw.backend.calls.lock().is_empty());
}

#[tokio::test]
async fn test_health_does_not_touch_backends() {
    let gw = gateway(settings(&["e1", "e2"])).await;
    let probes_before = *gw.backend.probes.lock();

    let (status, _, body) = send(&gw.app, request("GET", "/health", "10.4.0.1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(*gw.backend.probes.lock(), probes_before);
    assert!(gw.backend.calls.lock().is_empty());
}

#[tokio::test]
async fn test_services_snapshot_is_idempotent_and_not_rate_limited() {
    let gw = gateway(settings(&["e1", "e2", "e3"])).await;

    let (status, _, first) = send(&gw.app, request("GET", "/services", "10.5.0.1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["total_services"], 3);
    assert_eq!(first["services"][1]["id"], "e2");
    assert_eq!(first["services"][1]["state"], "healthy");

    for _ in 0..10 {
        let (status, _, again) = send(&gw.app, request("GET", "/services", "10.5.0.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, first);
    }

    // A probe cycle that changes nothing keeps the snapshot identical
    gw.state.health_prober.probe_all().await;
    let (_, _, after_probe) = send(&gw.app, request("GET", "/services", "10.5.0.1")).await;
    assert_eq!(after_probe, first);
}

#[tokio::test]
async fn test_admin_health_override_and_probe() {
    let gw = gateway(settings(&["e1", "e2"])).await;

    let override_request = Request::builder()
        .method("PUT")
        .uri("/admin/services/e1/health")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"state":"unhealthy"}"#))
        .unwrap();
    let (status, _, body) = send(&gw.app, override_request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous"], "healthy");
    assert_eq!(body["state"], "unhealthy");

    for _ in 0..2 {
        let (_, _, body) = send(&gw.app, request("GET", "/api/data", "10.6.0.1")).await;
        assert_eq!(body["service"], "e2");
    }

    let (status, _, body) = send(&gw.app, request("POST", "/admin/services/e1/probe", "10.6.0.1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "healthy");

    let (status, _, body) = send(&gw.app, request("POST", "/admin/services/nope/probe", "10.6.0.1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "unknown_endpoint");
}

#[tokio::test]
async fn test_stats_reports_quota_without_consuming_it() {
    let gw = gateway(settings(&["e1", "e2"])).await;
    send(&gw.app, request("GET", "/api/data", "10.7.0.1")).await;

    for _ in 0..3 {
        let (status, _, body) = send(&gw.app, request("GET", "/stats", "10.7.0.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rate_limiting"]["client"], "10.7.0.1");
        assert_eq!(body["rate_limiting"]["remaining_requests"], 4);
        assert_eq!(body["load_balancing"]["cursor"], 1);
    }
}

#[tokio::test]
async fn test_rate_limit_disabled() {
    let mut settings = settings(&["e1"]);
    settings.rate_limit.enabled = false;
    let gw = gateway(settings).await;

    for _ in 0..10 {
        let (status, headers, _) = send(&gw.app, request("GET", "/api/data", "10.8.0.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!headers.contains_key("x-ratelimit-limit"));
    }
}
