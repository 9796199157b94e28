//! End-to-end scenarios: real listener, real subjects, real HTTP.

use std::time::Duration;

use llsd::Value;
use llsd_peer::{PeerConfig, run, start};

fn config(port_base: u16, port_span: u16) -> PeerConfig {
    PeerConfig {
        port_base,
        port_span,
        ..Default::default()
    }
}

fn xml_map(entries: &[(&str, Value)]) -> String {
    let map: llsd::Map = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    llsd::to_xml(&Value::Map(map))
}

async fn post(port: u16, path: &str, body: String) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}{path}"))
        .header("content-type", llsd::MEDIA_TYPE)
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn echo_round_trip() {
    let handle = start(&config(18600, 4)).await.unwrap();

    let response = post(
        handle.port(),
        "/echo",
        xml_map(&[("reply", Value::from("pong"))]),
    )
    .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        llsd::MEDIA_TYPE
    );
    let body = response.bytes().await.unwrap();
    assert_eq!(llsd::from_xml(&body).unwrap(), Value::from("pong"));

    handle.stop().await;
}

#[tokio::test]
async fn requested_failure_honors_status_and_reason() {
    let handle = start(&config(18610, 4)).await.unwrap();

    let response = post(
        handle.port(),
        "/please-fail",
        xml_map(&[
            ("status", Value::Integer(503)),
            ("reason", Value::from("busy")),
        ]),
    )
    .await;
    assert_eq!(response.status(), 503);
    assert_eq!(response.text().await.unwrap(), "busy");

    handle.stop().await;
}

#[tokio::test]
async fn empty_failure_request_reports_the_generic_reason() {
    let handle = start(&config(18620, 4)).await.unwrap();

    let response = post(handle.port(), "/please-fail", xml_map(&[])).await;
    assert_eq!(response.status(), 500);
    let text = response.text().await.unwrap();
    assert!(text.contains("500"), "unexpected reason: {text}");

    handle.stop().await;
}

#[tokio::test]
async fn get_always_requests_failure() {
    let handle = start(&config(18630, 4)).await.unwrap();

    let response = reqwest::get(format!("http://127.0.0.1:{}/anything", handle.port()))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(
        response.text().await.unwrap(),
        "Your GET operation requested failure"
    );

    handle.stop().await;
}

#[tokio::test]
async fn subject_exit_code_passes_through() {
    let code = run(
        &config(18640, 4),
        &["sh".to_string(), "-c".to_string(), "exit 7".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(code, 7);
}

#[tokio::test]
async fn peer_answers_while_the_subject_runs() {
    let config = config(18650, 1);
    let harness = tokio::spawn(async move {
        run(&config, &["sleep".to_string(), "1".to_string()]).await
    });

    // give the harness time to bind and spawn
    tokio::time::sleep(Duration::from_millis(300)).await;
    let response = reqwest::get("http://127.0.0.1:18650/ping").await.unwrap();
    assert_eq!(response.status(), 500);

    let code = harness.await.unwrap().unwrap();
    assert_eq!(code, 0);
}
