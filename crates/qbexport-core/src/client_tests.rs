use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use super::*;
use crate::records::tests::{server_state_json, transfer_info_json};

const SESSION: &str = "SID=fake-session";

#[derive(Default)]
struct FakeQbit {
    logins: AtomicUsize,
    maindata_calls: AtomicUsize,
    expire_next: AtomicBool,
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct FilterQuery {
    filter: String,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(SESSION))
}

async fn login(State(state): State<Arc<FakeQbit>>, Form(creds): Form<Credentials>) -> Response {
    state.logins.fetch_add(1, Ordering::SeqCst);
    if creds.username == "admin" && creds.password == "adminadmin" {
        (
            [(header::SET_COOKIE, format!("{SESSION}; HttpOnly; path=/"))],
            "Ok.",
        )
            .into_response()
    } else {
        "Fails.".into_response()
    }
}

async fn maindata(State(state): State<Arc<FakeQbit>>, headers: HeaderMap) -> Response {
    state.maindata_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) || state.expire_next.swap(false, Ordering::SeqCst) {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!({ "rid": 1, "full_update": true, "server_state": server_state_json() })).into_response()
}

async fn transfer_info(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(transfer_info_json()).into_response()
}

async fn torrents(headers: HeaderMap, Query(query): Query<FilterQuery>) -> Response {
    if !authorized(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if query.filter == "errored" {
        return Json(json!({ "unexpected": true })).into_response();
    }
    Json(json!([{
        "name": "debian.iso", "hash": "abc", "tracker": "", "state": query.filter,
        "category": "", "tags": "",
        "uploaded": 0, "downloaded": 5, "dlspeed": 1, "upspeed": 0,
        "num_complete": 1, "num_incomplete": 2, "num_leechs": 1, "num_seeds": 0,
        "size": 100, "added_on": 1700000000, "progress": 0.05, "ratio": 0.0
    }]))
    .into_response()
}

async fn peers(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let peer = |ip: &str| {
        json!({
            "ip": ip, "port": 6881, "flags": "D", "client": "qBittorrent/4.6.0",
            "connection": "BT", "country": "", "dl_speed": 0, "downloaded": 100,
            "uploaded": 0, "up_speed": 0, "progress": 0.5
        })
    };
    Json(json!({
        "full_update": true,
        "rid": 1,
        "peers": { "10.0.0.9:6881": peer("10.0.0.9"), "10.0.0.1:6881": peer("10.0.0.1") }
    }))
    .into_response()
}

async fn spawn_fake_qbit(with_peers: bool) -> (Arc<FakeQbit>, ExporterConfig) {
    let state = Arc::new(FakeQbit::default());
    let mut app = Router::new()
        .route("/api/v2/auth/login", post(login))
        .route("/api/v2/sync/maindata", get(maindata))
        .route("/api/v2/transfer/info", get(transfer_info))
        .route("/api/v2/torrents/info", get(torrents));
    if with_peers {
        app = app.route("/api/v2/sync/torrentPeers", get(peers));
    }
    let app = app.with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake qbit");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = ExporterConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ExporterConfig::default()
    };
    (state, config)
}

#[tokio::test]
async fn logs_in_once_and_reuses_the_session() {
    // Arrange
    let (fake, config) = spawn_fake_qbit(true).await;
    let client = QbitClient::new(&config).expect("client");

    // Act
    let state = client.fetch_transfer_state().await.expect("transfer state");
    let torrents = client.fetch_torrents(TorrentFilter::Active).await.expect("torrents");

    // Assert
    assert_eq!(state.connection_status, "connected");
    assert_eq!(torrents.len(), 1);
    assert_eq!(torrents[0].state, "active");
    assert_eq!(fake.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn basic_transfer_info_comes_from_its_own_endpoint() {
    let (fake, config) = spawn_fake_qbit(true).await;
    let client = QbitClient::new(&config).expect("client");

    let info = client.fetch_transfer_info().await.expect("transfer info");

    assert_eq!(info.connection_status, "firewalled");
    assert_eq!(info.up_info_data, 40);
    assert_eq!(fake.maindata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn building_the_client_does_not_contact_the_remote() {
    let (fake, config) = spawn_fake_qbit(true).await;

    let client = QbitClient::new(&config);

    assert!(client.is_ok());
    assert_eq!(fake.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_credentials_map_to_auth_failure() {
    let (_fake, mut config) = spawn_fake_qbit(true).await;
    config.password = "wrong".to_string();
    let client = QbitClient::new(&config).expect("client");

    let err = client.fetch_transfer_state().await.unwrap_err();

    assert!(matches!(err, ClientError::RemoteAuthFailed), "got {err:?}");
}

#[tokio::test]
async fn expired_session_triggers_a_single_relogin() {
    // Arrange
    let (fake, config) = spawn_fake_qbit(true).await;
    let client = QbitClient::new(&config).expect("client");
    client.fetch_transfer_state().await.expect("first call");
    fake.expire_next.store(true, Ordering::SeqCst);

    // Act
    let state = client.fetch_transfer_state().await;

    // Assert
    assert!(state.is_ok(), "got {state:?}");
    assert_eq!(fake.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_endpoint_maps_to_endpoint_missing() {
    let (_fake, config) = spawn_fake_qbit(false).await;
    let client = QbitClient::new(&config).expect("client");

    let err = client.fetch_peers("abc").await.unwrap_err();

    assert!(matches!(err, ClientError::RemoteEndpointMissing(_)), "got {err:?}");
}

#[tokio::test]
async fn unexpected_shape_maps_to_malformed_response() {
    let (_fake, config) = spawn_fake_qbit(true).await;
    let client = QbitClient::new(&config).expect("client");

    let err = client.fetch_torrents(TorrentFilter::Errored).await.unwrap_err();

    assert!(matches!(err, ClientError::MalformedResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn peers_keep_remote_order() {
    let (_fake, config) = spawn_fake_qbit(true).await;
    let client = QbitClient::new(&config).expect("client");

    let peers = client.fetch_peers("abc").await.expect("peers");

    let ids = peers.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["10.0.0.9:6881", "10.0.0.1:6881"]);
    assert_eq!(peers[0].1.downloaded, 100);
}

#[tokio::test]
async fn closed_port_maps_to_unreachable() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    let config = ExporterConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ExporterConfig::default()
    };
    let client = QbitClient::new(&config).expect("client");

    // Act
    let err = client.fetch_torrents(TorrentFilter::Active).await.unwrap_err();

    // Assert
    assert!(matches!(err, ClientError::RemoteUnreachable(_)), "got {err:?}");
}
