use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ExporterConfig;
use crate::records::{PeerInfo, PeerMap, TorrentFilter, TorrentInfo, TransferInfo, TransferState};

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),
    #[error("remote rejected credentials")]
    RemoteAuthFailed,
    #[error("remote endpoint missing: {0}")]
    RemoteEndpointMissing(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Read-only view of the torrent client's control API.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    async fn fetch_transfer_state(&self) -> Result<TransferState, ClientError>;
    async fn fetch_transfer_info(&self) -> Result<TransferInfo, ClientError>;
    async fn fetch_torrents(&self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, ClientError>;
    async fn fetch_peers(&self, torrent_hash: &str) -> Result<PeerMap, ClientError>;
}

#[derive(Deserialize)]
struct MainData {
    server_state: TransferState,
}

#[derive(Deserialize)]
struct TorrentPeers {
    peers: serde_json::Map<String, serde_json::Value>,
}

/// Session against the qBittorrent Web API.
///
/// Logs in on first use and again whenever the remote answers 403, which is
/// how an expired `SID` cookie shows up.
pub struct QbitClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
    logged_in: Mutex<bool>,
}

impl QbitClient {
    /// Builds the local HTTP client only; nothing is sent until the first
    /// fetch. An error here is a local TLS or resolver setup failure.
    pub fn new(config: &ExporterConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
            logged_in: Mutex::new(false),
        })
    }

    async fn login(&self) -> Result<(), ClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::REFERER, &self.base_url)
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|err| transport_error(&url, err))?;

        let response = check_status(&url, response)?;
        let body = response
            .text()
            .await
            .map_err(|err| transport_error(&url, err))?;

        if body.trim() != "Ok." {
            return Err(ClientError::RemoteAuthFailed);
        }

        info!(base_url = %self.base_url, "logged in to qbittorrent");
        Ok(())
    }

    async fn ensure_logged_in(&self, force: bool) -> Result<(), ClientError> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in && !force {
            return Ok(());
        }
        *logged_in = false;
        self.login().await?;
        *logged_in = true;
        Ok(())
    }

    async fn send_get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, ClientError> {
        self.http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| transport_error(url, err))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.ensure_logged_in(false).await?;

        let url = format!("{}{}", self.base_url, path);
        let mut response = self.send_get(&url, query).await?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!(%url, "session rejected, logging in again");
            self.ensure_logged_in(true).await?;
            response = self.send_get(&url, query).await?;
        }

        let response = check_status(&url, response)?;
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(&url, err))?;

        debug!(%url, bytes = body.len(), "remote call");
        serde_json::from_slice(&body)
            .map_err(|err| ClientError::MalformedResponse(format!("{url}: {err}")))
    }
}

#[async_trait]
impl TorrentClient for QbitClient {
    async fn fetch_transfer_state(&self) -> Result<TransferState, ClientError> {
        let data: MainData = self.get_json("/api/v2/sync/maindata", &[("rid", "0")]).await?;
        Ok(data.server_state)
    }

    async fn fetch_transfer_info(&self) -> Result<TransferInfo, ClientError> {
        self.get_json("/api/v2/transfer/info", &[]).await
    }

    async fn fetch_torrents(&self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, ClientError> {
        self.get_json("/api/v2/torrents/info", &[("filter", filter.as_str())])
            .await
    }

    async fn fetch_peers(&self, torrent_hash: &str) -> Result<PeerMap, ClientError> {
        let data: TorrentPeers = self
            .get_json(
                "/api/v2/sync/torrentPeers",
                &[("hash", torrent_hash), ("rid", "0")],
            )
            .await?;

        data.peers
            .into_iter()
            .map(|(id, raw)| {
                serde_json::from_value::<PeerInfo>(raw)
                    .map(|peer| (id.clone(), peer))
                    .map_err(|err| ClientError::MalformedResponse(format!("peer {id}: {err}")))
            })
            .collect()
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::RemoteAuthFailed),
        StatusCode::NOT_FOUND => Err(ClientError::RemoteEndpointMissing(url.to_string())),
        other => Err(ClientError::MalformedResponse(format!("{url}: unexpected status {other}"))),
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        return ClientError::MalformedResponse(format!("{url}: {err}"));
    }
    ClientError::RemoteUnreachable(format!("{url}: {err}"))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
