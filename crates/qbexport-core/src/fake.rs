use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{ClientError, TorrentClient};
use crate::records::{PeerInfo, PeerMap, TorrentFilter, TorrentInfo, TransferInfo, TransferState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    TransferState,
    TransferInfo,
    Torrents(TorrentFilter),
    Peers(String),
}

/// Scripted in-memory gateway that records every call it receives.
#[derive(Default)]
pub struct FakeTorrentClient {
    transfer: Option<TransferState>,
    torrents: Vec<TorrentInfo>,
    peers: HashMap<String, PeerMap>,
    failure: Option<ClientError>,
    peer_failure: Option<ClientError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl FakeTorrentClient {
    pub fn new() -> Self {
        Self {
            transfer: Some(sample_transfer_state()),
            ..Self::default()
        }
    }

    pub fn with_torrent(mut self, torrent: TorrentInfo) -> Self {
        self.torrents.push(torrent);
        self
    }

    pub fn with_peer(mut self, torrent_hash: &str, id: &str, peer: PeerInfo) -> Self {
        self.peers
            .entry(torrent_hash.to_string())
            .or_default()
            .push((id.to_string(), peer));
        self
    }

    /// Every call fails with `err` from now on.
    pub fn failing(mut self, err: ClientError) -> Self {
        self.failure = Some(err);
        self
    }

    /// Only peer listings fail with `err`; everything else answers.
    pub fn failing_peers(mut self, err: ClientError) -> Self {
        self.peer_failure = Some(err);
        self
    }

    /// The torrent listing waits `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: RemoteCall) -> Result<(), ClientError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TorrentClient for FakeTorrentClient {
    async fn fetch_transfer_state(&self) -> Result<TransferState, ClientError> {
        self.record(RemoteCall::TransferState)?;
        self.transfer
            .clone()
            .ok_or_else(|| ClientError::RemoteEndpointMissing("/api/v2/sync/maindata".to_string()))
    }

    async fn fetch_transfer_info(&self) -> Result<TransferInfo, ClientError> {
        self.record(RemoteCall::TransferInfo)?;
        Ok(sample_transfer_info())
    }

    async fn fetch_torrents(&self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, ClientError> {
        self.record(RemoteCall::Torrents(filter))?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.torrents.clone())
    }

    async fn fetch_peers(&self, torrent_hash: &str) -> Result<PeerMap, ClientError> {
        self.record(RemoteCall::Peers(torrent_hash.to_string()))?;
        if let Some(err) = &self.peer_failure {
            return Err(err.clone());
        }
        Ok(self.peers.get(torrent_hash).cloned().unwrap_or_default())
    }
}

pub fn sample_transfer_state() -> TransferState {
    TransferState {
        connection_status: "connected".to_string(),
        alltime_dl: 1_000,
        alltime_ul: 2_000,
        average_time_queue: 3,
        dht_nodes: 250,
        dl_info_data: 10,
        dl_info_speed: 11,
        free_space_on_disk: 123_456,
        global_ratio: 1.25,
        queued_io_jobs: 0,
        queueing: true,
        read_cache_hits: 0.0,
        read_cache_overload: 0.0,
        total_buffers_size: 0,
        total_peer_connections: 4,
        total_queued_size: 0,
        total_wasted_session: 9,
        up_info_data: 20,
        up_info_speed: 21,
        use_alt_speed_limits: false,
        write_cache_overload: 0.0,
    }
}

pub fn sample_transfer_info() -> TransferInfo {
    TransferInfo {
        connection_status: "connected".to_string(),
        dht_nodes: 250,
        dl_info_data: 10,
        up_info_data: 20,
    }
}

pub fn sample_torrent(name: &str, hash: &str, state: &str, num_leechs: i64) -> TorrentInfo {
    TorrentInfo {
        name: name.to_string(),
        hash: hash.to_string(),
        tracker: "udp://tracker.example:1337".to_string(),
        state: state.to_string(),
        category: String::new(),
        tags: String::new(),
        uploaded: 0,
        downloaded: 512,
        dlspeed: 64,
        upspeed: 0,
        num_complete: 3,
        num_incomplete: num_leechs,
        num_leechs,
        num_seeds: 1,
        size: 4_096,
        added_on: 1_700_000_000,
        progress: 0.125,
        ratio: 0.0,
    }
}

pub fn sample_peer(ip: &str, flags: &str, uploaded: i64, downloaded: i64) -> PeerInfo {
    PeerInfo {
        ip: ip.to_string(),
        port: 6881,
        flags: flags.to_string(),
        client: "qBittorrent/4.6.0".to_string(),
        connection: "BT".to_string(),
        country: String::new(),
        dl_speed: 0,
        downloaded,
        uploaded,
        up_speed: 0,
        progress: 0.5,
    }
}
