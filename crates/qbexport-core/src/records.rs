//! Typed views of the remote control API payloads.
//!
//! Every payload is decoded into one of these structs at the gateway
//! boundary; a missing required field is a decode error there, never an
//! untyped lookup failure further up.

use serde::{Deserialize, Deserializer};

/// Global daemon state, the `server_state` object of a full sync.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferState {
    pub connection_status: String,
    pub alltime_dl: i64,
    pub alltime_ul: i64,
    pub average_time_queue: i64,
    pub dht_nodes: i64,
    pub dl_info_data: i64,
    pub dl_info_speed: i64,
    pub free_space_on_disk: i64,
    #[serde(deserialize_with = "number_or_string")]
    pub global_ratio: f64,
    pub queued_io_jobs: i64,
    pub queueing: bool,
    #[serde(deserialize_with = "number_or_string")]
    pub read_cache_hits: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub read_cache_overload: f64,
    pub total_buffers_size: i64,
    pub total_peer_connections: i64,
    pub total_queued_size: i64,
    pub total_wasted_session: i64,
    pub up_info_data: i64,
    pub up_info_speed: i64,
    pub use_alt_speed_limits: bool,
    #[serde(deserialize_with = "number_or_string")]
    pub write_cache_overload: f64,
}

/// Basic transfer summary from `/api/v2/transfer/info`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferInfo {
    pub connection_status: String,
    pub dht_nodes: i64,
    pub dl_info_data: i64,
    pub up_info_data: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TorrentInfo {
    pub name: String,
    pub hash: String,
    #[serde(default)]
    pub tracker: String,
    pub state: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: String,
    pub uploaded: i64,
    pub downloaded: i64,
    pub dlspeed: i64,
    pub upspeed: i64,
    pub num_complete: i64,
    pub num_incomplete: i64,
    pub num_leechs: i64,
    pub num_seeds: i64,
    pub size: i64,
    pub added_on: i64,
    pub progress: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeerInfo {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub flags: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub country: String,
    pub dl_speed: i64,
    pub downloaded: i64,
    pub uploaded: i64,
    pub up_speed: i64,
    pub progress: f64,
}

/// Peers of one torrent keyed by `ip:port`, in the order the remote sent them.
pub type PeerMap = Vec<(String, PeerInfo)>;

/// Torrent state predicates understood by the remote's torrent listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentFilter {
    All,
    Downloading,
    Seeding,
    Completed,
    Resumed,
    Paused,
    Active,
    Inactive,
    Stalled,
    StalledUploading,
    StalledDownloading,
    Errored,
}

impl TorrentFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            TorrentFilter::All => "all",
            TorrentFilter::Downloading => "downloading",
            TorrentFilter::Seeding => "seeding",
            TorrentFilter::Completed => "completed",
            TorrentFilter::Resumed => "resumed",
            TorrentFilter::Paused => "paused",
            TorrentFilter::Active => "active",
            TorrentFilter::Inactive => "inactive",
            TorrentFilter::Stalled => "stalled",
            TorrentFilter::StalledUploading => "stalled_uploading",
            TorrentFilter::StalledDownloading => "stalled_downloading",
            TorrentFilter::Errored => "errored",
        }
    }
}

impl std::fmt::Display for TorrentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Some ratios and cache counters arrive as strings ("0.42").
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
