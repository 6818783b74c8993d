//! Flattens one consistent view of the torrent client into line-protocol rows.
//!
//! A snapshot is built for exactly one timestamp, captured by the caller
//! before the first remote call; every metric produced here carries it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::{ClientError, TorrentClient};
use crate::metric::{Metric, MetricCollection};
use crate::records::{PeerInfo, TorrentFilter, TorrentInfo, TransferInfo, TransferState};

pub const DEFAULT_CATEGORY: &str = "uncategorized";
pub const DEFAULT_TAGS: &str = "none";
pub const DEFAULT_CLIENT: &str = "none";
/// Stands in for any other empty tag value; line protocol has no empty tags.
pub const DEFAULT_UNKNOWN: &str = "none";

/// Which slice of the client a scrape reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    /// Active torrents plus the full server state.
    Active,
    /// Stalled torrents only.
    Inactive,
    /// Resumed torrents plus a basic transfer summary.
    Legacy,
}

impl ScrapeMode {
    pub fn torrent_filter(self) -> TorrentFilter {
        match self {
            ScrapeMode::Active => TorrentFilter::Active,
            ScrapeMode::Inactive => TorrentFilter::Stalled,
            ScrapeMode::Legacy => TorrentFilter::Resumed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeMode::Active => "active",
            ScrapeMode::Inactive => "inactive",
            ScrapeMode::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ScrapeMode::Active),
            "inactive" => Ok(ScrapeMode::Inactive),
            "legacy" => Ok(ScrapeMode::Legacy),
            other => Err(format!("unknown scrape mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub metrics_prefix: String,
    pub log_peers: bool,
    pub log_inactive_peers: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            metrics_prefix: "qbittorrent".to_string(),
            log_peers: false,
            log_inactive_peers: false,
        }
    }
}

/// Current wall clock as nanoseconds since the epoch.
pub fn capture_timestamp() -> i64 {
    timestamp_nanos(Utc::now())
}

pub fn timestamp_nanos(ts: DateTime<Utc>) -> i64 {
    // Out of range only past the year 2262.
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub struct SnapshotBuilder<'a, C: TorrentClient + ?Sized> {
    client: &'a C,
    options: &'a SnapshotOptions,
    timestamp: i64,
}

impl<'a, C: TorrentClient + ?Sized> SnapshotBuilder<'a, C> {
    pub fn new(client: &'a C, options: &'a SnapshotOptions, timestamp: i64) -> Self {
        Self {
            client,
            options,
            timestamp,
        }
    }

    /// Fetches and flattens everything `mode` reports on.
    ///
    /// Remote calls: at most one transfer fetch (full server state for
    /// `Active`, the basic summary for `Legacy`), one torrent listing and one
    /// peer listing per torrent that has leechers. Any failure aborts the
    /// whole snapshot; no partial collection is returned.
    pub async fn build(&self, mode: ScrapeMode) -> Result<MetricCollection, ClientError> {
        let mut collection = MetricCollection::new();

        match mode {
            ScrapeMode::Active => {
                let state = self.client.fetch_transfer_state().await?;
                collection.push(self.transfer_metric(&state));
            }
            ScrapeMode::Legacy => {
                let info = self.client.fetch_transfer_info().await?;
                collection.push(self.basic_transfer_metric(&info));
            }
            ScrapeMode::Inactive => {}
        }

        let torrents = self.client.fetch_torrents(mode.torrent_filter()).await?;
        for torrent in &torrents {
            collection.push(self.torrent_metric(torrent));

            if self.options.log_peers && torrent.num_leechs > 0 {
                let peers = self.client.fetch_peers(&torrent.hash).await?;
                for (_, peer) in &peers {
                    if let Some(metric) = self.peer_metric(&torrent.hash, peer) {
                        collection.push(metric);
                    }
                }
            }
        }

        debug!(%mode, torrents = torrents.len(), metrics = collection.len(), "snapshot built");
        Ok(collection)
    }

    fn metric(&self, suffix: &str) -> Metric {
        let mut metric = Metric::new(format!("{}_{suffix}", self.options.metrics_prefix));
        metric.with_timestamp(self.timestamp);
        metric
    }

    pub fn transfer_metric(&self, state: &TransferState) -> Metric {
        let mut metric = self.metric("transfer");
        metric
            .add_tag("connection_status", state.connection_status.as_str())
            .add_value("alltime_dl", state.alltime_dl)
            .add_value("alltime_ul", state.alltime_ul)
            .add_value("average_time_queue", state.average_time_queue)
            .add_value("dht_nodes", state.dht_nodes)
            .add_value("dl_info_data", state.dl_info_data)
            .add_value("dl_info_speed", state.dl_info_speed)
            .add_value("free_space_on_disk", state.free_space_on_disk)
            .add_value("global_ratio", state.global_ratio)
            .add_value("queued_io_jobs", state.queued_io_jobs)
            .add_value("queueing", state.queueing)
            .add_value("read_cache_hits", state.read_cache_hits)
            .add_value("read_cache_overload", state.read_cache_overload)
            .add_value("total_buffers_size", state.total_buffers_size)
            .add_value("total_peer_connections", state.total_peer_connections)
            .add_value("total_queued_size", state.total_queued_size)
            .add_value("total_wasted_session", state.total_wasted_session)
            .add_value("up_info_data", state.up_info_data)
            .add_value("up_info_speed", state.up_info_speed)
            .add_value("use_alt_speed_limits", state.use_alt_speed_limits)
            .add_value("write_cache_overload", state.write_cache_overload);
        metric
    }

    pub fn basic_transfer_metric(&self, info: &TransferInfo) -> Metric {
        let mut metric = self.metric("transfer");
        metric
            .add_tag("connection_status", info.connection_status.as_str())
            .add_value("dht_nodes", info.dht_nodes)
            .add_value("dl_info_data", info.dl_info_data)
            .add_value("up_info_data", info.up_info_data);
        metric
    }

    pub fn torrent_metric(&self, torrent: &TorrentInfo) -> Metric {
        let mut metric = self.metric("torrent");
        metric
            .add_tag("name", torrent.name.as_str())
            .add_tag("hash", torrent.hash.as_str())
            .add_tag("tracker", or_default(&torrent.tracker, DEFAULT_UNKNOWN))
            .add_tag("state", torrent.state.as_str())
            .add_tag("category", or_default(&torrent.category, DEFAULT_CATEGORY))
            .add_tag("tags", or_default(&torrent.tags, DEFAULT_TAGS))
            .add_value("uploaded", torrent.uploaded)
            .add_value("downloaded", torrent.downloaded)
            .add_value("dlspeed", torrent.dlspeed)
            .add_value("upspeed", torrent.upspeed)
            .add_value("num_complete", torrent.num_complete)
            .add_value("num_incomplete", torrent.num_incomplete)
            .add_value("num_leechs", torrent.num_leechs)
            .add_value("num_seeds", torrent.num_seeds)
            .add_value("size", torrent.size)
            .add_value("added_on", torrent.added_on)
            .add_value("progress", torrent.progress)
            .add_value("ratio", torrent.ratio);
        metric
    }

    /// Returns `None` for peers that are filtered out.
    pub fn peer_metric(&self, torrent_hash: &str, peer: &PeerInfo) -> Option<Metric> {
        if peer.flags.trim().is_empty() {
            return None;
        }
        if peer.downloaded == 0 && peer.uploaded == 0 && !self.options.log_inactive_peers {
            return None;
        }

        let client = or_default(&peer.client, DEFAULT_CLIENT).replace('\\', "\\\\");

        let mut metric = self.metric("peers");
        metric
            .add_tag("hash", torrent_hash)
            .add_tag("ip", peer.ip.as_str())
            .add_tag("port", peer.port.to_string())
            .add_tag("flags", peer.flags.as_str())
            .add_tag("client", client)
            .add_tag("connection", or_default(&peer.connection, DEFAULT_UNKNOWN))
            .add_tag("country", or_default(&peer.country, DEFAULT_UNKNOWN))
            .add_value("dl_speed", peer.dl_speed)
            .add_value("downloaded", peer.downloaded)
            .add_value("uploaded", peer.uploaded)
            .add_value("up_speed", peer.up_speed)
            .add_value("progress", peer.progress);
        Some(metric)
    }
}

fn or_default<'s>(value: &'s str, default: &'s str) -> &'s str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod snapshot_tests;
