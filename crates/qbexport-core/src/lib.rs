pub mod client;
pub mod config;
pub mod fake;
pub mod metric;
pub mod records;
pub mod snapshot;

pub use client::{ClientError, QbitClient, TorrentClient};
pub use config::{ConfigError, ExporterConfig};
pub use metric::{FieldValue, Metric, MetricCollection};
pub use records::{PeerInfo, PeerMap, TorrentFilter, TorrentInfo, TransferInfo, TransferState};
pub use snapshot::{capture_timestamp, ScrapeMode, SnapshotBuilder, SnapshotOptions};
