// Transfer statistics per session: latest engine snapshot plus bytes served to clients.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::source::traits::TransferStats;

pub struct StatsCollector {
    latest: Mutex<TransferStats>,
    serve_bytes_total: AtomicU64,
}

impl StatsCollector {
    pub fn new(file_count: usize) -> Self {
        Self {
            latest: Mutex::new(TransferStats {
                file_downloaded: vec![0; file_count],
                ..TransferStats::default()
            }),
            serve_bytes_total: AtomicU64::new(0),
        }
    }

    /// Fold a fresh engine snapshot into the stored one.
    ///
    /// Per-file counters never go backwards and entries the engine omits keep
    /// their previous value. Progress is clamped to [0, 1]. Returns whether any
    /// per-file counter grew.
    pub fn merge(&self, update: TransferStats) -> bool {
        let mut latest = self.latest.lock();
        latest.progress = if update.progress.is_finite() {
            update.progress.clamp(0.0, 1.0)
        } else {
            latest.progress
        };
        latest.download_speed = update.download_speed.max(0.0);
        latest.upload_speed = update.upload_speed.max(0.0);
        latest.num_peers = update.num_peers;
        let mut advanced = false;
        for (slot, value) in latest
            .file_downloaded
            .iter_mut()
            .zip(update.file_downloaded)
        {
            if value > *slot {
                *slot = value;
                advanced = true;
            }
        }
        advanced
    }

    pub fn snapshot(&self) -> TransferStats {
        self.latest.lock().clone()
    }

    pub fn record_served(&self, bytes: u64) {
        self.serve_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_served(&self) -> u64 {
        self.serve_bytes_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_counters_monotonic() {
        let stats = StatsCollector::new(2);
        assert!(stats.merge(TransferStats {
            progress: 0.5,
            download_speed: 1000.0,
            upload_speed: 10.0,
            num_peers: 4,
            file_downloaded: vec![500, 20],
        }));
        assert!(!stats.merge(TransferStats {
            progress: 0.6,
            download_speed: 800.0,
            upload_speed: 0.0,
            num_peers: 3,
            file_downloaded: vec![400],
        }));

        let snap = stats.snapshot();
        assert_eq!(snap.file_downloaded, vec![500, 20]);
        assert_eq!(snap.num_peers, 3);
        assert!((snap.progress - 0.6).abs() < f64::EPSILON);
        assert!((snap.download_speed - 800.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_clamps_progress() {
        let stats = StatsCollector::new(0);
        assert!(!stats.merge(TransferStats {
            progress: 1.7,
            ..TransferStats::default()
        }));
        assert!((stats.snapshot().progress - 1.0).abs() < f64::EPSILON);

        stats.merge(TransferStats {
            progress: f64::NAN,
            ..TransferStats::default()
        });
        assert!((stats.snapshot().progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_reports_growth_per_file() {
        let stats = StatsCollector::new(2);
        assert!(!stats.merge(TransferStats {
            file_downloaded: vec![0, 0],
            ..TransferStats::default()
        }));
        assert!(stats.merge(TransferStats {
            file_downloaded: vec![0, 64],
            ..TransferStats::default()
        }));
        assert!(!stats.merge(TransferStats {
            file_downloaded: vec![0, 64],
            ..TransferStats::default()
        }));
    }

    #[test]
    fn test_served_bytes() {
        let stats = StatsCollector::new(1);
        stats.record_served(100);
        stats.record_served(28);
        assert_eq!(stats.total_served(), 128);
    }
}
