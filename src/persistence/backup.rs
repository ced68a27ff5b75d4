//! Local copy of outbound records
//!
//! Persisted to LocalStorage so a session's data survives a failed upload.
//! Keeps the most recent records, oldest dropped first. Trial trajectories
//! stay out of the backup to keep it within the storage quota.

use serde::{Deserialize, Serialize};

use super::RecordSink;
use crate::sim::Outbound;

/// Maximum number of records to keep
pub const MAX_BACKUP_RECORDS: usize = 64;

/// A stored record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub record: Outbound,
    /// Unix timestamp (ms) when stored
    pub stored_at: f64,
}

/// Ring of recent records
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocalBackup {
    pub entries: Vec<BackupEntry>,
}

impl LocalBackup {
    /// LocalStorage key (used only in wasm32)
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "arena_nav_records";

    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a record, dropping the oldest beyond the cap.
    /// Trajectories are not kept. Returns how many were dropped.
    pub fn push(&mut self, mut record: Outbound, stored_at: f64) -> usize {
        if let Outbound::Trial(trial) = &mut record {
            trial.trajectory = Vec::new();
        }
        self.entries.push(BackupEntry { record, stored_at });
        let overflow = self.entries.len().saturating_sub(MAX_BACKUP_RECORDS);
        if overflow > 0 {
            log::warn!("Record backup full, dropping {} oldest", overflow);
            self.entries.drain(..overflow);
        }
        overflow
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Load the backup from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Ok(backup) = serde_json::from_str::<LocalBackup>(&json) {
                    log::info!("Loaded {} backed-up records", backup.entries.len());
                    return backup;
                }
            }
        }

        Self::new()
    }

    /// Save the backup to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            match serde_json::to_string(self) {
                Ok(json) => {
                    if storage.set_item(Self::STORAGE_KEY, &json).is_err() {
                        log::error!("LocalStorage rejected record backup");
                    }
                }
                Err(e) => log::error!("Failed to encode record backup: {}", e),
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::new()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}

impl RecordSink for LocalBackup {
    fn submit(&mut self, record: &Outbound) {
        self.push(record.clone(), now_ms());
        self.save();
    }
}

#[cfg(target_arch = "wasm32")]
fn now_ms() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
fn now_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::sim::{SessionSummary, TrajectorySample, TrialPhase, TrialRecord, TrialStage};

    fn summary(id: &str, trials: u32) -> Outbound {
        Outbound::Session(SessionSummary {
            participant_id: id.to_string(),
            trials_completed: trials,
            practice_score: 5,
            total_time: 1.0,
        })
    }

    #[test]
    fn test_backup_drops_oldest() {
        let mut backup = LocalBackup::new();
        for i in 0..MAX_BACKUP_RECORDS as u32 {
            assert_eq!(backup.push(summary("A", i), i as f64), 0);
        }
        assert_eq!(backup.push(summary("A", 999), 0.0), 1);
        assert_eq!(backup.len(), MAX_BACKUP_RECORDS);
        match &backup.entries[0].record {
            Outbound::Session(s) => assert_eq!(s.trials_completed, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    fn trial(samples: usize) -> TrialRecord {
        TrialRecord {
            participant_id: "A".to_string(),
            phase: TrialPhase::Test,
            trial: 1,
            trial_info: "test 1".to_string(),
            final_position: DVec2::new(0.3, -0.2),
            final_heading: 90.0,
            annotation: Some(DVec2::new(0.5, 0.5)),
            encountered_goal: Some(DVec2::new(0.5, 1.0)),
            exploration_time: 42.0,
            annotation_time: Some(3.5),
            error_distance: Some(0.5),
            timestamp: 100.0,
            trajectory: (0..samples)
                .map(|i| TrajectorySample {
                    stage: TrialStage::Exploration,
                    t: i as f64 * 0.02,
                    x: 0.1,
                    y: 0.2,
                })
                .collect(),
        }
    }

    #[test]
    fn test_backup_drops_trajectory() {
        let record = trial(5000);
        let mut backup = LocalBackup::new();
        backup.submit(&Outbound::Trial(record.clone()));
        match &backup.entries[0].record {
            Outbound::Trial(kept) => {
                assert!(kept.trajectory.is_empty());
                assert_eq!(kept.encountered_goal, record.encountered_goal);
                assert_eq!(kept.error_distance, record.error_distance);
            }
            other => panic!("unexpected {other:?}"),
        }
        let json = serde_json::to_string(&backup).unwrap();
        assert!(!json.contains("trajectory"));
    }

    #[test]
    fn test_full_backup_stays_small() {
        let mut backup = LocalBackup::new();
        for _ in 0..MAX_BACKUP_RECORDS {
            backup.push(Outbound::Trial(trial(3000)), 0.0);
        }
        let json = serde_json::to_string(&backup).unwrap();
        assert!(json.len() < 64 * 1024, "backup is {} bytes", json.len());
    }
}
