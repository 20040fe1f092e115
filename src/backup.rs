// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Checkpoint file for long running computations.
//!
//! Each kernel stores a section keyed by its name and stamped with
//! the inputs (x, y, z, k): a resume only restores state when the
//! inputs match exactly. The hard leaf kernels additionally keep
//! the per-level phi offsets without which a partial sum cannot be
//! continued. Checkpoints are written about once a minute from the
//! serial stitching section; a failed write is reported and
//! otherwise ignored so that the computation goes on without
//! backups, while a failed or mismatched read on --resume is a
//! hard error.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{Error, Preferences, Verbosity};

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct HardBackup {
    pub x: String,
    pub y: i64,
    #[serde(default)]
    pub z: i64,
    #[serde(default)]
    pub k: i64,
    pub low: i64,
    pub segments: i64,
    pub segment_size: i64,
    pub sum: String,
    pub phi: Vec<i64>,
    pub percent: f64,
    pub seconds: f64,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct P2Backup {
    pub x: String,
    pub y: i64,
    pub z: i64,
    pub low: i64,
    pub thread_dist: i64,
    pub pi_low_minus_1: i64,
    pub sum: String,
    pub percent: f64,
    pub seconds: f64,
}

/// Result-only section for the kernels that finish in one go.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SumBackup {
    pub x: String,
    pub y: i64,
    #[serde(default)]
    pub z: i64,
    #[serde(default)]
    pub k: i64,
    pub sum: String,
    pub seconds: f64,
}

#[derive(Serialize, Deserialize, Default)]
pub struct BackupFile {
    #[serde(rename = "P2", skip_serializing_if = "Option::is_none")]
    pub p2: Option<P2Backup>,
    #[serde(rename = "B", skip_serializing_if = "Option::is_none")]
    pub b: Option<P2Backup>,
    #[serde(rename = "S2_hard", skip_serializing_if = "Option::is_none")]
    pub s2_hard: Option<HardBackup>,
    #[serde(rename = "D", skip_serializing_if = "Option::is_none")]
    pub d: Option<HardBackup>,
    #[serde(rename = "S1", skip_serializing_if = "Option::is_none")]
    pub s1: Option<SumBackup>,
    #[serde(rename = "Phi0", skip_serializing_if = "Option::is_none")]
    pub phi0: Option<SumBackup>,
    #[serde(rename = "S2_easy", skip_serializing_if = "Option::is_none")]
    pub s2_easy: Option<SumBackup>,
    #[serde(rename = "AC", skip_serializing_if = "Option::is_none")]
    pub ac: Option<SumBackup>,
}

/// Read the backup file. A missing file is an empty backup unless
/// --resume was requested, in which case it is an error.
pub fn load(prefs: &Preferences) -> Result<BackupFile, Error> {
    let Some(path) = &prefs.backup_file else {
        return Ok(BackupFile::default());
    };
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data)
            .map_err(|e| Error::BackupIo(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !prefs.resume => {
            Ok(BackupFile::default())
        }
        Err(e) => Err(Error::BackupIo(format!("{}: {e}", path.display()))),
    }
}

/// Write the backup file; on failure the computation continues
/// without backups.
pub fn store(prefs: &Preferences, file: &BackupFile) {
    let Some(path) = &prefs.backup_file else {
        return;
    };
    let result = serde_json::to_string_pretty(file)
        .map_err(|e| e.to_string())
        .and_then(|data| std::fs::write(path, data).map_err(|e| e.to_string()));
    if let Err(e) = result {
        if prefs.verbose(Verbosity::Info) {
            eprintln!("warning: could not write backup {}: {e}", path.display());
        }
    }
}

/// Shared 60 second timer for checkpoint writes.
pub struct BackupTimer {
    last: Instant,
}

impl BackupTimer {
    pub fn new() -> Self {
        BackupTimer {
            last: Instant::now(),
        }
    }

    pub fn due(&mut self) -> bool {
        if self.last.elapsed().as_secs() >= 60 {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

impl Default for BackupTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn test_backup_roundtrip() {
    let dir = std::env::temp_dir().join(format!("yamapix-backup-{}", std::process::id()));
    let mut prefs = Preferences::default();
    prefs.backup_file = Some(dir.clone());

    let mut file = BackupFile::default();
    file.p2 = Some(P2Backup {
        x: "100000000000".into(),
        y: 31622,
        z: 3162277,
        low: 1 << 23,
        thread_dist: 1 << 23,
        pi_low_minus_1: 42,
        sum: "-123456789".into(),
        percent: 12.5,
        seconds: 3.25,
    });
    file.d = Some(HardBackup {
        x: "100000000000".into(),
        y: 31622,
        z: 47433,
        k: 7,
        low: 128,
        segments: 2,
        segment_size: 1 << 23,
        sum: "170141183460469231731687303715884105".into(),
        phi: vec![0, 1, 2, 3],
        percent: 1.0,
        seconds: 1.0,
    });
    store(&prefs, &file);
    let loaded = load(&prefs).unwrap();
    let p2 = loaded.p2.unwrap();
    assert_eq!(p2.y, 31622);
    assert_eq!(p2.sum, "-123456789");
    let d = loaded.d.unwrap();
    assert_eq!(d.phi, vec![0, 1, 2, 3]);
    assert_eq!(d.sum.parse::<i128>().unwrap(), 170141183460469231731687303715884105);
    assert!(loaded.s2_hard.is_none());
    std::fs::remove_file(&dir).unwrap();

    // resume from a missing file is an error
    prefs.resume = true;
    assert!(matches!(load(&prefs), Err(Error::BackupIo(_))));
    // without resume a missing file is just an empty backup
    prefs.resume = false;
    assert!(load(&prefs).unwrap().p2.is_none());
}
