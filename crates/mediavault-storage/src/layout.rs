//! Date-partitioned directory layout.
//!
//! A chunk set lives at `{media_root}/{YYYYMMDD}/{file_id}/[subdir]`,
//! partitioned by the day it was written. Lookups try today's
//! partition first and then fall back across historical partitions in
//! descending name order, because a set may have been written on an
//! earlier day. The descending sort keeps the scan deterministic when
//! duplicates exist: the newest partition wins.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};

/// Partition directory name for `date` (`YYYYMMDD`).
pub fn partition_name(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Directory for `file_id` under today's partition.
pub fn partition_dir(media_root: &Path, file_id: &str, subdir: Option<&str>) -> PathBuf {
    let mut dir = media_root
        .join(partition_name(Local::now().date_naive()))
        .join(file_id);
    if let Some(sub) = subdir {
        dir = dir.join(sub);
    }
    dir
}

/// Locate the directory holding `file_id`, searching today's partition
/// first and then every historical partition in descending order.
///
/// Returns `None` when no partition contains the id.
pub fn find_in_partitions(media_root: &Path, file_id: &str, subdir: Option<&str>) -> Option<PathBuf> {
    let current = partition_dir(media_root, file_id, subdir);
    if current.is_dir() {
        return Some(current);
    }

    let entries = std::fs::read_dir(media_root).ok()?;
    let mut partitions: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    partitions.sort();
    partitions.reverse();

    for partition in partitions {
        let mut candidate = partition.join(file_id);
        if let Some(sub) = subdir {
            candidate = candidate.join(sub);
        }
        if candidate.is_dir() {
            return Some(candidate);
        }
    }
    None
}
