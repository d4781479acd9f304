//! Database models for snipper storage
//!
//! Two collections:
//! - `audio_files`: uploaded tracks, raw bytes included, one of them active
//! - `snippets`: persisted regions, unique per (region_id, audio_file_id)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded audio track
///
/// `file_name` is unique: uploading the same name again reuses the row.
/// At most one track has `is_active` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbAudioFile {
    pub id: i64,
    pub file_name: String,
    /// Encoded audio bytes as uploaded
    #[serde(skip)]
    pub data: Vec<u8>,
    pub upload_time: DateTime<Utc>,
    pub is_active: bool,
}

/// Track listing row without the audio bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbAudioFileInfo {
    pub id: i64,
    pub file_name: String,
    pub size_bytes: i64,
    pub upload_time: DateTime<Utc>,
    pub is_active: bool,
}

/// Input for `upsert_track`
#[derive(Debug, Clone)]
pub struct NewAudioFile {
    pub file_name: String,
    pub data: Vec<u8>,
    pub upload_time: DateTime<Utc>,
}

impl NewAudioFile {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        NewAudioFile {
            file_name: file_name.into(),
            data,
            upload_time: Utc::now(),
        }
    }
}

/// Persisted form of a region
///
/// `region_id` correlates with the in-memory region id; the pair
/// (region_id, audio_file_id) is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbSnippet {
    pub id: i64,
    pub audio_file_id: i64,
    pub region_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub name: String,
    pub is_active: bool,
    /// Last write to this row, used to pick a winner when several rows of
    /// one track are marked active
    pub updated_at: DateTime<Utc>,
}

/// Input for `upsert_snippet`
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetRecord {
    pub audio_file_id: i64,
    pub region_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub name: String,
    pub is_active: bool,
}
