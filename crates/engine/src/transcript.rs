//! Normalization of captured meeting/page transcripts into reducible text.

use serde::{Deserialize, Serialize};

/// One entry as delivered by the capture source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTranscriptEntry {
    pub text: String,
    pub start_offset: String,
    pub end_offset: String,
    #[serde(default)]
    pub speaker_display_name: Option<String>,
}

/// A normalized entry with the speaker defaulted when the source omits it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    pub text: String,
    pub start_offset: String,
    pub end_offset: String,
    pub speaker: String,
}

pub fn normalize(entries: Vec<RawTranscriptEntry>) -> Vec<TranscriptEntry> {
    entries
        .into_iter()
        .map(|e| TranscriptEntry {
            text: e.text,
            start_offset: e.start_offset,
            end_offset: e.end_offset,
            speaker: e.speaker_display_name.unwrap_or_else(|| "Unknown".to_string()),
        })
        .collect()
}

/// Flatten a transcript into the text fed to the reduction engine. Speaker
/// attribution is kept inline so the prompts can reference it.
pub fn flatten(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("[{} - {}] {}: {}", e.start_offset, e.end_offset, e.speaker, e.text))
        .collect::<Vec<_>>()
        .join("\n")
}
