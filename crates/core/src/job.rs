//! The job model shared by the queue, the worker, and the adapters.
//!
//! A [`Job`] is immutable once enqueued; all mutable execution state
//! (attempts, progress, result) lives on the queue's stored record,
//! not here.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// The media kind a job produces. Routing in the worker dispatcher is
/// strictly by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Video,
    Voice,
    Music,
    Composite,
}

impl JobKind {
    /// Stable string form used in logs and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
            JobKind::Voice => "voice",
            JobKind::Music => "music",
            JobKind::Composite => "composite",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Default priority assigned when the caller does not override.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Lowest numeric priority value (highest urgency).
pub const MIN_PRIORITY: u8 = 1;

/// Highest numeric priority value (lowest urgency).
pub const MAX_PRIORITY: u8 = 5;

/// Validate a caller-supplied priority override.
pub fn validate_priority(priority: u8) -> Result<(), CoreError> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Priority must be between {MIN_PRIORITY} and {MAX_PRIORITY} (got {priority})"
        )))
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Kind-specific generation parameters.
///
/// The tag duplicates [`Job::kind`] on the wire; [`JobPayload::kind`]
/// is the single source of truth when the two could disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Image(ImageInput),
    Video(VideoInput),
    Voice(VoiceInput),
    Music(MusicInput),
    Composite(CompositeInput),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Image(_) => JobKind::Image,
            JobPayload::Video(_) => JobKind::Video,
            JobPayload::Voice(_) => JobKind::Voice,
            JobPayload::Music(_) => JobKind::Music,
            JobPayload::Composite(_) => JobKind::Composite,
        }
    }
}

/// Parameters for a single image generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub prompt: String,
    /// Overrides the family's default negative prompt when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Engine-local filename of an already-uploaded reference image.
    /// Presence selects the reference-conditioned (img2img) graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    /// Conditioning strength for img2img, in (0, 1). Lower preserves
    /// the reference more strongly. Ignored without a reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denoise: Option<f32>,
}

/// Parameters for a video segment generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInput {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Number of frames to generate.
    pub frames: u32,
    pub fps: u32,
    /// Engine-local filename of an already-uploaded first frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Parameters for a voice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInput {
    pub text: String,
    pub voice_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

/// Parameters for a music cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicInput {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub duration_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Parameters for a scene composite. Compositing itself is stubbed;
/// the kind exists so jobs route and report uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeInput {
    pub segment_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Job, state, result
// ---------------------------------------------------------------------------

/// A unit of generation work. Immutable after enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub project_id: String,
    pub user_id: String,
    pub payload: JobPayload,
    /// 1 (highest) .. 5 (lowest), default 3.
    pub priority: u8,
    pub created_at: Timestamp,
    /// Optional caller-supplied dedupe key: re-submitting identical
    /// work reuses the existing job instead of duplicating engine load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Execution state owned by the queue/worker pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    /// Waiting out a retry backoff.
    Delayed,
}

impl JobState {
    /// Completed and Failed are terminal; everything else can still
    /// make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        };
        f.write_str(s)
    }
}

/// Outcome of one job attempt, produced exactly once per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl JobResult {
    pub fn ok(output_url: Option<String>, metadata: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            output_url,
            error: None,
            metadata,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output_url: None,
            error: Some(message.into()),
            metadata: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
