//! Voice and music graph construction.
//!
//! Audio chains are short: one synthesis node feeding the terminal
//! audio save. They share the save id convention with the image
//! chains so the history inspection finds their output the same way.

use fableworks_core::job::{MusicInput, VoiceInput};

use crate::error::ProviderError;
use crate::families::{ids, OUTPUT_PREFIX};
use crate::graph::{Node, WorkflowGraph};

pub const DEFAULT_SPEECH_SPEED: f32 = 1.0;

/// Speed multipliers outside this range produce unusable audio.
pub const SPEED_RANGE: (f32, f32) = (0.5, 2.0);

/// Music cues longer than this are refused.
pub const MAX_MUSIC_SECS: u32 = 600;

pub fn build_voice_graph(input: &VoiceInput) -> Result<WorkflowGraph, ProviderError> {
    if input.text.trim().is_empty() {
        return Err(ProviderError::InvalidInput("Text must not be empty".into()));
    }
    if input.voice_id.trim().is_empty() {
        return Err(ProviderError::InvalidInput(
            "Voice id must not be empty".into(),
        ));
    }
    let speed = input.speed.unwrap_or(DEFAULT_SPEECH_SPEED);
    if !(SPEED_RANGE.0..=SPEED_RANGE.1).contains(&speed) {
        return Err(ProviderError::InvalidInput(format!(
            "Speech speed must be in {:?} (got {speed})",
            SPEED_RANGE
        )));
    }

    let mut graph = WorkflowGraph::new(ids::SAVE);
    let audio = graph.insert(
        ids::SAMPLER,
        Node::TtsGenerate {
            text: input.text.clone(),
            voice: input.voice_id.clone(),
            speed,
        },
    );
    graph.insert(
        ids::SAVE,
        Node::SaveAudio {
            audio,
            filename_prefix: OUTPUT_PREFIX.to_string(),
        },
    );
    Ok(graph)
}

pub fn build_music_graph(input: &MusicInput) -> Result<WorkflowGraph, ProviderError> {
    if input.prompt.trim().is_empty() {
        return Err(ProviderError::InvalidInput(
            "Prompt must not be empty".into(),
        ));
    }
    if input.duration_secs == 0 || input.duration_secs > MAX_MUSIC_SECS {
        return Err(ProviderError::InvalidInput(format!(
            "Duration must be in 1..={MAX_MUSIC_SECS} seconds (got {})",
            input.duration_secs
        )));
    }

    let mut graph = WorkflowGraph::new(ids::SAVE);
    let audio = graph.insert(
        ids::SAMPLER,
        Node::MusicGenerate {
            prompt: input.prompt.clone(),
            style: input.style.clone().unwrap_or_default(),
            seconds: input.duration_secs,
            seed: input.seed.unwrap_or_else(rand::random),
        },
    );
    graph.insert(
        ids::SAVE,
        Node::SaveAudio {
            audio,
            filename_prefix: OUTPUT_PREFIX.to_string(),
        },
    );
    Ok(graph)
}
