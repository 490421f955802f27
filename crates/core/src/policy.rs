//! Per-kind execution policy: poll intervals and deadlines.
//!
//! The render engine is polled rather than streamed, so each media
//! kind carries a poll cadence and an overall deadline. Longer media
//! kinds poll less often and wait longer. The values here are the
//! observed production defaults; callers may substitute their own
//! [`PollPolicy`].

use std::time::Duration;

use crate::job::JobKind;

/// Deadline for a single text-to-image render.
pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for a reference-conditioned image render. Conditioned
/// runs encode the reference first and routinely take longer.
pub const IMAGE_REFERENCE_TIMEOUT: Duration = Duration::from_secs(300);

/// Deadline for a video segment render.
pub const VIDEO_TIMEOUT: Duration = Duration::from_secs(600);

/// Deadline for a voice line.
pub const VOICE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for a music cue.
pub const MUSIC_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll cadence and overall deadline for one engine execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Default policy for a job kind.
    ///
    /// `reference_conditioned` only affects the image kind, which
    /// gets a longer deadline (and slower cadence) when conditioning
    /// on an uploaded reference.
    pub fn for_kind(kind: JobKind, reference_conditioned: bool) -> Self {
        match kind {
            JobKind::Image if reference_conditioned => {
                Self::new(Duration::from_secs(2), IMAGE_REFERENCE_TIMEOUT)
            }
            JobKind::Image => Self::new(Duration::from_secs(1), IMAGE_TIMEOUT),
            JobKind::Video => Self::new(Duration::from_secs(5), VIDEO_TIMEOUT),
            JobKind::Voice => Self::new(Duration::from_secs(2), VOICE_TIMEOUT),
            JobKind::Music => Self::new(Duration::from_secs(3), MUSIC_TIMEOUT),
            // Composite never reaches the engine; a short policy keeps
            // a misrouted job from hanging.
            JobKind::Composite => Self::new(Duration::from_secs(1), Duration::from_secs(30)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_policy_tightens_without_reference() {
        let plain = PollPolicy::for_kind(JobKind::Image, false);
        let conditioned = PollPolicy::for_kind(JobKind::Image, true);
        assert_eq!(plain.timeout, IMAGE_TIMEOUT);
        assert_eq!(conditioned.timeout, IMAGE_REFERENCE_TIMEOUT);
        assert!(conditioned.interval >= plain.interval);
    }

    #[test]
    fn video_waits_longest_and_polls_slowest() {
        let video = PollPolicy::for_kind(JobKind::Video, false);
        for kind in [JobKind::Image, JobKind::Voice, JobKind::Music] {
            let other = PollPolicy::for_kind(kind, false);
            assert!(video.timeout >= other.timeout);
            assert!(video.interval >= other.interval);
        }
    }

    #[test]
    fn reference_flag_ignored_for_non_image_kinds() {
        assert_eq!(
            PollPolicy::for_kind(JobKind::Music, true),
            PollPolicy::for_kind(JobKind::Music, false)
        );
    }
}
