//! Environment-derived configuration.
//!
//! All fields have defaults suitable for a single local render
//! engine. Settings are read once at construction (worker startup /
//! adapter construction), never re-read per request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Model family
// ---------------------------------------------------------------------------

/// The model family the image pipeline is configured for. A
/// process-wide choice, not a per-request one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Sd15,
    Sdxl,
    Flux,
    Wan21,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Sd15 => "sd15",
            ModelFamily::Sdxl => "sdxl",
            ModelFamily::Flux => "flux",
            ModelFamily::Wan21 => "wan21",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "sd15" => Ok(ModelFamily::Sd15),
            "sdxl" => Ok(ModelFamily::Sdxl),
            "flux" => Ok(ModelFamily::Flux),
            "wan21" => Ok(ModelFamily::Wan21),
            other => Err(CoreError::Config(format!(
                "Unknown model family '{other}'. Valid families: sd15, sdxl, flux, wan21"
            ))),
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Family defaults
// ---------------------------------------------------------------------------

/// Per-family model assets and sampling defaults.
///
/// Loader identifiers name files in the render engine's model
/// directories. Which of the optional fields are set depends on the
/// family's loader topology: sd15/sdxl use a single checkpoint,
/// flux/wan21 use separate unet/clip/vae loaders.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyDefaults {
    pub checkpoint: Option<String>,
    pub unet: Option<String>,
    pub clip: Option<String>,
    pub clip_secondary: Option<String>,
    pub vae: Option<String>,
    pub sampler: &'static str,
    pub scheduler: &'static str,
    pub steps: u32,
    pub guidance: f32,
    pub width: u32,
    pub height: u32,
    pub negative_prompt: &'static str,
    /// Default denoise strength for reference-conditioned runs.
    /// Heavier families are more sensitive to conditioning strength
    /// and default lower.
    pub reference_denoise: f32,
}

impl FamilyDefaults {
    /// Built-in defaults for a family.
    pub fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::Sd15 => Self {
                checkpoint: Some("v1-5-pruned-emaonly.safetensors".into()),
                unet: None,
                clip: None,
                clip_secondary: None,
                vae: None,
                sampler: "euler",
                scheduler: "normal",
                steps: 20,
                guidance: 7.0,
                width: 512,
                height: 512,
                negative_prompt: "blurry, low quality, watermark, text",
                reference_denoise: 0.60,
            },
            ModelFamily::Sdxl => Self {
                checkpoint: Some("sd_xl_base_1.0.safetensors".into()),
                unet: None,
                clip: None,
                clip_secondary: None,
                vae: None,
                sampler: "dpmpp_2m",
                scheduler: "karras",
                steps: 25,
                guidance: 6.5,
                width: 1024,
                height: 1024,
                negative_prompt: "blurry, low quality, watermark, text",
                reference_denoise: 0.55,
            },
            ModelFamily::Flux => Self {
                checkpoint: None,
                unet: Some("flux1-dev.safetensors".into()),
                clip: Some("t5xxl_fp8_e4m3fn.safetensors".into()),
                clip_secondary: Some("clip_l.safetensors".into()),
                vae: Some("ae.safetensors".into()),
                sampler: "euler",
                scheduler: "simple",
                steps: 20,
                // Flux ignores classifier-free guidance; the graph
                // carries a dedicated guidance node instead.
                guidance: 3.5,
                width: 1024,
                height: 1024,
                negative_prompt: "",
                reference_denoise: 0.55,
            },
            ModelFamily::Wan21 => Self {
                checkpoint: None,
                unet: Some("wan2.1_t2v_1.3B_fp16.safetensors".into()),
                clip: Some("umt5_xxl_fp8_e4m3fn_scaled.safetensors".into()),
                clip_secondary: None,
                vae: Some("wan_2.1_vae.safetensors".into()),
                sampler: "uni_pc",
                scheduler: "simple",
                steps: 15,
                guidance: 5.0,
                width: 576,
                height: 576,
                negative_prompt: "blurry, low quality, distorted",
                reference_denoise: 0.55,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Engine settings
// ---------------------------------------------------------------------------

/// Render-engine connection and model configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base HTTP URL of the render engine, e.g. `http://host:8188`.
    pub base_url: String,
    /// The configured image model family.
    pub family: ModelFamily,
    /// Asset names and sampling defaults for that family, after env
    /// overrides.
    pub defaults: FamilyDefaults,
}

impl EngineSettings {
    /// Load from environment variables with defaults.
    ///
    /// | Env Var            | Default                  |
    /// |--------------------|--------------------------|
    /// | `COMFYUI_URL`      | `http://127.0.0.1:8188`  |
    /// | `MODEL_FAMILY`     | `sd15`                   |
    /// | `CHECKPOINT_NAME`  | family built-in          |
    /// | `UNET_NAME`        | family built-in          |
    /// | `CLIP_NAME`        | family built-in          |
    /// | `CLIP_SECONDARY`   | family built-in          |
    /// | `VAE_NAME`         | family built-in          |
    /// | `GUIDANCE`         | family built-in          |
    pub fn from_env() -> Result<Self, CoreError> {
        let base_url =
            std::env::var("COMFYUI_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".into());

        let family = ModelFamily::parse(
            &std::env::var("MODEL_FAMILY").unwrap_or_else(|_| "sd15".into()),
        )?;

        let mut defaults = FamilyDefaults::for_family(family);
        if let Ok(v) = std::env::var("CHECKPOINT_NAME") {
            defaults.checkpoint = Some(v);
        }
        if let Ok(v) = std::env::var("UNET_NAME") {
            defaults.unet = Some(v);
        }
        if let Ok(v) = std::env::var("CLIP_NAME") {
            defaults.clip = Some(v);
        }
        if let Ok(v) = std::env::var("CLIP_SECONDARY") {
            defaults.clip_secondary = Some(v);
        }
        if let Ok(v) = std::env::var("VAE_NAME") {
            defaults.vae = Some(v);
        }
        if let Ok(v) = std::env::var("GUIDANCE") {
            defaults.guidance = v
                .parse()
                .map_err(|_| CoreError::Config("GUIDANCE must be a number".into()))?;
        }

        Ok(Self {
            base_url,
            family,
            defaults,
        })
    }
}

// ---------------------------------------------------------------------------
// Worker settings
// ---------------------------------------------------------------------------

/// Worker dispatcher configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Concurrent job slots (default 1: one render at a time).
    pub concurrency: usize,
    /// Maximum job starts per rate window.
    pub rate_limit_starts: u32,
    /// Rate limiter window length.
    pub rate_limit_window: Duration,
    /// Queue polling cadence for the dispatch loop.
    pub poll_interval: Duration,
    /// How long `stop()` waits for in-flight jobs to drain.
    pub drain_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            rate_limit_starts: 10,
            rate_limit_window: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerSettings {
    /// Load from environment variables with defaults.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `WORKER_CONCURRENCY`     | `1`     |
    /// | `RATE_LIMIT_STARTS`      | `10`    |
    /// | `RATE_LIMIT_WINDOW_SECS` | `60`    |
    /// | `POLL_INTERVAL_MS`       | `1000`  |
    /// | `DRAIN_TIMEOUT_SECS`     | `30`    |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();

        Ok(Self {
            concurrency: parse_env("WORKER_CONCURRENCY", defaults.concurrency)?,
            rate_limit_starts: parse_env("RATE_LIMIT_STARTS", defaults.rate_limit_starts)?,
            rate_limit_window: Duration::from_secs(parse_env(
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window.as_secs(),
            )?),
            poll_interval: Duration::from_millis(parse_env(
                "POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            drain_timeout: Duration::from_secs(parse_env(
                "DRAIN_TIMEOUT_SECS",
                defaults.drain_timeout.as_secs(),
            )?),
        })
    }
}

/// Parse an env var into `T`, falling back to `default` when unset.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CoreError::Config(format!("{name} has an invalid value: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_parse_round_trips() {
        for family in [
            ModelFamily::Sd15,
            ModelFamily::Sdxl,
            ModelFamily::Flux,
            ModelFamily::Wan21,
        ] {
            assert_eq!(ModelFamily::parse(family.as_str()).unwrap(), family);
        }
    }

    #[test]
    fn unknown_family_rejected() {
        assert!(ModelFamily::parse("sd3").is_err());
    }

    #[test]
    fn checkpoint_families_have_no_unet() {
        for family in [ModelFamily::Sd15, ModelFamily::Sdxl] {
            let d = FamilyDefaults::for_family(family);
            assert!(d.checkpoint.is_some());
            assert!(d.unet.is_none());
        }
    }

    #[test]
    fn split_loader_families_have_unet_and_vae() {
        for family in [ModelFamily::Flux, ModelFamily::Wan21] {
            let d = FamilyDefaults::for_family(family);
            assert!(d.checkpoint.is_none());
            assert!(d.unet.is_some());
            assert!(d.vae.is_some());
        }
    }

    #[test]
    fn lightweight_family_defaults_stronger_denoise() {
        let sd15 = FamilyDefaults::for_family(ModelFamily::Sd15);
        let sdxl = FamilyDefaults::for_family(ModelFamily::Sdxl);
        assert!(sd15.reference_denoise > sdxl.reference_denoise);
        for family in [
            ModelFamily::Sd15,
            ModelFamily::Sdxl,
            ModelFamily::Flux,
            ModelFamily::Wan21,
        ] {
            let d = FamilyDefaults::for_family(family).reference_denoise;
            assert!(d > 0.0 && d < 1.0);
        }
    }

    #[test]
    fn worker_settings_defaults_match_observed() {
        let s = WorkerSettings::default();
        assert_eq!(s.concurrency, 1);
        assert_eq!(s.rate_limit_starts, 10);
        assert_eq!(s.rate_limit_window, Duration::from_secs(60));
    }
}
