// src/config.rs

use crate::types::{Config, NUM_LANES};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Where the startup configuration came from. Logged by the caller once
/// the subscriber is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    File,
    Defaults,
}

impl ConfigOrigin {
    pub fn log(self, path: &str) {
        match self {
            ConfigOrigin::File => info!("✓ Configuration loaded from {}", path),
            ConfigOrigin::Defaults => warn!("{} not found, using default configuration", path),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path))?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &str) -> Result<(Self, ConfigOrigin)> {
        if Path::new(path).exists() {
            Ok((Self::load(path)?, ConfigOrigin::File))
        } else {
            Ok((Self::default(), ConfigOrigin::Defaults))
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies FAST_MODE / INFER_EVERY / COUNT_SMOOTH_ALPHA /
    /// ANALYTICS_POINTS / PORT. Bad values are logged and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("FAST_MODE") {
            match parse_bool(&raw) {
                Some(v) => self.detection.fast_mode = v,
                None => warn!("Ignoring FAST_MODE={:?}: not a boolean", raw),
            }
        }

        if let Some(raw) = lookup("INFER_EVERY") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => self.detection.infer_every = Some(n),
                _ => warn!("Ignoring INFER_EVERY={:?}: expected integer >= 1", raw),
            }
        }

        if let Some(raw) = lookup("COUNT_SMOOTH_ALPHA") {
            match raw.trim().parse::<f32>() {
                Ok(a) if a > 0.0 && a <= 1.0 => self.detection.smoothing_alpha = a,
                _ => warn!("Ignoring COUNT_SMOOTH_ALPHA={:?}: expected (0, 1]", raw),
            }
        }

        if let Some(raw) = lookup("ANALYTICS_POINTS") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n >= 1 => self.analytics.max_points = n,
                _ => warn!("Ignoring ANALYTICS_POINTS={:?}: expected integer >= 1", raw),
            }
        }

        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!("Ignoring PORT={:?}: not a port number", raw),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lanes.sources.len() != NUM_LANES {
            bail!(
                "lanes.sources must list exactly {} entries, got {}",
                NUM_LANES,
                self.lanes.sources.len()
            );
        }
        if self.lanes.frame_width == 0 || self.lanes.frame_height == 0 {
            bail!("lanes.frame_width and lanes.frame_height must be non-zero");
        }
        if self.detection.infer_every == Some(0) {
            bail!("detection.infer_every must be >= 1");
        }
        let alpha = self.detection.smoothing_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            bail!("detection.smoothing_alpha must be in (0, 1], got {}", alpha);
        }
        if self.analytics.max_points == 0 {
            bail!("analytics.max_points must be >= 1");
        }
        if self.analytics.interval_secs == 0 {
            bail!("analytics.interval_secs must be >= 1");
        }
        if self.pipeline.tick_interval_ms == 0 || self.pipeline.stream_retry_ms == 0 {
            bail!("pipeline intervals must be non-zero");
        }
        if !(1..=100).contains(&self.pipeline.jpeg_quality) {
            bail!(
                "pipeline.jpeg_quality must be in [1, 100], got {}",
                self.pipeline.jpeg_quality
            );
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
