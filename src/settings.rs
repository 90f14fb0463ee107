//! Process-wide settings: where results go, which tools to run, and conversion defaults.

use crate::assembler::EncoderSettings;
use crate::config::ConversionOptions;
use crate::decoder::DecoderSettings;
use crate::jobs::SchedulerConfig;
use crate::pipeline::PipelineSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "asciivid";
const FILE_STEM: &str = "asciivid";

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_max_jobs() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    16
}
fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}
fn default_encoder_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_max_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,
    #[serde(default = "default_encoder_timeout")]
    pub encoder_timeout_secs: u64,
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    /// Keep file system paths out of user-facing errors.
    #[serde(default)]
    pub quiet_errors: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub defaults: ConversionOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            max_concurrent_jobs: default_max_jobs(),
            queue_capacity: default_queue_capacity(),
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            encoder_timeout_secs: default_encoder_timeout(),
            font_path: None,
            quiet_errors: false,
            log_level: default_log_level(),
            defaults: ConversionOptions::default(),
        }
    }
}

impl Settings {
    /// Settings file candidates in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut tried = Vec::new();
        if let Some(mut d) = dirs::data_dir() {
            d.push(APP_DIR);
            tried.push(d.join(format!("{}.toml", FILE_STEM)));
            tried.push(d.join(format!("{}.json", FILE_STEM)));
        }
        tried.push(PathBuf::from(format!("{}.toml", FILE_STEM)));
        tried.push(PathBuf::from(format!("{}.json", FILE_STEM)));
        tried
    }

    /// Explicit file if given, else the first existing search path, else defaults;
    /// environment overrides applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::search_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env(|key| env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let settings: Settings = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)
                .with_context(|| format!("parsing config json {}", path.display()))?,
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("parsing config toml {}", path.display()))?,
            _ => {
                return Err(anyhow!(
                    "Config file {} must end in .toml or .json",
                    path.display()
                ))
            }
        };
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Applies `ASCIIVID_*` overrides looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("ASCIIVID_RESULTS_DIR") {
            self.results_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ASCIIVID_MAX_JOBS") {
            self.max_concurrent_jobs = v
                .trim()
                .parse()
                .with_context(|| format!("ASCIIVID_MAX_JOBS is not a number: {}", v))?;
        }
        if let Some(v) = var("ASCIIVID_FFMPEG") {
            self.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = var("ASCIIVID_FFPROBE") {
            self.ffprobe_path = PathBuf::from(v);
        }
        if let Some(v) = var("ASCIIVID_ENCODER_TIMEOUT") {
            self.encoder_timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("ASCIIVID_ENCODER_TIMEOUT is not a number: {}", v))?;
        }
        if let Some(v) = var("ASCIIVID_FONT") {
            self.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("ASCIIVID_QUIET") {
            self.quiet_errors = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = var("ASCIIVID_LOG") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            decoder: DecoderSettings {
                ffmpeg_path: self.ffmpeg_path.clone(),
                ffprobe_path: self.ffprobe_path.clone(),
            },
            encoder: EncoderSettings {
                ffmpeg_path: self.ffmpeg_path.clone(),
                timeout: Duration::from_secs(self.encoder_timeout_secs.max(1)),
            },
            font_path: self.font_path.clone(),
            quiet_errors: self.quiet_errors,
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.max_concurrent_jobs.max(1),
            queue_capacity: self.queue_capacity.max(1),
            results_dir: self.results_dir.clone(),
            pipeline: self.pipeline(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_service_settings() {
        let s = Settings::default();
        assert_eq!(s.max_concurrent_jobs, 4);
        assert_eq!(s.encoder_timeout_secs, 600);
        assert_eq!(s.log_filter(), log::LevelFilter::Info);
        assert_eq!(s.pipeline().encoder.timeout, Duration::from_secs(600));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asciivid.toml");
        fs::write(
            &path,
            "max_concurrent_jobs = 2\nffmpeg_path = \"/opt/ffmpeg/bin/ffmpeg\"\n\n[defaults]\nwidth = 80\nstyle = \"blocks\"\n",
        )
        .unwrap();
        let s = Settings::from_file(&path).unwrap();
        assert_eq!(s.max_concurrent_jobs, 2);
        assert_eq!(s.queue_capacity, 16);
        assert_eq!(s.defaults.width, 80);
        assert_eq!(s.defaults.style, "blocks");
        assert_eq!(s.defaults.fps, 30);
        assert_eq!(s.pipeline().decoder.ffmpeg_path, Path::new("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn json_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asciivid.json");
        fs::write(&path, r#"{"results_dir": "/tmp/out", "quiet_errors": true}"#).unwrap();
        let s = Settings::from_file(&path).unwrap();
        assert_eq!(s.results_dir, Path::new("/tmp/out"));
        assert!(s.quiet_errors);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asciivid.yaml");
        fs::write(&path, "results_dir: x").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("ASCIIVID_MAX_JOBS", "7"),
            ("ASCIIVID_FFMPEG", "/usr/local/bin/ffmpeg"),
            ("ASCIIVID_QUIET", "true"),
            ("ASCIIVID_LOG", "debug"),
        ]
        .into_iter()
        .collect();
        let mut s = Settings::default();
        s.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.max_concurrent_jobs, 7);
        assert_eq!(s.ffmpeg_path, Path::new("/usr/local/bin/ffmpeg"));
        assert!(s.quiet_errors);
        assert_eq!(s.log_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn malformed_number_is_an_error() {
        let mut s = Settings::default();
        let err = s
            .apply_env(|k| (k == "ASCIIVID_MAX_JOBS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ASCIIVID_MAX_JOBS"));
    }
}
