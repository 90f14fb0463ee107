//! # asciivid - Video to ASCII Art Frames
//!
//! `asciivid` decodes a video, turns every frame into a grid of characters and
//! writes the result as text files, rendered PNG images and an optional MP4.
//!
//! ## Features
//!
//! - Brightness, contrast and gamma correction before glyph mapping
//! - Seven character styles and named colour palettes
//! - Adaptive font sizing for fixed output resolutions
//! - Video assembly with `ffmpeg`, bounded in time
//! - Progress reporting and cooperative cancellation
//! - A bounded worker pool with a shared run registry
//!
//! ## Example
//!
//! ```no_run
//! use asciivid::{CancelToken, ConversionOptions, ConversionPipeline, PipelineSettings};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConversionOptions::default()
//!     .with_width(120)
//!     .with_style("blocks")
//!     .build()?;
//! let mut pipeline =
//!     ConversionPipeline::new(Path::new("out"), config, PipelineSettings::default())?;
//! let outcome = pipeline.run_path(
//!     Path::new("input.mp4"),
//!     &|progress: f32, done: u64, total: u64| {
//!         println!("{:.0}% ({}/{})", progress * 100.0, done, total)
//!     },
//!     &CancelToken::new(),
//! );
//! if let Some(result) = outcome.result() {
//!     println!("{} frames, video: {:?}", result.frames_count, result.mp4_file);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Running Several Conversions
//!
//! ```no_run
//! use asciivid::{ConversionOptions, RunRegistry, RunScheduler, Settings};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let settings = Settings::default();
//! let registry = Arc::new(RunRegistry::new());
//! let mut scheduler = RunScheduler::new(Arc::clone(&registry), settings.scheduler());
//! let config = ConversionOptions::default().build().unwrap();
//! let id = scheduler.submit(Path::new("clip.mp4"), config).unwrap();
//! scheduler.shutdown();
//! println!("{:?}", registry.get(&id).map(|s| s.state));
//! ```

pub mod assembler;
mod bitmap_font;
pub mod config;
pub mod correction;
pub mod decoder;
pub mod error;
pub mod glyph;
pub mod jobs;
pub mod pipeline;
pub mod ramp;
pub mod registry;
pub mod render;
pub mod settings;

pub use assembler::{EncodeOutcome, EncoderSettings, VideoAssembler};
pub use config::{
    frame_file_name, video_file_name, ConversionConfig, ConversionOptions, Palette, Resolution, Rgb,
};
pub use correction::Correction;
pub use decoder::{DecoderSettings, FfmpegDecoder, FrameSource, RawFrame, SourceInfo};
pub use error::{ConfigError, ConvertError, Stage};
pub use glyph::{GlyphMapper, TextFrame};
pub use jobs::{JobInput, RunScheduler, SchedulerConfig, SchedulerError};
pub use pipeline::{
    write_details, CancelToken, ConversionPipeline, ConversionResult, NoProgress,
    PipelineSettings, ProgressSink, RunOutcome, RunState,
};
pub use ramp::{CharacterRamp, Style};
pub use registry::{JobState, RunId, RunRegistry, RunStatus};
pub use render::{FrameRenderer, GlyphFace};
pub use settings::Settings;
