//! Per-run orchestration: decode, correct, map, persist, then assemble.

use crate::assembler::{effective_fps, EncoderSettings, VideoAssembler};
use crate::config::{frame_file_name, ConversionConfig};
use crate::correction::Correction;
use crate::decoder::{DecoderSettings, FfmpegDecoder, FrameSource, RawFrame};
use crate::error::ConvertError;
use crate::glyph::GlyphMapper;
use crate::render::FrameRenderer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives `(fraction, frames_processed, frames_total)` after each frame.
pub trait ProgressSink {
    fn report(&self, progress: f32, processed: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(f32, u64, u64),
{
    fn report(&self, progress: f32, processed: u64, total: u64) {
        self(progress, processed, total)
    }
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: f32, _processed: u64, _total: u64) {}
}

/// Cooperative cancellation flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Opening,
    /// Index of the frame being converted.
    Processing(u64),
    Assembling,
    Done,
    Failed,
    Cancelled,
}

/// Artifacts produced by one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub frames_count: u64,
    pub source_total_frames: u64,
    pub source_fps: f64,
    pub fps: u32,
    pub txt_files_count: u64,
    pub png_files_count: u64,
    pub txt_files: Vec<PathBuf>,
    pub png_files: Vec<PathBuf>,
    pub mp4_file: Option<PathBuf>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Done(ConversionResult),
    Failed(ConvertError),
    /// Stopped between frames; carries what was written so far.
    Cancelled(ConversionResult),
}

impl RunOutcome {
    pub fn result(&self) -> Option<&ConversionResult> {
        match self {
            RunOutcome::Done(r) | RunOutcome::Cancelled(r) => Some(r),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done(_))
    }
}

/// External tools and presentation settings for a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub decoder: DecoderSettings,
    pub encoder: EncoderSettings,
    pub font_path: Option<PathBuf>,
    /// Keep paths out of warnings and error messages.
    pub quiet_errors: bool,
}

pub struct ConversionPipeline {
    output_dir: PathBuf,
    config: ConversionConfig,
    settings: PipelineSettings,
    correction: Correction,
    mapper: GlyphMapper,
    renderer: Option<FrameRenderer>,
    assembler: VideoAssembler,
    state: RunState,
}

impl ConversionPipeline {
    pub fn new(
        output_dir: &Path,
        config: ConversionConfig,
        settings: PipelineSettings,
    ) -> Result<Self, ConvertError> {
        fs::create_dir_all(output_dir)
            .map_err(|e| ConvertError::render_failure(output_dir, e))?;
        let renderer = config
            .save_png()
            .then(|| FrameRenderer::new(&config, settings.font_path.as_deref()));
        Ok(Self::with_renderer(output_dir, config, settings, renderer))
    }

    /// Like `new` but with a caller-supplied renderer and no directory creation.
    pub fn with_renderer(
        output_dir: &Path,
        config: ConversionConfig,
        settings: PipelineSettings,
        renderer: Option<FrameRenderer>,
    ) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            correction: Correction::from_config(&config),
            mapper: GlyphMapper::new(&config),
            assembler: VideoAssembler::new(output_dir, &settings.encoder),
            renderer,
            config,
            settings,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Opens `path` with ffmpeg and runs the conversion.
    pub fn run_path(
        &mut self,
        path: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> RunOutcome {
        self.state = RunState::Opening;
        match FfmpegDecoder::open(path, &self.settings.decoder) {
            Ok(mut decoder) => self.run(&mut decoder, progress, cancel),
            Err(e) => self.fail(e),
        }
    }

    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> RunOutcome {
        let info = source.info();
        let total = info.total_frames;
        let mut result = ConversionResult {
            source_total_frames: total,
            source_fps: info.fps,
            fps: self.config.fps(),
            ..ConversionResult::default()
        };
        let mut last_reported = 0.0f32;

        if cancel.is_cancelled() {
            return self.cancelled(result);
        }

        let limit = (total > 0).then_some(total);
        for (index, frame) in source.frames(limit).enumerate() {
            let index = index as u64;
            self.state = RunState::Processing(index);
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => return self.fail(e),
            };
            if let Err(e) = self.convert_frame(index, &frame, &mut result) {
                return self.fail(e);
            }

            let processed = index + 1;
            let fraction = if total > 0 {
                (processed as f32 / total as f32).clamp(0.0, 1.0)
            } else {
                0.0
            };
            last_reported = fraction.max(last_reported);
            progress.report(last_reported, processed, total);

            if cancel.is_cancelled() {
                return self.cancelled(result);
            }
        }

        if last_reported < 1.0 {
            progress.report(1.0, result.frames_count, total.max(result.frames_count));
        }
        log::info!(
            "Converted {} frames into {}",
            result.frames_count,
            self.output_dir.display()
        );

        if self.config.save_mp4() {
            if result.png_files.is_empty() {
                log::warn!("No PNG frames were rendered, skipping video assembly");
                result
                    .warnings
                    .push("video skipped: no rendered frames".to_string());
            } else {
                self.state = RunState::Assembling;
                let fps = effective_fps(self.config.fps(), info.fps);
                match self
                    .assembler
                    .try_assemble(
                        result.png_files.len() as u64,
                        fps,
                        self.config.crf(),
                        self.config.video_name(),
                    )
                {
                    Ok(path) => result.mp4_file = Some(path),
                    Err(e) => {
                        log::warn!("{}", e);
                        result
                            .warnings
                            .push(e.user_message(self.settings.quiet_errors));
                    }
                }
            }
        }

        self.state = RunState::Done;
        RunOutcome::Done(finish(result))
    }

    fn convert_frame(
        &mut self,
        index: u64,
        frame: &RawFrame,
        result: &mut ConversionResult,
    ) -> Result<(), ConvertError> {
        let luma = self.correction.apply(frame);
        let text = self.mapper.map(&luma);

        if self.config.save_txt() {
            let path = self.output_dir.join(frame_file_name(index, "txt"));
            fs::write(&path, text.to_text()).map_err(|e| ConvertError::render_failure(&path, e))?;
            result.txt_files.push(path);
        }
        if let Some(renderer) = self.renderer.as_mut() {
            let path = self.output_dir.join(frame_file_name(index, "png"));
            renderer.render_to_file(&text, &path)?;
            result.png_files.push(path);
        }
        result.frames_count += 1;
        Ok(())
    }

    fn fail(&mut self, err: ConvertError) -> RunOutcome {
        self.state = RunState::Failed;
        log::error!("{}", err.user_message(self.settings.quiet_errors));
        RunOutcome::Failed(err)
    }

    fn cancelled(&mut self, result: ConversionResult) -> RunOutcome {
        self.state = RunState::Cancelled;
        log::info!("Run cancelled after {} frames", result.frames_count);
        RunOutcome::Cancelled(finish(result))
    }
}

fn finish(mut result: ConversionResult) -> ConversionResult {
    result.txt_files_count = result.txt_files.len() as u64;
    result.png_files_count = result.png_files.len() as u64;
    result
}

/// Writes `details.json` describing the run into `dir`.
pub fn write_details(result: &ConversionResult, dir: &Path) -> Result<PathBuf, ConvertError> {
    let path = dir.join("details.json");
    let json =
        serde_json::to_string_pretty(result).map_err(|e| ConvertError::render_failure(&path, e))?;
    fs::write(&path, json).map_err(|e| ConvertError::render_failure(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::decoder::SourceInfo;
    use crate::render::GlyphFace;
    use image::RgbImage;
    use std::cell::RefCell;

    struct Flat {
        left: u64,
        reported: u64,
    }

    impl FrameSource for Flat {
        fn info(&self) -> SourceInfo {
            SourceInfo {
                width: 32,
                height: 16,
                fps: 24.0,
                total_frames: self.reported,
            }
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame>, ConvertError> {
            if self.left == 0 {
                return Ok(None);
            }
            self.left -= 1;
            Ok(Some(RgbImage::from_pixel(32, 16, image::Rgb([200, 100, 50]))))
        }
    }

    fn text_only(dir: &Path) -> ConversionPipeline {
        let config = ConversionOptions::default()
            .with_width(10)
            .with_outputs(true, false, false)
            .build()
            .unwrap();
        ConversionPipeline::new(dir, config, PipelineSettings::default()).unwrap()
    }

    #[test]
    fn unknown_total_reports_completion_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = text_only(dir.path());
        let calls = RefCell::new(Vec::new());
        let sink = |p: f32, n: u64, t: u64| calls.borrow_mut().push((p, n, t));
        let mut source = Flat { left: 3, reported: 0 };
        let outcome = pipeline.run(&mut source, &sink, &CancelToken::new());
        assert!(outcome.is_done());
        let calls = calls.into_inner();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.last(), Some(&(1.0, 3, 3)));
        assert_eq!(pipeline.state(), RunState::Done);
    }

    #[test]
    fn reported_total_limits_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = text_only(dir.path());
        let mut source = Flat { left: 8, reported: 5 };
        let outcome = pipeline.run(&mut source, &NoProgress, &CancelToken::new());
        let result = outcome.result().unwrap();
        assert_eq!(result.frames_count, 5);
        assert_eq!(result.txt_files_count, 5);
        assert_eq!(result.png_files_count, 0);
    }

    #[test]
    fn fewer_frames_than_reported_still_ends_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = text_only(dir.path());
        let last = RefCell::new(0.0f32);
        let sink = |p: f32, _: u64, _: u64| *last.borrow_mut() = p;
        let mut source = Flat { left: 2, reported: 10 };
        let outcome = pipeline.run(&mut source, &sink, &CancelToken::new());
        assert_eq!(outcome.result().unwrap().frames_count, 2);
        assert_eq!(*last.borrow(), 1.0);
    }

    #[test]
    fn cancelled_before_start_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = text_only(dir.path());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut source = Flat { left: 3, reported: 3 };
        let outcome = pipeline.run(&mut source, &NoProgress, &cancel);
        assert!(matches!(outcome, RunOutcome::Cancelled(ref r) if r.frames_count == 0));
        assert_eq!(pipeline.state(), RunState::Cancelled);
    }

    #[test]
    fn mp4_without_png_is_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionOptions::default()
            .with_width(10)
            .with_outputs(true, false, true)
            .build()
            .unwrap();
        let mut pipeline = ConversionPipeline::with_renderer(
            dir.path(),
            config,
            PipelineSettings::default(),
            None,
        );
        let mut source = Flat { left: 1, reported: 1 };
        let outcome = pipeline.run(&mut source, &NoProgress, &CancelToken::new());
        let result = outcome.result().unwrap();
        assert_eq!(result.mp4_file, None);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn details_are_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionOptions::default()
            .with_width(10)
            .with_resolution("low")
            .with_outputs(false, true, false)
            .build()
            .unwrap();
        let renderer = FrameRenderer::with_canvas(&config, GlyphFace::Bitmap, (640, 480));
        let mut pipeline = ConversionPipeline::with_renderer(
            dir.path(),
            config,
            PipelineSettings::default(),
            Some(renderer),
        );
        let mut source = Flat { left: 2, reported: 2 };
        let outcome = pipeline.run(&mut source, &NoProgress, &CancelToken::new());
        let result = outcome.result().unwrap();
        let path = write_details(result, dir.path()).unwrap();
        let parsed: ConversionResult =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(&parsed, result);
        assert_eq!(parsed.png_files_count, 2);
    }
}
