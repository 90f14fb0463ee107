//! Encodes a rendered PNG sequence into an H.264 MP4 with `ffmpeg`.

use crate::config::{frame_file_name, video_file_name};
use crate::error::ConvertError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Lines of encoder stderr kept in diagnostics.
const DIAGNOSTIC_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub ffmpeg_path: PathBuf,
    /// Upper bound on one encoder invocation.
    pub timeout: Duration,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(600),
        }
    }
}

/// What happened to one encoder invocation.
#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub output: PathBuf,
    /// `None` when the process could not be started, was killed, or died by signal.
    pub exit_code: Option<i32>,
    pub diagnostics: String,
    pub timed_out: bool,
}

impl EncodeOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    pub fn into_result(self) -> Result<PathBuf, ConvertError> {
        if self.success() {
            return Ok(self.output);
        }
        let reason = if self.timed_out {
            "timed out".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "did not run to completion".to_string(),
            }
        };
        let reason = match self.diagnostics.lines().last() {
            Some(line) if !line.trim().is_empty() => format!("{}: {}", reason, line.trim()),
            _ => reason,
        };
        Err(ConvertError::EncoderFailure { reason })
    }
}

/// Frame rate used for assembly: the configured rate, or the source rate when unset.
pub fn effective_fps(configured: u32, source_fps: f64) -> f64 {
    if configured > 0 {
        f64::from(configured)
    } else if source_fps.is_finite() && source_fps > 0.0 {
        source_fps
    } else {
        30.0
    }
}

pub struct VideoAssembler {
    output_dir: PathBuf,
    settings: EncoderSettings,
}

impl VideoAssembler {
    pub fn new(output_dir: &Path, settings: &EncoderSettings) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            settings: settings.clone(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs the encoder over `frame_%06d.png` in the output directory.
    pub fn encode(&self, fps: f64, crf: u8, basename: &str) -> EncodeOutcome {
        let output = self.output_dir.join(video_file_name(basename));
        let pattern = self.output_dir.join("frame_%06d.png");

        log::info!(
            "Assembling {} at {} fps, crf {}",
            output.display(),
            fps,
            crf
        );

        let spawned = Command::new(&self.settings.ffmpeg_path)
            .arg("-y")
            .args(["-framerate", &fps.to_string()])
            .arg("-i")
            .arg(&pattern)
            .args(["-vf", "format=yuv420p", "-c:v", "libx264"])
            .args(["-crf", &crf.to_string()])
            .args(["-preset", "medium"])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return EncodeOutcome {
                    output,
                    exit_code: None,
                    diagnostics: format!(
                        "cannot start {}: {}",
                        self.settings.ffmpeg_path.display(),
                        e
                    ),
                    timed_out: false,
                }
            }
        };

        let stderr_drain = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                let _ = stderr.read_to_end(&mut bytes);
                bytes
            })
        });

        let deadline = Instant::now() + self.settings.timeout;
        let mut timed_out = false;
        let status: Option<ExitStatus> = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => {
                    log::warn!(
                        "Encoder exceeded {:?}, killing it",
                        self.settings.timeout
                    );
                    timed_out = true;
                    let _ = child.kill();
                    break child.wait().ok();
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    log::error!("Cannot wait for encoder: {}", e);
                    let _ = child.kill();
                    break child.wait().ok();
                }
            }
        };

        let stderr = stderr_drain
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        EncodeOutcome {
            output,
            exit_code: if timed_out {
                None
            } else {
                status.and_then(|s| s.code())
            },
            diagnostics: tail_lines(&String::from_utf8_lossy(&stderr), DIAGNOSTIC_LINES),
            timed_out,
        }
    }

    /// Checks that the directory holds exactly `frames` contiguous PNGs, then encodes them.
    pub fn try_assemble(
        &self,
        frames: u64,
        fps: f64,
        crf: u8,
        basename: &str,
    ) -> Result<PathBuf, ConvertError> {
        let found = frame_sequence(&self.output_dir)?;
        if found != frames {
            return Err(ConvertError::EncoderFailure {
                reason: format!(
                    "expected {} frames but the directory holds {}, refusing to encode stale frames",
                    frames, found
                ),
            });
        }
        let outcome = self.encode(fps, crf, basename);
        if !outcome.success() && !outcome.diagnostics.is_empty() {
            log::error!("Encoder output:\n{}", outcome.diagnostics);
        }
        outcome.into_result()
    }

    /// `Some(path)` when the video was written; failures are logged.
    pub fn assemble(&self, frames: u64, fps: f64, crf: u8, basename: &str) -> Option<PathBuf> {
        match self.try_assemble(frames, fps, crf, basename) {
            Ok(path) => {
                log::info!("Video written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }
}

/// Number of `frame_NNNNNN.png` files in `dir`, provided they run from 0 with no gap.
pub fn frame_sequence(dir: &Path) -> Result<u64, ConvertError> {
    let mut indices: Vec<u64> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().and_then(frame_index))
        .collect();
    indices.sort_unstable();

    if indices.is_empty() {
        return Err(ConvertError::EncoderFailure {
            reason: format!("no frames in {}", dir.display()),
        });
    }
    for (expected, &index) in indices.iter().enumerate() {
        if index != expected as u64 {
            return Err(ConvertError::EncoderFailure {
                reason: format!(
                    "frame sequence is not contiguous: {} missing",
                    frame_file_name(expected as u64, "png")
                ),
            });
        }
    }
    Ok(indices.len() as u64)
}

fn frame_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("frame_")?.strip_suffix(".png")?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch_frames(dir: &Path, indices: &[u64]) {
        for &i in indices {
            fs::write(dir.join(frame_file_name(i, "png")), b"").unwrap();
        }
    }

    #[test]
    fn contiguous_sequence_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        touch_frames(dir.path(), &[0, 1, 2, 3]);
        fs::write(dir.path().join("frame_000004.txt"), b"").unwrap();
        fs::write(dir.path().join("notes.png"), b"").unwrap();
        assert_eq!(frame_sequence(dir.path()).unwrap(), 4);
    }

    #[test]
    fn gap_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        touch_frames(dir.path(), &[0, 1, 3]);
        let err = frame_sequence(dir.path()).unwrap_err();
        assert!(err.to_string().contains("frame_000002.png"));
    }

    #[test]
    fn empty_dir_has_no_sequence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(frame_sequence(dir.path()).is_err());
    }

    #[test]
    fn missing_encoder_yields_no_video() {
        let dir = tempfile::tempdir().unwrap();
        touch_frames(dir.path(), &[0, 1]);
        let settings = EncoderSettings {
            ffmpeg_path: PathBuf::from("/nonexistent/bin/ffmpeg"),
            timeout: Duration::from_secs(5),
        };
        let assembler = VideoAssembler::new(dir.path(), &settings);
        let outcome = assembler.encode(30.0, 23, "ascii_video");
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.diagnostics.contains("cannot start"));
        assert_eq!(assembler.assemble(2, 30.0, 23, "ascii_video"), None);
    }

    #[test]
    fn fps_fallback() {
        assert_eq!(effective_fps(24, 29.97), 24.0);
        assert_eq!(effective_fps(0, 29.97), 29.97);
        assert_eq!(effective_fps(0, 0.0), 30.0);
    }

    #[test]
    fn failure_reason_includes_last_diagnostic_line() {
        let outcome = EncodeOutcome {
            output: PathBuf::from("out.mp4"),
            exit_code: Some(1),
            diagnostics: "first\nUnknown encoder 'libx264'".into(),
            timed_out: false,
        };
        let err = outcome.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "video encoder failed: exit code 1: Unknown encoder 'libx264'"
        );
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn nonzero_exit_is_failure() {
            let tools = tempfile::tempdir().unwrap();
            let frames = tempfile::tempdir().unwrap();
            touch_frames(frames.path(), &[0]);
            let settings = EncoderSettings {
                ffmpeg_path: script(tools.path(), "echo 'bad input' >&2\nexit 3"),
                timeout: Duration::from_secs(10),
            };
            let outcome = VideoAssembler::new(frames.path(), &settings).encode(30.0, 23, "v");
            assert_eq!(outcome.exit_code, Some(3));
            assert!(!outcome.timed_out);
            assert!(outcome.diagnostics.contains("bad input"));
        }

        #[test]
        fn leftover_frames_are_not_encoded() {
            let tools = tempfile::tempdir().unwrap();
            let frames = tempfile::tempdir().unwrap();
            touch_frames(frames.path(), &(0..10).collect::<Vec<_>>());
            let marker = tools.path().join("ran");
            let settings = EncoderSettings {
                ffmpeg_path: script(tools.path(), &format!(": > '{}'", marker.display())),
                timeout: Duration::from_secs(10),
            };
            let assembler = VideoAssembler::new(frames.path(), &settings);
            let err = assembler.try_assemble(3, 30.0, 23, "v").unwrap_err();
            assert!(err.to_string().contains("expected 3 frames"));
            assert!(!marker.exists());
        }

        #[test]
        fn slow_encoder_is_killed() {
            let tools = tempfile::tempdir().unwrap();
            let frames = tempfile::tempdir().unwrap();
            touch_frames(frames.path(), &[0]);
            let settings = EncoderSettings {
                ffmpeg_path: script(tools.path(), "exec sleep 30"),
                timeout: Duration::from_millis(300),
            };
            let started = Instant::now();
            let outcome = VideoAssembler::new(frames.path(), &settings).encode(30.0, 23, "v");
            assert!(outcome.timed_out);
            assert!(!outcome.success());
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn successful_encoder_returns_output_path() {
            let tools = tempfile::tempdir().unwrap();
            let frames = tempfile::tempdir().unwrap();
            touch_frames(frames.path(), &[0, 1, 2]);
            let settings = EncoderSettings {
                ffmpeg_path: script(tools.path(), "for last; do :; done\n: > \"$last\""),
                timeout: Duration::from_secs(10),
            };
            let assembler = VideoAssembler::new(frames.path(), &settings);
            let path = assembler.assemble(3, 12.0, 18, "clip").unwrap();
            assert_eq!(path, frames.path().join("clip.mp4"));
            assert!(path.exists());
        }
    }
}
