//! Frame sources. `FfmpegDecoder` decodes a video file through an `ffmpeg` child process.

use crate::error::{redact, ConvertError};
use image::RgbImage;
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

/// One decoded frame in source colour space.
pub type RawFrame = RgbImage;

/// Stream properties reported by a source before decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// `0.0` when unknown.
    pub fps: f64,
    /// Reported frame count, `0` when unknown. Only a hint.
    pub total_frames: u64,
}

/// Forward-only producer of frames in source order.
pub trait FrameSource {
    fn info(&self) -> SourceInfo;

    /// `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, ConvertError>;
}

impl<'s> dyn FrameSource + 's {
    /// Lazy iterator over at most `limit` frames; unbounded when `limit` is `None`.
    pub fn frames(&mut self, limit: Option<u64>) -> Frames<'_, 's> {
        Frames {
            source: self,
            remaining: limit,
            done: false,
        }
    }
}

pub struct Frames<'a, 's> {
    source: &'a mut (dyn FrameSource + 's),
    remaining: Option<u64>,
    done: bool,
}

impl Iterator for Frames<'_, '_> {
    type Item = Result<RawFrame, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        match self.source.next_frame() {
            Ok(Some(frame)) => {
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                }
                Some(Ok(frame))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

/// Decodes rgb24 frames from `ffmpeg` stdout.
pub struct FfmpegDecoder {
    path: PathBuf,
    info: SourceInfo,
    child: Child,
    stdout: ChildStdout,
    finished: bool,
}

impl FfmpegDecoder {
    pub fn open(path: &Path, settings: &DecoderSettings) -> Result<Self, ConvertError> {
        if !path.is_file() {
            return Err(ConvertError::source_unreadable(path, "no such file"));
        }
        let info = probe(path, &settings.ffprobe_path)?;

        let mut child = Command::new(&settings.ffmpeg_path)
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ConvertError::source_unreadable(
                    path,
                    format!("cannot start {}: {}", tool_name(&settings.ffmpeg_path), e),
                )
            })?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ConvertError::source_unreadable(path, "ffmpeg stdout unavailable"));
        };

        log::info!(
            "Decoding {}: {}x{} @ {:.3} fps, {} frames reported",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.total_frames
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            child,
            stdout,
            finished: false,
        })
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }
}

impl FrameSource for FfmpegDecoder {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, ConvertError> {
        if self.finished {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.frame_len()];
        let complete = read_exact_or_eof(&mut self.stdout, &mut buf)
            .map_err(|e| ConvertError::source_unreadable(&self.path, e))?;
        if !complete {
            self.finished = true;
            return Ok(None);
        }
        RgbImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| ConvertError::source_unreadable(&self.path, "frame size mismatch"))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// ffmpeg arguments streaming `path` as rgb24 at its coded size.
///
/// Autorotation is disabled: it would transpose frames of rotated phone footage
/// while ffprobe keeps reporting the coded width and height.
fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(
        ["-f", "rawvideo", "-pix_fmt", "rgb24", "-an", "pipe:1"]
            .iter()
            .map(OsString::from),
    );
    args
}

/// Fills `buf` completely. Returns `Ok(false)` if the stream ends first.
pub fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut total = 0usize;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => return Ok(false),
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn probe(path: &Path, ffprobe: &Path) -> Result<SourceInfo, ConvertError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames:format=duration",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            ConvertError::source_unreadable(
                path,
                format!("cannot start {}: {}", tool_name(ffprobe), e),
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        log::debug!("ffprobe failed on {}: {}", path.display(), stderr);
        let reason = match stderr.lines().last() {
            Some(line) => redact(line.trim(), path),
            None => format!("ffprobe exited with {}", output.status),
        };
        return Err(ConvertError::source_unreadable(path, reason));
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| ConvertError::source_unreadable(path, "no decodable video stream"))
}

/// File name of an external tool, without the directory it was found in.
fn tool_name(tool: &Path) -> String {
    tool.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "external tool".to_string())
}

/// Parses `key=value` lines from ffprobe. `None` without a usable frame size.
pub fn parse_probe(text: &str) -> Option<SourceInfo> {
    let mut width = 0u32;
    let mut height = 0u32;
    let mut fps = 0.0f64;
    let mut nb_frames: Option<u64> = None;
    let mut duration: Option<f64> = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "width" => width = value.parse().unwrap_or(0),
            "height" => height = value.parse().unwrap_or(0),
            "r_frame_rate" => fps = parse_rate(value).unwrap_or(0.0),
            "nb_frames" => nb_frames = value.parse().ok(),
            "duration" => duration = value.parse().ok().filter(|d: &f64| d.is_finite()),
            _ => {}
        }
    }

    if width == 0 || height == 0 {
        return None;
    }
    let total_frames = match (nb_frames, duration) {
        (Some(n), _) => n,
        (None, Some(d)) if fps > 0.0 && d > 0.0 => (d * fps).round() as u64,
        _ => 0,
    };
    Some(SourceInfo {
        width,
        height,
        fps,
        total_frames,
    })
}

/// `num/den` or a plain number.
fn parse_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Counter {
        left: u32,
    }

    impl FrameSource for Counter {
        fn info(&self) -> SourceInfo {
            SourceInfo {
                width: 2,
                height: 2,
                fps: 25.0,
                total_frames: 0,
            }
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame>, ConvertError> {
            if self.left == 0 {
                return Ok(None);
            }
            self.left -= 1;
            Ok(Some(RgbImage::new(2, 2)))
        }
    }

    #[test]
    fn probe_output_with_frame_count() {
        let info = parse_probe("width=1280\nheight=720\nr_frame_rate=30000/1001\nnb_frames=300\nduration=10.01\n")
            .unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.total_frames, 300);
    }

    #[test]
    fn probe_falls_back_to_duration() {
        let info = parse_probe("width=640\nheight=480\nr_frame_rate=25/1\nnb_frames=N/A\nduration=4.000000\n")
            .unwrap();
        assert_eq!(info.total_frames, 100);
        let info = parse_probe("width=640\nheight=480\nr_frame_rate=0/0\n").unwrap();
        assert_eq!(info.fps, 0.0);
        assert_eq!(info.total_frames, 0);
    }

    #[test]
    fn rotated_stream_decodes_at_coded_size() {
        let info = parse_probe("width=1920\nheight=1080\nr_frame_rate=30/1\nTAG:rotate=90\nrotation=-90\n")
            .unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));

        let args = decode_args(Path::new("phone.mov"));
        let position = |flag: &str| args.iter().position(|a| a == flag);
        let input = position("-i").unwrap();
        assert!(position("-noautorotate").unwrap() < input);
        assert_eq!(args[input + 1], "phone.mov");
    }

    #[test]
    fn probe_without_video_stream_is_rejected() {
        assert!(parse_probe("").is_none());
        assert!(parse_probe("duration=3.0\n").is_none());
    }

    #[test]
    fn short_read_is_end_of_stream() {
        let mut buf = [0u8; 4];
        let mut reader = Cursor::new(vec![1u8, 2, 3, 4, 5, 6]);
        assert!(read_exact_or_eof(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(!read_exact_or_eof(&mut reader, &mut buf).unwrap());
    }

    #[test]
    fn frames_respects_limit() {
        let mut source = Counter { left: 5 };
        let source: &mut dyn FrameSource = &mut source;
        assert_eq!(source.frames(Some(3)).count(), 3);
        assert_eq!(source.frames(None).count(), 2);
        assert_eq!(source.frames(None).count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_container_reason_hides_paths() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ffprobe = dir.path().join("ffprobe");
        std::fs::write(
            &ffprobe,
            "#!/bin/sh\nfor last; do :; done\necho \"$last: Invalid data found when processing input\" >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&ffprobe, std::fs::Permissions::from_mode(0o755)).unwrap();
        let clip = dir.path().join("private_upload.mp4");
        std::fs::write(&clip, b"not a video").unwrap();

        let settings = DecoderSettings {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: ffprobe,
        };
        let err = FfmpegDecoder::open(&clip, &settings).err().unwrap();
        let ConvertError::SourceUnreadable { reason, .. } = &err else {
            panic!("unexpected error {err}");
        };
        assert_eq!(reason, "<input>: Invalid data found when processing input");
        assert!(!err.user_message(true).contains(dir.path().to_str().unwrap()));
    }

    #[test]
    fn missing_tool_reason_names_only_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"").unwrap();
        let settings = DecoderSettings {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("/opt/private/tools/ffprobe"),
        };
        let err = FfmpegDecoder::open(&clip, &settings).err().unwrap();
        let quiet = err.user_message(true);
        assert!(quiet.contains("cannot start ffprobe"));
        assert!(!quiet.contains("/opt/private"));
    }

    #[test]
    fn missing_file_is_source_unreadable() {
        let err = FfmpegDecoder::open(
            Path::new("/no/such/video.mp4"),
            &DecoderSettings::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConvertError::SourceUnreadable { .. }));
    }
}
