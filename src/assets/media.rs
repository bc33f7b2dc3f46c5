use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::foundation::core::Fps;
use crate::foundation::error::{HiliteError, HiliteResult};

/// Internal audio mixing sample rate used across decode/mix/mux.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Probed metadata about a source video file.
#[derive(Clone, Debug)]
pub struct VideoMetadata {
    /// Absolute source path used for probing/decoding.
    pub source_path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Native frame rate.
    pub fps: Fps,
    /// Total frame count (derived from duration when not reported).
    pub frame_count: u64,
    /// Duration in seconds.
    pub duration: f64,
    /// Whether ffprobe detected at least one audio stream.
    pub has_audio: bool,
}

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug)]
pub struct AudioPcm {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Interleaved `f32` PCM samples.
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Number of sample frames (samples per channel).
    pub fn frame_len(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.interleaved_f32.len() / usize::from(self.channels)
    }
}

/// Probe source video metadata through `ffprobe`.
pub fn probe_video(source_path: &Path) -> HiliteResult<VideoMetadata> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        nb_frames: Option<String>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| HiliteError::decode(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(HiliteError::decode(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| HiliteError::decode(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            HiliteError::decode(format!(
                "no video stream found in '{}'",
                source_path.display()
            ))
        })?;

    let width = video
        .width
        .ok_or_else(|| HiliteError::decode("missing video width from ffprobe"))?;
    let height = video
        .height
        .ok_or_else(|| HiliteError::decode("missing video height from ffprobe"))?;

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_rational_fps)
        .unwrap_or(Fps { num: 25, den: 1 });

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| fps.secs_to_frames_floor(duration));

    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoMetadata {
        source_path: source_path.to_path_buf(),
        width,
        height,
        fps,
        frame_count,
        duration,
        has_audio,
    })
}

/// Parse an ffprobe rational like `"30000/1001"` or `"25"`.
fn parse_rational_fps(raw: &str) -> Option<Fps> {
    let (num, den) = match raw.split_once('/') {
        Some((n, d)) => (n.parse::<u32>().ok()?, d.parse::<u32>().ok()?),
        None => (raw.parse::<u32>().ok()?, 1),
    };
    if num == 0 || den == 0 {
        return None;
    }
    Some(Fps { num, den })
}

/// Sequential raw-RGBA frame reader over an `ffmpeg` decode pipe.
///
/// One stream exists per open media source; the child process is released
/// on drop so every exit path closes the decoder.
pub struct VideoFrameStream {
    child: Child,
    stdout: ChildStdout,
    frame_len: usize,
    position: u64,
}

impl VideoFrameStream {
    /// Open a decode stream producing `out_width x out_height` RGBA frames,
    /// optionally prefiltered (crop/scale) and starting at `start_frame`.
    pub fn open(
        source_path: &Path,
        filter: Option<&str>,
        out_width: u32,
        out_height: u32,
        start_frame: u64,
        fps: Fps,
    ) -> HiliteResult<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd.args(["-v", "error"]);
        if start_frame > 0 {
            cmd.args(["-ss", &format!("{:.9}", fps.frames_to_secs(start_frame))]);
        }
        cmd.arg("-i").arg(source_path);
        if let Some(filter) = filter {
            cmd.args(["-vf", filter]);
        }
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"]);

        let mut child = cmd
            .spawn()
            .map_err(|e| HiliteError::decode(format!("failed to run ffmpeg for decode: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HiliteError::decode("failed to open ffmpeg stdout (unexpected)"))?;

        Ok(Self {
            child,
            stdout,
            frame_len: out_width as usize * out_height as usize * 4,
            position: start_frame,
        })
    }

    /// Index of the next frame this stream will produce.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Byte length of one output frame.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Read the next frame into `buf` (`frame_len` bytes). Returns `false`
    /// on clean end of stream; a partial frame is a decode error.
    pub fn read_frame(&mut self, buf: &mut [u8]) -> HiliteResult<bool> {
        if buf.len() != self.frame_len {
            return Err(HiliteError::decode(
                "frame buffer size mismatch with decoder output",
            ));
        }

        let mut filled = 0usize;
        while filled < buf.len() {
            let n = self
                .stdout
                .read(&mut buf[filled..])
                .map_err(|e| HiliteError::decode(format!("ffmpeg frame read failed: {e}")))?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(HiliteError::decode("truncated frame from ffmpeg decode"));
            }
            filled += n;
        }

        self.position += 1;
        Ok(true)
    }

    /// Read and discard `count` frames. Returns how many were actually
    /// available before the stream ended.
    pub fn skip_frames(&mut self, count: u64, scratch: &mut [u8]) -> HiliteResult<u64> {
        for skipped in 0..count {
            if !self.read_frame(scratch)? {
                return Ok(skipped);
            }
        }
        Ok(count)
    }
}

impl Drop for VideoFrameStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decode audio from a media source to stereo interleaved `f32` PCM.
///
/// Sources without an audio stream decode to empty PCM rather than an
/// error.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> HiliteResult<AudioPcm> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| HiliteError::decode(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // ffmpeg reports a missing audio stream as an error; treat it as
        // empty PCM so video-only sources mix silently.
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(HiliteError::decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(HiliteError::decode(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
