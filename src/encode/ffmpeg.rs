use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::foundation::core::{Fps, FrameRgba};
use crate::foundation::error::{HiliteError, HiliteResult};

/// Options for MP4 output through the system `ffmpeg`.
#[derive(Clone, Debug)]
pub struct EncodeConfig {
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Frame width; must be even for yuv420p.
    pub width: u32,
    /// Frame height; must be even for yuv420p.
    pub height: u32,
    /// Output frame rate.
    pub fps: Fps,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
}

/// Encoder that spawns the system `ffmpeg` and streams raw opaque RGBA8
/// frames to its stdin, producing h264 + yuv420p MP4 output.
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    cfg: EncodeConfig,
    frames_written: u64,
}

impl FfmpegEncoder {
    /// Spawn the encoder process. Fails fast when the output cannot be
    /// opened for writing, before any frame is produced.
    pub fn start(cfg: EncodeConfig) -> HiliteResult<Self> {
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(HiliteError::validation("fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(HiliteError::validation(
                "encoder width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(HiliteError::validation(
                "encoder width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        ensure_parent_dir(&cfg.out_path)?;
        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(HiliteError::encode(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if cfg.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            HiliteError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HiliteError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| HiliteError::encode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            cfg,
            frames_written: 0,
        })
    }

    /// Number of frames pushed so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Stream one frame to the encoder.
    pub fn push_frame(&mut self, frame: &FrameRgba) -> HiliteResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(HiliteError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.data.len() != (frame.width as usize) * (frame.height as usize) * 4 {
            return Err(HiliteError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(HiliteError::encode("encoder is already finalized"));
        };
        stdin.write_all(&frame.data).map_err(|e| {
            HiliteError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close the stream and wait for ffmpeg to finalize the file. Returns
    /// the number of frames written.
    pub fn finish(mut self) -> HiliteResult<u64> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| HiliteError::encode("encoder not started"))?;

        let status = child
            .wait()
            .map_err(|e| HiliteError::encode(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| HiliteError::encode("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| HiliteError::encode(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(HiliteError::encode(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(self.frames_written)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Early-termination path: kill the encoder instead of leaking it.
        if let Some(mut child) = self.child.take() {
            drop(self.stdin.take());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Mux a rendered silent video with a raw `f32le` PCM track into the final
/// output (`-c:v copy`, AAC audio).
pub fn mux_video_with_audio(
    video_path: &Path,
    audio_f32le_path: &Path,
    sample_rate: u32,
    channels: u16,
    out_path: &Path,
) -> HiliteResult<()> {
    if sample_rate == 0 || channels == 0 {
        return Err(HiliteError::validation(
            "audio sample_rate/channels must be non-zero when muxing",
        ));
    }
    ensure_parent_dir(out_path)?;

    let out = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(video_path)
        .args([
            "-f",
            "f32le",
            "-ar",
            &sample_rate.to_string(),
            "-ac",
            &channels.to_string(),
            "-i",
        ])
        .arg(audio_f32le_path)
        .args([
            "-c:v",
            "copy",
            "-c:a",
            "aac",
            "-shortest",
            "-movflags",
            "+faststart",
        ])
        .arg(out_path)
        .output()
        .map_err(|e| HiliteError::encode(format!("failed to run ffmpeg for muxing: {e}")))?;

    if !out.status.success() {
        return Err(HiliteError::encode(format!(
            "ffmpeg mux failed for '{}': {}",
            out_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> HiliteResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
