use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::{info, warn};

use crate::assets::media::{AudioPcm, MIX_SAMPLE_RATE, decode_audio_f32_stereo, is_ffmpeg_on_path};
use crate::encode::ffmpeg::mux_video_with_audio;
use crate::foundation::error::{HiliteError, HiliteResult};
use crate::transcript::model::Transcript;
use crate::transcript::resolve::HighlightSegment;

/// One time-positioned audio contribution to the final mix.
#[derive(Clone, Debug)]
pub struct AudioLayer {
    /// Sample-frame offset of the layer on the output timeline.
    pub start_frame: u64,
    /// Gain applied while mixing.
    pub gain: f32,
    /// Decoded (and possibly looped) source PCM.
    pub pcm: AudioPcm,
}

/// Inputs for the audio mix/mux phase.
pub struct MixInputs<'a> {
    /// The rendered silent video.
    pub silent_video_path: &'a Path,
    /// The original base video, reopened for its audio track.
    pub base_video_path: &'a Path,
    /// The word-level transcript (for per-segment timing).
    pub transcript: &'a Transcript,
    /// Highlight segments carrying optional music cues.
    pub segments: &'a [HighlightSegment],
    /// Keep the base video's own audio.
    pub preserve_audio: bool,
    /// Optional global background music.
    pub global_music_path: Option<&'a Path>,
    /// Gain for the global music track.
    pub global_music_volume: f64,
    /// Exact duration of the silent video in seconds.
    pub video_duration: f64,
    /// Final muxed output path.
    pub final_output_path: &'a Path,
}

/// Loop PCM by whole-clip concatenation until it covers `required_frames`
/// sample frames, then trim to exactly that length. Never left short.
pub fn loop_to_frames(pcm: &AudioPcm, required_frames: u64) -> Vec<f32> {
    let channels = usize::from(pcm.channels.max(1));
    let required_samples = required_frames as usize * channels;
    let source_frames = pcm.frame_len();
    if required_samples == 0 || source_frames == 0 {
        return Vec::new();
    }

    let repeats = (required_frames as usize).div_ceil(source_frames);
    let mut out = Vec::with_capacity(required_samples);
    for _ in 0..repeats.max(1) {
        out.extend_from_slice(&pcm.interleaved_f32);
    }
    out.truncate(required_samples);
    out
}

/// Composite all layers into one stereo mix of exactly `total_frames`
/// sample frames, applying per-layer gain and clamping to [-1, 1].
pub fn mix_layers(layers: &[AudioLayer], total_frames: u64) -> Vec<f32> {
    let mut out = vec![0.0f32; total_frames as usize * 2];

    for layer in layers {
        let channels = usize::from(layer.pcm.channels.max(1));
        let frames = layer.pcm.frame_len() as u64;
        for f in 0..frames {
            let dst_frame = layer.start_frame + f;
            if dst_frame >= total_frames {
                break;
            }
            let src = f as usize * channels;
            let (l, r) = if channels == 1 {
                let v = layer.pcm.interleaved_f32[src];
                (v, v)
            } else {
                (
                    layer.pcm.interleaved_f32[src],
                    layer.pcm.interleaved_f32[src + 1],
                )
            };
            let dst = dst_frame as usize * 2;
            out[dst] += l * layer.gain;
            out[dst + 1] += r * layer.gain;
        }
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    out
}

/// Write interleaved `f32` PCM to a raw little-endian `.f32le` file.
pub fn write_mix_to_f32le_file(samples: &[f32], out_path: &Path) -> HiliteResult<()> {
    let mut bytes = Vec::<u8>::with_capacity(samples.len() * 4);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes)
        .with_context(|| format!("write mixed audio '{}'", out_path.display()))?;
    Ok(())
}

/// Build the layer list: preserved base audio, global music, then one
/// layer per segment music cue, in that priority order.
pub fn build_audio_layers(inputs: &MixInputs<'_>) -> HiliteResult<Vec<AudioLayer>> {
    let total_frames = duration_to_frames(inputs.video_duration);
    let mut layers = Vec::<AudioLayer>::new();

    if inputs.preserve_audio {
        // The decode doubles as the audio-only fallback when the container
        // route reports no stream; only an empty result degrades.
        let pcm = decode_audio_f32_stereo(inputs.base_video_path, MIX_SAMPLE_RATE)?;
        if pcm.frame_len() == 0 {
            warn!(
                base = %inputs.base_video_path.display(),
                "unable to load audio track from main video"
            );
        } else {
            let mut pcm = pcm;
            let keep = (total_frames as usize * 2).min(pcm.interleaved_f32.len());
            pcm.interleaved_f32.truncate(keep);
            layers.push(AudioLayer {
                start_frame: 0,
                gain: 1.0,
                pcm,
            });
        }
    }

    if let Some(path) = inputs.global_music_path {
        if !path.exists() {
            return Err(HiliteError::asset_missing(format!(
                "global music file not found: {}",
                path.display()
            )));
        }
        let source = decode_audio_f32_stereo(path, MIX_SAMPLE_RATE)?;
        if source.frame_len() == 0 {
            warn!(music = %path.display(), "global music decoded to silence, skipping");
        } else {
            layers.push(AudioLayer {
                start_frame: 0,
                gain: inputs.global_music_volume as f32,
                pcm: AudioPcm {
                    sample_rate: MIX_SAMPLE_RATE,
                    channels: source.channels,
                    interleaved_f32: loop_to_frames(&source, total_frames),
                },
            });
        }
    }

    for segment in inputs.segments {
        let Some(path) = segment.music_path.as_ref() else {
            continue;
        };
        if !path.exists() {
            return Err(HiliteError::asset_missing(format!(
                "music file not found: {}",
                path.display()
            )));
        }

        let (start_time, end_time) =
            inputs.transcript.time_span(segment.start_word, segment.end_word);
        let duration = (end_time - start_time).max(0.0);
        if duration <= 0.0 {
            continue;
        }

        let source = decode_audio_f32_stereo(path, MIX_SAMPLE_RATE)?;
        if source.frame_len() == 0 {
            warn!(music = %path.display(), "segment music decoded to silence, skipping");
            continue;
        }
        let required = duration_to_frames(duration);
        layers.push(AudioLayer {
            start_frame: duration_to_frames(start_time),
            gain: segment.music_gain as f32,
            pcm: AudioPcm {
                sample_rate: MIX_SAMPLE_RATE,
                channels: source.channels,
                interleaved_f32: loop_to_frames(&source, required),
            },
        });
    }

    Ok(layers)
}

/// Mix all audio layers and mux them with the silent render into the final
/// output file.
///
/// When no audio backend is available the silent render is promoted to the
/// final path with a warning; this phase never hard-fails for that reason.
pub fn mix_and_mux(inputs: &MixInputs<'_>) -> HiliteResult<()> {
    if !is_ffmpeg_on_path() {
        warn!("audio backend unavailable (ffmpeg not on PATH); output will be silent");
        return promote_silent(inputs.silent_video_path, inputs.final_output_path);
    }

    let layers = build_audio_layers(inputs)?;
    if layers.is_empty() {
        warn!("no audio layers to mix; output will be silent");
        return promote_silent(inputs.silent_video_path, inputs.final_output_path);
    }

    let total_frames = duration_to_frames(inputs.video_duration);
    let mix = mix_layers(&layers, total_frames);

    let pcm_path = sibling_with_suffix(inputs.final_output_path, ".mix.f32le");
    write_mix_to_f32le_file(&mix, &pcm_path)?;

    let mux_result = mux_video_with_audio(
        inputs.silent_video_path,
        &pcm_path,
        MIX_SAMPLE_RATE,
        2,
        inputs.final_output_path,
    );
    if let Err(err) = std::fs::remove_file(&pcm_path) {
        warn!(path = %pcm_path.display(), %err, "failed to remove intermediate audio mix");
    }
    mux_result?;

    info!(
        layers = layers.len(),
        out = %inputs.final_output_path.display(),
        "audio mix complete"
    );
    Ok(())
}

fn duration_to_frames(seconds: f64) -> u64 {
    (seconds.max(0.0) * f64::from(MIX_SAMPLE_RATE)).round() as u64
}

fn promote_silent(silent: &Path, final_path: &Path) -> HiliteResult<()> {
    if silent == final_path {
        return Ok(());
    }
    if std::fs::rename(silent, final_path).is_err() {
        std::fs::copy(silent, final_path)
            .with_context(|| format!("copy silent render to '{}'", final_path.display()))?;
        let _ = std::fs::remove_file(silent);
    }
    Ok(())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
