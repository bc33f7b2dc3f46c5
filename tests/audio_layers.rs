//! Audio layer construction properties at the real mix sample rate.

use hilite::{AudioLayer, AudioPcm, MIX_SAMPLE_RATE, loop_to_frames, mix_layers};

fn constant_stereo(seconds: f64, value: f32) -> AudioPcm {
    let frames = (seconds * f64::from(MIX_SAMPLE_RATE)).round() as usize;
    AudioPcm {
        sample_rate: MIX_SAMPLE_RATE,
        channels: 2,
        interleaved_f32: vec![value; frames * 2],
    }
}

#[test]
fn scenario_c_two_second_clip_covers_five_second_segment() {
    // A 2s music file over a 5s segment: 3 whole-clip repeats trimmed to
    // exactly 5s, gain-scaled by the configured volume.
    let source = constant_stereo(2.0, 0.8);
    let required_frames = (5.0 * f64::from(MIX_SAMPLE_RATE)).round() as u64;

    let looped = loop_to_frames(&source, required_frames);
    assert_eq!(looped.len() as u64, required_frames * 2);

    let layer = AudioLayer {
        start_frame: 0,
        gain: 0.5,
        pcm: AudioPcm {
            sample_rate: MIX_SAMPLE_RATE,
            channels: 2,
            interleaved_f32: looped,
        },
    };
    let mix = mix_layers(&[layer], required_frames);
    assert_eq!(mix.len() as u64, required_frames * 2);
    assert!((mix[0] - 0.4).abs() < 1e-6);
    assert!((mix[mix.len() - 1] - 0.4).abs() < 1e-6);
}

#[test]
fn looped_result_is_never_short_of_the_span() {
    let source = constant_stereo(0.7, 0.1);
    for seconds in [0.1f64, 1.0, 2.3, 7.7] {
        let required = (seconds * f64::from(MIX_SAMPLE_RATE)).round() as u64;
        let looped = loop_to_frames(&source, required);
        assert_eq!(looped.len() as u64, required * 2, "span {seconds}s");
    }
}

#[test]
fn segment_layer_is_positioned_at_its_start_time() {
    // A cue starting at 3s into a 10s timeline.
    let start_frame = (3.0 * f64::from(MIX_SAMPLE_RATE)).round() as u64;
    let total_frames = (10.0 * f64::from(MIX_SAMPLE_RATE)).round() as u64;
    let layer = AudioLayer {
        start_frame,
        gain: 1.0,
        pcm: constant_stereo(2.0, 0.3),
    };

    let mix = mix_layers(&[layer], total_frames);
    let at = |sec: f64| mix[(sec * f64::from(MIX_SAMPLE_RATE)).round() as usize * 2];
    assert_eq!(at(2.9), 0.0);
    assert!((at(3.1) - 0.3).abs() < 1e-6);
    assert!((at(4.9) - 0.3).abs() < 1e-6);
    assert_eq!(at(5.1), 0.0);
}
