use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use dotmatrix_core::audio_queue::AudioConsumer;
use log::warn;

/// Start audio playback through `cpal`, draining the APU's sample queue from
/// the real-time callback. Underruns play silence.
///
/// Returns the active stream and its negotiated sample rate. Any failure is
/// reported and yields `None`; emulation continues without sound.
pub fn start_stream(queue: AudioConsumer) -> Option<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host.default_output_device()?;
    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            warn!("no supported audio output config: {e}");
            return None;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    let err_fn = |err| warn!("audio stream error: {err}");

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                for frame in data.chunks_mut(channels) {
                    let (left, right) = queue.pop_stereo().unwrap_or((0.0, 0.0));
                    frame[0] = left;
                    if channels > 1 {
                        frame[1] = right;
                    }
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| {
                for frame in data.chunks_mut(channels) {
                    let (left, right) = queue.pop_stereo().unwrap_or((0.0, 0.0));
                    frame[0] = (left * 32767.0) as i16;
                    if channels > 1 {
                        frame[1] = (right * 32767.0) as i16;
                    }
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _| {
                for frame in data.chunks_mut(channels) {
                    let (left, right) = queue.pop_stereo().unwrap_or((0.0, 0.0));
                    frame[0] = ((left * 32767.0) as i32 + 32768) as u16;
                    if channels > 1 {
                        frame[1] = ((right * 32767.0) as i32 + 32768) as u16;
                    }
                }
            },
            err_fn,
            None,
        ),
        other => {
            warn!("unsupported audio sample format: {other:?}");
            return None;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to build audio stream: {e}");
            return None;
        }
    };

    if let Err(e) = stream.play() {
        warn!("failed to start audio stream: {e}");
        return None;
    }

    Some((stream, sample_rate))
}
