use crate::audio::{self, SPEECH_SAMPLE_RATE};
use std::time::Duration;

/// Plays tutor speech clips one at a time.
///
/// `play` queues a clip and returns how long it lasts; the caller decides when
/// to treat playback as finished. Built without the `playback` feature, nothing
/// reaches the speakers but durations are still reported, so the dialogue
/// keeps its pacing on headless machines.
pub struct SpeechPlayer {
    #[cfg(feature = "playback")]
    output: output::Output,
}

impl SpeechPlayer {
    #[cfg(feature = "playback")]
    pub fn open(device_name: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self {
            output: output::Output::open(device_name)?,
        })
    }

    #[cfg(not(feature = "playback"))]
    pub fn open(_device_name: Option<&str>) -> anyhow::Result<Self> {
        tracing::info!("Built without speaker output; speech is shown as text only");
        Ok(Self {})
    }

    /// Stops whatever is playing and starts `base64_audio` (PCM16 mono 24kHz).
    pub fn play(&mut self, base64_audio: &str) -> anyhow::Result<Duration> {
        let samples = audio::decode_f32(base64_audio)?;
        self.stop();
        #[cfg(feature = "playback")]
        self.output.push(&samples)?;
        let duration = audio::clip_duration(samples.len(), SPEECH_SAMPLE_RATE);
        tracing::debug!("Playing {} samples ({:?})", samples.len(), duration);
        Ok(duration)
    }

    pub fn stop(&mut self) {
        #[cfg(feature = "playback")]
        self.output.flush();
    }
}

#[cfg(feature = "playback")]
mod output {
    use crate::audio::{self, SPEECH_SAMPLE_RATE};
    use anyhow::Context;
    use cpal::traits::{DeviceTrait, StreamTrait};
    use cpal::{FrameCount, StreamConfig};
    use ringbuf::HeapProd;
    use ringbuf::traits::{Consumer, Observer, Producer, Split};
    use rubato::Resampler;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OUTPUT_CHUNK_SIZE: usize = 1024;
    const RESAMPLER_CHUNK_SIZE: usize = 100;
    /// Longest clip the output buffer can hold, in seconds.
    const MAX_CLIP_SECONDS: usize = 120;

    pub(super) struct Output {
        _stream: cpal::Stream,
        audio_out_tx: HeapProd<f32>,
        /// Samples queued before the last stop, still to be skipped.
        discard: Arc<AtomicUsize>,
        output_sample_rate: f64,
    }

    impl Output {
        pub(super) fn open(device_name: Option<&str>) -> anyhow::Result<Self> {
            let output = crate::device::get_or_default_output(device_name)
                .context("Failed to get default audio output device")?;
            tracing::info!("Using output device: {:?}", output.name()?);

            let output_config = output
                .default_output_config()
                .context("Failed to get default output config")?;
            let output_config = StreamConfig {
                channels: output_config.channels(),
                sample_rate: output_config.sample_rate(),
                buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
            };
            let output_channel_count = output_config.channels as usize;
            let output_sample_rate = output_config.sample_rate.0 as f64;
            tracing::info!("Output stream config: {:?}", &output_config);

            let buffer = audio::shared_buffer(output_sample_rate as usize * MAX_CLIP_SECONDS);
            let (audio_out_tx, mut audio_out_rx) = buffer.split();
            let discard = Arc::new(AtomicUsize::new(0));
            let to_discard = discard.clone();

            // Mono speech is copied to every output channel.
            let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let stale = to_discard.swap(0, Ordering::AcqRel);
                for _ in 0..stale {
                    if audio_out_rx.try_pop().is_none() {
                        break;
                    }
                }
                for frame in data.chunks_mut(output_channel_count.max(1)) {
                    let sample = audio_out_rx.try_pop().unwrap_or(0.0);
                    frame.fill(sample);
                }
            };

            let stream = output.build_output_stream(
                &output_config,
                output_data_fn,
                move |err| tracing::error!("An error occurred on output stream: {}", err),
                None,
            )?;
            stream.play()?;

            Ok(Self {
                _stream: stream,
                audio_out_tx,
                discard,
                output_sample_rate,
            })
        }

        pub(super) fn push(&mut self, samples: &[f32]) -> anyhow::Result<()> {
            let mut resampler = audio::create_resampler(
                SPEECH_SAMPLE_RATE as f64,
                self.output_sample_rate,
                RESAMPLER_CHUNK_SIZE,
            )?;
            let chunk_size = resampler.input_frames_next();
            for chunk in audio::split_for_chunks(samples, chunk_size) {
                let resampled = resampler.process(&[chunk.as_slice()], None)?;
                if let Some(resampled) = resampled.first() {
                    let pushed = self.audio_out_tx.push_slice(resampled);
                    if pushed < resampled.len() {
                        tracing::warn!("Output buffer full, dropping {} samples", resampled.len() - pushed);
                        return Ok(());
                    }
                }
            }
            Ok(())
        }

        pub(super) fn flush(&mut self) {
            self.discard
                .store(self.audio_out_tx.occupied_len(), Ordering::Release);
        }
    }
}
