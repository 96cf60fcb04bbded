use base64::Engine;
use std::time::Duration;

/// Sample rate of synthesized speech (PCM16, mono, little endian).
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// Creates a resampler to convert between audio sample rates.
#[cfg(feature = "playback")]
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<rubato::FastFixedIn<f32>> {
    let resampler = rubato::FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        rubato::PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Creates a new ring buffer on the heap for samples waiting to be played.
#[cfg(feature = "playback")]
pub fn shared_buffer(size: usize) -> ringbuf::HeapRb<f32> {
    ringbuf::HeapRb::new(size)
}

/// Splits samples into fixed size chunks, zero padding the last one.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Decodes base64 PCM16 into raw i16 samples. A trailing odd byte is dropped.
pub fn decode_i16(base64_audio: &str) -> anyhow::Result<Vec<i16>> {
    let pcm16 = base64::engine::general_purpose::STANDARD.decode(base64_audio.trim())?;
    Ok(pcm16
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Decodes base64 PCM16 into f32 samples normalised to [-1.0, 1.0].
pub fn decode_f32(base64_audio: &str) -> anyhow::Result<Vec<f32>> {
    Ok(convert_i16_to_f32(&decode_i16(base64_audio)?))
}

pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| (sample as f32 / 32768.0).clamp(-1.0, 1.0))
        .collect()
}

/// How long `sample_count` mono samples last at `sample_rate`.
pub fn clip_duration(sample_count: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(sample_count as f64 / sample_rate as f64)
}
