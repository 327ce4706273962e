//! Microphone capture and WAV encoding for the transcription path.
//!
//! Recording runs on its own background thread and stops on an explicit
//! user action (cooperative flag) or the configured maximum duration; the
//! captured audio is normalized to mono at the configured sample rate and
//! written to a temp WAV file for the multipart transcription upload.

mod recorder;
mod wav;

#[cfg(test)]
mod tests;

pub use recorder::Recorder;
pub use wav::write_wav;

/// Downmix interleaved multi-channel samples to mono, converting each
/// sample to f32 on the way.
pub(crate) fn append_downmixed<T, F>(buf: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// Linear-interpolation resample. Good enough for speech headed to a
/// transcription endpoint.
pub(crate) fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let index = pos as usize;
        let frac = (pos - index as f64) as f32;
        let a = samples[index];
        let b = samples.get(index + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}
