use super::wav::encode_wav;
use super::{append_downmixed, resample_linear};

#[test]
fn downmix_averages_interleaved_channels() {
    let mut buf = Vec::new();
    append_downmixed(&mut buf, &[0.2f32, 0.4, 0.6, 0.8], 2, |s| s);
    assert_eq!(buf.len(), 2);
    assert!((buf[0] - 0.3).abs() < 1e-6);
    assert!((buf[1] - 0.7).abs() < 1e-6);
}

#[test]
fn downmix_passes_mono_through_with_conversion() {
    let mut buf = Vec::new();
    append_downmixed(&mut buf, &[16_384i16, -16_384], 1, |s| s as f32 / 32_768.0);
    assert_eq!(buf.len(), 2);
    assert!((buf[0] - 0.5).abs() < 1e-6);
    assert!((buf[1] + 0.5).abs() < 1e-6);
}

#[test]
fn downmix_handles_a_trailing_partial_frame() {
    let mut buf = Vec::new();
    append_downmixed(&mut buf, &[1.0f32, 1.0, 0.5], 2, |s| s);
    assert_eq!(buf.len(), 2);
    assert!((buf[1] - 0.5).abs() < 1e-6);
}

#[test]
fn resample_halves_sample_count_for_double_rate() {
    let samples: Vec<f32> = (0..32_000).map(|i| (i % 100) as f32 / 100.0).collect();
    let out = resample_linear(&samples, 32_000, 16_000);
    assert_eq!(out.len(), 16_000);
}

#[test]
fn resample_is_identity_at_matching_rates() {
    let samples = vec![0.1f32, 0.2, 0.3];
    assert_eq!(resample_linear(&samples, 16_000, 16_000), samples);
}

#[test]
fn wav_header_matches_payload() {
    let samples = vec![0.0f32, 0.5, -0.5, 1.0];
    let bytes = encode_wav(&samples, 16_000);

    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WAVE");
    assert_eq!(&bytes[12..16], b"fmt ");
    assert_eq!(&bytes[36..40], b"data");
    assert_eq!(bytes.len(), 44 + samples.len() * 2);

    let data_len = u32::from_le_bytes(bytes[40..44].try_into().expect("len"));
    assert_eq!(data_len as usize, samples.len() * 2);
    let rate = u32::from_le_bytes(bytes[24..28].try_into().expect("rate"));
    assert_eq!(rate, 16_000);
    let channels = u16::from_le_bytes(bytes[22..24].try_into().expect("channels"));
    assert_eq!(channels, 1);

    // Full-scale sample clamps to i16 max.
    let last = i16::from_le_bytes(bytes[bytes.len() - 2..].try_into().expect("sample"));
    assert_eq!(last, 32_767);
}
