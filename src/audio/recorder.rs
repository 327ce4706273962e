//! System microphone recording via CPAL.
//!
//! The stream callback downmixes to mono f32 and ships frames through a
//! bounded channel; the recording thread drains the channel until the stop
//! flag is raised or the duration cap is hit, then resamples to the target
//! rate in one pass.

use super::{append_downmixed, resample_linear};
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FRAME_CHANNEL_CAPACITY: usize = 64;
const RECV_WAIT: Duration = Duration::from_millis(50);

pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self { device })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Record until `stop` is raised or `max_duration` elapses, returning
    /// mono samples at `target_rate`.
    pub fn record_until(
        &self,
        stop: &Arc<AtomicBool>,
        max_duration: Duration,
        target_rate: u32,
    ) -> Result<Vec<f32>> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        tracing::debug!(
            ?format,
            device_sample_rate,
            channels,
            device = %self.device_name(),
            "recording started"
        );

        let (sender, receiver) = bounded::<Vec<f32>>(FRAME_CHANNEL_CAPACITY);
        let err_fn = |err| tracing::warn!(%err, "audio stream error");

        let stream = match format {
            SampleFormat::F32 => self.device.build_input_stream(
                &device_config,
                frame_callback(sender, channels, |sample: f32| sample),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => self.device.build_input_stream(
                &device_config,
                frame_callback(sender, channels, |sample: i16| {
                    sample as f32 / 32_768.0_f32
                }),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &device_config,
                frame_callback(sender, channels, |sample: u16| {
                    (sample as f32 - 32_768.0_f32) / 32_768.0_f32
                }),
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;

        let max_samples =
            (max_duration.as_secs_f64() * device_sample_rate as f64).ceil() as usize;
        let mut samples = Vec::new();
        loop {
            if stop.load(Ordering::Relaxed) || samples.len() >= max_samples {
                break;
            }
            match receiver.recv_timeout(RECV_WAIT) {
                Ok(frame) => samples.extend(frame),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("audio stream disconnected"));
                }
            }
        }

        if let Err(err) = stream.pause() {
            tracing::warn!(%err, "failed to pause audio stream");
        }
        drop(stream);

        if samples.is_empty() {
            return Err(anyhow!(
                "no samples captured from '{}'; check microphone permissions and availability",
                self.device_name()
            ));
        }
        samples.truncate(max_samples);
        Ok(resample_linear(&samples, device_sample_rate, target_rate))
    }
}

fn frame_callback<T, F>(
    sender: Sender<Vec<f32>>,
    channels: usize,
    convert: F,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo)
where
    T: Copy,
    F: FnMut(T) -> f32 + Copy,
{
    move |data: &[T], _| {
        let mut frame = Vec::with_capacity(data.len() / channels.max(1) + 1);
        append_downmixed(&mut frame, data, channels, convert);
        // A full channel means the drain side stalled; dropping the frame
        // beats blocking the audio callback.
        let _ = sender.try_send(frame);
    }
}
