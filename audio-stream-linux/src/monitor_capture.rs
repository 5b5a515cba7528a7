//! Default-sink monitor capture through cpal's ALSA host.
//!
//! The sound server's `pulse`/`pipewire` PCM converts to whatever the stream
//! asks for, so the monitor is opened at the negotiated rate with two
//! channels. Samples arrive in the device's native type and are repacked into
//! the negotiated wire format before each chunk is handed on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use audio_stream_core::models::error::CaptureError;
use audio_stream_core::models::format::{AudioFormat, FormatDescriptor};
use audio_stream_core::processing::sample_format;
use audio_stream_core::traits::capture_provider::{AudioReadyCallback, CaptureProvider};

use crate::routing;

const CHANNELS: u16 = 2;
const PERIOD_MS: u32 = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture of the default sink's monitor.
///
/// `initialize_device` picks the sound-server PCM and checks that it offers
/// the negotiated rate in stereo. The cpal stream itself is built on the
/// capture thread, since it cannot leave the thread that created it.
pub struct MonitorCapture {
    device_name: Option<String>,
    native: SampleFormat,
    format: Option<FormatDescriptor>,
    engine_period: u32,
    callback: Option<AudioReadyCallback>,
    running: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl MonitorCapture {
    /// Capture the monitor of the default sink.
    ///
    /// Sets `PULSE_SOURCE` for the whole process, so call it before spawning threads.
    pub fn default_monitor() -> Self {
        let source = routing::route_default_monitor();
        log::info!("recording from PulseAudio source {}", source);
        Self::unrouted()
    }

    fn unrouted() -> Self {
        Self {
            device_name: None,
            native: SampleFormat::F32,
            format: None,
            engine_period: 0,
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            playing: Arc::new(AtomicBool::new(true)),
            capture_handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn join_capture_thread(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("monitor capture thread panicked");
            }
        }
    }
}

impl Default for MonitorCapture {
    fn default() -> Self {
        Self::default_monitor()
    }
}

impl CaptureProvider for MonitorCapture {
    fn set_audio_ready_callback(&mut self, callback: AudioReadyCallback) {
        self.callback = Some(callback);
    }

    fn initialize_device(&mut self, format: &FormatDescriptor) -> Result<(), CaptureError> {
        format.validate()?;
        self.format = None;
        self.device_name = None;
        self.engine_period = 0;

        let (device, name) = find_input_device(None)?;
        self.native = negotiate(&device, &name, format)?;
        self.device_name = Some(name);
        self.engine_period = sample_format::frames_per_period(format.sample_rate, PERIOD_MS);
        self.format = Some(*format);
        log::info!(
            "monitor initialised on {:?}: {}, {:?} samples from the device, {} frames per period",
            self.device_name.as_deref().unwrap_or_default(),
            format,
            self.native,
            self.engine_period
        );
        Ok(())
    }

    fn start_async(&mut self) -> Result<(), CaptureError> {
        let (Some(format), Some(device_name)) = (self.format, self.device_name.clone()) else {
            return Err(CaptureError::ConfigurationFailed("device not initialised".into()));
        };
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed(
                "monitor capture already running".into(),
            ));
        }
        self.join_capture_thread();

        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);
        self.playing.store(true, Ordering::SeqCst);

        let stream = StreamRequest {
            device_name,
            native: self.native,
            format,
            playing: Arc::clone(&self.playing),
            callback: self.callback.clone(),
        };
        let (started_tx, started_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("monitor-capture".into())
            .spawn(move || monitor_capture_loop(&running, stream, started_tx))
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn monitor thread: {}", e)))?;
        self.capture_handle = Some(handle);

        let outcome = started_rx
            .recv_timeout(START_TIMEOUT)
            .unwrap_or_else(|_| Err(CaptureError::Unknown("monitor stream did not start".into())));
        if outcome.is_err() {
            self.stop_sync();
        }
        outcome
    }

    fn stop_sync(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_capture_thread();
    }

    fn stop_async(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn set_playback_state(&mut self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    fn audio_format(&self) -> AudioFormat {
        self.format.map(|f| f.format).unwrap_or(AudioFormat::Pcm)
    }

    fn bits_per_sample(&self) -> u16 {
        self.format.map(|f| f.bits_per_sample).unwrap_or(0)
    }

    fn channel_count(&self) -> u16 {
        if self.format.is_some() {
            CHANNELS
        } else {
            0
        }
    }

    fn sample_rate(&self) -> u32 {
        self.format.map(|f| f.sample_rate).unwrap_or(0)
    }

    fn engine_period(&self) -> u32 {
        self.engine_period
    }
}

impl Drop for MonitorCapture {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

/// Everything the capture thread needs to open its own stream.
struct StreamRequest {
    device_name: String,
    native: SampleFormat,
    format: FormatDescriptor,
    playing: Arc<AtomicBool>,
    callback: Option<AudioReadyCallback>,
}

/// Find `name` among the input devices, or the sound-server PCM when `name`
/// is `None`, falling back to the host's default input.
fn find_input_device(name: Option<&str>) -> Result<(cpal::Device, String), CaptureError> {
    let host = cpal::default_host();
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| CaptureError::ConfigurationFailed(format!("cannot list input devices: {}", e)))?
        .collect();
    let names: Vec<String> = devices.iter().map(|d| d.name().unwrap_or_default()).collect();

    let index = match name {
        Some(wanted) => names.iter().position(|n| n == wanted),
        None => routing::preferred_device(&names),
    };
    if let Some(found) = index.and_then(|i| devices.into_iter().zip(names).nth(i)) {
        return Ok(found);
    }
    if name.is_some() {
        return Err(CaptureError::DeviceNotAvailable);
    }

    let device = host.default_input_device().ok_or(CaptureError::DeviceNotAvailable)?;
    let name = device.name().unwrap_or_else(|_| "default".to_string());
    log::warn!("no PulseAudio or PipeWire PCM found, using {}", name);
    Ok((device, name))
}

/// Native sample types worth asking the device for, best match first.
fn native_candidates(format: &FormatDescriptor) -> [SampleFormat; 3] {
    match (format.format, format.bits_per_sample) {
        (AudioFormat::Float, _) => [SampleFormat::F32, SampleFormat::I32, SampleFormat::I16],
        (AudioFormat::Pcm, 16) => [SampleFormat::I16, SampleFormat::F32, SampleFormat::I32],
        (AudioFormat::Pcm, _) => [SampleFormat::I32, SampleFormat::F32, SampleFormat::I16],
    }
}

/// Pick the native sample type to open `device` with at `format`'s rate in stereo.
fn negotiate(device: &cpal::Device, name: &str, format: &FormatDescriptor) -> Result<SampleFormat, CaptureError> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map_err(|e| CaptureError::ConfigurationFailed(format!("cannot query {}: {}", name, e)))?
        .collect();
    let rate = cpal::SampleRate(format.sample_rate);

    native_candidates(format)
        .into_iter()
        .find(|&native| {
            ranges.iter().any(|range| {
                range.channels() == CHANNELS
                    && range.sample_format() == native
                    && range.min_sample_rate() <= rate
                    && rate <= range.max_sample_rate()
            })
        })
        .ok_or_else(|| CaptureError::InvalidFormat(format!("{} cannot record {} in stereo", name, format)))
}

fn monitor_capture_loop(
    running: &AtomicBool,
    request: StreamRequest,
    started: mpsc::SyncSender<Result<(), CaptureError>>,
) {
    let stream = match open_stream(request) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("monitor capture error: {}", e);
            running.store(false, Ordering::SeqCst);
            let _ = started.send(Err(e));
            return;
        }
    };
    let _ = started.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
    }
    // Dropping the stream closes the PCM.
    drop(stream);
}

fn open_stream(request: StreamRequest) -> Result<cpal::Stream, CaptureError> {
    let (device, _) = find_input_device(Some(&request.device_name))?;
    let config = cpal::StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(request.format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match request.native {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, request),
        SampleFormat::I32 => build_stream::<i32>(&device, &config, request),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, request),
        other => Err(CaptureError::InvalidFormat(format!("unsupported device sample type {:?}", other))),
    }?;
    stream
        .play()
        .map_err(|e| CaptureError::Unknown(format!("failed to start monitor stream: {}", e)))?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    request: StreamRequest,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let StreamRequest {
        format,
        playing,
        callback,
        ..
    } = request;
    let mut samples: Vec<f32> = Vec::new();
    let mut chunk: Vec<u8> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let Some(ref callback) = callback else {
                    return;
                };
                if data.is_empty() || !playing.load(Ordering::SeqCst) {
                    return;
                }
                samples.clear();
                samples.extend(data.iter().map(|&s| f32::from_sample(s)));
                chunk.clear();
                sample_format::encode_samples_into(&samples, &format, &mut chunk);
                callback(&chunk);
            },
            |e| log::warn!("monitor stream error: {}", e),
            None,
        )
        .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to build monitor stream: {}", e)))
}
