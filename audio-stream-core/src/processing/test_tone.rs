//! Synthetic capture provider.
//!
//! Produces a stereo sine tone in the negotiated format, one chunk per 10 ms
//! capture period, on a dedicated thread. Used where no native loopback
//! backend exists and to exercise the stream server end to end.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::format::{AudioFormat, FormatDescriptor};
use crate::processing::sample_format;
use crate::traits::capture_provider::{AudioReadyCallback, CaptureProvider};

const PERIOD_MS: u32 = 10;
const CHANNELS: u16 = 2;

pub struct TestToneCapture {
    frequency_hz: f32,
    amplitude: f32,
    format: Option<FormatDescriptor>,
    engine_period: u32,
    callback: Option<AudioReadyCallback>,
    // Fresh flag per run so a late `stop_async` never stops the next run.
    running: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl TestToneCapture {
    /// A 440 Hz tone at half scale.
    pub fn new() -> Self {
        Self::with_tone(440.0, 0.5)
    }

    pub fn with_tone(frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            frequency_hz,
            amplitude,
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

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn join_capture_thread(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("test tone capture thread panicked");
            }
        }
    }
}

impl Default for TestToneCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureProvider for TestToneCapture {
    fn set_audio_ready_callback(&mut self, callback: AudioReadyCallback) {
        self.callback = Some(callback);
    }

    fn initialize_device(&mut self, format: &FormatDescriptor) -> Result<(), CaptureError> {
        format.validate()?;
        self.engine_period = sample_format::frames_per_period(format.sample_rate, PERIOD_MS);
        self.format = Some(*format);
        log::info!(
            "test tone initialised: {} Hz tone, {} ({} frames per period)",
            self.frequency_hz,
            format,
            self.engine_period
        );
        Ok(())
    }

    fn start_async(&mut self) -> Result<(), CaptureError> {
        let format = self
            .format
            .ok_or_else(|| CaptureError::ConfigurationFailed("device not initialised".into()))?;
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed(
                "test tone capture already running".into(),
            ));
        }
        // A previous run may have been stopped asynchronously.
        self.join_capture_thread();

        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);
        self.playing.store(true, Ordering::SeqCst);

        let generator = ToneGenerator::new(self.frequency_hz, self.amplitude, format.sample_rate);
        let playing = Arc::clone(&self.playing);
        let callback = self.callback.clone();
        let frames = self.engine_period as usize;

        let handle = thread::Builder::new()
            .name("test-tone-capture".into())
            .spawn(move || tone_loop(running, playing, callback, generator, format, frames))
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn tone thread: {}", e)))?;

        self.capture_handle = Some(handle);
        Ok(())
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
        CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        self.format.map(|f| f.sample_rate).unwrap_or(0)
    }

    fn engine_period(&self) -> u32 {
        self.engine_period
    }
}

impl Drop for TestToneCapture {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

fn tone_loop(
    running: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    callback: Option<AudioReadyCallback>,
    mut generator: ToneGenerator,
    format: FormatDescriptor,
    frames: usize,
) {
    let mut samples = Vec::with_capacity(frames * CHANNELS as usize);
    let mut chunk = Vec::with_capacity(frames * sample_format::bytes_per_frame(&format, CHANNELS));

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(PERIOD_MS as u64));

        if !playing.load(Ordering::SeqCst) {
            continue;
        }
        let Some(ref callback) = callback else {
            continue;
        };

        samples.clear();
        generator.fill_stereo(&mut samples, frames);
        chunk.clear();
        sample_format::encode_samples_into(&samples, &format, &mut chunk);
        callback(&chunk);
    }
}

/// Phase-continuous sine oscillator.
struct ToneGenerator {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl ToneGenerator {
    fn new(frequency_hz: f32, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency_hz / sample_rate as f32,
            amplitude,
        }
    }

    /// Append `frames` interleaved stereo frames (same signal on both channels).
    fn fill_stereo(&mut self, out: &mut Vec<f32>, frames: usize) {
        for _ in 0..frames {
            let value = self.amplitude * self.phase.sin();
            out.push(value);
            out.push(value);
            self.phase = (self.phase + self.step) % TAU;
        }
    }
}
