//! WASAPI loopback capture provider for system audio.
//!
//! Captures the mix going to the default render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`, converted by the audio engine to the
//! format negotiated in the handshake. No special permissions needed.
//!
//! DRM-protected audio is silenced in loopback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use audio_stream_core::models::error::CaptureError;
use audio_stream_core::models::format::{AudioFormat, FormatDescriptor};
use audio_stream_core::traits::capture_provider::{AudioReadyCallback, CaptureProvider};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// 100 ms, in 100 ns units.
const BUFFER_DURATION: i64 = 1_000_000;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// WASAPI loopback capture for system audio.
///
/// `initialize_device` opens a trial loopback stream on the default render
/// endpoint in the requested format, so a format the engine rejects fails the
/// handshake instead of the capture thread. The stream that delivers audio is
/// opened again on the capture thread, which owns every COM object it creates.
pub struct WasapiLoopbackCapture {
    format: Option<FormatDescriptor>,
    channels: u16,
    engine_period: u32,
    callback: Option<AudioReadyCallback>,
    running: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl WasapiLoopbackCapture {
    /// Create a loopback capture on the default render device.
    pub fn default_device() -> Self {
        Self {
            format: None,
            channels: 0,
            engine_period: 0,
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            playing: Arc::new(AtomicBool::new(true)),
            capture_handle: None,
        }
    }

    fn join_capture_thread(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("loopback capture thread panicked");
            }
        }
    }
}

impl Default for WasapiLoopbackCapture {
    fn default() -> Self {
        Self::default_device()
    }
}

impl CaptureProvider for WasapiLoopbackCapture {
    fn set_audio_ready_callback(&mut self, callback: AudioReadyCallback) {
        self.callback = Some(callback);
    }

    fn initialize_device(&mut self, format: &FormatDescriptor) -> Result<(), CaptureError> {
        format.validate()?;
        self.format = None;
        self.channels = 0;
        self.engine_period = 0;
        let endpoint = query_render_endpoint(format)?;

        self.channels = endpoint.channels;
        self.engine_period = (endpoint.device_period * i64::from(format.sample_rate) / 10_000_000) as u32;
        self.format = Some(*format);
        log::info!(
            "loopback initialised: {}, {} channels, {} frames per period",
            format,
            self.channels,
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
                "loopback capture already running".into(),
            ));
        }
        self.join_capture_thread();

        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);
        self.playing.store(true, Ordering::SeqCst);

        let stream = StreamParams {
            format,
            channels: self.channels,
        };
        let playing = Arc::clone(&self.playing);
        let callback = self.callback.clone();

        let handle = thread::Builder::new()
            .name("wasapi-loopback-capture".into())
            .spawn(move || {
                if let Err(e) = loopback_capture_loop(&running, &playing, callback, stream) {
                    log::error!("loopback capture error: {}", e);
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn loopback thread: {}", e)))?;

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
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.format.map(|f| f.sample_rate).unwrap_or(0)
    }

    fn engine_period(&self) -> u32 {
        self.engine_period
    }
}

impl Drop for WasapiLoopbackCapture {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

struct EndpointInfo {
    channels: u16,
    /// Default device period, 100 ns units.
    device_period: i64,
}

#[derive(Clone, Copy)]
struct StreamParams {
    format: FormatDescriptor,
    channels: u16,
}

impl StreamParams {
    fn block_align(&self) -> u16 {
        self.channels * self.format.bits_per_sample / 8
    }

    fn wave_format(&self) -> WAVEFORMATEX {
        let block_align = self.block_align();
        WAVEFORMATEX {
            wFormatTag: match self.format.format {
                AudioFormat::Pcm => WAVE_FORMAT_PCM,
                AudioFormat::Float => WAVE_FORMAT_IEEE_FLOAT,
            },
            nChannels: self.channels,
            nSamplesPerSec: self.format.sample_rate,
            nAvgBytesPerSec: self.format.sample_rate * u32::from(block_align),
            nBlockAlign: block_align,
            wBitsPerSample: self.format.bits_per_sample,
            cbSize: 0,
        }
    }
}

fn default_render_client() -> Result<IAudioClient, CaptureError> {
    unsafe {
        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|_| CaptureError::DeviceNotAvailable)?;

        // Loopback reads from the render endpoint, not a capture endpoint.
        let device = enumerator
            .GetDefaultAudioEndpoint(eRender, eConsole)
            .map_err(|_| CaptureError::DeviceNotAvailable)?;

        device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))
    }
}

/// Read the mix channel count and device period of the default render
/// endpoint, then check that a loopback stream opens in `format`.
fn query_render_endpoint(format: &FormatDescriptor) -> Result<EndpointInfo, CaptureError> {
    let _com = ComGuard::init()?;
    let audio_client = default_render_client()?;

    let (channels, device_period) = unsafe {
        let mix_format_ptr = audio_client
            .GetMixFormat()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;
        let channels = (*mix_format_ptr).nChannels;
        CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));

        let mut device_period: i64 = 0;
        audio_client
            .GetDevicePeriod(Some(&mut device_period as *mut i64), None)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetDevicePeriod failed: {}", e)))?;

        (channels, device_period)
    };

    let stream = StreamParams {
        format: *format,
        channels,
    };
    open_loopback_stream(&audio_client, &stream)?;

    Ok(EndpointInfo {
        channels,
        device_period,
    })
}

/// Initialize `audio_client` for shared-mode loopback in the negotiated format.
fn open_loopback_stream(audio_client: &IAudioClient, stream: &StreamParams) -> Result<IAudioCaptureClient, CaptureError> {
    let wave_format = stream.wave_format();
    unsafe {
        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK
                    | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                    | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                BUFFER_DURATION,
                0,
                &wave_format,
                None,
            )
            .map_err(|e| CaptureError::InvalidFormat(format!("loopback rejected {}: {}", stream.format, e)))?;

        audio_client
            .GetService()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))
    }
}

/// Capture loop running on a dedicated thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Activate IAudioClient on the default render endpoint
/// 3. Initialize in shared loopback mode with the negotiated format
/// 4. Get IAudioCaptureClient
/// 5. Register with MMCSS
/// 6. Start, poll for packets, hand each one to the callback while playing
fn loopback_capture_loop(
    running: &AtomicBool,
    playing: &AtomicBool,
    callback: Option<AudioReadyCallback>,
    stream: StreamParams,
) -> Result<(), CaptureError> {
    let _com = ComGuard::init()?;
    let audio_client = default_render_client()?;
    let capture_client = open_loopback_stream(&audio_client, &stream)?;
    let block_align = usize::from(stream.block_align());
    let mut silence: Vec<u8> = Vec::new();

    unsafe {
        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| CaptureError::Unknown(format!("IAudioClient::Start failed: {}", e)))?;

        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);

            let mut packet_length = capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| CaptureError::Unknown(format!("GetBuffer failed: {}", e)))?;

                let deliver = playing.load(Ordering::SeqCst) && num_frames > 0 && !buffer_ptr.is_null();
                if let (true, Some(callback)) = (deliver, callback.as_ref()) {
                    let len = num_frames as usize * block_align;
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        silence.resize(len, 0);
                        callback(&silence[..len]);
                    } else {
                        callback(std::slice::from_raw_parts(buffer_ptr, len));
                    }
                }

                capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| CaptureError::Unknown(format!("ReleaseBuffer failed: {}", e)))?;

                packet_length = capture_client
                    .GetNextPacketSize()
                    .map_err(|e| CaptureError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }

        let _ = audio_client.Stop();
    }

    Ok(())
}

/// COM apartment for the current thread, released on drop.
struct ComGuard;

impl ComGuard {
    fn init() -> Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_format_matches_descriptor() {
        let stream = StreamParams {
            format: "pcm 24 44100".parse().unwrap(),
            channels: 2,
        };
        let wf = stream.wave_format();
        assert_eq!({ wf.wFormatTag }, WAVE_FORMAT_PCM);
        assert_eq!({ wf.nBlockAlign }, 6);
        assert_eq!({ wf.nAvgBytesPerSec }, 44100 * 6);

        let float = StreamParams {
            format: "float 32 48000".parse().unwrap(),
            channels: 2,
        };
        assert_eq!({ float.wave_format().wFormatTag }, WAVE_FORMAT_IEEE_FLOAT);
    }

    #[test]
    fn initialisation_result_decides_what_is_advertised() {
        let mut capture = WasapiLoopbackCapture::default_device();
        match capture.initialize_device(&"pcm 16 48000".parse().unwrap()) {
            Ok(()) => {
                assert_eq!(capture.sample_rate(), 48000);
                assert!(capture.channel_count() > 0);
            }
            // Hosts without an output device.
            Err(_) => {
                assert_eq!(capture.sample_rate(), 0);
                assert_eq!(capture.channel_count(), 0);
                assert!(capture.start_async().is_err());
            }
        }
    }

    #[test]
    fn start_requires_initialisation() {
        let mut capture = WasapiLoopbackCapture::default_device();
        assert!(capture.start_async().is_err());
    }
}
