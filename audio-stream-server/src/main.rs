mod diagnostics;

use std::path::Path;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use audio_stream_core::storage::config_file;
use audio_stream_core::{CaptureProvider, StreamServer};

const CONFIG_PATH: &str = "config.ini";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let loaded = match config_file::load_or_create(Path::new(CONFIG_PATH)) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let config = loaded.config;

    // Created before any thread starts; the Linux backend sets PULSE_SOURCE.
    let provider = capture_provider();

    match diagnostics::local_ipv4_addresses() {
        Ok(addrs) if addrs.is_empty() => log::warn!("no non-loopback IPv4 address found"),
        Ok(addrs) => {
            for ip in addrs {
                log::info!("address: {}", ip);
            }
        }
        Err(e) => log::warn!("could not list network interfaces: {}", e),
    }
    log::info!("port: {}", config.port);
    log::info!("pair code: {}", config.pair_code);
    log::info!("audio format: {}", config.format);

    let mut server = match StreamServer::start(&config, provider) {
        Ok(server) => server,
        Err(e) => {
            log::error!("failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    while server.is_running() {
        thread::sleep(Duration::from_millis(500));
    }

    log::error!("a receiver stopped, shutting down");
    server.shutdown();
    ExitCode::FAILURE
}

#[cfg(target_os = "windows")]
fn capture_provider() -> Box<dyn CaptureProvider> {
    Box::new(audio_stream_windows::WasapiLoopbackCapture::default_device())
}

#[cfg(all(target_os = "linux", feature = "linux-monitor"))]
fn capture_provider() -> Box<dyn CaptureProvider> {
    Box::new(audio_stream_linux::MonitorCapture::default_monitor())
}

#[cfg(all(target_os = "linux", not(feature = "linux-monitor")))]
fn capture_provider() -> Box<dyn CaptureProvider> {
    log::warn!("built without the linux-monitor feature, streaming a test tone");
    Box::new(audio_stream_core::TestToneCapture::new())
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn capture_provider() -> Box<dyn CaptureProvider> {
    log::warn!("no native loopback backend on this platform, streaming a test tone");
    Box::new(audio_stream_core::TestToneCapture::new())
}
