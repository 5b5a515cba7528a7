use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::crypto::framer::PacketFramer;
use crate::crypto::key::SymmetricKey;
use crate::models::config::StreamConfig;
use crate::models::error::{CaptureError, StreamError};
use crate::models::format::FormatDescriptor;
use crate::models::state::{SessionInfo, SessionState};
use crate::protocol::messages::{Command, StreamSettings};
use crate::traits::capture_provider::{AudioReadyCallback, CaptureProvider};

/// Largest payload a single UDP/IPv4 datagram can carry.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// Receive buffer of the control and command sockets. Valid datagrams are
/// tiny; the headroom keeps oversized junk from being a receive error on
/// platforms that refuse to truncate.
const RECV_BUF_LEN: usize = 8192;

/// `WSAEMSGSIZE`: Windows reports a datagram larger than the buffer as an error.
#[cfg(windows)]
const MESSAGE_TOO_LONG: i32 = 10040;

/// The provider and the record of the session it is capturing for.
///
/// Always locked as a unit, for the whole of a handshake or a command.
struct CaptureSlot {
    provider: Box<dyn CaptureProvider>,
    session: Option<SessionInfo>,
}

/// State shared between the server handle and its two worker threads.
struct Shared {
    key: SymmetricKey,
    format: FormatDescriptor,
    running: AtomicBool,
    capture: Mutex<CaptureSlot>,
    control_socket: UdpSocket,
    command_socket: UdpSocket,
    command_port: u16,
    audio_socket: Arc<UdpSocket>,
}

/// Encrypted audio streaming server.
///
/// Owns three UDP sockets and two worker threads:
///
/// ```text
/// control  0.0.0.0:<port>  ──► handshake-receiver ──► (re)initialise capture,
///                                                     reply StreamSettings
/// command  0.0.0.0:<any>   ──► command-receiver   ──► play / pause / stop, ack
/// audio    0.0.0.0:<any>   ◄── provider thread (readiness callback), one
///                              encrypted datagram per captured chunk
/// ```
///
/// Exactly one client is paired at a time. A handshake from anyone replaces
/// the current session.
pub struct StreamServer {
    /// Dropped by `shutdown`, which closes all three sockets.
    shared: Option<Arc<Shared>>,
    control_addr: SocketAddr,
    command_port: u16,
    /// Session as it was at shutdown.
    final_session: Option<SessionInfo>,
    handshake_thread: Option<thread::JoinHandle<()>>,
    command_thread: Option<thread::JoinHandle<()>>,
}

impl StreamServer {
    /// Bind all sockets, hook the audio path into `provider` and start both workers.
    pub fn start(config: &StreamConfig, mut provider: Box<dyn CaptureProvider>) -> Result<Self, StreamError> {
        config.validate().map_err(StreamError::Configuration)?;
        let key = SymmetricKey::from_pairing_secret(&config.pair_code)?;

        let control_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port))
            .map_err(StreamError::transport("bind control socket"))?;
        let command_socket =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(StreamError::transport("bind command socket"))?;
        let audio_socket = Arc::new(
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(StreamError::transport("bind audio socket"))?,
        );

        let control_addr = control_socket
            .local_addr()
            .map_err(StreamError::transport("control socket address"))?;
        let command_port = command_socket
            .local_addr()
            .map_err(StreamError::transport("command socket address"))?
            .port();

        provider.set_audio_ready_callback(audio_callback(&key, Arc::clone(&audio_socket)));

        let shared = Arc::new(Shared {
            key,
            format: config.format,
            running: AtomicBool::new(true),
            capture: Mutex::new(CaptureSlot {
                provider,
                session: None,
            }),
            control_socket,
            command_socket,
            command_port,
            audio_socket,
        });

        let mut server = Self {
            shared: Some(Arc::clone(&shared)),
            control_addr,
            command_port,
            final_session: None,
            handshake_thread: None,
            command_thread: None,
        };

        let worker = Arc::clone(&shared);
        server.handshake_thread = Some(
            thread::Builder::new()
                .name("handshake-receiver".into())
                .spawn(move || handshake_loop(&worker))
                .map_err(StreamError::transport("spawn handshake thread"))?,
        );

        server.command_thread = Some(
            thread::Builder::new()
                .name("command-receiver".into())
                .spawn(move || command_loop(&shared))
                .map_err(StreamError::transport("spawn command thread"))?,
        );

        log::info!(
            "stream server listening on {} (command port {}, format {})",
            control_addr,
            command_port,
            config.format
        );
        Ok(server)
    }

    /// Local address of the handshake listener.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// OS-assigned port of the command socket, as published in handshake responses.
    pub fn command_port(&self) -> u16 {
        self.command_port
    }

    /// The currently paired client, if any.
    pub fn session(&self) -> Option<SessionInfo> {
        match &self.shared {
            Some(shared) => shared.capture.lock().session.clone(),
            None => self.final_session.clone(),
        }
    }

    /// False once shutdown began or either worker loop has exited.
    pub fn is_running(&self) -> bool {
        self.shared
            .as_ref()
            .map_or(false, |shared| shared.running.load(Ordering::SeqCst))
    }

    /// Stop capture, wake both workers, wait for them to exit and close the
    /// sockets. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        {
            let mut capture = shared.capture.lock();
            capture.provider.stop_sync();
            if let Some(session) = capture.session.as_mut() {
                session.state = SessionState::Stopped;
            }
            self.final_session = capture.session.clone();
        }

        shared.running.store(false, Ordering::SeqCst);
        wake(self.control_addr.port());
        wake(self.command_port);

        for handle in [self.handshake_thread.take(), self.command_thread.take()].into_iter().flatten() {
            if handle.join().is_err() {
                log::error!("stream server worker panicked");
            }
        }

        // Last reference: drops the provider, its audio callback and every socket.
        drop(shared);
        log::info!("stream server stopped");
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the readiness callback that encrypts and sends each captured chunk.
///
/// The callback owns the audio-path framer and its scratch buffer; nothing
/// else locks them.
fn audio_callback(key: &SymmetricKey, socket: Arc<UdpSocket>) -> AudioReadyCallback {
    struct AudioPath {
        framer: PacketFramer,
        scratch: Vec<u8>,
    }

    let path = Mutex::new(AudioPath {
        framer: PacketFramer::new(key),
        scratch: vec![0u8; MAX_DATAGRAM_LEN],
    });

    Arc::new(move |chunk: &[u8]| {
        let mut path = path.lock();
        let AudioPath { framer, scratch } = &mut *path;

        let len = match framer.encode_into(chunk, scratch) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("dropping audio chunk of {} bytes: {}", chunk.len(), e);
                return;
            }
        };
        if let Err(e) = socket.send(&scratch[..len]) {
            log::debug!("audio send failed: {}", e);
        }
    })
}

fn handshake_loop(shared: &Shared) {
    let mut framer = PacketFramer::new(&shared.key);
    receive_loop(shared, &shared.control_socket, "handshake", |datagram, from| {
        handle_handshake(shared, &mut framer, datagram, from)
    });
}

fn command_loop(shared: &Shared) {
    let mut framer = PacketFramer::new(&shared.key);
    receive_loop(shared, &shared.command_socket, "command", |datagram, from| {
        handle_command(shared, &mut framer, datagram, from)
    });
}

/// Receive datagrams until shutdown or a receive failure.
///
/// Per-datagram errors are logged and never end the loop.
fn receive_loop(
    shared: &Shared,
    socket: &UdpSocket,
    role: &str,
    mut handle: impl FnMut(&mut [u8], SocketAddr) -> Result<(), StreamError>,
) {
    let _exit = StopOnExit(&shared.running);
    let mut buf = vec![0u8; RECV_BUF_LEN];
    loop {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            // ICMP port-unreachable from an earlier send, reported by some platforms.
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                log::debug!("{} socket: {}", role, e);
                continue;
            }
            Err(e) if is_oversized_datagram(&e) => {
                log::warn!("discarding oversized {} datagram: {}", role, e);
                continue;
            }
            Err(e) => {
                if shared.running.swap(false, Ordering::SeqCst) {
                    log::error!("{} receive failed, stopping: {}", role, e);
                }
                return;
            }
        };

        if !shared.running.load(Ordering::SeqCst) {
            log::debug!("{} receiver exiting", role);
            return;
        }

        match handle(&mut buf[..len], from) {
            Ok(()) => {}
            Err(StreamError::Decode(e)) => log::warn!("discarding {} datagram from {}: {}", role, from, e),
            Err(e) => log::error!("{} from {} failed: {}", role, from, e),
        }
    }
}

/// Marks the server stopped when a worker loop ends, including by panic.
struct StopOnExit<'a>(&'a AtomicBool);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        if self.0.swap(false, Ordering::SeqCst) && thread::panicking() {
            log::error!("{} panicked, stopping", thread::current().name().unwrap_or("worker"));
        }
    }
}

#[cfg(windows)]
fn is_oversized_datagram(e: &io::Error) -> bool {
    e.raw_os_error() == Some(MESSAGE_TOO_LONG)
}

#[cfg(not(windows))]
fn is_oversized_datagram(_e: &io::Error) -> bool {
    false
}

/// Narrow a negotiated value into its `i32` wire field.
fn wire_field(value: u32, what: &str) -> Result<i32, StreamError> {
    i32::try_from(value).map_err(|_| {
        StreamError::Device(CaptureError::InvalidFormat(format!(
            "{} {} does not fit the handshake record",
            what, value
        )))
    })
}

fn handle_handshake(
    shared: &Shared,
    framer: &mut PacketFramer,
    datagram: &mut [u8],
    from: SocketAddr,
) -> Result<(), StreamError> {
    let request = StreamSettings::decode(framer.decode_in_place(datagram)?)?;
    let client_port = request.client_audio_port()?;

    let mut capture = shared.capture.lock();
    capture.provider.stop_sync();
    if let Some(previous) = capture.session.take() {
        log::info!("ending session {} with {}", previous.id, previous.client);
    }

    capture.provider.initialize_device(&shared.format)?;

    let provider = &capture.provider;
    let audio_format = provider.audio_format();
    let response = StreamSettings {
        client_port: request.client_port,
        audio_format: audio_format.wire_code(),
        bits_per_sample: i32::from(provider.bits_per_sample()),
        channel_count: i32::from(provider.channel_count()),
        sample_rate: wire_field(provider.sample_rate(), "sample rate")?,
        engine_period: wire_field(provider.engine_period(), "engine period")?,
        command_port: i32::from(shared.command_port),
    };
    let packet = framer.encode(&response.encode())?;
    shared.control_socket.send_to(&packet, from).map_err(StreamError::Send)?;

    let client = SocketAddr::new(from.ip(), client_port);
    shared
        .audio_socket
        .connect(client)
        .map_err(StreamError::transport("connect audio socket"))?;
    capture.provider.start_async()?;

    let session = SessionInfo::new(client);
    log::info!(
        "session {} streaming to {} ({} {}-bit, {} ch, {} Hz, period {})",
        session.id,
        client,
        audio_format,
        response.bits_per_sample,
        response.channel_count,
        response.sample_rate,
        response.engine_period
    );
    capture.session = Some(session);
    Ok(())
}

fn handle_command(
    shared: &Shared,
    framer: &mut PacketFramer,
    datagram: &mut [u8],
    from: SocketAddr,
) -> Result<(), StreamError> {
    let command = Command::decode(framer.decode_in_place(datagram)?)?;
    log::debug!("command {:?} from {}", command, from);

    {
        let mut capture = shared.capture.lock();
        let CaptureSlot { provider, session } = &mut *capture;
        let live = session.as_mut().filter(|s| !s.state.is_stopped());
        match command {
            Command::Ping => {}
            Command::Play => {
                provider.set_playback_state(true);
                if let Some(session) = live {
                    session.state = SessionState::Streaming;
                }
            }
            Command::Pause => {
                provider.set_playback_state(false);
                if let Some(session) = live {
                    session.state = SessionState::Paused;
                }
            }
            Command::Stop => {
                provider.stop_async();
                if let Some(session) = live {
                    session.state = SessionState::Stopped;
                }
            }
        }
    }

    let ack = framer.encode(&command.encode())?;
    if let Err(e) = shared.command_socket.send_to(&ack, from) {
        log::warn!("command ack to {} failed, stopping capture: {}", from, e);
        let mut capture = shared.capture.lock();
        capture.provider.stop_async();
        if let Some(session) = capture.session.as_mut() {
            session.state = SessionState::Stopped;
        }
    }
    Ok(())
}

/// Unblock a receiver bound to `port` with a zero-length datagram.
fn wake(port: u16) {
    let result = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|socket| socket.send_to(&[], (Ipv4Addr::LOCALHOST, port)));
    if let Err(e) = result {
        log::warn!("failed to wake receiver on port {}: {}", port, e);
    }
}
