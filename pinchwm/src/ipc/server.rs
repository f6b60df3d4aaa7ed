//! IPC server: Unix socket listener, per-client connections and the
//! length-prefixed frame codec.
//!
//! Every frame is a 4-byte big-endian payload length followed by one
//! UTF-8 s-expression.  Clients are serviced from the event loop between
//! engine ticks; nothing here touches the engine except through
//! `dispatch::handle_message`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::dispatch;
use crate::state::PinchState;

/// Largest accepted frame payload (1 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 1 << 20;

/// Pending outbound bytes past which broadcast events are dropped.
const EVENT_BACKLOG_LIMIT: usize = 256 * 1024;

const DEFAULT_RATE_LIMIT: u32 = 200;

const RATE_WINDOW: Duration = Duration::from_secs(1);

const LENGTH_PREFIX: usize = 4;

const READ_CHUNK: usize = 4096;

/// Why a client connection is torn down.
#[derive(Debug, Error)]
pub enum Disconnect {
    #[error("peer closed the connection")]
    Eof,
    #[error("frame of {len} bytes exceeds the 1 MiB limit")]
    Oversize { len: u32 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Append one length-prefixed frame to `out`.
pub fn encode_frame(payload: &str, out: &mut Vec<u8>) {
    let bytes = payload.as_bytes();
    out.reserve(LENGTH_PREFIX + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Incremental decoder over a byte stream of length-prefixed frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Pop the next complete frame, `Ok(None)` if more bytes are needed.
    /// An oversize header discards everything buffered.
    pub fn next_frame(&mut self) -> Result<Option<String>, Disconnect> {
        let Some(header) = self.pending.get(..LENGTH_PREFIX) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if len > MAX_MESSAGE_SIZE {
            self.pending.clear();
            return Err(Disconnect::Oversize { len });
        }
        let end = LENGTH_PREFIX + len as usize;
        if self.pending.len() < end {
            return Ok(None);
        }
        let body = &self.pending[LENGTH_PREFIX..end];
        let payload = match std::str::from_utf8(body) {
            Ok(text) => text.to_owned(),
            Err(e) => {
                warn!(
                    len,
                    valid_up_to = e.valid_up_to(),
                    "IPC frame is not valid UTF-8, replacing bad bytes"
                );
                String::from_utf8_lossy(body).into_owned()
            }
        };
        self.pending.drain(..end);
        Ok(Some(payload))
    }
}

/// Fixed-window message budget for one client.
#[derive(Debug)]
pub struct RateLimiter {
    window_start: Instant,
    used: u32,
    pub max_per_second: u32,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            used: 0,
            max_per_second,
        }
    }

    /// Count one message; false once the current window's budget is spent.
    pub fn check(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= RATE_WINDOW {
            self.window_start = now;
            self.used = 0;
        }
        self.used = self.used.saturating_add(1);
        self.used <= self.max_per_second
    }
}

/// Credentials of the process on the other end of a Unix socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCred {
    pub uid: u32,
    pub pid: i32,
}

#[cfg(target_os = "linux")]
fn peer_cred(stream: &UnixStream) -> io::Result<PeerCred> {
    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    // SAFETY: `cred` and `len` are valid for writes and sized for SO_PEERCRED.
    let ret = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(PeerCred {
        uid: cred.uid,
        pid: cred.pid,
    })
}

#[cfg(not(target_os = "linux"))]
fn peer_cred(stream: &UnixStream) -> io::Result<PeerCred> {
    let _ = stream.as_raw_fd();
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_PEERCRED is Linux-only",
    ))
}

/// One connected (or, in tests, detached) IPC peer.
#[derive(Debug)]
pub struct IpcClient {
    pub id: u64,
    stream: Option<UnixStream>,
    decoder: FrameDecoder,
    pub write_buf: Vec<u8>,
    /// Set by a successful `hello`.
    pub authenticated: bool,
    pub peer_uid: Option<u32>,
    pub peer_pid: Option<i32>,
    pub rate_limiter: RateLimiter,
    pub dropped_events: u64,
}

impl IpcClient {
    fn connect(stream: UnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let mut client = Self::detached(0);
        match peer_cred(&stream) {
            Ok(cred) => {
                client.peer_uid = Some(cred.uid);
                client.peer_pid = Some(cred.pid);
            }
            Err(e) => warn!("peer credentials unavailable: {}", e),
        }
        client.stream = Some(stream);
        Ok(client)
    }

    /// A client with no socket behind it.
    pub fn detached(id: u64) -> Self {
        Self {
            id,
            stream: None,
            decoder: FrameDecoder::default(),
            write_buf: Vec::new(),
            authenticated: false,
            peer_uid: None,
            peer_pid: None,
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
            dropped_events: 0,
        }
    }

    /// Queue a reply.  Replies are never dropped.
    pub fn enqueue_message(&mut self, payload: &str) {
        encode_frame(payload, &mut self.write_buf);
    }

    /// Queue a broadcast event unless the peer has fallen too far behind.
    pub fn enqueue_event(&mut self, payload: &str) {
        if self.write_buf.len() <= EVENT_BACKLOG_LIMIT {
            self.enqueue_message(payload);
            return;
        }
        self.dropped_events += 1;
        // Log at 1, 2, 4, 8... drops.
        if self.dropped_events.is_power_of_two() {
            warn!(
                client_id = self.id,
                dropped = self.dropped_events,
                backlog = self.write_buf.len(),
                "slow IPC client, dropping events"
            );
        }
    }

    /// Feed raw bytes as if they had arrived on the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.decoder.push(bytes);
    }

    /// Read what the socket has ready and split it into frames.  Frames
    /// decoded before a fatal condition are returned alongside it.
    pub fn receive(&mut self) -> (Vec<String>, Option<Disconnect>) {
        let mut fatal = self.fill().err();
        let mut frames = Vec::new();
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }
        (frames, fatal)
    }

    fn fill(&mut self) -> Result<(), Disconnect> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Err(Disconnect::Eof),
                Ok(n) => self.decoder.push(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write as much of the outbound buffer as the socket takes.
    pub fn flush_writes(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let mut written = 0;
        while written < self.write_buf.len() {
            match stream.write(&self.write_buf[written..]) {
                Ok(0) => {
                    self.write_buf.drain(..written);
                    return Err(io::ErrorKind::WriteZero.into());
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.write_buf.drain(..written);
                    return Err(e);
                }
            }
        }
        self.write_buf.drain(..written);
        Ok(())
    }
}

/// Listener socket path plus every live client, keyed by id.
#[derive(Debug)]
pub struct IpcServer {
    pub socket_path: PathBuf,
    pub clients: HashMap<u64, IpcClient>,
    next_client_id: u64,
    /// Log every inbound and outbound message.
    pub ipc_trace: bool,
}

impl IpcServer {
    /// Does not bind; see `bind`.
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            clients: HashMap::new(),
            next_client_id: 1,
            ipc_trace: false,
        }
    }

    /// `$XDG_RUNTIME_DIR/pinchwm-ipc.sock`, or a per-user directory under
    /// `/tmp` when the runtime dir is unset.
    pub fn default_socket_path() -> PathBuf {
        let dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                // SAFETY: getuid has no preconditions and cannot fail.
                let uid = unsafe { libc::getuid() };
                PathBuf::from(format!("/tmp/pinchwm-{uid}"))
            });
        dir.join("pinchwm-ipc.sock")
    }

    /// Register a client under a fresh id and return it.
    pub fn add_client(&mut self, mut client: IpcClient) -> u64 {
        let id = self.next_client_id;
        self.next_client_id += 1;
        client.id = id;
        self.clients.insert(id, client);
        id
    }

    pub fn authenticated_count(&self) -> usize {
        self.clients.values().filter(|c| c.authenticated).count()
    }

    /// Create the socket (owner-only) and register the listener with calloop.
    pub fn bind(
        socket_path: &Path,
        loop_handle: &LoopHandle<'static, PinchState>,
    ) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(socket_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let listener = UnixListener::bind(socket_path)?;
        listener.set_nonblocking(true)?;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700))?;

        loop_handle
            .insert_source(
                Generic::new(listener, Interest::READ, Mode::Level),
                |_, listener, state| {
                    state.ipc_server.accept_pending(listener);
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|e| anyhow::anyhow!("failed to register IPC listener: {:?}", e))?;

        info!(path = %socket_path.display(), "IPC socket ready");
        Ok(())
    }

    fn accept_pending(&mut self, listener: &UnixListener) {
        loop {
            let stream = match listener.accept() {
                Ok((stream, _)) => stream,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    error!("IPC accept failed: {}", e);
                    return;
                }
            };
            match IpcClient::connect(stream) {
                Ok(client) => {
                    let peer_uid = client.peer_uid;
                    let peer_pid = client.peer_pid;
                    let client_id = self.add_client(client);
                    info!(client_id, ?peer_uid, ?peer_pid, "IPC client connected");
                }
                Err(e) => warn!("rejecting IPC connection: {}", e),
            }
        }
    }

    /// Service every client once: read, dispatch, write.  Clients that
    /// closed, errored or sent an oversize frame are removed.
    pub fn poll_clients(state: &mut PinchState) {
        let ids: Vec<u64> = state.ipc_server.clients.keys().copied().collect();
        for client_id in ids {
            if let Err(reason) = Self::service(state, client_id) {
                match reason {
                    Disconnect::Eof => info!(client_id, "IPC client disconnected"),
                    ref other => warn!(client_id, "dropping IPC client: {}", other),
                }
                state.ipc_server.clients.remove(&client_id);
            }
        }
    }

    fn service(state: &mut PinchState, client_id: u64) -> Result<(), Disconnect> {
        let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
            return Ok(());
        };
        let (frames, fatal) = client.receive();

        for frame in frames {
            let reply = Self::handle_client_message(state, client_id, &frame);
            if let (Some(reply), Some(client)) =
                (reply, state.ipc_server.clients.get_mut(&client_id))
            {
                client.enqueue_message(&reply);
            }
        }

        if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
            client.flush_writes()?;
        }
        fatal.map_or(Ok(()), Err)
    }

    /// Apply the client's rate limit, then dispatch one frame.
    pub fn handle_client_message(
        state: &mut PinchState,
        client_id: u64,
        msg: &str,
    ) -> Option<String> {
        let within_budget = match state.ipc_server.clients.get_mut(&client_id) {
            Some(client) => client.rate_limiter.check(),
            None => return None,
        };
        if !within_budget {
            debug!(client_id, "IPC rate limit hit");
            return Some(dispatch::error_response(0, "rate limit exceeded"));
        }

        let trace = state.ipc_server.ipc_trace;
        if trace {
            info!(client_id, "ipc <- {}", msg);
        }
        let reply = dispatch::handle_message(state, client_id, msg);
        if let (true, Some(reply)) = (trace, reply.as_deref()) {
            info!(client_id, "ipc -> {}", reply);
        }
        reply
    }

    /// Queue an event for every client that completed `hello`.
    pub fn broadcast_event(&mut self, event: &str) {
        if self.ipc_trace {
            info!("ipc event -> {}", event);
        }
        self.clients
            .values_mut()
            .filter(|c| c.authenticated)
            .for_each(|c| c.enqueue_event(event));
    }

    /// Flush pending writes for every client, dropping the ones that fail.
    pub fn flush_all(&mut self) {
        self.clients.retain(|&client_id, client| match client.flush_writes() {
            Ok(()) => true,
            Err(e) => {
                debug!(client_id, "IPC write failed: {}", e);
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &str) -> Vec<u8> {
        let mut out = Vec::new();
        encode_frame(payload, &mut out);
        out
    }

    #[test]
    fn test_decoder_handles_split_frames() {
        let mut decoder = FrameDecoder::default();
        let first = framed("(:type :ping)");
        let second = framed("(:type :hello :version 1)");
        decoder.push(&first);
        decoder.push(&second[..6]);

        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some("(:type :ping)"));
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.buffered(), 6);

        decoder.push(&second[6..]);
        assert_eq!(
            decoder.next_frame().unwrap().as_deref(),
            Some("(:type :hello :version 1)")
        );
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_replaces_invalid_utf8() {
        let mut decoder = FrameDecoder::default();
        decoder.push(&3u32.to_be_bytes());
        decoder.push(&[b'(', 0xff, b')']);
        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some("(\u{fffd})"));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversize_frame_is_fatal() {
        let mut client = IpcClient::detached(1);
        let mut bytes = framed("(:type :ping)");
        bytes.extend_from_slice(&(MAX_MESSAGE_SIZE + 1).to_be_bytes());
        client.feed(&bytes);

        let (frames, fatal) = client.receive();
        assert_eq!(frames, vec!["(:type :ping)".to_string()]);
        assert!(matches!(
            fatal,
            Some(Disconnect::Oversize { len }) if len == MAX_MESSAGE_SIZE + 1
        ));
    }

    #[test]
    fn test_enqueue_message_framing() {
        let mut client = IpcClient::detached(1);
        client.enqueue_message("(:ok)");
        assert_eq!(&client.write_buf[..4], &5u32.to_be_bytes());
        assert_eq!(&client.write_buf[4..], b"(:ok)");
    }

    #[test]
    fn test_event_backpressure_spares_replies() {
        let mut client = IpcClient::detached(1);
        client.write_buf = vec![0; EVENT_BACKLOG_LIMIT + 1];
        client.enqueue_event("(:type :event)");
        assert_eq!(client.write_buf.len(), EVENT_BACKLOG_LIMIT + 1);
        assert_eq!(client.dropped_events, 1);

        client.enqueue_message("(:ok)");
        assert_eq!(client.write_buf.len(), EVENT_BACKLOG_LIMIT + 1 + 4 + 5);
    }

    #[test]
    fn test_rate_limiter_window() {
        let mut limiter = RateLimiter::new(3);
        let t0 = limiter.window_start;
        assert!(limiter.allow_at(t0));
        assert!(limiter.allow_at(t0));
        assert!(limiter.allow_at(t0));
        assert!(!limiter.allow_at(t0 + Duration::from_millis(500)));
        assert!(limiter.allow_at(t0 + RATE_WINDOW));
    }

    #[test]
    fn test_broadcast_only_to_authenticated() {
        let mut server = IpcServer::new(PathBuf::from("/tmp/unused.sock"));
        let anon = server.add_client(IpcClient::detached(0));
        let mut authed = IpcClient::detached(0);
        authed.authenticated = true;
        let authed = server.add_client(authed);
        assert_ne!(anon, authed);

        server.broadcast_event("(:type :event :event :camera-denied)");
        assert!(server.clients[&anon].write_buf.is_empty());
        assert!(!server.clients[&authed].write_buf.is_empty());
        assert_eq!(server.authenticated_count(), 1);
    }

    #[test]
    fn test_flush_all_keeps_detached_clients() {
        let mut server = IpcServer::new(PathBuf::from("/tmp/unused.sock"));
        let id = server.add_client(IpcClient::detached(0));
        server.flush_all();
        assert!(server.clients.contains_key(&id));
    }
}
