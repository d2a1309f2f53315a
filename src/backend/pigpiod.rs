//! pigpio daemon backend
//!
//! Talks to `pigpiod` over its socket interface. Two connections are used:
//!
//! ```text
//! ┌──────────────┐  MODES / PUD / BR1 / NB / NC   ┌──────────┐
//! │ control conn │ ─────────────────────────────► │          │
//! └──────────────┘   16-byte frames, 16-byte reply│ pigpiod  │
//! ┌──────────────┐  NOIB, then a stream of        │          │
//! │ notify conn  │ ◄───────────────────────────── │          │
//! └──────────────┘   12-byte level reports        └──────────┘
//!        │
//!        ▼ reader thread: ReportDecoder → EdgeHandler
//! ```
//!
//! Every report carries the full bank-1 level bitmask and the daemon's
//! 32-bit microsecond tick. Transitions for the watched pin are recovered by
//! diffing consecutive bitmasks.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Edge, EdgeEvent, EdgeHandler, EdgeWatch, GpioBackend, WatchHandle};
use crate::error::{CaptureError, Result};
use crate::pin::{Level, Pin, PinMode, Pull};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Socket command codes used by this client
pub mod cmd {
    pub const MODES: u32 = 0;
    pub const PUD: u32 = 2;
    pub const BR1: u32 = 10;
    pub const NB: u32 = 19;
    pub const NC: u32 = 21;
    pub const NOIB: u32 = 99;
}

pub const NTFY_FLAGS_EVENT: u16 = 1 << 7;
pub const NTFY_FLAGS_ALIVE: u16 = 1 << 6;
pub const NTFY_FLAGS_WDOG: u16 = 1 << 5;
pub const NTFY_FLAGS_GPIO: u16 = 0x1f;

pub const COMMAND_LEN: usize = 16;
pub const REPORT_LEN: usize = 12;

/// Where to find the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PigpiodConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl Default for PigpiodConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl PigpiodConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build a command frame: `cmd, p1, p2, p3` as little-endian u32 (p3 unused)
pub fn encode_command(cmd: u32, p1: u32, p2: u32) -> [u8; COMMAND_LEN] {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0..4].copy_from_slice(&cmd.to_le_bytes());
    frame[4..8].copy_from_slice(&p1.to_le_bytes());
    frame[8..12].copy_from_slice(&p2.to_le_bytes());
    frame
}

/// Signed result carried in the last word of a reply; negative is a pigpio error code
pub fn decode_reply(reply: &[u8; COMMAND_LEN]) -> i32 {
    i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]])
}

fn exchange(stream: &mut TcpStream, cmd: u32, p1: u32, p2: u32) -> io::Result<i32> {
    stream.write_all(&encode_command(cmd, p1, p2))?;
    let mut reply = [0u8; COMMAND_LEN];
    stream.read_exact(&mut reply)?;
    Ok(decode_reply(&reply))
}

fn checked(command: &'static str, res: i32) -> Result<u32> {
    if res < 0 {
        return Err(CaptureError::Backend { command, code: res });
    }
    Ok(res as u32)
}

/// One notification report as sent by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub seqno: u16,
    pub flags: u16,
    pub tick: u32,
    pub level: u32,
}

impl Report {
    pub fn decode(buf: &[u8; REPORT_LEN]) -> Self {
        Self {
            seqno: u16::from_le_bytes([buf[0], buf[1]]),
            flags: u16::from_le_bytes([buf[2], buf[3]]),
            tick: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            level: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }

    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[0..2].copy_from_slice(&self.seqno.to_le_bytes());
        buf[2..4].copy_from_slice(&self.flags.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tick.to_le_bytes());
        buf[8..12].copy_from_slice(&self.level.to_le_bytes());
        buf
    }
}

/// Turns the bank-wide report stream into events for a single pin
#[derive(Debug, Clone)]
pub struct ReportDecoder {
    pin: Pin,
    edge: Edge,
    last_level: u32,
}

impl ReportDecoder {
    /// `initial_level` is the bank bitmask read just before notifications start
    pub fn new(pin: Pin, edge: Edge, initial_level: u32) -> Self {
        Self {
            pin,
            edge,
            last_level: initial_level,
        }
    }

    pub fn feed(&mut self, report: &Report) -> Option<EdgeEvent> {
        if report.flags == 0 {
            let changed = (report.level ^ self.last_level) & self.pin.mask();
            self.last_level = report.level;
            if changed == 0 {
                return None;
            }
            let level = Level::from_bit(report.level & self.pin.mask() != 0);
            return self
                .edge
                .matches(level)
                .then(|| EdgeEvent::edge(level, report.tick));
        }

        if report.flags & NTFY_FLAGS_WDOG != 0 {
            let gpio = (report.flags & NTFY_FLAGS_GPIO) as u8;
            return (gpio == self.pin.number()).then(|| EdgeEvent::watchdog(report.tick));
        }

        // keep-alive and custom event reports carry no level information
        None
    }
}

struct Control {
    addr: String,
    sockaddrs: Vec<SocketAddr>,
    connect_timeout: Duration,
    stream: Mutex<TcpStream>,
}

impl Control {
    fn command(&self, name: &'static str, cmd: u32, p1: u32, p2: u32) -> Result<u32> {
        checked(name, self.command_raw(cmd, p1, p2)? as i32)
    }

    /// Send a command whose reply is a plain 32-bit word, never an error code
    fn command_raw(&self, cmd: u32, p1: u32, p2: u32) -> Result<u32> {
        let mut stream = self.stream.lock().unwrap_or_else(|p| p.into_inner());
        Ok(exchange(&mut stream, cmd, p1, p2)? as u32)
    }

    fn open(&self) -> Result<TcpStream> {
        open_stream(&self.addr, &self.sockaddrs, self.connect_timeout)
    }
}

fn open_stream(addr: &str, sockaddrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream> {
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
    for sockaddr in sockaddrs {
        match TcpStream::connect_timeout(sockaddr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = e,
        }
    }
    Err(CaptureError::BackendUnavailable {
        addr: addr.to_string(),
        source: last_err,
    })
}

/// Connection to a running pigpio daemon
pub struct PigpiodClient {
    control: Arc<Control>,
}

impl PigpiodClient {
    /// Connect the control channel; fails with `BackendUnavailable` if the
    /// daemon is not listening
    pub fn connect(config: &PigpiodConfig) -> Result<Self> {
        let addr = config.address();
        let sockaddrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|source| CaptureError::BackendUnavailable {
                addr: addr.clone(),
                source,
            })?
            .collect();

        let stream = open_stream(&addr, &sockaddrs, config.connect_timeout)?;
        tracing::debug!("Connected to pigpio daemon at {}", addr);

        Ok(Self {
            control: Arc::new(Control {
                addr,
                sockaddrs,
                connect_timeout: config.connect_timeout,
                stream: Mutex::new(stream),
            }),
        })
    }

    pub fn address(&self) -> &str {
        &self.control.addr
    }

    /// Current levels of GPIO 0-31 as a bitmask
    ///
    /// The reply is the raw bank word; GPIO 31 high sets the sign bit.
    pub fn read_bank1(&self) -> Result<u32> {
        self.control.command_raw(cmd::BR1, 0, 0)
    }
}

impl std::fmt::Debug for PigpiodClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PigpiodClient")
            .field("addr", &self.control.addr)
            .finish()
    }
}

impl GpioBackend for PigpiodClient {
    fn set_mode(&self, pin: Pin, mode: PinMode) -> Result<()> {
        self.control
            .command("MODES", cmd::MODES, pin.into(), mode.code())
            .map(|_| ())
    }

    fn set_pull(&self, pin: Pin, pull: Pull) -> Result<()> {
        self.control
            .command("PUD", cmd::PUD, pin.into(), pull.code())
            .map(|_| ())
    }

    fn watch(&self, pin: Pin, edge: Edge, handler: EdgeHandler) -> Result<EdgeWatch> {
        let mut notify = self.control.open()?;
        let handle = checked("NOIB", exchange(&mut notify, cmd::NOIB, 0, 0)?)?;
        let initial_level = self.read_bank1()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let fault = Arc::new(Mutex::new(None));
        let reader = {
            let stream = notify.try_clone()?;
            let decoder = ReportDecoder::new(pin, edge, initial_level);
            let shutdown = Arc::clone(&shutdown);
            let fault = Arc::clone(&fault);
            thread::Builder::new()
                .name(format!("pigpio-notify-{}", pin))
                .spawn(move || read_reports(stream, decoder, handler, shutdown, fault))?
        };

        let mut watch = PigpiodWatch {
            handle,
            control: Arc::clone(&self.control),
            stream: notify,
            shutdown,
            fault,
            reader: Some(reader),
        };

        if let Err(e) = self.control.command("NB", cmd::NB, handle, pin.mask()) {
            let _ = watch.cancel();
            return Err(e);
        }

        tracing::debug!(
            "Watching GPIO {} via notification handle {} (initial level {:#010x})",
            pin,
            handle,
            initial_level
        );
        Ok(EdgeWatch::new(pin, Box::new(watch)))
    }
}

fn read_reports(
    stream: TcpStream,
    mut decoder: ReportDecoder,
    handler: EdgeHandler,
    shutdown: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = [0u8; REPORT_LEN];
    loop {
        if let Err(e) = reader.read_exact(&mut buf) {
            if !shutdown.load(Ordering::Acquire) {
                tracing::warn!("pigpio notification stream ended: {}", e);
                *fault.lock().unwrap_or_else(|p| p.into_inner()) = Some(e.to_string());
            }
            return;
        }
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        if let Some(event) = decoder.feed(&Report::decode(&buf)) {
            handler(event);
        }
    }
}

struct PigpiodWatch {
    handle: u32,
    control: Arc<Control>,
    stream: TcpStream,
    shutdown: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
    reader: Option<JoinHandle<()>>,
}

impl WatchHandle for PigpiodWatch {
    fn cancel(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        let closed = self.control.command("NC", cmd::NC, self.handle, 0);
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::warn!("pigpio notification reader panicked");
            }
        }
        closed.map(|_| ())
    }

    fn health(&self) -> Result<()> {
        match self.fault.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            Some(reason) => Err(CaptureError::StreamClosed(reason.clone())),
            None => Ok(()),
        }
    }
}
