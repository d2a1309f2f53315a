// Integration test utilities
//
// An in-process stand-in for pigpiod speaking the socket protocol, so the
// real client can be exercised without a Raspberry Pi.

#![allow(dead_code)]

use irrecord::backend::pigpiod::{cmd, Report, COMMAND_LEN};
use irrecord::backend::sim::pulse_train;
use irrecord::backend::EdgeLevel;
use irrecord::pin::{Level, Pin};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct DaemonState {
    commands: Vec<(u32, u32, u32)>,
    notify: HashMap<u32, TcpStream>,
    next_handle: u32,
    bank_level: u32,
    script: Vec<Report>,
    rejections: HashMap<u32, i32>,
}

/// Fake pigpio daemon on an ephemeral localhost port
///
/// Every NB (notify begin) replays `script` on the notification connection
/// it names, so each capture sees the same burst.
pub struct FakeDaemon {
    port: u16,
    state: Arc<Mutex<DaemonState>>,
}

impl FakeDaemon {
    pub fn start(bank_level: u32, script: Vec<Report>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake daemon");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(DaemonState {
            bank_level,
            script,
            ..DaemonState::default()
        }));

        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let state = Arc::clone(&accept_state);
                thread::spawn(move || serve(conn, state));
            }
        });

        Self { port, state }
    }

    /// Daemon that never reports a transition
    pub fn silent(bank_level: u32) -> Self {
        Self::start(bank_level, Vec::new())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Answer `command` with a pigpio error code from now on
    pub fn reject(&self, command: u32, code: i32) {
        self.state.lock().unwrap().rejections.insert(command, code);
    }

    pub fn commands(&self) -> Vec<(u32, u32, u32)> {
        self.state.lock().unwrap().commands.clone()
    }

    /// `(p1, p2)` of every received `command`
    pub fn sent(&self, command: u32) -> Vec<(u32, u32)> {
        self.commands()
            .into_iter()
            .filter(|(c, _, _)| *c == command)
            .map(|(_, p1, p2)| (p1, p2))
            .collect()
    }

    pub fn open_notifications(&self) -> usize {
        self.state.lock().unwrap().notify.len()
    }

    /// Wait until at least one notification connection is open
    pub fn wait_for_notifications(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.open_notifications() > 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// Close every notification connection as if the daemon died
    pub fn drop_notifications(&self) {
        let mut state = self.state.lock().unwrap();
        for (_, stream) in state.notify.drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

fn serve(mut conn: TcpStream, state: Arc<Mutex<DaemonState>>) {
    let mut frame = [0u8; COMMAND_LEN];
    while conn.read_exact(&mut frame).is_ok() {
        let word = |i: usize| {
            let at = i * 4;
            u32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
        };
        let (command, p1, p2) = (word(0), word(1), word(2));

        let mut st = state.lock().unwrap();
        st.commands.push((command, p1, p2));

        let res: i32 = match st.rejections.get(&command) {
            Some(code) => *code,
            None => match command {
                cmd::NOIB => {
                    let handle = st.next_handle;
                    st.next_handle += 1;
                    st.notify.insert(handle, conn.try_clone().unwrap());
                    handle as i32
                }
                cmd::BR1 => st.bank_level as i32,
                _ => 0,
            },
        };

        let mut reply = frame;
        reply[12..16].copy_from_slice(&res.to_le_bytes());
        if conn.write_all(&reply).is_err() {
            return;
        }

        if res < 0 {
            continue;
        }
        match command {
            cmd::NB => {
                let script: Vec<u8> = st.script.iter().flat_map(|r| r.encode()).collect();
                if let Some(stream) = st.notify.get_mut(&p1) {
                    let _ = stream.write_all(&script);
                }
            }
            cmd::NC => {
                if let Some(stream) = st.notify.remove(&p1) {
                    let _ = stream.shutdown(Shutdown::Both);
                }
            }
            _ => {}
        }
    }
}

/// Level reports for a burst on `pin`, starting with the line dropping low
///
/// Other-pin noise, keep-alives and a watchdog report for the pin are mixed
/// in; none of them may produce a duration.
pub fn burst_reports(pin: Pin, start_tick: u32, durations: &[u32]) -> Vec<Report> {
    let noise = 1 << 4;
    let mut reports = Vec::new();
    let mut seqno = 0u16;
    let mut next = |flags: u16, tick: u32, level: u32| {
        let report = Report {
            seqno,
            flags,
            tick,
            level,
        };
        seqno = seqno.wrapping_add(1);
        report
    };

    let train = pulse_train(Level::Low, start_tick, durations);
    for (i, event) in train.into_iter().enumerate() {
        let pin_bits = match event.level {
            EdgeLevel::High => pin.mask(),
            _ => 0,
        };
        reports.push(next(0, event.tick, pin_bits));
        if i == 1 {
            // another pin toggles while ours holds steady
            reports.push(next(0, event.tick.wrapping_add(3), pin_bits | noise));
            reports.push(next(0, event.tick.wrapping_add(4), pin_bits));
            reports.push(next(1 << 6, event.tick.wrapping_add(5), pin_bits));
            let watchdog = (1 << 5) | u16::from(pin.number());
            reports.push(next(watchdog, event.tick.wrapping_add(6), pin_bits));
        }
    }
    reports
}

/// A localhost port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
