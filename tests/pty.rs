//! Drive the termios backend through a pseudo terminal pair. The transport opens the slave side
//! by name, the test plays the remote device on the master side.
#![cfg(unix)]

use nix::{
    pty::{openpty, OpenptyResult},
    sys::termios::{self, LocalFlags},
    unistd,
};
use serialport_poll::{
    Event, LineConfig, Parity, PollConfig, Port, StopBits, Transport, SUPPORTED_BAUD_RATES,
};
use std::{
    sync::mpsc,
    time::{Duration, Instant},
};

/// None when the environment has no pty support
fn pty() -> Option<(OpenptyResult, String)> {
    let pty = openpty(None, None).ok()?;
    let name = unistd::ttyname(&pty.slave).ok()?;
    Some((pty, name.to_string_lossy().into_owned()))
}

fn config(device: &str) -> LineConfig {
    LineConfig::new(device, 9600, Parity::None, StopBits::One).unwrap()
}

fn read_until(transport: &Transport, want: usize) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut received = Vec::new();
    let mut buf = [0; 64];
    while received.len() < want && Instant::now() < deadline {
        let n = transport.read_nonblocking(&mut buf).unwrap();
        received.extend_from_slice(&buf[..n]);
        std::thread::sleep(Duration::from_millis(5));
    }
    received
}

#[test]
fn open_close_every_rate() {
    let Some((_pty, name)) = pty() else { return };
    for &rate in SUPPORTED_BAUD_RATES {
        let config = LineConfig::new(name.as_str(), rate, Parity::Even, StopBits::Two).unwrap();
        let transport = Transport::new();
        transport.open(&config).unwrap();
        transport.close();
    }
}

#[test]
fn idle_read_returns_at_once() {
    let Some((_pty, name)) = pty() else { return };
    let transport = Transport::new();
    transport.open(&config(&name)).unwrap();
    let mut buf = [0; 32];
    let start = Instant::now();
    assert_eq!(transport.read_nonblocking(&mut buf).unwrap(), 0);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn writes_reach_the_remote() {
    let Some((pty, name)) = pty() else { return };
    let transport = Transport::new();
    transport.open(&config(&name)).unwrap();
    assert_eq!(transport.write_bytes(b"Hello\n").unwrap(), 6);
    let mut buf = [0; 16];
    let n = unistd::read(&pty.master, &mut buf).unwrap();
    // No output processing, the newline is not expanded
    assert_eq!(&buf[..n], b"Hello\n");
}

#[test]
fn remote_bytes_are_read_raw() {
    let Some((pty, name)) = pty() else { return };
    let transport = Transport::new();
    transport.open(&config(&name)).unwrap();
    unistd::write(&pty.master, b"a\rb\n").unwrap();
    // No canonical mode, no CR translation
    assert_eq!(read_until(&transport, 4), b"a\rb\n".to_vec());
}

#[test]
fn close_restores_settings() {
    let Some((pty, name)) = pty() else { return };
    let before = termios::tcgetattr(&pty.slave).unwrap();
    assert!(before.local_flags.contains(LocalFlags::ICANON));
    let transport = Transport::new();
    transport.open(&config(&name)).unwrap();
    let during = termios::tcgetattr(&pty.slave).unwrap();
    assert!(!during.local_flags.contains(LocalFlags::ICANON));
    // No echo of any kind, a remote that echoes a line kill would otherwise see it
    for echo in [
        LocalFlags::ECHO,
        LocalFlags::ECHOE,
        LocalFlags::ECHOK,
        LocalFlags::ECHOKE,
        LocalFlags::ECHONL,
    ] {
        assert!(!during.local_flags.intersects(echo), "{echo:?} left on");
    }
    transport.close();
    transport.close();
    let after = termios::tcgetattr(&pty.slave).unwrap();
    assert_eq!(after.local_flags, before.local_flags);
    assert_eq!(after.input_flags, before.input_flags);
    assert_eq!(after.control_flags, before.control_flags);
}

#[test]
fn port_reports_remote_data() {
    let Some((pty, name)) = pty() else { return };
    let port = Port::new(config(&name))
        .with_poll_config(PollConfig::default().with_interval(Duration::from_millis(10)));
    let (tx, rx) = mpsc::channel();
    port.on_event(move |ev| {
        let _ = tx.send(ev);
    });
    port.open().unwrap();
    unistd::write(&pty.master, b"x").unwrap();
    match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
        Event::Data(bytes) => assert_eq!(bytes, vec![0x78]),
        Event::Error(e) => panic!("{e}"),
    }
    port.close();
    assert!(!port.is_open());
}
