//! Exercise a device wired in local loopback (RX connected to TX).
//!
//! Sends a byte, a string, a 16 bit word and a hex array, and logs what comes back.
use serialport_poll::{ascii_to_hex, hex_to_ascii, Event, LineConfig, Parity, Port, StopBits};
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, prelude::*};

#[cfg(windows)]
const EXAMPLE: &str = "COM3";
#[cfg(not(windows))]
const EXAMPLE: &str = "/dev/ttyS0";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    let stdout = fmt::layer()
        .compact()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_target(true);
    tracing_subscriber::registry()
        .with(stdout)
        .with(LevelFilter::INFO)
        .init();

    let Some(device) = std::env::args().nth(1).filter(|arg| !arg.starts_with('?')) else {
        println!("Usage: tester <device>");
        println!("e.g.: tester {EXAMPLE}");
        println!("available: {:?}", serialport_poll::available_ports().unwrap_or_default());
        return Ok(());
    };

    let port = Port::new(LineConfig::new(device.as_str(), 9600, Parity::None, StopBits::One)?);
    let mut events = port.events().ok_or("event stream already taken")?;
    port.open()?;
    info!(device = device.as_str(), "port opened");

    port.send_byte(b'x')?;
    info!(sent = "x");
    log_received(&mut events, Duration::from_millis(50), |bytes| {
        String::from_utf8_lossy(bytes).into_owned()
    })
    .await;

    port.send_bytes(b"Hello World")?;
    info!(sent = "Hello World");
    log_received(&mut events, Duration::from_millis(100), |bytes| {
        String::from_utf8_lossy(bytes).into_owned()
    })
    .await;

    port.send_word(0x45C4)?;
    info!(sent = "45C4");
    log_received(&mut events, Duration::from_millis(50), |bytes| {
        match <[u8; 2]>::try_from(bytes) {
            Ok(word) if word == serialport_poll::word_to_bytes(0x45C4) => "45C4".to_string(),
            _ => hex_to_ascii(bytes),
        }
    })
    .await;

    let text = "A4a38";
    let hex = ascii_to_hex(text);
    port.send_bytes(&hex)?;
    info!(sent = %hex_to_ascii(&hex), from = text);
    log_received(&mut events, Duration::from_millis(100), hex_to_ascii).await;

    port.close();
    info!("demo over");
    Ok(())
}

/// Collect everything that arrives within `wait` and log it
async fn log_received(
    events: &mut serialport_poll::Events,
    wait: Duration,
    render: impl Fn(&[u8]) -> String,
) {
    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);
    let mut received = Vec::new();
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Event::Data(bytes)) => received.extend(bytes),
                Some(Event::Error(error)) => error!(?error, "read error"),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }
    match received.is_empty() {
        true => warn!("nothing received"),
        false => info!(received = %render(&received)),
    }
}
