//! Log everything a device sends, as hex, for 30 seconds
use serialport_poll::{hex_to_ascii, Event, LineConfig, Parity, Port, StopBits};
use tokio_stream::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, prelude::*};

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
        .with(LevelFilter::TRACE)
        .init();

    let Some(device) = std::env::args().nth(1).filter(|arg| !arg.starts_with('?')) else {
        println!("Usage: monitor <device>");
        println!("available: {:?}", serialport_poll::available_ports().unwrap_or_default());
        return Ok(());
    };

    // Welcome message
    info!(device = device.as_str(), "Monitoring serial port for 30 seconds");

    // Create a timeout to end our demo
    let timeout = tokio::time::sleep(std::time::Duration::from_secs(30));

    let port = Port::new(LineConfig::new(device.as_str(), 9600, Parity::None, StopBits::One)?);
    let mut stream = port.events().ok_or("event stream already taken")?;
    port.open()?;

    loop {
        tokio::select! {
            result = stream.next() => {
                match result {
                    Some(Event::Data(bytes)) => info!(len = bytes.len(), data = %hex_to_ascii(&bytes), "received"),
                    Some(Event::Error(error)) => error!(?error, code = ?error.raw_os_error(), "read error"),
                    None => break,
                }
            },
            _ = tokio::time::sleep_until(timeout.deadline()) => {
                info!("demo over");
                break
            }
        }
    }

    // Dropping the port restores the device settings
    drop(port);
    Ok(())
}
