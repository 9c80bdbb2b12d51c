use serialport_poll::{
    ascii_to_hex, hex_to_ascii, word_to_bytes, ErrorKind, Event, LineConfig, LoopbackBackend,
    Parity, PollConfig, Port, StopBits, Transport, DEFAULT_MAX_WRITE, SUPPORTED_BAUD_RATES,
};
use std::time::Duration;
use tokio_stream::StreamExt;

fn config() -> LineConfig {
    LineConfig::new("loop0", 9600, Parity::None, StopBits::One).unwrap()
}

fn port(capacity: usize) -> Port<LoopbackBackend> {
    Port::with_backend(config(), LoopbackBackend::new()).with_poll_config(
        PollConfig::default()
            .with_interval(Duration::from_millis(5))
            .with_capacity(capacity),
    )
}

async fn next_data(events: &mut serialport_poll::Events) -> Vec<u8> {
    match tokio::time::timeout(Duration::from_secs(2), events.next()).await {
        Ok(Some(Event::Data(bytes))) => bytes,
        other => panic!("expected data, got {other:?}"),
    }
}

#[test]
fn open_close_every_rate() {
    for &rate in SUPPORTED_BAUD_RATES {
        for parity in [Parity::None, Parity::Odd, Parity::Even] {
            for stop_bits in [StopBits::One, StopBits::Two] {
                let config = LineConfig::new("loop0", rate, parity, stop_bits).unwrap();
                let transport = Transport::with_backend(LoopbackBackend::new());
                transport.open(&config).unwrap();
                transport.close();
            }
        }
    }
}

#[test]
fn unsupported_rate_never_reaches_the_os() {
    let err = LineConfig::new("loop0", 12345, Parity::None, StopBits::One).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn usage_errors_skip_the_os() {
    let port = port(16);
    port.open().unwrap();
    let empty = port.send_bytes(&[]).unwrap_err();
    let large = port.send_bytes(&[0; DEFAULT_MAX_WRITE + 1]).unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Usage);
    assert_eq!(large.kind(), ErrorKind::Usage);
    assert_eq!(port.transport().backend().stats().writes, 0);
}

#[tokio::test]
async fn loopback_exchange() {
    let port = port(128);
    let mut events = port.events().unwrap();
    port.open().unwrap();

    port.send_byte(b'x').unwrap();
    assert_eq!(next_data(&mut events).await, vec![0x78]);

    port.send_bytes(b"Hello World\0").unwrap();
    assert_eq!(next_data(&mut events).await, b"Hello World\0".to_vec());

    port.send_word(0x45C4).unwrap();
    assert_eq!(next_data(&mut events).await, word_to_bytes(0x45C4).to_vec());

    let hex = ascii_to_hex("A4a38");
    port.send_bytes(&hex).unwrap();
    assert_eq!(hex_to_ascii(&next_data(&mut events).await), "A4A380");
}

#[tokio::test]
async fn burst_is_drained_in_one_tick() {
    let port = port(8);
    let mut events = port.events().unwrap();
    // Queued before the first tick, so the first tick sees all of it
    port.transport().backend().inject(&[0xAA; 19]);
    port.open().unwrap();
    let sizes = [
        next_data(&mut events).await.len(),
        next_data(&mut events).await.len(),
        next_data(&mut events).await.len(),
    ];
    assert_eq!(sizes, [8, 8, 3]);
    assert_eq!(port.transport().backend().pending(), 0);
}

#[tokio::test]
async fn short_burst_is_one_event() {
    let port = port(8);
    let mut events = port.events().unwrap();
    port.transport().backend().inject(b"abc");
    port.open().unwrap();
    assert_eq!(next_data(&mut events).await, b"abc".to_vec());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_next().is_none());
}

#[tokio::test]
async fn read_errors_are_reported_and_polling_continues() {
    let port = port(8);
    let mut events = port.events().unwrap();
    port.transport()
        .backend()
        .fail_next_read_with(std::io::Error::from_raw_os_error(5));
    port.open().unwrap();
    match tokio::time::timeout(Duration::from_secs(2), events.next()).await {
        Ok(Some(Event::Error(e))) => {
            assert_eq!(e.kind(), ErrorKind::Io);
            assert_eq!(e.raw_os_error(), Some(5));
        }
        other => panic!("expected an error, got {other:?}"),
    }
    port.send_byte(1).unwrap();
    assert_eq!(next_data(&mut events).await, vec![1]);
}

#[tokio::test]
async fn stream_ends_when_the_port_is_dropped() {
    let port = port(8);
    let mut events = port.events().unwrap();
    port.open().unwrap();
    drop(port);
    let end = tokio::time::timeout(Duration::from_secs(2), events.next()).await;
    assert!(matches!(end, Ok(None)));
}
