// Posix support

use crate::{
    config::{LineConfig, Parity, StopBits},
    transport::{Backend, Handle},
};
use nix::{
    fcntl::{fcntl, FcntlArg, OFlag},
    sys::termios::{
        self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
        SpecialCharacterIndices, Termios,
    },
};
use parking_lot::Mutex;
use std::{
    fmt::{self, Debug},
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::unix::fs::OpenOptionsExt,
};
use tracing::trace;

/// Opens tty devices and configures them through termios
#[derive(Debug, Default, Copy, Clone)]
pub struct PosixBackend;

impl Backend for PosixBackend {
    type Handle = PosixHandle;

    fn open(&self, config: &LineConfig) -> io::Result<PosixHandle> {
        // O_NONBLOCK so the open itself does not wait for carrier detect. O_NOCTTY so the device
        // never becomes our controlling terminal.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
            .open(config.device())?;
        // NOTE if anything fails below, `file` is dropped and the descriptor closed
        let initial = configure(&file, config)?;
        blocking_writes(&file)?;
        trace!(device = config.device(), "termios applied");
        Ok(PosixHandle {
            file,
            initial: Mutex::new(initial),
        })
    }
}

/// An open tty. Holds the termios settings found when it was opened.
pub struct PosixHandle {
    file: File,
    initial: Mutex<Termios>,
}

impl Debug for PosixHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosixHandle")
            .field("file", &self.file)
            .finish()
    }
}

impl Handle for PosixHandle {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf)
    }

    fn restore(&mut self) -> io::Result<()> {
        termios::tcsetattr(&self.file, SetArg::TCSAFLUSH, self.initial.get_mut())?;
        Ok(())
    }
}

/// Apply raw 8 bit settings and return the settings that were in place before
fn configure(file: &File, config: &LineConfig) -> io::Result<Termios> {
    let initial = termios::tcgetattr(file)?;
    let mut settings = initial.clone();

    // Drop bytes with parity errors, leave everything else untouched
    settings.input_flags |= InputFlags::INPCK | InputFlags::IGNPAR;
    settings.input_flags &= !(InputFlags::PARMRK
        | InputFlags::ISTRIP
        | InputFlags::IGNCR
        | InputFlags::INLCR
        | InputFlags::ICRNL);
    // No software flow control
    settings.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);

    settings.output_flags &= !OutputFlags::OPOST;

    // Ignore modem lines, no hangup on close
    settings.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    settings.control_flags &= !(ControlFlags::HUPCL
        | ControlFlags::CSTOPB
        | ControlFlags::PARENB
        | ControlFlags::PARODD
        | ControlFlags::CSIZE);
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        settings.control_flags &= !ControlFlags::CRTSCTS;
    }
    settings.control_flags |= ControlFlags::CS8;
    match config.parity() {
        Parity::None => {}
        Parity::Odd => settings.control_flags |= ControlFlags::PARENB | ControlFlags::PARODD,
        Parity::Even => settings.control_flags |= ControlFlags::PARENB,
    }
    if config.stop_bits() == StopBits::Two {
        settings.control_flags |= ControlFlags::CSTOPB;
    }

    settings.local_flags &= !(LocalFlags::ICANON
        | LocalFlags::ECHO
        | LocalFlags::ECHOE
        | LocalFlags::ECHOK
        | LocalFlags::ECHOKE
        | LocalFlags::ECHONL
        | LocalFlags::ISIG
        | LocalFlags::IEXTEN);

    // Reads return at once with whatever is buffered
    settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

    termios::cfsetspeed(&mut settings, baud_rate(config.baud_rate())?)?;
    termios::tcsetattr(file, SetArg::TCSADRAIN, &settings)?;
    Ok(initial)
}

/// Reads stay non blocking through VMIN/VTIME, writes should complete
fn blocking_writes(file: &File) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(file, FcntlArg::F_GETFL)?);
    fcntl(file, FcntlArg::F_SETFL(flags & !OFlag::O_NONBLOCK))?;
    Ok(())
}

fn baud_rate(rate: u32) -> io::Result<BaudRate> {
    let baud = match rate {
        50 => BaudRate::B50,
        75 => BaudRate::B75,
        110 => BaudRate::B110,
        134 => BaudRate::B134,
        150 => BaudRate::B150,
        200 => BaudRate::B200,
        300 => BaudRate::B300,
        600 => BaudRate::B600,
        1200 => BaudRate::B1200,
        1800 => BaudRate::B1800,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {rate}"),
            ))
        }
    };
    Ok(baud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SUPPORTED_BAUD_RATES;

    #[test]
    fn every_supported_rate_maps() {
        for &rate in SUPPORTED_BAUD_RATES {
            assert!(baud_rate(rate).is_ok(), "{rate}");
        }
        assert!(baud_rate(14400).is_err());
    }

    #[test]
    fn missing_device_reports_os_code() {
        let config =
            LineConfig::new("/dev/does-not-exist-42", 9600, Parity::None, StopBits::One).unwrap();
        let err = PosixBackend.open(&config).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(nix::libc::ENOENT));
    }

    #[test]
    fn non_tty_is_refused() {
        let config = LineConfig::new("/dev/null", 9600, Parity::None, StopBits::One).unwrap();
        let err = PosixBackend.open(&config).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(nix::libc::ENOTTY));
    }
}
