mod wide;

use crate::{
    config::{LineConfig, Parity, StopBits},
    transport::{Backend, Handle},
};
use std::{
    ffi::c_void,
    fmt::{self, Debug},
    io,
};
use tracing::{error, trace};
use wide::to_wide;
use windows_sys::Win32::{
    Devices::Communication::{
        GetCommState, GetCommTimeouts, SetCommState, SetCommTimeouts, COMMTIMEOUTS, DCB,
        EVENPARITY, NOPARITY, ODDPARITY, ONESTOPBIT, TWOSTOPBITS,
    },
    Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE},
    Storage::FileSystem::{CreateFileW, ReadFile, WriteFile, FILE_ATTRIBUTE_NORMAL, OPEN_EXISTING},
};

// DCB bitfield flags. See https://learn.microsoft.com/en-us/windows/win32/api/winbase/ns-winbase-dcb
const F_BINARY: u32 = 1 << 0;
const F_PARITY: u32 = 1 << 1;
const F_OUTX_CTS_FLOW: u32 = 1 << 2;
const F_OUTX_DSR_FLOW: u32 = 1 << 3;
const F_DTR_CONTROL: u32 = 0b11 << 4;
const F_DSR_SENSITIVITY: u32 = 1 << 6;
const F_OUTX: u32 = 1 << 8;
const F_INX: u32 = 1 << 9;
const F_ERROR_CHAR: u32 = 1 << 10;
const F_NULL: u32 = 1 << 11;
const F_RTS_CONTROL: u32 = 0b11 << 12;
const F_ABORT_ON_ERROR: u32 = 1 << 14;
// Two bit fields, value 1 is "enable": the line is raised while the port is open
const DTR_CONTROL_ENABLE: u32 = 1 << 4;
const RTS_CONTROL_ENABLE: u32 = 1 << 12;

/// Opens COM ports in non-overlapped mode
#[derive(Debug, Default, Copy, Clone)]
pub struct WindowsBackend;

/// Owned COM port handle, closed on drop
struct OwnedHandle(HANDLE);

// Safety: a COM port handle may be used from any thread. Reads and writes on a non-overlapped
// handle are independent directions.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // Safety: we own the handle and it is valid until now
        if unsafe { CloseHandle(self.0) } == 0 {
            error!(error = ?io::Error::last_os_error(), "failed to close handle");
        }
    }
}

impl Backend for WindowsBackend {
    type Handle = WindowsHandle;

    fn open(&self, config: &LineConfig) -> io::Result<WindowsHandle> {
        let name = to_wide(config.device());
        // Safety: name is a null terminated wide string that outlives the call
        let raw = unsafe {
            CreateFileW(
                name.as_ptr(),                // port name
                GENERIC_READ | GENERIC_WRITE, // send and receive
                0,                            // COM ports cannot be shared
                std::ptr::null(),             // default security
                OPEN_EXISTING,                // fail if missing
                FILE_ATTRIBUTE_NORMAL,        // non-overlapped
                std::ptr::null_mut(),         // no template
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        // NOTE from here on any early return drops `handle` which closes the port
        let handle = OwnedHandle(raw);
        let dcb = configure(&handle, config)?;
        let timeouts = nonblocking_reads(&handle)?;
        trace!(device = config.device(), "comm state applied");
        Ok(WindowsHandle {
            handle,
            dcb,
            timeouts,
        })
    }
}

/// An open COM port. Holds the DCB and time-outs found when it was opened.
pub struct WindowsHandle {
    handle: OwnedHandle,
    dcb: DCB,
    timeouts: COMMTIMEOUTS,
}

impl Debug for WindowsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowsHandle")
            .field("handle", &(self.handle.0 as *const c_void))
            .finish()
    }
}

impl Handle for WindowsHandle {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut len = 0u32;
        let want = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        // Safety: buf is valid for `want` bytes, no overlapped structure is used
        match unsafe {
            ReadFile(
                self.handle.0,
                buf.as_mut_ptr(),
                want,
                &mut len,
                std::ptr::null_mut(),
            )
        } {
            0 => Err(io::Error::last_os_error()),
            _ => Ok(len as usize),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut len = 0u32;
        let want = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        // Safety: buf is valid for `want` bytes, no overlapped structure is used
        match unsafe {
            WriteFile(
                self.handle.0,
                buf.as_ptr(),
                want,
                &mut len,
                std::ptr::null_mut(),
            )
        } {
            0 => Err(io::Error::last_os_error()),
            _ => Ok(len as usize),
        }
    }

    fn restore(&mut self) -> io::Result<()> {
        // Try both, report the first failure
        // Safety: the handle is open and the structures were filled by the OS
        let state = match unsafe { SetCommState(self.handle.0, &self.dcb) } {
            0 => Err(io::Error::last_os_error()),
            _ => Ok(()),
        };
        let timeouts = match unsafe { SetCommTimeouts(self.handle.0, &self.timeouts) } {
            0 => Err(io::Error::last_os_error()),
            _ => Ok(()),
        };
        state.and(timeouts)
    }
}

/// Apply 8 bit framing without flow control and return the DCB that was in place before
fn configure(handle: &OwnedHandle, config: &LineConfig) -> io::Result<DCB> {
    // Safety: DCB is plain data, the OS fills it
    let mut initial: DCB = unsafe { std::mem::zeroed() };
    initial.DCBlength = std::mem::size_of::<DCB>() as u32;
    if unsafe { GetCommState(handle.0, &mut initial) } == 0 {
        return Err(io::Error::last_os_error());
    }
    let mut settings = initial;
    settings.BaudRate = config.baud_rate();
    settings.ByteSize = 8;
    settings.Parity = match config.parity() {
        Parity::None => NOPARITY,
        Parity::Odd => ODDPARITY,
        Parity::Even => EVENPARITY,
    };
    settings.StopBits = match config.stop_bits() {
        StopBits::One => ONESTOPBIT,
        StopBits::Two => TWOSTOPBITS,
    };
    settings._bitfield = line_bits(initial._bitfield, config.parity());
    if unsafe { SetCommState(handle.0, &settings) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(initial)
}

/// Binary mode with no handshake of any kind. DTR and RTS are held up rather than left under
/// whatever hardware flow control the previous user configured.
fn line_bits(bitfield: u32, parity: Parity) -> u32 {
    let cleared = F_PARITY
        | F_OUTX_CTS_FLOW
        | F_OUTX_DSR_FLOW
        | F_DTR_CONTROL
        | F_DSR_SENSITIVITY
        | F_OUTX
        | F_INX
        | F_ERROR_CHAR
        | F_NULL
        | F_RTS_CONTROL
        | F_ABORT_ON_ERROR;
    let mut bits = (bitfield & !cleared) | F_BINARY | DTR_CONTROL_ENABLE | RTS_CONTROL_ENABLE;
    if parity != Parity::None {
        bits |= F_PARITY;
    }
    bits
}

/// Make reads return immediately with whatever is buffered and return the previous time-outs
fn nonblocking_reads(handle: &OwnedHandle) -> io::Result<COMMTIMEOUTS> {
    // Safety: COMMTIMEOUTS is plain data, the OS fills it
    let mut initial: COMMTIMEOUTS = unsafe { std::mem::zeroed() };
    if unsafe { GetCommTimeouts(handle.0, &mut initial) } == 0 {
        return Err(io::Error::last_os_error());
    }
    // A MAXDWORD interval with zero read totals returns at once. Zero write totals disable
    // write time-outs.
    let timeouts = COMMTIMEOUTS {
        ReadIntervalTimeout: u32::MAX,
        ReadTotalTimeoutMultiplier: 0,
        ReadTotalTimeoutConstant: 0,
        WriteTotalTimeoutMultiplier: 0,
        WriteTotalTimeoutConstant: 0,
    };
    if unsafe { SetCommTimeouts(handle.0, &timeouts) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(initial)
}
