//! Component A — Transport.
//!
//! Byte-oriented I/O over a serial line or a Bluetooth RFCOMM socket, with a
//! per-call read deadline. Mirrors `serial.c`'s `dev_open`/`dev_config_serial`/
//! `serial_read`/`dev_close`, and generalizes the termios setup the teacher
//! crate already performs for its own GNSS serial reader (`gnss.rs`).

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::time::Duration;

use nix::fcntl::{self, OFlag};
use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::sys::stat::Mode;
use nix::sys::termios::{self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, Termios};
use nix::unistd::{read, write};

use crate::error::{Result, RtkError};

/// A connection target: a local serial device, or a Bluetooth RFCOMM peer.
#[derive(Debug, Clone)]
pub enum DeviceSpec {
    Serial { path: String, baud: u32 },
    Rfcomm { addr: String, channel: u8 },
}

/// Serial line speeds the logger can be configured for (§4.A).
pub const VALID_BAUDS: &[u32] = &[
    50, 75, 150, 300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200,
];

pub const DEFAULT_BAUD: u32 = 57600;

fn baud_rate(baud: u32) -> Option<BaudRate> {
    Some(match baud {
        50 => BaudRate::B50,
        75 => BaudRate::B75,
        150 => BaudRate::B150,
        300 => BaudRate::B300,
        600 => BaudRate::B600,
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        _ => return None,
    })
}

/// The byte-oriented contract the frame reader and protocol client need:
/// a deadline-bounded read and a write, nothing else. Modeled as a trait
/// (rather than hardwiring `Transport` everywhere) the way `embedded-io`
/// abstracts a byte stream — here it also lets tests drive the protocol
/// layer against an in-memory double instead of a real descriptor.
pub trait IoSource {
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;
    fn read(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize>;
}

/// An open connection to the logger. Closing restores the serial line's
/// pre-open attributes (§4.A); this happens in `close()` and also in `Drop`
/// so every exit path — including early returns on error — restores state.
pub struct Transport {
    fd: OwnedFd,
    saved_termios: Option<Termios>,
}

impl Transport {
    pub fn open(spec: &DeviceSpec) -> Result<Transport> {
        match spec {
            DeviceSpec::Serial { path, baud } => Self::open_serial(path, *baud),
            DeviceSpec::Rfcomm { addr, channel } => Self::open_rfcomm(addr, *channel),
        }
    }

    fn open_serial(path: &str, baud: u32) -> Result<Transport> {
        let raw_fd = fcntl::open(
            path,
            OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_NONBLOCK,
            Mode::empty(),
        )
        .map_err(|e| RtkError::SystemIo(std::io::Error::from(e)))?;
        // SAFETY: `fcntl::open` just returned this fd; nothing else owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        let saved = termios::tcgetattr(&fd).map_err(|e| RtkError::SystemIo(std::io::Error::from(e)))?;

        let mut t = saved.clone();
        cfmakeraw(&mut t);
        t.control_chars[termios::SpecialCharacterIndices::VMIN as usize] = 0;
        t.control_chars[termios::SpecialCharacterIndices::VTIME as usize] = 0;

        let rate = baud_rate(baud).unwrap_or_else(|| baud_rate(DEFAULT_BAUD).unwrap());
        termios::cfsetispeed(&mut t, rate).map_err(|e| RtkError::SystemIo(std::io::Error::from(e)))?;
        termios::cfsetospeed(&mut t, rate).map_err(|e| RtkError::SystemIo(std::io::Error::from(e)))?;

        termios::tcsetattr(&fd, SetArg::TCSANOW, &t)
            .map_err(|e| RtkError::SystemIo(std::io::Error::from(e)))?;
        termios::tcflush(&fd, termios::FlushArg::TCIFLUSH)
            .map_err(|e| RtkError::SystemIo(std::io::Error::from(e)))?;

        Ok(Transport {
            fd,
            saved_termios: Some(saved),
        })
    }

    fn open_rfcomm(addr: &str, channel: u8) -> Result<Transport> {
        crate::bluetooth::rfcomm_connect(addr, channel).map(|fd| Transport {
            fd,
            saved_termios: None,
        })
    }

    /// Write `bytes` to the transport, looping until the whole buffer is
    /// accepted (mirrors `serial_write`, which is a thin `write(2)` wrapper —
    /// we loop here because a non-blocking fd can accept a short write).
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut n = 0;
        while n < bytes.len() {
            match write(self.fd.as_fd(), &bytes[n..]) {
                Ok(0) => break,
                Ok(k) => n += k,
                Err(nix::errno::Errno::EAGAIN) => continue,
                Err(e) => return Err(RtkError::SystemIo(std::io::Error::from(e))),
            }
        }
        Ok(n)
    }

    /// Block up to `timeout_ms` for readiness, then read whatever is
    /// available into `buf` (possibly less than `buf.len()`). Returns `Ok(0)`
    /// on timeout, matching `serial_read`'s contract (§4.A).
    pub fn read(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        let mut fds = [PollFd::new(self.borrowed_fd(), PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(timeout_ms as i32).unwrap_or(PollTimeout::MAX);
        let n = nix::poll::poll(&mut fds, timeout).map_err(|e| RtkError::SystemIo(std::io::Error::from(e)))?;
        if n == 0 {
            return Ok(0);
        }
        match read(self.fd.as_raw_fd(), buf) {
            Ok(n) => Ok(n),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(RtkError::SystemIo(std::io::Error::from(e))),
        }
    }

    fn borrowed_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Restore the pre-open termios state (if any) and close the descriptor.
    pub fn close(mut self) -> Result<()> {
        self.restore();
        Ok(())
    }

    fn restore(&mut self) {
        if let Some(saved) = self.saved_termios.take() {
            let _ = termios::tcsetattr(&self.fd, SetArg::TCSANOW, &saved);
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.restore();
    }
}

impl IoSource for Transport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        Transport::write(self, bytes)
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        Transport::read(self, buf, timeout_ms)
    }
}

/// Equivalent of the POSIX `cfmakeraw`: 8-N-1, no echo, no signals, no output
/// post-processing. `serial.c` falls back to a hand-rolled version of this
/// when the host libc lacks it; nix's termios types let us express the same
/// flag-clearing directly.
fn cfmakeraw(t: &mut Termios) {
    t.input_flags &= !(InputFlags::IGNBRK
        | InputFlags::BRKINT
        | InputFlags::PARMRK
        | InputFlags::ISTRIP
        | InputFlags::INLCR
        | InputFlags::IGNCR
        | InputFlags::ICRNL
        | InputFlags::IXON);
    t.output_flags &= !OutputFlags::OPOST;
    t.local_flags &= !(LocalFlags::ECHO
        | LocalFlags::ECHONL
        | LocalFlags::ICANON
        | LocalFlags::ISIG
        | LocalFlags::IEXTEN);
    t.control_flags &= !(ControlFlags::CSIZE | ControlFlags::PARENB);
    t.control_flags |= ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_rejects_unsupported_speed() {
        assert!(baud_rate(31250).is_none());
    }

    #[test]
    fn all_documented_bauds_map() {
        for &b in VALID_BAUDS {
            assert!(baud_rate(b).is_some(), "missing mapping for {b}");
        }
    }
}
