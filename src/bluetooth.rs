//! Bluetooth RFCOMM connection setup.
//!
//! Device discovery (`hci`-level scan) is out of scope per §1 — the caller
//! supplies an already-known address and channel. This module only does the
//! narrow thing §1 leaves us: opening the RFCOMM socket itself, the
//! equivalent of `serial.c`'s `bt_open` (guarded there behind
//! `ENABLE_LINUX_BT`). `libc`/`nix` don't expose `AF_BLUETOOTH`/RFCOMM
//! constants, so the socket address is built by hand the way the original C
//! does with `sockaddr_rc`.

use std::os::fd::{FromRawFd, OwnedFd};

use nix::errno::Errno;

use crate::error::{Result, RtkError};

const AF_BLUETOOTH: libc::sa_family_t = 31;
const BTPROTO_RFCOMM: libc::c_int = 3;

#[repr(C)]
#[derive(Clone, Copy)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

/// Parse `"AA:BB:CC:DD:EE:FF"` into BlueZ's on-wire byte order, which stores
/// the address least-significant-octet first (the reverse of the printed
/// form), matching `str2ba`.
fn parse_bdaddr(addr: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = addr.split(':').collect();
    if parts.len() != 6 {
        return Err(RtkError::ParseError(format!("invalid bluetooth address {addr}")));
    }
    let mut out = [0u8; 6];
    for (i, p) in parts.iter().enumerate() {
        out[5 - i] = u8::from_str_radix(p, 16)
            .map_err(|_| RtkError::ParseError(format!("invalid bluetooth address {addr}")))?;
    }
    Ok(out)
}

pub fn rfcomm_connect(addr: &str, channel: u8) -> Result<OwnedFd> {
    let bdaddr = parse_bdaddr(addr)?;

    let raw = unsafe { libc::socket(AF_BLUETOOTH as libc::c_int, libc::SOCK_STREAM, BTPROTO_RFCOMM) };
    if raw < 0 {
        return Err(RtkError::SystemIo(std::io::Error::last_os_error()));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let saddr = SockaddrRc {
        rc_family: AF_BLUETOOTH,
        rc_bdaddr: bdaddr,
        rc_channel: channel,
    };

    let rc = unsafe {
        libc::connect(
            raw,
            &saddr as *const SockaddrRc as *const libc::sockaddr,
            std::mem::size_of::<SockaddrRc>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(RtkError::SystemIo(std::io::Error::last_os_error()));
    }

    // Match the serial transport: non-blocking, readiness governed by poll().
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(RtkError::SystemIo(std::io::Error::last_os_error()));
    }
    let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(RtkError::SystemIo(std::io::Error::from(Errno::last())));
    }

    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bdaddr_reverses_octets() {
        let b = parse_bdaddr("00:11:22:33:44:55").unwrap();
        assert_eq!(b, [0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
    }

    #[test]
    fn parse_bdaddr_rejects_malformed() {
        assert!(parse_bdaddr("not-an-address").is_err());
    }
}
