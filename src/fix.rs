//! Component E — Fix decoder (§3, §4.E).
//!
//! Decodes the five packed little-endian record layouts written by the
//! logger. Reading every multibyte field with `from_le_bytes` makes the
//! endianness normalization unconditional: on a big-endian host the exact
//! same code path produces the host-native value, which is the Rust
//! equivalent of `rtkcom.c`'s `#ifdef WORDS_BIGENDIAN` byte-swap block
//! without needing a cfg-gated branch.

use std::f32::consts::PI;

use crate::error::{Result, RtkError};

/// One (satellite id, signal-to-noise ratio) pair, present only in `fxtyp` 4
/// records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatEntry {
    pub prn: u8,
    pub snr: u8,
}

/// A single decoded fix (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    /// Radians.
    pub lat: f32,
    /// Radians.
    pub lng: f32,
    /// Metres above the WGS84 ellipsoid.
    pub alt: Option<f32>,
    /// Metres/second.
    pub vel: Option<f32>,
    /// Cumulative distance, unsigned.
    pub dist: Option<u32>,
    pub quality: Option<SatQuality>,
    /// Set when any field failed a sanity check (§3 invariant iv, §4.E).
    pub suspect: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SatQuality {
    pub visible: u8,
    pub hdop: u16,
    pub pdop: u16,
    pub vdop: u16,
    pub heading_deg: f32,
    pub sats: [SatEntry; 12],
}

/// Return the on-wire byte size of a fix record for the given `fxtyp`
/// (§3: `{12, 16, 20, 24, 60}`), or `None` for an out-of-range type.
pub fn fix_size(fxtyp: u8) -> Option<usize> {
    const SIZES: [usize; 5] = [12, 16, 20, 24, 60];
    SIZES.get(fxtyp as usize).copied()
}

/// Decode one fix record of type `fxtyp` from `bytes`. `bytes` must be at
/// least `fix_size(fxtyp)` long; extra trailing bytes are ignored.
pub fn decode(bytes: &[u8], fxtyp: u8) -> Result<Fix> {
    let size = fix_size(fxtyp).ok_or_else(|| RtkError::ParseError(format!("invalid fix type {fxtyp}")))?;
    if bytes.len() < size {
        return Err(RtkError::ParseError("fix record truncated".into()));
    }

    let hour = bytes[1];
    let min = bytes[2];
    let sec = bytes[3];
    let lat = f32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let lng = f32::from_le_bytes(bytes[8..12].try_into().unwrap());

    let alt = (fxtyp >= 1).then(|| f32::from_le_bytes(bytes[12..16].try_into().unwrap()));
    let vel = (fxtyp >= 2).then(|| f32::from_le_bytes(bytes[16..20].try_into().unwrap()));
    let dist = (fxtyp >= 3).then(|| u32::from_le_bytes(bytes[20..24].try_into().unwrap()));

    let quality = if fxtyp >= 4 {
        let nfix_byte = bytes[25];
        let visible = nfix_byte >> 4;
        let hdop = u16::from_le_bytes(bytes[26..28].try_into().unwrap());
        let pdop = u16::from_le_bytes(bytes[28..30].try_into().unwrap());
        let vdop = u16::from_le_bytes(bytes[30..32].try_into().unwrap());
        let mut sats = [SatEntry { prn: 0, snr: 0 }; 12];
        for (i, s) in sats.iter_mut().enumerate() {
            let off = 32 + i * 2;
            s.prn = bytes[off];
            s.snr = bytes[off + 1];
        }
        let heading_deg = f32::from_le_bytes(bytes[56..60].try_into().unwrap());
        Some(SatQuality {
            visible,
            hdop,
            pdop,
            vdop,
            heading_deg,
            sats,
        })
    } else {
        None
    };

    let mut fix = Fix {
        hour,
        min,
        sec,
        lat,
        lng,
        alt,
        vel,
        dist,
        quality,
        suspect: false,
    };
    fix.suspect = sanity_check_failed(&fix);
    Ok(fix)
}

/// Apply the §4.E sanity checks. The permissive latitude interval
/// `[-π, 2π]` is preserved verbatim per §9 Open Question (a) even though it
/// looks wrong for a physical latitude — the original source carries the
/// same uncertainty in a comment, and we match it for wire compatibility
/// rather than silently "fixing" it.
fn sanity_check_failed(fix: &Fix) -> bool {
    let mut bad = false;
    if fix.hour > 23 || fix.min > 59 || fix.sec > 59 {
        bad = true;
    }
    if fix.lat.is_nan() || fix.lat.is_infinite() || fix.lat < -PI || fix.lat > 2.0 * PI {
        bad = true;
    }
    if fix.lng.is_nan() || fix.lng.is_infinite() || fix.lng < -PI || fix.lng > PI {
        bad = true;
    }
    if let Some(alt) = fix.alt {
        if alt.is_nan() || alt.is_infinite() {
            bad = true;
        }
    }
    if let Some(vel) = fix.vel {
        if vel.is_nan() || vel.is_infinite() {
            bad = true;
        }
    }
    bad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fxtyp0_bytes(hour: u8, min: u8, sec: u8, lat: f32, lng: f32) -> Vec<u8> {
        let mut v = vec![0u8; 12];
        v[1] = hour;
        v[2] = min;
        v[3] = sec;
        v[4..8].copy_from_slice(&lat.to_le_bytes());
        v[8..12].copy_from_slice(&lng.to_le_bytes());
        v
    }

    #[test]
    fn decode_valid_fxtyp0() {
        let bytes = fxtyp0_bytes(12, 34, 56, 0.6, -0.3);
        let fix = decode(&bytes, 0).unwrap();
        assert!(!fix.suspect);
        assert_eq!((fix.hour, fix.min, fix.sec), (12, 34, 56));
        assert!((fix.lat - 0.6).abs() < 1e-6);
        assert!(fix.alt.is_none());
    }

    #[test]
    fn decode_marks_out_of_range_time_suspect() {
        let bytes = fxtyp0_bytes(24, 0, 0, 0.0, 0.0);
        let fix = decode(&bytes, 0).unwrap();
        assert!(fix.suspect);
    }

    #[test]
    fn decode_marks_nan_latitude_suspect() {
        let bytes = fxtyp0_bytes(0, 0, 0, f32::NAN, 0.0);
        let fix = decode(&bytes, 0).unwrap();
        assert!(fix.suspect);
    }

    #[test]
    fn fix_sizes_match_spec_table() {
        assert_eq!(fix_size(0), Some(12));
        assert_eq!(fix_size(1), Some(16));
        assert_eq!(fix_size(2), Some(20));
        assert_eq!(fix_size(3), Some(24));
        assert_eq!(fix_size(4), Some(60));
        assert_eq!(fix_size(5), None);
    }

    #[test]
    fn decode_rejects_truncated_record() {
        let bytes = vec![0u8; 5];
        assert!(decode(&bytes, 0).is_err());
    }
}
