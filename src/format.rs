//! Component G — Output formatter (§4.G).
//!
//! Two dialects share the same decoded `Fix` data: "NMEA", the usual
//! `$GPGGA`/`$GPRMC`/`$GPGSV` sentences plus two logger-specific extensions
//! (`$PRTK` session header, `$RTDIST` cumulative distance), and "native",
//! the compact `RNGL` line form.

use std::f32::consts::PI;

use crate::checksum::format_sentence;
use crate::fix::Fix;
use crate::geoid::GeoidGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Nmea,
    Native,
}

const RAD_TO_DEG: f32 = 360.0 / (2.0 * PI);
/// m/s to knots (§4.G).
const MPS_TO_KNOTS: f64 = 0.539956803;

/// Round half-away-from-zero to one decimal place (§4.G, §8). `f64::round`
/// already rounds halves away from zero; this just names the scale/round/
/// unscale so every call site that must carry exactly one decimal digit of
/// precision says so.
pub fn round1p(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn rad_to_deg(rad: f32) -> f32 {
    rad * RAD_TO_DEG
}

/// Split a latitude in degrees into NMEA's `DDMM.mmmm` + hemisphere form.
fn nmea_lat(deg: f32) -> (String, char) {
    let hemi = if deg < 0.0 { 'S' } else { 'N' };
    let deg = deg.abs();
    let d = deg.floor();
    let m = (deg - d) * 60.0;
    (format!("{:02.0}{:07.4}", d, m), hemi)
}

/// Split a longitude in degrees into NMEA's `DDDMM.mmmm` + hemisphere form.
fn nmea_lng(deg: f32) -> (String, char) {
    let hemi = if deg < 0.0 { 'W' } else { 'E' };
    let deg = deg.abs();
    let d = deg.floor();
    let m = (deg - d) * 60.0;
    (format!("{:03.0}{:07.4}", d, m), hemi)
}

/// `HHMMSS.000` when DOP info is available, `HHMMSS.00` otherwise — the
/// literal distinction the source makes between a fix carrying satellite
/// quality data and one that doesn't.
fn nmea_time(fix: &Fix) -> String {
    let suffix = if fix.quality.is_some() { ".000" } else { ".00" };
    format!("{:02}{:02}{:02}{suffix}", fix.hour, fix.min, fix.sec)
}

/// The source hard-codes the header's third field (the version string) to a
/// fixed 12-character width, space-padded or truncated; §9 Open Question (b)
/// says to match this literally rather than emit the field at its natural
/// length.
const VERSION_FIELD_WIDTH: usize = 12;

fn pad_version_field(version: &str) -> String {
    let mut s: String = version.chars().take(VERSION_FIELD_WIDTH).collect();
    while s.chars().count() < VERSION_FIELD_WIDTH {
        s.push(' ');
    }
    s
}

/// `$PRTK,RTKGPS,<version>[,<bt_addr_nodash>]*HH` session header (§4.G).
pub fn prtk_header(version: &str, bt_addr: Option<&str>) -> String {
    let version = pad_version_field(version);
    match bt_addr {
        Some(addr) => {
            let nodash = addr.replace([':', '-'], "");
            format_sentence(&format!("PRTK,RTKGPS,{version},{nodash}"))
        }
        None => format_sentence(&format!("PRTK,RTKGPS,{version}")),
    }
}

/// Native dialect file header: `RNGL\n` followed by `<date> <fxtyp>
/// <nfix>\n` (§4.G).
pub fn native_header(date: &str, fxtyp: u8, nfix: u32) -> String {
    format!("RNGL\n{date} {fxtyp} {nfix}\n")
}

/// If `fix` is suspect, replace the sentence body's leading talker ID with
/// `PRTK,BADFIX` so a downstream parser unaware of the extension can still
/// skip the sentence by talker ID alone, without losing the raw datum
/// (§4.G).
fn maybe_badfix(body: String, suspect: bool) -> String {
    if !suspect {
        return body;
    }
    match body.find(',') {
        Some(idx) => format!("PRTK,BADFIX,{}", &body[idx + 1..]),
        None => format!("PRTK,BADFIX,{body}"),
    }
}

/// Emit every sentence for one fix under the requested dialect. `geoid`,
/// when supplied, converts the ellipsoidal altitude in `$GPGGA`/native to an
/// orthometric one; a missing or out-of-coverage grid leaves altitude
/// ellipsoidal with no geoid separation field.
pub fn format_fix(fix: &Fix, dialect: Dialect, geoid: Option<&GeoidGrid>) -> String {
    match dialect {
        Dialect::Nmea => format_fix_nmea(fix, geoid),
        Dialect::Native => format_fix_native(fix, geoid),
    }
}

fn geoid_separation(fix: &Fix, geoid: Option<&GeoidGrid>) -> Option<f32> {
    let grid = geoid?;
    let sep = grid.undulation(rad_to_deg(fix.lat), rad_to_deg(fix.lng));
    (!sep.is_nan()).then_some(sep)
}

/// The altitude/geoid-separation sub-field of `$GPGGA`: `",,,"` with no
/// altitude at all (`fxtyp=0`), `"<alt>,M,,"` with altitude but no geoid
/// correction, or `"<alt>,M,<sep>,M"` with both (`gpsfmt.c:96-99`).
fn gga_alt_field(alt: Option<f32>, sep: Option<f32>) -> String {
    match alt {
        None => ",,,".to_string(),
        Some(a) => match sep {
            Some(s) => format!("{:.1},M,{:.1},M", round1p((a - s) as f64), round1p(s as f64)),
            None => format!("{:.1},M,,", round1p(a as f64)),
        },
    }
}

fn format_fix_nmea(fix: &Fix, geoid: Option<&GeoidGrid>) -> String {
    let mut out = String::new();
    let time = nmea_time(fix);
    let (lat_s, lat_h) = nmea_lat(rad_to_deg(fix.lat));
    let (lng_s, lng_h) = nmea_lng(rad_to_deg(fix.lng));

    let sep = geoid_separation(fix, geoid);
    let alt_field = gga_alt_field(fix.alt, sep);

    // Fix quality is the literal `1`; satellite count and HDOP are left
    // empty (`gpsfmt.c:111`, `sprintf(gga, "%s,%s,%09.4f,%c,%010.4f,%c,1,,,%s,,*", ...)`).
    let gga = format!("GPGGA,{time},{lat_s},{lat_h},{lng_s},{lng_h},1,,,{alt_field},,");
    out.push_str(&format_sentence(&maybe_badfix(gga, fix.suspect)));

    // Speed is `%06.2f` knots, or empty when no velocity field is present;
    // course is always left empty (`gpsfmt.c:103-106,115`).
    let speed_field = fix
        .vel
        .map(|v| format!("{:06.2}", v as f64 * MPS_TO_KNOTS))
        .unwrap_or_default();
    let status = if fix.suspect { "V" } else { "A" };
    let rmc = format!("GPRMC,{time},{status},{lat_s},{lat_h},{lng_s},{lng_h},{speed_field},,,,");
    out.push_str(&format_sentence(&maybe_badfix(rmc, fix.suspect)));

    if let Some(q) = &fix.quality {
        out.push_str(&gpgsv_sentences(q.visible, &q.sats, fix.suspect));
    }

    if let Some(dist) = fix.dist {
        let rtdist = format!("RTDIST,{dist}");
        out.push_str(&format_sentence(&maybe_badfix(rtdist, fix.suspect)));
    }

    out
}

/// `$GPGSV` is chunked at 4 satellites per sentence; build as many
/// sentences as needed to report every visible satellite.
fn gpgsv_sentences(visible: u8, sats: &[crate::fix::SatEntry; 12], suspect: bool) -> String {
    let n = (visible as usize).min(sats.len());
    if n == 0 {
        return String::new();
    }
    let total_sentences = n.div_ceil(4).max(1);
    let mut out = String::new();
    for s in 0..total_sentences {
        let chunk = &sats[s * 4..((s + 1) * 4).min(n)];
        let mut body = format!("GPGSV,{total_sentences},{},{n:02}", s + 1);
        for sat in chunk {
            body.push_str(&format!(",{:02},,,{:02}", sat.prn, sat.snr));
        }
        out.push_str(&format_sentence(&maybe_badfix(body, suspect)));
    }
    out
}

fn format_fix_native(fix: &Fix, geoid: Option<&GeoidGrid>) -> String {
    let mut line = format!(
        "{:02}{:02}{:02},{:+.12e},{:+.12e}",
        fix.hour, fix.min, fix.sec, fix.lat, fix.lng
    );
    if let Some(alt) = fix.alt {
        line.push_str(&format!(",{alt:+.8e}"));
        match geoid_separation(fix, geoid) {
            Some(sep) => line.push_str(&format!(",{sep:+.3e}")),
            None => line.push_str(&format!(",{}", " ".repeat(10))),
        }
    }
    if let Some(vel) = fix.vel {
        line.push_str(&format!(",{vel:+.8e}"));
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fix() -> Fix {
        Fix {
            hour: 12,
            min: 34,
            sec: 56,
            lat: 0.6, // radians, matches §8 scenario 6
            lng: -0.3,
            alt: Some(123.4567),
            vel: Some(5.0),
            dist: Some(1000),
            quality: None,
            suspect: false,
        }
    }

    #[test]
    fn round1p_rounds_half_away_from_zero() {
        assert_eq!(round1p(1.25), 1.3);
        assert_eq!(round1p(-1.25), -1.3);
        assert_eq!(round1p(1.24), 1.2);
    }

    #[test]
    fn round1p_is_idempotent() {
        for x in [0.0, 1.05, -3.37, 42.449] {
            assert_eq!(round1p(round1p(x)), round1p(x));
        }
    }

    /// §8 concrete scenario 6.
    #[test]
    fn scenario_6_gga_sentence_shape() {
        let fix = sample_fix();
        let s = format_fix(&fix, Dialect::Nmea, None);
        assert!(s.starts_with("$GPGGA,123456.00,"), "{s}");
        assert!(s.contains(",N,"));
        assert!(s.contains(",W,"));
        // Literal fix quality, empty sats/HDOP fields.
        assert!(s.contains(",1,,,"));
        assert!(s.contains("123.5,M,,"));
    }

    #[test]
    fn suspect_fix_uses_badfix_talker() {
        let mut fix = sample_fix();
        fix.suspect = true;
        let s = format_fix(&fix, Dialect::Nmea, None);
        assert!(s.contains("$PRTK,BADFIX,"));
        assert!(s.contains(",V,"));
        assert!(!s.contains("$GPGGA,"));
    }

    #[test]
    fn rmc_speed_is_six_two_and_course_is_empty() {
        let fix = sample_fix();
        let s = format_fix(&fix, Dialect::Nmea, None);
        // 5.0 m/s * 0.539956803 knots/(m/s) = 2.699784015, "%06.2f" -> "002.70".
        assert!(s.contains(",002.70,,,,"), "{s}");
    }

    #[test]
    fn native_dialect_uses_exponential_fields() {
        let fix = sample_fix();
        let s = format_fix(&fix, Dialect::Native, None);
        assert!(s.starts_with("123456,"));
        assert!(s.contains("e"));
        // Altitude present, no geoid grid: ten-space filler.
        assert!(s.contains(&" ".repeat(10)));
    }

    /// Geoid separation is `%+.3e`, velocity is `%+.8e` (gpsfmt.c:145,150) —
    /// the two precisions must not be swapped.
    #[test]
    fn native_dialect_keeps_geoid_and_velocity_precision_distinct() {
        use crate::geoid::GeoidGrid;
        use std::io::Write;

        let dir = std::env::temp_dir().join(format!("rtkgps_format_test_geoid_{}", std::process::id()));
        let mut f = std::fs::File::create(&dir).unwrap();
        // nlat=2, nlng=2 covering the sample fix's lat/lng (~34.4N, ~17.2W),
        // qscale=1, all cells = 100 (flat grid).
        f.write_all(&2u16.to_le_bytes()).unwrap();
        f.write_all(&2u16.to_le_bytes()).unwrap();
        f.write_all(&0.0f32.to_le_bytes()).unwrap();
        f.write_all(&40.0f32.to_le_bytes()).unwrap();
        f.write_all(&40.0f32.to_le_bytes()).unwrap();
        f.write_all(&(-20.0f32).to_le_bytes()).unwrap();
        f.write_all(&20.0f32.to_le_bytes()).unwrap();
        f.write_all(&0.0f32.to_le_bytes()).unwrap();
        f.write_all(&1.0f32.to_le_bytes()).unwrap();
        for _ in 0..4 {
            f.write_all(&100i16.to_le_bytes()).unwrap();
        }
        drop(f);
        let grid = GeoidGrid::open(&dir).unwrap();

        let fix = sample_fix();
        let s = format_fix(&fix, Dialect::Native, Some(&grid));
        std::fs::remove_file(&dir).ok();

        let body = s.trim_end_matches('\n');
        // time, lat, lng, alt, geoid-sep, vel
        let fields: Vec<&str> = body.split(',').collect();
        assert_eq!(fields.len(), 6, "{s}");
        let decimals_of = |field: &str| -> usize {
            let mantissa = field.split(['e', 'E']).next().unwrap();
            mantissa.split('.').nth(1).unwrap().len()
        };
        assert_eq!(decimals_of(fields[4]), 3, "geoid field {} should carry 3 decimal digits", fields[4]);
        assert_eq!(decimals_of(fields[5]), 8, "velocity field {} should carry 8 decimal digits", fields[5]);
    }

    /// §9 Open Question (b): the version field is a literal 12 characters.
    #[test]
    fn prtk_header_version_field_is_twelve_chars_wide() {
        let h = prtk_header("1.0", None);
        let body = h.strip_prefix('$').unwrap().split('*').next().unwrap();
        let version_field = body.split(',').nth(2).unwrap();
        assert_eq!(version_field.len(), 12);
        assert_eq!(version_field, "1.0         ");
    }

    #[test]
    fn native_header_matches_rngl_shape() {
        let h = native_header("20260101", 2, 47);
        assert_eq!(h, "RNGL\n20260101 2 47\n");
    }

    #[test]
    fn gpgsv_chunks_at_four_satellites() {
        let mut sats = [crate::fix::SatEntry { prn: 0, snr: 0 }; 12];
        for (i, s) in sats.iter_mut().enumerate() {
            s.prn = i as u8 + 1;
            s.snr = 40;
        }
        let out = gpgsv_sentences(6, &sats, false);
        let count = out.matches("$GPGSV").count();
        assert_eq!(count, 2);
    }
}
