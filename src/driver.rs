//! Component H — Driver (§4.H, §6).
//!
//! Sequences the protocol client, fix decoder, geoid corrector and output
//! formatter behind the six CLI verbs, and owns the mode-preservation
//! discipline: GPS-mouse-mode (and, for `read`, logging) are disabled before
//! solicited commands and restored on every return path, success or error
//! (§4.D, §9).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn as log_warn};

use crate::config::{FilenameStyle, RuntimeConfig};
use crate::error::{Result, RtkError};
use crate::fix::{self, Fix};
use crate::format::{self, Dialect};
use crate::fsutil;
use crate::geoid::GeoidGrid;
use crate::progress::ProgressBar;
use crate::protocol::{FileInfo, ProtocolClient};
use crate::transport::IoSource;
use crate::warn::WarnSink;

/// Per-verb context: the protocol client plus the two advisory sinks §9
/// calls out as the replacement for the source's hidden file-scope
/// globals.
pub struct Context<'t, T: IoSource> {
    pub client: ProtocolClient<'t, T>,
    pub warn: WarnSink,
    pub progress: ProgressBar,
}

impl<'t, T: IoSource> Context<'t, T> {
    pub fn new(client: ProtocolClient<'t, T>, progress_enabled: bool) -> Self {
        Context {
            client,
            warn: WarnSink::new(),
            progress: ProgressBar::new(progress_enabled),
        }
    }

}

/// Run `f` with GPS-mouse-mode disabled (and, if `disable_logging`, logging
/// disabled too), restoring prior state afterward regardless of whether `f`
/// succeeded (§4.D "mode-preservation discipline").
fn with_mode_preserved<T, F, R>(client: &mut ProtocolClient<T>, disable_logging: bool, f: F) -> Result<R>
where
    T: IoSource,
    F: FnOnce(&mut ProtocolClient<T>) -> Result<R>,
{
    let saved_gpsms = client.get_status()?.gpsms;
    let changed = saved_gpsms || disable_logging;
    if changed {
        client.set_mode(!disable_logging, false)?;
    }

    let result = f(client);

    let restore = if changed { client.set_mode(true, saved_gpsms) } else { Ok(()) };
    if let Err(e) = &restore {
        log_warn!("mode restoration failed: {e}");
    }

    result
}

fn fxtyp_from_record_type(s: &str) -> Result<u8> {
    match s {
        "tl" => Ok(0),
        "tla" => Ok(1),
        "tlav" => Ok(2),
        other => Err(RtkError::ParseError(format!("unknown record type {other}"))),
    }
}

fn mfowm_from_char(c: char) -> Result<u8> {
    match c {
        'o' => Ok(0),
        's' => Ok(1),
        other => Err(RtkError::ParseError(format!("unknown memory-full mode {other}"))),
    }
}

// ── status ──────────────────────────────────────────────────────────────────

pub fn cmd_status<T: IoSource>(ctx: &mut Context<T>, extended: bool) -> Result<()> {
    let status = with_mode_preserved(&mut ctx.client, false, |c| c.get_status())?;
    println!("fix type:        {}", status.fxtyp);
    println!("mouse mode:      {}", if status.gpsms { "on" } else { "off" });
    println!("sampling:        {}s", status.sntvl);
    println!("gps receive:     {}", status.gpsrx);
    println!("files:           {}", status.nfile);
    println!("fixes (active):  {}", status.nfix);

    if !extended {
        return Ok(());
    }

    let (bounds, mem, fw, files) = with_mode_preserved(&mut ctx.client, false, |c| {
        let bounds = c.get_log_bounds()?;
        let mem = c.get_memory_info()?;
        let fw = c.get_firmware_info()?;
        let files = list_all_files(c, status.nfile)?;
        Ok((bounds, mem, fw, files))
    })?;
    println!("log bounds:      {} {} .. {} {}", bounds.date1, bounds.time1, bounds.date2, bounds.time2);
    println!("memory:          {} bytes ({} x {}-byte sectors)", mem.nbytes, mem.num_sectors, mem.sector_size);
    println!(
        "firmware:        version={:?} tag={:?} baud={:?} driver={:?}",
        fw.version, fw.firmware_tag, fw.default_baud, fw.driver_revision
    );
    // §9 Open Question (c): used-memory sums per-file nfix*fix_size(fxtyp),
    // which may double-count across a ring wrap. The clamped variant is
    // shown alongside the raw sum rather than presented as "the" answer.
    let raw_used: u64 = files
        .iter()
        .map(|f| f.nfix as u64 * fix::fix_size(f.fxtyp).unwrap_or(0) as u64)
        .sum();
    if status.mfowm == 0 {
        let clamped = raw_used.min(mem.nbytes);
        println!("memory used:     {raw_used} bytes (raw sum); {clamped} bytes (ring-wrap clamped)");
    } else {
        println!("memory used:     {raw_used} bytes");
    }

    Ok(())
}

// ── date ─────────────────────────────────────────────────────────────────────

pub fn cmd_date<T: IoSource>(ctx: &mut Context<T>) -> Result<()> {
    let (date, time) = ctx.client.get_current_utc()?;
    println!("{date} {time}");
    Ok(())
}

// ── list ─────────────────────────────────────────────────────────────────────

fn list_all_files<T: IoSource>(client: &mut ProtocolClient<T>, nfile: u16) -> Result<Vec<FileInfo>> {
    let mut files = Vec::with_capacity(nfile as usize);
    for n in 0..nfile as u32 {
        files.push(client.get_file_info(n)?);
    }
    Ok(files)
}

pub fn cmd_list<T: IoSource>(ctx: &mut Context<T>) -> Result<()> {
    let nfile = ctx.client.get_status()?.nfile;
    let files = with_mode_preserved(&mut ctx.client, false, |c| list_all_files(c, nfile))?;
    for (i, f) in files.iter().enumerate() {
        println!("{i:3}  {}  fxtyp={}  nfix={:5}  mempointer=0x{:x}", f.date, f.fxtyp, f.nfix, f.mempointer);
    }
    Ok(())
}

// ── set ──────────────────────────────────────────────────────────────────────

pub struct SetArgs {
    pub mouse: Option<bool>,
    pub record_type: Option<String>,
    pub mfowm: Option<char>,
    pub sntvl: Option<u8>,
}

pub fn cmd_set<T: IoSource>(ctx: &mut Context<T>, args: SetArgs) -> Result<()> {
    let status = ctx.client.get_status()?;

    if let Some(mouse) = args.mouse {
        ctx.client.set_mode(true, mouse)?;
    }

    if args.record_type.is_some() || args.mfowm.is_some() || args.sntvl.is_some() {
        let fxtyp = args
            .record_type
            .as_deref()
            .map(fxtyp_from_record_type)
            .transpose()?
            .unwrap_or(status.fxtyp);
        let mfowm = args.mfowm.map(mfowm_from_char).transpose()?.unwrap_or(status.mfowm);
        let sntvl = args.sntvl.unwrap_or(status.sntvl);
        if !(1..=60).contains(&sntvl) {
            return Err(RtkError::ParseError(format!("sampling interval {sntvl} out of range 1..60")));
        }
        ctx.client.set_status(sntvl, fxtyp, mfowm)?;
    }

    Ok(())
}

// ── erase ────────────────────────────────────────────────────────────────────

pub fn cmd_erase<T: IoSource>(ctx: &mut Context<T>, confirmed: bool) -> Result<()> {
    if !confirmed {
        eprint!("Erase all device memory? [y/N] ");
        std::io::stderr().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map_err(RtkError::SystemIo)?;
        if !line.trim().eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }
    ctx.client.erase_memory()
}

// ── read ─────────────────────────────────────────────────────────────────────

pub struct ReadArgs {
    pub native: bool,
    pub dest: Option<PathBuf>,
    pub skip_existing: bool,
    pub file_selector: Option<String>,
}

/// Parse `-f N|N-|-N|N-M` into an inclusive, 0-based `[start, end]` range,
/// clamped to the files actually present.
fn parse_file_selector(spec: &str, nfile: u32) -> Result<(u32, u32)> {
    if nfile == 0 {
        return Err(RtkError::ParseError("no log files present".into()));
    }
    let last = nfile - 1;
    let bad = || RtkError::ParseError(format!("malformed file selector {spec}"));

    if let Some(rest) = spec.strip_suffix('-') {
        let n: u32 = rest.parse().map_err(|_| bad())?;
        return Ok((n.min(last), last));
    }
    if let Some(rest) = spec.strip_prefix('-') {
        let n: u32 = rest.parse().map_err(|_| bad())?;
        return Ok((0, n.min(last)));
    }
    if let Some((a, b)) = spec.split_once('-') {
        let a: u32 = a.parse().map_err(|_| bad())?;
        let b: u32 = b.parse().map_err(|_| bad())?;
        if a > b {
            return Err(bad());
        }
        return Ok((a.min(last), b.min(last)));
    }
    let n: u32 = spec.parse().map_err(|_| bad())?;
    Ok((n.min(last), n.min(last)))
}

fn output_extension(native: bool) -> &'static str {
    if native { "rngl" } else { "nmea" }
}

/// `<date>_<hex-mempointer>[_part].ext` or `<date>T<HHMMSS>Z[_part].ext`,
/// per the configured naming convention. `is_active` appends `_part`, the
/// source's marker that the file is still being recorded (`rtkgps.c`'s
/// `flnm == status->nfile-1` check).
fn output_filename(file: &FileInfo, first_fix: Option<&Fix>, style: FilenameStyle, native: bool, is_active: bool) -> String {
    let ext = output_extension(native);
    let part = if is_active { "_part" } else { "" };
    match style {
        FilenameStyle::MemPointer => format!("{}_{:x}{part}.{ext}", file.date, file.mempointer),
        FilenameStyle::DateTime => {
            let time = first_fix
                .map(|f| format!("{:02}{:02}{:02}", f.hour, f.min, f.sec))
                .unwrap_or_else(|| "000000".to_string());
            format!("{}T{}Z{part}.{ext}", file.date, time)
        }
    }
}

pub fn cmd_read<T: IoSource>(ctx: &mut Context<T>, args: ReadArgs, config: &RuntimeConfig) -> Result<()> {
    let geoid = match &config.geoid_grid {
        Some(path) => Some(GeoidGrid::open(path)?),
        None => None,
    };
    let dialect = if args.native { Dialect::Native } else { Dialect::Nmea };

    let saved_gpsms = ctx.client.get_status()?.gpsms;
    ctx.client.set_mode(false, false)?;

    let result = (|| {
        ctx.warn.reset();
        let status = ctx.client.get_status()?;
        let files = list_all_files(&mut ctx.client, status.nfile)?;
        let (start, end) = match &args.file_selector {
            Some(spec) => parse_file_selector(spec, files.len() as u32)?,
            None => (0, files.len().saturating_sub(1) as u32),
        };
        let total_selected = end - start + 1;

        let single_file_dest = args.dest.as_ref().filter(|d| !fsutil::is_directory(d));
        let mut single_writer = match single_file_dest {
            Some(path) => {
                fsutil::backup_existing(path)?;
                Some(BufWriter::new(File::create(path).map_err(RtkError::SystemIo)?))
            }
            None => None,
        };

        if !args.native {
            if let Some(w) = single_writer.as_mut() {
                w.write_all(format::prtk_header("1.0", None).as_bytes()).map_err(RtkError::SystemIo)?;
            }
        }

        for idx in start..=end {
            let file = &files[idx as usize];
            let is_active = idx as u16 == status.nfile.saturating_sub(1);

            let dest_path = match &args.dest {
                Some(dir) if fsutil::is_directory(dir) => Some(dir.clone()),
                _ => None,
            };

            // Borrow `client` and the `warn`/`progress` fields separately (not
            // through `ctx.emit_warning`, a method call on the whole `Context`)
            // so the disjoint-field capture below doesn't conflict with the
            // `ctx.client` receiver borrow.
            let Context { client, warn, progress } = &mut *ctx;
            let fixes = client.fetch_fixes(file.mempointer, file.fxtyp, file.nfix, &mut |msg| {
                warn.warn(progress, msg);
            })?;
            ctx.progress.update(idx - start + 1, total_selected);

            if let Some(dir) = dest_path {
                let name = output_filename(file, fixes.first(), config.filename_style, args.native, is_active);
                let path = dir.join(name);
                if args.skip_existing && !is_active && fsutil::is_nonempty_regular_file(&path) {
                    continue;
                }
                write_file(&path, &fixes, dialect, geoid.as_ref(), file, args.native)?;
            } else if let Some(w) = single_writer.as_mut() {
                write_fixes(w, &fixes, dialect, geoid.as_ref())?;
            } else {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                write_fixes(&mut lock, &fixes, dialect, geoid.as_ref())?;
            }
        }

        info!("read complete: {} file(s)", end.saturating_sub(start) + 1);
        ctx.progress.clear_line();
        Ok(())
    })();

    let restore = ctx.client.set_mode(true, saved_gpsms);
    if let Err(e) = &restore {
        log_warn!("mode restoration failed: {e}");
    }

    result
}

fn write_file(path: &Path, fixes: &[Fix], dialect: Dialect, geoid: Option<&GeoidGrid>, file: &FileInfo, native: bool) -> Result<()> {
    let mut w = BufWriter::new(File::create(path).map_err(RtkError::SystemIo)?);
    if native {
        w.write_all(format::native_header(&file.date, file.fxtyp, file.nfix).as_bytes())
            .map_err(RtkError::SystemIo)?;
    }
    write_fixes(&mut w, fixes, dialect, geoid)
}

fn write_fixes<W: Write>(w: &mut W, fixes: &[Fix], dialect: Dialect, geoid: Option<&GeoidGrid>) -> Result<()> {
    for fix in fixes {
        w.write_all(format::format_fix(fix, dialect, geoid).as_bytes()).map_err(RtkError::SystemIo)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_file_selector_single() {
        assert_eq!(parse_file_selector("2", 5).unwrap(), (2, 2));
    }

    #[test]
    fn parse_file_selector_open_ended_start() {
        assert_eq!(parse_file_selector("3-", 5).unwrap(), (3, 4));
    }

    #[test]
    fn parse_file_selector_open_ended_end() {
        assert_eq!(parse_file_selector("-2", 5).unwrap(), (0, 2));
    }

    #[test]
    fn parse_file_selector_range() {
        assert_eq!(parse_file_selector("1-3", 5).unwrap(), (1, 3));
    }

    #[test]
    fn parse_file_selector_rejects_garbage() {
        assert!(parse_file_selector("x-y", 5).is_err());
    }

    #[test]
    fn parse_file_selector_rejects_reversed_range() {
        assert!(parse_file_selector("3-1", 5).is_err());
    }

    #[test]
    fn mempointer_filename_is_hex() {
        let file = FileInfo {
            date: "20260101".to_string(),
            fxtyp: 0,
            nfix: 10,
            mempointer: 255,
        };
        let name = output_filename(&file, None, FilenameStyle::MemPointer, false, false);
        assert_eq!(name, "20260101_ff.nmea");
    }

    #[test]
    fn active_file_gets_part_suffix() {
        let file = FileInfo {
            date: "20260101".to_string(),
            fxtyp: 0,
            nfix: 10,
            mempointer: 255,
        };
        let name = output_filename(&file, None, FilenameStyle::MemPointer, false, true);
        assert_eq!(name, "20260101_ff_part.nmea");
    }
}
