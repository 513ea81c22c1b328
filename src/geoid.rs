//! Component F — Geoid corrector (§3, §4.F).
//!
//! The logger reports ellipsoidal altitude; converting to orthometric
//! (above-sea-level) height needs a geoid undulation grid. The grid is
//! shipped as a flat binary file: a small header followed by `nlat*nlng`
//! quantized `int16` cells, and is memory-mapped read-only for its whole
//! lifetime rather than loaded onto the heap — the same approach
//! `other_examples` uses for its own static lookup tables. Reading every
//! multibyte field with `from_le_bytes` also does the big-endian-host byte
//! swap the spec calls for, the same trick used in the fix decoder.
//!
//! Header layout (little-endian, 32 bytes):
//! ```text
//! offset  0  u16  nlat
//! offset  2  u16  nlng
//! offset  4  f32  latmin
//! offset  8  f32  latstp
//! offset 12  f32  latmax
//! offset 16  f32  lngmin
//! offset 20  f32  lngstp
//! offset 24  f32  lngmax
//! offset 28  f32  qscale
//! offset 32  ..   nlat*nlng i16 cells, indexed as ilng * nlat + ilat
//! ```
//!
//! Query coordinates are in **degrees**; a caller holding a fix's lat/lng in
//! radians converts by multiplying by `360 / (2*PI)` first.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::error::{Result, RtkError};

const HEADER_LEN: usize = 32;

pub struct GeoidGrid {
    mmap: Mmap,
    nlat: u16,
    nlng: u16,
    latmin: f32,
    latstp: f32,
    latmax: f32,
    lngmin: f32,
    lngstp: f32,
    lngmax: f32,
    qscale: f32,
}

impl GeoidGrid {
    pub fn open(path: &Path) -> Result<GeoidGrid> {
        let file = File::open(path).map_err(RtkError::SystemIo)?;
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(RtkError::SystemIo)?;
        if mmap.len() < HEADER_LEN {
            return Err(RtkError::ParseError("geoid grid file too small for header".into()));
        }

        let nlat = u16::from_le_bytes(mmap[0..2].try_into().unwrap());
        let nlng = u16::from_le_bytes(mmap[2..4].try_into().unwrap());
        let latmin = f32::from_le_bytes(mmap[4..8].try_into().unwrap());
        let latstp = f32::from_le_bytes(mmap[8..12].try_into().unwrap());
        let latmax = f32::from_le_bytes(mmap[12..16].try_into().unwrap());
        let lngmin = f32::from_le_bytes(mmap[16..20].try_into().unwrap());
        let lngstp = f32::from_le_bytes(mmap[20..24].try_into().unwrap());
        let lngmax = f32::from_le_bytes(mmap[24..28].try_into().unwrap());
        let qscale = f32::from_le_bytes(mmap[28..32].try_into().unwrap());

        let expected = HEADER_LEN + (nlat as usize) * (nlng as usize) * 2;
        if mmap.len() < expected {
            return Err(RtkError::ParseError("geoid grid file truncated relative to header".into()));
        }
        if nlat < 2 || nlng < 2 || latstp <= 0.0 || lngstp <= 0.0 || qscale == 0.0 {
            return Err(RtkError::ParseError("geoid grid header is degenerate".into()));
        }

        Ok(GeoidGrid {
            mmap,
            nlat,
            nlng,
            latmin,
            latstp,
            latmax,
            lngmin,
            lngstp,
            lngmax,
            qscale,
        })
    }

    fn cell(&self, ilng: u16, ilat: u16) -> f32 {
        let idx = HEADER_LEN + (ilng as usize * self.nlat as usize + ilat as usize) * 2;
        let raw = i16::from_le_bytes(self.mmap[idx..idx + 2].try_into().unwrap());
        raw as f32 / self.qscale
    }

    /// Bilinearly interpolated geoid undulation at `(lat, lng)` degrees, in
    /// metres. Returns `NaN` outside the grid's bounding box (§4.F step 1).
    pub fn undulation(&self, lat: f32, lng: f32) -> f32 {
        if lat < self.latmin || lat > self.latmax || lng < self.lngmin || lng > self.lngmax {
            return f32::NAN;
        }

        let slat = (lat - self.latmin) / self.latstp;
        let slng = (lng - self.lngmin) / self.lngstp;

        let ilat0 = slat.floor();
        let ilng0 = slng.floor();
        let y = slat - ilat0;
        let x = slng - ilng0;

        let ilat0 = ilat0 as u16;
        let ilng0 = ilng0 as u16;
        let ilat1 = (ilat0 + 1).min(self.nlat - 1);
        let ilng1 = (ilng0 + 1).min(self.nlng - 1);

        let g00 = self.cell(ilng0, ilat0);
        let g01 = self.cell(ilng1, ilat0);
        let g10 = self.cell(ilng0, ilat1);
        let g11 = self.cell(ilng1, ilat1);

        let xbar = 1.0 - x;
        let ybar = 1.0 - y;
        g00 * xbar * ybar + g01 * x * ybar + g10 * xbar * y + g11 * x * y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_grid(path: &Path, nlat: u16, nlng: u16, latmin: f32, latstp: f32, lngmin: f32, lngstp: f32, qscale: f32, cells: &[i16]) {
        let latmax = latmin + latstp * (nlat - 1) as f32;
        let lngmax = lngmin + lngstp * (nlng - 1) as f32;
        let mut f = File::create(path).unwrap();
        f.write_all(&nlat.to_le_bytes()).unwrap();
        f.write_all(&nlng.to_le_bytes()).unwrap();
        f.write_all(&latmin.to_le_bytes()).unwrap();
        f.write_all(&latstp.to_le_bytes()).unwrap();
        f.write_all(&latmax.to_le_bytes()).unwrap();
        f.write_all(&lngmin.to_le_bytes()).unwrap();
        f.write_all(&lngstp.to_le_bytes()).unwrap();
        f.write_all(&lngmax.to_le_bytes()).unwrap();
        f.write_all(&qscale.to_le_bytes()).unwrap();
        for &v in cells {
            f.write_all(&v.to_le_bytes()).unwrap();
        }
    }

    /// §8 concrete scenario 5: a 2x2 grid {0, 100, 100, 200} at a unit cell's
    /// corners, qscale=1, queried at centre yields 100.
    #[test]
    fn scenario_5_centre_of_unit_cell() {
        let dir = std::env::temp_dir().join(format!("rtkgps_geoid_test_s5_{}", std::process::id()));
        // ilng*nlat+ilat indexing with nlat=2: index 0=(ilng0,ilat0), 1=(ilng0,ilat1),
        // 2=(ilng1,ilat0), 3=(ilng1,ilat1).
        build_grid(&dir, 2, 2, 0.0, 1.0, 0.0, 1.0, 1.0, &[0, 100, 100, 200]);
        let grid = GeoidGrid::open(&dir).unwrap();
        let v = grid.undulation(0.5, 0.5);
        assert!((v - 100.0).abs() < 1e-4, "{v}");
        std::fs::remove_file(&dir).ok();
    }

    #[test]
    fn undulation_at_grid_node_is_exact() {
        let dir = std::env::temp_dir().join(format!("rtkgps_geoid_test_node_{}", std::process::id()));
        build_grid(&dir, 2, 2, 0.0, 1.0, 0.0, 1.0, 2.0, &[10, 20, 30, 40]);
        let grid = GeoidGrid::open(&dir).unwrap();
        assert!((grid.undulation(0.0, 0.0) - 5.0).abs() < 1e-4);
        std::fs::remove_file(&dir).ok();
    }

    #[test]
    fn undulation_out_of_range_is_nan() {
        let dir = std::env::temp_dir().join(format!("rtkgps_geoid_test_oob_{}", std::process::id()));
        build_grid(&dir, 2, 2, 0.0, 1.0, 0.0, 1.0, 1.0, &[0, 0, 0, 0]);
        let grid = GeoidGrid::open(&dir).unwrap();
        assert!(grid.undulation(-1.0, 0.0).is_nan());
        std::fs::remove_file(&dir).ok();
    }
}
