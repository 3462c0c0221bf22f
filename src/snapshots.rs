use std::fs;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use glam::DVec3;
use log::warn;

use crate::error::SimError;
use crate::parameters::SnapshotFormat;
use crate::particles::Particle;
use crate::particles::ParticleType;

const MAGIC: &[u8; 4] = b"SRN1";
const VERSION: u8 = 1;

/// Snapshot of the fluid state at one output time.
pub struct Snapshot<'a> {
    pub time: f64,
    pub ndim: usize,
    pub parts: &'a [Particle],
}

/// Particle state reconstructed from a snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotData {
    pub time: f64,
    pub ndim: usize,
    pub parts: Vec<Particle>,
}

/// Writes a snapshot, retrying once before reporting the failure as
/// fatal.
pub fn write_snapshot(
    path: &Path,
    snapshot: &Snapshot,
    format: SnapshotFormat,
) -> Result<(), SimError> {
    match try_write(path, snapshot, format) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!("snapshot write to {path:?} failed ({first}); retrying once");
            try_write(path, snapshot, format).map_err(|source| SimError::Io {
                path: path.to_owned(),
                source,
            })
        }
    }
}

fn try_write(path: &Path, snapshot: &Snapshot, format: SnapshotFormat) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    match format {
        SnapshotFormat::Column => write_column(&mut writer, snapshot),
        SnapshotFormat::Sbin => write_binary(&mut writer, snapshot),
    }?;
    writer.flush()
}

fn real_parts<'a>(snapshot: &'a Snapshot) -> impl Iterator<Item = &'a Particle> {
    snapshot
        .parts
        .iter()
        .filter(|p| !p.is_ghost() && p.is_alive())
}

fn write_column(writer: &mut impl Write, snapshot: &Snapshot) -> std::io::Result<()> {
    let count = real_parts(snapshot).count();
    writeln!(writer, "{:.16e} {} {}", snapshot.time, snapshot.ndim, count)?;
    for part in real_parts(snapshot) {
        for d in 0..snapshot.ndim {
            write!(writer, "{:.16e} ", part.r[d])?;
        }
        for d in 0..snapshot.ndim {
            write!(writer, "{:.16e} ", part.v[d])?;
        }
        writeln!(
            writer,
            "{:.16e} {:.16e} {:.16e} {:.16e}",
            part.m, part.h, part.rho, part.u
        )?;
    }
    Ok(())
}

fn ptype_flag(ptype: ParticleType) -> u8 {
    match ptype {
        ParticleType::Gas => 0,
        ParticleType::Dust => 1,
        ParticleType::Cdm => 2,
        ParticleType::Dead => 3,
    }
}

fn flag_ptype(flag: u8) -> ParticleType {
    match flag {
        1 => ParticleType::Dust,
        2 => ParticleType::Cdm,
        3 => ParticleType::Dead,
        _ => ParticleType::Gas,
    }
}

/// Big-endian fixed header followed by struct-of-arrays field blocks.
fn write_binary(writer: &mut impl Write, snapshot: &Snapshot) -> std::io::Result<()> {
    let count = real_parts(snapshot).count() as u64;
    writer.write_all(MAGIC)?;
    writer.write_all(&[snapshot.ndim as u8, VERSION])?;
    writer.write_all(&snapshot.time.to_be_bytes())?;
    writer.write_all(&count.to_be_bytes())?;
    for d in 0..snapshot.ndim {
        for part in real_parts(snapshot) {
            writer.write_all(&part.r[d].to_be_bytes())?;
        }
    }
    for d in 0..snapshot.ndim {
        for part in real_parts(snapshot) {
            writer.write_all(&part.v[d].to_be_bytes())?;
        }
    }
    for field in [
        (|p: &Particle| p.m) as fn(&Particle) -> f64,
        |p| p.h,
        |p| p.rho,
        |p| p.u,
    ] {
        for part in real_parts(snapshot) {
            writer.write_all(&field(part).to_be_bytes())?;
        }
    }
    for part in real_parts(snapshot) {
        writer.write_all(&[ptype_flag(part.ptype)])?;
    }
    Ok(())
}

pub fn read_snapshot(path: &Path, format: SnapshotFormat) -> Result<SnapshotData, SimError> {
    let io_err = |source| SimError::Io {
        path: PathBuf::from(path),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    match format {
        SnapshotFormat::Column => read_column(&mut reader).map_err(io_err),
        SnapshotFormat::Sbin => read_binary(&mut reader).map_err(io_err),
    }
}

fn bad_data(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

fn read_column(reader: &mut impl BufRead) -> std::io::Result<SnapshotData> {
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let mut fields = header.split_whitespace();
    let time: f64 = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad_data("missing time"))?;
    let ndim: usize = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad_data("missing ndim"))?;
    let count: usize = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad_data("missing particle count"))?;
    let mut parts = Vec::with_capacity(count);
    for (id, line) in reader.lines().take(count).enumerate() {
        let line = line?;
        let values: Vec<f64> = line
            .split_whitespace()
            .map(|s| s.parse())
            .collect::<Result<_, _>>()
            .map_err(|_| bad_data("malformed particle row"))?;
        if values.len() != 2 * ndim + 4 {
            return Err(bad_data("wrong column count"));
        }
        let mut r = DVec3::ZERO;
        let mut v = DVec3::ZERO;
        for d in 0..ndim {
            r[d] = values[d];
            v[d] = values[ndim + d];
        }
        let mut part = Particle::new(id, r, v, values[2 * ndim], values[2 * ndim + 3]);
        part.h = values[2 * ndim + 1];
        part.rho = values[2 * ndim + 2];
        parts.push(part);
    }
    if parts.len() != count {
        return Err(bad_data("truncated snapshot"));
    }
    Ok(SnapshotData { time, ndim, parts })
}

fn read_exact_f64(reader: &mut impl Read) -> std::io::Result<f64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(f64::from_be_bytes(bytes))
}

fn read_binary(reader: &mut impl Read) -> std::io::Result<SnapshotData> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(bad_data("bad magic"));
    }
    let mut meta = [0u8; 2];
    reader.read_exact(&mut meta)?;
    let ndim = meta[0] as usize;
    if !(1..=3).contains(&ndim) {
        return Err(bad_data("bad ndim"));
    }
    if meta[1] != VERSION {
        return Err(bad_data("unsupported version"));
    }
    let time = read_exact_f64(reader)?;
    let mut count_bytes = [0u8; 8];
    reader.read_exact(&mut count_bytes)?;
    let count = u64::from_be_bytes(count_bytes) as usize;
    let mut parts: Vec<Particle> = (0..count)
        .map(|id| Particle::new(id, DVec3::ZERO, DVec3::ZERO, 0.0, 0.0))
        .collect();
    for d in 0..ndim {
        for part in parts.iter_mut() {
            part.r[d] = read_exact_f64(reader)?;
        }
    }
    for d in 0..ndim {
        for part in parts.iter_mut() {
            part.v[d] = read_exact_f64(reader)?;
        }
    }
    for field in [
        (|p: &mut Particle, x: f64| p.m = x) as fn(&mut Particle, f64),
        |p, x| p.h = x,
        |p, x| p.rho = x,
        |p, x| p.u = x,
    ] {
        for part in parts.iter_mut() {
            let value = read_exact_f64(reader)?;
            field(part, value);
        }
    }
    for part in parts.iter_mut() {
        let mut flag = [0u8; 1];
        reader.read_exact(&mut flag)?;
        part.ptype = flag_ptype(flag[0]);
    }
    Ok(SnapshotData { time, ndim, parts })
}
