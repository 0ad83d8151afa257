//! Durable snapshot records, one file per entity kind.
//!
//! Format: `[u32: len][bincode: record][u32: crc32]`, a single record per
//! file. `len` is the byte length of the bincode payload (not including the
//! CRC). Rewrites go through a temp file, fsync, then rename, so a crash
//! mid-write leaves the previous record intact.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a record to [len][bincode][crc32] format.
fn encode_record(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Atomically (re)write the snapshot record at `path`.
pub fn write_atomic<T: Serialize>(path: &Path, record: &T) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic_raw(path, &payload)
}

/// Same as [`write_atomic`] for an already-serialized payload. The store's
/// background writer serializes under the table lock and flushes here.
pub fn write_atomic_raw(path: &Path, payload: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("db.tmp");
    let file = File::create(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    encode_record(&mut writer, payload)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load the snapshot record at `path`. Returns `Ok(None)` if the file does
/// not exist yet; a truncated or corrupt record is an error (the record IS
/// the state, there is no valid prefix to fall back to).
pub fn load<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let mut crc_buf = [0u8; 4];
    reader.read_exact(&mut crc_buf)?;
    let stored_crc = u32::from_le_bytes(crc_buf);
    let computed_crc = crc32fast::hash(&payload);
    if stored_crc != computed_crc {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("snapshot CRC mismatch in {}", path.display()),
        ));
    }

    let record = bincode::deserialize(&payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(record))
}
