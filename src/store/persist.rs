//! Durable save/load for [`VectorIndex`].
//!
//! Two artifacts, rewritten in full on every save:
//!
//! - *vector blob*: `WVIX` magic, format version, dimension and row count,
//!   then row-major f32 little-endian vector data;
//! - *metadata record*: pretty-printed JSON mapping the stringified row
//!   position to its `{id, meta}` entry, inspectable with any text tool.
//!
//! Loading validates that the two artifacts agree before replacing state.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::info;

use super::{IndexEntry, IndexError, VectorIndex};

const MAGIC: &[u8; 4] = b"WVIX";
const FORMAT_VERSION: u32 = 1;

impl VectorIndex {
    /// Write the vector blob to `index_path` and the metadata record to
    /// `meta_path`. Not safe to run concurrently with `add`.
    pub fn save<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        index_path: P,
        meta_path: Q,
    ) -> Result<(), IndexError> {
        let index_path = index_path.as_ref();
        let meta_path = meta_path.as_ref();

        let mut blob = BufWriter::new(File::create(index_path)?);
        blob.write_all(MAGIC)?;
        blob.write_all(&FORMAT_VERSION.to_le_bytes())?;
        blob.write_all(&(self.dim as u32).to_le_bytes())?;
        blob.write_all(&(self.entries.len() as u64).to_le_bytes())?;
        for value in &self.vectors {
            blob.write_all(&value.to_le_bytes())?;
        }
        blob.flush()?;

        let record: BTreeMap<String, &IndexEntry> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position.to_string(), entry))
            .collect();
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(meta_path, json)?;

        info!(
            "saved {} vectors to {} and metadata to {}",
            self.entries.len(),
            index_path.display(),
            meta_path.display()
        );
        Ok(())
    }

    /// Rebuild an index from previously saved artifacts. The returned index
    /// fully replaces any in-memory state; there is no partial load.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        index_path: P,
        meta_path: Q,
    ) -> Result<Self, IndexError> {
        let index_path = index_path.as_ref();
        let meta_path = meta_path.as_ref();

        let mut blob = BufReader::new(File::open(index_path)?);

        let mut magic = [0u8; 4];
        blob.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::Corrupt(format!(
                "bad magic in {}",
                index_path.display()
            )));
        }

        let version = read_u32(&mut blob)?;
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }

        let dim = read_u32(&mut blob)? as usize;
        let count = read_u64(&mut blob)? as usize;

        let mut vectors = Vec::with_capacity(dim * count);
        let mut buf = [0u8; 4];
        for _ in 0..dim * count {
            blob.read_exact(&mut buf)?;
            vectors.push(f32::from_le_bytes(buf));
        }

        let meta_file = File::open(meta_path)?;
        let record: BTreeMap<String, IndexEntry> =
            serde_json::from_reader(BufReader::new(meta_file))?;
        if record.len() != count {
            return Err(IndexError::Corrupt(format!(
                "vector blob holds {count} rows but metadata record holds {}",
                record.len()
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for position in 0..count {
            let entry = record.get(&position.to_string()).ok_or_else(|| {
                IndexError::Corrupt(format!("metadata record missing position {position}"))
            })?;
            entries.push(entry.clone());
        }

        info!(
            "loaded {count} vectors (dim {dim}) from {}",
            index_path.display()
        );
        Ok(Self {
            dim,
            vectors,
            entries,
        })
    }
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, IndexError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, IndexError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
