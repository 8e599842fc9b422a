//! Exact nearest-neighbour index over fixed-dimension vectors.
//!
//! Rows are append-only and addressed by their insertion offset. Distances are
//! squared Euclidean, the same figure a flat L2 index reports.
//!
//! On disk the index is a small little-endian header followed by the raw rows:
//!
//! ```text
//! magic "RSVX" | version u32 | dimension u32 | rows u64 | model_id len u32 | model_id bytes
//! rows * dimension * f32
//! ```

use crate::{IngestError, SearchError};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"RSVX";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub offset: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    model_id: String,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize, model_id: impl Into<String>) -> Self {
        Self {
            dimension,
            model_id: model_id.into(),
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Identity of the encoder that produced the stored vectors.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vector(&self, offset: usize) -> Option<&[f32]> {
        let start = offset.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Appends all vectors or none of them.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IngestError> {
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(IngestError::Index(format!(
                "vector dimension {} != index dimension {}",
                bad.len(),
                self.dimension
            )));
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Drops every row at or after `rows`.
    pub fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows.saturating_mul(self.dimension));
    }

    /// The `k` closest rows, nearest first. Equal distances keep row order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SearchError> {
        if query.len() != self.dimension {
            return Err(SearchError::Index(format!(
                "query dimension {} != index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(offset, row)| Neighbor {
                offset,
                distance: squared_l2(query, row),
            })
            .collect();

        neighbors.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// Writes to a sibling temp file first so a crash never leaves a torn index.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let staging = path.with_extension("index.tmp");
        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        std::fs::rename(&staging, path)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }

    fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let model_id = self.model_id.as_bytes();
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&to_u32(self.dimension)?.to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        writer.write_all(&to_u32(model_id.len())?.to_le_bytes())?;
        writer.write_all(model_id)?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }

    fn read_from(reader: &mut impl Read) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(invalid_data("not a vector index file"));
        }

        let version = read_u32(reader)?;
        if version != FORMAT_VERSION {
            return Err(invalid_data(&format!("unsupported index version {version}")));
        }

        let dimension = read_u32(reader)? as usize;
        let rows = usize::try_from(read_u64(reader)?)
            .map_err(|_| invalid_data("row count overflows usize"))?;
        let model_len = read_u32(reader)? as usize;

        let mut model_id = vec![0u8; model_len];
        reader.read_exact(&mut model_id)?;
        let model_id =
            String::from_utf8(model_id).map_err(|_| invalid_data("model id is not utf-8"))?;

        let values = rows
            .checked_mul(dimension)
            .ok_or_else(|| invalid_data("index size overflows usize"))?;
        let mut data = Vec::with_capacity(values);
        let mut buffer = [0u8; 4];
        for _ in 0..values {
            reader.read_exact(&mut buffer)?;
            data.push(f32::from_le_bytes(buffer));
        }

        Ok(Self {
            dimension,
            model_id,
            data,
        })
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}

fn to_u32(value: usize) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| invalid_data("value does not fit in u32"))
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}
