//! Range-indexed table store
//!
//! A store is one file holding fixed-width tables plus a manifest:
//!
//! ```text
//! magic "ABXSTORE" | version u32 LE | manifest offset u64 LE | table sections | manifest
//! ```
//!
//! Every table section is a run of little-endian rows of `N` cells of one
//! [`Cell`] type. The manifest (bincode) records, per table, its byte offset,
//! row count and a range index mapping by-level keys to `[start, end)` row
//! spans, plus an opaque metadata blob owned by the caller. Readers seek
//! straight to the rows they need.
//!
//! Tables are spooled to anonymous temp files while rows arrive. The final
//! file is assembled next to its destination as `<path>.tmp` and renamed into
//! place, so a failed run never leaves a truncated store behind.

use abx_core::{Error, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MAGIC: &[u8; 8] = b"ABXSTORE";
pub const VERSION: u32 = 1;
const HEADER_LEN: u64 = 8 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    U64,
    I64,
    F64,
    I8,
}

/// Fixed-width little-endian table cell
pub trait Cell: Copy + Send + Sync + 'static {
    const TYPE: CellType;
    const WIDTH: usize;

    fn write_le(self, out: &mut Vec<u8>);

    /// `bytes` holds at least `WIDTH` bytes
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_cell {
    ($t:ty, $kind:ident) => {
        impl Cell for $t {
            const TYPE: CellType = CellType::$kind;
            const WIDTH: usize = std::mem::size_of::<$t>();

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..Self::WIDTH]);
                <$t>::from_le_bytes(buf)
            }
        }
    };
}

impl_cell!(u64, U64);
impl_cell!(i64, I64);
impl_cell!(f64, F64);
impl_cell!(i8, I8);

/// Rows `[start, end)` belonging to one by-level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub key: String,
    pub start: u64,
    pub end: u64,
}

impl RangeEntry {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub cell: CellType,
    pub columns: u32,
    /// Byte offset of the first row in the store file
    pub offset: u64,
    pub rows: u64,
    pub ranges: Vec<RangeEntry>,
}

impl TableDescriptor {
    #[inline]
    pub fn row_width(&self) -> u64 {
        self.columns as u64 * cell_width(self.cell) as u64
    }

    pub fn range(&self, key: &str) -> Option<&RangeEntry> {
        self.ranges.iter().find(|r| r.key == key)
    }
}

fn cell_width(cell: CellType) -> usize {
    match cell {
        CellType::U64 => u64::WIDTH,
        CellType::I64 => i64::WIDTH,
        CellType::F64 => f64::WIDTH,
        CellType::I8 => i8::WIDTH,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    tables: Vec<TableDescriptor>,
    metadata: Vec<u8>,
}

/// A finished table waiting to be assembled into a store
#[derive(Debug)]
pub struct SpooledTable {
    descriptor: TableDescriptor,
    spool: File,
}

impl SpooledTable {
    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }
}

/// Appends rows of one table, grouped in by-level ranges
pub struct TableWriter<T: Cell, const N: usize> {
    name: String,
    spool: BufWriter<File>,
    rows: u64,
    ranges: Vec<RangeEntry>,
    open: Option<(String, u64)>,
    buf: Vec<u8>,
    _cell: PhantomData<T>,
}

impl<T: Cell, const N: usize> TableWriter<T, N> {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            spool: BufWriter::new(tempfile::tempfile()?),
            rows: 0,
            ranges: Vec::new(),
            open: None,
            buf: Vec::with_capacity(N * T::WIDTH),
            _cell: PhantomData,
        })
    }

    pub fn begin_range(&mut self, key: &str) -> Result<()> {
        if let Some((open, _)) = &self.open {
            return Err(Error::Storage(format!(
                "table `{}`: range `{}` is still open",
                self.name, open
            )));
        }
        if self.ranges.iter().any(|r| r.key == key) {
            return Err(Error::Storage(format!(
                "table `{}`: duplicated range `{}`",
                self.name, key
            )));
        }
        self.open = Some((key.to_string(), self.rows));
        Ok(())
    }

    #[inline]
    pub fn push(&mut self, row: [T; N]) -> Result<()> {
        self.buf.clear();
        for cell in row {
            cell.write_le(&mut self.buf);
        }
        self.spool.write_all(&self.buf)?;
        self.rows += 1;
        Ok(())
    }

    pub fn end_range(&mut self) -> Result<()> {
        let (key, start) = self.open.take().ok_or_else(|| {
            Error::Storage(format!("table `{}`: no open range", self.name))
        })?;
        self.ranges.push(RangeEntry {
            key,
            start,
            end: self.rows,
        });
        Ok(())
    }

    #[inline]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> Result<SpooledTable> {
        if self.open.is_some() {
            self.end_range()?;
        }
        let spool = self.spool.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        Ok(SpooledTable {
            descriptor: TableDescriptor {
                name: self.name,
                cell: T::TYPE,
                columns: N as u32,
                offset: 0,
                rows: self.rows,
                ranges: self.ranges,
            },
            spool,
        })
    }
}

/// Assembles spooled tables and metadata into a store file
pub struct StoreWriter {
    path: PathBuf,
    tables: Vec<SpooledTable>,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

impl StoreWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            tables: Vec::new(),
        }
    }

    pub fn add(&mut self, table: SpooledTable) -> Result<()> {
        let name = &table.descriptor.name;
        if self.tables.iter().any(|t| &t.descriptor.name == name) {
            return Err(Error::Storage(format!("duplicated table `{}`", name)));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Write the store to `<path>.tmp`, then rename it into place
    pub fn commit<M: Serialize>(self, metadata: &M) -> Result<()> {
        let tmp = tmp_path(&self.path);
        let result = Self::assemble(&tmp, self.tables, metadata);
        match result {
            Ok(()) => {
                fs::rename(&tmp, &self.path)?;
                debug!("Store written to {:?}", self.path);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    fn assemble<M: Serialize>(tmp: &Path, tables: Vec<SpooledTable>, metadata: &M) -> Result<()> {
        let mut out = BufWriter::new(File::create(tmp)?);
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;
        out.write_all(&0u64.to_le_bytes())?;

        let mut offset = HEADER_LEN;
        let mut descriptors = Vec::with_capacity(tables.len());
        for table in tables {
            let SpooledTable {
                mut descriptor,
                mut spool,
            } = table;
            spool.seek(SeekFrom::Start(0))?;
            let copied = io::copy(&mut spool, &mut out)?;
            if copied != descriptor.rows * descriptor.row_width() {
                return Err(Error::Storage(format!(
                    "table `{}`: spooled {} bytes for {} rows",
                    descriptor.name, copied, descriptor.rows
                )));
            }
            descriptor.offset = offset;
            offset += copied;
            descriptors.push(descriptor);
        }

        let manifest = Manifest {
            tables: descriptors,
            metadata: bincode::serialize(metadata)
                .map_err(|e| Error::Serialization(e.to_string()))?,
        };
        let bytes = bincode::serialize(&manifest).map_err(|e| Error::Serialization(e.to_string()))?;
        out.write_all(&bytes)?;

        let mut file = out.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(12))?;
        file.write_all(&offset.to_le_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

/// Read-only view of a store file
#[derive(Debug)]
pub struct StoreReader {
    path: PathBuf,
    file: Mutex<File>,
    manifest: Manifest,
}

impl StoreReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header).map_err(|_| {
            Error::Storage(format!("{:?} is too short to be a store", path))
        })?;
        if &header[..8] != MAGIC {
            return Err(Error::Storage(format!("{:?} is not a store (bad magic)", path)));
        }
        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != VERSION {
            return Err(Error::Storage(format!(
                "{:?}: unsupported store version {}",
                path, version
            )));
        }
        let manifest_offset = u64::read_le(&header[12..20]);

        file.seek(SeekFrom::Start(manifest_offset))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let manifest: Manifest =
            bincode::deserialize(&bytes).map_err(|e| Error::Serialization(e.to_string()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            manifest,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata<M: DeserializeOwned>(&self) -> Result<M> {
        bincode::deserialize(&self.manifest.metadata)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    #[inline]
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.manifest.tables
    }

    pub fn table<T: Cell, const N: usize>(&self, name: &str) -> Result<TableReader<'_, T, N>> {
        let descriptor = self
            .manifest
            .tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::Storage(format!("{:?}: no table `{}`", self.path, name)))?;
        if descriptor.cell != T::TYPE || descriptor.columns as usize != N {
            return Err(Error::Storage(format!(
                "table `{}` holds {:?}x{}, read as {:?}x{}",
                name,
                descriptor.cell,
                descriptor.columns,
                T::TYPE,
                N
            )));
        }
        Ok(TableReader {
            store: self,
            descriptor,
            _cell: PhantomData,
        })
    }

    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

/// Typed access to one table of a store
pub struct TableReader<'s, T: Cell, const N: usize> {
    store: &'s StoreReader,
    descriptor: &'s TableDescriptor,
    _cell: PhantomData<T>,
}

impl<'s, T: Cell, const N: usize> TableReader<'s, T, N> {
    #[inline]
    pub fn descriptor(&self) -> &TableDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.descriptor.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptor.rows == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.descriptor.ranges.iter().map(|r| r.key.as_str())
    }

    /// Row span of a by-level
    pub fn range(&self, key: &str) -> Result<(u64, u64)> {
        self.descriptor
            .range(key)
            .map(|r| (r.start, r.end))
            .ok_or_else(|| Error::ByLevelNotFound(key.to_string()))
    }

    pub fn read_range(&self, start: u64, end: u64) -> Result<Vec<[T; N]>> {
        if start > end || end > self.descriptor.rows {
            return Err(Error::Storage(format!(
                "table `{}`: rows {}..{} out of bounds ({} rows)",
                self.descriptor.name, start, end, self.descriptor.rows
            )));
        }
        let width = self.descriptor.row_width();
        let bytes = self
            .store
            .read_bytes(self.descriptor.offset + start * width, ((end - start) * width) as usize)?;

        Ok(bytes
            .chunks_exact(width as usize)
            .map(|row| {
                let mut cells = [T::read_le(row); N];
                for (i, cell) in cells.iter_mut().enumerate().skip(1) {
                    *cell = T::read_le(&row[i * T::WIDTH..]);
                }
                cells
            })
            .collect())
    }

    pub fn read_level(&self, key: &str) -> Result<Vec<[T; N]>> {
        let (start, end) = self.range(key)?;
        self.read_range(start, end)
    }

    pub fn row(&self, index: u64) -> Result<[T; N]> {
        let mut rows = self.read_range(index, index + 1)?;
        rows.pop().ok_or_else(|| {
            Error::Storage(format!("table `{}`: no row {}", self.descriptor.name, index))
        })
    }
}
