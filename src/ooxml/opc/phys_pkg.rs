//! Physical package access: the ZIP archive underneath a package.
//!
//! Reading pulls every entry into memory in one pass and then releases the
//! archive, so no file handle is held while the package is open. Writing
//! goes to a temporary file next to the destination that replaces the
//! destination only once the archive is complete.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::ooxml::opc::config::PackageOptions;
use crate::ooxml::opc::error::{OpcError, Result};

/// One file entry read from an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name with any leading slash removed
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct PhysPkgReader;

impl PhysPkgReader {
    /// Read every file entry of the archive at `path`.
    ///
    /// An archive that cannot be opened is an error; individual entries that
    /// cannot be read are skipped with a warning.
    pub fn read_entries<P: AsRef<Path>>(path: P) -> Result<Vec<ArchiveEntry>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OpcError::PackageNotFound(path.display().to_string()),
            _ => OpcError::Io(e),
        })?;
        Self::read_entries_from(BufReader::new(file))
    }

    pub fn read_entries_from<R: Read + Seek>(reader: R) -> Result<Vec<ArchiveEntry>> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = match archive.by_index(i) {
                Ok(file) => file,
                Err(e) => {
                    warn!(index = i, error = %e, "skipping unreadable archive entry");
                    continue;
                },
            };
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let mut bytes = Vec::with_capacity(file.size() as usize);
            if let Err(e) = file.read_to_end(&mut bytes) {
                warn!(entry = %name, error = %e, "skipping unreadable archive entry");
                continue;
            }
            entries.push(ArchiveEntry { name, bytes });
        }
        Ok(entries)
    }
}

/// Writes a new archive to a temporary file and moves it over the
/// destination on [`commit`](Self::commit).
///
/// Dropping the writer without committing removes the temporary file and
/// leaves the destination untouched.
pub struct PhysPkgWriter {
    zip: ZipWriter<NamedTempFile>,
    options: SimpleFileOptions,
}

impl PhysPkgWriter {
    pub fn create(destination: &Path, options: &PackageOptions) -> Result<Self> {
        // `Path::parent` is `Some("")` for a bare file name.
        let dir = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = NamedTempFile::new_in(dir)?;

        let file_options = SimpleFileOptions::default()
            .compression_method(options.compression.method())
            .compression_level(options.compression_level);

        Ok(Self {
            zip: ZipWriter::new(temp),
            options: file_options,
        })
    }

    pub fn write(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    /// Finish the archive, flush it to disk and rename it over `destination`.
    pub fn commit(self, destination: &Path) -> Result<()> {
        let mut temp = self.zip.finish()?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(destination)?;
        Ok(())
    }
}
