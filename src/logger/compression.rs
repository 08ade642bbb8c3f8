//! Gzip compression of rotated log files

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Compress `file_path` into `<file_path>.gz` and remove the original.
pub fn gzip_file(file_path: &Path) -> anyhow::Result<PathBuf> {
    let input = fs::read(file_path)?;

    let mut compressed = file_path.as_os_str().to_owned();
    compressed.push(".gz");
    let compressed_path = PathBuf::from(compressed);

    let output_file = File::create(&compressed_path)?;
    let mut encoder = GzEncoder::new(output_file, Compression::default());
    encoder.write_all(&input)?;
    encoder.finish()?;

    fs::remove_file(file_path)?;
    Ok(compressed_path)
}
