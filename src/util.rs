/*
 * Trivial to understand utility functions that need not clutter other namespaces.
 */
use crate::error::{BenchError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{Float, FromPrimitive};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Reads a file into a Vec of big-endian f32s.
pub fn read_file_as_f32s<P: AsRef<Path>>(filename: P) -> io::Result<Vec<f32>> {
    let f = File::open(filename)?;
    let mut reader = BufReader::new(f);

    // Iterate the file into f32s
    let mut floats: Vec<f32> = Vec::new();
    loop {
        match reader.read_f32::<BigEndian>() {
            Ok(f) => floats.push(f),
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(floats)
}

/// Reads a file into a Vec of f32s and verifies that the byte-count of the
/// input file matches with the expected amount of f32s.
pub fn read_file_as_f32s_checked<P: AsRef<Path>>(
    filename: P,
    expected_len: usize,
) -> Result<Vec<f32>> {
    let path = filename.as_ref();
    let v = read_file_as_f32s(path)
        .map_err(|e| BenchError::invalid_weights(path, e.to_string()))?;
    let len = v.len();
    if len != expected_len {
        return Err(BenchError::invalid_weights(
            path,
            format!("expected {} f32s, but {} were read", expected_len, len),
        ));
    }
    Ok(v)
}

/// Writes f32s into a file in big-endian byte order.
pub fn write_file_f32s<P: AsRef<Path>>(filename: P, data: &[f32]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(filename)?);
    for &f in data {
        writer.write_f32::<BigEndian>(f)?;
    }
    writer.flush()
}

/// Lists out the names of all files in the target directory.
pub fn list_files<P>(dir: P) -> io::Result<Vec<String>>
where
    P: AsRef<Path>,
{
    let mut files = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if entry.path().is_file() {
            if let Ok(name) = entry.file_name().into_string() {
                files.push(name);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Arithmetic mean, or None for an empty slice.
pub fn mean<T>(values: &[T]) -> Option<T>
where
    T: Float + FromPrimitive,
{
    if values.is_empty() {
        return None;
    }
    let sum = values.iter().fold(T::zero(), |acc, &x| acc + x);
    T::from_usize(values.len()).map(|n| sum / n)
}

pub fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / BYTES_PER_MB
}
