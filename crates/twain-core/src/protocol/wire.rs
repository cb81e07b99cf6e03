//! Helpers for fixed-width fields of native records.

use std::io::{self, Read, Write};

/// Write `text` NUL-padded to exactly `width` bytes.
///
/// The caller checks the length; text longer than `width - 1` is truncated so
/// the record always keeps its terminator.
pub(crate) fn write_fixed_str<W: Write>(w: &mut W, text: &str, width: usize) -> io::Result<()> {
    let bytes = text.as_bytes();
    let len = bytes.len().min(width.saturating_sub(1));
    w.write_all(&bytes[..len])?;
    w.write_all(&vec![0u8; width - len])
}

/// Read a NUL-padded string occupying `width` bytes.
pub(crate) fn read_fixed_str<R: Read>(r: &mut R, width: usize) -> io::Result<String> {
    let mut buf = vec![0u8; width];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}
