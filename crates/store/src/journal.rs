//! Per-version metadata journal
//!
//! Binary, truly append-only log: fixed version metadata, an `open`
//! liveness flag, and the ordered list of captured block numbers. Every
//! mutation after creation is either a single appended record or a
//! single-byte flip, so no append ever rewrites existing data.
//!
//! # Format
//!
//! 44-byte header followed by zero or more 8-byte records:
//!
//! ```text
//! offset  size  field
//!  0      4     magic (0x534E4150, "SNAP", little-endian)
//!  4      2     format version (1)
//!  6      1     open flag (1 = session live, 0 = closed)
//!  7      1     reserved
//!  8      4     block_size
//! 12      4     reserved
//! 16      8     device_size
//! 24      8     num_blocks
//! 32      8     created_unix (i64)
//! 40      4     crc32 of bytes 0..40, open byte zeroed
//! 44...   8*n   captured block numbers (u64 LE), in capture order
//! ```
//!
//! The open byte is excluded from the checksum because it is the one
//! field rewritten in place when the session closes. Appends are single
//! 8-byte records; nothing is ever rewritten.
//!
//! # Concurrency
//!
//! The journal is only ever mutated from its device's single-threaded
//! ordered queue, so concurrent modification is impossible by
//! construction — there is no file locking here.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use blocksnap_core::{Error, Result};
use tracing::warn;

use crate::layout::journal_path;

/// Journal magic, "SNAP" in ASCII
pub const JOURNAL_MAGIC: u32 = 0x534E_4150;

/// Journal format version understood by this build
pub const JOURNAL_FORMAT_VERSION: u16 = 1;

/// Fixed header length in bytes
pub const HEADER_LEN: usize = 44;

const OPEN_FLAG_OFFSET: u64 = 6;
const RECORD_LEN: usize = 8;

/// Fixed per-version metadata, written once when the session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalHeader {
    /// Filesystem block size of the backing device for this session
    pub block_size: u32,
    /// Backing device size in bytes at session start
    pub device_size: u64,
    /// Number of blocks covered by the session's capture bitmap
    pub num_blocks: u64,
    /// Session start, unix seconds
    pub created_unix: i64,
    /// Liveness flag: true while the session is accumulating captures
    pub open: bool,
}

impl JournalHeader {
    /// Encode the header, including its checksum.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&JOURNAL_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&JOURNAL_FORMAT_VERSION.to_le_bytes());
        buf[6] = u8::from(self.open);
        buf[8..12].copy_from_slice(&self.block_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.device_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.num_blocks.to_le_bytes());
        buf[32..40].copy_from_slice(&self.created_unix.to_le_bytes());
        let crc = header_crc(&buf);
        buf[40..44].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode and verify a header.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Malformed(format!(
                "journal header truncated: {} bytes",
                buf.len()
            )));
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != JOURNAL_MAGIC {
            return Err(Error::FormatMismatch {
                expected: format!("magic {:#010x}", JOURNAL_MAGIC),
                found: format!("magic {:#010x}", magic),
            });
        }
        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version != JOURNAL_FORMAT_VERSION {
            return Err(Error::FormatMismatch {
                expected: format!("format version {}", JOURNAL_FORMAT_VERSION),
                found: format!("format version {}", version),
            });
        }
        let stored_crc = u32::from_le_bytes(buf[40..44].try_into().unwrap());
        let computed = header_crc(&buf[..HEADER_LEN]);
        if stored_crc != computed {
            return Err(Error::Malformed(format!(
                "journal header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed
            )));
        }
        Ok(JournalHeader {
            block_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            device_size: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            num_blocks: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            created_unix: i64::from_le_bytes(buf[32..40].try_into().unwrap()),
            open: buf[6] != 0,
        })
    }
}

/// A fully parsed journal: header plus ordered captured block list.
#[derive(Debug, Clone)]
pub struct JournalContents {
    /// The fixed metadata
    pub header: JournalHeader,
    /// Captured block numbers, in capture order
    pub blocks: Vec<u64>,
}

/// Checksum of the first 40 header bytes with the open byte zeroed.
fn header_crc(buf: &[u8]) -> u32 {
    let mut copy = [0u8; 40];
    copy.copy_from_slice(&buf[0..40]);
    copy[OPEN_FLAG_OFFSET as usize] = 0;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&copy);
    hasher.finalize()
}

/// Create the journal for a new session.
///
/// Overwrites any journal already present in the directory (a re-mount
/// within the same second lands in the same version directory and starts
/// the version over, matching the directory-name granularity).
pub fn create(version_dir: &Path, header: &JournalHeader) -> Result<()> {
    let path = journal_path(version_dir);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;
    file.write_all(&header.to_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Append one captured block number to the journal.
pub fn append_block(version_dir: &Path, block: u64) -> Result<()> {
    let path = journal_path(version_dir);
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(&block.to_le_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// Flip the journal's open flag to 0, marking the session closed.
///
/// In-place single-byte rewrite; the rest of the file is untouched.
pub fn mark_closed(version_dir: &Path) -> Result<()> {
    let path = journal_path(version_dir);
    let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
    file.seek(SeekFrom::Start(OPEN_FLAG_OFFSET))?;
    file.write_all(&[0u8])?;
    file.sync_data()?;
    Ok(())
}

/// Read and parse a journal.
///
/// A torn trailing record (partial 8-byte write left by a crash) is
/// dropped with a warning; the complete prefix is still an ordered,
/// valid block list.
pub fn read(version_dir: &Path) -> Result<JournalContents> {
    let path = journal_path(version_dir);
    let mut file = File::open(&path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let header = JournalHeader::from_bytes(&buf)?;

    let body = &buf[HEADER_LEN..];
    let torn = body.len() % RECORD_LEN;
    if torn != 0 {
        warn!(
            journal = %path.display(),
            torn_bytes = torn,
            "ignoring torn trailing journal record"
        );
    }
    let blocks = body
        .chunks_exact(RECORD_LEN)
        .map(|rec| u64::from_le_bytes(rec.try_into().unwrap()))
        .collect();

    Ok(JournalContents { header, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_header(open: bool) -> JournalHeader {
        JournalHeader {
            block_size: 4096,
            device_size: 1 << 20,
            num_blocks: 256,
            created_unix: 1_754_300_000,
            open,
        }
    }

    #[test]
    fn test_header_encode_decode() {
        let header = sample_header(true);
        let decoded = JournalHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = sample_header(true).to_bytes();
        bytes[0] = 0xFF;
        assert!(matches!(
            JournalHeader::from_bytes(&bytes),
            Err(Error::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_header_bad_version() {
        let mut bytes = sample_header(true).to_bytes();
        bytes[4] = 99;
        // Version is checked before the checksum, so this is a mismatch,
        // not a corruption.
        assert!(matches!(
            JournalHeader::from_bytes(&bytes),
            Err(Error::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_header_corrupt_checksum() {
        let mut bytes = sample_header(true).to_bytes();
        bytes[20] ^= 0xFF; // flip a device_size byte
        assert!(matches!(
            JournalHeader::from_bytes(&bytes),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_header_truncated() {
        let bytes = sample_header(true).to_bytes();
        assert!(matches!(
            JournalHeader::from_bytes(&bytes[..20]),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_open_flag_flip_preserves_checksum() {
        let header = sample_header(true);
        let mut bytes = header.to_bytes();
        bytes[6] = 0; // what mark_closed does on disk
        let decoded = JournalHeader::from_bytes(&bytes).unwrap();
        assert!(!decoded.open);
    }

    #[test]
    fn test_create_append_read() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), &sample_header(true)).unwrap();
        append_block(dir.path(), 5).unwrap();
        append_block(dir.path(), 12).unwrap();
        append_block(dir.path(), 3).unwrap();

        let contents = read(dir.path()).unwrap();
        assert!(contents.header.open);
        assert_eq!(contents.blocks, vec![5, 12, 3]); // capture order, not sorted
    }

    #[test]
    fn test_mark_closed() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), &sample_header(true)).unwrap();
        append_block(dir.path(), 7).unwrap();
        mark_closed(dir.path()).unwrap();

        let contents = read(dir.path()).unwrap();
        assert!(!contents.header.open);
        assert_eq!(contents.blocks, vec![7]);
    }

    #[test]
    fn test_read_tolerates_torn_tail() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), &sample_header(true)).unwrap();
        append_block(dir.path(), 1).unwrap();
        // Simulate a crash mid-append: 3 stray bytes after the last record.
        let mut f = OpenOptions::new()
            .append(true)
            .open(journal_path(dir.path()))
            .unwrap();
        f.write_all(&[0xAA, 0xBB, 0xCC]).unwrap();
        drop(f);

        let contents = read(dir.path()).unwrap();
        assert_eq!(contents.blocks, vec![1]);
    }
}
