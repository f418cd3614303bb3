//! Streaming content hasher
//!
//! Files are read in fixed 64 KiB blocks and fed through MD5, so memory use is
//! bounded no matter how large the file is. MD5 is only relied on to tell
//! accidental duplicates apart; it is stable across runs and platforms, which
//! is what snapshot round-trips need.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crate::hasher::{hash_bytes, hash_file};
//! use std::path::Path;
//!
//! # fn example() -> std::io::Result<()> {
//! let (digest, bytes_read) = hash_file(Path::new("example.txt"))?;
//! assert_eq!(digest.len(), 32);
//! assert_eq!(hash_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Size of each read issued by the hasher
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Hash recorded for files when content hashing is disabled
pub const PLACEHOLDER_HASH: &str = "";

/// Hash everything readable from `reader`
///
/// Returns the hex digest and the number of bytes consumed.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<(String, u64)> {
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        context.consume(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((hex::encode(context.compute().0), total))
}

/// Hash the content of the file at `path`
pub fn hash_file(path: &Path) -> io::Result<(String, u64)> {
    let file = File::open(path)?;
    hash_reader(file)
}

/// Hash an in-memory byte slice
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}
