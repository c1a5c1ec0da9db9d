//! Bitcoin's double-SHA256 hash, computed incrementally via `io::Write`.

use sha2::{Digest, Sha256};
use std::io;

/// An `io::Write` sink that accumulates a double-SHA256 digest of everything
/// written to it, without buffering the input.
///
/// Block and transaction hashes are computed by serializing the header or
/// transaction into one of these rather than hashing a `Vec<u8>`, so that
/// hashing and serialization share a single pass over the data.
#[derive(Default)]
pub struct Writer(Sha256);

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Finishes the digest, returning the double-SHA256 hash of everything written.
    pub fn finish(self) -> [u8; 32] {
        let first = self.0.finalize();
        let second = Sha256::digest(&first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        out
    }
}

/// Computes the double-SHA256 hash of `bytes` directly.
pub fn checksum(bytes: &[u8]) -> [u8; 32] {
    let mut w = Writer::default();
    io::Write::write_all(&mut w, bytes).expect("writing to a Sha256 writer is infallible");
    w.finish()
}
