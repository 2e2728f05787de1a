//! SHA-256 content hashing

use super::types::{StorageError, StorageResult, StoredFile};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Chunk size used when streaming content through the hasher
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Streams content through SHA-256 in fixed-size chunks
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityHasher;

impl IntegrityHasher {
    /// Hashes everything `reader` yields, as lowercase hex
    ///
    /// # Errors
    ///
    /// Returns the first non-interrupt I/O error from `reader`.
    pub fn digest_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0_u8; HASH_CHUNK_SIZE];

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Hashes a byte slice
    #[must_use]
    pub fn digest_bytes(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Reads a file back from disk and hashes it
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::HashReadbackFailure`] if the file cannot be
    /// opened or read.
    pub fn digest_file(path: &Path) -> StorageResult<String> {
        let readback = |source| StorageError::HashReadbackFailure {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(readback)?;
        Self::digest_reader(&mut file).map_err(readback)
    }

    /// Re-hashes a stored file and compares against its recorded hash
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::HashReadbackFailure`] if the file cannot be read.
    pub fn verify(file: &StoredFile) -> StorageResult<bool> {
        Ok(Self::digest_file(file.path())? == file.content_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_known_digests() {
        assert_eq!(IntegrityHasher::digest_bytes(b""), EMPTY_SHA256);
        assert_eq!(IntegrityHasher::digest_bytes(b"abc"), ABC_SHA256);
        assert_eq!(IntegrityHasher::digest_reader(&mut &b"abc"[..]).unwrap(), ABC_SHA256);
    }

    #[test]
    fn test_chunking_does_not_change_digest() {
        let data: Vec<u8> = (0..HASH_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let streamed = IntegrityHasher::digest_reader(&mut data.as_slice()).unwrap();
        assert_eq!(streamed, IntegrityHasher::digest_bytes(&data));
    }

    #[test]
    fn test_digest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(IntegrityHasher::digest_file(&path).unwrap(), ABC_SHA256);
    }

    #[test]
    fn test_missing_file_is_readback_failure() {
        let err = IntegrityHasher::digest_file(Path::new("/nonexistent/file.bin")).unwrap_err();
        assert!(matches!(err, StorageError::HashReadbackFailure { .. }));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"abc").unwrap();

        let stored = StoredFile::new("photo.jpg", "photo.jpg", path.clone(), 3, None, ABC_SHA256);
        assert!(IntegrityHasher::verify(&stored).unwrap());

        std::fs::write(&path, b"abd").unwrap();
        assert!(!IntegrityHasher::verify(&stored).unwrap());
    }
}
