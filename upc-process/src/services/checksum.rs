//! Source file checksum
//!
//! MD5 hex digest of the original input, read in 4096-byte chunks to match
//! the archive's published checksums.

use std::path::Path;
use upc_common::{Error, Result};

const CHUNK_SIZE: usize = 4096;

pub async fn file_checksum(file_path: &Path) -> Result<String> {
    let path_buf = file_path.to_path_buf();
    tracing::debug!(path = %path_buf.display(), "Calculating MD5 checksum");

    tokio::task::spawn_blocking(move || -> Result<String> {
        use std::fs::File;
        use std::io::Read;

        let mut file = File::open(&path_buf).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open file for checksum: {}", e),
            ))
        })?;

        let mut context = md5::Context::new();
        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            context.consume(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", context.compute()))
    })
    .await
    .map_err(|e| Error::Task(format!("checksum: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checksum_matches_one_shot_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imgA.dat");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let checksum = file_checksum(&path).await.unwrap();
        assert_eq!(checksum, format!("{:x}", md5::compute(&data)));
    }

    #[tokio::test]
    async fn test_checksum_of_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(
            file_checksum(&path).await.unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = file_checksum(Path::new("/nonexistent/imgA.dat")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
