// Utility functions

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest of raw content
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Lower-cased extension of a file name, if it has one
pub fn file_extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn extensions() {
        assert_eq!(file_extension("logs/Day1.CSV").as_deref(), Some("csv"));
        assert_eq!(file_extension(r"c:\data\events.jsonl").as_deref(), Some("jsonl"));
        assert_eq!(file_extension(".env"), None);
        assert_eq!(file_extension("README"), None);
    }
}
