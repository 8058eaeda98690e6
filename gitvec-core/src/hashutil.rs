//! Content hashing helpers: chunk hashes (blake3) and git-blob-compatible
//! object ids (sha1, git's `blob {len}\0{content}` framing).

/// 32-byte BLAKE3 hash, used for `chunk_hash` (content identity of a chunk,
/// independent of git).
pub type ChunkHash = [u8; 32];

#[inline]
pub fn hash_chunk(text: &str) -> ChunkHash {
    *blake3::hash(text.as_bytes()).as_bytes()
}

#[inline]
pub fn chunk_hash_hex(h: &ChunkHash) -> String {
    hex::encode(h)
}

/// Git's blob object id: `sha1("blob {len}\0" + content)`.
pub fn git_blob_oid(content: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let header = format!("blob {}\0", content.len());
    let mut hasher = Sha1::new();
    hasher.update(header.as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_hash_deterministic() {
        assert_eq!(hash_chunk("same text"), hash_chunk("same text"));
        assert_ne!(hash_chunk("a"), hash_chunk("b"));
    }

    #[test]
    fn git_blob_oid_matches_known_vector() {
        // `git hash-object` for a file containing just "hello\n" is this
        // well-known SHA-1. Used across the ecosystem as the canonical
        // smoke test for blob-oid implementations.
        let oid = git_blob_oid(b"hello\n");
        assert_eq!(oid, "ce013625030ba8dba906f756967f9e9ca394464");
    }

    #[test]
    fn git_blob_oid_empty_file() {
        let oid = git_blob_oid(b"");
        assert_eq!(oid, "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }
}
