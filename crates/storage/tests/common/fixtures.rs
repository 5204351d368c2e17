use bytes::Bytes;
use depot_storage::ByteStream;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Deterministic pseudo-random bytes; the same seed gives the same output.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Stream `data` in pieces of at most `part_size` bytes.
#[allow(dead_code)]
pub fn stream_in_parts(data: Bytes, part_size: usize) -> ByteStream {
    Box::pin(async_stream::stream! {
        let mut rest = data;
        while !rest.is_empty() {
            let take = part_size.min(rest.len());
            yield Ok(rest.split_to(take));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[test]
    fn test_sha256_hash() {
        assert_eq!(
            sha256_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }

    #[tokio::test]
    async fn test_stream_in_parts() {
        let parts: Vec<Bytes> = stream_in_parts(Bytes::from_static(b"abcdefg"), 3)
            .try_collect()
            .await
            .unwrap();
        let parts: Vec<&[u8]> = parts.iter().map(|p| &p[..]).collect();
        assert_eq!(parts, vec![&b"abc"[..], &b"def"[..], &b"g"[..]]);
    }
}
