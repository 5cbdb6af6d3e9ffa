use md5::{Digest, Md5};

/// Computes MD5 of `data` and returns the lowercase hex digest (32 chars).
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
