/*! Content hash of quarantined samples. */

use md5::{Digest, Md5};

/// Returns the MD5 of `data` as a lowercase hexadecimal string.
///
/// ```
/// # use bup_summary::digest::md5_hex;
/// assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
