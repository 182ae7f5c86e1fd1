/*! Single-byte XOR obfuscation used by quarantine containers.

McAfee obfuscates the `Details` and `File_*` streams by XOR-ing every byte
with a fixed key. This is not encryption, it only prevents the quarantined
sample from being detected or executed by accident. The transform is its own
inverse, so the same functions both obfuscate and deobfuscate.
*/

/// Key XOR-ed with every byte of the obfuscated streams.
pub const XOR_KEY: u8 = 0x6A;

/// Returns a copy of `data` with every byte XOR-ed with [`XOR_KEY`].
///
/// ```
/// # use bup_summary::cipher;
/// let obfuscated = cipher::decode(b"MZ");
/// assert_eq!(obfuscated, [0x27, 0x30]);
/// assert_eq!(cipher::decode(&obfuscated), b"MZ");
/// ```
pub fn decode(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ XOR_KEY).collect()
}

/// Same as [`decode`], but transforms `data` in place.
pub fn decode_in_place(data: &mut [u8]) {
    data.iter_mut().for_each(|b| *b ^= XOR_KEY);
}
