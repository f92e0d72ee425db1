/// Writes a value into the wire buffer of a `FrameSender`.
pub trait Serialize<'a> {
    /// Appends the owned part of the encoding to `buf`.
    ///
    /// # Arguments
    /// * `buf` - The frame buffer, already holding the length prefix.
    ///
    /// # Returns
    /// An optional borrowed tail that is written right after `buf` without being copied.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
