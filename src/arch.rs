use crate::result::*;

/// A checked cast from u64 to usize, for sizing buffers from
/// wire-format length fields.
///
/// On 64-bit targets this can't fail; on 32-bit ones a central
/// directory larger than the address space has to be an error.
pub fn usize<I: Into<u64>>(i: I) -> ZipResult<usize> {
    let i: u64 = i.into();
    usize::try_from(i).map_err(|_| ZipError::InsufficientAddressSpace)
}
