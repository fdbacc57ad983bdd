use crate::TransferError;
use crate::types::ChunkSpec;

/// Splits `file_size` bytes into contiguous parts of `ceil(file_size / split_factor)` bytes.
///
/// The last part carries the remainder. Parts are only emitted while bytes
/// remain, so small files produce fewer than `split_factor` parts and an empty
/// file produces none.
pub fn partition(file_size: u64, split_factor: u32) -> Result<Vec<ChunkSpec>, TransferError> {
    if split_factor == 0 {
        return Err(TransferError::Configuration(
            "split factor must be greater than 0".into(),
        ));
    }

    let part_len = file_size.div_ceil(u64::from(split_factor));
    let mut specs = Vec::with_capacity(u64::from(split_factor).min(file_size) as usize);
    let mut start = 0u64;
    let mut part = 0u32;

    while start < file_size {
        let len = part_len.min(file_size - start);
        specs.push(ChunkSpec { part, start, len });
        start += len;
        part += 1;
    }

    Ok(specs)
}
