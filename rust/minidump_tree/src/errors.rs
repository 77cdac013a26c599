/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use {
    crate::memory_writer::{MemorySourceError, RegionId},
    thiserror::Error,
};

/// Everything that can abort [`write_everything`](crate::MinidumpFileWriter::write_everything).
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("{field} value {value:#x} does not fit its field")]
    OutOfRange { field: &'static str, value: u64 },
    #[error("Memory region {0:?} is listed but was never placed in the file")]
    UnresolvedRegion(RegionId),
    #[error("Failed to copy {len} bytes of memory from {address:#x}")]
    CopyFromSourceError {
        address: u64,
        len: usize,
        #[source]
        source: MemorySourceError,
    },
    #[error("Failed to encode a minidump record")]
    ScrollError(#[from] scroll::Error),
    #[error("Failed to write to the dump sink")]
    IOError(#[from] std::io::Error),
}

impl WriterError {
    /// Builds an [`WriterError::OutOfRange`] and logs it.
    pub(crate) fn out_of_range(field: &'static str, value: u64) -> Self {
        log::error!("{field} {value:#x} out of range");
        Self::OutOfRange { field, value }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddStreamError {
    #[error("A stream of type {0:#x} is already present")]
    DuplicateStreamType(u32),
}

/// Converts `value` into the narrower type of the record field `field`.
pub(crate) fn checked_cast<T, V>(field: &'static str, value: V) -> Result<T, WriterError>
where
    V: Copy + Into<u64> + TryInto<T>,
{
    value
        .try_into()
        .map_err(|_| WriterError::out_of_range(field, value.into()))
}
