/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

#![allow(dead_code)]

use minidump_tree::{
    minidump_format::{
        record_size, MDMemoryDescriptor, MDRawDirectory, MDRawHeader, MD_HEADER_SIGNATURE,
        MD_HEADER_VERSION,
    },
    LinkTable, MemoryRegionWriter, MemorySource, MemorySourceError, MinidumpFileWriter, Phase,
    StreamWriter, TrackedSink, Writable, WritableBase, WriterError,
};
use scroll::{Endian, Pread};
use std::io::Cursor;

pub const HEADER_SIZE: usize = 32;
pub const DIRECTORY_ENTRY_SIZE: usize = 12;

/// Serves every address with the same byte.
pub struct FillMemory(pub u8);

impl MemorySource for FillMemory {
    fn copy_memory(&mut self, _address: u64, dest: &mut [u8]) -> Result<(), MemorySourceError> {
        dest.fill(self.0);
        Ok(())
    }
}

/// Fails every read.
pub struct UnreadableMemory;

impl MemorySource for UnreadableMemory {
    fn copy_memory(&mut self, address: u64, dest: &mut [u8]) -> Result<(), MemorySourceError> {
        Err(MemorySourceError::Unavailable {
            address,
            len: dest.len(),
        })
    }
}

pub fn fill_region(base_address: u64, size: u64, value: u8) -> MemoryRegionWriter {
    MemoryRegionWriter::new(base_address, size, FillMemory(value))
}

/// A stream of `size` copies of `value`, optionally owning memory regions.
pub struct TestStream {
    base: WritableBase,
    stream_type: u32,
    size: usize,
    value: u8,
    phase: Phase,
    regions: Vec<MemoryRegionWriter>,
}

impl TestStream {
    pub fn new(stream_type: u32, size: usize, value: u8) -> Self {
        Self {
            base: WritableBase::new(),
            stream_type,
            size,
            value,
            phase: Phase::Early,
            regions: Vec::new(),
        }
    }

    pub fn late(mut self) -> Self {
        self.phase = Phase::Late;
        self
    }

    pub fn with_region(mut self, region: MemoryRegionWriter) -> Self {
        self.regions.push(region);
        self
    }
}

impl Writable for TestStream {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn size_of_object(&self) -> u64 {
        self.size as u64
    }

    fn write_phase(&self) -> Phase {
        self.phase
    }

    fn children(&mut self) -> Vec<&mut dyn Writable> {
        self.regions
            .iter_mut()
            .map(|region| region as &mut dyn Writable)
            .collect()
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        _links: &LinkTable,
    ) -> Result<(), WriterError> {
        sink.write_all(&vec![self.value; self.size])?;
        Ok(())
    }
}

impl StreamWriter for TestStream {
    fn stream_type(&self) -> u32 {
        self.stream_type
    }
}

pub fn write_to_vec(minidump: &mut MinidumpFileWriter) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    minidump
        .write_everything(&mut cursor)
        .expect("failed to write minidump");
    cursor.into_inner()
}

/// Reads the header and checks the fields every complete minidump shares.
pub fn verify_header(bytes: &[u8], stream_count: u32) -> MDRawHeader {
    let header: MDRawHeader = bytes.pread_with(0, Endian::Little).unwrap();
    assert_eq!(header.signature, MD_HEADER_SIGNATURE);
    assert_eq!(header.version, MD_HEADER_VERSION);
    assert_eq!(header.stream_count, stream_count);
    assert_eq!(header.checksum, 0);
    if stream_count == 0 {
        assert_eq!(header.stream_directory_rva, 0);
    } else {
        assert_eq!(header.stream_directory_rva as usize, HEADER_SIZE);
    }
    header
}

pub fn read_directory(bytes: &[u8], header: &MDRawHeader) -> Vec<MDRawDirectory> {
    (0..header.stream_count as usize)
        .map(|index| {
            bytes
                .pread_with(
                    header.stream_directory_rva as usize + index * DIRECTORY_ENTRY_SIZE,
                    Endian::Little,
                )
                .unwrap()
        })
        .collect()
}

/// The descriptors of the memory list stream described by `directory`.
pub fn read_memory_list(bytes: &[u8], directory: &MDRawDirectory) -> Vec<MDMemoryDescriptor> {
    let rva = directory.location.rva as usize;
    let count: u32 = bytes.pread_with(rva, Endian::Little).unwrap();
    assert_eq!(
        directory.location.data_size as usize,
        4 + count as usize * record_size::<MDMemoryDescriptor>()
    );

    (0..count as usize)
        .map(|index| {
            bytes
                .pread_with(
                    rva + 4 + index * record_size::<MDMemoryDescriptor>(),
                    Endian::Little,
                )
                .unwrap()
        })
        .collect()
}

/// Checks that `descriptor` matches the expected range and that the bytes it
/// points at are all `value`. `rva` is rounded up to the memory alignment.
pub fn verify_memory(
    bytes: &[u8],
    descriptor: &MDMemoryDescriptor,
    start: u64,
    size: u32,
    rva: u32,
    value: u8,
) {
    assert_eq!(descriptor.start_of_memory_range, start);
    assert_eq!(descriptor.memory.data_size, size);
    assert_eq!(descriptor.memory.rva, rva.next_multiple_of(16));

    let begin = descriptor.memory.rva as usize;
    let contents = &bytes[begin..begin + size as usize];
    assert!(contents.iter().all(|&b| b == value));
}
