/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Captured process memory and the memory list stream that indexes it.

use {
    crate::{
        errors::{checked_cast, WriterError},
        link_table::{LinkTable, MemoryDescriptorId},
        minidump_format::{encode_record, record_size, MDMemoryDescriptor, MDStreamType},
        sink::TrackedSink,
        stream_writer::StreamWriter,
        writable::{Phase, State, Writable, WritableBase},
    },
    std::{
        io::IoSlice,
        sync::atomic::{AtomicU64, Ordering},
    },
    thiserror::Error,
};

/// Memory is copied out of a [`MemorySource`] at most this many bytes at a
/// time.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies a [`MemoryRegionWriter`] independently of where it lives in the
/// tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u64);

#[derive(Debug, Error)]
pub enum MemorySourceError {
    #[error("{len} bytes at {address:#x} are not available")]
    Unavailable { address: u64, len: usize },
    #[error("Failed to read memory")]
    IOError(#[from] std::io::Error),
}

/// Produces the contents of captured memory on demand.
pub trait MemorySource {
    /// Fills `dest` with the bytes starting at `address`.
    fn copy_memory(&mut self, address: u64, dest: &mut [u8]) -> Result<(), MemorySourceError>;
}

/// Memory that was copied out of the process ahead of time.
#[derive(Debug, Clone)]
pub struct SnapshotMemory {
    base_address: u64,
    bytes: Vec<u8>,
}

impl SnapshotMemory {
    pub fn new(base_address: u64, bytes: Vec<u8>) -> Self {
        Self {
            base_address,
            bytes,
        }
    }
}

impl MemorySource for SnapshotMemory {
    fn copy_memory(&mut self, address: u64, dest: &mut [u8]) -> Result<(), MemorySourceError> {
        let len = dest.len();
        let src = address
            .checked_sub(self.base_address)
            .and_then(|start| usize::try_from(start).ok())
            .and_then(|start| self.bytes.get(start..start.checked_add(len)?))
            .ok_or(MemorySourceError::Unavailable { address, len })?;
        dest.copy_from_slice(src);
        Ok(())
    }
}

/// One contiguous range of process memory.
///
/// The bytes are placed in the late part of the file and only read from the
/// source while the file is being written. Any number of memory descriptors
/// elsewhere in the tree can be registered to describe the same bytes.
pub struct MemoryRegionWriter {
    base: WritableBase,
    id: RegionId,
    base_address: u64,
    size: u64,
    source: Box<dyn MemorySource>,
    descriptors: Vec<MemoryDescriptorId>,
}

impl MemoryRegionWriter {
    pub fn new<S: MemorySource + 'static>(base_address: u64, size: u64, source: S) -> Self {
        Self {
            base: WritableBase::new(),
            id: RegionId(NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed)),
            base_address,
            size,
            source: Box::new(source),
            descriptors: Vec::new(),
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Keeps `descriptor` identical to this region's own descriptor. Must be
    /// called before the region is laid out.
    pub fn register_descriptor(&mut self, descriptor: MemoryDescriptorId) {
        self.base.register_location(descriptor.location());
        self.descriptors.push(descriptor);
    }
}

impl Writable for MemoryRegionWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, links: &mut LinkTable) -> Result<(), WriterError> {
        let primary = links.new_memory_descriptor();
        self.base.register_location(primary.location());
        self.descriptors.insert(0, primary);
        links.set_region_descriptor(self.id, primary);
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        self.size
    }

    fn alignment(&self) -> u64 {
        16
    }

    fn write_phase(&self) -> Phase {
        Phase::Late
    }

    fn on_write_at_offset(
        &mut self,
        _offset: u64,
        links: &mut LinkTable,
    ) -> Result<(), WriterError> {
        if self.base_address.checked_add(self.size).is_none() {
            return Err(WriterError::out_of_range("base_address", self.base_address));
        }
        for &descriptor in &self.descriptors {
            links.set_memory_start(descriptor, self.base_address);
        }
        Ok(())
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        _links: &LinkTable,
    ) -> Result<(), WriterError> {
        let mut buffer = vec![0u8; self.size.min(COPY_CHUNK_SIZE as u64) as usize];
        let mut address = self.base_address;
        let mut remaining = self.size;

        while remaining > 0 {
            let len = remaining.min(buffer.len() as u64) as usize;
            let chunk = &mut buffer[..len];
            self.source
                .copy_memory(address, chunk)
                .map_err(|source| WriterError::CopyFromSourceError {
                    address,
                    len,
                    source,
                })?;
            sink.write_all(chunk)?;

            address += len as u64;
            remaining -= len as u64;
        }
        Ok(())
    }
}

/// The memory list stream: a count followed by one descriptor per listed
/// region.
///
/// Regions added with [`add_region`](Self::add_region) are owned by the list
/// and written as its children. Regions added with
/// [`add_extra_region`](Self::add_extra_region) belong to some other node of
/// the same tree and are only listed here.
#[derive(Default)]
pub struct MemoryListWriter {
    base: WritableBase,
    regions: Vec<MemoryRegionWriter>,
    listed: Vec<RegionId>,
    region_count: u32,
}

impl MemoryListWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, region: MemoryRegionWriter) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.listed.push(region.id());
        self.regions.push(region);
        self
    }

    pub fn add_extra_region(&mut self, region: &MemoryRegionWriter) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.listed.push(region.id());
        self
    }

    /// Regions listed so far, owned or not.
    pub fn region_count(&self) -> usize {
        self.listed.len()
    }
}

impl Writable for MemoryListWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, _links: &mut LinkTable) -> Result<(), WriterError> {
        assert!(
            self.regions.len() <= self.listed.len(),
            "owned memory regions must all be listed"
        );
        self.region_count = checked_cast("memory_region_count", self.listed.len() as u64)?;
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        (record_size::<u32>() + self.listed.len() * record_size::<MDMemoryDescriptor>()) as u64
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
        links: &LinkTable,
    ) -> Result<(), WriterError> {
        let mut records = vec![encode_record(self.region_count)?];
        for &id in &self.listed {
            let descriptor = links
                .region_descriptor(id)
                .ok_or(WriterError::UnresolvedRegion(id))?;
            records.push(encode_record(links.memory_descriptor(descriptor))?);
        }

        let mut iovecs: Vec<IoSlice<'_>> = records.iter().map(|r| IoSlice::new(r)).collect();
        sink.write_iovec(&mut iovecs)?;
        Ok(())
    }
}

impl StreamWriter for MemoryListWriter {
    fn stream_type(&self) -> u32 {
        MDStreamType::MemoryListStream as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serves_only_its_own_range() {
        let mut memory = SnapshotMemory::new(0x1000, (0u8..16).collect());

        let mut dest = [0u8; 4];
        memory.copy_memory(0x1004, &mut dest).unwrap();
        assert_eq!(dest, [4, 5, 6, 7]);

        memory.copy_memory(0x100c, &mut dest).unwrap();
        assert_eq!(dest, [12, 13, 14, 15]);

        assert!(matches!(
            memory.copy_memory(0x100d, &mut dest),
            Err(MemorySourceError::Unavailable {
                address: 0x100d,
                len: 4
            })
        ));
        assert!(memory.copy_memory(0xfff, &mut dest).is_err());
        assert!(memory.copy_memory(u64::MAX, &mut dest).is_err());
    }

    #[test]
    fn region_ids_are_unique() {
        let a = MemoryRegionWriter::new(0, 0, SnapshotMemory::new(0, Vec::new()));
        let b = MemoryRegionWriter::new(0, 0, SnapshotMemory::new(0, Vec::new()));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn region_is_late_and_sixteen_byte_aligned() {
        let region = MemoryRegionWriter::new(0x10, 0x20, SnapshotMemory::new(0x10, vec![0; 0x20]));
        assert_eq!(region.write_phase(), Phase::Late);
        assert_eq!(region.alignment(), 16);
        assert_eq!(region.size_of_object(), 0x20);
    }

    #[test]
    fn list_size_counts_every_listed_region() {
        let owned = MemoryRegionWriter::new(0, 8, SnapshotMemory::new(0, vec![0; 8]));
        let elsewhere = MemoryRegionWriter::new(8, 8, SnapshotMemory::new(8, vec![0; 8]));

        let mut list = MemoryListWriter::new();
        assert_eq!(list.size_of_object(), 4);
        list.add_region(owned).add_extra_region(&elsewhere);

        assert_eq!(list.region_count(), 2);
        assert_eq!(list.size_of_object(), 4 + 2 * 16);
        assert_eq!(list.children().len(), 1);
    }
}
