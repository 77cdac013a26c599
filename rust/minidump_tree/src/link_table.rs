/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Storage for the records in one node that describe the position of another.
//!
//! Nodes never hold references to each other. A node that needs to point at
//! another one (a directory entry at its stream, a thread at its stack memory)
//! allocates a slot here while the tree is being frozen and hands the id to
//! the target, which fills the slot in once its own offset is known. The
//! pointing node reads the slot back when it writes itself.
//!
//! Every id remembers the table that issued it. Using it with any other table
//! panics.

use {
    crate::{
        memory_writer::RegionId,
        minidump_format::{MDLocationDescriptor, MDMemoryDescriptor, RVA},
    },
    std::{
        collections::HashMap,
        sync::atomic::{AtomicU64, Ordering},
    },
};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(0);

/// A `{data_size, rva}` pair kept in sync with the node it is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationId {
    table: u64,
    index: usize,
}

/// A bare RVA kept in sync with the node it is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RvaId {
    table: u64,
    index: usize,
}

/// A memory descriptor: a start address plus the location of the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryDescriptorId {
    index: usize,
    location: LocationId,
}

impl MemoryDescriptorId {
    /// The location half of the descriptor.
    pub fn location(&self) -> LocationId {
        self.location
    }
}

#[derive(Debug)]
pub struct LinkTable {
    id: u64,
    locations: Vec<MDLocationDescriptor>,
    rvas: Vec<RVA>,
    memory_starts: Vec<u64>,
    regions: HashMap<RegionId, MemoryDescriptorId>,
}

impl LinkTable {
    /// Tables are only created by [`MinidumpFileWriter::write_everything`],
    /// one per write.
    ///
    /// [`MinidumpFileWriter::write_everything`]: crate::MinidumpFileWriter::write_everything
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            locations: Vec::new(),
            rvas: Vec::new(),
            memory_starts: Vec::new(),
            regions: HashMap::new(),
        }
    }

    fn check(&self, table: u64) {
        assert_eq!(
            table, self.id,
            "link id belongs to link table {table}, not to link table {}",
            self.id
        );
    }

    pub fn new_location(&mut self) -> LocationId {
        self.locations.push(MDLocationDescriptor {
            data_size: 0,
            rva: 0,
        });
        LocationId {
            table: self.id,
            index: self.locations.len() - 1,
        }
    }

    pub fn new_rva(&mut self) -> RvaId {
        self.rvas.push(0);
        RvaId {
            table: self.id,
            index: self.rvas.len() - 1,
        }
    }

    pub fn new_memory_descriptor(&mut self) -> MemoryDescriptorId {
        let location = self.new_location();
        self.memory_starts.push(0);
        MemoryDescriptorId {
            index: self.memory_starts.len() - 1,
            location,
        }
    }

    pub fn location(&self, id: LocationId) -> MDLocationDescriptor {
        self.check(id.table);
        self.locations[id.index].clone()
    }

    pub fn rva(&self, id: RvaId) -> RVA {
        self.check(id.table);
        self.rvas[id.index]
    }

    pub fn memory_descriptor(&self, id: MemoryDescriptorId) -> MDMemoryDescriptor {
        MDMemoryDescriptor {
            memory: self.location(id.location),
            start_of_memory_range: self.memory_starts[id.index],
        }
    }

    pub(crate) fn set_location(&mut self, id: LocationId, location: MDLocationDescriptor) {
        self.check(id.table);
        self.locations[id.index] = location;
    }

    pub(crate) fn set_rva(&mut self, id: RvaId, rva: RVA) {
        self.check(id.table);
        self.rvas[id.index] = rva;
    }

    pub(crate) fn set_memory_start(&mut self, id: MemoryDescriptorId, start: u64) {
        self.check(id.location.table);
        self.memory_starts[id.index] = start;
    }

    /// Records the descriptor that a memory region owns itself, so lists that
    /// only know the region's id can find it.
    pub(crate) fn set_region_descriptor(&mut self, region: RegionId, id: MemoryDescriptorId) {
        self.check(id.location.table);
        self.regions.insert(region, id);
    }

    /// The descriptor owned by `region`, if the region is part of the tree.
    pub fn region_descriptor(&self, region: RegionId) -> Option<MemoryDescriptorId> {
        self.regions.get(&region).copied()
    }
}
