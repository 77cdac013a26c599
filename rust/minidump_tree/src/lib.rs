/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Writes minidump files from a tree of writable objects.
//!
//! Every piece of a minidump (the header and stream directory, each stream,
//! every string and every captured memory region) is a node implementing
//! [`Writable`]. The root of the tree is a [`MinidumpFileWriter`]; streams are
//! attached to it and may own further nodes of their own.
//!
//! Writing happens in one call to [`MinidumpFileWriter::write_everything`],
//! which takes the tree through four stages:
//!
//! 1. **Freeze**: every node fixes its size and alignment, and registers the
//!    fields in other records that must point at it.
//! 2. **Layout**: file offsets are assigned depth-first, first to all
//!    [`Phase::Early`] nodes and then to all [`Phase::Late`] ones, so that
//!    structural records cluster at the front of the file and bulk memory at
//!    the end.
//! 3. **Write**: nodes emit their records in offset order. Memory contents are
//!    only fetched from their [`MemorySource`] at this point.
//! 4. **Finalize**: the header, first written with an invalid signature, is
//!    rewritten with the real one. A dump whose writing was interrupted
//!    therefore never looks valid.
//!
//! ```rust
//! use minidump_tree::{MemoryListWriter, MemoryRegionWriter, MinidumpFileWriter, SnapshotMemory};
//! use std::io::Cursor;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let stack = SnapshotMemory::new(0x7ffd_0000, vec![0u8; 0x100]);
//! let mut memory_list = MemoryListWriter::new();
//! memory_list.add_region(MemoryRegionWriter::new(0x7ffd_0000, 0x100, stack));
//!
//! let mut minidump = MinidumpFileWriter::new();
//! minidump.add_stream(memory_list)?;
//!
//! let mut destination = Cursor::new(Vec::new());
//! minidump.write_everything(&mut destination)?;
//! # Ok(())
//! # }
//! ```

pub mod bytes_stream_writer;
pub mod errors;
pub mod file_writer;
pub mod link_table;
pub mod memory_writer;
pub mod minidump_format;
pub mod module_writer;
pub mod sink;
pub mod stream_writer;
pub mod string_writer;
pub mod system_info_writer;
pub mod writable;

pub use bytes_stream_writer::BytesStreamWriter;
pub use errors::{AddStreamError, WriterError};
pub use file_writer::MinidumpFileWriter;
pub use link_table::{LinkTable, LocationId, MemoryDescriptorId, RvaId};
pub use memory_writer::{
    MemoryListWriter, MemoryRegionWriter, MemorySource, MemorySourceError, RegionId,
    SnapshotMemory,
};
pub use module_writer::{
    CodeViewRecordWriter, MiscDebugRecordWriter, ModuleListWriter, ModuleWriter,
};
pub use sink::{DumpSink, TrackedSink};
pub use stream_writer::StreamWriter;
pub use string_writer::Utf16StringWriter;
pub use system_info_writer::SystemInfoWriter;
pub use writable::{Phase, State, Writable, WritableBase};
