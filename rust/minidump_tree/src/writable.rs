/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The contract shared by every node of a minidump tree, and the drivers that
//! walk a tree through its lifecycle.

use {
    crate::{
        errors::{checked_cast, WriterError},
        link_table::{LinkTable, LocationId, RvaId},
        minidump_format::MDLocationDescriptor,
        sink::TrackedSink,
    },
    log::trace,
};

/// Alignment of nodes that do not ask for anything else.
pub const DEFAULT_ALIGNMENT: u64 = 4;
/// Largest alignment a node may ask for.
pub const MAXIMUM_ALIGNMENT: u64 = 16;

/// Lifecycle of a node. A node only ever moves forward through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// Setters may be called.
    Mutable,
    /// Size and alignment are fixed.
    Frozen,
    /// A file offset has been assigned.
    Writable,
    /// The node's bytes are in the sink.
    Written,
}

/// Which half of the file a node is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Early,
    Late,
}

/// Bookkeeping every node carries, independent of what it writes.
#[derive(Debug)]
pub struct WritableBase {
    state: State,
    offset: u64,
    leading_pad: u64,
    locations: Vec<LocationId>,
    rvas: Vec<RvaId>,
}

impl Default for WritableBase {
    fn default() -> Self {
        Self::new()
    }
}

impl WritableBase {
    pub fn new() -> Self {
        Self {
            state: State::Mutable,
            offset: 0,
            leading_pad: 0,
            locations: Vec::new(),
            rvas: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Panics unless the node is in `state`.
    pub fn assert_state(&self, state: State) {
        assert_eq!(self.state, state, "node used in the wrong lifecycle state");
    }

    /// Panics unless the node has not yet been given an offset.
    pub fn assert_not_laid_out(&self) {
        assert!(
            self.state <= State::Frozen,
            "node already laid out (state {:?})",
            self.state
        );
    }

    /// The node's offset from the start of the dump. Only meaningful once the
    /// node is [`State::Writable`].
    pub fn offset(&self) -> u64 {
        assert!(self.state >= State::Writable, "node has no offset yet");
        self.offset
    }

    /// `location` will be set to this node's size and offset during layout.
    pub fn register_location(&mut self, location: LocationId) {
        self.assert_not_laid_out();
        self.locations.push(location);
    }

    /// `rva` will be set to this node's offset during layout.
    pub fn register_rva(&mut self, rva: RvaId) {
        self.assert_not_laid_out();
        self.rvas.push(rva);
    }
}

/// A node of the minidump tree: something that contributes one contiguous,
/// aligned byte range to the file and may own further nodes.
pub trait Writable {
    fn base(&self) -> &WritableBase;
    fn base_mut(&mut self) -> &mut WritableBase;

    /// Called once, when the node moves from Mutable to Frozen and before its
    /// children are frozen. Derived counts are range-checked here and links to
    /// other nodes are allocated.
    fn on_freeze(&mut self, _links: &mut LinkTable) -> Result<(), WriterError> {
        Ok(())
    }

    /// Bytes [`write_object`](Writable::write_object) will produce, excluding
    /// children and padding. Must not change once frozen.
    fn size_of_object(&self) -> u64;

    fn alignment(&self) -> u64 {
        DEFAULT_ALIGNMENT
    }

    fn write_phase(&self) -> Phase {
        Phase::Early
    }

    /// Owned nodes, in the order they are placed.
    fn children(&mut self) -> Vec<&mut dyn Writable> {
        Vec::new()
    }

    /// Called when the node is given its offset, after the registered
    /// locations and RVAs have been updated.
    fn on_write_at_offset(
        &mut self,
        _offset: u64,
        _links: &mut LinkTable,
    ) -> Result<(), WriterError> {
        Ok(())
    }

    /// Writes exactly [`size_of_object`](Writable::size_of_object) bytes.
    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        links: &LinkTable,
    ) -> Result<(), WriterError>;
}

/// Freezes `node` and everything below it.
pub fn freeze(node: &mut dyn Writable, links: &mut LinkTable) -> Result<(), WriterError> {
    node.base().assert_state(State::Mutable);
    node.base_mut().state = State::Frozen;
    node.on_freeze(links)?;

    for child in node.children() {
        freeze(child, links)?;
    }
    Ok(())
}

/// Assigns offsets to the nodes of `phase` in the subtree rooted at `node`.
///
/// `offset` is where the subtree may start; it is moved forward past any
/// padding `node` needs. Returns the number of bytes the subtree occupies in
/// this phase, padding included.
pub fn will_write_at_offset(
    node: &mut dyn Writable,
    phase: Phase,
    offset: &mut u64,
    links: &mut LinkTable,
) -> Result<u64, WriterError> {
    let mut local_offset = *offset;
    let leading_pad;
    let size;

    if node.write_phase() == phase {
        node.base().assert_state(State::Frozen);

        let alignment = node.alignment();
        assert!(
            alignment.is_power_of_two() && alignment <= MAXIMUM_ALIGNMENT,
            "alignment {alignment} not supported"
        );

        size = node.size_of_object();
        leading_pad = if size > 0 {
            (alignment - local_offset % alignment) % alignment
        } else {
            0
        };
        local_offset += leading_pad;
        *offset = local_offset;

        node.on_write_at_offset(local_offset, links)?;

        let rva = checked_cast::<u32, u64>("rva", local_offset)?;
        let data_size = checked_cast::<u32, u64>("data_size", size)?;
        let base = node.base_mut();
        for &location in &base.locations {
            links.set_location(location, MDLocationDescriptor { data_size, rva });
        }
        for &id in &base.rvas {
            links.set_rva(id, rva);
        }
        base.offset = local_offset;
        base.leading_pad = leading_pad;
        base.state = State::Writable;

        trace!("{size:#x} bytes at {local_offset:#x} ({phase:?}, {leading_pad} padding)");
    } else {
        match phase {
            Phase::Early => node.base().assert_state(State::Frozen),
            Phase::Late => node.base().assert_state(State::Writable),
        }
        leading_pad = 0;
        size = 0;
    }

    let mut total = size;
    for child in node.children() {
        let mut child_offset = local_offset + total;
        total += will_write_at_offset(child, phase, &mut child_offset, links)?;
    }

    Ok(leading_pad + total)
}

/// Writes the nodes of `phase` in the subtree rooted at `node`, each preceded
/// by its alignment padding.
pub fn write_phase(
    node: &mut dyn Writable,
    phase: Phase,
    sink: &mut TrackedSink<'_>,
    links: &LinkTable,
) -> Result<(), WriterError> {
    if node.write_phase() == phase {
        let base = node.base();
        base.assert_state(State::Writable);
        let (offset, leading_pad) = (base.offset, base.leading_pad);

        sink.write_padding(leading_pad)?;
        assert_eq!(sink.position(), offset, "node written out of order");

        node.write_object(sink, links)?;
        let written = sink.position() - offset;
        assert_eq!(
            written,
            node.size_of_object(),
            "node wrote a different number of bytes than it declared"
        );

        node.base_mut().state = State::Written;
    } else {
        match phase {
            Phase::Early => node.base().assert_state(State::Writable),
            Phase::Late => node.base().assert_state(State::Written),
        }
    }

    for child in node.children() {
        write_phase(child, phase, sink, links)?;
    }
    Ok(())
}
