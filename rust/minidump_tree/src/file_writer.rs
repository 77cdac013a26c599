/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use {
    crate::{
        errors::{checked_cast, AddStreamError, WriterError},
        link_table::{LinkTable, LocationId},
        minidump_format::{
            encode_record, record_size, MDRawDirectory, MDRawHeader, MD_HEADER_SIGNATURE,
            MD_HEADER_SIGNATURE_PLACEHOLDER, MD_HEADER_VERSION,
        },
        sink::{DumpSink, TrackedSink},
        stream_writer::StreamWriter,
        writable::{self, Phase, State, Writable, WritableBase},
    },
    log::{debug, warn},
    std::{
        collections::HashSet,
        io::IoSlice,
        time::{SystemTime, UNIX_EPOCH},
    },
};

/// Seconds since the epoch as a 32-bit `time_t`. Times the format cannot
/// represent are truncated to 32 bits, times before the epoch become 0.
pub(crate) fn timestamp_u32(time: SystemTime) -> u32 {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or(0);
    u32::try_from(secs).unwrap_or_else(|_| {
        warn!("timestamp {secs} does not fit 32 bits, truncating");
        secs as u32
    })
}

/// The root of a minidump tree: the file header, the stream directory, and
/// the streams themselves.
pub struct MinidumpFileWriter {
    base: WritableBase,
    header: MDRawHeader,
    streams: Vec<Box<dyn StreamWriter>>,
    stream_types: HashSet<u32>,
    /// Stream type and entry location, in the order the streams are laid out.
    directory: Vec<(u32, LocationId)>,
}

impl Default for MinidumpFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MinidumpFileWriter {
    pub fn new() -> Self {
        Self {
            base: WritableBase::new(),
            header: MDRawHeader {
                signature: MD_HEADER_SIGNATURE_PLACEHOLDER,
                version: MD_HEADER_VERSION,
                stream_count: 0,
                stream_directory_rva: 0,
                checksum: 0,
                time_date_stamp: 0,
                flags: 0,
            },
            streams: Vec::new(),
            stream_types: HashSet::new(),
            directory: Vec::new(),
        }
    }

    /// Sets the header timestamp. Times the format cannot represent are
    /// truncated to 32 bits, times before the epoch become 0.
    pub fn set_timestamp(&mut self, time: SystemTime) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.header.time_date_stamp = timestamp_u32(time);
        self
    }

    pub fn set_flags(&mut self, flags: u64) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.header.flags = flags;
        self
    }

    /// Attaches `stream` to the file. Streams are written in the order they
    /// are attached, except that every early stream comes before every late
    /// one.
    ///
    /// Fails without changing anything if a stream of the same type is
    /// already attached.
    pub fn add_stream<S: StreamWriter + 'static>(
        &mut self,
        stream: S,
    ) -> Result<(), AddStreamError> {
        self.add_boxed_stream(Box::new(stream))
    }

    pub fn add_boxed_stream(
        &mut self,
        stream: Box<dyn StreamWriter>,
    ) -> Result<(), AddStreamError> {
        self.base.assert_state(State::Mutable);

        let stream_type = stream.stream_type();
        if !self.stream_types.insert(stream_type) {
            return Err(AddStreamError::DuplicateStreamType(stream_type));
        }
        self.streams.push(stream);
        Ok(())
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Lays out and writes the whole tree to `sink`, starting at its current
    /// position.
    ///
    /// The header is written first with an invalid signature and only
    /// overwritten with the real one once everything else is in the sink, so
    /// a dump cut short by an error is never mistaken for a complete one. On
    /// success the sink is left positioned at the end of the dump.
    pub fn write_everything(&mut self, sink: &mut dyn DumpSink) -> Result<(), WriterError> {
        let start = sink.position()?;
        let mut links = LinkTable::new();

        writable::freeze(self, &mut links)?;

        let mut offset = 0;
        let early = writable::will_write_at_offset(self, Phase::Early, &mut offset, &mut links)?;
        let mut late_offset = early;
        let late = writable::will_write_at_offset(self, Phase::Late, &mut late_offset, &mut links)?;
        debug!(
            "minidump layout: {} streams, {early:#x} early bytes, {late:#x} late bytes",
            self.streams.len()
        );

        {
            let mut tracked = TrackedSink::new(sink);
            writable::write_phase(self, Phase::Early, &mut tracked, &links)?;
            writable::write_phase(self, Phase::Late, &mut tracked, &links)?;
            debug_assert_eq!(tracked.position(), early + late);
        }

        let end = sink.position()?;
        self.header.signature = MD_HEADER_SIGNATURE;
        let header = encode_record(self.header.clone())?;
        sink.seek_to(start)?;
        sink.write_iovec(&mut [IoSlice::new(&header)])?;
        sink.seek_to(end)?;

        debug!("minidump complete, {:#x} bytes", end - start);
        Ok(())
    }
}

impl Writable for MinidumpFileWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, links: &mut LinkTable) -> Result<(), WriterError> {
        self.header.stream_count = checked_cast("stream_count", self.streams.len() as u64)?;
        self.header.stream_directory_rva = if self.streams.is_empty() {
            0
        } else {
            record_size::<MDRawHeader>() as u32
        };

        for phase in [Phase::Early, Phase::Late] {
            for stream in self.streams.iter_mut() {
                if stream.write_phase() != phase {
                    continue;
                }
                let location = links.new_location();
                stream.base_mut().register_location(location);
                self.directory.push((stream.stream_type(), location));
            }
        }
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        (record_size::<MDRawHeader>() + self.streams.len() * record_size::<MDRawDirectory>())
            as u64
    }

    fn children(&mut self) -> Vec<&mut dyn Writable> {
        self.streams
            .iter_mut()
            .map(|stream| stream.as_mut() as &mut dyn Writable)
            .collect()
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        links: &LinkTable,
    ) -> Result<(), WriterError> {
        let mut records = vec![encode_record(MDRawHeader {
            signature: MD_HEADER_SIGNATURE_PLACEHOLDER,
            ..self.header
        })?];
        for &(stream_type, location) in &self.directory {
            records.push(encode_record(MDRawDirectory {
                stream_type,
                location: links.location(location),
            })?);
        }

        let mut iovecs: Vec<IoSlice<'_>> = records.iter().map(|r| IoSlice::new(r)).collect();
        sink.write_iovec(&mut iovecs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::{Endian, Pread};
    use std::{io::Cursor, time::Duration};

    #[test]
    fn empty_file_is_a_bare_header() {
        let mut minidump = MinidumpFileWriter::new();
        minidump.set_timestamp(UNIX_EPOCH + Duration::from_secs(0x155d2fb8));
        let mut cursor = Cursor::new(Vec::new());
        minidump.write_everything(&mut cursor).unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 32);
        let header: MDRawHeader = bytes.pread_with(0, Endian::Little).unwrap();
        assert_eq!(header.signature, MD_HEADER_SIGNATURE);
        assert_eq!(header.version, MD_HEADER_VERSION);
        assert_eq!(header.stream_count, 0);
        assert_eq!(header.stream_directory_rva, 0);
        assert_eq!(header.time_date_stamp, 0x155d2fb8);
    }

    #[test]
    fn timestamps_past_2106_are_truncated() {
        let mut minidump = MinidumpFileWriter::new();
        minidump.set_timestamp(UNIX_EPOCH + Duration::from_secs(0x1_0000_0010));
        assert_eq!(minidump.header.time_date_stamp, 0x10);

        minidump.set_timestamp(UNIX_EPOCH - Duration::from_secs(1));
        assert_eq!(minidump.header.time_date_stamp, 0);
    }

    #[test]
    #[should_panic(expected = "wrong lifecycle state")]
    fn writer_is_single_use() {
        let mut minidump = MinidumpFileWriter::new();
        minidump.write_everything(&mut Cursor::new(Vec::new())).unwrap();
        let _ = minidump.write_everything(&mut Cursor::new(Vec::new()));
    }
}
