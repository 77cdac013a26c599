/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use {
    crate::{
        errors::WriterError,
        link_table::LinkTable,
        sink::TrackedSink,
        stream_writer::StreamWriter,
        writable::{Writable, WritableBase},
    },
    std::{io, path::Path},
};

/// A stream whose contents are opaque bytes, such as a copy of
/// `/proc/cpuinfo`.
pub struct BytesStreamWriter {
    base: WritableBase,
    stream_type: u32,
    bytes: Vec<u8>,
}

impl BytesStreamWriter {
    pub fn new(stream_type: impl Into<u32>, bytes: Vec<u8>) -> Self {
        Self {
            base: WritableBase::new(),
            stream_type: stream_type.into(),
            bytes,
        }
    }

    pub fn from_file(stream_type: impl Into<u32>, path: impl AsRef<Path>) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::new(stream_type, bytes))
    }
}

impl Writable for BytesStreamWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn size_of_object(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        _links: &LinkTable,
    ) -> Result<(), WriterError> {
        sink.write_all(&self.bytes)?;
        Ok(())
    }
}

impl StreamWriter for BytesStreamWriter {
    fn stream_type(&self) -> u32 {
        self.stream_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minidump_format::MDStreamType;
    use std::io::Write;

    #[test]
    fn reads_contents_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"processor\t: 0\n").unwrap();

        let stream =
            BytesStreamWriter::from_file(MDStreamType::LinuxCpuInfo as u32, file.path()).unwrap();
        assert_eq!(stream.stream_type(), MDStreamType::LinuxCpuInfo as u32);
        assert_eq!(stream.size_of_object(), 14);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BytesStreamWriter::from_file(0x4767_0003u32, dir.path().join("cpuinfo")).is_err());
    }
}
