/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use {
    crate::{
        errors::{checked_cast, WriterError},
        link_table::LinkTable,
        minidump_format::record_size,
        sink::TrackedSink,
        writable::{State, Writable, WritableBase},
    },
    std::io::IoSlice,
};

/// A `MINIDUMP_STRING`: the byte length of the string as a `u32`, the UTF-16LE
/// code units, and a NUL terminator that the length does not count.
///
/// Strings are referenced from other records by RVA; owners register an
/// [`RvaId`](crate::RvaId) on the string while freezing.
#[derive(Debug, Default)]
pub struct Utf16StringWriter {
    base: WritableBase,
    units: Vec<u16>,
    byte_length: u32,
}

impl Utf16StringWriter {
    pub fn new(value: &str) -> Self {
        let mut writer = Self::default();
        writer.set_string(value);
        writer
    }

    pub fn set_string(&mut self, value: &str) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.units = value.encode_utf16().collect();
        self
    }

    /// Like [`set_string`](Self::set_string), replacing invalid UTF-8 with
    /// U+FFFD.
    pub fn set_utf8(&mut self, value: &[u8]) -> &mut Self {
        self.set_string(&String::from_utf8_lossy(value))
    }
}

impl Writable for Utf16StringWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, _links: &mut LinkTable) -> Result<(), WriterError> {
        self.byte_length = checked_cast("string_length", self.units.len() as u64 * 2)?;
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        (record_size::<u32>() + (self.units.len() + 1) * record_size::<u16>()) as u64
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        _links: &LinkTable,
    ) -> Result<(), WriterError> {
        let mut string = Vec::with_capacity((self.units.len() + 1) * 2);
        for unit in self.units.iter().chain(std::iter::once(&0)) {
            string.extend_from_slice(&unit.to_le_bytes());
        }

        sink.write_iovec(&mut [
            IoSlice::new(&self.byte_length.to_le_bytes()),
            IoSlice::new(&string),
        ])?;
        Ok(())
    }
}
