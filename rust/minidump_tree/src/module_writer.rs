/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The module list stream, and the names and debugging records its modules
//! point at.
//!
//! A [`ModuleWriter`] writes nothing itself. Its `MINIDUMP_MODULE` record is
//! written by the [`ModuleListWriter`] that owns it, as one element of the
//! list, and its children (the module name, the CodeView record and the
//! miscellaneous debugging record) are written after the list.

use {
    crate::{
        errors::{checked_cast, WriterError},
        file_writer::timestamp_u32,
        link_table::{LinkTable, LocationId, RvaId},
        minidump_format::{
            encode_record, record_size, CvSignature, MDRawModule, MDStreamType,
            MDVSFixedFileInfo, MDGUID, VS_FFI_SIGNATURE, VS_FFI_STRUCVERSION,
        },
        sink::TrackedSink,
        stream_writer::StreamWriter,
        string_writer::Utf16StringWriter,
        writable::{State, Writable, WritableBase},
    },
    scroll::{Endian, Pwrite},
    std::{io::IoSlice, time::SystemTime},
};

/// [`MiscDebugRecordWriter`] data type naming the module's debug file.
pub const IMAGE_DEBUG_MISC_EXENAME: u32 = 1;

/// `DataType`, `Length`, `Unicode` and three reserved bytes.
const MISC_DEBUG_HEADER_SIZE: usize = 12;
/// `CvSignature`, `CvOffset`, `Signature` and `Age`.
const PDB20_HEADER_SIZE: usize = 16;

enum PdbLink {
    Pdb20 { timestamp: u32, age: u32 },
    Pdb70 { uuid: MDGUID, age: u32 },
}

/// A CodeView record linking a module to its PDB file: a header that depends
/// on the kind of link, followed by the NUL-terminated PDB file name.
pub struct CodeViewRecordWriter {
    base: WritableBase,
    link: PdbLink,
    pdb_name: Vec<u8>,
}

impl CodeViewRecordWriter {
    /// A PDB 7.0 (`RSDS`) link, identifying the PDB by GUID and age.
    pub fn pdb70(pdb_name: &str, uuid: MDGUID, age: u32) -> Self {
        Self {
            base: WritableBase::new(),
            link: PdbLink::Pdb70 { uuid, age },
            pdb_name: pdb_name.as_bytes().to_vec(),
        }
    }

    /// A PDB 2.0 (`NB10`) link, identifying the PDB by timestamp and age.
    pub fn pdb20(pdb_name: &str, timestamp: SystemTime, age: u32) -> Self {
        Self {
            base: WritableBase::new(),
            link: PdbLink::Pdb20 {
                timestamp: timestamp_u32(timestamp),
                age,
            },
            pdb_name: pdb_name.as_bytes().to_vec(),
        }
    }

    fn header_size(&self) -> usize {
        match self.link {
            PdbLink::Pdb20 { .. } => PDB20_HEADER_SIZE,
            PdbLink::Pdb70 { .. } => 2 * record_size::<u32>() + record_size::<MDGUID>(),
        }
    }

    fn header(&self) -> Result<Vec<u8>, scroll::Error> {
        let mut bytes = vec![0u8; self.header_size()];
        let offset = &mut 0;
        match self.link {
            PdbLink::Pdb20 { timestamp, age } => {
                bytes.gwrite_with(CvSignature::Pdb20 as u32, offset, Endian::Little)?;
                bytes.gwrite_with(0u32, offset, Endian::Little)?;
                bytes.gwrite_with(timestamp, offset, Endian::Little)?;
                bytes.gwrite_with(age, offset, Endian::Little)?;
            }
            PdbLink::Pdb70 { ref uuid, age } => {
                bytes.gwrite_with(CvSignature::Pdb70 as u32, offset, Endian::Little)?;
                bytes.gwrite_with(uuid.data1, offset, Endian::Little)?;
                bytes.gwrite_with(uuid.data2, offset, Endian::Little)?;
                bytes.gwrite_with(uuid.data3, offset, Endian::Little)?;
                bytes.gwrite_with(&uuid.data4[..], offset, ())?;
                bytes.gwrite_with(age, offset, Endian::Little)?;
            }
        }
        Ok(bytes)
    }
}

impl Writable for CodeViewRecordWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn size_of_object(&self) -> u64 {
        (self.header_size() + self.pdb_name.len() + 1) as u64
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        _links: &LinkTable,
    ) -> Result<(), WriterError> {
        let header = self.header()?;
        sink.write_iovec(&mut [
            IoSlice::new(&header),
            IoSlice::new(&self.pdb_name),
            IoSlice::new(&[0]),
        ])?;
        Ok(())
    }
}

enum MiscData {
    Ansi(Vec<u8>),
    Utf16(Vec<u16>),
}

/// An `IMAGE_DEBUG_MISC` record: a typed, NUL-terminated string in either
/// 8-bit or UTF-16 code units.
pub struct MiscDebugRecordWriter {
    base: WritableBase,
    data_type: u32,
    data: MiscData,
    length: u32,
}

impl Default for MiscDebugRecordWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MiscDebugRecordWriter {
    pub fn new() -> Self {
        Self {
            base: WritableBase::new(),
            data_type: 0,
            data: MiscData::Ansi(Vec::new()),
            length: 0,
        }
    }

    /// Usually [`IMAGE_DEBUG_MISC_EXENAME`].
    pub fn set_data_type(&mut self, data_type: u32) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.data_type = data_type;
        self
    }

    /// Replaces the data, stored as UTF-16 if `utf16` is set and as the bytes
    /// of `data` otherwise.
    pub fn set_data(&mut self, data: &str, utf16: bool) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.data = if utf16 {
            MiscData::Utf16(data.encode_utf16().collect())
        } else {
            MiscData::Ansi(data.as_bytes().to_vec())
        };
        self
    }

    fn data_bytes(&self) -> Vec<u8> {
        match &self.data {
            MiscData::Ansi(bytes) => bytes.iter().copied().chain([0]).collect(),
            MiscData::Utf16(units) => units
                .iter()
                .chain(&[0])
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
        }
    }
}

impl Writable for MiscDebugRecordWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, _links: &mut LinkTable) -> Result<(), WriterError> {
        // the terminator is counted
        let data_size = match &self.data {
            MiscData::Ansi(bytes) => bytes.len() + 1,
            MiscData::Utf16(units) => (units.len() + 1) * record_size::<u16>(),
        };
        self.length = checked_cast(
            "misc_record_length",
            (MISC_DEBUG_HEADER_SIZE + data_size) as u64,
        )?;
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        self.length.into()
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        _links: &LinkTable,
    ) -> Result<(), WriterError> {
        let unicode = matches!(self.data, MiscData::Utf16(_));
        let mut header = vec![0u8; MISC_DEBUG_HEADER_SIZE];
        let offset = &mut 0;
        header.gwrite_with(self.data_type, offset, Endian::Little)?;
        header.gwrite_with(self.length, offset, Endian::Little)?;
        header.gwrite_with(u8::from(unicode), offset, Endian::Little)?;

        let data = self.data_bytes();
        sink.write_iovec(&mut [IoSlice::new(&header), IoSlice::new(&data)])?;
        Ok(())
    }
}

/// One loaded module. Every module needs a name; the CodeView and
/// miscellaneous debugging records are optional.
pub struct ModuleWriter {
    base: WritableBase,
    module: MDRawModule,
    name: Option<Utf16StringWriter>,
    codeview_record: Option<CodeViewRecordWriter>,
    misc_debug_record: Option<MiscDebugRecordWriter>,
    name_rva: Option<RvaId>,
    codeview_location: Option<LocationId>,
    misc_debug_location: Option<LocationId>,
}

impl Default for ModuleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleWriter {
    pub fn new() -> Self {
        Self {
            base: WritableBase::new(),
            module: MDRawModule {
                version_info: MDVSFixedFileInfo {
                    signature: VS_FFI_SIGNATURE,
                    struct_version: VS_FFI_STRUCVERSION,
                    ..Default::default()
                },
                ..Default::default()
            },
            name: None,
            codeview_record: None,
            misc_debug_record: None,
            name_rva: None,
            codeview_location: None,
            misc_debug_location: None,
        }
    }

    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.name
            .get_or_insert_with(Utf16StringWriter::default)
            .set_string(name);
        self
    }

    pub fn set_codeview_record(&mut self, record: CodeViewRecordWriter) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.codeview_record = Some(record);
        self
    }

    pub fn set_misc_debug_record(&mut self, record: MiscDebugRecordWriter) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.misc_debug_record = Some(record);
        self
    }

    pub fn set_image_base_address(&mut self, base_address: u64) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.base_of_image = base_address;
        self
    }

    pub fn set_image_size(&mut self, size: u32) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.size_of_image = size;
        self
    }

    pub fn set_checksum(&mut self, checksum: u32) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.checksum = checksum;
        self
    }

    pub fn set_timestamp(&mut self, time: SystemTime) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.time_date_stamp = timestamp_u32(time);
        self
    }

    /// Sets the file version `a.b.c.d`.
    pub fn set_file_version(&mut self, a: u16, b: u16, c: u16, d: u16) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.version_info.file_version_hi = version_word(a, b);
        self.module.version_info.file_version_lo = version_word(c, d);
        self
    }

    /// Sets the product version `a.b.c.d`.
    pub fn set_product_version(&mut self, a: u16, b: u16, c: u16, d: u16) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.version_info.product_version_hi = version_word(a, b);
        self.module.version_info.product_version_lo = version_word(c, d);
        self
    }

    /// `VS_FF_*` flags. Every flag set must also be set in `mask`.
    pub fn set_file_flags_and_mask(&mut self, flags: u32, mask: u32) -> &mut Self {
        self.base.assert_state(State::Mutable);
        debug_assert_eq!(flags & !mask, 0, "file flags outside of the mask");
        self.module.version_info.file_flags = flags;
        self.module.version_info.file_flags_mask = mask;
        self
    }

    /// A `VOS_*` value.
    pub fn set_file_os(&mut self, file_os: u32) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.version_info.file_os = file_os;
        self
    }

    /// A `VFT_*` value and, for drivers and fonts, a `VFT2_*` value.
    pub fn set_file_type_and_subtype(&mut self, file_type: u32, subtype: u32) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.module.version_info.file_type = file_type;
        self.module.version_info.file_subtype = subtype;
        self
    }

    /// The module's record with the positions of its children filled in.
    fn raw_module(&self, links: &LinkTable) -> MDRawModule {
        let mut module = self.module.clone();
        if let Some(rva) = self.name_rva {
            module.module_name_rva = links.rva(rva);
        }
        if let Some(location) = self.codeview_location {
            module.cv_record = links.location(location);
        }
        if let Some(location) = self.misc_debug_location {
            module.misc_record = links.location(location);
        }
        module
    }
}

fn version_word(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

impl Writable for ModuleWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, links: &mut LinkTable) -> Result<(), WriterError> {
        let Some(name) = self.name.as_mut() else {
            panic!("module name must be set before the module is written");
        };
        let rva = links.new_rva();
        name.base_mut().register_rva(rva);
        self.name_rva = Some(rva);

        if let Some(record) = self.codeview_record.as_mut() {
            let location = links.new_location();
            record.base_mut().register_location(location);
            self.codeview_location = Some(location);
        }
        if let Some(record) = self.misc_debug_record.as_mut() {
            let location = links.new_location();
            record.base_mut().register_location(location);
            self.misc_debug_location = Some(location);
        }
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        0
    }

    fn children(&mut self) -> Vec<&mut dyn Writable> {
        let mut children: Vec<&mut dyn Writable> = Vec::new();
        if let Some(name) = self.name.as_mut() {
            children.push(name);
        }
        if let Some(record) = self.codeview_record.as_mut() {
            children.push(record);
        }
        if let Some(record) = self.misc_debug_record.as_mut() {
            children.push(record);
        }
        children
    }

    fn write_object(
        &mut self,
        _sink: &mut TrackedSink<'_>,
        _links: &LinkTable,
    ) -> Result<(), WriterError> {
        Ok(())
    }
}

/// The module list stream: a count followed by one `MINIDUMP_MODULE` per
/// module, in the order the modules were added.
#[derive(Default)]
pub struct ModuleListWriter {
    base: WritableBase,
    modules: Vec<ModuleWriter>,
    module_count: u32,
}

impl ModuleListWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, module: ModuleWriter) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.modules.push(module);
        self
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

impl Writable for ModuleListWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, _links: &mut LinkTable) -> Result<(), WriterError> {
        self.module_count = checked_cast("module_count", self.modules.len() as u64)?;
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        (record_size::<u32>() + self.modules.len() * record_size::<MDRawModule>()) as u64
    }

    fn children(&mut self) -> Vec<&mut dyn Writable> {
        self.modules
            .iter_mut()
            .map(|module| module as &mut dyn Writable)
            .collect()
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        links: &LinkTable,
    ) -> Result<(), WriterError> {
        let mut records = vec![encode_record(self.module_count)?];
        for module in &self.modules {
            records.push(encode_record(module.raw_module(links))?);
        }

        let mut iovecs: Vec<IoSlice<'_>> = records.iter().map(|r| IoSlice::new(r)).collect();
        sink.write_iovec(&mut iovecs)?;
        Ok(())
    }
}

impl StreamWriter for ModuleListWriter {
    fn stream_type(&self) -> u32 {
        MDStreamType::ModuleListStream as u32
    }
}
