/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! On-disk records of the minidump format.
//!
//! The records come from `minidump-common`, under the names the rest of the
//! crate uses for them. All of them are packed and little-endian and are
//! encoded with `scroll`, so their serialized sizes come from [`SizeWith`]
//! rather than from the Rust layout of the structs.

pub use minidump_common::format::{
    CvSignature, CPU_INFORMATION as MDCPUInformation, GUID as MDGUID,
    MINIDUMP_DIRECTORY as MDRawDirectory, MINIDUMP_HEADER as MDRawHeader,
    MINIDUMP_LOCATION_DESCRIPTOR as MDLocationDescriptor,
    MINIDUMP_MEMORY_DESCRIPTOR as MDMemoryDescriptor, MINIDUMP_MODULE as MDRawModule,
    MINIDUMP_SIGNATURE as MD_HEADER_SIGNATURE, MINIDUMP_STREAM_TYPE as MDStreamType,
    MINIDUMP_SYSTEM_INFO as MDRawSystemInfo, MINIDUMP_VERSION as MD_HEADER_VERSION,
    PlatformId as MDOSPlatform, ProcessorArchitecture as MDCPUArchitecture,
    VS_FIXEDFILEINFO as MDVSFixedFileInfo, RVA, VS_FFI_SIGNATURE, VS_FFI_STRUCVERSION,
};

use scroll::{
    ctx::{SizeWith, TryIntoCtx},
    Endian, Pwrite,
};

/// Written into the header until the whole file is complete.
pub const MD_HEADER_SIGNATURE_PLACEHOLDER: u32 = 0;

/// Serialized size of a record.
pub fn record_size<T: SizeWith<Endian>>() -> usize {
    T::size_with(&Endian::Little)
}

/// Serializes a record into a freshly allocated buffer of exactly its size.
pub fn encode_record<T>(record: T) -> Result<Vec<u8>, scroll::Error>
where
    T: TryIntoCtx<Endian, Error = scroll::Error> + SizeWith<Endian>,
{
    let mut bytes = vec![0u8; record_size::<T>()];
    bytes.pwrite_with(record, 0, Endian::Little)?;
    Ok(bytes)
}
