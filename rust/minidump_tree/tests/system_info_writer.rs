/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use minidump_tree::{
    minidump_format::{MDCPUArchitecture, MDOSPlatform, MDRawSystemInfo, MDStreamType},
    MinidumpFileWriter, SystemInfoWriter,
};
use scroll::{Endian, Pread};

mod common;
use common::*;

const SYSTEM_INFO_SIZE: usize = 56;
const VER_NT_WORKSTATION: u8 = 1;
const VER_SUITE_SINGLEUSERTS: u16 = 0x0200;

/// Writes `writer` as the only stream and returns the system info record and
/// the UTF-16 units of its CSD version string.
fn write_system_info(writer: SystemInfoWriter) -> (MDRawSystemInfo, Vec<u16>) {
    let mut minidump = MinidumpFileWriter::new();
    minidump.add_stream(writer).unwrap();
    let bytes = write_to_vec(&mut minidump);

    let header = verify_header(&bytes, 1);
    let directory = read_directory(&bytes, &header);
    let info_offset = HEADER_SIZE + DIRECTORY_ENTRY_SIZE;
    assert_eq!(
        directory[0].stream_type,
        MDStreamType::SystemInfoStream as u32
    );
    assert_eq!(directory[0].location.data_size as usize, SYSTEM_INFO_SIZE);
    assert_eq!(directory[0].location.rva as usize, info_offset);

    let info: MDRawSystemInfo = bytes.pread_with(info_offset, Endian::Little).unwrap();
    let csd_offset = info_offset + SYSTEM_INFO_SIZE;
    assert_eq!(info.csd_version_rva as usize, csd_offset);

    let length: u32 = bytes.pread_with(csd_offset, Endian::Little).unwrap();
    let units_offset = csd_offset + 4;
    assert_eq!(bytes.len(), units_offset + length as usize + 2);

    let units: Vec<u16> = bytes[units_offset..]
        .chunks(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
        .collect();
    assert_eq!(units.last(), Some(&0));
    (info, units[..units.len() - 1].to_vec())
}

fn cpu_u32(info: &MDRawSystemInfo, index: usize) -> u32 {
    info.cpu.data.pread_with(index * 4, Endian::Little).unwrap()
}

fn cpu_u64(info: &MDRawSystemInfo, index: usize) -> u64 {
    info.cpu.data.pread_with(index * 8, Endian::Little).unwrap()
}

#[test]
fn empty() {
    let (info, csd_version) = write_system_info(SystemInfoWriter::new());

    assert_eq!(
        info.processor_architecture,
        MDCPUArchitecture::PROCESSOR_ARCHITECTURE_UNKNOWN as u16
    );
    assert_eq!(info.processor_level, 0);
    assert_eq!(info.processor_revision, 0);
    assert_eq!(info.number_of_processors, 0);
    assert_eq!(info.product_type, 0);
    assert_eq!(info.major_version, 0);
    assert_eq!(info.minor_version, 0);
    assert_eq!(info.build_number, 0);
    assert_eq!(info.platform_id, 0);
    assert_eq!(info.suite_mask, 0);
    assert_eq!(info.cpu.data, [0; 24]);
    assert!(csd_version.is_empty());
}

#[test]
fn x86_windows() {
    let mut writer = SystemInfoWriter::new();
    writer
        .set_cpu_architecture(MDCPUArchitecture::PROCESSOR_ARCHITECTURE_INTEL)
        .set_cpu_level_and_revision(0x0010, 0x0602)
        .set_cpu_count(1)
        .set_os(MDOSPlatform::VER_PLATFORM_WIN32_NT)
        .set_os_type(VER_NT_WORKSTATION)
        .set_os_version(6, 1, 7601)
        .set_csd_version("Service Pack 1")
        .set_suite_mask(VER_SUITE_SINGLEUSERTS)
        .set_cpu_x86_vendor_string(b"AuthenticAMD")
        .set_cpu_x86_version_and_features(0x00100f62, 0x078bfbff)
        .set_cpu_x86_amd_extended_features(0xefd3fbff);

    let (info, csd_version) = write_system_info(writer);

    assert_eq!(info.processor_architecture, MDCPUArchitecture::PROCESSOR_ARCHITECTURE_INTEL as u16);
    assert_eq!(info.processor_level, 0x0010);
    assert_eq!(info.processor_revision, 0x0602);
    assert_eq!(info.number_of_processors, 1);
    assert_eq!(info.product_type, VER_NT_WORKSTATION);
    assert_eq!(info.major_version, 6);
    assert_eq!(info.minor_version, 1);
    assert_eq!(info.build_number, 7601);
    assert_eq!(info.platform_id, MDOSPlatform::VER_PLATFORM_WIN32_NT as u32);
    assert_eq!(info.suite_mask, VER_SUITE_SINGLEUSERTS);
    assert_eq!(cpu_u32(&info, 0), u32::from_le_bytes(*b"Auth"));
    assert_eq!(cpu_u32(&info, 1), u32::from_le_bytes(*b"enti"));
    assert_eq!(cpu_u32(&info, 2), u32::from_le_bytes(*b"cAMD"));
    assert_eq!(cpu_u32(&info, 3), 0x00100f62);
    assert_eq!(cpu_u32(&info, 4), 0x078bfbff);
    assert_eq!(cpu_u32(&info, 5), 0xefd3fbff);
    assert_eq!(String::from_utf16(&csd_version).unwrap(), "Service Pack 1");
}

#[test]
fn x86_64_mac() {
    let mut writer = SystemInfoWriter::new();
    writer
        .set_cpu_architecture(MDCPUArchitecture::PROCESSOR_ARCHITECTURE_AMD64)
        .set_cpu_level_and_revision(0x0006, 0x3a09)
        .set_cpu_count(8)
        .set_os(MDOSPlatform::MacOs)
        .set_os_type(VER_NT_WORKSTATION)
        .set_os_version(10, 9, 4)
        .set_csd_version("13E28")
        .set_cpu_other_features(0x10427f4c, 0);

    let (info, csd_version) = write_system_info(writer);

    assert_eq!(info.processor_architecture, MDCPUArchitecture::PROCESSOR_ARCHITECTURE_AMD64 as u16);
    assert_eq!(info.number_of_processors, 8);
    assert_eq!(info.platform_id, MDOSPlatform::MacOs as u32);
    assert_eq!(info.major_version, 10);
    assert_eq!(info.minor_version, 9);
    assert_eq!(info.build_number, 4);
    assert_eq!(info.suite_mask, 0);
    assert_eq!(cpu_u64(&info, 0), 0x10427f4c);
    assert_eq!(cpu_u64(&info, 1), 0);
    assert_eq!(String::from_utf16(&csd_version).unwrap(), "13E28");
}

#[test]
fn x86_vendor_from_registers() {
    let mut writer = SystemInfoWriter::new();
    writer
        .set_cpu_architecture(MDCPUArchitecture::PROCESSOR_ARCHITECTURE_INTEL)
        .set_cpu_x86_vendor(
            u32::from_le_bytes(*b"Genu"),
            u32::from_le_bytes(*b"ineI"),
            u32::from_le_bytes(*b"ntel"),
        );

    let (info, _) = write_system_info(writer);

    assert_eq!(&info.cpu.data[..12], b"GenuineIntel");
    assert_eq!(cpu_u32(&info, 3), 0);
}
