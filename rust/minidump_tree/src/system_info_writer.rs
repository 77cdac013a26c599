/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use {
    crate::{
        errors::WriterError,
        link_table::{LinkTable, RvaId},
        minidump_format::{
            encode_record, record_size, MDCPUArchitecture, MDCPUInformation, MDOSPlatform,
            MDRawSystemInfo, MDStreamType,
        },
        sink::TrackedSink,
        stream_writer::StreamWriter,
        string_writer::Utf16StringWriter,
        writable::{State, Writable, WritableBase},
    },
    std::io::IoSlice,
};

/// The system info stream: processor and operating system identification,
/// followed by the OS service pack string it points at.
pub struct SystemInfoWriter {
    base: WritableBase,
    info: MDRawSystemInfo,
    csd_version: Utf16StringWriter,
    csd_version_rva: Option<RvaId>,
}

impl Default for SystemInfoWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemInfoWriter {
    pub fn new() -> Self {
        Self {
            base: WritableBase::new(),
            info: MDRawSystemInfo {
                processor_architecture: MDCPUArchitecture::PROCESSOR_ARCHITECTURE_UNKNOWN as u16,
                processor_level: 0,
                processor_revision: 0,
                number_of_processors: 0,
                product_type: 0,
                major_version: 0,
                minor_version: 0,
                build_number: 0,
                platform_id: 0,
                csd_version_rva: 0,
                suite_mask: 0,
                reserved2: 0,
                cpu: MDCPUInformation { data: [0; 24] },
            },
            csd_version: Utf16StringWriter::default(),
            csd_version_rva: None,
        }
    }

    fn is_x86(&self) -> bool {
        let architecture = self.info.processor_architecture;
        architecture == MDCPUArchitecture::PROCESSOR_ARCHITECTURE_INTEL as u16
            || architecture == MDCPUArchitecture::PROCESSOR_ARCHITECTURE_IA32_ON_WIN64 as u16
    }

    fn set_cpu_word(&mut self, offset: usize, bytes: &[u8]) {
        self.base.assert_state(State::Mutable);
        self.info.cpu.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn set_cpu_architecture(&mut self, architecture: MDCPUArchitecture) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.info.processor_architecture = architecture as u16;
        self
    }

    pub fn set_cpu_level_and_revision(&mut self, level: u16, revision: u16) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.info.processor_level = level;
        self.info.processor_revision = revision;
        self
    }

    pub fn set_cpu_count(&mut self, count: u8) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.info.number_of_processors = count;
        self
    }

    pub fn set_os(&mut self, platform: MDOSPlatform) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.info.platform_id = platform as u32;
        self
    }

    /// `VER_NT_WORKSTATION` (1), `VER_NT_DOMAIN_CONTROLLER` (2) or
    /// `VER_NT_SERVER` (3).
    pub fn set_os_type(&mut self, product_type: u8) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.info.product_type = product_type;
        self
    }

    pub fn set_os_version(&mut self, major: u32, minor: u32, build: u32) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.info.major_version = major;
        self.info.minor_version = minor;
        self.info.build_number = build;
        self
    }

    /// The service pack or build string, e.g. `Service Pack 1`.
    pub fn set_csd_version(&mut self, csd_version: &str) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.csd_version.set_string(csd_version);
        self
    }

    pub fn set_suite_mask(&mut self, suite_mask: u16) -> &mut Self {
        self.base.assert_state(State::Mutable);
        self.info.suite_mask = suite_mask;
        self
    }

    /// The vendor as returned in `ebx`, `edx` and `ecx` by `cpuid` leaf 0.
    pub fn set_cpu_x86_vendor(&mut self, ebx: u32, edx: u32, ecx: u32) -> &mut Self {
        debug_assert!(self.is_x86());
        self.set_cpu_word(0, &ebx.to_le_bytes());
        self.set_cpu_word(4, &edx.to_le_bytes());
        self.set_cpu_word(8, &ecx.to_le_bytes());
        self
    }

    /// The vendor as a string, e.g. `GenuineIntel`.
    pub fn set_cpu_x86_vendor_string(&mut self, vendor: &[u8; 12]) -> &mut Self {
        debug_assert!(self.is_x86());
        self.set_cpu_word(0, vendor);
        self
    }

    pub fn set_cpu_x86_version_and_features(&mut self, version: u32, features: u32) -> &mut Self {
        debug_assert!(self.is_x86());
        self.set_cpu_word(12, &version.to_le_bytes());
        self.set_cpu_word(16, &features.to_le_bytes());
        self
    }

    /// Only meaningful for `AuthenticAMD` processors.
    pub fn set_cpu_x86_amd_extended_features(&mut self, extended_features: u32) -> &mut Self {
        debug_assert!(self.is_x86());
        debug_assert_eq!(&self.info.cpu.data[..12], b"AuthenticAMD");
        self.set_cpu_word(20, &extended_features.to_le_bytes());
        self
    }

    /// Processor feature bits for every architecture other than x86.
    pub fn set_cpu_other_features(&mut self, features_0: u64, features_1: u64) -> &mut Self {
        debug_assert!(!self.is_x86());
        self.set_cpu_word(0, &features_0.to_le_bytes());
        self.set_cpu_word(8, &features_1.to_le_bytes());
        self
    }
}

impl Writable for SystemInfoWriter {
    fn base(&self) -> &WritableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WritableBase {
        &mut self.base
    }

    fn on_freeze(&mut self, links: &mut LinkTable) -> Result<(), WriterError> {
        let rva = links.new_rva();
        self.csd_version.base_mut().register_rva(rva);
        self.csd_version_rva = Some(rva);
        Ok(())
    }

    fn size_of_object(&self) -> u64 {
        record_size::<MDRawSystemInfo>() as u64
    }

    fn children(&mut self) -> Vec<&mut dyn Writable> {
        vec![&mut self.csd_version as &mut dyn Writable]
    }

    fn write_object(
        &mut self,
        sink: &mut TrackedSink<'_>,
        links: &LinkTable,
    ) -> Result<(), WriterError> {
        if let Some(rva) = self.csd_version_rva {
            self.info.csd_version_rva = links.rva(rva);
        }
        let info = encode_record(self.info.clone())?;
        sink.write_iovec(&mut [IoSlice::new(&info)])?;
        Ok(())
    }
}

impl StreamWriter for SystemInfoWriter {
    fn stream_type(&self) -> u32 {
        MDStreamType::SystemInfoStream as u32
    }
}
