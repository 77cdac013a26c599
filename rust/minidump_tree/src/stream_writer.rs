/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::writable::Writable;

/// A node that can be attached directly to a
/// [`MinidumpFileWriter`](crate::MinidumpFileWriter) and gets an entry in the
/// stream directory.
///
/// The file writer registers the directory entry's location on the stream
/// while freezing, so implementors only have to describe their own bytes.
pub trait StreamWriter: Writable {
    /// An [`MDStreamType`](crate::minidump_format::MDStreamType) value, or a
    /// vendor specific one. At most one stream per type may be attached.
    fn stream_type(&self) -> u32;
}
