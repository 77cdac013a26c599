/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::{self, IoSlice, Seek, SeekFrom, Write};

/// Where a minidump ends up.
///
/// Anything that is `Write + Seek` is a sink; the trait only exists so the
/// tree can hold it as a trait object.
pub trait DumpSink {
    /// Writes every fragment, in order, at the current position.
    fn write_iovec(&mut self, bufs: &mut [IoSlice<'_>]) -> io::Result<()>;

    /// The current absolute position.
    fn position(&mut self) -> io::Result<u64>;

    /// Moves to the absolute position `offset`.
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;
}

impl<T: Write + Seek + ?Sized> DumpSink for T {
    fn write_iovec(&mut self, mut bufs: &mut [IoSlice<'_>]) -> io::Result<()> {
        IoSlice::advance_slices(&mut bufs, 0);
        while !bufs.is_empty() {
            match self.write_vectored(bufs) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ))
                }
                Ok(n) => IoSlice::advance_slices(&mut bufs, n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

/// A sink that knows how far into the dump it is.
///
/// Positions are relative to where the dump started, which is not necessarily
/// the start of the underlying sink.
pub struct TrackedSink<'a> {
    inner: &'a mut dyn DumpSink,
    position: u64,
}

const PADDING: [u8; 16] = [0; 16];

impl<'a> TrackedSink<'a> {
    pub fn new(inner: &'a mut dyn DumpSink) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written since the dump started.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write_iovec(&mut self, bufs: &mut [IoSlice<'_>]) -> io::Result<()> {
        let len: usize = bufs.iter().map(|buf| buf.len()).sum();
        self.inner.write_iovec(bufs)?;
        self.position += len as u64;
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_iovec(&mut [IoSlice::new(buf)])
    }

    /// Writes `len` zero bytes.
    pub fn write_padding(&mut self, mut len: u64) -> io::Result<()> {
        while len > 0 {
            let chunk = len.min(PADDING.len() as u64) as usize;
            self.write_all(&PADDING[..chunk])?;
            len -= chunk as u64;
        }
        Ok(())
    }
}
