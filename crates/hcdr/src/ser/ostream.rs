// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output stream for CDR payloads.
//!
//! The buffer is owned through the caller-supplied allocator and grows in
//! 4 KiB-aligned steps. Multi-byte putters are generic over [`ByteOrder`];
//! the LE/BE facades wrap the same stream and fix the order for call sites
//! that are not themselves generic. Padding bytes are always zero-filled.
//!
//! The stream does not implement `Drop`: callers either hand the buffer off
//! with [`Ostream::into_raw_parts`] or release it with [`Ostream::fini`].

use super::{align_up, cdr_align, ByteOrder, CdrError, CdrResult, XcdrVersion};
use crate::alloc::CdrAllocator;

const GROW_CHUNK: u32 = 0x1000;

pub struct Ostream {
    buf: *mut u8,
    size: u32,
    index: u32,
    version: XcdrVersion,
}

impl Ostream {
    pub fn new(version: XcdrVersion) -> Self {
        Self { buf: std::ptr::null_mut(), size: 0, index: 0, version }
    }

    pub fn with_capacity(
        allocator: &dyn CdrAllocator,
        capacity: u32,
        version: XcdrVersion,
    ) -> Self {
        let mut os = Self::new(version);
        if capacity > 0 {
            os.buf = allocator.alloc(capacity as usize);
            os.size = capacity;
        }
        os
    }

    /// Rebuild a stream over a buffer previously taken with
    /// [`Ostream::into_raw_parts`]. The cursor restarts at zero.
    ///
    /// # Safety
    ///
    /// `buf` must be null (with `capacity` 0) or a live allocation of at
    /// least `capacity` bytes owned by the allocator later passed to grow
    /// or release the stream.
    pub unsafe fn from_raw_parts(buf: *mut u8, capacity: u32, version: XcdrVersion) -> Self {
        Self { buf, size: capacity, index: 0, version }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn version(&self) -> XcdrVersion {
        self.version
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.buf.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.buf, self.index as usize) }
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.buf.is_null() {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.buf, self.index as usize) }
        }
    }

    /// Hand the buffer to the caller: `(buffer, capacity, length)`.
    pub fn into_raw_parts(self) -> (*mut u8, u32, u32) {
        (self.buf, self.size, self.index)
    }

    /// Release the buffer. Must be paired with the allocator that grew it.
    pub fn fini(self, allocator: &dyn CdrAllocator) {
        unsafe { allocator.free(self.buf) };
    }

    fn grow(&mut self, allocator: &dyn CdrAllocator, need: u32) -> CdrResult<()> {
        let Some(required) = self.index.checked_add(need) else {
            return Err(CdrError::OutOfMemory);
        };
        if required <= self.size {
            return Ok(());
        }
        let newsize = align_up(required, GROW_CHUNK);
        self.buf = unsafe { allocator.realloc(self.buf, newsize as usize) };
        self.size = newsize;
        Ok(())
    }

    /// Align the cursor for a primitive of `size` bytes, zero-filling the
    /// padding.
    fn align(&mut self, allocator: &dyn CdrAllocator, size: u32) -> CdrResult<()> {
        let aligned = align_up(self.index, cdr_align(self.version, size));
        let pad = aligned - self.index;
        if pad > 0 {
            self.grow(allocator, pad)?;
            unsafe { std::ptr::write_bytes(self.buf.add(self.index as usize), 0, pad as usize) };
            self.index = aligned;
        }
        Ok(())
    }

    #[inline]
    fn push_raw(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.buf.add(self.index as usize),
                bytes.len(),
            );
        }
        self.index += bytes.len() as u32;
    }

    pub fn put1(&mut self, allocator: &dyn CdrAllocator, v: u8) -> CdrResult<()> {
        self.grow(allocator, 1)?;
        self.push_raw(&[v]);
        Ok(())
    }

    pub fn put2<B: ByteOrder>(&mut self, allocator: &dyn CdrAllocator, v: u16) -> CdrResult<()> {
        self.align(allocator, 2)?;
        self.grow(allocator, 2)?;
        self.push_raw(&B::u16(v).to_ne_bytes());
        Ok(())
    }

    pub fn put4<B: ByteOrder>(&mut self, allocator: &dyn CdrAllocator, v: u32) -> CdrResult<()> {
        self.align(allocator, 4)?;
        self.grow(allocator, 4)?;
        self.push_raw(&B::u32(v).to_ne_bytes());
        Ok(())
    }

    pub fn put8<B: ByteOrder>(&mut self, allocator: &dyn CdrAllocator, v: u64) -> CdrResult<()> {
        self.align(allocator, 8)?;
        self.grow(allocator, 8)?;
        self.push_raw(&B::u64(v).to_ne_bytes());
        Ok(())
    }

    /// Append raw bytes, no alignment.
    pub fn put_bytes(&mut self, allocator: &dyn CdrAllocator, bytes: &[u8]) -> CdrResult<()> {
        self.grow(allocator, bytes.len() as u32)?;
        self.push_raw(bytes);
        Ok(())
    }

    /// Append `num` elements of `elem_size` bytes, aligned for the element
    /// type. Returns the payload offset of the copied block so the caller
    /// can byteswap it in place.
    pub fn put_elems(
        &mut self,
        allocator: &dyn CdrAllocator,
        bytes: &[u8],
        elem_size: u32,
    ) -> CdrResult<u32> {
        self.align(allocator, elem_size)?;
        let offs = self.index;
        self.put_bytes(allocator, bytes)?;
        Ok(offs)
    }

    /// Reserve an aligned 4-byte slot (for a DHEADER or EMHEADER patched in
    /// later). Returns the cursor position just past the slot.
    pub fn reserve4(&mut self, allocator: &dyn CdrAllocator) -> CdrResult<u32> {
        self.align(allocator, 4)?;
        self.grow(allocator, 4)?;
        self.push_raw(&[0, 0, 0, 0]);
        Ok(self.index)
    }

    /// Reserve two consecutive 4-byte slots (EMHEADER plus NEXTINT).
    pub fn reserve8(&mut self, allocator: &dyn CdrAllocator) -> CdrResult<u32> {
        self.align(allocator, 4)?;
        self.grow(allocator, 8)?;
        self.push_raw(&[0; 8]);
        Ok(self.index)
    }

    /// Overwrite the 4 bytes at payload offset `pos`.
    pub fn patch4<B: ByteOrder>(&mut self, pos: u32, v: u32) {
        debug_assert!(pos + 4 <= self.index);
        unsafe {
            std::ptr::copy_nonoverlapping(
                B::u32(v).to_ne_bytes().as_ptr(),
                self.buf.add(pos as usize),
                4,
            );
        }
    }

    /// Pad the payload to a 4-byte boundary with zeros, returning the number
    /// of padding bytes added (the value that goes into the CDR header's
    /// options field).
    pub fn align4_pad(&mut self, allocator: &dyn CdrAllocator) -> CdrResult<u32> {
        let aligned = align_up(self.index, 4);
        let pad = aligned - self.index;
        if pad > 0 {
            self.grow(allocator, pad)?;
            self.push_raw(&[0u8; 4][..pad as usize]);
        }
        Ok(pad)
    }
}

/// Little-endian facade over [`Ostream`].
pub struct OstreamLe(pub Ostream);

/// Big-endian facade over [`Ostream`].
pub struct OstreamBe(pub Ostream);

impl OstreamLe {
    pub fn new(version: XcdrVersion) -> Self {
        Self(Ostream::new(version))
    }

    pub fn into_inner(self) -> Ostream {
        self.0
    }
}

impl OstreamBe {
    pub fn new(version: XcdrVersion) -> Self {
        Self(Ostream::new(version))
    }

    pub fn into_inner(self) -> Ostream {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::LibcAllocator;
    use crate::ser::{BigEndian, LittleEndian, NativeEndian};

    const A: LibcAllocator = LibcAllocator;

    #[test]
    fn test_putters_align_and_zero_fill() {
        let mut os = Ostream::new(XcdrVersion::Xcdr1);
        os.put1(&A, 0xAA).expect("put1");
        os.put4::<LittleEndian>(&A, 0x0102_0304).expect("put4");
        assert_eq!(os.as_slice(), &[0xAA, 0, 0, 0, 0x04, 0x03, 0x02, 0x01]);
        os.fini(&A);
    }

    #[test]
    fn test_big_endian_putter() {
        let mut os = Ostream::new(XcdrVersion::Xcdr1);
        os.put2::<BigEndian>(&A, 0x0102).expect("put2");
        assert_eq!(os.as_slice(), &[0x01, 0x02]);
        os.fini(&A);
    }

    #[test]
    fn test_xcdr2_8_byte_alignment_is_4() {
        let mut os = Ostream::new(XcdrVersion::Xcdr2);
        os.put4::<NativeEndian>(&A, 1).expect("put4");
        os.put8::<NativeEndian>(&A, 2).expect("put8");
        assert_eq!(os.index(), 12);
        os.fini(&A);
    }

    #[test]
    fn test_reserve_and_patch() {
        let mut os = Ostream::new(XcdrVersion::Xcdr2);
        let slot = os.reserve4(&A).expect("reserve4");
        os.put4::<LittleEndian>(&A, 0xdead_beef).expect("put4");
        os.patch4::<LittleEndian>(slot - 4, os.index() - slot);
        assert_eq!(&os.as_slice()[..4], &[4, 0, 0, 0]);
        os.fini(&A);
    }

    #[test]
    fn test_align4_pad_counts() {
        let mut os = Ostream::new(XcdrVersion::Xcdr1);
        os.put1(&A, 1).expect("put1");
        os.put2::<NativeEndian>(&A, 2).expect("put2");
        let pad = os.align4_pad(&A).expect("pad");
        assert_eq!(pad, 0); // 1 + pad + 2 = 4 already
        os.put1(&A, 3).expect("put1");
        let pad = os.align4_pad(&A).expect("pad");
        assert_eq!(pad, 3);
        assert_eq!(os.index() % 4, 0);
        os.fini(&A);
    }

    #[test]
    fn test_growth_preserves_content() {
        let mut os = Ostream::new(XcdrVersion::Xcdr2);
        for i in 0..3000u32 {
            os.put4::<NativeEndian>(&A, i).expect("put4");
        }
        let s = os.as_slice();
        for i in 0..3000u32 {
            let at = (i * 4) as usize;
            assert_eq!(u32::from_ne_bytes(s[at..at + 4].try_into().unwrap()), i);
        }
        os.fini(&A);
    }
}
