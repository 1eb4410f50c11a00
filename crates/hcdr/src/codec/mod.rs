// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The opcode interpreter: serialize, deserialize, validate, default-fill,
//! release and print native records driven by a type's operation program.
//!
//! # Native record contract
//!
//! Samples are addressed through raw byte offsets taken from the program:
//!
//! - booleans and 1-byte integers occupy one byte; 2/4/8-byte primitives sit
//!   at their ADR offsets and are accessed unaligned;
//! - enums are 32-bit in the record regardless of wire width, bitmasks match
//!   their wire width;
//! - unbounded strings are NUL-terminated `*mut u8` owned through the
//!   allocator (null serializes as the empty string), bounded strings are
//!   inline byte arrays;
//! - sequences are [`CdrSeq`] headers whose `maximum`/`release` fields
//!   govern buffer reuse;
//! - `@external` and optional members are one pointer, null meaning absent.
//!
//! Every public function taking a record pointer is `unsafe`: the caller
//! guarantees the record matches the program. A program that contradicts
//! itself is a bug in its generator and panics the interpreter.

pub(crate) mod free;
pub(crate) mod normalize;
pub(crate) mod print;
pub(crate) mod read;
pub(crate) mod skip;
pub(crate) mod write;

use crate::alloc::CdrAllocator;
use crate::desc::{CdrDesc, DESC_FLAG_CONTAINS_UNION};
use crate::ser::{
    ByteOrder, ByteOrderKind, BigEndian, CdrError, CdrResult, Istream, LittleEndian, NativeEndian,
    Ostream, OstreamBe, OstreamLe, XcdrVersion, CDR_SIZE_MAX,
};

/// Sequence header inside a native record. ABI-compatible with the
/// `{ maximum, length, buffer, release }` layout generated type supports
/// use.
#[repr(C)]
#[derive(Debug)]
pub struct CdrSeq {
    pub maximum: u32,
    pub length: u32,
    pub buffer: *mut u8,
    pub release: bool,
}

#[inline]
pub(crate) unsafe fn load<T: Copy>(data: *const u8, offs: u32) -> T {
    data.add(offs as usize).cast::<T>().read_unaligned()
}

#[inline]
pub(crate) unsafe fn store<T>(data: *mut u8, offs: u32, v: T) {
    data.add(offs as usize).cast::<T>().write_unaligned(v);
}

/// Length of a NUL-terminated string, in bytes excluding the NUL.
pub(crate) unsafe fn cstr_len(ptr: *const u8) -> u32 {
    libc::strlen(ptr.cast()) as u32
}

/// Serialize `sample` into `os` in the byte order selected by `B`.
///
/// Uses the descriptor's memcpy fast path when the native record and the
/// wire image coincide for the stream's XCDR version.
///
/// # Safety
///
/// `sample` must point at a live native record laid out as `desc.ops`
/// describes.
pub unsafe fn write_sample_bo<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
) -> CdrResult<()> {
    let opt_size = desc.opt_size(os.version());
    if opt_size != 0 && !B::SWAP {
        let bytes = std::slice::from_raw_parts(sample, opt_size as usize);
        return os.put_bytes(allocator, bytes);
    }
    write::write_impl::<B>(os, allocator, sample, &desc.ops, 0, false).map(|_| ())
}

/// Serialize in host byte order.
///
/// # Safety
///
/// See [`write_sample_bo`].
pub unsafe fn write_sample(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
) -> CdrResult<()> {
    write_sample_bo::<NativeEndian>(os, allocator, sample, desc)
}

/// Serialize little-endian.
///
/// # Safety
///
/// See [`write_sample_bo`].
pub unsafe fn write_sample_le(
    os: &mut OstreamLe,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
) -> CdrResult<()> {
    write_sample_bo::<LittleEndian>(&mut os.0, allocator, sample, desc)
}

/// Serialize big-endian.
///
/// # Safety
///
/// See [`write_sample_bo`].
pub unsafe fn write_sample_be(
    os: &mut OstreamBe,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
) -> CdrResult<()> {
    write_sample_bo::<BigEndian>(&mut os.0, allocator, sample, desc)
}

/// Serialize with a runtime byte-order choice.
///
/// # Safety
///
/// See [`write_sample_bo`].
pub unsafe fn write_sample_with_byte_order(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
    bo: ByteOrderKind,
) -> CdrResult<()> {
    match bo {
        ByteOrderKind::Native => write_sample_bo::<NativeEndian>(os, allocator, sample, desc),
        ByteOrderKind::Le => write_sample_bo::<LittleEndian>(os, allocator, sample, desc),
        ByteOrderKind::Be => write_sample_bo::<BigEndian>(os, allocator, sample, desc),
    }
}

/// Deserialize a normalized payload into `sample`.
///
/// Strings and sequence buffers already owned by the record are reused when
/// capacity permits. Union-containing records are released and zeroed first
/// so no stale pointer survives a case switch.
///
/// # Safety
///
/// `sample` must point at a zero-initialized or previously-read record laid
/// out as `desc.ops` describes; `is` must carry a payload accepted by
/// [`normalize`] for the same descriptor.
pub unsafe fn read_sample(
    is: &mut Istream<'_>,
    sample: *mut u8,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) {
    let opt_size = desc.opt_size(is.version());
    if opt_size != 0 {
        // sizeof(record) may exceed the wire image by trailing padding only
        let bytes = is.bytes(opt_size);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), sample, opt_size as usize);
    } else {
        if desc.flagset & DESC_FLAG_CONTAINS_UNION != 0 {
            free::free_sample_members(sample, allocator, &desc.ops);
            std::ptr::write_bytes(sample, 0, desc.size as usize);
        }
        read::read_impl(is, sample, allocator, &desc.ops, 0, false);
    }
}

/// Validate a received payload in place, byteswapping when `bswap`.
///
/// On success the buffer holds host-order bytes and the returned value is
/// the actual payload size, at most `data.len()` (trailing padding is not
/// counted). On failure the buffer contents are unspecified and must be
/// discarded.
pub fn normalize(
    data: &mut [u8],
    bswap: bool,
    version: XcdrVersion,
    desc: &CdrDesc,
    just_key: bool,
) -> CdrResult<u32> {
    let size = data.len();
    if size > CDR_SIZE_MAX as usize {
        return Err(CdrError::OutOfBounds { offset: 0, need: size as u32, size: CDR_SIZE_MAX });
    }
    if just_key {
        normalize::normalize_key(data, bswap, version, desc)
    } else {
        let mut off = 0u32;
        normalize::normalize_impl(data, &mut off, size as u32, bswap, version, &desc.ops, 0, false)?;
        Ok(off)
    }
}

/// Release every owned string, sequence buffer and external member of
/// `sample`, leaving the record defaulted.
///
/// # Safety
///
/// `sample` must point at a record laid out as `ops` describes, with every
/// pointer member either null or owned through `allocator`.
pub unsafe fn free_sample(sample: *mut u8, allocator: &dyn CdrAllocator, ops: &[u32]) {
    free::free_sample_members(sample, allocator, ops);
}

/// Write default values (zeros, empty strings, zero-length sequences) into
/// `sample`.
///
/// # Safety
///
/// As for [`free_sample`].
pub unsafe fn skip_default(sample: *mut u8, allocator: &dyn CdrAllocator, ops: &[u32]) {
    skip::skip_default_impl(sample, allocator, ops, 0);
}

/// Render a serialized sample as text.
pub fn print_sample(is: &mut Istream<'_>, desc: &CdrDesc, out: &mut String) {
    print::print_impl(is, &desc.ops, 0, out, false);
}

/// Render a serialized key as text.
pub fn print_key(is: &mut Istream<'_>, desc: &CdrDesc, out: &mut String) {
    print::print_key_impl(is, desc, out);
}
