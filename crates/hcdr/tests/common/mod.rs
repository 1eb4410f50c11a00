// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Shared helpers for the integration tests: sample-to-bytes wrappers and
// C-string construction for record fields.

#![allow(dead_code)]

use hcdr::{
    normalize, write_sample_bo, BigEndian, CdrAllocator, CdrDesc, CdrResult, LibcAllocator,
    LittleEndian, NativeEndian, Ostream, XcdrVersion,
};

pub const A: LibcAllocator = LibcAllocator;

/// Allocate a NUL-terminated copy of `s` through the default allocator, the
/// way string members live inside native records.
pub fn cstr(s: &str) -> *mut u8 {
    let p = A.alloc(s.len() + 1);
    unsafe {
        std::ptr::copy_nonoverlapping(s.as_ptr(), p, s.len());
        *p.add(s.len()) = 0;
    }
    p
}

fn write_with<B: hcdr::ByteOrder>(
    desc: &CdrDesc,
    sample: *const u8,
    version: XcdrVersion,
) -> CdrResult<Vec<u8>> {
    let mut os = Ostream::new(version);
    let r = unsafe { write_sample_bo::<B>(&mut os, &A, sample, desc) };
    let bytes = os.as_slice().to_vec();
    os.fini(&A);
    r.map(|()| bytes)
}

pub fn write_le(desc: &CdrDesc, sample: *const u8, version: XcdrVersion) -> Vec<u8> {
    write_with::<LittleEndian>(desc, sample, version).expect("serialization should succeed")
}

pub fn write_be(desc: &CdrDesc, sample: *const u8, version: XcdrVersion) -> Vec<u8> {
    write_with::<BigEndian>(desc, sample, version).expect("serialization should succeed")
}

pub fn write_native(desc: &CdrDesc, sample: *const u8, version: XcdrVersion) -> Vec<u8> {
    write_with::<NativeEndian>(desc, sample, version).expect("serialization should succeed")
}

pub fn try_write_native(
    desc: &CdrDesc,
    sample: *const u8,
    version: XcdrVersion,
) -> CdrResult<Vec<u8>> {
    write_with::<NativeEndian>(desc, sample, version)
}

/// Normalize a copy of `bytes` (as received with `from_le`/`from_be`
/// endianness) and return the host-order buffer plus the actual size.
pub fn normalize_from(
    bytes: &[u8],
    sender_is_le: bool,
    version: XcdrVersion,
    desc: &CdrDesc,
    just_key: bool,
) -> CdrResult<(Vec<u8>, u32)> {
    let mut copy = bytes.to_vec();
    let bswap = sender_is_le != cfg!(target_endian = "little");
    let actual = normalize(&mut copy, bswap, version, desc, just_key)?;
    Ok((copy, actual))
}
