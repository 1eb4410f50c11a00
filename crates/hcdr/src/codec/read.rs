// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deserializer: populates native records from a normalized input stream.
//!
//! Reading cannot fail: every invariant was checked by normalize. Strings
//! and sequence buffers already owned by the record are reused when their
//! capacity permits; optional members absent from the data are released and
//! nulled.

use crate::alloc::{alloc_zeroed, CdrAllocator};
use crate::codec::{cstr_len, free, load, skip, store, CdrSeq};
use crate::codec::write::{
    emheader_length_code, emheader_member_id, LC_ALSO_NEXTINT, LC_NEXTINT,
};
use crate::ops::{
    self, find_union_case, insn_jump, jeq4_sub_program, op_kind, op_subtype, op_type,
    op_type_base, op_type_external, op_type_optional, op_type_size, rel, skip_adr, OpKind,
    TypeCode,
};
use crate::ser::{Istream, XcdrVersion};

/// Does this member use pointer indirection in the native record?
#[inline]
pub(crate) fn needs_external_storage(insn: u32) -> bool {
    op_type_external(insn) || (op_type_optional(insn) && op_type(insn) != TypeCode::Str)
}

/// Read a string into `old`, reallocating when the previous allocation is
/// too small. The stream length includes the terminating NUL.
pub(crate) unsafe fn reuse_string(
    is: &mut Istream<'_>,
    old: *mut u8,
    allocator: &dyn CdrAllocator,
) -> *mut u8 {
    let length = is.get4();
    let src = is.bytes(length);
    let dst = if old.is_null() || cstr_len(old) + 1 < length {
        allocator.realloc(old, length as usize)
    } else {
        old
    };
    std::ptr::copy_nonoverlapping(src.as_ptr(), dst, length as usize);
    dst
}

/// Read a string into an inline array of `size` bytes, truncating with NUL
/// termination when the serialized form is longer.
pub(crate) unsafe fn reuse_string_bound(is: &mut Istream<'_>, dst: *mut u8, size: u32) {
    let length = is.get4();
    let src = is.bytes(length);
    let n = length.min(size);
    std::ptr::copy_nonoverlapping(src.as_ptr(), dst, n as usize);
    if length > size {
        *dst.add(size as usize - 1) = 0;
    }
}

/// Reset a string member to the empty string, allocating when null.
pub(crate) unsafe fn reuse_string_empty(old: *mut u8, allocator: &dyn CdrAllocator) -> *mut u8 {
    let dst = if old.is_null() { allocator.alloc(1) } else { old };
    *dst = 0;
    dst
}

pub(crate) unsafe fn skip_string(is: &mut Istream<'_>) {
    let length = is.get4();
    is.skip(length);
}

/// Grow a sequence buffer when `maximum`/`release` allow it. The caller's
/// preallocated buffer is kept when it is large enough.
pub(crate) unsafe fn realloc_seq(
    seq: &mut CdrSeq,
    allocator: &dyn CdrAllocator,
    num: u32,
    elem_size: u32,
    init: bool,
) {
    let size = (num * elem_size) as usize;
    if seq.length > seq.maximum {
        seq.maximum = seq.length;
    }
    if num > seq.maximum && seq.release {
        seq.buffer = allocator.realloc(seq.buffer, size);
        if init {
            let off = (seq.maximum * elem_size) as usize;
            std::ptr::write_bytes(seq.buffer.add(off), 0, size - off);
        }
        seq.maximum = num;
    } else if num > 0 && seq.maximum == 0 {
        seq.buffer = allocator.alloc(size);
        if init {
            std::ptr::write_bytes(seq.buffer, 0, size);
        }
        seq.release = true;
        seq.maximum = num;
    }
}

/// Materialize pointer-indirected storage for an external or optional
/// member, zero-initialized so nested sequences and strings start empty.
pub(crate) unsafe fn alloc_external(
    ops: &[u32],
    pc: usize,
    insn: u32,
    addr: &mut *mut u8,
    allocator: &dyn CdrAllocator,
) {
    let size = ops::adr_native_size(insn, ops, pc) as usize;
    let slot = (*addr).cast::<*mut u8>();
    if (*slot).is_null() {
        *slot = alloc_zeroed(allocator, size);
    }
    *addr = *slot;
}

#[inline]
fn member_present(insn: u32, is: &mut Istream<'_>, is_mutable_member: bool) -> bool {
    !op_type_optional(insn) || is_mutable_member || is.get1() != 0
}

unsafe fn read_seq(
    is: &mut Istream<'_>,
    addr: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> usize {
    let seq = &mut *addr.cast::<CdrSeq>();
    let subtype = op_subtype(insn);
    let bound_op = usize::from(ops::seq_is_bounded(op_type(insn)));

    if ops::is_dheader_needed(subtype, is.version()) {
        is.get4();
    }
    let num = is.get4();
    if num == 0 {
        seq.length = 0;
        return ops::skip_sequence_ops(insn, ops, pc);
    }

    match subtype {
        t @ (TypeCode::Boolean
        | TypeCode::Byte1
        | TypeCode::Byte2
        | TypeCode::Byte4
        | TypeCode::Byte8) => {
            let elem_size = t.primitive_size();
            realloc_seq(seq, allocator, num, elem_size, false);
            seq.length = num.min(seq.maximum);
            let src = is.elems(seq.length, elem_size);
            std::ptr::copy_nonoverlapping(src.as_ptr(), seq.buffer, src.len());
            if seq.length < num {
                is.skip((num - seq.length) * elem_size);
            }
            pc + 2 + bound_op
        }
        TypeCode::Enum => {
            let elem_size = op_type_size(insn);
            realloc_seq(seq, allocator, num, 4, false);
            seq.length = num.min(seq.maximum);
            match elem_size {
                1 => {
                    for i in 0..seq.length {
                        store::<u32>(seq.buffer, i * 4, u32::from(is.get1()));
                    }
                }
                2 => {
                    for i in 0..seq.length {
                        store::<u32>(seq.buffer, i * 4, u32::from(is.get2()));
                    }
                }
                4 => {
                    let src = is.elems(seq.length, 4);
                    std::ptr::copy_nonoverlapping(src.as_ptr(), seq.buffer, src.len());
                }
                _ => unreachable!(),
            }
            if seq.length < num {
                is.skip((num - seq.length) * elem_size);
            }
            pc + 3 + bound_op
        }
        TypeCode::Bitmask => {
            let elem_size = op_type_size(insn);
            realloc_seq(seq, allocator, num, elem_size, false);
            seq.length = num.min(seq.maximum);
            let src = is.elems(seq.length, elem_size);
            std::ptr::copy_nonoverlapping(src.as_ptr(), seq.buffer, src.len());
            if seq.length < num {
                is.skip((num - seq.length) * elem_size);
            }
            pc + 4 + bound_op
        }
        TypeCode::Str => {
            let ptr_size = std::mem::size_of::<*mut u8>() as u32;
            realloc_seq(seq, allocator, num, ptr_size, true);
            seq.length = num.min(seq.maximum);
            for i in 0..seq.length {
                let old = load::<*mut u8>(seq.buffer, i * ptr_size);
                store(seq.buffer, i * ptr_size, reuse_string(is, old, allocator));
            }
            for _ in seq.length..num {
                skip_string(is);
            }
            pc + 2 + bound_op
        }
        TypeCode::BStr => {
            let elem_size = ops[pc + 2 + bound_op];
            realloc_seq(seq, allocator, num, elem_size, false);
            seq.length = num.min(seq.maximum);
            for i in 0..seq.length {
                reuse_string_bound(is, seq.buffer.add((i * elem_size) as usize), elem_size);
            }
            for _ in seq.length..num {
                skip_string(is);
            }
            pc + 3 + bound_op
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let elem_size = ops[pc + 2 + bound_op];
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3 + bound_op])));
            let jmp = ops::jmp_of(ops[pc + 3 + bound_op]);
            realloc_seq(seq, allocator, num, elem_size, true);
            seq.length = num.min(seq.maximum);
            for i in 0..seq.length {
                read_impl(is, seq.buffer.add((i * elem_size) as usize), allocator, ops, jsr_pc, false);
            }
            // elements beyond a non-growable buffer still have to be consumed
            for _ in seq.length..num {
                let tmp = alloc_zeroed(allocator, elem_size as usize);
                read_impl(is, tmp, allocator, ops, jsr_pc, false);
                free::free_sample_impl(tmp, allocator, ops, jsr_pc);
                allocator.free(tmp);
            }
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else {
                pc + 4 + bound_op
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as a sequence element"),
    }
}

unsafe fn read_arr(
    is: &mut Istream<'_>,
    addr: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> usize {
    let subtype = op_subtype(insn);
    if ops::is_dheader_needed(subtype, is.version()) {
        is.get4();
    }
    let num = ops[pc + 2];
    match subtype {
        t @ (TypeCode::Boolean
        | TypeCode::Byte1
        | TypeCode::Byte2
        | TypeCode::Byte4
        | TypeCode::Byte8) => {
            let src = is.elems(num, t.primitive_size());
            std::ptr::copy_nonoverlapping(src.as_ptr(), addr, src.len());
        }
        TypeCode::Enum => match op_type_size(insn) {
            1 => {
                for i in 0..num {
                    store::<u32>(addr, i * 4, u32::from(is.get1()));
                }
            }
            2 => {
                for i in 0..num {
                    store::<u32>(addr, i * 4, u32::from(is.get2()));
                }
            }
            4 => {
                let src = is.elems(num, 4);
                std::ptr::copy_nonoverlapping(src.as_ptr(), addr, src.len());
            }
            _ => unreachable!(),
        },
        TypeCode::Bitmask => {
            let src = is.elems(num, op_type_size(insn));
            std::ptr::copy_nonoverlapping(src.as_ptr(), addr, src.len());
        }
        TypeCode::Str => {
            let ptr_size = std::mem::size_of::<*mut u8>() as u32;
            for i in 0..num {
                let old = load::<*mut u8>(addr, i * ptr_size);
                store(addr, i * ptr_size, reuse_string(is, old, allocator));
            }
        }
        TypeCode::BStr => {
            let elem_size = ops[pc + 4];
            for i in 0..num {
                reuse_string_bound(is, addr.add((i * elem_size) as usize), elem_size);
            }
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let elem_size = ops[pc + 4];
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3])));
            for i in 0..num {
                read_impl(is, addr.add((i * elem_size) as usize), allocator, ops, jsr_pc, false);
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as an array element"),
    }
    ops::skip_array_ops(insn, ops, pc)
}

pub(crate) fn read_union_discriminant(is: &mut Istream<'_>, insn: u32) -> u32 {
    match op_subtype(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => u32::from(is.get1()),
        TypeCode::Byte2 => u32::from(is.get2()),
        TypeCode::Byte4 => is.get4(),
        TypeCode::Enum => match op_type_size(insn) {
            1 => u32::from(is.get1()),
            2 => u32::from(is.get2()),
            4 => is.get4(),
            _ => unreachable!(),
        },
        other => panic!("{:?} cannot discriminate a union", other),
    }
}

unsafe fn read_uni(
    is: &mut Istream<'_>,
    disc_addr: *mut u8,
    base: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> usize {
    let disc = read_union_discriminant(is, insn);
    match op_subtype(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => store(disc_addr, 0, disc as u8),
        TypeCode::Byte2 => store(disc_addr, 0, disc as u16),
        TypeCode::Byte4 | TypeCode::Enum => store(disc_addr, 0, disc),
        _ => unreachable!(),
    }

    let next = skip_adr(insn, ops, pc);
    let Some(jeq_pc) = find_union_case(ops, pc, disc) else {
        return next;
    };
    let jeq_insn = ops[jeq_pc];
    let mut valaddr = base.add(ops[jeq_pc + 2] as usize);
    if op_type_external(jeq_insn) {
        let size = crate::codec::write::jeq4_case_size(ops, jeq_pc) as usize;
        let slot = valaddr.cast::<*mut u8>();
        if (*slot).is_null() {
            *slot = alloc_zeroed(allocator, size);
        }
        valaddr = *slot;
    }

    match op_type(jeq_insn) {
        TypeCode::Boolean | TypeCode::Byte1 => store(valaddr, 0, is.get1()),
        TypeCode::Byte2 => store(valaddr, 0, is.get2()),
        TypeCode::Byte4 => store(valaddr, 0, is.get4()),
        TypeCode::Byte8 => store(valaddr, 0, is.get8()),
        TypeCode::Enum => {
            let v = match op_type_size(jeq_insn) {
                1 => u32::from(is.get1()),
                2 => u32::from(is.get2()),
                4 => is.get4(),
                _ => unreachable!(),
            };
            store(valaddr, 0, v);
        }
        TypeCode::Str => {
            let old = load::<*mut u8>(valaddr, 0);
            store(valaddr, 0, reuse_string(is, old, allocator));
        }
        TypeCode::BStr => reuse_string_bound(is, valaddr, ops[jeq_pc + 3]),
        TypeCode::Seq
        | TypeCode::BSeq
        | TypeCode::Arr
        | TypeCode::Uni
        | TypeCode::Stu
        | TypeCode::Bitmask => {
            read_impl(is, valaddr, allocator, ops, jeq4_sub_program(ops, jeq_pc), false);
        }
        TypeCode::Ext => panic!("EXT is not allowed as a union case type"),
    }
    next
}

unsafe fn read_adr(
    insn: u32,
    is: &mut Istream<'_>,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    is_mutable_member: bool,
) -> usize {
    let mut addr = data.add(ops[pc + 1] as usize);
    if !member_present(insn, is, is_mutable_member) {
        return free::free_sample_adr(insn, data, allocator, ops, pc);
    }
    if needs_external_storage(insn) {
        alloc_external(ops, pc, insn, &mut addr, allocator);
    }

    match op_type(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => store(addr, 0, is.get1()),
        TypeCode::Byte2 => store(addr, 0, is.get2()),
        TypeCode::Byte4 => store(addr, 0, is.get4()),
        TypeCode::Byte8 => store(addr, 0, is.get8()),
        TypeCode::Str => {
            let old = load::<*mut u8>(addr, 0);
            store(addr, 0, reuse_string(is, old, allocator));
        }
        TypeCode::BStr => reuse_string_bound(is, addr, ops[pc + 2]),
        TypeCode::Enum => {
            let v = match op_type_size(insn) {
                1 => u32::from(is.get1()),
                2 => u32::from(is.get2()),
                4 => is.get4(),
                _ => unreachable!(),
            };
            store(addr, 0, v);
        }
        TypeCode::Bitmask => match op_type_size(insn) {
            1 => store(addr, 0, is.get1()),
            2 => store(addr, 0, is.get2()),
            4 => store(addr, 0, is.get4()),
            8 => store(addr, 0, is.get8()),
            _ => unreachable!(),
        },
        TypeCode::Seq | TypeCode::BSeq => return read_seq(is, addr, allocator, ops, pc, insn),
        TypeCode::Arr => return read_arr(is, addr, allocator, ops, pc, insn),
        TypeCode::Uni => return read_uni(is, addr, data, allocator, ops, pc, insn),
        TypeCode::Ext => {
            let mut jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            // base-type members embed without their own delimiter
            if op_type_base(insn) && op_kind(ops[jsr_pc]) == OpKind::Dlc {
                jsr_pc += 1;
            }
            read_impl(is, addr, allocator, ops, jsr_pc, false);
        }
        TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
    }
    skip_adr(insn, ops, pc)
}

unsafe fn read_delimited(
    is: &mut Istream<'_>,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc0: usize,
) -> usize {
    let delimited_sz = is.get4();
    let delimited_offs = is.index();
    let mut pc = pc0 + 1;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => break,
            OpKind::Adr => {
                // default members the serialized data does not carry
                pc = if is.index() - delimited_offs < delimited_sz {
                    read_adr(insn, is, data, allocator, ops, pc, false)
                } else {
                    skip::skip_adr_default(insn, data, allocator, ops, pc)
                };
            }
            OpKind::Jsr => {
                read_impl(is, data, allocator, ops, rel(pc, i32::from(insn_jump(insn))), false);
                pc += 1;
            }
            other => panic!("{:?} inside a delimited body", other),
        }
    }
    // skip what the peer appended beyond our program
    let consumed = is.index() - delimited_offs;
    if delimited_sz > consumed {
        is.skip(delimited_sz - consumed);
    }
    pc
}

unsafe fn read_pl_member(
    is: &mut Istream<'_>,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    m_id: u32,
    ops: &[u32],
    pc0: usize,
) -> bool {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        if op_kind(insn) == OpKind::Rts {
            return false;
        }
        debug_assert_eq!(op_kind(insn), OpKind::Plm);
        let mut plm_pc = rel(pc, i32::from(insn_jump(insn)));
        if ops::plm_flags(insn) & ops::FLAG_BASE != 0 {
            debug_assert_eq!(op_kind(ops[plm_pc]), OpKind::Plc);
            plm_pc += 1;
            if read_pl_member(is, data, allocator, m_id, ops, plm_pc) {
                return true;
            }
        } else if ops[pc + 1] == m_id {
            read_impl(is, data, allocator, ops, plm_pc, true);
            return true;
        }
        pc += 2;
    }
}

unsafe fn read_pl(
    is: &mut Istream<'_>,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc0: usize,
) -> usize {
    let pc = pc0 + 1;

    // default everything first; members present in the data overwrite
    skip::skip_pl_memberlist_default(data, allocator, ops, pc);

    let pl_sz = is.get4();
    let pl_offs = is.index();
    while is.index() - pl_offs < pl_sz {
        let em_hdr = is.get4();
        let lc = emheader_length_code(em_hdr);
        let m_id = emheader_member_id(em_hdr);
        let msz = match lc {
            0..=3 => 1u32 << lc,
            LC_NEXTINT => is.get4(),
            // codes 6/7 alias an element count of 4/8-byte elements
            _ => is.peek4() << if lc > 5 { lc - 4 } else { 0 },
        };
        if !read_pl_member(is, data, allocator, m_id, ops, pc) {
            is.skip(msz);
            if lc >= LC_ALSO_NEXTINT {
                // the aliased length does not count its own 4 bytes
                is.skip(4);
            }
        }
    }

    let mut pc = pc;
    while op_kind(ops[pc]) != OpKind::Rts {
        pc += 2;
    }
    pc
}

pub(crate) unsafe fn read_impl(
    is: &mut Istream<'_>,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc0: usize,
    is_mutable_member: bool,
) -> usize {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return pc,
            OpKind::Adr => pc = read_adr(insn, is, data, allocator, ops, pc, is_mutable_member),
            OpKind::Jsr => {
                read_impl(
                    is,
                    data,
                    allocator,
                    ops,
                    rel(pc, i32::from(insn_jump(insn))),
                    is_mutable_member,
                );
                pc += 1;
            }
            OpKind::Dlc => {
                debug_assert_eq!(is.version(), XcdrVersion::Xcdr2);
                pc = read_delimited(is, data, allocator, ops, pc);
            }
            OpKind::Plc => {
                debug_assert_eq!(is.version(), XcdrVersion::Xcdr2);
                pc = read_pl(is, data, allocator, ops, pc);
            }
            other => panic!("{:?} outside its context", other),
        }
    }
}
