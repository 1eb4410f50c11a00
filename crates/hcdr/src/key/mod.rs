// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key extraction and keyhash computation.
//!
//! Keys have a canonical wire order per XCDR version: definition order under
//! XCDR1, ascending member id under XCDR2. Extraction from serialized data
//! walks the whole payload once, skipping non-key fields and recording the
//! stream offset of every key leaf, then emits the recorded fields in the
//! output's canonical order. For keys reached through mutable ancestors the
//! recorded offset trail is matched against the key's KOF path, since such
//! members may arrive in any order.
//!
//! The keyhash (RTPS 9.6.3.8) is the big-endian XCDR2 key serialization,
//! zero-padded to 16 bytes when it fits and the type is fixed-key, else its
//! MD5 digest.

use md5::{Digest, Md5};

use crate::alloc::{CdrAllocator, DEFAULT_ALLOCATOR};
use crate::codec::write::{
    emheader_length_code, emheader_member_id, write_bitmask_value, write_enum_arr,
    write_enum_value, write_prim_elems, write_string, LC_ALSO_NEXTINT, LC_NEXTINT,
};
use crate::codec::{load, read, store};
use crate::desc::{CdrDesc, KeyDesc};
use crate::ops::{
    self, find_union_case, insn_jump, jeq4_sub_program, kof_count, op_kind, op_subtype, op_type,
    op_type_base, op_type_external, op_type_size, rel, skip_adr, OpKind, TypeCode,
    MAX_NESTING_DEPTH,
};
use crate::ser::{
    BigEndian, ByteOrder, CdrError, CdrResult, Istream, NativeEndian, Ostream, OstreamBe,
    XcdrVersion,
};

/// The 16-byte RTPS key hash.
pub type Keyhash = [u8; 16];

// ---------------------------------------------------------------------------
// key from sample
// ---------------------------------------------------------------------------

unsafe fn write_key_field<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    ops: &[u32],
    pc: usize,
    key_offsets: &[u32],
) -> CdrResult<()> {
    let insn = ops[pc];
    debug_assert!(ops::insn_key_ok(insn));
    let mut addr = sample.add(ops[pc + 1] as usize);
    if op_type_external(insn) {
        addr = load::<*const u8>(addr, 0);
        assert!(!addr.is_null(), "external key member not materialized");
    }
    match op_type(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => os.put1(allocator, load::<u8>(addr, 0)),
        TypeCode::Byte2 => os.put2::<B>(allocator, load::<u16>(addr, 0)),
        TypeCode::Byte4 => os.put4::<B>(allocator, load::<u32>(addr, 0)),
        TypeCode::Byte8 => os.put8::<B>(allocator, load::<u64>(addr, 0)),
        TypeCode::Enum => {
            write_enum_value::<B>(os, allocator, insn, load::<u32>(addr, 0), ops[pc + 2])
        }
        TypeCode::Bitmask => {
            write_bitmask_value::<B>(os, allocator, insn, addr, ops[pc + 2], ops[pc + 3])
        }
        TypeCode::Str => write_string::<B>(os, allocator, load::<*const u8>(addr, 0)),
        TypeCode::BStr => write_string::<B>(os, allocator, addr),
        TypeCode::Arr => {
            let num = ops[pc + 2];
            match op_subtype(insn) {
                t if t.is_primitive() => {
                    let elem_size = t.primitive_size();
                    let bytes = std::slice::from_raw_parts(addr, (num * elem_size) as usize);
                    write_prim_elems::<B>(os, allocator, bytes, elem_size)
                }
                TypeCode::Enum | TypeCode::Bitmask => {
                    let dheader = os.version() == XcdrVersion::Xcdr2;
                    let body_start = if dheader { os.reserve4(allocator)? } else { 0 };
                    if op_subtype(insn) == TypeCode::Enum {
                        write_enum_arr::<B>(os, allocator, insn, addr, num, ops[pc + 3])?;
                    } else {
                        let elem_size = op_type_size(insn);
                        let bytes = std::slice::from_raw_parts(addr, (num * elem_size) as usize);
                        write_prim_elems::<B>(os, allocator, bytes, elem_size)?;
                    }
                    if dheader {
                        os.patch4::<B>(body_start - 4, os.index() - body_start);
                    }
                    Ok(())
                }
                other => panic!("array of {:?} cannot be a key", other),
            }
        }
        TypeCode::Ext => {
            let (&head, tail) = key_offsets.split_first().expect("key offset path exhausted");
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            write_key_field::<B>(os, allocator, addr, ops, jsr_pc + head as usize, tail)
        }
        other => panic!("{:?} cannot be a key field", other),
    }
}

/// Serialize the key fields of `sample` into `os`, in the canonical key
/// order for the stream's XCDR version.
///
/// # Safety
///
/// `sample` must point at a live native record laid out as `desc.ops`
/// describes.
pub unsafe fn write_key_bo<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
) -> CdrResult<()> {
    for key in desc.keys_in_order(os.version()) {
        let pc = key.ops_offs as usize;
        match op_kind(desc.ops[pc]) {
            OpKind::Kof => {
                let n = kof_count(desc.ops[pc]) as usize;
                debug_assert!(n > 0);
                let target = desc.ops[pc + 1] as usize;
                write_key_field::<B>(
                    os,
                    allocator,
                    sample,
                    &desc.ops,
                    target,
                    &desc.ops[pc + 2..pc + 1 + n],
                )?;
            }
            OpKind::Adr => {
                write_key_field::<B>(os, allocator, sample, &desc.ops, pc, &[])?;
            }
            other => panic!("key descriptor points at {:?}", other),
        }
    }
    Ok(())
}

/// Host-order key serialization.
///
/// # Safety
///
/// See [`write_key_bo`].
pub unsafe fn write_key(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
) -> CdrResult<()> {
    write_key_bo::<NativeEndian>(os, allocator, sample, desc)
}

/// Big-endian key serialization (the keyhash input form).
///
/// # Safety
///
/// See [`write_key_bo`].
pub unsafe fn write_key_be(
    os: &mut OstreamBe,
    allocator: &dyn CdrAllocator,
    sample: *const u8,
    desc: &CdrDesc,
) -> CdrResult<()> {
    write_key_bo::<BigEndian>(&mut os.0, allocator, sample, desc)
}

// ---------------------------------------------------------------------------
// key from key (re-encoding between byte orders / versions)
// ---------------------------------------------------------------------------

/// Advance `is` past one key field without copying it.
fn skip_key_field(is: &mut Istream<'_>, ops: &[u32], pc: usize, key_offsets: &[u32]) {
    let insn = ops[pc];
    match op_type(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => {
            is.get1();
        }
        TypeCode::Byte2 => {
            is.get2();
        }
        TypeCode::Byte4 => {
            is.get4();
        }
        TypeCode::Byte8 => {
            is.get8();
        }
        TypeCode::Enum | TypeCode::Bitmask => {
            let sz = op_type_size(insn);
            is.align(sz);
            is.skip(sz);
        }
        TypeCode::Str | TypeCode::BStr => {
            let len = is.get4();
            is.skip(len);
        }
        TypeCode::Arr => {
            let subtype = op_subtype(insn);
            if ops::is_dheader_needed(subtype, is.version()) {
                let sz = is.get4();
                is.skip(sz);
            } else {
                let elem_size = match subtype {
                    t if t.is_primitive() => t.primitive_size(),
                    TypeCode::Enum | TypeCode::Bitmask => op_type_size(insn),
                    other => panic!("array of {:?} cannot be a key", other),
                };
                is.align(elem_size);
                is.skip(ops[pc + 2] * elem_size);
            }
        }
        TypeCode::Ext => {
            let (&head, tail) = key_offsets.split_first().expect("key offset path exhausted");
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            skip_key_field(is, ops, jsr_pc + head as usize, tail);
        }
        other => panic!("{:?} cannot be a key field", other),
    }
}

/// Copy one key field from a key-only input stream into `os`.
fn copy_key_field<B: ByteOrder>(
    is: &mut Istream<'_>,
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    key_offsets: &[u32],
) -> CdrResult<()> {
    let insn = ops[pc];
    debug_assert!(ops::insn_key_ok(insn));
    match op_type(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => os.put1(allocator, is.get1()),
        TypeCode::Byte2 => os.put2::<B>(allocator, is.get2()),
        TypeCode::Byte4 => os.put4::<B>(allocator, is.get4()),
        TypeCode::Byte8 => os.put8::<B>(allocator, is.get8()),
        TypeCode::Enum | TypeCode::Bitmask => match op_type_size(insn) {
            1 => os.put1(allocator, is.get1()),
            2 => os.put2::<B>(allocator, is.get2()),
            4 => os.put4::<B>(allocator, is.get4()),
            8 => os.put8::<B>(allocator, is.get8()),
            _ => unreachable!(),
        },
        TypeCode::Str | TypeCode::BStr => {
            let sz = is.get4();
            os.put4::<B>(allocator, sz)?;
            os.put_bytes(allocator, is.bytes(sz))
        }
        TypeCode::Arr => {
            let subtype = op_subtype(insn);
            let num = ops[pc + 2];
            let dheader = ops::is_dheader_needed(subtype, os.version());
            let body_start = if dheader { os.reserve4(allocator)? } else { 0 };
            if ops::is_dheader_needed(subtype, is.version()) {
                is.get4();
            }
            let elem_size = match subtype {
                t if t.is_primitive() => t.primitive_size(),
                TypeCode::Enum | TypeCode::Bitmask => op_type_size(insn),
                other => panic!("array of {:?} cannot be a key", other),
            };
            let bytes = is.elems(num, elem_size);
            write_prim_elems::<B>(os, allocator, bytes, elem_size)?;
            if dheader {
                os.patch4::<B>(body_start - 4, os.index() - body_start);
            }
            Ok(())
        }
        TypeCode::Ext => {
            let (&head, tail) = key_offsets.split_first().expect("key offset path exhausted");
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            copy_key_field::<B>(is, os, allocator, ops, jsr_pc + head as usize, tail)
        }
        other => panic!("{:?} cannot be a key field", other),
    }
}

fn with_key_field<R>(
    desc: &CdrDesc,
    key: &KeyDesc,
    f: impl FnOnce(usize, &[u32]) -> R,
) -> R {
    let pc = key.ops_offs as usize;
    match op_kind(desc.ops[pc]) {
        OpKind::Kof => {
            let n = kof_count(desc.ops[pc]) as usize;
            debug_assert!(n > 0);
            f(desc.ops[pc + 1] as usize, &desc.ops[pc + 2..pc + 1 + n])
        }
        OpKind::Adr => f(pc, &[]),
        other => panic!("key descriptor points at {:?}", other),
    }
}

/// Re-encode a key-only CDR stream into `os`, honoring both streams'
/// canonical key orders (they differ between XCDR versions).
pub fn extract_key_from_key_bo<B: ByteOrder>(
    is: &mut Istream<'_>,
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) -> CdrResult<()> {
    let in_order = desc.keys_in_order(is.version());
    let mut src_offs = vec![0u32; desc.keys.len()];
    // pass 1: locate every key in the input's order
    for &key in &in_order {
        let slot = desc.keys.iter().position(|k| std::ptr::eq(k, key)).unwrap();
        src_offs[slot] = is.index();
        with_key_field(desc, key, |pc, trail| skip_key_field(is, &desc.ops, pc, trail));
    }
    // pass 2: emit in the output's order
    for key in desc.keys_in_order(os.version()) {
        let slot = desc.keys.iter().position(|k| std::ptr::eq(k, key)).unwrap();
        is.set_index(src_offs[slot]);
        with_key_field(desc, key, |pc, trail| {
            copy_key_field::<B>(is, os, allocator, &desc.ops, pc, trail)
        })?;
    }
    Ok(())
}

/// Native-order re-encoding.
pub fn extract_key_from_key(
    is: &mut Istream<'_>,
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) -> CdrResult<()> {
    extract_key_from_key_bo::<NativeEndian>(is, os, allocator, desc)
}

/// Big-endian re-encoding (keyhash input).
pub fn extract_key_be_from_key(
    is: &mut Istream<'_>,
    os: &mut OstreamBe,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) -> CdrResult<()> {
    extract_key_from_key_bo::<BigEndian>(is, &mut os.0, allocator, desc)
}

// ---------------------------------------------------------------------------
// key from data
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct KeyOff {
    src_off: u32,
    op_pc: usize,
}

struct Extract<'a> {
    keys: &'a [KeyDesc],
    keys_remaining: usize,
    key_offs: Vec<Option<KeyOff>>,
    ops_offs: [u32; MAX_NESTING_DEPTH],
    out_version: XcdrVersion,
}

/// Skip `num` values of `subtype` in the input stream. `sub_pc` points at
/// the sub-program for composite subtypes; for bitmask union cases the
/// element width lives on the sub-program's first instruction.
fn extract_skip_subtype(
    is: &mut Istream<'_>,
    cx: &mut Extract<'_>,
    num: u32,
    insn: u32,
    subtype: TypeCode,
    ops: &[u32],
    sub_pc: usize,
) {
    match subtype {
        t @ (TypeCode::Boolean
        | TypeCode::Byte1
        | TypeCode::Byte2
        | TypeCode::Byte4
        | TypeCode::Byte8) => {
            let elem_size = t.primitive_size();
            is.align(elem_size);
            is.skip(num * elem_size);
        }
        TypeCode::Enum | TypeCode::Bitmask => {
            let elem_size =
                if op_kind(insn) == OpKind::Jeq4 && subtype == TypeCode::Bitmask {
                    op_type_size(ops[sub_pc])
                } else {
                    op_type_size(insn)
                };
            is.align(elem_size);
            is.skip(num * elem_size);
        }
        TypeCode::Str | TypeCode::BStr => {
            for _ in 0..num {
                let len = is.get4();
                is.skip(len);
            }
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            for _ in 0..num {
                extract1(is, false, cx, ops, sub_pc, 0, sub_pc, false, false);
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed here"),
    }
}

fn extract_skip_array(is: &mut Istream<'_>, cx: &mut Extract<'_>, ops: &[u32], pc: usize) -> usize {
    let insn = ops[pc];
    let subtype = op_subtype(insn);
    let num = ops[pc + 2];
    if ops::is_dheader_needed(subtype, is.version()) {
        let sz = is.get4();
        is.skip(sz);
    } else if subtype.has_subtype_or_members() {
        let sub_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3])));
        extract_skip_subtype(is, cx, num, insn, subtype, ops, sub_pc);
    } else {
        extract_skip_subtype(is, cx, num, insn, subtype, ops, 0);
    }
    ops::skip_array_ops(insn, ops, pc)
}

fn extract_skip_sequence(
    is: &mut Istream<'_>,
    cx: &mut Extract<'_>,
    ops: &[u32],
    pc: usize,
) -> usize {
    let insn = ops[pc];
    let subtype = op_subtype(insn);
    let bound_op = usize::from(ops::seq_is_bounded(op_type(insn)));
    if ops::is_dheader_needed(subtype, is.version()) {
        let sz = is.get4();
        is.skip(sz);
    } else {
        let num = is.get4();
        if num > 0 {
            if subtype.has_subtype_or_members() {
                let sub_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3 + bound_op])));
                extract_skip_subtype(is, cx, num, insn, subtype, ops, sub_pc);
            } else {
                extract_skip_subtype(is, cx, num, insn, subtype, ops, 0);
            }
        }
    }
    ops::skip_sequence_ops(insn, ops, pc)
}

fn extract_skip_union(is: &mut Istream<'_>, cx: &mut Extract<'_>, ops: &[u32], pc: usize) -> usize {
    let insn = ops[pc];
    let disc = read::read_union_discriminant(is, insn);
    if let Some(jeq_pc) = find_union_case(ops, pc, disc) {
        let jeq_insn = ops[jeq_pc];
        let sub_pc = if op_type(jeq_insn).has_subtype_or_members()
            || op_type(jeq_insn) == TypeCode::Bitmask
        {
            jeq4_sub_program(ops, jeq_pc)
        } else {
            0
        };
        extract_skip_subtype(is, cx, 1, jeq_insn, op_type(jeq_insn), ops, sub_pc);
    }
    skip_adr(insn, ops, pc)
}

fn extract_skip_adr(
    is: &mut Istream<'_>,
    cx: &mut Extract<'_>,
    ops: &[u32],
    pc: usize,
) -> usize {
    let insn = ops[pc];
    match op_type(insn) {
        TypeCode::Seq | TypeCode::BSeq => extract_skip_sequence(is, cx, ops, pc),
        TypeCode::Arr => extract_skip_array(is, cx, ops, pc),
        TypeCode::Uni => extract_skip_union(is, cx, ops, pc),
        t => {
            match t {
                TypeCode::Str | TypeCode::BStr => {
                    let len = is.get4();
                    is.skip(len);
                }
                TypeCode::Enum | TypeCode::Bitmask => {
                    let sz = op_type_size(insn);
                    is.align(sz);
                    is.skip(sz);
                }
                t if t.is_primitive() => {
                    let sz = t.primitive_size();
                    is.align(sz);
                    is.skip(sz);
                }
                other => panic!("cannot skip {:?} here", other),
            }
            skip_adr(insn, ops, pc)
        }
    }
}

/// Record a key leaf's stream offset into its output slot.
fn record_key(cx: &mut Extract<'_>, is: &Istream<'_>, ops: &[u32], pc: usize, idx_depth: usize,
    op0_type: usize, mutable_ancestor: bool) {
    let n_keys = cx.keys.len();
    let arrival = n_keys - cx.keys_remaining;
    let slot = if cx.out_version == XcdrVersion::Xcdr1 {
        Some(arrival)
    } else {
        cx.ops_offs[idx_depth] = (pc - op0_type) as u32;
        let trail = &cx.ops_offs[..=idx_depth];
        cx.keys.iter().position(|k| {
            if !mutable_ancestor {
                k.order_idx as usize == arrival
            } else {
                let kof_pc = k.ops_offs as usize;
                op_kind(ops[kof_pc]) == OpKind::Kof && {
                    let n = kof_count(ops[kof_pc]) as usize;
                    n == trail.len() && ops[kof_pc + 1..kof_pc + 1 + n] == *trail
                }
            }
        })
    };
    if let Some(slot) = slot {
        debug_assert!(cx.key_offs[slot].is_none());
        cx.key_offs[slot] = Some(KeyOff { src_off: is.index(), op_pc: pc });
        debug_assert!(cx.keys_remaining > 0);
        cx.keys_remaining -= 1;
    }
}

#[allow(clippy::too_many_arguments)]
fn extract_adr(
    insn: u32,
    is: &mut Istream<'_>,
    collect: bool,
    cx: &mut Extract<'_>,
    ops: &[u32],
    pc: usize,
    idx_depth: usize,
    op0_type: usize,
    mutable_member: bool,
    mutable_ancestor: bool,
) -> usize {
    let is_key = collect && insn & ops::FLAG_KEY != 0;
    if ops::op_type_optional(insn) && !mutable_member && is.get1() == 0 {
        debug_assert!(!is_key);
        return skip_adr(insn, ops, pc);
    }
    if op_type(insn) == TypeCode::Ext {
        let jsr_pc = {
            let mut p = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            if op_type_base(insn) && op_kind(ops[p]) == OpKind::Dlc {
                p += 1;
            }
            p
        };
        if idx_depth < MAX_NESTING_DEPTH {
            cx.ops_offs[idx_depth] = (pc - op0_type) as u32;
        }
        // only keep collecting below an EXT that is itself key-flagged
        extract1(is, is_key, cx, ops, jsr_pc, idx_depth + 1, jsr_pc, false, mutable_ancestor);
        skip_adr(insn, ops, pc)
    } else {
        if is_key {
            record_key(cx, is, ops, pc, idx_depth, op0_type, mutable_ancestor);
        }
        extract_skip_adr(is, cx, ops, pc)
    }
}

#[allow(clippy::too_many_arguments)]
fn extract_delimited(
    is: &mut Istream<'_>,
    collect: bool,
    cx: &mut Extract<'_>,
    ops: &[u32],
    pc0: usize,
    idx_depth: usize,
    op0_type: usize,
    mutable_ancestor: bool,
) -> usize {
    let delimited_sz = is.get4();
    let delimited_offs = is.index();
    let mut pc = pc0 + 1;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => break,
            OpKind::Adr => {
                pc = if is.index() - delimited_offs < delimited_sz {
                    extract_adr(insn, is, collect, cx, ops, pc, idx_depth, op0_type, false, mutable_ancestor)
                } else {
                    skip_adr(insn, ops, pc)
                };
            }
            OpKind::Jsr => {
                extract1(
                    is,
                    collect,
                    cx,
                    ops,
                    rel(pc, i32::from(insn_jump(insn))),
                    idx_depth,
                    op0_type,
                    false,
                    mutable_ancestor,
                );
                pc += 1;
            }
            other => panic!("{:?} inside a delimited body", other),
        }
    }
    let consumed = is.index() - delimited_offs;
    if delimited_sz > consumed {
        is.skip(delimited_sz - consumed);
    }
    pc
}

#[allow(clippy::too_many_arguments)]
fn extract_pl_member(
    is: &mut Istream<'_>,
    collect: bool,
    cx: &mut Extract<'_>,
    m_id: u32,
    ops: &[u32],
    pc0: usize,
    idx_depth: usize,
    op0_type: usize,
) -> bool {
    if !collect {
        // members of a non-key subtree are skipped by their declared length
        return false;
    }
    let mut pc = pc0;
    while cx.keys_remaining > 0 {
        let insn = ops[pc];
        if op_kind(insn) == OpKind::Rts {
            return false;
        }
        debug_assert_eq!(op_kind(insn), OpKind::Plm);
        let mut plm_pc = rel(pc, i32::from(insn_jump(insn)));
        if ops::plm_flags(insn) & ops::FLAG_BASE != 0 {
            debug_assert_eq!(op_kind(ops[plm_pc]), OpKind::Plc);
            plm_pc += 1;
            if extract_pl_member(is, collect, cx, m_id, ops, plm_pc, idx_depth, op0_type) {
                return true;
            }
        } else if ops[pc + 1] == m_id {
            extract1(is, collect, cx, ops, plm_pc, idx_depth, op0_type, true, true);
            return true;
        }
        pc += 2;
    }
    false
}

#[allow(clippy::too_many_arguments)]
fn extract_pl(
    is: &mut Istream<'_>,
    collect: bool,
    cx: &mut Extract<'_>,
    ops: &[u32],
    pc0: usize,
    idx_depth: usize,
    op0_type: usize,
) -> usize {
    let pc = pc0 + 1;
    let pl_sz = is.get4();
    let pl_offs = is.index();
    while is.index() - pl_offs < pl_sz {
        let em_hdr = is.get4();
        let lc = emheader_length_code(em_hdr);
        let m_id = emheader_member_id(em_hdr);
        let msz = match lc {
            0..=3 => 1u32 << lc,
            LC_NEXTINT => is.get4(),
            _ => is.peek4() << if lc > 5 { lc - 4 } else { 0 },
        };
        if !extract_pl_member(is, collect, cx, m_id, ops, pc, idx_depth, op0_type) {
            is.skip(msz);
            if lc >= LC_ALSO_NEXTINT {
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

#[allow(clippy::too_many_arguments)]
fn extract1(
    is: &mut Istream<'_>,
    collect: bool,
    cx: &mut Extract<'_>,
    ops: &[u32],
    pc0: usize,
    idx_depth: usize,
    op0_type: usize,
    mutable_member: bool,
    mutable_ancestor: bool,
) -> usize {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return pc,
            OpKind::Adr => {
                pc = extract_adr(
                    insn, is, collect, cx, ops, pc, idx_depth, op0_type, mutable_member,
                    mutable_ancestor,
                );
            }
            OpKind::Jsr => {
                extract1(
                    is,
                    collect,
                    cx,
                    ops,
                    rel(pc, i32::from(insn_jump(insn))),
                    idx_depth,
                    op0_type,
                    mutable_member,
                    mutable_ancestor,
                );
                pc += 1;
            }
            OpKind::Dlc => {
                pc = extract_delimited(is, collect, cx, ops, pc, idx_depth, op0_type, mutable_ancestor);
            }
            OpKind::Plc => {
                pc = extract_pl(is, collect, cx, ops, pc, idx_depth, op0_type);
            }
            other => panic!("{:?} outside its context", other),
        }
    }
}

/// Extract the key from a full serialized sample into `os`, emitting the
/// fields in the output's canonical key order.
pub fn extract_key_from_data_bo<B: ByteOrder>(
    is: &mut Istream<'_>,
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) -> CdrResult<()> {
    if desc.keys.is_empty() {
        return Ok(());
    }
    let mut cx = Extract {
        keys: &desc.keys,
        keys_remaining: desc.keys.len(),
        key_offs: vec![None; desc.keys.len()],
        ops_offs: [0; MAX_NESTING_DEPTH],
        out_version: os.version(),
    };
    extract1(is, true, &mut cx, &desc.ops, 0, 0, 0, false, false);
    if cx.keys_remaining > 0 {
        return Err(CdrError::MissingKey);
    }
    for off in cx.key_offs.iter().flatten() {
        is.set_index(off.src_off);
        copy_key_field::<B>(is, os, allocator, &desc.ops, off.op_pc, &[])?;
    }
    Ok(())
}

/// Native-order key extraction from serialized data.
pub fn extract_key_from_data(
    is: &mut Istream<'_>,
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) -> CdrResult<()> {
    extract_key_from_data_bo::<NativeEndian>(is, os, allocator, desc)
}

/// Big-endian key extraction from serialized data.
pub fn extract_key_be_from_data(
    is: &mut Istream<'_>,
    os: &mut OstreamBe,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) -> CdrResult<()> {
    extract_key_from_data_bo::<BigEndian>(is, &mut os.0, allocator, desc)
}

// ---------------------------------------------------------------------------
// key into a native record
// ---------------------------------------------------------------------------

unsafe fn read_key_field(
    is: &mut Istream<'_>,
    sample: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    key_offsets: &[u32],
) {
    let insn = ops[pc];
    debug_assert!(ops::insn_key_ok(insn));
    let mut addr = sample.add(ops[pc + 1] as usize);
    if op_type_external(insn) {
        read::alloc_external(ops, pc, insn, &mut addr, allocator);
    }
    match op_type(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => store(addr, 0, is.get1()),
        TypeCode::Byte2 => store(addr, 0, is.get2()),
        TypeCode::Byte4 => store(addr, 0, is.get4()),
        TypeCode::Byte8 => store(addr, 0, is.get8()),
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
        TypeCode::Str => {
            let old = load::<*mut u8>(addr, 0);
            store(addr, 0, read::reuse_string(is, old, allocator));
        }
        TypeCode::BStr => read::reuse_string_bound(is, addr, ops[pc + 2]),
        TypeCode::Arr => {
            let subtype = op_subtype(insn);
            let num = ops[pc + 2];
            if ops::is_dheader_needed(subtype, is.version()) {
                is.get4();
            }
            match subtype {
                t if t.is_primitive() => {
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
                other => panic!("array of {:?} cannot be a key", other),
            }
        }
        TypeCode::Ext => {
            let (&head, tail) = key_offsets.split_first().expect("key offset path exhausted");
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            read_key_field(is, addr, allocator, ops, jsr_pc + head as usize, tail);
        }
        other => panic!("{:?} cannot be a key field", other),
    }
}

/// Populate the key fields of `sample` from a key-only CDR stream.
///
/// # Safety
///
/// As for [`crate::codec::read_sample`].
pub unsafe fn read_key(
    is: &mut Istream<'_>,
    sample: *mut u8,
    allocator: &dyn CdrAllocator,
    desc: &CdrDesc,
) {
    for key in desc.keys_in_order(is.version()) {
        with_key_field(desc, key, |pc, trail| {
            read_key_field(is, sample, allocator, &desc.ops, pc, trail);
        });
    }
}

// ---------------------------------------------------------------------------
// keyhash
// ---------------------------------------------------------------------------

/// Compute the RTPS keyhash from a native-order XCDR2 key serialization.
///
/// When the big-endian form fits 16 bytes and the type is fixed-key for
/// XCDR2 (and `force_md5` is not set), the hash is the zero-padded key
/// itself; otherwise it is the MD5 of the exact key bytes. Keyless types
/// hash to all zeros.
pub fn keyhash_from_key(desc: &CdrDesc, key_native_xcdr2: &[u8], force_md5: bool) -> Keyhash {
    let mut hash = [0u8; 16];
    if desc.keys.is_empty() {
        return hash;
    }
    let mut is = Istream::new(key_native_xcdr2, XcdrVersion::Xcdr2);
    let mut os = OstreamBe::new(XcdrVersion::Xcdr2);
    extract_key_be_from_key(&mut is, &mut os, &DEFAULT_ALLOCATOR, desc)
        .expect("re-encoding a validated key cannot fail");
    let bytes = os.0.as_slice();
    if !force_md5 && bytes.len() <= 16 && desc.fixed_key(XcdrVersion::Xcdr2) {
        hash[..bytes.len()].copy_from_slice(bytes);
    } else {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        hash.copy_from_slice(&hasher.finalize());
    }
    os.into_inner().fini(&DEFAULT_ALLOCATOR);
    hash
}
