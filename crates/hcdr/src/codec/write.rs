// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serializer: walks the operation program and emits the wire image of a
//! native record into an output stream.
//!
//! All multi-byte stores go through the `B: ByteOrder` selector, so the
//! same code monomorphizes into the native, LE and BE writers. The only
//! data-dependent failures are bounded-sequence overflow and enum/bitmask
//! domain violations; everything else is either success or a malformed
//! program (panic).

use crate::alloc::CdrAllocator;
use crate::codec::{cstr_len, load, CdrSeq};
use crate::ops::{
    self, find_union_case, insn_jump, jeq4_native_size, jeq4_sub_program, op_kind, op_subtype,
    op_type, op_type_base, op_type_external, op_type_optional, op_type_size, rel, skip_adr,
    OpKind, TypeCode, FLAG_KEY, FLAG_MU,
};
use crate::ser::{swap_insitu, ByteOrder, CdrError, CdrResult, Ostream, XcdrVersion};

// EMHEADER field packing (XTypes table 7.46).
pub(crate) const EMHEADER_FLAG_MUST_UNDERSTAND: u32 = 1 << 31;
pub(crate) const EMHEADER_MEMBERID_MASK: u32 = 0x0fff_ffff;

#[inline]
pub(crate) fn emheader_length_code(hdr: u32) -> u32 {
    (hdr >> 28) & 0x7
}

#[inline]
pub(crate) fn emheader_member_id(hdr: u32) -> u32 {
    hdr & EMHEADER_MEMBERID_MASK
}

// Length codes: 0..3 select an implicit 1/2/4/8-byte member length, 4 a
// NEXTINT word, 5..7 alias the member's own leading 4 bytes (shifted left
// by code-4) as its length.
pub(crate) const LC_1B: u32 = 0;
pub(crate) const LC_2B: u32 = 1;
pub(crate) const LC_4B: u32 = 2;
pub(crate) const LC_8B: u32 = 3;
pub(crate) const LC_NEXTINT: u32 = 4;
pub(crate) const LC_ALSO_NEXTINT: u32 = 5;
pub(crate) const LC_ALSO_NEXTINT4: u32 = 6;
pub(crate) const LC_ALSO_NEXTINT8: u32 = 7;

#[inline]
fn bitmask_value_valid(val: u64, bits_h: u32, bits_l: u32) -> bool {
    ((val >> 32) & !u64::from(bits_h)) == 0 && (val & 0xffff_ffff & !u64::from(bits_l)) == 0
}

pub(crate) fn write_string<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    ptr: *const u8,
) -> CdrResult<()> {
    if ptr.is_null() {
        os.put4::<B>(allocator, 1)?;
        os.put1(allocator, 0)
    } else {
        let len = unsafe { cstr_len(ptr) } + 1;
        os.put4::<B>(allocator, len)?;
        os.put_bytes(allocator, unsafe { std::slice::from_raw_parts(ptr, len as usize) })
    }
}

fn write_bool_value(os: &mut Ostream, allocator: &dyn CdrAllocator, v: u8) -> CdrResult<()> {
    if v > 1 {
        return Err(CdrError::InvalidBool { offset: os.index() });
    }
    os.put1(allocator, v)
}

pub(crate) fn write_enum_value<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    insn: u32,
    v: u32,
    max: u32,
) -> CdrResult<()> {
    if v > max {
        return Err(CdrError::InvalidEnumValue { value: v, max });
    }
    match op_type_size(insn) {
        1 => os.put1(allocator, v as u8),
        2 => os.put2::<B>(allocator, v as u16),
        4 => os.put4::<B>(allocator, v),
        sz => panic!("enum wire width {} is not supported", sz),
    }
}

/// Read a native bitmask of the instruction's width, validate, emit.
pub(crate) unsafe fn write_bitmask_value<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    insn: u32,
    addr: *const u8,
    bits_h: u32,
    bits_l: u32,
) -> CdrResult<()> {
    match op_type_size(insn) {
        1 => {
            let v = load::<u8>(addr, 0);
            if !bitmask_value_valid(u64::from(v), bits_h, bits_l) {
                return Err(CdrError::InvalidBitmaskValue { value: u64::from(v) });
            }
            os.put1(allocator, v)
        }
        2 => {
            let v = load::<u16>(addr, 0);
            if !bitmask_value_valid(u64::from(v), bits_h, bits_l) {
                return Err(CdrError::InvalidBitmaskValue { value: u64::from(v) });
            }
            os.put2::<B>(allocator, v)
        }
        4 => {
            let v = load::<u32>(addr, 0);
            if !bitmask_value_valid(u64::from(v), bits_h, bits_l) {
                return Err(CdrError::InvalidBitmaskValue { value: u64::from(v) });
            }
            os.put4::<B>(allocator, v)
        }
        8 => {
            let v = load::<u64>(addr, 0);
            if !bitmask_value_valid(v, bits_h, bits_l) {
                return Err(CdrError::InvalidBitmaskValue { value: v });
            }
            os.put8::<B>(allocator, v)
        }
        sz => panic!("bitmask wire width {} is not supported", sz),
    }
}

unsafe fn write_bool_arr(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    addr: *const u8,
    num: u32,
) -> CdrResult<()> {
    let vals = std::slice::from_raw_parts(addr, num as usize);
    if vals.iter().any(|&v| v > 1) {
        return Err(CdrError::InvalidBool { offset: os.index() });
    }
    os.put_bytes(allocator, vals)
}

pub(crate) unsafe fn write_enum_arr<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    insn: u32,
    addr: *const u8,
    num: u32,
    max: u32,
) -> CdrResult<()> {
    for i in 0..num {
        let v = load::<u32>(addr, i * 4);
        write_enum_value::<B>(os, allocator, insn, v, max)?;
    }
    Ok(())
}

pub(crate) unsafe fn write_bitmask_arr<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    insn: u32,
    addr: *const u8,
    num: u32,
    bits_h: u32,
    bits_l: u32,
) -> CdrResult<()> {
    let sz = op_type_size(insn);
    for i in 0..num {
        write_bitmask_value::<B>(os, allocator, insn, addr.add((i * sz) as usize), bits_h, bits_l)?;
    }
    Ok(())
}

/// Aligned bulk copy of primitive elements with in-place swapping.
pub(crate) fn write_prim_elems<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    bytes: &[u8],
    elem_size: u32,
) -> CdrResult<()> {
    let offs = os.put_elems(allocator, bytes, elem_size)?;
    if B::SWAP && elem_size > 1 {
        swap_insitu(&mut os.as_mut_slice()[offs as usize..], elem_size);
    }
    Ok(())
}

unsafe fn write_seq<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    addr: *const u8,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> CdrResult<()> {
    let seq: &CdrSeq = &*addr.cast::<CdrSeq>();
    let subtype = op_subtype(insn);
    let bound_op = usize::from(ops::seq_is_bounded(op_type(insn)));
    let bound = if bound_op == 1 { ops[pc + 2] } else { 0 };

    let dheader = ops::is_dheader_needed(subtype, os.version());
    let body_start = if dheader { os.reserve4(allocator)? } else { 0 };

    let num = seq.length;
    if bound != 0 && num > bound {
        return Err(CdrError::BoundExceeded { bound, actual: num });
    }
    os.put4::<B>(allocator, num)?;

    if num > 0 {
        match subtype {
            TypeCode::Boolean => write_bool_arr(os, allocator, seq.buffer, num)?,
            t @ (TypeCode::Byte1 | TypeCode::Byte2 | TypeCode::Byte4 | TypeCode::Byte8) => {
                let elem_size = t.primitive_size();
                let bytes = std::slice::from_raw_parts(seq.buffer, (num * elem_size) as usize);
                write_prim_elems::<B>(os, allocator, bytes, elem_size)?;
            }
            TypeCode::Enum => {
                write_enum_arr::<B>(os, allocator, insn, seq.buffer, num, ops[pc + 2 + bound_op])?;
            }
            TypeCode::Bitmask => {
                write_bitmask_arr::<B>(
                    os,
                    allocator,
                    insn,
                    seq.buffer,
                    num,
                    ops[pc + 2 + bound_op],
                    ops[pc + 3 + bound_op],
                )?;
            }
            TypeCode::Str => {
                for i in 0..num {
                    let p = load::<*const u8>(seq.buffer, i * std::mem::size_of::<*const u8>() as u32);
                    write_string::<B>(os, allocator, p)?;
                }
            }
            TypeCode::BStr => {
                let elem_size = ops[pc + 2 + bound_op];
                for i in 0..num {
                    write_string::<B>(os, allocator, seq.buffer.add((i * elem_size) as usize))?;
                }
            }
            TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
                let elem_size = ops[pc + 2 + bound_op];
                let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3 + bound_op])));
                for i in 0..num {
                    write_impl::<B>(
                        os,
                        allocator,
                        seq.buffer.add((i * elem_size) as usize),
                        ops,
                        jsr_pc,
                        false,
                    )?;
                }
            }
            TypeCode::Ext => panic!("EXT is not allowed as a sequence element"),
        }
    }

    if dheader {
        os.patch4::<B>(body_start - 4, os.index() - body_start);
    }
    Ok(())
}

unsafe fn write_arr<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    addr: *const u8,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> CdrResult<()> {
    let subtype = op_subtype(insn);
    let num = ops[pc + 2];

    let dheader = ops::is_dheader_needed(subtype, os.version());
    let body_start = if dheader { os.reserve4(allocator)? } else { 0 };

    match subtype {
        TypeCode::Boolean => write_bool_arr(os, allocator, addr, num)?,
        t @ (TypeCode::Byte1 | TypeCode::Byte2 | TypeCode::Byte4 | TypeCode::Byte8) => {
            let elem_size = t.primitive_size();
            let bytes = std::slice::from_raw_parts(addr, (num * elem_size) as usize);
            write_prim_elems::<B>(os, allocator, bytes, elem_size)?;
        }
        TypeCode::Enum => write_enum_arr::<B>(os, allocator, insn, addr, num, ops[pc + 3])?,
        TypeCode::Bitmask => {
            write_bitmask_arr::<B>(os, allocator, insn, addr, num, ops[pc + 3], ops[pc + 4])?;
        }
        TypeCode::Str => {
            for i in 0..num {
                let p = load::<*const u8>(addr, i * std::mem::size_of::<*const u8>() as u32);
                write_string::<B>(os, allocator, p)?;
            }
        }
        TypeCode::BStr => {
            let elem_size = ops[pc + 4];
            for i in 0..num {
                write_string::<B>(os, allocator, addr.add((i * elem_size) as usize))?;
            }
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let elem_size = ops[pc + 4];
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3])));
            for i in 0..num {
                write_impl::<B>(os, allocator, addr.add((i * elem_size) as usize), ops, jsr_pc, false)?;
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as an array element"),
    }

    if dheader {
        os.patch4::<B>(body_start - 4, os.index() - body_start);
    }
    Ok(())
}

unsafe fn write_uni<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    disc_addr: *const u8,
    data: *const u8,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> CdrResult<()> {
    let disc: u32 = match op_subtype(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => u32::from(load::<u8>(disc_addr, 0)),
        TypeCode::Byte2 => u32::from(load::<u16>(disc_addr, 0)),
        TypeCode::Byte4 | TypeCode::Enum => load::<u32>(disc_addr, 0),
        other => panic!("{:?} cannot discriminate a union", other),
    };
    match op_subtype(insn) {
        TypeCode::Boolean => write_bool_value(os, allocator, disc as u8)?,
        TypeCode::Byte1 => os.put1(allocator, disc as u8)?,
        TypeCode::Byte2 => os.put2::<B>(allocator, disc as u16)?,
        TypeCode::Byte4 => os.put4::<B>(allocator, disc)?,
        TypeCode::Enum => write_enum_value::<B>(os, allocator, insn, disc, ops[pc + 4])?,
        _ => unreachable!(),
    }

    let Some(jeq_pc) = find_union_case(ops, pc, disc) else {
        return Ok(());
    };
    let jeq_insn = ops[jeq_pc];
    let mut valaddr: *const u8 = data.add(ops[jeq_pc + 2] as usize);
    if op_type_external(jeq_insn) {
        valaddr = load::<*const u8>(valaddr, 0);
        assert!(!valaddr.is_null(), "external union case selected but not materialized");
    }

    match op_type(jeq_insn) {
        TypeCode::Boolean => write_bool_value(os, allocator, load::<u8>(valaddr, 0)),
        TypeCode::Byte1 => os.put1(allocator, load::<u8>(valaddr, 0)),
        TypeCode::Byte2 => os.put2::<B>(allocator, load::<u16>(valaddr, 0)),
        TypeCode::Byte4 => os.put4::<B>(allocator, load::<u32>(valaddr, 0)),
        TypeCode::Byte8 => os.put8::<B>(allocator, load::<u64>(valaddr, 0)),
        TypeCode::Enum => {
            write_enum_value::<B>(os, allocator, jeq_insn, load::<u32>(valaddr, 0), ops[jeq_pc + 3])
        }
        TypeCode::Str => write_string::<B>(os, allocator, load::<*const u8>(valaddr, 0)),
        TypeCode::BStr => write_string::<B>(os, allocator, valaddr),
        TypeCode::Seq
        | TypeCode::BSeq
        | TypeCode::Arr
        | TypeCode::Uni
        | TypeCode::Stu
        | TypeCode::Bitmask => {
            write_impl::<B>(os, allocator, valaddr, ops, jeq4_sub_program(ops, jeq_pc), false)
                .map(|_| ())
        }
        TypeCode::Ext => panic!("EXT is not allowed as a union case type"),
    }
}

unsafe fn write_adr<B: ByteOrder>(
    insn: u32,
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    data: *const u8,
    ops: &[u32],
    pc: usize,
    is_mutable_member: bool,
) -> CdrResult<usize> {
    let mut addr: *const u8 = data.add(ops[pc + 1] as usize);
    if op_type_external(insn) || op_type_optional(insn) || op_type(insn) == TypeCode::Str {
        addr = load::<*const u8>(addr, 0);
    }
    if op_type_optional(insn) {
        if !is_mutable_member {
            os.put1(allocator, u8::from(!addr.is_null()))?;
        }
        if addr.is_null() {
            return Ok(skip_adr(insn, ops, pc));
        }
    }
    debug_assert!(!addr.is_null() || op_type(insn) == TypeCode::Str);

    match op_type(insn) {
        TypeCode::Boolean => write_bool_value(os, allocator, load::<u8>(addr, 0))?,
        TypeCode::Byte1 => os.put1(allocator, load::<u8>(addr, 0))?,
        TypeCode::Byte2 => os.put2::<B>(allocator, load::<u16>(addr, 0))?,
        TypeCode::Byte4 => os.put4::<B>(allocator, load::<u32>(addr, 0))?,
        TypeCode::Byte8 => os.put8::<B>(allocator, load::<u64>(addr, 0))?,
        TypeCode::Enum => {
            write_enum_value::<B>(os, allocator, insn, load::<u32>(addr, 0), ops[pc + 2])?;
        }
        TypeCode::Bitmask => {
            write_bitmask_value::<B>(os, allocator, insn, addr, ops[pc + 2], ops[pc + 3])?;
        }
        TypeCode::Str => write_string::<B>(os, allocator, addr)?,
        TypeCode::BStr => write_string::<B>(os, allocator, addr)?,
        TypeCode::Seq | TypeCode::BSeq => write_seq::<B>(os, allocator, addr, ops, pc, insn)?,
        TypeCode::Arr => write_arr::<B>(os, allocator, addr, ops, pc, insn)?,
        TypeCode::Uni => write_uni::<B>(os, allocator, addr, data, ops, pc, insn)?,
        TypeCode::Ext => {
            let mut jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            // base-type members append without their own delimiter
            if op_type_base(insn) && op_kind(ops[jsr_pc]) == OpKind::Dlc {
                jsr_pc += 1;
            }
            write_impl::<B>(os, allocator, addr, ops, jsr_pc, false)?;
        }
        TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
    }
    Ok(skip_adr(insn, ops, pc))
}

unsafe fn write_delimited<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    data: *const u8,
    ops: &[u32],
    pc: usize,
) -> CdrResult<usize> {
    let body_start = os.reserve4(allocator)?;
    let end = write_impl::<B>(os, allocator, data, ops, pc + 1, false)?;
    os.patch4::<B>(body_start - 4, os.index() - body_start);
    Ok(end)
}

/// Length code for the member whose program starts at `pc`.
fn length_code(ops: &[u32], pc: usize) -> u32 {
    let insn = ops[pc];
    match op_kind(insn) {
        OpKind::Adr => match op_type(insn) {
            TypeCode::Boolean | TypeCode::Byte1 => LC_1B,
            TypeCode::Byte2 => LC_2B,
            TypeCode::Byte4 => LC_4B,
            TypeCode::Byte8 => LC_8B,
            TypeCode::Enum | TypeCode::Bitmask => match op_type_size(insn) {
                1 => LC_1B,
                2 => LC_2B,
                4 => LC_4B,
                8 => LC_8B,
                _ => unreachable!(),
            },
            // nextint overlaps the length the serialized string itself starts with
            TypeCode::Str | TypeCode::BStr => LC_ALSO_NEXTINT,
            TypeCode::Seq | TypeCode::BSeq => match op_subtype(insn) {
                TypeCode::Boolean | TypeCode::Byte1 => LC_ALSO_NEXTINT,
                TypeCode::Byte2 => LC_NEXTINT,
                TypeCode::Byte4 => LC_ALSO_NEXTINT4,
                TypeCode::Byte8 => LC_ALSO_NEXTINT8,
                // non-primitive elements start with a dheader, which doubles
                // as the member length
                _ => LC_ALSO_NEXTINT,
            },
            TypeCode::Arr => {
                if op_subtype(insn).is_primitive() {
                    LC_NEXTINT
                } else {
                    LC_ALSO_NEXTINT
                }
            }
            TypeCode::Uni | TypeCode::Ext => LC_NEXTINT,
            TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
        },
        OpKind::Jsr => length_code(ops, rel(pc, i32::from(insn_jump(ops[pc])))),
        other => panic!("no length code for {:?}", other),
    }
}

unsafe fn is_member_present(data: *const u8, ops: &[u32], pc: usize) -> bool {
    let mut pc = pc;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Adr => {
                if op_type_optional(insn) {
                    return !load::<*const u8>(data, ops[pc + 1]).is_null();
                }
                return true;
            }
            OpKind::Jsr => pc = rel(pc, i32::from(insn_jump(insn))),
            other => panic!("member program starts with {:?}", other),
        }
    }
}

unsafe fn write_pl_member<B: ByteOrder>(
    member_id: u32,
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    data: *const u8,
    ops: &[u32],
    pc: usize,
) -> CdrResult<()> {
    debug_assert_eq!(member_id & !EMHEADER_MEMBERID_MASK, 0);
    let lc = length_code(ops, pc);

    let body_start = if lc == LC_NEXTINT {
        os.reserve8(allocator)?
    } else {
        os.reserve4(allocator)?
    };
    write_impl::<B>(os, allocator, data, ops, pc, true)?;

    let member_flags = ops::op_flags(ops[pc]);
    let mut em_hdr = (lc << 28) | (member_id & EMHEADER_MEMBERID_MASK);
    if member_flags & (FLAG_MU | FLAG_KEY) != 0 {
        em_hdr |= EMHEADER_FLAG_MUST_UNDERSTAND;
    }

    let hdr_pos = body_start - if lc == LC_NEXTINT { 8 } else { 4 };
    os.patch4::<B>(hdr_pos, em_hdr);
    if lc == LC_NEXTINT {
        os.patch4::<B>(hdr_pos + 4, os.index() - body_start);
    }
    Ok(())
}

unsafe fn write_pl_memberlist<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    data: *const u8,
    ops: &[u32],
    pc0: usize,
) -> CdrResult<usize> {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return Ok(pc),
            OpKind::Plm => {
                let mut plm_pc = rel(pc, i32::from(insn_jump(insn)));
                if ops::plm_flags(insn) & ops::FLAG_BASE != 0 {
                    debug_assert_eq!(op_kind(ops[plm_pc]), OpKind::Plc);
                    plm_pc += 1; // past the base type's PLC, into its first PLM
                    write_pl_memberlist::<B>(os, allocator, data, ops, plm_pc)?;
                } else if is_member_present(data, ops, plm_pc) {
                    write_pl_member::<B>(ops[pc + 1], os, allocator, data, ops, plm_pc)?;
                }
                pc += 2;
            }
            other => panic!("{:?} inside a parameter-list member list", other),
        }
    }
}

unsafe fn write_pl<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    data: *const u8,
    ops: &[u32],
    pc: usize,
) -> CdrResult<usize> {
    let body_start = os.reserve4(allocator)?;
    let end = write_pl_memberlist::<B>(os, allocator, data, ops, pc + 1)?;
    os.patch4::<B>(body_start - 4, os.index() - body_start);
    Ok(end)
}

pub(crate) unsafe fn write_impl<B: ByteOrder>(
    os: &mut Ostream,
    allocator: &dyn CdrAllocator,
    data: *const u8,
    ops: &[u32],
    pc0: usize,
    is_mutable_member: bool,
) -> CdrResult<usize> {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return Ok(pc),
            OpKind::Adr => {
                pc = write_adr::<B>(insn, os, allocator, data, ops, pc, is_mutable_member)?;
            }
            OpKind::Jsr => {
                write_impl::<B>(
                    os,
                    allocator,
                    data,
                    ops,
                    rel(pc, i32::from(insn_jump(insn))),
                    is_mutable_member,
                )?;
                pc += 1;
            }
            OpKind::Dlc => {
                debug_assert_eq!(os.version(), XcdrVersion::Xcdr2);
                pc = write_delimited::<B>(os, allocator, data, ops, pc)?;
            }
            OpKind::Plc => {
                debug_assert_eq!(os.version(), XcdrVersion::Xcdr2);
                pc = write_pl::<B>(os, allocator, data, ops, pc)?;
            }
            other => panic!("{:?} outside its context", other),
        }
    }
}

/// Native size of a union case value, used when a case must be materialized
/// on read.
pub(crate) fn jeq4_case_size(ops: &[u32], jeq_pc: usize) -> u32 {
    jeq4_native_size(ops[jeq_pc], ops[jeq_pc + 3])
}
