// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-place validation and byte swapping of received payloads.
//!
//! This is the only place input is trusted after it succeeds: alignment,
//! lengths, NUL termination, enum/bitmask domains, union discriminants,
//! bounds and DHEADER/EMHEADER framing are all checked here, and multi-byte
//! values are swapped to host order when the sender's endianness differs.
//! Readers downstream assume all of it.

use crate::codec::write::{
    emheader_length_code, emheader_member_id, EMHEADER_FLAG_MUST_UNDERSTAND, LC_NEXTINT,
};
use crate::desc::CdrDesc;
use crate::ops::{
    self, find_union_case, insn_jump, jeq4_sub_program, kof_count, op_kind, op_subtype, op_type,
    op_type_base, op_type_optional, op_type_size, rel, skip_adr, OpKind, TypeCode,
};
use crate::ser::{align_up, cdr_align, CdrError, CdrResult, XcdrVersion};

#[inline]
fn check_align(off: u32, size: u32, align: u32, need: u32) -> CdrResult<u32> {
    let aligned = align_up(off, align);
    if size < aligned || size - aligned < need {
        return Err(CdrError::OutOfBounds { offset: off, need, size });
    }
    Ok(aligned)
}

#[inline]
fn check_align_many(off: u32, size: u32, align: u32, elem: u32, num: u32) -> CdrResult<u32> {
    let aligned = align_up(off, align);
    if size < aligned || (size - aligned) / elem < num {
        return Err(CdrError::OutOfBounds { offset: off, need: num * elem, size });
    }
    Ok(aligned)
}

fn read_u16_at(data: &[u8], at: u32) -> u16 {
    u16::from_ne_bytes(data[at as usize..at as usize + 2].try_into().unwrap())
}

fn read_u32_at(data: &[u8], at: u32) -> u32 {
    u32::from_ne_bytes(data[at as usize..at as usize + 4].try_into().unwrap())
}

fn read_u64_at(data: &[u8], at: u32) -> u64 {
    u64::from_ne_bytes(data[at as usize..at as usize + 8].try_into().unwrap())
}

fn swap_at(data: &mut [u8], at: u32, width: u32) {
    let s = &mut data[at as usize..(at + width) as usize];
    s.reverse();
}

fn norm_u8(off: &mut u32, size: u32) -> CdrResult<()> {
    if *off == size {
        return Err(CdrError::OutOfBounds { offset: *off, need: 1, size });
    }
    *off += 1;
    Ok(())
}

fn norm_bool(data: &[u8], off: &mut u32, size: u32) -> CdrResult<()> {
    if *off == size {
        return Err(CdrError::OutOfBounds { offset: *off, need: 1, size });
    }
    if data[*off as usize] > 1 {
        return Err(CdrError::InvalidBool { offset: *off });
    }
    *off += 1;
    Ok(())
}

fn read_norm_bool(data: &[u8], off: &mut u32, size: u32) -> CdrResult<bool> {
    let at = *off;
    norm_bool(data, off, size)?;
    Ok(data[at as usize] != 0)
}

fn norm_u16(data: &mut [u8], off: &mut u32, size: u32, bswap: bool) -> CdrResult<()> {
    let at = check_align(*off, size, 2, 2)?;
    if bswap {
        swap_at(data, at, 2);
    }
    *off = at + 2;
    Ok(())
}

fn norm_u32(data: &mut [u8], off: &mut u32, size: u32, bswap: bool) -> CdrResult<()> {
    let at = check_align(*off, size, 4, 4)?;
    if bswap {
        swap_at(data, at, 4);
    }
    *off = at + 4;
    Ok(())
}

fn norm_u64(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
) -> CdrResult<()> {
    let at = check_align(*off, size, cdr_align(xcdrv, 8), 8)?;
    if bswap {
        swap_at(data, at, 8);
    }
    *off = at + 8;
    Ok(())
}

fn read_norm_u32(data: &mut [u8], off: &mut u32, size: u32, bswap: bool) -> CdrResult<u32> {
    norm_u32(data, off, size, bswap)?;
    Ok(read_u32_at(data, *off - 4))
}

fn peek_norm_u32(data: &mut [u8], off: &mut u32, size: u32, bswap: bool) -> CdrResult<u32> {
    let at = check_align(*off, size, 4, 4)?;
    if bswap {
        swap_at(data, at, 4);
    }
    *off = at;
    Ok(read_u32_at(data, at))
}

fn read_norm_enum(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    insn: u32,
    max: u32,
) -> CdrResult<u32> {
    let val = match op_type_size(insn) {
        1 => {
            norm_u8(off, size)?;
            u32::from(data[(*off - 1) as usize])
        }
        2 => {
            norm_u16(data, off, size, bswap)?;
            u32::from(read_u16_at(data, *off - 2))
        }
        4 => read_norm_u32(data, off, size, bswap)?,
        _ => panic!("enum wire width {} is not supported", op_type_size(insn)),
    };
    if val > max {
        return Err(CdrError::InvalidEnumValue { value: val, max });
    }
    Ok(val)
}

#[inline]
fn bitmask_value_valid(val: u64, bits_h: u32, bits_l: u32) -> bool {
    ((val >> 32) & !u64::from(bits_h)) == 0 && (val & 0xffff_ffff & !u64::from(bits_l)) == 0
}

fn norm_bitmask(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    insn: u32,
    bits_h: u32,
    bits_l: u32,
) -> CdrResult<()> {
    let val: u64 = match op_type_size(insn) {
        1 => {
            norm_u8(off, size)?;
            u64::from(data[(*off - 1) as usize])
        }
        2 => {
            norm_u16(data, off, size, bswap)?;
            u64::from(read_u16_at(data, *off - 2))
        }
        4 => u64::from(read_norm_u32(data, off, size, bswap)?),
        8 => {
            norm_u64(data, off, size, bswap, xcdrv)?;
            read_u64_at(data, *off - 8)
        }
        _ => unreachable!(),
    };
    if !bitmask_value_valid(val, bits_h, bits_l) {
        return Err(CdrError::InvalidBitmaskValue { value: val });
    }
    Ok(())
}

fn norm_string(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    maxsz: u32,
) -> CdrResult<()> {
    let len = read_norm_u32(data, off, size, bswap)?;
    if len == 0 || size - *off < len || maxsz < len {
        return Err(CdrError::InvalidString { offset: *off });
    }
    if data[(*off + len - 1) as usize] != 0 {
        return Err(CdrError::InvalidString { offset: *off });
    }
    *off += len;
    Ok(())
}

fn norm_primarray(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    num: u32,
    tc: TypeCode,
    xcdrv: XcdrVersion,
) -> CdrResult<()> {
    let elem = tc.primitive_size();
    let align = cdr_align(xcdrv, elem);
    let at = check_align_many(*off, size, align, elem, num)?;
    if bswap && elem > 1 {
        for i in 0..num {
            swap_at(data, at + i * elem, elem);
        }
    }
    *off = at + num * elem;
    Ok(())
}

/// Arrays of enums (and booleans, with `max == 1`): swap then range-check
/// every element.
fn norm_enumarray(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    elem: u32,
    num: u32,
    max: u32,
) -> CdrResult<()> {
    let at = check_align_many(*off, size, elem, elem, num)?;
    for i in 0..num {
        let p = at + i * elem;
        if bswap && elem > 1 {
            swap_at(data, p, elem);
        }
        let val = match elem {
            1 => u32::from(data[p as usize]),
            2 => u32::from(read_u16_at(data, p)),
            4 => read_u32_at(data, p),
            _ => unreachable!(),
        };
        if val > max {
            return Err(CdrError::InvalidEnumValue { value: val, max });
        }
    }
    *off = at + num * elem;
    Ok(())
}

fn norm_bitmaskarray(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    insn: u32,
    num: u32,
    bits_h: u32,
    bits_l: u32,
) -> CdrResult<()> {
    let elem = op_type_size(insn);
    let align = cdr_align(xcdrv, elem);
    let at = check_align_many(*off, size, align, elem, num)?;
    for i in 0..num {
        let p = at + i * elem;
        if bswap && elem > 1 {
            swap_at(data, p, elem);
        }
        let val = match elem {
            1 => u64::from(data[p as usize]),
            2 => u64::from(read_u16_at(data, p)),
            4 => u64::from(read_u32_at(data, p)),
            8 => read_u64_at(data, p),
            _ => unreachable!(),
        };
        if !bitmask_value_valid(val, bits_h, bits_l) {
            return Err(CdrError::InvalidBitmaskValue { value: val });
        }
    }
    *off = at + num * elem;
    Ok(())
}

/// Normalize a collection's DHEADER when the element type carries one.
/// Returns the end of the delimited region (or `size` when undelimited).
fn norm_collection_dheader(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    subtype: TypeCode,
    xcdrv: XcdrVersion,
) -> CdrResult<Option<u32>> {
    if !ops::is_dheader_needed(subtype, xcdrv) {
        return Ok(None);
    }
    let sz = read_norm_u32(data, off, size, bswap)?;
    if sz > size - *off {
        return Err(CdrError::InvalidFraming { offset: *off });
    }
    Ok(Some(*off + sz))
}

fn norm_seq(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> CdrResult<usize> {
    let subtype = op_subtype(insn);
    let bound_op = usize::from(ops::seq_is_bounded(op_type(insn)));
    let bound = if bound_op == 1 { ops[pc + 2] } else { 0 };

    let dheader_end = norm_collection_dheader(data, off, size, bswap, subtype, xcdrv)?;
    let size1 = dheader_end.unwrap_or(size);

    let num = read_norm_u32(data, off, size1, bswap)?;
    if num == 0 {
        if let Some(end) = dheader_end {
            if *off != end {
                return Err(CdrError::InvalidFraming { offset: *off });
            }
        }
        return Ok(ops::skip_sequence_ops(insn, ops, pc));
    }
    if bound != 0 && num > bound {
        return Err(CdrError::BoundExceeded { bound, actual: num });
    }

    let next = match subtype {
        TypeCode::Boolean => {
            norm_enumarray(data, off, size1, bswap, 1, num, 1)?;
            pc + 2 + bound_op
        }
        t @ (TypeCode::Byte1 | TypeCode::Byte2 | TypeCode::Byte4 | TypeCode::Byte8) => {
            norm_primarray(data, off, size1, bswap, num, t, xcdrv)?;
            pc + 2 + bound_op
        }
        TypeCode::Enum => {
            norm_enumarray(data, off, size1, bswap, op_type_size(insn), num, ops[pc + 2 + bound_op])?;
            pc + 3 + bound_op
        }
        TypeCode::Bitmask => {
            norm_bitmaskarray(
                data,
                off,
                size1,
                bswap,
                xcdrv,
                insn,
                num,
                ops[pc + 2 + bound_op],
                ops[pc + 3 + bound_op],
            )?;
            pc + 4 + bound_op
        }
        TypeCode::Str | TypeCode::BStr => {
            let maxsz = if subtype == TypeCode::Str { u32::MAX } else { ops[pc + 2 + bound_op] };
            for _ in 0..num {
                norm_string(data, off, size1, bswap, maxsz)?;
            }
            pc + if subtype == TypeCode::Str { 2 } else { 3 } + bound_op
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3 + bound_op])));
            let jmp = ops::jmp_of(ops[pc + 3 + bound_op]);
            for _ in 0..num {
                normalize_impl(data, off, size1, bswap, xcdrv, ops, jsr_pc, false)?;
            }
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else {
                pc + 4 + bound_op
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as a sequence element"),
    };
    if let Some(end) = dheader_end {
        if *off != end {
            return Err(CdrError::InvalidFraming { offset: *off });
        }
    }
    Ok(next)
}

fn norm_arr(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> CdrResult<usize> {
    let subtype = op_subtype(insn);
    let dheader_end = norm_collection_dheader(data, off, size, bswap, subtype, xcdrv)?;
    let size1 = dheader_end.unwrap_or(size);
    let num = ops[pc + 2];

    let next = match subtype {
        TypeCode::Boolean => {
            norm_enumarray(data, off, size1, bswap, 1, num, 1)?;
            pc + 3
        }
        t @ (TypeCode::Byte1 | TypeCode::Byte2 | TypeCode::Byte4 | TypeCode::Byte8) => {
            norm_primarray(data, off, size1, bswap, num, t, xcdrv)?;
            pc + 3
        }
        TypeCode::Enum => {
            norm_enumarray(data, off, size1, bswap, op_type_size(insn), num, ops[pc + 3])?;
            pc + 4
        }
        TypeCode::Bitmask => {
            norm_bitmaskarray(data, off, size1, bswap, xcdrv, insn, num, ops[pc + 3], ops[pc + 4])?;
            pc + 5
        }
        TypeCode::Str | TypeCode::BStr => {
            let maxsz = if subtype == TypeCode::Str { u32::MAX } else { ops[pc + 4] };
            for _ in 0..num {
                norm_string(data, off, size1, bswap, maxsz)?;
            }
            if subtype == TypeCode::Str {
                pc + 3
            } else {
                pc + 5
            }
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3])));
            let jmp = ops::jmp_of(ops[pc + 3]);
            for _ in 0..num {
                normalize_impl(data, off, size1, bswap, xcdrv, ops, jsr_pc, false)?;
            }
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else {
                pc + 5
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as an array element"),
    };
    if let Some(end) = dheader_end {
        if *off != end {
            return Err(CdrError::InvalidFraming { offset: *off });
        }
    }
    Ok(next)
}

fn norm_uni_disc(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    insn: u32,
    ops: &[u32],
    pc: usize,
) -> CdrResult<u32> {
    match op_subtype(insn) {
        TypeCode::Boolean => Ok(u32::from(read_norm_bool(data, off, size)?)),
        TypeCode::Byte1 => {
            norm_u8(off, size)?;
            Ok(u32::from(data[(*off - 1) as usize]))
        }
        TypeCode::Byte2 => {
            norm_u16(data, off, size, bswap)?;
            Ok(u32::from(read_u16_at(data, *off - 2)))
        }
        TypeCode::Byte4 => read_norm_u32(data, off, size, bswap),
        TypeCode::Enum => read_norm_enum(data, off, size, bswap, insn, ops[pc + 4]),
        other => panic!("{:?} cannot discriminate a union", other),
    }
}

fn norm_uni(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> CdrResult<usize> {
    let disc = norm_uni_disc(data, off, size, bswap, insn, ops, pc)?;
    let next = skip_adr(insn, ops, pc);
    let Some(jeq_pc) = find_union_case(ops, pc, disc) else {
        return Ok(next);
    };
    let jeq_insn = ops[jeq_pc];
    match op_type(jeq_insn) {
        TypeCode::Boolean => norm_bool(data, off, size)?,
        TypeCode::Byte1 => norm_u8(off, size)?,
        TypeCode::Byte2 => norm_u16(data, off, size, bswap)?,
        TypeCode::Byte4 => norm_u32(data, off, size, bswap)?,
        TypeCode::Byte8 => norm_u64(data, off, size, bswap, xcdrv)?,
        TypeCode::Str => norm_string(data, off, size, bswap, u32::MAX)?,
        TypeCode::BStr => norm_string(data, off, size, bswap, ops[jeq_pc + 3])?,
        TypeCode::Enum => {
            read_norm_enum(data, off, size, bswap, jeq_insn, ops[jeq_pc + 3])?;
        }
        TypeCode::Seq
        | TypeCode::BSeq
        | TypeCode::Arr
        | TypeCode::Uni
        | TypeCode::Stu
        | TypeCode::Bitmask => {
            normalize_impl(data, off, size, bswap, xcdrv, ops, jeq4_sub_program(ops, jeq_pc), false)?;
        }
        TypeCode::Ext => panic!("EXT is not allowed as a union case type"),
    }
    Ok(next)
}

#[allow(clippy::too_many_arguments)]
fn normalize_adr(
    insn: u32,
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc: usize,
    is_mutable_member: bool,
) -> CdrResult<usize> {
    if op_type_optional(insn) && !is_mutable_member {
        let present = read_norm_bool(data, off, size)?;
        if !present {
            return Ok(skip_adr(insn, ops, pc));
        }
    }
    match op_type(insn) {
        TypeCode::Boolean => {
            norm_bool(data, off, size)?;
            Ok(pc + 2)
        }
        TypeCode::Byte1 => {
            norm_u8(off, size)?;
            Ok(pc + 2)
        }
        TypeCode::Byte2 => {
            norm_u16(data, off, size, bswap)?;
            Ok(pc + 2)
        }
        TypeCode::Byte4 => {
            norm_u32(data, off, size, bswap)?;
            Ok(pc + 2)
        }
        TypeCode::Byte8 => {
            norm_u64(data, off, size, bswap, xcdrv)?;
            Ok(pc + 2)
        }
        TypeCode::Str => {
            norm_string(data, off, size, bswap, u32::MAX)?;
            Ok(pc + 2)
        }
        TypeCode::BStr => {
            norm_string(data, off, size, bswap, ops[pc + 2])?;
            Ok(pc + 3)
        }
        TypeCode::Enum => {
            read_norm_enum(data, off, size, bswap, insn, ops[pc + 2])?;
            Ok(pc + 3)
        }
        TypeCode::Bitmask => {
            norm_bitmask(data, off, size, bswap, xcdrv, insn, ops[pc + 2], ops[pc + 3])?;
            Ok(pc + 4)
        }
        TypeCode::Seq | TypeCode::BSeq => norm_seq(data, off, size, bswap, xcdrv, ops, pc, insn),
        TypeCode::Arr => norm_arr(data, off, size, bswap, xcdrv, ops, pc, insn),
        TypeCode::Uni => norm_uni(data, off, size, bswap, xcdrv, ops, pc, insn),
        TypeCode::Ext => {
            let mut jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            // base-type members have no delimiter of their own
            if op_type_base(insn) && op_kind(ops[jsr_pc]) == OpKind::Dlc {
                jsr_pc += 1;
            }
            normalize_impl(data, off, size, bswap, xcdrv, ops, jsr_pc, false)?;
            Ok(skip_adr(insn, ops, pc))
        }
        TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
    }
}

fn norm_delimited(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc0: usize,
) -> CdrResult<usize> {
    let delimited_sz = read_norm_u32(data, off, size, bswap)?;
    if delimited_sz > size - *off {
        return Err(CdrError::InvalidFraming { offset: *off });
    }
    let size1 = *off + delimited_sz;
    let mut pc = pc0 + 1;
    loop {
        let insn = ops[pc];
        if op_kind(insn) == OpKind::Rts || *off >= size1 {
            break;
        }
        match op_kind(insn) {
            OpKind::Adr => {
                pc = normalize_adr(insn, data, off, size1, bswap, xcdrv, ops, pc, false)?;
            }
            OpKind::Jsr => {
                normalize_impl(data, off, size1, bswap, xcdrv, ops, rel(pc, i32::from(insn_jump(insn))), false)?;
                pc += 1;
            }
            other => panic!("{:?} inside a delimited body", other),
        }
    }
    // members the peer did not serialize are defaulted at read time
    while op_kind(ops[pc]) != OpKind::Rts {
        pc = skip_adr(ops[pc], ops, pc);
    }
    debug_assert!(*off <= size1);
    *off = size1;
    Ok(pc)
}

enum PlMemberResult {
    NotFound,
    Found,
}

fn norm_pl_member(
    data: &mut [u8],
    m_id: u32,
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc0: usize,
) -> CdrResult<PlMemberResult> {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        if op_kind(insn) == OpKind::Rts {
            return Ok(PlMemberResult::NotFound);
        }
        debug_assert_eq!(op_kind(insn), OpKind::Plm);
        let mut plm_pc = rel(pc, i32::from(insn_jump(insn)));
        if ops::plm_flags(insn) & ops::FLAG_BASE != 0 {
            debug_assert_eq!(op_kind(ops[plm_pc]), OpKind::Plc);
            plm_pc += 1;
            if let PlMemberResult::Found =
                norm_pl_member(data, m_id, off, size, bswap, xcdrv, ops, plm_pc)?
            {
                return Ok(PlMemberResult::Found);
            }
        } else if ops[pc + 1] == m_id {
            normalize_impl(data, off, size, bswap, xcdrv, ops, plm_pc, true)?;
            return Ok(PlMemberResult::Found);
        }
        pc += 2;
    }
}

fn norm_pl(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc0: usize,
) -> CdrResult<usize> {
    let pc = pc0 + 1;
    let pl_sz = read_norm_u32(data, off, size, bswap)?;
    if pl_sz > size - *off {
        return Err(CdrError::InvalidFraming { offset: *off });
    }
    let size1 = *off + pl_sz;

    while *off < size1 {
        let em_hdr = read_norm_u32(data, off, size1, bswap)?;
        let lc = emheader_length_code(em_hdr);
        let m_id = emheader_member_id(em_hdr);
        let must_understand = em_hdr & EMHEADER_FLAG_MUST_UNDERSTAND != 0;
        let msz = match lc {
            0..=3 => 1u32 << lc,
            LC_NEXTINT => read_norm_u32(data, off, size1, bswap)?,
            _ => {
                let v = peek_norm_u32(data, off, size1, bswap)?;
                // codes 6/7 alias an element count of 4/8-byte elements
                let shift = if lc > 5 { lc - 4 } else { 0 };
                if v > u32::MAX >> shift {
                    return Err(CdrError::InvalidFraming { offset: *off });
                }
                // the aliased length does not count its own 4 bytes
                let v = v << shift;
                if v > u32::MAX - 4 {
                    return Err(CdrError::InvalidFraming { offset: *off });
                }
                v + 4
            }
        };
        if msz > size1 - *off {
            return Err(CdrError::InvalidFraming { offset: *off });
        }
        // a member value must not run past its declared size
        let size2 = *off + msz;
        match norm_pl_member(data, m_id, off, size2, bswap, xcdrv, ops, pc)? {
            PlMemberResult::NotFound => {
                if must_understand {
                    return Err(CdrError::MustUnderstand { member_id: m_id });
                }
                *off = size2;
            }
            PlMemberResult::Found => {
                if *off != size2 {
                    return Err(CdrError::InvalidFraming { offset: *off });
                }
            }
        }
    }

    let mut pc = pc;
    while op_kind(ops[pc]) != OpKind::Rts {
        pc += 2;
    }
    Ok(pc)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn normalize_impl(
    data: &mut [u8],
    off: &mut u32,
    size: u32,
    bswap: bool,
    xcdrv: XcdrVersion,
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
                pc = normalize_adr(insn, data, off, size, bswap, xcdrv, ops, pc, is_mutable_member)?;
            }
            OpKind::Jsr => {
                normalize_impl(
                    data,
                    off,
                    size,
                    bswap,
                    xcdrv,
                    ops,
                    rel(pc, i32::from(insn_jump(insn))),
                    is_mutable_member,
                )?;
                pc += 1;
            }
            OpKind::Dlc => {
                if xcdrv != XcdrVersion::Xcdr2 {
                    return Err(CdrError::InvalidFraming { offset: *off });
                }
                pc = norm_delimited(data, off, size, bswap, xcdrv, ops, pc)?;
            }
            OpKind::Plc => {
                if xcdrv != XcdrVersion::Xcdr2 {
                    return Err(CdrError::InvalidFraming { offset: *off });
                }
                pc = norm_pl(data, off, size, bswap, xcdrv, ops, pc)?;
            }
            other => panic!("{:?} outside its context", other),
        }
    }
}

fn normalize_key_field(
    data: &mut [u8],
    size: u32,
    off: &mut u32,
    bswap: bool,
    xcdrv: XcdrVersion,
    ops: &[u32],
    pc: usize,
    key_offsets: &[u32],
) -> CdrResult<()> {
    let insn = ops[pc];
    debug_assert!(ops::insn_key_ok(insn));
    match op_type(insn) {
        TypeCode::Boolean => norm_bool(data, off, size),
        TypeCode::Byte1 => norm_u8(off, size),
        TypeCode::Byte2 => norm_u16(data, off, size, bswap),
        TypeCode::Byte4 => norm_u32(data, off, size, bswap),
        TypeCode::Byte8 => norm_u64(data, off, size, bswap, xcdrv),
        TypeCode::Enum => read_norm_enum(data, off, size, bswap, insn, ops[pc + 2]).map(|_| ()),
        TypeCode::Bitmask => {
            norm_bitmask(data, off, size, bswap, xcdrv, insn, ops[pc + 2], ops[pc + 3])
        }
        TypeCode::Str => norm_string(data, off, size, bswap, u32::MAX),
        TypeCode::BStr => norm_string(data, off, size, bswap, ops[pc + 2]),
        TypeCode::Arr => norm_arr(data, off, size, bswap, xcdrv, ops, pc, insn).map(|_| ()),
        TypeCode::Ext => {
            let (&head, tail) = key_offsets.split_first().expect("key offset path exhausted");
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            normalize_key_field(data, size, off, bswap, xcdrv, ops, jsr_pc + head as usize, tail)
        }
        other => panic!("{:?} cannot be a key field", other),
    }
}

/// Validate a key-only payload: the key fields in the canonical order for
/// `xcdrv`, nothing else.
pub(crate) fn normalize_key(
    data: &mut [u8],
    bswap: bool,
    xcdrv: XcdrVersion,
    desc: &CdrDesc,
) -> CdrResult<u32> {
    let size = data.len() as u32;
    let mut off = 0u32;
    for key in desc.keys_in_order(xcdrv) {
        let pc = key.ops_offs as usize;
        match op_kind(desc.ops[pc]) {
            OpKind::Kof => {
                let n = kof_count(desc.ops[pc]) as usize;
                debug_assert!(n > 0);
                let target = desc.ops[pc + 1] as usize;
                normalize_key_field(
                    data,
                    size,
                    &mut off,
                    bswap,
                    xcdrv,
                    &desc.ops,
                    target,
                    &desc.ops[pc + 2..pc + 1 + n],
                )?;
            }
            OpKind::Adr => {
                normalize_key_field(data, size, &mut off, bswap, xcdrv, &desc.ops, pc, &[])?;
            }
            other => panic!("key descriptor points at {:?}", other),
        }
    }
    Ok(off)
}
