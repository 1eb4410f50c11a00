// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Human-readable rendering of serialized samples and keys.
//!
//! The walk mirrors the reader so the cursor stays in lockstep with the
//! wire layout; only the destination differs. Output is compact:
//! `{1,"hi",[3]{1,2,3}}` style, booleans as true/false, bitmasks in hex,
//! non-printable string bytes escaped.

use std::fmt::Write;

use crate::desc::CdrDesc;
use crate::ops::{
    self, find_union_case, insn_jump, jeq4_sub_program, kof_count, op_flags, op_kind, op_subtype,
    op_type, op_type_base, op_type_optional, op_type_size, rel, skip_adr, OpKind, TypeCode,
    FLAG_FP, FLAG_SGN,
};
use crate::codec::write::{emheader_length_code, emheader_member_id, LC_ALSO_NEXTINT, LC_NEXTINT};
use crate::ser::Istream;

fn print_scalar(is: &mut Istream<'_>, out: &mut String, tc: TypeCode, flags: u32, insn: u32) {
    match tc {
        TypeCode::Boolean => {
            let v = is.get1();
            let _ = write!(out, "{}", if v != 0 { "true" } else { "false" });
        }
        TypeCode::Byte1 => {
            let v = is.get1();
            if flags & FLAG_SGN != 0 {
                let _ = write!(out, "{}", v as i8);
            } else {
                let _ = write!(out, "{}", v);
            }
        }
        TypeCode::Byte2 => {
            let v = is.get2();
            if flags & FLAG_SGN != 0 {
                let _ = write!(out, "{}", v as i16);
            } else {
                let _ = write!(out, "{}", v);
            }
        }
        TypeCode::Byte4 => {
            let v = is.get4();
            if flags & FLAG_FP != 0 {
                let _ = write!(out, "{}", f32::from_bits(v));
            } else if flags & FLAG_SGN != 0 {
                let _ = write!(out, "{}", v as i32);
            } else {
                let _ = write!(out, "{}", v);
            }
        }
        TypeCode::Byte8 => {
            let v = is.get8();
            if flags & FLAG_FP != 0 {
                let _ = write!(out, "{}", f64::from_bits(v));
            } else if flags & FLAG_SGN != 0 {
                let _ = write!(out, "{}", v as i64);
            } else {
                let _ = write!(out, "{}", v);
            }
        }
        TypeCode::Enum => {
            let v = match op_type_size(insn) {
                1 => u32::from(is.get1()),
                2 => u32::from(is.get2()),
                _ => is.get4(),
            };
            let _ = write!(out, "{}", v);
        }
        TypeCode::Bitmask => {
            let v = match op_type_size(insn) {
                1 => u64::from(is.get1()),
                2 => u64::from(is.get2()),
                4 => u64::from(is.get4()),
                _ => is.get8(),
            };
            let _ = write!(out, "{:#x}", v);
        }
        other => panic!("{:?} is not a scalar", other),
    }
}

fn print_string(is: &mut Istream<'_>, out: &mut String) {
    let len = is.get4();
    let bytes = is.bytes(len);
    out.push('"');
    // drop the terminating NUL
    for &b in &bytes[..bytes.len().saturating_sub(1)] {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\x{:02x}", b);
        }
    }
    out.push('"');
}

fn print_seq(is: &mut Istream<'_>, ops: &[u32], pc: usize, insn: u32, out: &mut String) -> usize {
    let subtype = op_subtype(insn);
    let bound_op = usize::from(ops::seq_is_bounded(op_type(insn)));
    if ops::is_dheader_needed(subtype, is.version()) {
        is.get4();
    }
    let num = is.get4();
    out.push('{');
    for i in 0..num {
        if i > 0 {
            out.push(',');
        }
        match subtype {
            TypeCode::Str | TypeCode::BStr => print_string(is, out),
            t if t.is_primitive() || t == TypeCode::Enum || t == TypeCode::Bitmask => {
                print_scalar(is, out, t, op_flags(insn), insn);
            }
            _ => {
                let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3 + bound_op])));
                print_impl(is, ops, jsr_pc, out, false);
            }
        }
    }
    out.push('}');
    ops::skip_sequence_ops(insn, ops, pc)
}

fn print_arr(is: &mut Istream<'_>, ops: &[u32], pc: usize, insn: u32, out: &mut String) -> usize {
    let subtype = op_subtype(insn);
    if ops::is_dheader_needed(subtype, is.version()) {
        is.get4();
    }
    let num = ops[pc + 2];
    out.push('{');
    for i in 0..num {
        if i > 0 {
            out.push(',');
        }
        match subtype {
            TypeCode::Str | TypeCode::BStr => print_string(is, out),
            t if t.is_primitive() || t == TypeCode::Enum || t == TypeCode::Bitmask => {
                print_scalar(is, out, t, op_flags(insn), insn);
            }
            _ => {
                let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3])));
                print_impl(is, ops, jsr_pc, out, false);
            }
        }
    }
    out.push('}');
    ops::skip_array_ops(insn, ops, pc)
}

fn print_uni(is: &mut Istream<'_>, ops: &[u32], pc: usize, insn: u32, out: &mut String) -> usize {
    let disc = crate::codec::read::read_union_discriminant(is, insn);
    let _ = write!(out, "{}:", disc);
    if let Some(jeq_pc) = find_union_case(ops, pc, disc) {
        let jeq_insn = ops[jeq_pc];
        match op_type(jeq_insn) {
            TypeCode::Str | TypeCode::BStr => print_string(is, out),
            t if t.is_primitive() || t == TypeCode::Enum => {
                print_scalar(is, out, t, op_flags(jeq_insn), jeq_insn);
            }
            _ => {
                print_impl(is, ops, jeq4_sub_program(ops, jeq_pc), out, false);
            }
        }
    }
    skip_adr(insn, ops, pc)
}

fn print_adr(
    insn: u32,
    is: &mut Istream<'_>,
    ops: &[u32],
    pc: usize,
    out: &mut String,
    is_mutable_member: bool,
) -> usize {
    if op_type_optional(insn) && !is_mutable_member && is.get1() == 0 {
        out.push_str("nil");
        return skip_adr(insn, ops, pc);
    }
    match op_type(insn) {
        TypeCode::Str | TypeCode::BStr => {
            print_string(is, out);
            skip_adr(insn, ops, pc)
        }
        TypeCode::Seq | TypeCode::BSeq => print_seq(is, ops, pc, insn, out),
        TypeCode::Arr => print_arr(is, ops, pc, insn, out),
        TypeCode::Uni => print_uni(is, ops, pc, insn, out),
        TypeCode::Ext => {
            let mut jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            if op_type_base(insn) && op_kind(ops[jsr_pc]) == OpKind::Dlc {
                jsr_pc += 1;
            }
            print_impl(is, ops, jsr_pc, out, false);
            skip_adr(insn, ops, pc)
        }
        TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
        t => {
            print_scalar(is, out, t, op_flags(insn), insn);
            skip_adr(insn, ops, pc)
        }
    }
}

fn print_delimited(is: &mut Istream<'_>, ops: &[u32], pc0: usize, out: &mut String) -> usize {
    let delimited_sz = is.get4();
    let delimited_offs = is.index();
    let mut pc = pc0 + 1;
    let mut first = true;
    out.push('{');
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => break,
            OpKind::Adr => {
                if is.index() - delimited_offs < delimited_sz {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    pc = print_adr(insn, is, ops, pc, out, false);
                } else {
                    pc = skip_adr(insn, ops, pc);
                }
            }
            OpKind::Jsr => {
                print_impl(is, ops, rel(pc, i32::from(insn_jump(insn))), out, false);
                pc += 1;
            }
            other => panic!("{:?} inside a delimited body", other),
        }
    }
    out.push('}');
    let consumed = is.index() - delimited_offs;
    if delimited_sz > consumed {
        is.skip(delimited_sz - consumed);
    }
    pc
}

fn print_pl_member(
    is: &mut Istream<'_>,
    m_id: u32,
    ops: &[u32],
    pc0: usize,
    out: &mut String,
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
            plm_pc += 1;
            if print_pl_member(is, m_id, ops, plm_pc, out) {
                return true;
            }
        } else if ops[pc + 1] == m_id {
            let _ = write!(out, "{}:", m_id);
            print_impl(is, ops, plm_pc, out, true);
            return true;
        }
        pc += 2;
    }
}

fn print_pl(is: &mut Istream<'_>, ops: &[u32], pc0: usize, out: &mut String) -> usize {
    let pc = pc0 + 1;
    let pl_sz = is.get4();
    let pl_offs = is.index();
    out.push('{');
    let mut first = true;
    while is.index() - pl_offs < pl_sz {
        let em_hdr = is.get4();
        let lc = emheader_length_code(em_hdr);
        let m_id = emheader_member_id(em_hdr);
        let msz = match lc {
            0..=3 => 1u32 << lc,
            LC_NEXTINT => is.get4(),
            _ => is.peek4() << if lc > 5 { lc - 4 } else { 0 },
        };
        if !first {
            out.push(',');
        }
        first = false;
        if !print_pl_member(is, m_id, ops, pc, out) {
            let _ = write!(out, "{}:?", m_id);
            is.skip(msz);
            if lc >= LC_ALSO_NEXTINT {
                is.skip(4);
            }
        }
    }
    out.push('}');
    let mut pc = pc;
    while op_kind(ops[pc]) != OpKind::Rts {
        pc += 2;
    }
    pc
}

pub(crate) fn print_impl(
    is: &mut Istream<'_>,
    ops: &[u32],
    pc0: usize,
    out: &mut String,
    is_mutable_member: bool,
) -> usize {
    let mut pc = pc0;
    let top = op_kind(ops[pc]) == OpKind::Adr;
    if top {
        out.push('{');
    }
    let mut first = true;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => break,
            OpKind::Adr => {
                if !first {
                    out.push(',');
                }
                first = false;
                pc = print_adr(insn, is, ops, pc, out, is_mutable_member);
            }
            OpKind::Jsr => {
                print_impl(is, ops, rel(pc, i32::from(insn_jump(insn))), out, is_mutable_member);
                pc += 1;
            }
            OpKind::Dlc => pc = print_delimited(is, ops, pc, out),
            OpKind::Plc => pc = print_pl(is, ops, pc, out),
            other => panic!("{:?} outside its context", other),
        }
    }
    if top {
        out.push('}');
    }
    pc
}

fn print_key_field(is: &mut Istream<'_>, desc: &CdrDesc, pc: usize, trail: &[u32], out: &mut String) {
    let ops = &desc.ops;
    let insn = ops[pc];
    match op_type(insn) {
        TypeCode::Str | TypeCode::BStr => print_string(is, out),
        TypeCode::Arr => {
            print_arr(is, ops, pc, insn, out);
        }
        TypeCode::Ext => {
            let (&head, tail) = trail.split_first().expect("key offset path exhausted");
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            print_key_field(is, desc, jsr_pc + head as usize, tail, out);
        }
        t => print_scalar(is, out, t, op_flags(insn), insn),
    }
}

pub(crate) fn print_key_impl(is: &mut Istream<'_>, desc: &CdrDesc, out: &mut String) {
    out.push(':');
    out.push('{');
    for (i, key) in desc.keys_in_order(is.version()).into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let pc = key.ops_offs as usize;
        match op_kind(desc.ops[pc]) {
            OpKind::Kof => {
                let n = kof_count(desc.ops[pc]) as usize;
                let target = desc.ops[pc + 1] as usize;
                let trail = desc.ops[pc + 2..pc + 1 + n].to_vec();
                print_key_field(is, desc, target, &trail, out);
            }
            OpKind::Adr => print_key_field(is, desc, pc, &[], out),
            other => panic!("key descriptor points at {:?}", other),
        }
    }
    out.push('}');
}
