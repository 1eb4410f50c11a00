// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Default-fill of native records: zeros, empty strings and zero-length
//! sequences. Used when an appendable peer omits trailing members and when
//! a parameter list is read (members are defaulted before matching).

use crate::alloc::CdrAllocator;
use crate::codec::read::{needs_external_storage, reuse_string_empty};
use crate::codec::{free, load, store, CdrSeq};
use crate::ops::{
    self, find_union_case, insn_jump, jeq4_sub_program, op_kind, op_subtype, op_type,
    op_type_size, rel, OpKind, TypeCode,
};

unsafe fn skip_array_default(
    insn: u32,
    addr: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
) -> usize {
    let num = ops[pc + 2];
    match op_subtype(insn) {
        t @ (TypeCode::Boolean
        | TypeCode::Byte1
        | TypeCode::Byte2
        | TypeCode::Byte4
        | TypeCode::Byte8) => {
            std::ptr::write_bytes(addr, 0, (num * t.primitive_size()) as usize);
            pc + 3
        }
        TypeCode::Enum => {
            std::ptr::write_bytes(addr, 0, (num * 4) as usize);
            pc + 4
        }
        TypeCode::Bitmask => {
            std::ptr::write_bytes(addr, 0, (num * op_type_size(insn)) as usize);
            pc + 5
        }
        TypeCode::Str => {
            let ptr_size = std::mem::size_of::<*mut u8>() as u32;
            for i in 0..num {
                let old = load::<*mut u8>(addr, i * ptr_size);
                store(addr, i * ptr_size, reuse_string_empty(old, allocator));
            }
            pc + 3
        }
        TypeCode::BStr => {
            let elem_size = ops[pc + 4];
            for i in 0..num {
                *addr.add((i * elem_size) as usize) = 0;
            }
            pc + 5
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let elem_size = ops[pc + 4];
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3])));
            let jmp = ops::jmp_of(ops[pc + 3]);
            for i in 0..num {
                skip_default_impl(addr.add((i * elem_size) as usize), allocator, ops, jsr_pc);
            }
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else {
                pc + 5
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as an array element"),
    }
}

unsafe fn skip_union_default(
    insn: u32,
    disc_addr: *mut u8,
    base: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
) -> usize {
    match op_subtype(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => store(disc_addr, 0, 0u8),
        TypeCode::Byte2 => store(disc_addr, 0, 0u16),
        TypeCode::Byte4 | TypeCode::Enum => store(disc_addr, 0, 0u32),
        _ => {}
    }
    let next = ops::skip_adr(insn, ops, pc);
    let Some(jeq_pc) = find_union_case(ops, pc, 0) else {
        return next;
    };
    let jeq_insn = ops[jeq_pc];
    let valaddr = base.add(ops[jeq_pc + 2] as usize);
    match op_type(jeq_insn) {
        TypeCode::Boolean | TypeCode::Byte1 => store(valaddr, 0, 0u8),
        TypeCode::Byte2 => store(valaddr, 0, 0u16),
        TypeCode::Byte4 | TypeCode::Enum => store(valaddr, 0, 0u32),
        TypeCode::Byte8 => store(valaddr, 0, 0u64),
        TypeCode::Str => {
            let old = load::<*mut u8>(valaddr, 0);
            store(valaddr, 0, reuse_string_empty(old, allocator));
        }
        TypeCode::BStr => *valaddr = 0,
        TypeCode::Seq
        | TypeCode::BSeq
        | TypeCode::Arr
        | TypeCode::Uni
        | TypeCode::Stu
        | TypeCode::Bitmask => {
            skip_default_impl(valaddr, allocator, ops, jeq4_sub_program(ops, jeq_pc));
        }
        TypeCode::Ext => panic!("EXT is not allowed as a union case type"),
    }
    next
}

/// Default one ADR member. Optional and external members are released and
/// nulled instead of zeroed.
pub(crate) unsafe fn skip_adr_default(
    insn: u32,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
) -> usize {
    if needs_external_storage(insn) || (ops::op_type_optional(insn) && op_type(insn) == TypeCode::Str)
    {
        return free::free_sample_adr(insn, data, allocator, ops, pc);
    }
    let addr = data.add(ops[pc + 1] as usize);
    match op_type(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => {
            store(addr, 0, 0u8);
            pc + 2
        }
        TypeCode::Byte2 => {
            store(addr, 0, 0u16);
            pc + 2
        }
        TypeCode::Byte4 => {
            store(addr, 0, 0u32);
            pc + 2
        }
        TypeCode::Byte8 => {
            store(addr, 0, 0u64);
            pc + 2
        }
        TypeCode::Str => {
            let old = load::<*mut u8>(addr, 0);
            store(addr, 0, reuse_string_empty(old, allocator));
            pc + 2
        }
        TypeCode::BStr => {
            *addr = 0;
            pc + 3
        }
        TypeCode::Enum => {
            store(addr, 0, 0u32);
            pc + 3
        }
        TypeCode::Bitmask => {
            match op_type_size(insn) {
                1 => store(addr, 0, 0u8),
                2 => store(addr, 0, 0u16),
                4 => store(addr, 0, 0u32),
                8 => store(addr, 0, 0u64),
                _ => unreachable!(),
            }
            pc + 4
        }
        TypeCode::Seq | TypeCode::BSeq => {
            (*addr.cast::<CdrSeq>()).length = 0;
            ops::skip_sequence_ops(insn, ops, pc)
        }
        TypeCode::Arr => skip_array_default(insn, addr, allocator, ops, pc),
        TypeCode::Uni => skip_union_default(insn, addr, data, allocator, ops, pc),
        TypeCode::Ext => {
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            skip_default_impl(addr, allocator, ops, jsr_pc);
            ops::skip_adr(insn, ops, pc)
        }
        TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
    }
}

unsafe fn skip_pl_member_default(
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc0: usize,
) {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return,
            OpKind::Adr => pc = skip_adr_default(insn, data, allocator, ops, pc),
            OpKind::Jsr => {
                skip_pl_member_default(data, allocator, ops, rel(pc, i32::from(insn_jump(insn))));
                pc += 1;
            }
            other => panic!("{:?} inside a parameter-list member", other),
        }
    }
}

pub(crate) unsafe fn skip_pl_memberlist_default(
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc0: usize,
) -> usize {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return pc,
            OpKind::Plm => {
                let mut plm_pc = rel(pc, i32::from(insn_jump(insn)));
                if ops::plm_flags(insn) & ops::FLAG_BASE != 0 {
                    debug_assert_eq!(op_kind(ops[plm_pc]), OpKind::Plc);
                    plm_pc += 1;
                    skip_pl_memberlist_default(data, allocator, ops, plm_pc);
                } else {
                    skip_pl_member_default(data, allocator, ops, plm_pc);
                }
                pc += 2;
            }
            other => panic!("{:?} inside a parameter-list member list", other),
        }
    }
}

pub(crate) unsafe fn skip_default_impl(
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc0: usize,
) -> usize {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return pc,
            OpKind::Adr => pc = skip_adr_default(insn, data, allocator, ops, pc),
            OpKind::Jsr => {
                skip_default_impl(data, allocator, ops, rel(pc, i32::from(insn_jump(insn))));
                pc += 1;
            }
            OpKind::Dlc => pc += 1,
            OpKind::Plc => pc = skip_pl_memberlist_default(data, allocator, ops, pc + 1),
            other => panic!("{:?} outside its context", other),
        }
    }
}
