// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Recursive release of everything a native record owns: strings, sequence
//! buffers and pointer-indirected members. Freed pointers are nulled so the
//! record can be reused or dropped twice without harm.

use crate::alloc::CdrAllocator;
use crate::codec::read::needs_external_storage;
use crate::codec::{load, store, CdrSeq};
use crate::ops::{
    self, find_union_case, insn_jump, jeq4_sub_program, op_kind, op_subtype, op_type,
    op_type_external, rel, skip_adr, OpKind, TypeCode,
};

unsafe fn free_seq(
    addr: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> usize {
    let seq = &mut *addr.cast::<CdrSeq>();
    let num = seq.maximum.max(seq.length);
    let subtype = op_subtype(insn);
    let bound_op = usize::from(ops::seq_is_bounded(op_type(insn)));

    let next = if (seq.release && num > 0) || !subtype.is_primitive() {
        match subtype {
            TypeCode::Boolean
            | TypeCode::Byte1
            | TypeCode::Byte2
            | TypeCode::Byte4
            | TypeCode::Byte8 => pc + 2 + bound_op,
            TypeCode::BStr | TypeCode::Enum => pc + 3 + bound_op,
            TypeCode::Bitmask => pc + 4 + bound_op,
            TypeCode::Str => {
                let ptr_size = std::mem::size_of::<*mut u8>() as u32;
                if seq.release {
                    for i in 0..num {
                        allocator.free(load::<*mut u8>(seq.buffer, i * ptr_size));
                    }
                }
                pc + 2 + bound_op
            }
            TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
                let elem_size = ops[pc + 2 + bound_op];
                let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3 + bound_op])));
                let jmp = ops::jmp_of(ops[pc + 3 + bound_op]);
                if seq.release {
                    for i in 0..num {
                        free_sample_impl(seq.buffer.add((i * elem_size) as usize), allocator, ops, jsr_pc);
                    }
                }
                if jmp != 0 {
                    rel(pc, i32::from(jmp))
                } else {
                    pc + 4 + bound_op
                }
            }
            TypeCode::Ext => panic!("EXT is not allowed as a sequence element"),
        }
    } else {
        ops::skip_sequence_ops(insn, ops, pc)
    };

    if seq.release {
        allocator.free(seq.buffer);
        seq.maximum = 0;
        seq.length = 0;
        seq.buffer = std::ptr::null_mut();
    }
    next
}

unsafe fn free_arr(
    addr: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> usize {
    let num = ops[pc + 2];
    match op_subtype(insn) {
        TypeCode::Str => {
            let ptr_size = std::mem::size_of::<*mut u8>() as u32;
            for i in 0..num {
                allocator.free(load::<*mut u8>(addr, i * ptr_size));
                store::<*mut u8>(addr, i * ptr_size, std::ptr::null_mut());
            }
        }
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let elem_size = ops[pc + 4];
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 3])));
            for i in 0..num {
                free_sample_impl(addr.add((i * elem_size) as usize), allocator, ops, jsr_pc);
            }
        }
        _ => {}
    }
    ops::skip_array_ops(insn, ops, pc)
}

unsafe fn free_uni(
    disc_addr: *mut u8,
    base: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
    insn: u32,
) -> usize {
    let disc: u32 = match op_subtype(insn) {
        TypeCode::Boolean | TypeCode::Byte1 => u32::from(load::<u8>(disc_addr, 0)),
        TypeCode::Byte2 => u32::from(load::<u16>(disc_addr, 0)),
        TypeCode::Byte4 | TypeCode::Enum => load::<u32>(disc_addr, 0),
        other => panic!("{:?} cannot discriminate a union", other),
    };
    let next = skip_adr(insn, ops, pc);
    let Some(jeq_pc) = find_union_case(ops, pc, disc) else {
        return next;
    };
    let jeq_insn = ops[jeq_pc];
    let mut valaddr = base.add(ops[jeq_pc + 2] as usize);
    if op_type_external(jeq_insn) {
        valaddr = load::<*mut u8>(valaddr, 0);
        if valaddr.is_null() {
            return next;
        }
    }
    match op_type(jeq_insn) {
        TypeCode::Str => {
            allocator.free(load::<*mut u8>(valaddr, 0));
            store::<*mut u8>(valaddr, 0, std::ptr::null_mut());
        }
        TypeCode::Seq
        | TypeCode::BSeq
        | TypeCode::Arr
        | TypeCode::Uni
        | TypeCode::Stu
        | TypeCode::Bitmask => {
            free_sample_impl(valaddr, allocator, ops, jeq4_sub_program(ops, jeq_pc));
        }
        _ => {}
    }
    if op_type_external(jeq_insn) {
        let slot = base.add(ops[jeq_pc + 2] as usize).cast::<*mut u8>();
        allocator.free(*slot);
        *slot = std::ptr::null_mut();
    }
    next
}

unsafe fn free_pl(data: *mut u8, allocator: &dyn CdrAllocator, ops: &[u32], pc0: usize) -> usize {
    debug_assert_eq!(op_kind(ops[pc0]), OpKind::Plc);
    let mut pc = pc0 + 1;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return pc,
            OpKind::Plm => {
                let plm_pc = rel(pc, i32::from(insn_jump(insn)));
                if ops::plm_flags(insn) & ops::FLAG_BASE != 0 {
                    free_pl(data, allocator, ops, plm_pc);
                } else {
                    free_sample_impl(data, allocator, ops, plm_pc);
                }
                pc += 2;
            }
            other => panic!("{:?} inside a parameter-list member list", other),
        }
    }
}

unsafe fn free_adr_value(
    insn: u32,
    addr: *mut u8,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
) -> usize {
    match op_type(insn) {
        TypeCode::Str => {
            allocator.free(load::<*mut u8>(addr, 0));
            store::<*mut u8>(addr, 0, std::ptr::null_mut());
            pc + 2
        }
        TypeCode::Seq | TypeCode::BSeq => free_seq(addr, allocator, ops, pc, insn),
        TypeCode::Arr => free_arr(addr, allocator, ops, pc, insn),
        TypeCode::Uni => free_uni(addr, data, allocator, ops, pc, insn),
        TypeCode::Ext => {
            let jsr_pc = rel(pc, i32::from(ops::jsr_of(ops[pc + 2])));
            free_sample_impl(addr, allocator, ops, jsr_pc);
            skip_adr(insn, ops, pc)
        }
        TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
        _ => skip_adr(insn, ops, pc),
    }
}

/// Release one ADR member, nulling pointer-indirected storage.
pub(crate) unsafe fn free_sample_adr(
    insn: u32,
    data: *mut u8,
    allocator: &dyn CdrAllocator,
    ops: &[u32],
    pc: usize,
) -> usize {
    if !needs_external_storage(insn) {
        let addr = data.add(ops[pc + 1] as usize);
        free_adr_value(insn, addr, data, allocator, ops, pc)
    } else {
        let slot = data.add(ops[pc + 1] as usize).cast::<*mut u8>();
        let addr = *slot;
        if addr.is_null() {
            skip_adr(insn, ops, pc)
        } else {
            let next = free_adr_value(insn, addr, data, allocator, ops, pc);
            allocator.free(*slot);
            *slot = std::ptr::null_mut();
            next
        }
    }
}

pub(crate) unsafe fn free_sample_impl(
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
            OpKind::Adr => pc = free_sample_adr(insn, data, allocator, ops, pc),
            OpKind::Jsr => {
                free_sample_impl(data, allocator, ops, rel(pc, i32::from(insn_jump(insn))));
                pc += 1;
            }
            OpKind::Dlc => pc += 1,
            OpKind::Plc => pc = free_pl(data, allocator, ops, pc),
            other => panic!("{:?} outside its context", other),
        }
    }
}

/// Release everything `data` owns according to `ops`.
pub(crate) unsafe fn free_sample_members(data: *mut u8, allocator: &dyn CdrAllocator, ops: &[u32]) {
    free_sample_impl(data, allocator, ops, 0);
}
