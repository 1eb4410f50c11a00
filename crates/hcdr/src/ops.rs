// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The operation program: a read-only sequence of 32-bit instructions with
//! inline immediates that tells the interpreter how a type is laid out in
//! native records and on the wire.
//!
//! Instruction word layout:
//!
//! ```text
//!  31       24 23  22 21     16 15      8 7       0
//! +-----------+------+---------+---------+---------+
//! |  opcode   | szexp|  type   | subtype |  flags  |
//! +-----------+------+---------+---------+---------+
//! ```
//!
//! `szexp` is the wire-width exponent for enums and bitmasks (width =
//! `1 << szexp`). `subtype` names the element type of collections. `JSR`
//! and `PLM` carry a signed 16-bit relative jump in their low 16 bits
//! instead of subtype+flags; `KOF` carries the offset count there; `PLM`
//! keeps its flags in the type byte.
//!
//! ADR immediates, JEQ4 layout and the packed `(jmp << 16) | jsr` word are
//! documented on the builder helpers below. All jumps are in 32-bit words,
//! relative to the instruction that holds them.
//!
//! Programs are data, not trusted input: a malformed program is a bug in
//! whatever generated it, and the accessors panic on one.

/// Maximum nesting for key extraction and the recursive interpreter.
pub const MAX_NESTING_DEPTH: usize = 32;

// Opcodes (bits 24..31).
pub const OP_RTS: u32 = 0x00 << 24;
pub const OP_ADR: u32 = 0x01 << 24;
pub const OP_JSR: u32 = 0x02 << 24;
pub const OP_DLC: u32 = 0x04 << 24;
pub const OP_PLC: u32 = 0x05 << 24;
pub const OP_PLM: u32 = 0x06 << 24;
pub const OP_KOF: u32 = 0x07 << 24;
pub const OP_JEQ4: u32 = 0x08 << 24;

const OP_MASK: u32 = 0xff00_0000;
const TYPE_SZ_MASK: u32 = 0x00c0_0000;
const TYPE_SZ_SHIFT: u32 = 22;
const TYPE_MASK: u32 = 0x003f_0000;
const TYPE_SHIFT: u32 = 16;
const SUBTYPE_MASK: u32 = 0x0000_ff00;
const SUBTYPE_SHIFT: u32 = 8;
const FLAGS_MASK: u32 = 0x0000_00ff;
const JUMP16_MASK: u32 = 0x0000_ffff;
const PLM_FLAGS_MASK: u32 = 0x00ff_0000;
const PLM_FLAGS_SHIFT: u32 = 16;

// Type codes, pre-shifted for program construction.
pub const TYPE_BLN: u32 = 0x01 << TYPE_SHIFT;
pub const TYPE_1BY: u32 = 0x02 << TYPE_SHIFT;
pub const TYPE_2BY: u32 = 0x03 << TYPE_SHIFT;
pub const TYPE_4BY: u32 = 0x04 << TYPE_SHIFT;
pub const TYPE_8BY: u32 = 0x05 << TYPE_SHIFT;
pub const TYPE_STR: u32 = 0x06 << TYPE_SHIFT;
pub const TYPE_BST: u32 = 0x07 << TYPE_SHIFT;
pub const TYPE_ENU: u32 = 0x08 << TYPE_SHIFT;
pub const TYPE_BMK: u32 = 0x09 << TYPE_SHIFT;
pub const TYPE_SEQ: u32 = 0x0a << TYPE_SHIFT;
pub const TYPE_BSQ: u32 = 0x0b << TYPE_SHIFT;
pub const TYPE_ARR: u32 = 0x0c << TYPE_SHIFT;
pub const TYPE_UNI: u32 = 0x0d << TYPE_SHIFT;
pub const TYPE_STU: u32 = 0x0e << TYPE_SHIFT;
pub const TYPE_EXT: u32 = 0x0f << TYPE_SHIFT;

// Subtype codes for collections, pre-shifted.
pub const SUBTYPE_BLN: u32 = 0x01 << SUBTYPE_SHIFT;
pub const SUBTYPE_1BY: u32 = 0x02 << SUBTYPE_SHIFT;
pub const SUBTYPE_2BY: u32 = 0x03 << SUBTYPE_SHIFT;
pub const SUBTYPE_4BY: u32 = 0x04 << SUBTYPE_SHIFT;
pub const SUBTYPE_8BY: u32 = 0x05 << SUBTYPE_SHIFT;
pub const SUBTYPE_STR: u32 = 0x06 << SUBTYPE_SHIFT;
pub const SUBTYPE_BST: u32 = 0x07 << SUBTYPE_SHIFT;
pub const SUBTYPE_ENU: u32 = 0x08 << SUBTYPE_SHIFT;
pub const SUBTYPE_BMK: u32 = 0x09 << SUBTYPE_SHIFT;
pub const SUBTYPE_SEQ: u32 = 0x0a << SUBTYPE_SHIFT;
pub const SUBTYPE_BSQ: u32 = 0x0b << SUBTYPE_SHIFT;
pub const SUBTYPE_ARR: u32 = 0x0c << SUBTYPE_SHIFT;
pub const SUBTYPE_UNI: u32 = 0x0d << SUBTYPE_SHIFT;
pub const SUBTYPE_STU: u32 = 0x0e << SUBTYPE_SHIFT;

// Instruction flags (bits 0..7).
pub const FLAG_KEY: u32 = 0x01;
pub const FLAG_DEF: u32 = 0x02;
pub const FLAG_FP: u32 = 0x04;
pub const FLAG_SGN: u32 = 0x08;
pub const FLAG_MU: u32 = 0x10;
pub const FLAG_OPT: u32 = 0x20;
pub const FLAG_EXT: u32 = 0x40;
pub const FLAG_BASE: u32 = 0x80;

/// Wire-width immediate for enums/bitmasks: `type_size(4)` on an ENU/BMK
/// instruction declares a 4-byte wire representation.
#[must_use]
pub const fn type_size(bytes: u32) -> u32 {
    let exp = match bytes {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => panic!("enum/bitmask wire width must be 1, 2, 4 or 8"),
    };
    exp << TYPE_SZ_SHIFT
}

/// Pack the `(jmp << 16) | jsr` word used by composite collections, unions
/// and EXT members. `jsr` points at the element/case/base sub-program,
/// `jmp` at the next instruction after the whole block (0 = immediately
/// after the block's own words).
#[must_use]
pub const fn elem_jumps(jmp: i16, jsr: i16) -> u32 {
    ((jmp as u16 as u32) << 16) | (jsr as u16 as u32)
}

/// Build a `JSR` instruction with a signed relative jump.
#[must_use]
pub const fn jsr(rel: i16) -> u32 {
    OP_JSR | (rel as u16 as u32)
}

/// Build a `PLM` instruction: flags in the type byte, signed relative
/// program pointer in the low 16 bits. Followed by one immediate, the
/// member id.
#[must_use]
pub const fn plm(flags: u32, rel: i16) -> u32 {
    OP_PLM | (flags << PLM_FLAGS_SHIFT) | (rel as u16 as u32)
}

/// Build a `KOF` instruction; followed by `count` offsets into the nested
/// sub-programs leading to a key leaf.
#[must_use]
pub const fn kof(count: u16) -> u32 {
    OP_KOF | count as u32
}

/// Primary instruction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Rts,
    Adr,
    Jsr,
    Dlc,
    Plc,
    Plm,
    Kof,
    Jeq4,
}

#[inline]
#[must_use]
pub fn op_kind(insn: u32) -> OpKind {
    match insn & OP_MASK {
        OP_RTS => OpKind::Rts,
        OP_ADR => OpKind::Adr,
        OP_JSR => OpKind::Jsr,
        OP_DLC => OpKind::Dlc,
        OP_PLC => OpKind::Plc,
        OP_PLM => OpKind::Plm,
        OP_KOF => OpKind::Kof,
        OP_JEQ4 => OpKind::Jeq4,
        other => panic!("unknown opcode {:#010x}", other),
    }
}

/// Semantic type of an ADR/JEQ4 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeCode {
    Boolean,
    Byte1,
    Byte2,
    Byte4,
    Byte8,
    Str,
    BStr,
    Enum,
    Bitmask,
    Seq,
    BSeq,
    Arr,
    Uni,
    Stu,
    Ext,
}

impl TypeCode {
    fn from_bits(bits: u32) -> Self {
        match bits {
            0x01 => TypeCode::Boolean,
            0x02 => TypeCode::Byte1,
            0x03 => TypeCode::Byte2,
            0x04 => TypeCode::Byte4,
            0x05 => TypeCode::Byte8,
            0x06 => TypeCode::Str,
            0x07 => TypeCode::BStr,
            0x08 => TypeCode::Enum,
            0x09 => TypeCode::Bitmask,
            0x0a => TypeCode::Seq,
            0x0b => TypeCode::BSeq,
            0x0c => TypeCode::Arr,
            0x0d => TypeCode::Uni,
            0x0e => TypeCode::Stu,
            0x0f => TypeCode::Ext,
            other => panic!("unknown type code {:#x}", other),
        }
    }

    /// Fixed-width primitive (bool or 1/2/4/8-byte integer/float).
    #[must_use]
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            TypeCode::Boolean | TypeCode::Byte1 | TypeCode::Byte2 | TypeCode::Byte4 | TypeCode::Byte8
        )
    }

    #[must_use]
    pub fn is_primitive_or_enum(self) -> bool {
        self.is_primitive() || self == TypeCode::Enum
    }

    /// Types whose instructions reference sub-programs or members.
    #[must_use]
    pub fn has_subtype_or_members(self) -> bool {
        matches!(
            self,
            TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu
        )
    }

    /// Wire size of a primitive.
    #[must_use]
    pub fn primitive_size(self) -> u32 {
        match self {
            TypeCode::Boolean | TypeCode::Byte1 => 1,
            TypeCode::Byte2 => 2,
            TypeCode::Byte4 => 4,
            TypeCode::Byte8 => 8,
            other => panic!("{:?} is not a primitive", other),
        }
    }
}

#[inline]
#[must_use]
pub fn op_type(insn: u32) -> TypeCode {
    TypeCode::from_bits((insn & TYPE_MASK) >> TYPE_SHIFT)
}

#[inline]
#[must_use]
pub fn op_subtype(insn: u32) -> TypeCode {
    TypeCode::from_bits((insn & SUBTYPE_MASK) >> SUBTYPE_SHIFT)
}

/// Declared wire width (1/2/4/8) of an enum or bitmask instruction.
#[inline]
#[must_use]
pub fn op_type_size(insn: u32) -> u32 {
    1 << ((insn & TYPE_SZ_MASK) >> TYPE_SZ_SHIFT)
}

#[inline]
#[must_use]
pub fn op_flags(insn: u32) -> u32 {
    insn & FLAGS_MASK
}

#[inline]
#[must_use]
pub fn op_type_external(insn: u32) -> bool {
    insn & FLAG_EXT != 0
}

#[inline]
#[must_use]
pub fn op_type_optional(insn: u32) -> bool {
    insn & FLAG_OPT != 0
}

#[inline]
#[must_use]
pub fn op_type_base(insn: u32) -> bool {
    insn & FLAG_BASE != 0
}

/// Signed 16-bit relative jump of a `JSR` or `PLM` instruction.
#[inline]
#[must_use]
pub fn insn_jump(insn: u32) -> i16 {
    (insn & JUMP16_MASK) as u16 as i16
}

/// Flags byte of a `PLM` instruction (only `FLAG_BASE` is meaningful).
#[inline]
#[must_use]
pub fn plm_flags(insn: u32) -> u32 {
    (insn & PLM_FLAGS_MASK) >> PLM_FLAGS_SHIFT
}

/// Offset count of a `KOF` instruction.
#[inline]
#[must_use]
pub fn kof_count(insn: u32) -> u16 {
    (insn & JUMP16_MASK) as u16
}

/// `jsr` half of a packed `(jmp << 16) | jsr` word.
#[inline]
#[must_use]
pub fn jsr_of(word: u32) -> i16 {
    (word & 0xffff) as u16 as i16
}

/// `jmp` half of a packed `(jmp << 16) | jsr` word.
#[inline]
#[must_use]
pub fn jmp_of(word: u32) -> i16 {
    (word >> 16) as u16 as i16
}

/// Apply a signed relative jump to a program counter.
#[inline]
#[must_use]
pub(crate) fn rel(pc: usize, jump: i32) -> usize {
    let target = pc as i64 + i64::from(jump);
    debug_assert!(target >= 0);
    target as usize
}

/// Is this sequence type bounded (one extra bound immediate)?
#[inline]
#[must_use]
pub fn seq_is_bounded(tc: TypeCode) -> bool {
    tc == TypeCode::BSeq
}

/// Whether a collection element gets a DHEADER under `xcdrv`.
#[inline]
#[must_use]
pub fn is_dheader_needed(subtype: TypeCode, xcdrv: crate::ser::XcdrVersion) -> bool {
    xcdrv == crate::ser::XcdrVersion::Xcdr2 && !subtype.is_primitive()
}

/// Wire size of a collection element.
pub fn collection_elem_size(insn: u32, ops: &[u32], pc: usize) -> u32 {
    let subtype = op_subtype(insn);
    match subtype {
        t if t.is_primitive() => t.primitive_size(),
        TypeCode::Enum | TypeCode::Bitmask => op_type_size(insn),
        _ => {
            let bound_op = usize::from(op_type(insn) == TypeCode::BSeq);
            match op_type(insn) {
                TypeCode::Seq | TypeCode::BSeq => ops[pc + 2 + bound_op],
                TypeCode::Arr => ops[pc + 4],
                other => panic!("{:?} is not a collection", other),
            }
        }
    }
}

/// Native (in-record) size of the value an ADR instruction addresses.
/// Used to materialize `@external` and optional members.
pub fn adr_native_size(insn: u32, ops: &[u32], pc: usize) -> u32 {
    let ptr = std::mem::size_of::<*mut u8>() as u32;
    match op_type(insn) {
        t if t.is_primitive() => t.primitive_size(),
        TypeCode::Str => ptr,
        TypeCode::BStr => ops[pc + 2],
        TypeCode::Enum => 4,
        TypeCode::Bitmask => op_type_size(insn),
        TypeCode::Seq | TypeCode::BSeq => std::mem::size_of::<crate::codec::CdrSeq>() as u32,
        TypeCode::Arr => {
            let num = ops[pc + 2];
            let subtype = op_subtype(insn);
            match subtype {
                t if t.is_primitive() => num * t.primitive_size(),
                TypeCode::Str => num * ptr,
                TypeCode::Enum => num * 4,
                TypeCode::Bitmask => num * op_type_size(insn),
                TypeCode::BStr => num * ops[pc + 4],
                _ => num * ops[pc + 4],
            }
        }
        TypeCode::Ext => {
            assert!(op_type_external(insn), "EXT without external storage has no native size");
            ops[pc + 3]
        }
        other => panic!("no native size for {:?}", other),
    }
}

/// Native size of a JEQ4 case value, for external case materialization.
///
/// Composite case types other than sequences would need a size immediate
/// the arm does not carry; external storage for those is not supported.
pub fn jeq4_native_size(insn: u32, extra: u32) -> u32 {
    let ptr = std::mem::size_of::<*mut u8>() as u32;
    match op_type(insn) {
        t if t.is_primitive() => t.primitive_size(),
        TypeCode::Str => ptr,
        TypeCode::BStr => extra,
        TypeCode::Enum => 4,
        TypeCode::Seq | TypeCode::BSeq => std::mem::size_of::<crate::codec::CdrSeq>() as u32,
        other => panic!("external union case of type {:?} is not supported", other),
    }
}

/// Advance past a sequence instruction (no payload interpretation).
pub fn skip_sequence_ops(insn: u32, ops: &[u32], pc: usize) -> usize {
    let bound_op = usize::from(seq_is_bounded(op_type(insn)));
    match op_subtype(insn) {
        TypeCode::Boolean
        | TypeCode::Byte1
        | TypeCode::Byte2
        | TypeCode::Byte4
        | TypeCode::Byte8 => pc + 2 + bound_op,
        TypeCode::Str => pc + 2 + bound_op,
        TypeCode::BStr | TypeCode::Enum => pc + 3 + bound_op,
        TypeCode::Bitmask => pc + 4 + bound_op,
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let jmp = jmp_of(ops[pc + 3 + bound_op]);
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else {
                pc + 4 + bound_op
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as a sequence element"),
    }
}

/// Advance past an array instruction.
pub fn skip_array_ops(insn: u32, ops: &[u32], pc: usize) -> usize {
    debug_assert_eq!(op_type(insn), TypeCode::Arr);
    match op_subtype(insn) {
        TypeCode::Boolean
        | TypeCode::Byte1
        | TypeCode::Byte2
        | TypeCode::Byte4
        | TypeCode::Byte8 => pc + 3,
        TypeCode::Str => pc + 3,
        TypeCode::Enum => pc + 4,
        TypeCode::BStr | TypeCode::Bitmask => pc + 5,
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu => {
            let jmp = jmp_of(ops[pc + 3]);
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else {
                pc + 5
            }
        }
        TypeCode::Ext => panic!("EXT is not allowed as an array element"),
    }
}

/// Advance past any ADR instruction.
pub fn skip_adr(insn: u32, ops: &[u32], pc: usize) -> usize {
    match op_type(insn) {
        TypeCode::Boolean
        | TypeCode::Byte1
        | TypeCode::Byte2
        | TypeCode::Byte4
        | TypeCode::Byte8 => pc + 2,
        TypeCode::Str => pc + 2,
        TypeCode::BStr | TypeCode::Enum => pc + 3,
        TypeCode::Bitmask => pc + 4,
        TypeCode::Seq | TypeCode::BSeq => skip_sequence_ops(insn, ops, pc),
        TypeCode::Arr => skip_array_ops(insn, ops, pc),
        TypeCode::Uni => {
            let jmp = jmp_of(ops[pc + 3]);
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else {
                pc + 4
            }
        }
        TypeCode::Ext => {
            let jmp = jmp_of(ops[pc + 2]);
            if jmp != 0 {
                rel(pc, i32::from(jmp))
            } else if op_type_external(insn) {
                pc + 4
            } else {
                pc + 3
            }
        }
        TypeCode::Stu => panic!("STU is only supported as a collection subtype"),
    }
}

/// Find the JEQ4 arm matching `disc`. Returns the arm's pc, falling back to
/// the default arm (always last) when the union has one.
pub fn find_union_case(ops: &[u32], uni_pc: usize, disc: u32) -> Option<usize> {
    debug_assert_eq!(op_type(ops[uni_pc]), TypeCode::Uni);
    let has_default = ops[uni_pc] & FLAG_DEF != 0;
    let numcases = ops[uni_pc + 2];
    debug_assert!(numcases > 0);
    let mut jeq_pc = rel(uni_pc, i32::from(jsr_of(ops[uni_pc + 3])));
    for _ in 0..numcases - u32::from(has_default) {
        debug_assert_eq!(op_kind(ops[jeq_pc]), OpKind::Jeq4);
        if ops[jeq_pc + 1] == disc {
            return Some(jeq_pc);
        }
        jeq_pc += 4;
    }
    has_default.then_some(jeq_pc)
}

/// Sub-program pc of a JEQ4 arm, if the case type needs one.
pub fn jeq4_sub_program(ops: &[u32], jeq_pc: usize) -> usize {
    let insn = ops[jeq_pc];
    debug_assert!(matches!(
        op_type(insn),
        TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::Bitmask
    ));
    rel(jeq_pc, ops[jeq_pc + 3] as i32)
}

fn countops1(ops: &[u32], pc0: usize, end: &mut usize) {
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => {
                pc += 1;
                break;
            }
            OpKind::Adr => {
                let next = skip_adr(insn, ops, pc);
                match op_type(insn) {
                    TypeCode::Seq | TypeCode::BSeq => {
                        let bound_op = usize::from(op_type(insn) == TypeCode::BSeq);
                        if op_subtype(insn).has_subtype_or_members() {
                            let target = rel(pc, i32::from(jsr_of(ops[pc + 3 + bound_op])));
                            if target > pc {
                                countops1(ops, target, end);
                            }
                        }
                    }
                    TypeCode::Arr => {
                        if op_subtype(insn).has_subtype_or_members() {
                            let target = rel(pc, i32::from(jsr_of(ops[pc + 3])));
                            if target > pc {
                                countops1(ops, target, end);
                            }
                        }
                    }
                    TypeCode::Uni => {
                        let numcases = ops[pc + 2];
                        let mut jeq_pc = rel(pc, i32::from(jsr_of(ops[pc + 3])));
                        for _ in 0..numcases {
                            if op_type(ops[jeq_pc]).has_subtype_or_members()
                                || op_type(ops[jeq_pc]) == TypeCode::Bitmask
                            {
                                countops1(ops, jeq4_sub_program(ops, jeq_pc), end);
                            }
                            jeq_pc += 4;
                        }
                        if jeq_pc > *end {
                            *end = jeq_pc;
                        }
                    }
                    TypeCode::Ext => {
                        let target = rel(pc, i32::from(jsr_of(ops[pc + 2])));
                        if target > pc {
                            countops1(ops, target, end);
                        }
                    }
                    _ => {}
                }
                pc = next;
            }
            OpKind::Jsr => {
                let target = rel(pc, i32::from(insn_jump(insn)));
                if target > pc {
                    countops1(ops, target, end);
                }
                pc += 1;
            }
            OpKind::Dlc | OpKind::Plc => pc += 1,
            OpKind::Plm => {
                let target = rel(pc, i32::from(insn_jump(insn)));
                if target > pc {
                    countops1(ops, target, end);
                }
                pc += 2;
            }
            OpKind::Kof | OpKind::Jeq4 => panic!("stray {:?} in program body", op_kind(insn)),
        }
    }
    if pc > *end {
        *end = pc;
    }
}

/// Program length in 32-bit words, covering key-offset programs referenced
/// from `keys`.
pub fn count_ops(ops: &[u32], keys: &[crate::desc::KeyDesc]) -> u32 {
    let mut end = 0usize;
    countops1(ops, 0, &mut end);
    for k in keys {
        let pc = k.ops_offs as usize;
        if op_kind(ops[pc]) == OpKind::Kof {
            let span = pc + 1 + kof_count(ops[pc]) as usize;
            if span > end {
                end = span;
            }
        }
    }
    end as u32
}

fn min_xcdr1(ops: &[u32], pc0: usize) -> bool {
    // true when XCDR1 suffices for the sub-program at pc0
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return true,
            OpKind::Dlc | OpKind::Plc => return false,
            OpKind::Jsr => {
                if !min_xcdr1(ops, rel(pc, i32::from(insn_jump(insn)))) {
                    return false;
                }
                pc += 1;
            }
            OpKind::Adr => {
                if op_type_optional(insn) {
                    return false;
                }
                if matches!(op_type(insn), TypeCode::Enum) && op_type_size(insn) != 4 {
                    return false;
                }
                if matches!(op_type(insn), TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr)
                    && op_subtype(insn) == TypeCode::Enum
                    && op_type_size(insn) != 4
                {
                    return false;
                }
                match op_type(insn) {
                    TypeCode::Ext => {
                        if !min_xcdr1(ops, rel(pc, i32::from(jsr_of(ops[pc + 2])))) {
                            return false;
                        }
                    }
                    TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr
                        if op_subtype(insn).has_subtype_or_members() =>
                    {
                        let bound_op = usize::from(op_type(insn) == TypeCode::BSeq);
                        let word = if op_type(insn) == TypeCode::Arr {
                            ops[pc + 3]
                        } else {
                            ops[pc + 3 + bound_op]
                        };
                        if !min_xcdr1(ops, rel(pc, i32::from(jsr_of(word)))) {
                            return false;
                        }
                    }
                    TypeCode::Uni => {
                        let numcases = ops[pc + 2];
                        let mut jeq_pc = rel(pc, i32::from(jsr_of(ops[pc + 3])));
                        for _ in 0..numcases {
                            if (op_type(ops[jeq_pc]).has_subtype_or_members()
                                || op_type(ops[jeq_pc]) == TypeCode::Bitmask)
                                && !min_xcdr1(ops, jeq4_sub_program(ops, jeq_pc))
                            {
                                return false;
                            }
                            jeq_pc += 4;
                        }
                    }
                    _ => {}
                }
                pc = skip_adr(insn, ops, pc);
            }
            OpKind::Plm => return false,
            OpKind::Kof | OpKind::Jeq4 => panic!("stray {:?} in program body", op_kind(insn)),
        }
    }
}

/// The lowest XCDR version able to represent this program on the wire.
pub fn minimum_xcdr_version(ops: &[u32]) -> crate::ser::XcdrVersion {
    if min_xcdr1(ops, 0) {
        crate::ser::XcdrVersion::Xcdr1
    } else {
        crate::ser::XcdrVersion::Xcdr2
    }
}

/// Extensibility of the top-level type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extensibility {
    Final,
    Appendable,
    Mutable,
}

#[must_use]
pub fn extensibility(ops: &[u32]) -> Extensibility {
    match op_kind(ops[0]) {
        OpKind::Dlc => Extensibility::Appendable,
        OpKind::Plc => Extensibility::Mutable,
        _ => Extensibility::Final,
    }
}

fn nesting1(ops: &[u32], pc0: usize, depth: u32, max: &mut u32) {
    if depth > *max {
        *max = depth;
    }
    let mut pc = pc0;
    loop {
        let insn = ops[pc];
        match op_kind(insn) {
            OpKind::Rts => return,
            OpKind::Dlc | OpKind::Plc => pc += 1,
            OpKind::Jsr => {
                nesting1(ops, rel(pc, i32::from(insn_jump(insn))), depth, max);
                pc += 1;
            }
            OpKind::Plm => {
                nesting1(ops, rel(pc, i32::from(insn_jump(insn))), depth + 1, max);
                pc += 2;
            }
            OpKind::Adr => {
                match op_type(insn) {
                    TypeCode::Seq | TypeCode::BSeq | TypeCode::Arr
                        if op_subtype(insn).has_subtype_or_members() =>
                    {
                        let bound_op = usize::from(op_type(insn) == TypeCode::BSeq);
                        let word = if op_type(insn) == TypeCode::Arr {
                            ops[pc + 3]
                        } else {
                            ops[pc + 3 + bound_op]
                        };
                        nesting1(ops, rel(pc, i32::from(jsr_of(word))), depth + 1, max);
                    }
                    TypeCode::Uni => {
                        let numcases = ops[pc + 2];
                        let mut jeq_pc = rel(pc, i32::from(jsr_of(ops[pc + 3])));
                        for _ in 0..numcases {
                            if op_type(ops[jeq_pc]).has_subtype_or_members()
                                || op_type(ops[jeq_pc]) == TypeCode::Bitmask
                            {
                                nesting1(ops, jeq4_sub_program(ops, jeq_pc), depth + 1, max);
                            }
                            jeq_pc += 4;
                        }
                    }
                    TypeCode::Ext => {
                        nesting1(ops, rel(pc, i32::from(jsr_of(ops[pc + 2]))), depth + 1, max);
                    }
                    _ => {}
                }
                pc = skip_adr(insn, ops, pc);
            }
            OpKind::Kof | OpKind::Jeq4 => panic!("stray {:?} in program body", op_kind(insn)),
        }
    }
}

/// Maximum nesting depth of the type described by `ops`.
#[must_use]
pub fn nesting_depth(ops: &[u32]) -> u32 {
    let mut max = 1;
    nesting1(ops, 0, 1, &mut max);
    max
}

/// The key-legality predicate: key-flagged ADRs may only name primitive-ish
/// leaves, primitive/enum/bitmask arrays, bounded strings, or EXT members
/// whose sub-program is reached through a key-offset path.
#[must_use]
pub fn insn_key_ok(insn: u32) -> bool {
    op_kind(insn) == OpKind::Adr
        && (insn & FLAG_KEY != 0)
        && (!op_type(insn).has_subtype_or_members()
            || (op_type(insn) == TypeCode::Arr
                && (op_subtype(insn).is_primitive_or_enum() || op_subtype(insn) == TypeCode::Bitmask))
            || op_type(insn) == TypeCode::Ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::XcdrVersion;

    #[test]
    fn test_field_extraction() {
        let insn = OP_ADR | TYPE_ENU | type_size(2) | FLAG_KEY | FLAG_MU;
        assert_eq!(op_kind(insn), OpKind::Adr);
        assert_eq!(op_type(insn), TypeCode::Enum);
        assert_eq!(op_type_size(insn), 2);
        assert_eq!(op_flags(insn), FLAG_KEY | FLAG_MU);
    }

    #[test]
    fn test_signed_jumps() {
        assert_eq!(insn_jump(jsr(-3)), -3);
        assert_eq!(insn_jump(jsr(200)), 200);
        let w = elem_jumps(9, -4);
        assert_eq!(jmp_of(w), 9);
        assert_eq!(jsr_of(w), -4);
    }

    #[test]
    fn test_skip_adr_word_counts() {
        let ops = [OP_ADR | TYPE_4BY, 0, OP_RTS];
        assert_eq!(skip_adr(ops[0], &ops, 0), 2);
        let ops = [OP_ADR | TYPE_BST, 0, 32, OP_RTS];
        assert_eq!(skip_adr(ops[0], &ops, 0), 3);
        let ops = [OP_ADR | TYPE_BMK | type_size(1), 0, 0, 0xff, OP_RTS];
        assert_eq!(skip_adr(ops[0], &ops, 0), 4);
        let ops = [OP_ADR | TYPE_SEQ | SUBTYPE_1BY, 0, OP_RTS];
        assert_eq!(skip_adr(ops[0], &ops, 0), 2);
        let ops = [OP_ADR | TYPE_BSQ | SUBTYPE_2BY, 0, 10, OP_RTS];
        assert_eq!(skip_adr(ops[0], &ops, 0), 3);
    }

    #[test]
    fn test_find_union_case_with_default() {
        // union on u8, cases 1 and 2, default last
        #[rustfmt::skip]
        let ops = [
            OP_ADR | TYPE_UNI | SUBTYPE_1BY | FLAG_DEF, 0, 3, elem_jumps(0, 4),
            OP_JEQ4 | TYPE_4BY, 1, 4, 0,
            OP_JEQ4 | TYPE_2BY, 2, 4, 0,
            OP_JEQ4 | TYPE_1BY, 0, 4, 0,
            OP_RTS,
        ];
        assert_eq!(find_union_case(&ops, 0, 1), Some(4));
        assert_eq!(find_union_case(&ops, 0, 2), Some(8));
        assert_eq!(find_union_case(&ops, 0, 77), Some(12)); // default arm
    }

    #[test]
    fn test_find_union_case_without_default() {
        #[rustfmt::skip]
        let ops = [
            OP_ADR | TYPE_UNI | SUBTYPE_1BY, 0, 1, elem_jumps(0, 4),
            OP_JEQ4 | TYPE_4BY, 1, 4, 0,
            OP_RTS,
        ];
        assert_eq!(find_union_case(&ops, 0, 1), Some(4));
        assert_eq!(find_union_case(&ops, 0, 2), None);
    }

    #[test]
    fn test_extensibility() {
        assert_eq!(extensibility(&[OP_DLC, OP_RTS]), Extensibility::Appendable);
        assert_eq!(extensibility(&[OP_PLC, OP_RTS]), Extensibility::Mutable);
        assert_eq!(extensibility(&[OP_ADR | TYPE_1BY, 0, OP_RTS]), Extensibility::Final);
    }

    #[test]
    fn test_minimum_xcdr_version() {
        let plain = [OP_ADR | TYPE_4BY, 0, OP_RTS];
        assert_eq!(minimum_xcdr_version(&plain), XcdrVersion::Xcdr1);
        let optional = [OP_ADR | TYPE_4BY | FLAG_OPT, 0, OP_RTS];
        assert_eq!(minimum_xcdr_version(&optional), XcdrVersion::Xcdr2);
        let appendable = [OP_DLC, OP_ADR | TYPE_4BY, 0, OP_RTS];
        assert_eq!(minimum_xcdr_version(&appendable), XcdrVersion::Xcdr2);
        let small_enum = [OP_ADR | TYPE_ENU | type_size(2), 0, 3, OP_RTS];
        assert_eq!(minimum_xcdr_version(&small_enum), XcdrVersion::Xcdr2);
        let wide_enum = [OP_ADR | TYPE_ENU | type_size(4), 0, 3, OP_RTS];
        assert_eq!(minimum_xcdr_version(&wide_enum), XcdrVersion::Xcdr1);
    }

    #[test]
    fn test_count_ops_includes_subprograms() {
        #[rustfmt::skip]
        let ops = [
            OP_ADR | TYPE_EXT, 0, elem_jumps(3, 4), OP_RTS,
            OP_ADR | TYPE_4BY, 0, OP_RTS,
        ];
        assert_eq!(count_ops(&ops, &[]), 7);
    }

    #[test]
    fn test_nesting_depth() {
        let flat = [OP_ADR | TYPE_4BY, 0, OP_RTS];
        assert_eq!(nesting_depth(&flat), 1);
        #[rustfmt::skip]
        let nested = [
            OP_ADR | TYPE_EXT, 0, elem_jumps(3, 4), OP_RTS,
            OP_ADR | TYPE_4BY, 0, OP_RTS,
        ];
        assert_eq!(nesting_depth(&nested), 2);
    }

    #[test]
    fn test_key_legality() {
        assert!(insn_key_ok(OP_ADR | TYPE_4BY | FLAG_KEY));
        assert!(insn_key_ok(OP_ADR | TYPE_ARR | SUBTYPE_2BY | FLAG_KEY));
        assert!(insn_key_ok(OP_ADR | TYPE_EXT | FLAG_KEY));
        assert!(!insn_key_ok(OP_ADR | TYPE_SEQ | SUBTYPE_1BY | FLAG_KEY));
        assert!(!insn_key_ok(OP_ADR | TYPE_4BY));
    }
}
