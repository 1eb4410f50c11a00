// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Wire-format golden vectors: each test encodes a known sample and checks
// the serialized bytes against the DDS-XTypes reference layout, in both
// byte orders. These byte strings are load-bearing for interoperability;
// do not regenerate them from the implementation under test.

mod common;

use std::mem::offset_of;

use common::{write_be, write_le, A};
use hcdr::ops::{
    elem_jumps, plm, OP_ADR, OP_JEQ4, OP_PLC, OP_RTS, SUBTYPE_1BY, SUBTYPE_4BY,
    SUBTYPE_STU, TYPE_2BY, TYPE_4BY, TYPE_SEQ, TYPE_STR, TYPE_UNI, FLAG_MU, FLAG_SGN,
};
use hcdr::{CdrDesc, CdrSeq, XcdrVersion};

// -- 1. primitive struct ----------------------------------------------------

#[repr(C)]
struct PrimStruct {
    a: i32,
    b: u16,
}

fn prim_struct_desc() -> CdrDesc {
    let ops = vec![
        OP_ADR | TYPE_4BY | FLAG_SGN,
        offset_of!(PrimStruct, a) as u32,
        OP_ADR | TYPE_2BY,
        offset_of!(PrimStruct, b) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<PrimStruct>() as u32, 4, 0, vec![], ops)
}

#[test]
fn test_primitive_struct_xcdr1() {
    let desc = prim_struct_desc();
    let s = PrimStruct { a: 0x0102_0304, b: 0x0506 };
    let p = std::ptr::addr_of!(s).cast();
    assert_eq!(
        write_le(&desc, p, XcdrVersion::Xcdr1),
        [0x04, 0x03, 0x02, 0x01, 0x06, 0x05]
    );
    assert_eq!(
        write_be(&desc, p, XcdrVersion::Xcdr1),
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]
    );
}

// -- 2. string struct -------------------------------------------------------

#[repr(C)]
struct StringStruct {
    s: *mut u8,
}

fn string_struct_desc() -> CdrDesc {
    let ops = vec![OP_ADR | TYPE_STR, offset_of!(StringStruct, s) as u32, OP_RTS];
    CdrDesc::new(std::mem::size_of::<StringStruct>() as u32, 8, 0, vec![], ops)
}

#[test]
fn test_string_struct_xcdr1() {
    let desc = string_struct_desc();
    let mut s = StringStruct { s: common::cstr("hi") };
    let p = std::ptr::addr_of!(s).cast();
    assert_eq!(
        write_le(&desc, p, XcdrVersion::Xcdr1),
        [0x03, 0x00, 0x00, 0x00, b'h', b'i', 0x00]
    );
    assert_eq!(
        write_be(&desc, p, XcdrVersion::Xcdr1),
        [0x00, 0x00, 0x00, 0x03, b'h', b'i', 0x00]
    );
    unsafe { hcdr::free_sample(std::ptr::addr_of_mut!(s).cast(), &A, &desc.ops) };
}

// -- 3. sequence of primitives ----------------------------------------------

#[repr(C)]
struct U32SeqStruct {
    xs: CdrSeq,
}

fn u32_seq_desc() -> CdrDesc {
    let ops = vec![
        OP_ADR | TYPE_SEQ | SUBTYPE_4BY,
        offset_of!(U32SeqStruct, xs) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<U32SeqStruct>() as u32, 8, 0, vec![], ops)
}

#[test]
fn test_u32_sequence_xcdr2_has_no_dheader() {
    let desc = u32_seq_desc();
    let mut elems: [u32; 3] = [1, 2, 3];
    let s = U32SeqStruct {
        xs: CdrSeq {
            maximum: 3,
            length: 3,
            buffer: elems.as_mut_ptr().cast(),
            release: false,
        },
    };
    let p = std::ptr::addr_of!(s).cast();
    assert_eq!(
        write_le(&desc, p, XcdrVersion::Xcdr2),
        [3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
    );
    assert_eq!(
        write_be(&desc, p, XcdrVersion::Xcdr2),
        [0, 0, 0, 3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]
    );
}

// -- 4. sequence of structs -------------------------------------------------

#[repr(C)]
struct Inner {
    x: u8,
}

#[repr(C)]
struct InnerSeqStruct {
    xs: CdrSeq,
}

fn inner_seq_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        // [0] sequence of Inner, element size 1, element program at 5
        OP_ADR | TYPE_SEQ | SUBTYPE_STU,
        offset_of!(InnerSeqStruct, xs) as u32,
        std::mem::size_of::<Inner>() as u32,
        elem_jumps(4, 5),
        OP_RTS,
        // [5] Inner
        OP_ADR | hcdr::ops::TYPE_1BY, offset_of!(Inner, x) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<InnerSeqStruct>() as u32, 8, 0, vec![], ops)
}

#[test]
fn test_struct_sequence_xcdr2_dheader() {
    let desc = inner_seq_desc();
    let mut elems = [Inner { x: 1 }, Inner { x: 2 }];
    let s = InnerSeqStruct {
        xs: CdrSeq {
            maximum: 2,
            length: 2,
            buffer: elems.as_mut_ptr().cast(),
            release: false,
        },
    };
    let p = std::ptr::addr_of!(s).cast();
    // DHEADER = count word + two one-byte elements = 6
    assert_eq!(
        write_le(&desc, p, XcdrVersion::Xcdr2),
        [6, 0, 0, 0, 2, 0, 0, 0, 1, 2]
    );
    assert_eq!(
        write_be(&desc, p, XcdrVersion::Xcdr2),
        [0, 0, 0, 6, 0, 0, 0, 2, 1, 2]
    );
}

// -- 5. union ---------------------------------------------------------------

#[repr(C)]
struct UnionSample {
    d: u8,
    x: i32,
    y: u16,
}

fn union_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        // [0] union on u8 discriminant, two cases, no default
        OP_ADR | TYPE_UNI | SUBTYPE_1BY,
        offset_of!(UnionSample, d) as u32,
        2,
        elem_jumps(4, 5),
        OP_RTS,
        // [5] case 1: i32
        OP_JEQ4 | TYPE_4BY | FLAG_SGN, 1, offset_of!(UnionSample, x) as u32, 0,
        // [9] case 2: u16
        OP_JEQ4 | TYPE_2BY, 2, offset_of!(UnionSample, y) as u32, 0,
    ];
    CdrDesc::new(
        std::mem::size_of::<UnionSample>() as u32,
        4,
        hcdr::desc::DESC_FLAG_CONTAINS_UNION,
        vec![],
        ops,
    )
}

#[test]
fn test_union_selected_case_xcdr1() {
    let desc = union_desc();
    let s = UnionSample { d: 1, x: 7, y: 0 };
    let p = std::ptr::addr_of!(s).cast();
    // three bytes of alignment padding between discriminant and value
    assert_eq!(
        write_le(&desc, p, XcdrVersion::Xcdr1),
        [0x01, 0, 0, 0, 0x07, 0, 0, 0]
    );
    assert_eq!(
        write_be(&desc, p, XcdrVersion::Xcdr1),
        [0x01, 0, 0, 0, 0, 0, 0, 0x07]
    );
}

#[test]
fn test_union_second_case_xcdr1() {
    let desc = union_desc();
    let s = UnionSample { d: 2, y: 0x0303, x: 0 };
    let p = std::ptr::addr_of!(s).cast();
    assert_eq!(write_le(&desc, p, XcdrVersion::Xcdr1), [0x02, 0, 0x03, 0x03]);
}

#[test]
fn test_union_unmatched_discriminant_writes_nothing() {
    let desc = union_desc();
    let s = UnionSample { d: 9, x: 7, y: 7 };
    let p = std::ptr::addr_of!(s).cast();
    assert_eq!(write_le(&desc, p, XcdrVersion::Xcdr1), [0x09]);
}

// -- 6. mutable struct ------------------------------------------------------

#[repr(C)]
struct MutableSample {
    a: u32,
    b: u16,
}

fn mutable_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_PLC,                 // [0]
        plm(0, 5), 10,          // [1] member a at [6], id 10
        plm(0, 6), 20,          // [3] member b at [9], id 20
        OP_RTS,                 // [5]
        OP_ADR | TYPE_4BY | FLAG_MU, offset_of!(MutableSample, a) as u32, OP_RTS, // [6]
        OP_ADR | TYPE_2BY, offset_of!(MutableSample, b) as u32, OP_RTS,           // [9]
    ];
    CdrDesc::new(std::mem::size_of::<MutableSample>() as u32, 4, 0, vec![], ops)
}

#[test]
fn test_mutable_struct_emheaders() {
    let desc = mutable_desc();
    let s = MutableSample { a: 9, b: 3 };
    let p = std::ptr::addr_of!(s).cast();
    #[rustfmt::skip]
    let expect_le = [
        14, 0, 0, 0,              // DHEADER: 2 emheaders + 4 + 2
        0x0a, 0x00, 0x00, 0xa0,   // EMHEADER mu=1 lc=4B id=10
        9, 0, 0, 0,
        0x14, 0x00, 0x00, 0x10,   // EMHEADER mu=0 lc=2B id=20
        3, 0,
    ];
    assert_eq!(write_le(&desc, p, XcdrVersion::Xcdr2), expect_le);
    #[rustfmt::skip]
    let expect_be = [
        0, 0, 0, 14,
        0xa0, 0x00, 0x00, 0x0a,
        0, 0, 0, 9,
        0x10, 0x00, 0x00, 0x14,
        0, 3,
    ];
    assert_eq!(write_be(&desc, p, XcdrVersion::Xcdr2), expect_be);
}

// -- alignment edge: XCDR2 relaxes 8-byte alignment -------------------------

#[repr(C)]
struct WideStruct {
    a: u32,
    b: u64,
}

fn wide_desc() -> CdrDesc {
    let ops = vec![
        OP_ADR | TYPE_4BY,
        offset_of!(WideStruct, a) as u32,
        OP_ADR | hcdr::ops::TYPE_8BY,
        offset_of!(WideStruct, b) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<WideStruct>() as u32, 8, 0, vec![], ops)
}

#[test]
fn test_u64_alignment_differs_between_versions() {
    let desc = wide_desc();
    let s = WideStruct { a: 1, b: 2 };
    let p = std::ptr::addr_of!(s).cast();
    // XCDR1: 4 bytes padding before the u64
    assert_eq!(
        write_le(&desc, p, XcdrVersion::Xcdr1),
        [1, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0]
    );
    // XCDR2: none
    assert_eq!(
        write_le(&desc, p, XcdrVersion::Xcdr2),
        [1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0]
    );
}
