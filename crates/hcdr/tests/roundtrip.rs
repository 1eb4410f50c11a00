// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Structural round-trips and the normalize invariants: write -> normalize ->
// read must reproduce the sample, normalize must be idempotent and byte-order
// insensitive, bounds and value domains must reject, and type evolution
// (appendable widening, mutable reordering) must behave per DDS-XTypes.

mod common;

use std::mem::offset_of;

use common::{cstr, normalize_from, try_write_native, write_be, write_native, A};
use hcdr::ops::{
    elem_jumps, plm, type_size, OP_ADR, OP_DLC, OP_JEQ4, OP_PLC, OP_RTS, SUBTYPE_1BY, SUBTYPE_2BY,
    SUBTYPE_4BY, TYPE_1BY, TYPE_2BY, TYPE_4BY, TYPE_8BY, TYPE_ARR, TYPE_BMK, TYPE_BSQ, TYPE_BST,
    TYPE_BLN, TYPE_ENU, TYPE_EXT, TYPE_SEQ, TYPE_STR, TYPE_UNI, FLAG_FP, FLAG_OPT, FLAG_SGN,
};
use hcdr::{
    free_sample, normalize, read_sample, skip_default, CdrAllocator, CdrDesc, CdrError, CdrSeq,
    Istream, XcdrVersion,
};

// ---------------------------------------------------------------------------
// a struct exercising every leaf type
// ---------------------------------------------------------------------------

#[repr(C)]
struct Everything {
    flag: u8,
    small: i8,
    medium: u16,
    num: i32,
    big: u64,
    fval: f32,
    dval: f64,
    color: u32,
    mask: u32,
    name: *mut u8,
    tag: [u8; 8],
    arr: [u32; 3],
    seq16: CdrSeq,
    bseq: CdrSeq,
}

fn everything_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_ADR | TYPE_BLN, offset_of!(Everything, flag) as u32,
        OP_ADR | TYPE_1BY | FLAG_SGN, offset_of!(Everything, small) as u32,
        OP_ADR | TYPE_2BY, offset_of!(Everything, medium) as u32,
        OP_ADR | TYPE_4BY | FLAG_SGN, offset_of!(Everything, num) as u32,
        OP_ADR | TYPE_8BY, offset_of!(Everything, big) as u32,
        OP_ADR | TYPE_4BY | FLAG_FP, offset_of!(Everything, fval) as u32,
        OP_ADR | TYPE_8BY | FLAG_FP, offset_of!(Everything, dval) as u32,
        OP_ADR | TYPE_ENU | type_size(4), offset_of!(Everything, color) as u32, 5,
        OP_ADR | TYPE_BMK | type_size(4), offset_of!(Everything, mask) as u32, 0, 0x0f,
        OP_ADR | TYPE_STR, offset_of!(Everything, name) as u32,
        OP_ADR | TYPE_BST, offset_of!(Everything, tag) as u32, 8,
        OP_ADR | TYPE_ARR | SUBTYPE_4BY, offset_of!(Everything, arr) as u32, 3,
        OP_ADR | TYPE_SEQ | SUBTYPE_2BY, offset_of!(Everything, seq16) as u32,
        OP_ADR | TYPE_BSQ | SUBTYPE_1BY, offset_of!(Everything, bseq) as u32, 4,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<Everything>() as u32, 8, 0, vec![], ops)
}

fn everything_sample(seq_elems: &mut [u16; 3], bseq_elems: &mut [u8; 2]) -> Everything {
    let mut tag = [0u8; 8];
    tag[..3].copy_from_slice(b"hey");
    Everything {
        flag: 1,
        small: -5,
        medium: 0xbeef,
        num: -123_456,
        big: 0x0102_0304_0506_0708,
        fval: 1.5,
        dval: -2.25,
        color: 3,
        mask: 0x0a,
        name: cstr("roundtrip"),
        tag,
        arr: [10, 20, 30],
        seq16: CdrSeq {
            maximum: 3,
            length: 3,
            buffer: seq_elems.as_mut_ptr().cast(),
            release: false,
        },
        bseq: CdrSeq {
            maximum: 2,
            length: 2,
            buffer: bseq_elems.as_mut_ptr().cast(),
            release: false,
        },
    }
}

unsafe fn check_everything(got: &Everything) {
    assert_eq!(got.flag, 1);
    assert_eq!(got.small, -5);
    assert_eq!(got.medium, 0xbeef);
    assert_eq!(got.num, -123_456);
    assert_eq!(got.big, 0x0102_0304_0506_0708);
    assert_eq!(got.fval, 1.5);
    assert_eq!(got.dval, -2.25);
    assert_eq!(got.color, 3);
    assert_eq!(got.mask, 0x0a);
    assert_eq!(std::ffi::CStr::from_ptr(got.name.cast()).to_str().unwrap(), "roundtrip");
    assert_eq!(&got.tag[..4], b"hey\0");
    assert_eq!(got.arr, [10, 20, 30]);
    assert_eq!(got.seq16.length, 3);
    let s16 = std::slice::from_raw_parts(got.seq16.buffer.cast::<u16>(), 3);
    assert_eq!(s16, [7, 8, 9]);
    assert_eq!(got.bseq.length, 2);
    let s8 = std::slice::from_raw_parts(got.bseq.buffer, 2);
    assert_eq!(s8, [4, 5]);
}

fn roundtrip_everything(version: XcdrVersion) {
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    let bytes = write_native(&desc, std::ptr::addr_of!(sample).cast(), version);

    // normalize of locally written bytes is an identity with the same size
    let (normed, actual) = normalize_from(
        &bytes,
        cfg!(target_endian = "little"),
        version,
        &desc,
        false,
    )
    .expect("normalize should accept our own bytes");
    assert_eq!(normed, bytes);
    assert_eq!(actual as usize, bytes.len());

    let mut got: Everything = unsafe { std::mem::zeroed() };
    let mut is = Istream::new(&normed, version);
    unsafe {
        read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc);
        check_everything(&got);
        free_sample(std::ptr::addr_of_mut!(got).cast(), &A, &desc.ops);
        free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops);
    }
}

#[test]
fn test_roundtrip_everything_xcdr1() {
    roundtrip_everything(XcdrVersion::Xcdr1);
}

#[test]
fn test_roundtrip_everything_xcdr2() {
    roundtrip_everything(XcdrVersion::Xcdr2);
}

#[test]
fn test_endian_symmetry() {
    // bytes written big-endian, normalized on this host, must equal the
    // native serialization
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    for version in [XcdrVersion::Xcdr1, XcdrVersion::Xcdr2] {
        let native = write_native(&desc, std::ptr::addr_of!(sample).cast(), version);
        let be = write_be(&desc, std::ptr::addr_of!(sample).cast(), version);
        let (normed, actual) =
            normalize_from(&be, false, version, &desc, false).expect("valid BE bytes");
        assert_eq!(normed, native);
        assert_eq!(actual as usize, native.len());
    }
    unsafe { free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops) };
}

#[test]
fn test_normalize_idempotent() {
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    let bytes = write_native(&desc, std::ptr::addr_of!(sample).cast(), XcdrVersion::Xcdr2);
    let mut once = bytes.clone();
    let n1 = normalize(&mut once, false, XcdrVersion::Xcdr2, &desc, false).unwrap();
    let mut twice = once.clone();
    let n2 = normalize(&mut twice, false, XcdrVersion::Xcdr2, &desc, false).unwrap();
    assert_eq!(once, twice);
    assert_eq!(n1, n2);
    unsafe { free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops) };
}

#[test]
fn test_skip_default_resets_sample() {
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    unsafe {
        skip_default(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops);
        assert_eq!(sample.flag, 0);
        assert_eq!(sample.num, 0);
        assert_eq!(*sample.name, 0); // empty string
        assert_eq!(sample.tag[0], 0);
        assert_eq!(sample.arr, [0, 0, 0]);
        assert_eq!(sample.seq16.length, 0);
        free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops);
    }
}

// ---------------------------------------------------------------------------
// bounds and value domains
// ---------------------------------------------------------------------------

#[test]
fn test_bounded_sequence_overflow_fails_write() {
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    let mut too_many = [1u8, 2, 3, 4, 5];
    sample.bseq = CdrSeq {
        maximum: 5,
        length: 5,
        buffer: too_many.as_mut_ptr(),
        release: false,
    };
    let err = try_write_native(&desc, std::ptr::addr_of!(sample).cast(), XcdrVersion::Xcdr2)
        .unwrap_err();
    assert_eq!(err, CdrError::BoundExceeded { bound: 4, actual: 5 });
    unsafe { free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops) };
}

#[test]
fn test_enum_above_max_fails_write_and_normalize() {
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    let good = write_native(&desc, std::ptr::addr_of!(sample).cast(), XcdrVersion::Xcdr1);

    sample.color = 6; // max is 5
    let err = try_write_native(&desc, std::ptr::addr_of!(sample).cast(), XcdrVersion::Xcdr1)
        .unwrap_err();
    assert_eq!(err, CdrError::InvalidEnumValue { value: 6, max: 5 });
    sample.color = 3;

    // corrupt the serialized enum (offset 32 in the XCDR1 image: 1+1+2+4,
    // u64 at 8, f32 at 16, f64 at 24)
    let enum_off = 32;
    let mut bad = good.clone();
    bad[enum_off..enum_off + 4].copy_from_slice(&9u32.to_ne_bytes());
    let err = normalize(&mut bad, false, XcdrVersion::Xcdr1, &desc, false).unwrap_err();
    assert_eq!(err, CdrError::InvalidEnumValue { value: 9, max: 5 });
    unsafe { free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops) };
}

#[test]
fn test_bitmask_unknown_bits_fail() {
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    sample.mask = 0x30; // only 0x0f permitted
    let err = try_write_native(&desc, std::ptr::addr_of!(sample).cast(), XcdrVersion::Xcdr2)
        .unwrap_err();
    assert_eq!(err, CdrError::InvalidBitmaskValue { value: 0x30 });
    unsafe { free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops) };
}

#[test]
fn test_normalize_rejects_truncation_and_bad_strings() {
    let desc = everything_desc();
    let mut seq_elems: [u16; 3] = [7, 8, 9];
    let mut bseq_elems: [u8; 2] = [4, 5];
    let mut sample = everything_sample(&mut seq_elems, &mut bseq_elems);
    let good = write_native(&desc, std::ptr::addr_of!(sample).cast(), XcdrVersion::Xcdr2);

    // truncated payload
    let mut short = good[..good.len() - 6].to_vec();
    assert!(normalize(&mut short, false, XcdrVersion::Xcdr2, &desc, false).is_err());

    // string missing its NUL terminator (string length at offset 36 in the
    // XCDR2 image: the u64 and f64 align to 4 there)
    let mut bad = good.clone();
    let str_len_off = 36;
    let len = u32::from_ne_bytes(bad[str_len_off..str_len_off + 4].try_into().unwrap()) as usize;
    bad[str_len_off + 4 + len - 1] = b'x';
    assert!(matches!(
        normalize(&mut bad, false, XcdrVersion::Xcdr2, &desc, false),
        Err(CdrError::InvalidString { .. })
    ));
    unsafe { free_sample(std::ptr::addr_of_mut!(sample).cast(), &A, &desc.ops) };
}

// ---------------------------------------------------------------------------
// optional members
// ---------------------------------------------------------------------------

#[repr(C)]
struct OptStruct {
    v: *mut u32,
}

fn opt_desc() -> CdrDesc {
    let ops = vec![OP_ADR | TYPE_4BY | FLAG_OPT, offset_of!(OptStruct, v) as u32, OP_RTS];
    CdrDesc::new(std::mem::size_of::<OptStruct>() as u32, 8, 0, vec![], ops)
}

#[test]
fn test_optional_member_roundtrip() {
    let desc = opt_desc();
    assert_eq!(hcdr::ops::minimum_xcdr_version(&desc.ops), XcdrVersion::Xcdr2);

    let val = A.alloc(4);
    unsafe { val.cast::<u32>().write(42) };
    let mut present = OptStruct { v: val.cast() };
    let bytes = write_native(&desc, std::ptr::addr_of!(present).cast(), XcdrVersion::Xcdr2);
    assert_eq!(bytes[0], 1); // presence flag

    let mut got = OptStruct { v: std::ptr::null_mut() };
    let mut is = Istream::new(&bytes, XcdrVersion::Xcdr2);
    unsafe {
        read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc);
        assert_eq!(*got.v, 42);
    }

    // absent member nulls the target on read
    let absent = OptStruct { v: std::ptr::null_mut() };
    let bytes = write_native(&desc, std::ptr::addr_of!(absent).cast(), XcdrVersion::Xcdr2);
    assert_eq!(bytes, [0]);
    let mut is = Istream::new(&bytes, XcdrVersion::Xcdr2);
    unsafe {
        read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc);
        assert!(got.v.is_null());
        free_sample(std::ptr::addr_of_mut!(present).cast(), &A, &desc.ops);
    }
}

// ---------------------------------------------------------------------------
// nested structs, inline and @external
// ---------------------------------------------------------------------------

#[repr(C)]
struct Point {
    x: i32,
    y: i32,
}

#[repr(C)]
struct Rect {
    origin: Point,
    w: u32,
}

fn rect_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_ADR | TYPE_EXT, offset_of!(Rect, origin) as u32, elem_jumps(3, 6),
        OP_ADR | TYPE_4BY, offset_of!(Rect, w) as u32,
        OP_RTS,
        OP_ADR | TYPE_4BY | FLAG_SGN, offset_of!(Point, x) as u32,
        OP_ADR | TYPE_4BY | FLAG_SGN, offset_of!(Point, y) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<Rect>() as u32, 4, 0, vec![], ops)
}

#[test]
fn test_inline_nested_struct_roundtrip() {
    let desc = rect_desc();
    // byte-identical layout, so the memcpy fast paths engage
    assert_eq!(desc.opt_size_xcdr2, 12);
    let r = Rect { origin: Point { x: -1, y: 2 }, w: 3 };
    let bytes = write_native(&desc, std::ptr::addr_of!(r).cast(), XcdrVersion::Xcdr2);
    assert_eq!(bytes.len(), 12);
    let mut got: Rect = unsafe { std::mem::zeroed() };
    let mut is = Istream::new(&bytes, XcdrVersion::Xcdr2);
    unsafe { read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc) };
    assert_eq!(got.origin.x, -1);
    assert_eq!(got.origin.y, 2);
    assert_eq!(got.w, 3);
}

#[repr(C)]
struct ExtHolder {
    p: *mut Point,
}

fn ext_holder_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_ADR | TYPE_EXT | hcdr::ops::FLAG_EXT, offset_of!(ExtHolder, p) as u32,
        elem_jumps(4, 5), std::mem::size_of::<Point>() as u32,
        OP_RTS,
        OP_ADR | TYPE_4BY | FLAG_SGN, offset_of!(Point, x) as u32,
        OP_ADR | TYPE_4BY | FLAG_SGN, offset_of!(Point, y) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<ExtHolder>() as u32, 8, 0, vec![], ops)
}

#[test]
fn test_external_member_roundtrip_and_free() {
    let desc = ext_holder_desc();
    let pt = A.alloc(std::mem::size_of::<Point>());
    unsafe { pt.cast::<Point>().write(Point { x: 5, y: -6 }) };
    let mut holder = ExtHolder { p: pt.cast() };
    let bytes = write_native(&desc, std::ptr::addr_of!(holder).cast(), XcdrVersion::Xcdr2);

    let mut got = ExtHolder { p: std::ptr::null_mut() };
    let mut is = Istream::new(&bytes, XcdrVersion::Xcdr2);
    unsafe {
        read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc);
        assert_eq!((*got.p).x, 5);
        assert_eq!((*got.p).y, -6);
        free_sample(std::ptr::addr_of_mut!(got).cast(), &A, &desc.ops);
        assert!(got.p.is_null());
        free_sample(std::ptr::addr_of_mut!(holder).cast(), &A, &desc.ops);
    }
}

// ---------------------------------------------------------------------------
// unions
// ---------------------------------------------------------------------------

#[repr(C)]
struct UnionSample {
    d: u8,
    x: i32,
    y: u16,
}

fn union_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_ADR | TYPE_UNI | SUBTYPE_1BY, offset_of!(UnionSample, d) as u32, 2, elem_jumps(4, 5),
        OP_RTS,
        OP_JEQ4 | TYPE_4BY | FLAG_SGN, 1, offset_of!(UnionSample, x) as u32, 0,
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
fn test_union_roundtrip() {
    let desc = union_desc();
    let s = UnionSample { d: 1, x: -7, y: 0 };
    let bytes = write_native(&desc, std::ptr::addr_of!(s).cast(), XcdrVersion::Xcdr2);
    let mut got: UnionSample = unsafe { std::mem::zeroed() };
    let mut is = Istream::new(&bytes, XcdrVersion::Xcdr2);
    unsafe { read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc) };
    assert_eq!(got.d, 1);
    assert_eq!(got.x, -7);
}

#[test]
fn test_union_unmatched_discriminant_leaves_target_zeroed() {
    let desc = union_desc();
    let s = UnionSample { d: 9, x: 55, y: 66 };
    let bytes = write_native(&desc, std::ptr::addr_of!(s).cast(), XcdrVersion::Xcdr2);
    assert_eq!(bytes, [9]); // just the discriminant

    let (normed, actual) = normalize_from(
        &bytes,
        cfg!(target_endian = "little"),
        XcdrVersion::Xcdr2,
        &desc,
        false,
    )
    .expect("an unmatched discriminant without default is valid");
    assert_eq!(actual, 1);

    let mut got = UnionSample { d: 0xaa, x: 1, y: 2 };
    let mut is = Istream::new(&normed, XcdrVersion::Xcdr2);
    unsafe { read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc) };
    assert_eq!(got.d, 9);
    assert_eq!(got.x, 0); // pre-zeroed, nothing read
    assert_eq!(got.y, 0);
}

// ---------------------------------------------------------------------------
// appendable evolution
// ---------------------------------------------------------------------------

#[repr(C)]
struct V1 {
    a: u32,
    b: u16,
}

#[repr(C)]
struct V2 {
    a: u32,
    b: u16,
    c: u32,
}

fn v1_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_DLC,
        OP_ADR | TYPE_4BY, offset_of!(V1, a) as u32,
        OP_ADR | TYPE_2BY, offset_of!(V1, b) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<V1>() as u32, 4, 0, vec![], ops)
}

fn v2_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_DLC,
        OP_ADR | TYPE_4BY, offset_of!(V2, a) as u32,
        OP_ADR | TYPE_2BY, offset_of!(V2, b) as u32,
        OP_ADR | TYPE_4BY, offset_of!(V2, c) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<V2>() as u32, 4, 0, vec![], ops)
}

#[test]
fn test_appendable_reader_ignores_new_trailing_member() {
    let new = V2 { a: 1, b: 2, c: 3 };
    let bytes = write_native(&v2_desc(), std::ptr::addr_of!(new).cast(), XcdrVersion::Xcdr2);

    let old_desc = v1_desc();
    let (normed, _) = normalize_from(
        &bytes,
        cfg!(target_endian = "little"),
        XcdrVersion::Xcdr2,
        &old_desc,
        false,
    )
    .expect("wider appendable payload must be readable");
    let mut got: V1 = unsafe { std::mem::zeroed() };
    let mut is = Istream::new(&normed, XcdrVersion::Xcdr2);
    unsafe { read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &old_desc) };
    assert_eq!(got.a, 1);
    assert_eq!(got.b, 2);
    assert_eq!(is.index() as usize, normed.len()); // trailing member consumed
}

#[test]
fn test_appendable_reader_defaults_missing_trailing_member() {
    let old = V1 { a: 1, b: 2 };
    let bytes = write_native(&v1_desc(), std::ptr::addr_of!(old).cast(), XcdrVersion::Xcdr2);

    let new_desc = v2_desc();
    let (normed, _) = normalize_from(
        &bytes,
        cfg!(target_endian = "little"),
        XcdrVersion::Xcdr2,
        &new_desc,
        false,
    )
    .expect("narrower appendable payload must be readable");
    let mut got = V2 { a: 9, b: 9, c: 9 };
    let mut is = Istream::new(&normed, XcdrVersion::Xcdr2);
    unsafe { read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &new_desc) };
    assert_eq!(got.a, 1);
    assert_eq!(got.b, 2);
    assert_eq!(got.c, 0); // defaulted
}

// ---------------------------------------------------------------------------
// mutable evolution
// ---------------------------------------------------------------------------

#[repr(C)]
struct Mut {
    a: u32,
    b: u16,
}

fn mutable_desc(reorder: bool) -> CdrDesc {
    let ops = if reorder {
        #[rustfmt::skip]
        let v = vec![
            OP_PLC,
            plm(0, 5), 20,
            plm(0, 6), 10,
            OP_RTS,
            OP_ADR | TYPE_2BY, offset_of!(Mut, b) as u32, OP_RTS,
            OP_ADR | TYPE_4BY, offset_of!(Mut, a) as u32, OP_RTS,
        ];
        v
    } else {
        #[rustfmt::skip]
        let v = vec![
            OP_PLC,
            plm(0, 5), 10,
            plm(0, 6), 20,
            OP_RTS,
            OP_ADR | TYPE_4BY, offset_of!(Mut, a) as u32, OP_RTS,
            OP_ADR | TYPE_2BY, offset_of!(Mut, b) as u32, OP_RTS,
        ];
        v
    };
    CdrDesc::new(std::mem::size_of::<Mut>() as u32, 4, 0, vec![], ops)
}

#[test]
fn test_mutable_members_match_by_id_in_any_order() {
    let s = Mut { a: 0xdead_beef, b: 0x55 };
    let bytes = write_native(&mutable_desc(false), std::ptr::addr_of!(s).cast(), XcdrVersion::Xcdr2);

    let reordered = mutable_desc(true);
    let (normed, _) = normalize_from(
        &bytes,
        cfg!(target_endian = "little"),
        XcdrVersion::Xcdr2,
        &reordered,
        false,
    )
    .expect("member order must not matter");
    let mut got: Mut = unsafe { std::mem::zeroed() };
    let mut is = Istream::new(&normed, XcdrVersion::Xcdr2);
    unsafe { read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &reordered) };
    assert_eq!(got.a, 0xdead_beef);
    assert_eq!(got.b, 0x55);
}

#[test]
fn test_mutable_unknown_must_understand_member_is_rejected() {
    let s = Mut { a: 1, b: 2 };
    // a writer whose member 10 is flagged must-understand
    #[rustfmt::skip]
    let mu_ops = vec![
        OP_PLC,
        plm(0, 5), 10,
        plm(0, 6), 20,
        OP_RTS,
        OP_ADR | TYPE_4BY | hcdr::ops::FLAG_MU, offset_of!(Mut, a) as u32, OP_RTS,
        OP_ADR | TYPE_2BY, offset_of!(Mut, b) as u32, OP_RTS,
    ];
    let mu_desc = CdrDesc::new(std::mem::size_of::<Mut>() as u32, 4, 0, vec![], mu_ops);
    let bytes = write_native(&mu_desc, std::ptr::addr_of!(s).cast(), XcdrVersion::Xcdr2);

    // a reader that does not know member 10 at all
    #[rustfmt::skip]
    let other_ops = vec![
        OP_PLC,
        plm(0, 3), 20,
        OP_RTS,
        OP_ADR | TYPE_2BY, offset_of!(Mut, b) as u32, OP_RTS,
    ];
    let other = CdrDesc::new(std::mem::size_of::<Mut>() as u32, 4, 0, vec![], other_ops);
    let err = normalize_from(
        &bytes,
        cfg!(target_endian = "little"),
        XcdrVersion::Xcdr2,
        &other,
        false,
    )
    .unwrap_err();
    assert_eq!(err, CdrError::MustUnderstand { member_id: 10 });
}

// ---------------------------------------------------------------------------
// randomized sweeps
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct RandStruct {
    a: u8,
    b: u16,
    c: u32,
    d: u64,
    e: i32,
}

fn rand_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_ADR | TYPE_1BY, offset_of!(RandStruct, a) as u32,
        OP_ADR | TYPE_2BY, offset_of!(RandStruct, b) as u32,
        OP_ADR | TYPE_4BY, offset_of!(RandStruct, c) as u32,
        OP_ADR | TYPE_8BY, offset_of!(RandStruct, d) as u32,
        OP_ADR | TYPE_4BY | FLAG_SGN, offset_of!(RandStruct, e) as u32,
        OP_RTS,
    ];
    CdrDesc::new(std::mem::size_of::<RandStruct>() as u32, 8, 0, vec![], ops)
}

#[test]
fn test_randomized_primitive_roundtrips() {
    let desc = rand_desc();
    fastrand::seed(0x5eed);
    for _ in 0..200 {
        let s = RandStruct {
            a: fastrand::u8(..),
            b: fastrand::u16(..),
            c: fastrand::u32(..),
            d: fastrand::u64(..),
            e: fastrand::i32(..),
        };
        for version in [XcdrVersion::Xcdr1, XcdrVersion::Xcdr2] {
            let be = write_be(&desc, std::ptr::addr_of!(s).cast(), version);
            let (normed, _) =
                normalize_from(&be, false, version, &desc, false).expect("valid bytes");
            let mut got: RandStruct = unsafe { std::mem::zeroed() };
            let mut is = Istream::new(&normed, version);
            unsafe { read_sample(&mut is, std::ptr::addr_of_mut!(got).cast(), &A, &desc) };
            assert_eq!(got, s);
        }
    }
}

// ---------------------------------------------------------------------------
// print
// ---------------------------------------------------------------------------

#[test]
fn test_print_sample_renders_fields() {
    let desc = rect_desc();
    let r = Rect { origin: Point { x: -1, y: 2 }, w: 3 };
    let bytes = write_native(&desc, std::ptr::addr_of!(r).cast(), XcdrVersion::Xcdr2);
    let mut is = Istream::new(&bytes, XcdrVersion::Xcdr2);
    let mut out = String::new();
    hcdr::print_sample(&mut is, &desc, &mut out);
    assert_eq!(out, "{{-1,2},3}");
}
