// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Serialized-data container lifecycle: construction paths, the padding
// contract in the header options, key images, equality, keyhash, pooling.

mod common;

use std::mem::offset_of;

use common::A;
use hcdr::ops::{OP_ADR, OP_RTS, TYPE_2BY, TYPE_4BY, TYPE_STR, FLAG_KEY};
use hcdr::{
    CdrDesc, CdrRuntime, KeyDesc, Serdata, SerdataKind, XcdrVersion,
};

#[repr(C)]
struct Msg {
    id: u32,
    note: *mut u8,
    extra: u16,
}

fn msg_desc() -> CdrDesc {
    #[rustfmt::skip]
    let ops = vec![
        OP_ADR | TYPE_4BY | FLAG_KEY, offset_of!(Msg, id) as u32,
        OP_ADR | TYPE_STR, offset_of!(Msg, note) as u32,
        OP_ADR | TYPE_2BY, offset_of!(Msg, extra) as u32,
        OP_RTS,
    ];
    let keys = vec![KeyDesc { ops_offs: 0, order_idx: 0 }];
    CdrDesc::new(
        std::mem::size_of::<Msg>() as u32,
        8,
        hcdr::desc::DESC_FLAG_FIXED_KEY_XCDR1 | hcdr::desc::DESC_FLAG_FIXED_KEY_XCDR2,
        keys,
        ops,
    )
}

fn runtime() -> CdrRuntime {
    CdrRuntime::new()
}

fn sample(id: u32, note: &str, extra: u16) -> Msg {
    Msg { id, note: common::cstr(note), extra }
}

unsafe fn drop_msg(mut m: Msg, desc: &CdrDesc) {
    hcdr::free_sample(std::ptr::addr_of_mut!(m).cast(), &A, &desc.ops);
}

#[test]
fn test_from_sample_roundtrips_through_to_sample() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(7, "hello", 0x0102);
    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .expect("from_sample");

    assert_eq!(sd.kind(), SerdataKind::Data);
    // options low bits carry the trailing padding count
    let pad = u32::from(sd.header().padding());
    assert_eq!(sd.size() % 4, 0);
    assert_eq!(pad, (4 - (sd.size() - pad) % 4) % 4);

    let mut got: Msg = unsafe { std::mem::zeroed() };
    unsafe {
        sd.to_sample(std::ptr::addr_of_mut!(got).cast(), &A);
        assert_eq!(got.id, 7);
        assert_eq!(std::ffi::CStr::from_ptr(got.note.cast()).to_str().unwrap(), "hello");
        assert_eq!(got.extra, 0x0102);
        hcdr::free_sample(std::ptr::addr_of_mut!(got).cast(), &A, &tp.desc.ops);
        drop_msg(s, &tp.desc);
    }
}

#[test]
fn test_padding_options_match_payload_length() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    // vary the string length to hit every padding residue
    for (note, _) in [("", 0), ("a", 0), ("ab", 0), ("abc", 0)] {
        let s = sample(1, note, 2);
        let sd = unsafe {
            Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
        }
        .expect("from_sample");
        let pad = u32::from(sd.header().padding());
        assert!(pad < 4);
        assert_eq!(sd.size() % 4, 0, "payload is padded to 4");
        let body = sd.size() - pad;
        assert_eq!(pad, (4 - body % 4) % 4, "options record (-len) mod 4");
        unsafe { drop_msg(s, &tp.desc) };
    }
}

#[test]
fn test_from_ser_accepts_both_byte_orders() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(41, "net", 9);

    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .expect("from_sample");
    let wire = sd.to_ser();

    let rx = Serdata::from_ser(&tp, SerdataKind::Data, &wire).expect("from_ser native");
    assert!(sd.eqkey(&rx));
    assert_eq!(sd.hash(), rx.hash());

    // big-endian wire image of the same sample
    let mut os = hcdr::OstreamBe::new(XcdrVersion::Xcdr2);
    unsafe { hcdr::write_sample_be(&mut os, &A, std::ptr::addr_of!(s).cast(), &tp.desc) }
        .expect("write be");
    let mut wire_be = vec![0x00, 0x10, 0x00, 0x00]; // CDR2_BE, no padding info
    let pad = (4 - os.0.index() % 4) % 4;
    wire_be[3] = pad as u8;
    wire_be.extend_from_slice(os.0.as_slice());
    wire_be.extend(std::iter::repeat(0).take(pad as usize));
    os.into_inner().fini(&A);

    let rx_be = Serdata::from_ser(&tp, SerdataKind::Data, &wire_be).expect("from_ser BE");
    assert!(sd.eqkey(&rx_be));
    assert_eq!(rx_be.to_ser(), wire, "normalized BE image equals the native one");

    unsafe { drop_msg(s, &tp.desc) };
}

#[test]
fn test_from_ser_rejects_garbage() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);

    // unknown representation identifier
    assert!(Serdata::from_ser(&tp, SerdataKind::Data, &[0xff, 0xff, 0, 0, 1, 2, 3, 4]).is_err());
    // truncated payload
    let s = sample(1, "x", 2);
    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .unwrap();
    let mut wire = sd.to_ser();
    wire.truncate(wire.len() - 5);
    assert!(Serdata::from_ser(&tp, SerdataKind::Data, &wire).is_err());
    unsafe { drop_msg(s, &tp.desc) };
}

#[test]
fn test_key_serdata_aliases_payload_and_converts() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(0x00c0ffee, "ignored-for-keys", 0);

    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Key, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .expect("key serdata");
    assert_eq!(sd.kind(), SerdataKind::Key);
    assert_eq!(sd.key_bytes(), 0x00c0_ffeeu32.to_ne_bytes());

    // to_untyped keeps the key and drops the type
    let untyped = sd.to_untyped().expect("to_untyped");
    assert!(untyped.sertype().is_none());
    assert_eq!(untyped.key_bytes(), sd.key_bytes());
    assert!(untyped.eqkey(&sd));

    let mut got: Msg = unsafe { std::mem::zeroed() };
    unsafe {
        untyped.untyped_to_sample(&tp, std::ptr::addr_of_mut!(got).cast(), &A);
        assert_eq!(got.id, 0x00c0ffee);
        hcdr::free_sample(std::ptr::addr_of_mut!(got).cast(), &A, &tp.desc.ops);
        drop_msg(s, &tp.desc);
    }
}

#[test]
fn test_keyhash_and_from_keyhash() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(0x01020304, "k", 0);
    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .unwrap();

    let kh = sd.get_keyhash(false);
    assert_eq!(&kh[..4], &[1, 2, 3, 4]); // big-endian fixed key, zero padded
    assert_eq!(&kh[4..], &[0u8; 12]);

    let back = Serdata::from_keyhash(&tp, &kh).expect("fixed key is invertible");
    assert_eq!(back.kind(), SerdataKind::Key);
    assert!(back.eqkey(&sd));
    unsafe { drop_msg(s, &tp.desc) };
}

#[test]
fn test_eqkey_distinguishes_instances() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s1 = sample(1, "a", 0);
    let s2 = sample(1, "b", 7);
    let s3 = sample(2, "a", 0);
    unsafe {
        let d1 = Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s1).cast()).unwrap();
        let d2 = Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s2).cast()).unwrap();
        let d3 = Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s3).cast()).unwrap();
        assert!(d1.eqkey(&d2)); // same key, different data
        assert!(!d1.eqkey(&d3));
        assert_eq!(d1.hash(), d2.hash());
        drop_msg(s1, &tp.desc);
        drop_msg(s2, &tp.desc);
        drop_msg(s3, &tp.desc);
    }
}

#[test]
fn test_refcount_and_pool_recycling() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(3, "pooled", 0);
    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .unwrap();
    assert_eq!(sd.ref_count(), 1);
    let extra = sd.clone();
    assert_eq!(sd.ref_count(), 2);
    drop(extra);
    assert_eq!(sd.ref_count(), 1);

    let before = rt.pool().len();
    drop(sd);
    assert_eq!(rt.pool().len(), before + 1, "final unref returns the container");

    // the recycled container is reused for the next construction
    let sd2 = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .unwrap();
    assert_eq!(rt.pool().len(), before);
    drop(sd2);
    unsafe { drop_msg(s, &tp.desc) };
}

#[test]
fn test_loaned_buffer_skips_normalization() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(11, "loan", 1);
    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .unwrap();
    let wire = sd.to_ser();
    let loaned = Serdata::from_loaned_buffer(&tp, SerdataKind::Data, &wire).expect("loan");
    assert!(loaned.eqkey(&sd));
    assert_eq!(loaned.to_ser(), wire);
    unsafe { drop_msg(s, &tp.desc) };
}

#[test]
fn test_print_serdata() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(5, "hi", 2);
    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .unwrap();
    assert_eq!(sd.print(), "{5,\"hi\",2}");
    unsafe { drop_msg(s, &tp.desc) };
}

#[test]
fn test_to_ser_iov_references_payload() {
    let rt = runtime();
    let tp = rt.sertype("Msg", msg_desc(), XcdrVersion::Xcdr2);
    let s = sample(6, "iov", 3);
    let sd = unsafe {
        Serdata::from_sample(&tp, SerdataKind::Data, XcdrVersion::Xcdr2, std::ptr::addr_of!(s).cast())
    }
    .unwrap();
    let (hdr, payload) = sd.to_ser_iov();
    let mut whole = hdr.to_vec();
    whole.extend_from_slice(payload);
    assert_eq!(whole, sd.to_ser());
    unsafe { drop_msg(s, &tp.desc) };
}
