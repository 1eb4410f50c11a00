// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HCDR - Interpreted CDR serialization engine
//!
//! A pure Rust implementation of the OMG DDS-XTypes wire encoding (XCDR1
//! and XCDR2), driven by compact interpretable operation programs. The
//! engine converts between native records and the binary wire formats,
//! byte-exact with the specification so it interoperates with other DDS
//! implementations.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     Serialized data layer                    |
//! |   Serdata (refcounted container) | SerdataPool | CdrRuntime  |
//! +--------------------------------------------------------------+
//! |                        Key machinery                         |
//! |   key-from-sample | key-from-data | key-from-key | keyhash   |
//! +--------------------------------------------------------------+
//! |                      Opcode interpreter                      |
//! |   write | read | normalize | skip-default | free | print     |
//! +--------------------------------------------------------------+
//! |                      Stream primitives                       |
//! |   Istream | Ostream (+ LE/BE facades) | aligned get/put      |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CdrDesc`] | Type descriptor: operation program, keys, cached sizes |
//! | [`Serdata`] | Refcounted CDR header + payload + key image container |
//! | [`CdrRuntime`] | Sertype registry and serdata pool |
//! | [`Istream`] / [`Ostream`] | Aligned, version-aware stream primitives |
//! | [`CdrAllocator`] | malloc/realloc/free triple behind every allocation |
//!
//! ## Wire formats
//!
//! Both XCDR versions are supported, with the XTypes framing for evolvable
//! types: FINAL types serialize bare, APPENDABLE types under a DHEADER,
//! MUTABLE types as a DHEADER-delimited parameter list with per-member
//! EMHEADERs. Alignment is relative to the payload start; XCDR2 relaxes
//! 8-byte alignment to 4.
//!
//! Receive-side payloads must pass [`codec::normalize`] exactly once; it
//! validates every structural invariant in place and swaps byte order when
//! needed. Everything downstream of a successful normalize trusts the
//! buffer.

/// Allocator indirection (malloc/realloc/free triple).
pub mod alloc;
/// The opcode interpreter: write, read, normalize, default, free, print.
pub mod codec;
/// Type descriptors and the optimized-size probe.
pub mod desc;
/// Key extraction and keyhash computation.
pub mod key;
/// Operation program encoding and program scans.
pub mod ops;
/// Sertype registry and runtime state.
pub mod registry;
/// Stream primitives and the error type.
pub mod ser;
/// Serialized-data containers and the pool.
pub mod serdata;

pub use alloc::{CdrAllocator, LibcAllocator, DEFAULT_ALLOCATOR};
pub use codec::{
    free_sample, normalize, print_key, print_sample, read_sample, skip_default, write_sample,
    write_sample_be, write_sample_bo, write_sample_le, write_sample_with_byte_order, CdrSeq,
};
pub use desc::{CdrDesc, EncodingFormat, KeyDesc};
pub use key::{
    extract_key_be_from_data, extract_key_be_from_key, extract_key_from_data,
    extract_key_from_key, keyhash_from_key, read_key, write_key, write_key_be, Keyhash,
};
pub use ops::Extensibility;
pub use registry::{CdrRuntime, Sertype};
pub use ser::{
    BigEndian, ByteOrder, ByteOrderKind, CdrError, CdrResult, Istream, LittleEndian, NativeEndian,
    Ostream, OstreamBe, OstreamLe, XcdrVersion,
};
pub use serdata::{CdrHeader, KeyImage, Serdata, SerdataKind, SerdataPool};

/// HCDR version string.
pub const VERSION: &str = "0.3.2";
