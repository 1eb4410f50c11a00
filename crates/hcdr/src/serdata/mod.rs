// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serialized-data container: a reference-counted bundle of CDR header,
//! payload, key image and type linkage, recycled through a bounded pool.
//!
//! Containers are built from a native sample (eager key computation), from
//! network bytes (normalize first, key only after that succeeds), from a
//! received keyhash (fixed-key types only), or from a loaned buffer that is
//! trusted as-is. The payload layer always allocates through
//! [`DEFAULT_ALLOCATOR`]; only the interpreter underneath is
//! allocator-parametric.

pub mod key;
pub mod pool;

pub use key::{KeyImage, FIXED_KEY_MAX_SIZE};
pub use pool::SerdataPool;

use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

use crate::alloc::{CdrAllocator, DEFAULT_ALLOCATOR};
use crate::codec::{self, normalize};
use crate::desc::EncodingFormat;
use crate::key::{
    extract_key_from_data, extract_key_from_key, keyhash_from_key, read_key, write_key,
    write_key_bo, Keyhash,
};
use crate::registry::Sertype;
use crate::ser::{CdrError, CdrResult, Istream, NativeEndian, Ostream, XcdrVersion};
use pool::POOL_PAYLOAD_MAX;

// Representation identifiers (XTypes 7.6.3.1.2), as the big-endian value of
// the header's first two bytes. XCDR1 parameter-list identifiers are used
// only by discovery data and are not accepted here.
pub const CDR_BE: u16 = 0x0000;
pub const CDR_LE: u16 = 0x0001;
pub const CDR2_BE: u16 = 0x0010;
pub const CDR2_LE: u16 = 0x0011;
pub const D_CDR2_BE: u16 = 0x0012;
pub const D_CDR2_LE: u16 = 0x0013;
pub const PL_CDR2_BE: u16 = 0x0014;
pub const PL_CDR2_LE: u16 = 0x0015;

/// Low two bits of the header options: trailing padding count.
pub const CDR_HDR_PADDING_MASK: u16 = 0x3;

pub fn is_valid_identifier(id: u16) -> bool {
    matches!(id, CDR_BE | CDR_LE | CDR2_BE | CDR2_LE | D_CDR2_BE | D_CDR2_LE | PL_CDR2_BE | PL_CDR2_LE)
}

#[inline]
fn identifier_is_le(id: u16) -> bool {
    id & 1 == 1
}

pub fn identifier_is_native(id: u16) -> bool {
    identifier_is_le(id) == cfg!(target_endian = "little")
}

/// Flip the endianness bit to the host's, keeping version and format.
pub fn identifier_to_native(id: u16) -> u16 {
    if cfg!(target_endian = "little") {
        id | 1
    } else {
        id & !1
    }
}

pub fn identifier_version(id: u16) -> XcdrVersion {
    match id {
        CDR_BE | CDR_LE => XcdrVersion::Xcdr1,
        _ => XcdrVersion::Xcdr2,
    }
}

pub fn identifier_format(id: u16) -> EncodingFormat {
    match id & !1 {
        D_CDR2_BE => EncodingFormat::Delimited,
        PL_CDR2_BE => EncodingFormat::Pl,
        _ => EncodingFormat::Plain,
    }
}

/// The host-order identifier for a version/format pair.
pub fn native_identifier(version: XcdrVersion, format: EncodingFormat) -> u16 {
    let base = match (version, format) {
        (XcdrVersion::Xcdr1, _) => CDR_BE,
        (XcdrVersion::Xcdr2, EncodingFormat::Plain) => CDR2_BE,
        (XcdrVersion::Xcdr2, EncodingFormat::Delimited) => D_CDR2_BE,
        (XcdrVersion::Xcdr2, EncodingFormat::Pl) => PL_CDR2_BE,
    };
    identifier_to_native(base)
}

/// CDR header: representation identifier plus options. Held in host order;
/// both fields travel big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdrHeader {
    pub identifier: u16,
    pub options: u16,
}

impl CdrHeader {
    pub fn to_bytes(self) -> [u8; 4] {
        let i = self.identifier.to_be_bytes();
        let o = self.options.to_be_bytes();
        [i[0], i[1], o[0], o[1]]
    }

    pub fn padding(self) -> u16 {
        self.options & CDR_HDR_PADDING_MASK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdataKind {
    Empty,
    Key,
    Data,
}

pub(crate) struct SerdataInner {
    pub(crate) kind: SerdataKind,
    pub(crate) hdr: CdrHeader,
    payload: *mut u8,
    capacity: u32,
    pos: u32,
    pub(crate) key: KeyImage,
    pub(crate) hash: u32,
    refc: AtomicU32,
    sertype: Option<Arc<Sertype>>,
    pool: Arc<SerdataPool>,
}

// SAFETY: the payload buffer is uniquely owned by the container and only
// mutated during construction, before the handle is shared.
unsafe impl Send for SerdataInner {}
unsafe impl Sync for SerdataInner {}

impl Drop for SerdataInner {
    fn drop(&mut self) {
        unsafe { DEFAULT_ALLOCATOR.free(self.payload) };
    }
}

impl SerdataInner {
    fn payload_slice(&self) -> &[u8] {
        if self.payload.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.payload, self.pos as usize) }
        }
    }

    /// Payload without the trailing alignment padding.
    fn body(&self) -> &[u8] {
        let pad = u32::from(self.hdr.padding());
        &self.payload_slice()[..(self.pos - pad) as usize]
    }
}

fn fresh_inner(pool: &Arc<SerdataPool>) -> Box<SerdataInner> {
    pool.get().unwrap_or_else(|| {
        Box::new(SerdataInner {
            kind: SerdataKind::Empty,
            hdr: CdrHeader { identifier: 0, options: 0 },
            payload: std::ptr::null_mut(),
            capacity: 0,
            pos: 0,
            key: KeyImage::Unset,
            hash: 0,
            refc: AtomicU32::new(1),
            sertype: None,
            pool: Arc::clone(pool),
        })
    })
}

fn recycle(mut inner: Box<SerdataInner>) {
    let pool = Arc::clone(&inner.pool);
    if inner.capacity > POOL_PAYLOAD_MAX {
        unsafe { DEFAULT_ALLOCATOR.free(inner.payload) };
        inner.payload = std::ptr::null_mut();
        inner.capacity = 0;
    }
    inner.kind = SerdataKind::Empty;
    inner.hdr = CdrHeader { identifier: 0, options: 0 };
    inner.pos = 0;
    inner.key = KeyImage::Unset;
    inner.hash = 0;
    inner.sertype = None;
    inner.refc.store(1, Ordering::Relaxed);
    // full pool: the box drops here and the payload with it
    if !pool.put(inner) {
        log::debug!("[serdata] pool full, releasing container");
    }
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for &b in bytes {
        h ^= u32::from(b);
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// Reference-counted handle to a serialized-data container.
pub struct Serdata {
    inner: NonNull<SerdataInner>,
}

// SAFETY: SerdataInner is Send + Sync and the refcount is atomic.
unsafe impl Send for Serdata {}
unsafe impl Sync for Serdata {}

impl Clone for Serdata {
    fn clone(&self) -> Self {
        self.inner().refc.fetch_add(1, Ordering::Relaxed);
        Serdata { inner: self.inner }
    }
}

impl Drop for Serdata {
    fn drop(&mut self) {
        if self.inner().refc.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            let boxed = unsafe { Box::from_raw(self.inner.as_ptr()) };
            recycle(boxed);
        }
    }
}

impl Serdata {
    fn inner(&self) -> &SerdataInner {
        unsafe { self.inner.as_ref() }
    }

    fn from_box(inner: Box<SerdataInner>) -> Self {
        Serdata { inner: NonNull::from(Box::leak(inner)) }
    }

    pub fn kind(&self) -> SerdataKind {
        self.inner().kind
    }

    pub fn header(&self) -> CdrHeader {
        self.inner().hdr
    }

    pub fn hash(&self) -> u32 {
        self.inner().hash
    }

    pub fn ref_count(&self) -> u32 {
        self.inner().refc.load(Ordering::Relaxed)
    }

    pub fn sertype(&self) -> Option<&Arc<Sertype>> {
        self.inner().sertype.as_ref()
    }

    /// Payload length including trailing padding.
    pub fn size(&self) -> u32 {
        self.inner().pos
    }

    pub fn key_bytes(&self) -> &[u8] {
        let inner = self.inner();
        inner.key.bytes(inner.payload_slice())
    }

    /// Serialize a native sample.
    ///
    /// The key image is computed eagerly: for DATA from the sample, for KEY
    /// by aliasing the freshly written payload (XCDR2) or re-deriving it
    /// (XCDR1).
    ///
    /// # Safety
    ///
    /// `sample` must point at a live native record laid out per the
    /// sertype's descriptor.
    pub unsafe fn from_sample(
        tp: &Arc<Sertype>,
        kind: SerdataKind,
        version: XcdrVersion,
        sample: *const u8,
    ) -> CdrResult<Serdata> {
        let mut inner = fresh_inner(&tp.pool);
        let mut os = Ostream::from_raw_parts(inner.payload, inner.capacity, version);
        let result = (|| -> CdrResult<u16> {
            match kind {
                SerdataKind::Empty => {}
                SerdataKind::Key => unsafe {
                    write_key(&mut os, &DEFAULT_ALLOCATOR, sample, &tp.desc)?;
                },
                SerdataKind::Data => unsafe {
                    codec::write_sample(&mut os, &DEFAULT_ALLOCATOR, sample, &tp.desc)?;
                },
            }
            Ok(os.align4_pad(&DEFAULT_ALLOCATOR)? as u16)
        })();
        let (buf, cap, pos) = os.into_raw_parts();
        inner.payload = buf;
        inner.capacity = cap;
        inner.pos = pos;
        let pad = match result {
            Ok(pad) => pad,
            Err(e) => {
                recycle(inner);
                return Err(e);
            }
        };

        let key = match kind {
            SerdataKind::Empty => KeyImage::Static { len: 0, buf: [0; FIXED_KEY_MAX_SIZE] },
            SerdataKind::Key if version == XcdrVersion::Xcdr2 => {
                KeyImage::Alias { offset: 0, len: inner.pos - u32::from(pad) }
            }
            _ => match key_image_from_sample(tp, sample) {
                Ok(k) => k,
                Err(e) => {
                    recycle(inner);
                    return Err(e);
                }
            },
        };
        inner.kind = kind;
        inner.hdr = CdrHeader {
            identifier: native_identifier(version, tp.desc.encoding_format()),
            options: pad,
        };
        inner.key = key;
        inner.hash = key_hash32(tp, &inner);
        inner.sertype = Some(Arc::clone(tp));
        Ok(Serdata::from_box(inner))
    }

    /// Take in network bytes: `[CDR header][payload]`. Validates the header,
    /// normalizes the payload in place (byteswapping if the sender's order
    /// differs), and only then derives the key.
    pub fn from_ser(tp: &Arc<Sertype>, kind: SerdataKind, raw: &[u8]) -> CdrResult<Serdata> {
        if raw.len() < 4 {
            return Err(CdrError::OutOfBounds { offset: 0, need: 4, size: raw.len() as u32 });
        }
        let identifier = u16::from_be_bytes([raw[0], raw[1]]);
        let options = u16::from_be_bytes([raw[2], raw[3]]);
        if !is_valid_identifier(identifier) {
            log::warn!("[serdata] dropping sample: unknown representation {:#06x}", identifier);
            return Err(CdrError::InvalidHeader { identifier });
        }
        let needs_bswap = !identifier_is_native(identifier);
        let identifier = identifier_to_native(identifier);
        let version = identifier_version(identifier);
        // key-only payloads are a plain concatenation of key fields, whatever
        // the type's own framing
        if kind != SerdataKind::Key && identifier_format(identifier) != tp.desc.encoding_format() {
            log::warn!(
                "[serdata] dropping sample: representation {:#06x} does not match the type",
                identifier
            );
            return Err(CdrError::InvalidHeader { identifier });
        }
        let pad = u32::from(options & CDR_HDR_PADDING_MASK);
        let body = &raw[4..];
        if (body.len() as u32) < pad {
            return Err(CdrError::InvalidHeader { identifier });
        }

        let mut inner = fresh_inner(&tp.pool);
        if inner.capacity < body.len() as u32 {
            inner.payload =
                unsafe { DEFAULT_ALLOCATOR.realloc(inner.payload, body.len().max(1)) };
            inner.capacity = body.len() as u32;
        }
        if !body.is_empty() {
            unsafe { std::ptr::copy_nonoverlapping(body.as_ptr(), inner.payload, body.len()) };
        }
        inner.pos = body.len() as u32;

        let norm = {
            let view: &mut [u8] = if body.is_empty() {
                &mut []
            } else {
                unsafe {
                    std::slice::from_raw_parts_mut(inner.payload, body.len() - pad as usize)
                }
            };
            normalize(view, needs_bswap, version, &tp.desc, kind == SerdataKind::Key)
        };
        let actual = match norm {
            Ok(n) => n,
            Err(e) => {
                log::warn!("[serdata] dropping sample: {}", e);
                recycle(inner);
                return Err(e);
            }
        };

        let key = match key_image_from_cdr(tp, inner.payload_slice(), actual, version, kind) {
            Ok(k) => k,
            Err(e) => {
                log::warn!("[serdata] dropping sample: {}", e);
                recycle(inner);
                return Err(e);
            }
        };
        inner.kind = kind;
        inner.hdr = CdrHeader { identifier, options };
        inner.key = key;
        inner.hash = key_hash32(tp, &inner);
        inner.sertype = Some(Arc::clone(tp));
        Ok(Serdata::from_box(inner))
    }

    /// Rebuild a KEY container from a received keyhash. Only possible when
    /// the type's XCDR2 key always fits the 16 keyhash bytes; an MD5
    /// keyhash is not invertible.
    pub fn from_keyhash(tp: &Arc<Sertype>, keyhash: &Keyhash) -> CdrResult<Serdata> {
        if !tp.desc.fixed_key(XcdrVersion::Xcdr2) {
            return Err(CdrError::MissingKey);
        }
        let mut raw = [0u8; 20];
        raw[..2].copy_from_slice(&CDR2_BE.to_be_bytes());
        raw[4..].copy_from_slice(keyhash);
        Self::from_ser(tp, SerdataKind::Key, &raw)
    }

    /// Shared-memory fast path: the buffer is a locally produced
    /// `[CDR header][payload]` image that is trusted without normalization.
    pub fn from_loaned_buffer(
        tp: &Arc<Sertype>,
        kind: SerdataKind,
        raw: &[u8],
    ) -> CdrResult<Serdata> {
        if raw.len() < 4 {
            return Err(CdrError::OutOfBounds { offset: 0, need: 4, size: raw.len() as u32 });
        }
        let identifier = u16::from_be_bytes([raw[0], raw[1]]);
        let options = u16::from_be_bytes([raw[2], raw[3]]);
        debug_assert!(identifier_is_native(identifier));
        let version = identifier_version(identifier);
        let body = &raw[4..];

        let mut inner = fresh_inner(&tp.pool);
        if inner.capacity < body.len() as u32 {
            inner.payload = unsafe { DEFAULT_ALLOCATOR.realloc(inner.payload, body.len().max(1)) };
            inner.capacity = body.len() as u32;
        }
        if !body.is_empty() {
            unsafe { std::ptr::copy_nonoverlapping(body.as_ptr(), inner.payload, body.len()) };
        }
        inner.pos = body.len() as u32;
        inner.kind = kind;
        inner.hdr = CdrHeader { identifier, options };
        let actual = inner.pos - u32::from(inner.hdr.padding());
        let key = match key_image_from_cdr(tp, inner.payload_slice(), actual, version, kind) {
            Ok(k) => k,
            Err(e) => {
                recycle(inner);
                return Err(e);
            }
        };
        inner.key = key;
        inner.hash = key_hash32(tp, &inner);
        inner.sertype = Some(Arc::clone(tp));
        Ok(Serdata::from_box(inner))
    }

    /// Header and payload as one contiguous byte vector.
    pub fn to_ser(&self) -> Vec<u8> {
        let inner = self.inner();
        let mut out = Vec::with_capacity(4 + inner.pos as usize);
        out.extend_from_slice(&inner.hdr.to_bytes());
        out.extend_from_slice(inner.payload_slice());
        out
    }

    /// Header and payload as separate references (no copy of the payload).
    pub fn to_ser_iov(&self) -> ([u8; 4], &[u8]) {
        let inner = self.inner();
        (inner.hdr.to_bytes(), inner.payload_slice())
    }

    /// Deserialize into a caller-provided native record.
    ///
    /// # Safety
    ///
    /// As for [`codec::read_sample`]; the record must match this
    /// container's sertype.
    pub unsafe fn to_sample(&self, sample: *mut u8, allocator: &dyn CdrAllocator) {
        let inner = self.inner();
        let tp = inner.sertype.as_ref().expect("typed container required");
        let version = identifier_version(inner.hdr.identifier);
        let mut is = Istream::new(inner.body(), version);
        match inner.kind {
            SerdataKind::Key => read_key(&mut is, sample, allocator, &tp.desc),
            _ => codec::read_sample(&mut is, sample, allocator, &tp.desc),
        }
    }

    /// Populate a record from an untyped KEY container, using the caller's
    /// sertype for the program.
    ///
    /// # Safety
    ///
    /// As for [`codec::read_sample`].
    pub unsafe fn untyped_to_sample(
        &self,
        tp: &Sertype,
        sample: *mut u8,
        allocator: &dyn CdrAllocator,
    ) {
        let inner = self.inner();
        debug_assert_eq!(inner.kind, SerdataKind::Key);
        let version = identifier_version(inner.hdr.identifier);
        let mut is = Istream::new(inner.body(), version);
        read_key(&mut is, sample, allocator, &tp.desc);
    }

    /// Project to an untyped KEY container holding only the key bytes.
    pub fn to_untyped(&self) -> CdrResult<Serdata> {
        let src = self.inner();
        let mut inner = fresh_inner(&src.pool);
        let key_bytes = src.key.bytes(src.payload_slice());
        let mut os =
            unsafe { Ostream::from_raw_parts(inner.payload, inner.capacity, XcdrVersion::Xcdr2) };
        let result = (|| -> CdrResult<u16> {
            os.put_bytes(&DEFAULT_ALLOCATOR, key_bytes)?;
            Ok(os.align4_pad(&DEFAULT_ALLOCATOR)? as u16)
        })();
        let (buf, cap, pos) = os.into_raw_parts();
        inner.payload = buf;
        inner.capacity = cap;
        inner.pos = pos;
        let pad = match result {
            Ok(pad) => pad,
            Err(e) => {
                recycle(inner);
                return Err(e);
            }
        };
        inner.kind = SerdataKind::Key;
        inner.hdr = CdrHeader {
            identifier: native_identifier(XcdrVersion::Xcdr2, EncodingFormat::Plain),
            options: pad,
        };
        inner.key = KeyImage::Alias { offset: 0, len: key_bytes.len() as u32 };
        inner.hash = src.hash;
        inner.sertype = None;
        Ok(Serdata::from_box(inner))
    }

    /// Key equality: byte-wise over the key images; keyless types compare
    /// equal.
    pub fn eqkey(&self, other: &Serdata) -> bool {
        let a = self.inner();
        let b = other.inner();
        let ka = a.key.bytes(a.payload_slice());
        let kb = b.key.bytes(b.payload_slice());
        ka == kb
    }

    /// The RTPS keyhash for this container's key.
    pub fn get_keyhash(&self, force_md5: bool) -> Keyhash {
        let inner = self.inner();
        let tp = inner.sertype.as_ref().expect("typed container required");
        keyhash_from_key(&tp.desc, self.key_bytes(), force_md5)
    }

    /// Render the payload as text.
    pub fn print(&self) -> String {
        let inner = self.inner();
        let tp = inner.sertype.as_ref().expect("typed container required");
        let version = identifier_version(inner.hdr.identifier);
        let mut is = Istream::new(inner.body(), version);
        let mut out = String::new();
        match inner.kind {
            SerdataKind::Key => codec::print_key(&mut is, &tp.desc, &mut out),
            _ => codec::print_sample(&mut is, &tp.desc, &mut out),
        }
        out
    }
}

/// XCDR2 native key image straight from a sample.
unsafe fn key_image_from_sample(tp: &Sertype, sample: *const u8) -> CdrResult<KeyImage> {
    if tp.desc.is_keyless() {
        return Ok(KeyImage::Static { len: 0, buf: [0; FIXED_KEY_MAX_SIZE] });
    }
    let mut os = Ostream::new(XcdrVersion::Xcdr2);
    let r = write_key_bo::<NativeEndian>(&mut os, &DEFAULT_ALLOCATOR, sample, &tp.desc);
    let img = r.map(|()| KeyImage::owned(os.as_slice(), tp.desc.fixed_key(XcdrVersion::Xcdr2)));
    os.fini(&DEFAULT_ALLOCATOR);
    img
}

/// XCDR2 native key image from a normalized payload (full data or key-only).
fn key_image_from_cdr(
    tp: &Sertype,
    payload: &[u8],
    actual: u32,
    version: XcdrVersion,
    kind: SerdataKind,
) -> CdrResult<KeyImage> {
    if tp.desc.is_keyless() {
        return Ok(KeyImage::Static { len: 0, buf: [0; FIXED_KEY_MAX_SIZE] });
    }
    if kind == SerdataKind::Key && version == XcdrVersion::Xcdr2 {
        return Ok(KeyImage::Alias { offset: 0, len: actual });
    }
    let mut is = Istream::new(&payload[..actual as usize], version);
    let mut os = Ostream::new(XcdrVersion::Xcdr2);
    let r = if kind == SerdataKind::Key {
        extract_key_from_key(&mut is, &mut os, &DEFAULT_ALLOCATOR, &tp.desc)
    } else {
        extract_key_from_data(&mut is, &mut os, &DEFAULT_ALLOCATOR, &tp.desc)
    };
    let img = r.map(|()| KeyImage::owned(os.as_slice(), tp.desc.fixed_key(XcdrVersion::Xcdr2)));
    os.fini(&DEFAULT_ALLOCATOR);
    img
}

fn key_hash32(tp: &Sertype, inner: &SerdataInner) -> u32 {
    if tp.desc.is_keyless() {
        tp.base_hash
    } else {
        hash_bytes(inner.key.bytes(inner.payload_slice())) ^ tp.base_hash
    }
}
