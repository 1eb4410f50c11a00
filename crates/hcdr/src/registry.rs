// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide runtime state: the sertype registry and the serdata pool,
//! bundled in an explicit object rather than module-level singletons.
//!
//! The registry deduplicates types by name: a second registration with an
//! identical descriptor returns the existing entry; lookups clone the Arc.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::desc::CdrDesc;
use crate::serdata::{hash_bytes, SerdataPool};
use crate::ser::XcdrVersion;

/// A topic type: name, descriptor and the write-side encoding, bound to the
/// runtime's serdata pool.
pub struct Sertype {
    pub name: String,
    pub desc: CdrDesc,
    pub write_encoding: XcdrVersion,
    pub(crate) base_hash: u32,
    pub(crate) pool: Arc<SerdataPool>,
}

impl Sertype {
    fn new(
        name: &str,
        desc: CdrDesc,
        write_encoding: XcdrVersion,
        pool: Arc<SerdataPool>,
    ) -> Self {
        let mut seed = Vec::with_capacity(name.len() + desc.ops.len() * 4);
        seed.extend_from_slice(name.as_bytes());
        for w in &desc.ops {
            seed.extend_from_slice(&w.to_le_bytes());
        }
        let base_hash = hash_bytes(&seed);
        Self { name: name.to_string(), desc, write_encoding, base_hash, pool }
    }

    fn matches(&self, desc: &CdrDesc, write_encoding: XcdrVersion) -> bool {
        self.desc == *desc && self.write_encoding == write_encoding
    }
}

pub struct CdrRuntime {
    pool: Arc<SerdataPool>,
    types: Mutex<HashMap<String, Arc<Sertype>>>,
}

impl CdrRuntime {
    pub fn new() -> Self {
        Self::with_pool(SerdataPool::default())
    }

    pub fn with_pool(pool: SerdataPool) -> Self {
        Self { pool: Arc::new(pool), types: Mutex::new(HashMap::new()) }
    }

    pub fn pool(&self) -> &Arc<SerdataPool> {
        &self.pool
    }

    /// Register a type, or return the already-registered equal one.
    ///
    /// A name collision with a different descriptor does not displace the
    /// registered type; the caller gets a private, unregistered sertype.
    pub fn sertype(
        &self,
        name: &str,
        desc: CdrDesc,
        write_encoding: XcdrVersion,
    ) -> Arc<Sertype> {
        let mut types = self.types.lock();
        if let Some(existing) = types.get(name) {
            if existing.matches(&desc, write_encoding) {
                return Arc::clone(existing);
            }
            log::debug!("[registry] type '{}' re-registered with a different descriptor", name);
            return Arc::new(Sertype::new(name, desc, write_encoding, Arc::clone(&self.pool)));
        }
        let st = Arc::new(Sertype::new(name, desc, write_encoding, Arc::clone(&self.pool)));
        types.insert(name.to_string(), Arc::clone(&st));
        st
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Sertype>> {
        self.types.lock().get(name).map(Arc::clone)
    }

    /// Drop a registration when nothing else references it. Returns true
    /// when the entry was removed.
    pub fn release(&self, name: &str) -> bool {
        let mut types = self.types.lock();
        if let Some(st) = types.get(name) {
            if Arc::strong_count(st) == 1 {
                types.remove(name);
                return true;
            }
        }
        false
    }

    pub fn type_count(&self) -> usize {
        self.types.lock().len()
    }
}

impl Default for CdrRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{OP_ADR, OP_RTS, TYPE_4BY};

    fn desc() -> CdrDesc {
        CdrDesc::new(4, 4, 0, vec![], vec![OP_ADR | TYPE_4BY, 0, OP_RTS])
    }

    #[test]
    fn test_registry_dedup() {
        let rt = CdrRuntime::new();
        let a = rt.sertype("T", desc(), XcdrVersion::Xcdr2);
        let b = rt.sertype("T", desc(), XcdrVersion::Xcdr2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(rt.type_count(), 1);
    }

    #[test]
    fn test_registry_conflict_stays_private() {
        let rt = CdrRuntime::new();
        let a = rt.sertype("T", desc(), XcdrVersion::Xcdr2);
        let other = CdrDesc::new(8, 4, 0, vec![], vec![OP_ADR | TYPE_4BY, 4, OP_RTS]);
        let b = rt.sertype("T", other, XcdrVersion::Xcdr2);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&rt.lookup("T").unwrap(), &a));
    }

    #[test]
    fn test_release_only_when_unreferenced() {
        let rt = CdrRuntime::new();
        let a = rt.sertype("T", desc(), XcdrVersion::Xcdr1);
        assert!(!rt.release("T"));
        drop(a);
        assert!(rt.release("T"));
        assert_eq!(rt.type_count(), 0);
    }
}
