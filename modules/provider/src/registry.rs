//! The per-provider target registry (L8, §3 "Provider (in memory)", §5
//! "Registry rwlock").
//!
//! A plain `HashMap<TargetId, AttachedTarget>` behind a `tokio::sync::RwLock`:
//! every per-region operation takes the read lock for its entire duration;
//! attach/detach and target migration take the write lock (§5).

use bake_common::error::{BakeError, BakeResult};
use bake_common::ids::{RegionId, TargetId};
use bake_module_target_engine::Backend;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Which concrete backend a target uses, kept alongside the trait object
/// for diagnostics and for `migrate_target`'s fileset enumeration (only
/// meaningful for the file backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    File,
    Mem,
}

pub struct AttachedTarget {
    pub target_id: TargetId,
    pub backend: Arc<dyn Backend>,
    pub kind: BackendKind,
}

#[derive(Default)]
pub struct Registry {
    targets: RwLock<HashMap<TargetId, Arc<AttachedTarget>>>,
}

/// Holds the registry's read lock for as long as the caller holds the
/// guard, so a per-region or per-target operation keeps the lock for its
/// entire duration (§5 "Registry rwlock... read-locked by every per-region
/// operation for its entire duration"). `attach`/`detach` take the write
/// lock, which `tokio::sync::RwLock`'s fairness blocks until every
/// outstanding `TargetGuard` has been dropped — the lock itself is what
/// makes detach/migrate wait out in-flight operations, no extra bookkeeping
/// needed.
pub struct TargetGuard<'a> {
    _guard: RwLockReadGuard<'a, HashMap<TargetId, Arc<AttachedTarget>>>,
    target: Arc<AttachedTarget>,
}

impl Deref for TargetGuard<'_> {
    type Target = AttachedTarget;
    fn deref(&self) -> &AttachedTarget {
        &self.target
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub async fn attach(&self, target: AttachedTarget) {
        self.targets.write().await.insert(target.target_id, Arc::new(target));
    }

    /// Removes a target from the registry and returns it so the caller can
    /// run its `finalize` outside the write lock (§5 "Never held across
    /// I/O"). Blocks until every `TargetGuard` referencing this registry has
    /// been dropped, i.e. until every in-flight per-region operation has
    /// finished.
    pub async fn detach(&self, target_id: &TargetId) -> Option<Arc<AttachedTarget>> {
        self.targets.write().await.remove(target_id)
    }

    pub async fn get(&self, target_id: &TargetId) -> BakeResult<TargetGuard<'_>> {
        let guard = self.targets.read().await;
        match guard.get(target_id).cloned() {
            Some(target) => Ok(TargetGuard { _guard: guard, target }),
            None => Err(BakeError::UnknownTarget),
        }
    }

    /// Resolves a bare region id to the target that owns it, by asking every
    /// attached target of the matching backend kind whether it recognizes
    /// the id (§C.8 of the expanded spec: region ids carry no target
    /// reference on the wire, matching the source's own `bti`-less
    /// `write`/`read`/`persist`/`get_size`/`migrate_region` requests).
    /// Deployments that attach more than one target per backend kind to the
    /// same provider process must rely on region ids routing unambiguously
    /// by construction; this scan is the best a provider can do from the id
    /// alone and mirrors the source's single-pool-per-process assumption.
    pub async fn resolve(&self, rid: RegionId) -> BakeResult<TargetGuard<'_>> {
        let guard = self.targets.read().await;
        for target in guard.values() {
            if target.backend.owns_region(rid).await {
                return Ok(TargetGuard {
                    _guard: guard,
                    target: target.clone(),
                });
            }
        }
        Err(BakeError::UnknownRegion)
    }

    pub async fn target_ids(&self) -> Vec<TargetId> {
        self.targets.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drains every target, for provider finalization (§4.6 "Provider
    /// lifecycle": deregister calls `finalize` on every backend context).
    pub async fn drain(&self) -> Vec<Arc<AttachedTarget>> {
        self.targets.write().await.drain().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bake_common::error::BakeResult as Result_;
    use bake_common::ids::RegionId;
    use bake_module_transport::BulkTransport;

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        async fn create(&self, _size: u64) -> Result_<RegionId> {
            unimplemented!()
        }
        async fn write_raw(&self, _rid: RegionId, _offset: u64, _data: &[u8]) -> Result_<()> {
            unimplemented!()
        }
        async fn write_bulk(
            &self,
            _rid: RegionId,
            _region_offset: u64,
            _size: u64,
            _transport: Arc<dyn BulkTransport>,
            _remote_addr: &str,
            _remote_bulk: &str,
            _remote_bulk_offset: u64,
        ) -> Result_<()> {
            unimplemented!()
        }
        async fn read_raw(&self, _rid: RegionId, _offset: u64, _size: u64) -> Result_<Vec<u8>> {
            unimplemented!()
        }
        async fn read_bulk(
            &self,
            _rid: RegionId,
            _region_offset: u64,
            _size: u64,
            _transport: Arc<dyn BulkTransport>,
            _remote_addr: &str,
            _remote_bulk: &str,
            _remote_bulk_offset: u64,
        ) -> Result_<u64> {
            unimplemented!()
        }
        async fn persist(&self, _rid: RegionId, _offset: u64, _size: u64) -> Result_<()> {
            unimplemented!()
        }
        async fn get_region_size(&self, _rid: RegionId) -> Result_<u64> {
            unimplemented!()
        }
        async fn get_region_data(&self, _rid: RegionId) -> Result_<u64> {
            unimplemented!()
        }
        async fn remove(&self, _rid: RegionId) -> Result_<()> {
            unimplemented!()
        }
        async fn finalize(&self) -> Result_<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn attach_then_lookup_then_detach() {
        let reg = Registry::new();
        let id = TargetId::new();
        reg.attach(AttachedTarget {
            target_id: id,
            backend: Arc::new(NullBackend),
            kind: BackendKind::Mem,
        })
        .await;
        assert!(reg.get(&id).await.is_ok());
        assert_eq!(reg.target_ids().await, vec![id]);
        assert!(reg.detach(&id).await.is_some());
        assert_eq!(reg.get(&id).await.unwrap_err(), BakeError::UnknownTarget);
    }

    #[tokio::test]
    async fn probe_set_is_stable_across_repeated_calls() {
        let reg = Registry::new();
        let a = TargetId::new();
        let b = TargetId::new();
        reg.attach(AttachedTarget { target_id: a, backend: Arc::new(NullBackend), kind: BackendKind::File }).await;
        reg.attach(AttachedTarget { target_id: b, backend: Arc::new(NullBackend), kind: BackendKind::File }).await;
        let mut first = reg.target_ids().await;
        let mut second = reg.target_ids().await;
        first.sort_by_key(|t| t.to_string());
        second.sort_by_key(|t| t.to_string());
        assert_eq!(first, second);
    }
}
