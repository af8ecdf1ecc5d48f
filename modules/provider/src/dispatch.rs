//! Provider dispatch (L9, §6 "Wire protocol"): one handler per RPC endpoint,
//! plus a [`dispatch`] entry point that matches an inbound [`Message`] to its
//! handler and wraps the result back into the matching response variant.
//!
//! Per-region operations (`write`, `eager_write`, `read`, `eager_read`,
//! `persist`, `get_size`, `get_data`, `remove`, the source side of
//! `migrate_region`) carry no target id on the wire — the source's own
//! `bake_write_in_t`/`bake_read_in_t`/`bake_persist_in_t`/`bake_get_size_in_t`
//! all comment their `bti` field out, resolving purely from the region id.
//! [`Registry::resolve`] reproduces that by probing every attached target
//! of the matching backend kind (§C.8 of the expanded spec). Only `create`,
//! `create_write_persist` and `migrate_target` name an explicit target,
//! exactly as in the source, since those are the calls where the target
//! doesn't yet follow from a region id.

use crate::provider::BakeProvider;
use bake_common::error::{BakeError, BakeResult};
use bake_common::messages::*;

/// Matches `msg` to its handler and returns the paired response variant.
/// Requests with no matching handler (any response variant, or `None`) come
/// back as `Message::None`.
pub async fn dispatch(provider: &BakeProvider, msg: Message) -> Message {
    match msg {
        Message::Probe(req) => Message::ProbeResponse(handle_probe(provider, req).await),
        Message::Create(req) => Message::CreateResponse(handle_create(provider, req).await),
        Message::Write(req) => Message::WriteResponse(handle_write(provider, req).await),
        Message::EagerWrite(req) => Message::EagerWriteResponse(handle_eager_write(provider, req).await),
        Message::Read(req) => Message::ReadResponse(handle_read(provider, req).await),
        Message::EagerRead(req) => Message::EagerReadResponse(handle_eager_read(provider, req).await),
        Message::Persist(req) => Message::PersistResponse(handle_persist(provider, req).await),
        Message::CreateWritePersist(req) => {
            Message::CreateWritePersistResponse(handle_create_write_persist(provider, req).await)
        }
        Message::EagerCreateWritePersist(req) => {
            Message::EagerCreateWritePersistResponse(handle_eager_create_write_persist(provider, req).await)
        }
        Message::GetSize(req) => Message::GetSizeResponse(handle_get_size(provider, req).await),
        Message::GetData(req) => Message::GetDataResponse(handle_get_data(provider, req).await),
        Message::Remove(req) => Message::RemoveResponse(handle_remove(provider, req).await),
        Message::Noop(req) => Message::NoopResponse(handle_noop(provider, req).await),
        Message::MigrateRegion(req) => Message::MigrateRegionResponse(handle_migrate_region(provider, req).await),
        Message::MigrateTarget(req) => Message::MigrateTargetResponse(handle_migrate_target(provider, req).await),
        _ => Message::None,
    }
}

/// `probe`: lists every currently attached target, capped at
/// `req.max_targets` (§6 "probe").
pub async fn handle_probe(provider: &BakeProvider, req: ProbeRequest) -> ProbeResponse {
    let mut targets = provider.registry.target_ids().await;
    targets.truncate(req.max_targets as usize);
    ProbeResponse::ok(targets)
}

/// `create`: allocates a new region on `req.target_id` (§6 "create", §4.4).
pub async fn handle_create(provider: &BakeProvider, req: CreateRequest) -> CreateResponse {
    match create_on_target(provider, &req.target_id, req.region_size).await {
        Ok(rid) => CreateResponse::ok(rid),
        Err(e) => CreateResponse::err(&e),
    }
}

async fn create_on_target(
    provider: &BakeProvider,
    target_id: &bake_common::ids::TargetId,
    size: u64,
) -> BakeResult<bake_common::ids::RegionId> {
    let target = provider.registry.get(target_id).await?;
    target.backend.create(size).await
}

/// `write`: bulk-mode write, pulling from the caller's registered bulk
/// handle (§6 "write", §4.3).
pub async fn handle_write(provider: &BakeProvider, req: WriteRequest) -> WriteResponse {
    match write_bulk(provider, req).await {
        Ok(()) => WriteResponse::ok(),
        Err(e) => WriteResponse::err(&e),
    }
}

async fn write_bulk(provider: &BakeProvider, req: WriteRequest) -> BakeResult<()> {
    let target = provider.registry.resolve(req.rid).await?;
    target
        .backend
        .write_bulk(
            req.rid,
            req.region_offset,
            req.bulk_size,
            provider.transport.clone(),
            req.remote_addr.as_deref().unwrap_or(&provider.self_addr),
            &req.bulk_handle,
            req.bulk_offset,
        )
        .await
}

/// `eager_write`: small writes inlined in the request itself, no bulk
/// handle round trip (§6 "eager_write", §4.4 edge case "tiny writes").
pub async fn handle_eager_write(provider: &BakeProvider, req: EagerWriteRequest) -> EagerWriteResponse {
    match eager_write(provider, req).await {
        Ok(()) => WriteResponse::ok(),
        Err(e) => WriteResponse::err(&e),
    }
}

async fn eager_write(provider: &BakeProvider, req: EagerWriteRequest) -> BakeResult<()> {
    if req.buffer.len() != req.size as usize {
        return Err(BakeError::InvalidArg("eager_write size does not match buffer length".into()));
    }
    let target = provider.registry.resolve(req.rid).await?;
    target.backend.write_raw(req.rid, req.region_offset, &req.buffer).await
}

/// `read`: bulk-mode read, pushing into the caller's registered bulk handle
/// (§6 "read").
pub async fn handle_read(provider: &BakeProvider, req: ReadRequest) -> ReadResponse {
    match read_bulk(provider, req).await {
        Ok(size) => ReadResponse::ok(size),
        Err(e) => ReadResponse::err(&e),
    }
}

async fn read_bulk(provider: &BakeProvider, req: ReadRequest) -> BakeResult<u64> {
    let target = provider.registry.resolve(req.rid).await?;
    target
        .backend
        .read_bulk(
            req.rid,
            req.region_offset,
            req.bulk_size,
            provider.transport.clone(),
            req.remote_addr.as_deref().unwrap_or(&provider.self_addr),
            &req.bulk_handle,
            req.bulk_offset,
        )
        .await
}

/// `eager_read`: small reads returned inline in the response (§6
/// "eager_read").
pub async fn handle_eager_read(provider: &BakeProvider, req: EagerReadRequest) -> EagerReadResponse {
    match eager_read(provider, req).await {
        Ok(buf) => EagerReadResponse::ok(buf),
        Err(e) => EagerReadResponse::err(&e),
    }
}

async fn eager_read(provider: &BakeProvider, req: EagerReadRequest) -> BakeResult<Vec<u8>> {
    let target = provider.registry.resolve(req.rid).await?;
    target.backend.read_raw(req.rid, req.region_offset, req.size as u64).await
}

/// `persist`: durability barrier on a region (§6 "persist", §4.4/§4.5).
pub async fn handle_persist(provider: &BakeProvider, req: PersistRequest) -> PersistResponse {
    match persist(provider, req).await {
        Ok(()) => WriteResponse::ok(),
        Err(e) => WriteResponse::err(&e),
    }
}

async fn persist(provider: &BakeProvider, req: PersistRequest) -> BakeResult<()> {
    let target = provider.registry.resolve(req.rid).await?;
    target.backend.persist(req.rid, req.offset, req.size).await
}

/// `create_write_persist`: `create` + bulk `write` + `persist` in one call
/// (§6, §C.4 of the expanded spec: defaults to the three-call composition
/// unless the backend specializes it).
pub async fn handle_create_write_persist(
    provider: &BakeProvider,
    req: CreateWritePersistRequest,
) -> CreateWritePersistResponse {
    match create_write_persist_bulk(provider, req).await {
        Ok(rid) => CreateResponse::ok(rid),
        Err(e) => CreateResponse::err(&e),
    }
}

async fn create_write_persist_bulk(
    provider: &BakeProvider,
    req: CreateWritePersistRequest,
) -> BakeResult<bake_common::ids::RegionId> {
    let target = provider.registry.get(&req.target_id).await?;
    let remote_addr = req.remote_addr.as_deref().unwrap_or(&provider.self_addr);
    if let Some(specialized) = target
        .backend
        .create_write_persist_bulk(
            req.region_size,
            provider.transport.clone(),
            remote_addr,
            &req.bulk_handle,
            req.bulk_offset,
            req.bulk_size,
        )
        .await
    {
        return specialized;
    }
    let rid = target.backend.create(req.region_size).await?;
    target
        .backend
        .write_bulk(
            rid,
            req.region_offset,
            req.bulk_size,
            provider.transport.clone(),
            remote_addr,
            &req.bulk_handle,
            req.bulk_offset,
        )
        .await?;
    target.backend.persist(rid, req.region_offset, req.bulk_size).await?;
    Ok(rid)
}

/// `eager_create_write_persist`: the eager-mode counterpart, data inlined in
/// the request (§6).
pub async fn handle_eager_create_write_persist(
    provider: &BakeProvider,
    req: EagerCreateWritePersistRequest,
) -> EagerCreateWritePersistResponse {
    match eager_create_write_persist(provider, req).await {
        Ok(rid) => CreateResponse::ok(rid),
        Err(e) => CreateResponse::err(&e),
    }
}

async fn eager_create_write_persist(
    provider: &BakeProvider,
    req: EagerCreateWritePersistRequest,
) -> BakeResult<bake_common::ids::RegionId> {
    if req.buffer.len() != req.size as usize {
        return Err(BakeError::InvalidArg(
            "eager_create_write_persist size does not match buffer length".into(),
        ));
    }
    let target = provider.registry.get(&req.target_id).await?;
    if let Some(specialized) = target
        .backend
        .create_write_persist_raw(req.size as u64, &req.buffer)
        .await
    {
        return specialized;
    }
    let rid = target.backend.create(req.size as u64).await?;
    target.backend.write_raw(rid, 0, &req.buffer).await?;
    target.backend.persist(rid, 0, req.size as u64).await?;
    Ok(rid)
}

/// `get_size`: a region's logical size (§6 "get_size").
pub async fn handle_get_size(provider: &BakeProvider, req: GetSizeRequest) -> GetSizeResponse {
    match get_size(provider, req).await {
        Ok(size) => GetSizeResponse::ok(size),
        Err(e) => GetSizeResponse::err(&e),
    }
}

async fn get_size(provider: &BakeProvider, req: GetSizeRequest) -> BakeResult<u64> {
    let target = provider.registry.resolve(req.rid).await?;
    target.backend.get_region_size(req.rid).await
}

/// `get_data`: server-local-only raw pointer to a region's bytes (§6
/// "get_data"). Callers outside this process never see the result of this
/// call — the daemon only exposes it to in-process collaborators.
pub async fn handle_get_data(provider: &BakeProvider, req: GetDataRequest) -> GetDataResponse {
    match get_data(provider, req).await {
        Ok(ptr) => GetDataResponse::ok(ptr),
        Err(e) => GetDataResponse::err(&e),
    }
}

async fn get_data(provider: &BakeProvider, req: GetDataRequest) -> BakeResult<u64> {
    let target = provider.registry.resolve(req.rid).await?;
    target.backend.get_region_data(req.rid).await
}

/// `remove`: deallocates a region (§6 "remove", §4.4/§4.5).
pub async fn handle_remove(provider: &BakeProvider, req: RemoveRequest) -> RemoveResponse {
    match remove(provider, req).await {
        Ok(()) => WriteResponse::ok(),
        Err(e) => WriteResponse::err(&e),
    }
}

async fn remove(provider: &BakeProvider, req: RemoveRequest) -> BakeResult<()> {
    let target = provider.registry.resolve(req.rid).await?;
    target.backend.remove(req.rid).await
}

/// `noop`: liveness probe with no side effect (§6 "noop").
pub async fn handle_noop(_provider: &BakeProvider, _req: NoopRequest) -> NoopResponse {
    WriteResponse::ok()
}

/// `migrate_region`: reads the source region in full, hands it to the
/// destination provider's `create_write_persist` through the migration
/// client, and removes the source on success if `remove_src` was set (§6
/// "migrate_region", §4.4).
pub async fn handle_migrate_region(provider: &BakeProvider, req: MigrateRegionRequest) -> MigrateRegionResponse {
    match migrate_region(provider, req).await {
        Ok(rid) => MigrateRegionResponse::ok(rid),
        Err(e) => MigrateRegionResponse::err(&e),
    }
}

async fn migrate_region(
    provider: &BakeProvider,
    req: MigrateRegionRequest,
) -> BakeResult<bake_common::ids::RegionId> {
    let data = {
        let target = provider.registry.resolve(req.source_rid).await?;
        target.backend.read_raw(req.source_rid, 0, req.region_size).await?
    };
    let dest_rid = provider
        .migration_client
        .create_write_persist(&req.dest_addr, req.dest_provider_id, req.dest_target_id, data)
        .await?;
    if req.remove_src {
        let target = provider.registry.resolve(req.source_rid).await?;
        target.backend.remove(req.source_rid).await?;
    }
    Ok(dest_rid)
}

/// `migrate_target`: ships a whole target's file-set to the destination's
/// REMI endpoint, then detaches the local target if `remove_src` was set
/// (§6 "migrate_target", §4.4).
pub async fn handle_migrate_target(provider: &BakeProvider, req: MigrateTargetRequest) -> MigrateTargetResponse {
    match migrate_target(provider, req).await {
        Ok(()) => WriteResponse::ok(),
        Err(e) => WriteResponse::err(&e),
    }
}

async fn migrate_target(provider: &BakeProvider, req: MigrateTargetRequest) -> BakeResult<()> {
    let files = {
        let target = provider.registry.get(&req.target_id).await?;
        target
            .backend
            .create_fileset()
            .await
            .ok_or_else(|| BakeError::OpUnsupported("target's backend has no file-set to migrate".into()))??
    };
    provider
        .fileset_shipper
        .ship(&files, &req.dest_remi_addr, req.dest_remi_provider_id, &req.dest_root)
        .await?;
    if req.remove_src {
        provider.detach_target(&req.target_id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{InProcessMigrationClient, LocalFileSetShipper, ProviderDirectory};
    use crate::provider::BakeProvider;
    use bake_common::config::ProviderConfig;
    use bake_module_transport::LoopbackTransport;
    use std::sync::Arc;

    async fn provider_with_file_target() -> (Arc<BakeProvider>, bake_common::ids::TargetId, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let directory = Arc::new(ProviderDirectory::new());
        let provider = BakeProvider::new(
            1,
            "self".to_string(),
            ProviderConfig::default(),
            Arc::new(LoopbackTransport::new()),
            Arc::new(LocalFileSetShipper),
            Arc::new(InProcessMigrationClient::new(directory)),
        )
        .unwrap();
        let target_id = provider.attach_file_target(dir.path().join("t0").to_str().unwrap()).await.unwrap();
        (provider, target_id, dir)
    }

    #[tokio::test]
    async fn create_then_eager_write_then_eager_read_round_trips() {
        let (provider, target_id, _dir) = provider_with_file_target().await;
        let created = handle_create(&provider, CreateRequest { target_id, region_size: 4096 }).await;
        assert_eq!(created.ret, 0);
        let rid = created.rid.unwrap();

        let write_resp = handle_eager_write(
            &provider,
            EagerWriteRequest { rid, region_offset: 0, size: 4, buffer: vec![1, 2, 3, 4] },
        )
        .await;
        assert_eq!(write_resp.ret, 0);

        let read_resp = handle_eager_read(&provider, EagerReadRequest { rid, region_offset: 0, size: 4 }).await;
        assert_eq!(read_resp.ret, 0);
        assert_eq!(read_resp.buffer, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn write_against_a_region_id_from_a_different_backend_kind_is_unknown() {
        let (provider, _target_id, _dir) = provider_with_file_target().await;
        let foreign = bake_common::ids::RegionId::from_mem_payload(bake_common::ids::MemRegionPayload {
            pool_uuid_lo: 0,
            offset: 0,
        });
        let resp = handle_eager_write(
            &provider,
            EagerWriteRequest { rid: foreign, region_offset: 0, size: 1, buffer: vec![0] },
        )
        .await;
        assert_eq!(resp.ret, BakeError::UnknownRegion.ret_code());
    }

    #[tokio::test]
    async fn probe_reports_attached_target() {
        let (provider, target_id, _dir) = provider_with_file_target().await;
        let resp = handle_probe(&provider, ProbeRequest { max_targets: 16 }).await;
        assert_eq!(resp.ret, 0);
        assert_eq!(resp.targets, vec![target_id]);
    }

    #[tokio::test]
    async fn noop_always_succeeds() {
        let (provider, _target_id, _dir) = provider_with_file_target().await;
        let resp = handle_noop(&provider, NoopRequest).await;
        assert_eq!(resp.ret, 0);
    }

    #[tokio::test]
    async fn dispatch_routes_create_request_to_create_response() {
        let (provider, target_id, _dir) = provider_with_file_target().await;
        let msg = dispatch(&provider, Message::Create(CreateRequest { target_id, region_size: 1024 })).await;
        assert!(matches!(msg, Message::CreateResponse(r) if r.ret == 0));
    }
}
