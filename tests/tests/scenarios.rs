//! End-to-end scenarios S1-S6 (spec.md §8), driven through the provider
//! dispatch layer exactly as a real RPC call would be, using the loopback
//! transport in place of the external RDMA fabric (§1).

use bake_common::config::{FileBackendConfig, ProviderConfig};
use bake_common::ids::TargetId;
use bake_common::messages::*;
use bake_module_provider::{dispatch, BakeProvider, InProcessMigrationClient, LocalFileSetShipper, ProviderDirectory};
use bake_module_transport::LoopbackTransport;
use std::sync::Arc;

async fn file_provider(dir: &std::path::Path, nlogs: u32, alignment: u64) -> (Arc<BakeProvider>, TargetId, Arc<LoopbackTransport>) {
    let mut config = ProviderConfig::default();
    config.file_backend = FileBackendConfig {
        nlogs,
        alignment,
        sync: true,
        directio: false,
        abtio_nthreads: 4,
        targets: Vec::new(),
    };
    let transport = Arc::new(LoopbackTransport::new());
    let directory = Arc::new(ProviderDirectory::new());
    let provider = BakeProvider::new(
        1,
        "local".to_string(),
        config,
        transport.clone(),
        Arc::new(LocalFileSetShipper),
        Arc::new(InProcessMigrationClient::new(directory)),
    )
    .unwrap();
    let target_id = provider.attach_file_target(dir.to_str().unwrap()).await.unwrap();
    (provider, target_id, transport)
}

#[tokio::test]
async fn s1_create_write_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, target_id, transport) = file_provider(dir.path(), 4, 4096).await;

    let size = 1 << 20;
    let created = dispatch(&provider, Message::Create(CreateRequest { target_id, region_size: size })).await;
    let Message::CreateResponse(created) = created else { panic!("wrong response") };
    let rid = created.rid.unwrap();

    let write_handle = transport.register(vec![0xA5u8; size as usize]).await;
    let write_resp = dispatch(
        &provider,
        Message::Write(WriteRequest {
            rid,
            region_offset: 0,
            bulk_handle: write_handle,
            bulk_offset: 0,
            bulk_size: size,
            remote_addr: None,
        }),
    )
    .await;
    assert!(matches!(write_resp, Message::WriteResponse(r) if r.ret == 0));

    let persist_resp = dispatch(&provider, Message::Persist(PersistRequest { rid, offset: 0, size })).await;
    assert!(matches!(persist_resp, Message::PersistResponse(r) if r.ret == 0));

    let read_handle = transport.register(vec![0u8; size as usize]).await;
    let read_resp = dispatch(
        &provider,
        Message::Read(ReadRequest {
            rid,
            region_offset: 0,
            bulk_handle: read_handle.clone(),
            bulk_offset: 0,
            bulk_size: size,
            remote_addr: None,
        }),
    )
    .await;
    assert!(matches!(read_resp, Message::ReadResponse(r) if r.ret == 0 && r.size == size));

    let out = transport.contents(&read_handle).await.unwrap();
    assert!(out.iter().all(|&b| b == 0xA5));
}

#[tokio::test]
async fn s2_eager_write_below_eager_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, target_id, _transport) = file_provider(dir.path(), 2, 4096).await;

    let created = dispatch(&provider, Message::Create(CreateRequest { target_id, region_size: 128 })).await;
    let Message::CreateResponse(created) = created else { panic!("wrong response") };
    let rid = created.rid.unwrap();

    let payload: Vec<u8> = (0..128u32).map(|b| b as u8).collect();
    let write_resp = dispatch(
        &provider,
        Message::EagerWrite(EagerWriteRequest { rid, region_offset: 0, size: 128, buffer: payload.clone() }),
    )
    .await;
    assert!(matches!(write_resp, Message::EagerWriteResponse(r) if r.ret == 0));

    let read_resp = dispatch(&provider, Message::EagerRead(EagerReadRequest { rid, region_offset: 0, size: 128 })).await;
    let Message::EagerReadResponse(read_resp) = read_resp else { panic!("wrong response") };
    assert_eq!(read_resp.ret, 0);
    assert_eq!(read_resp.buffer, payload);
}

#[tokio::test]
async fn s3_two_concurrent_writers_disjoint_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, target_id, transport) = file_provider(dir.path(), 4, 4096).await;

    let size = 2 << 20;
    let created = dispatch(&provider, Message::Create(CreateRequest { target_id, region_size: size })).await;
    let Message::CreateResponse(created) = created else { panic!("wrong response") };
    let rid = created.rid.unwrap();

    let half = size / 2;
    let handle_a = transport.register(vec![0x11u8; half as usize]).await;
    let handle_b = transport.register(vec![0x22u8; half as usize]).await;

    let write_a = dispatch(
        &provider,
        Message::Write(WriteRequest {
            rid,
            region_offset: 0,
            bulk_handle: handle_a,
            bulk_offset: 0,
            bulk_size: half,
            remote_addr: None,
        }),
    );
    let write_b = dispatch(
        &provider,
        Message::Write(WriteRequest {
            rid,
            region_offset: half,
            bulk_handle: handle_b,
            bulk_offset: 0,
            bulk_size: half,
            remote_addr: None,
        }),
    );
    let (resp_a, resp_b) = tokio::join!(write_a, write_b);
    assert!(matches!(resp_a, Message::WriteResponse(r) if r.ret == 0));
    assert!(matches!(resp_b, Message::WriteResponse(r) if r.ret == 0));

    dispatch(&provider, Message::Persist(PersistRequest { rid, offset: 0, size })).await;

    let read_handle = transport.register(vec![0u8; size as usize]).await;
    dispatch(
        &provider,
        Message::Read(ReadRequest {
            rid,
            region_offset: 0,
            bulk_handle: read_handle.clone(),
            bulk_offset: 0,
            bulk_size: size,
            remote_addr: None,
        }),
    )
    .await;
    let out = transport.contents(&read_handle).await.unwrap();
    assert!(out[..half as usize].iter().all(|&b| b == 0x11));
    assert!(out[half as usize..].iter().all(|&b| b == 0x22));
}

#[tokio::test]
async fn s4_bounds_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, target_id, transport) = file_provider(dir.path(), 2, 4096).await;

    let created = dispatch(&provider, Message::Create(CreateRequest { target_id, region_size: 1024 })).await;
    let Message::CreateResponse(created) = created else { panic!("wrong response") };
    let rid = created.rid.unwrap();

    let handle = transport.register(vec![0xFFu8; 1024]).await;
    let write_resp = dispatch(
        &provider,
        Message::Write(WriteRequest {
            rid,
            region_offset: 512,
            bulk_handle: handle,
            bulk_offset: 0,
            bulk_size: 1024,
            remote_addr: None,
        }),
    )
    .await;
    let Message::WriteResponse(write_resp) = write_resp else { panic!("wrong response") };
    assert_eq!(write_resp.ret, bake_common::error::BakeError::OutOfBounds.ret_code());

    let read_handle = transport.register(vec![0u8; 1024]).await;
    let read_resp = dispatch(
        &provider,
        Message::Read(ReadRequest {
            rid,
            region_offset: 0,
            bulk_handle: read_handle,
            bulk_offset: 0,
            bulk_size: 1024,
            remote_addr: None,
        }),
    )
    .await;
    assert!(matches!(read_resp, Message::ReadResponse(r) if r.ret == 0));
}

#[tokio::test]
async fn s5_hole_punch_isolates_neighbors() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, target_id, transport) = file_provider(dir.path(), 2, 4096).await;

    let mut rids = Vec::new();
    for pattern in [0x11u8, 0x22, 0x33] {
        let created = dispatch(&provider, Message::Create(CreateRequest { target_id, region_size: 64 * 1024 })).await;
        let Message::CreateResponse(created) = created else { panic!("wrong response") };
        let rid = created.rid.unwrap();
        let handle = transport.register(vec![pattern; 64 * 1024]).await;
        dispatch(
            &provider,
            Message::Write(WriteRequest {
                rid,
                region_offset: 0,
                bulk_handle: handle,
                bulk_offset: 0,
                bulk_size: 64 * 1024,
                remote_addr: None,
            }),
        )
        .await;
        dispatch(&provider, Message::Persist(PersistRequest { rid, offset: 0, size: 64 * 1024 })).await;
        rids.push(rid);
    }

    let remove_resp = dispatch(&provider, Message::Remove(RemoveRequest { rid: rids[1] })).await;
    assert!(matches!(remove_resp, Message::RemoveResponse(r) if r.ret == 0));

    for (rid, pattern) in [(rids[0], 0x11u8), (rids[2], 0x33)] {
        let read_handle = transport.register(vec![0u8; 64 * 1024]).await;
        dispatch(
            &provider,
            Message::Read(ReadRequest {
                rid,
                region_offset: 0,
                bulk_handle: read_handle.clone(),
                bulk_offset: 0,
                bulk_size: 64 * 1024,
                remote_addr: None,
            }),
        )
        .await;
        let out = transport.contents(&read_handle).await.unwrap();
        assert!(out.iter().all(|&b| b == pattern));
    }
}

#[tokio::test]
async fn s6_probe_after_multi_attach() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let dir_mem = tempfile::tempdir().unwrap();

    let mut config = ProviderConfig::default();
    config.file_backend.nlogs = 2;
    let directory = Arc::new(ProviderDirectory::new());
    let provider = BakeProvider::new(
        1,
        "local".to_string(),
        config,
        Arc::new(LoopbackTransport::new()),
        Arc::new(LocalFileSetShipper),
        Arc::new(InProcessMigrationClient::new(directory)),
    )
    .unwrap();

    let t1 = provider.attach_file_target(dir_a.path().to_str().unwrap()).await.unwrap();
    let t2 = provider.attach_file_target(dir_b.path().to_str().unwrap()).await.unwrap();
    let t3 = provider.attach_mem_target(dir_mem.path().join("pool").to_str().unwrap()).await.unwrap();

    let probe1 = dispatch(&provider, Message::Probe(ProbeRequest { max_targets: 16 })).await;
    let probe2 = dispatch(&provider, Message::Probe(ProbeRequest { max_targets: 16 })).await;

    let Message::ProbeResponse(probe1) = probe1 else { panic!("wrong response") };
    let Message::ProbeResponse(probe2) = probe2 else { panic!("wrong response") };

    assert_eq!(probe1.num_targets, 3);
    let mut got: Vec<_> = probe1.targets.clone();
    got.sort_by_key(|t| t.to_string());
    let mut want = vec![t1, t2, t3];
    want.sort_by_key(|t| t.to_string());
    assert_eq!(got, want);

    let mut got2 = probe2.targets;
    got2.sort_by_key(|t| t.to_string());
    assert_eq!(got, got2);
}
