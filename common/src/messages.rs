//! Wire request/response payloads for every provider endpoint (§6).
//!
//! Every response carries the fixed `ret: i32` status field the wire
//! protocol specifies (0 = success, otherwise one of `BakeError::ret_code`).
//! Internals build these from a `BakeResult<T>` via the `ok`/`err`
//! constructors so handlers never have to set `ret` by hand.

use crate::error::BakeError;
use crate::ids::{RegionId, TargetId};
use serde::{Deserialize, Serialize};

const RET_SUCCESS: i32 = 0;

// ---- probe ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub max_targets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub ret: i32,
    pub num_targets: u64,
    pub targets: Vec<TargetId>,
}

impl ProbeResponse {
    pub fn ok(targets: Vec<TargetId>) -> Self {
        ProbeResponse {
            ret: RET_SUCCESS,
            num_targets: targets.len() as u64,
            targets,
        }
    }

    pub fn err(e: &BakeError) -> Self {
        ProbeResponse {
            ret: e.ret_code(),
            num_targets: 0,
            targets: Vec::new(),
        }
    }
}

// ---- create ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub target_id: TargetId,
    pub region_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub ret: i32,
    pub rid: Option<RegionId>,
}

impl CreateResponse {
    pub fn ok(rid: RegionId) -> Self {
        CreateResponse {
            ret: RET_SUCCESS,
            rid: Some(rid),
        }
    }

    pub fn err(e: &BakeError) -> Self {
        CreateResponse {
            ret: e.ret_code(),
            rid: None,
        }
    }
}

// ---- write (bulk) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub rid: RegionId,
    pub region_offset: u64,
    pub bulk_handle: String,
    pub bulk_offset: u64,
    pub bulk_size: u64,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub ret: i32,
}

impl WriteResponse {
    pub fn ok() -> Self {
        WriteResponse { ret: RET_SUCCESS }
    }

    pub fn err(e: &BakeError) -> Self {
        WriteResponse { ret: e.ret_code() }
    }
}

// ---- eager_write ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerWriteRequest {
    pub rid: RegionId,
    pub region_offset: u64,
    pub size: u32,
    pub buffer: Vec<u8>,
}

pub type EagerWriteResponse = WriteResponse;

// ---- read (bulk) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub rid: RegionId,
    pub region_offset: u64,
    pub bulk_handle: String,
    pub bulk_offset: u64,
    pub bulk_size: u64,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub ret: i32,
    pub size: u64,
}

impl ReadResponse {
    pub fn ok(size: u64) -> Self {
        ReadResponse {
            ret: RET_SUCCESS,
            size,
        }
    }

    pub fn err(e: &BakeError) -> Self {
        ReadResponse {
            ret: e.ret_code(),
            size: 0,
        }
    }
}

// ---- eager_read ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerReadRequest {
    pub rid: RegionId,
    pub region_offset: u64,
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerReadResponse {
    pub ret: i32,
    pub size: u32,
    pub buffer: Vec<u8>,
}

impl EagerReadResponse {
    pub fn ok(buffer: Vec<u8>) -> Self {
        EagerReadResponse {
            ret: RET_SUCCESS,
            size: buffer.len() as u32,
            buffer,
        }
    }

    pub fn err(e: &BakeError) -> Self {
        EagerReadResponse {
            ret: e.ret_code(),
            size: 0,
            buffer: Vec::new(),
        }
    }
}

// ---- persist ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistRequest {
    pub rid: RegionId,
    pub offset: u64,
    pub size: u64,
}

pub type PersistResponse = WriteResponse;

// ---- create_write_persist (bulk) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWritePersistRequest {
    pub target_id: TargetId,
    pub region_size: u64,
    pub region_offset: u64,
    pub bulk_handle: String,
    pub bulk_offset: u64,
    pub bulk_size: u64,
    pub remote_addr: Option<String>,
}

pub type CreateWritePersistResponse = CreateResponse;

// ---- eager_create_write_persist ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerCreateWritePersistRequest {
    pub target_id: TargetId,
    pub size: u32,
    pub buffer: Vec<u8>,
}

pub type EagerCreateWritePersistResponse = CreateResponse;

// ---- get_size ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSizeRequest {
    pub rid: RegionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSizeResponse {
    pub ret: i32,
    pub size: u64,
}

impl GetSizeResponse {
    pub fn ok(size: u64) -> Self {
        GetSizeResponse {
            ret: RET_SUCCESS,
            size,
        }
    }

    pub fn err(e: &BakeError) -> Self {
        GetSizeResponse {
            ret: e.ret_code(),
            size: 0,
        }
    }
}

// ---- get_data (server-local only) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataRequest {
    pub rid: RegionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataResponse {
    pub ret: i32,
    pub ptr: u64,
}

impl GetDataResponse {
    pub fn ok(ptr: u64) -> Self {
        GetDataResponse {
            ret: RET_SUCCESS,
            ptr,
        }
    }

    pub fn err(e: &BakeError) -> Self {
        GetDataResponse {
            ret: e.ret_code(),
            ptr: 0,
        }
    }
}

// ---- remove ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub rid: RegionId,
}

pub type RemoveResponse = WriteResponse;

// ---- noop ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoopRequest;

pub type NoopResponse = WriteResponse;

// ---- migrate_region ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateRegionRequest {
    pub source_rid: RegionId,
    pub region_size: u64,
    pub remove_src: bool,
    pub dest_addr: String,
    pub dest_provider_id: u16,
    pub dest_target_id: TargetId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateRegionResponse {
    pub ret: i32,
    pub dest_rid: Option<RegionId>,
}

impl MigrateRegionResponse {
    pub fn ok(dest_rid: RegionId) -> Self {
        MigrateRegionResponse {
            ret: RET_SUCCESS,
            dest_rid: Some(dest_rid),
        }
    }

    pub fn err(e: &BakeError) -> Self {
        MigrateRegionResponse {
            ret: e.ret_code(),
            dest_rid: None,
        }
    }
}

// ---- migrate_target ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateTargetRequest {
    pub target_id: TargetId,
    pub dest_remi_addr: String,
    pub dest_remi_provider_id: u16,
    pub dest_root: String,
    pub remove_src: bool,
}

pub type MigrateTargetResponse = WriteResponse;

/// The bus-wide message envelope carried between caryatid modules as
/// `Arc<Message>` (matching the aggregate `Message` enum shape used in
/// `acropolis_common::messages`). Each provider endpoint gets a request and
/// a response variant; the daemon's provider module registers one
/// `context.handle` per request variant and replies with the matching
/// response variant wrapped the same way.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub enum Message {
    #[default]
    None,

    Probe(ProbeRequest),
    ProbeResponse(ProbeResponse),
    Create(CreateRequest),
    CreateResponse(CreateResponse),
    Write(WriteRequest),
    WriteResponse(WriteResponse),
    EagerWrite(EagerWriteRequest),
    EagerWriteResponse(EagerWriteResponse),
    Read(ReadRequest),
    ReadResponse(ReadResponse),
    EagerRead(EagerReadRequest),
    EagerReadResponse(EagerReadResponse),
    Persist(PersistRequest),
    PersistResponse(PersistResponse),
    CreateWritePersist(CreateWritePersistRequest),
    CreateWritePersistResponse(CreateWritePersistResponse),
    EagerCreateWritePersist(EagerCreateWritePersistRequest),
    EagerCreateWritePersistResponse(EagerCreateWritePersistResponse),
    GetSize(GetSizeRequest),
    GetSizeResponse(GetSizeResponse),
    GetData(GetDataRequest),
    GetDataResponse(GetDataResponse),
    Remove(RemoveRequest),
    RemoveResponse(RemoveResponse),
    Noop(NoopRequest),
    NoopResponse(NoopResponse),
    MigrateRegion(MigrateRegionRequest),
    MigrateRegionResponse(MigrateRegionResponse),
    MigrateTarget(MigrateTargetRequest),
    MigrateTargetResponse(MigrateTargetResponse),
}
