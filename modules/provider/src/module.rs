//! Caryatid wiring: registers a [`BakeProvider`] on a single RPC topic, the
//! same `context.handle` pattern the state modules elsewhere in this stack
//! use for their query topics (e.g. `parameters-state`'s
//! `parameters_query_topic`), but carrying every BAKE endpoint behind one
//! topic and [`dispatch`] instead of one topic per query kind.

use crate::dispatch::dispatch;
use crate::lifecycle::attach_configured_targets;
use crate::migration::{InProcessMigrationClient, LocalFileSetShipper, ProviderDirectory};
use crate::provider::BakeProvider;
use anyhow::Result;
use bake_common::config::ProviderConfig;
use bake_common::messages::Message;
use bake_module_transport::LoopbackTransport;
use caryatid_sdk::{module, Context};
use config::Config;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_TOPIC: &str = "bake.rpc";

/// BAKE provider module: one attached-target registry, driven by
/// configuration the way every other module in this process reads its
/// `Arc<Config>` (§4.7).
#[module(message_type(Message), name = "bake-provider", description = "BAKE remote object-storage provider")]
pub struct BakeProviderModule;

impl BakeProviderModule {
    pub async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        let rpc_topic = config.get_string("rpc-topic").unwrap_or_else(|_| DEFAULT_RPC_TOPIC.to_string());
        let provider_id: u16 = config.get_int("provider-id").unwrap_or(1) as u16;
        let self_addr = config.get_string("self-addr").unwrap_or_else(|_| "self".to_string());

        let provider_config = ProviderConfig::from_config(&config)?;

        // A real deployment wires a margo/mercury transport and a REMI
        // client in here instead; the loopback/local-copy stand-ins are
        // adequate for single-process and CLI use (§C.7 of the expanded
        // spec).
        let directory = Arc::new(ProviderDirectory::new());
        let provider = BakeProvider::new(
            provider_id,
            self_addr,
            provider_config,
            Arc::new(LoopbackTransport::new()),
            Arc::new(LocalFileSetShipper),
            Arc::new(InProcessMigrationClient::new(directory)),
        )?;

        attach_configured_targets(&provider).await?;
        info!(topic = rpc_topic, targets = provider.registry.len().await, "bake provider attached");

        context.handle(&rpc_topic, move |message| {
            let provider = provider.clone();
            async move {
                let response = dispatch(&provider, (*message).clone()).await;
                Arc::new(response)
            }
        })?;

        Ok(())
    }
}
