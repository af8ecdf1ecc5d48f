//! The provider module (L8-L11, spec.md §3-§6): target registry, dispatch,
//! lifecycle/configuration and migration hooks tied together behind
//! [`BakeProvider`].

pub mod dispatch;
pub mod lifecycle;
pub mod migration;
pub mod module;
pub mod provider;
pub mod registry;

pub use dispatch::dispatch;
pub use lifecycle::{attach_configured_targets, load_config};
pub use migration::{DirectoryTarget, FileSetShipper, InProcessMigrationClient, LocalFileSetShipper, MigrationClient, ProviderDirectory};
pub use module::BakeProviderModule;
pub use provider::BakeProvider;
pub use registry::{AttachedTarget, BackendKind, Registry, TargetGuard};
