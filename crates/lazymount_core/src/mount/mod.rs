//! Module mount registrar.
//!
//! # Responsibility
//! - Keep the page's module types and their factories.
//! - Turn a mount point into exactly one live module instance.
//!
//! # Invariants
//! - A mount point id is mounted at most once until it is unmounted.
//! - A failed mount leaves the registrar unchanged.
//! - Sibling mount points never share extracted properties.

mod mount_point;
mod registry;

pub use mount_point::MountPoint;
pub use registry::{
    InstanceId, ModuleFactory, ModuleInstance, ModuleRegistry, MountError, MountResult,
    MountedModule, PreparedMount,
};
