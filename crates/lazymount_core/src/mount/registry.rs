//! Module type registry and instance bookkeeping.

use crate::mount::mount_point::MountPoint;
use crate::props::{extract, TypeCoercionError, TypedProperties};
use crate::store::{StateModule, StoreHandle};
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub type MountResult<T> = Result<T, MountError>;

pub type InstanceId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    UnknownModule { mount_id: String, module_type: String },
    AlreadyMounted(String),
    NotMounted(String),
    DuplicateModuleType(String),
    Coercion {
        mount_id: String,
        source: TypeCoercionError,
    },
}

impl Display for MountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownModule {
                mount_id,
                module_type,
            } => write!(
                f,
                "mount point `{mount_id}` references unregistered module type `{module_type}`"
            ),
            Self::AlreadyMounted(id) => write!(f, "mount point already mounted: {id}"),
            Self::NotMounted(id) => write!(f, "mount point not mounted: {id}"),
            Self::DuplicateModuleType(name) => write!(f, "module type already registered: {name}"),
            Self::Coercion { mount_id, source } => {
                write!(f, "mount point `{mount_id}`: {source}")
            }
        }
    }
}

impl Error for MountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Coercion { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A live module bound to one mount point. Opaque to the runtime.
pub trait ModuleInstance: Send + Sync {
    /// Called once when the mount point is torn down.
    fn unmount(&self) {}
}

/// Builds module instances for one module type.
pub trait ModuleFactory: Send + Sync {
    fn create(
        &self,
        properties: TypedProperties,
        store: Option<StoreHandle>,
    ) -> Box<dyn ModuleInstance>;
}

impl<F> ModuleFactory for F
where
    F: Fn(TypedProperties, Option<StoreHandle>) -> Box<dyn ModuleInstance> + Send + Sync,
{
    fn create(
        &self,
        properties: TypedProperties,
        store: Option<StoreHandle>,
    ) -> Box<dyn ModuleInstance> {
        self(properties, store)
    }
}

/// Bookkeeping for one mounted instance.
pub struct MountedModule {
    pub instance_id: InstanceId,
    pub mount_id: String,
    pub module_type: String,
    pub properties: TypedProperties,
    pub instance: Box<dyn ModuleInstance>,
}

impl Debug for MountedModule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountedModule")
            .field("instance_id", &self.instance_id)
            .field("mount_id", &self.mount_id)
            .field("module_type", &self.module_type)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// A validated mount point whose factory has not run yet.
pub struct PreparedMount {
    mount_id: String,
    module_type: String,
    properties: TypedProperties,
    factory: Arc<dyn ModuleFactory>,
    state: Vec<StateModule>,
}

impl PreparedMount {
    pub fn mount_id(&self) -> &str {
        &self.mount_id
    }

    /// State declarations of the module type; empty when it has none.
    pub fn state_declarations(&self) -> &[StateModule] {
        &self.state
    }

    /// Runs the factory. Needs no registry access, so factories may call
    /// back into the runtime.
    pub fn create(self, store: Option<StoreHandle>) -> MountedModule {
        let instance = self.factory.create(self.properties.clone(), store);
        MountedModule {
            instance_id: Uuid::new_v4(),
            mount_id: self.mount_id,
            module_type: self.module_type,
            properties: self.properties,
            instance,
        }
    }
}

impl Debug for PreparedMount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedMount")
            .field("mount_id", &self.mount_id)
            .field("module_type", &self.module_type)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

struct RegisteredModule {
    factory: Arc<dyn ModuleFactory>,
    state: Vec<StateModule>,
}

/// Module types known to the page and the instances mounted so far.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, RegisteredModule>,
    mounted: BTreeMap<String, Arc<MountedModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module type that does not use the shared store.
    pub fn register(
        &mut self,
        module_type: impl Into<String>,
        factory: impl ModuleFactory + 'static,
    ) -> MountResult<()> {
        self.register_with_state(module_type, factory, Vec::new())
    }

    /// Registers a module type along with the state sub-trees it needs.
    pub fn register_with_state(
        &mut self,
        module_type: impl Into<String>,
        factory: impl ModuleFactory + 'static,
        state: Vec<StateModule>,
    ) -> MountResult<()> {
        let module_type = module_type.into();
        if self.modules.contains_key(&module_type) {
            return Err(MountError::DuplicateModuleType(module_type));
        }
        self.modules.insert(
            module_type,
            RegisteredModule {
                factory: Arc::new(factory),
                state,
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, module_type: &str) -> bool {
        self.modules.contains_key(module_type)
    }

    /// State declarations of `module_type`; empty when it has none.
    pub fn state_declarations(&self, module_type: &str) -> Option<&[StateModule]> {
        self.modules
            .get(module_type)
            .map(|module| module.state.as_slice())
    }

    /// Mounts one instance of the mount point's module type.
    ///
    /// Shorthand for [`prepare`](Self::prepare), [`PreparedMount::create`] and
    /// [`attach`](Self::attach) when the caller already holds the store.
    pub fn mount(
        &mut self,
        mount_point: &MountPoint,
        store: Option<StoreHandle>,
    ) -> MountResult<Arc<MountedModule>> {
        let prepared = self.prepare(mount_point)?;
        let mounted = prepared.create(store);
        self.attach(mounted)
    }

    /// Validates a mount point and extracts its properties without running
    /// the factory.
    ///
    /// # Errors
    /// - `AlreadyMounted` when the mount point id is taken.
    /// - `UnknownModule` when the module type is not registered.
    /// - `Coercion` when a typed attribute cannot be converted.
    pub fn prepare(&self, mount_point: &MountPoint) -> MountResult<PreparedMount> {
        if self.mounted.contains_key(&mount_point.id) {
            return Err(MountError::AlreadyMounted(mount_point.id.clone()));
        }
        let Some(module) = self.modules.get(&mount_point.module_type) else {
            warn!(
                "event=module_mount module=mount status=error error_code=unknown_module mount_id={} module_type={}",
                mount_point.id, mount_point.module_type
            );
            return Err(MountError::UnknownModule {
                mount_id: mount_point.id.clone(),
                module_type: mount_point.module_type.clone(),
            });
        };

        let properties = extract(&mount_point.attributes).map_err(|source| {
            warn!(
                "event=module_mount module=mount status=error error_code=type_coercion mount_id={} attribute={}",
                mount_point.id, source.attribute
            );
            MountError::Coercion {
                mount_id: mount_point.id.clone(),
                source,
            }
        })?;

        Ok(PreparedMount {
            mount_id: mount_point.id.clone(),
            module_type: mount_point.module_type.clone(),
            properties,
            factory: Arc::clone(&module.factory),
            state: module.state.clone(),
        })
    }

    /// Records an instance built from [`PreparedMount::create`].
    ///
    /// When the id was taken in the meantime the new instance is unmounted
    /// again and `AlreadyMounted` is returned.
    pub fn attach(&mut self, mounted: MountedModule) -> MountResult<Arc<MountedModule>> {
        if self.mounted.contains_key(&mounted.mount_id) {
            mounted.instance.unmount();
            return Err(MountError::AlreadyMounted(mounted.mount_id));
        }
        let mounted = Arc::new(mounted);
        self.mounted
            .insert(mounted.mount_id.clone(), Arc::clone(&mounted));

        info!(
            "event=module_mount module=mount status=ok mount_id={} module_type={} instance_id={}",
            mounted.mount_id, mounted.module_type, mounted.instance_id
        );
        Ok(mounted)
    }

    /// Tears down the instance bound to `mount_id`.
    pub fn unmount(&mut self, mount_id: &str) -> MountResult<()> {
        let mounted = self
            .mounted
            .remove(mount_id)
            .ok_or_else(|| MountError::NotMounted(mount_id.to_string()))?;
        mounted.instance.unmount();
        info!(
            "event=module_unmount module=mount status=ok mount_id={} instance_id={}",
            mount_id, mounted.instance_id
        );
        Ok(())
    }

    /// Tears down every mounted instance.
    pub fn unmount_all(&mut self) {
        for (_, mounted) in std::mem::take(&mut self.mounted) {
            mounted.instance.unmount();
        }
    }

    pub fn get(&self, mount_id: &str) -> Option<Arc<MountedModule>> {
        self.mounted.get(mount_id).cloned()
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.len()
    }

    pub fn mounted_ids(&self) -> Vec<String> {
        self.mounted.keys().cloned().collect()
    }
}
