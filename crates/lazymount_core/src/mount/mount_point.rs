//! Mount point markup as handed over by the templating layer.

use std::collections::BTreeMap;

/// A page location where one module instance is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    /// Stable, page-unique element id.
    pub id: String,
    pub module_type: String,
    /// Raw string attributes, including any `<attr>Datatype` siblings.
    pub attributes: BTreeMap<String, String>,
}

impl MountPoint {
    pub fn new(id: impl Into<String>, module_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            module_type: module_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds `key=value` together with its `keyDatatype` sibling.
    pub fn with_typed_attribute(
        self,
        key: impl Into<String>,
        value: impl Into<String>,
        datatype: &str,
    ) -> Self {
        let key = key.into();
        let sibling = format!("{key}Datatype");
        self.with_attribute(key, value).with_attribute(sibling, datatype)
    }
}
