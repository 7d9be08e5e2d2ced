pub mod metadata;

pub use metadata::{
    OperationFactory, OperationMetadata, OperationMetadataFactory, OperationMetadataFactoryWrapper,
    ParameterSchema,
};

use crate::core::Operation;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Lookup table from operation type id to its metadata and factory
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    entries: BTreeMap<String, OperationMetadata>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every operation submitted through `inventory`
    pub fn from_inventory() -> Self {
        let mut registry = Self::new();
        for wrapper in inventory::iter::<OperationMetadataFactoryWrapper> {
            registry.register((wrapper.0)());
        }
        registry
    }

    /// Later registrations replace earlier ones with the same id
    pub fn register(&mut self, metadata: OperationMetadata) {
        self.entries.insert(metadata.id.clone(), metadata);
    }

    pub fn get(&self, id: &str) -> Option<&OperationMetadata> {
        self.entries.get(id)
    }

    pub fn create(&self, id: &str) -> Result<Box<dyn Operation>> {
        self.entries
            .get(id)
            .map(OperationMetadata::create_instance)
            .ok_or_else(|| anyhow!("Unknown operation type: {}", id))
    }

    pub fn list(&self) -> impl Iterator<Item = &OperationMetadata> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
