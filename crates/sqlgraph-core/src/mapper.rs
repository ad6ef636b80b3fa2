//! Registry of type mappings, queried by type.

use crate::error::{Error, MappingError, MappingErrorKind, Result};
use crate::mapping::{Entity, TypeMapping};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds the [`TypeMapping`] of every registered type.
///
/// References between types are resolved by `TypeId` on lookup, so types
/// may be registered in any order and may reference themselves.
#[derive(Debug, Default)]
pub struct Mapper {
    by_type: HashMap<TypeId, Arc<TypeMapping>>,
    by_name: HashMap<&'static str, TypeId>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register the mapping of `T`. Registering twice replaces it.
    pub fn register<T: Entity>(&mut self) -> Result<&mut Self> {
        let mapping = TypeMapping::of::<T>()?;
        tracing::debug!(
            type_name = mapping.name(),
            table = %mapping.table_name,
            columns = mapping.properties().len(),
            "Registered type mapping"
        );
        self.by_name.insert(mapping.name(), mapping.ty.type_id);
        self.by_type.insert(mapping.ty.type_id, Arc::new(mapping));
        Ok(self)
    }

    pub fn get(&self, type_id: TypeId) -> Option<&Arc<TypeMapping>> {
        self.by_type.get(&type_id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Arc<TypeMapping>> {
        self.by_name.get(name).and_then(|id| self.by_type.get(id))
    }

    /// Mapping of `T`, failing when it was never registered.
    pub fn mapping<T: 'static>(&self) -> Result<&Arc<TypeMapping>> {
        let full = std::any::type_name::<T>();
        self.require(TypeId::of::<T>(), full.rsplit("::").next().unwrap_or(full))
    }

    /// Mapping by type id; `type_name` only feeds the error message.
    pub fn require(&self, type_id: TypeId, type_name: &str) -> Result<&Arc<TypeMapping>> {
        self.get(type_id).ok_or_else(|| {
            Error::Mapping(
                MappingError::new(MappingErrorKind::UnmappedType, "type is not registered")
                    .with_type(type_name),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Every reference property pointing at `target`, as the owning
    /// mapping and the property's index, ordered by table then column.
    pub fn references_to(&self, target: TypeId) -> Vec<(&Arc<TypeMapping>, usize)> {
        let mut found: Vec<_> = self
            .by_type
            .values()
            .flat_map(|mapping| {
                mapping
                    .properties()
                    .iter()
                    .enumerate()
                    .filter(move |(_, p)| p.reference().is_some_and(|r| r.type_id == target))
                    .map(move |(index, _)| (mapping, index))
            })
            .collect();
        found.sort_by(|a, b| {
            a.0.table_name
                .cmp(&b.0.table_name)
                .then(a.1.cmp(&b.1))
        });
        found
    }

    /// Check that every reference and collection resolves.
    ///
    /// Reference targets must be registered and declare a key; collection
    /// back-references must be reference properties on the element type
    /// pointing at the owner.
    pub fn validate(&self) -> Result<()> {
        for mapping in self.by_type.values() {
            for property in mapping.properties() {
                if let Some(target) = property.reference() {
                    let target_mapping = self.require(target.type_id, target.type_name)?;
                    target_mapping.require_key()?;
                }
            }
            for collection in mapping.collections() {
                let element =
                    self.require(collection.element.type_id, collection.element.type_name)?;
                let back = element.require(&collection.back_reference)?;
                if back.reference().map(|t| t.type_id) != Some(mapping.ty.type_id) {
                    return Err(Error::Mapping(
                        MappingError::new(
                            MappingErrorKind::InvalidMember,
                            "collection back-reference does not point at the owner type",
                        )
                        .with_type(element.name())
                        .with_member(collection.back_reference.clone()),
                    ));
                }
                mapping.require_key()?;
            }
        }
        Ok(())
    }
}
