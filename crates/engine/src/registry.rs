//! Ordered field definitions and the reference lists that reorder them.

use std::collections::{BTreeSet, HashSet};

use toolform_types::{FieldDefinition, FieldRef};

use crate::error::RegistryError;

/// Holds a tool's field definitions together with the resolved evaluation
/// order and the set of reset-on-change fields.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldDefinition>,
    order: Vec<usize>,
    reset_set: BTreeSet<usize>,
}

impl FieldRegistry {
    /// Builds the registry, resolving the optional custom order and reset lists.
    ///
    /// Fails on duplicate ids and on references that name no field.
    pub fn new(
        fields: Vec<FieldDefinition>,
        custom_order: Option<&[FieldRef]>,
        reset_on_change: Option<&[FieldRef]>,
    ) -> Result<Self, RegistryError> {
        {
            let mut seen = HashSet::new();
            for field in &fields {
                if !seen.insert(field.id.as_str()) {
                    return Err(RegistryError::DuplicateField { id: field.id.clone() });
                }
            }
        }

        let mut registry = Self {
            fields,
            order: Vec::new(),
            reset_set: BTreeSet::new(),
        };
        registry.order = registry.build_order(custom_order)?;

        let mut reset_set: BTreeSet<usize> = match reset_on_change {
            Some(references) => registry.resolve_refs(references)?.into_iter().collect(),
            None => BTreeSet::new(),
        };
        reset_set.extend(
            registry
                .fields
                .iter()
                .enumerate()
                .filter(|(_, field)| field.reset_on_change)
                .map(|(index, _)| index),
        );
        registry.reset_set = reset_set;
        Ok(registry)
    }

    /// Resolves an evaluation order into 0-based field indices.
    ///
    /// A custom order must name every field exactly once. Without one, fields
    /// carrying an explicit `order_index` are placed at that 1-based position
    /// and the rest keep registration order.
    pub fn build_order(&self, custom_order: Option<&[FieldRef]>) -> Result<Vec<usize>, RegistryError> {
        if let Some(references) = custom_order {
            let order = self.resolve_refs(references)?;
            let mut seen = vec![false; self.fields.len()];
            for (reference, &index) in references.iter().zip(&order) {
                if std::mem::replace(&mut seen[index], true) {
                    return Err(RegistryError::RepeatedInOrder {
                        reference: reference.to_string(),
                    });
                }
            }
            if let Some(missing) = seen.iter().position(|listed| !listed) {
                return Err(RegistryError::MissingFromOrder {
                    id: self.fields[missing].id.clone(),
                });
            }
            return Ok(order);
        }
        let mut order: Vec<usize> = (0..self.fields.len()).collect();
        order.sort_by_key(|&index| self.fields[index].order_index.unwrap_or(index + 1));
        Ok(order)
    }

    fn resolve_refs(&self, references: &[FieldRef]) -> Result<Vec<usize>, RegistryError> {
        references.iter().map(|reference| self.resolve_ref(reference)).collect()
    }

    /// Resolves one reference. Ids not registered verbatim fall back to the
    /// legacy `boxN` positional form.
    pub fn resolve_ref(&self, reference: &FieldRef) -> Result<usize, RegistryError> {
        let index = match reference {
            FieldRef::Position(0) => {
                return Err(RegistryError::UnknownField {
                    reference: reference.to_string(),
                });
            }
            FieldRef::Position(position) => position - 1,
            FieldRef::Id(id) => match self.fields.iter().position(|field| &field.id == id) {
                Some(index) => index,
                None => id
                    .strip_prefix("box")
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .filter(|position| *position > 0)
                    .map(|position| position - 1)
                    .ok_or_else(|| RegistryError::UnknownField {
                        reference: reference.to_string(),
                    })?,
            },
        };
        if index >= self.fields.len() {
            return Err(RegistryError::OutOfRange {
                index,
                len: self.fields.len(),
            });
        }
        Ok(index)
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDefinition> {
        self.fields.get(index)
    }

    /// Evaluation order as 0-based indices into [`fields`](Self::fields).
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn is_reset_field(&self, index: usize) -> bool {
        self.reset_set.contains(&index)
    }

    pub fn reset_fields(&self) -> impl Iterator<Item = usize> + '_ {
        self.reset_set.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
