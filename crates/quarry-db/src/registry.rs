//! Model registry.
//!
//! The registry is built once from every participating model's metadata. It
//! maps each model to its physical [`Table`] and to a relation table that
//! classifies every name reachable from that model as a scalar field, a
//! forward relationship, or a reverse relationship declared by another
//! model. Path resolution walks this table instead of probing fields by
//! name at query time.

use std::collections::HashMap;

use quarry_core::{QuarryError, QuarryResult};

use crate::model::{Model, ModelMeta};

/// What a name resolves to on a given model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// A plain column.
    Scalar {
        /// The field name.
        field: &'static str,
    },
    /// A relationship field declared on this model.
    Forward {
        /// The relationship field name.
        field: &'static str,
        /// The target model name.
        target: &'static str,
    },
    /// A relationship declared on `owner` that points at this model.
    Reverse {
        /// The model declaring the foreign key(s).
        owner: &'static str,
    },
}

/// A physical table handle with named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// The table name.
    pub name: String,
    /// The primary key column.
    pub primary_key: String,
    /// Every column, in declaration order.
    pub columns: Vec<String>,
}

#[derive(Debug)]
struct Entry {
    meta: &'static ModelMeta,
    table: Table,
    relations: HashMap<String, Relation>,
}

/// Registered models and their relation tables.
#[derive(Debug)]
pub struct Registry {
    entries: HashMap<&'static str, Entry>,
}

impl Registry {
    /// Starts building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Returns the metadata registered under `name`.
    pub fn model(&self, name: &str) -> QuarryResult<&'static ModelMeta> {
        self.entry(name).map(|e| e.meta)
    }

    /// Returns the physical table for `model`.
    pub fn table_for(&self, model: &str) -> QuarryResult<&Table> {
        self.entry(model).map(|e| &e.table)
    }

    /// Returns the primary key field name for `model`.
    pub fn primary_key_name(&self, model: &str) -> QuarryResult<&'static str> {
        let meta = self.model(model)?;
        meta.pk_field().map(|f| f.name).ok_or_else(|| {
            QuarryError::ConfigurationError(format!("Model '{model}' has no primary key"))
        })
    }

    /// Classifies `name` on `model`.
    pub fn relation(&self, model: &str, name: &str) -> Option<&Relation> {
        self.entries.get(model)?.relations.get(name)
    }

    /// Returns the reverse relationship names exposed on `model`, sorted.
    pub fn reverse_names(&self, model: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .get(model)
            .map(|e| {
                e.relations
                    .iter()
                    .filter(|(_, r)| matches!(r, Relation::Reverse { .. }))
                    .map(|(n, _)| n.as_str())
                    .collect()
            })
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Returns `true` if `model` is registered.
    pub fn contains(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    /// Returns the number of registered models.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no models are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> QuarryResult<&Entry> {
        self.entries.get(name).ok_or_else(|| {
            QuarryError::ConfigurationError(format!("Model '{name}' is not registered"))
        })
    }
}

/// Collects model metadata and validates it into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    metas: Vec<&'static ModelMeta>,
}

impl RegistryBuilder {
    /// Adds a model type.
    #[must_use]
    pub fn register<M: Model>(self) -> Self {
        self.register_meta(M::meta())
    }

    /// Adds model metadata directly.
    #[must_use]
    pub fn register_meta(mut self, meta: &'static ModelMeta) -> Self {
        self.metas.push(meta);
        self
    }

    /// Validates the collected models and builds their relation tables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when a model is registered twice, has
    /// no primary key, points a relationship at an unregistered model,
    /// declares a pivot field that is not a relationship, or exposes a
    /// reverse name that collides with a field or with another model's
    /// reverse name.
    pub fn build(self) -> QuarryResult<Registry> {
        let mut entries: HashMap<&'static str, Entry> = HashMap::new();

        for meta in &self.metas {
            if entries.contains_key(meta.name) {
                return Err(config(format!("Model '{}' is registered twice", meta.name)));
            }
            let pk = meta
                .pk_field()
                .ok_or_else(|| config(format!("Model '{}' has no primary key", meta.name)))?;

            let relations = meta
                .fields
                .iter()
                .map(|f| {
                    let relation = match f.target_model() {
                        Some(_) => Relation::Forward {
                            field: f.name,
                            target: target_name(&self.metas, meta.name, f.name, f.target_model())?,
                        },
                        None => Relation::Scalar { field: f.name },
                    };
                    Ok((f.name.to_string(), relation))
                })
                .collect::<QuarryResult<HashMap<_, _>>>()?;

            let table = Table {
                name: meta.db_table.clone(),
                primary_key: pk.column.clone(),
                columns: meta.fields.iter().map(|f| f.column.clone()).collect(),
            };
            entries.insert(meta.name, Entry { meta, table, relations });
        }

        for meta in &self.metas {
            for field in meta.fields.iter().filter(|f| f.is_relation()) {
                let target = target_name(&self.metas, meta.name, field.name, field.target_model())?;
                let reverse = field
                    .related_name()
                    .map_or_else(|| default_related_name(meta.name), ToString::to_string);

                let target_entry = entries
                    .get_mut(target)
                    .ok_or_else(|| config(format!("Model '{target}' is not registered")))?;
                match target_entry.relations.get(&reverse) {
                    None => {
                        target_entry
                            .relations
                            .insert(reverse, Relation::Reverse { owner: meta.name });
                    }
                    Some(Relation::Reverse { owner }) if *owner == meta.name => {}
                    Some(Relation::Reverse { owner }) => {
                        return Err(config(format!(
                            "Reverse name '{reverse}' on {target} is declared by both {owner} and {}",
                            meta.name
                        )));
                    }
                    Some(_) => {
                        return Err(config(format!(
                            "Reverse name '{reverse}' from {}.{} collides with field '{reverse}' on {target}",
                            meta.name, field.name
                        )));
                    }
                }
            }

            if let Some(pivot) = &meta.pivot {
                let is_relation = meta
                    .get_field(pivot.related_field)
                    .is_some_and(crate::fields::FieldDef::is_relation);
                if !is_relation {
                    return Err(config(format!(
                        "Pivot field '{}' on {} is not a relationship",
                        pivot.related_field, meta.name
                    )));
                }
            }
        }

        tracing::debug!(models = entries.len(), "model registry built");
        Ok(Registry { entries })
    }
}

/// Returns the reverse name used when a relationship declares none.
pub fn default_related_name(owner: &str) -> String {
    format!("{}s_set", owner.to_lowercase())
}

fn target_name(
    metas: &[&'static ModelMeta],
    owner: &str,
    field: &str,
    target: Option<&str>,
) -> QuarryResult<&'static str> {
    let target = target.unwrap_or_default();
    metas
        .iter()
        .find(|m| m.name == target)
        .map(|m| m.name)
        .ok_or_else(|| {
            config(format!(
                "Relationship {owner}.{field} points at unregistered model '{target}'"
            ))
        })
}

fn config(message: String) -> QuarryError {
    QuarryError::ConfigurationError(message)
}
