//! Schema registry
//!
//! Field metadata is resolved once per query through [`SchemaRegistry`].
//! Every field carries a closed [`FieldKind`] tag so callers dispatch with a
//! `match` instead of probing types at runtime.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Kind of a field, fixed by the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    /// Numeric or time axis; supports ranges and soft scoring
    Ordinal {
        #[serde(default)]
        time: bool,
    },
    /// Discrete labels and free text
    Categorical,
    Boolean,
    /// Reference to a record of another entity type
    Relational { target: String },
    /// Value read from `target_field` of the record referenced by the
    /// relational field `through`
    Virtual {
        through: String,
        target_entity: String,
        target_field: String,
    },
}

impl FieldKind {
    #[inline]
    pub fn is_ordinal(&self) -> bool {
        matches!(self, FieldKind::Ordinal { .. })
    }

    #[inline]
    pub fn is_virtual(&self) -> bool {
        matches!(self, FieldKind::Virtual { .. })
    }
}

/// Metadata for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    pub fn ordinal(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Ordinal { time: false })
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Ordinal { time: true })
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Categorical)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn relational(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Relational { target: target.into() })
    }

    pub fn virtual_field(
        name: impl Into<String>,
        through: impl Into<String>,
        target_entity: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Virtual {
                through: through.into(),
                target_entity: target_entity.into(),
                target_field: target_field.into(),
            },
        )
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Read-only view of entity types and their fields
pub trait SchemaRegistry: Send + Sync {
    fn has_entity(&self, entity: &str) -> bool;

    /// All fields of an entity type, inherited ones included
    fn fields(&self, entity: &str) -> Vec<FieldMeta>;

    fn is_abstract(&self, entity: &str) -> bool;

    /// Instantiable descendants of `entity`, transitively, sorted by name
    fn concrete_descendants(&self, entity: &str) -> Vec<String>;

    fn primary_key(&self, entity: &str) -> String;

    fn field(&self, entity: &str, name: &str) -> Option<FieldMeta> {
        self.fields(entity).into_iter().find(|f| f.name == name)
    }

    fn is_ordinal(&self, entity: &str, name: &str) -> bool {
        self.field(entity, name).map(|f| f.kind.is_ordinal()).unwrap_or(false)
    }
}

/// Definition of one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Parent entity type whose fields are inherited
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: default_primary_key(),
            is_abstract: false,
            parent: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }
}

/// Schema registry backed by a map of entity definitions
#[derive(Debug, Clone, Default)]
pub struct InMemorySchema {
    entities: AHashMap<String, EntityDef>,
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defs(defs: impl IntoIterator<Item = EntityDef>) -> Self {
        let mut schema = Self::new();
        for def in defs {
            schema.register(def);
        }
        schema
    }

    pub fn register(&mut self, def: EntityDef) {
        self.entities.insert(def.name.clone(), def);
    }

    #[must_use]
    pub fn with_entity(mut self, def: EntityDef) -> Self {
        self.register(def);
        self
    }

    /// Entity chain from `entity` up to its root; stops on unknown parents
    /// and on cycles
    fn lineage(&self, entity: &str) -> Vec<&EntityDef> {
        let mut chain: Vec<&EntityDef> = Vec::new();
        let mut current = self.entities.get(entity);
        while let Some(def) = current {
            if chain.iter().any(|d| d.name == def.name) {
                break;
            }
            chain.push(def);
            current = def.parent.as_deref().and_then(|p| self.entities.get(p));
        }
        chain
    }
}

impl SchemaRegistry for InMemorySchema {
    fn has_entity(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    fn fields(&self, entity: &str) -> Vec<FieldMeta> {
        let mut fields: Vec<FieldMeta> = Vec::new();
        // Root first so that subtypes can shadow inherited fields
        for def in self.lineage(entity).into_iter().rev() {
            for field in &def.fields {
                fields.retain(|f| f.name != field.name);
                fields.push(field.clone());
            }
        }
        fields
    }

    fn is_abstract(&self, entity: &str) -> bool {
        self.entities.get(entity).map(|d| d.is_abstract).unwrap_or(false)
    }

    fn concrete_descendants(&self, entity: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entities
            .values()
            .filter(|def| !def.is_abstract && def.name != entity)
            .filter(|def| self.lineage(&def.name).iter().any(|d| d.name == entity))
            .map(|def| def.name.clone())
            .collect();
        names.sort();
        names
    }

    fn primary_key(&self, entity: &str) -> String {
        self.lineage(entity)
            .first()
            .map(|d| d.primary_key.clone())
            .unwrap_or_else(default_primary_key)
    }
}
