//! Interned identifiers for nominal types (struct/union/enum tags).
//!
//! Structural types (`int`, `int*`, `int[4]`, ...) are represented inline by
//! [`CType`](crate::types::CType); tags need a level of indirection so that
//! recursive and mutually-referential definitions (a struct containing a
//! pointer to itself) don't require an infinite `CType` tree.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EnumDef, StructDef, UnionDef};

/// An index into a [`TypeRegistry`]'s tag tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Struct,
    Union,
    Enum,
}

/// The set of nominal (tagged) type definitions in a translation unit.
///
/// Struct, union, and enum tags live in separate namespaces in C, so the
/// registry keeps them in separate maps even though `TypeId`s are drawn from
/// one shared counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeRegistry {
    structs: HashMap<u32, StructDef>,
    unions: HashMap<u32, UnionDef>,
    enums: HashMap<u32, EnumDef>,
    #[serde(skip)]
    tag_kind: HashMap<u32, TagKind>,
    struct_names: HashMap<String, TypeId>,
    union_names: HashMap<String, TypeId>,
    enum_names: HashMap<String, TypeId>,
    next_id: u32,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    fn alloc(&mut self) -> TypeId {
        let id = TypeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn declare_struct(&mut self, name: impl Into<String>) -> Result<TypeId, CoreError> {
        let name = name.into();
        if self.struct_names.contains_key(&name) {
            return Err(CoreError::DuplicateTagName { name });
        }
        let id = self.alloc();
        self.tag_kind.insert(id.0, TagKind::Struct);
        self.struct_names.insert(name, id);
        Ok(id)
    }

    pub fn define_struct(&mut self, id: TypeId, def: StructDef) {
        self.structs.insert(id.0, def);
    }

    pub fn declare_union(&mut self, name: impl Into<String>) -> Result<TypeId, CoreError> {
        let name = name.into();
        if self.union_names.contains_key(&name) {
            return Err(CoreError::DuplicateTagName { name });
        }
        let id = self.alloc();
        self.tag_kind.insert(id.0, TagKind::Union);
        self.union_names.insert(name, id);
        Ok(id)
    }

    pub fn define_union(&mut self, id: TypeId, def: UnionDef) {
        self.unions.insert(id.0, def);
    }

    pub fn declare_enum(&mut self, name: impl Into<String>) -> Result<TypeId, CoreError> {
        let name = name.into();
        if self.enum_names.contains_key(&name) {
            return Err(CoreError::DuplicateTagName { name });
        }
        let id = self.alloc();
        self.tag_kind.insert(id.0, TagKind::Enum);
        self.enum_names.insert(name, id);
        Ok(id)
    }

    pub fn define_enum(&mut self, id: TypeId, def: EnumDef) {
        self.enums.insert(id.0, def);
    }

    pub fn struct_def(&self, id: TypeId) -> Option<&StructDef> {
        self.structs.get(&id.0)
    }

    pub fn union_def(&self, id: TypeId) -> Option<&UnionDef> {
        self.unions.get(&id.0)
    }

    pub fn enum_def(&self, id: TypeId) -> Option<&EnumDef> {
        self.enums.get(&id.0)
    }

    pub fn lookup_struct(&self, name: &str) -> Option<TypeId> {
        self.struct_names.get(name).copied()
    }

    pub fn lookup_union(&self, name: &str) -> Option<TypeId> {
        self.union_names.get(name).copied()
    }

    pub fn lookup_enum(&self, name: &str) -> Option<TypeId> {
        self.enum_names.get(name).copied()
    }

    /// Looks up an enum constant's value across every defined enum, as C
    /// resolves enum constants in the ordinary identifier namespace rather
    /// than per-tag.
    pub fn lookup_enum_constant(&self, name: &str) -> Option<i64> {
        self.enums
            .values()
            .find_map(|def| def.variants.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CType;
    use indexmap::IndexMap;

    #[test]
    fn declare_then_define_struct_roundtrips() {
        let mut reg = TypeRegistry::new();
        let id = reg.declare_struct("point").unwrap();
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), CType::int32());
        fields.insert("y".to_string(), CType::int32());
        reg.define_struct(id, StructDef { name: "point".into(), fields });

        assert_eq!(reg.lookup_struct("point"), Some(id));
        assert_eq!(reg.struct_def(id).unwrap().fields.len(), 2);
    }

    #[test]
    fn duplicate_tag_name_rejected() {
        let mut reg = TypeRegistry::new();
        reg.declare_struct("point").unwrap();
        let err = reg.declare_struct("point").unwrap_err();
        assert_eq!(err, CoreError::DuplicateTagName { name: "point".into() });
    }

    #[test]
    fn struct_and_union_tags_are_distinct_namespaces() {
        let mut reg = TypeRegistry::new();
        reg.declare_struct("foo").unwrap();
        // Same name, different tag namespace: must not collide.
        assert!(reg.declare_union("foo").is_ok());
    }

    #[test]
    fn enum_constant_lookup_spans_all_enums() {
        let mut reg = TypeRegistry::new();
        let id = reg.declare_enum("color").unwrap();
        let mut variants = IndexMap::new();
        variants.insert("RED".to_string(), 0);
        variants.insert("GREEN".to_string(), 1);
        reg.define_enum(id, EnumDef { name: "color".into(), variants });

        assert_eq!(reg.lookup_enum_constant("GREEN"), Some(1));
        assert_eq!(reg.lookup_enum_constant("BLUE"), None);
    }

    #[test]
    fn recursive_struct_via_pointer_is_representable() {
        let mut reg = TypeRegistry::new();
        let id = reg.declare_struct("node").unwrap();
        let mut fields = IndexMap::new();
        fields.insert("value".to_string(), CType::int32());
        fields.insert("next".to_string(), CType::pointer_to(CType::Struct(id)));
        reg.define_struct(id, StructDef { name: "node".into(), fields });

        let def = reg.struct_def(id).unwrap();
        assert_eq!(def.size_of(&reg), 16);
    }
}
