//! The semantic C type system.
//!
//! `Cabs` carries types as uninterpreted strings (spec §3); `CType` is the
//! resolved, structural representation that lowering from `SimplExpr`
//! onward operates on. Struct/union/enum definitions are nominal and live in
//! the [`TypeRegistry`](crate::type_id::TypeRegistry) behind a [`TypeId`];
//! everything else is structural.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::type_id::TypeId;

/// Integer width, independent of signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntSize {
    I8,
    I16,
    I32,
    I64,
}

impl IntSize {
    pub fn bytes(self) -> u64 {
        match self {
            IntSize::I8 => 1,
            IntSize::I16 => 2,
            IntSize::I32 => 4,
            IntSize::I64 => 8,
        }
    }
}

/// Floating-point width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatSize {
    F32,
    F64,
}

impl FloatSize {
    pub fn bytes(self) -> u64 {
        match self {
            FloatSize::F32 => 4,
            FloatSize::F64 => 8,
        }
    }
}

/// The resolved semantic type of an expression, declaration, or memory
/// access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CType {
    Void,
    Bool,
    Int { size: IntSize, signed: bool },
    Float(FloatSize),
    Pointer(Box<CType>),
    Array { elem: Box<CType>, len: Option<u64> },
    Function {
        ret: Box<CType>,
        params: Vec<CType>,
        variadic: bool,
    },
    Struct(TypeId),
    Union(TypeId),
    Enum(TypeId),
}

impl CType {
    pub fn int32() -> CType {
        CType::Int { size: IntSize::I32, signed: true }
    }

    pub fn int64() -> CType {
        CType::Int { size: IntSize::I64, signed: true }
    }

    pub fn pointer_to(inner: CType) -> CType {
        CType::Pointer(Box::new(inner))
    }

    /// Scalar types are the ones [`SimplLocals`](crate) promotion considers
    /// eligible for temp-variable status: integer, long, float, pointer
    /// (spec §4.4). Enums are scalar (integer-backed); arrays, structs,
    /// unions, and functions are not.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            CType::Bool | CType::Int { .. } | CType::Float(_) | CType::Pointer(_) | CType::Enum(_)
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, CType::Bool | CType::Int { .. } | CType::Enum(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CType::Float(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_) | CType::Array { .. })
    }

    /// `true` for 64-bit-wide values (`long`/`long long`, 64-bit pointers,
    /// `double`); used to choose the `l`/`f`-suffixed Cminor operator family.
    pub fn is_64bit(&self) -> bool {
        matches!(
            self,
            CType::Int { size: IntSize::I64, .. }
                | CType::Pointer(_)
                | CType::Float(FloatSize::F64)
        )
    }

    /// Size in bytes, given a registry to resolve struct/union/enum tags.
    pub fn size_of(&self, reg: &super::type_id::TypeRegistry) -> u64 {
        match self {
            CType::Void => 0,
            CType::Bool => 1,
            CType::Int { size, .. } => size.bytes(),
            CType::Float(size) => size.bytes(),
            CType::Pointer(_) => 8,
            CType::Array { elem, len } => elem.size_of(reg) * len.unwrap_or(0),
            CType::Function { .. } => 8,
            CType::Struct(id) => reg.struct_def(*id).map_or(0, |d| d.size_of(reg)),
            CType::Union(id) => reg.union_def(*id).map_or(0, |d| d.size_of(reg)),
            CType::Enum(_) => IntSize::I32.bytes(),
        }
    }
}

/// A named struct definition with insertion-ordered fields, mirroring C
/// struct layout rules (sequential offsets, natural alignment, trailing
/// padding to the largest member's alignment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub fields: IndexMap<String, CType>,
}

impl StructDef {
    /// Offset, in bytes, of a field from the start of the struct.
    pub fn field_offset(&self, field: &str, reg: &super::type_id::TypeRegistry) -> Option<u64> {
        let mut offset = 0u64;
        for (name, ty) in &self.fields {
            let align = ty.size_of(reg).max(1);
            offset = align_up(offset, align);
            if name == field {
                return Some(offset);
            }
            offset += ty.size_of(reg);
        }
        None
    }

    pub fn field_type(&self, field: &str) -> Option<&CType> {
        self.fields.get(field)
    }

    pub fn size_of(&self, reg: &super::type_id::TypeRegistry) -> u64 {
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for ty in self.fields.values() {
            let sz = ty.size_of(reg);
            let align = sz.max(1);
            max_align = max_align.max(align);
            offset = align_up(offset, align) + sz;
        }
        align_up(offset, max_align)
    }
}

/// A named union definition: all members share offset 0; the union's size
/// is the size of its largest member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub fields: IndexMap<String, CType>,
}

impl UnionDef {
    pub fn field_type(&self, field: &str) -> Option<&CType> {
        self.fields.get(field)
    }

    pub fn size_of(&self, reg: &super::type_id::TypeRegistry) -> u64 {
        self.fields
            .values()
            .map(|ty| ty.size_of(reg))
            .max()
            .unwrap_or(0)
    }
}

/// A named enum definition; constants are `int`-typed per C semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub variants: IndexMap<String, i64>,
}

fn align_up(offset: u64, align: u64) -> u64 {
    if align == 0 {
        offset
    } else {
        (offset + align - 1) / align * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_id::TypeRegistry;

    #[test]
    fn scalar_classification() {
        assert!(CType::int32().is_scalar());
        assert!(CType::Float(FloatSize::F64).is_scalar());
        assert!(CType::pointer_to(CType::int32()).is_scalar());
        assert!(!CType::Array { elem: Box::new(CType::int32()), len: Some(4) }.is_scalar());
        assert!(!CType::Void.is_scalar());
    }

    #[test]
    fn is_64bit_matches_longs_pointers_doubles() {
        assert!(CType::int64().is_64bit());
        assert!(CType::pointer_to(CType::Void).is_64bit());
        assert!(CType::Float(FloatSize::F64).is_64bit());
        assert!(!CType::int32().is_64bit());
        assert!(!CType::Float(FloatSize::F32).is_64bit());
    }

    #[test]
    fn struct_field_offsets_with_padding() {
        let reg = TypeRegistry::new();
        let mut fields = IndexMap::new();
        fields.insert("a".to_string(), CType::Bool); // 1 byte
        fields.insert("b".to_string(), CType::int32()); // 4 bytes, needs padding to offset 4
        fields.insert("c".to_string(), CType::int64()); // 8 bytes, needs padding to offset 8
        let def = StructDef { name: "S".into(), fields };

        assert_eq!(def.field_offset("a", &reg), Some(0));
        assert_eq!(def.field_offset("b", &reg), Some(4));
        assert_eq!(def.field_offset("c", &reg), Some(8));
        assert_eq!(def.size_of(&reg), 16);
    }

    #[test]
    fn union_size_is_largest_member() {
        let reg = TypeRegistry::new();
        let mut fields = IndexMap::new();
        fields.insert("i".to_string(), CType::int32());
        fields.insert("d".to_string(), CType::Float(FloatSize::F64));
        let def = UnionDef { name: "U".into(), fields };
        assert_eq!(def.size_of(&reg), 8);
    }

    #[test]
    fn array_size_is_element_times_length() {
        let reg = TypeRegistry::new();
        let arr = CType::Array {
            elem: Box::new(CType::int32()),
            len: Some(10),
        };
        assert_eq!(arr.size_of(&reg), 40);
    }
}
