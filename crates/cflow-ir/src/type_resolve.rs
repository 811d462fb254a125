//! Resolves Cabs's reconstructed type strings (`"int"`, `"char *"`,
//! `"struct Point"`, `"int(*)(int,int)"`) into [`CType`]. Cabs keeps types as
//! strings rather than a typed tree (see `cflow_core::cabs`'s module doc),
//! so every downstream stage that needs a real `CType` goes through here.

use std::collections::HashMap;

use cflow_core::types::{CType, FloatSize, IntSize};
use cflow_core::TypeRegistry;

/// Typedef aliases seen so far, threaded through a translation unit in
/// declaration order (a typedef is only visible to code that follows it).
#[derive(Debug, Default, Clone)]
pub struct TypedefEnv {
    aliases: HashMap<String, CType>,
}

impl TypedefEnv {
    pub fn new() -> Self {
        TypedefEnv::default()
    }

    pub fn define(&mut self, name: impl Into<String>, ty: CType) {
        self.aliases.insert(name.into(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&CType> {
        self.aliases.get(name)
    }
}

/// Parses a declarator-reconstructed type string into a [`CType`], resolving
/// `struct`/`union`/`enum` tags and typedef names against `registry`/`env`.
/// Unknown tokens fall back to `CType::int32()` rather than panicking, since
/// SimplExpr must keep lowering the rest of the function even if one
/// declarator used a type the rest of the pipeline doesn't model (e.g. a
/// qualifier combination this resolver doesn't special-case).
pub fn parse_type_string(s: &str, registry: &TypeRegistry, env: &TypedefEnv) -> CType {
    let s = s.trim();
    if let Some(ty) = try_parse_function_pointer(s, registry, env) {
        return ty;
    }

    let mut base = s.to_string();
    let mut dims: Vec<Option<u64>> = Vec::new();
    while base.ends_with(']') {
        let Some(open) = base.rfind('[') else { break };
        let dim_str = base[open + 1..base.len() - 1].trim();
        dims.push(dim_str.parse::<u64>().ok());
        base.truncate(open);
    }

    let stars = base.chars().rev().take_while(|c| *c == '*').count();
    let base_tok = base[..base.len() - stars].trim();
    let mut ty = resolve_base(base_tok, registry, env);
    for _ in 0..stars {
        ty = CType::pointer_to(ty);
    }
    for dim in dims.into_iter().rev() {
        ty = CType::Array { elem: Box::new(ty), len: dim };
    }
    ty
}

fn resolve_base(tokens: &str, registry: &TypeRegistry, env: &TypedefEnv) -> CType {
    let words: Vec<&str> = tokens
        .split_whitespace()
        .filter(|w| *w != "const" && *w != "volatile" && *w != "restrict")
        .collect();

    if words.first() == Some(&"struct") {
        let name = words.get(1).copied().unwrap_or("");
        return registry
            .lookup_struct(name)
            .map(CType::Struct)
            .unwrap_or(CType::Void);
    }
    if words.first() == Some(&"union") {
        let name = words.get(1).copied().unwrap_or("");
        return registry.lookup_union(name).map(CType::Union).unwrap_or(CType::Void);
    }
    if words.first() == Some(&"enum") {
        let name = words.get(1).copied().unwrap_or("");
        return registry.lookup_enum(name).map(CType::Enum).unwrap_or(CType::int32());
    }

    let joined = words.join(" ");
    match joined.as_str() {
        "void" => return CType::Void,
        "_Bool" => return CType::Bool,
        "float" => return CType::Float(FloatSize::F32),
        "double" | "long double" => return CType::Float(FloatSize::F64),
        _ => {}
    }

    let unsigned = words.iter().any(|w| *w == "unsigned");
    let has_char = words.iter().any(|w| *w == "char");
    let has_short = words.iter().any(|w| *w == "short");
    let long_count = words.iter().filter(|w| **w == "long").count();

    if has_char {
        return CType::Int { size: IntSize::I8, signed: !unsigned };
    }
    if has_short {
        return CType::Int { size: IntSize::I16, signed: !unsigned };
    }
    if long_count > 0 {
        return CType::Int { size: IntSize::I64, signed: !unsigned };
    }
    if words.iter().any(|w| *w == "int") || words.iter().any(|w| *w == "signed") || unsigned {
        return CType::Int { size: IntSize::I32, signed: !unsigned };
    }

    if let Some(ty) = env.lookup(&joined) {
        return ty.clone();
    }
    // Unknown/unmodeled type; keep lowering the rest of the function.
    CType::int32()
}

/// Recognizes the `ret(*)(args)` shape the parser reconstructs for
/// function-pointer declarators and builds the corresponding
/// `CType::Pointer(Function(..))`.
fn try_parse_function_pointer(s: &str, registry: &TypeRegistry, env: &TypedefEnv) -> Option<CType> {
    let marker = "(*)";
    let star_pos = s.find(marker)?;
    let ret_str = &s[..star_pos];
    let after = &s[star_pos + marker.len()..];
    let args_str = after.strip_prefix('(')?.strip_suffix(')')?;

    let ret = Box::new(parse_type_string(ret_str, registry, env));
    let variadic = args_str.trim_end().ends_with("...");
    let args_str = args_str.trim_end().trim_end_matches("...").trim_end_matches(',');
    let params: Vec<CType> = if args_str.trim().is_empty() {
        Vec::new()
    } else {
        args_str.split(',').map(|p| parse_type_string(p, registry, env)).collect()
    };
    Some(CType::pointer_to(CType::Function { ret, params, variadic }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_types_resolve() {
        let reg = TypeRegistry::new();
        let env = TypedefEnv::new();
        assert_eq!(parse_type_string("int", &reg, &env), CType::int32());
        assert_eq!(parse_type_string("unsigned long", &reg, &env), CType::Int { size: IntSize::I64, signed: false });
        assert_eq!(parse_type_string("char", &reg, &env), CType::Int { size: IntSize::I8, signed: true });
        assert_eq!(parse_type_string("double", &reg, &env), CType::Float(FloatSize::F64));
    }

    #[test]
    fn pointer_and_array_suffixes_resolve() {
        let reg = TypeRegistry::new();
        let env = TypedefEnv::new();
        assert_eq!(parse_type_string("int*", &reg, &env), CType::pointer_to(CType::int32()));
        assert_eq!(
            parse_type_string("int[10]", &reg, &env),
            CType::Array { elem: Box::new(CType::int32()), len: Some(10) }
        );
    }

    #[test]
    fn struct_tag_resolves_via_registry() {
        let mut reg = TypeRegistry::new();
        reg.declare_struct("Point").unwrap();
        let env = TypedefEnv::new();
        let ty = parse_type_string("struct Point", &reg, &env);
        assert!(matches!(ty, CType::Struct(_)));
    }

    #[test]
    fn typedef_alias_resolves() {
        let reg = TypeRegistry::new();
        let mut env = TypedefEnv::new();
        env.define("size_t", CType::Int { size: IntSize::I64, signed: false });
        assert_eq!(parse_type_string("size_t", &reg, &env), CType::Int { size: IntSize::I64, signed: false });
    }

    #[test]
    fn function_pointer_type_resolves() {
        let reg = TypeRegistry::new();
        let env = TypedefEnv::new();
        let ty = parse_type_string("int(*)(int,int)", &reg, &env);
        let CType::Pointer(inner) = ty else { panic!("expected pointer") };
        assert!(matches!(*inner, CType::Function { .. }));
    }
}
