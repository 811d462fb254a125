//! SimplExpr: side-effect extraction from Cabs expressions into Clight
//! statements (spec §4.3).
//!
//! Every user-named local or global is kept as `Var`/`Assign` here, never
//! `Tempvar`/`Set` — deciding which locals can be promoted to registers is
//! [`crate::simpl_locals`]'s job, which runs strictly after this pass.
//! `Tempvar`/`Set` in this module's output are exclusively the compiler
//! temporaries this pass introduces to sequence side effects; they start
//! numbering at 0 and SimplLocals continues the same counter rather than
//! restarting it (spec §4.4).

use std::collections::HashMap;

use indexmap::IndexMap;

use cflow_core::cabs;
use cflow_core::loc::SourceLoc;
use cflow_core::types::CType;
use cflow_core::TypeRegistry;

use crate::clight::{self, AssignTarget, BinOp, Expr, ExprKind, Function, Program, Stmt, StmtKind, SwitchCase, TempId, UnOp};
use crate::error::LoweringError;
use crate::type_resolve::{parse_type_string, TypedefEnv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Value,
    Condition,
}

struct FuncSig {
    ret: CType,
    params: Vec<CType>,
    variadic: bool,
}

/// Lowers a whole translation unit. Typedef/tag declarations are resolved in
/// source order; function bodies are lowered independently of one another.
/// Per-function lowering failures are collected rather than aborting the
/// whole unit, matching the "accumulate, then gate" error policy (spec §7).
pub fn lower_program(
    tu: &cabs::TranslationUnit,
    registry: &mut TypeRegistry,
) -> (Program, Vec<LoweringError>) {
    let mut typedefs = TypedefEnv::new();
    let mut globals: HashMap<String, CType> = HashMap::new();
    let mut functions: HashMap<String, FuncSig> = HashMap::new();
    let mut string_literals: IndexMap<String, String> = IndexMap::new();
    let mut errors = Vec::new();

    // First pass: register every tag/typedef/global/function signature so
    // forward references within the translation unit resolve (C itself
    // requires declaration-before-use except for this exact set of cases
    // at file scope, which a single linear pass over top-level decls covers).
    for decl in &tu.decls {
        match decl {
            cabs::ExternalDecl::TypedefDef(t) => {
                let ty = parse_type_string(&t.ty, registry, &typedefs);
                typedefs.define(t.name.clone(), ty);
            }
            cabs::ExternalDecl::StructDef(s) => {
                register_struct(s, registry, &typedefs);
            }
            cabs::ExternalDecl::UnionDef(u) => {
                register_union(u, registry, &typedefs);
            }
            cabs::ExternalDecl::EnumDef(e) => {
                register_enum(e, registry);
            }
            cabs::ExternalDecl::VarDef(v) => {
                globals.insert(v.name.clone(), parse_type_string(&v.ty, registry, &typedefs));
            }
            cabs::ExternalDecl::FunDef(f) => {
                let ret = parse_type_string(&f.return_type, registry, &typedefs);
                let params = f
                    .params
                    .iter()
                    .map(|p| parse_type_string(&p.ty, registry, &typedefs))
                    .collect();
                functions.insert(f.name.clone(), FuncSig { ret, params, variadic: f.variadic });
            }
        }
    }

    let env = FrontEnv { registry, typedefs: &typedefs, globals: &globals, functions: &functions };
    let mut program = Program { functions: Vec::new(), globals: globals.clone().into_iter().collect() };

    for decl in &tu.decls {
        if let cabs::ExternalDecl::FunDef(f) = decl {
            if let Some(body) = &f.body {
                match lower_function(f, body, &env, &mut string_literals) {
                    Ok(func) => program.functions.push(func),
                    Err(e) => errors.push(e),
                }
            }
        }
    }

    for (name, content) in string_literals {
        program
            .globals
            .insert(name, CType::Array { elem: Box::new(CType::Int { size: cflow_core::types::IntSize::I8, signed: true }), len: Some(content.len() as u64 + 1) });
    }

    (program, errors)
}

fn register_struct(s: &cabs::StructDef, registry: &mut TypeRegistry, typedefs: &TypedefEnv) {
    let id = match registry.declare_struct(s.name.clone()) {
        Ok(id) => id,
        Err(_) => return, // redefinition; keep the first declaration
    };
    let mut fields = IndexMap::new();
    for f in &s.fields {
        if let Some(name) = &f.name {
            fields.insert(name.clone(), parse_type_string(&f.ty, registry, typedefs));
        }
    }
    registry.define_struct(id, cflow_core::types::StructDef { name: s.name.clone(), fields });
}

fn register_union(u: &cabs::UnionDef, registry: &mut TypeRegistry, typedefs: &TypedefEnv) {
    let id = match registry.declare_union(u.name.clone()) {
        Ok(id) => id,
        Err(_) => return,
    };
    let mut fields = IndexMap::new();
    for f in &u.fields {
        if let Some(name) = &f.name {
            fields.insert(name.clone(), parse_type_string(&f.ty, registry, typedefs));
        }
    }
    registry.define_union(id, cflow_core::types::UnionDef { name: u.name.clone(), fields });
}

fn register_enum(e: &cabs::EnumDef, registry: &mut TypeRegistry) {
    let id = match registry.declare_enum(e.name.clone()) {
        Ok(id) => id,
        Err(_) => return,
    };
    let mut variants = IndexMap::new();
    let mut next = 0i64;
    for (name, value_expr) in &e.variants {
        let value = value_expr.as_ref().and_then(const_eval_i64).unwrap_or(next);
        variants.insert(name.clone(), value);
        next = value + 1;
    }
    registry.define_enum(id, cflow_core::types::EnumDef { name: e.name.clone(), variants });
}

/// Evaluates an enumerator initializer that must be a compile-time integer
/// constant. Only the small grammar C enumerators actually use is
/// supported: literal constants and +/-/~/! applied to one.
fn const_eval_i64(e: &cabs::Expression) -> Option<i64> {
    match &e.kind {
        cabs::ExprKind::Constant(cabs::Constant::Int(n)) => Some(*n),
        cabs::ExprKind::Constant(cabs::Constant::UInt(n)) => Some(*n as i64),
        cabs::ExprKind::Unary { op, operand } => {
            let v = const_eval_i64(operand)?;
            Some(match op {
                cabs::UnaryOp::Neg => -v,
                cabs::UnaryOp::Plus => v,
                cabs::UnaryOp::BitNot => !v,
                cabs::UnaryOp::LogNot => (v == 0) as i64,
                _ => return None,
            })
        }
        cabs::ExprKind::Paren(inner) => const_eval_i64(inner),
        _ => None,
    }
}

struct FrontEnv<'a> {
    registry: &'a TypeRegistry,
    typedefs: &'a TypedefEnv,
    globals: &'a HashMap<String, CType>,
    functions: &'a HashMap<String, FuncSig>,
}

struct FnLower<'a> {
    env: &'a FrontEnv<'a>,
    locals: HashMap<String, CType>,
    temps: IndexMap<TempId, CType>,
    next_temp: u32,
    strings: &'a mut IndexMap<String, String>,
}

impl<'a> FnLower<'a> {
    fn alloc_temp(&mut self, ty: CType) -> TempId {
        let id = TempId(self.next_temp);
        self.next_temp += 1;
        self.temps.insert(id, ty);
        id
    }

    fn var_type(&self, name: &str) -> CType {
        if let Some(ty) = self.locals.get(name) {
            return ty.clone();
        }
        if let Some(ty) = self.env.globals.get(name) {
            return ty.clone();
        }
        if let Some(sig) = self.env.functions.get(name) {
            return CType::Function { ret: Box::new(sig.ret.clone()), params: sig.params.clone(), variadic: sig.variadic };
        }
        CType::int32()
    }

    fn intern_string(&mut self, content: &str) -> String {
        let name = format!("__str{}", self.strings.len());
        self.strings.insert(name.clone(), content.to_string());
        name
    }
}

pub fn lower_function(
    f: &cabs::FunDef,
    body: &[cabs::Statement],
    env: &FrontEnv,
    strings: &mut IndexMap<String, String>,
) -> Result<Function, LoweringError> {
    let mut locals = HashMap::new();
    for p in &f.params {
        if let Some(name) = &p.name {
            locals.insert(name.clone(), parse_type_string(&p.ty, env.registry, env.typedefs));
        }
    }
    collect_decls(body, env, &mut locals);

    let mut fl = FnLower { env, locals, temps: IndexMap::new(), next_temp: 0, strings };
    let ret_ty = parse_type_string(&f.return_type, env.registry, env.typedefs);

    let mut stmts = Vec::new();
    for s in body {
        stmts.push(fl.translate_stmt(s, None)?);
    }
    let body_stmt = clight::seq_all(stmts, f.loc.clone());

    let mut user_locals = IndexMap::new();
    for (name, ty) in &fl.locals {
        if !f.params.iter().any(|p| p.name.as_deref() == Some(name.as_str())) {
            user_locals.insert(name.clone(), ty.clone());
        }
    }

    Ok(Function {
        name: f.name.clone(),
        return_type: ret_ty,
        params: f
            .params
            .iter()
            .filter_map(|p| p.name.clone().map(|n| (n, parse_type_string(&p.ty, env.registry, env.typedefs))))
            .collect(),
        locals: user_locals,
        temps: fl.temps,
        variadic: f.variadic,
        body: body_stmt,
        loc: f.loc.clone(),
    })
}

/// Walks every nested block/control statement to find every `DeclStmt` and
/// C99 `for`-loop declaring-init, building one flat name→type table for the
/// whole function. Real C has block scoping and shadowing; this pipeline
/// does not model nested scopes, so a reused name across two sibling blocks
/// is treated as one local throughout (documented simplification).
fn collect_decls(stmts: &[cabs::Statement], env: &FrontEnv, locals: &mut HashMap<String, CType>) {
    for s in stmts {
        collect_decls_one(s, env, locals);
    }
}

fn collect_decls_one(s: &cabs::Statement, env: &FrontEnv, locals: &mut HashMap<String, CType>) {
    match &s.kind {
        cabs::StmtKind::DeclStmt(d) => {
            locals.insert(d.name.clone(), parse_type_string(&d.ty, env.registry, env.typedefs));
        }
        cabs::StmtKind::Block(inner) => collect_decls(inner, env, locals),
        cabs::StmtKind::If { then_branch, else_branch, .. } => {
            collect_decls_one(then_branch, env, locals);
            if let Some(e) = else_branch {
                collect_decls_one(e, env, locals);
            }
        }
        cabs::StmtKind::While { body, .. } | cabs::StmtKind::DoWhile { body, .. } => {
            collect_decls_one(body, env, locals)
        }
        cabs::StmtKind::For { init, body, .. } => {
            if let cabs::ForInit::Decl(d) = init {
                locals.insert(d.name.clone(), parse_type_string(&d.ty, env.registry, env.typedefs));
            }
            collect_decls_one(body, env, locals);
        }
        cabs::StmtKind::Switch { cases, .. } => {
            for c in cases {
                collect_decls(&c.stmts, env, locals);
            }
        }
        cabs::StmtKind::Label { stmt, .. } => collect_decls_one(stmt, env, locals),
        _ => {}
    }
}

/// Conservative side-effect classifier (spec §4.3): anything that is not
/// provably pure is treated as effectful, so `&&`/`||` in a condition
/// position only keep their short-circuit-preserving pure form when this
/// returns `false` for both operands.
fn has_side_effects(e: &cabs::Expression) -> bool {
    use cabs::ExprKind::*;
    match &e.kind {
        Constant(_) | Variable(_) | SizeofType(_) => false,
        SizeofExpr(_) => false, // operand is never evaluated
        Unary { op, operand } => {
            matches!(
                op,
                cabs::UnaryOp::PreInc | cabs::UnaryOp::PreDec | cabs::UnaryOp::PostInc | cabs::UnaryOp::PostDec
            ) || has_side_effects(operand)
        }
        Binary { op, lhs, rhs } => op.is_assignment() || has_side_effects(lhs) || has_side_effects(rhs),
        Paren(inner) => has_side_effects(inner),
        Conditional { cond, then_expr, else_expr } => {
            has_side_effects(cond) || has_side_effects(then_expr) || has_side_effects(else_expr)
        }
        Call { .. } => true,
        Index { base, index } => has_side_effects(base) || has_side_effects(index),
        Member { base, .. } => has_side_effects(base),
        Cast { expr, .. } => has_side_effects(expr),
    }
}

fn combine_arith_ty(l: &CType, r: &CType) -> CType {
    if l.is_float() || r.is_float() {
        return CType::Float(cflow_core::types::FloatSize::F64);
    }
    if l.is_pointer() {
        return l.clone();
    }
    if r.is_pointer() {
        return r.clone();
    }
    if l.is_64bit() || r.is_64bit() {
        return CType::int64();
    }
    CType::int32()
}

fn cabs_binop_to_clight(op: cabs::BinaryOp) -> Option<BinOp> {
    use cabs::BinaryOp as C;
    Some(match op {
        C::Add => BinOp::Add,
        C::Sub => BinOp::Sub,
        C::Mul => BinOp::Mul,
        C::Div => BinOp::Div,
        C::Mod => BinOp::Mod,
        C::Shl => BinOp::Shl,
        C::Shr => BinOp::Shr,
        C::Lt => BinOp::Lt,
        C::Gt => BinOp::Gt,
        C::Le => BinOp::Le,
        C::Ge => BinOp::Ge,
        C::Eq => BinOp::Eq,
        C::Ne => BinOp::Ne,
        C::BitAnd => BinOp::BitAnd,
        C::BitXor => BinOp::BitXor,
        C::BitOr => BinOp::BitOr,
        _ => return None,
    })
}

fn is_relational(op: BinOp) -> bool {
    matches!(op, BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne)
}

impl<'a> FnLower<'a> {
    fn translate_stmt(&mut self, s: &cabs::Statement, break_ctx: Option<()>) -> Result<Stmt, LoweringError> {
        let loc = s.loc.clone();
        match &s.kind {
            cabs::StmtKind::Return(e) => {
                let Some(e) = e else { return Ok(Stmt::new(StmtKind::Return(None), loc)) };
                let (stmts, v) = self.translate_expr(e, Ctx::Value)?;
                Ok(clight::seq(clight::seq_all(stmts, loc.clone()), Stmt::new(StmtKind::Return(Some(v)), loc)))
            }
            cabs::StmtKind::Computation(e) => {
                let (stmts, _) = self.translate_expr(e, Ctx::Value)?;
                Ok(clight::seq_all(stmts, loc))
            }
            cabs::StmtKind::If { cond, then_branch, else_branch } => {
                let (stmts, c) = self.translate_expr(cond, Ctx::Condition)?;
                let then_s = self.translate_stmt(then_branch, break_ctx)?;
                let else_s = match else_branch {
                    Some(e) => self.translate_stmt(e, break_ctx)?,
                    None => Stmt::skip(loc.clone()),
                };
                let if_stmt = Stmt::new(
                    StmtKind::Ifthenelse { cond: c, then_branch: Box::new(then_s), else_branch: Box::new(else_s) },
                    loc.clone(),
                );
                Ok(clight::seq(clight::seq_all(stmts, loc), if_stmt))
            }
            cabs::StmtKind::While { cond, body } => {
                let (cond_stmts, c) = self.translate_expr(cond, Ctx::Condition)?;
                let test = clight::seq(
                    clight::seq_all(cond_stmts, loc.clone()),
                    Stmt::new(
                        StmtKind::Ifthenelse {
                            cond: c,
                            then_branch: Box::new(Stmt::skip(loc.clone())),
                            else_branch: Box::new(Stmt::new(StmtKind::Break, loc.clone())),
                        },
                        loc.clone(),
                    ),
                );
                let inner_body = self.translate_stmt(body, Some(()))?;
                Ok(Stmt::new(
                    StmtKind::Loop { body: Box::new(clight::seq(test, inner_body)), cont: Box::new(Stmt::skip(loc.clone())) },
                    loc,
                ))
            }
            cabs::StmtKind::DoWhile { body, cond } => {
                let inner_body = self.translate_stmt(body, Some(()))?;
                let (cond_stmts, c) = self.translate_expr(cond, Ctx::Condition)?;
                let test = clight::seq(
                    clight::seq_all(cond_stmts, loc.clone()),
                    Stmt::new(
                        StmtKind::Ifthenelse {
                            cond: c,
                            then_branch: Box::new(Stmt::skip(loc.clone())),
                            else_branch: Box::new(Stmt::new(StmtKind::Break, loc.clone())),
                        },
                        loc.clone(),
                    ),
                );
                Ok(Stmt::new(StmtKind::Loop { body: Box::new(inner_body), cont: Box::new(test) }, loc))
            }
            cabs::StmtKind::For { init, cond, step, body } => {
                let init_stmt = match init {
                    cabs::ForInit::None => Stmt::skip(loc.clone()),
                    cabs::ForInit::Expr(e) => {
                        let (stmts, _) = self.translate_expr(e, Ctx::Value)?;
                        clight::seq_all(stmts, loc.clone())
                    }
                    cabs::ForInit::Decl(d) => self.translate_decl_init(d)?,
                };
                let test = match cond {
                    Some(c) => {
                        let (cond_stmts, cv) = self.translate_expr(c, Ctx::Condition)?;
                        clight::seq(
                            clight::seq_all(cond_stmts, loc.clone()),
                            Stmt::new(
                                StmtKind::Ifthenelse {
                                    cond: cv,
                                    then_branch: Box::new(Stmt::skip(loc.clone())),
                                    else_branch: Box::new(Stmt::new(StmtKind::Break, loc.clone())),
                                },
                                loc.clone(),
                            ),
                        )
                    }
                    None => Stmt::skip(loc.clone()),
                };
                let inner_body = self.translate_stmt(body, Some(()))?;
                let step_stmt = match step {
                    Some(e) => {
                        let (stmts, _) = self.translate_expr(e, Ctx::Value)?;
                        clight::seq_all(stmts, loc.clone())
                    }
                    None => Stmt::skip(loc.clone()),
                };
                let loop_stmt = Stmt::new(
                    StmtKind::Loop { body: Box::new(clight::seq(test, inner_body)), cont: Box::new(step_stmt) },
                    loc.clone(),
                );
                Ok(clight::seq(init_stmt, loop_stmt))
            }
            cabs::StmtKind::Break => Ok(Stmt::new(StmtKind::Break, loc)),
            cabs::StmtKind::Continue => Ok(Stmt::new(StmtKind::Continue, loc)),
            cabs::StmtKind::Switch { expr, cases } => {
                let (stmts, e) = self.translate_expr(expr, Ctx::Value)?;
                let mut clight_cases = Vec::new();
                for c in cases {
                    let value = match &c.expr {
                        Some(ce) => Some(const_eval_i64(ce).unwrap_or(0)),
                        None => None,
                    };
                    let mut body_stmts = Vec::new();
                    for s in &c.stmts {
                        body_stmts.push(self.translate_stmt(s, Some(()))?);
                    }
                    clight_cases.push(SwitchCase { value, body: clight::seq_all(body_stmts, c.loc.clone()) });
                }
                let sw = Stmt::new(StmtKind::Switch { expr: e, cases: clight_cases }, loc.clone());
                Ok(clight::seq(clight::seq_all(stmts, loc), sw))
            }
            cabs::StmtKind::Goto(label) => Ok(Stmt::new(StmtKind::Goto(label.clone()), loc)),
            cabs::StmtKind::Label { name, stmt } => {
                let inner = self.translate_stmt(stmt, break_ctx)?;
                Ok(Stmt::new(StmtKind::Label { name: name.clone(), stmt: Box::new(inner) }, loc))
            }
            cabs::StmtKind::Block(inner) => {
                let mut stmts = Vec::new();
                for s in inner {
                    stmts.push(self.translate_stmt(s, break_ctx)?);
                }
                Ok(clight::seq_all(stmts, loc))
            }
            cabs::StmtKind::DeclStmt(d) => self.translate_decl_init(d),
        }
    }

    fn translate_decl_init(&mut self, d: &cabs::Decl) -> Result<Stmt, LoweringError> {
        let loc = d.loc.clone();
        let Some(init) = &d.init else { return Ok(Stmt::skip(loc)) };
        let (stmts, v) = self.translate_expr(init, Ctx::Value)?;
        let assign = Stmt::new(
            StmtKind::Assign { lvalue: Expr::new(ExprKind::Var(d.name.clone()), self.var_type(&d.name), loc.clone()), rvalue: v },
            loc.clone(),
        );
        Ok(clight::seq(clight::seq_all(stmts, loc), assign))
    }

    /// Lowers an lvalue-position expression to the `Var`/`Deref`/`Field`
    /// shape `Sassign` and `&` both need, plus any side-effecting prelude
    /// (e.g. the pointer/index subexpressions of `a[i].f`).
    fn translate_lvalue(&mut self, e: &cabs::Expression) -> Result<(Vec<Stmt>, Expr), LoweringError> {
        match &e.kind {
            cabs::ExprKind::Variable(name) => {
                Ok((vec![], Expr::new(ExprKind::Var(name.clone()), self.var_type(name), e.loc.clone())))
            }
            cabs::ExprKind::Unary { op: cabs::UnaryOp::Deref, operand } => {
                let (stmts, ptr) = self.translate_expr(operand, Ctx::Value)?;
                let pointee = match &ptr.ty {
                    CType::Pointer(inner) => (**inner).clone(),
                    CType::Array { elem, .. } => (**elem).clone(),
                    _ => CType::int32(),
                };
                Ok((stmts, Expr::new(ExprKind::Deref(Box::new(ptr)), pointee, e.loc.clone())))
            }
            cabs::ExprKind::Index { base, index } => {
                let (mut stmts, b) = self.translate_expr(base, Ctx::Value)?;
                let (i_stmts, ix) = self.translate_expr(index, Ctx::Value)?;
                stmts.extend(i_stmts);
                let elem_ty = match &b.ty {
                    CType::Pointer(inner) => (**inner).clone(),
                    CType::Array { elem, .. } => (**elem).clone(),
                    _ => CType::int32(),
                };
                let addr_ty = b.ty.clone();
                let addr = Expr::new(ExprKind::Binop(BinOp::Add, Box::new(b), Box::new(ix)), addr_ty, e.loc.clone());
                Ok((stmts, Expr::new(ExprKind::Deref(Box::new(addr)), elem_ty, e.loc.clone())))
            }
            cabs::ExprKind::Member { base, field, is_arrow } => {
                let (stmts, base_expr) = if *is_arrow {
                    let (s, ptr) = self.translate_expr(base, Ctx::Value)?;
                    let pointee = match &ptr.ty {
                        CType::Pointer(inner) => (**inner).clone(),
                        _ => CType::int32(),
                    };
                    (s, Expr::new(ExprKind::Deref(Box::new(ptr)), pointee, e.loc.clone()))
                } else {
                    self.translate_lvalue(base)?
                };
                let field_ty = self.field_type(&base_expr.ty, field);
                Ok((stmts, Expr::new(ExprKind::Field(Box::new(base_expr), field.clone()), field_ty, e.loc.clone())))
            }
            cabs::ExprKind::Paren(inner) => self.translate_lvalue(inner),
            _ => Err(LoweringError::UnsupportedConstruct { construct: "non-lvalue expression used as an assignment target".to_string() }),
        }
    }

    fn field_type(&self, base_ty: &CType, field: &str) -> CType {
        match base_ty {
            CType::Struct(id) => self
                .env
                .registry
                .struct_def(*id)
                .and_then(|d| d.field_type(field))
                .cloned()
                .unwrap_or(CType::int32()),
            CType::Union(id) => self
                .env
                .registry
                .union_def(*id)
                .and_then(|d| d.field_type(field))
                .cloned()
                .unwrap_or(CType::int32()),
            _ => CType::int32(),
        }
    }

    fn write_stmt(&self, lv: &Expr, rvalue: Expr, loc: SourceLoc) -> Stmt {
        Stmt::new(StmtKind::Assign { lvalue: lv.clone(), rvalue }, loc)
    }

    fn translate_expr(&mut self, e: &cabs::Expression, ctx: Ctx) -> Result<(Vec<Stmt>, Expr), LoweringError> {
        let loc = e.loc.clone();
        match &e.kind {
            cabs::ExprKind::Constant(c) => Ok((vec![], self.lower_constant(c, loc))),
            cabs::ExprKind::Variable(name) => {
                if let Some(v) = self.env.registry.lookup_enum_constant(name) {
                    return Ok((vec![], Expr::new(ExprKind::ConstInt(v), CType::int32(), loc)));
                }
                Ok((vec![], Expr::new(ExprKind::Var(name.clone()), self.var_type(name), loc)))
            }
            cabs::ExprKind::Paren(inner) => self.translate_expr(inner, ctx),
            cabs::ExprKind::Unary { op, operand } => self.translate_unary(*op, operand, loc),
            cabs::ExprKind::Binary { op, lhs, rhs } => self.translate_binary(*op, lhs, rhs, ctx, loc, e),
            cabs::ExprKind::Conditional { cond, then_expr, else_expr } => {
                self.translate_conditional(cond, then_expr, else_expr, loc)
            }
            cabs::ExprKind::Call { callee, args } => self.translate_call(callee, args, loc),
            cabs::ExprKind::Index { .. } | cabs::ExprKind::Member { .. } => {
                // `Ederef`/`Efield` are themselves value-producing reads, so
                // reading `a[i]` or `p->f` needs no extra step beyond lvalue
                // translation; only a subsequent assignment needs the
                // address-shaped form this also returns.
                self.translate_lvalue(e)
            }
            cabs::ExprKind::SizeofExpr(inner) => {
                let ty = self.static_type_of(inner);
                let size = ty.size_of(self.env.registry) as i64;
                Ok((vec![], Expr::new(ExprKind::ConstLong(size), CType::Int { size: cflow_core::types::IntSize::I64, signed: false }, loc)))
            }
            cabs::ExprKind::SizeofType(type_str) => {
                let ty = parse_type_string(type_str, self.env.registry, self.env.typedefs);
                let size = ty.size_of(self.env.registry) as i64;
                Ok((vec![], Expr::new(ExprKind::ConstLong(size), CType::Int { size: cflow_core::types::IntSize::I64, signed: false }, loc)))
            }
            cabs::ExprKind::Cast { to_type, expr } => {
                let (stmts, v) = self.translate_expr(expr, Ctx::Value)?;
                let ty = parse_type_string(to_type, self.env.registry, self.env.typedefs);
                Ok((stmts, Expr::new(ExprKind::Cast(ty.clone(), Box::new(v)), ty, loc)))
            }
        }
    }

    fn lower_constant(&mut self, c: &cabs::Constant, loc: SourceLoc) -> Expr {
        match c {
            cabs::Constant::Int(n) => {
                let ty = if *n >= i32::MIN as i64 && *n <= i32::MAX as i64 { CType::int32() } else { CType::int64() };
                Expr::new(ExprKind::ConstInt(*n), ty, loc)
            }
            cabs::Constant::UInt(n) => {
                let ty = CType::Int { size: if *n <= u32::MAX as u64 { cflow_core::types::IntSize::I32 } else { cflow_core::types::IntSize::I64 }, signed: false };
                Expr::new(ExprKind::ConstInt(*n as i64), ty, loc)
            }
            cabs::Constant::Float(f) => Expr::new(ExprKind::ConstFloat(*f), CType::Float(cflow_core::types::FloatSize::F64), loc),
            cabs::Constant::Char(c) => Expr::new(ExprKind::ConstInt(*c as i64), CType::Int { size: cflow_core::types::IntSize::I8, signed: true }, loc),
            cabs::Constant::Str(s) => {
                let name = self.intern_string(s);
                let str_ty = CType::Array { elem: Box::new(CType::Int { size: cflow_core::types::IntSize::I8, signed: true }), len: Some(s.len() as u64 + 1) };
                let addr = Expr::new(ExprKind::Addrof(Box::new(Expr::new(ExprKind::Var(name), str_ty, loc.clone()))), CType::pointer_to(CType::Int { size: cflow_core::types::IntSize::I8, signed: true }), loc);
                addr
            }
        }
    }

    /// A type-only, non-evaluating walk used exclusively by `sizeof expr`,
    /// which C never evaluates at runtime.
    fn static_type_of(&self, e: &cabs::Expression) -> CType {
        match &e.kind {
            cabs::ExprKind::Constant(cabs::Constant::Int(_)) => CType::int32(),
            cabs::ExprKind::Constant(cabs::Constant::Float(_)) => CType::Float(cflow_core::types::FloatSize::F64),
            cabs::ExprKind::Constant(cabs::Constant::Char(_)) => CType::Int { size: cflow_core::types::IntSize::I8, signed: true },
            cabs::ExprKind::Variable(name) => self.var_type(name),
            cabs::ExprKind::Paren(inner) | cabs::ExprKind::Cast { expr: inner, .. } => self.static_type_of(inner),
            cabs::ExprKind::Unary { op: cabs::UnaryOp::Deref, operand } => match self.static_type_of(operand) {
                CType::Pointer(inner) => *inner,
                CType::Array { elem, .. } => *elem,
                other => other,
            },
            cabs::ExprKind::Unary { op: cabs::UnaryOp::AddrOf, operand } => CType::pointer_to(self.static_type_of(operand)),
            cabs::ExprKind::Unary { operand, .. } => self.static_type_of(operand),
            cabs::ExprKind::Binary { lhs, rhs, .. } => combine_arith_ty(&self.static_type_of(lhs), &self.static_type_of(rhs)),
            cabs::ExprKind::Index { base, .. } => match self.static_type_of(base) {
                CType::Pointer(inner) => *inner,
                CType::Array { elem, .. } => *elem,
                other => other,
            },
            cabs::ExprKind::Member { base, field, is_arrow } => {
                let base_ty = self.static_type_of(base);
                let base_ty = if *is_arrow {
                    match base_ty {
                        CType::Pointer(inner) => *inner,
                        other => other,
                    }
                } else {
                    base_ty
                };
                self.field_type(&base_ty, field)
            }
            _ => CType::int32(),
        }
    }

    fn translate_unary(&mut self, op: cabs::UnaryOp, operand: &cabs::Expression, loc: SourceLoc) -> Result<(Vec<Stmt>, Expr), LoweringError> {
        use cabs::UnaryOp as U;
        match op {
            U::Plus | U::Neg | U::LogNot | U::BitNot => {
                let (stmts, v) = self.translate_expr(operand, Ctx::Value)?;
                let ty = if matches!(op, U::LogNot) { CType::int32() } else { v.ty.clone() };
                let uop = match op {
                    U::Plus => UnOp::Plus,
                    U::Neg => UnOp::Neg,
                    U::LogNot => UnOp::LogNot,
                    U::BitNot => UnOp::BitNot,
                    _ => unreachable!(),
                };
                Ok((stmts, Expr::new(ExprKind::Unop(uop, Box::new(v)), ty, loc)))
            }
            U::Deref => {
                let (stmts, v) = self.translate_expr(operand, Ctx::Value)?;
                let pointee = match &v.ty {
                    CType::Pointer(inner) => (**inner).clone(),
                    CType::Array { elem, .. } => (**elem).clone(),
                    _ => CType::int32(),
                };
                Ok((stmts, Expr::new(ExprKind::Deref(Box::new(v)), pointee, loc)))
            }
            U::AddrOf => {
                let (stmts, lv) = self.translate_lvalue(operand)?;
                let ty = CType::pointer_to(lv.ty.clone());
                Ok((stmts, Expr::new(ExprKind::Addrof(Box::new(lv)), ty, loc)))
            }
            U::PreInc | U::PreDec | U::PostInc | U::PostDec => {
                let (mut stmts, lv) = self.translate_lvalue(operand)?;
                let ty = lv.ty.clone();
                let delta_op = if matches!(op, U::PreInc | U::PostInc) { BinOp::Add } else { BinOp::Sub };
                let one = Expr::new(ExprKind::ConstInt(1), ty.clone(), loc.clone());
                match op {
                    U::PostInc | U::PostDec => {
                        let old = self.alloc_temp(ty.clone());
                        stmts.push(Stmt::new(StmtKind::Set { target: AssignTarget::Tempvar(old), rvalue: lv.clone() }, loc.clone()));
                        let newval = Expr::new(
                            ExprKind::Binop(delta_op, Box::new(Expr::new(ExprKind::Tempvar(old), ty.clone(), loc.clone())), Box::new(one)),
                            ty.clone(),
                            loc.clone(),
                        );
                        stmts.push(self.write_stmt(&lv, newval, loc.clone()));
                        Ok((stmts, Expr::new(ExprKind::Tempvar(old), ty, loc)))
                    }
                    _ => {
                        let newval = Expr::new(ExprKind::Binop(delta_op, Box::new(lv.clone()), Box::new(one)), ty.clone(), loc.clone());
                        stmts.push(self.write_stmt(&lv, newval, loc.clone()));
                        let result = self.alloc_temp(ty.clone());
                        stmts.push(Stmt::new(StmtKind::Set { target: AssignTarget::Tempvar(result), rvalue: lv }, loc.clone()));
                        Ok((stmts, Expr::new(ExprKind::Tempvar(result), ty, loc)))
                    }
                }
            }
        }
    }

    fn translate_binary(
        &mut self,
        op: cabs::BinaryOp,
        lhs: &cabs::Expression,
        rhs: &cabs::Expression,
        ctx: Ctx,
        loc: SourceLoc,
        whole: &cabs::Expression,
    ) -> Result<(Vec<Stmt>, Expr), LoweringError> {
        use cabs::BinaryOp as C;

        if op.is_assignment() {
            let (mut stmts, lv) = self.translate_lvalue(lhs)?;
            let (rstmts, rv) = self.translate_expr(rhs, Ctx::Value)?;
            stmts.extend(rstmts);
            let rvalue = if op == C::Assign {
                rv
            } else {
                let underlying = cabs_binop_to_clight(op.underlying_op()).unwrap();
                Expr::new(ExprKind::Binop(underlying, Box::new(lv.clone()), Box::new(rv)), lv.ty.clone(), loc.clone())
            };
            stmts.push(self.write_stmt(&lv, rvalue.clone(), loc.clone()));
            return Ok((stmts, lv));
        }

        if op == C::Comma {
            let (mut stmts, _) = self.translate_expr(lhs, Ctx::Value)?;
            let (rstmts, rv) = self.translate_expr(rhs, ctx)?;
            stmts.extend(rstmts);
            return Ok((stmts, rv));
        }

        if matches!(op, C::LogAnd | C::LogOr) {
            if ctx == Ctx::Condition && !has_side_effects(whole) {
                let (ls, l) = self.translate_expr(lhs, Ctx::Condition)?;
                let (rs, r) = self.translate_expr(rhs, Ctx::Condition)?;
                let mut stmts = ls;
                stmts.extend(rs);
                let bop = if op == C::LogAnd { BinOp::LogAnd } else { BinOp::LogOr };
                return Ok((stmts, Expr::new(ExprKind::Binop(bop, Box::new(l), Box::new(r)), CType::int32(), loc)));
            }
            let (mut stmts, l) = self.translate_expr(lhs, Ctx::Condition)?;
            let temp = self.alloc_temp(CType::int32());
            let (rstmts, r) = self.translate_expr(rhs, Ctx::Condition)?;
            let rhs_as_bool = Stmt::new(
                StmtKind::Set { target: AssignTarget::Tempvar(temp), rvalue: Expr::new(ExprKind::Binop(BinOp::Ne, Box::new(r), Box::new(Expr::new(ExprKind::ConstInt(0), CType::int32(), loc.clone()))), CType::int32(), loc.clone()) },
                loc.clone(),
            );
            let rhs_branch = clight::seq(clight::seq_all(rstmts, loc.clone()), rhs_as_bool);
            let const_branch = |v: i64| Stmt::new(StmtKind::Set { target: AssignTarget::Tempvar(temp), rvalue: Expr::new(ExprKind::ConstInt(v), CType::int32(), loc.clone()) }, loc.clone());
            let (then_branch, else_branch) = if op == C::LogAnd {
                (rhs_branch, const_branch(0))
            } else {
                (const_branch(1), rhs_branch)
            };
            stmts.push(Stmt::new(StmtKind::Ifthenelse { cond: l, then_branch: Box::new(then_branch), else_branch: Box::new(else_branch) }, loc.clone()));
            return Ok((stmts, Expr::new(ExprKind::Tempvar(temp), CType::int32(), loc)));
        }

        let (mut stmts, l) = self.translate_expr(lhs, Ctx::Value)?;
        let (rstmts, r) = self.translate_expr(rhs, Ctx::Value)?;
        stmts.extend(rstmts);
        let bop = cabs_binop_to_clight(op)
            .ok_or_else(|| LoweringError::UnsupportedConstruct { construct: format!("{op:?}") })?;
        let ty = if is_relational(bop) { CType::int32() } else { combine_arith_ty(&l.ty, &r.ty) };
        Ok((stmts, Expr::new(ExprKind::Binop(bop, Box::new(l), Box::new(r)), ty, loc)))
    }

    fn translate_conditional(
        &mut self,
        cond: &cabs::Expression,
        then_expr: &cabs::Expression,
        else_expr: &cabs::Expression,
        loc: SourceLoc,
    ) -> Result<(Vec<Stmt>, Expr), LoweringError> {
        let (mut stmts, c) = self.translate_expr(cond, Ctx::Condition)?;
        let (then_stmts, tv) = self.translate_expr(then_expr, Ctx::Value)?;
        let (else_stmts, ev) = self.translate_expr(else_expr, Ctx::Value)?;
        let ty = combine_arith_ty(&tv.ty, &ev.ty);
        let temp = self.alloc_temp(ty.clone());
        let then_branch = clight::seq(
            clight::seq_all(then_stmts, loc.clone()),
            Stmt::new(StmtKind::Set { target: AssignTarget::Tempvar(temp), rvalue: tv }, loc.clone()),
        );
        let else_branch = clight::seq(
            clight::seq_all(else_stmts, loc.clone()),
            Stmt::new(StmtKind::Set { target: AssignTarget::Tempvar(temp), rvalue: ev }, loc.clone()),
        );
        stmts.push(Stmt::new(StmtKind::Ifthenelse { cond: c, then_branch: Box::new(then_branch), else_branch: Box::new(else_branch) }, loc.clone()));
        Ok((stmts, Expr::new(ExprKind::Tempvar(temp), ty, loc)))
    }

    fn translate_call(&mut self, callee: &cabs::Expression, args: &[cabs::Expression], loc: SourceLoc) -> Result<(Vec<Stmt>, Expr), LoweringError> {
        let (mut stmts, callee_expr) = self.translate_expr(callee, Ctx::Value)?;
        let mut arg_exprs = Vec::new();
        for a in args {
            let (astmts, av) = self.translate_expr(a, Ctx::Value)?;
            stmts.extend(astmts);
            arg_exprs.push(av);
        }
        let ret_ty = match &callee_expr.ty {
            CType::Function { ret, .. } => (**ret).clone(),
            CType::Pointer(inner) => match &**inner {
                CType::Function { ret, .. } => (**ret).clone(),
                _ => CType::int32(),
            },
            _ => CType::int32(),
        };
        if matches!(ret_ty, CType::Void) {
            stmts.push(Stmt::new(StmtKind::Call { dest: None, callee: callee_expr, args: arg_exprs }, loc.clone()));
            return Ok((stmts, Expr::new(ExprKind::ConstInt(0), CType::Void, loc)));
        }
        let temp = self.alloc_temp(ret_ty.clone());
        stmts.push(Stmt::new(StmtKind::Call { dest: Some(AssignTarget::Tempvar(temp)), callee: callee_expr, args: arg_exprs }, loc.clone()));
        Ok((stmts, Expr::new(ExprKind::Tempvar(temp), ret_ty, loc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cflow_core::cabs::*;
    use cflow_core::loc::SourceLoc;

    fn loc() -> SourceLoc {
        SourceLoc::new("t.c", 1, 1)
    }

    fn fun(name: &str, body: Vec<Statement>) -> (TranslationUnit, String) {
        let mut tu = TranslationUnit::new();
        tu.decls.push(ExternalDecl::FunDef(FunDef {
            return_type: "int".into(),
            name: name.into(),
            params: vec![],
            variadic: false,
            body: Some(body),
            loc: loc(),
        }));
        (tu, name.into())
    }

    #[test]
    fn return_constant_lowers_cleanly() {
        let (tu, _) = fun(
            "main",
            vec![Statement::new(StmtKind::Return(Some(Expression::new(ExprKind::Constant(Constant::Int(42)), loc()))), loc())],
        );
        let mut reg = TypeRegistry::new();
        let (prog, errs) = lower_program(&tu, &mut reg);
        assert!(errs.is_empty());
        let f = &prog.functions[0];
        assert!(matches!(f.body.kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn postinc_produces_read_then_write_then_temp() {
        let (tu, _) = fun(
            "f",
            vec![
                Statement::new(
                    StmtKind::DeclStmt(Decl { ty: "int".into(), name: "x".into(), init: Some(Expression::new(ExprKind::Constant(Constant::Int(0)), loc())), loc: loc() }),
                    loc(),
                ),
                Statement::new(
                    StmtKind::Return(Some(Expression::new(
                        ExprKind::Unary { op: UnaryOp::PostInc, operand: Box::new(Expression::new(ExprKind::Variable("x".into()), loc())) },
                        loc(),
                    ))),
                    loc(),
                ),
            ],
        );
        let mut reg = TypeRegistry::new();
        let (prog, errs) = lower_program(&tu, &mut reg);
        assert!(errs.is_empty());
        assert!(!prog.functions[0].temps.is_empty());
    }

    #[test]
    fn logical_and_in_condition_without_side_effects_stays_pure() {
        let (tu, _) = fun(
            "f",
            vec![Statement::new(
                StmtKind::If {
                    cond: Expression::new(
                        ExprKind::Binary {
                            op: BinaryOp::LogAnd,
                            lhs: Box::new(Expression::new(ExprKind::Variable("a".into()), loc())),
                            rhs: Box::new(Expression::new(ExprKind::Variable("b".into()), loc())),
                        },
                        loc(),
                    ),
                    then_branch: Box::new(Statement::new(StmtKind::Return(None), loc())),
                    else_branch: None,
                },
                loc(),
            )],
        );
        let mut reg = TypeRegistry::new();
        let (prog, errs) = lower_program(&tu, &mut reg);
        assert!(errs.is_empty());
        let StmtKind::Ifthenelse { cond, .. } = &prog.functions[0].body.kind else { panic!("expected if") };
        assert!(matches!(cond.kind, crate::clight::ExprKind::Binop(BinOp::LogAnd, _, _)));
    }

    #[test]
    fn while_loop_lowers_to_canonical_loop_form() {
        let (tu, _) = fun(
            "f",
            vec![Statement::new(
                StmtKind::While {
                    cond: Expression::new(ExprKind::Constant(Constant::Int(1)), loc()),
                    body: Box::new(Statement::new(StmtKind::Break, loc())),
                },
                loc(),
            )],
        );
        let mut reg = TypeRegistry::new();
        let (prog, errs) = lower_program(&tu, &mut reg);
        assert!(errs.is_empty());
        assert!(matches!(prog.functions[0].body.kind, StmtKind::Loop { .. }));
    }

    #[test]
    fn string_literal_becomes_interned_global() {
        let (tu, _) = fun(
            "f",
            vec![Statement::new(StmtKind::Return(Some(Expression::new(ExprKind::Constant(Constant::Str("hi".into())), loc()))), loc())],
        );
        let mut reg = TypeRegistry::new();
        let (prog, errs) = lower_program(&tu, &mut reg);
        assert!(errs.is_empty());
        assert!(prog.globals.keys().any(|k| k.starts_with("__str")));
    }
}
