//! SimplLocals: promotes address-untaken scalar locals from memory
//! (`Var`/`Assign`) to temporaries (`Tempvar`/`Set`) in place over a
//! [`Function`](crate::clight::Function) SimplExpr has already produced
//! (spec §4.4).
//!
//! SimplExpr never makes this decision itself — it always emits `Var` for
//! user-named locals — so every local arrives here as a candidate. A local
//! is promoted only if it is scalar (aggregates must stay addressable) and
//! its address is never taken anywhere in the function body.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::clight::{AssignTarget, Expr, ExprKind, Function, Stmt, StmtKind, TempId};

/// Runs the promotion pass over every function in a program in place.
pub fn run(program: &mut crate::clight::Program) {
    for f in &mut program.functions {
        promote_function(f);
    }
}

pub fn promote_function(f: &mut Function) {
    let mut taken = HashSet::new();
    collect_address_taken_stmt(&f.body, &mut taken);

    let mut next_temp = f.temps.keys().map(|t| t.0 + 1).max().unwrap_or(0);
    let mut promoted: IndexMap<String, TempId> = IndexMap::new();

    let names: Vec<String> = f.locals.keys().cloned().collect();
    for name in names {
        let ty = f.locals.get(&name).unwrap().clone();
        if ty.is_scalar() && !taken.contains(&name) {
            let id = TempId(next_temp);
            next_temp += 1;
            f.temps.insert(id, ty);
            promoted.insert(name, id);
        }
    }

    if promoted.is_empty() {
        return;
    }

    for name in promoted.keys() {
        f.locals.shift_remove(name);
    }

    rewrite_stmt(&mut f.body, &promoted);
}

fn collect_address_taken_stmt(s: &Stmt, taken: &mut HashSet<String>) {
    match &s.kind {
        StmtKind::Skip | StmtKind::Break | StmtKind::Continue | StmtKind::Goto(_) => {}
        StmtKind::Assign { lvalue, rvalue } => {
            collect_address_taken_expr(lvalue, taken);
            collect_address_taken_expr(rvalue, taken);
        }
        StmtKind::Set { rvalue, .. } => collect_address_taken_expr(rvalue, taken),
        StmtKind::Call { callee, args, .. } => {
            collect_address_taken_expr(callee, taken);
            for a in args {
                collect_address_taken_expr(a, taken);
            }
        }
        StmtKind::Builtin { args, .. } => {
            for a in args {
                collect_address_taken_expr(a, taken);
            }
        }
        StmtKind::Sequence(a, b) => {
            collect_address_taken_stmt(a, taken);
            collect_address_taken_stmt(b, taken);
        }
        StmtKind::Ifthenelse { cond, then_branch, else_branch } => {
            collect_address_taken_expr(cond, taken);
            collect_address_taken_stmt(then_branch, taken);
            collect_address_taken_stmt(else_branch, taken);
        }
        StmtKind::Loop { body, cont } => {
            collect_address_taken_stmt(body, taken);
            collect_address_taken_stmt(cont, taken);
        }
        StmtKind::Return(e) => {
            if let Some(e) = e {
                collect_address_taken_expr(e, taken);
            }
        }
        StmtKind::Switch { expr, cases } => {
            collect_address_taken_expr(expr, taken);
            for c in cases {
                collect_address_taken_stmt(&c.body, taken);
            }
        }
        StmtKind::Label { stmt, .. } => collect_address_taken_stmt(stmt, taken),
    }
}

fn collect_address_taken_expr(e: &Expr, taken: &mut HashSet<String>) {
    match &e.kind {
        ExprKind::ConstInt(_) | ExprKind::ConstLong(_) | ExprKind::ConstFloat(_) | ExprKind::Var(_) | ExprKind::Tempvar(_) => {}
        ExprKind::Addrof(inner) => {
            if let ExprKind::Var(name) = &inner.kind {
                taken.insert(name.clone());
            }
            collect_address_taken_expr(inner, taken);
        }
        ExprKind::Deref(inner) | ExprKind::Unop(_, inner) | ExprKind::Cast(_, inner) | ExprKind::Field(inner, _) => {
            collect_address_taken_expr(inner, taken)
        }
        ExprKind::Binop(_, l, r) => {
            collect_address_taken_expr(l, taken);
            collect_address_taken_expr(r, taken);
        }
    }
}

fn rewrite_stmt(s: &mut Stmt, promoted: &IndexMap<String, TempId>) {
    match &mut s.kind {
        StmtKind::Skip | StmtKind::Break | StmtKind::Continue | StmtKind::Goto(_) => {}
        StmtKind::Assign { lvalue, rvalue } => {
            rewrite_expr(rvalue, promoted);
            if let ExprKind::Var(name) = &lvalue.kind {
                if let Some(&id) = promoted.get(name) {
                    let rv = std::mem::replace(rvalue, Expr::new(ExprKind::ConstInt(0), lvalue.ty.clone(), lvalue.loc.clone()));
                    s.kind = StmtKind::Set { target: AssignTarget::Tempvar(id), rvalue: rv };
                    return;
                }
            }
            rewrite_expr(lvalue, promoted);
        }
        StmtKind::Set { rvalue, .. } => rewrite_expr(rvalue, promoted),
        StmtKind::Call { callee, args, .. } => {
            rewrite_expr(callee, promoted);
            for a in args {
                rewrite_expr(a, promoted);
            }
        }
        StmtKind::Builtin { args, .. } => {
            for a in args {
                rewrite_expr(a, promoted);
            }
        }
        StmtKind::Sequence(a, b) => {
            rewrite_stmt(a, promoted);
            rewrite_stmt(b, promoted);
        }
        StmtKind::Ifthenelse { cond, then_branch, else_branch } => {
            rewrite_expr(cond, promoted);
            rewrite_stmt(then_branch, promoted);
            rewrite_stmt(else_branch, promoted);
        }
        StmtKind::Loop { body, cont } => {
            rewrite_stmt(body, promoted);
            rewrite_stmt(cont, promoted);
        }
        StmtKind::Return(e) => {
            if let Some(e) = e {
                rewrite_expr(e, promoted);
            }
        }
        StmtKind::Switch { expr, cases } => {
            rewrite_expr(expr, promoted);
            for c in cases {
                rewrite_stmt(&mut c.body, promoted);
            }
        }
        StmtKind::Label { stmt, .. } => rewrite_stmt(stmt, promoted),
    }
}

fn rewrite_expr(e: &mut Expr, promoted: &IndexMap<String, TempId>) {
    match &mut e.kind {
        ExprKind::ConstInt(_) | ExprKind::ConstLong(_) | ExprKind::ConstFloat(_) | ExprKind::Tempvar(_) => {}
        ExprKind::Var(name) => {
            if let Some(&id) = promoted.get(name) {
                e.kind = ExprKind::Tempvar(id);
            }
        }
        ExprKind::Addrof(inner) => rewrite_expr(inner, promoted), // inner is never a promoted Var by construction
        ExprKind::Deref(inner) | ExprKind::Unop(_, inner) | ExprKind::Cast(_, inner) | ExprKind::Field(inner, _) => {
            rewrite_expr(inner, promoted)
        }
        ExprKind::Binop(_, l, r) => {
            rewrite_expr(l, promoted);
            rewrite_expr(r, promoted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clight::*;
    use cflow_core::loc::SourceLoc;
    use cflow_core::types::CType;
    use indexmap::IndexMap;

    fn loc() -> SourceLoc {
        SourceLoc::synthetic()
    }

    fn sample_function() -> Function {
        // int f() { int x; x = 1; return x; }
        let assign = Stmt::new(
            StmtKind::Assign {
                lvalue: Expr::new(ExprKind::Var("x".into()), CType::int32(), loc()),
                rvalue: Expr::new(ExprKind::ConstInt(1), CType::int32(), loc()),
            },
            loc(),
        );
        let ret = Stmt::new(StmtKind::Return(Some(Expr::new(ExprKind::Var("x".into()), CType::int32(), loc()))), loc());
        let mut locals = IndexMap::new();
        locals.insert("x".to_string(), CType::int32());
        Function {
            name: "f".into(),
            return_type: CType::int32(),
            params: vec![],
            locals,
            temps: IndexMap::new(),
            variadic: false,
            body: seq(assign, ret),
            loc: loc(),
        }
    }

    #[test]
    fn address_untaken_scalar_is_promoted() {
        let mut f = sample_function();
        promote_function(&mut f);
        assert!(f.locals.is_empty());
        assert_eq!(f.temps.len(), 1);
        let StmtKind::Sequence(a, b) = &f.body.kind else { panic!("expected sequence") };
        assert!(matches!(a.kind, StmtKind::Set { .. }));
        assert!(matches!(b.kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn address_taken_local_stays_in_memory() {
        let mut f = sample_function();
        // & x somewhere makes it ineligible.
        let addr_stmt = Stmt::new(
            StmtKind::Call {
                dest: None,
                callee: Expr::new(ExprKind::Var("g".into()), CType::int32(), loc()),
                args: vec![Expr::new(ExprKind::Addrof(Box::new(Expr::new(ExprKind::Var("x".into()), CType::int32(), loc()))), CType::pointer_to(CType::int32()), loc())],
            },
            loc(),
        );
        f.body = seq(addr_stmt, f.body);
        promote_function(&mut f);
        assert_eq!(f.locals.len(), 1);
        assert!(f.temps.is_empty());
    }
}
