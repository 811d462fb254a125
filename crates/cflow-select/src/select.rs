//! Instruction selection: Cminor to CminorSel (spec §4.6). Operator
//! translation is a near-identity op-enum mapping; the work here is
//! recognizing addressing modes on every load/store address, turning
//! boolean-shaped expressions reaching a branch test into structured
//! [`Condition`]s, and fusing `base + (index << k)` shapes into
//! `Addshift`/`Subshift` wherever they appear as a plain value.

use cflow_ir::cminor as src;
use cflow_ir::cminor::{BinOp, Cmp};

use crate::cminor_sel::{Addressing, CallTarget, Condition, Expr, Function, Program, Stmt, StmtKind};
use crate::error::SelectError;

pub fn select_program(program: &src::Program) -> (Program, Vec<SelectError>) {
    let mut errors = Vec::new();
    let functions = program.functions.iter().map(|f| select_function(f, &mut errors)).collect();
    (Program { functions, globals: program.globals.clone() }, errors)
}

fn select_function(f: &src::Function, errors: &mut Vec<SelectError>) -> Function {
    let _ = errors;
    let stack_slots = f
        .stack_slots
        .iter()
        .map(|(name, slot)| (name.clone(), crate::cminor_sel::StackSlot { offset: slot.offset, size: slot.size }))
        .collect();
    Function {
        name: f.name.clone(),
        params: f.params.clone(),
        stack_slots,
        stack_size: f.stack_size,
        sig: f.sig.clone(),
        body: select_stmt(&f.body),
        loc: f.loc.clone(),
    }
}

fn select_stmt(s: &src::Stmt) -> Stmt {
    let loc = s.loc.clone();
    let kind = match &s.kind {
        src::StmtKind::Skip => StmtKind::Skip,
        src::StmtKind::Assign(name, e) => StmtKind::Assign(name.clone(), lower_expr(e)),
        src::StmtKind::Store(chunk, addr, value) => {
            let (mode, args) = select_address(addr);
            StmtKind::Store { chunk: *chunk, mode, args: args.into_iter().map(|a| lower_expr(&a)).collect(), value: lower_expr(value) }
        }
        src::StmtKind::Call { dest, target, sig, args } => StmtKind::Call {
            dest: dest.clone(),
            target: select_call_target(target),
            sig: sig.clone(),
            args: args.iter().map(lower_expr).collect(),
        },
        src::StmtKind::Builtin { dest, name, args } => {
            StmtKind::Builtin { dest: dest.clone(), name: name.clone(), args: args.iter().map(lower_expr).collect() }
        }
        src::StmtKind::Seq(a, b) => return crate::cminor_sel::seq(select_stmt(a), select_stmt(b)),
        src::StmtKind::Ifthenelse(cond, t, e) => {
            StmtKind::Ifthenelse(select_condition(cond), Box::new(select_stmt(t)), Box::new(select_stmt(e)))
        }
        src::StmtKind::Loop(body) => StmtKind::Loop(Box::new(select_stmt(body))),
        src::StmtKind::Block(body) => StmtKind::Block(Box::new(select_stmt(body))),
        src::StmtKind::Exit(n) => StmtKind::Exit(*n),
        src::StmtKind::Switch { expr, cases, default } => {
            StmtKind::Switch { expr: lower_expr(expr), cases: cases.clone(), default: *default }
        }
        src::StmtKind::Return(e) => StmtKind::Return(e.as_ref().map(lower_expr)),
        src::StmtKind::Label(name, body) => StmtKind::Label(name.clone(), Box::new(select_stmt(body))),
        src::StmtKind::Goto(name) => StmtKind::Goto(name.clone()),
    };
    Stmt::new(kind, loc)
}

fn select_call_target(t: &src::CallTarget) -> CallTarget {
    match t {
        src::CallTarget::Direct(name) => CallTarget::Direct(name.clone()),
        src::CallTarget::Indirect(e) => CallTarget::Indirect(lower_expr(e)),
    }
}

/// General-context lowering: preserves operator shape, recognizes
/// `base + (index << k)` as a fused shift, and selects an addressing mode
/// whenever a `Load` is reached.
fn lower_expr(e: &src::Expr) -> Expr {
    match e {
        src::Expr::ConstInt(i) => Expr::ConstInt(*i),
        src::Expr::ConstLong(i) => Expr::ConstLong(*i),
        src::Expr::ConstFloat(f) => Expr::ConstFloat(*f),
        src::Expr::ConstSingle(f) => Expr::ConstSingle(*f),
        src::Expr::Var(name) => Expr::Var(name.clone()),
        src::Expr::Unop(op, inner) => Expr::Unop(*op, Box::new(lower_expr(inner))),
        src::Expr::Binop(op, l, r) => {
            if let Some((base, idx, shift)) = match_shift_fusion(*op, l, r) {
                return if is_sub(*op) {
                    Expr::Subshift(Box::new(lower_expr(base)), Box::new(lower_expr(idx)), shift)
                } else {
                    Expr::Addshift(Box::new(lower_expr(base)), Box::new(lower_expr(idx)), shift)
                };
            }
            Expr::Binop(*op, Box::new(lower_expr(l)), Box::new(lower_expr(r)))
        }
        src::Expr::Load(chunk, addr) => {
            let (mode, args) = select_address(addr);
            Expr::Load(*chunk, mode, args.into_iter().map(|a| lower_expr(&a)).collect())
        }
        src::Expr::Addrsymbol(sym, off) => Expr::Addrsymbol(sym.clone(), *off),
        src::Expr::Addrstack(off) => Expr::Addrstack(*off),
    }
}

fn is_sub(op: BinOp) -> bool {
    matches!(op, BinOp::Sub | BinOp::Subl)
}

fn is_add(op: BinOp) -> bool {
    matches!(op, BinOp::Add | BinOp::Addl)
}

/// Recognizes `base + (index << k)` (commutative) or `base - (index << k)`
/// (only with the shift on the right, matching normal subtraction shape).
fn match_shift_fusion<'a>(op: BinOp, l: &'a src::Expr, r: &'a src::Expr) -> Option<(&'a src::Expr, &'a src::Expr, u8)> {
    if is_add(op) {
        if let Some((idx, k)) = as_small_shift(r) {
            return Some((l, idx, k));
        }
        if let Some((idx, k)) = as_small_shift(l) {
            return Some((r, idx, k));
        }
        None
    } else if is_sub(op) {
        as_small_shift(r).map(|(idx, k)| (l, idx, k))
    } else {
        None
    }
}

fn as_small_shift(e: &src::Expr) -> Option<(&src::Expr, u8)> {
    if let src::Expr::Binop(BinOp::Shl | BinOp::Shll, idx, amount) = e {
        if let src::Expr::ConstInt(k) = amount.as_ref() {
            if (0..=3).contains(k) {
                return Some((idx, *k as u8));
            }
        }
    }
    None
}

fn as_const(e: &src::Expr) -> Option<i64> {
    match e {
        src::Expr::ConstInt(i) => Some(*i as i64),
        src::Expr::ConstLong(i) => Some(*i),
        _ => None,
    }
}

/// Selects an addressing mode for a memory-access address expression,
/// trying modes in order of specificity per spec §4.6. Returns the mode
/// plus the Cminor subexpressions that feed its base/index registers, in
/// the order the mode expects them.
fn select_address(addr: &src::Expr) -> (Addressing, Vec<src::Expr>) {
    if let Some(r) = try_aglobal(addr) {
        return r;
    }
    if let Some(r) = try_ainstack(addr) {
        return r;
    }
    if let Some(r) = try_aindexed2shift(addr) {
        return r;
    }
    if let Some(r) = try_aindexed2ext(addr) {
        return r;
    }
    if let Some(r) = try_aindexed2(addr) {
        return r;
    }
    if let Some(r) = try_aindexed(addr) {
        return r;
    }
    (Addressing::Aindexed(0), vec![addr.clone()])
}

fn try_aglobal(addr: &src::Expr) -> Option<(Addressing, Vec<src::Expr>)> {
    match addr {
        src::Expr::Addrsymbol(sym, off) => Some((Addressing::Aglobal(sym.clone(), *off), vec![])),
        src::Expr::Binop(op, l, r) if is_add(*op) => {
            if let src::Expr::Addrsymbol(sym, off) = l.as_ref() {
                let c = as_const(r)?;
                return Some((Addressing::Aglobal(sym.clone(), off + c), vec![]));
            }
            if let src::Expr::Addrsymbol(sym, off) = r.as_ref() {
                let c = as_const(l)?;
                return Some((Addressing::Aglobal(sym.clone(), off + c), vec![]));
            }
            None
        }
        _ => None,
    }
}

fn try_ainstack(addr: &src::Expr) -> Option<(Addressing, Vec<src::Expr>)> {
    match addr {
        src::Expr::Addrstack(off) => Some((Addressing::Ainstack(*off), vec![])),
        src::Expr::Binop(op, l, r) if is_add(*op) => {
            if let src::Expr::Addrstack(off) = l.as_ref() {
                let c = as_const(r)?;
                return Some((Addressing::Ainstack(off + c), vec![]));
            }
            if let src::Expr::Addrstack(off) = r.as_ref() {
                let c = as_const(l)?;
                return Some((Addressing::Ainstack(off + c), vec![]));
            }
            None
        }
        _ => None,
    }
}

fn try_aindexed2shift(addr: &src::Expr) -> Option<(Addressing, Vec<src::Expr>)> {
    let src::Expr::Binop(op, l, r) = addr else { return None };
    if !is_add(*op) {
        return None;
    }
    if let Some((idx, k)) = as_small_shift(r) {
        return Some((Addressing::Aindexed2shift(k), vec![(**l).clone(), idx.clone()]));
    }
    if let Some((idx, k)) = as_small_shift(l) {
        return Some((Addressing::Aindexed2shift(k), vec![(**r).clone(), idx.clone()]));
    }
    None
}

/// `base + (sign/zero-extend(index32) [<< k])`: a 32-bit index widened to
/// 64 bits before scaling, common when indexing with an `int` into a
/// pointer on a 64-bit target.
fn try_aindexed2ext(addr: &src::Expr) -> Option<(Addressing, Vec<src::Expr>)> {
    let src::Expr::Binop(op, l, r) = addr else { return None };
    if !is_add(*op) {
        return None;
    }
    for (base, candidate) in [(l.as_ref(), r.as_ref()), (r.as_ref(), l.as_ref())] {
        if let Some((signed, idx, shift)) = as_ext_index(candidate) {
            return Some((Addressing::Aindexed2ext { signed, shift }, vec![base.clone(), idx.clone()]));
        }
    }
    None
}

fn as_ext_index(e: &src::Expr) -> Option<(bool, &src::Expr, u8)> {
    use cflow_ir::cminor::UnOp;
    let (inner, shift) = if let src::Expr::Binop(BinOp::Shl | BinOp::Shll, base, amount) = e {
        let src::Expr::ConstInt(k) = amount.as_ref() else { return None };
        if !(0..=3).contains(k) {
            return None;
        }
        (base.as_ref(), *k as u8)
    } else {
        (e, 0)
    };
    match inner {
        src::Expr::Unop(UnOp::Longofint, idx) => Some((true, idx, shift)),
        src::Expr::Unop(UnOp::Longofintu, idx) => Some((false, idx, shift)),
        _ => None,
    }
}

fn try_aindexed2(addr: &src::Expr) -> Option<(Addressing, Vec<src::Expr>)> {
    let src::Expr::Binop(op, l, r) = addr else { return None };
    if !is_add(*op) {
        return None;
    }
    if as_const(l).is_some() || as_const(r).is_some() {
        return None;
    }
    Some((Addressing::Aindexed2, vec![(**l).clone(), (**r).clone()]))
}

fn try_aindexed(addr: &src::Expr) -> Option<(Addressing, Vec<src::Expr>)> {
    match addr {
        src::Expr::Binop(op, l, r) if is_add(*op) => {
            if let Some(c) = as_const(r) {
                return Some((Addressing::Aindexed(c), vec![(**l).clone()]));
            }
            if let Some(c) = as_const(l) {
                return Some((Addressing::Aindexed(c), vec![(**r).clone()]));
            }
            None
        }
        src::Expr::Binop(op, l, r) if is_sub(*op) => {
            let c = as_const(r)?;
            Some((Addressing::Aindexed(-c), vec![(**l).clone()]))
        }
        _ => None,
    }
}

fn is_cmp_op(op: BinOp) -> bool {
    matches!(op, BinOp::Cmp(_) | BinOp::Cmpu(_) | BinOp::Cmpl(_) | BinOp::Cmplu(_) | BinOp::Cmpf(_) | BinOp::Cmpfs(_))
}

fn is_boolean_shaped(e: &src::Expr) -> bool {
    match e {
        src::Expr::Binop(op, _, _) if is_cmp_op(*op) => true,
        src::Expr::Binop(BinOp::And, l, r) | src::Expr::Binop(BinOp::Or, l, r) => is_boolean_shaped(l) && is_boolean_shaped(r),
        _ => false,
    }
}

/// Recognizes comparisons, `&&`/`||` over boolean-shaped operands, and
/// falls back to comparing any other expression against zero, matching
/// spec §4.6's "non-boolean expression compared against 0" case.
fn select_condition(e: &src::Expr) -> Condition {
    match e {
        src::Expr::ConstInt(0) => Condition::False,
        src::Expr::ConstInt(_) => Condition::True,
        src::Expr::Binop(op, l, r) if is_cmp_op(*op) => Condition::Cmp(*op, Box::new(lower_expr(l)), Box::new(lower_expr(r))),
        src::Expr::Binop(BinOp::And, l, r) if is_boolean_shaped(l) && is_boolean_shaped(r) => {
            Condition::And(Box::new(select_condition(l)), Box::new(select_condition(r)))
        }
        src::Expr::Binop(BinOp::Or, l, r) if is_boolean_shaped(l) && is_boolean_shaped(r) => {
            Condition::Or(Box::new(select_condition(l)), Box::new(select_condition(r)))
        }
        _ => Condition::Cmp(BinOp::Cmp(Cmp::Ne), Box::new(lower_expr(e)), Box::new(Expr::ConstInt(0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cflow_core::loc::SourceLoc;

    fn loc() -> SourceLoc {
        SourceLoc::synthetic()
    }

    #[test]
    fn scaled_index_selects_aindexed2shift() {
        // a[i] where sizeof(int) == 4: base + (i << 2)
        let addr = src::Expr::Binop(
            BinOp::Addl,
            Box::new(src::Expr::Addrsymbol("a".into(), 0)),
            Box::new(src::Expr::Binop(BinOp::Shll, Box::new(src::Expr::Var("i".into())), Box::new(src::Expr::ConstInt(2)))),
        );
        let (mode, _) = select_address(&addr);
        // Aglobal is tried first and matches `Addrsymbol + offset`, so a
        // non-constant index must not satisfy it; this exercises that the
        // fallthrough correctly reaches Aindexed2shift for a true index.
        assert!(matches!(mode, Addressing::Aindexed2shift(2)));
    }

    #[test]
    fn constant_offset_selects_aindexed() {
        let addr = src::Expr::Binop(BinOp::Add, Box::new(src::Expr::Var("p".into())), Box::new(src::Expr::ConstInt(8)));
        let (mode, args) = select_address(&addr);
        assert_eq!(mode, Addressing::Aindexed(8));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn logical_and_of_comparisons_becomes_cond_and() {
        let cond = src::Expr::Binop(
            BinOp::And,
            Box::new(src::Expr::Binop(BinOp::Cmp(Cmp::Lt), Box::new(src::Expr::Var("a".into())), Box::new(src::Expr::ConstInt(0)))),
            Box::new(src::Expr::Binop(BinOp::Cmp(Cmp::Gt), Box::new(src::Expr::Var("b".into())), Box::new(src::Expr::ConstInt(0)))),
        );
        assert!(matches!(select_condition(&cond), Condition::And(_, _)));
    }

    #[test]
    fn non_boolean_expression_falls_back_to_compare_with_zero() {
        let e = src::Expr::Var("x".into());
        let cond = select_condition(&e);
        assert!(matches!(cond, Condition::Cmp(BinOp::Cmp(Cmp::Ne), _, _)));
    }

    #[test]
    fn function_translation_preserves_name_and_params() {
        let f = src::Function {
            name: "f".into(),
            params: vec!["x".into()],
            stack_slots: Default::default(),
            stack_size: 0,
            sig: src::Signature { params: vec![], ret: None, variadic: false },
            body: src::Stmt::new(src::StmtKind::Return(None), loc()),
            loc: loc(),
        };
        let mut errors = Vec::new();
        let out = select_function(&f, &mut errors);
        assert_eq!(out.name, "f");
        assert_eq!(out.params, vec!["x".to_string()]);
        assert!(errors.is_empty());
    }
}
