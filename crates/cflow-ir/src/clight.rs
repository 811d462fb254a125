//! Clight: typed, pure expressions plus statements that carry all side
//! effects (spec §3, §4.3). Produced by [`crate::simpl_expr`] from Cabs and
//! consumed (after [`crate::simpl_locals`] runs over it in place) by
//! [`crate::cminor_gen`].
//!
//! Loops are already in CompCert's two-part canonical form here rather than
//! kept as `While`/`For`/`DoWhile`: `Loop(body, cont)` repeatedly runs
//! `body` then `cont`; `continue` jumps to `cont`, `break` exits the whole
//! loop. `while`/`do`/`for` are folded into this shape by SimplExpr so every
//! later stage only has one loop construct to handle.

use std::fmt;

use serde::{Deserialize, Serialize};

use cflow_core::loc::SourceLoc;
use cflow_core::types::CType;

/// Identifies a compiler-introduced temporary, unique within one function.
/// Allocated contiguously by SimplExpr and then extended (never restarted)
/// by SimplLocals when it promotes address-untaken locals (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TempId(pub u32);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Plus,
    Neg,
    LogNot,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    /// Kept as a single pure node when it appears directly as the condition
    /// of an `if`/`while`/`for`/ternary; CminorSel's condition selection is
    /// what turns it into genuinely short-circuiting control flow (spec
    /// §4.6). Used as a plain data value, SimplExpr expands it into an
    /// `Sifthenelse` writing a 0/1 temp instead of emitting this node.
    LogAnd,
    LogOr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: CType,
    pub loc: SourceLoc,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: CType, loc: SourceLoc) -> Self {
        Expr { kind, ty, loc }
    }
}

/// Clight has no array-index or `->` primitive: `a[i]` and `p->f` are
/// lowered by SimplExpr into `Ederef`/`Efield` over pointer arithmetic, the
/// same way CompCert's own Clight does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    ConstInt(i64),
    ConstLong(i64),
    ConstFloat(f64),
    Var(String),
    Tempvar(TempId),
    Deref(Box<Expr>),
    Addrof(Box<Expr>),
    Unop(UnOp, Box<Expr>),
    Binop(BinOp, Box<Expr>, Box<Expr>),
    Cast(CType, Box<Expr>),
    Field(Box<Expr>, String),
}

/// The destination of a statement that writes memory (`Sassign`) only ever
/// needs to be an address-producing expression; the destination of `Sset`
/// and a materializing `Scall` is always a pure name, hence the split type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignTarget {
    Var(String),
    Tempvar(TempId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLoc,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: SourceLoc) -> Self {
        Stmt { kind, loc }
    }

    pub fn skip(loc: SourceLoc) -> Self {
        Stmt::new(StmtKind::Skip, loc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Skip,
    /// A memory store: `*lvalue_addr = rvalue`. `lvalue_addr` is always an
    /// `Ederef`/`Efield`/`Var`-shaped expression produced by lvalue lowering.
    Assign { lvalue: Expr, rvalue: Expr },
    /// A pure local/temp write with no memory effect.
    Set { target: AssignTarget, rvalue: Expr },
    Call { dest: Option<AssignTarget>, callee: Expr, args: Vec<Expr> },
    Builtin { dest: Option<AssignTarget>, name: String, args: Vec<Expr> },
    Sequence(Box<Stmt>, Box<Stmt>),
    Ifthenelse { cond: Expr, then_branch: Box<Stmt>, else_branch: Box<Stmt> },
    /// CompCert's canonical two-part loop: run `body`, then `cont`, repeat.
    /// `continue` transfers to `cont`; `break` exits past the whole loop.
    Loop { body: Box<Stmt>, cont: Box<Stmt> },
    Break,
    Continue,
    Return(Option<Expr>),
    Switch { expr: Expr, cases: Vec<SwitchCase> },
    Label { name: String, stmt: Box<Stmt> },
    Goto(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` marks the `default` arm.
    pub value: Option<i64>,
    pub body: Stmt,
}

/// Joins two statements with `Ssequence`, skipping the join entirely when
/// either side is a no-op so repeated folding doesn't pile up `Sskip`s.
pub fn seq(a: Stmt, b: Stmt) -> Stmt {
    match (&a.kind, &b.kind) {
        (StmtKind::Skip, _) => b,
        (_, StmtKind::Skip) => a,
        _ => {
            let loc = a.loc.clone();
            Stmt::new(StmtKind::Sequence(Box::new(a), Box::new(b)), loc)
        }
    }
}

/// Folds a list of statements left-to-right with [`seq`], in source order.
pub fn seq_all(stmts: Vec<Stmt>, tail_loc: SourceLoc) -> Stmt {
    stmts
        .into_iter()
        .fold(Stmt::skip(tail_loc), |acc, s| if matches!(acc.kind, StmtKind::Skip) { s } else { seq(acc, s) })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub return_type: CType,
    pub params: Vec<(String, CType)>,
    /// Locals that are NOT promoted to temporaries: aggregates, and any
    /// scalar whose address is taken somewhere in the body (spec §4.4).
    pub locals: indexmap::IndexMap<String, CType>,
    /// Promoted scalar locals plus every temp SimplExpr introduced for
    /// side-effect extraction, keyed by contiguous [`TempId`].
    pub temps: indexmap::IndexMap<TempId, CType>,
    pub variadic: bool,
    pub body: Stmt,
    pub loc: SourceLoc,
}

/// A whole translation unit's worth of lowered functions plus the
/// file-scope variable declarations carried through unchanged from Cabs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: indexmap::IndexMap<String, CType>,
}
