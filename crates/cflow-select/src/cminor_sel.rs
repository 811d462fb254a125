//! CminorSel: Cminor refined with target-specific addressing modes,
//! structured branch conditions, de Bruijn let-expressions, and fused
//! shift-add/sub operators (spec §4.6). Operators themselves are carried
//! over from [`cflow_ir::cminor`] unchanged — selection is mostly a 1:1
//! mapping of op enums, so there is no separate op vocabulary here.

use serde::{Deserialize, Serialize};

use cflow_core::loc::SourceLoc;
use cflow_ir::cminor::{BinOp, Chunk, Cmp, Signature, UnOp};

/// How an effective address is computed, tried in order of specificity
/// during selection (`Aglobal` > `Ainstack` > `Aindexed2shift` >
/// `Aindexed2ext` > `Aindexed2` > `Aindexed` > fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Addressing {
    /// `base + off`, or `base - off` folded into a negative offset.
    Aindexed(i64),
    /// `base + index`, neither operand constant.
    Aindexed2,
    /// `base + (index << shift)`, ARM64 scaled register addressing.
    Aindexed2shift(u8),
    /// `base + (sign/zero-extend(index32) << shift)`.
    Aindexed2ext { signed: bool, shift: u8 },
    /// Address of a global symbol plus a folded constant offset.
    Aglobal(String, i64),
    /// Address of a stack slot plus a folded constant offset.
    Ainstack(i64),
}

/// A structured branch condition, distinct from a value-producing
/// comparison (`Binop(Cmp(..), ..)` still exists as an `Expr` for the
/// rare case a source expression demands a materialized 0/1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    True,
    False,
    /// `op` is always one of `BinOp`'s `Cmp*` variants; it selects the
    /// signed/unsigned/long/float/single comparison kind.
    Cmp(BinOp, Box<Expr>, Box<Expr>),
    Not(Box<Condition>),
    /// Short-circuiting: `r` is not evaluated unless `l` holds.
    And(Box<Condition>, Box<Condition>),
    /// Short-circuiting: `r` is not evaluated unless `l` fails.
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    ConstInt(i32),
    ConstLong(i64),
    ConstFloat(f64),
    ConstSingle(f32),
    Var(String),
    Unop(UnOp, Box<Expr>),
    Binop(BinOp, Box<Expr>, Box<Expr>),
    /// `args` feeds the addressing mode's base/index registers, in the
    /// order the mode expects them (empty for `Aglobal`/`Ainstack`).
    Load(Chunk, Addressing, Vec<Expr>),
    Addrsymbol(String, i64),
    Addrstack(i64),
    /// `base + (index << shift)` recognized outside of an address
    /// context, e.g. plain pointer arithmetic kept as a value.
    Addshift(Box<Expr>, Box<Expr>, u8),
    Subshift(Box<Expr>, Box<Expr>, u8),
    /// Binds `value` to de Bruijn index 0 inside `body`, shifting any
    /// existing bindings `body` sees down by one level.
    Let(Box<Expr>, Box<Expr>),
    /// References the `index`-th enclosing `Let`, counting from the
    /// innermost (index 0).
    Letvar(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    Direct(String),
    Indirect(Expr),
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Skip,
    Assign(String, Expr),
    Store { chunk: Chunk, mode: Addressing, args: Vec<Expr>, value: Expr },
    Call { dest: Option<String>, target: CallTarget, sig: Signature, args: Vec<Expr> },
    Builtin { dest: Option<String>, name: String, args: Vec<Expr> },
    Seq(Box<Stmt>, Box<Stmt>),
    Ifthenelse(Condition, Box<Stmt>, Box<Stmt>),
    Loop(Box<Stmt>),
    Block(Box<Stmt>),
    Exit(u32),
    Switch { expr: Expr, cases: Vec<(i64, u32)>, default: u32 },
    Return(Option<Expr>),
    Label(String, Box<Stmt>),
    Goto(String),
}

pub fn seq(a: Stmt, b: Stmt) -> Stmt {
    match (&a.kind, &b.kind) {
        (StmtKind::Skip, _) => b,
        (_, StmtKind::Skip) => a,
        _ => {
            let loc = a.loc.clone();
            Stmt::new(StmtKind::Seq(Box::new(a), Box::new(b)), loc)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSlot {
    pub offset: i64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub stack_slots: indexmap::IndexMap<String, StackSlot>,
    pub stack_size: u64,
    pub sig: Signature,
    pub body: Stmt,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: indexmap::IndexMap<String, u64>,
}
