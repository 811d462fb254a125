//! Cminor: an untyped, three-address IR with explicit memory chunks and
//! type-erased operators (spec §4.5). Produced by `cminor_gen` from Clight
//! after SimplLocals has settled which locals stay addressable; consumed by
//! `cflow-select`'s instruction selection.
//!
//! Loops, `break`, and `continue` no longer exist as such here: `while`/`for`
//! become `Sblock(Sloop(...))` with `Sexit(n)` jumping out of the `n`-th
//! enclosing block, the same De Bruijn-style encoding CompCert's own Cminor
//! uses so that arbitrary nested exits need no explicit label allocation.

use serde::{Deserialize, Serialize};

use cflow_core::loc::SourceLoc;

/// A memory access width plus interpretation, carried explicitly on every
/// load/store now that Clight's `CType`s have been erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chunk {
    Mint8s,
    Mint8u,
    Mint16s,
    Mint16u,
    Mint32,
    Mint64,
    Mfloat32,
    Mfloat64,
    /// Pointer-sized access to a location whose contents may itself be a
    /// pointer (`Many64` for this target's 64-bit pointers).
    Many32,
    Many64,
}

impl Chunk {
    pub fn size(self) -> u64 {
        match self {
            Chunk::Mint8s | Chunk::Mint8u => 1,
            Chunk::Mint16s | Chunk::Mint16u => 2,
            Chunk::Mint32 | Chunk::Mfloat32 | Chunk::Many32 => 4,
            Chunk::Mint64 | Chunk::Mfloat64 | Chunk::Many64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Unary operators, each tagged with the operand width/kind it expects
/// since Cminor no longer carries a `CType` to infer this from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Negint,
    Negl,
    Notint,
    Notl,
    Negf,
    Negfs,
    Absf,
    Intoflong,
    Longofint,
    Longofintu,
    Floatofint,
    Floatofintu,
    Intoffloat,
    Intuoffloat,
    Singleoffloat,
    Floatofsingle,
    Cast8signed,
    Cast8unsigned,
    Cast16signed,
    Cast16unsigned,
}

/// Binary operators. The `l` suffix marks the 64-bit-integer sibling of an
/// operator and `f`/`fs` mark double/single-float siblings, mirroring
/// CompCert Cminor's own naming (`Oadd`/`Oaddl`/`Oaddf`) rather than
/// carrying a separate width tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Addl,
    Addf,
    Addfs,
    Sub,
    Subl,
    Subf,
    Subfs,
    Mul,
    Mull,
    Mulf,
    Mulfs,
    Div,
    Divl,
    Divu,
    Divlu,
    Divf,
    Divfs,
    Mod,
    Modl,
    Modu,
    Modlu,
    And,
    Andl,
    Or,
    Orl,
    Xor,
    Xorl,
    Shl,
    Shll,
    Shr,
    Shrl,
    Shru,
    Shrlu,
    Cmp(Cmp),
    Cmpu(Cmp),
    Cmpl(Cmp),
    Cmplu(Cmp),
    Cmpf(Cmp),
    Cmpfs(Cmp),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    ConstInt(i32),
    ConstLong(i64),
    ConstFloat(f64),
    ConstSingle(f32),
    /// A pseudo-register, identified by name until RTLgen assigns real
    /// register numbers.
    Var(String),
    Unop(UnOp, Box<Expr>),
    Binop(BinOp, Box<Expr>, Box<Expr>),
    Load(Chunk, Box<Expr>),
    /// Address of a global symbol plus a constant byte offset (struct-field
    /// access into a global folds its offset in here rather than emitting a
    /// separate add).
    Addrsymbol(String, i64),
    /// Address of a stack-allocated local plus a constant byte offset.
    Addrstack(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    Direct(String),
    Indirect(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Chunk>,
    pub ret: Option<Chunk>,
    pub variadic: bool,
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
    Assign(String, Expr),
    Store(Chunk, Expr, Expr),
    Call { dest: Option<String>, target: CallTarget, sig: Signature, args: Vec<Expr> },
    Builtin { dest: Option<String>, name: String, args: Vec<Expr> },
    Seq(Box<Stmt>, Box<Stmt>),
    Ifthenelse(Expr, Box<Stmt>, Box<Stmt>),
    /// An infinite loop; the only way out is an `Exit` inside `body` that
    /// targets an enclosing `Block`.
    Loop(Box<Stmt>),
    /// Establishes one exit target: `Exit(0)` inside `body` (not nested in
    /// another `Block`) falls through to whatever follows this `Block`.
    /// `Exit(n)` with `n > 0` falls through `n` enclosing `Block`s instead.
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

pub fn seq_all(stmts: Vec<Stmt>, tail_loc: SourceLoc) -> Stmt {
    stmts
        .into_iter()
        .fold(Stmt::skip(tail_loc), |acc, s| if matches!(acc.kind, StmtKind::Skip) { s } else { seq(acc, s) })
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
    /// Stack-resident locals (SimplLocals-rejected scalars, plus every
    /// aggregate), keyed by the same name Clight used, with their assigned
    /// frame offset and size.
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
