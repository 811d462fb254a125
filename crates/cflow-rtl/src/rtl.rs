//! RTL: a control-flow graph over infinitely many pseudo-registers with
//! three-address instructions and explicit addressing modes (spec §3, §4.7).
//!
//! Unlike the four tree IRs upstream, RTL is a labeled directed graph: an
//! arena of instructions (`code`) keyed by `Node`, a newtype over a dense
//! positive integer. Successors are plain `Node` values rather than owned
//! pointers, so the graph can have arbitrary back-edges (loops) without
//! reference cycles.

use serde::{Deserialize, Serialize};

use cflow_ir::cminor::{BinOp, Chunk, Cmp, Signature, UnOp};
use cflow_select::cminor_sel::Addressing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node(pub u32);

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(pub u32);

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The value-producing operations an `Iop` instruction may perform. Mostly
/// a direct carry-over of Cminor's/CminorSel's own operator enums — RTLgen
/// does not invent new arithmetic, only a register-level `Move` and the
/// constant-materialization op that Cminor left as bare `Expr` leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Move,
    ConstInt(i32),
    ConstLong(i64),
    ConstFloat(f64),
    ConstSingle(f32),
    Addrsymbol(String, i64),
    Addrstack(i64),
    Unop(UnOp),
    Binop(BinOp),
    Addshift(u8),
    Subshift(u8),
}

/// The comparison an `Icond` tests; always one of `BinOp`'s `Cmp*`
/// variants, carried as-is so the signed/unsigned/long/float/single
/// distinction survives into the branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CondCode(pub BinOp);

impl CondCode {
    pub fn eq() -> Self {
        CondCode(BinOp::Cmp(Cmp::Eq))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunRef {
    FunSymbol(String),
    FunReg(Reg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Inop { succ: Node },
    Iop { op: Operation, args: Vec<Reg>, dest: Reg, succ: Node },
    Iload { chunk: Chunk, addr: Addressing, args: Vec<Reg>, dest: Reg, succ: Node },
    Istore { chunk: Chunk, addr: Addressing, args: Vec<Reg>, src: Reg, succ: Node },
    Icall { sig: Signature, func: FunRef, args: Vec<Reg>, dest: Option<Reg>, succ: Node },
    /// Not produced by this pipeline (no source construct asks for a tail
    /// call); kept so the instruction set matches the target RTL's full
    /// vocabulary for any downstream consumer that wants to introduce one.
    Itailcall { sig: Signature, func: FunRef, args: Vec<Reg> },
    Ibuiltin { name: String, args: Vec<Reg>, dest: Option<Reg>, succ: Node },
    Icond { cc: CondCode, args: Vec<Reg>, ifso: Node, ifnot: Node },
    Ijumptable { arg: Reg, targets: Vec<Node> },
    Ireturn { arg: Option<Reg> },
}

impl Instruction {
    /// All nodes this instruction may transfer control to.
    pub fn successors(&self) -> Vec<Node> {
        match self {
            Instruction::Inop { succ }
            | Instruction::Iop { succ, .. }
            | Instruction::Iload { succ, .. }
            | Instruction::Istore { succ, .. }
            | Instruction::Icall { succ, .. }
            | Instruction::Ibuiltin { succ, .. } => vec![*succ],
            Instruction::Icond { ifso, ifnot, .. } => vec![*ifso, *ifnot],
            Instruction::Ijumptable { targets, .. } => targets.clone(),
            Instruction::Itailcall { .. } | Instruction::Ireturn { .. } => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub params: Vec<Reg>,
    pub stack_size: u64,
    pub entry: Node,
    pub code: indexmap::IndexMap<Node, Instruction>,
    pub next_reg: u32,
    pub next_node: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: indexmap::IndexMap<String, u64>,
}
