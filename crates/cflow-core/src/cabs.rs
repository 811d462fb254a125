//! `Cabs`: the surface abstract syntax tree produced by the parser.
//!
//! Cabs is deliberately thin. Declaration types are kept as reconstructed
//! strings (`"int"`, `"char *"`, `"int (*)(int, int)"`) rather than a typed
//! tree — resolving them into [`CType`](crate::types::CType) is SimplExpr's
//! job, not the parser's. Every node carries a [`SourceLoc`] so diagnostics
//! raised anywhere downstream can still point at the original text.

use serde::{Deserialize, Serialize};

use crate::loc::SourceLoc;

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    /// `i64` payload plus an `unsigned` flag carried separately since C's
    /// integer-suffix rules (`u`, `ul`, `ull`, ...) affect promotion but not
    /// the bit pattern.
    UInt(u64),
    Float(f64),
    Char(i8),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Neg,
    LogNot,
    BitNot,
    Deref,
    AddrOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
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
    LogAnd,
    LogOr,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    XorAssign,
    OrAssign,
    Comma,
}

impl BinaryOp {
    /// `true` for the fourteen C compound-assignment and plain-assignment
    /// operators; SimplExpr desugars these into an `Sassign` plus a pure
    /// read (spec §4.3).
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
                | BinaryOp::ModAssign
                | BinaryOp::ShlAssign
                | BinaryOp::ShrAssign
                | BinaryOp::AndAssign
                | BinaryOp::XorAssign
                | BinaryOp::OrAssign
        )
    }

    /// The underlying arithmetic/bitwise operator for a compound assignment,
    /// e.g. `+=` carries `Add`. Panics on non-compound operators; callers
    /// must check [`is_assignment`](BinaryOp::is_assignment) with
    /// `self != BinaryOp::Assign` first.
    pub fn underlying_op(self) -> BinaryOp {
        match self {
            BinaryOp::AddAssign => BinaryOp::Add,
            BinaryOp::SubAssign => BinaryOp::Sub,
            BinaryOp::MulAssign => BinaryOp::Mul,
            BinaryOp::DivAssign => BinaryOp::Div,
            BinaryOp::ModAssign => BinaryOp::Mod,
            BinaryOp::ShlAssign => BinaryOp::Shl,
            BinaryOp::ShrAssign => BinaryOp::Shr,
            BinaryOp::AndAssign => BinaryOp::BitAnd,
            BinaryOp::XorAssign => BinaryOp::BitXor,
            BinaryOp::OrAssign => BinaryOp::BitOr,
            other => panic!("{other:?} is not a compound assignment operator"),
        }
    }
}

/// A single node of the expression tree, paired with its source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExprKind,
    pub loc: SourceLoc,
}

impl Expression {
    pub fn new(kind: ExprKind, loc: SourceLoc) -> Self {
        Expression { kind, loc }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Constant(Constant),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Paren(Box<Expression>),
    Conditional {
        cond: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    Member {
        base: Box<Expression>,
        field: String,
        is_arrow: bool,
    },
    SizeofExpr(Box<Expression>),
    /// `sizeof(type-name)`; the type string is resolved the same way a cast
    /// target is.
    SizeofType(String),
    Cast {
        to_type: String,
        expr: Box<Expression>,
    },
}

/// A declared parameter in a function prototype or definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub ty: String,
    /// Absent in a prototype-only declaration (`int f(int, char*);`).
    pub name: Option<String>,
    pub loc: SourceLoc,
}

/// A local variable declaration, shared by `DeclStmt` and C99 `for`-loop
/// declaring-inits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub ty: String,
    pub name: String,
    pub init: Option<Expression>,
    pub loc: SourceLoc,
}

/// The initializer clause of a `for` loop: a plain expression, a C99
/// declaring-init, or nothing (`for (;;)`). Mutually exclusive by
/// construction, fixing the invariant that the pre-expansion grammar leaves
/// implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForInit {
    None,
    Expr(Expression),
    Decl(Decl),
}

/// One `case`/`default` arm of a `switch`. `expr == None` marks the
/// `default` arm; at most one per switch is a parser-enforced invariant, not
/// one representable in this type alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub expr: Option<Expression>,
    pub stmts: Vec<Statement>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StmtKind,
    pub loc: SourceLoc,
}

impl Statement {
    pub fn new(kind: StmtKind, loc: SourceLoc) -> Self {
        Statement { kind, loc }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Return(Option<Expression>),
    Computation(Expression),
    If {
        cond: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        cond: Expression,
        body: Box<Statement>,
    },
    DoWhile {
        body: Box<Statement>,
        cond: Expression,
    },
    For {
        init: ForInit,
        cond: Option<Expression>,
        step: Option<Expression>,
        body: Box<Statement>,
    },
    Break,
    Continue,
    Switch {
        expr: Expression,
        cases: Vec<SwitchCase>,
    },
    Goto(String),
    Label {
        name: String,
        stmt: Box<Statement>,
    },
    Block(Vec<Statement>),
    DeclStmt(Decl),
}

/// A function definition, or a bodyless prototype if `body` is `None`.
/// Prototype-only `FunDef`s are declarations, not lowered past Cabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunDef {
    pub return_type: String,
    pub name: String,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub body: Option<Vec<Statement>>,
    pub loc: SourceLoc,
}

impl FunDef {
    pub fn is_definition(&self) -> bool {
        self.body.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDef {
    pub ty: String,
    pub name: String,
    pub init: Option<Expression>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedefDef {
    pub ty: String,
    pub name: String,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Param>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub fields: Vec<Param>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    /// Enumerator name and an optional explicit value expression
    /// (unspecified enumerators are numbered sequentially from the previous
    /// one, starting at 0).
    pub variants: Vec<(String, Option<Expression>)>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExternalDecl {
    FunDef(FunDef),
    VarDef(VarDef),
    TypedefDef(TypedefDef),
    StructDef(StructDef),
    UnionDef(UnionDef),
    EnumDef(EnumDef),
}

/// The root of a parsed translation unit: a flat sequence of top-level
/// declarations in source order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub decls: Vec<ExternalDecl>,
}

impl TranslationUnit {
    pub fn new() -> Self {
        TranslationUnit::default()
    }

    pub fn function_defs(&self) -> impl Iterator<Item = &FunDef> {
        self.decls.iter().filter_map(|d| match d {
            ExternalDecl::FunDef(f) if f.is_definition() => Some(f),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLoc {
        SourceLoc::new("t.c", 1, 1)
    }

    #[test]
    fn compound_assign_recovers_underlying_op() {
        assert_eq!(BinaryOp::AddAssign.underlying_op(), BinaryOp::Add);
        assert_eq!(BinaryOp::ShrAssign.underlying_op(), BinaryOp::Shr);
        assert!(BinaryOp::AddAssign.is_assignment());
        assert!(!BinaryOp::Add.is_assignment());
    }

    #[test]
    fn bodyless_fundef_is_not_a_definition() {
        let proto = FunDef {
            return_type: "int".into(),
            name: "f".into(),
            params: vec![],
            variadic: false,
            body: None,
            loc: loc(),
        };
        assert!(!proto.is_definition());
    }

    #[test]
    fn for_init_variants_are_mutually_exclusive_by_construction() {
        let plain = ForInit::Expr(Expression::new(ExprKind::Constant(Constant::Int(0)), loc()));
        let declaring = ForInit::Decl(Decl {
            ty: "int".into(),
            name: "i".into(),
            init: Some(Expression::new(ExprKind::Constant(Constant::Int(0)), loc())),
            loc: loc(),
        });
        assert_ne!(plain, declaring);
    }

    #[test]
    fn switch_case_none_expr_marks_default() {
        let default_arm = SwitchCase {
            expr: None,
            stmts: vec![],
            loc: loc(),
        };
        assert!(default_arm.expr.is_none());
    }

    #[test]
    fn translation_unit_filters_prototypes_out_of_function_defs() {
        let mut tu = TranslationUnit::new();
        tu.decls.push(ExternalDecl::FunDef(FunDef {
            return_type: "void".into(),
            name: "proto".into(),
            params: vec![],
            variadic: false,
            body: None,
            loc: loc(),
        }));
        tu.decls.push(ExternalDecl::FunDef(FunDef {
            return_type: "void".into(),
            name: "real".into(),
            params: vec![],
            variadic: false,
            body: Some(vec![]),
            loc: loc(),
        }));
        let names: Vec<_> = tu.function_defs().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["real"]);
    }
}
