//! Stable textual forms for Cminor and RTL, used for debugging dumps
//! (`--dump-ir`) and `insta` snapshot testing (spec §6). The Cminor printer
//! follows CompCert's own layout: `var "name"[size];` for globals, then
//! `"name"(p1: t1, ..): ret { stack N; var v; ...; body }` per function,
//! with operators printed by name (`add`, `addl`, `addf`, ...).

use std::fmt::Write as _;

use cflow_ir::cminor::{self, BinOp, Chunk, Cmp, UnOp};

use crate::rtl::{self, FunRef, Instruction, Operation};

pub fn print_cminor_program(program: &cminor::Program) -> String {
    let mut out = String::new();
    for (name, size) in &program.globals {
        let _ = writeln!(out, "var \"{name}\"[{size}];");
    }
    if !program.globals.is_empty() {
        out.push('\n');
    }
    for f in &program.functions {
        print_cminor_function(&mut out, f);
        out.push('\n');
    }
    out
}

fn print_cminor_function(out: &mut String, f: &cminor::Function) {
    let params: Vec<String> = f.params.iter().zip(&f.sig.params).map(|(name, chunk)| format!("{name}: {}", chunk_name(*chunk))).collect();
    let ret = f.sig.ret.map(chunk_name).unwrap_or("void");
    let _ = writeln!(out, "\"{}\"({}): {ret} {{", f.name, params.join(", "));
    let _ = writeln!(out, "  stack {};", f.stack_size);
    for name in f.stack_slots.keys() {
        let _ = writeln!(out, "  var \"{name}\";");
    }
    print_cminor_stmt(out, &f.body, 1);
    out.push_str("}\n");
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn print_cminor_stmt(out: &mut String, s: &cminor::Stmt, level: usize) {
    use cminor::StmtKind::*;
    match &s.kind {
        Skip => {}
        Assign(name, e) => {
            indent(out, level);
            let _ = writeln!(out, "\"{name}\" = {};", print_cminor_expr(e));
        }
        Store(chunk, addr, value) => {
            indent(out, level);
            let _ = writeln!(out, "{}[{}] = {};", chunk_name(*chunk), print_cminor_expr(addr), print_cminor_expr(value));
        }
        Call { dest, target, args, .. } => {
            indent(out, level);
            let callee = match target {
                cminor::CallTarget::Direct(name) => format!("\"{name}\""),
                cminor::CallTarget::Indirect(e) => print_cminor_expr(e),
            };
            let args = args.iter().map(print_cminor_expr).collect::<Vec<_>>().join(", ");
            match dest {
                Some(d) => {
                    let _ = writeln!(out, "\"{d}\" = {callee}({args});");
                }
                None => {
                    let _ = writeln!(out, "{callee}({args});");
                }
            }
        }
        Builtin { dest, name, args } => {
            indent(out, level);
            let args = args.iter().map(print_cminor_expr).collect::<Vec<_>>().join(", ");
            match dest {
                Some(d) => {
                    let _ = writeln!(out, "\"{d}\" = builtin \"{name}\"({args});");
                }
                None => {
                    let _ = writeln!(out, "builtin \"{name}\"({args});");
                }
            }
        }
        Seq(a, b) => {
            print_cminor_stmt(out, a, level);
            print_cminor_stmt(out, b, level);
        }
        Ifthenelse(cond, t, e) => {
            indent(out, level);
            let _ = writeln!(out, "if ({}) {{", print_cminor_expr(cond));
            print_cminor_stmt(out, t, level + 1);
            indent(out, level);
            out.push_str("} else {\n");
            print_cminor_stmt(out, e, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Loop(body) => {
            indent(out, level);
            out.push_str("loop {\n");
            print_cminor_stmt(out, body, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Block(body) => {
            indent(out, level);
            out.push_str("block {\n");
            print_cminor_stmt(out, body, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Exit(n) => {
            indent(out, level);
            let _ = writeln!(out, "exit {n};");
        }
        Switch { expr, cases, default } => {
            indent(out, level);
            let _ = writeln!(out, "switch ({}) {{", print_cminor_expr(expr));
            for (value, exit) in cases {
                indent(out, level + 1);
                let _ = writeln!(out, "case {value}: exit {exit};");
            }
            indent(out, level + 1);
            let _ = writeln!(out, "default: exit {default};");
            indent(out, level);
            out.push_str("}\n");
        }
        Return(e) => {
            indent(out, level);
            match e {
                Some(e) => {
                    let _ = writeln!(out, "return {};", print_cminor_expr(e));
                }
                None => out.push_str("return;\n"),
            }
        }
        Label(name, body) => {
            let _ = writeln!(out, "{name}:");
            print_cminor_stmt(out, body, level);
        }
        Goto(name) => {
            indent(out, level);
            let _ = writeln!(out, "goto {name};");
        }
    }
}

fn print_cminor_expr(e: &cminor::Expr) -> String {
    use cminor::Expr::*;
    match e {
        ConstInt(i) => format!("{i}"),
        ConstLong(i) => format!("{i}L"),
        ConstFloat(f) => format!("{f}f64"),
        ConstSingle(f) => format!("{f}f32"),
        Var(name) => format!("\"{name}\""),
        Unop(op, inner) => format!("{}({})", unop_name(*op), print_cminor_expr(inner)),
        Binop(op, l, r) => format!("{}({}, {})", binop_name(*op), print_cminor_expr(l), print_cminor_expr(r)),
        Load(chunk, addr) => format!("{}[{}]", chunk_name(*chunk), print_cminor_expr(addr)),
        Addrsymbol(sym, off) => {
            if *off == 0 {
                format!("&\"{sym}\"")
            } else {
                format!("&\"{sym}\" + {off}")
            }
        }
        Addrstack(off) => format!("stack+{off}"),
    }
}

pub fn chunk_name(c: Chunk) -> &'static str {
    match c {
        Chunk::Mint8s => "int8s",
        Chunk::Mint8u => "int8u",
        Chunk::Mint16s => "int16s",
        Chunk::Mint16u => "int16u",
        Chunk::Mint32 => "int32",
        Chunk::Mint64 => "int64",
        Chunk::Mfloat32 => "float32",
        Chunk::Mfloat64 => "float64",
        Chunk::Many32 => "any32",
        Chunk::Many64 => "any64",
    }
}

fn cmp_name(c: Cmp) -> &'static str {
    match c {
        Cmp::Eq => "eq",
        Cmp::Ne => "ne",
        Cmp::Lt => "lt",
        Cmp::Le => "le",
        Cmp::Gt => "gt",
        Cmp::Ge => "ge",
    }
}

pub fn unop_name(op: UnOp) -> &'static str {
    match op {
        UnOp::Negint => "negint",
        UnOp::Negl => "negl",
        UnOp::Notint => "notint",
        UnOp::Notl => "notl",
        UnOp::Negf => "negf",
        UnOp::Negfs => "negfs",
        UnOp::Absf => "absf",
        UnOp::Intoflong => "intoflong",
        UnOp::Longofint => "longofint",
        UnOp::Longofintu => "longofintu",
        UnOp::Floatofint => "floatofint",
        UnOp::Floatofintu => "floatofintu",
        UnOp::Intoffloat => "intoffloat",
        UnOp::Intuoffloat => "intuoffloat",
        UnOp::Singleoffloat => "singleoffloat",
        UnOp::Floatofsingle => "floatofsingle",
        UnOp::Cast8signed => "cast8signed",
        UnOp::Cast8unsigned => "cast8unsigned",
        UnOp::Cast16signed => "cast16signed",
        UnOp::Cast16unsigned => "cast16unsigned",
    }
}

pub fn binop_name(op: BinOp) -> String {
    match op {
        BinOp::Add => "add".into(),
        BinOp::Addl => "addl".into(),
        BinOp::Addf => "addf".into(),
        BinOp::Addfs => "addfs".into(),
        BinOp::Sub => "sub".into(),
        BinOp::Subl => "subl".into(),
        BinOp::Subf => "subf".into(),
        BinOp::Subfs => "subfs".into(),
        BinOp::Mul => "mul".into(),
        BinOp::Mull => "mull".into(),
        BinOp::Mulf => "mulf".into(),
        BinOp::Mulfs => "mulfs".into(),
        BinOp::Div => "div".into(),
        BinOp::Divl => "divl".into(),
        BinOp::Divu => "divu".into(),
        BinOp::Divlu => "divlu".into(),
        BinOp::Divf => "divf".into(),
        BinOp::Divfs => "divfs".into(),
        BinOp::Mod => "mod".into(),
        BinOp::Modl => "modl".into(),
        BinOp::Modu => "modu".into(),
        BinOp::Modlu => "modlu".into(),
        BinOp::And => "and".into(),
        BinOp::Andl => "andl".into(),
        BinOp::Or => "or".into(),
        BinOp::Orl => "orl".into(),
        BinOp::Xor => "xor".into(),
        BinOp::Xorl => "xorl".into(),
        BinOp::Shl => "shl".into(),
        BinOp::Shll => "shll".into(),
        BinOp::Shr => "shr".into(),
        BinOp::Shrl => "shrl".into(),
        BinOp::Shru => "shru".into(),
        BinOp::Shrlu => "shrlu".into(),
        BinOp::Cmp(c) => format!("cmp{}", cmp_name(c)),
        BinOp::Cmpu(c) => format!("cmpu{}", cmp_name(c)),
        BinOp::Cmpl(c) => format!("cmpl{}", cmp_name(c)),
        BinOp::Cmplu(c) => format!("cmplu{}", cmp_name(c)),
        BinOp::Cmpf(c) => format!("cmpf{}", cmp_name(c)),
        BinOp::Cmpfs(c) => format!("cmpfs{}", cmp_name(c)),
    }
}

/// A flat per-node listing: less polished than the Cminor printer but
/// enough to eyeball a CFG shape in a debug dump or snapshot test.
pub fn print_rtl_program(program: &rtl::Program) -> String {
    let mut out = String::new();
    for f in &program.functions {
        let _ = writeln!(out, "\"{}\" entry={} {{", f.name, f.entry);
        let mut nodes: Vec<_> = f.code.keys().copied().collect();
        nodes.sort();
        for node in nodes {
            let instr = &f.code[&node];
            let _ = writeln!(out, "  {node}: {}", print_instruction(instr));
        }
        out.push_str("}\n");
    }
    out
}

fn print_instruction(instr: &Instruction) -> String {
    match instr {
        Instruction::Inop { succ } => format!("nop goto {succ}"),
        Instruction::Iop { op, args, dest, succ } => format!("{dest} = {}({}) goto {succ}", operation_name(op), join_regs(args)),
        Instruction::Iload { chunk, addr, args, dest, succ } => {
            format!("{dest} = load {} {:?}({}) goto {succ}", chunk_name(*chunk), addr, join_regs(args))
        }
        Instruction::Istore { chunk, addr, args, src, succ } => {
            format!("store {} {:?}({}) = {src} goto {succ}", chunk_name(*chunk), addr, join_regs(args))
        }
        Instruction::Icall { func, args, dest, succ, .. } => {
            let target = match func {
                FunRef::FunSymbol(name) => format!("\"{name}\""),
                FunRef::FunReg(r) => format!("{r}"),
            };
            match dest {
                Some(d) => format!("{d} = call {target}({}) goto {succ}", join_regs(args)),
                None => format!("call {target}({}) goto {succ}", join_regs(args)),
            }
        }
        Instruction::Itailcall { func, args, .. } => {
            let target = match func {
                FunRef::FunSymbol(name) => format!("\"{name}\""),
                FunRef::FunReg(r) => format!("{r}"),
            };
            format!("tailcall {target}({})", join_regs(args))
        }
        Instruction::Ibuiltin { name, args, dest, succ } => match dest {
            Some(d) => format!("{d} = builtin \"{name}\"({}) goto {succ}", join_regs(args)),
            None => format!("builtin \"{name}\"({}) goto {succ}", join_regs(args)),
        },
        Instruction::Icond { cc, args, ifso, ifnot } => {
            format!("if {}({}) goto {ifso} else goto {ifnot}", binop_name(cc.0), join_regs(args))
        }
        Instruction::Ijumptable { arg, targets } => {
            let targets = targets.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ");
            format!("jumptable {arg} [{targets}]")
        }
        Instruction::Ireturn { arg } => match arg {
            Some(r) => format!("return {r}"),
            None => "return".to_string(),
        },
    }
}

fn operation_name(op: &Operation) -> String {
    match op {
        Operation::Move => "move".to_string(),
        Operation::ConstInt(i) => format!("const {i}"),
        Operation::ConstLong(i) => format!("const {i}L"),
        Operation::ConstFloat(f) => format!("const {f}f64"),
        Operation::ConstSingle(f) => format!("const {f}f32"),
        Operation::Addrsymbol(sym, off) => format!("addrsymbol \"{sym}\"+{off}"),
        Operation::Addrstack(off) => format!("addrstack {off}"),
        Operation::Unop(op) => unop_name(*op).to_string(),
        Operation::Binop(op) => binop_name(*op),
        Operation::Addshift(k) => format!("addshift {k}"),
        Operation::Subshift(k) => format!("subshift {k}"),
    }
}

fn join_regs(regs: &[rtl::Reg]) -> String {
    regs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cflow_core::loc::SourceLoc;

    fn loc() -> SourceLoc {
        SourceLoc::synthetic()
    }

    #[test]
    fn prints_a_trivial_function_with_one_global() {
        let mut globals = indexmap::IndexMap::new();
        globals.insert("counter".to_string(), 4u64);
        let f = cminor::Function {
            name: "main".into(),
            params: vec![],
            stack_slots: Default::default(),
            stack_size: 0,
            sig: cminor::Signature { params: vec![], ret: Some(Chunk::Mint32), variadic: false },
            body: cminor::Stmt::new(cminor::StmtKind::Return(Some(cminor::Expr::ConstInt(42))), loc()),
            loc: loc(),
        };
        let program = cminor::Program { functions: vec![f], globals };
        let text = print_cminor_program(&program);
        assert!(text.contains("var \"counter\"[4];"));
        assert!(text.contains("\"main\"(): int32 {"));
        assert!(text.contains("return 42;"));
    }
}
