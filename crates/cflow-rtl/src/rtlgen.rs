//! RTLgen: CminorSel to RTL (spec §4.7). The structurally hardest pass —
//! a tree is flattened into a CFG by continuation-passing, backward-chained
//! translation: every routine takes the node reached *after* it runs and
//! returns the node its own code should be entered at, so the whole tree
//! is visited once with no forward-reference fixups.
//!
//! Per a fix called out in the redesign notes, the let-binding stack lives
//! on [`FnGen`], owned per function, rather than as shared mutable state.

use std::collections::HashMap;

use cflow_ir::cminor::{BinOp, Signature};
use cflow_select::cminor_sel::{CallTarget, Condition, Expr, Function as SelFunction, Program as SelProgram, Stmt, StmtKind};

use crate::error::RtlGenError;
use crate::rtl::{CondCode, FunRef, Function, Instruction, Node, Operation, Program, Reg};

pub fn gen_program(program: &SelProgram) -> (Program, Vec<RtlGenError>) {
    let mut errors = Vec::new();
    let functions = program.functions.iter().map(|f| gen_function(f, &mut errors)).collect();
    (Program { functions, globals: program.globals.clone() }, errors)
}

/// The instruction arena and node counter for one function. Kept separate
/// from [`FnGen`] so that `Node` allocation and code installation have a
/// single obvious owner.
struct CfgBuilder {
    next_node: u32,
    code: indexmap::IndexMap<Node, Instruction>,
    label_nodes: HashMap<String, Node>,
}

impl CfgBuilder {
    fn new() -> Self {
        CfgBuilder { next_node: 1, code: indexmap::IndexMap::new(), label_nodes: HashMap::new() }
    }

    fn reserve_node(&mut self) -> Node {
        let n = Node(self.next_node);
        self.next_node += 1;
        n
    }

    fn install(&mut self, node: Node, instr: Instruction) {
        self.code.insert(node, instr);
    }

    fn new_node_with(&mut self, instr: Instruction) -> Node {
        let n = self.reserve_node();
        self.install(n, instr);
        n
    }

    /// Get-or-reserve the node a named label resolves to; `Sgoto` may be
    /// lexically before `Slabel`, so the node can be referenced before it
    /// is installed with real content.
    fn label_node(&mut self, name: &str) -> Node {
        if let Some(&n) = self.label_nodes.get(name) {
            n
        } else {
            let n = self.reserve_node();
            self.label_nodes.insert(name.to_string(), n);
            n
        }
    }
}

struct RegAllocator {
    next_reg: u32,
    var_to_reg: HashMap<String, Reg>,
}

impl RegAllocator {
    fn new() -> Self {
        RegAllocator { next_reg: 1, var_to_reg: HashMap::new() }
    }

    fn fresh(&mut self) -> Reg {
        let r = Reg(self.next_reg);
        self.next_reg += 1;
        r
    }

    fn reg_of(&mut self, name: &str) -> Reg {
        if let Some(&r) = self.var_to_reg.get(name) {
            r
        } else {
            let r = self.fresh();
            self.var_to_reg.insert(name.to_string(), r);
            r
        }
    }
}

struct FnGen {
    cfg: CfgBuilder,
    regs: RegAllocator,
    /// One exit-target node per enclosing `Block`; `Exit(n)` targets
    /// `exits[len - 1 - n]`.
    exits: Vec<Node>,
    /// One register per enclosing `Let`, innermost last; `Letvar(i)` reads
    /// `lets[len - 1 - i]`.
    lets: Vec<Reg>,
}

impl FnGen {
    fn translate_expr(&mut self, e: &Expr, dest: Reg, succ: Node) -> Node {
        match e {
            Expr::ConstInt(i) => self.cfg.new_node_with(Instruction::Iop { op: Operation::ConstInt(*i), args: vec![], dest, succ }),
            Expr::ConstLong(i) => self.cfg.new_node_with(Instruction::Iop { op: Operation::ConstLong(*i), args: vec![], dest, succ }),
            Expr::ConstFloat(x) => self.cfg.new_node_with(Instruction::Iop { op: Operation::ConstFloat(*x), args: vec![], dest, succ }),
            Expr::ConstSingle(x) => self.cfg.new_node_with(Instruction::Iop { op: Operation::ConstSingle(*x), args: vec![], dest, succ }),
            Expr::Addrsymbol(sym, off) => {
                self.cfg.new_node_with(Instruction::Iop { op: Operation::Addrsymbol(sym.clone(), *off), args: vec![], dest, succ })
            }
            Expr::Addrstack(off) => self.cfg.new_node_with(Instruction::Iop { op: Operation::Addrstack(*off), args: vec![], dest, succ }),
            Expr::Var(name) => {
                let r = self.regs.reg_of(name);
                if r == dest {
                    succ
                } else {
                    self.cfg.new_node_with(Instruction::Iop { op: Operation::Move, args: vec![r], dest, succ })
                }
            }
            Expr::Unop(op, inner) => {
                let r = self.regs.fresh();
                let op_node = self.cfg.new_node_with(Instruction::Iop { op: Operation::Unop(*op), args: vec![r], dest, succ });
                self.translate_expr(inner, r, op_node)
            }
            Expr::Binop(op, l, r) => {
                let rl = self.regs.fresh();
                let rr = self.regs.fresh();
                let op_node = self.cfg.new_node_with(Instruction::Iop { op: Operation::Binop(*op), args: vec![rl, rr], dest, succ });
                self.chain_left_to_right(&[(l.as_ref(), rl), (r.as_ref(), rr)], op_node)
            }
            Expr::Addshift(base, idx, shift) => {
                let rb = self.regs.fresh();
                let ri = self.regs.fresh();
                let op_node = self.cfg.new_node_with(Instruction::Iop { op: Operation::Addshift(*shift), args: vec![rb, ri], dest, succ });
                self.chain_left_to_right(&[(base.as_ref(), rb), (idx.as_ref(), ri)], op_node)
            }
            Expr::Subshift(base, idx, shift) => {
                let rb = self.regs.fresh();
                let ri = self.regs.fresh();
                let op_node = self.cfg.new_node_with(Instruction::Iop { op: Operation::Subshift(*shift), args: vec![rb, ri], dest, succ });
                self.chain_left_to_right(&[(base.as_ref(), rb), (idx.as_ref(), ri)], op_node)
            }
            Expr::Load(chunk, mode, args) => {
                let arg_regs: Vec<Reg> = args.iter().map(|_| self.regs.fresh()).collect();
                let load_node =
                    self.cfg.new_node_with(Instruction::Iload { chunk: *chunk, addr: mode.clone(), args: arg_regs.clone(), dest, succ });
                let items: Vec<(&Expr, Reg)> = args.iter().zip(arg_regs.iter().copied()).collect();
                self.chain_left_to_right(&items, load_node)
            }
            Expr::Let(value, body) => {
                let bound = self.regs.fresh();
                self.lets.push(bound);
                let body_entry = self.translate_expr(body, dest, succ);
                self.lets.pop();
                self.translate_expr(value, bound, body_entry)
            }
            Expr::Letvar(i) => {
                let r = self.lets[self.lets.len() - 1 - (*i as usize)];
                if r == dest {
                    succ
                } else {
                    self.cfg.new_node_with(Instruction::Iop { op: Operation::Move, args: vec![r], dest, succ })
                }
            }
        }
    }

    /// `items` are in the desired left-to-right execution order; chains
    /// them backward so the returned node is the first item's entry.
    fn chain_left_to_right(&mut self, items: &[(&Expr, Reg)], succ: Node) -> Node {
        let mut entry = succ;
        for (e, r) in items.iter().rev() {
            entry = self.translate_expr(e, *r, entry);
        }
        entry
    }

    fn translate_cond(&mut self, cond: &Condition, ifso: Node, ifnot: Node) -> Node {
        match cond {
            Condition::True => self.cfg.new_node_with(Instruction::Inop { succ: ifso }),
            Condition::False => self.cfg.new_node_with(Instruction::Inop { succ: ifnot }),
            Condition::Not(c) => self.translate_cond(c, ifnot, ifso),
            Condition::And(l, r) => {
                let inner = self.translate_cond(r, ifso, ifnot);
                self.translate_cond(l, inner, ifnot)
            }
            Condition::Or(l, r) => {
                let inner = self.translate_cond(r, ifso, ifnot);
                self.translate_cond(l, ifso, inner)
            }
            Condition::Cmp(op, l, r) => {
                let rl = self.regs.fresh();
                let rr = self.regs.fresh();
                let cond_node = self.cfg.new_node_with(Instruction::Icond { cc: CondCode(*op), args: vec![rl, rr], ifso, ifnot });
                self.chain_left_to_right(&[(l.as_ref(), rl), (r.as_ref(), rr)], cond_node)
            }
        }
    }

    fn translate_call_like(&mut self, target: &CallTarget, sig: &Signature, args: &[Expr], dest: Option<Reg>, succ: Node) -> Node {
        match target {
            CallTarget::Direct(name) => {
                let arg_regs: Vec<Reg> = args.iter().map(|_| self.regs.fresh()).collect();
                let call_node = self.cfg.new_node_with(Instruction::Icall {
                    sig: sig.clone(),
                    func: FunRef::FunSymbol(name.clone()),
                    args: arg_regs.clone(),
                    dest,
                    succ,
                });
                let items: Vec<(&Expr, Reg)> = args.iter().zip(arg_regs.iter().copied()).collect();
                self.chain_left_to_right(&items, call_node)
            }
            CallTarget::Indirect(callee) => {
                let func_reg = self.regs.fresh();
                let arg_regs: Vec<Reg> = args.iter().map(|_| self.regs.fresh()).collect();
                let call_node = self.cfg.new_node_with(Instruction::Icall {
                    sig: sig.clone(),
                    func: FunRef::FunReg(func_reg),
                    args: arg_regs.clone(),
                    dest,
                    succ,
                });
                let mut items: Vec<(&Expr, Reg)> = vec![(callee, func_reg)];
                items.extend(args.iter().zip(arg_regs.iter().copied()));
                self.chain_left_to_right(&items, call_node)
            }
        }
    }

    fn translate_stmt(&mut self, s: &Stmt, succ: Node) -> Node {
        match &s.kind {
            StmtKind::Skip => succ,
            StmtKind::Assign(name, e) => {
                let dest = self.regs.reg_of(name);
                self.translate_expr(e, dest, succ)
            }
            StmtKind::Store { chunk, mode, args, value } => {
                let arg_regs: Vec<Reg> = args.iter().map(|_| self.regs.fresh()).collect();
                let src = self.regs.fresh();
                let store_node =
                    self.cfg.new_node_with(Instruction::Istore { chunk: *chunk, addr: mode.clone(), args: arg_regs.clone(), src, succ });
                let mut items: Vec<(&Expr, Reg)> = args.iter().zip(arg_regs.iter().copied()).collect();
                items.push((value, src));
                self.chain_left_to_right(&items, store_node)
            }
            StmtKind::Call { dest, target, sig, args } => {
                let dest_reg = dest.as_ref().map(|n| self.regs.reg_of(n));
                self.translate_call_like(target, sig, args, dest_reg, succ)
            }
            StmtKind::Builtin { dest, name, args } => {
                let dest_reg = dest.as_ref().map(|n| self.regs.reg_of(n));
                let arg_regs: Vec<Reg> = args.iter().map(|_| self.regs.fresh()).collect();
                let node = self.cfg.new_node_with(Instruction::Ibuiltin { name: name.clone(), args: arg_regs.clone(), dest: dest_reg, succ });
                let items: Vec<(&Expr, Reg)> = args.iter().zip(arg_regs.iter().copied()).collect();
                self.chain_left_to_right(&items, node)
            }
            StmtKind::Seq(a, b) => {
                let entry_b = self.translate_stmt(b, succ);
                self.translate_stmt(a, entry_b)
            }
            StmtKind::Ifthenelse(cond, t, e) => {
                let e_entry = self.translate_stmt(e, succ);
                let t_entry = self.translate_stmt(t, succ);
                self.translate_cond(cond, t_entry, e_entry)
            }
            StmtKind::Loop(body) => {
                let loop_head = self.cfg.reserve_node();
                let body_entry = self.translate_stmt(body, loop_head);
                self.cfg.install(loop_head, Instruction::Inop { succ: body_entry });
                loop_head
            }
            StmtKind::Block(body) => {
                self.exits.push(succ);
                let entry = self.translate_stmt(body, succ);
                self.exits.pop();
                entry
            }
            StmtKind::Exit(n) => self.exits[self.exits.len() - 1 - (*n as usize)],
            StmtKind::Switch { expr, cases, default } => self.translate_switch(expr, cases, *default),
            StmtKind::Return(e) => match e {
                Some(expr) => {
                    let r = self.regs.fresh();
                    let ret_node = self.cfg.new_node_with(Instruction::Ireturn { arg: Some(r) });
                    self.translate_expr(expr, r, ret_node)
                }
                None => self.cfg.new_node_with(Instruction::Ireturn { arg: None }),
            },
            StmtKind::Label(name, body) => {
                let label_node = self.cfg.label_node(name);
                let body_entry = self.translate_stmt(body, succ);
                self.cfg.install(label_node, Instruction::Inop { succ: body_entry });
                label_node
            }
            StmtKind::Goto(name) => self.cfg.label_node(name),
        }
    }

    /// Cases resolve through the exit-context stack exactly like `Exit`
    /// does, since CminorSel's switch lowering already expressed each arm
    /// as an exit depth out of its own nested block.
    fn translate_switch(&mut self, expr: &Expr, cases: &[(i64, u32)], default: u32) -> Node {
        let default_target = self.exits[self.exits.len() - 1 - (default as usize)];
        if cases.is_empty() {
            let r = self.regs.fresh();
            return self.translate_expr(expr, r, default_target);
        }

        let min = cases.iter().map(|(v, _)| *v).min().unwrap();
        let max = cases.iter().map(|(v, _)| *v).max().unwrap();
        let span = (max - min + 1) as u64;
        // Heuristic: a jump table pays off once the dense range isn't much
        // wider than the number of cases actually present.
        let dense = span <= (cases.len() as u64) * 2;

        let r = self.regs.fresh();
        if dense {
            let mut targets = vec![default_target; span as usize];
            for (value, depth) in cases {
                targets[(*value - min) as usize] = self.exits[self.exits.len() - 1 - (*depth as usize)];
            }
            let jt_node = self.cfg.new_node_with(Instruction::Ijumptable { arg: r, targets });
            // Ijumptable expects a zero-based dense index; fold the `min`
            // offset into a subtraction ahead of it when it isn't already 0.
            if min == 0 {
                self.translate_expr(expr, r, jt_node)
            } else {
                let raw = self.regs.fresh();
                let const_reg = self.regs.fresh();
                let sub_node =
                    self.cfg.new_node_with(Instruction::Iop { op: Operation::Binop(BinOp::Sub), args: vec![raw, const_reg], dest: r, succ: jt_node });
                let const_node =
                    self.cfg.new_node_with(Instruction::Iop { op: Operation::ConstInt(min as i32), args: vec![], dest: const_reg, succ: sub_node });
                self.translate_expr(expr, raw, const_node)
            }
        } else {
            let mut entry = default_target;
            for (value, depth) in cases.iter().rev() {
                let target = self.exits[self.exits.len() - 1 - (*depth as usize)];
                let const_reg = self.regs.fresh();
                let cond_node = self.cfg.new_node_with(Instruction::Icond { cc: CondCode::eq(), args: vec![r, const_reg], ifso: target, ifnot: entry });
                entry = self.cfg.new_node_with(Instruction::Iop {
                    op: Operation::ConstInt(*value as i32),
                    args: vec![],
                    dest: const_reg,
                    succ: cond_node,
                });
            }
            self.translate_expr(expr, r, entry)
        }
    }

}

fn gen_function(f: &SelFunction, errors: &mut Vec<RtlGenError>) -> Function {
    let mut gen = FnGen { cfg: CfgBuilder::new(), regs: RegAllocator::new(), exits: Vec::new(), lets: Vec::new() };

    for p in &f.params {
        gen.regs.reg_of(p);
    }
    let params: Vec<Reg> = f.params.iter().map(|p| gen.regs.reg_of(p)).collect();

    let fallthrough_return = gen.cfg.new_node_with(Instruction::Ireturn { arg: None });
    let entry = gen.translate_stmt(&f.body, fallthrough_return);

    let code = gen.cfg.code;
    let next_reg = gen.regs.next_reg;
    let next_node = gen.cfg.next_node;

    let name = f.name.clone();
    for (node, instr) in &code {
        for succ in instr.successors() {
            if !code.contains_key(&succ) {
                errors.push(RtlGenError::DanglingSuccessor { function: name.clone(), node: node.0, succ: succ.0 });
            }
        }
    }

    Function { name: f.name.clone(), sig: f.sig.clone(), params, stack_size: f.stack_size, entry, code, next_reg, next_node }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cflow_core::loc::SourceLoc;
    use cflow_ir::cminor::Cmp;

    fn loc() -> SourceLoc {
        SourceLoc::synthetic()
    }

    #[test]
    fn return_constant_lowers_to_two_nodes() {
        // int main() { return 42; }
        let f = SelFunction {
            name: "main".into(),
            params: vec![],
            stack_slots: Default::default(),
            stack_size: 0,
            sig: Signature { params: vec![], ret: Some(cflow_ir::cminor::Chunk::Mint32), variadic: false },
            body: Stmt::new(StmtKind::Return(Some(Expr::ConstInt(42))), loc()),
            loc: loc(),
        };
        let mut errors = Vec::new();
        let out = gen_function(&f, &mut errors);
        assert!(errors.is_empty());
        assert_eq!(out.code.len(), 2);
        let ret = out.code.values().find(|i| i.successors().is_empty()).expect("a return node");
        assert!(matches!(ret, Instruction::Ireturn { arg: Some(_) }));
    }

    #[test]
    fn every_successor_points_at_a_real_node() {
        let f = SelFunction {
            name: "add".into(),
            params: vec!["a".into(), "b".into()],
            stack_slots: Default::default(),
            stack_size: 0,
            sig: Signature {
                params: vec![cflow_ir::cminor::Chunk::Mint32, cflow_ir::cminor::Chunk::Mint32],
                ret: Some(cflow_ir::cminor::Chunk::Mint32),
                variadic: false,
            },
            body: Stmt::new(
                StmtKind::Return(Some(Expr::Binop(BinOp::Add, Box::new(Expr::Var("a".into())), Box::new(Expr::Var("b".into()))))),
                loc(),
            ),
            loc: loc(),
        };
        let mut errors = Vec::new();
        let out = gen_function(&f, &mut errors);
        assert!(errors.is_empty());
        for instr in out.code.values() {
            for succ in instr.successors() {
                assert!(out.code.contains_key(&succ), "dangling successor {succ}");
            }
        }
    }

    #[test]
    fn two_case_switch_outside_any_loop_does_not_panic() {
        // int f(int x) { switch (x) { case 1: return 10; case 2: return 20; } }
        // No enclosing loop or block, and no explicit `default` arm — the
        // case this construction used to underflow `exits` on.
        use cflow_select::cminor_sel::{seq, StmtKind as SK};

        let dispatch = Stmt::new(
            StmtKind::Switch { expr: Expr::Var("x".into()), cases: vec![(1, 0), (2, 1)], default: 2 },
            loc(),
        );
        let body_0 = Stmt::new(StmtKind::Return(Some(Expr::ConstInt(10))), loc());
        let body_1 = Stmt::new(StmtKind::Return(Some(Expr::ConstInt(20))), loc());

        let mut inner = dispatch;
        for case_body in [body_0, body_1] {
            inner = Stmt::new(SK::Block(Box::new(inner)), loc());
            inner = seq(inner, case_body);
        }
        let body = Stmt::new(SK::Block(Box::new(inner)), loc());

        let f = SelFunction {
            name: "f".into(),
            params: vec!["x".into()],
            stack_slots: Default::default(),
            stack_size: 0,
            sig: Signature { params: vec![cflow_ir::cminor::Chunk::Mint32], ret: Some(cflow_ir::cminor::Chunk::Mint32), variadic: false },
            body,
            loc: loc(),
        };
        let mut errors = Vec::new();
        let out = gen_function(&f, &mut errors);
        assert!(errors.is_empty());

        let returns: Vec<i32> = out
            .code
            .values()
            .filter_map(|i| match i {
                Instruction::Iop { op: Operation::ConstInt(v), dest, succ, .. } => match out.code.get(succ) {
                    Some(Instruction::Ireturn { arg: Some(r) }) if r == dest => Some(*v),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert!(returns.contains(&10), "missing case 1's return value: {returns:?}");
        assert!(returns.contains(&20), "missing case 2's return value: {returns:?}");
    }

    #[test]
    fn ternary_condition_lowers_to_icond() {
        // int f(int x) { return x ? 1 : 0; }
        let cond = Condition::Cmp(BinOp::Cmp(Cmp::Ne), Box::new(Expr::Var("x".into())), Box::new(Expr::ConstInt(0)));
        let body = Stmt::new(
            StmtKind::Ifthenelse(
                cond,
                Box::new(Stmt::new(StmtKind::Return(Some(Expr::ConstInt(1))), loc())),
                Box::new(Stmt::new(StmtKind::Return(Some(Expr::ConstInt(0))), loc())),
            ),
            loc(),
        );
        let f = SelFunction {
            name: "f".into(),
            params: vec!["x".into()],
            stack_slots: Default::default(),
            stack_size: 0,
            sig: Signature { params: vec![cflow_ir::cminor::Chunk::Mint32], ret: Some(cflow_ir::cminor::Chunk::Mint32), variadic: false },
            body,
            loc: loc(),
        };
        let mut errors = Vec::new();
        let out = gen_function(&f, &mut errors);
        assert!(errors.is_empty());
        assert!(out.code.values().any(|i| matches!(i, Instruction::Icond { .. })));
    }
}
