//! Call-graph analysis over a lowered Cminor program, used to distinguish
//! functions defined in this translation unit from external ones referenced
//! only through a direct symbol call (spec §4.6). `cminor_gen` has already
//! decided direct-vs-indirect for the IR itself; this module exists so that
//! later stages (and diagnostics) can ask "is this symbol ever defined
//! here?" without re-walking every function body.

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};

use cflow_ir::cminor::{CallTarget, Expr, Program, Stmt, StmtKind};

pub struct CallGraph {
    graph: DiGraph<String, ()>,
    nodes: IndexMap<String, NodeIndex>,
    defined: IndexMap<String, ()>,
}

impl CallGraph {
    pub fn build(program: &Program) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: IndexMap<String, NodeIndex> = IndexMap::new();
        let mut defined: IndexMap<String, ()> = IndexMap::new();

        let mut node_of = |name: &str, graph: &mut DiGraph<String, ()>, nodes: &mut IndexMap<String, NodeIndex>| -> NodeIndex {
            if let Some(&idx) = nodes.get(name) {
                idx
            } else {
                let idx = graph.add_node(name.to_string());
                nodes.insert(name.to_string(), idx);
                idx
            }
        };

        for f in &program.functions {
            defined.insert(f.name.clone(), ());
            node_of(&f.name, &mut graph, &mut nodes);
        }

        for f in &program.functions {
            let caller = node_of(&f.name, &mut graph, &mut nodes);
            let mut callees = Vec::new();
            collect_calls_stmt(&f.body, &mut callees);
            for callee_name in callees {
                let callee = node_of(&callee_name, &mut graph, &mut nodes);
                graph.update_edge(caller, callee, ());
            }
        }

        CallGraph { graph, nodes, defined }
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.nodes.contains_key(name) && !self.defined.contains_key(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains_key(name)
    }

    pub fn external_callees(&self) -> Vec<&str> {
        self.nodes.keys().filter(|n| self.is_external(n)).map(String::as_str).collect()
    }

    pub fn callees_of(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.nodes.get(name) else { return Vec::new() };
        self.graph.neighbors(idx).map(|n| self.graph[n].as_str()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

fn collect_calls_stmt(s: &Stmt, out: &mut Vec<String>) {
    match &s.kind {
        StmtKind::Skip | StmtKind::Exit(_) | StmtKind::Return(None) | StmtKind::Goto(_) => {}
        StmtKind::Assign(_, e) => collect_calls_expr(e, out),
        StmtKind::Store(_, addr, value) => {
            collect_calls_expr(addr, out);
            collect_calls_expr(value, out);
        }
        StmtKind::Call { target, args, .. } => {
            if let CallTarget::Direct(name) = target {
                out.push(name.clone());
            } else if let CallTarget::Indirect(e) = target {
                collect_calls_expr(e, out);
            }
            for a in args {
                collect_calls_expr(a, out);
            }
        }
        StmtKind::Builtin { args, .. } => {
            for a in args {
                collect_calls_expr(a, out);
            }
        }
        StmtKind::Seq(a, b) => {
            collect_calls_stmt(a, out);
            collect_calls_stmt(b, out);
        }
        StmtKind::Ifthenelse(cond, t, e) => {
            collect_calls_expr(cond, out);
            collect_calls_stmt(t, out);
            collect_calls_stmt(e, out);
        }
        StmtKind::Loop(body) | StmtKind::Block(body) => collect_calls_stmt(body, out),
        StmtKind::Switch { expr, .. } => collect_calls_expr(expr, out),
        StmtKind::Return(Some(e)) => collect_calls_expr(e, out),
        StmtKind::Label(_, body) => collect_calls_stmt(body, out),
    }
}

fn collect_calls_expr(e: &Expr, out: &mut Vec<String>) {
    match e {
        Expr::ConstInt(_) | Expr::ConstLong(_) | Expr::ConstFloat(_) | Expr::ConstSingle(_) | Expr::Var(_) | Expr::Addrsymbol(_, _) | Expr::Addrstack(_) => {}
        Expr::Unop(_, inner) => collect_calls_expr(inner, out),
        Expr::Binop(_, l, r) => {
            collect_calls_expr(l, out);
            collect_calls_expr(r, out);
        }
        Expr::Load(_, addr) => collect_calls_expr(addr, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cflow_core::loc::SourceLoc;
    use cflow_ir::cminor::{Function, Signature};

    fn loc() -> SourceLoc {
        SourceLoc::synthetic()
    }

    #[test]
    fn external_symbol_is_flagged_and_local_is_not() {
        let call = Stmt::new(
            StmtKind::Call {
                dest: None,
                target: CallTarget::Direct("puts".into()),
                sig: Signature { params: vec![], ret: None, variadic: false },
                args: vec![],
            },
            loc(),
        );
        let f = Function {
            name: "main".into(),
            params: vec![],
            stack_slots: Default::default(),
            stack_size: 0,
            sig: Signature { params: vec![], ret: None, variadic: false },
            body: call,
            loc: loc(),
        };
        let program = Program { functions: vec![f], globals: Default::default() };
        let graph = CallGraph::build(&program);
        assert!(graph.is_defined("main"));
        assert!(graph.is_external("puts"));
        assert_eq!(graph.callees_of("main"), vec!["puts"]);
    }
}
