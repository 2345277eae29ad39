//! Cleanup pass (spec 4.E).
//!
//! Runs once per function, in the fixed order the rest of the pipeline
//! depends on: block flattening, label-liveness pruning, dead-code-after-
//! terminator removal, `RunStatements` lowering, call-site hoisting, and
//! empty-`BeginUpvalues` removal.

use std::collections::HashSet;

use crate::ir::{Expr, FieldLoad, IrFn, LabelId, LocalId, LocalVariable, Stmt, VarDecl};

pub fn run(func: &mut IrFn) {
    let used_labels = collect_used_labels(&func.body);
    let mut flat = Vec::new();
    flatten_into(std::mem::replace(&mut func.body, Stmt::Block { stmts: Vec::new(), is_basic_block: false, owner: None }), &mut flat, &used_labels);
    drop_dead_code_after_terminators(&mut flat);

    let mut ctx = Ctx { func };
    let lowered = lower_statements(flat, &mut ctx);

    func.body = Stmt::Block { stmts: lowered, is_basic_block: false, owner: None };
    let captured: HashSet<LocalId> = func.locals.iter().filter(|l| l.captured).map(|l| l.id).collect();
    drop_empty_begin_upvalues(&mut func.body, &captured);
}

struct Ctx<'a> {
    func: &'a mut IrFn,
}

impl<'a> Ctx<'a> {
    fn fresh_local(&mut self) -> crate::ir::LocalId {
        let id = crate::ir::LocalId::new(self.func.locals.len() as u32);
        let name = format!("$tmp{}", id.as_u32());
        self.func.locals.push(LocalVariable::new(id, name));
        id
    }
}

fn collect_used_labels(stmt: &Stmt) -> HashSet<LabelId> {
    let mut used = HashSet::new();
    collect_used_labels_into(stmt, &mut used);
    used
}

fn collect_used_labels_into(stmt: &Stmt, used: &mut HashSet<LabelId>) {
    match stmt {
        Stmt::Block { stmts, .. } => stmts.iter().for_each(|s| collect_used_labels_into(s, used)),
        Stmt::Jump { target, .. } => {
            used.insert(*target);
        }
        _ => {}
    }
}

/// Rule 1: flattens nested `Block`s into `out`. Rule 2: drops `Label`
/// statements whose id was never recorded as a jump target.
fn flatten_into(stmt: Stmt, out: &mut Vec<Stmt>, used_labels: &HashSet<LabelId>) {
    match stmt {
        Stmt::Block { stmts, .. } => {
            for s in stmts {
                flatten_into(s, out, used_labels);
            }
        }
        Stmt::Label { id, .. } if !used_labels.contains(&id) => {}
        other => out.push(other),
    }
}

/// Rule 3: after an unconditional terminator, delete statements up to the
/// next `Label`.
fn drop_dead_code_after_terminators(stmts: &mut Vec<Stmt>) {
    let mut out = Vec::with_capacity(stmts.len());
    let mut dead = false;
    for stmt in stmts.drain(..) {
        if dead {
            if matches!(stmt, Stmt::Label { .. }) {
                dead = false;
            } else {
                continue;
            }
        }
        if stmt.is_unconditional_terminator() {
            dead = true;
        }
        out.push(stmt);
    }
    *stmts = out;
}

/// Rules 4 & 5: lowers `RunStatements` and hoists non-root `FuncCall`s,
/// splicing any statements they produce immediately before the statement
/// that contained them (so later lowerings still append in source order).
fn lower_statements(stmts: Vec<Stmt>, ctx: &mut Ctx) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        lower_stmt(stmt, &mut out, ctx);
    }
    out
}

fn lower_stmt(stmt: Stmt, out: &mut Vec<Stmt>, ctx: &mut Ctx) {
    match stmt {
        Stmt::Assign(target, mut expr) => {
            lower_expr(&mut expr, out, ctx, true);
            out.push(Stmt::Assign(target, expr));
        }
        Stmt::FieldAssign { field, mut this_override, mut value } => {
            if let Some(e) = this_override.as_mut() {
                lower_expr(e, out, ctx, false);
            }
            lower_expr(&mut value, out, ctx, false);
            out.push(Stmt::FieldAssign { field, this_override, value });
        }
        Stmt::EvalAndIgnore(mut expr) => {
            lower_expr(&mut expr, out, ctx, true);
            out.push(Stmt::EvalAndIgnore(expr));
        }
        Stmt::Return(mut expr) => {
            lower_expr(&mut expr, out, ctx, false);
            out.push(Stmt::Return(expr));
        }
        Stmt::Jump { target, mut condition, jump_on_false, looping } => {
            if let Some(c) = condition.as_mut() {
                lower_expr(c, out, ctx, false);
            }
            out.push(Stmt::Jump { target, condition, jump_on_false, looping });
        }
        Stmt::DefineClass { class, output } => out.push(Stmt::DefineClass { class, output }),
        other @ (Stmt::Label { .. }
        | Stmt::LoadModule { .. }
        | Stmt::BeginUpvalues { .. }
        | Stmt::RelocateUpvalues(_)
        | Stmt::Block { .. }) => out.push(other),
    }
}

/// Bottom-up expression rewrite. `is_call_root` is true only for the
/// direct value of an `Assign`/`EvalAndIgnore` — the two positions a
/// `FuncCall` is already allowed to sit in without hoisting.
fn lower_expr(expr: &mut Expr, out: &mut Vec<Stmt>, ctx: &mut Ctx, is_call_root: bool) {
    match expr {
        Expr::FieldLoad(FieldLoad { this_override, .. }) => {
            if let Some(e) = this_override.as_mut() {
                lower_expr(e, out, ctx, false);
            }
        }
        Expr::FuncCall { receiver, args, .. } => {
            lower_expr(receiver, out, ctx, false);
            for a in args.iter_mut() {
                lower_expr(a, out, ctx, false);
            }
            if !is_call_root {
                let tmp = ctx.fresh_local();
                let call = std::mem::replace(expr, Expr::Load(VarDecl::Local(tmp)));
                out.push(Stmt::Assign(VarDecl::Local(tmp), call));
            }
        }
        Expr::RunStatements { stmt, result } => {
            lower_stmt(*stmt.clone(), out, ctx);
            *expr = Expr::Load(result.clone());
        }
        Expr::Const(_)
        | Expr::Load(_)
        | Expr::Closure(_)
        | Expr::LoadReceiver
        | Expr::AllocateInstanceMemory(_)
        | Expr::SystemVar(_)
        | Expr::GetClassVar(_)
        | Expr::Phi(_) => {}
    }
}

/// Rule 6: a `BeginUpvalues` node keeps only locals that actually got
/// captured; if none did, the node is removed entirely.
fn drop_empty_begin_upvalues(stmt: &mut Stmt, captured: &HashSet<LocalId>) {
    if let Stmt::Block { stmts, .. } = stmt {
        stmts.retain_mut(|s| {
            if let Stmt::BeginUpvalues { locals, .. } = s {
                locals.retain(|id| captured.contains(id));
                !locals.is_empty()
            } else {
                true
            }
        });
        for s in stmts.iter_mut() {
            drop_empty_begin_upvalues(s, captured);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CcValue, FunctionId, LocalId};

    fn sample_fn(body: Stmt) -> IrFn {
        IrFn {
            id: FunctionId::new(0),
            debug_name: "test".into(),
            params: Vec::new(),
            locals: Vec::new(),
            upvalues: Default::default(),
            ssa_vars: Vec::new(),
            body,
            enclosing_class: None,
            root_begin_upvalues: None,
        }
    }

    #[test]
    fn nested_blocks_are_flattened() {
        let inner = Stmt::Block {
            stmts: vec![Stmt::Return(Expr::Const(CcValue::Null))],
            is_basic_block: false,
            owner: None,
        };
        let mut func = sample_fn(Stmt::Block { stmts: vec![inner], is_basic_block: false, owner: None });
        run(&mut func);
        match &func.body {
            Stmt::Block { stmts, .. } => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(stmts[0], Stmt::Return(_)));
            }
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn unused_label_is_removed() {
        let body = Stmt::Block {
            stmts: vec![
                Stmt::Label { id: LabelId::new(0), debug_name: None, parent: None },
                Stmt::Return(Expr::Const(CcValue::Null)),
            ],
            is_basic_block: false,
            owner: None,
        };
        let mut func = sample_fn(body);
        run(&mut func);
        match &func.body {
            Stmt::Block { stmts, .. } => assert_eq!(stmts.len(), 1),
            _ => panic!(),
        }
    }

    #[test]
    fn dead_code_after_return_is_dropped() {
        let body = Stmt::Block {
            stmts: vec![
                Stmt::Return(Expr::Const(CcValue::Null)),
                Stmt::EvalAndIgnore(Expr::Const(CcValue::Null)),
                Stmt::Label { id: LabelId::new(0), debug_name: None, parent: None },
                Stmt::Return(Expr::Const(CcValue::Null)),
            ],
            is_basic_block: false,
            owner: None,
        };
        let mut func = sample_fn(body);
        // Label 0 is unused (no jump targets it) so it too is pruned; only
        // the first Return should survive since nothing jumps past it.
        run(&mut func);
        match &func.body {
            Stmt::Block { stmts, .. } => assert_eq!(stmts.len(), 1),
            _ => panic!(),
        }
    }

    #[test]
    fn nested_call_is_hoisted_to_a_temporary() {
        use wrenc_bytecode::signature::SignatureId;
        let call = Expr::FuncCall {
            receiver: Box::new(Expr::LoadReceiver),
            signature: SignatureId(0),
            args: Vec::new(),
            is_super: false,
        };
        let outer = Expr::FuncCall {
            receiver: Box::new(call),
            signature: SignatureId(1),
            args: Vec::new(),
            is_super: false,
        };
        let body = Stmt::Block {
            stmts: vec![Stmt::Assign(VarDecl::Local(LocalId::new(0)), outer)],
            is_basic_block: false,
            owner: None,
        };
        let mut func = sample_fn(body);
        func.locals.push(LocalVariable::new(LocalId::new(0), "x"));
        run(&mut func);
        match &func.body {
            Stmt::Block { stmts, .. } => {
                // One synthetic Assign for the hoisted inner call, plus the
                // original Assign rewritten to load from it.
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0], Stmt::Assign(VarDecl::Local(_), Expr::FuncCall { .. })));
            }
            _ => panic!(),
        }
    }
}
