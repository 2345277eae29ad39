//! SSA construction (spec 4.G), implementing Braun et al. "Simple and
//! Efficient Construction of SSA Form".
//!
//! Every basic block in the function (already split out by
//! [`crate::passes::basic_block`]) gets an `exports` map (the block's
//! current binding for each local defined or resolved within it) and an
//! `offers` map used only while a lookup is in flight, to break recursion
//! through loop back-edges. Variables captured by an upvalue, or marked
//! `disable_ssa` (import targets), keep their mutable-local semantics and
//! are skipped entirely.

use std::collections::HashMap;

use crate::ir::{Expr, FieldLoad, IrFn, LabelId, LocalId, SsaVariable, Stmt, VarDecl};

struct BlockInfo {
    label: LabelId,
    predecessors: Vec<usize>,
    exports: HashMap<LocalId, VarDecl>,
    offers: HashMap<LocalId, VarDecl>,
    ssa_inputs: HashMap<LocalId, Vec<usize>>,
}

pub fn run(func: &mut IrFn) {
    let ssa_enabled: std::collections::HashSet<LocalId> =
        func.locals.iter().filter(|l| !l.captured && !l.disable_ssa).map(|l| l.id).collect();
    if ssa_enabled.is_empty() {
        return;
    }

    let mut blocks = match std::mem::replace(&mut func.body, Stmt::Block { stmts: Vec::new(), is_basic_block: false, owner: None }) {
        Stmt::Block { stmts, .. } => stmts,
        other => {
            func.body = other;
            return;
        }
    };

    let label_of = |b: &Stmt| -> Option<LabelId> {
        match b {
            Stmt::Block { stmts, .. } => stmts.first().and_then(Stmt::as_label),
            _ => None,
        }
    };
    let mut label_to_index = HashMap::new();
    for (i, b) in blocks.iter().enumerate() {
        if let Some(l) = label_of(b) {
            label_to_index.insert(l, i);
        }
    }

    let mut infos: Vec<BlockInfo> = blocks
        .iter()
        .map(|b| BlockInfo {
            label: label_of(b).unwrap_or(LabelId::new(0)),
            predecessors: Vec::new(),
            exports: HashMap::new(),
            offers: HashMap::new(),
            ssa_inputs: HashMap::new(),
        })
        .collect();
    for (i, b) in blocks.iter().enumerate() {
        for target in jump_targets(b) {
            if let Some(&j) = label_to_index.get(&target) {
                infos[j].predecessors.push(i);
            }
        }
    }

    let mut next_ssa = 0u32;

    // Step 1: local scan. Rewrites in-block assignments to fresh SSA
    // variables and same-block loads that already have a current export.
    for (i, block) in blocks.iter_mut().enumerate() {
        if let Stmt::Block { stmts, .. } = block {
            for stmt in stmts.iter_mut() {
                rewrite_loads(stmt, &mut |local| {
                    if ssa_enabled.contains(&local) {
                        infos[i].exports.get(&local).cloned()
                    } else {
                        None
                    }
                });
                if let Stmt::Assign(target @ VarDecl::Local(_), _) = stmt {
                    if let VarDecl::Local(local) = *target {
                        if ssa_enabled.contains(&local) {
                            let ssa_id = crate::ir::SsaId::new(next_ssa);
                            next_ssa += 1;
                            func.ssa_vars.push(SsaVariable { id: ssa_id, local, ty: Default::default() });
                            infos[i].exports.insert(local, VarDecl::Ssa(ssa_id));
                            *target = VarDecl::Ssa(ssa_id);
                        }
                    }
                }
            }
        }
    }

    // Step 2: cross-block resolution for every local still read via
    // `VarDecl::Local` anywhere (meaning no preceding in-block export was
    // found in step 1).
    let mut pending_phis: Vec<(usize, crate::ir::SsaId, Vec<VarDecl>)> = Vec::new();
    for i in 0..blocks.len() {
        let reads: Vec<LocalId> = {
            let mut found = Vec::new();
            if let Stmt::Block { stmts, .. } = &blocks[i] {
                for stmt in stmts {
                    collect_local_reads(stmt, &ssa_enabled, &mut found);
                }
            }
            found
        };
        for local in reads {
            import_variable(i, local, &mut infos, &mut next_ssa, &mut pending_phis, func);
        }
    }
    for i in 0..blocks.len() {
        let resolved: HashMap<LocalId, VarDecl> = infos[i].exports.clone();
        if let Stmt::Block { stmts, .. } = &mut blocks[i] {
            for stmt in stmts.iter_mut() {
                rewrite_loads(stmt, &mut |local| resolved.get(&local).cloned());
            }
        }
    }

    // Finalization: prepend each block's materialized Phi assigns.
    for (block_idx, ssa_id, inputs) in pending_phis {
        if let Stmt::Block { stmts, .. } = &mut blocks[block_idx] {
            let insert_at = stmts.iter().position(|s| !matches!(s, Stmt::Label { .. })).unwrap_or(stmts.len());
            stmts.insert(insert_at, Stmt::Assign(VarDecl::Ssa(ssa_id), Expr::Phi(inputs)));
        }
    }

    func.body = Stmt::Block { stmts: blocks, is_basic_block: false, owner: None };
}

/// Braun et al.'s `readVariableRecursive`, specialized to a function whose
/// CFG is already fully known (every block "sealed" up front — this repo
/// builds the whole basic-block list before SSA runs, so there is no
/// streaming-parse case with not-yet-discovered predecessors to defer).
fn import_variable(
    block: usize,
    local: LocalId,
    infos: &mut [BlockInfo],
    next_ssa: &mut u32,
    pending_phis: &mut Vec<(usize, crate::ir::SsaId, Vec<VarDecl>)>,
    func: &mut IrFn,
) -> VarDecl {
    if let Some(v) = infos[block].exports.get(&local) {
        return v.clone();
    }
    if let Some(v) = infos[block].offers.get(&local) {
        return v.clone();
    }
    let preds = infos[block].predecessors.clone();
    if preds.is_empty() {
        // Unreachable-from-entry read (or a genuinely uninitialized local
        // on this path): fall back to the plain local, which the backend
        // will treat as whatever default the runtime gives locals.
        let v = VarDecl::Local(local);
        infos[block].exports.insert(local, v.clone());
        return v;
    }
    if preds.len() == 1 {
        let v = import_variable(preds[0], local, infos, next_ssa, pending_phis, func);
        infos[block].exports.insert(local, v.clone());
        return v;
    }

    let ssa_id = crate::ir::SsaId::new(*next_ssa);
    *next_ssa += 1;
    func.ssa_vars.push(SsaVariable { id: ssa_id, local, ty: Default::default() });
    let placeholder = VarDecl::Ssa(ssa_id);
    infos[block].offers.insert(local, placeholder.clone());

    let mut results = Vec::with_capacity(preds.len());
    for p in preds.clone() {
        results.push(import_variable(p, local, infos, next_ssa, pending_phis, func));
    }
    infos[block].offers.remove(&local);

    let mut distinct: Vec<VarDecl> = Vec::new();
    for r in &results {
        if *r != placeholder && !distinct.contains(r) {
            distinct.push(r.clone());
        }
    }
    let resolved = if distinct.len() <= 1 {
        distinct.into_iter().next().unwrap_or(VarDecl::Local(local))
    } else {
        infos[block].ssa_inputs.insert(local, preds);
        pending_phis.push((block, ssa_id, results));
        placeholder
    };
    infos[block].exports.insert(local, resolved.clone());
    resolved
}

fn jump_targets(stmt: &Stmt) -> Vec<LabelId> {
    let mut out = Vec::new();
    if let Stmt::Block { stmts, .. } = stmt {
        for s in stmts {
            if let Stmt::Jump { target, .. } = s {
                out.push(*target);
            }
        }
    }
    out
}

fn rewrite_loads(stmt: &mut Stmt, resolve: &mut impl FnMut(LocalId) -> Option<VarDecl>) {
    match stmt {
        Stmt::Assign(_, expr) => rewrite_expr(expr, resolve),
        Stmt::FieldAssign { this_override, value, .. } => {
            if let Some(e) = this_override {
                rewrite_expr(e, resolve);
            }
            rewrite_expr(value, resolve);
        }
        Stmt::EvalAndIgnore(expr) => rewrite_expr(expr, resolve),
        Stmt::Return(expr) => rewrite_expr(expr, resolve),
        Stmt::Jump { condition: Some(c), .. } => rewrite_expr(c, resolve),
        Stmt::Block { stmts, .. } => {
            for s in stmts.iter_mut() {
                rewrite_loads(s, resolve);
            }
        }
        _ => {}
    }
}

fn rewrite_expr(expr: &mut Expr, resolve: &mut impl FnMut(LocalId) -> Option<VarDecl>) {
    match expr {
        Expr::Load(var @ VarDecl::Local(_)) => {
            if let VarDecl::Local(id) = *var {
                if let Some(new_var) = resolve(id) {
                    *var = new_var;
                }
            }
        }
        Expr::FieldLoad(FieldLoad { this_override, .. }) => {
            if let Some(e) = this_override {
                rewrite_expr(e, resolve);
            }
        }
        Expr::FuncCall { receiver, args, .. } => {
            rewrite_expr(receiver, resolve);
            for a in args.iter_mut() {
                rewrite_expr(a, resolve);
            }
        }
        _ => {}
    }
}

fn collect_local_reads(stmt: &Stmt, ssa_enabled: &std::collections::HashSet<LocalId>, out: &mut Vec<LocalId>) {
    match stmt {
        Stmt::Assign(_, expr) => collect_expr_reads(expr, ssa_enabled, out),
        Stmt::FieldAssign { this_override, value, .. } => {
            if let Some(e) = this_override {
                collect_expr_reads(e, ssa_enabled, out);
            }
            collect_expr_reads(value, ssa_enabled, out);
        }
        Stmt::EvalAndIgnore(expr) | Stmt::Return(expr) => collect_expr_reads(expr, ssa_enabled, out),
        Stmt::Jump { condition: Some(c), .. } => collect_expr_reads(c, ssa_enabled, out),
        Stmt::Block { stmts, .. } => {
            for s in stmts {
                collect_local_reads(s, ssa_enabled, out);
            }
        }
        _ => {}
    }
}

fn collect_expr_reads(expr: &Expr, ssa_enabled: &std::collections::HashSet<LocalId>, out: &mut Vec<LocalId>) {
    match expr {
        Expr::Load(VarDecl::Local(id)) if ssa_enabled.contains(id) => out.push(*id),
        Expr::FieldLoad(FieldLoad { this_override: Some(e), .. }) => collect_expr_reads(e, ssa_enabled, out),
        Expr::FuncCall { receiver, args, .. } => {
            collect_expr_reads(receiver, ssa_enabled, out);
            for a in args {
                collect_expr_reads(a, ssa_enabled, out);
            }
        }
        _ => {}
    }
}
