//! Type-inference pass (spec 4.H): a worklist dataflow over the SSA graph.
//!
//! Each `SsaVariable` is a node; `Phi` nodes are special-cased to run
//! "provisionally" as soon as any one input is known, which is what lets
//! loop-carried values converge without a fixpoint over the whole
//! function. Everything else waits for all of its dependencies.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use wrenc_bytecode::signature::{Signature, SignatureId, SignatureKind};

use crate::ir::{Expr, FieldLoad, InferredType, IrFn, Stmt, VarDecl};

#[derive(Debug, Clone, Default)]
struct VarInfo {
    deps: Vec<usize>,
    rev_deps: Vec<usize>,
    is_phi: bool,
    set: bool,
    ty: InferredType,
}

pub fn run(func: &mut IrFn) {
    if func.ssa_vars.is_empty() {
        return;
    }
    let n = func.ssa_vars.len();
    let mut nodes: Vec<VarInfo> = vec![VarInfo::default(); n];
    let ssa_index: std::collections::HashMap<u32, usize> =
        func.ssa_vars.iter().enumerate().map(|(i, v)| (v.id.as_u32(), i)).collect();

    // Build the dependency graph by scanning every Assign(Ssa(id), expr).
    for_each_ssa_assign(&func.body, &mut |id, expr| {
        let Some(&idx) = ssa_index.get(&id.as_u32()) else { return };
        nodes[idx].is_phi = matches!(expr, Expr::Phi(_));
        for dep in expr_ssa_deps(expr) {
            if let Some(&dep_idx) = ssa_index.get(&dep.as_u32()) {
                nodes[idx].deps.push(dep_idx);
                nodes[dep_idx].rev_deps.push(idx);
            }
        }
    });

    let mut worklist: VecDeque<usize> = VecDeque::new();
    let mut in_queue: HashSet<usize> = HashSet::new();
    for i in 0..n {
        if nodes[i].deps.is_empty() {
            worklist.push_back(i);
            in_queue.insert(i);
        }
    }
    // Seed every Phi too (spec: "they may produce an output once one
    // input is known"; a Phi with zero deps resolved yet still joins the
    // worklist so it can react the moment a predecessor updates).
    for i in 0..n {
        if nodes[i].is_phi && !in_queue.contains(&i) {
            worklist.push_back(i);
            in_queue.insert(i);
        }
    }

    let exprs = collect_ssa_exprs(&func.body, &ssa_index, n);

    while let Some(i) = worklist.pop_front() {
        in_queue.remove(&i);
        let new_ty = compute_type(i, &nodes, &exprs, &func.ssa_vars);
        let changed = new_ty != nodes[i].ty || !nodes[i].set;
        nodes[i].ty = new_ty;
        nodes[i].set = true;
        if changed {
            for &dep in nodes[i].rev_deps.clone().iter() {
                if !in_queue.contains(&dep) {
                    worklist.push_back(dep);
                    in_queue.insert(dep);
                }
            }
        }
    }

    for (i, var) in func.ssa_vars.iter_mut().enumerate() {
        var.ty = if nodes[i].set { nodes[i].ty.clone() } else { InferredType::Unknown };
    }
}

fn compute_type(
    i: usize,
    nodes: &[VarInfo],
    exprs: &[Option<Expr>],
    ssa_vars: &[crate::ir::SsaVariable],
) -> InferredType {
    let Some(expr) = &exprs[i] else { return InferredType::Unknown };
    match expr {
        Expr::Const(c) => const_type(c),
        Expr::Load(VarDecl::Ssa(other)) => {
            ssa_vars.iter().position(|v| v.id == *other).map(|idx| nodes[idx].ty.clone()).unwrap_or(InferredType::Unknown)
        }
        Expr::Load(_) => InferredType::Unknown,
        Expr::LoadReceiver => InferredType::Unknown,
        Expr::FuncCall { receiver, signature, args, is_super } => {
            if *is_super {
                // `super` dispatch always starts above the receiver's own
                // class (4.J), so the receiver's inferred type can't tell us
                // which class's intrinsic table (if any) applies.
                InferredType::Unknown
            } else {
                intrinsic_call_type(&expr_type(receiver, nodes, ssa_vars), *signature, args, nodes, ssa_vars)
            }
        }
        Expr::AllocateInstanceMemory(_) => InferredType::Unknown,
        Expr::Closure(_) => InferredType::ObjectSystem("ObjFn"),
        Expr::FieldLoad(_) => InferredType::Unknown,
        Expr::Phi(inputs) => {
            let mut seen: Option<InferredType> = None;
            for input in inputs {
                let VarDecl::Ssa(id) = input else { continue };
                let Some(idx) = ssa_vars.iter().position(|v| v.id == *id) else { continue };
                if !nodes[idx].set {
                    continue;
                }
                match &seen {
                    None => seen = Some(nodes[idx].ty.clone()),
                    Some(t) if *t != nodes[idx].ty => return InferredType::Unknown,
                    _ => {}
                }
            }
            seen.unwrap_or(InferredType::Unknown)
        }
        _ => InferredType::Unknown,
    }
}

/// Resolves an already-SSA'd expression's type without requiring it to be
/// an `Assign` target itself — used for a `FuncCall`'s receiver and
/// arguments, which are plain `Expr`s, not nodes in the dependency graph.
fn expr_type(expr: &Expr, nodes: &[VarInfo], ssa_vars: &[crate::ir::SsaVariable]) -> InferredType {
    match expr {
        Expr::Const(c) => const_type(c),
        Expr::Load(VarDecl::Ssa(id)) => {
            ssa_vars.iter().position(|v| v.id == *id).map(|idx| nodes[idx].ty.clone()).unwrap_or(InferredType::Unknown)
        }
        Expr::LoadReceiver => InferredType::Unknown,
        Expr::Closure(_) => InferredType::ObjectSystem("ObjFn"),
        _ => InferredType::Unknown,
    }
}

/// One entry of the per-receiver-class intrinsic lookup table (4.H:
/// "FuncCall -> lookup table keyed by (receiver-type, signature); if the
/// call matches an intrinsic in the table with matching argument types,
/// record the intrinsic tag"). `arg_ty: None` means any argument type
/// matches (used for `==`/`!=`, whose native implementation accepts any
/// `Value`, not just another number — see `ObjNumClass::OperatorEqualTo`).
struct IntrinsicEntry {
    ret: InferredType,
    arg_ty: Option<InferredType>,
}

/// The `Num` receiver's intrinsic operator table, grounded on
/// `ObjNumClass`'s `WREN_METHOD` declarations (`ObjNum.h`/`.cpp`): unary
/// getters for negation/bitwise-negate, binary arithmetic/bitwise/shift
/// operators, comparisons, and range construction. The original's full
/// core-library table is produced by a build-time generator
/// (`GenGetCoreFunctionInfo`) that isn't part of this port, so only `Num`
/// is populated here; every other receiver type falls through to
/// `Unknown`, same as a signature this table doesn't recognize.
fn num_intrinsic_table() -> &'static HashMap<SignatureId, IntrinsicEntry> {
    static TABLE: OnceLock<HashMap<SignatureId, IntrinsicEntry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        let mut unary = |name: &str, ret: InferredType| {
            table.insert(Signature::new(name, SignatureKind::Getter, 0).id(), IntrinsicEntry { ret, arg_ty: None });
        };
        unary("-", InferredType::Num);
        unary("!", InferredType::ObjectSystem("ObjBool"));
        unary("~", InferredType::Num);

        let mut binary = |name: &str, ret: InferredType, arg_ty: Option<InferredType>| {
            table.insert(Signature::new(name, SignatureKind::Method, 1).id(), IntrinsicEntry { ret, arg_ty });
        };
        for name in ["+", "-", "*", "/", "%", "&", "|", "^", "<<", ">>"] {
            binary(name, InferredType::Num, Some(InferredType::Num));
        }
        binary("==", InferredType::ObjectSystem("ObjBool"), None);
        binary("!=", InferredType::ObjectSystem("ObjBool"), None);
        for name in ["<", "<=", ">", ">="] {
            binary(name, InferredType::ObjectSystem("ObjBool"), Some(InferredType::Num));
        }
        binary("..", InferredType::ObjectSystem("ObjRange"), Some(InferredType::Num));
        binary("...", InferredType::ObjectSystem("ObjRange"), Some(InferredType::Num));
        table
    })
}

fn intrinsic_call_type(
    receiver_ty: &InferredType,
    signature: SignatureId,
    args: &[Expr],
    nodes: &[VarInfo],
    ssa_vars: &[crate::ir::SsaVariable],
) -> InferredType {
    if *receiver_ty != InferredType::Num {
        return InferredType::Unknown;
    }
    let Some(entry) = num_intrinsic_table().get(&signature) else { return InferredType::Unknown };
    let args_match = match &entry.arg_ty {
        None => true,
        Some(expected) => args.iter().all(|a| expr_type(a, nodes, ssa_vars) == *expected),
    };
    if args_match {
        entry.ret.clone()
    } else {
        InferredType::Unknown
    }
}

fn const_type(c: &crate::ir::CcValue) -> InferredType {
    match c {
        crate::ir::CcValue::Null => InferredType::Null,
        crate::ir::CcValue::Bool(_) => InferredType::ObjectSystem("ObjBool"),
        crate::ir::CcValue::Int(_) | crate::ir::CcValue::Num(_) => InferredType::Num,
        crate::ir::CcValue::Str(_) => InferredType::ObjectSystem("ObjString"),
    }
}

fn expr_ssa_deps(expr: &Expr) -> Vec<crate::ir::SsaId> {
    let mut out = Vec::new();
    match expr {
        Expr::Load(VarDecl::Ssa(id)) => out.push(*id),
        Expr::Phi(inputs) => {
            for v in inputs {
                if let VarDecl::Ssa(id) = v {
                    out.push(*id);
                }
            }
        }
        Expr::FieldLoad(FieldLoad { this_override: Some(e), .. }) => out.extend(expr_ssa_deps(e)),
        Expr::FuncCall { receiver, args, .. } => {
            out.extend(expr_ssa_deps(receiver));
            for a in args {
                out.extend(expr_ssa_deps(a));
            }
        }
        _ => {}
    }
    out
}

fn for_each_ssa_assign(stmt: &Stmt, f: &mut impl FnMut(crate::ir::SsaId, &Expr)) {
    match stmt {
        Stmt::Assign(VarDecl::Ssa(id), expr) => f(*id, expr),
        Stmt::Block { stmts, .. } => {
            for s in stmts {
                for_each_ssa_assign(s, f);
            }
        }
        _ => {}
    }
}

fn collect_ssa_exprs(
    body: &Stmt,
    ssa_index: &std::collections::HashMap<u32, usize>,
    n: usize,
) -> Vec<Option<Expr>> {
    let mut out: Vec<Option<Expr>> = vec![None; n];
    for_each_ssa_assign(body, &mut |id, expr| {
        if let Some(&idx) = ssa_index.get(&id.as_u32()) {
            out[idx] = Some(expr.clone());
        }
    });
    out
}
