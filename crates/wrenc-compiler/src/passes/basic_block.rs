//! Basic-block pass (spec 4.F).
//!
//! Input: a function body already normalized by cleanup — a single flat
//! `Block`. Output: the same `Block`, now containing only `Block`s marked
//! `is_basic_block`, each opening with exactly one `Label` and ending with
//! either an unconditional terminator or a conditional `Jump` immediately
//! followed by an unconditional `Jump` to a synthetic fallthrough label.

use crate::ir::{BasicBlockId, IrFn, LabelId, Stmt};

pub fn run(func: &mut IrFn) {
    let stmts = match &mut func.body {
        Stmt::Block { stmts, .. } => std::mem::take(stmts),
        _ => return,
    };
    let mut next_label = stmts
        .iter()
        .filter_map(Stmt::as_label)
        .map(|l| l.as_u32())
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);

    let mut blocks = Vec::new();
    let mut current = Vec::new();
    let mut current_id = BasicBlockId::new(0);
    let mut next_block_id = 1u32;

    // Every function body starts with an implicit entry label even if the
    // source never jumps to it, so the first basic block always opens
    // with a Label per the pass's own output invariant.
    if !matches!(stmts.first(), Some(Stmt::Label { .. })) {
        current.push(Stmt::Label { id: LabelId::new(next_label), debug_name: Some("entry".into()), parent: Some(current_id) });
        next_label += 1;
    }

    for stmt in stmts {
        match stmt {
            Stmt::Label { id, debug_name, parent: _ } => {
                // Falling through into a known upcoming label: the
                // synthetic terminator (if any) targets that label itself
                // rather than inventing a fresh one.
                if !current.is_empty() && !current.last().unwrap().is_unconditional_terminator() {
                    current.push(Stmt::Jump { target: id, condition: None, jump_on_false: false, looping: false });
                }
                if !current.is_empty() {
                    blocks.push(Stmt::Block { stmts: std::mem::take(&mut current), is_basic_block: true, owner: Some(current_id) });
                }
                current_id = BasicBlockId::new(next_block_id);
                next_block_id += 1;
                current.push(Stmt::Label { id, debug_name, parent: Some(current_id) });
            }
            Stmt::Jump { target, condition: Some(cond), jump_on_false, looping } => {
                current.push(Stmt::Jump { target, condition: Some(cond), jump_on_false, looping });
                let fallthrough = LabelId::new(next_label);
                next_label += 1;
                current.push(Stmt::Jump { target: fallthrough, condition: None, jump_on_false: false, looping: false });
                blocks.push(Stmt::Block { stmts: std::mem::take(&mut current), is_basic_block: true, owner: Some(current_id) });
                current_id = BasicBlockId::new(next_block_id);
                next_block_id += 1;
                current.push(Stmt::Label { id: fallthrough, debug_name: Some("fallthrough".into()), parent: Some(current_id) });
            }
            other => current.push(other),
        }
    }
    close_block(&mut blocks, &mut current, current_id, &mut next_label);

    func.body = Stmt::Block { stmts: blocks, is_basic_block: false, owner: None };
}

fn close_block(blocks: &mut Vec<Stmt>, current: &mut Vec<Stmt>, id: BasicBlockId, next_label: &mut u32) {
    if current.is_empty() {
        return;
    }
    let needs_fallthrough = !current.last().map(Stmt::is_unconditional_terminator).unwrap_or(false);
    if needs_fallthrough {
        let target = LabelId::new(*next_label);
        *next_label += 1;
        current.push(Stmt::Jump { target, condition: None, jump_on_false: false, looping: false });
    }
    blocks.push(Stmt::Block { stmts: std::mem::take(current), is_basic_block: true, owner: Some(id) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CcValue, Expr, FunctionId};

    fn sample_fn(stmts: Vec<Stmt>) -> IrFn {
        IrFn {
            id: FunctionId::new(0),
            debug_name: "test".into(),
            params: Vec::new(),
            locals: Vec::new(),
            upvalues: Default::default(),
            ssa_vars: Vec::new(),
            body: Stmt::Block { stmts, is_basic_block: false, owner: None },
            enclosing_class: None,
            root_begin_upvalues: None,
        }
    }

    fn basic_blocks(func: &IrFn) -> &[Stmt] {
        match &func.body {
            Stmt::Block { stmts, .. } => stmts,
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn straight_line_body_becomes_one_basic_block() {
        let mut func = sample_fn(vec![Stmt::Return(Expr::Const(CcValue::Null))]);
        run(&mut func);
        let blocks = basic_blocks(&func);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Stmt::Block { stmts, is_basic_block, .. } => {
                assert!(*is_basic_block);
                assert!(matches!(stmts[0], Stmt::Label { .. }));
                assert!(matches!(stmts.last(), Some(Stmt::Return(_))));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn conditional_jump_splits_into_three_blocks() {
        let body = vec![
            Stmt::Jump {
                target: LabelId::new(5),
                condition: Some(Expr::Const(CcValue::Bool(true))),
                jump_on_false: true,
                looping: false,
            },
            Stmt::Label { id: LabelId::new(5), debug_name: None, parent: None },
            Stmt::Return(Expr::Const(CcValue::Null)),
        ];
        let mut func = sample_fn(body);
        run(&mut func);
        let blocks = basic_blocks(&func);
        // entry block (conditional + synthetic unconditional fallthrough
        // jump), the synthetic fallthrough block, and the label-5 block.
        assert_eq!(blocks.len(), 3);
        for b in blocks {
            match b {
                Stmt::Block { stmts, is_basic_block, .. } => {
                    assert!(*is_basic_block);
                    assert!(matches!(stmts[0], Stmt::Label { .. }));
                }
                _ => panic!(),
            }
        }
    }

    #[test]
    fn every_block_ends_with_a_terminator() {
        let body = vec![
            Stmt::Label { id: LabelId::new(0), debug_name: None, parent: None },
            Stmt::Jump { target: LabelId::new(1), condition: None, jump_on_false: false, looping: false },
            Stmt::Label { id: LabelId::new(1), debug_name: None, parent: None },
            Stmt::Return(Expr::Const(CcValue::Null)),
        ];
        let mut func = sample_fn(body);
        run(&mut func);
        for b in basic_blocks(&func) {
            if let Stmt::Block { stmts, .. } = b {
                assert!(stmts.last().unwrap().is_unconditional_terminator());
            }
        }
    }
}
