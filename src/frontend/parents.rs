//! Parent back-reference solver

use super::ast::{Ast, NodeId};

/// Set `parent` on every node reachable from the root. The root keeps `None`.
///
/// Links are cleared first, so running the pass twice yields the same tree.
pub fn solve_parents(ast: &mut Ast) {
    for index in 0..ast.len() {
        ast.node_mut(NodeId(index as u32)).parent = None;
    }

    let mut stack = vec![ast.root];
    while let Some(id) = stack.pop() {
        let children = ast.kind(id).children();
        for child in children {
            ast.node_mut(child).parent = Some(id);
            stack.push(child);
        }
    }
}
