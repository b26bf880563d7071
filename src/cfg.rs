//! Control-flow oracle for the generator lowering.
//!
//! The lowering asks exactly two questions:
//!
//! 1. can execution fall off the end of a function body (decides whether a
//!    final `jumpToEnd()` is needed);
//! 2. is a switch-case body entered solely through its own `case` label
//!    (decides whether an unmarked case body must be detached into a
//!    generated case).
//!
//! Both are answered by a syntactic "completes normally" analysis rather than
//! a full control-flow graph. The analysis is conservative in the directions
//! that are safe for the lowering: it may claim a statement completes
//! normally when it cannot (costing only a redundant final jump), and it may
//! claim a case body has extra predecessors (costing only an extra detached
//! case).

use crate::ast::{AstArena, NodeId, NodeKind};

/// Whether execution can reach the end of `block` (a function body).
pub fn ends_reachable(arena: &AstArena, block: NodeId) -> bool {
    can_complete_normally(arena, block)
}

/// Whether the body of `section` (a `Case`/`DefaultCase` of `switch_node`)
/// can only be reached through its own case label.
pub fn case_body_sole_entry(arena: &AstArena, switch_node: NodeId, section: NodeId) -> bool {
    let sections = &arena.children(switch_node)[1..];
    let index = match sections.iter().position(|&s| s == section) {
        Some(index) => index,
        None => return false,
    };
    if index == 0 {
        return true;
    }
    let previous = sections[index - 1];
    let previous_body = arena
        .last_child(previous)
        .expect("switch section without body");
    if !arena.has_children(previous_body) {
        // The previous label would fall through into this body.
        return false;
    }
    !can_complete_normally(arena, previous_body)
}

/// Whether `cond` is a literal that is always truthy (`true`, nonzero number).
fn is_always_true(arena: &AstArena, cond: NodeId) -> bool {
    match arena.kind(cond) {
        NodeKind::True => true,
        NodeKind::Number => arena.number(cond) != 0.0,
        _ => false,
    }
}

/// Whether a statement can complete normally, i.e. hand control to the
/// statement that follows it.
pub fn can_complete_normally(arena: &AstArena, node: NodeId) -> bool {
    match arena.kind(node) {
        NodeKind::Return | NodeKind::Throw | NodeKind::Break | NodeKind::Continue => false,
        NodeKind::Block | NodeKind::Script => arena
            .children(node)
            .iter()
            .all(|&child| can_complete_normally(arena, child)),
        NodeKind::If => {
            if arena.child_count(node) > 2 {
                can_complete_normally(arena, arena.child(node, 1))
                    || can_complete_normally(arena, arena.child(node, 2))
            } else {
                true
            }
        }
        NodeKind::While => {
            let cond = arena.child(node, 0);
            if is_always_true(arena, cond) {
                has_escaping_break(arena, arena.child(node, 1))
            } else {
                true
            }
        }
        NodeKind::For => {
            let cond = arena.child(node, 1);
            if arena.is_empty_node(cond) || is_always_true(arena, cond) {
                has_escaping_break(arena, arena.child(node, 3))
            } else {
                true
            }
        }
        NodeKind::ForIn => true,
        NodeKind::Do => {
            let body = arena.child(node, 0);
            let cond = arena.child(node, 1);
            if is_always_true(arena, cond) {
                has_escaping_break(arena, body)
            } else {
                can_complete_normally(arena, body) || has_escaping_continue(arena, body)
            }
        }
        NodeKind::Switch => {
            let sections = &arena.children(node)[1..];
            let has_default = sections
                .iter()
                .any(|&s| arena.kind(s) == NodeKind::DefaultCase);
            if !has_default {
                return true;
            }
            sections.iter().any(|&section| {
                let body = arena.last_child(section).expect("section without body");
                can_complete_normally(arena, body) || has_escaping_break(arena, body)
            })
        }
        NodeKind::Label => {
            let name = arena.text(arena.child(node, 0)).to_string();
            let inner = arena.child(node, 1);
            can_complete_normally(arena, inner) || has_break_to_label(arena, inner, &name)
        }
        NodeKind::Try => {
            let try_completes = can_complete_normally(arena, arena.child(node, 0));
            let holder = arena.child(node, 1);
            let catch_completes = arena
                .first_child(holder)
                .map(|catch| can_complete_normally(arena, arena.child(catch, 1)))
                .unwrap_or(false);
            let mut result = try_completes || catch_completes;
            if arena.child_count(node) > 2 {
                result = result && can_complete_normally(arena, arena.child(node, 2));
            }
            result
        }
        _ => true,
    }
}

/// Whether `node` contains a `break` that would leave the construct `node` is
/// the body of: an unlabeled `break` not captured by a nested loop/switch, or
/// a labeled `break` whose label is not defined inside `node`.
fn has_escaping_break(arena: &AstArena, node: NodeId) -> bool {
    fn walk(arena: &AstArena, node: NodeId, root: NodeId, depth: u32) -> bool {
        match arena.kind(node) {
            NodeKind::Function => false,
            NodeKind::Break => match arena.first_child(node) {
                None => depth == 0,
                Some(label) => !label_defined_within(arena, node, root, arena.text(label)),
            },
            kind => {
                let nested = kind.is_loop_structure() || kind == NodeKind::Switch;
                let depth = if nested { depth + 1 } else { depth };
                arena
                    .children(node)
                    .iter()
                    .any(|&child| walk(arena, child, root, depth))
            }
        }
    }
    walk(arena, node, node, 0)
}

/// Whether `node` contains a `continue` addressing a loop outside `node`.
fn has_escaping_continue(arena: &AstArena, node: NodeId) -> bool {
    fn walk(arena: &AstArena, node: NodeId, root: NodeId, depth: u32) -> bool {
        match arena.kind(node) {
            NodeKind::Function => false,
            NodeKind::Continue => match arena.first_child(node) {
                None => depth == 0,
                Some(label) => !label_defined_within(arena, node, root, arena.text(label)),
            },
            kind => {
                let depth = if kind.is_loop_structure() { depth + 1 } else { depth };
                arena
                    .children(node)
                    .iter()
                    .any(|&child| walk(arena, child, root, depth))
            }
        }
    }
    walk(arena, node, node, 0)
}

/// Whether a `break name;` targeting `name` appears under `node` without an
/// intervening redefinition of the label or a function boundary.
fn has_break_to_label(arena: &AstArena, node: NodeId, name: &str) -> bool {
    match arena.kind(node) {
        NodeKind::Function => false,
        NodeKind::Break => arena
            .first_child(node)
            .is_some_and(|label| arena.text(label) == name),
        NodeKind::Label if arena.text(arena.child(node, 0)) == name => false,
        _ => arena
            .children(node)
            .iter()
            .any(|&child| has_break_to_label(arena, child, name)),
    }
}

/// Whether `name` is declared as a label on the path from `reference` up to
/// (and excluding) `root`, the subtree the escape analysis started from. A
/// label outside `root` means the break leaves the analyzed construct.
fn label_defined_within(arena: &AstArena, reference: NodeId, root: NodeId, name: &str) -> bool {
    let mut current = arena.parent(reference);
    while current.is_some() && current != root {
        if arena.kind(current) == NodeKind::Label && arena.text(arena.child(current, 0)) == name {
            return true;
        }
        current = arena.parent(current);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserState;

    fn body_of_first_function(source: &str) -> (ParserState, NodeId) {
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        assert!(parser.diagnostics().is_empty(), "{:?}", parser.diagnostics());
        let function = parser.arena.first_child(root).unwrap();
        let body = parser.arena.last_child(function).unwrap();
        (parser, body)
    }

    #[test]
    fn straight_line_code_reaches_the_end() {
        let (parser, body) = body_of_first_function("function f() { var a = 1; a = a + 1; }");
        assert!(ends_reachable(&parser.arena, body));
    }

    #[test]
    fn trailing_return_blocks_the_end() {
        let (parser, body) = body_of_first_function("function f() { f(); return 1; }");
        assert!(!ends_reachable(&parser.arena, body));
        let (parser, body) = body_of_first_function("function f() { throw e; }");
        assert!(!ends_reachable(&parser.arena, body));
    }

    #[test]
    fn if_needs_both_branches_abrupt() {
        let (parser, body) =
            body_of_first_function("function f() { if (x) { return 1; } else { return 2; } }");
        assert!(!ends_reachable(&parser.arena, body));
        let (parser, body) = body_of_first_function("function f() { if (x) { return 1; } }");
        assert!(ends_reachable(&parser.arena, body));
    }

    #[test]
    fn infinite_loop_without_break_blocks_the_end() {
        let (parser, body) = body_of_first_function("function f() { for (;;) { g(); } }");
        assert!(!ends_reachable(&parser.arena, body));
        let (parser, body) = body_of_first_function("function f() { while (true) { g(); } }");
        assert!(!ends_reachable(&parser.arena, body));
    }

    #[test]
    fn break_escapes_an_infinite_loop() {
        let (parser, body) =
            body_of_first_function("function f() { for (;;) { if (x) { break; } } }");
        assert!(ends_reachable(&parser.arena, body));
        // A break captured by an inner loop does not escape.
        let (parser, body) = body_of_first_function(
            "function f() { for (;;) { while (x) { break; } } }",
        );
        assert!(!ends_reachable(&parser.arena, body));
    }

    #[test]
    fn labeled_break_escapes_through_inner_loop() {
        let (parser, body) = body_of_first_function(
            "function f() { outer: for (;;) { while (x) { break outer; } } }",
        );
        assert!(ends_reachable(&parser.arena, body));
    }

    #[test]
    fn try_finally_that_returns_blocks_the_end() {
        let (parser, body) =
            body_of_first_function("function f() { try { g(); } finally { return 1; } }");
        assert!(!ends_reachable(&parser.arena, body));
    }

    fn switch_and_sections(source: &str) -> (ParserState, NodeId) {
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        assert!(parser.diagnostics().is_empty());
        let switch = parser.arena.first_child(root).unwrap();
        (parser, switch)
    }

    #[test]
    fn sole_entry_after_abrupt_case() {
        let (parser, switch) =
            switch_and_sections("switch (x) { case 1: a(); break; case 2: b(); }");
        let second = parser.arena.child(switch, 2);
        assert!(case_body_sole_entry(&parser.arena, switch, second));
    }

    #[test]
    fn fall_through_case_has_extra_entry() {
        let (parser, switch) = switch_and_sections("switch (x) { case 1: a(); case 2: b(); }");
        let second = parser.arena.child(switch, 2);
        assert!(!case_body_sole_entry(&parser.arena, switch, second));
        let first = parser.arena.child(switch, 1);
        assert!(case_body_sole_entry(&parser.arena, switch, first));
    }

    #[test]
    fn empty_previous_case_has_extra_entry() {
        let (parser, switch) = switch_and_sections("switch (x) { case 1: case 2: b(); }");
        let second = parser.arena.child(switch, 2);
        assert!(!case_body_sole_entry(&parser.arena, switch, second));
    }
}
