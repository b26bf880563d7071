//! Expression decomposition service.
//!
//! Given a `yield` buried inside a compound expression, rewrites the
//! enclosing statement so that nothing with observable effects is evaluated
//! before the `yield` within its statement. The caller (the yield exposer)
//! repeats decomposition until every yield either is an expression statement
//! by itself or sits as the right-hand side of a plain assignment.
//!
//! Three rewrites are used:
//!
//! - extraction: an earlier-evaluated operand moves into a fresh temporary
//!   declared just before the enclosing statement
//!   (`return a + (yield b)` → `var t = a; return t + (yield b);`);
//! - conditional rewrite: a `&&`/`||`/`?:` whose lazy side holds the yield
//!   becomes an `if` statement over a result temporary
//!   (`return x || yield y` → `var t; if (t = x); else t = yield y; return t;`);
//! - receiver split: a method call with the yield in its arguments becomes a
//!   `.call` through extracted receiver and function temporaries, so the
//!   `this` binding survives the extraction.
//!
//! Shapes outside the supported grammar get an `Undecomposable` verdict and
//! are reported to the user by the caller.

use crate::ast::{AstArena, NodeId, NodeKind};
use rustc_hash::FxHashSet;

/// Prefix of the temporaries introduced by decomposition. The var hoisting
/// done later by the lowering moves them to the program scope, so their
/// values survive suspensions.
pub const TEMP_PREFIX: &str = "$jscomp$generator$temp$";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecompositionType {
    /// Already exposed; no work needed.
    Movable,
    /// Can be exposed by a sequence of rewrites.
    Decomposable,
    /// Cannot be taken apart; the caller must report an error.
    Undecomposable,
}

/// One step of work found while scanning from the enclosing statement toward
/// the target expression.
enum Obstacle {
    /// An earlier-evaluated operand to extract into a temporary.
    Sibling(NodeId),
    /// A `&&`/`||`/`?:` ancestor to rewrite into an `if` statement.
    Conditional(NodeId),
    /// A `name op= rhs` ancestor whose read side must be captured first.
    CompoundAssign(NodeId),
    /// A method call whose receiver must survive argument extraction.
    MethodCall(NodeId),
}

pub struct ExpressionDecomposer {
    next_temp_id: u32,
    /// Names of temporaries this decomposer introduced. They hold snapshots,
    /// so they are safe to evaluate before a yield without re-extraction.
    known_constants: FxHashSet<String>,
}

impl ExpressionDecomposer {
    pub fn new() -> ExpressionDecomposer {
        ExpressionDecomposer {
            next_temp_id: 0,
            known_constants: FxHashSet::default(),
        }
    }

    /// Whether `expr` (a yield node) can be exposed within its statement.
    pub fn can_expose(&self, arena: &AstArena, expr: NodeId) -> DecompositionType {
        let statement = enclosing_statement(arena, expr);
        let chain = path_from_statement(arena, statement, expr);

        let mut any_work = false;
        for window in chain.windows(2) {
            let (parent, child) = (window[0], window[1]);
            match self.classify(arena, parent, child) {
                Ok(None) => {}
                Ok(Some(_)) => any_work = true,
                Err(()) => return DecompositionType::Undecomposable,
            }
        }
        if any_work {
            DecompositionType::Decomposable
        } else {
            DecompositionType::Movable
        }
    }

    /// Rewrites the statement enclosing `expr` until `expr` is evaluated
    /// first. `can_expose` must have returned a non-`Undecomposable` verdict.
    pub fn expose_expression(&mut self, arena: &mut AstArena, expr: NodeId) {
        loop {
            let statement = enclosing_statement(arena, expr);
            let chain = path_from_statement(arena, statement, expr);
            let mut obstacle = None;
            for window in chain.windows(2) {
                let (parent, child) = (window[0], window[1]);
                match self.classify(arena, parent, child) {
                    Ok(None) => {}
                    Ok(Some(found)) => {
                        obstacle = Some(found);
                        break;
                    }
                    Err(()) => panic!("expose_expression on an undecomposable expression"),
                }
            }
            match obstacle {
                None => return,
                Some(Obstacle::Sibling(operand)) => self.extract_to_temp(arena, operand),
                Some(Obstacle::Conditional(cond)) => self.extract_conditional(arena, cond),
                Some(Obstacle::CompoundAssign(assign)) => {
                    self.extract_compound_assign(arena, assign)
                }
                Some(Obstacle::MethodCall(call)) => self.extract_method_receiver(arena, call),
            }
        }
    }

    /// Finds the work (if any) required at one `(parent, child)` step of the
    /// statement-to-yield path. `Err` means the shape is unsupported.
    fn classify(
        &self,
        arena: &AstArena,
        parent: NodeId,
        child: NodeId,
    ) -> Result<Option<Obstacle>, ()> {
        use NodeKind::*;
        let position = arena
            .child_index(parent, child)
            .expect("child not under parent");
        match arena.kind(parent) {
            // Statement-level steps.
            Return | ExprResult | Throw | Block => Ok(None),
            Var => {
                // Earlier declarators evaluate their initializers first.
                for &declarator in &arena.children(parent)[..position] {
                    if let Some(init) = arena.first_child(declarator) {
                        if !self.is_movable(arena, init) {
                            return Ok(Some(Obstacle::Sibling(init)));
                        }
                    }
                }
                Ok(None)
            }
            // The operand of a yield or unary operator is evaluated first.
            Yield | Not | Neg | Pos | TypeOf | Void | GetProp | StringKey => Ok(None),
            And | Or => {
                if position == 1 {
                    Ok(Some(Obstacle::Conditional(parent)))
                } else {
                    Ok(None)
                }
            }
            Hook => {
                if position != 0 {
                    Ok(Some(Obstacle::Conditional(parent)))
                } else {
                    Ok(None)
                }
            }
            Assign => {
                if position == 1 {
                    // The target reference is established before the value.
                    let target = arena.child(parent, 0);
                    match arena.kind(target) {
                        Name => Ok(None),
                        GetProp => {
                            let object = arena.child(target, 0);
                            if self.is_movable(arena, object) {
                                Ok(None)
                            } else {
                                Ok(Some(Obstacle::Sibling(object)))
                            }
                        }
                        GetElem => {
                            for &part in arena.children(target) {
                                if !self.is_movable(arena, part) {
                                    return Ok(Some(Obstacle::Sibling(part)));
                                }
                            }
                            Ok(None)
                        }
                        _ => Err(()),
                    }
                } else {
                    Ok(None)
                }
            }
            AssignAdd | AssignSub | AssignMul | AssignDiv | AssignMod => {
                if position == 1 {
                    if arena.kind(arena.child(parent, 0)) == Name {
                        Ok(Some(Obstacle::CompoundAssign(parent)))
                    } else {
                        Err(())
                    }
                } else {
                    // Yield inside a read-modify-write target.
                    Err(())
                }
            }
            Eq | Ne | StrictEq | StrictNe | Lt | Le | Gt | Ge | In | InstanceOf | Add | Sub
            | Mul | Div | Mod | Comma | GetElem | ArrayLit => {
                self.first_unmovable(arena, &arena.children(parent)[..position])
            }
            ObjectLit => {
                // Earlier property values evaluate first.
                for &key in &arena.children(parent)[..position] {
                    let value = arena.child(key, 0);
                    if !self.is_movable(arena, value) {
                        return Ok(Some(Obstacle::Sibling(value)));
                    }
                }
                Ok(None)
            }
            Call => {
                if position == 0 {
                    // The callee itself evaluates first.
                    return Ok(None);
                }
                let callee = arena.child(parent, 0);
                if !self.is_movable(arena, callee) {
                    match arena.kind(callee) {
                        GetProp | GetElem => return Ok(Some(Obstacle::MethodCall(parent))),
                        _ => return Ok(Some(Obstacle::Sibling(callee))),
                    }
                }
                self.first_unmovable(arena, &arena.children(parent)[1..position])
            }
            New => {
                if position == 0 {
                    return Ok(None);
                }
                let callee = arena.child(parent, 0);
                if !self.is_movable(arena, callee) {
                    return Ok(Some(Obstacle::Sibling(callee)));
                }
                self.first_unmovable(arena, &arena.children(parent)[1..position])
            }
            // Declarator name: its initializer is the only evaluated child.
            Name => Ok(None),
            _ => Err(()),
        }
    }

    fn first_unmovable(
        &self,
        arena: &AstArena,
        candidates: &[NodeId],
    ) -> Result<Option<Obstacle>, ()> {
        for &candidate in candidates {
            if !self.is_movable(arena, candidate) {
                return Ok(Some(Obstacle::Sibling(candidate)));
            }
        }
        Ok(None)
    }

    /// Whether evaluating `node` after a suspension gives the same value as
    /// before it, so it may stay to the left of a yield.
    fn is_movable(&self, arena: &AstArena, node: NodeId) -> bool {
        match arena.kind(node) {
            NodeKind::Number
            | NodeKind::String
            | NodeKind::True
            | NodeKind::False
            | NodeKind::Null
            | NodeKind::This
            | NodeKind::Function
            | NodeKind::Empty => true,
            NodeKind::Name => self.known_constants.contains(arena.text(node)),
            // Property reads stay put only when the receiver is one of our
            // own temporaries (the `t.call` shape built below).
            NodeKind::GetProp => {
                let object = arena.child(node, 0);
                arena.is_name(object) && self.known_constants.contains(arena.text(object))
            }
            _ => false,
        }
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("{}{}", TEMP_PREFIX, self.next_temp_id);
        self.next_temp_id += 1;
        self.known_constants.insert(name.clone());
        name
    }

    /// Inserts `var <temp> = <operand>;` before the enclosing statement and
    /// replaces `operand` with the temporary.
    fn extract_to_temp(&mut self, arena: &mut AstArena, operand: NodeId) {
        let statement = enclosing_statement(arena, operand);
        let parent = arena.parent(statement);
        let temp = self.fresh_temp();

        let reference = arena.name(&temp);
        arena.use_span_of(operand, reference);
        arena.replace_with(operand, reference);

        let declarator = arena.name(&temp);
        arena.use_span_of(operand, declarator);
        arena.add_child_to_back(declarator, operand);
        let var = arena.var_of(declarator);
        arena.use_span_of(statement, var);
        arena.add_child_before(parent, statement, var);
    }

    /// Rewrites a short-circuit or conditional ancestor into an `if`
    /// statement assigning a result temporary.
    fn extract_conditional(&mut self, arena: &mut AstArena, cond: NodeId) {
        let statement = enclosing_statement(arena, cond);
        let parent = arena.parent(statement);
        let kind = arena.kind(cond);
        let temp = self.fresh_temp();

        // The conditional expression becomes a read of the temporary.
        let reference = arena.name(&temp);
        arena.use_span_of(cond, reference);
        arena.replace_with(cond, reference);

        // var <temp>;
        let declarator = arena.name(&temp);
        let var = arena.var_of(declarator);
        arena.use_span_of(statement, var);
        arena.add_child_before(parent, statement, var);

        let if_stmt = match kind {
            NodeKind::Or => {
                // if (t = lhs); else t = rhs;
                let lhs = arena.remove_first_child(cond).expect("|| without lhs");
                let rhs = arena.remove_first_child(cond).expect("|| without rhs");
                let lhs_name = arena.name(&temp);
                let test = arena.assign(lhs_name, lhs);
                let empty_then = arena.block();
                arena.set_added_block(empty_then, true);
                let rhs_name = arena.name(&temp);
                let rhs_assign = arena.assign(rhs_name, rhs);
                let rhs_stmt = arena.expr_result(rhs_assign);
                let else_block = arena.block_of(vec![rhs_stmt]);
                arena.set_added_block(else_block, true);
                arena.if_else_node(test, empty_then, else_block)
            }
            NodeKind::And => {
                // if (t = lhs) t = rhs;
                let lhs = arena.remove_first_child(cond).expect("&& without lhs");
                let rhs = arena.remove_first_child(cond).expect("&& without rhs");
                let lhs_name = arena.name(&temp);
                let test = arena.assign(lhs_name, lhs);
                let rhs_name = arena.name(&temp);
                let rhs_assign = arena.assign(rhs_name, rhs);
                let rhs_stmt = arena.expr_result(rhs_assign);
                let then_block = arena.block_of(vec![rhs_stmt]);
                arena.set_added_block(then_block, true);
                arena.if_node(test, then_block)
            }
            NodeKind::Hook => {
                // if (cond) t = then; else t = else;
                let test = arena.remove_first_child(cond).expect("?: without condition");
                let then_expr = arena.remove_first_child(cond).expect("?: without then");
                let else_expr = arena.remove_first_child(cond).expect("?: without else");
                let then_name = arena.name(&temp);
                let then_assign = arena.assign(then_name, then_expr);
                let then_stmt = arena.expr_result(then_assign);
                let then_block = arena.block_of(vec![then_stmt]);
                arena.set_added_block(then_block, true);
                let else_name = arena.name(&temp);
                let else_assign = arena.assign(else_name, else_expr);
                let else_stmt = arena.expr_result(else_assign);
                let else_block = arena.block_of(vec![else_stmt]);
                arena.set_added_block(else_block, true);
                arena.if_else_node(test, then_block, else_block)
            }
            other => unreachable!("not a conditional: {:?}", other),
        };
        arena.use_span_of(statement, if_stmt);
        arena.add_child_before(parent, statement, if_stmt);
    }

    /// `name op= rhs` → `var t = name; name = t op rhs`.
    fn extract_compound_assign(&mut self, arena: &mut AstArena, assign: NodeId) {
        let statement = enclosing_statement(arena, assign);
        let parent = arena.parent(statement);
        let op = arena
            .kind(assign)
            .compound_assign_op()
            .expect("not a compound assignment");
        let temp = self.fresh_temp();

        let target = arena.remove_first_child(assign).expect("assignment target");
        assert!(arena.is_name(target), "compound target must be a name");
        let rhs = arena.remove_first_child(assign).expect("assignment value");

        // var t = name;
        let declarator = arena.name(&temp);
        let read = arena.clone_node(target);
        arena.add_child_to_back(declarator, read);
        let var = arena.var_of(declarator);
        arena.use_span_of(statement, var);
        arena.add_child_before(parent, statement, var);

        // name = t op rhs
        let temp_read = arena.name(&temp);
        let combined = arena.binary(op, temp_read, rhs);
        let plain = arena.assign(target, combined);
        arena.use_span_of(assign, plain);
        arena.replace_with(assign, plain);
    }

    /// `o.m(args)` → `var t0 = o; var t1 = t0.m; t1.call(t0, args)`.
    fn extract_method_receiver(&mut self, arena: &mut AstArena, call: NodeId) {
        let callee = arena.child(call, 0);
        let object = arena.child(callee, 0);

        // Capture the receiver.
        self.extract_to_temp(arena, object);
        // Capture the function value (the whole callee).
        self.extract_to_temp(arena, callee);

        // The callee is now a temp name; the receiver temp was minted first.
        let function_temp = arena.text(arena.child(call, 0)).to_string();
        let receiver_temp = format!("{}{}", TEMP_PREFIX, self.next_temp_id - 2);

        let old_callee = arena.remove_first_child(call).expect("callee");
        debug_assert_eq!(arena.text(old_callee), function_temp);
        let function_read = arena.name(&function_temp);
        let new_callee = arena.getprop(function_read, "call");
        arena.use_span_of(old_callee, new_callee);
        arena.add_child_to_front(call, new_callee);

        let receiver = arena.name(&receiver_temp);
        let callee_node = arena.child(call, 0);
        arena.use_span_of(callee_node, receiver);
        // First argument slot, right after the callee.
        let first_arg = arena.second_child(call);
        match first_arg {
            Some(first_arg) => arena.add_child_before(call, first_arg, receiver),
            None => arena.add_child_to_back(call, receiver),
        }
    }
}

impl Default for ExpressionDecomposer {
    fn default() -> Self {
        Self::new()
    }
}

/// The statement containing `expr`: the nearest ancestor in statement
/// position. Declarator names keep the walk going up to their `var`.
pub fn enclosing_statement(arena: &AstArena, expr: NodeId) -> NodeId {
    let mut current = expr;
    loop {
        if arena.kind(current).may_be_statement() && arena.kind(current) != NodeKind::Function {
            return current;
        }
        let parent = arena.parent(current);
        assert!(parent.is_some(), "expression not inside a statement");
        current = parent;
    }
}

/// The path `[statement, …, expr]`, outermost first.
fn path_from_statement(arena: &AstArena, statement: NodeId, expr: NodeId) -> Vec<NodeId> {
    let mut chain = vec![expr];
    let mut current = expr;
    while current != statement {
        current = arena.parent(current);
        assert!(current.is_some(), "statement not an ancestor of expression");
        chain.push(current);
    }
    chain.reverse();
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserState;
    use crate::printer::print;

    fn find_yield(arena: &AstArena, node: NodeId) -> Option<NodeId> {
        if arena.is_yield(node) {
            return Some(node);
        }
        for &child in arena.children(node) {
            if let Some(found) = find_yield(arena, child) {
                return Some(found);
            }
        }
        None
    }

    fn expose(source: &str) -> String {
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        assert!(parser.diagnostics().is_empty(), "{:?}", parser.diagnostics());
        let yield_node = find_yield(&parser.arena, root).expect("no yield in source");
        let mut decomposer = ExpressionDecomposer::new();
        assert_ne!(
            decomposer.can_expose(&parser.arena, yield_node),
            DecompositionType::Undecomposable
        );
        decomposer.expose_expression(&mut parser.arena, yield_node);
        print(&parser.arena, root)
    }

    fn verdict(source: &str) -> DecompositionType {
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        assert!(parser.diagnostics().is_empty());
        let yield_node = find_yield(&parser.arena, root).expect("no yield in source");
        ExpressionDecomposer::new().can_expose(&parser.arena, yield_node)
    }

    #[test]
    fn exposed_yields_report_movable() {
        assert_eq!(verdict("x = yield 1;"), DecompositionType::Movable);
        assert_eq!(verdict("return yield 1;"), DecompositionType::Movable);
        assert_eq!(verdict("yield 1;"), DecompositionType::Movable);
    }

    #[test]
    fn extracts_earlier_operand() {
        let out = expose("return a + (yield b);");
        assert!(out.contains("var $jscomp$generator$temp$0 = a;"));
        assert!(out.contains("return $jscomp$generator$temp$0 + (yield b);"));
    }

    #[test]
    fn literals_stay_in_place() {
        let out = expose("return 1 + (yield b);");
        assert!(!out.contains("$jscomp$generator$temp$"));
    }

    #[test]
    fn rewrites_or_into_if_else() {
        let out = expose("return x || (yield y);");
        assert!(out.contains("var $jscomp$generator$temp$0;"));
        assert!(out.contains("if ($jscomp$generator$temp$0 = x) {}"));
        assert!(out.contains("else {"));
        assert!(out.contains("$jscomp$generator$temp$0 = yield y;"));
        assert!(out.contains("return $jscomp$generator$temp$0;"));
    }

    #[test]
    fn rewrites_and_into_if() {
        let out = expose("return x && (yield y);");
        assert!(out.contains("if ($jscomp$generator$temp$0 = x) {"));
        assert!(out.contains("$jscomp$generator$temp$0 = yield y;"));
        assert!(!out.contains("else"));
    }

    #[test]
    fn rewrites_hook_into_if_else() {
        let out = expose("return c ? a : (yield y);");
        assert!(out.contains("if (c) {"));
        assert!(out.contains("$jscomp$generator$temp$0 = a;"));
        assert!(out.contains("$jscomp$generator$temp$0 = yield y;"));
    }

    #[test]
    fn compound_assignment_reads_target_first() {
        let out = expose("x += yield 1;");
        assert!(out.contains("var $jscomp$generator$temp$0 = x;"));
        assert!(out.contains("x = $jscomp$generator$temp$0 + (yield 1);"));
    }

    #[test]
    fn method_call_keeps_receiver() {
        let out = expose("o.m(yield 1);");
        assert!(out.contains("var $jscomp$generator$temp$0 = o;"));
        assert!(out.contains("var $jscomp$generator$temp$1 = $jscomp$generator$temp$0.m;"));
        assert!(out.contains(
            "$jscomp$generator$temp$1.call($jscomp$generator$temp$0, yield 1);"
        ));
    }

    #[test]
    fn earlier_yield_is_extracted_for_a_later_one() {
        let mut parser = ParserState::new("f((yield 1), (yield 2));");
        let root = parser.parse_script();
        assert!(parser.diagnostics().is_empty());
        // Expose the *second* yield; the first is evaluated before it.
        let stmt = parser.arena.first_child(root).unwrap();
        let call = parser.arena.first_child(stmt).unwrap();
        let second = parser.arena.child(call, 2);
        assert!(parser.arena.is_yield(second));
        let mut decomposer = ExpressionDecomposer::new();
        decomposer.expose_expression(&mut parser.arena, second);
        let out = print(&parser.arena, root);
        // Both the callee and the first yield were captured, in order.
        assert!(out.contains("var $jscomp$generator$temp$0 = f;"));
        assert!(out.contains("var $jscomp$generator$temp$1 = yield 1;"));
        assert!(out.contains(
            "$jscomp$generator$temp$0($jscomp$generator$temp$1, yield 2);"
        ));
    }

    #[test]
    fn var_initializers_run_in_order() {
        let out = expose("var a = f(), b = yield 1;");
        assert!(out.contains("var $jscomp$generator$temp$0 = f();"));
        assert!(out.contains("var a = $jscomp$generator$temp$0, b = yield 1;"));
    }

    #[test]
    fn member_compound_assignment_is_undecomposable() {
        assert_eq!(
            verdict("o.p += yield 1;"),
            DecompositionType::Undecomposable
        );
    }

    #[test]
    fn yield_inside_update_target_is_undecomposable() {
        assert_eq!(verdict("++a[yield 1];"), DecompositionType::Undecomposable);
    }
}
