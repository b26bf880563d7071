//! Generator Function Lowering
//!
//! Rewrites generator functions into state machine programs driven by a small
//! runtime context object. Runs after all other syntax lowerings, so the
//! bodies it sees contain only plain statements plus `yield`.
//!
//! # Transform Patterns
//!
//! ## Simple generator function
//! ```javascript
//! function* gen() {
//!     yield 1;
//!     yield 2;
//! }
//! ```
//! Becomes:
//! ```javascript
//! function gen() {
//!     return $jscomp.generator.createGenerator(gen, function ($jscomp$generator$context) {
//!         do switch ($jscomp$generator$context.nextAddress) {
//!             case 1:
//!                 return $jscomp$generator$context.yield(1, 2);
//!             case 2:
//!                 return $jscomp$generator$context.yield(2, 0);
//!         } while (0);
//!     });
//! }
//! ```
//!
//! Two transform-private node bits are used:
//!
//! - the generator marker - the subtree contains a `yield`, set by a
//!   bottom-up marking walk over the detached original body;
//! - the generator-safe bit - the subtree was emitted by this pass and the
//!   unmarked-subtree fixer must skip it (the bit is cleared on encounter).
//!
//! Unmarked statements are copied into the current case after a trivial
//! rewrite of `this`, `arguments`, `return`, `break`, `continue` and `var`.
//! Marked statements are broken up into multiple cases around each yield;
//! yields buried in compound expressions are first exposed with the
//! expression decomposer. A final collapse pass shortens jump chains and
//! merges adjacent cases.
//!
//! The generated code expects the runtime to provide
//! `$jscomp.generator.createGenerator` and the context methods it calls
//! (`yield`, `yieldAll`, `jumpTo`, `jumpToEnd`, `return`, `forIn`, the
//! try/catch/finally block protocol, and the `nextAddress`/`yieldResult`
//! fields). Injecting that runtime is a separate concern.

use crate::ast::{AstArena, JsDocInfo, NodeId, NodeKind};
use crate::cfg;
use crate::decompose::{DecompositionType, ExpressionDecomposer};
use crate::diagnostics::{codes, DiagnosticBag};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

pub const GENERATOR_FUNCTION: &str = "$jscomp$generator$function";
pub const GENERATOR_CONTEXT: &str = "$jscomp$generator$context";
pub const GENERATOR_ARGUMENTS: &str = "$jscomp$generator$arguments";
pub const GENERATOR_THIS: &str = "$jscomp$generator$this";
pub const GENERATOR_FORIN_PREFIX: &str = "$jscomp$generator$forin$";

/// Policy toggles for behaviors the pass currently implements conservatively.
/// Defaults reproduce the established output shapes.
#[derive(Clone, Debug)]
pub struct LoweringOptions {
    /// Wrap the generated switch in `do { … } while (0)`. The wrapper keeps a
    /// downstream type inferencer re-analyzing the switch under every case's
    /// bindings; hosts that run this pass after inference can drop it.
    pub wrap_switch_in_do_while: bool,
    /// Emit the final `jumpToEnd()` without consulting the reachability
    /// oracle.
    pub always_emit_final_jump: bool,
    /// Detach every non-empty switch-case body into a generated case instead
    /// of keeping provably sole-entry unmarked bodies inline.
    pub detach_all_switch_cases: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        LoweringOptions {
            wrap_switch_in_do_while: true,
            always_emit_final_jump: false,
            detach_all_switch_cases: false,
        }
    }
}

/// Lowering of the enclosing function stops after a user diagnostic.
#[derive(Debug)]
struct Abort;

type TranspileResult<T = ()> = Result<T, Abort>;

/// Finds generator functions and lowers them, innermost first.
pub struct GeneratorLowering {
    options: LoweringOptions,
    unique_id_counter: u32,
}

impl GeneratorLowering {
    pub fn new(options: LoweringOptions) -> GeneratorLowering {
        GeneratorLowering {
            options,
            unique_id_counter: 0,
        }
    }

    /// Lowers every generator function under `root`. Returns whether any
    /// function was rewritten. User-facing problems are reported through
    /// `diagnostics`; the offending function is abandoned and the walk
    /// continues.
    pub fn process(
        &mut self,
        arena: &mut AstArena,
        root: NodeId,
        diagnostics: &mut DiagnosticBag,
    ) -> bool {
        let mut changed = false;
        self.traverse(arena, root, 0, diagnostics, &mut changed);
        changed
    }

    fn traverse(
        &mut self,
        arena: &mut AstArena,
        node: NodeId,
        nesting_level: u32,
        diagnostics: &mut DiagnosticBag,
        changed: &mut bool,
    ) {
        let inner_level = if arena.is_generator_function(node) {
            nesting_level + 1
        } else {
            nesting_level
        };
        for child in arena.children_vec(node) {
            self.traverse(arena, child, inner_level, diagnostics, changed);
        }
        // Post-order: by the time an outer generator is processed, no inner
        // `function*` remains.
        if arena.is_generator_function(node) {
            debug!(nesting = nesting_level, "lowering generator function");
            let mut transpiler = SingleFunctionTranspiler::new(
                arena,
                diagnostics,
                &self.options,
                &mut self.unique_id_counter,
                node,
                nesting_level,
            );
            transpiler.transpile();
            *changed = true;
        }
    }
}

/// Marks `yield` nodes and propagates the bit up through the (detached)
/// tree, without descending into nested functions.
pub fn mark_yields(arena: &mut AstArena, root: NodeId) {
    fn walk(arena: &mut AstArena, node: NodeId) {
        if arena.is_function(node) {
            return;
        }
        for child in arena.children_vec(node) {
            walk(arena, child);
        }
        if arena.is_yield(node) {
            arena.set_marker(node, true);
        }
        // The walk runs on a detached tree, so this never marks anything
        // above the traversal root.
        let parent = arena.parent(node);
        if parent.is_some() && arena.is_marked(node) {
            arena.set_marker(parent, true);
        }
    }
    walk(arena, root)
}

/// Finds the only yield in an exposed subtree. Zero or two disjoint yields
/// mean the exposer failed, which is a bug in this pass.
fn find_unique_yield(arena: &AstArena, root: NodeId) -> NodeId {
    fn walk(arena: &AstArena, node: NodeId, found: &mut Option<NodeId>) {
        if arena.is_function(node) {
            return;
        }
        if arena.is_yield(node) {
            assert!(found.is_none(), "more than one yield in an exposed subtree");
            *found = Some(node);
            return;
        }
        for &child in arena.children(node) {
            walk(arena, child, found);
        }
    }
    let mut found = None;
    walk(arena, root, &mut found);
    found.expect("no yield in a marked subtree")
}

// =============================================================================
// Per-function transpiler
// =============================================================================

/// Transpiles a single generator function into a state machine program.
struct SingleFunctionTranspiler<'a> {
    arena: &'a mut AstArena,
    diagnostics: &'a mut DiagnosticBag,
    options: &'a LoweringOptions,
    unique_id_counter: &'a mut u32,
    gen_func: NodeId,
    /// The detached body of the original generator function.
    original_body: NodeId,
    ctx: TranspilationContext,
    decomposer: ExpressionDecomposer,
}

impl<'a> SingleFunctionTranspiler<'a> {
    fn new(
        arena: &'a mut AstArena,
        diagnostics: &'a mut DiagnosticBag,
        options: &'a LoweringOptions,
        unique_id_counter: &'a mut u32,
        gen_func: NodeId,
        nesting_level: u32,
    ) -> SingleFunctionTranspiler<'a> {
        let original_body = arena.last_child(gen_func).expect("function without body");
        let ctx = TranspilationContext::new(arena, original_body, nesting_level);
        SingleFunctionTranspiler {
            arena,
            diagnostics,
            options,
            unique_id_counter,
            gen_func,
            original_body,
            ctx,
            decomposer: ExpressionDecomposer::new(),
        }
    }

    fn next_unique_id(&mut self) -> u32 {
        *self.unique_id_counter += 1;
        *self.unique_id_counter
    }

    fn transpile(&mut self) {
        // Would a final return at the end of the original body be reachable?
        let should_add_final_jump = self.options.always_emit_final_jump
            || cfg::ends_reachable(self.arena, self.original_body);

        let gen_func = self.gen_func;
        assert!(self.arena.is_generator_function(gen_func));

        let gen_func_name = self.arena.first_child(gen_func).expect("unnamed function");
        assert!(self.arena.is_name(gen_func_name));
        // The transpiled function refers to itself, so make sure it has a name.
        if self.arena.text(gen_func_name).is_empty() {
            let scoped = self.ctx.scoped_text(GENERATOR_FUNCTION);
            self.arena.set_text(gen_func_name, &scoped);
        }

        //  switch ($jscomp$generator$context.nextAddress) { }
        let context_name = self.ctx.js_context_name_node(self.arena, gen_func);
        let next_address = self.arena.getprop(context_name, "nextAddress");
        let switch_node = self.arena.new_node(NodeKind::Switch);
        self.arena.use_span_of(gen_func, switch_node);
        self.arena.add_child_to_back(switch_node, next_address);

        // Program function:
        //   function ($jscomp$generator$context) {
        //       do switch ($jscomp$generator$context.nextAddress) { } while (0);
        //   }
        let switch_stmt = if self.options.wrap_switch_in_do_while {
            // Without the loop, a one-shot type inference of the switch
            // misreads the types assigned to variables within it.
            let do_block = self.arena.block_of(vec![switch_node]);
            let zero = self.arena.number_lit(0.0);
            let do_node = self.arena.new_node(NodeKind::Do);
            self.arena.add_child_to_back(do_node, do_block);
            self.arena.add_child_to_back(do_node, zero);
            do_node
        } else {
            switch_node
        };
        let program_body = self.arena.block_of(vec![switch_stmt]);
        let program_name = self.arena.name("");
        let param_name = self.ctx.js_context_name_node(self.arena, gen_func);
        let param_list = self.arena.new_node(NodeKind::ParamList);
        self.arena.add_child_to_back(param_list, param_name);
        let program = self.arena.new_node(NodeKind::Function);
        self.arena.use_span_of(gen_func, program);
        self.arena.add_child_to_back(program, program_name);
        self.arena.add_child_to_back(program, param_list);
        self.arena.add_child_to_back(program, program_body);

        // Propagate suppressions from the original function, and add
        // "uselessCode" since the program may contain unreachable statements.
        let mut suppressions = self
            .arena
            .jsdoc(gen_func)
            .map(|doc| doc.suppressions.clone())
            .unwrap_or_default();
        if !suppressions.iter().any(|s| s == "uselessCode") {
            suppressions.push("uselessCode".to_string());
        }
        self.arena.set_jsdoc(
            program,
            Some(JsDocInfo {
                suppressions,
                constancy: false,
            }),
        );

        // Replace the original body with:
        //   return $jscomp.generator.createGenerator(<name>, <program>);
        let jscomp = self.arena.name("$jscomp");
        let generator_ns = self.arena.getprop(jscomp, "generator");
        let create_generator = self.arena.getprop(generator_ns, "createGenerator");
        let name_clone = self.arena.clone_node(gen_func_name);
        let create_call = self
            .arena
            .call(create_generator, vec![name_clone, program]);
        let return_stmt = self.arena.return_node(Some(create_call));
        let new_body = self.arena.block_of(vec![return_stmt]);
        self.arena.use_span_of(gen_func, new_body);
        self.arena.replace_with(self.original_body, new_body);
        self.ctx.new_generator_body = new_body;

        mark_yields(self.arena, self.original_body);

        match self.drain_statements(should_add_final_jump) {
            Ok(()) => {
                self.ctx.finalize(self.arena, switch_node);
                self.ctx.check_state_is_empty();
                self.arena.set_is_generator(gen_func, false);
            }
            Err(Abort) => {
                // The function is abandoned mid-rewrite; scratch state must
                // still come out balanced.
                self.ctx.reset_scratch();
            }
        }
    }

    /// Transpiles every statement of the original body, then terminates the
    /// state machine program.
    fn drain_statements(&mut self, should_add_final_jump: bool) -> TranspileResult {
        while let Some(statement) = self.arena.remove_first_child(self.original_body) {
            self.transpile_statement(statement, None, None)?;
        }

        let final_block = self.arena.block();
        if should_add_final_jump {
            let jump_to_end = self.ctx.call_context_method_result(
                self.arena,
                self.original_body,
                "jumpToEnd",
                vec![],
            );
            self.arena.add_child_to_back(final_block, jump_to_end);
        }
        let current = self.ctx.current_case;
        let end = self.ctx.program_end_case;
        self.ctx.case_jump_to(self.arena, current, end, final_block);
        self.ctx.case_mut(current).may_fall_through = true;
        Ok(())
    }

    /// Transpiles a detached statement into the current case of the context.
    fn transpile_statement(
        &mut self,
        statement: NodeId,
        break_case: Option<CaseId>,
        continue_case: Option<CaseId>,
    ) -> TranspileResult {
        assert!(self.arena.kind(statement).may_be_statement());
        assert!(self.arena.parent(statement).is_none());

        if !self.arena.is_marked(statement) {
            self.transpile_unmarked_node(statement);
            return Ok(());
        }
        match self.arena.kind(statement) {
            NodeKind::Label => self.transpile_label(statement),
            NodeKind::Block => self.transpile_block(statement),
            NodeKind::ExprResult => self.transpile_expression_result(statement),
            NodeKind::Var => self.transpile_var(statement),
            NodeKind::Return => self.transpile_return(statement),
            NodeKind::Throw => self.transpile_throw(statement),
            NodeKind::If => self.transpile_if(statement, break_case),
            NodeKind::For => self.transpile_for(statement, break_case, continue_case),
            NodeKind::ForIn => self.transpile_for_in(statement, break_case, continue_case),
            NodeKind::While => self.transpile_while(statement, break_case, continue_case),
            NodeKind::Do => self.transpile_do(statement, break_case, continue_case),
            NodeKind::Try => self.transpile_try(statement, break_case),
            NodeKind::Switch => self.transpile_switch(statement, break_case),
            other => panic!("unsupported marked statement: {:?}", other),
        }
    }

    /// Transpiles code that contains no yields.
    fn transpile_unmarked_node(&mut self, node: NodeId) {
        assert!(!self.arena.is_marked(node));
        if self.arena.is_function(node) {
            // Function statements are hoisted to the outer scope. Inner
            // generator functions were transpiled first, so none remain.
            let name = self.arena.first_child(node).expect("unnamed function");
            let name_text = self.arena.text(name);
            assert!(
                !name_text.is_empty() && !name_text.starts_with(GENERATOR_FUNCTION),
                "unexpected anonymous function statement"
            );
            let body = self.ctx.new_generator_body;
            let last = self.arena.last_child(body).expect("empty generator body");
            self.arena.add_child_before(body, last, node);
            return;
        }
        let block = if self.arena.is_block(node) {
            node
        } else {
            let block = self.arena.block_of(vec![node]);
            self.arena.use_span_of(node, block);
            block
        };
        self.ctx.transpile_unmarked_block(self.arena, block);
    }

    /// Transpiles a label with a marked statement under it.
    fn transpile_label(&mut self, node: NodeId) -> TranspileResult {
        // Collect all label names in an "a: b: c: {}" chain.
        let mut label_names = Vec::new();
        let mut labeled = node;
        while self.arena.kind(labeled) == NodeKind::Label {
            label_names.push(
                self.arena
                    .remove_first_child(labeled)
                    .expect("label without name"),
            );
            labeled = self
                .arena
                .remove_first_child(labeled)
                .expect("label without statement");
        }

        let continue_case = if self.arena.is_loop_structure(labeled) {
            Some(self.ctx.create_case(self.arena))
        } else {
            None
        };
        let break_case = self.ctx.create_case(self.arena);
        self.ctx
            .push_labels(self.arena, &label_names, break_case, continue_case);
        let result = self.transpile_statement(labeled, Some(break_case), continue_case);
        self.ctx.pop_labels(self.arena, &label_names);
        result?;

        if break_case != self.ctx.current_case {
            self.ctx.switch_case_to(self.arena, break_case);
        }
        Ok(())
    }

    fn transpile_block(&mut self, node: NodeId) -> TranspileResult {
        while let Some(child) = self.arena.remove_first_child(node) {
            self.transpile_statement(child, None, None)?;
        }
        Ok(())
    }

    /// Transpiles a marked expression statement.
    fn transpile_expression_result(&mut self, node: NodeId) -> TranspileResult {
        let expr = self
            .arena
            .remove_first_child(node)
            .expect("expression statement without expression");
        let exposed = self.expose_yield_and_transpile_rest(expr)?;
        let decomposed = self.transpile_yields(exposed)?;

        // "a = yield;" becomes "a = $context.yieldResult;", but a bare
        // "yield;" is not materialized as "$context.yieldResult;". That keeps
        // the case empty and mergeable.
        if !self.arena.is_yield(exposed) {
            let prepared = self
                .prepare_node_for_write(Some(decomposed))
                .expect("prepared expression");
            self.arena.add_child_to_front(node, prepared);
            self.arena.set_marker(node, false);
            self.ctx.write_generated_node(self.arena, node);
        }
        Ok(())
    }

    /// Transpiles a marked `var` statement: unmarked declarator runs are
    /// flushed together, marked declarators get their initializers decomposed
    /// first.
    fn transpile_var(&mut self, node: NodeId) -> TranspileResult {
        self.arena.set_marker(node, false);
        let mut new_vars = self.arena.clone_node(node);
        loop {
            let mut marked_declarator = None;
            while let Some(declarator) = self.arena.remove_first_child(node) {
                if self.arena.is_marked(declarator) {
                    marked_declarator = Some(declarator);
                    break;
                }
                self.arena.add_child_to_back(new_vars, declarator);
            }
            if self.arena.has_children(new_vars) {
                self.transpile_unmarked_node(new_vars);
                new_vars = self.arena.clone_node(node);
            }
            let Some(declarator) = marked_declarator else {
                break;
            };
            let init = self.arena.remove_first_child(declarator);
            let init = self.maybe_decompose_expression(init)?;
            if let Some(init) = init {
                self.arena.add_child_to_front(declarator, init);
            }
            self.arena.set_marker(declarator, false);
            self.arena.add_child_to_back(new_vars, declarator);
        }
        if self.arena.has_children(new_vars) {
            self.transpile_unmarked_node(new_vars);
        }
        Ok(())
    }

    fn transpile_return(&mut self, node: NodeId) -> TranspileResult {
        let expr = self.arena.remove_first_child(node);
        let decomposed = self.maybe_decompose_expression(expr)?;
        let prepared = self.prepare_node_for_write(decomposed);
        let return_call = self.ctx.return_expression(self.arena, node, prepared);
        self.arena.add_child_to_front(node, return_call);
        self.ctx.write_generated_node(self.arena, node);
        self.ctx.case_mut(self.ctx.current_case).may_fall_through = false;
        Ok(())
    }

    fn transpile_throw(&mut self, node: NodeId) -> TranspileResult {
        let expr = self.arena.remove_first_child(node);
        let decomposed = self.maybe_decompose_expression(expr)?;
        let prepared = self
            .prepare_node_for_write(decomposed)
            .expect("throw without operand");
        self.arena.add_child_to_front(node, prepared);
        self.ctx.write_generated_node(self.arena, node);
        self.ctx.case_mut(self.ctx.current_case).may_fall_through = false;
        Ok(())
    }

    /// Exposes the yield operator so nothing with side effects runs before
    /// it, transpiling the extracted statements on the way.
    fn expose_yield_and_transpile_rest(&mut self, node: NodeId) -> TranspileResult<NodeId> {
        assert!(self.arena.is_marked(node));
        if self.arena.is_yield(node) {
            return Ok(node);
        }

        // The exposer may break the expression into multiple statements.
        // Place it into a scratch block to hold them; expressions go under a
        // `return` so they stay expressions when restructured.
        let is_expression = self.arena.kind(node).may_be_expression();
        let block = if is_expression {
            let wrapped = self.arena.return_node(Some(node));
            self.arena.block_of(vec![wrapped])
        } else {
            self.arena.block_of(vec![node])
        };
        self.yield_exposer_walk(node)?;
        // Re-establish markers on the restructured tree for the recursive
        // transpile calls below.
        mark_yields(self.arena, block);

        // The last child is the decomposed remainder, free of side effects
        // before its yield. Everything before it is transpiled normally.
        let decomposed = self
            .arena
            .last_child(block)
            .expect("scratch block lost its statement");
        self.arena.detach(decomposed);
        self.transpile_statement(block, None, None)?;
        Ok(if is_expression {
            self.arena
                .remove_first_child(decomposed)
                .expect("return without expression")
        } else {
            decomposed
        })
    }

    /// The yield exposer: clears markers on the way down and delegates each
    /// yield in a compound position to the expression decomposer.
    fn yield_exposer_walk(&mut self, node: NodeId) -> TranspileResult {
        self.arena.set_marker(node, false);
        if self.arena.is_function(node) {
            return Ok(());
        }
        if self.arena.is_yield(node) {
            return self.expose_yield(node);
        }
        for child in self.arena.children_vec(node) {
            self.yield_exposer_walk(child)?;
        }
        Ok(())
    }

    fn expose_yield(&mut self, yield_node: NodeId) -> TranspileResult {
        let parent = self.arena.parent(yield_node);
        if parent.is_some() && self.arena.kind(parent) == NodeKind::ExprResult {
            return Ok(());
        }
        if self.decomposer.can_expose(self.arena, yield_node)
            != DecompositionType::Undecomposable
        {
            self.decomposer.expose_expression(self.arena, yield_node);
            Ok(())
        } else {
            let span = self.arena.span(yield_node);
            self.diagnostics.error(
                span,
                "Undecomposable expression: Please rewrite the yield or await as a separate \
                 statement.\nSee https://github.com/google/closure-compiler/wiki/FAQ\
                 #i-get-an-undecomposable-expression-error-for-my-yield-or-await-expression\
                 -what-do-i-do",
                codes::UNDECOMPOSABLE_EXPRESSION,
            );
            Err(Abort)
        }
    }

    /// Converts an expression node containing a yield into an unmarked
    /// analogue.
    fn maybe_decompose_expression(
        &mut self,
        node: Option<NodeId>,
    ) -> TranspileResult<Option<NodeId>> {
        match node {
            Some(node) if self.arena.is_marked(node) => {
                let exposed = self.expose_yield_and_transpile_rest(node)?;
                Ok(Some(self.transpile_yields(exposed)?))
            }
            other => Ok(other),
        }
    }

    /// Makes an unmarked node suitable for writing into a case body, running
    /// the unmarked-subtree fixer over it.
    fn prepare_node_for_write(&mut self, node: Option<NodeId>) -> Option<NodeId> {
        let node = node?;
        // Wrap so the node can be replaced in the tree if necessary.
        let wrapper = if self.arena.kind(node).may_be_statement() {
            self.arena.block_of(vec![node])
        } else {
            self.arena.expr_result(node)
        };
        self.ctx.fix_unmarked(self.arena, wrapper);
        assert!(
            self.arena.child_count(wrapper) == 1,
            "fixer changed the statement count of a write wrapper"
        );
        self.arena.remove_first_child(wrapper)
    }

    /// Replaces the unique yield under `node` with a yield instruction plus a
    /// `$context.yieldResult` read in a fresh case.
    fn transpile_yields(&mut self, node: NodeId) -> TranspileResult<NodeId> {
        if !self.arena.is_marked(node) {
            // Exposing a yield can make it disappear from the resulting
            // statement, e.g. "0 || yield;" leaves a bare temp read behind.
            return Ok(node);
        }
        let jump_to_section = self.ctx.create_case(self.arena);
        let yield_node = find_unique_yield(self.arena, node);
        let operand = self.arena.remove_first_child(yield_node);
        let operand = self.maybe_decompose_expression(operand)?;
        let yield_expression = self.prepare_node_for_write(operand);
        if self.arena.is_yield_delegate(yield_node) {
            let expression = yield_expression.expect("yield* without operand");
            self.ctx
                .yield_all(self.arena, expression, jump_to_section, yield_node);
        } else {
            self.ctx
                .do_yield(self.arena, yield_expression, jump_to_section, yield_node);
        }
        self.ctx.switch_case_to(self.arena, jump_to_section);
        let yield_result = self.ctx.yield_result(self.arena, yield_node);
        if yield_node == node {
            return Ok(yield_result);
        }
        // Replace the yield with $context.yieldResult and unmark the chain
        // above it.
        self.arena.replace_with(yield_node, yield_result);
        let mut cursor = yield_result;
        while cursor != node {
            cursor = self.arena.parent(cursor);
            self.arena.set_marker(cursor, false);
        }
        Ok(node)
    }

    /// Transpiles a marked `if` statement.
    fn transpile_if(&mut self, node: NodeId, break_case: Option<CaseId>) -> TranspileResult {
        // Decompose the condition first.
        let cond = self
            .arena
            .remove_first_child(node)
            .expect("if without condition");
        let mut condition = self
            .maybe_decompose_expression(Some(cond))?
            .expect("if condition");
        let mut if_block = self.arena.first_child(node).expect("if without then branch");
        let else_branch = self.arena.second_child(node);

        let then_marked = self.arena.is_marked(if_block);
        let else_marked = else_branch.is_some_and(|e| self.arena.is_marked(e));
        if !then_marked && !else_marked {
            self.arena.add_child_to_front(node, condition);
            self.arena.set_marker(node, false);
            self.transpile_unmarked_node(node);
            return Ok(());
        }

        self.arena.detach(if_block);
        let mut else_block = match else_branch {
            Some(else_block) => {
                self.arena.detach(else_block);
                else_block
            }
            None => {
                let block = self.arena.block();
                self.arena.use_span_of(node, block);
                block
            }
        };

        // Only the else branch is unmarked: swap the branches and negate.
        if self.arena.is_marked(if_block) && !self.arena.is_marked(else_block) {
            let negated = self.arena.not(condition);
            self.arena.use_span_of(condition, negated);
            condition = negated;
            std::mem::swap(&mut if_block, &mut else_block);
        }

        if !self.arena.is_marked(if_block) {
            // Unmarked then branch (the marked else is lowered into cases):
            // the branch stays inline with a generated jump appended.
            let end_case = self.ctx.maybe_create_case(self.arena, break_case);
            let jump_block = self
                .ctx
                .create_jump_to_block(self.arena, end_case, false, if_block);
            while let Some(jump_node) = self.arena.remove_first_child(jump_block) {
                self.arena.set_generator_safe(jump_node, true);
                self.arena.add_child_to_back(if_block, jump_node);
            }
            let new_if = self.arena.if_node(condition, if_block);
            self.arena.use_span_of(node, new_if);
            self.transpile_unmarked_node(new_if);
            self.transpile_statement(else_block, None, None)?;
            self.ctx.switch_case_to(self.arena, end_case);
            return Ok(());
        }

        // Both branches marked.
        let if_case = self.ctx.create_case(self.arena);
        let end_case = self.ctx.maybe_create_case(self.arena, break_case);

        let condition = self
            .prepare_node_for_write(Some(condition))
            .expect("if condition");
        let new_if_block = self
            .ctx
            .create_jump_to_block(self.arena, if_case, true, node);
        let generated_if = self.arena.if_node(condition, new_if_block);
        self.arena.use_span_of(node, generated_if);
        self.ctx.write_generated_node(self.arena, generated_if);
        self.transpile_statement(else_block, None, None)?;
        self.ctx.write_jump_to(self.arena, end_case, node);
        self.ctx.switch_case_to(self.arena, if_case);
        self.transpile_statement(if_block, None, None)?;
        self.ctx.switch_case_to(self.arena, end_case);
        Ok(())
    }

    /// Transpiles a marked `for` statement.
    fn transpile_for(
        &mut self,
        node: NodeId,
        break_case: Option<CaseId>,
        continue_case: Option<CaseId>,
    ) -> TranspileResult {
        // Decompose the init clause first.
        let init = self
            .arena
            .remove_first_child(node)
            .expect("for without init clause");
        let init = self
            .maybe_decompose_expression(Some(init))?
            .expect("for init clause");
        let condition = self.arena.child(node, 0);
        let increment = self.arena.child(node, 1);
        let body = self.arena.child(node, 2);

        if !self.arena.is_marked(condition)
            && !self.arena.is_marked(increment)
            && !self.arena.is_marked(body)
        {
            self.arena.add_child_to_front(node, init);
            self.arena.set_marker(node, false);
            self.transpile_unmarked_node(node);
            return Ok(());
        }

        // Move the init expression out of the loop.
        if !self.arena.is_empty_node(init) {
            let init_statement = if self.arena.kind(init).may_be_expression() {
                let statement = self.arena.expr_result(init);
                self.arena.use_span_of(init, statement);
                statement
            } else {
                init
            };
            self.transpile_unmarked_node(init_statement);
        }

        let start_case = self.ctx.create_case(self.arena);
        let increment_case = self.ctx.maybe_create_case(self.arena, continue_case);
        let end_case = self.ctx.maybe_create_case(self.arena, break_case);

        self.ctx.switch_case_to(self.arena, start_case);

        if !self.arena.is_empty_node(condition) {
            self.arena.detach(condition);
            let condition = self
                .maybe_decompose_expression(Some(condition))?
                .expect("for condition");
            let condition = self
                .prepare_node_for_write(Some(condition))
                .expect("for condition");
            let negated = self.arena.not(condition);
            self.arena.use_span_of(condition, negated);
            let jump_block = self
                .ctx
                .create_jump_to_block(self.arena, end_case, true, node);
            let exit_if = self.arena.if_node(negated, jump_block);
            self.arena.use_span_of(node, exit_if);
            self.ctx.write_generated_node(self.arena, exit_if);
        }

        self.ctx.push_break_continue_context(end_case, increment_case);
        self.arena.detach(body);
        let result = self.transpile_statement(body, None, None);
        self.ctx.pop_break_continue_context();
        result?;

        self.ctx.switch_case_to(self.arena, increment_case);
        if !self.arena.is_empty_node(increment) {
            self.arena.detach(increment);
            let increment = self
                .maybe_decompose_expression(Some(increment))?
                .expect("for increment");
            let statement = self.arena.expr_result(increment);
            self.arena.use_span_of(increment, statement);
            self.transpile_unmarked_node(statement);
        }
        self.ctx.write_jump_to(self.arena, start_case, node);

        self.ctx.switch_case_to(self.arena, end_case);
        Ok(())
    }

    /// Transpiles `for (target in expr) body` by converting it into
    /// `for (var …, $forin = $context.forIn(expr); (target = $forin.getNext()) != null; ) body`
    /// and delegating to the `for` lowering.
    fn transpile_for_in(
        &mut self,
        node: NodeId,
        break_case: Option<CaseId>,
        continue_case: Option<CaseId>,
    ) -> TranspileResult {
        // Decompose the iterated object first.
        let object = self
            .arena
            .second_child(node)
            .expect("for-in without object");
        self.arena.detach(object);
        let detached_cond = self
            .maybe_decompose_expression(Some(object))?
            .expect("for-in object");
        let target = self.arena.first_child(node).expect("for-in without target");
        let body = self.arena.second_child(node).expect("for-in without body");

        if !self.arena.is_marked(target) && !self.arena.is_marked(body) {
            self.arena.add_child_before(node, body, detached_cond);
            self.arena.set_marker(node, false);
            self.transpile_unmarked_node(node);
            return Ok(());
        }

        // Build the init clause.
        self.arena.detach(target);
        let (init, target) = if self.arena.is_var(target) {
            // "var i in x"  =>  "var i"
            assert!(!self.arena.is_marked(target));
            let declarator = self
                .arena
                .first_child(target)
                .expect("var without declarator");
            assert!(!self.arena.has_children(declarator));
            let fresh_target = self.arena.clone_node(declarator);
            (target, fresh_target)
        } else {
            // "i in x"  =>  "var"
            let init = self.arena.new_node(NodeKind::Var);
            self.arena.use_span_of(target, init);
            (init, target)
        };

        // "var …, $jscomp$generator$forin$N = $context.forIn(expr)"
        let uid = self.next_unique_id();
        let forin_text = self
            .ctx
            .scoped_text(&format!("{}{}", GENERATOR_FORIN_PREFIX, uid));
        let forin_name = self.arena.name(&forin_text);
        self.arena.use_span_of(target, forin_name);
        let forin_call =
            self.ctx
                .call_context_method(self.arena, target, "forIn", vec![detached_cond]);
        self.arena.add_child_to_front(forin_name, forin_call);
        self.arena.add_child_to_back(init, forin_name);

        // "(target = $forin.getNext()) != null"
        let target_marked = self.arena.is_marked(target);
        let forin_read = self.arena.clone_node(forin_name);
        let get_next = self.arena.getprop(forin_read, "getNext");
        let get_next_call = self.arena.call(get_next, vec![]);
        let assign = self.arena.assign(target, get_next_call);
        let null = self.arena.null_node();
        let for_cond = self.arena.binary(NodeKind::Ne, assign, null);
        self.arena.use_span_of(node, for_cond);
        self.arena.set_marker(for_cond, target_marked);

        // "for (init; cond; ) body"
        self.arena.detach(body);
        let empty = self.arena.empty();
        let for_node = self.arena.new_node(NodeKind::For);
        self.arena.use_span_of(node, for_node);
        self.arena.add_child_to_back(for_node, init);
        self.arena.add_child_to_back(for_node, for_cond);
        self.arena.add_child_to_back(for_node, empty);
        self.arena.add_child_to_back(for_node, body);

        self.transpile_for(for_node, break_case, continue_case)
    }

    fn transpile_while(
        &mut self,
        node: NodeId,
        break_case: Option<CaseId>,
        continue_case: Option<CaseId>,
    ) -> TranspileResult {
        let start_case = self.ctx.maybe_create_case(self.arena, continue_case);
        let end_case = self.ctx.maybe_create_case(self.arena, break_case);

        self.ctx.switch_case_to(self.arena, start_case);

        let cond = self
            .arena
            .remove_first_child(node)
            .expect("while without condition");
        let cond = self
            .maybe_decompose_expression(Some(cond))?
            .expect("while condition");
        let condition = self
            .prepare_node_for_write(Some(cond))
            .expect("while condition");
        let body = self
            .arena
            .remove_first_child(node)
            .expect("while without body");
        let negated = self.arena.not(condition);
        self.arena.use_span_of(condition, negated);
        let jump_block = self
            .ctx
            .create_jump_to_block(self.arena, end_case, true, node);
        let exit_if = self.arena.if_node(negated, jump_block);
        self.arena.use_span_of(node, exit_if);
        self.ctx.write_generated_node(self.arena, exit_if);

        self.ctx.push_break_continue_context(end_case, start_case);
        let result = self.transpile_statement(body, None, None);
        self.ctx.pop_break_continue_context();
        result?;
        self.ctx.write_jump_to(self.arena, start_case, node);

        self.ctx.switch_case_to(self.arena, end_case);
        Ok(())
    }

    fn transpile_do(
        &mut self,
        node: NodeId,
        break_case: Option<CaseId>,
        continue_case: Option<CaseId>,
    ) -> TranspileResult {
        let start_case = self.ctx.create_case(self.arena);
        let break_case = self.ctx.maybe_create_case(self.arena, break_case);
        let continue_case = self.ctx.maybe_create_case(self.arena, continue_case);

        self.ctx.switch_case_to(self.arena, start_case);

        let body = self
            .arena
            .remove_first_child(node)
            .expect("do-while without body");
        self.ctx.push_break_continue_context(break_case, continue_case);
        let result = self.transpile_statement(body, None, None);
        self.ctx.pop_break_continue_context();
        result?;

        // The condition runs in its own continue case.
        self.ctx.switch_case_to(self.arena, continue_case);
        let cond = self.arena.remove_first_child(node);
        let cond = self.maybe_decompose_expression(cond)?.expect("do condition");
        let condition = self
            .prepare_node_for_write(Some(cond))
            .expect("do condition");
        let jump_block = self
            .ctx
            .create_jump_to_block(self.arena, start_case, false, node);
        let loop_if = self.arena.if_node(condition, jump_block);
        self.arena.use_span_of(node, loop_if);
        self.ctx.write_generated_node(self.arena, loop_if);
        self.ctx.switch_case_to(self.arena, break_case);
        Ok(())
    }

    fn transpile_try(&mut self, node: NodeId, break_case: Option<CaseId>) -> TranspileResult {
        let try_block = self
            .arena
            .remove_first_child(node)
            .expect("try without body");
        let catch_holder = self
            .arena
            .remove_first_child(node)
            .expect("try without catch holder");
        let finally_block = self.arena.remove_first_child(node);

        let catch_case = if self.arena.has_children(catch_holder) {
            Some(self.ctx.create_case(self.arena))
        } else {
            None
        };
        let finally_case = finally_block.map(|_| self.ctx.create_case(self.arena));
        let end_case = self.ctx.maybe_create_case(self.arena, break_case);

        self.ctx
            .enter_try_block(self.arena, catch_case, finally_case, try_block);
        self.transpile_statement(try_block, None, None)?;

        match finally_block {
            None => {
                self.ctx
                    .leave_try_block(self.arena, catch_case, end_case, try_block);
            }
            Some(finally_block) => {
                let finally_case = finally_case.expect("finally case");
                self.ctx.switch_case_to(self.arena, finally_case);
                self.ctx.enter_finally_block(
                    self.arena,
                    catch_case,
                    Some(finally_case),
                    finally_block,
                );
                self.transpile_statement(finally_block, None, None)?;
                self.ctx
                    .leave_finally_block(self.arena, end_case, finally_block);
            }
        }

        if self.arena.has_children(catch_holder) {
            let catch = self
                .arena
                .first_child(catch_holder)
                .expect("catch holder without catch");
            assert_eq!(self.arena.kind(catch), NodeKind::Catch);

            self.ctx
                .switch_case_to(self.arena, catch_case.expect("catch case"));
            let exception_name = self
                .arena
                .remove_first_child(catch)
                .expect("catch without parameter");
            self.ctx
                .enter_catch_block(self.arena, finally_case, exception_name);

            let catch_body = self
                .arena
                .remove_first_child(catch)
                .expect("catch without body");
            assert!(self.arena.is_block(catch_body));
            self.transpile_statement(catch_body, None, None)?;
            self.ctx
                .leave_catch_block(self.arena, finally_case, catch_body);
        }

        self.ctx.switch_case_to(self.arena, end_case);
        Ok(())
    }

    fn transpile_switch(&mut self, node: NodeId, break_case: Option<CaseId>) -> TranspileResult {
        // Transpile the scrutinee first.
        let discriminant = self
            .arena
            .remove_first_child(node)
            .expect("switch without scrutinee");
        let discriminant = self
            .maybe_decompose_expression(Some(discriminant))?
            .expect("switch scrutinee");
        self.arena.add_child_to_front(node, discriminant);

        let sections = self.arena.children_vec(node)[1..].to_vec();
        let has_marker = sections.iter().any(|&s| self.arena.is_marked(s));
        if !has_marker {
            self.arena.set_marker(node, false);
            self.transpile_unmarked_node(node);
            return Ok(());
        }

        // Ask the oracle about every section before any body is replaced
        // with a jump stub: fall-through facts must come from the original
        // bodies, and a stub ends in a return.
        let sole_entry: Vec<bool> = sections
            .iter()
            .map(|&section| cfg::case_body_sole_entry(self.arena, node, section))
            .collect();

        // A detached body and the generated case it will be lowered under.
        struct DetachedCase {
            generated_case: CaseId,
            body: NodeId,
        }
        let mut detached_cases: Vec<DetachedCase> = Vec::new();

        // Unmarked case sections at the beginning of the switch can stay.
        let mut can_skip_unmarked = true;
        for (index, &section) in sections.iter().enumerate() {
            if self.arena.kind(section) == NodeKind::Case {
                let label = self.arena.first_child(section).expect("case without label");
                if self.arena.is_marked(label) {
                    let span = self.arena.span(node);
                    self.diagnostics.error(
                        span,
                        "Cannot convert yet: Case statements that contain yields",
                        codes::CANNOT_CONVERT_YET,
                    );
                    return Err(Abort);
                }
            }
            let body = self
                .arena
                .last_child(section)
                .expect("switch section without body");

            if !self.arena.has_children(body)
                || (can_skip_unmarked && !self.arena.is_marked(body))
            {
                continue;
            }
            can_skip_unmarked = false;

            // An unmarked body whose only entry is its own label can stay.
            if !self.arena.is_marked(body)
                && !self.options.detach_all_switch_cases
                && sole_entry[index]
            {
                can_skip_unmarked = true;
                continue;
            }

            // Move the body under a generated case, leaving a jump behind.
            let generated_case = self.ctx.create_case(self.arena);
            let jump = self
                .ctx
                .create_jump_to_node(self.arena, generated_case, body);
            let new_body = self.arena.block_of(vec![jump]);
            self.arena.use_span_of(body, new_body);
            self.arena.set_added_block(new_body, true);
            // The generated jump must not be re-transpiled.
            self.arena.set_generator_safe(new_body, true);
            self.arena.replace_with(body, new_body);
            detached_cases.push(DetachedCase {
                generated_case,
                body,
            });
            self.arena.set_marker(section, false);
        }

        let end_case = self.ctx.maybe_create_case(self.arena, break_case);

        // Transpile the bare bones of the original switch.
        self.arena.set_marker(node, false);
        self.transpile_unmarked_node(node);
        self.ctx.write_jump_to(self.arena, end_case, node);

        // Transpile the detached case bodies.
        self.ctx.push_break_context(end_case);
        for detached in detached_cases {
            self.ctx.switch_case_to(self.arena, detached.generated_case);
            let result = self.transpile_statement(detached.body, None, None);
            if result.is_err() {
                self.ctx.pop_break_context();
                return result;
            }
        }
        self.ctx.pop_break_context();

        self.ctx.switch_case_to(self.arena, end_case);
        Ok(())
    }
}

// =============================================================================
// Transpilation context
// =============================================================================

/// Handle into the context's case arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CaseId(usize);

/// A case section in the switch block of a generator program.
struct CaseData {
    /// The address of this case.
    id: i64,
    case_node: NodeId,
    case_block: NodeId,
    /// Number literals elsewhere in the program that refer to this case.
    /// Rewritten in place when cases merge.
    references: Vec<NodeId>,
    /// Set when this case is a simple jump or an empty fall-through; points
    /// to the target case.
    jump_to: Option<CaseId>,
    /// A jump block whose contents this case's body may replace, when the
    /// case is referenced exactly once and does not fall through.
    embed_into: Option<NodeId>,
    may_fall_through: bool,
}

/// A catch handler together with the number of finally blocks that run
/// before an exception can reach it.
struct CatchCase {
    catch_case: CaseId,
    finally_blocks: u32,
}

/// The break and continue cases associated with a label name.
#[derive(Clone, Copy)]
struct LabelCases {
    break_case: CaseId,
    continue_case: Option<CaseId>,
}

/// State machine context used while transpiling one generator function.
struct TranspilationContext {
    cases: Vec<CaseData>,
    /// Case sections in the order they will appear in the program.
    all_cases: Vec<CaseId>,
    /// A virtual case (address 0) that marks the end of the program. Never
    /// emitted into the switch.
    program_end_case: CaseId,
    /// The case currently being populated.
    current_case: CaseId,
    case_id_counter: i64,

    named_labels: FxHashMap<String, LabelCases>,
    break_cases: Vec<CaseId>,
    continue_cases: Vec<CaseId>,
    catch_cases: Vec<CatchCase>,
    finally_cases: Vec<CaseId>,
    /// Catch parameter names already hoisted as program-level vars.
    catch_names: FxHashSet<String>,
    nested_finally_block_count: u32,

    this_reference_found: bool,
    arguments_reference_found: bool,

    nesting_level: u32,
    /// Spans of synthesized cases come from here.
    source_node: NodeId,
    /// The replacement body holding the `return createGenerator(…)`; hoisted
    /// vars are inserted before its last child.
    new_generator_body: NodeId,
}

impl TranspilationContext {
    fn new(arena: &mut AstArena, source_node: NodeId, nesting_level: u32) -> TranspilationContext {
        let mut ctx = TranspilationContext {
            cases: Vec::new(),
            all_cases: Vec::new(),
            program_end_case: CaseId(0),
            current_case: CaseId(0),
            case_id_counter: 1,
            named_labels: FxHashMap::default(),
            break_cases: Vec::new(),
            continue_cases: Vec::new(),
            catch_cases: Vec::new(),
            finally_cases: Vec::new(),
            catch_names: FxHashSet::default(),
            nested_finally_block_count: 0,
            this_reference_found: false,
            arguments_reference_found: false,
            nesting_level,
            source_node,
            new_generator_body: NodeId::NONE,
        };
        ctx.program_end_case = ctx.alloc_case(arena, 0);
        let entry = ctx.alloc_case(arena, 1);
        ctx.all_cases.push(entry);
        ctx.current_case = entry;
        ctx
    }

    fn alloc_case(&mut self, arena: &mut AstArena, id: i64) -> CaseId {
        let number = arena.number_lit(id as f64);
        let block = arena.block();
        let case_node = arena.new_node(NodeKind::Case);
        arena.use_span_of(self.source_node, case_node);
        arena.use_span_of(self.source_node, block);
        arena.add_child_to_back(case_node, number);
        arena.add_child_to_back(case_node, block);
        let case_id = CaseId(self.cases.len());
        self.cases.push(CaseData {
            id,
            case_node,
            case_block: block,
            references: Vec::new(),
            jump_to: None,
            embed_into: None,
            may_fall_through: true,
        });
        case_id
    }

    fn case(&self, id: CaseId) -> &CaseData {
        &self.cases[id.0]
    }

    fn case_mut(&mut self, id: CaseId) -> &mut CaseData {
        &mut self.cases[id.0]
    }

    /// Creates a new detached case section with a fresh address.
    fn create_case(&mut self, arena: &mut AstArena) -> CaseId {
        self.case_id_counter += 1;
        let id = self.case_id_counter;
        self.alloc_case(arena, id)
    }

    fn maybe_create_case(&mut self, arena: &mut AstArena, other: Option<CaseId>) -> CaseId {
        match other {
            Some(case) => case,
            None => self.create_case(arena),
        }
    }

    /// `name`, suffixed with the generator nesting level when nested.
    fn scoped_text(&self, name: &str) -> String {
        if self.nesting_level == 0 {
            name.to_string()
        } else {
            format!("{}${}", name, self.nesting_level)
        }
    }

    fn js_context_name_node(&mut self, arena: &mut AstArena, source: NodeId) -> NodeId {
        let text = self.scoped_text(GENERATOR_CONTEXT);
        let name = arena.name(&text);
        arena.use_span_of(source, name)
    }

    fn get_context_field(&mut self, arena: &mut AstArena, source: NodeId, field: &str) -> NodeId {
        let context = self.js_context_name_node(arena, source);
        let access = arena.getprop(context, field);
        arena.use_span_of(source, access)
    }

    fn call_context_method(
        &mut self,
        arena: &mut AstArena,
        source: NodeId,
        method: &str,
        args: Vec<NodeId>,
    ) -> NodeId {
        let callee = self.get_context_field(arena, source, method);
        let call = arena.call(callee, args);
        arena.use_span_of(source, call)
    }

    fn call_context_method_result(
        &mut self,
        arena: &mut AstArena,
        source: NodeId,
        method: &str,
        args: Vec<NodeId>,
    ) -> NodeId {
        let call = self.call_context_method(arena, source, method, args);
        let statement = arena.expr_result(call);
        arena.use_span_of(source, statement)
    }

    fn return_context_method(
        &mut self,
        arena: &mut AstArena,
        source: NodeId,
        method: &str,
        args: Vec<NodeId>,
    ) -> NodeId {
        let call = self.call_context_method(arena, source, method, args);
        let statement = arena.return_node(Some(call));
        arena.use_span_of(source, statement)
    }

    /// A number literal naming `section`'s address, registered as a
    /// reference so the collapse pass can rewrite it. Jump chains are
    /// resolved to their terminal case up front.
    fn case_number(&mut self, arena: &mut AstArena, section: CaseId, source: NodeId) -> NodeId {
        let mut target = section;
        while let Some(next) = self.case(target).jump_to {
            target = next;
        }
        let number = arena.number_lit(self.case(target).id as f64);
        arena.use_span_of(source, number);
        self.case_mut(target).references.push(number);
        number
    }

    /// `return $context.jumpTo(id);`
    fn create_jump_to_node(
        &mut self,
        arena: &mut AstArena,
        section: CaseId,
        source: NodeId,
    ) -> NodeId {
        let number = self.case_number(arena, section, source);
        self.return_context_method(arena, source, "jumpTo", vec![number])
    }

    /// Ends the current case with a jump to `section`.
    fn write_jump_to(&mut self, arena: &mut AstArena, section: CaseId, source: NodeId) {
        let jump_block = self.create_jump_to_block(arena, section, false, source);
        let current = self.current_case;
        self.case_jump_to(arena, current, section, jump_block);
    }

    /// A block holding `$context.jumpTo(id); break;`. With `allow_embedding`,
    /// the target section may later be inlined into this block.
    fn create_jump_to_block(
        &mut self,
        arena: &mut AstArena,
        section: CaseId,
        allow_embedding: bool,
        source: NodeId,
    ) -> NodeId {
        assert!(self.case(section).embed_into.is_none());
        let number = self.case_number(arena, section, source);
        let call = self.call_context_method_result(arena, source, "jumpTo", vec![number]);
        let break_node = arena.break_node();
        arena.use_span_of(source, break_node);
        let block = arena.block_of(vec![call, break_node]);
        arena.use_span_of(source, block);
        if allow_embedding {
            self.case_mut(section).embed_into = Some(block);
        }
        block
    }

    /// Finalizes `case_id` with the contents of `jump_block`; no more nodes
    /// can be written into it afterwards.
    fn case_jump_to(
        &mut self,
        arena: &mut AstArena,
        case_id: CaseId,
        other: CaseId,
        jump_block: NodeId,
    ) {
        assert!(arena.is_block(jump_block));
        assert!(self.case(case_id).jump_to.is_none());
        self.will_follow_by(arena, case_id, other);
        let children = arena.remove_children(jump_block);
        let case_block = self.case(case_id).case_block;
        arena.add_children_to_back(case_block, children);
        self.case_mut(case_id).may_fall_through = false;
    }

    /// Records that `other` executes right after `case_id`, marking empty
    /// cases as pure jump hops for the collapse pass.
    fn will_follow_by(&mut self, arena: &AstArena, case_id: CaseId, other: CaseId) {
        if self.case(case_id).jump_to.is_none() && !arena.has_children(self.case(case_id).case_block)
        {
            assert!(self.case(other).jump_to.is_none());
            self.case_mut(case_id).jump_to = Some(other);
        }
    }

    /// Converts a `break`/`continue` into a state machine jump.
    fn replace_break_continue_with_jump(
        &mut self,
        arena: &mut AstArena,
        source_node: NodeId,
        section: CaseId,
        break_suppressors: u32,
    ) {
        let jump_method = match self.finally_cases.last() {
            // No finally blocks to run before the jump.
            None => "jumpTo",
            Some(&innermost) if self.case(innermost).id < self.case(section).id => "jumpTo",
            Some(&innermost) => {
                assert!(self.case(innermost).id != self.case(section).id);
                "jumpThroughFinallyBlocks"
            }
        };
        let number = self.case_number(arena, section, source_node);
        if break_suppressors == 0 {
            // break;  =>  $context.jumpTo(x); break;
            let call = self.call_context_method_result(arena, source_node, jump_method, vec![number]);
            let parent = arena.parent(source_node);
            arena.add_child_before(parent, source_node, call);
            let break_node = arena.break_node();
            arena.use_span_of(source_node, break_node);
            arena.replace_with(source_node, break_node);
        } else {
            // Inside a loop or switch a bare `break` would address that
            // construct, so a `return` advances the state machine instead.
            let return_jump = self.return_context_method(arena, source_node, jump_method, vec![number]);
            arena.replace_with(source_node, return_jump);
        }
    }

    /// `return $context.yield(expr, nextId);`
    fn do_yield(
        &mut self,
        arena: &mut AstArena,
        expression: Option<NodeId>,
        jump_to_section: CaseId,
        source: NodeId,
    ) {
        let expression = expression.unwrap_or_else(|| {
            let undefined = arena.name("undefined");
            arena.use_span_of(source, undefined)
        });
        let number = self.case_number(arena, jump_to_section, source);
        let statement = self.return_context_method(arena, source, "yield", vec![expression, number]);
        self.write_generated_node(arena, statement);
        self.case_mut(self.current_case).may_fall_through = false;
    }

    /// `return $context.yieldAll(expr, nextId);`
    fn yield_all(
        &mut self,
        arena: &mut AstArena,
        expression: NodeId,
        jump_to_section: CaseId,
        source: NodeId,
    ) {
        let number = self.case_number(arena, jump_to_section, source);
        let statement =
            self.return_context_method(arena, source, "yieldAll", vec![expression, number]);
        self.write_generated_node(arena, statement);
        self.case_mut(self.current_case).may_fall_through = false;
    }

    /// `$context.return(expr)`
    fn return_expression(
        &mut self,
        arena: &mut AstArena,
        source: NodeId,
        expression: Option<NodeId>,
    ) -> NodeId {
        let expression = expression.unwrap_or_else(|| {
            let undefined = arena.name("undefined");
            arena.use_span_of(source, undefined)
        });
        self.call_context_method(arena, expression, "return", vec![expression])
    }

    /// `$context.yieldResult`
    fn yield_result(&mut self, arena: &mut AstArena, source: NodeId) -> NodeId {
        self.get_context_field(arena, source, "yieldResult")
    }

    // =========================================================================
    // Try/catch/finally bookkeeping
    // =========================================================================

    fn add_catch_finally_cases(&mut self, catch_case: Option<CaseId>, finally_case: Option<CaseId>) {
        if let Some(finally_case) = finally_case {
            if let Some(innermost_catch) = self.catch_cases.last_mut() {
                innermost_catch.finally_blocks += 1;
            }
            self.finally_cases.push(finally_case);
        }
        if let Some(catch_case) = catch_case {
            self.catch_cases.push(CatchCase {
                catch_case,
                finally_blocks: 0,
            });
        }
    }

    /// The next catch block that is not hidden behind finally blocks.
    fn get_next_catch_case(&self) -> Option<CaseId> {
        self.catch_cases
            .last()
            .filter(|catch| catch.finally_blocks == 0)
            .map(|catch| catch.catch_case)
    }

    fn get_next_finally_case(&self) -> Option<CaseId> {
        self.finally_cases.last().copied()
    }

    fn remove_catch_finally_cases(
        &mut self,
        catch_case: Option<CaseId>,
        finally_case: Option<CaseId>,
    ) {
        if let Some(catch_case) = catch_case {
            let innermost = self.catch_cases.pop().expect("catch stack underflow");
            assert_eq!(innermost.finally_blocks, 0);
            assert_eq!(innermost.catch_case, catch_case);
        }
        if let Some(finally_case) = finally_case {
            if let Some(innermost_catch) = self.catch_cases.last_mut() {
                assert!(innermost_catch.finally_blocks > 0);
                innermost_catch.finally_blocks -= 1;
            }
            let innermost = self.finally_cases.pop().expect("finally stack underflow");
            assert_eq!(innermost, finally_case);
        }
    }

    /// The statement at the top of a try body installing its handlers.
    fn enter_try_block(
        &mut self,
        arena: &mut AstArena,
        catch_case: Option<CaseId>,
        finally_case: Option<CaseId>,
        source: NodeId,
    ) {
        self.add_catch_finally_cases(catch_case, finally_case);

        let (method, args) = match catch_case {
            None => {
                let finally_case = finally_case.expect("try without catch or finally");
                let number = self.case_number(arena, finally_case, source);
                ("setFinallyBlock", vec![number])
            }
            Some(catch_case) => {
                let mut args = vec![self.case_number(arena, catch_case, source)];
                if let Some(finally_case) = finally_case {
                    args.push(self.case_number(arena, finally_case, source));
                }
                ("setCatchFinallyBlocks", args)
            }
        };
        let statement = self.call_context_method_result(arena, source, method, args);
        self.write_generated_node(arena, statement);
    }

    /// The statements at the end of a try body when no finally exists.
    fn leave_try_block(
        &mut self,
        arena: &mut AstArena,
        catch_case: Option<CaseId>,
        end_case: CaseId,
        source: NodeId,
    ) {
        self.remove_catch_finally_cases(catch_case, None);
        let mut args = vec![self.case_number(arena, end_case, source)];
        if let Some(next_catch) = self.get_next_catch_case() {
            args.push(self.case_number(arena, next_catch, source));
        }
        let statement = self.call_context_method_result(arena, source, "leaveTryBlock", args);
        self.write_generated_node(arena, statement);
        let break_node = arena.break_node();
        arena.use_span_of(source, break_node);
        self.write_generated_node(arena, break_node);
        self.case_mut(self.current_case).may_fall_through = false;
    }

    /// `name = $context.enterCatchBlock([nextCatchId]);`, hoisting the catch
    /// parameter at most once per name.
    fn enter_catch_block(
        &mut self,
        arena: &mut AstArena,
        finally_case: Option<CaseId>,
        exception_name: NodeId,
    ) {
        assert!(arena.is_name(exception_name));
        self.add_catch_finally_cases(None, finally_case);

        let next_catch = self.get_next_catch_case();

        if self.catch_names.insert(arena.text(exception_name).to_string()) {
            let declarator = arena.clone_node(exception_name);
            let var = arena.var_of(declarator);
            arena.use_span_of(exception_name, var);
            let body = self.new_generator_body;
            let last = arena.last_child(body).expect("empty generator body");
            arena.add_child_before(body, last, var);
        }

        let mut args = Vec::new();
        if let Some(next_catch) = next_catch {
            args.push(self.case_number(arena, next_catch, exception_name));
        }
        let call = self.call_context_method(arena, exception_name, "enterCatchBlock", args);
        let assign = arena.assign(exception_name, call);
        arena.use_span_of(exception_name, assign);
        let statement = arena.expr_result(assign);
        arena.use_span_of(exception_name, statement);
        self.write_generated_node(arena, statement);
    }

    /// Jumps to the finally block when one exists.
    fn leave_catch_block(
        &mut self,
        arena: &mut AstArena,
        finally_case: Option<CaseId>,
        source: NodeId,
    ) {
        if let Some(finally_case) = finally_case {
            self.remove_catch_finally_cases(None, Some(finally_case));
            self.write_jump_to(arena, finally_case, source);
        }
    }

    /// `$context.enterFinallyBlock(…);` with an arity that depends on
    /// whether this finally is nested inside another one.
    fn enter_finally_block(
        &mut self,
        arena: &mut AstArena,
        catch_case: Option<CaseId>,
        finally_case: Option<CaseId>,
        source: NodeId,
    ) {
        self.remove_catch_finally_cases(catch_case, finally_case);

        let next_catch = self.get_next_catch_case();
        let next_finally = self.get_next_finally_case();

        let mut args = Vec::new();
        if self.nested_finally_block_count == 0 {
            if next_catch.is_some() || next_finally.is_some() {
                args.push(match next_catch {
                    None => {
                        let zero = arena.number_lit(0.0);
                        arena.use_span_of(source, zero)
                    }
                    Some(next_catch) => self.case_number(arena, next_catch, source),
                });
                if let Some(next_finally) = next_finally {
                    args.push(self.case_number(arena, next_finally, source));
                }
            }
        } else {
            args.push(match next_catch {
                None => {
                    let zero = arena.number_lit(0.0);
                    arena.use_span_of(source, zero)
                }
                Some(next_catch) => self.case_number(arena, next_catch, source),
            });
            args.push(match next_finally {
                None => {
                    let zero = arena.number_lit(0.0);
                    arena.use_span_of(source, zero)
                }
                Some(next_finally) => self.case_number(arena, next_finally, source),
            });
            let depth = arena.number_lit(self.nested_finally_block_count as f64);
            arena.use_span_of(source, depth);
            args.push(depth);
        }

        let statement = self.call_context_method_result(arena, source, "enterFinallyBlock", args);
        self.write_generated_node(arena, statement);
        self.nested_finally_block_count += 1;
    }

    /// `$context.leaveFinallyBlock(endId[, depth]); break;`
    fn leave_finally_block(&mut self, arena: &mut AstArena, end_case: CaseId, source: NodeId) {
        let mut args = vec![self.case_number(arena, end_case, source)];
        self.nested_finally_block_count -= 1;
        if self.nested_finally_block_count != 0 {
            let depth = arena.number_lit(self.nested_finally_block_count as f64);
            arena.use_span_of(source, depth);
            args.push(depth);
        }
        let statement = self.call_context_method_result(arena, source, "leaveFinallyBlock", args);
        self.write_generated_node(arena, statement);
        let break_node = arena.break_node();
        arena.use_span_of(source, break_node);
        self.write_generated_node(arena, break_node);
        self.case_mut(self.current_case).may_fall_through = false;
    }

    // =========================================================================
    // Case and stack management
    // =========================================================================

    /// Makes `case_section` the current case.
    fn switch_case_to(&mut self, arena: &mut AstArena, case_section: CaseId) {
        let current = self.current_case;
        self.will_follow_by(arena, current, case_section);
        self.all_cases.push(case_section);
        self.current_case = case_section;
    }

    fn push_labels(
        &mut self,
        arena: &AstArena,
        label_names: &[NodeId],
        break_case: CaseId,
        continue_case: Option<CaseId>,
    ) {
        for &label_name in label_names {
            assert_eq!(arena.kind(label_name), NodeKind::LabelName);
            self.named_labels.insert(
                arena.text(label_name).to_string(),
                LabelCases {
                    break_case,
                    continue_case,
                },
            );
        }
    }

    fn pop_labels(&mut self, arena: &AstArena, label_names: &[NodeId]) {
        for &label_name in label_names {
            assert_eq!(arena.kind(label_name), NodeKind::LabelName);
            self.named_labels.remove(arena.text(label_name));
        }
    }

    fn push_break_context(&mut self, break_case: CaseId) {
        self.break_cases.push(break_case);
    }

    fn push_break_continue_context(&mut self, break_case: CaseId, continue_case: CaseId) {
        self.push_break_context(break_case);
        self.continue_cases.push(continue_case);
    }

    fn pop_break_context(&mut self) {
        self.break_cases.pop();
    }

    fn pop_break_continue_context(&mut self) {
        self.pop_break_context();
        self.continue_cases.pop();
    }

    /// Appends a generated statement to the current case.
    fn write_generated_node(&mut self, arena: &mut AstArena, node: NodeId) {
        assert!(
            self.case(self.current_case).jump_to.is_none(),
            "writing into a finalized case"
        );
        assert!(arena.kind(node).may_be_statement());
        let case_block = self.case(self.current_case).case_block;
        arena.add_child_to_back(case_block, node);
    }

    /// Fixes up and writes a block of original (yield-free) code.
    fn transpile_unmarked_block(&mut self, arena: &mut AstArena, block: NodeId) {
        if arena.has_children(block) {
            self.fix_unmarked(arena, block);
            while let Some(child) = arena.remove_first_child(block) {
                self.write_generated_node(arena, child);
            }
        }
    }

    // =========================================================================
    // Collapse and finalization
    // =========================================================================

    /// Removes unnecessary cases: shortcut jump chains, then merge adjacent
    /// cases. This keeps the emitted state machine program short.
    fn optimize_case_ids(&mut self, arena: &mut AstArena) {
        assert!(!self.all_cases.is_empty());

        // Flatten jump chains: 1 -> 2, 2 -> 8, 8 -> 300 becomes 1 -> 300,
        // and every reference is rewritten to the terminal address.
        for index in 0..self.all_cases.len() {
            let case_id = self.all_cases[index];
            if self.case(case_id).jump_to.is_none() {
                continue;
            }
            let mut terminal = self.case(case_id).jump_to.unwrap();
            while let Some(next) = self.case(terminal).jump_to {
                terminal = next;
            }
            self.case_mut(case_id).jump_to = Some(terminal);

            let embed_into = self.case(case_id).embed_into;
            if embed_into.is_some() && self.case(case_id).references.len() == 1 {
                self.case_mut(terminal).embed_into = embed_into;
            }
            self.case_mut(case_id).embed_into = None;

            let references = std::mem::take(&mut self.case_mut(case_id).references);
            let terminal_id = self.case(terminal).id;
            for &reference in &references {
                arena.set_number(reference, terminal_id as f64);
            }
            self.case_mut(terminal).references.extend(references);
        }

        // Merge cases that are no longer jump targets into their
        // predecessors.
        let all = std::mem::take(&mut self.all_cases);
        let mut surviving: Vec<CaseId> = Vec::with_capacity(all.len());
        let mut previous = all[0];
        assert_eq!(self.case(previous).id, 1);
        surviving.push(previous);
        for &current in &all[1..] {
            if self.case(current).references.is_empty() {
                // Not a jump target; append the body to the previous case if
                // it can be reached by falling through, drop it otherwise.
                assert!(self.case(current).embed_into.is_none());
                if self.case(previous).may_fall_through {
                    let children = arena.remove_children(self.case(current).case_block);
                    arena.add_children_to_back(self.case(previous).case_block, children);
                    let falls = self.case(current).may_fall_through;
                    self.case_mut(previous).may_fall_through = falls;
                }
                continue;
            }
            if self.case(current).embed_into.is_some() {
                assert!(self.case(current).jump_to.is_none());
                // Embeddable only when referenced once and not fallen into.
                if self.case(current).references.len() == 1 && !self.case(current).may_fall_through
                {
                    let embed_target = self.case(current).embed_into.unwrap();
                    let body = self.case(current).case_block;
                    arena.detach(body);
                    arena.replace_with(embed_target, body);
                    continue;
                }
            }
            if self.case(previous).jump_to == Some(current) {
                // An empty fall-through predecessor adopts this case's body.
                // The entry case cannot be renamed, so references move to the
                // predecessor's id instead.
                assert!(self.case(previous).may_fall_through);
                assert!(!arena.has_children(self.case(previous).case_block));
                assert!(self.case(current).jump_to.is_none());

                let children = arena.remove_children(self.case(current).case_block);
                arena.add_children_to_back(self.case(previous).case_block, children);
                let falls = self.case(current).may_fall_through;
                self.case_mut(previous).may_fall_through = falls;
                let previous_id = self.case(previous).id;
                let references = std::mem::take(&mut self.case_mut(current).references);
                for &reference in &references {
                    arena.set_number(reference, previous_id as f64);
                }
                self.case_mut(previous).jump_to = None;
                self.case_mut(previous).references.extend(references);
                continue;
            }
            surviving.push(current);
            previous = current;
        }
        self.all_cases = surviving;
    }

    /// Dumps the surviving cases into the switch.
    fn finalize(&mut self, arena: &mut AstArena, switch_node: NodeId) {
        self.optimize_case_ids(arena);
        for index in 0..self.all_cases.len() {
            let case_node = self.case(self.all_cases[index]).case_node;
            arena.add_child_to_back(switch_node, case_node);
        }
        self.all_cases.clear();
    }

    /// Every scoped acquisition must have been released.
    fn check_state_is_empty(&self) {
        assert!(self.named_labels.is_empty());
        assert!(self.break_cases.is_empty());
        assert!(self.continue_cases.is_empty());
        assert!(self.catch_cases.is_empty());
        assert!(self.finally_cases.is_empty());
        assert_eq!(self.nested_finally_block_count, 0);
    }

    /// Restores the invariant state after a diagnostic abort.
    fn reset_scratch(&mut self) {
        self.named_labels.clear();
        self.break_cases.clear();
        self.continue_cases.clear();
        self.catch_cases.clear();
        self.finally_cases.clear();
        self.nested_finally_block_count = 0;
    }

    // =========================================================================
    // Unmarked-subtree fixer
    // =========================================================================

    /// Adjusts yield-free code to run correctly inside the state machine
    /// program: hoists `var`s, rewrites `return`/`break`/`continue`, and
    /// replaces `this` and `arguments` with hoisted aliases.
    fn fix_unmarked(&mut self, arena: &mut AstArena, node: NodeId) {
        let mut break_suppressors = 0u32;
        let mut continue_suppressors = 0u32;
        self.fix_walk(arena, node, &mut break_suppressors, &mut continue_suppressors);
    }

    fn fix_walk(
        &mut self,
        arena: &mut AstArena,
        node: NodeId,
        break_suppressors: &mut u32,
        continue_suppressors: &mut u32,
    ) {
        if arena.is_generator_safe(node) {
            // A subtree this pass generated; skip it exactly once.
            arena.set_generator_safe(node, false);
            return;
        }
        assert!(!arena.is_marked(node), "marked node in an unmarked subtree");

        let kind = arena.kind(node);
        let is_loop = kind.is_loop_structure();
        let is_switch = kind == NodeKind::Switch;
        if is_loop {
            *continue_suppressors += 1;
            *break_suppressors += 1;
        } else if is_switch {
            *break_suppressors += 1;
        }

        if kind == NodeKind::Break || kind == NodeKind::Continue {
            if arena.has_children(node) {
                self.visit_named_break_continue(arena, node, *break_suppressors);
            } else {
                self.visit_break_continue(arena, node, *break_suppressors, *continue_suppressors);
            }
            return;
        }
        if kind == NodeKind::Function {
            return;
        }

        for child in arena.children_vec(node) {
            self.fix_walk(arena, child, break_suppressors, continue_suppressors);
        }

        if is_loop {
            *continue_suppressors -= 1;
            *break_suppressors -= 1;
        } else if is_switch {
            *break_suppressors -= 1;
        } else if kind == NodeKind::This {
            self.visit_this(arena, node);
        } else if kind == NodeKind::Return {
            self.visit_return(arena, node);
        } else if kind == NodeKind::Name && arena.text(node) == "arguments" {
            self.visit_arguments(arena, node);
        } else if kind == NodeKind::Var {
            // Leave the init clause of `for (var i = 0;;)` in place.
            let parent = arena.parent(node);
            let in_for_head = parent.is_some()
                && matches!(arena.kind(parent), NodeKind::For | NodeKind::ForIn)
                && arena.first_child(parent) == Some(node);
            if !in_for_head {
                self.visit_var(arena, node);
            }
        }
    }

    /// `return …;`  =>  `return $context.return(…);`
    fn visit_return(&mut self, arena: &mut AstArena, node: NodeId) {
        let expression = arena.remove_first_child(node);
        let expression = match expression {
            Some(expression) => expression,
            None => {
                let undefined = arena.name("undefined");
                arena.use_span_of(node, undefined)
            }
        };
        let call = self.call_context_method(arena, expression, "return", vec![expression]);
        arena.add_child_to_front(node, call);
    }

    /// Converts a labeled `break`/`continue` into a jump when its label is
    /// registered on the context.
    fn visit_named_break_continue(
        &mut self,
        arena: &mut AstArena,
        node: NodeId,
        break_suppressors: u32,
    ) {
        let label = arena.first_child(node).expect("break without label");
        assert_eq!(arena.kind(label), NodeKind::LabelName);
        let Some(cases) = self.named_labels.get(arena.text(label)).copied() else {
            return;
        };
        let section = if arena.kind(node) == NodeKind::Break {
            cases.break_case
        } else {
            cases.continue_case.expect("continue to a non-loop label")
        };
        self.replace_break_continue_with_jump(arena, node, section, break_suppressors);
    }

    /// Converts a bare `break`/`continue` escaping the current case into a
    /// jump.
    fn visit_break_continue(
        &mut self,
        arena: &mut AstArena,
        node: NodeId,
        break_suppressors: u32,
        continue_suppressors: u32,
    ) {
        let mut section = None;
        if arena.kind(node) == NodeKind::Break && break_suppressors == 0 {
            section = self.break_cases.last().copied();
        }
        if arena.kind(node) == NodeKind::Continue && continue_suppressors == 0 {
            section = self.continue_cases.last().copied();
        }
        if let Some(section) = section {
            self.replace_break_continue_with_jump(arena, node, section, break_suppressors);
        }
    }

    /// Replaces `this` with a hoisted `$jscomp$generator$this` alias.
    fn visit_this(&mut self, arena: &mut AstArena, node: NodeId) {
        let text = self.scoped_text(GENERATOR_THIS);
        let alias = arena.name(&text);
        arena.use_span_of(node, alias);
        arena.replace_with(node, alias);
        if !self.this_reference_found {
            let declarator = arena.clone_node(alias);
            arena.add_child_to_back(declarator, node);
            let var = arena.var_of(declarator);
            arena.set_jsdoc(
                var,
                Some(JsDocInfo {
                    suppressions: Vec::new(),
                    constancy: true,
                }),
            );
            let body = self.new_generator_body;
            arena.use_span_of(body, var);
            let last = arena.last_child(body).expect("empty generator body");
            arena.add_child_before(body, last, var);
            self.this_reference_found = true;
        }
    }

    /// Replaces `arguments` with a hoisted `$jscomp$generator$arguments`
    /// alias.
    fn visit_arguments(&mut self, arena: &mut AstArena, node: NodeId) {
        let text = self.scoped_text(GENERATOR_ARGUMENTS);
        let alias = arena.name(&text);
        arena.use_span_of(node, alias);
        arena.replace_with(node, alias);
        if !self.arguments_reference_found {
            let declarator = arena.clone_node(alias);
            arena.add_child_to_back(declarator, node);
            let var = arena.var_of(declarator);
            arena.set_jsdoc(
                var,
                Some(JsDocInfo {
                    suppressions: Vec::new(),
                    constancy: true,
                }),
            );
            let body = self.new_generator_body;
            arena.use_span_of(body, var);
            let last = arena.last_child(body).expect("empty generator body");
            arena.add_child_before(body, last, var);
            self.arguments_reference_found = true;
        }
    }

    fn maybe_remove_const_annotation(&self, arena: &mut AstArena, node: NodeId) {
        if let Some(jsdoc) = arena.jsdoc(node) {
            if jsdoc.constancy {
                let mut fixed = jsdoc.clone();
                fixed.constancy = false;
                arena.set_jsdoc(node, Some(fixed));
            }
        }
    }

    /// Hoists a `var` statement into the closure containing the generator so
    /// its state survives re-entry:
    /// `var a = "x", b = i + 5;` becomes a hoisted `var a, b;` plus
    /// `a = "x", b = i + 5;` at the original site.
    fn visit_var(&mut self, arena: &mut AstArena, var_statement: NodeId) {
        self.maybe_remove_const_annotation(arena, var_statement);
        let mut assignments = Vec::new();
        for declarator in arena.children_vec(var_statement) {
            if arena.has_children(declarator) {
                let copied_name = arena.clone_node(declarator);
                let init = arena
                    .remove_first_child(declarator)
                    .expect("declarator without initializer");
                let assign = arena.assign(copied_name, init);
                arena.use_span_of(declarator, assign);
                // The assignment keeps any @const annotation; the hoisted
                // declaration must not carry it.
                let jsdoc = arena.jsdoc(copied_name).cloned();
                if jsdoc.is_some() {
                    arena.set_jsdoc(copied_name, None);
                    arena.set_jsdoc(assign, jsdoc);
                }
                assignments.push(assign);
            }
            self.maybe_remove_const_annotation(arena, declarator);
        }
        if assignments.is_empty() {
            arena.detach(var_statement);
        } else {
            let mut comma = assignments[0];
            for &assign in &assignments[1..] {
                let joined = arena.comma(comma, assign);
                arena.use_span_of(assign, joined);
                comma = joined;
            }
            let statement = arena.expr_result(comma);
            arena.use_span_of(var_statement, statement);
            arena.replace_with(var_statement, statement);
        }
        // The initializer-less declaration moves up next to the program
        // function definition.
        let body = self.new_generator_body;
        let last = arena.last_child(body).expect("empty generator body");
        arena.add_child_before(body, last, var_statement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserState;
    use crate::printer::print;

    fn lower(source: &str) -> (String, DiagnosticBag) {
        lower_with(source, &LoweringOptions::default())
    }

    fn lower_with(source: &str, options: &LoweringOptions) -> (String, DiagnosticBag) {
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        assert!(
            parser.diagnostics().is_empty(),
            "parse errors: {:?}",
            parser.diagnostics()
        );
        let mut diagnostics = DiagnosticBag::new();
        let mut lowering = GeneratorLowering::new(options.clone());
        lowering.process(&mut parser.arena, root, &mut diagnostics);
        (print(&parser.arena, root), diagnostics)
    }

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

    #[test]
    fn marker_propagates_to_ancestors_only() {
        let mut parser = ParserState::new("function* g() { if (a) { yield 1; } b(); }");
        let root = parser.parse_script();
        let function = parser.arena.first_child(root).unwrap();
        let body = parser.arena.last_child(function).unwrap();
        mark_yields(&mut parser.arena, body);

        let if_stmt = parser.arena.child(body, 0);
        let other_stmt = parser.arena.child(body, 1);
        assert!(parser.arena.is_marked(body));
        assert!(parser.arena.is_marked(if_stmt));
        // The condition has no yield.
        assert!(!parser.arena.is_marked(parser.arena.child(if_stmt, 0)));
        assert!(!parser.arena.is_marked(other_stmt));
        let yield_node = find_yield(&parser.arena, if_stmt).unwrap();
        assert!(parser.arena.is_marked(yield_node));
    }

    #[test]
    fn marker_does_not_cross_function_boundaries() {
        let mut parser =
            ParserState::new("function* g() { var f = function() { yield_like(); }; f(); }");
        let root = parser.parse_script();
        let function = parser.arena.first_child(root).unwrap();
        let body = parser.arena.last_child(function).unwrap();
        mark_yields(&mut parser.arena, body);
        assert!(!parser.arena.is_marked(body));

        let mut parser = ParserState::new("function* g() { var f = function*() { yield 1; }; }");
        let root = parser.parse_script();
        let function = parser.arena.first_child(root).unwrap();
        let body = parser.arena.last_child(function).unwrap();
        mark_yields(&mut parser.arena, body);
        // The inner generator hides its yield from the outer body.
        assert!(!parser.arena.is_marked(body));
    }

    #[test]
    fn lowers_two_yields_into_chained_addresses() {
        let (out, diagnostics) = lower("function* gen() { yield 1; yield 2; }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(out.contains("function gen()"));
        assert!(out.contains("$jscomp.generator.createGenerator(gen, "));
        assert!(out.contains("switch ($jscomp$generator$context.nextAddress)"));
        assert!(out.contains("do {"));
        assert!(out.contains("} while (0);"));
        assert!(out.contains("case 1:"));
        assert!(out.contains("return $jscomp$generator$context.yield(1, 2);"));
        assert!(out.contains("case 2:"));
        // The final resume address collapses straight to the program end.
        assert!(out.contains("return $jscomp$generator$context.yield(2, 0);"));
        assert!(!out.contains("function*"));
        assert!(!out.contains("yield 1"));
    }

    #[test]
    fn generated_program_carries_useless_code_suppression() {
        let (out, _) = lower("function* gen() { yield 1; }");
        assert!(out.contains("/** @suppress {uselessCode} */"));
    }

    #[test]
    fn anonymous_generator_gets_a_self_name() {
        let (out, diagnostics) = lower("var g = function*() { yield 1; };");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(out.contains("function $jscomp$generator$function()"));
        assert!(out.contains(
            "$jscomp.generator.createGenerator($jscomp$generator$function, "
        ));
    }

    #[test]
    fn return_with_yield_operand_goes_through_context_return() {
        let (out, diagnostics) = lower("function* gen(a, b) { return a + (yield b); }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        // `a` is captured before suspending.
        assert!(out.contains("var $jscomp$generator$temp$0;"));
        assert!(out.contains("$jscomp$generator$temp$0 = a;"));
        assert!(out.contains("return $jscomp$generator$context.yield(b, 2);"));
        assert!(out.contains(
            "return $jscomp$generator$context.return($jscomp$generator$temp$0 + \
             $jscomp$generator$context.yieldResult);"
        ));
        // The return makes the body end unreachable, so no jumpToEnd.
        assert!(!out.contains("jumpToEnd"));
    }

    #[test]
    fn undecomposable_yield_reports_and_aborts_cleanly() {
        let (out, diagnostics) = lower("function* gen(o) { o.p += yield 1; }");
        assert!(diagnostics.has_errors());
        let message = diagnostics.iter().next().unwrap();
        assert_eq!(message.code, codes::UNDECOMPOSABLE_EXPRESSION);
        assert!(message.message.contains("Undecomposable expression"));
        // The function was abandoned: it keeps its generator flag.
        assert!(out.contains("function* gen(o)"));
    }

    #[test]
    fn yield_in_case_label_reports_cannot_convert_yet() {
        let (_, diagnostics) =
            lower("function* gen(x) { switch (x) { case yield 1: break; } }");
        assert!(diagnostics.has_errors());
        let message = diagnostics.iter().next().unwrap();
        assert_eq!(message.code, codes::CANNOT_CONVERT_YET);
        assert!(message.message.contains("Case statements that contain yields"));
    }

    #[test]
    fn lowering_is_idempotent() {
        let source = "function* gen() { yield 1; }";
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        let mut diagnostics = DiagnosticBag::new();
        let mut lowering = GeneratorLowering::new(LoweringOptions::default());
        assert!(lowering.process(&mut parser.arena, root, &mut diagnostics));
        let first = print(&parser.arena, root);
        // A second run finds no generator functions.
        assert!(!lowering.process(&mut parser.arena, root, &mut diagnostics));
        let second = print(&parser.arena, root);
        assert_eq!(first, second);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn nested_generators_lower_innermost_first() {
        let (out, diagnostics) =
            lower("function* outer() { var inner = function*() { yield 1; }; yield inner; }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(!out.contains("function*"));
        assert!(!out.contains("yield 1;"));
        // The inner program's names carry the nesting suffix.
        assert!(out.contains("$jscomp$generator$function$1"));
        assert!(out.contains("$jscomp$generator$context$1.nextAddress"));
    }

    #[test]
    fn do_while_wrapper_can_be_disabled() {
        let options = LoweringOptions {
            wrap_switch_in_do_while: false,
            ..LoweringOptions::default()
        };
        let (out, diagnostics) = lower_with("function* gen() { yield 1; }", &options);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(!out.contains("do {"));
        assert!(out.contains("switch ($jscomp$generator$context.nextAddress)"));
    }

    #[test]
    fn forced_final_jump_survives_an_unreachable_end() {
        // The trailing return makes the body end unreachable, so the oracle
        // skips the final jump by default.
        let source = "function* gen() { yield 1; return 2; }";
        let (out, diagnostics) = lower(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(!out.contains("jumpToEnd"));

        let options = LoweringOptions {
            always_emit_final_jump: true,
            ..LoweringOptions::default()
        };
        let (out, diagnostics) = lower_with(source, &options);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(out.contains("jumpToEnd"));
    }
}
