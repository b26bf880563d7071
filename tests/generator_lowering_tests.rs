//! End-to-end tests for the generator lowering.
//!
//! Each test drives the full pipeline - parse, lower, print - and asserts on
//! the shape of the emitted state machine program.

use yieldless::{lower_program, DiagnosticBag, LoweringOptions};

fn lower(source: &str) -> String {
    let (out, diagnostics) = lower_program(source, &LoweringOptions::default());
    assert!(
        diagnostics.is_empty(),
        "unexpected diagnostics for {:?}: {:?}",
        source,
        diagnostics
    );
    out
}

fn lower_expecting_errors(source: &str) -> (String, DiagnosticBag) {
    lower_program(source, &LoweringOptions::default())
}

#[test]
fn sequential_yields_chain_their_resume_addresses() {
    let out = lower("function* gen() { yield 1; yield 2; }");

    assert!(out.contains("function gen() {"));
    assert!(out.contains("return $jscomp.generator.createGenerator(gen, "));
    assert!(out.contains("do {"));
    assert!(out.contains("switch ($jscomp$generator$context.nextAddress) {"));
    assert!(out.contains("} while (0);"));
    assert!(out.contains("case 1:"));
    assert!(out.contains("return $jscomp$generator$context.yield(1, 2);"));
    assert!(out.contains("case 2:"));
    // The last resume address collapses straight to the program end.
    assert!(out.contains("return $jscomp$generator$context.yield(2, 0);"));
    assert!(!out.contains("function*"));
    assert!(!out.contains("yield 1"));
}

#[test]
fn yield_inside_binary_expression_is_decomposed() {
    let out = lower("function* gen(a, b) { return a + (yield b); }");

    // `a` is captured into a hoisted temporary before suspending.
    assert!(out.contains("var $jscomp$generator$temp$0;"));
    assert!(out.contains("$jscomp$generator$temp$0 = a;"));
    assert!(out.contains("return $jscomp$generator$context.yield(b, 2);"));
    assert!(out.contains(
        "return $jscomp$generator$context.return($jscomp$generator$temp$0 + \
         $jscomp$generator$context.yieldResult);"
    ));
}

#[test]
fn labeled_break_across_finally_runs_the_finally_block() {
    let out = lower(
        "function* gen() { outer: for (;;) { try { yield 1; break outer; } \
         finally { yield 2; } } }",
    );

    // The try installs its finally handler and both yields survive.
    assert!(out.contains("$jscomp$generator$context.setFinallyBlock("));
    assert!(out.contains("$jscomp$generator$context.enterFinallyBlock("));
    assert!(out.contains("$jscomp$generator$context.leaveFinallyBlock("));
    assert!(out.contains("return $jscomp$generator$context.yield(1, "));
    assert!(out.contains("return $jscomp$generator$context.yield(2, "));
    // Leaving the loop from inside the try must run the finally first.
    assert!(out.contains("$jscomp$generator$context.jumpThroughFinallyBlocks("));
}

#[test]
fn for_in_iterates_through_the_context_helper() {
    let out = lower("function* gen(o) { for (var k in o) yield k; }");

    assert!(out.contains("$jscomp$generator$context.forIn(o)"));
    assert!(out.contains("$jscomp$generator$forin$"));
    assert!(out.contains(".getNext()"));
    assert!(out.contains("!= null"));
    assert!(out.contains("return $jscomp$generator$context.yield(k, "));
    // The loop variable and the iterator holder are hoisted.
    assert!(out.contains("var k, $jscomp$generator$forin$"));
    assert!(!out.contains("for (var k in o)"));
}

#[test]
fn try_catch_hoists_the_catch_parameter() {
    let out = lower("function* gen() { try { yield 1; } catch (e) { yield e; } }");

    assert!(out.contains("$jscomp$generator$context.setCatchFinallyBlocks(2);"));
    assert!(out.contains("$jscomp$generator$context.leaveTryBlock("));
    // The catch parameter becomes a program-level var and is assigned from
    // the context when the handler is entered.
    assert!(out.contains("var e;"));
    assert!(out.contains("e = $jscomp$generator$context.enterCatchBlock();"));
    assert!(out.contains("return $jscomp$generator$context.yield(1, "));
    assert!(out.contains("return $jscomp$generator$context.yield(e, "));
}

#[test]
fn switch_with_yielding_bodies_uses_jump_stubs() {
    let out = lower(
        "function* gen(x) { switch (x) { case 1: yield \"a\"; break; \
         case 2: yield \"b\"; break; } }",
    );

    // The original switch survives with its marked bodies replaced by jumps
    // into generated cases.
    assert!(out.contains("switch (x) {"));
    assert!(out.contains("return $jscomp$generator$context.jumpTo(2);"));
    assert!(out.contains("return $jscomp$generator$context.jumpTo(3);"));
    assert!(out.contains("return $jscomp$generator$context.yield(\"a\", "));
    assert!(out.contains("return $jscomp$generator$context.yield(\"b\", "));
    // The breaks inside the detached bodies jump to the address after the
    // switch (collapsed to the program end here).
    assert!(out.contains("$jscomp$generator$context.jumpTo(0);"));
}

#[test]
fn if_else_with_marked_branches_embeds_the_then_case() {
    let out = lower("function* gen(x) { if (x) { yield 1; } else { yield 2; } }");

    // Both arms collapse back into the entry case; the then-branch body is
    // embedded into the conditional jump block.
    assert!(out.contains("if (x) {"));
    assert!(out.contains("return $jscomp$generator$context.yield(1, 0);"));
    assert!(out.contains("return $jscomp$generator$context.yield(2, 0);"));
    assert!(out.contains("case 1:"));
    assert!(!out.contains("case 2:"));
}

#[test]
fn while_loop_re_tests_its_condition_each_iteration() {
    let out = lower("function* gen(n) { while (n > 0) { yield n; n = n - 1; } }");

    assert!(out.contains("if (!(n > 0)) {"));
    assert!(out.contains("return $jscomp$generator$context.yield(n, "));
    assert!(out.contains("n = n - 1;"));
    // The condition case merges into the entry case, so the loop body jumps
    // back to address 1.
    assert!(out.contains("$jscomp$generator$context.jumpTo(1);"));
}

#[test]
fn do_while_enters_the_body_before_testing() {
    let out = lower("function* gen(n) { do { yield n; } while (n); }");

    assert!(out.contains("return $jscomp$generator$context.yield(n, "));
    // The condition runs in its own case and jumps back to the body start.
    assert!(out.contains("if (n) {"));
    assert!(out.contains("$jscomp$generator$context.jumpTo("));
}

#[test]
fn yield_all_delegates_through_the_context() {
    let out = lower("function* gen(items) { yield* items; }");

    assert!(out.contains("return $jscomp$generator$context.yieldAll(items, 0);"));
    assert!(!out.contains("yield*"));
}

#[test]
fn nested_yields_resume_inside_out() {
    let out = lower("function* gen() { yield (yield 1) + 2; }");

    assert!(out.contains("return $jscomp$generator$context.yield(1, "));
    assert!(out.contains(
        "return $jscomp$generator$context.yield($jscomp$generator$context.yieldResult + 2, 0);"
    ));
}

#[test]
fn this_and_arguments_are_hoisted_once() {
    let out = lower("function* gen() { yield this.x; yield this.y; }");
    assert!(out.contains("/** @const */ var $jscomp$generator$this = this;"));
    assert_eq!(out.matches("var $jscomp$generator$this = this;").count(), 1);
    assert!(out.contains(".yield($jscomp$generator$this.x, "));
    assert!(out.contains(".yield($jscomp$generator$this.y, "));

    let out = lower("function* gen() { yield arguments[0]; }");
    assert!(out.contains("/** @const */ var $jscomp$generator$arguments = arguments;"));
    assert!(out.contains(".yield($jscomp$generator$arguments[0], "));
}

#[test]
fn vars_are_hoisted_and_assigned_in_place() {
    let out = lower("function* gen() { var a = 1, b; yield a; b = a; yield b; }");

    // The declaration moves next to the program function; the assignment
    // stays at the original site.
    assert!(out.contains("var a, b;"));
    assert!(out.contains("a = 1;"));
    assert!(out.contains("return $jscomp$generator$context.yield(a, "));
    assert!(out.contains("b = a;"));
    assert!(!out.contains("var a = 1"));
}

#[test]
fn var_with_yield_initializer_splits_the_declarator_list() {
    let out = lower("function* gen() { var a = 1, b = yield 2, c = 3; yield c; }");

    assert!(out.contains("var a;"));
    assert!(out.contains("a = 1;"));
    assert!(out.contains("return $jscomp$generator$context.yield(2, "));
    // The marked declarator resumes from yieldResult, together with the
    // following unmarked run.
    assert!(out.contains("b = $jscomp$generator$context.yieldResult, c = 3;"));
}

#[test]
fn short_circuit_yield_becomes_a_conditional() {
    let out = lower("function* gen(x) { return x || (yield x); }");

    // The truthy arm skips over the yield with a generated jump.
    assert!(out.contains("if ($jscomp$generator$temp$0 = x) {"));
    assert!(out.contains("$jscomp$generator$temp$0 = $jscomp$generator$context.yieldResult;"));
    assert!(out.contains(
        "return $jscomp$generator$context.return($jscomp$generator$temp$0);"
    ));
}

#[test]
fn unmarked_statements_are_copied_verbatim() {
    let out = lower(
        "function* gen(a) { f(a); if (a) { g(a); } for (var i = 0; i < 2; i++) { h(i); } \
         yield a; }",
    );

    assert!(out.contains("f(a);"));
    assert!(out.contains("if (a) {"));
    // A fully unmarked loop keeps its shape, including the `var` init.
    assert!(out.contains("for (var i = 0; i < 2; i++) {"));
    assert!(out.contains("h(i);"));
    assert!(out.contains("return $jscomp$generator$context.yield(a, "));
}

#[test]
fn empty_generator_still_terminates() {
    let out = lower("function* gen() { }");

    assert!(out.contains("return $jscomp.generator.createGenerator(gen, "));
    assert!(out.contains("case 1:"));
    assert!(out.contains("$jscomp$generator$context.jumpToEnd();"));
}

#[test]
fn method_call_receiver_survives_yield_arguments() {
    let out = lower("function* gen(o) { o.push(yield 1); }");

    assert!(out.contains("$jscomp$generator$temp$0 = o;"));
    assert!(out.contains("$jscomp$generator$temp$1 = $jscomp$generator$temp$0.push;"));
    assert!(out.contains(
        "$jscomp$generator$temp$1.call($jscomp$generator$temp$0, \
         $jscomp$generator$context.yieldResult);"
    ));
}

#[test]
fn undecomposable_expressions_report_and_leave_the_function_alone() {
    let (out, diagnostics) = lower_expecting_errors("function* gen(o) { o.p += yield 1; }");

    assert!(diagnostics.has_errors());
    let diagnostic = diagnostics.iter().next().unwrap();
    assert!(diagnostic.message.contains("Undecomposable expression"));
    assert!(diagnostic.message.contains("rewrite the yield or await"));
    // The abandoned function keeps its generator flag so the failure is
    // visible downstream.
    assert!(out.contains("function* gen(o)"));
}

#[test]
fn yields_in_case_labels_are_rejected() {
    let (_, diagnostics) = lower_expecting_errors(
        "function* gen(x) { switch (x) { case yield 1: break; case 2: break; } }",
    );

    assert!(diagnostics.has_errors());
    let diagnostic = diagnostics.iter().next().unwrap();
    assert!(diagnostic
        .message
        .contains("Cannot convert yet: Case statements that contain yields"));
}

#[test]
fn sibling_generators_do_not_share_state() {
    let out = lower(
        "function* first() { yield this.a; } function* second() { yield this.b; }",
    );

    // Each function hoists its own alias.
    assert_eq!(out.matches("var $jscomp$generator$this = this;").count(), 2);
    assert_eq!(out.matches("createGenerator").count(), 2);
}

#[test]
fn surviving_addresses_are_unique_and_referenced() {
    let out = lower(
        "function* gen(x) { while (x) { yield 1; if (x) { yield 2; } else { x = f(); } } \
         yield 3; }",
    );

    // Every `case N:` label appears exactly once.
    let mut seen = std::collections::HashSet::new();
    for line in out.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_suffix(':') {
            if let Some(number) = rest.strip_prefix("case ") {
                if let Ok(id) = number.parse::<i64>() {
                    assert!(seen.insert(id), "duplicate case id {} in:\n{}", id, out);
                }
            }
        }
    }
    assert!(seen.contains(&1), "entry case missing in:\n{}", out);
    assert!(!seen.contains(&0), "program end case must not be emitted");
}
