//! Code emission: turns the (possibly transformed) AST back into JavaScript
//! source text.
//!
//! `SourceWriter` owns the output buffer and indentation; the `Printer` walks
//! the tree and delegates all text output to it. Output is deterministic:
//! one statement per line, two-space indentation, double-quoted strings, and
//! precedence-aware parenthesization so no emitted expression changes meaning.

use crate::ast::{AstArena, NodeId, NodeKind};

/// Writer that handles output generation and indentation tracking.
pub struct SourceWriter {
    output: String,
    indent_level: u32,
    at_line_start: bool,
}

impl SourceWriter {
    pub fn new() -> SourceWriter {
        SourceWriter {
            output: String::with_capacity(1024),
            indent_level: 0,
            at_line_start: true,
        }
    }

    pub fn write(&mut self, text: &str) {
        if self.at_line_start && !text.is_empty() {
            for _ in 0..self.indent_level {
                self.output.push_str("  ");
            }
            self.at_line_start = false;
        }
        self.output.push_str(text);
    }

    pub fn newline(&mut self) {
        self.output.push('\n');
        self.at_line_start = true;
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        debug_assert!(self.indent_level > 0);
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        self.output
    }
}

impl Default for SourceWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders a numeric value (integers without a trailing `.0`).
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Expression precedence; larger binds tighter. Used to decide when a child
/// expression needs parentheses.
fn precedence(kind: NodeKind) -> u8 {
    use NodeKind::*;
    match kind {
        Comma => 1,
        // Yield sits at assignment level in the expression grammar.
        Yield | Assign | AssignAdd | AssignSub | AssignMul | AssignDiv | AssignMod => 3,
        Hook => 4,
        Or => 5,
        And => 6,
        Eq | Ne | StrictEq | StrictNe => 10,
        Lt | Le | Gt | Ge | In | InstanceOf => 11,
        Add | Sub => 13,
        Mul | Div | Mod => 14,
        Not | Neg | Pos | TypeOf | Void => 16,
        Inc | Dec => 17,
        New => 19,
        Call | GetProp | GetElem => 18,
        _ => 21,
    }
}

fn binary_op_text(kind: NodeKind) -> &'static str {
    use NodeKind::*;
    match kind {
        Assign => "=",
        AssignAdd => "+=",
        AssignSub => "-=",
        AssignMul => "*=",
        AssignDiv => "/=",
        AssignMod => "%=",
        Or => "||",
        And => "&&",
        Eq => "==",
        Ne => "!=",
        StrictEq => "===",
        StrictNe => "!==",
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        In => "in",
        InstanceOf => "instanceof",
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Comma => ",",
        _ => unreachable!("not a binary operator: {:?}", kind),
    }
}

pub struct Printer<'a> {
    arena: &'a AstArena,
    writer: SourceWriter,
}

/// Prints `node` (a script or any single statement) to JavaScript text.
pub fn print(arena: &AstArena, node: NodeId) -> String {
    let mut printer = Printer {
        arena,
        writer: SourceWriter::new(),
    };
    if arena.kind(node) == NodeKind::Script {
        for &child in arena.children(node) {
            printer.print_statement(child);
        }
    } else if arena.kind(node).may_be_statement() {
        printer.print_statement(node);
    } else {
        printer.print_expr(node, 0);
    }
    printer.writer.finish()
}

impl<'a> Printer<'a> {
    fn print_jsdoc(&mut self, node: NodeId) {
        let Some(jsdoc) = self.arena.jsdoc(node) else {
            return;
        };
        let mut parts = Vec::new();
        if jsdoc.constancy {
            parts.push("@const".to_string());
        }
        if !jsdoc.suppressions.is_empty() {
            parts.push(format!("@suppress {{{}}}", jsdoc.suppressions.join(",")));
        }
        if !parts.is_empty() {
            self.writer.write(&format!("/** {} */ ", parts.join(" ")));
        }
    }

    fn print_statement(&mut self, node: NodeId) {
        // Functions print their own JSDoc (they also appear in expression
        // position).
        if self.arena.kind(node) != NodeKind::Function {
            self.print_jsdoc(node);
        }
        match self.arena.kind(node) {
            NodeKind::Block => {
                self.print_block(node);
                self.writer.newline();
            }
            NodeKind::Empty => {
                self.writer.write(";");
                self.writer.newline();
            }
            NodeKind::ExprResult => {
                let expr = self.arena.first_child(node).expect("empty expression statement");
                self.print_expr(expr, 0);
                self.writer.write(";");
                self.writer.newline();
            }
            NodeKind::Var => {
                self.print_var_clause(node);
                self.writer.write(";");
                self.writer.newline();
            }
            NodeKind::If => {
                self.writer.write("if (");
                self.print_expr(self.arena.child(node, 0), 0);
                self.writer.write(") ");
                self.print_body(self.arena.child(node, 1));
                if self.arena.child_count(node) > 2 {
                    self.writer.write(" else ");
                    self.print_body(self.arena.child(node, 2));
                }
                self.writer.newline();
            }
            NodeKind::For => {
                self.writer.write("for (");
                let init = self.arena.child(node, 0);
                match self.arena.kind(init) {
                    NodeKind::Empty => {}
                    NodeKind::Var => self.print_var_clause(init),
                    _ => self.print_expr(init, 0),
                }
                self.writer.write("; ");
                let cond = self.arena.child(node, 1);
                if !self.arena.is_empty_node(cond) {
                    self.print_expr(cond, 0);
                }
                self.writer.write("; ");
                let increment = self.arena.child(node, 2);
                if !self.arena.is_empty_node(increment) {
                    self.print_expr(increment, 0);
                }
                self.writer.write(") ");
                self.print_body(self.arena.child(node, 3));
                self.writer.newline();
            }
            NodeKind::ForIn => {
                self.writer.write("for (");
                let target = self.arena.child(node, 0);
                if self.arena.is_var(target) {
                    self.print_var_clause(target);
                } else {
                    self.print_expr(target, 0);
                }
                self.writer.write(" in ");
                self.print_expr(self.arena.child(node, 1), 0);
                self.writer.write(") ");
                self.print_body(self.arena.child(node, 2));
                self.writer.newline();
            }
            NodeKind::While => {
                self.writer.write("while (");
                self.print_expr(self.arena.child(node, 0), 0);
                self.writer.write(") ");
                self.print_body(self.arena.child(node, 1));
                self.writer.newline();
            }
            NodeKind::Do => {
                self.writer.write("do ");
                self.print_body(self.arena.child(node, 0));
                self.writer.write(" while (");
                self.print_expr(self.arena.child(node, 1), 0);
                self.writer.write(");");
                self.writer.newline();
            }
            NodeKind::Switch => {
                self.writer.write("switch (");
                self.print_expr(self.arena.child(node, 0), 0);
                self.writer.write(") {");
                self.writer.newline();
                self.writer.indent();
                for &section in &self.arena.children_vec(node)[1..] {
                    self.print_switch_section(section);
                }
                self.writer.dedent();
                self.writer.write("}");
                self.writer.newline();
            }
            NodeKind::Label => {
                let name = self.arena.child(node, 0);
                self.writer.write(self.arena.text(name));
                self.writer.write(": ");
                self.print_statement(self.arena.child(node, 1));
            }
            NodeKind::Try => {
                self.writer.write("try ");
                self.print_block(self.arena.child(node, 0));
                let holder = self.arena.child(node, 1);
                if let Some(catch) = self.arena.first_child(holder) {
                    let param = self.arena.child(catch, 0);
                    self.writer.write(" catch (");
                    self.writer.write(self.arena.text(param));
                    self.writer.write(") ");
                    self.print_block(self.arena.child(catch, 1));
                }
                if self.arena.child_count(node) > 2 {
                    self.writer.write(" finally ");
                    self.print_block(self.arena.child(node, 2));
                }
                self.writer.newline();
            }
            NodeKind::Return => {
                if let Some(expr) = self.arena.first_child(node) {
                    self.writer.write("return ");
                    self.print_expr(expr, 0);
                    self.writer.write(";");
                } else {
                    self.writer.write("return;");
                }
                self.writer.newline();
            }
            NodeKind::Throw => {
                self.writer.write("throw ");
                self.print_expr(self.arena.child(node, 0), 0);
                self.writer.write(";");
                self.writer.newline();
            }
            NodeKind::Break | NodeKind::Continue => {
                let keyword = if self.arena.kind(node) == NodeKind::Break {
                    "break"
                } else {
                    "continue"
                };
                self.writer.write(keyword);
                if let Some(label) = self.arena.first_child(node) {
                    self.writer.write(" ");
                    self.writer.write(self.arena.text(label));
                }
                self.writer.write(";");
                self.writer.newline();
            }
            NodeKind::Function => {
                self.print_function(node);
                self.writer.newline();
            }
            other => unreachable!("not a statement kind: {:?}", other),
        }
    }

    /// An `if`/loop body: a block inline, anything else as a nested statement.
    fn print_body(&mut self, node: NodeId) {
        if self.arena.is_block(node) {
            self.print_block(node);
        } else {
            self.print_statement(node);
        }
    }

    fn print_block(&mut self, block: NodeId) {
        debug_assert!(self.arena.is_block(block));
        if !self.arena.has_children(block) {
            self.writer.write("{}");
            return;
        }
        self.writer.write("{");
        self.writer.newline();
        self.writer.indent();
        for &child in &self.arena.children_vec(block) {
            self.print_statement(child);
        }
        self.writer.dedent();
        self.writer.write("}");
    }

    fn print_switch_section(&mut self, section: NodeId) {
        let body = match self.arena.kind(section) {
            NodeKind::Case => {
                self.writer.write("case ");
                self.print_expr(self.arena.child(section, 0), 0);
                self.writer.write(":");
                self.arena.child(section, 1)
            }
            NodeKind::DefaultCase => {
                self.writer.write("default:");
                self.arena.child(section, 0)
            }
            other => unreachable!("not a switch section: {:?}", other),
        };
        self.writer.newline();
        self.writer.indent();
        for &child in &self.arena.children_vec(body) {
            self.print_statement(child);
        }
        self.writer.dedent();
    }

    /// `var a = 1, b` without the trailing semicolon (shared by statement and
    /// `for`-header positions).
    fn print_var_clause(&mut self, var: NodeId) {
        self.writer.write("var ");
        for (index, &declarator) in self.arena.children_vec(var).iter().enumerate() {
            if index > 0 {
                self.writer.write(", ");
            }
            self.writer.write(self.arena.text(declarator));
            if let Some(init) = self.arena.first_child(declarator) {
                self.writer.write(" = ");
                // Comma would read as another declarator.
                self.print_expr(init, 2);
            }
        }
    }

    fn print_function(&mut self, function: NodeId) {
        self.print_jsdoc(function);
        let name = self.arena.child(function, 0);
        let params = self.arena.child(function, 1);
        let body = self.arena.child(function, 2);
        self.writer.write("function");
        if self.arena.is_generator_function(function) {
            self.writer.write("*");
        }
        let name_text = self.arena.text(name).to_string();
        if !name_text.is_empty() {
            self.writer.write(" ");
            self.writer.write(&name_text);
        }
        self.writer.write("(");
        for (index, &param) in self.arena.children_vec(params).iter().enumerate() {
            if index > 0 {
                self.writer.write(", ");
            }
            self.writer.write(self.arena.text(param));
        }
        self.writer.write(") ");
        self.print_block(body);
    }

    /// Prints an expression, parenthesizing when its precedence is below what
    /// the surrounding context requires.
    fn print_expr(&mut self, node: NodeId, min_precedence: u8) {
        let kind = self.arena.kind(node);
        let own = precedence(kind);
        let needs_parens = own < min_precedence;
        if needs_parens {
            self.writer.write("(");
        }
        match kind {
            NodeKind::Name => {
                let text = self.arena.text(node).to_string();
                self.writer.write(&text);
            }
            NodeKind::Number => {
                let text = format_number(self.arena.number(node));
                self.writer.write(&text);
            }
            NodeKind::String => {
                let text = format!("\"{}\"", escape_string(self.arena.text(node)));
                self.writer.write(&text);
            }
            NodeKind::True => self.writer.write("true"),
            NodeKind::False => self.writer.write("false"),
            NodeKind::Null => self.writer.write("null"),
            NodeKind::This => self.writer.write("this"),
            NodeKind::Yield => {
                self.writer.write("yield");
                if self.arena.is_yield_delegate(node) {
                    self.writer.write("*");
                }
                if let Some(operand) = self.arena.first_child(node) {
                    self.writer.write(" ");
                    self.print_expr(operand, 3);
                }
            }
            NodeKind::Assign
            | NodeKind::AssignAdd
            | NodeKind::AssignSub
            | NodeKind::AssignMul
            | NodeKind::AssignDiv
            | NodeKind::AssignMod => {
                // Right-associative.
                self.print_expr(self.arena.child(node, 0), own + 1);
                self.writer.write(" ");
                self.writer.write(binary_op_text(kind));
                self.writer.write(" ");
                self.print_expr(self.arena.child(node, 1), own);
            }
            NodeKind::Comma => {
                self.print_expr(self.arena.child(node, 0), own);
                self.writer.write(", ");
                self.print_expr(self.arena.child(node, 1), own + 1);
            }
            NodeKind::Hook => {
                self.print_expr(self.arena.child(node, 0), own + 1);
                self.writer.write(" ? ");
                self.print_expr(self.arena.child(node, 1), 3);
                self.writer.write(" : ");
                self.print_expr(self.arena.child(node, 2), 3);
            }
            NodeKind::Or
            | NodeKind::And
            | NodeKind::Eq
            | NodeKind::Ne
            | NodeKind::StrictEq
            | NodeKind::StrictNe
            | NodeKind::Lt
            | NodeKind::Le
            | NodeKind::Gt
            | NodeKind::Ge
            | NodeKind::In
            | NodeKind::InstanceOf
            | NodeKind::Add
            | NodeKind::Sub
            | NodeKind::Mul
            | NodeKind::Div
            | NodeKind::Mod => {
                // Left-associative.
                self.print_expr(self.arena.child(node, 0), own);
                self.writer.write(" ");
                self.writer.write(binary_op_text(kind));
                self.writer.write(" ");
                self.print_expr(self.arena.child(node, 1), own + 1);
            }
            NodeKind::Not => {
                self.writer.write("!");
                self.print_expr(self.arena.child(node, 0), own);
            }
            NodeKind::Neg => {
                self.writer.write("-");
                self.print_expr(self.arena.child(node, 0), own);
            }
            NodeKind::Pos => {
                self.writer.write("+");
                self.print_expr(self.arena.child(node, 0), own);
            }
            NodeKind::TypeOf => {
                self.writer.write("typeof ");
                self.print_expr(self.arena.child(node, 0), own);
            }
            NodeKind::Void => {
                self.writer.write("void ");
                self.print_expr(self.arena.child(node, 0), own);
            }
            NodeKind::Inc | NodeKind::Dec => {
                let op = if kind == NodeKind::Inc { "++" } else { "--" };
                if self.arena.is_postfix(node) {
                    self.print_expr(self.arena.child(node, 0), own);
                    self.writer.write(op);
                } else {
                    self.writer.write(op);
                    self.print_expr(self.arena.child(node, 0), own);
                }
            }
            NodeKind::Call => {
                self.print_expr(self.arena.child(node, 0), own);
                self.writer.write("(");
                for (index, &arg) in self.arena.children_vec(node)[1..].iter().enumerate() {
                    if index > 0 {
                        self.writer.write(", ");
                    }
                    self.print_expr(arg, 2);
                }
                self.writer.write(")");
            }
            NodeKind::New => {
                self.writer.write("new ");
                self.print_expr(self.arena.child(node, 0), own);
                self.writer.write("(");
                for (index, &arg) in self.arena.children_vec(node)[1..].iter().enumerate() {
                    if index > 0 {
                        self.writer.write(", ");
                    }
                    self.print_expr(arg, 2);
                }
                self.writer.write(")");
            }
            NodeKind::GetProp => {
                self.print_expr(self.arena.child(node, 0), own);
                self.writer.write(".");
                let text = self.arena.text(node).to_string();
                self.writer.write(&text);
            }
            NodeKind::GetElem => {
                self.print_expr(self.arena.child(node, 0), own);
                self.writer.write("[");
                self.print_expr(self.arena.child(node, 1), 0);
                self.writer.write("]");
            }
            NodeKind::ArrayLit => {
                self.writer.write("[");
                for (index, &element) in self.arena.children_vec(node).iter().enumerate() {
                    if index > 0 {
                        self.writer.write(", ");
                    }
                    self.print_expr(element, 2);
                }
                self.writer.write("]");
            }
            NodeKind::ObjectLit => {
                self.writer.write("{");
                for (index, &key) in self.arena.children_vec(node).iter().enumerate() {
                    if index > 0 {
                        self.writer.write(", ");
                    }
                    let text = self.arena.text(key).to_string();
                    self.writer.write(&text);
                    self.writer.write(": ");
                    self.print_expr(self.arena.child(key, 0), 2);
                }
                self.writer.write("}");
            }
            NodeKind::Function => {
                self.print_function(node);
            }
            NodeKind::Empty => {}
            other => unreachable!("not an expression kind: {:?}", other),
        }
        if needs_parens {
            self.writer.write(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserState;

    fn roundtrip(source: &str) -> String {
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        assert!(parser.diagnostics().is_empty(), "{:?}", parser.diagnostics());
        print(&parser.arena, root)
    }

    #[test]
    fn prints_statements() {
        let out = roundtrip("var a = 1, b;\nif (a) { b = 2; } else { b = 3; }");
        assert!(out.contains("var a = 1, b;"));
        assert!(out.contains("if (a) {"));
        assert!(out.contains("} else {"));
    }

    #[test]
    fn preserves_precedence_with_parens() {
        let out = roundtrip("x = (a + b) * c;");
        assert!(out.contains("(a + b) * c"));
        let out = roundtrip("x = a + b * c;");
        assert!(out.contains("a + b * c"));
        assert!(!out.contains("("));
    }

    #[test]
    fn prints_member_chains_and_calls() {
        let out = roundtrip("o.m(a, b)[0].p;");
        assert_eq!(out.trim(), "o.m(a, b)[0].p;");
    }

    #[test]
    fn prints_do_while_zero() {
        let out = roundtrip("do { f(); } while (0);");
        assert!(out.contains("do {"));
        assert!(out.contains("} while (0);"));
    }

    #[test]
    fn prints_switch_sections() {
        let out = roundtrip("switch (x) { case 1: a(); break; default: b(); }");
        assert!(out.contains("switch (x) {"));
        assert!(out.contains("case 1:"));
        assert!(out.contains("default:"));
    }

    #[test]
    fn prints_generator_and_yield() {
        let out = roundtrip("function* g() { yield 1; yield* inner(); }");
        assert!(out.contains("function* g()"));
        assert!(out.contains("yield 1;"));
        assert!(out.contains("yield* inner();"));
    }

    #[test]
    fn prints_for_variants() {
        let out = roundtrip("for (var i = 0; i < 3; i++) { f(i); } for (var k in o) { g(k); }");
        assert!(out.contains("for (var i = 0; i < 3; i++) {"));
        assert!(out.contains("for (var k in o) {"));
    }

    #[test]
    fn comma_in_argument_positions_is_parenthesized() {
        let mut parser = ParserState::new("f(x);");
        let root = parser.parse_script();
        // Rewrite the argument into a comma expression, the shape the
        // var-hoisting fixer produces.
        let arena = &mut parser.arena;
        let stmt = arena.first_child(root).unwrap();
        let call = arena.first_child(stmt).unwrap();
        let arg = arena.child(call, 1);
        arena.detach(arg);
        let b = arena.name("b");
        let comma = arena.comma(arg, b);
        arena.add_child_to_back(call, comma);
        let out = print(&parser.arena, root);
        assert_eq!(out.trim(), "f((x, b));");
    }
}
