//! Recursive-descent parser for the ES5-plus-generators subset.
//!
//! Builds directly into an `AstArena`. Node shapes follow what the lowering
//! expects:
//!
//! - `Var` children are declarator `Name` nodes whose optional single child is
//!   the initializer;
//! - `if`/loop bodies are always blocks (synthesized ones are flagged as
//!   added blocks);
//! - `Case` is `[label-expr, Block]`, `DefaultCase` is `[Block]`;
//! - `Try` is `[Block, Block(catch holder), Block?]` where the holder block
//!   contains a `Catch[Name, Block]` when a catch clause exists and is empty
//!   otherwise;
//! - `GetProp` carries the property name as node text with the object as its
//!   only child.
//!
//! Parse errors are recorded in a `DiagnosticBag`; the parser recovers by
//! skipping a token so it always terminates.

use crate::ast::{AstArena, NodeId, NodeKind};
use crate::diagnostics::{codes, DiagnosticBag};
use crate::printer::format_number;
use crate::scanner::{tokenize, Token, TokenKind};
use crate::span::Span;

pub struct ParserState {
    tokens: Vec<Token>,
    pos: usize,
    pub arena: AstArena,
    diagnostics: DiagnosticBag,
}

impl ParserState {
    pub fn new(source: &str) -> ParserState {
        let mut diagnostics = DiagnosticBag::new();
        let tokens = match tokenize(source) {
            Ok(tokens) => tokens,
            Err((message, span)) => {
                diagnostics.error(span, message, codes::PARSE_ERROR);
                vec![Token {
                    kind: TokenKind::EndOfFile,
                    span,
                    text: String::new(),
                    number: 0.0,
                }]
            }
        };
        ParserState {
            tokens,
            pos: 0,
            arena: AstArena::new(),
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &DiagnosticBag {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> DiagnosticBag {
        std::mem::take(&mut self.diagnostics)
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::EndOfFile)
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn bump(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) {
        if !self.eat(kind) {
            let span = self.span();
            self.diagnostics.error(
                span,
                format!("expected {:?}, found {:?}", kind, self.kind()),
                codes::PARSE_ERROR,
            );
        }
    }

    fn eat_semicolon(&mut self) {
        // Semicolons may be omitted before a closing brace or at end of input.
        if !self.eat(TokenKind::Semicolon)
            && !self.at(TokenKind::CloseBrace)
            && !self.at(TokenKind::EndOfFile)
        {
            let span = self.span();
            self.diagnostics
                .error(span, "expected ';'", codes::PARSE_ERROR);
        }
    }

    // =========================================================================
    // Entry
    // =========================================================================

    /// Parses the whole input as a script (a statement list).
    pub fn parse_script(&mut self) -> NodeId {
        let script = self.arena.new_node(NodeKind::Script);
        while !self.at(TokenKind::EndOfFile) {
            let before = self.pos;
            let statement = self.parse_statement();
            self.arena.add_child_to_back(script, statement);
            if self.pos == before {
                // No progress; skip the offending token.
                self.bump();
            }
        }
        script
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> NodeId {
        match self.kind() {
            TokenKind::OpenBrace => self.parse_block(),
            TokenKind::Semicolon => {
                let span = self.span();
                self.bump();
                self.arena.new_node_with_span(NodeKind::Empty, span)
            }
            TokenKind::VarKeyword => {
                let var = self.parse_var(false);
                self.eat_semicolon();
                var
            }
            TokenKind::IfKeyword => self.parse_if(),
            TokenKind::ForKeyword => self.parse_for(),
            TokenKind::WhileKeyword => self.parse_while(),
            TokenKind::DoKeyword => self.parse_do(),
            TokenKind::SwitchKeyword => self.parse_switch(),
            TokenKind::TryKeyword => self.parse_try(),
            TokenKind::ReturnKeyword => self.parse_return(),
            TokenKind::ThrowKeyword => self.parse_throw(),
            TokenKind::BreakKeyword => self.parse_break_continue(NodeKind::Break),
            TokenKind::ContinueKeyword => self.parse_break_continue(NodeKind::Continue),
            TokenKind::FunctionKeyword => self.parse_function(),
            TokenKind::Identifier if self.peek_kind(1) == TokenKind::Colon => self.parse_label(),
            _ => {
                let start = self.span();
                let expr = self.parse_expression(false);
                self.eat_semicolon();
                let stmt = self.arena.expr_result(expr);
                self.arena.set_span(stmt, start);
                stmt
            }
        }
    }

    fn parse_block(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::OpenBrace);
        let block = self.arena.new_node_with_span(NodeKind::Block, start);
        while !self.at(TokenKind::CloseBrace) && !self.at(TokenKind::EndOfFile) {
            let before = self.pos;
            let statement = self.parse_statement();
            self.arena.add_child_to_back(block, statement);
            if self.pos == before {
                self.bump();
            }
        }
        self.expect(TokenKind::CloseBrace);
        block
    }

    /// Parses a statement and guarantees the result is a block.
    fn parse_statement_as_block(&mut self) -> NodeId {
        if self.at(TokenKind::OpenBrace) {
            return self.parse_block();
        }
        let statement = self.parse_statement();
        let block = self.arena.block();
        self.arena.use_span_of(statement, block);
        self.arena.set_added_block(block, true);
        self.arena.add_child_to_back(block, statement);
        block
    }

    /// `var a = 1, b;` - the `Var` node with declarator `Name` children.
    fn parse_var(&mut self, no_in: bool) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::VarKeyword);
        let var = self.arena.new_node_with_span(NodeKind::Var, start);
        loop {
            let token = self.bump();
            let declarator = if token.kind == TokenKind::Identifier {
                let name = self.arena.name(&token.text);
                self.arena.set_span(name, token.span);
                name
            } else {
                self.diagnostics.error(
                    token.span,
                    "expected variable name",
                    codes::PARSE_ERROR,
                );
                self.arena.name("")
            };
            if self.eat(TokenKind::Equals) {
                let init = self.parse_assignment(no_in);
                self.arena.add_child_to_back(declarator, init);
            }
            self.arena.add_child_to_back(var, declarator);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        var
    }

    fn parse_if(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::IfKeyword);
        self.expect(TokenKind::OpenParen);
        let cond = self.parse_expression(false);
        self.expect(TokenKind::CloseParen);
        let then_block = self.parse_statement_as_block();
        let if_node = self.arena.if_node(cond, then_block);
        self.arena.set_span(if_node, start);
        if self.eat(TokenKind::ElseKeyword) {
            let else_block = self.parse_statement_as_block();
            self.arena.add_child_to_back(if_node, else_block);
        }
        if_node
    }

    fn parse_for(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::ForKeyword);
        self.expect(TokenKind::OpenParen);

        // Disambiguate `for (init; ...)` from `for (target in obj)`.
        let init = if self.at(TokenKind::Semicolon) {
            let empty = self.arena.empty();
            self.arena.set_span(empty, self.span());
            empty
        } else if self.at(TokenKind::VarKeyword) {
            self.parse_var(true)
        } else {
            self.parse_expression(true)
        };

        if self.eat(TokenKind::InKeyword) {
            let object = self.parse_expression(false);
            self.expect(TokenKind::CloseParen);
            let body = self.parse_statement_as_block();
            let for_in = self.arena.new_node_with_span(NodeKind::ForIn, start);
            self.arena.add_child_to_back(for_in, init);
            self.arena.add_child_to_back(for_in, object);
            self.arena.add_child_to_back(for_in, body);
            return for_in;
        }

        self.expect(TokenKind::Semicolon);
        let cond = if self.at(TokenKind::Semicolon) {
            self.arena.empty()
        } else {
            self.parse_expression(false)
        };
        self.expect(TokenKind::Semicolon);
        let increment = if self.at(TokenKind::CloseParen) {
            self.arena.empty()
        } else {
            self.parse_expression(false)
        };
        self.expect(TokenKind::CloseParen);
        let body = self.parse_statement_as_block();

        let for_node = self.arena.new_node_with_span(NodeKind::For, start);
        self.arena.add_child_to_back(for_node, init);
        self.arena.add_child_to_back(for_node, cond);
        self.arena.add_child_to_back(for_node, increment);
        self.arena.add_child_to_back(for_node, body);
        for_node
    }

    fn parse_while(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::WhileKeyword);
        self.expect(TokenKind::OpenParen);
        let cond = self.parse_expression(false);
        self.expect(TokenKind::CloseParen);
        let body = self.parse_statement_as_block();
        let node = self.arena.new_node_with_span(NodeKind::While, start);
        self.arena.add_child_to_back(node, cond);
        self.arena.add_child_to_back(node, body);
        node
    }

    fn parse_do(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::DoKeyword);
        let body = self.parse_statement_as_block();
        self.expect(TokenKind::WhileKeyword);
        self.expect(TokenKind::OpenParen);
        let cond = self.parse_expression(false);
        self.expect(TokenKind::CloseParen);
        self.eat_semicolon();
        let node = self.arena.new_node_with_span(NodeKind::Do, start);
        self.arena.add_child_to_back(node, body);
        self.arena.add_child_to_back(node, cond);
        node
    }

    fn parse_switch(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::SwitchKeyword);
        self.expect(TokenKind::OpenParen);
        let discriminant = self.parse_expression(false);
        self.expect(TokenKind::CloseParen);
        self.expect(TokenKind::OpenBrace);

        let switch = self.arena.new_node_with_span(NodeKind::Switch, start);
        self.arena.add_child_to_back(switch, discriminant);

        while !self.at(TokenKind::CloseBrace) && !self.at(TokenKind::EndOfFile) {
            let section_span = self.span();
            let section = if self.eat(TokenKind::CaseKeyword) {
                let label = self.parse_expression(false);
                self.expect(TokenKind::Colon);
                let section = self.arena.new_node_with_span(NodeKind::Case, section_span);
                self.arena.add_child_to_back(section, label);
                section
            } else {
                self.expect(TokenKind::DefaultKeyword);
                self.expect(TokenKind::Colon);
                self.arena
                    .new_node_with_span(NodeKind::DefaultCase, section_span)
            };

            let body = self.arena.block();
            self.arena.set_added_block(body, true);
            while !self.at(TokenKind::CaseKeyword)
                && !self.at(TokenKind::DefaultKeyword)
                && !self.at(TokenKind::CloseBrace)
                && !self.at(TokenKind::EndOfFile)
            {
                let before = self.pos;
                let statement = self.parse_statement();
                self.arena.add_child_to_back(body, statement);
                if self.pos == before {
                    self.bump();
                }
            }
            self.arena.add_child_to_back(section, body);
            self.arena.add_child_to_back(switch, section);
        }
        self.expect(TokenKind::CloseBrace);
        switch
    }

    fn parse_try(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::TryKeyword);
        let try_block = self.parse_block();

        let try_node = self.arena.new_node_with_span(NodeKind::Try, start);
        self.arena.add_child_to_back(try_node, try_block);

        // Catch holder block, possibly empty.
        let holder = self.arena.block();
        if self.eat(TokenKind::CatchKeyword) {
            self.expect(TokenKind::OpenParen);
            let param_token = self.bump();
            let param = self.arena.name(&param_token.text);
            self.arena.set_span(param, param_token.span);
            if param_token.kind != TokenKind::Identifier {
                self.diagnostics.error(
                    param_token.span,
                    "expected catch parameter name",
                    codes::PARSE_ERROR,
                );
            }
            self.expect(TokenKind::CloseParen);
            let catch_body = self.parse_block();
            let catch = self.arena.new_node(NodeKind::Catch);
            self.arena.add_child_to_back(catch, param);
            self.arena.add_child_to_back(catch, catch_body);
            self.arena.add_child_to_back(holder, catch);
        }
        self.arena.add_child_to_back(try_node, holder);

        if self.eat(TokenKind::FinallyKeyword) {
            let finally_block = self.parse_block();
            self.arena.add_child_to_back(try_node, finally_block);
        }
        try_node
    }

    fn parse_return(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::ReturnKeyword);
        let node = self.arena.new_node_with_span(NodeKind::Return, start);
        if !self.at(TokenKind::Semicolon)
            && !self.at(TokenKind::CloseBrace)
            && !self.at(TokenKind::EndOfFile)
        {
            let expr = self.parse_expression(false);
            self.arena.add_child_to_back(node, expr);
        }
        self.eat_semicolon();
        node
    }

    fn parse_throw(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::ThrowKeyword);
        let expr = self.parse_expression(false);
        self.eat_semicolon();
        let node = self.arena.new_node_with_span(NodeKind::Throw, start);
        self.arena.add_child_to_back(node, expr);
        node
    }

    fn parse_break_continue(&mut self, kind: NodeKind) -> NodeId {
        let start = self.span();
        self.bump();
        let node = self.arena.new_node_with_span(kind, start);
        if self.at(TokenKind::Identifier) {
            let token = self.bump();
            let label = self.arena.new_node_with_span(NodeKind::LabelName, token.span);
            self.arena.set_text(label, &token.text);
            self.arena.add_child_to_back(node, label);
        }
        self.eat_semicolon();
        node
    }

    fn parse_label(&mut self) -> NodeId {
        let token = self.bump();
        let label_name = self.arena.new_node_with_span(NodeKind::LabelName, token.span);
        self.arena.set_text(label_name, &token.text);
        self.expect(TokenKind::Colon);
        let statement = self.parse_statement();
        let label = self.arena.new_node_with_span(NodeKind::Label, token.span);
        self.arena.add_child_to_back(label, label_name);
        self.arena.add_child_to_back(label, statement);
        label
    }

    /// `function [*] [name] (params) { body }`, declaration or expression.
    fn parse_function(&mut self) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::FunctionKeyword);
        let is_generator = self.eat(TokenKind::Asterisk);

        let name = if self.at(TokenKind::Identifier) {
            let token = self.bump();
            let name = self.arena.name(&token.text);
            self.arena.set_span(name, token.span);
            name
        } else {
            self.arena.name("")
        };

        self.expect(TokenKind::OpenParen);
        let params = self.arena.new_node(NodeKind::ParamList);
        while !self.at(TokenKind::CloseParen) && !self.at(TokenKind::EndOfFile) {
            let token = self.bump();
            if token.kind != TokenKind::Identifier {
                self.diagnostics
                    .error(token.span, "expected parameter name", codes::PARSE_ERROR);
                break;
            }
            let param = self.arena.name(&token.text);
            self.arena.set_span(param, token.span);
            self.arena.add_child_to_back(params, param);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen);
        let body = self.parse_block();

        let function = self.arena.new_node_with_span(NodeKind::Function, start);
        self.arena.set_is_generator(function, is_generator);
        self.arena.add_child_to_back(function, name);
        self.arena.add_child_to_back(function, params);
        self.arena.add_child_to_back(function, body);
        function
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression(&mut self, no_in: bool) -> NodeId {
        let mut expr = self.parse_assignment(no_in);
        while self.at(TokenKind::Comma) {
            self.bump();
            let right = self.parse_assignment(no_in);
            expr = self.arena.comma(expr, right);
        }
        expr
    }

    fn parse_assignment(&mut self, no_in: bool) -> NodeId {
        if self.at(TokenKind::YieldKeyword) {
            return self.parse_yield(no_in);
        }
        let left = self.parse_conditional(no_in);
        let op = match self.kind() {
            TokenKind::Equals => Some(NodeKind::Assign),
            TokenKind::PlusEquals => Some(NodeKind::AssignAdd),
            TokenKind::MinusEquals => Some(NodeKind::AssignSub),
            TokenKind::AsteriskEquals => Some(NodeKind::AssignMul),
            TokenKind::SlashEquals => Some(NodeKind::AssignDiv),
            TokenKind::PercentEquals => Some(NodeKind::AssignMod),
            _ => None,
        };
        match op {
            Some(kind) => {
                self.bump();
                let right = self.parse_assignment(no_in);
                self.arena.binary(kind, left, right)
            }
            None => left,
        }
    }

    fn parse_yield(&mut self, no_in: bool) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::YieldKeyword);
        let node = self.arena.new_node_with_span(NodeKind::Yield, start);
        if self.eat(TokenKind::Asterisk) {
            self.arena.set_yield_delegate(node, true);
        }
        if self.can_start_expression() {
            let operand = self.parse_assignment(no_in);
            self.arena.add_child_to_back(node, operand);
        }
        node
    }

    fn can_start_expression(&self) -> bool {
        !matches!(
            self.kind(),
            TokenKind::Semicolon
                | TokenKind::CloseParen
                | TokenKind::CloseBracket
                | TokenKind::CloseBrace
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::EndOfFile
        )
    }

    fn parse_conditional(&mut self, no_in: bool) -> NodeId {
        let cond = self.parse_binary(0, no_in);
        if !self.eat(TokenKind::Question) {
            return cond;
        }
        let then_expr = self.parse_assignment(false);
        self.expect(TokenKind::Colon);
        let else_expr = self.parse_assignment(no_in);
        let hook = self.arena.new_node(NodeKind::Hook);
        self.arena.add_child_to_back(hook, cond);
        self.arena.add_child_to_back(hook, then_expr);
        self.arena.add_child_to_back(hook, else_expr);
        hook
    }

    /// Precedence levels, loosest first:
    /// `||`, `&&`, equality, relational, additive, multiplicative.
    fn binary_op(&self, level: u8, no_in: bool) -> Option<NodeKind> {
        let op = match (level, self.kind()) {
            (0, TokenKind::BarBar) => NodeKind::Or,
            (1, TokenKind::AmpersandAmpersand) => NodeKind::And,
            (2, TokenKind::EqualsEquals) => NodeKind::Eq,
            (2, TokenKind::ExclamationEquals) => NodeKind::Ne,
            (2, TokenKind::EqualsEqualsEquals) => NodeKind::StrictEq,
            (2, TokenKind::ExclamationEqualsEquals) => NodeKind::StrictNe,
            (3, TokenKind::LessThan) => NodeKind::Lt,
            (3, TokenKind::LessThanEquals) => NodeKind::Le,
            (3, TokenKind::GreaterThan) => NodeKind::Gt,
            (3, TokenKind::GreaterThanEquals) => NodeKind::Ge,
            (3, TokenKind::InstanceOfKeyword) => NodeKind::InstanceOf,
            (3, TokenKind::InKeyword) if !no_in => NodeKind::In,
            (4, TokenKind::Plus) => NodeKind::Add,
            (4, TokenKind::Minus) => NodeKind::Sub,
            (5, TokenKind::Asterisk) => NodeKind::Mul,
            (5, TokenKind::Slash) => NodeKind::Div,
            (5, TokenKind::Percent) => NodeKind::Mod,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, level: u8, no_in: bool) -> NodeId {
        if level > 5 {
            return self.parse_unary(no_in);
        }
        let mut left = self.parse_binary(level + 1, no_in);
        while let Some(op) = self.binary_op(level, no_in) {
            self.bump();
            let right = self.parse_binary(level + 1, no_in);
            left = self.arena.binary(op, left, right);
        }
        left
    }

    fn parse_unary(&mut self, no_in: bool) -> NodeId {
        let kind = match self.kind() {
            TokenKind::Exclamation => Some(NodeKind::Not),
            TokenKind::Minus => Some(NodeKind::Neg),
            TokenKind::Plus => Some(NodeKind::Pos),
            TokenKind::TypeOfKeyword => Some(NodeKind::TypeOf),
            TokenKind::VoidKeyword => Some(NodeKind::Void),
            TokenKind::PlusPlus => Some(NodeKind::Inc),
            TokenKind::MinusMinus => Some(NodeKind::Dec),
            _ => None,
        };
        if let Some(kind) = kind {
            let start = self.span();
            self.bump();
            let operand = self.parse_unary(no_in);
            let node = self.arena.new_node_with_span(kind, start);
            self.arena.add_child_to_back(node, operand);
            return node;
        }
        self.parse_postfix(no_in)
    }

    fn parse_postfix(&mut self, no_in: bool) -> NodeId {
        let expr = self.parse_call_member(no_in);
        let kind = match self.kind() {
            TokenKind::PlusPlus => Some(NodeKind::Inc),
            TokenKind::MinusMinus => Some(NodeKind::Dec),
            _ => None,
        };
        if let Some(kind) = kind {
            self.bump();
            let node = self.arena.new_node(kind);
            self.arena.use_span_of(expr, node);
            self.arena.set_postfix(node, true);
            self.arena.add_child_to_back(node, expr);
            return node;
        }
        expr
    }

    fn parse_call_member(&mut self, no_in: bool) -> NodeId {
        let mut expr = if self.at(TokenKind::NewKeyword) {
            self.parse_new(no_in)
        } else {
            self.parse_primary(no_in)
        };
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.bump();
                    let token = self.bump();
                    let node = self.arena.getprop(expr, &token.text);
                    self.arena.set_span(node, token.span);
                    expr = node;
                }
                TokenKind::OpenBracket => {
                    self.bump();
                    let key = self.parse_expression(false);
                    self.expect(TokenKind::CloseBracket);
                    let node = self.arena.new_node(NodeKind::GetElem);
                    self.arena.add_child_to_back(node, expr);
                    self.arena.add_child_to_back(node, key);
                    expr = node;
                }
                TokenKind::OpenParen => {
                    let args = self.parse_arguments();
                    expr = self.arena.call(expr, args);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_new(&mut self, no_in: bool) -> NodeId {
        let start = self.span();
        self.expect(TokenKind::NewKeyword);
        // Member chain without calls, then optional arguments.
        let mut callee = self.parse_primary(no_in);
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.bump();
                    let token = self.bump();
                    let node = self.arena.getprop(callee, &token.text);
                    self.arena.set_span(node, token.span);
                    callee = node;
                }
                TokenKind::OpenBracket => {
                    self.bump();
                    let key = self.parse_expression(false);
                    self.expect(TokenKind::CloseBracket);
                    let node = self.arena.new_node(NodeKind::GetElem);
                    self.arena.add_child_to_back(node, callee);
                    self.arena.add_child_to_back(node, key);
                    callee = node;
                }
                _ => break,
            }
        }
        let node = self.arena.new_node_with_span(NodeKind::New, start);
        self.arena.add_child_to_back(node, callee);
        if self.at(TokenKind::OpenParen) {
            let args = self.parse_arguments();
            for arg in args {
                self.arena.add_child_to_back(node, arg);
            }
        }
        node
    }

    fn parse_arguments(&mut self) -> Vec<NodeId> {
        self.expect(TokenKind::OpenParen);
        let mut args = Vec::new();
        while !self.at(TokenKind::CloseParen) && !self.at(TokenKind::EndOfFile) {
            args.push(self.parse_assignment(false));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen);
        args
    }

    fn parse_primary(&mut self, _no_in: bool) -> NodeId {
        let token = self.bump();
        match token.kind {
            TokenKind::NumericLiteral => {
                let node = self.arena.number_lit(token.number);
                self.arena.set_span(node, token.span);
                node
            }
            TokenKind::StringLiteral => {
                let node = self.arena.string(&token.text);
                self.arena.set_span(node, token.span);
                node
            }
            TokenKind::Identifier => {
                let node = self.arena.name(&token.text);
                self.arena.set_span(node, token.span);
                node
            }
            TokenKind::ThisKeyword => self.arena.new_node_with_span(NodeKind::This, token.span),
            TokenKind::TrueKeyword => self.arena.new_node_with_span(NodeKind::True, token.span),
            TokenKind::FalseKeyword => self.arena.new_node_with_span(NodeKind::False, token.span),
            TokenKind::NullKeyword => self.arena.new_node_with_span(NodeKind::Null, token.span),
            TokenKind::YieldKeyword => {
                // Yield in a nested expression position (e.g. inside parens).
                self.pos -= 1;
                self.parse_yield(false)
            }
            TokenKind::FunctionKeyword => {
                self.pos -= 1;
                self.parse_function()
            }
            TokenKind::OpenParen => {
                let expr = self.parse_expression(false);
                self.expect(TokenKind::CloseParen);
                expr
            }
            TokenKind::OpenBracket => {
                let array = self.arena.new_node_with_span(NodeKind::ArrayLit, token.span);
                while !self.at(TokenKind::CloseBracket) && !self.at(TokenKind::EndOfFile) {
                    let element = self.parse_assignment(false);
                    self.arena.add_child_to_back(array, element);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::CloseBracket);
                array
            }
            TokenKind::OpenBrace => {
                let object = self.arena.new_node_with_span(NodeKind::ObjectLit, token.span);
                while !self.at(TokenKind::CloseBrace) && !self.at(TokenKind::EndOfFile) {
                    let key_token = self.bump();
                    let key = self.arena.new_node_with_span(NodeKind::StringKey, key_token.span);
                    match key_token.kind {
                        TokenKind::Identifier | TokenKind::StringLiteral => {
                            self.arena.set_text(key, &key_token.text);
                        }
                        TokenKind::NumericLiteral => {
                            let text = format_number(key_token.number);
                            self.arena.set_text(key, &text);
                        }
                        _ => {
                            self.diagnostics.error(
                                key_token.span,
                                "expected property name",
                                codes::PARSE_ERROR,
                            );
                        }
                    }
                    self.expect(TokenKind::Colon);
                    let value = self.parse_assignment(false);
                    self.arena.add_child_to_back(key, value);
                    self.arena.add_child_to_back(object, key);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::CloseBrace);
                object
            }
            _ => {
                self.diagnostics.error(
                    token.span,
                    format!("unexpected token {:?}", token.kind),
                    codes::PARSE_ERROR,
                );
                self.arena.new_node_with_span(NodeKind::Empty, token.span)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (ParserState, NodeId) {
        let mut parser = ParserState::new(source);
        let root = parser.parse_script();
        assert!(
            parser.diagnostics().is_empty(),
            "unexpected parse errors: {:?}",
            parser.diagnostics()
        );
        (parser, root)
    }

    #[test]
    fn parses_generator_function() {
        let (parser, root) = parse("function* gen(a, b) { yield a + b; }");
        let function = parser.arena.first_child(root).unwrap();
        assert!(parser.arena.is_generator_function(function));
        let params = parser.arena.second_child(function).unwrap();
        assert_eq!(parser.arena.child_count(params), 2);
    }

    #[test]
    fn var_declarators_carry_initializers_as_children() {
        let (parser, root) = parse("var a = 1, b;");
        let var = parser.arena.first_child(root).unwrap();
        assert_eq!(parser.arena.kind(var), NodeKind::Var);
        assert_eq!(parser.arena.child_count(var), 2);
        let a = parser.arena.first_child(var).unwrap();
        assert_eq!(parser.arena.text(a), "a");
        assert_eq!(parser.arena.child_count(a), 1);
        let b = parser.arena.second_child(var).unwrap();
        assert!(!parser.arena.has_children(b));
    }

    #[test]
    fn for_in_distinguished_from_for() {
        let (parser, root) = parse("for (var k in o) { k; } for (var i = 0; i < 3; i++) { }");
        let for_in = parser.arena.child(root, 0);
        assert_eq!(parser.arena.kind(for_in), NodeKind::ForIn);
        let for_node = parser.arena.child(root, 1);
        assert_eq!(parser.arena.kind(for_node), NodeKind::For);
        assert_eq!(parser.arena.child_count(for_node), 4);
    }

    #[test]
    fn loop_bodies_become_added_blocks() {
        let (parser, root) = parse("while (x) yield x;");
        let while_node = parser.arena.first_child(root).unwrap();
        let body = parser.arena.second_child(while_node).unwrap();
        assert_eq!(parser.arena.kind(body), NodeKind::Block);
        assert!(parser.arena.is_added_block(body));
    }

    #[test]
    fn try_always_has_catch_holder() {
        let (parser, root) = parse("try { a(); } finally { b(); }");
        let try_node = parser.arena.first_child(root).unwrap();
        assert_eq!(parser.arena.child_count(try_node), 3);
        let holder = parser.arena.second_child(try_node).unwrap();
        assert!(!parser.arena.has_children(holder));

        let (parser, root) = parse("try { a(); } catch (e) { b(); }");
        let try_node = parser.arena.first_child(root).unwrap();
        assert_eq!(parser.arena.child_count(try_node), 2);
        let holder = parser.arena.second_child(try_node).unwrap();
        let catch = parser.arena.first_child(holder).unwrap();
        assert_eq!(parser.arena.kind(catch), NodeKind::Catch);
    }

    #[test]
    fn yield_binds_looser_than_binary_operators() {
        let (parser, root) = parse("function* g() { return 1 + (yield 2); }");
        let function = parser.arena.first_child(root).unwrap();
        let body = parser.arena.last_child(function).unwrap();
        let ret = parser.arena.first_child(body).unwrap();
        let add = parser.arena.first_child(ret).unwrap();
        assert_eq!(parser.arena.kind(add), NodeKind::Add);
        let yield_node = parser.arena.second_child(add).unwrap();
        assert_eq!(parser.arena.kind(yield_node), NodeKind::Yield);
    }

    #[test]
    fn yield_star_sets_delegate_flag() {
        let (parser, root) = parse("function* g() { yield* inner(); }");
        let function = parser.arena.first_child(root).unwrap();
        let body = parser.arena.last_child(function).unwrap();
        let stmt = parser.arena.first_child(body).unwrap();
        let yield_node = parser.arena.first_child(stmt).unwrap();
        assert!(parser.arena.is_yield_delegate(yield_node));
    }

    #[test]
    fn labeled_statements_nest() {
        let (parser, root) = parse("outer: inner: while (x) { break outer; }");
        let label = parser.arena.first_child(root).unwrap();
        assert_eq!(parser.arena.kind(label), NodeKind::Label);
        let inner = parser.arena.second_child(label).unwrap();
        assert_eq!(parser.arena.kind(inner), NodeKind::Label);
    }

    #[test]
    fn switch_sections_wrap_bodies_in_blocks() {
        let (parser, root) = parse("switch (x) { case 1: a(); break; default: b(); }");
        let switch = parser.arena.first_child(root).unwrap();
        assert_eq!(parser.arena.child_count(switch), 3);
        let case = parser.arena.child(switch, 1);
        assert_eq!(parser.arena.kind(case), NodeKind::Case);
        let body = parser.arena.last_child(case).unwrap();
        assert_eq!(parser.arena.kind(body), NodeKind::Block);
        assert_eq!(parser.arena.child_count(body), 2);
        let default = parser.arena.child(switch, 2);
        assert_eq!(parser.arena.kind(default), NodeKind::DefaultCase);
    }
}
