//! Arena-backed mutable AST.
//!
//! Nodes live in a flat `Vec` and are addressed by `NodeId`, an index with a
//! `NONE` sentinel. The tree is doubly linked (children list + parent back
//! pointer) so the transforms can detach, splice and replace subtrees the way
//! the lowering algorithm needs to. Detached subtrees stay alive in the arena;
//! nothing is ever freed during a pass.
//!
//! Two transform-private bits ride on every node:
//!
//! - `generator_marker` - the subtree contains a `yield` (set by the marker
//!   walk, consumed by the statement lowerings);
//! - `generator_safe` - the subtree was produced by the lowering itself and
//!   must be skipped (exactly once) by the unmarked-subtree fixer.

use crate::span::Span;

/// Index into the AST arena. Used instead of pointers/references so nodes can
/// be relinked freely while other ids stay valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Token kind of an AST node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // Containers and statements
    Script,
    Function,
    ParamList,
    Block,
    Empty,
    ExprResult,
    Var,
    If,
    For,
    ForIn,
    While,
    Do,
    Switch,
    Case,
    DefaultCase,
    Label,
    LabelName,
    Try,
    Catch,
    Return,
    Break,
    Continue,
    Throw,
    // Leaves
    Name,
    Number,
    String,
    True,
    False,
    Null,
    This,
    // Operators
    Yield,
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    Hook,
    Or,
    And,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    InstanceOf,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Not,
    Neg,
    Pos,
    TypeOf,
    Void,
    Inc,
    Dec,
    Call,
    New,
    GetProp,
    GetElem,
    ArrayLit,
    ObjectLit,
    StringKey,
    Comma,
}

impl NodeKind {
    /// Whether a node of this kind can stand where a statement is expected.
    pub fn may_be_statement(self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            Block
                | Empty
                | ExprResult
                | Var
                | If
                | For
                | ForIn
                | While
                | Do
                | Switch
                | Label
                | Try
                | Return
                | Break
                | Continue
                | Throw
                | Function
        )
    }

    /// Whether a node of this kind is an expression.
    pub fn may_be_expression(self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            Name | Number
                | String
                | True
                | False
                | Null
                | This
                | Yield
                | Assign
                | AssignAdd
                | AssignSub
                | AssignMul
                | AssignDiv
                | AssignMod
                | Hook
                | Or
                | And
                | Eq
                | Ne
                | StrictEq
                | StrictNe
                | Lt
                | Le
                | Gt
                | Ge
                | In
                | InstanceOf
                | Add
                | Sub
                | Mul
                | Div
                | Mod
                | Not
                | Neg
                | Pos
                | TypeOf
                | Void
                | Inc
                | Dec
                | Call
                | New
                | GetProp
                | GetElem
                | ArrayLit
                | ObjectLit
                | Comma
                | Function
        )
    }

    /// `for`, `for-in`, `while` and `do-while`: the constructs a bare
    /// `continue` can address.
    pub fn is_loop_structure(self) -> bool {
        matches!(
            self,
            NodeKind::For | NodeKind::ForIn | NodeKind::While | NodeKind::Do
        )
    }

    /// For a compound assignment kind, the underlying binary operator kind.
    pub fn compound_assign_op(self) -> Option<NodeKind> {
        match self {
            NodeKind::AssignAdd => Some(NodeKind::Add),
            NodeKind::AssignSub => Some(NodeKind::Sub),
            NodeKind::AssignMul => Some(NodeKind::Mul),
            NodeKind::AssignDiv => Some(NodeKind::Div),
            NodeKind::AssignMod => Some(NodeKind::Mod),
            _ => None,
        }
    }

    pub fn is_assignment(self) -> bool {
        self == NodeKind::Assign || self.compound_assign_op().is_some()
    }
}

/// JSDoc payload carried by a node: only the pieces the lowering reads and
/// writes (suppressions on the program function, `@const` on declarations).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JsDocInfo {
    pub suppressions: Vec<String>,
    pub constancy: bool,
}

#[derive(Clone, Debug)]
struct NodeData {
    kind: NodeKind,
    parent: NodeId,
    children: Vec<NodeId>,
    /// Identifier text, string value, property name or label name.
    text: String,
    /// Numeric literal value.
    number: f64,
    span: Span,
    generator_marker: bool,
    generator_safe: bool,
    /// Block synthesized by the compiler rather than written by the user.
    added_block: bool,
    /// `yield*` as opposed to `yield`.
    yield_delegate: bool,
    /// On `Function` nodes: declared with `function*`.
    is_generator: bool,
    /// On `Inc`/`Dec` nodes: postfix form.
    postfix: bool,
    jsdoc: Option<JsDocInfo>,
}

impl NodeData {
    fn new(kind: NodeKind) -> NodeData {
        NodeData {
            kind,
            parent: NodeId::NONE,
            children: Vec::new(),
            text: String::new(),
            number: 0.0,
            span: Span::NONE,
            generator_marker: false,
            generator_safe: false,
            added_block: false,
            yield_delegate: false,
            is_generator: false,
            postfix: false,
            jsdoc: None,
        }
    }
}

/// The AST arena. All navigation and mutation goes through this type.
#[derive(Default)]
pub struct AstArena {
    nodes: Vec<NodeData>,
}

impl AstArena {
    pub fn new() -> AstArena {
        AstArena { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    // =========================================================================
    // Construction
    // =========================================================================

    pub fn new_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData::new(kind));
        id
    }

    pub fn new_node_with_span(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = self.new_node(kind);
        self.node_mut(id).span = span;
        id
    }

    pub fn name(&mut self, text: &str) -> NodeId {
        let id = self.new_node(NodeKind::Name);
        self.node_mut(id).text = text.to_string();
        id
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        let id = self.new_node(NodeKind::String);
        self.node_mut(id).text = value.to_string();
        id
    }

    pub fn number_lit(&mut self, value: f64) -> NodeId {
        let id = self.new_node(NodeKind::Number);
        self.node_mut(id).number = value;
        id
    }

    pub fn block(&mut self) -> NodeId {
        self.new_node(NodeKind::Block)
    }

    pub fn block_of(&mut self, children: Vec<NodeId>) -> NodeId {
        let block = self.block();
        for child in children {
            self.add_child_to_back(block, child);
        }
        block
    }

    pub fn expr_result(&mut self, expr: NodeId) -> NodeId {
        let id = self.new_node(NodeKind::ExprResult);
        self.add_child_to_back(id, expr);
        id
    }

    pub fn return_node(&mut self, expr: Option<NodeId>) -> NodeId {
        let id = self.new_node(NodeKind::Return);
        if let Some(expr) = expr {
            self.add_child_to_back(id, expr);
        }
        id
    }

    pub fn break_node(&mut self) -> NodeId {
        self.new_node(NodeKind::Break)
    }

    pub fn not(&mut self, expr: NodeId) -> NodeId {
        let id = self.new_node(NodeKind::Not);
        self.add_child_to_back(id, expr);
        id
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        let id = self.new_node(NodeKind::Assign);
        self.add_child_to_back(id, target);
        self.add_child_to_back(id, value);
        id
    }

    pub fn comma(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let id = self.new_node(NodeKind::Comma);
        self.add_child_to_back(id, left);
        self.add_child_to_back(id, right);
        id
    }

    pub fn binary(&mut self, kind: NodeKind, left: NodeId, right: NodeId) -> NodeId {
        let id = self.new_node(kind);
        self.add_child_to_back(id, left);
        self.add_child_to_back(id, right);
        id
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let id = self.new_node(NodeKind::Call);
        self.add_child_to_back(id, callee);
        for arg in args {
            self.add_child_to_back(id, arg);
        }
        id
    }

    pub fn getprop(&mut self, object: NodeId, property: &str) -> NodeId {
        let id = self.new_node(NodeKind::GetProp);
        self.node_mut(id).text = property.to_string();
        self.add_child_to_back(id, object);
        id
    }

    pub fn if_node(&mut self, cond: NodeId, then_block: NodeId) -> NodeId {
        let id = self.new_node(NodeKind::If);
        self.add_child_to_back(id, cond);
        self.add_child_to_back(id, then_block);
        id
    }

    pub fn if_else_node(&mut self, cond: NodeId, then_block: NodeId, else_block: NodeId) -> NodeId {
        let id = self.if_node(cond, then_block);
        self.add_child_to_back(id, else_block);
        id
    }

    pub fn var_of(&mut self, declarator: NodeId) -> NodeId {
        let id = self.new_node(NodeKind::Var);
        self.add_child_to_back(id, declarator);
        id
    }

    pub fn null_node(&mut self) -> NodeId {
        self.new_node(NodeKind::Null)
    }

    pub fn empty(&mut self) -> NodeId {
        self.new_node(NodeKind::Empty)
    }

    /// Shallow clone: kind, payloads and flags, but no children and no parent.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let source = self.node(id);
        let data = NodeData {
            kind: source.kind,
            parent: NodeId::NONE,
            children: Vec::new(),
            text: source.text.clone(),
            number: source.number,
            span: source.span,
            generator_marker: source.generator_marker,
            generator_safe: source.generator_safe,
            added_block: source.added_block,
            yield_delegate: source.yield_delegate,
            is_generator: source.is_generator,
            postfix: source.postfix,
            jsdoc: source.jsdoc.clone(),
        };
        let new_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        new_id
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> NodeId {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// A snapshot of the children list, for walks that mutate while iterating.
    pub fn children_vec(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children.clone()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).children.len()
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.node(id).children.is_empty()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.first().copied()
    }

    pub fn second_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.get(1).copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.last().copied()
    }

    pub fn child(&self, id: NodeId, index: usize) -> NodeId {
        self.node(id).children[index]
    }

    pub fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.node(parent).children.iter().position(|&c| c == child)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id).parent;
        if parent.is_none() {
            return None;
        }
        let index = self.child_index(parent, id)?;
        self.node(parent).children.get(index + 1).copied()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    pub fn add_child_to_back(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "child already attached");
        self.node_mut(child).parent = parent;
        self.node_mut(parent).children.push(child);
    }

    pub fn add_child_to_front(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "child already attached");
        self.node_mut(child).parent = parent;
        self.node_mut(parent).children.insert(0, child);
    }

    pub fn add_child_before(&mut self, parent: NodeId, before: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "child already attached");
        let index = self
            .child_index(parent, before)
            .expect("reference child not found");
        self.node_mut(child).parent = parent;
        self.node_mut(parent).children.insert(index, child);
    }

    pub fn add_children_to_back(&mut self, parent: NodeId, children: Vec<NodeId>) {
        for child in children {
            self.add_child_to_back(parent, child);
        }
    }

    /// Removes `id` from its parent's children list. The subtree stays alive.
    pub fn detach(&mut self, id: NodeId) {
        let parent = self.node(id).parent;
        assert!(parent.is_some(), "detach of a node with no parent");
        let index = self
            .child_index(parent, id)
            .expect("node not in parent's children");
        self.node_mut(parent).children.remove(index);
        self.node_mut(id).parent = NodeId::NONE;
    }

    /// Replaces `old` with `new_node` under `old`'s parent; detaches `old`.
    pub fn replace_with(&mut self, old: NodeId, new_node: NodeId) {
        let parent = self.node(old).parent;
        assert!(parent.is_some(), "replace_with on a detached node");
        debug_assert!(self.node(new_node).parent.is_none());
        let index = self
            .child_index(parent, old)
            .expect("node not in parent's children");
        self.node_mut(parent).children[index] = new_node;
        self.node_mut(new_node).parent = parent;
        self.node_mut(old).parent = NodeId::NONE;
    }

    pub fn remove_first_child(&mut self, parent: NodeId) -> Option<NodeId> {
        let child = self.first_child(parent)?;
        self.node_mut(parent).children.remove(0);
        self.node_mut(child).parent = NodeId::NONE;
        Some(child)
    }

    /// Detaches and returns all children of `parent` in order.
    pub fn remove_children(&mut self, parent: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.node_mut(parent).children);
        for &child in &children {
            self.node_mut(child).parent = NodeId::NONE;
        }
        children
    }

    // =========================================================================
    // Payload accessors
    // =========================================================================

    pub fn text(&self, id: NodeId) -> &str {
        &self.node(id).text
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.node_mut(id).text = text.to_string();
    }

    pub fn number(&self, id: NodeId) -> f64 {
        self.node(id).number
    }

    pub fn set_number(&mut self, id: NodeId, value: f64) {
        self.node_mut(id).number = value;
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.node_mut(id).span = span;
    }

    /// Copies the source position of `from` onto `to`; returns `to`.
    pub fn use_span_of(&mut self, from: NodeId, to: NodeId) -> NodeId {
        let span = self.node(from).span;
        self.node_mut(to).span = span;
        to
    }

    pub fn jsdoc(&self, id: NodeId) -> Option<&JsDocInfo> {
        self.node(id).jsdoc.as_ref()
    }

    pub fn set_jsdoc(&mut self, id: NodeId, jsdoc: Option<JsDocInfo>) {
        self.node_mut(id).jsdoc = jsdoc;
    }

    // =========================================================================
    // Flags
    // =========================================================================

    pub fn is_marked(&self, id: NodeId) -> bool {
        self.node(id).generator_marker
    }

    pub fn set_marker(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).generator_marker = value;
    }

    pub fn is_generator_safe(&self, id: NodeId) -> bool {
        self.node(id).generator_safe
    }

    pub fn set_generator_safe(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).generator_safe = value;
    }

    pub fn is_added_block(&self, id: NodeId) -> bool {
        self.node(id).added_block
    }

    pub fn set_added_block(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).added_block = value;
    }

    pub fn is_yield_delegate(&self, id: NodeId) -> bool {
        self.node(id).yield_delegate
    }

    pub fn set_yield_delegate(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).yield_delegate = value;
    }

    pub fn is_generator_function(&self, id: NodeId) -> bool {
        self.node(id).kind == NodeKind::Function && self.node(id).is_generator
    }

    pub fn set_is_generator(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).is_generator = value;
    }

    pub fn is_postfix(&self, id: NodeId) -> bool {
        self.node(id).postfix
    }

    pub fn set_postfix(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).postfix = value;
    }

    // =========================================================================
    // Kind predicates
    // =========================================================================

    pub fn is_yield(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Yield
    }

    pub fn is_function(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Function
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Block
    }

    pub fn is_name(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Name
    }

    pub fn is_var(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Var
    }

    pub fn is_empty_node(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Empty
    }

    pub fn is_loop_structure(&self, id: NodeId) -> bool {
        self.kind(id).is_loop_structure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_detach_replace() {
        let mut arena = AstArena::new();
        let block = arena.block();
        let a = arena.name("a");
        let b = arena.name("b");
        let c = arena.name("c");
        arena.add_child_to_back(block, a);
        arena.add_child_to_back(block, c);
        arena.add_child_before(block, c, b);
        assert_eq!(arena.children(block), &[a, b, c]);
        assert_eq!(arena.next_sibling(a), Some(b));

        arena.detach(b);
        assert_eq!(arena.children(block), &[a, c]);
        assert!(arena.parent(b).is_none());

        let d = arena.name("d");
        arena.replace_with(a, d);
        assert_eq!(arena.children(block), &[d, c]);
        assert_eq!(arena.parent(d), block);
        assert!(arena.parent(a).is_none());
    }

    #[test]
    fn remove_children_detaches_all() {
        let mut arena = AstArena::new();
        let block = arena.block();
        let a = arena.name("a");
        let b = arena.name("b");
        arena.add_child_to_back(block, a);
        arena.add_child_to_back(block, b);
        let removed = arena.remove_children(block);
        assert_eq!(removed, vec![a, b]);
        assert!(!arena.has_children(block));
        assert!(arena.parent(a).is_none());
    }

    #[test]
    fn shallow_clone_copies_payload_not_children() {
        let mut arena = AstArena::new();
        let var = arena.new_node(NodeKind::Var);
        let declarator = arena.name("x");
        arena.add_child_to_back(var, declarator);
        arena.set_marker(var, true);

        let copy = arena.clone_node(var);
        assert_eq!(arena.kind(copy), NodeKind::Var);
        assert!(arena.is_marked(copy));
        assert!(!arena.has_children(copy));
        assert!(arena.parent(copy).is_none());
    }

    #[test]
    fn statement_and_expression_classification() {
        assert!(NodeKind::While.may_be_statement());
        assert!(!NodeKind::While.may_be_expression());
        assert!(NodeKind::Yield.may_be_expression());
        assert!(!NodeKind::Yield.may_be_statement());
        // Function expressions double as statements.
        assert!(NodeKind::Function.may_be_statement());
        assert!(NodeKind::Function.may_be_expression());
        assert!(NodeKind::Do.is_loop_structure());
        assert!(!NodeKind::Switch.is_loop_structure());
    }
}
