use std::sync::Arc;

use compact_str::CompactString;
use smallvec::{SmallVec, smallvec};

use crate::arena::Arena;
use crate::ast::error::{ParseError, SemanticError, SyntaxError};
use crate::ast::node::{Args, CallExpr, Expr, LambdaExpr, Node, NodeRef, PropertyExpr, TokenId};
use crate::context::ParseContext;
use crate::eval::builtin;
use crate::eval::value::Value;
use crate::host::Assigner;
use crate::lexer::token::{Token, TokenKind};
use crate::ops::{BinaryOp, UnaryOp};
use crate::quantity::Quantity;
use crate::range::Range;

/// Parser output for a plain expression: the tree, the token arena its
/// `TokenId`s point into, and the recorded `[Entity]` literal spans.
pub struct ParsedExpression {
    pub root: NodeRef,
    pub arena: Arena<Token>,
    pub entity_spans: Vec<(Range, CompactString)>,
}

/// Parser output for an assignment statement, already decomposed into the
/// entity-target expression, the optional index arguments, the value
/// expression, and the assigner bound at parse time.
pub struct ParsedAssignment {
    pub target: NodeRef,
    pub property: CompactString,
    pub property_token: TokenId,
    pub indices: Vec<NodeRef>,
    pub value: NodeRef,
    pub assigner: Arc<dyn Assigner>,
    pub arena: Arena<Token>,
    pub entity_spans: Vec<(Range, CompactString)>,
}

/// One lexical scope: the declared parameters, then the free variables in
/// first-reference order. Slot numbering within the scope's frame follows
/// exactly this layout.
#[derive(Default)]
struct Scope {
    bound: Vec<CompactString>,
    free: Vec<CompactString>,
}

/// Precedence-climbing recursive descent over the flat token stream.
///
/// The scope stack lives here and nowhere else; it is created for one parse
/// call and dropped with the parser.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    arena: Arena<Token>,
    ctx: &'a ParseContext<'a>,
    scopes: Vec<Scope>,
    entity_spans: Vec<(Range, CompactString)>,
}

impl<'a> Parser<'a> {
    /// `tokens` must end with an `Eof` token, as produced by the lexer.
    pub fn new(tokens: &'a [Token], ctx: &'a ParseContext<'a>) -> Self {
        debug_assert!(tokens.last().is_some_and(Token::is_eof));
        Self {
            tokens,
            pos: 0,
            arena: tokens.iter().cloned().collect(),
            ctx,
            scopes: vec![Scope::default()],
            entity_spans: Vec::new(),
        }
    }

    pub fn parse_expression(mut self) -> Result<ParsedExpression, ParseError> {
        let root = self.parse_expr()?;
        self.expect_eof()?;
        Ok(ParsedExpression {
            root,
            arena: self.arena,
            entity_spans: self.entity_spans,
        })
    }

    pub fn parse_assignment(mut self) -> Result<ParsedAssignment, ParseError> {
        // The left-hand side is a normal expression; local bindings are not
        // meaningful at statement level, so start below them.
        let lhs = self.parse_ternary()?;
        self.expect_symbol('=', "`=`")?;
        let value = self.parse_expr()?;
        self.expect_eof()?;

        // Strip at most one trailing index off the target.
        let (property_node, indices) = match &*lhs.expr {
            Expr::Index { target, args } => (Arc::clone(target), args.to_vec()),
            _ => (Arc::clone(&lhs), Vec::new()),
        };
        let Expr::Property(property) = &*property_node.expr else {
            return Err(SemanticError::BadAssignmentTarget(self.token(lhs.token_id)).into());
        };

        let assigner = match &*property.target.expr {
            Expr::Constant(Value::Entity(entity)) => self
                .ctx
                .graph
                .const_assigner(*entity, &property.name),
            _ => self.ctx.graph.assigner(&property.name),
        }
        .map_err(|_| {
            SemanticError::NotAssignable(self.token(property_node.token_id), property.name.clone())
        })?;

        Ok(ParsedAssignment {
            target: Arc::clone(&property.target),
            property: property.name.clone(),
            property_token: property_node.token_id,
            indices,
            value,
            assigner,
            arena: self.arena,
            entity_spans: self.entity_spans,
        })
    }

    // --- token cursor -----------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_id(&self) -> TokenId {
        TokenId::from(self.pos.min(self.tokens.len() - 1))
    }

    fn token(&self, id: TokenId) -> Token {
        self.arena[id].clone()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn at_symbol(&self, c: char) -> bool {
        matches!(self.current().kind, TokenKind::Symbol(s) if s == c)
    }

    /// Whether tokens at `pos + i` and `pos + j` touch in the source, which
    /// is what makes two symbol tokens one multi-character operator.
    fn adjacent(&self, i: usize, j: usize) -> bool {
        match (self.tokens.get(self.pos + i), self.tokens.get(self.pos + j)) {
            (Some(a), Some(b)) => a.range.end == b.range.start,
            _ => false,
        }
    }

    fn expect_symbol(&mut self, c: char, expected: &'static str) -> Result<TokenId, ParseError> {
        if self.at_symbol(c) {
            let id = self.current_id();
            self.advance();
            Ok(id)
        } else {
            Err(SyntaxError::ExpectedToken {
                token: self.current().clone(),
                expected,
            }
            .into())
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<(TokenId, CompactString), ParseError> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let id = self.current_id();
                let name = name.clone();
                self.advance();
                Ok((id, name))
            }
            _ => Err(SyntaxError::ExpectedToken {
                token: self.current().clone(),
                expected,
            }
            .into()),
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.current().is_eof() {
            Ok(())
        } else {
            Err(SyntaxError::UnexpectedToken(self.current().clone()).into())
        }
    }

    // --- scopes -----------------------------------------------------------

    /// Resolves an identifier against the scope stack, performing closure
    /// conversion as a side effect: a name found in an outer scope is added
    /// to the free list of every scope in between, so each intervening
    /// lambda captures it in turn.
    fn resolve_variable(&mut self, name: &str) -> Option<usize> {
        let top = self.scopes.len() - 1;
        if let Some(i) = self.scopes[top].bound.iter().position(|b| b == name) {
            return Some(i);
        }
        if let Some(i) = self.scopes[top].free.iter().position(|f| f == name) {
            return Some(self.scopes[top].bound.len() + i);
        }
        for depth in (0..top).rev() {
            let found = self.scopes[depth].bound.iter().any(|b| b == name)
                || self.scopes[depth].free.iter().any(|f| f == name);
            if found {
                for scope in &mut self.scopes[depth + 1..=top] {
                    if !scope.free.iter().any(|f| f == name) {
                        scope.free.push(CompactString::new(name));
                    }
                }
                let top_scope = &self.scopes[top];
                return Some(top_scope.bound.len() + top_scope.free.len() - 1);
            }
        }
        None
    }

    /// Parses a sub-expression in a fresh scope with the given bound names,
    /// returning the body and the enclosing-frame capture slots for the new
    /// scope's free variables.
    fn with_scope(
        &mut self,
        bound: Vec<CompactString>,
        parse_body: impl FnOnce(&mut Self) -> Result<NodeRef, ParseError>,
    ) -> Result<(NodeRef, Vec<usize>), ParseError> {
        self.scopes.push(Scope {
            bound,
            free: Vec::new(),
        });
        let body = parse_body(self);
        let scope = self.scopes.pop().unwrap_or_default();
        let body = body?;

        // Closure conversion already propagated these names outward, so each
        // resolves in the enclosing scope without further cascading.
        let mut captures = Vec::with_capacity(scope.free.len());
        for name in &scope.free {
            match self.resolve_variable(name) {
                Some(slot) => captures.push(slot),
                None => {
                    return Err(SemanticError::UnknownIdentifier(
                        self.current().clone(),
                        name.clone(),
                    )
                    .into());
                }
            }
        }
        Ok((body, captures))
    }

    // --- grammar ----------------------------------------------------------

    fn parse_expr(&mut self) -> Result<NodeRef, ParseError> {
        if self.is_local_binding() {
            return self.parse_local_binding();
        }
        self.parse_ternary()
    }

    /// `name = expr; body` — but not `name == expr`.
    fn is_local_binding(&self) -> bool {
        matches!(self.kind_at(0), Some(TokenKind::Ident(_)))
            && matches!(self.kind_at(1), Some(TokenKind::Symbol('=')))
            && !(matches!(self.kind_at(2), Some(TokenKind::Symbol('='))) && self.adjacent(1, 2))
    }

    /// A local binding desugars to an immediately-invoked single-parameter
    /// lambda: `x = e; b` becomes `(|x|(b))(e)`.
    fn parse_local_binding(&mut self) -> Result<NodeRef, ParseError> {
        let (name_id, name) = self.expect_ident("a binding name")?;
        self.expect_symbol('=', "`=`")?;
        let value = self.parse_expr()?;
        self.expect_symbol(';', "`;`")?;
        let (body, captures) = self.with_scope(vec![name], |p| p.parse_expr())?;

        let lambda = Node::new(
            name_id,
            Expr::Lambda(LambdaExpr {
                arity: 1,
                captures,
                body,
            }),
        );
        Ok(Node::new(
            name_id,
            Expr::Index {
                target: lambda,
                args: smallvec![value],
            },
        ))
    }

    /// The dedicated binding level for the ternary conditional.
    fn parse_ternary(&mut self) -> Result<NodeRef, ParseError> {
        let cond = self.parse_binary(1)?;
        if !self.at_symbol('?') {
            return Ok(cond);
        }
        let question_id = self.current_id();
        self.advance();
        let then_branch = self.parse_ternary()?;
        self.expect_symbol(':', "`:`")?;
        let else_branch = self.parse_ternary()?;
        Ok(Node::new(
            question_id,
            Expr::Conditional {
                cond,
                then_branch,
                else_branch,
            },
        ))
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, usize)> {
        let TokenKind::Symbol(first) = self.current().kind else {
            return None;
        };
        let second = match self.kind_at(1) {
            Some(TokenKind::Symbol(c)) if self.adjacent(0, 1) => Some(*c),
            _ => None,
        };
        BinaryOp::from_symbols(first, second)
    }

    /// Precedence climbing. Right-associative operators recurse at their own
    /// binding power so equal-precedence chains nest to the right.
    fn parse_binary(&mut self, min_prec: u8) -> Result<NodeRef, ParseError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, width)) = self.peek_binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            let op_id = self.current_id();
            for _ in 0..width {
                self.advance();
            }
            let next_min = if op.right_assoc() { prec } else { prec + 1 };
            let rhs = self.parse_binary(next_min)?;
            lhs = Node::new(
                op_id,
                Expr::Binary {
                    op,
                    lhs,
                    rhs,
                    checked: true,
                },
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<NodeRef, ParseError> {
        let op = match self.current().kind {
            TokenKind::Symbol('-') => Some(UnaryOp::Negate),
            TokenKind::Symbol('!') => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let op_id = self.current_id();
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Node::new(
                op_id,
                Expr::Unary {
                    op,
                    operand,
                    checked: true,
                },
            ));
        }
        self.parse_postfix()
    }

    /// Postfix loop: chained `.name` property access and `(args)` calls or
    /// indexes, left to right, so `a.b(1).c` reads `((a.b)(1)).c`.
    fn parse_postfix(&mut self) -> Result<NodeRef, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            if self.at_symbol('.') {
                self.advance();
                let (name_id, name) = self.expect_ident("a property name")?;
                let accessor = match &*node.expr {
                    Expr::Constant(Value::Entity(entity)) => {
                        self.ctx.graph.const_accessor(*entity, &name)
                    }
                    _ => self.ctx.graph.accessor(&name),
                }
                .map_err(|_| {
                    SemanticError::UnknownProperty(self.token(name_id), name.clone())
                })?;
                node = Node::new(
                    name_id,
                    Expr::Property(PropertyExpr {
                        target: node,
                        name,
                        accessor,
                    }),
                );
            } else if self.at_symbol('(') {
                let paren_id = self.current_id();
                self.advance();
                let args = self.parse_expr_list(')', "`)`")?;
                node = Node::new(paren_id, Expr::Index { target: node, args });
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// Comma-separated expressions up to (and consuming) the terminator.
    fn parse_expr_list(
        &mut self,
        terminator: char,
        expected: &'static str,
    ) -> Result<Args, ParseError> {
        let mut items = SmallVec::new();
        if self.at_symbol(terminator) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.at_symbol(',') {
                self.advance();
            } else if self.at_symbol(terminator) {
                self.advance();
                return Ok(items);
            } else {
                return Err(SyntaxError::ExpectedToken {
                    token: self.current().clone(),
                    expected,
                }
                .into());
            }
        }
    }

    fn parse_primary(&mut self) -> Result<NodeRef, ParseError> {
        match self.current().kind.clone() {
            TokenKind::NumberLit(value) => self.parse_number(value),
            TokenKind::StringLit(text) => {
                let id = self.current_id();
                self.advance();
                Ok(Node::new(id, Expr::Constant(Value::String(text))))
            }
            TokenKind::Ident(name) => self.parse_ident(name),
            TokenKind::Symbol('(') => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_symbol(')', "`)`")?;
                Ok(inner)
            }
            TokenKind::Symbol('[') => self.parse_entity_literal(),
            TokenKind::Symbol('{') => {
                let id = self.current_id();
                self.advance();
                let elements = self.parse_expr_list('}', "`}`")?;
                Ok(Node::new(id, Expr::Array(elements.into_vec())))
            }
            TokenKind::Symbol('|') => self.parse_lambda(),
            TokenKind::Eof => Err(SyntaxError::UnexpectedEof.into()),
            TokenKind::Symbol(_) => {
                Err(SyntaxError::UnexpectedToken(self.current().clone()).into())
            }
        }
    }

    /// A number literal with an optional unit suffix, `3[m]` or `3'm'`.
    /// The scale factor of the named unit is applied immediately, so the
    /// constant carries the dimension's base-unit value.
    fn parse_number(&mut self, value: f64) -> Result<NodeRef, ParseError> {
        let id = self.current_id();
        self.advance();

        let close = if self.at_symbol('[') {
            Some((']', "`]`"))
        } else if self.at_symbol('\'') {
            Some(('\'', "`'`"))
        } else {
            None
        };
        let quantity = match close {
            Some((close, close_name)) => {
                self.advance();
                let (name_id, name) = self.parse_unit_name(close, close_name)?;
                let resolved = self.ctx.units.resolve(&name).ok_or_else(|| {
                    SemanticError::UnknownUnit(self.token(name_id), name.clone())
                })?;
                Quantity::new(value * resolved.scale, resolved.unit)
            }
            None => Quantity::dimensionless(value),
        };
        Ok(Node::new(id, Expr::Constant(Value::Number(quantity))))
    }

    /// A unit name may span several adjacent tokens (`m/s`, `km/h`); the
    /// name is their concatenated text, up to (and consuming) `close`.
    fn parse_unit_name(
        &mut self,
        close: char,
        close_name: &'static str,
    ) -> Result<(TokenId, CompactString), ParseError> {
        let first_id = self.current_id();
        let mut name = CompactString::const_new("");
        loop {
            if self.at_symbol(close) {
                break;
            }
            // Inside a unit suffix, whitespace would split the name.
            if !name.is_empty() && !self.adjacent_to_previous() {
                break;
            }
            match &self.current().kind {
                TokenKind::Ident(part) => name.push_str(part),
                TokenKind::Symbol(c) => name.push(*c),
                TokenKind::NumberLit(n) if n.fract() == 0.0 => {
                    name.push_str(&format!("{}", *n as i64));
                }
                _ => break,
            }
            self.advance();
        }
        self.expect_symbol(close, close_name)?;
        if name.is_empty() {
            return Err(SyntaxError::ExpectedToken {
                token: self.token(first_id),
                expected: "a unit name",
            }
            .into());
        }
        Ok((first_id, name))
    }

    /// Whether the current token touches the previous one in the source.
    fn adjacent_to_previous(&self) -> bool {
        if self.pos == 0 {
            return false;
        }
        match (self.tokens.get(self.pos - 1), self.tokens.get(self.pos)) {
            (Some(a), Some(b)) => a.range.end == b.range.start,
            _ => false,
        }
    }

    /// `[EntityName]`, resolved through the parse context. The literal's span
    /// is recorded so the host can re-serialize the source after renames.
    fn parse_entity_literal(&mut self) -> Result<NodeRef, ParseError> {
        let open_id = self.current_id();
        let start = self.current().range.start.clone();
        self.advance();
        let (name_id, name) = self.expect_ident("an entity name")?;
        let close_id = self.expect_symbol(']', "`]`")?;
        let entity = self
            .ctx
            .graph
            .resolve_entity(&name)
            .map_err(|_| SemanticError::UnknownEntity(self.token(name_id), name.clone()))?;
        let end = self.token(close_id).range.end;
        self.entity_spans.push((Range { start, end }, name));
        Ok(Node::new(open_id, Expr::Constant(Value::Entity(entity))))
    }

    /// `|a, b|(body)`.
    fn parse_lambda(&mut self) -> Result<NodeRef, ParseError> {
        let open_id = self.current_id();
        self.advance();

        let mut params: Vec<CompactString> = Vec::new();
        if !self.at_symbol('|') {
            loop {
                let (name_id, name) = self.expect_ident("a parameter name")?;
                if params.contains(&name) {
                    return Err(SemanticError::DuplicateParameter(self.token(name_id), name).into());
                }
                params.push(name);
                if self.at_symbol(',') {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_symbol('|', "`|`")?;
        self.expect_symbol('(', "`(`")?;
        let arity = params.len();
        let (body, captures) = self.with_scope(params, |p| p.parse_expr())?;
        self.expect_symbol(')', "`)`")?;

        Ok(Node::new(
            open_id,
            Expr::Lambda(LambdaExpr {
                arity,
                captures,
                body,
            }),
        ))
    }

    /// Identifier resolution order: bound/free variable, compile-time
    /// constant, builtin function.
    fn parse_ident(&mut self, name: CompactString) -> Result<NodeRef, ParseError> {
        let id = self.current_id();
        self.advance();

        if let Some(slot) = self.resolve_variable(&name) {
            return Ok(Node::new(id, Expr::Variable(slot)));
        }
        if let Some(value) = self.ctx.constants.get(&name) {
            return Ok(Node::new(id, Expr::Constant(value.clone())));
        }
        if let Some(func) = builtin::find(&name) {
            if !self.at_symbol('(') {
                return Err(SemanticError::FunctionWithoutArguments(self.token(id), name).into());
            }
            self.advance();
            let args = self.parse_expr_list(')', "`)`")?;
            return Ok(Node::new(
                id,
                Expr::Call(CallExpr {
                    name,
                    func,
                    args,
                    checked: true,
                }),
            ));
        }
        Err(SemanticError::UnknownIdentifier(self.token(id), name).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParseContext;
    use crate::host::{
        Accessor, Assigner, EntityGraph, EntityId, EntityRef, HostError,
    };
    use crate::lexer;
    use crate::ops::BinaryOp;
    use crate::unit::Unitless;
    use rstest::rstest;

    struct StubGraph;

    struct StubAccessor;

    impl Accessor for StubAccessor {
        fn read(&self, _entity: EntityRef) -> Result<Value, HostError> {
            Ok(Value::from(1.0))
        }
    }

    struct StubAssigner;

    impl Assigner for StubAssigner {
        fn assign(
            &self,
            _entity: EntityRef,
            _indices: &[Value],
            _value: Value,
        ) -> Result<(), HostError> {
            Ok(())
        }
    }

    impl EntityGraph for StubGraph {
        fn resolve_entity(&self, name: &str) -> Result<EntityRef, HostError> {
            if name == "Box1" {
                Ok(EntityRef::new(EntityId(1)))
            } else {
                Err(HostError::NotFound(name.to_string()))
            }
        }

        fn accessor(&self, _name: &str) -> Result<Arc<dyn Accessor>, HostError> {
            Ok(Arc::new(StubAccessor))
        }

        fn const_accessor(
            &self,
            _entity: EntityRef,
            _name: &str,
        ) -> Result<Arc<dyn Accessor>, HostError> {
            Ok(Arc::new(StubAccessor))
        }

        fn assigner(&self, _name: &str) -> Result<Arc<dyn Assigner>, HostError> {
            Ok(Arc::new(StubAssigner))
        }

        fn const_assigner(
            &self,
            _entity: EntityRef,
            _name: &str,
        ) -> Result<Arc<dyn Assigner>, HostError> {
            Ok(Arc::new(StubAssigner))
        }
    }

    fn parse(source: &str) -> Result<ParsedExpression, ParseError> {
        let units = Unitless;
        let graph = StubGraph;
        let ctx = ParseContext::new(&units, &graph);
        let tokens = lexer::tokenize(source).expect("test source must tokenize");
        Parser::new(&tokens, &ctx).parse_expression()
    }

    fn parse_assign(source: &str) -> Result<ParsedAssignment, ParseError> {
        let units = Unitless;
        let graph = StubGraph;
        let ctx = ParseContext::new(&units, &graph);
        let tokens = lexer::tokenize(source).expect("test source must tokenize");
        Parser::new(&tokens, &ctx).parse_assignment()
    }

    #[test]
    fn test_precedence_shape() {
        let parsed = parse("1 + 2 * 3").unwrap();
        let Expr::Binary { op, rhs, .. } = &*parsed.root.expr else {
            panic!("expected a binary root");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            &*rhs.expr,
            Expr::Binary { op: BinaryOp::Mul, .. }
        ));
    }

    #[test]
    fn test_power_is_right_associative() {
        let parsed = parse("2 ^ 3 ^ 2").unwrap();
        let Expr::Binary { op, lhs, rhs, .. } = &*parsed.root.expr else {
            panic!("expected a binary root");
        };
        assert_eq!(*op, BinaryOp::Pow);
        assert!(matches!(&*lhs.expr, Expr::Constant(_)));
        assert!(matches!(
            &*rhs.expr,
            Expr::Binary { op: BinaryOp::Pow, .. }
        ));
    }

    #[test]
    fn test_ternary_nests_to_the_right() {
        let parsed = parse("1 ? 2 : 3 ? 4 : 5").unwrap();
        let Expr::Conditional { else_branch, .. } = &*parsed.root.expr else {
            panic!("expected a conditional root");
        };
        assert!(matches!(&*else_branch.expr, Expr::Conditional { .. }));
    }

    #[test]
    fn test_postfix_chain_is_left_to_right() {
        // a.b(1).c parses as ((a.b)(1)).c
        let parsed = parse("[Box1].b(1).c").unwrap();
        let Expr::Property(outer) = &*parsed.root.expr else {
            panic!("expected property at the root");
        };
        assert_eq!(outer.name, "c");
        let Expr::Index { target, args } = &*outer.target.expr else {
            panic!("expected an index below");
        };
        assert_eq!(args.len(), 1);
        let Expr::Property(inner) = &*target.expr else {
            panic!("expected property below the index");
        };
        assert_eq!(inner.name, "b");
        assert!(matches!(
            &*inner.target.expr,
            Expr::Constant(Value::Entity(_))
        ));
    }

    #[test]
    fn test_local_binding_desugars_to_applied_lambda() {
        let parsed = parse("x = 1; x").unwrap();
        let Expr::Index { target, args } = &*parsed.root.expr else {
            panic!("expected an application at the root");
        };
        assert_eq!(args.len(), 1);
        let Expr::Lambda(lambda) = &*target.expr else {
            panic!("expected a lambda target");
        };
        assert_eq!(lambda.arity, 1);
        assert!(lambda.captures.is_empty());
        assert!(matches!(&*lambda.body.expr, Expr::Variable(0)));
    }

    #[test]
    fn test_closure_conversion_slots() {
        // Bound variables come first, then free variables in first-reference
        // order; captures index the enclosing frame.
        let parsed = parse("a = 1; |x|(x + a)").unwrap();
        let Expr::Index { target, .. } = &*parsed.root.expr else {
            panic!("expected the binding application");
        };
        let Expr::Lambda(binding) = &*target.expr else {
            panic!("expected the binding lambda");
        };
        let Expr::Lambda(inner) = &*binding.body.expr else {
            panic!("expected the inner lambda literal");
        };
        assert_eq!(inner.arity, 1);
        assert_eq!(inner.captures, vec![0]);
        let Expr::Binary { lhs, rhs, .. } = &*inner.body.expr else {
            panic!("expected the addition body");
        };
        assert!(matches!(&*lhs.expr, Expr::Variable(0)));
        assert!(matches!(&*rhs.expr, Expr::Variable(1)));
    }

    #[test]
    fn test_entity_literal_spans_recorded() {
        let parsed = parse("[Box1].b + 1").unwrap();
        assert_eq!(parsed.entity_spans.len(), 1);
        assert_eq!(parsed.entity_spans[0].1, "Box1");
        assert_eq!(parsed.entity_spans[0].0.start.column, 1);
        assert_eq!(parsed.entity_spans[0].0.end.column, 7);
    }

    #[rstest]
    #[case::unknown_ident("foo")]
    #[case::unknown_in_lambda("|x|(y)")]
    fn test_unknown_identifier(#[case] source: &str) {
        assert!(matches!(
            parse(source),
            Err(ParseError::Semantic(SemanticError::UnknownIdentifier(_, _)))
        ));
    }

    #[test]
    fn test_duplicate_parameter() {
        assert!(matches!(
            parse("|x, x|(x)"),
            Err(ParseError::Semantic(SemanticError::DuplicateParameter(_, _)))
        ));
    }

    #[test]
    fn test_function_without_arguments() {
        assert!(matches!(
            parse("max + 1"),
            Err(ParseError::Semantic(SemanticError::FunctionWithoutArguments(_, _)))
        ));
    }

    #[test]
    fn test_unknown_entity() {
        assert!(matches!(
            parse("[Ghost]"),
            Err(ParseError::Semantic(SemanticError::UnknownEntity(_, _)))
        ));
    }

    #[rstest]
    #[case("1 +")]
    #[case("(1")]
    #[case("{1, 2")]
    #[case("|x|(x")]
    fn test_incomplete_input(#[case] source: &str) {
        assert!(matches!(parse(source), Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(matches!(
            parse("1 2"),
            Err(ParseError::Syntax(SyntaxError::UnexpectedToken(_)))
        ));
    }

    #[test]
    fn test_multi_character_operators_need_adjacency() {
        // `< =` with a space is less-than followed by a stray `=`.
        assert!(parse("1 < = 2").is_err());
        assert!(parse("1 <= 2").is_ok());
    }

    #[test]
    fn test_assignment_decomposition() {
        let parsed = parse_assign("[Box1].mass = 1").unwrap();
        assert_eq!(parsed.property, "mass");
        assert!(parsed.indices.is_empty());

        let parsed = parse_assign("[Box1].level(2) = 7").unwrap();
        assert_eq!(parsed.property, "level");
        assert_eq!(parsed.indices.len(), 1);
    }

    #[rstest]
    #[case::bare_entity("[Box1] = 1")]
    #[case::double_index("[Box1].a(1)(2) = 1")]
    #[case::expression_target("1 + 1 = 2")]
    fn test_bad_assignment_targets(#[case] source: &str) {
        assert!(matches!(
            parse_assign(source),
            Err(ParseError::Semantic(SemanticError::BadAssignmentTarget(_)))
        ));
    }
}
