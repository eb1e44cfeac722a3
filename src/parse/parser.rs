use crate::{
    ast::{Block, Expr, Expression, FunctionProto, Located, Statement, Stmt},
    lex::{Token, TokenKind},
    parse::{error::SyntaxError, prec::Precedence},
};

type PResult<T> = std::result::Result<T, SyntaxError>;

/// A window `[pos, end)` over the token stream. The token at `end` is the one
/// that closed the window; errors about running dry point at it.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    pos: usize,
    end: usize,
}

impl Cursor {
    fn window(pos: usize, end: usize) -> Cursor {
        Cursor { pos, end }
    }
}

/// One element of a scanned expression: an operand (first as a token span,
/// later as a parsed node) or an operator token.
#[derive(Debug)]
enum Piece<'t, 'src, T> {
    Operand(T),
    Operator(&'t Token<'src>),
}

impl<'t, 'src, T> Piece<'t, 'src, T> {
    fn operator(&self) -> Option<&'t Token<'src>> {
        match self {
            Piece::Operator(token) => Some(token),
            Piece::Operand(_) => None,
        }
    }

    fn into_operand(self) -> Option<T> {
        match self {
            Piece::Operand(operand) => Some(operand),
            Piece::Operator(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct Parser<'t, 'src> {
    tokens: &'t [Token<'src>],
    errors: Vec<SyntaxError>,
}

impl<'t, 'src> Parser<'t, 'src> {
    pub fn new(tokens: &'t [Token<'src>]) -> Parser<'t, 'src> {
        assert!(
            matches!(tokens.last(), Some(token) if token.kind == TokenKind::Eoi),
            "token stream must end with an end-of-input token"
        );
        Parser {
            tokens,
            errors: vec![],
        }
    }

    /// Parses the whole stream as the top-level block.
    pub fn program(mut self) -> (Located<Block>, Vec<SyntaxError>) {
        let mut cur = Cursor::window(0, self.tokens.len() - 1);
        let loc = self.tokens[0].loc.clone();
        let statements = self.statements(&mut cur, true);
        let block = Block {
            statements,
            result: None,
            is_toplevel: true,
        };
        (Located::new(block, loc), self.errors)
    }

    fn statements(&mut self, cur: &mut Cursor, toplevel: bool) -> Vec<Stmt> {
        let mut statements = vec![];
        loop {
            while self.matches(cur, TokenKind::Semi) {}
            if self.peek(cur).is_none() {
                return statements;
            }

            let start = cur.pos;
            match self.statement(cur, toplevel) {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    self.errors.push(err);
                    cur.pos = self.recovery_point(start, cur.end);
                }
            }
        }
    }

    fn statement(&mut self, cur: &mut Cursor, toplevel: bool) -> PResult<Stmt> {
        let first = self.current(cur);
        match first.kind {
            TokenKind::Let => self.declaration(cur),
            TokenKind::Fn if toplevel => self.function(cur),
            TokenKind::Fn => Err(SyntaxError::NestedFunction {
                loc: first.loc.clone(),
                span: first.loc.span,
            }),
            TokenKind::Invalid => Err(SyntaxError::unexpected(first, "at the start of a statement")),
            _ if toplevel => Err(SyntaxError::TopLevelStatement {
                loc: first.loc.clone(),
                span: first.loc.span,
            }),
            TokenKind::Return => self.return_statement(cur),
            _ => self.expression_statement(cur),
        }
    }

    fn function(&mut self, cur: &mut Cursor) -> PResult<Stmt> {
        let keyword = self.consume(cur, TokenKind::Fn, "to start a function definition")?;
        let name = self.consume(cur, TokenKind::Identifier, "after 'fn'")?;
        self.consume(cur, TokenKind::LeftParen, "after the function name")?;

        let mut params = vec![];
        if !self.matches(cur, TokenKind::RightParen) {
            loop {
                let param = self.consume(cur, TokenKind::Identifier, "in the parameter list")?;
                params.push(param.lexeme.to_string());
                if !self.matches(cur, TokenKind::Comma) {
                    self.consume(cur, TokenKind::RightParen, "after the parameter list")?;
                    break;
                }
            }
        }

        if !self.check(cur, TokenKind::LeftBrace) {
            return Err(SyntaxError::expected(
                TokenKind::LeftBrace,
                self.current(cur),
                "to open the function body",
            ));
        }
        let body = self.block(cur)?;

        Ok(Located::new(
            Statement::FunctionDef {
                proto: FunctionProto::new(name.lexeme, params),
                body,
            },
            keyword.loc.clone(),
        ))
    }

    fn declaration(&mut self, cur: &mut Cursor) -> PResult<Stmt> {
        let keyword = self.consume(cur, TokenKind::Let, "to start a declaration")?;
        let name = self.consume(cur, TokenKind::Identifier, "after 'let'")?;
        let value = if self.matches(cur, TokenKind::Eq) {
            Some(self.expression(cur)?)
        } else {
            None
        };
        self.consume(cur, TokenKind::Semi, "after a variable declaration")?;

        Ok(Located::new(
            Statement::DeclAssignment {
                name: name.lexeme.into(),
                value,
            },
            keyword.loc.clone(),
        ))
    }

    fn return_statement(&mut self, cur: &mut Cursor) -> PResult<Stmt> {
        let keyword = self.consume(cur, TokenKind::Return, "to start a return statement")?;
        let value = self.expression(cur)?;
        self.consume(cur, TokenKind::Semi, "after the returned value")?;
        Ok(Located::new(Statement::Return(value), keyword.loc.clone()))
    }

    fn expression_statement(&mut self, cur: &mut Cursor) -> PResult<Stmt> {
        let loc = self.current(cur).loc.clone();
        let expr = self.expression(cur)?;

        if self.matches(cur, TokenKind::Eq) {
            let value = self.expression(cur)?;
            self.consume(cur, TokenKind::Semi, "after an assignment")?;
            return Ok(Located::new(
                Statement::Assignment {
                    target: expr,
                    value,
                },
                loc,
            ));
        }

        if !expr.node.is_block_like() {
            self.consume(cur, TokenKind::Semi, "after an expression statement")?;
        }
        Ok(Located::new(Statement::Expression(expr), loc))
    }

    /// Parses `{ statements... result? }`, collecting errors of individual
    /// statements instead of failing the whole block.
    fn block(&mut self, cur: &mut Cursor) -> PResult<Located<Block>> {
        let open = self.consume(cur, TokenKind::LeftBrace, "to open a block")?;
        let close = self.find_close(cur.pos - 1, cur.end)?;
        let boundary = self.result_boundary(cur.pos, close);

        let statements = self.statements(&mut Cursor::window(cur.pos, boundary), false);

        let result = if boundary < close {
            let mut tail = Cursor::window(boundary, close);
            match self.complete_expression(&mut tail, "after the block result") {
                Ok(expr) => Some(Box::new(expr)),
                Err(err) => {
                    self.errors.push(err);
                    None
                }
            }
        } else {
            None
        };

        cur.pos = close + 1;
        Ok(Located::new(
            Block {
                statements,
                result,
                is_toplevel: false,
            },
            open.loc.clone(),
        ))
    }

    fn block_expression(&mut self, cur: &mut Cursor) -> PResult<Expr> {
        let block = self.block(cur)?;
        Ok(Located::new(Expression::Block(block.node), block.loc))
    }

    /// Walks backwards from the closing brace to find where the block's
    /// trailing result expression starts. Returns `close` if there is none.
    fn result_boundary(&self, from: usize, close: usize) -> usize {
        let mut depth = 0usize;
        let mut next: Option<TokenKind> = None;
        for i in (from..close).rev() {
            let kind = self.tokens[i].kind;
            if depth == 0 {
                let guarded = next.is_some_and(|k| k == TokenKind::Else || k.is_operator());
                if kind == TokenKind::Semi || (kind == TokenKind::RightBrace && !guarded) {
                    return i + 1;
                }
            }
            match kind {
                TokenKind::RightParen | TokenKind::RightBrace => depth += 1,
                TokenKind::LeftParen | TokenKind::LeftBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            next = Some(kind);
        }
        from
    }

    /// First statement boundary after a failed statement that began at `start`.
    fn recovery_point(&self, start: usize, end: usize) -> usize {
        let mut depth = 0usize;
        for i in start..end {
            match self.tokens[i].kind {
                TokenKind::LeftParen | TokenKind::LeftBrace => depth += 1,
                TokenKind::Semi if depth == 0 => return i + 1,
                TokenKind::RightParen => depth = depth.saturating_sub(1),
                TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1);
                    let else_follows = i + 1 < end && self.tokens[i + 1].kind == TokenKind::Else;
                    if depth == 0 && !else_follows {
                        return i + 1;
                    }
                }
                _ => {}
            }
        }
        end
    }

    fn complete_expression(&mut self, cur: &mut Cursor, context: &'static str) -> PResult<Expr> {
        let expr = self.expression(cur)?;
        self.expect_end(cur, context)?;
        Ok(expr)
    }

    /// Scans one expression into operand spans and operators, then parses the
    /// operands and fuses them by precedence.
    fn expression(&mut self, cur: &mut Cursor) -> PResult<Expr> {
        let mut pieces: Vec<Piece<Cursor>> = vec![];
        let mut operand_start = cur.pos;
        let mut after_operator = true;
        let mut after_block = false;

        while let Some(token) = self.peek(cur) {
            // a closed block only continues the expression through an operator or else
            if after_block && !(token.kind.is_operator() || token.kind == TokenKind::Else) {
                break;
            }
            after_block = false;

            match token.kind {
                TokenKind::LeftParen | TokenKind::LeftBrace => {
                    cur.pos = self.find_close(cur.pos, cur.end)? + 1;
                    after_block = token.kind == TokenKind::LeftBrace;
                    after_operator = false;
                }
                TokenKind::If | TokenKind::While => {
                    cur.pos = self.construct_end(cur.pos, cur.end)?;
                    after_block = true;
                    after_operator = false;
                }
                kind if kind.is_operator() => {
                    if !after_operator {
                        pieces.push(Piece::Operand(Cursor::window(operand_start, cur.pos)));
                    }
                    pieces.push(Piece::Operator(token));
                    cur.pos += 1;
                    operand_start = cur.pos;
                    after_operator = true;
                }
                TokenKind::Semi
                | TokenKind::Comma
                | TokenKind::Eq
                | TokenKind::RightParen
                | TokenKind::RightBrace
                | TokenKind::Eoi => break,
                _ => {
                    cur.pos += 1;
                    after_operator = false;
                }
            }
        }

        if after_operator {
            return Err(match pieces.last().and_then(Piece::operator) {
                Some(operator) => SyntaxError::MissingOperand {
                    operator: operator.kind,
                    side: "right",
                    loc: operator.loc.clone(),
                    span: operator.loc.span,
                },
                None => {
                    let token = self.current(cur);
                    match token.kind {
                        TokenKind::Eoi => SyntaxError::unexpected(token, "where an expression was expected"),
                        _ => SyntaxError::EmptyExpression {
                            loc: token.loc.clone(),
                            span: token.loc.span,
                        },
                    }
                }
            });
        }
        pieces.push(Piece::Operand(Cursor::window(operand_start, cur.pos)));

        let mut items = Vec::with_capacity(pieces.len());
        for piece in pieces {
            items.push(match piece {
                Piece::Operand(mut span) => Piece::Operand(self.operand(&mut span)?),
                Piece::Operator(token) => Piece::Operator(token),
            });
        }
        self.fuse(items)
    }

    fn operand(&mut self, span: &mut Cursor) -> PResult<Expr> {
        let Some(first) = self.peek(span) else {
            unreachable!("operand spans are never empty");
        };

        let expr = match first.kind {
            TokenKind::LeftParen => {
                let close = self.find_close(span.pos, span.end)?;
                let mut inner = Cursor::window(span.pos + 1, close);
                let expr = self.complete_expression(&mut inner, "in a parenthesized expression")?;
                span.pos = close + 1;
                expr
            }
            TokenKind::LeftBrace => self.block_expression(span)?,
            TokenKind::Number => {
                span.pos += 1;
                let value = first.value.ok_or_else(|| SyntaxError::InvalidNumber {
                    lexeme: first.lexeme.into(),
                    loc: first.loc.clone(),
                    span: first.loc.span,
                })?;
                Located::new(Expression::Constant(value), first.loc.clone())
            }
            TokenKind::Identifier if self.nth_kind(span, 1) == Some(TokenKind::LeftParen) => {
                self.call(span)?
            }
            TokenKind::Identifier => {
                span.pos += 1;
                Located::new(Expression::VarRef(first.lexeme.into()), first.loc.clone())
            }
            TokenKind::If => self.if_expression(span)?,
            TokenKind::While => self.while_expression(span)?,
            _ => return Err(SyntaxError::unexpected(first, "where an operand was expected")),
        };

        self.expect_end(span, "after an operand")?;
        Ok(expr)
    }

    fn call(&mut self, cur: &mut Cursor) -> PResult<Expr> {
        let name = self.consume(cur, TokenKind::Identifier, "as the function name")?;
        self.consume(cur, TokenKind::LeftParen, "after the function name")?;

        let mut args = vec![];
        if !self.matches(cur, TokenKind::RightParen) {
            loop {
                args.push(self.expression(cur)?);
                if !self.matches(cur, TokenKind::Comma) {
                    self.consume(cur, TokenKind::RightParen, "after the call arguments")?;
                    break;
                }
            }
        }

        Ok(Located::new(
            Expression::Call {
                name: name.lexeme.into(),
                args,
            },
            name.loc.clone(),
        ))
    }

    fn if_expression(&mut self, cur: &mut Cursor) -> PResult<Expr> {
        let keyword = self.consume(cur, TokenKind::If, "to start an if expression")?;
        let body = self.body_start(cur.pos, cur.end, "after the if condition")?;
        let condition = self.complete_expression(&mut Cursor::window(cur.pos, body), "in the if condition")?;
        cur.pos = body;
        let then_branch = self.block_expression(cur)?;

        let else_branch = if self.matches(cur, TokenKind::Else) {
            let branch = match self.peek_kind(cur) {
                Some(TokenKind::LeftBrace) => self.block_expression(cur)?,
                Some(TokenKind::If) => self.if_expression(cur)?,
                _ => {
                    return Err(SyntaxError::expected(
                        TokenKind::LeftBrace,
                        self.current(cur),
                        "after 'else'",
                    ))
                }
            };
            Some(Box::new(branch))
        } else {
            None
        };

        Ok(Located::new(
            Expression::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            keyword.loc.clone(),
        ))
    }

    fn while_expression(&mut self, cur: &mut Cursor) -> PResult<Expr> {
        let keyword = self.consume(cur, TokenKind::While, "to start a while loop")?;
        let body = self.body_start(cur.pos, cur.end, "after the while condition")?;
        let condition = self.complete_expression(&mut Cursor::window(cur.pos, body), "in the while condition")?;
        cur.pos = body;
        let body = self.block_expression(cur)?;

        Ok(Located::new(
            Expression::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
            keyword.loc.clone(),
        ))
    }

    /// Fuses operand/operator sequences pass by pass until one operand is left.
    fn fuse(&self, mut items: Vec<Piece<'t, 'src, Expr>>) -> PResult<Expr> {
        for prec in Precedence::PASSES {
            let mut input = items.into_iter();
            let mut fused: Vec<Piece<Expr>> = Vec::new();

            while let Some(item) = input.next() {
                let operator = match item {
                    Piece::Operator(operator) => operator,
                    operand => {
                        fused.push(operand);
                        continue;
                    }
                };

                let binary_position = matches!(fused.last(), Some(Piece::Operand(_)));
                if !binary_position {
                    if let Some(op) = prec.unary(operator.kind) {
                        let operand = Self::right_operand(operator, input.next())?;
                        fused.push(Piece::Operand(Located::new(
                            Expression::Unary {
                                op,
                                operand: Box::new(operand),
                            },
                            operator.loc.clone(),
                        )));
                        continue;
                    }
                } else if let Some(op) = prec.binary(operator.kind) {
                    let Some(Piece::Operand(lhs)) = fused.pop() else {
                        unreachable!("binary position implies an operand on the left");
                    };
                    let rhs = Self::right_operand(operator, input.next())?;
                    fused.push(Piece::Operand(Located::new(
                        Expression::Binary {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        operator.loc.clone(),
                    )));
                    continue;
                }

                fused.push(Piece::Operator(operator));
            }
            items = fused;
        }

        // only a leading non-prefix operator can survive every pass
        if let Some(operator) = items.iter().find_map(Piece::operator) {
            return Err(SyntaxError::MissingOperand {
                operator: operator.kind,
                side: "left",
                loc: operator.loc.clone(),
                span: operator.loc.span,
            });
        }

        let mut operands = items.into_iter().filter_map(Piece::into_operand);
        match (operands.next(), operands.next()) {
            (Some(expr), None) => Ok(expr),
            _ => unreachable!("operator fusion must leave exactly one operand"),
        }
    }

    fn right_operand(operator: &Token, next: Option<Piece<'t, 'src, Expr>>) -> PResult<Expr> {
        match next {
            Some(Piece::Operand(expr)) => Ok(expr),
            Some(Piece::Operator(other)) => Err(SyntaxError::ConsecutiveOperators {
                found: other.kind,
                loc: other.loc.clone(),
                span: other.loc.span,
            }),
            None => Err(SyntaxError::MissingOperand {
                operator: operator.kind,
                side: "right",
                loc: operator.loc.clone(),
                span: operator.loc.span,
            }),
        }
    }

    /// Index of the bracket closing the one at `open`, searching below `limit`.
    fn find_close(&self, open: usize, limit: usize) -> PResult<usize> {
        let mut stack = vec![];
        for i in open..limit {
            let token = &self.tokens[i];
            if let Some(closer) = token.kind.closer() {
                stack.push(closer);
            } else if matches!(token.kind, TokenKind::RightParen | TokenKind::RightBrace) {
                match stack.pop() {
                    Some(expected) if expected != token.kind => {
                        return Err(SyntaxError::MismatchedDelimiter {
                            found: token.kind,
                            expected,
                            loc: token.loc.clone(),
                            span: token.loc.span,
                        })
                    }
                    _ => {}
                }
                if stack.is_empty() {
                    return Ok(i);
                }
            }
        }

        let opener = &self.tokens[open];
        Err(SyntaxError::UnclosedDelimiter {
            delimiter: opener.kind,
            loc: opener.loc.clone(),
            span: opener.loc.span,
        })
    }

    /// Index of the `{` opening the body of an if or while whose condition starts at `from`.
    fn body_start(&self, from: usize, limit: usize, context: &'static str) -> PResult<usize> {
        let mut i = from;
        while i < limit {
            let token = &self.tokens[i];
            match token.kind {
                TokenKind::LeftBrace => return Ok(i),
                TokenKind::LeftParen => i = self.find_close(i, limit)? + 1,
                TokenKind::Semi
                | TokenKind::Comma
                | TokenKind::Eq
                | TokenKind::RightParen
                | TokenKind::RightBrace => {
                    return Err(SyntaxError::expected(TokenKind::LeftBrace, token, context))
                }
                _ => i += 1,
            }
        }
        Err(SyntaxError::expected(TokenKind::LeftBrace, &self.tokens[limit], context))
    }

    /// One past the last token of the if or while construct starting at `at`,
    /// including any chain of else branches.
    fn construct_end(&self, at: usize, limit: usize) -> PResult<usize> {
        let keyword = self.tokens[at].kind;
        let context = match keyword {
            TokenKind::If => "after the if condition",
            _ => "after the while condition",
        };
        let body = self.body_start(at + 1, limit, context)?;
        let mut end = self.find_close(body, limit)? + 1;

        if keyword == TokenKind::If && end < limit && self.tokens[end].kind == TokenKind::Else {
            let next = end + 1;
            let next_kind = (next < limit).then(|| self.tokens[next].kind);
            end = match next_kind {
                Some(TokenKind::LeftBrace) => self.find_close(next, limit)? + 1,
                Some(TokenKind::If) => self.construct_end(next, limit)?,
                _ => {
                    return Err(SyntaxError::expected(
                        TokenKind::LeftBrace,
                        &self.tokens[next.min(limit)],
                        "after 'else'",
                    ))
                }
            };
        }
        Ok(end)
    }

    fn peek(&self, cur: &Cursor) -> Option<&'t Token<'src>> {
        let tokens = self.tokens;
        (cur.pos < cur.end).then(|| &tokens[cur.pos])
    }

    fn peek_kind(&self, cur: &Cursor) -> Option<TokenKind> {
        self.peek(cur).map(|token| token.kind)
    }

    fn nth_kind(&self, cur: &Cursor, n: usize) -> Option<TokenKind> {
        (cur.pos + n < cur.end).then(|| self.tokens[cur.pos + n].kind)
    }

    /// The next token, or the one closing the window if it is exhausted.
    fn current(&self, cur: &Cursor) -> &'t Token<'src> {
        let tokens = self.tokens;
        &tokens[cur.pos.min(cur.end)]
    }

    fn check(&self, cur: &Cursor, kind: TokenKind) -> bool {
        self.peek_kind(cur) == Some(kind)
    }

    fn matches(&self, cur: &mut Cursor, kind: TokenKind) -> bool {
        if self.check(cur, kind) {
            cur.pos += 1;
            true
        } else {
            false
        }
    }

    fn consume(
        &self,
        cur: &mut Cursor,
        kind: TokenKind,
        context: &'static str,
    ) -> PResult<&'t Token<'src>> {
        if self.check(cur, kind) {
            let token = self.current(cur);
            cur.pos += 1;
            Ok(token)
        } else {
            Err(SyntaxError::expected(kind, self.current(cur), context))
        }
    }

    fn expect_end(&self, cur: &Cursor, context: &'static str) -> PResult<()> {
        match self.peek(cur) {
            Some(token) => Err(SyntaxError::unexpected(token, context)),
            None => Ok(()),
        }
    }
}
