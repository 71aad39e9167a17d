//! The parser (spec.md §4.2).
//!
//! A hand-written recursive-descent statement parser over a precedence-
//! climbing (Pratt) expression parser. Fails fast with a diagnostic naming
//! the expected construct, the observed token text, and its line.

use std::fmt;

use crate::{
    ast::{Expr, HandlerDecl, Program, Stmt, UnitDecl, SUPER_INIT_HANDLER},
    lexer::{LexError, Lexer, Token, TokenKind},
};

/// A parse failure: the expected construct, the observed token text, and its
/// line (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        Self {
            message: error.message,
            line: error.line,
            column: error.column,
        }
    }
}

/// Statement-starting keywords, used both by the grammar proper and by the
/// function-literal lookahead (spec.md §4.2).
const STMT_START_KEYWORDS: &[TokenKind] = &[
    TokenKind::End,
    TokenKind::Local,
    TokenKind::If,
    TokenKind::While,
    TokenKind::Foreach,
    TokenKind::Return,
];

/// A Pratt parser over a cloneable [`Lexer`].
///
/// Cloning `Parser` clones its lexer and lookahead tokens, which is what
/// makes the function-literal lookahead in [`Self::parse_primary`]
/// non-destructive (spec.md §4.2, property P7): a failed tentative parse
/// simply discards the clone and leaves the original untouched.
#[derive(Clone)]
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
}

impl<'src> Parser<'src> {
    /// Creates a parser positioned at the first token of `src`.
    ///
    /// # Errors
    /// Returns a [`ParseError`] if the very first token fails to lex.
    pub fn new(src: &'src str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn bump(&mut self) -> Result<Token<'src>, ParseError> {
        let tok = self.current;
        self.current = self.lexer.next_token()?;
        Ok(tok)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token<'src>, ParseError> {
        if self.current.kind == kind {
            self.bump()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError {
            message: format!("expected {expected}, found {:?}", self.current.text),
            line: self.current.line,
            column: self.current.column,
        }
    }

    /// Parses a full program: zero or more units until end-of-input.
    ///
    /// # Errors
    /// Returns a [`ParseError`] on the first malformed construct.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut units = Vec::new();
        while self.current.kind != TokenKind::Eof {
            units.push(self.parse_unit()?);
        }
        Ok(Program { units })
    }

    fn parse_unit(&mut self) -> Result<UnitDecl, ParseError> {
        self.expect(TokenKind::Unit, "'unit'")?;
        let name = self.expect(TokenKind::Ident, "a unit name")?.text.to_owned();
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut handlers = Vec::new();
        let mut super_init: Vec<Stmt> = Vec::new();
        while self.current.kind != TokenKind::RBrace {
            if self.current.kind == TokenKind::On {
                handlers.push(self.parse_handler()?);
            } else {
                super_init.extend(self.parse_stmt()?);
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        if !super_init.is_empty() {
            handlers.insert(
                0,
                HandlerDecl {
                    name: SUPER_INIT_HANDLER.to_owned(),
                    params: Vec::new(),
                    body: super_init,
                },
            );
        }

        Ok(UnitDecl { name, handlers })
    }

    fn parse_handler(&mut self) -> Result<HandlerDecl, ParseError> {
        self.expect(TokenKind::On, "'on'")?;
        let name = self.expect(TokenKind::Ident, "a handler name")?.text.to_owned();
        self.expect(TokenKind::Arrow, "'->'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let params = self.parse_param_list()?;
        self.expect(TokenKind::RParen, "')'")?;

        let mut body = Vec::new();
        while self.current.kind != TokenKind::End {
            body.extend(self.parse_stmt()?);
        }
        self.expect(TokenKind::End, "'end'")?;

        Ok(HandlerDecl { name, params, body })
    }

    fn parse_param_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if self.current.kind == TokenKind::Ident {
            params.push(self.bump()?.text.to_owned());
            while self.current.kind == TokenKind::Comma {
                self.bump()?;
                params.push(self.expect(TokenKind::Ident, "a parameter name")?.text.to_owned());
            }
        }
        Ok(params)
    }

    /// Parses one statement. Returns a `Vec` because a statement never needs
    /// to expand to more than one AST node here, but keeping the signature
    /// plural lets callers `extend` uniformly (mirrors how `anon_body` folds
    /// a run of statements into one handler, spec.md §4.2).
    fn parse_stmt(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let stmt = match self.current.kind {
            TokenKind::Local => self.parse_local_decl()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::Foreach => self.parse_foreach()?,
            TokenKind::Return => self.parse_return()?,
            TokenKind::Ident if self.peek_is_bare_assign() => self.parse_assign()?,
            _ => {
                let e = self.parse_expression(0)?;
                self.expect(TokenKind::Semi, "';'")?;
                Stmt::Expr(e)
            }
        };
        Ok(vec![stmt])
    }

    /// Looks one token past the current `Ident` without consuming either, to
    /// distinguish `name = expr;` (an assignment statement) from any other
    /// expression statement starting with an identifier (e.g. a call).
    fn peek_is_bare_assign(&self) -> bool {
        let mut probe = self.lexer.clone();
        matches!(probe.next_token(), Ok(tok) if tok.kind == TokenKind::Eq)
    }

    fn parse_assign(&mut self) -> Result<Stmt, ParseError> {
        let name = self.bump()?.text.to_owned();
        self.expect(TokenKind::Eq, "'='")?;
        let rhs = self.parse_expression(0)?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt::Assign { name, rhs })
    }

    fn parse_local_decl(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::Local, "'local'")?;
        let name = self.expect(TokenKind::Ident, "a local variable name")?.text.to_owned();
        let init = if self.current.kind == TokenKind::Eq {
            self.bump()?;
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt::LocalDecl { name, init })
    }

    fn parse_block_until(&mut self, terminators: &[TokenKind]) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        while !terminators.contains(&self.current.kind) {
            body.extend(self.parse_stmt()?);
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::If, "'if'")?;
        let cond = self.parse_expression(0)?;
        let then = self.parse_block_until(&[TokenKind::Elseif, TokenKind::Else, TokenKind::End])?;

        let mut elseif = Vec::new();
        while self.current.kind == TokenKind::Elseif {
            self.bump()?;
            let cond = self.parse_expression(0)?;
            let body = self.parse_block_until(&[TokenKind::Elseif, TokenKind::Else, TokenKind::End])?;
            elseif.push((cond, body));
        }

        let else_ = if self.current.kind == TokenKind::Else {
            self.bump()?;
            Some(self.parse_block_until(&[TokenKind::End])?)
        } else {
            None
        };

        self.expect(TokenKind::End, "'end'")?;
        Ok(Stmt::If {
            cond,
            then,
            elseif,
            else_,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::While, "'while'")?;
        let cond = self.parse_expression(0)?;
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect(TokenKind::End, "'end'")?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_foreach(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::Foreach, "'foreach'")?;
        let var = self.expect(TokenKind::Ident, "a loop variable name")?.text.to_owned();
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.parse_expression(0)?;
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect(TokenKind::End, "'end'")?;
        Ok(Stmt::Foreach { var, iter, body })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::Return, "'return'")?;
        let value = if self.current.kind == TokenKind::Semi {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt::Return(value))
    }

    // ---------------------------------------------------------------
    // Expressions: precedence-climbing (Pratt) parser, spec.md §4.2.
    // ---------------------------------------------------------------

    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            if let Some(bp) = call_index_binding_power(self.current.kind) {
                if bp < min_bp {
                    break;
                }
                lhs = self.parse_postfix_call_or_index(lhs)?;
                continue;
            }

            if let Some(bp) = postfix_step_binding_power(self.current.kind) {
                if bp < min_bp {
                    break;
                }
                let op = self.bump()?;
                lhs = Expr::Call {
                    callee_name: op.text.to_owned(),
                    args: vec![lhs],
                };
                continue;
            }

            let Some((op_text, l_bp, right_assoc)) = infix_binding_power(self.current.kind, self.current.text) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.bump()?;
            let r_bp = if right_assoc { l_bp } else { l_bp + 1 };
            let rhs = self.parse_expression(r_bp)?;
            lhs = Expr::Call {
                callee_name: op_text,
                args: vec![lhs, rhs],
            };
        }

        Ok(lhs)
    }

    fn parse_postfix_call_or_index(&mut self, lhs: Expr) -> Result<Expr, ParseError> {
        if self.current.kind == TokenKind::LParen {
            self.bump()?;
            let args = self.parse_arg_list()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(match lhs {
                Expr::Ident(name) => Expr::Call { callee_name: name, args },
                other => {
                    let mut full_args = vec![other];
                    full_args.extend(args);
                    Expr::Call {
                        callee_name: "<call>".to_owned(),
                        args: full_args,
                    }
                }
            });
        }

        self.expect(TokenKind::LBracket, "'['")?;
        let index = self.parse_expression(0)?;
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::Call {
            callee_name: "[index]".to_owned(),
            args: vec![lhs, index],
        })
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.current.kind != TokenKind::RParen {
            args.push(self.parse_expression(0)?);
            while self.current.kind == TokenKind::Comma {
                self.bump()?;
                args.push(self.parse_expression(0)?);
            }
        }
        Ok(args)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.current.kind {
            TokenKind::Bang | TokenKind::Minus | TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = self.bump()?;
                let operand = self.parse_expression(90)?;
                Ok(Expr::Call {
                    callee_name: op.text.to_owned(),
                    args: vec![operand],
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.current.kind {
            TokenKind::Number => {
                let tok = self.bump()?;
                let n: f64 = tok.text.parse().map_err(|_| ParseError {
                    message: format!("invalid number literal {:?}", tok.text),
                    line: tok.line,
                    column: tok.column,
                })?;
                Ok(Expr::Number(n))
            }
            TokenKind::String => {
                let tok = self.bump()?;
                let inner = &tok.text[1..tok.text.len() - 1];
                Ok(Expr::String(inner.to_owned()))
            }
            TokenKind::Boolean => {
                let tok = self.bump()?;
                Ok(Expr::Boolean(tok.text == "true"))
            }
            TokenKind::Nil => {
                self.bump()?;
                Ok(Expr::Nil)
            }
            TokenKind::Ident => {
                let tok = self.bump()?;
                Ok(Expr::Ident(tok.text.to_owned()))
            }
            TokenKind::LParen => self.parse_paren_expr_or_func_literal(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// Disambiguates a leading `(` between a grouped expression and a
    /// function literal via non-destructive lookahead (spec.md §4.2,
    /// property P7): a full `Parser` clone (lexer + lookahead token) is
    /// used to tentatively parse a parameter-shaped pattern, and the clone
    /// is simply discarded if it doesn't commit, leaving `self` untouched.
    fn parse_paren_expr_or_func_literal(&mut self) -> Result<Expr, ParseError> {
        let mut probe = self.clone();
        if let Some(params) = probe.try_parse_param_shape() {
            if STMT_START_KEYWORDS.contains(&probe.current.kind) {
                *self = probe;
                let mut body = Vec::new();
                while self.current.kind != TokenKind::End {
                    body.extend(self.parse_stmt()?);
                }
                self.expect(TokenKind::End, "'end'")?;
                return Ok(Expr::FuncLiteral { params, body });
            }
        }

        self.expect(TokenKind::LParen, "'('")?;
        let inner = self.parse_expression(0)?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(inner)
    }

    /// Tentatively consumes `'(' (Ident (',' Ident)*)? ')'` on `self`,
    /// returning the parameter names on success. Used only from a throwaway
    /// clone; never called on the parser the caller will keep using.
    fn try_parse_param_shape(&mut self) -> Option<Vec<String>> {
        if self.bump().ok()?.kind != TokenKind::LParen {
            return None;
        }
        let mut params = Vec::new();
        if self.current.kind == TokenKind::Ident {
            params.push(self.bump().ok()?.text.to_owned());
            while self.current.kind == TokenKind::Comma {
                self.bump().ok()?;
                if self.current.kind != TokenKind::Ident {
                    return None;
                }
                params.push(self.bump().ok()?.text.to_owned());
            }
        }
        if self.bump().ok()?.kind != TokenKind::RParen {
            return None;
        }
        Some(params)
    }
}

/// Binding power for the postfix call `(` / index `[` operators (precedence
/// 110, the table's highest).
fn call_index_binding_power(kind: TokenKind) -> Option<u8> {
    matches!(kind, TokenKind::LParen | TokenKind::LBracket).then_some(110)
}

/// Binding power for postfix `++` / `--` (precedence 100).
fn postfix_step_binding_power(kind: TokenKind) -> Option<u8> {
    matches!(kind, TokenKind::PlusPlus | TokenKind::MinusMinus).then_some(100)
}

/// Binding power and associativity for binary infix operators, per the
/// precedence table in spec.md §4.2. Returns `(operator spelling, left
/// binding power, is_right_associative)`.
fn infix_binding_power(kind: TokenKind, text: &str) -> Option<(String, u8, bool)> {
    let (bp, right_assoc) = match kind {
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (80, false),
        TokenKind::Plus | TokenKind::Minus => (70, false),
        TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => (60, false),
        TokenKind::EqEq | TokenKind::Ne => (50, false),
        TokenKind::Amp => (40, false),
        TokenKind::Pipe => (30, false),
        TokenKind::Eq => (10, true),
        _ => return None,
    };
    Some((text.to_owned(), bp, right_assoc))
}
