//! Recursive-descent parser producing [`Expr`] trees
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, equality, relational,
//! additive, multiplicative, unary. Binary operators associate left,
//! the conditional associates right.

use crate::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::error::{CalcError, GuardError, ParseError};
use crate::lexer::{tokenize, Spanned, Token};
use voltage_model::Value;

/// Maximum parser recursion (parentheses, unary chains, nested calls)
pub const MAX_NESTING: usize = 128;

/// Hard ceiling on tree depth; configured depth limits above it are clamped
pub const MAX_TREE_DEPTH: usize = 256;

/// Words that name language features the sandbox does not offer
const RESERVED: [&str; 16] = [
    "new",
    "this",
    "function",
    "class",
    "delete",
    "typeof",
    "void",
    "in",
    "instanceof",
    "var",
    "let",
    "const",
    "return",
    "import",
    "export",
    "await",
];

/// Parse a normalized expression
///
/// # Example
/// ```
/// use voltage_calc::{parse, Expr};
///
/// let expr = parse("min(a, 10) * 2").unwrap();
/// assert!(matches!(expr, Expr::Binary { .. }));
/// assert!(parse("a.b").is_err());
/// ```
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(source, MAX_TREE_DEPTH)?;
    parser.run()
}

/// Parse with the tree depth capped at `max_depth` (itself capped at
/// [`MAX_TREE_DEPTH`])
///
/// Exceeding the depth is reported as [`GuardError::TooDeep`], the same
/// error the complexity guard raises, so deep trees are rejected before
/// they are fully built.
pub fn parse_bounded(source: &str, max_depth: usize) -> Result<Expr, CalcError> {
    let limit = max_depth.min(MAX_TREE_DEPTH);
    let mut parser = Parser::new(source, limit)?;
    match parser.run() {
        Ok(expr) => Ok(expr),
        Err(_) if parser.depth_exceeded => Err(GuardError::TooDeep { limit }.into()),
        Err(e) => Err(e.into()),
    }
}

/// Expression plus its depth, tracked while building
struct Node(Expr, usize);

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    nesting: usize,
    end: usize,
    max_depth: usize,
    depth_exceeded: bool,
}

impl Parser {
    fn new(source: &str, max_depth: usize) -> Result<Self, ParseError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        Ok(Self {
            tokens,
            pos: 0,
            nesting: 0,
            end: source.chars().count(),
            max_depth,
            depth_exceeded: false,
        })
    }

    fn run(&mut self) -> Result<Expr, ParseError> {
        let Node(expr, _) = self.conditional()?;

        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(ParseError::new(
                format!("Unexpected token '{}'", extra.token),
                extra.position,
            ));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<(), ParseError> {
        if self.eat(&expected) {
            return Ok(());
        }
        let found = self
            .peek()
            .map(|t| format!("'{}'", t))
            .unwrap_or_else(|| "end of expression".to_string());
        Err(ParseError::new(
            format!("Expected '{}' {}, found {}", expected, context, found),
            self.position(),
        ))
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(ParseError::new(
                format!("Expression nested deeper than {} levels", MAX_NESTING),
                self.position(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn node(&mut self, expr: Expr, depth: usize) -> Result<Node, ParseError> {
        if depth > self.max_depth {
            self.depth_exceeded = true;
            return Err(ParseError::new(
                format!("Expression deeper than {} levels", self.max_depth),
                self.position(),
            ));
        }
        Ok(Node(expr, depth))
    }

    fn conditional(&mut self) -> Result<Node, ParseError> {
        let test = self.logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }

        self.enter()?;
        let consequent = self.conditional()?;
        self.expect(Token::Colon, "in conditional expression")?;
        let alternate = self.conditional()?;
        self.leave();

        let depth = test.1.max(consequent.1).max(alternate.1) + 1;
        self.node(
            Expr::Conditional {
                test: Box::new(test.0),
                consequent: Box::new(consequent.0),
                alternate: Box::new(alternate.0),
            },
            depth,
        )
    }

    fn logical_or(&mut self) -> Result<Node, ParseError> {
        let mut left = self.logical_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.logical_and()?;
            left = self.logical(LogicalOp::Or, left, right)?;
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Node, ParseError> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = self.logical(LogicalOp::And, left, right)?;
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Node, ParseError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::EqEqEq) => BinaryOp::StrictEq,
                Some(Token::NotEqEq) => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.relational()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn relational(&mut self) -> Result<Node, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn additive(&mut self) -> Result<Node, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn multiplicative(&mut self) -> Result<Node, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn unary(&mut self) -> Result<Node, ParseError> {
        let op = match self.peek() {
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Minus) => UnaryOp::Minus,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.pos += 1;

        self.enter()?;
        let operand = self.unary()?;
        self.leave();

        let depth = operand.1 + 1;
        self.node(
            Expr::Unary {
                op,
                operand: Box::new(operand.0),
            },
            depth,
        )
    }

    /// Primary expression followed by a check for unsupported postfix syntax
    fn postfix(&mut self) -> Result<Node, ParseError> {
        let primary = self.primary()?;
        match self.peek() {
            Some(Token::Dot) | Some(Token::LBracket) => Err(ParseError::new(
                "Member access is not supported",
                self.position(),
            )),
            Some(Token::LParen) => Err(ParseError::new(
                "Only named functions can be called",
                self.position(),
            )),
            _ => Ok(primary),
        }
    }

    fn primary(&mut self) -> Result<Node, ParseError> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Unexpected end of expression", position));
        };

        match token {
            Token::Number(n) => Ok(Node(Expr::Literal(Value::Number(n)), 1)),
            Token::Str(s) => Ok(Node(Expr::Literal(Value::String(s)), 1)),
            Token::Ident(name) => self.identifier(name, position),
            Token::LParen => {
                self.enter()?;
                let inner = self.conditional()?;
                self.expect(Token::RParen, "to close '('")?;
                self.leave();
                Ok(inner)
            },
            other => Err(ParseError::new(
                format!("Unexpected token '{}'", other),
                position,
            )),
        }
    }

    fn identifier(&mut self, name: String, position: usize) -> Result<Node, ParseError> {
        if RESERVED.contains(&name.as_str()) {
            return Err(ParseError::new(
                format!("'{}' expressions are not supported", name),
                position,
            ));
        }

        let literal = match name.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            "undefined" => Some(Value::Undefined),
            "NaN" => Some(Value::Number(f64::NAN)),
            "Infinity" => Some(Value::Number(f64::INFINITY)),
            _ => None,
        };
        if let Some(value) = literal {
            return Ok(Node(Expr::Literal(value), 1));
        }

        if !self.eat(&Token::LParen) {
            return Ok(Node(Expr::Identifier(name), 1));
        }

        self.enter()?;
        let mut args = Vec::new();
        let mut depth = 0;
        if !self.eat(&Token::RParen) {
            loop {
                let arg = self.conditional()?;
                depth = depth.max(arg.1);
                args.push(arg.0);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma, &format!("between arguments of {}()", name))?;
            }
        }
        self.leave();

        self.node(Expr::Call { callee: name, args }, depth + 1)
    }

    fn binary(&mut self, op: BinaryOp, left: Node, right: Node) -> Result<Node, ParseError> {
        let depth = left.1.max(right.1) + 1;
        self.node(
            Expr::Binary {
                op,
                left: Box::new(left.0),
                right: Box::new(right.0),
            },
            depth,
        )
    }

    fn logical(&mut self, op: LogicalOp, left: Node, right: Node) -> Result<Node, ParseError> {
        let depth = left.1.max(right.1) + 1;
        self.node(
            Expr::Logical {
                op,
                left: Box::new(left.0),
                right: Box::new(right.0),
            },
            depth,
        )
    }
}
