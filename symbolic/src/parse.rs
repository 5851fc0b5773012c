//! Recursive-descent parser for the textual expression syntax.
//!
//! ```text
//! expr     := term (('+' | '-') term)*
//! term     := unary (('*' | '/') unary)*
//! unary    := '-' unary | power
//! power    := atom ('^' exponent)?
//! exponent := int | '-' int | '(' '-'? int ')'
//! atom     := int | ident | ident '(' args ')' | '(' expr ')'
//! ```
//!
//! Built-in callables are `Cos(a,b)` and `LegendreP(l,a,b)`; any other
//! `name(x)` is an opaque function of the symbol `x`. The identifier `Pi`
//! is the constant π. This is exactly the syntax [`Expr`]'s `Display` emits.

use num_bigint::BigInt;
use num_rational::BigRational;

use crate::error::ParseError;
use crate::expr::Expr;
use crate::symbol::{Symbol, SymbolFactory};

/// Parses `input`, drawing every symbol from `factory`.
///
/// # Errors
///
/// Returns a [`ParseError`] on malformed input, on a built-in called with
/// the wrong number of arguments, on division by (or a negative power of)
/// an expression that is zero or has more than one term, or when a product
/// or power pushes an exponent outside the `i32` range.
///
/// # Example
///
/// ```
/// use lss_symbolic::{parse, Expr, SymbolFactory};
///
/// let mut sf = SymbolFactory::new();
/// let e = parse("q^2*Cos(q,k)^2/3", &mut sf).unwrap();
/// let q = sf.make_symbol("q");
/// let k = sf.make_symbol("k");
/// let expected = (Expr::symbol(&q).pow(2) * Expr::cos(&q, &k).pow(2))
///     .scale(&lss_symbolic::expr::rational(1, 3));
/// assert_eq!(e, expected);
/// ```
pub fn parse(input: &str, factory: &mut SymbolFactory) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
        factory,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some((token, position)) => Err(ParseError::UnexpectedToken {
            found: token.describe(),
            expected: "end of input",
            position,
        }),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Int(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(s) => format!("integer '{s}'"),
            Token::Ident(s) => format!("identifier '{s}'"),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c.is_ascii_digit() {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek().filter(|(_, d)| d.is_ascii_digit()) {
                literal.push(d);
                chars.next();
            }
            tokens.push((Token::Int(literal), position));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars
                .peek()
                .filter(|(_, d)| d.is_ascii_alphanumeric() || *d == '_')
            {
                ident.push(d);
                chars.next();
            }
            tokens.push((Token::Ident(ident), position));
            continue;
        }
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            other => {
                return Err(ParseError::UnexpectedCharacter {
                    character: other,
                    position,
                })
            }
        };
        tokens.push((token, position));
        chars.next();
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
    end: usize,
    factory: &'a mut SymbolFactory,
}

impl Parser<'_> {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.cursor).cloned()
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let next = self.peek();
        if next.is_some() {
            self.cursor += 1;
        }
        next
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|(t, _)| &t == expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some((token, position)) => ParseError::UnexpectedToken {
                found: token.describe(),
                expected,
                position,
            },
            None => ParseError::UnexpectedToken {
                found: "end of input".to_string(),
                expected,
                position: self.end,
            },
        }
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut acc = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                acc += self.term()?;
            } else if self.eat(&Token::Minus) {
                acc -= self.term()?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut acc = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                acc = acc.try_mul(&self.unary()?)?;
            } else if self.eat(&Token::Slash) {
                let divisor = self.unary()?;
                acc = acc.try_div(&divisor)?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            Ok(-self.unary()?)
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.atom()?;
        if !self.eat(&Token::Caret) {
            return Ok(base);
        }
        let exponent = self.exponent()?;
        Ok(base.powi(exponent)?)
    }

    fn exponent(&mut self) -> Result<i32, ParseError> {
        let parenthesized = self.eat(&Token::LParen);
        let negative = self.eat(&Token::Minus);
        let magnitude = self.small_int("integer exponent")?;
        if parenthesized {
            self.expect(&Token::RParen, "')'")?;
        }
        Ok(if negative { -magnitude } else { magnitude })
    }

    fn small_int(&mut self, expected: &'static str) -> Result<i32, ParseError> {
        match self.peek() {
            Some((Token::Int(literal), _)) => {
                self.cursor += 1;
                literal
                    .parse::<i32>()
                    .map_err(|_| ParseError::ExponentOutOfRange { literal })
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn symbol_arg(&mut self) -> Result<Symbol, ParseError> {
        match self.peek() {
            Some((Token::Ident(name), _)) => {
                self.cursor += 1;
                Ok(self.factory.make_symbol(&name))
            }
            _ => Err(self.unexpected("symbol argument")),
        }
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some((Token::Int(literal), _)) => {
                let value: BigInt = literal
                    .parse()
                    .map_err(|_| ParseError::ExponentOutOfRange { literal })?;
                Ok(Expr::constant(BigRational::from_integer(value)))
            }
            Some((Token::LParen, _)) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some((Token::Ident(name), _)) => {
                if self.eat(&Token::LParen) {
                    self.call(&name)
                } else if name == "Pi" {
                    Ok(Expr::pi())
                } else {
                    Ok(Expr::symbol(&self.factory.make_symbol(&name)))
                }
            }
            Some(_) => {
                self.cursor -= 1;
                Err(self.unexpected("operand"))
            }
            None => Err(self.unexpected("operand")),
        }
    }

    /// Parses the argument list of `name(`, the opening parenthesis consumed.
    fn call(&mut self, name: &str) -> Result<Expr, ParseError> {
        let expected = match name {
            "Cos" => 2,
            "LegendreP" => 3,
            _ => 1,
        };
        let result = match name {
            "Cos" => {
                let a = self.symbol_arg()?;
                self.arity_comma(name, expected, 1)?;
                let b = self.symbol_arg()?;
                Expr::cos(&a, &b)
            }
            "LegendreP" => {
                let order = self.small_int("Legendre order")?;
                let order = u32::try_from(order).map_err(|_| ParseError::ExponentOutOfRange {
                    literal: order.to_string(),
                })?;
                self.arity_comma(name, expected, 1)?;
                let a = self.symbol_arg()?;
                self.arity_comma(name, expected, 2)?;
                let b = self.symbol_arg()?;
                Expr::legendre(order, &a, &b)
            }
            _ => {
                let arg = self.symbol_arg()?;
                Expr::function(name, &arg)
            }
        };
        if self.peek().is_some_and(|(t, _)| t == Token::Comma) {
            return Err(ParseError::Arity {
                function: name.to_string(),
                expected,
                found: expected + 1,
            });
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(result)
    }

    fn arity_comma(&mut self, name: &str, expected: usize, seen: usize) -> Result<(), ParseError> {
        if self.eat(&Token::Comma) {
            Ok(())
        } else if self.peek().is_some_and(|(t, _)| t == Token::RParen) {
            Err(ParseError::Arity {
                function: name.to_string(),
                expected,
                found: seen,
            })
        } else {
            Err(self.unexpected("','"))
        }
    }
}
