use super::*;

/// Relation of a parsed constraint `lhs REL rhs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Le,
    Lt,
    Ge,
    Gt,
    Eq,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Le => "<=",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
            CmpOp::Eq => "==",
        };
        write!(f, "{}", s)
    }
}

/// A parsed constraint text, or one of the boolean literals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constraint {
    Bool(bool),
    Cmp(Poly, CmpOp, Poly),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse {input:?} at column {column}: {message}")]
pub struct ParseError {
    pub input: String,
    pub column: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Tok {
    Num(BigInt),
    Ident(String),
    Plus,
    Minus,
    Star,
    Caret,
    LParen,
    RParen,
    Cmp(CmpOp),
}

/// Highest exponent accepted after `^`.
const MAX_EXP: u32 = 64;

struct Parser<'a> {
    input: &'a str,
    toks: Vec<(usize, Tok)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ParseError> {
        let toks = lex(input)?;
        Ok(Parser {
            input,
            toks,
            pos: 0,
        })
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        let column = self
            .toks
            .get(self.pos)
            .map(|(c, _)| *c)
            .unwrap_or(self.input.len());
        ParseError {
            input: self.input.to_string(),
            column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|(_, t)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Poly, ParseError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => {
                    self.bump();
                    acc = acc + self.term()?;
                }
                Some(Tok::Minus) => {
                    self.bump();
                    acc = acc - self.term()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    // term := factor ('*' factor)*
    fn term(&mut self) -> Result<Poly, ParseError> {
        let mut acc = self.factor()?;
        while let Some(Tok::Star) = self.peek() {
            self.bump();
            acc = acc * self.factor()?;
        }
        Ok(acc)
    }

    // factor := '-' factor | primary ('^' NUM)?
    fn factor(&mut self) -> Result<Poly, ParseError> {
        if let Some(Tok::Minus) = self.peek() {
            self.bump();
            return Ok(-self.factor()?);
        }
        let base = self.primary()?;
        if let Some(Tok::Caret) = self.peek() {
            self.bump();
            let exp = match self.bump() {
                Some(Tok::Num(n)) => u32::try_from(n)
                    .ok()
                    .filter(|e| *e <= MAX_EXP)
                    .ok_or_else(|| self.err("exponent out of range"))?,
                _ => return Err(self.err("expected exponent")),
            };
            return Ok(base.pow(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Poly, ParseError> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Poly::constant(BigRational::from_integer(n))),
            Some(Tok::Ident(name)) => Ok(Poly::var(&name)),
            Some(Tok::LParen) => {
                let inner = self.expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(self.err("expected ')'")),
                }
            }
            Some(_) => {
                self.pos -= 1;
                Err(self.err("unexpected token"))
            }
            None => Err(self.err("unexpected end of input")),
        }
    }
}

fn lex(input: &str) -> Result<Vec<(usize, Tok)>, ParseError> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let fail = |column: usize, message: &str| ParseError {
        input: input.to_string(),
        column,
        message: message.to_string(),
    };
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '+' => out.push((start, Tok::Plus)),
            '-' => out.push((start, Tok::Minus)),
            '*' => out.push((start, Tok::Star)),
            '^' => out.push((start, Tok::Caret)),
            '(' => out.push((start, Tok::LParen)),
            ')' => out.push((start, Tok::RParen)),
            '<' | '>' | '=' => {
                let next = bytes.get(i + 1).map(|b| *b as char);
                let (op, width) = match (c, next) {
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('=', Some('=')) => (CmpOp::Eq, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    _ => return Err(fail(start, "expected '=='")),
                };
                out.push((start, Tok::Cmp(op)));
                i += width;
                continue;
            }
            d if d.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let n: BigInt = input[start..i]
                    .parse()
                    .map_err(|_| fail(start, "bad integer"))?;
                out.push((start, Tok::Num(n)));
                continue;
            }
            a if a.is_ascii_alphabetic() || a == '_' => {
                while i < bytes.len() {
                    let ch = bytes[i] as char;
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                out.push((start, Tok::Ident(input[start..i].to_string())));
                continue;
            }
            _ => return Err(fail(start, "unexpected character")),
        }
        i += 1;
    }
    Ok(out)
}

/// Parse a polynomial expression such as `x^2*y - 3*(z + 1)`.
pub fn parse_poly(input: &str) -> Result<Poly, ParseError> {
    let mut p = Parser::new(input)?;
    let poly = p.expr()?;
    if !p.at_end() {
        return Err(p.err("trailing input"));
    }
    Ok(poly)
}

/// Parse a constraint `lhs REL rhs` where REL is one of `<= < >= > ==`,
/// or the literals `true` / `false`.
pub fn parse_constraint(input: &str) -> Result<Constraint, ParseError> {
    match input.trim() {
        "true" | "True" => return Ok(Constraint::Bool(true)),
        "false" | "False" => return Ok(Constraint::Bool(false)),
        _ => {}
    }
    let mut p = Parser::new(input)?;
    let lhs = p.expr()?;
    let op = match p.bump() {
        Some(Tok::Cmp(op)) => op,
        _ => {
            p.pos = p.pos.saturating_sub(1);
            return Err(p.err("expected comparison operator"));
        }
    };
    let rhs = p.expr()?;
    if !p.at_end() {
        return Err(p.err("trailing input"));
    }
    Ok(Constraint::Cmp(lhs, op, rhs))
}
