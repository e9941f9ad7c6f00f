//! Formula columns: `name = expression` over existing columns.
//!
//! The grammar is deliberately small and has no way to call functions or
//! touch anything but the row being evaluated:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | atom
//! atom   := number | identifier | '`' any text '`' | '(' expr ')'
//! ```
//!
//! Identifiers start with a letter or `_` and may contain letters, digits,
//! `_` and `.`; column names with other characters are written in backticks.

use std::collections::BTreeSet;

use crate::error::FormulaError;
use crate::table::{Cell, Column, Table};

// =============================================================================
// Syntax tree
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Cell),
    Column(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => {
                out.insert(name);
            }
            Expr::Neg(inner) => inner.collect_columns(out),
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
        }
    }

    /// Name used in type errors: the column, or a generic label.
    fn label(&self) -> &str {
        match self {
            Expr::Column(name) => name,
            _ => "<expression>",
        }
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Cell),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<(usize, Token)>, FormulaError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if c == '(' {
            tokens.push((start, Token::LParen));
            i += 1;
        } else if c == ')' {
            tokens.push((start, Token::RParen));
            i += 1;
        } else if matches!(c, '+' | '-' | '*' | '/') {
            tokens.push((start, Token::Op(c)));
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent: 1e5, 2.5E-3
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j], '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let s: String = chars[start..i].iter().collect();
            let number = match s.parse::<i64>() {
                Ok(n) => Cell::Int(n),
                Err(_) => s.parse::<f64>().map(Cell::Float).map_err(|_| FormulaError::Syntax {
                    position: start,
                    message: format!("invalid number '{s}'"),
                })?,
            };
            tokens.push((start, Token::Number(number)));
        } else if c == '`' {
            i += 1;
            let name_start = i;
            while i < chars.len() && chars[i] != '`' {
                i += 1;
            }
            if i == chars.len() {
                return Err(FormulaError::Syntax {
                    position: start,
                    message: "unterminated `quoted` column name".to_string(),
                });
            }
            let name: String = chars[name_start..i].iter().collect();
            tokens.push((start, Token::Ident(name)));
            i += 1;
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            tokens.push((start, Token::Ident(name)));
        } else {
            return Err(FormulaError::Syntax {
                position: start,
                message: format!("unexpected character '{c}'"),
            });
        }
    }
    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> FormulaError {
        FormulaError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    /// expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' { BinOp::Add } else { BinOp::Sub };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek() {
            let op = if *c == '*' { BinOp::Mul } else { BinOp::Div };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// unary := '-' unary | atom
    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, FormulaError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(n))
            }
            Token::Ident(name) => {
                self.pos += 1;
                Ok(Expr::Column(name))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("expected ')'")),
                }
            }
            Token::RParen => Err(self.error("unexpected ')'")),
            Token::Op(c) => Err(self.error(format!("unexpected operator '{c}'"))),
        }
    }
}

/// Parse an arithmetic expression.
pub fn parse_expression(text: &str) -> Result<Expr, FormulaError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
        end: text.chars().count(),
    };
    let expr = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

// =============================================================================
// Formula
// =============================================================================

/// A parsed `name = expression` formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub target: String,
    pub expr: Expr,
}

impl Formula {
    /// Split at the first `=` and parse the right-hand side.
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let (name, expression) = text
            .split_once('=')
            .ok_or_else(|| FormulaError::MissingAssignment(text.to_string()))?;
        let target = name.trim().trim_matches('`').trim().to_string();
        if target.is_empty() {
            return Err(FormulaError::MissingAssignment(text.to_string()));
        }
        Ok(Self {
            target,
            expr: parse_expression(expression)?,
        })
    }

    /// Column names the expression reads.
    pub fn referenced_columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.expr.collect_columns(&mut out);
        out
    }

    /// Evaluate against every row, producing the target column.
    pub fn evaluate(&self, table: &Table) -> Result<Column, FormulaError> {
        if let Some(unknown) = self.referenced_columns().into_iter().find(|c| !table.has_column(c)) {
            return Err(FormulaError::UnknownColumn(unknown.to_string()));
        }
        let values = (0..table.num_rows())
            .map(|row| eval(&self.expr, table, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Column::new(self.target.clone(), values))
    }
}

/// Parse `formula` and add (or overwrite) its column on a copy of `table`.
pub fn apply_formula(table: &Table, formula: &str) -> Result<Table, FormulaError> {
    let formula = Formula::parse(formula)?;
    let column = formula.evaluate(table)?;
    let mut out = table.clone();
    out.put_column(column);
    Ok(out)
}

fn eval(expr: &Expr, table: &Table, row: usize) -> Result<Cell, FormulaError> {
    match expr {
        Expr::Literal(c) => Ok(c.clone()),
        Expr::Column(name) => Ok(table
            .column(name)
            .map(|c| c.values[row].clone())
            .unwrap_or_default()),
        Expr::Neg(inner) => {
            let value = eval(inner, table, row)?;
            match value {
                Cell::Missing => Ok(Cell::Missing),
                Cell::Int(i) => Ok(i.checked_neg().map(Cell::Int).unwrap_or(Cell::Float(-(i as f64)))),
                Cell::Bool(b) => Ok(Cell::Int(-(b as i64))),
                Cell::Float(f) => Ok(Cell::Float(-f)),
                other => Err(mismatch('-', inner, other)),
            }
        }
        Expr::Binary { op, left, right } => {
            let l = eval(left, table, row)?;
            let r = eval(right, table, row)?;
            arithmetic(*op, (left, l), (right, r))
        }
    }
}

fn mismatch(op: char, source: &Expr, value: Cell) -> FormulaError {
    FormulaError::TypeMismatch {
        op,
        column: source.label().to_string(),
        kind: value.cell_type().unwrap_or(crate::table::CellType::Text),
        value: value.to_string(),
    }
}

fn arithmetic(op: BinOp, left: (&Expr, Cell), right: (&Expr, Cell)) -> Result<Cell, FormulaError> {
    let (lexpr, l) = left;
    let (rexpr, r) = right;
    for (expr, value) in [(lexpr, &l), (rexpr, &r)] {
        if matches!(value, Cell::Text(_) | Cell::Timestamp(_)) {
            return Err(mismatch(op.symbol(), expr, value.clone()));
        }
    }
    if l.is_missing() || r.is_missing() {
        return Ok(Cell::Missing);
    }

    let as_int = |c: &Cell| match c {
        Cell::Int(i) => Some(*i),
        Cell::Bool(b) => Some(*b as i64),
        _ => None,
    };
    if let (Some(a), Some(b)) = (as_int(&l), as_int(&r)) {
        let exact = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div => None,
        };
        if let Some(v) = exact {
            return Ok(Cell::Int(v));
        }
    }

    // Both operands are numeric here.
    let (a, b) = (l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default());
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div if b == 0.0 => return Ok(Cell::Missing),
        BinOp::Div => a / b,
    };
    Ok(if result.is_finite() {
        Cell::Float(result)
    } else {
        Cell::Missing
    })
}
