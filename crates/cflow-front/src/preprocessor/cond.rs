//! Conditional-compilation frame stack and the `#if`/`#elif` expression
//! evaluator (spec §4.1).

use super::macro_table::MacroTable;
use super::token::{Token, TokenKind};
use crate::error::PreprocessError;

/// One level of `#if`/`#ifdef`/`#ifndef` nesting.
#[derive(Debug, Clone, Copy)]
pub struct CondFrame {
    pub active: bool,
    pub seen_else: bool,
    pub any_active: bool,
}

/// The stack of conditional-compilation frames for one translation unit.
#[derive(Debug, Clone, Default)]
pub struct CondStack {
    frames: Vec<CondFrame>,
}

impl CondStack {
    pub fn new() -> Self {
        CondStack::default()
    }

    /// `true` if no enclosing frame is inactive; tokens are only emitted
    /// (and directives only semantically effective) when this holds.
    pub fn is_active(&self) -> bool {
        self.frames.iter().all(|f| f.active)
    }

    pub fn push_if(&mut self, condition: bool) {
        let parent_active = self.is_active();
        let active = parent_active && condition;
        self.frames.push(CondFrame { active, seen_else: false, any_active: active });
    }

    pub fn push_elif(&mut self, condition: bool) -> Result<(), PreprocessError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(PreprocessError::StrayElse { file: String::new() })?;
        if frame.seen_else {
            return Err(PreprocessError::ElifAfterElse { file: String::new() });
        }
        let parent_active = self.frames[..self.frames.len() - 1]
            .iter()
            .all(|f| f.active);
        let frame = self.frames.last_mut().unwrap();
        let active = parent_active && !frame.any_active && condition;
        frame.active = active;
        frame.any_active |= active;
        Ok(())
    }

    /// Whether an `#elif` encountered right now would actually take effect:
    /// its parent is active and no earlier arm of this chain already fired.
    /// A real preprocessor never evaluates a dead `#elif`'s expression, so
    /// callers should skip macro expansion and evaluation entirely when this
    /// is `false` rather than run them just to discard the result.
    pub fn elif_reachable(&self) -> bool {
        let Some(frame) = self.frames.last() else { return false };
        if frame.seen_else {
            return false;
        }
        let parent_active = self.frames[..self.frames.len() - 1].iter().all(|f| f.active);
        parent_active && !frame.any_active
    }

    pub fn push_else(&mut self) -> Result<(), PreprocessError> {
        let parent_active = self.frames[..self.frames.len().saturating_sub(1)]
            .iter()
            .all(|f| f.active);
        let frame = self
            .frames
            .last_mut()
            .ok_or(PreprocessError::StrayElse { file: String::new() })?;
        if frame.seen_else {
            return Err(PreprocessError::ElifAfterElse { file: String::new() });
        }
        frame.seen_else = true;
        frame.active = parent_active && !frame.any_active;
        frame.any_active |= frame.active;
        Ok(())
    }

    pub fn pop_endif(&mut self) -> Result<(), PreprocessError> {
        self.frames
            .pop()
            .map(|_| ())
            .ok_or(PreprocessError::StrayElse { file: String::new() })
    }

    pub fn is_balanced(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Evaluates a `#if`/`#elif` expression (already macro-expanded and with
/// `defined` resolved) over 64-bit signed integers, via precedence
/// climbing. Precedence, low to high: `?: || && | ^ & == != < <= > >=
/// << >> + - * / % unary primary`.
pub fn eval_expr(tokens: &[Token]) -> Result<i64, PreprocessError> {
    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Newline | TokenKind::Eof))
        .collect();
    let mut p = ExprParser { toks: significant, pos: 0 };
    let v = p.parse_ternary()?;
    if p.pos != p.toks.len() {
        return Err(PreprocessError::MalformedExpression {
            reason: "trailing tokens after expression".to_string(),
        });
    }
    Ok(v)
}

struct ExprParser<'a> {
    toks: Vec<&'a Token>,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn peek_punct(&self) -> Option<&str> {
        match self.toks.get(self.pos).map(|t| &t.kind) {
            Some(TokenKind::Punctuator(p)) => Some(p.as_str()),
            _ => None,
        }
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn parse_ternary(&mut self) -> Result<i64, PreprocessError> {
        let cond = self.parse_logor()?;
        if self.peek_punct() == Some("?") {
            self.bump();
            let then_v = self.parse_ternary()?;
            if self.peek_punct() != Some(":") {
                return Err(PreprocessError::MalformedExpression {
                    reason: "expected ':' in conditional expression".to_string(),
                });
            }
            self.bump();
            let else_v = self.parse_ternary()?;
            return Ok(if cond != 0 { then_v } else { else_v });
        }
        Ok(cond)
    }

    fn parse_binary(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<i64, PreprocessError>,
        apply: fn(&str, i64, i64) -> Result<i64, PreprocessError>,
    ) -> Result<i64, PreprocessError> {
        let mut lhs = next(self)?;
        loop {
            let Some(op) = self.peek_punct() else { break };
            if !ops.contains(&op) {
                break;
            }
            let op = op.to_string();
            self.bump();
            let rhs = next(self)?;
            lhs = apply(&op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_logor(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["||"], Self::parse_logand, |_, l, r| {
            Ok(((l != 0) || (r != 0)) as i64)
        })
    }

    fn parse_logand(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["&&"], Self::parse_bitor, |_, l, r| {
            Ok(((l != 0) && (r != 0)) as i64)
        })
    }

    fn parse_bitor(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["|"], Self::parse_bitxor, |_, l, r| Ok(l | r))
    }

    fn parse_bitxor(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["^"], Self::parse_bitand, |_, l, r| Ok(l ^ r))
    }

    fn parse_bitand(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["&"], Self::parse_equality, |_, l, r| Ok(l & r))
    }

    fn parse_equality(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["==", "!="], Self::parse_relational, |op, l, r| {
            Ok(match op {
                "==" => (l == r) as i64,
                _ => (l != r) as i64,
            })
        })
    }

    fn parse_relational(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["<", "<=", ">", ">="], Self::parse_shift, |op, l, r| {
            Ok(match op {
                "<" => (l < r) as i64,
                "<=" => (l <= r) as i64,
                ">" => (l > r) as i64,
                _ => (l >= r) as i64,
            })
        })
    }

    fn parse_shift(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["<<", ">>"], Self::parse_additive, |op, l, r| {
            let shift = (r & 63) as u32;
            Ok(if op == "<<" { l.wrapping_shl(shift) } else { l.wrapping_shr(shift) })
        })
    }

    fn parse_additive(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["+", "-"], Self::parse_multiplicative, |op, l, r| {
            Ok(if op == "+" { l.wrapping_add(r) } else { l.wrapping_sub(r) })
        })
    }

    fn parse_multiplicative(&mut self) -> Result<i64, PreprocessError> {
        self.parse_binary(&["*", "/", "%"], Self::parse_unary, |op, l, r| match op {
            "*" => Ok(l.wrapping_mul(r)),
            "/" => {
                if r == 0 {
                    Ok(0) // wrap, matching GCC's non-fatal behavior in constant folding here
                } else {
                    Ok(l.wrapping_div(r))
                }
            }
            _ => {
                if r == 0 {
                    Ok(0)
                } else {
                    Ok(l.wrapping_rem(r))
                }
            }
        })
    }

    fn parse_unary(&mut self) -> Result<i64, PreprocessError> {
        if let Some(op) = self.peek_punct() {
            if ["!", "-", "+", "~"].contains(&op) {
                let op = op.to_string();
                self.bump();
                let v = self.parse_unary()?;
                return Ok(match op.as_str() {
                    "!" => (v == 0) as i64,
                    "-" => v.wrapping_neg(),
                    "+" => v,
                    _ => !v,
                });
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<i64, PreprocessError> {
        let Some(tok) = self.toks.get(self.pos).copied() else {
            return Err(PreprocessError::MalformedExpression {
                reason: "unexpected end of expression".to_string(),
            });
        };
        match &tok.kind {
            TokenKind::Number(n) => {
                self.bump();
                Ok(parse_number(n))
            }
            TokenKind::CharConst(c) => {
                self.bump();
                Ok(c.chars().next().map(|c| c as i64).unwrap_or(0))
            }
            TokenKind::Identifier(_) => {
                // Undefined identifiers (post-expansion) evaluate to 0.
                self.bump();
                Ok(0)
            }
            TokenKind::Punctuator(p) if p == "(" => {
                self.bump();
                let v = self.parse_ternary()?;
                if self.peek_punct() != Some(")") {
                    return Err(PreprocessError::MalformedExpression {
                        reason: "expected ')'".to_string(),
                    });
                }
                self.bump();
                Ok(v)
            }
            other => Err(PreprocessError::MalformedExpression {
                reason: format!("unexpected token {other:?}"),
            }),
        }
    }
}

/// Parses a pp-number's leading digits as a (possibly hex/octal) integer,
/// ignoring trailing type suffixes (`u`, `l`, `ul`, `ll`, ...).
fn parse_number(text: &str) -> i64 {
    let digits: String = text
        .chars()
        .take_while(|c| c.is_ascii_hexdigit() || *c == 'x' || *c == 'X')
        .collect();
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return i64::from_str_radix(&digits, 8).unwrap_or(0);
    }
    digits.parse().unwrap_or(0)
}

/// Resolves `defined X` / `defined(X)` *before* macro expansion runs, per
/// spec §4.1, replacing each occurrence with a `0`/`1` number token.
pub fn resolve_defined(tokens: &[Token], table: &MacroTable) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].is_identifier("defined") {
            let (name, consumed) = if tokens.get(i + 1).map(|t| t.is_punct("(")).unwrap_or(false) {
                let name = tokens
                    .get(i + 2)
                    .and_then(|t| match &t.kind {
                        TokenKind::Identifier(n) => Some(n.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                (name, 4)
            } else {
                let name = tokens
                    .get(i + 1)
                    .and_then(|t| match &t.kind {
                        TokenKind::Identifier(n) => Some(n.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                (name, 2)
            };
            let value = if table.is_defined(&name) { "1" } else { "0" };
            out.push(Token::new(
                TokenKind::Number(value.to_string()),
                tokens[i].line,
                tokens[i].col,
            ));
            i += consumed;
            continue;
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::lexer::lex;
    use cflow_core::DiagnosticBag;

    fn eval(src: &str) -> i64 {
        let mut diags = DiagnosticBag::new();
        let toks = lex(src, "t.c", &mut diags);
        eval_expr(&toks).unwrap()
    }

    #[test]
    fn precedence_respects_standard_c_ordering() {
        assert_eq!(eval("1 + 2 * 3"), 7);
        assert_eq!(eval("(1 + 2) * 3"), 9);
        assert_eq!(eval("1 || 0 && 0"), 1);
        assert_eq!(eval("2 + 3 == 5"), 1);
    }

    #[test]
    fn ternary_and_unary() {
        assert_eq!(eval("1 ? 2 : 3"), 2);
        assert_eq!(eval("!0"), 1);
        assert_eq!(eval("-5 + 3"), -2);
        assert_eq!(eval("~0"), -1);
    }

    #[test]
    fn frame_stack_handles_if_elif_else_endif() {
        let mut stack = CondStack::new();
        stack.push_if(false);
        assert!(!stack.is_active());
        stack.push_elif(true).unwrap();
        assert!(stack.is_active());
        stack.push_else().unwrap();
        assert!(!stack.is_active());
        stack.pop_endif().unwrap();
        assert!(stack.is_balanced());
    }

    #[test]
    fn nested_inactive_parent_forces_child_inactive() {
        let mut stack = CondStack::new();
        stack.push_if(false);
        stack.push_if(true);
        assert!(!stack.is_active());
        stack.pop_endif().unwrap();
        assert!(!stack.is_active());
        stack.pop_endif().unwrap();
        assert!(stack.is_balanced());
    }

    #[test]
    fn division_by_zero_wraps_to_zero() {
        assert_eq!(eval("1 / 0"), 0);
    }

    #[test]
    fn defined_is_resolved_before_expansion() {
        let mut table = MacroTable::new();
        table.define_object("FOO", vec![]);
        let mut diags = DiagnosticBag::new();
        let toks = lex("defined(FOO) + defined BAR", "t.c", &mut diags);
        let resolved = resolve_defined(&toks, &table);
        assert_eq!(eval_expr(&resolved).unwrap(), 1);
    }

    proptest::proptest! {
        /// `a + b * c` must always equal `a + (b * c)`, for any bracket of
        /// small integers — i.e. multiplication binds tighter than addition
        /// regardless of operand values, including negatives and zero.
        #[test]
        fn multiplication_binds_tighter_than_addition(a in -50i64..50, b in -50i64..50, c in -50i64..50) {
            let src = format!("{a} + {b} * {c}");
            let explicit = format!("{a} + ({b} * {c})");
            proptest::prop_assert_eq!(eval(&src), eval(&explicit));
        }

        /// Parenthesization that matches the natural precedence ordering is
        /// a no-op: wrapping the already-highest-precedence operand changes
        /// nothing about the result.
        #[test]
        fn redundant_parens_around_highest_precedence_operand_are_inert(a in -50i64..50, b in -50i64..50) {
            let src = format!("{a} * {b}");
            let wrapped = format!("({a}) * ({b})");
            proptest::prop_assert_eq!(eval(&src), eval(&wrapped));
        }
    }
}
