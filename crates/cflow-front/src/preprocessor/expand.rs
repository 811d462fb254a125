//! Macro expansion: the "blue paint" hide-set algorithm (spec §4.1).
//!
//! Each token carries a hide-set — the macros currently being expanded
//! around it — so that a macro's own name inside its replacement list never
//! re-expands (`#define A A` expands to `A`, not an infinite loop).

use std::collections::HashSet;

use cflow_core::{Diagnostic, DiagnosticBag};

use super::lexer;
use super::macro_table::{BuiltinMacro, MacroDef, MacroTable};
use super::token::{Token, TokenKind};
use crate::error::PreprocessError;

#[derive(Debug, Clone)]
struct HTok {
    tok: Token,
    hide_set: HashSet<String>,
}

fn plain(tok: Token) -> HTok {
    HTok { tok, hide_set: HashSet::new() }
}

/// Expands a token stream against `table`, to a fixed point. `file` and
/// `current_line` back `__FILE__`/`__LINE__`.
pub fn expand(
    tokens: &[Token],
    table: &MacroTable,
    file: &str,
    diags: &mut DiagnosticBag,
) -> Result<Vec<Token>, PreprocessError> {
    let mut input: Vec<HTok> = tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Whitespace))
        .cloned()
        .map(plain)
        .collect();
    input.reverse(); // pop() takes from the front in source order
    let mut output = Vec::new();
    expand_list(&mut input, &mut output, table, file, diags)?;
    Ok(output.into_iter().map(|h| h.tok).collect())
}

fn expand_list(
    input: &mut Vec<HTok>,
    output: &mut Vec<HTok>,
    table: &MacroTable,
    file: &str,
    diags: &mut DiagnosticBag,
) -> Result<(), PreprocessError> {
    while let Some(htok) = input.pop() {
        let name = match &htok.tok.kind {
            TokenKind::Identifier(n) => n.clone(),
            _ => {
                output.push(htok);
                continue;
            }
        };

        if htok.hide_set.contains(&name) || !table.is_defined(&name) {
            output.push(htok);
            continue;
        }

        match table.lookup(&name).unwrap().clone() {
            MacroDef::Builtin(b) => {
                let replacement = expand_builtin(b, &htok.tok, file);
                input.push(plain(replacement));
            }
            MacroDef::Object { replacement } => {
                let mut hs = htok.hide_set.clone();
                hs.insert(name.clone());
                let substituted = substitute(&replacement, &[], &[], false, &hs);
                // Push back in reverse so the first replacement token pops first.
                for t in substituted.into_iter().rev() {
                    input.push(t);
                }
            }
            MacroDef::Function { params, variadic, replacement } => {
                if !next_is_lparen(input) {
                    // Not a call: the identifier stands for itself.
                    output.push(htok);
                    continue;
                }
                consume_lparen(input);
                let args = collect_args(input, &name)?;
                let expected = params.len();
                if !variadic && args.len() != expected {
                    return Err(PreprocessError::WrongMacroArgCount {
                        name: name.clone(),
                        expected,
                        got: args.len(),
                    });
                }
                if variadic && args.len() < expected {
                    return Err(PreprocessError::WrongMacroArgCount {
                        name: name.clone(),
                        expected,
                        got: args.len(),
                    });
                }

                let mut hs = htok.hide_set.clone();
                hs.insert(name.clone());

                // Pre-expand each argument (used where the parameter isn't
                // adjacent to `#`/`##` in the replacement list).
                let mut expanded_args = Vec::with_capacity(args.len());
                for arg in &args {
                    let mut arg_in: Vec<HTok> =
                        arg.iter().cloned().map(plain).rev().collect();
                    let mut arg_out = Vec::new();
                    expand_list(&mut arg_in, &mut arg_out, table, file, diags)?;
                    expanded_args.push(arg_out);
                }

                let variadic_extra: Vec<Token> = if variadic {
                    args[expected.min(args.len())..]
                        .iter()
                        .enumerate()
                        .flat_map(|(i, a)| {
                            let mut v = a.clone();
                            if i + 1 < args.len() - expected {
                                v.push(Token::new(
                                    TokenKind::Punctuator(",".to_string()),
                                    0,
                                    0,
                                ));
                            }
                            v
                        })
                        .collect()
                } else {
                    Vec::new()
                };

                let substituted = substitute_function(
                    &replacement,
                    &params,
                    &args,
                    &expanded_args,
                    variadic,
                    &variadic_extra,
                    &hs,
                );
                for t in substituted.into_iter().rev() {
                    input.push(t);
                }
            }
        }
    }
    Ok(())
}

fn next_is_lparen(input: &[HTok]) -> bool {
    input.last().map(|h| h.tok.is_punct("(")).unwrap_or(false)
}

fn consume_lparen(input: &mut Vec<HTok>) {
    input.pop();
}

/// Splits a macro call's arguments at top-level commas, honoring bracket
/// nesting depth so `F(a, (b, c))` yields two arguments.
fn collect_args(input: &mut Vec<HTok>, name: &str) -> Result<Vec<Vec<Token>>, PreprocessError> {
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;
    loop {
        let Some(htok) = input.pop() else {
            return Err(PreprocessError::UnterminatedMacroArgs { name: name.to_string() });
        };
        if htok.tok.is_punct("(") {
            depth += 1;
            current.push(htok.tok);
        } else if htok.tok.is_punct(")") {
            if depth == 0 {
                args.push(current);
                break;
            }
            depth -= 1;
            current.push(htok.tok);
        } else if htok.tok.is_punct(",") && depth == 0 {
            args.push(current);
            current = Vec::new();
        } else {
            current.push(htok.tok);
        }
    }
    if args.len() == 1 && args[0].is_empty() {
        args.clear();
    }
    Ok(args)
}

fn substitute(
    replacement: &[Token],
    params: &[String],
    args: &[Vec<Token>],
    variadic: bool,
    hide_set: &HashSet<String>,
) -> Vec<HTok> {
    substitute_function(replacement, params, args, args, variadic, &[], hide_set)
}

/// Performs `#param` stringification, `a##b` pasting, and plain parameter
/// substitution over a macro's replacement list.
fn substitute_function(
    replacement: &[Token],
    params: &[String],
    raw_args: &[Vec<Token>],
    expanded_args: &[Vec<Token>],
    variadic: bool,
    variadic_extra: &[Token],
    hide_set: &HashSet<String>,
) -> Vec<HTok> {
    let param_index = |name: &str| -> Option<usize> { params.iter().position(|p| p == name) };

    let mut out: Vec<Token> = Vec::new();
    let mut i = 0usize;
    while i < replacement.len() {
        let tok = &replacement[i];

        // Stringify: # param
        if tok.is_punct("#") || matches!(&tok.kind, TokenKind::Hash) {
            if let Some(next) = replacement.get(i + 1) {
                if let TokenKind::Identifier(pname) = &next.kind {
                    if let Some(idx) = param_index(pname) {
                        out.push(Token::new(
                            TokenKind::Str(stringify(&raw_args[idx])),
                            tok.line,
                            tok.col,
                        ));
                        i += 2;
                        continue;
                    }
                    if variadic && pname == "__VA_ARGS__" {
                        out.push(Token::new(
                            TokenKind::Str(stringify(variadic_extra)),
                            tok.line,
                            tok.col,
                        ));
                        i += 2;
                        continue;
                    }
                }
            }
        }

        // Paste: a ## b
        if i + 1 < replacement.len() && matches!(replacement[i + 1].kind, TokenKind::HashHash) {
            let lhs = resolve_one(tok, params, raw_args, variadic, variadic_extra);
            let rhs_tok = &replacement[i + 2.min(replacement.len() - i - 1)];
            let rhs = if i + 2 < replacement.len() {
                resolve_one(rhs_tok, params, raw_args, variadic, variadic_extra)
            } else {
                Vec::new()
            };
            let pasted = paste(&lhs, &rhs);
            out.extend(pasted);
            i += 3;
            continue;
        }
        if matches!(tok.kind, TokenKind::HashHash) {
            // `## b` immediately after a parameter already consumed above;
            // a bare leading/trailing `##` is a definition-time error
            // caught by the directive parser, not here.
            i += 1;
            continue;
        }

        if let TokenKind::Identifier(name) = &tok.kind {
            if let Some(idx) = param_index(name) {
                out.extend(expanded_args[idx].clone());
                i += 1;
                continue;
            }
            if variadic && name == "__VA_ARGS__" {
                out.extend(variadic_extra.iter().cloned());
                i += 1;
                continue;
            }
        }

        out.push(tok.clone());
        i += 1;
    }

    out.into_iter()
        .map(|t| HTok { tok: t, hide_set: hide_set.clone() })
        .collect()
}

fn resolve_one(
    tok: &Token,
    params: &[String],
    raw_args: &[Vec<Token>],
    variadic: bool,
    variadic_extra: &[Token],
) -> Vec<Token> {
    if let TokenKind::Identifier(name) = &tok.kind {
        if let Some(idx) = params.iter().position(|p| p == name) {
            return raw_args[idx].clone();
        }
        if variadic && name == "__VA_ARGS__" {
            return variadic_extra.to_vec();
        }
    }
    vec![tok.clone()]
}

/// Concatenates the textual form of the last token of `lhs` and the first
/// token of `rhs`, re-lexing the joined text into a single token. A paste
/// whose operand is empty yields the other operand unchanged.
fn paste(lhs: &[Token], rhs: &[Token]) -> Vec<Token> {
    if lhs.is_empty() {
        return rhs.to_vec();
    }
    if rhs.is_empty() {
        return lhs.to_vec();
    }
    let mut result = lhs[..lhs.len() - 1].to_vec();
    let joined = format!("{}{}", lhs.last().unwrap().text(), rhs[0].text());
    let mut diags = DiagnosticBag::new();
    let mut relexed = lexer::lex(&joined, "<paste>", &mut diags);
    relexed.retain(|t| !matches!(t.kind, TokenKind::Eof | TokenKind::Newline));
    result.extend(relexed);
    result.extend(rhs[1..].iter().cloned());
    result
}

/// `#param`: join raw tokens with single spaces where whitespace appeared,
/// escaping `"` and `\` inside embedded string/char literals.
fn stringify(tokens: &[Token]) -> String {
    let mut s = String::new();
    for (idx, t) in tokens.iter().enumerate() {
        if idx > 0 && t.leading_space {
            s.push(' ');
        }
        match &t.kind {
            TokenKind::Str(inner) => {
                s.push('\\');
                s.push('"');
                s.push_str(&inner.replace('\\', "\\\\").replace('"', "\\\""));
                s.push('\\');
                s.push('"');
            }
            TokenKind::CharConst(inner) => {
                s.push('\'');
                s.push_str(inner);
                s.push('\'');
            }
            _ => s.push_str(&t.text()),
        }
    }
    s
}

fn expand_builtin(b: BuiltinMacro, at: &Token, file: &str) -> Token {
    match b {
        BuiltinMacro::File => Token::new(TokenKind::Str(file.to_string()), at.line, at.col),
        BuiltinMacro::Line => Token::new(TokenKind::Number(at.line.to_string()), at.line, at.col),
        BuiltinMacro::Stdc => Token::new(TokenKind::Number("1".to_string()), at.line, at.col),
        BuiltinMacro::StdcVersion => {
            Token::new(TokenKind::Number("201112L".to_string()), at.line, at.col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::lexer::lex;

    fn expand_str(src: &str, table: &MacroTable) -> String {
        let mut diags = DiagnosticBag::new();
        let toks = lex(src, "t.c", &mut diags);
        let out = expand(&toks, table, "t.c", &mut diags).unwrap();
        out.iter()
            .filter(|t| !t.is_eof() && !matches!(t.kind, TokenKind::Newline))
            .map(|t| t.text())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn object_macro_expands() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticBag::new();
        let repl = lex("1 + 2", "t.c", &mut diags);
        table.define_object("FOO", repl.into_iter().filter(|t| !t.is_eof()).collect());
        assert_eq!(expand_str("FOO", &table), "1 + 2");
    }

    #[test]
    fn self_referential_macro_does_not_loop() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticBag::new();
        let repl = lex("A", "t.c", &mut diags);
        table.define_object("A", repl.into_iter().filter(|t| !t.is_eof()).collect());
        assert_eq!(expand_str("A", &table), "A");
    }

    #[test]
    fn function_macro_square_example() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticBag::new();
        let repl = lex("((x)*(x))", "t.c", &mut diags);
        table.define_function(
            "SQUARE",
            vec!["x".to_string()],
            false,
            repl.into_iter().filter(|t| !t.is_eof()).collect(),
        );
        assert_eq!(expand_str("SQUARE(a+1)", &table), "( ( a + 1 ) * ( a + 1 ) )");
    }

    #[test]
    fn function_macro_not_followed_by_paren_is_left_alone() {
        let mut table = MacroTable::new();
        table.define_function("F", vec!["x".to_string()], false, vec![]);
        assert_eq!(expand_str("F", &table), "F");
    }

    #[test]
    fn stringify_operator() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticBag::new();
        let repl = lex("#x", "t.c", &mut diags);
        table.define_function(
            "STR",
            vec!["x".to_string()],
            false,
            repl.into_iter().filter(|t| !t.is_eof()).collect(),
        );
        assert_eq!(expand_str("STR(hello)", &table), "\"hello\"");
    }

    #[test]
    fn paste_operator_concatenates() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticBag::new();
        let repl = lex("a ## b", "t.c", &mut diags);
        table.define_object("CAT", repl.into_iter().filter(|t| !t.is_eof()).collect());
        assert_eq!(expand_str("CAT", &table), "ab");
    }
}
