//! The preprocessor: lexing, macro expansion, conditional compilation, and
//! include resolution wired together into a single pass over a translation
//! unit (spec §4.1).

pub mod cond;
pub mod expand;
pub mod include;
pub mod lexer;
pub mod macro_table;
pub mod token;

use std::path::{Path, PathBuf};

use cflow_core::DiagnosticBag;

use crate::error::PreprocessError;
use crate::options::PipelineOptions;
use cond::CondStack;
use include::{FileLoader, IncludeResolver, OsFileLoader};
use macro_table::MacroTable;
use token::{Token, TokenKind};

/// Runs the preprocessor over a translation unit rooted at `entry`, using
/// the real filesystem.
pub fn preprocess_file(
    entry: &Path,
    opts: &PipelineOptions,
    diags: &mut DiagnosticBag,
) -> Result<Vec<Token>, PreprocessError> {
    let loader = OsFileLoader;
    let mut pp = Preprocessor::new(&loader, opts);
    pp.run(entry, diags)
}

pub struct Preprocessor<'a, L: FileLoader> {
    table: MacroTable,
    cond: CondStack,
    resolver: IncludeResolver<'a, L>,
}

impl<'a, L: FileLoader> Preprocessor<'a, L> {
    pub fn new(loader: &'a L, opts: &PipelineOptions) -> Self {
        let mut table = MacroTable::new();
        for d in &opts.defines {
            let repl_text = d.value.clone().unwrap_or_else(|| "1".to_string());
            let mut scratch = DiagnosticBag::new();
            let repl = lexer::lex(&repl_text, "<command-line>", &mut scratch);
            table.define_object(&d.name, repl.into_iter().filter(|t| !t.is_eof()).collect());
        }
        for name in &opts.undefines {
            table.undefine(name);
        }
        let resolver = IncludeResolver::new(
            loader,
            opts.user_include_paths.iter().map(PathBuf::from).collect(),
            opts.system_include_paths.iter().map(PathBuf::from).collect(),
            opts.max_include_depth,
        );
        Preprocessor { table, cond: CondStack::new(), resolver }
    }

    pub fn run(
        &mut self,
        entry: &Path,
        diags: &mut DiagnosticBag,
    ) -> Result<Vec<Token>, PreprocessError> {
        let table = &self.table;
        let text = self
            .resolver
            .enter(entry, |name| table.is_defined(name))
            .map_err(|_| PreprocessError::IncludeNotFound {
                file: entry.display().to_string(),
                name: entry.display().to_string(),
            })?
            .unwrap_or_default();
        let out = self.process_text(&text, entry, diags)?;
        self.resolver.exit(entry);
        if !self.cond.is_balanced() {
            return Err(PreprocessError::UnbalancedConditional {
                file: entry.display().to_string(),
            });
        }
        let mut out = out;
        out.push(Token::new(TokenKind::Eof, 0, 0));
        Ok(out)
    }

    fn process_text(
        &mut self,
        text: &str,
        file: &Path,
        diags: &mut DiagnosticBag,
    ) -> Result<Vec<Token>, PreprocessError> {
        let file_str = file.display().to_string();
        let tokens = lexer::lex(text, &file_str, diags);
        let lines = split_lines(tokens);
        let mut output = Vec::new();

        for line in lines {
            if line.is_empty() {
                continue;
            }
            if matches!(line[0].kind, TokenKind::Hash) {
                self.handle_directive(&line[1..], file, &file_str, &mut output, diags)?;
                continue;
            }
            if !self.cond.is_active() {
                continue;
            }
            let expanded = expand::expand(&line, &self.table, &file_str, diags)?;
            output.extend(expanded);
            output.push(Token::new(TokenKind::Newline, line[0].line, 0));
        }
        Ok(output)
    }

    fn handle_directive(
        &mut self,
        rest: &[Token],
        file: &Path,
        file_str: &str,
        output: &mut Vec<Token>,
        diags: &mut DiagnosticBag,
    ) -> Result<(), PreprocessError> {
        let rest = skip_ws(rest);
        let Some(first) = rest.first() else {
            return Ok(()); // empty directive: no-op
        };
        let name = match &first.kind {
            TokenKind::Identifier(n) => n.clone(),
            _ => {
                if self.cond.is_active() {
                    return Err(PreprocessError::UnknownDirective {
                        file: file_str.to_string(),
                        directive: first.text(),
                    });
                }
                return Ok(());
            }
        };
        let body = skip_ws(&rest[1..]);

        match name.as_str() {
            "if" => {
                let cond_val = if self.cond.is_active() {
                    let resolved = cond::resolve_defined(body, &self.table);
                    let expanded = expand::expand(&resolved, &self.table, file_str, diags)?;
                    cond::eval_expr(&expanded)? != 0
                } else {
                    false
                };
                self.cond.push_if(cond_val);
            }
            "ifdef" | "ifndef" => {
                let defined = body
                    .first()
                    .map(|t| matches!(&t.kind, TokenKind::Identifier(n) if self.table.is_defined(n)))
                    .unwrap_or(false);
                let cond_val = if name == "ifdef" { defined } else { !defined };
                self.cond.push_if(cond_val);
            }
            "elif" => {
                let cond_val = if self.cond.elif_reachable() {
                    let resolved = cond::resolve_defined(body, &self.table);
                    let expanded = expand::expand(&resolved, &self.table, file_str, diags)?;
                    cond::eval_expr(&expanded)? != 0
                } else {
                    false
                };
                self.cond.push_elif(cond_val)?;
            }
            "else" => self.cond.push_else()?,
            "endif" => self.cond.pop_endif()?,
            "define" if self.cond.is_active() => self.handle_define(body),
            "undef" if self.cond.is_active() => {
                if let Some(Token { kind: TokenKind::Identifier(n), .. }) = body.first() {
                    self.table.undefine(n);
                }
            }
            "include" if self.cond.is_active() => {
                self.handle_include(body, file, file_str, output, diags)?;
            }
            "error" if self.cond.is_active() => {
                let msg: String = body.iter().map(|t| t.text()).collect::<Vec<_>>().join(" ");
                return Err(PreprocessError::UserError { file: file_str.to_string(), message: msg });
            }
            "warning" if self.cond.is_active() => {
                let msg: String = body.iter().map(|t| t.text()).collect::<Vec<_>>().join(" ");
                diags.warning(msg, None);
            }
            "pragma" if self.cond.is_active() => {
                if body.first().map(|t| t.is_identifier("once")).unwrap_or(false) {
                    self.resolver.mark_pragma_once(file);
                }
            }
            "line" => {} // supplemented line-marker bookkeeping is output-side only
            _ if !self.cond.is_active() => {} // unknown directive in inactive region: ignored
            other => {
                return Err(PreprocessError::UnknownDirective {
                    file: file_str.to_string(),
                    directive: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn handle_define(&mut self, body: &[Token]) {
        let Some(Token { kind: TokenKind::Identifier(name), .. }) = body.first() else { return };
        let rest = &body[1..];
        // Function-like iff `(` immediately follows the name, no space.
        if let Some(lp) = rest.first() {
            if lp.is_punct("(") && !lp.leading_space {
                let (params, variadic, after_params) = parse_param_list(&rest[1..]);
                let replacement = skip_ws(after_params).to_vec();
                self.table.define_function(name, params, variadic, replacement);
                return;
            }
        }
        let replacement = skip_ws(rest).to_vec();
        self.table.define_object(name, replacement);
    }

    fn handle_include(
        &mut self,
        body: &[Token],
        file: &Path,
        file_str: &str,
        output: &mut Vec<Token>,
        diags: &mut DiagnosticBag,
    ) -> Result<(), PreprocessError> {
        let (name, quoted) = parse_header_name(body, &self.table, file_str, diags)?;
        let current_dir = file.parent().unwrap_or_else(|| Path::new("."));
        let resolved = self.resolver.resolve(&name, current_dir, quoted).ok_or_else(|| {
            PreprocessError::IncludeNotFound { file: file_str.to_string(), name: name.clone() }
        })?;
        let table = &self.table;
        let text = match self.resolver.enter(&resolved, |n| table.is_defined(n))? {
            None => return Ok(()),
            Some(t) => t,
        };
        let included = self.process_text(&text, &resolved, diags)?;
        self.resolver.exit(&resolved);
        output.extend(included);
        Ok(())
    }
}

/// Splits a token stream into logical lines at `Newline` boundaries,
/// dropping the newline tokens themselves; trailing `Eof` is dropped since
/// callers re-append their own.
fn split_lines(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for t in tokens {
        match t.kind {
            TokenKind::Newline => {
                lines.push(std::mem::take(&mut current));
            }
            TokenKind::Eof => {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
            }
            TokenKind::Whitespace => {}
            _ => current.push(t),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn skip_ws(tokens: &[Token]) -> &[Token] {
    let mut start = 0;
    while matches!(tokens.get(start).map(|t| &t.kind), Some(TokenKind::Whitespace)) {
        start += 1;
    }
    &tokens[start..]
}

/// Parses a function-like macro's parameter list starting just after the
/// opening `(` (already consumed). Returns the parameter names, whether the
/// list ends in `...`, and the remaining tokens after the closing `)`.
fn parse_param_list(tokens: &[Token]) -> (Vec<String>, bool, &[Token]) {
    let mut params = Vec::new();
    let mut variadic = false;
    let mut i = 0;
    loop {
        let rest = skip_ws(&tokens[i..]);
        let Some(t) = rest.first() else { break };
        if t.is_punct(")") {
            i = tokens.len() - rest.len() + 1;
            break;
        }
        if t.is_punct("...") {
            variadic = true;
            let after = skip_ws(&rest[1..]);
            i = tokens.len() - after.len();
            if after.first().map(|t| t.is_punct(")")).unwrap_or(false) {
                i += 1;
            }
            break;
        }
        if let TokenKind::Identifier(name) = &t.kind {
            params.push(name.clone());
        }
        let after = skip_ws(&rest[1..]);
        i = tokens.len() - after.len();
        if after.first().map(|t| t.is_punct(",")).unwrap_or(false) {
            let after_comma = skip_ws(&after[1..]);
            i = tokens.len() - after_comma.len();
        }
    }
    (params, variadic, &tokens[i.min(tokens.len())..])
}

/// Parses the header-name operand of `#include`, handling both the
/// angle-bracket form (reconstructed by joining punctuator/identifier
/// tokens between `<` and `>`) and the string-literal form, and the
/// macro-expanded-computed-include case (`#include MACRO`).
fn parse_header_name(
    body: &[Token],
    table: &MacroTable,
    file: &str,
    diags: &mut DiagnosticBag,
) -> Result<(String, bool), PreprocessError> {
    if let Some(Token { kind: TokenKind::Str(s), .. }) = body.first() {
        return Ok((s.clone(), true));
    }
    if body.first().map(|t| t.is_punct("<")).unwrap_or(false) {
        let mut name = String::new();
        for t in &body[1..] {
            if t.is_punct(">") {
                return Ok((name, false));
            }
            name.push_str(&t.text());
        }
        return Err(PreprocessError::MalformedExpression {
            reason: "unterminated header name".to_string(),
        });
    }
    // Computed include: macro-expand and re-parse.
    let expanded = expand::expand(body, table, file, diags)?;
    parse_header_name(&expanded, table, file, diags)
}
