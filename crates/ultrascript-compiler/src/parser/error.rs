//! Diagnostic rendering for lex and parse errors (spec §4.2 "On any parse
//! error the parser reports the offending token plus a 5-line source
//! excerpt with a `^` pointer").

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{self, Config};
use termcolor::{ColorChoice, StandardStream};
use ultrascript_sdk::{LexError, ParseError, Span};

/// Render a [`LexError`] or [`ParseError`] to `stderr` as a colorized
/// excerpt, honoring `NO_COLOR` and non-TTY streams the way `termcolor`'s
/// `ColorChoice::Auto` does.
pub fn report_parse_error(source: &str, path: &str, err: &ParseError) {
    let (span, message) = match err {
        ParseError::UnexpectedToken { expected, found, line, column, .. } => (
            Span::new(0, 0, *line, *column),
            format!("expected {expected}, found {found}"),
        ),
        ParseError::UnexpectedEof { expected } => {
            (Span::new(source.len(), source.len(), 0, 0), format!("expected {expected}, found end of file"))
        }
        ParseError::IllegalDeclaration { message, line, column, .. } => {
            (Span::new(0, 0, *line, *column), message.clone())
        }
    };
    report(source, path, &span, &message);
}

pub fn report_lex_error(source: &str, path: &str, err: &LexError) {
    let (line, column, message) = match err {
        LexError::UnexpectedCharacter { character, line, column, .. } => {
            (*line, *column, format!("unexpected character '{character}'"))
        }
        LexError::Unterminated { kind, line, column, .. } => (*line, *column, format!("unterminated {kind}")),
        LexError::RegexEmbeddedNewline { line, column, .. } => {
            (*line, *column, "regex literal contains an embedded newline".to_string())
        }
    };
    report(source, path, &Span::new(0, 0, line, column), &message);
}

fn report(source: &str, path: &str, span: &Span, message: &str) {
    let mut files = SimpleFiles::new();
    let file_id = files.add(path, source);

    let byte_range = line_column_to_byte_range(source, span.line, span.column);
    let diagnostic = Diagnostic::error()
        .with_message(message)
        .with_labels(vec![Label::primary(file_id, byte_range)]);

    let choice = color_choice();
    let mut writer = StandardStream::stderr(choice);
    let config = Config::default();
    let _ = term::emit(&mut writer, &config, &files, &diagnostic);
}

fn color_choice() -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    ColorChoice::Auto
}

/// `codespan-reporting` renders from byte offsets; the lexer tracks
/// 1-based `(line, column)` pairs, so translate back for the single point
/// we actually have. Errors past the end of the source clamp to its length.
fn line_column_to_byte_range(source: &str, line: u32, column: u32) -> std::ops::Range<usize> {
    let mut current_line = 1u32;
    let mut line_start = 0usize;
    for (idx, byte) in source.bytes().enumerate() {
        if current_line == line {
            break;
        }
        if byte == b'\n' {
            current_line += 1;
            line_start = idx + 1;
        }
    }
    let start = (line_start + column.saturating_sub(1) as usize).min(source.len());
    let end = (start + 1).min(source.len());
    start..end.max(start)
}
