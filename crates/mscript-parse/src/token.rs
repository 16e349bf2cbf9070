use mscript_ast::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    // trivia / eof / error
    Eof,
    /// Error token (unterminated comment, string, ...)
    Error(String),
    // markup punctuation
    Lt,      // <
    LtSlash, // </
    Gt,      // >
    SlashGt, // />
    Eq,
    // tag and attribute names
    Name(String),
    // quoted attribute value, entities already decoded
    Str(String),
    // character data between tags (whitespace-only runs are skipped)
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub span: Span,
}
