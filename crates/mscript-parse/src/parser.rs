use crate::lexer::Lexer;
use crate::line_col;
use crate::token::{Tok, TokKind};
use anyhow::{bail, Result};
use mscript_ast::markup::{Attr, Node};
use mscript_ast::span::Span;

/// Maximum element nesting depth; deeper documents are rejected instead of
/// overflowing the stack.
pub const MAX_NESTING_DEPTH: usize = 512;

pub fn parse_str(file: &str, src: &str) -> Result<Node> {
    let mut p = Parser::new(file, src);
    p.parse_document()
}

struct Parser<'a> {
    file: &'a str,
    src: &'a str,
    lex: Lexer<'a>,
    cur: Tok,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(file: &'a str, src: &'a str) -> Self {
        let mut lex = Lexer::new(src);
        let cur = lex.next_tok();
        Self {
            file,
            src,
            lex,
            cur,
            depth: 0,
        }
    }

    fn bump(&mut self) {
        self.cur = self.lex.next_tok();
    }

    fn at(&self, k: &TokKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(k)
    }

    fn loc(&self, offset: u32) -> String {
        let (line, col) = line_col(self.src, offset);
        format!("{}:{}:{}", self.file, line, col)
    }

    fn expect(&mut self, k: TokKind) -> Result<Tok> {
        if let TokKind::Error(msg) = &self.cur.kind {
            bail!("{}: {}", self.loc(self.cur.span.start), msg);
        }
        if self.at(&k) {
            let t = self.cur.clone();
            self.bump();
            Ok(t)
        } else {
            bail!(
                "{}: expected {:?}, found {:?}",
                self.loc(self.cur.span.start),
                k,
                self.cur.kind
            )
        }
    }

    fn parse_name(&mut self) -> Result<(String, Span)> {
        match &self.cur.kind {
            TokKind::Name(s) => {
                let out = (s.clone(), self.cur.span);
                self.bump();
                Ok(out)
            }
            TokKind::Error(msg) => bail!("{}: {}", self.loc(self.cur.span.start), msg),
            other => bail!(
                "{}: expected name, found {:?}",
                self.loc(self.cur.span.start),
                other
            ),
        }
    }

    // ======= document / elements =======

    fn parse_document(&mut self) -> Result<Node> {
        if matches!(self.cur.kind, TokKind::Eof) {
            bail!("{}: document has no root element", self.file);
        }
        let root = self.parse_element()?;
        match &self.cur.kind {
            TokKind::Eof => Ok(root),
            other => bail!(
                "{}: unexpected {:?} after root element",
                self.loc(self.cur.span.start),
                other
            ),
        }
    }

    fn parse_element(&mut self) -> Result<Node> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            bail!(
                "{}: nesting depth exceeds limit of {}",
                self.loc(self.cur.span.start),
                MAX_NESTING_DEPTH
            );
        }
        let result = self.parse_element_inner();
        self.depth -= 1;
        result
    }

    fn parse_element_inner(&mut self) -> Result<Node> {
        let open = self.expect(TokKind::Lt)?;
        let (tag, _) = self.parse_name()?;
        let attrs = self.parse_attrs()?;

        if self.at(&TokKind::SlashGt) {
            let close = self.cur.span;
            self.bump();
            return Ok(Node {
                tag,
                attrs,
                children: Vec::new(),
                span: Span {
                    start: open.span.start,
                    end: close.end,
                },
            });
        }
        self.expect(TokKind::Gt)?;

        let mut children = Vec::new();
        loop {
            match &self.cur.kind {
                TokKind::Lt => children.push(self.parse_element()?),
                TokKind::LtSlash => break,
                TokKind::Text(text) => bail!(
                    "{}: unexpected text {:?} inside <{}>",
                    self.loc(self.cur.span.start),
                    text,
                    tag
                ),
                TokKind::Eof => bail!(
                    "{}: unclosed element <{}>",
                    self.loc(open.span.start),
                    tag
                ),
                TokKind::Error(msg) => bail!("{}: {}", self.loc(self.cur.span.start), msg),
                other => bail!(
                    "{}: unexpected {:?} inside <{}>",
                    self.loc(self.cur.span.start),
                    other,
                    tag
                ),
            }
        }

        self.expect(TokKind::LtSlash)?;
        let (closing, closing_span) = self.parse_name()?;
        if closing != tag {
            bail!(
                "{}: mismatched closing tag </{}>, expected </{}>",
                self.loc(closing_span.start),
                closing,
                tag
            );
        }
        let close = self.expect(TokKind::Gt)?;

        Ok(Node {
            tag,
            attrs,
            children,
            span: Span {
                start: open.span.start,
                end: close.span.end,
            },
        })
    }

    fn parse_attrs(&mut self) -> Result<Vec<Attr>> {
        let mut attrs: Vec<Attr> = Vec::new();
        while let TokKind::Name(_) = self.cur.kind {
            let (name, name_span) = self.parse_name()?;
            self.expect(TokKind::Eq)?;
            let value = match &self.cur.kind {
                TokKind::Str(s) => s.clone(),
                TokKind::Error(msg) => bail!("{}: {}", self.loc(self.cur.span.start), msg),
                other => bail!(
                    "{}: expected quoted value for attribute '{}', found {:?}",
                    self.loc(self.cur.span.start),
                    name,
                    other
                ),
            };
            let end = self.cur.span.end;
            self.bump();

            if attrs.iter().any(|a| a.name == name) {
                bail!(
                    "{}: duplicate attribute '{}'",
                    self.loc(name_span.start),
                    name
                );
            }
            attrs.push(Attr {
                name,
                value,
                span: Span {
                    start: name_span.start,
                    end,
                },
            });
        }
        Ok(attrs)
    }
}
