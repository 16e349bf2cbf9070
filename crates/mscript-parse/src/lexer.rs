use crate::token::{Tok, TokKind};
use mscript_ast::span::Span;

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    /// Between `<` and `>`: names, `=` and quoted values are tokens.
    /// Outside: only tag openers and character data.
    in_tag: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            in_tag: false,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn span(&self, start: usize) -> Span {
        Span {
            start: start as u32,
            end: self.pos as u32,
        }
    }

    fn tok(&self, kind: TokKind, start: usize) -> Tok {
        Tok {
            kind,
            span: self.span(start),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.bump();
        }
    }

    /// Skip past `end`; false if input ran out first.
    fn skip_past(&mut self, end: &str) -> bool {
        match self.src[self.pos..].find(end) {
            Some(off) => {
                self.pos += off + end.len();
                true
            }
            None => {
                self.pos = self.src.len();
                false
            }
        }
    }

    pub fn next_tok(&mut self) -> Tok {
        if self.in_tag {
            self.next_in_tag()
        } else {
            self.next_in_content()
        }
    }

    fn next_in_content(&mut self) -> Tok {
        loop {
            self.skip_ws();
            let start = self.pos;
            if self.peek().is_none() {
                return self.tok(TokKind::Eof, start);
            }

            // comments, prolog and doctype are trivia
            if self.starts_with("<!--") {
                if !self.skip_past("-->") {
                    return self.tok(TokKind::Error("unterminated comment".into()), start);
                }
                continue;
            }
            if self.starts_with("<?") {
                if !self.skip_past("?>") {
                    return self.tok(
                        TokKind::Error("unterminated processing instruction".into()),
                        start,
                    );
                }
                continue;
            }
            if self.starts_with("<!") {
                if !self.skip_past(">") {
                    return self.tok(TokKind::Error("unterminated declaration".into()), start);
                }
                continue;
            }

            if self.starts_with("</") {
                self.pos += 2;
                self.in_tag = true;
                return self.tok(TokKind::LtSlash, start);
            }
            if self.starts_with("<") {
                self.pos += 1;
                self.in_tag = true;
                return self.tok(TokKind::Lt, start);
            }

            // character data up to the next tag
            let end = self.src[self.pos..]
                .find('<')
                .map_or(self.src.len(), |off| self.pos + off);
            let text = decode_entities(self.src[self.pos..end].trim_end());
            self.pos = end;
            return self.tok(TokKind::Text(text), start);
        }
    }

    fn next_in_tag(&mut self) -> Tok {
        self.skip_ws();
        let start = self.pos;
        let Some(b) = self.bump() else {
            return self.tok(TokKind::Eof, start);
        };

        match b {
            b'>' => {
                self.in_tag = false;
                self.tok(TokKind::Gt, start)
            }
            b'/' if self.peek() == Some(b'>') => {
                self.bump();
                self.in_tag = false;
                self.tok(TokKind::SlashGt, start)
            }
            b'=' => self.tok(TokKind::Eq, start),
            b'"' | b'\'' => {
                let quote = b as char;
                match self.src[self.pos..].find(quote) {
                    Some(off) => {
                        let raw = &self.src[self.pos..self.pos + off];
                        self.pos += off + 1;
                        self.tok(TokKind::Str(decode_entities(raw)), start)
                    }
                    None => {
                        self.pos = self.src.len();
                        self.tok(TokKind::Error("unterminated attribute value".into()), start)
                    }
                }
            }
            c if is_name_byte(c) => {
                while matches!(self.peek(), Some(p) if is_name_byte(p)) {
                    self.bump();
                }
                let name = self.src[start..self.pos].to_string();
                self.tok(TokKind::Name(name), start)
            }
            _ => {
                // step over the whole (possibly multi-byte) character
                let ch = self.src[start..].chars().next().unwrap_or('?');
                self.pos = start + ch.len_utf8();
                self.tok(
                    TokKind::Error(format!("unexpected character '{}' in tag", ch)),
                    start,
                )
            }
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.')
}

/// Decode the predefined XML entities and numeric character references.
/// Unknown entities are kept verbatim.
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
