//! Reference parser for the ZenUML-style DSL.
//!
//! The layout core only needs the syntax tree in [`super::syntax`]; this parser is one
//! producer of it. It never fails: anything it cannot recognize becomes a statement without a
//! construct, which the transformer reports as an error node.

use std::ops::Range;

use super::syntax::*;
use crate::text::unquote;

const KEYWORDS: &[&str] = &[
    "if", "else", "while", "for", "forEach", "foreach", "loop", "par", "opt", "critical",
    "section", "try", "catch", "finally", "return", "new", "ref", "group",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ident,
    Str,
    Number,
    Color,
    Dot,
    Comma,
    Colon,
    Semi,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Arrow,
    Assign,
    DoubleEq,
    At,
    StereoOpen,
    StereoClose,
    Newline,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Lexeme {
    kind: Kind,
    span: Span,
}

fn tokenize(src: &str) -> Vec<Lexeme> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let offset = |idx: usize| chars.get(idx).map(|(o, _)| *o).unwrap_or(src.len());
    let scan = |from: usize, pred: &dyn Fn(char) -> bool| {
        let mut j = from;
        while j < chars.len() && pred(chars[j].1) {
            j += 1;
        }
        j
    };

    let mut out = Vec::new();
    let (mut i, mut line, mut line_start) = (0usize, 1usize, 0usize);

    while i < chars.len() {
        let (start, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        let (kind, len) = match c {
            '\n' => (Kind::Newline, 1),
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => {
                i = scan(i, &|c| c != '\n');
                continue;
            }
            '"' => {
                let mut j = scan(i + 1, &|c| c != '"' && c != '\n');
                if chars.get(j).is_some_and(|(_, c)| *c == '"') {
                    j += 1;
                }
                (Kind::Str, j - i)
            }
            c if c.is_alphabetic() || c == '_' => {
                let j = scan(i + 1, &|c| c.is_alphanumeric() || c == '_');
                (Kind::Ident, j - i)
            }
            c if c.is_ascii_digit() => {
                let mut j = scan(i + 1, &|c| c.is_ascii_digit());
                let fraction = chars.get(j).is_some_and(|(_, c)| *c == '.')
                    && chars.get(j + 1).is_some_and(|(_, c)| c.is_ascii_digit());
                if fraction {
                    j = scan(j + 1, &|c| c.is_ascii_digit());
                }
                (Kind::Number, j - i)
            }
            '#' => {
                let j = scan(i + 1, &|c| c.is_ascii_alphanumeric());
                if j > i + 1 {
                    (Kind::Color, j - i)
                } else {
                    (Kind::Other, 1)
                }
            }
            '-' if next == Some('>') => (Kind::Arrow, 2),
            '=' if next == Some('=') => (Kind::DoubleEq, 2),
            '=' => (Kind::Assign, 1),
            '<' if next == Some('<') => (Kind::StereoOpen, 2),
            '>' if next == Some('>') => (Kind::StereoClose, 2),
            '.' => (Kind::Dot, 1),
            ',' => (Kind::Comma, 1),
            ':' => (Kind::Colon, 1),
            ';' => (Kind::Semi, 1),
            '(' => (Kind::LParen, 1),
            ')' => (Kind::RParen, 1),
            '{' => (Kind::LBrace, 1),
            '}' => (Kind::RBrace, 1),
            '@' => (Kind::At, 1),
            _ => (Kind::Other, 1),
        };

        let stop = offset(i + len);
        out.push(Lexeme {
            kind,
            span: Span::new(start, stop, line, start - line_start),
        });
        if kind == Kind::Newline {
            line += 1;
            line_start = stop;
        }
        i += len;
    }

    out
}

/// Parse DSL source into a syntax tree.
pub fn parse(src: &str) -> Program {
    let mut parser = Parser {
        src,
        toks: tokenize(src),
        pos: 0,
    };
    parser.program()
}

struct Parser<'a> {
    src: &'a str,
    toks: Vec<Lexeme>,
    pos: usize,
}

impl<'a> Parser<'a> {
    // ============================================
    // Cursor helpers
    // ============================================

    fn peek_kind(&self, n: usize) -> Option<Kind> {
        self.toks.get(self.pos + n).map(|t| t.kind)
    }

    fn at(&self, kind: Kind) -> bool {
        self.peek_kind(0) == Some(kind)
    }

    fn word(&self, n: usize) -> Option<&'a str> {
        self.toks
            .get(self.pos + n)
            .filter(|t| t.kind == Kind::Ident)
            .map(|t| self.text(t.span))
    }

    fn at_word(&self, n: usize, word: &str) -> bool {
        self.word(n) == Some(word)
    }

    fn text(&self, span: Span) -> &'a str {
        let src: &'a str = self.src;
        &src[span.start..span.stop]
    }

    fn bump(&mut self) -> Option<Lexeme> {
        let lx = self.toks.get(self.pos).copied();
        if lx.is_some() {
            self.pos += 1;
        }
        lx
    }

    fn eat(&mut self, kind: Kind) -> Option<Lexeme> {
        if self.at(kind) { self.bump() } else { None }
    }

    fn token(&self, lx: Lexeme) -> Token {
        Token::new(unquote(self.text(lx.span)), lx.span)
    }

    /// An identifier or quoted string naming a participant or method.
    fn eat_name(&mut self) -> Option<Token> {
        match self.peek_kind(0) {
            Some(Kind::Ident) | Some(Kind::Str) => self.bump().map(|lx| self.token(lx)),
            _ => None,
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(0), Some(Kind::Newline) | Some(Kind::Semi)) {
            self.pos += 1;
        }
    }

    /// Moves past newlines if the next significant token is `word`.
    fn continues_with(&mut self, word: &str) -> bool {
        let mut idx = self.pos;
        while self.toks.get(idx).is_some_and(|t| t.kind == Kind::Newline) {
            idx += 1;
        }
        let found = self
            .toks
            .get(idx)
            .is_some_and(|t| t.kind == Kind::Ident && self.text(t.span) == word);
        if found {
            self.pos = idx;
        }
        found
    }

    fn range_span(&self, range: &Range<usize>) -> Span {
        let first = self.toks.get(range.start);
        let last = range.end.checked_sub(1).and_then(|e| self.toks.get(e));
        match (first, last) {
            (Some(first), Some(last)) if range.start < range.end => first.span.join(last.span),
            (Some(first), _) => {
                let at = first.span;
                Span::new(at.start, at.start, at.line, at.column)
            }
            _ => {
                let line = self.toks.last().map(|t| t.span.line).unwrap_or(1);
                Span::new(self.src.len(), self.src.len(), line, 0)
            }
        }
    }

    fn range_token(&self, range: &Range<usize>) -> Token {
        let span = self.range_span(range);
        Token::new(&self.src[span.start..span.stop], span)
    }

    fn span_since(&self, start: usize) -> Span {
        self.range_span(&(start..self.pos.max(start)))
    }

    // ============================================
    // Head
    // ============================================

    fn program(&mut self) -> Program {
        self.skip_separators();
        let head = self.head();
        let start = self.pos;
        let stats = self.stats(false);
        let block = Block {
            stats,
            span: self.span_since(start),
        };

        let head = if head.items.is_empty() && head.starter.is_none() {
            None
        } else {
            Some(head)
        };

        Program {
            head,
            block: Some(block),
            span: Span::new(0, self.src.len(), 1, 0),
        }
    }

    fn head(&mut self) -> Head {
        let mut head = Head::default();
        loop {
            self.skip_separators();
            if self.is_starter() {
                head.starter = Some(self.starter());
            } else if self.is_group() {
                head.items.push(HeadItem::Group(self.group()));
            } else if self.is_participant_decl() {
                head.items.push(HeadItem::Participant(self.participant_decl()));
            } else {
                break;
            }
        }
        head
    }

    fn is_starter(&self) -> bool {
        self.at(Kind::At)
            && self.word(1).is_some_and(|w| w.eq_ignore_ascii_case("starter"))
            && self.peek_kind(2) == Some(Kind::LParen)
    }

    fn starter(&mut self) -> StarterExp {
        let start = self.pos;
        self.bump();
        self.bump();
        self.bump();
        let name = self.eat_name();
        self.eat(Kind::RParen);
        StarterExp {
            name,
            span: self.span_since(start),
        }
    }

    fn is_group(&self) -> bool {
        self.at_word(0, "group")
            && (self.peek_kind(1) == Some(Kind::LBrace)
                || (self.peek_kind(1) == Some(Kind::Ident)
                    && self.peek_kind(2) == Some(Kind::LBrace)))
    }

    fn group(&mut self) -> GroupDecl {
        let start = self.pos;
        self.bump();
        let name = if self.at(Kind::Ident) { self.eat_name() } else { None };
        self.eat(Kind::LBrace);

        let mut participants = Vec::new();
        loop {
            self.skip_separators();
            if self.at(Kind::RBrace) || self.peek_kind(0).is_none() {
                break;
            }
            if self.is_participant_decl() {
                participants.push(self.participant_decl());
            } else {
                self.bump();
            }
        }
        self.eat(Kind::RBrace);

        GroupDecl {
            name,
            participants,
            span: self.span_since(start),
        }
    }

    fn is_participant_decl(&self) -> bool {
        match self.peek_kind(0) {
            Some(Kind::At) => self
                .word(1)
                .is_some_and(|w| w != "return" && !w.eq_ignore_ascii_case("starter")),
            Some(Kind::StereoOpen) => true,
            Some(Kind::Ident) | Some(Kind::Str) => {
                if self.word(0).is_some_and(|w| KEYWORDS.contains(&w)) {
                    return false;
                }
                match self.peek_kind(1) {
                    None
                    | Some(Kind::Newline)
                    | Some(Kind::Semi)
                    | Some(Kind::Color)
                    | Some(Kind::Number)
                    | Some(Kind::Str)
                    | Some(Kind::At)
                    | Some(Kind::RBrace)
                    | Some(Kind::StereoOpen) => true,
                    Some(Kind::Ident) => {
                        self.at_word(1, "as") || self.peek_kind(2) != Some(Kind::Assign)
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn participant_decl(&mut self) -> ParticipantDecl {
        let start = self.pos;
        let mut decl = ParticipantDecl::default();

        if self.at(Kind::At) && self.peek_kind(1) == Some(Kind::Ident) {
            self.bump();
            decl.participant_type = self.eat_name();
        }
        if self.eat(Kind::StereoOpen).is_some() {
            let inner = self.pos;
            while !matches!(
                self.peek_kind(0),
                None | Some(Kind::StereoClose) | Some(Kind::Newline)
            ) {
                self.bump();
            }
            decl.stereotype = Some(self.range_token(&(inner..self.pos)));
            self.eat(Kind::StereoClose);
        }
        decl.name = self.eat_name();
        if self.at_word(0, "as") {
            self.bump();
            decl.label = self.eat_name();
        }
        if let Some(lx) = self.eat(Kind::Color) {
            decl.color = Some(self.token(lx));
        }
        if let Some(lx) = self.eat(Kind::Number) {
            decl.width = Some(self.token(lx));
        }

        decl.span = self.span_since(start);
        decl
    }

    // ============================================
    // Statements
    // ============================================

    fn stats(&mut self, nested: bool) -> Vec<Stat> {
        let mut stats = Vec::new();
        loop {
            self.skip_separators();
            match self.peek_kind(0) {
                None => break,
                Some(Kind::RBrace) if nested => break,
                Some(Kind::RBrace) => {
                    stats.push(self.stray_braces());
                    continue;
                }
                _ => {}
            }
            stats.push(self.stat());
        }
        stats
    }

    fn stat(&mut self) -> Stat {
        let start = self.pos;
        let mut stat = Stat::default();

        match self.peek_kind(0) {
            Some(Kind::DoubleEq) => stat.divider = Some(self.divider()),
            Some(Kind::At) if self.at_word(1, "return") => stat.ret = Some(self.at_return()),
            Some(Kind::Ident) => match self.word(0).unwrap_or_default() {
                "if" => stat.alt = Some(self.alt()),
                "while" | "for" | "forEach" | "foreach" | "loop" => {
                    stat.r#loop = Some(self.loop_fragment())
                }
                "par" => stat.par = Some(self.block_fragment(false)),
                "opt" => stat.opt = Some(self.block_fragment(false)),
                "critical" => stat.critical = Some(self.block_fragment(true)),
                "section" => stat.section = Some(self.block_fragment(true)),
                "try" => stat.tcf = Some(self.tcf()),
                "ref" if self.peek_kind(1) == Some(Kind::LParen) => {
                    stat.reference = Some(self.reference())
                }
                "return" => stat.ret = Some(self.ret()),
                _ => self.interaction(&mut stat),
            },
            Some(Kind::Str) => self.interaction(&mut stat),
            _ => {}
        }

        if stat.construct().is_none() {
            self.recover();
        }
        if self.pos == start {
            self.bump();
        }

        stat.span = self.span_since(start);
        stat.text = self.src[stat.span.start..stat.span.stop].to_string();
        stat
    }

    /// A run of unbalanced closing braces, kept as one statement with no construct.
    fn stray_braces(&mut self) -> Stat {
        let start = self.pos;
        while self.at(Kind::RBrace) {
            self.bump();
        }
        let span = self.span_since(start);
        Stat {
            text: self.src[span.start..span.stop].to_string(),
            span,
            ..Stat::default()
        }
    }

    /// Skip to the end of the current statement.
    fn recover(&mut self) {
        let mut depth = 0usize;
        while let Some(kind) = self.peek_kind(0) {
            match kind {
                Kind::Newline | Kind::Semi if depth == 0 => break,
                Kind::RBrace if depth == 0 => break,
                Kind::LBrace => depth += 1,
                Kind::RBrace => depth -= 1,
                _ => {}
            }
            self.bump();
        }
    }

    fn assignment_prefix(&mut self) -> Option<AssignmentSyntax> {
        let typed = self.peek_kind(0) == Some(Kind::Ident)
            && self.peek_kind(1) == Some(Kind::Ident)
            && self.peek_kind(2) == Some(Kind::Assign)
            && !self.at_word(0, "new");
        if typed {
            let ty = self.eat_name();
            let assignee = self.eat_name();
            self.bump();
            return Some(AssignmentSyntax { assignee, ty });
        }
        if self.peek_kind(0) == Some(Kind::Ident) && self.peek_kind(1) == Some(Kind::Assign) {
            let assignee = self.eat_name();
            self.bump();
            return Some(AssignmentSyntax { assignee, ty: None });
        }
        None
    }

    fn interaction(&mut self, stat: &mut Stat) {
        let start = self.pos;
        let assignment = self.assignment_prefix();

        if self.at_word(0, "new") {
            stat.creation = Some(self.creation(start, assignment));
            return;
        }

        let Some(first) = self.eat_name() else {
            if assignment.is_some() {
                stat.message = Some(MessageSyntax {
                    assignment,
                    span: self.span_since(start),
                    ..MessageSyntax::default()
                });
            }
            return;
        };

        let (from, to, method) = if self.eat(Kind::Arrow).is_some() {
            let target = self.eat_name();
            if self.eat(Kind::Dot).is_none() {
                let content = if self.eat(Kind::Colon).is_some() {
                    self.rest_of_line(false)
                } else {
                    None
                };
                stat.async_message = Some(AsyncMessageSyntax {
                    from: Some(first),
                    to: target,
                    content,
                    span: self.span_since(start),
                });
                return;
            }
            (Some(first), target, self.eat_name())
        } else if self.eat(Kind::Dot).is_some() {
            (None, Some(first), self.eat_name())
        } else {
            (None, None, Some(first))
        };

        let args = if self.at(Kind::LParen) {
            Some(self.arguments())
        } else {
            None
        };
        let block = self.braced_block_opt();

        stat.message = Some(MessageSyntax {
            from,
            to,
            method,
            args,
            assignment,
            block,
            span: self.span_since(start),
        });
    }

    fn creation(&mut self, start: usize, assignment: Option<AssignmentSyntax>) -> CreationSyntax {
        self.bump();
        let constructor = self.eat_name();
        let args = if self.at(Kind::LParen) {
            Some(self.arguments())
        } else {
            None
        };
        let block = self.braced_block_opt();
        CreationSyntax {
            assignment,
            constructor,
            args,
            block,
            span: self.span_since(start),
        }
    }

    fn ret(&mut self) -> ReturnSyntax {
        let start = self.pos;
        self.bump();
        let expr = self.rest_of_line(true);
        ReturnSyntax {
            expr,
            async_message: None,
            span: self.span_since(start),
        }
    }

    fn at_return(&mut self) -> ReturnSyntax {
        let start = self.pos;
        self.bump();
        self.bump();
        let inner = self.pos;
        let from = self.eat_name();
        self.eat(Kind::Arrow);
        let to = self.eat_name();
        let content = if self.eat(Kind::Colon).is_some() {
            self.rest_of_line(false)
        } else {
            None
        };
        ReturnSyntax {
            expr: None,
            async_message: Some(AsyncMessageSyntax {
                from,
                to,
                content,
                span: self.span_since(inner),
            }),
            span: self.span_since(start),
        }
    }

    fn divider(&mut self) -> DividerSyntax {
        let start = self.pos;
        self.bump();
        let inner = self.pos;
        while !matches!(
            self.peek_kind(0),
            None | Some(Kind::DoubleEq) | Some(Kind::Newline)
        ) {
            self.bump();
        }
        let note = (self.pos > inner).then(|| self.range_token(&(inner..self.pos)));
        self.eat(Kind::DoubleEq);
        DividerSyntax {
            note,
            span: self.span_since(start),
        }
    }

    fn alt(&mut self) -> AltSyntax {
        let start = self.pos;
        self.bump();
        let if_block = ConditionalBlock {
            condition: self.condition(),
            block: self.braced_block_opt(),
        };

        let mut else_ifs = Vec::new();
        let mut else_block = None;
        while self.continues_with("else") {
            self.bump();
            if self.at_word(0, "if") {
                self.bump();
                else_ifs.push(ConditionalBlock {
                    condition: self.condition(),
                    block: self.braced_block_opt(),
                });
            } else {
                else_block = self.braced_block_opt();
                break;
            }
        }

        AltSyntax {
            if_block: Some(if_block),
            else_ifs,
            else_block,
            span: self.span_since(start),
        }
    }

    fn loop_fragment(&mut self) -> LoopSyntax {
        let start = self.pos;
        self.bump();
        LoopSyntax {
            condition: self.condition(),
            block: self.braced_block_opt(),
            span: self.span_since(start),
        }
    }

    fn block_fragment(&mut self, labelled: bool) -> BlockFragmentSyntax {
        let start = self.pos;
        self.bump();
        let label = if labelled { self.condition() } else { None };
        BlockFragmentSyntax {
            label,
            block: self.braced_block_opt(),
            span: self.span_since(start),
        }
    }

    fn tcf(&mut self) -> TcfSyntax {
        let start = self.pos;
        self.bump();
        let try_block = self.braced_block_opt();

        let mut catches = Vec::new();
        while self.continues_with("catch") {
            self.bump();
            catches.push(ConditionalBlock {
                condition: self.condition(),
                block: self.braced_block_opt(),
            });
        }
        let finally_block = if self.continues_with("finally") {
            self.bump();
            self.braced_block_opt()
        } else {
            None
        };

        TcfSyntax {
            try_block,
            catches,
            finally_block,
            span: self.span_since(start),
        }
    }

    fn reference(&mut self) -> RefSyntax {
        let start = self.pos;
        self.bump();
        self.bump();
        let mut names = Vec::new();
        while let Some(kind) = self.peek_kind(0) {
            match kind {
                Kind::Ident | Kind::Str => names.extend(self.eat_name()),
                Kind::RParen => {
                    self.bump();
                    break;
                }
                Kind::LBrace | Kind::RBrace => break,
                _ => {
                    self.bump();
                }
            }
        }
        RefSyntax {
            names,
            span: self.span_since(start),
        }
    }

    fn braced_block_opt(&mut self) -> Option<Block> {
        let start = self.pos;
        self.eat(Kind::LBrace)?;
        let stats = self.stats(true);
        self.eat(Kind::RBrace);
        Some(Block {
            stats,
            span: self.span_since(start),
        })
    }

    /// Raw text up to the end of the line, or up to a closing brace of the enclosing block.
    fn rest_of_line(&mut self, stop_at_semi: bool) -> Option<Token> {
        let inner = self.pos;
        let mut depth = 0usize;
        while let Some(kind) = self.peek_kind(0) {
            match kind {
                Kind::Newline => break,
                Kind::Semi if stop_at_semi && depth == 0 => break,
                Kind::RBrace if depth == 0 => break,
                Kind::LBrace => depth += 1,
                Kind::RBrace => depth -= 1,
                _ => {}
            }
            self.bump();
        }
        (self.pos > inner).then(|| self.range_token(&(inner..self.pos)))
    }

    // ============================================
    // Conditions, arguments, expressions
    // ============================================

    /// Consumes `( ... )` and returns the token range strictly inside the parentheses.
    fn balanced(&mut self) -> Range<usize> {
        self.bump();
        let inner = self.pos;
        let mut depth = 1usize;
        while let Some(kind) = self.peek_kind(0) {
            match kind {
                Kind::LParen => depth += 1,
                Kind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let range = inner..self.pos;
                        self.bump();
                        return range;
                    }
                }
                Kind::LBrace | Kind::RBrace => break,
                _ => {}
            }
            self.bump();
        }
        inner..self.pos
    }

    fn condition(&mut self) -> Option<Condition> {
        if !self.at(Kind::LParen) {
            return None;
        }
        let inner = self.balanced();
        Some(Condition {
            text: self.range_token(&inner),
            expr: self.expr(inner),
        })
    }

    fn arguments(&mut self) -> Arguments {
        let inner = self.balanced();
        let exprs = self
            .split_commas(inner.clone())
            .into_iter()
            .filter_map(|range| self.expr(range))
            .collect();
        let text = self.range_token(&inner);
        Arguments {
            exprs,
            text: text.text,
            span: text.span,
        }
    }

    fn split_commas(&self, range: Range<usize>) -> Vec<Range<usize>> {
        let mut parts = Vec::new();
        let mut depth = 0usize;
        let mut part_start = range.start;
        for idx in range.clone() {
            match self.toks[idx].kind {
                Kind::LParen => depth += 1,
                Kind::RParen => depth = depth.saturating_sub(1),
                Kind::Comma if depth == 0 => {
                    parts.push(part_start..idx);
                    part_start = idx + 1;
                }
                _ => {}
            }
        }
        parts.push(part_start..range.end);
        parts
    }

    fn matching_paren(&self, open: usize, end: usize) -> Option<usize> {
        let mut depth = 0usize;
        for idx in open..end {
            match self.toks[idx].kind {
                Kind::LParen => depth += 1,
                Kind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn expr(&self, range: Range<usize>) -> Option<Expr> {
        let significant: Vec<usize> = range
            .clone()
            .filter(|&i| self.toks[i].kind != Kind::Newline)
            .collect();
        let kind_at = |n: usize| significant.get(n).map(|&i| self.toks[i].kind);
        let token_at = |n: usize| significant.get(n).map(|&i| self.token(self.toks[i]));

        match significant.len() {
            0 => return None,
            1 if matches!(kind_at(0), Some(Kind::Ident | Kind::Number | Kind::Str)) => {
                return token_at(0).map(Expr::Atom);
            }
            _ => {}
        }

        let (target, method_at) = match (kind_at(0), kind_at(1), kind_at(2)) {
            (Some(Kind::Ident), Some(Kind::Dot), Some(Kind::Ident)) => (token_at(0), 2),
            (Some(Kind::Ident), Some(Kind::LParen), _) => (None, 0),
            _ => return Some(Expr::Raw(self.range_token(&range))),
        };
        let open = significant.get(method_at + 1).copied();
        let closes_at_end = open
            .filter(|&o| self.toks[o].kind == Kind::LParen)
            .and_then(|o| self.matching_paren(o, range.end))
            .is_some_and(|close| Some(&close) == significant.last());

        match open {
            Some(open) if closes_at_end => {
                let close = *significant.last().unwrap_or(&open);
                let args = self
                    .split_commas(open + 1..close)
                    .into_iter()
                    .filter_map(|r| self.expr(r))
                    .collect();
                Some(Expr::Invocation {
                    target,
                    method: token_at(method_at),
                    args,
                })
            }
            _ => Some(Expr::Raw(self.range_token(&range))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_stat(program: &Program) -> &Stat {
        assert_eq!(program.stats().len(), 1, "expected one statement");
        &program.stats()[0]
    }

    #[test]
    fn test_parse_head_declarations() {
        let program = parse("A B C.m");
        let head = program.head.as_ref().expect("head");
        let names: Vec<&str> = head
            .items
            .iter()
            .filter_map(|item| match item {
                HeadItem::Participant(p) => p.name.as_ref().map(|n| n.text.as_str()),
                HeadItem::Group(_) => None,
            })
            .collect();
        assert_eq!(names, vec!["A", "B"]);

        let stat = only_stat(&program);
        let msg = stat.message.as_ref().expect("message");
        assert_eq!(msg.to.as_ref().unwrap().text, "C");
        assert_eq!(msg.method.as_ref().unwrap().text, "m");
        assert!(msg.args.is_none());
    }

    #[test]
    fn test_parse_decorated_participant() {
        let program = parse("@Actor <<service>> Api as \"Public API\" #ff0000 120\n");
        let head = program.head.expect("head");
        if let HeadItem::Participant(decl) = &head.items[0] {
            assert_eq!(decl.participant_type.as_ref().unwrap().text, "Actor");
            assert_eq!(decl.stereotype.as_ref().unwrap().text, "service");
            assert_eq!(decl.name.as_ref().unwrap().text, "Api");
            assert_eq!(decl.label.as_ref().unwrap().text, "Public API");
            assert_eq!(decl.color.as_ref().unwrap().text, "#ff0000");
            assert_eq!(decl.width.as_ref().unwrap().text, "120");
        } else {
            panic!("Expected participant declaration");
        }
    }

    #[test]
    fn test_parse_starter_and_group() {
        let program = parse("group Backend { A B }\n@Starter(A)\nA.m");
        let head = program.head.as_ref().expect("head");
        assert_eq!(program.declared_starter().unwrap().text, "A");
        if let HeadItem::Group(group) = &head.items[0] {
            assert_eq!(group.name.as_ref().unwrap().text, "Backend");
            assert_eq!(group.participants.len(), 2);
        } else {
            panic!("Expected group");
        }
    }

    #[test]
    fn test_parse_nested_sync_messages() {
        let program = parse("A.m { B.m { C.m } }");
        let outer = only_stat(&program).message.as_ref().unwrap();
        let middle = outer.block.as_ref().unwrap().stats[0].message.as_ref().unwrap();
        assert_eq!(middle.to.as_ref().unwrap().text, "B");
        let inner = middle.block.as_ref().unwrap().stats[0].message.as_ref().unwrap();
        assert_eq!(inner.to.as_ref().unwrap().text, "C");
    }

    #[test]
    fn test_parse_self_call_with_sender_and_args() {
        let program = parse("String r = A->A.selfCall(x, B.get(y))");
        let msg = only_stat(&program).message.as_ref().unwrap();
        assert_eq!(msg.from.as_ref().unwrap().text, "A");
        assert_eq!(msg.to.as_ref().unwrap().text, "A");
        let assignment = msg.assignment.as_ref().unwrap();
        assert_eq!(assignment.ty.as_ref().unwrap().text, "String");
        assert_eq!(assignment.assignee.as_ref().unwrap().text, "r");

        let args = msg.args.as_ref().unwrap();
        assert_eq!(args.text, "x, B.get(y)");
        assert_eq!(args.exprs.len(), 2);
        assert!(matches!(
            &args.exprs[1],
            Expr::Invocation { target: Some(t), .. } if t.text == "B"
        ));
    }

    #[test]
    fn test_parse_async_creation_and_return() {
        let program = parse("A->B: hello there\nb = new B(1) { return b }\n@return B->A: done");
        let stats = program.stats();
        assert_eq!(stats.len(), 3);

        let async_msg = stats[0].async_message.as_ref().unwrap();
        assert_eq!(async_msg.content.as_ref().unwrap().text, "hello there");

        let creation = stats[1].creation.as_ref().unwrap();
        assert_eq!(creation.constructor.as_ref().unwrap().text, "B");
        assert_eq!(creation.args.as_ref().unwrap().text, "1");
        let ret = creation.block.as_ref().unwrap().stats[0].ret.as_ref().unwrap();
        assert_eq!(ret.expr.as_ref().unwrap().text, "b");

        let at_return = stats[2].ret.as_ref().unwrap().async_message.as_ref().unwrap();
        assert_eq!(at_return.to.as_ref().unwrap().text, "A");
    }

    #[test]
    fn test_parse_fragments() {
        let src = r#"
if (x > 1) {
  A.m
} else if (y) {
  B.m
} else {
  C.m
}
while (more) { A.next }
try { A.risky } catch (Error e) { B.log } finally { C.close }
par { A.a  B.b }
critical("lock") { A.lock }
ref(flow1, A, B)
== phase two ==
"#;
        let program = parse(src);
        let stats = program.stats();
        assert_eq!(stats.len(), 7);

        let alt = stats[0].alt.as_ref().unwrap();
        assert_eq!(alt.if_block.as_ref().unwrap().condition.as_ref().unwrap().text.text, "x > 1");
        assert_eq!(alt.else_ifs.len(), 1);
        assert!(alt.else_block.is_some());

        assert!(stats[1].r#loop.is_some());
        let tcf = stats[2].tcf.as_ref().unwrap();
        assert_eq!(tcf.catches.len(), 1);
        assert!(tcf.finally_block.is_some());
        assert_eq!(stats[3].par.as_ref().unwrap().block.as_ref().unwrap().stats.len(), 2);
        assert_eq!(
            stats[4].critical.as_ref().unwrap().label.as_ref().unwrap().text.text,
            "\"lock\""
        );
        let names: Vec<&str> = stats[5]
            .reference
            .as_ref()
            .unwrap()
            .names
            .iter()
            .map(|n| n.text.as_str())
            .collect();
        assert_eq!(names, vec!["flow1", "A", "B"]);
        assert_eq!(stats[6].divider.as_ref().unwrap().note.as_ref().unwrap().text, "phase two");
    }

    #[test]
    fn test_malformed_statement_is_kept_without_construct() {
        let program = parse("A.m\n) ) garbage\nB.n");
        let stats = program.stats();
        assert_eq!(stats.len(), 3);
        assert!(stats[0].construct().is_some());
        assert!(stats[1].construct().is_none());
        assert_eq!(stats[1].text, ") ) garbage");
        assert!(stats[2].construct().is_some());
    }

    #[test]
    fn test_unbalanced_closing_braces_are_kept_as_one_statement() {
        let program = parse("A.m\n}}}}\nB.n");
        let stats = program.stats();
        assert_eq!(stats.len(), 3);
        assert!(stats[1].construct().is_none());
        assert_eq!(stats[1].text, "}}}}");
        assert_eq!(stats[1].span.line, 2);
        assert!(stats[2].construct().is_some());
    }

    #[test]
    fn test_spans_track_lines_and_columns() {
        let program = parse("A.m\n  B.n");
        let second = &program.stats()[1];
        assert_eq!(second.span.line, 2);
        assert_eq!(second.span.column, 2);
        assert_eq!(&"A.m\n  B.n"[second.span.start..second.span.stop], "B.n");
    }
}
