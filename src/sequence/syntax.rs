//! Read-only syntax tree consumed by the semantic model.
//!
//! These are the only types the core reads from the grammar layer. Every child is optional so a
//! tree built from a partially failed parse is still representable; the adapters in this module
//! and in `transform` treat a missing child as "not present" rather than trusting it.

use serde::{Deserialize, Serialize};

/// Source range of a node. `start`/`stop` are byte offsets (`stop` exclusive); `line` is
/// 1-based and `column` 0-based, both for `start`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, stop: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            stop,
            line,
            column,
        }
    }

    /// Smallest span covering both.
    pub fn join(self, other: Span) -> Span {
        let first = if self.start <= other.start { self } else { other };
        Span {
            start: first.start,
            stop: self.stop.max(other.stop),
            line: first.line,
            column: first.column,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            span,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub head: Option<Head>,
    pub block: Option<Block>,
    pub span: Span,
}

impl Program {
    /// The `@Starter(X)` name, if one was declared.
    pub fn declared_starter(&self) -> Option<&Token> {
        self.head
            .as_ref()
            .and_then(|h| h.starter.as_ref())
            .and_then(|s| s.name.as_ref())
    }

    pub fn stats(&self) -> &[Stat] {
        self.block.as_ref().map(|b| b.stats.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct Head {
    pub items: Vec<HeadItem>,
    pub starter: Option<StarterExp>,
}

#[derive(Debug, Clone)]
pub enum HeadItem {
    Participant(ParticipantDecl),
    Group(GroupDecl),
}

#[derive(Debug, Clone, Default)]
pub struct ParticipantDecl {
    pub name: Option<Token>,
    /// Annotation such as `@Actor` or `@Database`, without the `@`.
    pub participant_type: Option<Token>,
    pub stereotype: Option<Token>,
    pub label: Option<Token>,
    pub color: Option<Token>,
    pub width: Option<Token>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct GroupDecl {
    pub name: Option<Token>,
    pub participants: Vec<ParticipantDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct StarterExp {
    pub name: Option<Token>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stats: Vec<Stat>,
    pub span: Span,
}

impl Block {
    pub fn stats_of(block: Option<&Block>) -> &[Stat] {
        block.map(|b| b.stats.as_slice()).unwrap_or(&[])
    }
}

/// One statement. At most one construct slot is expected to be set; a recovering parser may
/// leave none, or more than one.
#[derive(Debug, Clone, Default)]
pub struct Stat {
    pub alt: Option<AltSyntax>,
    pub par: Option<BlockFragmentSyntax>,
    pub opt: Option<BlockFragmentSyntax>,
    pub critical: Option<BlockFragmentSyntax>,
    pub section: Option<BlockFragmentSyntax>,
    pub reference: Option<RefSyntax>,
    pub r#loop: Option<LoopSyntax>,
    pub creation: Option<CreationSyntax>,
    pub message: Option<MessageSyntax>,
    pub async_message: Option<AsyncMessageSyntax>,
    pub ret: Option<ReturnSyntax>,
    pub divider: Option<DividerSyntax>,
    pub tcf: Option<TcfSyntax>,
    pub span: Span,
    /// Raw source text of the whole statement.
    pub text: String,
}

/// Borrowed view of the construct a statement holds.
#[derive(Debug, Clone, Copy)]
pub enum Construct<'a> {
    Alt(&'a AltSyntax),
    Par(&'a BlockFragmentSyntax),
    Opt(&'a BlockFragmentSyntax),
    Critical(&'a BlockFragmentSyntax),
    Section(&'a BlockFragmentSyntax),
    Ref(&'a RefSyntax),
    Loop(&'a LoopSyntax),
    Creation(&'a CreationSyntax),
    Message(&'a MessageSyntax),
    AsyncMessage(&'a AsyncMessageSyntax),
    Return(&'a ReturnSyntax),
    Divider(&'a DividerSyntax),
    Tcf(&'a TcfSyntax),
}

impl Stat {
    /// First present construct, in fixed precedence order: alt, par, opt, critical, section,
    /// ref, loop, creation, message, asyncMessage, return, divider, tcf.
    pub fn construct(&self) -> Option<Construct<'_>> {
        self.alt
            .as_ref()
            .map(Construct::Alt)
            .or_else(|| self.par.as_ref().map(Construct::Par))
            .or_else(|| self.opt.as_ref().map(Construct::Opt))
            .or_else(|| self.critical.as_ref().map(Construct::Critical))
            .or_else(|| self.section.as_ref().map(Construct::Section))
            .or_else(|| self.reference.as_ref().map(Construct::Ref))
            .or_else(|| self.r#loop.as_ref().map(Construct::Loop))
            .or_else(|| self.creation.as_ref().map(Construct::Creation))
            .or_else(|| self.message.as_ref().map(Construct::Message))
            .or_else(|| self.async_message.as_ref().map(Construct::AsyncMessage))
            .or_else(|| self.ret.as_ref().map(Construct::Return))
            .or_else(|| self.divider.as_ref().map(Construct::Divider))
            .or_else(|| self.tcf.as_ref().map(Construct::Tcf))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentSyntax {
    pub assignee: Option<Token>,
    pub ty: Option<Token>,
}

#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub exprs: Vec<Expr>,
    /// Text between the parentheses.
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct MessageSyntax {
    pub from: Option<Token>,
    pub to: Option<Token>,
    pub method: Option<Token>,
    pub args: Option<Arguments>,
    pub assignment: Option<AssignmentSyntax>,
    pub block: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct AsyncMessageSyntax {
    pub from: Option<Token>,
    pub to: Option<Token>,
    pub content: Option<Token>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct CreationSyntax {
    pub assignment: Option<AssignmentSyntax>,
    pub constructor: Option<Token>,
    pub args: Option<Arguments>,
    pub block: Option<Block>,
    pub span: Span,
}

/// `return expr` or `@return A->B: content`.
#[derive(Debug, Clone, Default)]
pub struct ReturnSyntax {
    pub expr: Option<Token>,
    pub async_message: Option<AsyncMessageSyntax>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Condition {
    pub text: Token,
    pub expr: Option<Expr>,
}

#[derive(Debug, Clone, Default)]
pub struct ConditionalBlock {
    pub condition: Option<Condition>,
    pub block: Option<Block>,
}

#[derive(Debug, Clone, Default)]
pub struct AltSyntax {
    pub if_block: Option<ConditionalBlock>,
    pub else_ifs: Vec<ConditionalBlock>,
    pub else_block: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct LoopSyntax {
    pub condition: Option<Condition>,
    pub block: Option<Block>,
    pub span: Span,
}

/// `par`, `opt`, `critical(label)` and `section(label)` share one shape.
#[derive(Debug, Clone, Default)]
pub struct BlockFragmentSyntax {
    pub label: Option<Condition>,
    pub block: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct TcfSyntax {
    pub try_block: Option<Block>,
    pub catches: Vec<ConditionalBlock>,
    pub finally_block: Option<Block>,
    pub span: Span,
}

/// `ref(id, A, B)`: the first name is the reference id, the rest are participants.
#[derive(Debug, Clone, Default)]
pub struct RefSyntax {
    pub names: Vec<Token>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct DividerSyntax {
    pub note: Option<Token>,
    pub span: Span,
}

/// Expressions inside argument lists and conditions.
#[derive(Debug, Clone)]
pub enum Expr {
    Atom(Token),
    Invocation {
        target: Option<Token>,
        method: Option<Token>,
        args: Vec<Expr>,
    },
    Raw(Token),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Raw(Token::new("", Span::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_condition_has_an_empty_token() {
        let condition = Condition::default();
        assert_eq!(condition.text, Token::default());
        assert!(condition.text.text.is_empty());
        assert!(condition.expr.is_none());
    }

    #[test]
    fn construct_prefers_fragments_over_messages() {
        let stat = Stat {
            message: Some(MessageSyntax::default()),
            opt: Some(BlockFragmentSyntax::default()),
            divider: Some(DividerSyntax::default()),
            ..Stat::default()
        };
        assert!(matches!(stat.construct(), Some(Construct::Opt(_))));
    }

    #[test]
    fn construct_orders_creation_before_message_and_tcf_last() {
        let stat = Stat {
            tcf: Some(TcfSyntax::default()),
            message: Some(MessageSyntax::default()),
            creation: Some(CreationSyntax::default()),
            ..Stat::default()
        };
        assert!(matches!(stat.construct(), Some(Construct::Creation(_))));

        let stat = Stat {
            tcf: Some(TcfSyntax::default()),
            divider: Some(DividerSyntax::default()),
            ..Stat::default()
        };
        assert!(matches!(stat.construct(), Some(Construct::Divider(_))));
        assert!(Stat::default().construct().is_none());
    }

    #[test]
    fn join_covers_both_spans() {
        let a = Span::new(4, 8, 1, 4);
        let b = Span::new(0, 2, 1, 0);
        assert_eq!(a.join(b), Span::new(0, 8, 1, 0));
    }
}
