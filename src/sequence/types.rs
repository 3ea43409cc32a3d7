use serde::Serialize;

use super::participants::STARTER;
use super::syntax::Span;

/// Index of a node in [`DocumentNode::nodes`].
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Sync,
    Async,
    Creation,
    Return,
}

impl MessageKind {
    /// Sync calls and creations open an occurrence bar on their owner.
    pub fn activates(self) -> bool {
        matches!(self, MessageKind::Sync | MessageKind::Creation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub assignee: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageNode {
    pub id: NodeId,
    pub kind: MessageKind,
    /// Resolved sender: the explicit one, else the origin.
    pub from: String,
    pub explicit_from: bool,
    /// Receiver as written, if any.
    pub to: Option<String>,
    /// Resolved receiver.
    pub owner: String,
    pub origin: String,
    pub signature: String,
    pub assignment: Option<Assignment>,
    pub children: Vec<Statement>,
    pub source: Span,
    /// False when the signature is synthesized and has no source text to edit.
    pub editable: bool,
}

impl MessageNode {
    pub fn is_self_message(&self) -> bool {
        self.explicit_from
            && self.to.as_deref() == Some(self.from.as_str())
            && self.from != STARTER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Alt,
    Opt,
    Loop,
    Par,
    Critical,
    Section,
    Tcf,
    Ref,
}

impl FragmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Alt => "alt",
            FragmentKind::Opt => "opt",
            FragmentKind::Loop => "loop",
            FragmentKind::Par => "par",
            FragmentKind::Critical => "critical",
            FragmentKind::Section => "section",
            FragmentKind::Tcf => "tcf",
            FragmentKind::Ref => "ref",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    /// Keyword of the branch (`if`, `else`, `catch`, ...).
    pub label: String,
    pub condition: Option<String>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentNode {
    pub id: NodeId,
    pub kind: FragmentKind,
    pub origin: String,
    pub sections: Vec<Section>,
    /// Every participant touched inside, in first-appearance order.
    pub participants: Vec<String>,
    pub source: Span,
}

impl FragmentNode {
    /// Fragments directly nested in this one (looking through message bodies).
    pub fn nested_fragments(&self) -> Vec<&FragmentNode> {
        let mut out = Vec::new();
        for section in &self.sections {
            collect_fragments(&section.statements, &mut out);
        }
        out
    }

    /// Levels of fragments nested inside this one; 0 for a leaf fragment.
    pub fn nesting_levels(&self) -> usize {
        self.nested_fragments()
            .iter()
            .map(|f| f.nesting_levels() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn messages(&self) -> Vec<&MessageNode> {
        let mut out = Vec::new();
        for section in &self.sections {
            collect_messages(&section.statements, &mut out);
        }
        out
    }
}

fn collect_fragments<'a>(statements: &'a [Statement], out: &mut Vec<&'a FragmentNode>) {
    for statement in statements {
        match statement {
            Statement::Fragment(fragment) => out.push(fragment),
            Statement::Message(msg) => collect_fragments(&msg.children, out),
            Statement::Divider(_) | Statement::Error(_) => {}
        }
    }
}

fn collect_messages<'a>(statements: &'a [Statement], out: &mut Vec<&'a MessageNode>) {
    for statement in statements {
        match statement {
            Statement::Message(msg) => {
                out.push(msg);
                collect_messages(&msg.children, out);
            }
            Statement::Fragment(fragment) => {
                for section in &fragment.sections {
                    collect_messages(&section.statements, out);
                }
            }
            Statement::Divider(_) | Statement::Error(_) => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DividerNode {
    pub id: NodeId,
    pub note: String,
    pub source: Span,
}

/// Fields recovered from a statement that failed to transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialFields {
    pub from: Option<String>,
    pub to: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorNode {
    pub id: NodeId,
    pub message: String,
    pub raw: String,
    pub source: Span,
    pub partial: PartialFields,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Statement {
    Message(MessageNode),
    Fragment(FragmentNode),
    Divider(DividerNode),
    Error(ErrorNode),
}

impl Statement {
    pub fn id(&self) -> NodeId {
        match self {
            Statement::Message(n) => n.id,
            Statement::Fragment(n) => n.id,
            Statement::Divider(n) => n.id,
            Statement::Error(n) => n.id,
        }
    }

    pub fn as_message(&self) -> Option<&MessageNode> {
        match self {
            Statement::Message(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_fragment(&self) -> Option<&FragmentNode> {
        match self {
            Statement::Fragment(fragment) => Some(fragment),
            _ => None,
        }
    }
}

/// A geometry failure for one element, located in the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn at(span: Span, error: &crate::error::LayoutError) -> Self {
        Diagnostic {
            line: span.line,
            column: span.column,
            message: error.to_string(),
        }
    }
}

/// Flat record per node, used for ancestry queries.
#[derive(Debug, Clone, Serialize)]
pub struct NodeEntry {
    pub parent: Option<NodeId>,
    /// Owner of the occurrence this node opens, for sync messages and creations.
    pub activation: Option<String>,
}

/// Root of the transformed tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentNode {
    /// Structural version of the source this tree was built from.
    pub version: u64,
    pub starter: String,
    pub statements: Vec<Statement>,
    pub nodes: Vec<NodeEntry>,
}

impl DocumentNode {
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    pub fn activation(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).and_then(|n| n.activation.as_deref())
    }

    /// All message nodes, depth-first in source order.
    pub fn messages(&self) -> Vec<&MessageNode> {
        let mut out = Vec::new();
        collect_messages(&self.statements, &mut out);
        out
    }

    /// All fragments at any depth, depth-first in source order.
    pub fn fragments(&self) -> Vec<&FragmentNode> {
        fn walk<'a>(statements: &'a [Statement], out: &mut Vec<&'a FragmentNode>) {
            for statement in statements {
                match statement {
                    Statement::Fragment(fragment) => {
                        out.push(fragment);
                        for section in &fragment.sections {
                            walk(&section.statements, out);
                        }
                    }
                    Statement::Message(msg) => walk(&msg.children, out),
                    Statement::Divider(_) | Statement::Error(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.statements, &mut out);
        out
    }

    /// Finds the statement with `id`.
    pub fn find(&self, id: NodeId) -> Option<&Statement> {
        fn walk(statements: &[Statement], id: NodeId) -> Option<&Statement> {
            statements.iter().find_map(|statement| {
                if statement.id() == id {
                    return Some(statement);
                }
                match statement {
                    Statement::Message(msg) => walk(&msg.children, id),
                    Statement::Fragment(fragment) => fragment
                        .sections
                        .iter()
                        .find_map(|s| walk(&s.statements, id)),
                    Statement::Divider(_) | Statement::Error(_) => None,
                }
            })
        }
        walk(&self.statements, id)
    }
}
