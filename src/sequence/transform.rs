//! Syntax tree to typed message/fragment tree.
//!
//! Each statement is classified through [`Stat::construct`]. A statement that cannot be
//! interpreted becomes an [`ErrorNode`] and its siblings carry on.

use indexmap::IndexSet;
use serde::Serialize;

use super::order::order_participants;
use super::participants::{STARTER, collect_participants, creation_name};
use super::syntax::*;
use super::types::*;
use crate::error::TransformError;
use crate::text::{format_text, unquote};

const CREATE_MARKER: &str = "«create»";

#[derive(Debug, Clone, Serialize)]
pub struct TransformResult {
    pub ast: DocumentNode,
    pub success: bool,
    /// One `"line:column message"` entry per error node.
    pub errors: Vec<String>,
}

/// Builds the typed tree. `starter_override` replaces any `@Starter` in the source.
pub fn transform(program: &Program, starter_override: Option<&str>) -> TransformResult {
    let starter = starter_override
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| program.declared_starter().map(|t| t.text.clone()))
        .unwrap_or_else(|| STARTER.to_string());

    let mut transformer = Transformer::default();
    let top = Frame {
        parent: None,
        origin: top_level_origin(program, starter_override, &starter),
        caller: None,
        owner: None,
    };
    let statements = transformer.stats(program.stats(), &top);

    tracing::debug!(
        nodes = transformer.nodes.len(),
        errors = transformer.errors.len(),
        "transformed syntax tree"
    );

    let success = transformer.errors.is_empty();
    TransformResult {
        ast: DocumentNode {
            version: 0,
            starter,
            statements,
            nodes: transformer.nodes,
        },
        success,
        errors: transformer.errors,
    }
}

/// Participant whose frame holds the top-level statements.
///
/// The sentinel only gets a lifeline when some top-level message sends from it, so without a
/// declared starter and without such a message the leftmost lifeline takes its place.
fn top_level_origin(program: &Program, starter_override: Option<&str>, starter: &str) -> String {
    if starter != STARTER {
        return starter.to_string();
    }
    let context = collect_participants(program, starter_override);
    if context.implicit_sender {
        return STARTER.to_string();
    }
    order_participants(&context)
        .into_iter()
        .next()
        .map(|p| p.name)
        .unwrap_or_else(|| STARTER.to_string())
}

/// Enclosing context of a statement.
struct Frame {
    parent: Option<NodeId>,
    /// Participant owning the horizontal frame; default sender.
    origin: String,
    /// Sender of the nearest enclosing sync message or creation.
    caller: Option<String>,
    /// Receiver of the nearest enclosing sync message or creation.
    owner: Option<String>,
}

impl Frame {
    fn inside(&self, id: NodeId) -> Frame {
        Frame {
            parent: Some(id),
            origin: self.origin.clone(),
            caller: self.caller.clone(),
            owner: self.owner.clone(),
        }
    }

    fn activation(id: NodeId, from: &str, owner: &str) -> Frame {
        Frame {
            parent: Some(id),
            origin: owner.to_string(),
            caller: Some(from.to_string()),
            owner: Some(owner.to_string()),
        }
    }
}

#[derive(Default)]
struct Transformer {
    nodes: Vec<NodeEntry>,
    errors: Vec<String>,
}

fn text_of(token: Option<&Token>) -> Option<String> {
    token.map(|t| t.text.clone()).filter(|t| !t.is_empty())
}

fn formatted(token: Option<&Token>) -> Option<String> {
    token.map(|t| format_text(&t.text)).filter(|t| !t.is_empty())
}

fn assignment_of(syntax: Option<&AssignmentSyntax>) -> Option<Assignment> {
    let syntax = syntax?;
    Some(Assignment {
        assignee: text_of(syntax.assignee.as_ref())?,
        ty: text_of(syntax.ty.as_ref()),
    })
}

/// `method(args)` with the argument text normalized, or just `method` without parentheses.
fn message_signature(msg: &MessageSyntax) -> Option<String> {
    let method = text_of(msg.method.as_ref())?;
    Some(match &msg.args {
        Some(args) => format_text(&format!("{}({})", method, args.text)),
        None => method,
    })
}

fn partial_of(stat: &Stat) -> PartialFields {
    match stat.construct() {
        Some(Construct::Message(msg)) => PartialFields {
            from: text_of(msg.from.as_ref()),
            to: text_of(msg.to.as_ref()),
            signature: message_signature(msg),
        },
        Some(Construct::AsyncMessage(msg)) => PartialFields {
            from: text_of(msg.from.as_ref()),
            to: text_of(msg.to.as_ref()),
            signature: formatted(msg.content.as_ref()),
        },
        _ => PartialFields::default(),
    }
}

impl Transformer {
    fn alloc(&mut self, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(NodeEntry {
            parent,
            activation: None,
        });
        self.nodes.len() - 1
    }

    fn stats(&mut self, stats: &[Stat], frame: &Frame) -> Vec<Statement> {
        stats.iter().map(|stat| self.stat(stat, frame)).collect()
    }

    fn stat(&mut self, stat: &Stat, frame: &Frame) -> Statement {
        let id = self.alloc(frame.parent);
        match self.classify(id, stat, frame) {
            Ok(statement) => statement,
            Err(err) => self.error_node(id, stat, err),
        }
    }

    fn error_node(&mut self, id: NodeId, stat: &Stat, err: TransformError) -> Statement {
        let message = err.to_string();
        tracing::warn!(line = stat.span.line, column = stat.span.column, "{}", message);
        self.errors
            .push(format!("{}:{} {}", stat.span.line, stat.span.column, message));
        Statement::Error(ErrorNode {
            id,
            message,
            raw: stat.text.clone(),
            source: stat.span,
            partial: partial_of(stat),
        })
    }

    fn classify(
        &mut self,
        id: NodeId,
        stat: &Stat,
        frame: &Frame,
    ) -> Result<Statement, TransformError> {
        let construct = stat.construct().ok_or(TransformError::Unrecognized)?;
        let statement = match construct {
            Construct::Message(msg) => Statement::Message(self.sync_message(id, msg, frame)?),
            Construct::AsyncMessage(msg) => {
                Statement::Message(self.async_message(id, msg, frame)?)
            }
            Construct::Creation(creation) => {
                Statement::Message(self.creation(id, creation, frame)?)
            }
            Construct::Return(ret) => Statement::Message(self.ret(id, ret, frame)),
            Construct::Divider(divider) => Statement::Divider(DividerNode {
                id,
                note: formatted(divider.note.as_ref()).unwrap_or_default(),
                source: divider.span,
            }),
            Construct::Alt(alt) => {
                let mut sections = Vec::new();
                let inner = frame.inside(id);
                if let Some(branch) = &alt.if_block {
                    sections.push(self.conditional("if", branch, &inner));
                }
                for branch in &alt.else_ifs {
                    sections.push(self.conditional("else if", branch, &inner));
                }
                if let Some(block) = &alt.else_block {
                    sections.push(self.section("else", None, Some(block), &inner));
                }
                self.fragment(id, FragmentKind::Alt, sections, &[], alt.span, frame)
            }
            Construct::Loop(lp) => {
                let inner = frame.inside(id);
                let section =
                    self.section("loop", lp.condition.as_ref(), lp.block.as_ref(), &inner);
                self.fragment(id, FragmentKind::Loop, vec![section], &[], lp.span, frame)
            }
            Construct::Par(frag) => self.block_fragment(id, FragmentKind::Par, frag, frame),
            Construct::Opt(frag) => self.block_fragment(id, FragmentKind::Opt, frag, frame),
            Construct::Critical(frag) => {
                self.block_fragment(id, FragmentKind::Critical, frag, frame)
            }
            Construct::Section(frag) => {
                self.block_fragment(id, FragmentKind::Section, frag, frame)
            }
            Construct::Tcf(tcf) => {
                let inner = frame.inside(id);
                let mut sections = vec![self.section("try", None, tcf.try_block.as_ref(), &inner)];
                for branch in &tcf.catches {
                    sections.push(self.conditional("catch", branch, &inner));
                }
                if let Some(block) = &tcf.finally_block {
                    sections.push(self.section("finally", None, Some(block), &inner));
                }
                self.fragment(id, FragmentKind::Tcf, sections, &[], tcf.span, frame)
            }
            Construct::Ref(reference) => {
                let label = reference.names.first().map(|t| t.text.clone());
                let section = Section {
                    label: "ref".to_string(),
                    condition: label,
                    statements: Vec::new(),
                };
                let targets = reference.names.get(1..).unwrap_or(&[]);
                self.fragment(id, FragmentKind::Ref, vec![section], targets, reference.span, frame)
            }
        };
        Ok(statement)
    }

    fn sync_message(
        &mut self,
        id: NodeId,
        msg: &MessageSyntax,
        frame: &Frame,
    ) -> Result<MessageNode, TransformError> {
        let signature = message_signature(msg).ok_or(TransformError::MissingMethod)?;
        let to = text_of(msg.to.as_ref());
        let owner = to
            .clone()
            .or_else(|| frame.owner.clone())
            .ok_or_else(|| TransformError::MissingReceiver {
                signature: signature.clone(),
            })?;
        let explicit_from = text_of(msg.from.as_ref());
        let from = explicit_from.clone().unwrap_or_else(|| frame.origin.clone());

        self.nodes[id].activation = Some(owner.clone());
        let children = self.stats(
            Block::stats_of(msg.block.as_ref()),
            &Frame::activation(id, &from, &owner),
        );

        Ok(MessageNode {
            id,
            kind: MessageKind::Sync,
            from,
            explicit_from: explicit_from.is_some(),
            to,
            owner,
            origin: frame.origin.clone(),
            signature,
            assignment: assignment_of(msg.assignment.as_ref()),
            children,
            source: msg.span,
            editable: true,
        })
    }

    fn async_message(
        &mut self,
        id: NodeId,
        msg: &AsyncMessageSyntax,
        frame: &Frame,
    ) -> Result<MessageNode, TransformError> {
        let to = text_of(msg.to.as_ref()).ok_or(TransformError::MissingAsyncTarget)?;
        let explicit_from = text_of(msg.from.as_ref());
        Ok(MessageNode {
            id,
            kind: MessageKind::Async,
            from: explicit_from.clone().unwrap_or_else(|| frame.origin.clone()),
            explicit_from: explicit_from.is_some(),
            owner: to.clone(),
            to: Some(to),
            origin: frame.origin.clone(),
            signature: formatted(msg.content.as_ref()).unwrap_or_default(),
            assignment: None,
            children: Vec::new(),
            source: msg.span,
            editable: true,
        })
    }

    fn creation(
        &mut self,
        id: NodeId,
        creation: &CreationSyntax,
        frame: &Frame,
    ) -> Result<MessageNode, TransformError> {
        let constructor =
            text_of(creation.constructor.as_ref()).ok_or(TransformError::MissingConstructor)?;
        let owner = creation_name(creation.assignment.as_ref(), &constructor);
        let params = creation
            .args
            .as_ref()
            .map(|args| format_text(&args.text))
            .filter(|p| !p.is_empty());
        let editable = params.is_some();
        let signature = params
            .map(|p| format!("«{}»", p))
            .unwrap_or_else(|| CREATE_MARKER.to_string());

        let from = frame.origin.clone();
        self.nodes[id].activation = Some(owner.clone());
        let children = self.stats(
            Block::stats_of(creation.block.as_ref()),
            &Frame::activation(id, &from, &owner),
        );

        Ok(MessageNode {
            id,
            kind: MessageKind::Creation,
            from,
            explicit_from: false,
            to: Some(owner.clone()),
            owner,
            origin: frame.origin.clone(),
            signature,
            assignment: assignment_of(creation.assignment.as_ref()),
            children,
            source: creation.span,
            editable,
        })
    }

    fn ret(&mut self, id: NodeId, ret: &ReturnSyntax, frame: &Frame) -> MessageNode {
        let (explicit_from, to, signature) = match &ret.async_message {
            Some(msg) => (
                text_of(msg.from.as_ref()),
                text_of(msg.to.as_ref()),
                formatted(msg.content.as_ref()),
            ),
            None => (None, None, formatted(ret.expr.as_ref())),
        };
        // Outside any call the caller is the starter, which is also the top-level origin.
        let owner = to
            .clone()
            .or_else(|| frame.caller.clone())
            .unwrap_or_else(|| frame.origin.clone());

        MessageNode {
            id,
            kind: MessageKind::Return,
            from: explicit_from.clone().unwrap_or_else(|| frame.origin.clone()),
            explicit_from: explicit_from.is_some(),
            to,
            owner,
            origin: frame.origin.clone(),
            signature: signature.unwrap_or_default(),
            assignment: None,
            children: Vec::new(),
            source: ret.span,
            editable: true,
        }
    }

    fn block_fragment(
        &mut self,
        id: NodeId,
        kind: FragmentKind,
        frag: &BlockFragmentSyntax,
        frame: &Frame,
    ) -> Statement {
        let inner = frame.inside(id);
        let section = self.section(kind.as_str(), frag.label.as_ref(), frag.block.as_ref(), &inner);
        self.fragment(id, kind, vec![section], &[], frag.span, frame)
    }

    fn conditional(&mut self, label: &str, branch: &ConditionalBlock, frame: &Frame) -> Section {
        self.section(label, branch.condition.as_ref(), branch.block.as_ref(), frame)
    }

    fn section(
        &mut self,
        label: &str,
        condition: Option<&Condition>,
        block: Option<&Block>,
        frame: &Frame,
    ) -> Section {
        Section {
            label: label.to_string(),
            condition: condition
                .map(|c| format_text(unquote(&c.text.text)))
                .filter(|c| !c.is_empty()),
            statements: self.stats(Block::stats_of(block), frame),
        }
    }

    fn fragment(
        &mut self,
        id: NodeId,
        kind: FragmentKind,
        sections: Vec<Section>,
        targets: &[Token],
        source: Span,
        frame: &Frame,
    ) -> Statement {
        let mut participants = IndexSet::new();
        for section in &sections {
            touched(&section.statements, &mut participants);
        }
        for target in targets.iter().filter(|t| !t.text.is_empty()) {
            participants.insert(target.text.clone());
        }
        Statement::Fragment(FragmentNode {
            id,
            kind,
            origin: frame.origin.clone(),
            sections,
            participants: participants.into_iter().collect(),
            source,
        })
    }
}

/// Every `from`/`owner` inside, including nested fragments' participants.
fn touched(statements: &[Statement], out: &mut IndexSet<String>) {
    for statement in statements {
        match statement {
            Statement::Message(msg) => {
                out.insert(msg.from.clone());
                out.insert(msg.owner.clone());
                touched(&msg.children, out);
            }
            Statement::Fragment(fragment) => {
                out.extend(fragment.participants.iter().cloned());
            }
            Statement::Divider(_) | Statement::Error(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::parser::parse;

    fn run(src: &str) -> TransformResult {
        transform(&parse(src), None)
    }

    fn first_message(result: &TransformResult) -> &MessageNode {
        result.ast.statements[0]
            .as_message()
            .expect("Expected message node")
    }

    #[test]
    fn explicit_self_call_is_a_self_message() {
        let result = run("A->A.selfCall()");
        assert!(result.success);
        let msg = first_message(&result);
        assert!(msg.is_self_message());
        assert_eq!(msg.from, "A");
        assert_eq!(msg.to.as_deref(), Some("A"));
        assert_eq!(msg.signature, "selfCall()");
    }

    #[test]
    fn implicit_sender_defaults_to_the_starter() {
        let result = run("A.m(x ,y)");
        let msg = first_message(&result);
        assert_eq!(msg.from, STARTER);
        assert!(!msg.explicit_from);
        assert_eq!(msg.owner, "A");
        assert_eq!(msg.signature, "m(x, y)");
        assert!(!msg.is_self_message());
    }

    #[test]
    fn bare_call_resolves_owner_from_enclosing_call() {
        let result = run("A.m() { b() }");
        let outer = first_message(&result);
        let inner = outer.children[0].as_message().expect("Expected message node");
        assert_eq!(inner.owner, "A");
        assert_eq!(inner.from, "A");
        assert_eq!(inner.to, None);
        assert_eq!(inner.origin, "A");
        assert!(!inner.is_self_message());
    }

    #[test]
    fn unresolvable_receiver_becomes_error_node_and_siblings_survive() {
        let result = run("m()\nA.n");
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("1:0 "), "{}", result.errors[0]);
        if let Statement::Error(err) = &result.ast.statements[0] {
            assert_eq!(err.raw, "m()");
            assert_eq!(err.partial.signature.as_deref(), Some("m()"));
        } else {
            panic!("Expected error node");
        }
        assert_eq!(result.ast.statements[1].as_message().unwrap().owner, "A");
    }

    #[test]
    fn garbage_statement_is_unrecognized() {
        let result = run("A.m\n) ) junk");
        assert_eq!(result.errors, vec!["2:0 unrecognized statement".to_string()]);
    }

    #[test]
    fn stray_closing_braces_are_unrecognized() {
        let result = run("A.m\n}}}}");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["2:0 unrecognized statement".to_string()]);
        assert!(matches!(result.ast.statements[1], Statement::Error(_)));
    }

    #[test]
    fn creation_signature_and_editability() {
        let result = run("order = new Order()\nnew Audit(id, 2)");
        let bare = first_message(&result);
        assert_eq!(bare.kind, MessageKind::Creation);
        assert_eq!(bare.owner, "order:Order");
        assert_eq!(bare.signature, "«create»");
        assert!(!bare.editable);
        assert_eq!(bare.assignment.as_ref().unwrap().assignee, "order");

        let with_args = result.ast.statements[1].as_message().unwrap();
        assert_eq!(with_args.signature, "«id, 2»");
        assert!(with_args.editable);
    }

    #[test]
    fn async_message_needs_a_receiver() {
        let result = run("A->B: hello  world");
        let msg = first_message(&result);
        assert_eq!(msg.kind, MessageKind::Async);
        assert_eq!(msg.signature, "hello world");
        assert_eq!(msg.owner, "B");
    }

    #[test]
    fn return_targets_the_caller() {
        let result = run("A->B.m { return ok }\nreturn done");
        let call = first_message(&result);
        let ret = call.children[0].as_message().unwrap();
        assert_eq!(ret.kind, MessageKind::Return);
        assert_eq!(ret.from, "B");
        assert_eq!(ret.owner, "A");
        assert_eq!(ret.signature, "ok");

        let top = result.ast.statements[1].as_message().unwrap();
        assert_eq!(top.owner, STARTER);
    }

    #[test]
    fn at_return_keeps_explicit_endpoints() {
        let result = run("A.m { @return A->X: bye }");
        let ret = first_message(&result).children[0].as_message().unwrap();
        assert_eq!(ret.from, "A");
        assert!(ret.explicit_from);
        assert_eq!(ret.owner, "X");
    }

    #[test]
    fn fragments_collect_participants_transitively() {
        let src = "if (x) { A.m { B.n } } else { opt { C->D: hi } }\nref(r1, E, F)";
        let result = run(src);
        let alt = result.ast.statements[0].as_fragment().expect("Expected fragment");
        assert_eq!(alt.kind, FragmentKind::Alt);
        assert_eq!(alt.sections.len(), 2);
        assert_eq!(alt.sections[0].condition.as_deref(), Some("x"));
        assert_eq!(alt.participants, vec![STARTER, "A", "B", "C", "D"]);
        assert_eq!(alt.nested_fragments().len(), 1);
        assert_eq!(alt.nesting_levels(), 1);

        let reference = result.ast.statements[1].as_fragment().unwrap();
        assert_eq!(reference.participants, vec!["E", "F"]);
        assert_eq!(reference.sections[0].condition.as_deref(), Some("r1"));
    }

    #[test]
    fn fragment_children_keep_the_enclosing_origin() {
        let result = run("A.m { loop (more) { next() } }");
        let call = first_message(&result);
        let lp = call.children[0].as_fragment().unwrap();
        assert_eq!(lp.origin, "A");
        let inner = lp.sections[0].statements[0].as_message().unwrap();
        assert_eq!(inner.owner, "A");
        assert_eq!(result.ast.parent(inner.id), Some(lp.id));
        assert_eq!(result.ast.parent(lp.id), Some(call.id));
    }

    #[test]
    fn top_level_frame_falls_back_to_the_leftmost_lifeline() {
        let result = run("A B\nA->B.m\nopt { B->A: x }");
        assert_eq!(first_message(&result).origin, "A");
        assert_eq!(result.ast.statements[1].as_fragment().unwrap().origin, "A");
        assert_eq!(result.ast.starter, STARTER);

        let selfish = run("A->A.selfCall()");
        assert_eq!(first_message(&selfish).origin, "A");

        let implicit = run("A B\nA->B.m\nB.n");
        assert_eq!(first_message(&implicit).origin, STARTER);
    }

    #[test]
    fn declared_starter_and_override_become_the_default_sender() {
        let declared = run("@Starter(User)\nA.m");
        assert_eq!(first_message(&declared).from, "User");

        let overridden = transform(&parse("@Starter(User)\nA.m"), Some("Cron"));
        assert_eq!(first_message(&overridden).from, "Cron");
        assert_eq!(overridden.ast.starter, "Cron");
    }

    #[test]
    fn node_table_records_activations() {
        let result = run("A.m { B->C: x }");
        let call = first_message(&result);
        assert_eq!(result.ast.activation(call.id), Some("A"));
        let async_msg = call.children[0].as_message().unwrap();
        assert_eq!(result.ast.activation(async_msg.id), None);
        assert_eq!(result.ast.ancestors(async_msg.id).collect::<Vec<_>>(), vec![call.id]);
    }
}
