use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use super::syntax::*;
use crate::text::format_text;

/// Name of the synthetic starter that sends messages with no explicit sender.
pub const STARTER: &str = "_STARTER_";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub name: String,
    pub explicit: bool,
    pub is_starter: bool,
    pub label: Option<String>,
    pub stereotype: Option<String>,
    pub participant_type: Option<String>,
    pub color: Option<String>,
    pub width: Option<f32>,
    pub group_id: Option<String>,
    /// Every place the name occurs in the source, for in-place rename.
    pub positions: BTreeSet<Span>,
}

impl Participant {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            explicit: false,
            is_starter: false,
            label: None,
            stereotype: None,
            participant_type: None,
            color: None,
            width: None,
            group_id: None,
            positions: BTreeSet::new(),
        }
    }

    /// Label shown in the participant box.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParticipantOptions {
    /// `None` leaves the flag untouched, so usage sites never demote a declaration.
    pub explicit: Option<bool>,
    pub is_starter: Option<bool>,
    pub label: Option<String>,
    pub stereotype: Option<String>,
    pub participant_type: Option<String>,
    pub color: Option<String>,
    pub width: Option<f32>,
    pub group_id: Option<String>,
    pub position: Option<Span>,
}

impl ParticipantOptions {
    pub fn at(position: Span) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }
}

fn truthy(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Insertion-ordered participant records, deduplicated by name.
#[derive(Debug, Clone, Default)]
pub struct Participants {
    entries: IndexMap<String, Participant>,
}

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, options: ParticipantOptions) {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| Participant::new(name));

        entry.explicit |= options.explicit.unwrap_or(false);
        entry.is_starter |= options.is_starter.unwrap_or(false);
        entry.label = truthy(options.label).or(entry.label.take());
        entry.stereotype = truthy(options.stereotype).or(entry.stereotype.take());
        entry.participant_type = truthy(options.participant_type).or(entry.participant_type.take());
        entry.color = truthy(options.color).or(entry.color.take());
        entry.group_id = truthy(options.group_id).or(entry.group_id.take());
        entry.width = options.width.filter(|w| *w > 0.0).or(entry.width);
        if let Some(position) = options.position {
            entry.positions.insert(position);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Participant> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.entries.values()
    }

    pub fn positions(&self, name: &str) -> Option<&BTreeSet<Span>> {
        self.entries.get(name).map(|p| &p.positions)
    }

    pub fn starter(&self) -> Option<&Participant> {
        self.entries.values().find(|p| p.is_starter)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the orderer needs, collected in one pass over a syntax tree.
#[derive(Debug, Clone, Default)]
pub struct ParticipantContext {
    pub participants: Participants,
    /// Declared (or overridden) starter name.
    pub starter: Option<String>,
    /// At least one message sends from the starter without naming a sender.
    pub implicit_sender: bool,
}

impl ParticipantContext {
    /// Starter messages default to: the declared one, else the synthetic sentinel.
    pub fn starter_name(&self) -> &str {
        self.starter.as_deref().unwrap_or(STARTER)
    }
}

/// Collects participants from a program. `starter_override` replaces any `@Starter`.
pub fn collect_participants(program: &Program, starter_override: Option<&str>) -> ParticipantContext {
    let starter_override = starter_override.filter(|s| !s.is_empty());
    let mut collector = Collector::default();
    if let Some(head) = &program.head {
        collector.head(head, starter_override.is_none());
    }

    if let Some(name) = starter_override {
        collector.participants.add(
            name,
            ParticipantOptions {
                is_starter: Some(true),
                ..ParticipantOptions::default()
            },
        );
        collector.starter = Some(name.to_string());
    }

    collector.stats(program.stats());

    tracing::debug!(
        participants = collector.participants.len(),
        implicit_sender = collector.implicit_sender,
        "collected participants"
    );

    ParticipantContext {
        participants: collector.participants,
        starter: collector.starter,
        implicit_sender: collector.implicit_sender,
    }
}

fn named(token: Option<&Token>) -> bool {
    token.is_some_and(|t| !t.text.is_empty())
}

#[derive(Default)]
struct Collector {
    participants: Participants,
    starter: Option<String>,
    implicit_sender: bool,
    /// Non-zero inside argument lists and conditions.
    blind: usize,
    /// Number of enclosing sync messages and creations.
    calls: usize,
}

impl Collector {
    fn head(&mut self, head: &Head, use_declared_starter: bool) {
        for item in &head.items {
            match item {
                HeadItem::Participant(decl) => self.declaration(decl, None),
                HeadItem::Group(group) => {
                    let group_id = group.name.as_ref().map(|n| n.text.clone());
                    for decl in &group.participants {
                        self.declaration(decl, group_id.clone());
                    }
                }
            }
        }

        let declared = head.starter.as_ref().and_then(|s| s.name.as_ref());
        if let Some(name) = declared.filter(|_| use_declared_starter) {
            self.participants.add(
                &name.text,
                ParticipantOptions {
                    is_starter: Some(true),
                    position: Some(name.span),
                    ..ParticipantOptions::default()
                },
            );
            self.starter = Some(name.text.clone());
        }
    }

    fn declaration(&mut self, decl: &ParticipantDecl, group_id: Option<String>) {
        let Some(name) = &decl.name else {
            return;
        };
        let text = |t: &Option<Token>| t.as_ref().map(|t| format_text(&t.text));
        self.participants.add(
            &name.text,
            ParticipantOptions {
                explicit: Some(true),
                is_starter: None,
                label: text(&decl.label),
                stereotype: text(&decl.stereotype),
                participant_type: text(&decl.participant_type),
                color: text(&decl.color),
                width: decl.width.as_ref().and_then(|w| w.text.parse::<f32>().ok()),
                group_id,
                position: Some(name.span),
            },
        );
    }

    fn usage(&mut self, token: Option<&Token>) {
        if self.blind > 0 {
            return;
        }
        if let Some(token) = token.filter(|t| !t.text.is_empty()) {
            self.participants.add(&token.text, ParticipantOptions::at(token.span));
        }
    }

    fn implicit_from(&mut self, from: Option<&Token>) {
        if from.is_none() && self.calls == 0 {
            self.implicit_sender = true;
        }
    }

    fn stats(&mut self, stats: &[Stat]) {
        for stat in stats {
            self.stat(stat);
        }
    }

    fn block(&mut self, block: Option<&Block>) {
        self.stats(Block::stats_of(block));
    }

    fn stat(&mut self, stat: &Stat) {
        let Some(construct) = stat.construct() else {
            return;
        };
        match construct {
            Construct::Message(msg) => {
                // A top-level call without receiver or method is rejected by the transformer.
                if named(msg.to.as_ref()) && named(msg.method.as_ref()) {
                    self.implicit_from(msg.from.as_ref());
                }
                self.usage(msg.from.as_ref());
                self.usage(msg.to.as_ref());
                if let Some(args) = &msg.args {
                    self.arguments(args);
                }
                self.calls += 1;
                self.block(msg.block.as_ref());
                self.calls -= 1;
            }
            Construct::AsyncMessage(msg) => self.async_message(msg),
            Construct::Creation(creation) => {
                if named(creation.constructor.as_ref()) {
                    self.implicit_from(None);
                }
                if let Some(ctor) = &creation.constructor {
                    let name = creation_name(creation.assignment.as_ref(), &ctor.text);
                    if self.blind == 0 {
                        self.participants.add(&name, ParticipantOptions::at(ctor.span));
                    }
                }
                if let Some(args) = &creation.args {
                    self.arguments(args);
                }
                self.calls += 1;
                self.block(creation.block.as_ref());
                self.calls -= 1;
            }
            Construct::Return(ret) => {
                if let Some(msg) = &ret.async_message {
                    self.async_message(msg);
                } else {
                    self.implicit_from(None);
                }
            }
            Construct::Ref(reference) => {
                for name in reference.names.iter().skip(1) {
                    self.usage(Some(name));
                }
            }
            Construct::Alt(alt) => {
                if let Some(branch) = &alt.if_block {
                    self.conditional(branch);
                }
                for branch in &alt.else_ifs {
                    self.conditional(branch);
                }
                self.block(alt.else_block.as_ref());
            }
            Construct::Loop(lp) => {
                if let Some(condition) = &lp.condition {
                    self.condition(condition);
                }
                self.block(lp.block.as_ref());
            }
            Construct::Par(frag)
            | Construct::Opt(frag)
            | Construct::Critical(frag)
            | Construct::Section(frag) => {
                if let Some(label) = &frag.label {
                    self.condition(label);
                }
                self.block(frag.block.as_ref());
            }
            Construct::Tcf(tcf) => {
                self.block(tcf.try_block.as_ref());
                for branch in &tcf.catches {
                    self.conditional(branch);
                }
                self.block(tcf.finally_block.as_ref());
            }
            Construct::Divider(_) => {}
        }
    }

    fn async_message(&mut self, msg: &AsyncMessageSyntax) {
        if named(msg.to.as_ref()) {
            self.implicit_from(msg.from.as_ref());
        }
        self.usage(msg.from.as_ref());
        self.usage(msg.to.as_ref());
    }

    fn conditional(&mut self, branch: &ConditionalBlock) {
        if let Some(condition) = &branch.condition {
            self.condition(condition);
        }
        self.block(branch.block.as_ref());
    }

    fn condition(&mut self, condition: &Condition) {
        self.blind += 1;
        if let Some(expr) = &condition.expr {
            self.expr(expr);
        }
        self.blind -= 1;
    }

    fn arguments(&mut self, args: &Arguments) {
        self.blind += 1;
        for expr in &args.exprs {
            self.expr(expr);
        }
        self.blind -= 1;
    }

    fn expr(&mut self, expr: &Expr) {
        if let Expr::Invocation { target, args, .. } = expr {
            self.usage(target.as_ref());
            for arg in args {
                self.expr(arg);
            }
        }
    }
}

/// `"<assignee>:<Constructor>"` when assigned, else the constructor name.
pub fn creation_name(assignment: Option<&AssignmentSyntax>, constructor: &str) -> String {
    match assignment
        .and_then(|a| a.assignee.as_ref())
        .filter(|a| !a.text.is_empty())
    {
        Some(assignee) => format!("{}:{}", assignee.text, constructor),
        None => constructor.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::parser::parse;

    fn names(ctx: &ParticipantContext) -> Vec<&str> {
        ctx.participants.names().collect()
    }

    #[test]
    fn declarations_are_explicit_and_usages_are_not() {
        let ctx = collect_participants(&parse("A\nB.m"), None);
        assert!(ctx.participants.get("A").unwrap().explicit);
        assert!(!ctx.participants.get("B").unwrap().explicit);
        assert!(ctx.implicit_sender);
    }

    #[test]
    fn later_declaration_fields_win_but_never_erase() {
        let mut ledger = Participants::new();
        ledger.add(
            "A",
            ParticipantOptions {
                explicit: Some(true),
                label: Some("Alice".into()),
                color: Some("#fff".into()),
                ..ParticipantOptions::default()
            },
        );
        ledger.add(
            "A",
            ParticipantOptions {
                explicit: Some(false),
                label: Some("Alicia".into()),
                color: Some(String::new()),
                ..ParticipantOptions::default()
            },
        );
        let a = ledger.get("A").unwrap();
        assert!(a.explicit);
        assert_eq!(a.label.as_deref(), Some("Alicia"));
        assert_eq!(a.color.as_deref(), Some("#fff"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn positions_accumulate_across_usages() {
        let src = "A\nA.m\nB->A: hi";
        let ctx = collect_participants(&parse(src), None);
        let positions: Vec<&str> = ctx
            .participants
            .positions("A")
            .unwrap()
            .iter()
            .map(|span| &src[span.start..span.stop])
            .collect();
        assert_eq!(positions, vec!["A", "A", "A"]);
        assert_eq!(ctx.participants.positions("A").unwrap().len(), 3);
    }

    #[test]
    fn arguments_and_conditions_are_blind() {
        let ctx = collect_participants(&parse("if (X.ready()) { A.m(B.get(), c) }"), None);
        assert_eq!(names(&ctx), vec!["A"]);
    }

    #[test]
    fn ref_adds_participants_but_not_its_id() {
        let ctx = collect_participants(&parse("ref(checkout, A, B)"), None);
        assert_eq!(names(&ctx), vec!["A", "B"]);
    }

    #[test]
    fn creation_synthesizes_assignee_name_at_constructor_position() {
        let src = "order = new Order()\nnew Audit";
        let ctx = collect_participants(&parse(src), None);
        assert_eq!(names(&ctx), vec!["order:Order", "Audit"]);
        let span = *ctx.participants.positions("order:Order").unwrap().iter().next().unwrap();
        assert_eq!(&src[span.start..span.stop], "Order");
    }

    #[test]
    fn starter_annotation_marks_the_participant() {
        let ctx = collect_participants(&parse("@Starter(User)\nA.m"), None);
        let user = ctx.participants.get("User").unwrap();
        assert!(user.is_starter);
        assert!(!user.explicit);
        assert_eq!(ctx.starter.as_deref(), Some("User"));
        assert_eq!(ctx.starter_name(), "User");
    }

    #[test]
    fn nested_calls_without_sender_are_not_implicit_starter_sends() {
        let ctx = collect_participants(&parse("A->B.m { C.n }"), None);
        assert!(!ctx.implicit_sender);
    }

    #[test]
    fn rejected_statements_do_not_need_the_sentinel() {
        assert!(!collect_participants(&parse("m()"), None).implicit_sender);
        assert!(collect_participants(&parse("m()\nB.n"), None).implicit_sender);
    }

    #[test]
    fn starter_override_replaces_the_declared_starter() {
        let ctx = collect_participants(&parse("@Starter(User)\nA.m"), Some("Cron"));
        assert_eq!(ctx.starter_name(), "Cron");
        assert!(ctx.participants.get("User").is_none());
        assert_eq!(ctx.participants.starter().unwrap().name, "Cron");
    }

    #[test]
    fn groups_tag_their_members() {
        let ctx = collect_participants(&parse("group Store { Db Cache }\nApi"), None);
        assert_eq!(ctx.participants.get("Db").unwrap().group_id.as_deref(), Some("Store"));
        assert_eq!(ctx.participants.get("Api").unwrap().group_id, None);
    }
}
