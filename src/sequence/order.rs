use std::collections::HashSet;

use serde::Serialize;

use super::participants::{ParticipantContext, STARTER};

/// One entry of the canonical left-to-right participant sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedParticipant {
    pub name: String,
    /// Name of the participant immediately to the left; empty at position 0.
    pub left: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Canonical participant order.
///
/// 1. no declared starter but an implicit sender: the `_STARTER_` sentinel goes first;
/// 2. a declared starter that is also explicitly declared keeps its declared slot;
/// 3. a declared starter that is not explicit goes first;
/// 4. explicit participants in declaration order;
/// 5. implicit participants in order of first appearance.
pub fn order_participants(context: &ParticipantContext) -> Vec<OrderedParticipant> {
    let ledger = &context.participants;
    let mut names: Vec<&str> = Vec::with_capacity(ledger.len() + 1);
    let mut seen: HashSet<&str> = HashSet::new();

    match context.starter.as_deref() {
        None if context.implicit_sender => {
            names.push(STARTER);
            seen.insert(STARTER);
        }
        Some(starter) if !ledger.get(starter).is_some_and(|p| p.explicit) => {
            names.push(starter);
            seen.insert(starter);
        }
        _ => {}
    }

    let explicit = ledger.iter().filter(|p| p.explicit);
    let implicit = ledger.iter().filter(|p| !p.explicit);
    for participant in explicit.chain(implicit) {
        if seen.insert(participant.name.as_str()) {
            names.push(participant.name.as_str());
        }
    }

    let mut ordered = Vec::with_capacity(names.len());
    let mut left = String::new();
    for name in names {
        let label = ledger.get(name).and_then(|p| p.label.clone());
        ordered.push(OrderedParticipant {
            name: name.to_string(),
            left: std::mem::replace(&mut left, name.to_string()),
            label,
        });
    }
    ordered
}

/// Position of `name` in the canonical order.
pub fn index_of(order: &[OrderedParticipant], name: &str) -> Option<usize> {
    order.iter().position(|p| p.name == name)
}
