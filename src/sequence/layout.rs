use indexmap::IndexMap;
use serde::Serialize;

use super::depth::DepthCalculator;
use super::order::OrderedParticipant;
use super::participants::{Participants, STARTER};
use super::types::{DocumentNode, MessageNode};
use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::fonts::{TextMeasure, TextStyle};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParticipantCoordinate {
    pub center: f32,
    pub width: f32,
    pub label_width: f32,
    /// Outward extent of the deepest activation stack on this lifeline.
    pub activation_reserve: f32,
    /// Room right of the lifeline taken by its widest self call.
    pub self_call_reach: f32,
}

impl ParticipantCoordinate {
    fn half_extent(&self) -> f32 {
        (self.width / 2.0).max(self.activation_reserve)
    }
}

/// Horizontal coordinates in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CoordinateTable {
    entries: IndexMap<String, ParticipantCoordinate>,
}

impl CoordinateTable {
    pub fn get(&self, name: &str) -> Option<&ParticipantCoordinate> {
        self.entries.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&ParticipantCoordinate, LayoutError> {
        self.entries
            .get(name)
            .ok_or_else(|| LayoutError::UnknownParticipant(name.to_string()))
    }

    pub fn center(&self, name: &str) -> Result<f32, LayoutError> {
        self.require(name).map(|c| c.center)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &ParticipantCoordinate)> {
        self.entries.get_index(index).map(|(k, v)| (k.as_str(), v))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParticipantCoordinate)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rightmost extent of any participant box or self call label.
    pub fn total_width(&self) -> f32 {
        self.entries
            .values()
            .map(|c| c.center + c.half_extent().max(c.self_call_reach))
            .fold(0.0, f32::max)
    }
}

/// Outward extent of a stack of `layers` occurrence bars.
pub fn activation_reserve(layers: usize, config: &LayoutConfig) -> f32 {
    if layers == 0 {
        0.0
    } else {
        config.occurrence_width / 2.0 + (layers - 1) as f32 * config.layer_offset
    }
}

pub struct CoordinateEngine<'a, T: TextMeasure> {
    measure: &'a mut T,
    config: &'a LayoutConfig,
}

impl<'a, T: TextMeasure> CoordinateEngine<'a, T> {
    pub fn new(measure: &'a mut T, config: &'a LayoutConfig) -> Self {
        Self { measure, config }
    }

    /// Places every participant on the horizontal axis.
    ///
    /// Centers are the longest-path solution of a set of minimum distances: every pair of
    /// neighbours keeps its boxes `margin` apart, and every message needs room for its label
    /// between its endpoints (or to the right of the lifeline for a self call).
    pub fn layout(
        &mut self,
        order: &[OrderedParticipant],
        ledger: &Participants,
        document: &DocumentNode,
        depths: &mut DepthCalculator,
    ) -> CoordinateTable {
        if order.is_empty() {
            return CoordinateTable::default();
        }

        let layers = depths.max_layers_by_participant(document);
        let mut coordinates: Vec<ParticipantCoordinate> = Vec::with_capacity(order.len());
        for participant in order {
            let record = ledger.get(&participant.name);
            let label = match record {
                Some(p) => p.display_name(),
                None if participant.name == STARTER => "",
                None => participant.name.as_str(),
            };
            let label_width = if label.is_empty() {
                0.0
            } else {
                self.measure.measure_text_width(label, TextStyle::Participant)
            };
            let override_width = record.and_then(|p| p.width).unwrap_or(0.0);
            let width = (label_width + self.config.participant_padding)
                .max(override_width)
                .max(self.config.min_participant_width);
            let reserve =
                activation_reserve(layers.get(&participant.name).copied().unwrap_or(0), self.config);
            coordinates.push(ParticipantCoordinate {
                center: 0.0,
                width,
                label_width,
                activation_reserve: reserve,
                self_call_reach: 0.0,
            });
        }

        let index_by_name: IndexMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), i))
            .collect();

        // incoming[b] holds (a, distance) with a < b.
        let mut incoming: Vec<Vec<(usize, f32)>> = vec![Vec::new(); order.len()];
        for b in 1..order.len() {
            let a = b - 1;
            let distance =
                coordinates[a].half_extent() + coordinates[b].half_extent() + self.config.margin;
            incoming[b].push((a, distance));
        }
        for msg in document.messages() {
            self.message_requirement(msg, &index_by_name, &mut incoming, &mut coordinates);
        }

        coordinates[0].center = coordinates[0].half_extent();
        for b in 1..coordinates.len() {
            let center = incoming[b]
                .iter()
                .map(|&(a, distance)| coordinates[a].center + distance)
                .fold(f32::MIN, f32::max);
            coordinates[b].center = center;
        }

        tracing::debug!(
            participants = coordinates.len(),
            constraints = incoming.iter().map(Vec::len).sum::<usize>(),
            "placed lifelines"
        );

        CoordinateTable {
            entries: order
                .iter()
                .map(|p| p.name.clone())
                .zip(coordinates)
                .collect(),
        }
    }

    fn message_requirement(
        &mut self,
        msg: &MessageNode,
        index_by_name: &IndexMap<&str, usize>,
        incoming: &mut [Vec<(usize, f32)>],
        coordinates: &mut [ParticipantCoordinate],
    ) {
        let (Some(&from), Some(&to)) = (
            index_by_name.get(msg.from.as_str()),
            index_by_name.get(msg.owner.as_str()),
        ) else {
            tracing::debug!(from = %msg.from, to = %msg.owner, "message endpoint not placed");
            return;
        };
        let label_width = if msg.signature.is_empty() {
            0.0
        } else {
            self.measure
                .measure_text_width(&msg.signature, TextStyle::MessageContent)
        };

        if from == to {
            let reach = label_width + self.config.self_call_width;
            let coordinate = &mut coordinates[from];
            coordinate.self_call_reach = coordinate.self_call_reach.max(reach);
            let right = from + 1;
            if right < incoming.len() {
                incoming[right].push((from, reach));
            }
            return;
        }

        let a = from.min(to);
        let b = from.max(to);
        let required = label_width + self.config.arrow_head_width + self.config.occurrence_width;
        incoming[b].push((a, required));
    }
}
