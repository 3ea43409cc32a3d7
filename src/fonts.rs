use std::num::NonZeroUsize;

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, Style, Weight};
use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Style class a piece of text is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextStyle {
    Participant,
    MessageContent,
    FragmentCondition,
}

impl TextStyle {
    fn font_size(self) -> f32 {
        match self {
            TextStyle::Participant => 14.0,
            TextStyle::MessageContent => 13.0,
            TextStyle::FragmentCondition => 12.0,
        }
    }

    fn is_bold(self) -> bool {
        matches!(self, TextStyle::Participant)
    }

    fn is_italic(self) -> bool {
        matches!(self, TextStyle::FragmentCondition)
    }
}

/// Injected text measurement.
///
/// Implementations may memoize; callers must not assume a repeat call re-measures.
pub trait TextMeasure {
    fn measure_text_width(&mut self, text: &str, style: TextStyle) -> f32;
}

impl<T: TextMeasure + ?Sized> TextMeasure for &mut T {
    fn measure_text_width(&mut self, text: &str, style: TextStyle) -> f32 {
        (**self).measure_text_width(text, style)
    }
}

pub struct CosmicTextMeasure {
    font_system: FontSystem,
}

impl CosmicTextMeasure {
    pub fn new() -> Result<Self, String> {
        Ok(Self {
            font_system: FontSystem::new(),
        })
    }
}

impl TextMeasure for CosmicTextMeasure {
    fn measure_text_width(&mut self, text: &str, style: TextStyle) -> f32 {
        let font_size = style.font_size();
        let mut buffer = Buffer::new(
            &mut self.font_system,
            Metrics {
                font_size,
                line_height: font_size * 1.2,
            },
        );
        buffer.set_size(&mut self.font_system, None, None);

        let attrs = Attrs::new()
            .family(Family::SansSerif)
            .weight(if style.is_bold() {
                Weight::BOLD
            } else {
                Weight::NORMAL
            })
            .style(if style.is_italic() {
                Style::Italic
            } else {
                Style::Normal
            });

        buffer.set_text(&mut self.font_system, text, &attrs, Shaping::Advanced, None);

        buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0, f32::max)
    }
}

/// Font-independent metrics: every character counts as a fixed fraction of the font size.
///
/// Deterministic across machines, which makes it the measurement used by tests.
#[derive(Debug, Clone, Copy)]
pub struct ApproximateMeasure {
    pub char_width_ratio: f32,
}

impl Default for ApproximateMeasure {
    fn default() -> Self {
        Self {
            char_width_ratio: 0.6,
        }
    }
}

impl TextMeasure for ApproximateMeasure {
    fn measure_text_width(&mut self, text: &str, style: TextStyle) -> f32 {
        let chars = crate::text::sanitized_char_count(text) as f32;
        let bold = if style.is_bold() { 1.05 } else { 1.0 };
        chars * style.font_size() * self.char_width_ratio * bold
    }
}

/// Bounded LRU memoization keyed by `(text, style)`.
pub struct CachedMeasure<M> {
    inner: M,
    cache: LruCache<(String, TextStyle), f32>,
    misses: u64,
}

impl<M: TextMeasure> CachedMeasure<M> {
    pub fn new(inner: M, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: LruCache::new(capacity),
            misses: 0,
        }
    }

    /// Number of measurements that reached the wrapped implementation.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: TextMeasure> TextMeasure for CachedMeasure<M> {
    fn measure_text_width(&mut self, text: &str, style: TextStyle) -> f32 {
        let key = (text.to_string(), style);
        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }

        let measured = self.inner.measure_text_width(text, style);
        self.misses += 1;
        self.cache.put(key, measured);
        measured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        calls: usize,
    }

    impl TextMeasure for Counting {
        fn measure_text_width(&mut self, text: &str, _style: TextStyle) -> f32 {
            self.calls += 1;
            text.len() as f32
        }
    }

    #[test]
    fn cache_hits_skip_the_inner_measure() {
        let mut measure = CachedMeasure::new(Counting { calls: 0 }, 8);
        assert_eq!(measure.measure_text_width("abc", TextStyle::Participant), 3.0);
        assert_eq!(measure.measure_text_width("abc", TextStyle::Participant), 3.0);
        assert_eq!(measure.inner().calls, 1);

        // Same text in another style class is a different key.
        measure.measure_text_width("abc", TextStyle::MessageContent);
        assert_eq!(measure.inner().calls, 2);
        assert_eq!(measure.misses(), 2);
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let mut measure = CachedMeasure::new(Counting { calls: 0 }, 2);
        measure.measure_text_width("a", TextStyle::Participant);
        measure.measure_text_width("b", TextStyle::Participant);
        measure.measure_text_width("a", TextStyle::Participant);
        measure.measure_text_width("c", TextStyle::Participant);
        assert_eq!(measure.len(), 2);

        // "b" was evicted, "a" survived.
        measure.measure_text_width("a", TextStyle::Participant);
        assert_eq!(measure.inner().calls, 3);
        measure.measure_text_width("b", TextStyle::Participant);
        assert_eq!(measure.inner().calls, 4);
    }

    #[test]
    fn approximate_measure_is_proportional_to_length() {
        let mut measure = ApproximateMeasure::default();
        let short = measure.measure_text_width("ab", TextStyle::MessageContent);
        let long = measure.measure_text_width("abcd", TextStyle::MessageContent);
        assert!((long - short * 2.0).abs() < f32::EPSILON);
        assert_eq!(measure.measure_text_width("", TextStyle::Participant), 0.0);
    }
}
