/// Replacement of the character range `[start, end)` of the original text.
/// An empty range is an insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Edit {
    #[must_use]
    pub fn replace(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    #[must_use]
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }
}

/// Edits collected against immutable offsets of one source text and applied
/// in a single right-to-left pass, so no edit shifts another's offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditList {
    edits: Vec<Edit>,
}

impl EditList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Applies every edit to a copy of `source`. Ranges are clamped to the
    /// text; overlapping edits are a caller bug and resolve in favour of the
    /// later-starting one.
    #[must_use]
    pub fn apply(mut self, source: &str) -> String {
        let mut chars: Vec<char> = source.chars().collect();
        self.edits
            .sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
        let mut floor = chars.len();
        for edit in self.edits {
            let end = edit.end.min(floor);
            let start = edit.start.min(end);
            chars.splice(start..end, edit.replacement.chars());
            floor = start;
        }
        chars.into_iter().collect()
    }
}

impl FromIterator<Edit> for EditList {
    fn from_iter<I: IntoIterator<Item = Edit>>(iter: I) -> Self {
        Self {
            edits: iter.into_iter().collect(),
        }
    }
}
