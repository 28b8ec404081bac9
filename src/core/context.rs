use serde::{Deserialize, Serialize};

/// Reference bases covering (part of) a read's span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceWindow {
    /// 1-based position of `bases[0]`
    pub start: u64,
    pub bases: Vec<u8>,
}

/// Side data joined onto a record before model estimation.
///
/// Lives only between the enrichment and estimation stages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceWindow>,

    /// 1-based positions of known variant sites within the span, ascending
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_sites: Vec<u64>,
}

impl Context {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reference.as_ref().map_or(true, |r| r.bases.is_empty()) && self.known_sites.is_empty()
    }

    /// Reference base at a 1-based position, if covered
    #[must_use]
    pub fn reference_base_at(&self, position: u64) -> Option<u8> {
        let window = self.reference.as_ref()?;
        let offset = position.checked_sub(window.start)?;
        window.bases.get(usize::try_from(offset).ok()?).copied()
    }

    #[must_use]
    pub fn is_known_site(&self, position: u64) -> bool {
        self.known_sites.binary_search(&position).is_ok()
    }
}
