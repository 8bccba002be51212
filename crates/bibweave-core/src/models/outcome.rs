use serde::{Deserialize, Serialize};

use crate::error::{BibweaveError, Result};
use crate::models::mention::MentionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Doi,
    Isbn,
    Arxiv,
    Pubmed,
    Url,
    Fuzzy,
    Unresolved,
}

impl MatchStrategy {
    /// Identifier strategies in lookup order.
    pub const IDENTIFIER_ORDER: [MatchStrategy; 5] = [
        MatchStrategy::Doi,
        MatchStrategy::Isbn,
        MatchStrategy::Arxiv,
        MatchStrategy::Pubmed,
        MatchStrategy::Url,
    ];

    pub fn confidence(self) -> Confidence {
        match self {
            Self::Doi | Self::Isbn | Self::Arxiv | Self::Pubmed => Confidence::High,
            Self::Url => Confidence::Medium,
            Self::Fuzzy => Confidence::Low,
            Self::Unresolved => Confidence::None,
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Doi => "doi",
            Self::Isbn => "isbn",
            Self::Arxiv => "arxiv",
            Self::Pubmed => "pubmed",
            Self::Url => "url",
            Self::Fuzzy => "fuzzy",
            Self::Unresolved => "unresolved",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Why a citation mention ended with a placeholder key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No DOI, arXiv ID, ISBN or PubMed ID in the URL, and no URL hit.
    NoIdentifier,
    /// Identifiers were found but nothing in the corpus carries them.
    NoCorpusHit,
    /// The enrichment result failed the quality gate.
    SynthesisRejected(String),
    /// The enrichment lookup errored, timed out or found nothing.
    SynthesisFailed(String),
    /// The global synthesis deadline passed before this mention was started.
    DeadlineExceeded,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoIdentifier => write!(f, "no identifier found"),
            Self::NoCorpusHit => write!(f, "no corpus hit"),
            Self::SynthesisRejected(why) => write!(f, "synthesis rejected: {why}"),
            Self::SynthesisFailed(why) => write!(f, "synthesis failed: {why}"),
            Self::DeadlineExceeded => write!(f, "synthesis deadline exceeded"),
        }
    }
}

/// Lifecycle of a single mention through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionState {
    Extracted,
    Matched,
    SynthesisAttempted,
    Synthesized,
    PlaceholderAssigned,
    PassedThrough,
}

impl MentionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Matched | Self::Synthesized | Self::PlaceholderAssigned | Self::PassedThrough
        )
    }

    pub fn can_transition_to(self, next: MentionState) -> bool {
        use MentionState::*;
        matches!(
            (self, next),
            (Extracted, Matched)
                | (Extracted, SynthesisAttempted)
                | (Extracted, PlaceholderAssigned)
                | (Extracted, PassedThrough)
                | (SynthesisAttempted, Synthesized)
                | (SynthesisAttempted, PlaceholderAssigned)
        )
    }

    pub fn transition(self, next: MentionState) -> Result<MentionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BibweaveError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for MentionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Extracted => "extracted",
            Self::Matched => "matched",
            Self::SynthesisAttempted => "synthesis_attempted",
            Self::Synthesized => "synthesized",
            Self::PlaceholderAssigned => "placeholder_assigned",
            Self::PassedThrough => "passed_through",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Resolved {
        key: String,
        strategy: MatchStrategy,
        confidence: Confidence,
    },
    Synthesized {
        key: String,
        source: String,
    },
    Placeholder {
        key: String,
        reason: UnresolvedReason,
    },
    PassedThrough,
}

/// Exactly one terminal outcome for one mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub mention: MentionRecord,
    pub outcome: MatchOutcome,
    /// Every state the mention went through, first to last.
    pub trail: Vec<MentionState>,
}

impl MatchResult {
    pub fn resolved(mention: MentionRecord, key: String, strategy: MatchStrategy) -> Self {
        Self {
            mention,
            outcome: MatchOutcome::Resolved {
                key,
                confidence: strategy.confidence(),
                strategy,
            },
            trail: vec![MentionState::Extracted, MentionState::Matched],
        }
    }

    pub fn unresolved(mention: MentionRecord, key: String, reason: UnresolvedReason) -> Self {
        Self {
            mention,
            outcome: MatchOutcome::Placeholder { key, reason },
            trail: vec![MentionState::Extracted],
        }
    }

    pub fn passed_through(mention: MentionRecord) -> Self {
        Self {
            mention,
            outcome: MatchOutcome::PassedThrough,
            trail: vec![MentionState::Extracted, MentionState::PassedThrough],
        }
    }

    pub fn state(&self) -> MentionState {
        self.trail.last().copied().unwrap_or(MentionState::Extracted)
    }

    /// Records a state change, refusing transitions the lifecycle forbids.
    pub fn advance(&mut self, next: MentionState) -> Result<()> {
        let next = self.state().transition(next)?;
        self.trail.push(next);
        Ok(())
    }

    pub fn key(&self) -> Option<&str> {
        match &self.outcome {
            MatchOutcome::Resolved { key, .. }
            | MatchOutcome::Synthesized { key, .. }
            | MatchOutcome::Placeholder { key, .. } => Some(key),
            MatchOutcome::PassedThrough => None,
        }
    }

    /// `None` for plain links, which never enter matching.
    pub fn strategy(&self) -> Option<MatchStrategy> {
        match &self.outcome {
            MatchOutcome::Resolved { strategy, .. } => Some(*strategy),
            MatchOutcome::Synthesized { .. } | MatchOutcome::Placeholder { .. } => {
                Some(MatchStrategy::Unresolved)
            }
            MatchOutcome::PassedThrough => None,
        }
    }

    pub fn confidence(&self) -> Confidence {
        match &self.outcome {
            MatchOutcome::Resolved { confidence, .. } => *confidence,
            MatchOutcome::Synthesized { .. } => Confidence::Medium,
            MatchOutcome::Placeholder { .. } | MatchOutcome::PassedThrough => Confidence::None,
        }
    }

    pub fn reason(&self) -> Option<&UnresolvedReason> {
        match &self.outcome {
            MatchOutcome::Placeholder { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Placeholder { .. })
    }

    /// Whether the rewritten document should point at this result's key.
    pub fn has_bibliography_key(&self) -> bool {
        matches!(
            self.outcome,
            MatchOutcome::Resolved { .. } | MatchOutcome::Synthesized { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mention::{CitationForm, DocumentPosition, MentionKind};
    use crate::models::AuthorYearHint;

    fn mention() -> MentionRecord {
        MentionRecord {
            ordinal: 0,
            display_text: "Smith (2020)".to_string(),
            url: "https://doi.org/10.1000/abcd".to_string(),
            hint: AuthorYearHint::default(),
            position: DocumentPosition::default(),
            kind: MentionKind::Citation,
            form: CitationForm::InText,
        }
    }

    #[test]
    fn test_identifier_strategies_are_high_confidence() {
        assert_eq!(MatchStrategy::Doi.confidence(), Confidence::High);
        assert_eq!(MatchStrategy::Url.confidence(), Confidence::Medium);
        assert_eq!(MatchStrategy::Fuzzy.confidence(), Confidence::Low);
    }

    #[test]
    fn test_state_machine_allows_only_forward_paths() {
        use MentionState::*;
        assert!(Extracted.can_transition_to(Matched));
        assert!(Extracted.can_transition_to(SynthesisAttempted));
        assert!(SynthesisAttempted.can_transition_to(Synthesized));
        assert!(SynthesisAttempted.can_transition_to(PlaceholderAssigned));
        assert!(!Matched.can_transition_to(SynthesisAttempted));
        assert!(!SynthesisAttempted.can_transition_to(Extracted));
        assert!(!PlaceholderAssigned.can_transition_to(Synthesized));
        assert!(Synthesized.is_terminal());
        assert!(!SynthesisAttempted.is_terminal());
    }

    #[test]
    fn test_advance_rejects_revisiting_states() {
        let mut result = MatchResult::unresolved(
            mention(),
            "unresolved-0000".to_string(),
            UnresolvedReason::NoCorpusHit,
        );
        result.advance(MentionState::SynthesisAttempted).unwrap();
        result.advance(MentionState::PlaceholderAssigned).unwrap();
        assert!(result.advance(MentionState::SynthesisAttempted).is_err());
        assert_eq!(result.state(), MentionState::PlaceholderAssigned);
    }

    #[test]
    fn test_resolved_result_accessors() {
        let result = MatchResult::resolved(mention(), "smith2020".to_string(), MatchStrategy::Doi);
        assert_eq!(result.key(), Some("smith2020"));
        assert_eq!(result.strategy(), Some(MatchStrategy::Doi));
        assert_eq!(result.confidence(), Confidence::High);
        assert_eq!(result.state(), MentionState::Matched);
        assert!(result.has_bibliography_key());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(UnresolvedReason::NoIdentifier.to_string(), "no identifier found");
        assert_eq!(
            UnresolvedReason::SynthesisRejected("title too short".into()).to_string(),
            "synthesis rejected: title too short"
        );
    }
}
