/// Stage definitions for tracking a single URL through the pipeline
///
/// This module defines every stage a URL passes through during one `process` call.
use std::fmt;

/// Represents the current stage of a URL in the pipeline
///
/// The happy path is `Start → Retrieving → Extracting → StoringHtml →
/// StoringPage → Done`. `Retrieving` is skipped when the caller supplies the
/// contents. Any non-terminal stage may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStage {
    // ===== Active Stages =====
    /// Nothing has happened yet
    Start,

    /// Looking up the cached body or fetching it
    Retrieving,

    /// Deriving metadata from the body
    Extracting,

    /// Writing the raw body to the `html` table
    StoringHtml,

    /// Writing the metadata to the `pages` table
    StoringPage,

    // ===== Terminal Stages =====
    /// Both records were written
    Done,

    /// Processing stopped with an error
    Failed,
}

impl CrawlStage {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if a transition from `self` to `next` is valid
    pub fn can_transition_to(&self, next: CrawlStage) -> bool {
        use CrawlStage::*;

        match (self, next) {
            (Start, Retrieving) | (Start, Extracting) => true,
            (Retrieving, Extracting) => true,
            (Extracting, StoringHtml) => true,
            (StoringHtml, StoringPage) => true,
            (StoringPage, Done) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    /// Returns a short lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Retrieving => "retrieving",
            Self::Extracting => "extracting",
            Self::StoringHtml => "storing_html",
            Self::StoringPage => "storing_page",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
