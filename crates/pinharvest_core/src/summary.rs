use std::fmt;

/// Per-stage unit counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    /// Units handed to the stage.
    pub requested: usize,
    /// Units the stage delivered downstream.
    pub delivered: usize,
    /// Units dropped after exhausting retries.
    pub dropped: usize,
    /// Units whose per-unit work failed.
    pub failed: usize,
}

impl StageCounts {
    pub fn missing(&self) -> usize {
        self.requested.saturating_sub(self.delivered)
    }
}

/// Totals shown to the user once a run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub prompts: usize,
    pub pins_found: usize,
    pub parsing: StageCounts,
    pub downloading: StageCounts,
}

impl RunSummary {
    pub fn images_saved(&self) -> usize {
        self.downloading.delivered
    }

    pub fn is_complete(&self) -> bool {
        self.parsing.missing() == 0 && self.downloading.missing() == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} prompt(s), {} pin(s) found, {} image link(s) extracted, {} image(s) saved",
            self.prompts,
            self.pins_found,
            self.parsing.delivered,
            self.images_saved()
        )?;
        let skipped = self.parsing.missing() + self.downloading.missing();
        if skipped > 0 {
            write!(f, " ({skipped} skipped)")?;
        }
        Ok(())
    }
}
