//! Accumulation of live recognition output.

/// Running transcript built from recognition fragments.
///
/// Finals are appended with a single space; the interim fragment is
/// replaced on every update and never becomes part of the final text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTranscript {
    finals: String,
    interim: String,
}

impl LiveTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_final(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if !fragment.is_empty() {
            if !self.finals.is_empty() {
                self.finals.push(' ');
            }
            self.finals.push_str(fragment);
        }
        // A final settles whatever was provisional.
        self.interim.clear();
    }

    pub fn set_interim(&mut self, fragment: &str) {
        self.interim = fragment.trim().to_string();
    }

    /// Finals only.
    pub fn text(&self) -> &str {
        &self.finals
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Finals followed by the current interim, for display.
    pub fn preview(&self) -> String {
        match (self.finals.is_empty(), self.interim.is_empty()) {
            (_, true) => self.finals.clone(),
            (true, false) => self.interim.clone(),
            (false, false) => format!("{} {}", self.finals, self.interim),
        }
    }

    /// Drop the interim and return the settled text.
    pub fn finish(self) -> String {
        self.finals
    }
}
