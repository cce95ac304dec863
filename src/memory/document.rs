//! The synthesized memory document and its markdown form.

/// Canonical section headers, in render order.
pub const TECHNICAL_CONSTRAINTS: &str = "Technical Constraints";
pub const RESOLVED_ARCHITECTURE: &str = "Resolved Architecture";
pub const PENDING_TASKS: &str = "Pending Tasks";
pub const ADDITIONAL_NOTES: &str = "Additional Notes";

/// Structured summary of compressed conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesizedMemory {
    pub technical_constraints: String,
    pub resolved_architecture: String,
    pub pending_tasks: String,
    /// Catch-all for content under unrecognized headers.
    pub additional_notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    TechnicalConstraints,
    ResolvedArchitecture,
    PendingTasks,
    AdditionalNotes,
}

impl Section {
    const ALL: [Section; 4] = [
        Section::TechnicalConstraints,
        Section::ResolvedArchitecture,
        Section::PendingTasks,
        Section::AdditionalNotes,
    ];

    fn header(&self) -> &'static str {
        match self {
            Section::TechnicalConstraints => TECHNICAL_CONSTRAINTS,
            Section::ResolvedArchitecture => RESOLVED_ARCHITECTURE,
            Section::PendingTasks => PENDING_TASKS,
            Section::AdditionalNotes => ADDITIONAL_NOTES,
        }
    }

    fn from_header(text: &str) -> Option<Self> {
        let normalized = text
            .trim()
            .trim_end_matches(':')
            .trim()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|s| s.header().to_ascii_lowercase() == normalized)
    }
}

impl SynthesizedMemory {
    fn section(&self, section: Section) -> &str {
        match section {
            Section::TechnicalConstraints => &self.technical_constraints,
            Section::ResolvedArchitecture => &self.resolved_architecture,
            Section::PendingTasks => &self.pending_tasks,
            Section::AdditionalNotes => &self.additional_notes,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut String {
        match section {
            Section::TechnicalConstraints => &mut self.technical_constraints,
            Section::ResolvedArchitecture => &mut self.resolved_architecture,
            Section::PendingTasks => &mut self.pending_tasks,
            Section::AdditionalNotes => &mut self.additional_notes,
        }
    }

    /// True when every section is blank.
    pub fn is_empty(&self) -> bool {
        Section::ALL
            .iter()
            .all(|s| self.section(*s).trim().is_empty())
    }

    /// Render to canonical markdown. Blank sections are omitted.
    pub fn to_markdown(&self) -> String {
        Section::ALL
            .iter()
            .filter_map(|s| {
                let body = self.section(*s).trim();
                (!body.is_empty()).then(|| format!("## {}\n\n{}\n", s.header(), body))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse markdown by its `#`/`##` headers.
    ///
    /// Header matching is case-insensitive. Text under unrecognized headers,
    /// header line included, and text before the first header lands in
    /// `additional_notes` so nothing is dropped. Deeper headers (`###` and
    /// below) are section content.
    pub fn from_markdown(markdown: &str) -> Self {
        let mut memory = Self::default();
        let mut current = Section::AdditionalNotes;
        let mut buffer: Vec<&str> = Vec::new();

        for line in markdown.lines() {
            if let Some(title) = section_title(line) {
                memory.append(current, &buffer);
                buffer.clear();
                match Section::from_header(title) {
                    Some(section) => current = section,
                    None => {
                        current = Section::AdditionalNotes;
                        buffer.push(line);
                    }
                }
            } else {
                buffer.push(line);
            }
        }
        memory.append(current, &buffer);
        memory
    }

    fn append(&mut self, section: Section, lines: &[&str]) {
        let text = lines.join("\n");
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let target = self.section_mut(section);
        if !target.is_empty() {
            target.push_str("\n\n");
        }
        target.push_str(text);
    }

    /// Whitespace-separated words in the rendered document, headers included.
    pub fn word_count(&self) -> usize {
        self.to_markdown().split_whitespace().count()
    }

    /// Cut the document to at most `max_words` rendered words.
    ///
    /// Sections are kept in order; line breaks within kept text survive. A
    /// section is dropped entirely when its header would not fit with at
    /// least one word of content.
    pub fn truncate_to_words(&self, max_words: usize) -> Self {
        let mut out = Self::default();
        let mut budget = max_words;

        for section in Section::ALL {
            let body = self.section(section).trim();
            if body.is_empty() {
                continue;
            }
            let header_words = section.header().split_whitespace().count() + 1; // "##"
            if budget <= header_words {
                break;
            }
            let (kept, used) = take_words(body, budget - header_words);
            if used == 0 {
                continue;
            }
            *out.section_mut(section) = kept;
            budget -= header_words + used;
        }
        out
    }
}

/// Title of a level-1 or level-2 markdown header line.
fn section_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = trimmed
        .strip_prefix("## ")
        .or_else(|| trimmed.strip_prefix("# "))?;
    Some(rest.trim().trim_end_matches('#').trim())
}

/// Keep at most `max` words of `text`, preserving whole lines where possible.
fn take_words(text: &str, max: usize) -> (String, usize) {
    let mut kept: Vec<String> = Vec::new();
    let mut used = 0;
    for line in text.lines() {
        let words = line.split_whitespace().count();
        if used + words <= max {
            kept.push(line.to_string());
            used += words;
            continue;
        }
        let room = max - used;
        if room > 0 {
            kept.push(line.split_whitespace().take(room).collect::<Vec<_>>().join(" "));
            used += room;
        }
        break;
    }
    (kept.join("\n").trim().to_string(), used)
}
