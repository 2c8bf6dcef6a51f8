/// Category of a user-facing diagnostic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// The discrete time axis hit its sample cap before reaching `stop`.
    AxisTruncated,
    /// A declared period could not be used; a derived one replaced it.
    InvalidPeriod,
    /// A layer exhausted its tile retries and its entry was hidden.
    TileFailure,
}

/// One message for the user, attributed to an entry by display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub entry_name: String,
    pub title: String,
    pub message: String,
}

/// Single message stream shared by everything attached to one host loop.
///
/// Messages are kept in posting order until drained.
#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn post(
        &mut self,
        kind: DiagnosticKind,
        entry_name: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.events.push(Diagnostic {
            kind,
            entry_name: entry_name.into(),
            title: title.into(),
            message: message.into(),
        });
    }

    pub fn events(&self) -> &[Diagnostic] {
        &self.events
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.events.iter().filter(|d| d.kind == kind).count()
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Diagnostic>) {
        self.events.extend(events);
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.events)
    }
}
