use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Info,
    Busy,
    Success,
    Warning,
    Error,
}

impl StatusTone {
    /// Colour name a shell can use directly for its status label.
    pub fn color(self) -> &'static str {
        match self {
            StatusTone::Info => "gray",
            StatusTone::Busy => "blue",
            StatusTone::Success => "green",
            StatusTone::Warning => "orange",
            StatusTone::Error => "red",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusUpdate {
    pub message: String,
    pub tone: StatusTone,
}

impl StatusUpdate {
    pub fn new(message: impl Into<String>, tone: StatusTone) -> Self {
        Self {
            message: message.into(),
            tone,
        }
    }
}

/// Per-tool provisioning state. `Ready` is terminal for the process lifetime.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ToolState {
    Missing,
    Downloading { mirror: usize, of: usize },
    Downloaded,
    DownloadFailed { mirror: usize, reason: String },
    Extracting,
    Extracted,
    ExtractFailed { reason: String },
    Ready,
}

impl ToolState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ToolState::Ready)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolStateChanged {
    pub tool: String,
    pub state: ToolState,
}

pub trait EventEmitter: Send + Sync + 'static {
    fn emit_status(&self, status: &StatusUpdate);
    fn emit_tool_state(&self, change: &ToolStateChanged);
    fn emit_progress(&self, percent: f64);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit_status(&self, _status: &StatusUpdate) {}
    fn emit_tool_state(&self, _change: &ToolStateChanged) {}
    fn emit_progress(&self, _percent: f64) {}
}
