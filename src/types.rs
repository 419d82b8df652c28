use std::fmt;
use std::str::FromStr;

use notify::EventKind;
use notify::event::ModifyKind;

/// What happened to a path, reduced from the raw `notify` event kind.
///
/// Only `Create` and `Write` can trigger a restart; the other kinds are kept
/// so the filter can log what it discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
    Metadata,
    Other,
}

impl ChangeKind {
    /// Whether this kind of change should ever restart the child process.
    pub fn is_restart_worthy(self) -> bool {
        matches!(self, ChangeKind::Create | ChangeKind::Write)
    }
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::Metadata,
            EventKind::Modify(_) => ChangeKind::Write,
            EventKind::Remove(_) => ChangeKind::Remove,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => ChangeKind::Other,
        }
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(ChangeKind::Create),
            "write" => Ok(ChangeKind::Write),
            "remove" | "delete" => Ok(ChangeKind::Remove),
            "rename" => Ok(ChangeKind::Rename),
            "metadata" | "chmod" => Ok(ChangeKind::Metadata),
            "other" => Ok(ChangeKind::Other),
            other => Err(format!("invalid change kind: {other}")),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Create => "create",
            ChangeKind::Write => "write",
            ChangeKind::Remove => "remove",
            ChangeKind::Rename => "rename",
            ChangeKind::Metadata => "metadata",
            ChangeKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of the process supervisor.
///
/// `Idle -> Running -> Stopping -> Idle`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorState {
    #[default]
    Idle,
    Running,
    Stopping,
    Closed,
}
