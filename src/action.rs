//! Action Dispatcher — turns a reconciliation/policy verdict into a call to
//! user-supplied code, per spec.md §4.7.
//!
//! A `Hook` is a tagged variant of {callable, command-template} rather than
//! a trait object hierarchy, per design note 9: the command-template branch
//! owns all shell-escaping centrally so callers never hand-quote paths.

use crate::entry::Entry;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("hook command failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),
}

/// What triggered this hook invocation. Hook authors branch on this when a
/// single hook is reused for more than one event (e.g. logging both
/// additions and removals identically).
///
/// `PastLimit` carries the entry's canonical age in days, matching
/// spec.md §4.1/§4.6's `onEntryPastLimit(age)` hook signature — a command
/// template reads it back via the `%a` placeholder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HookEvent {
    Added,
    Changed,
    Removed,
    PastLimit { age_days: f64 },
}

/// A user-supplied reaction to one of the four Entry lifecycle events.
///
/// The closure/command's boolean return value means "commit this event to
/// tracking state" (spec.md §4.7: "a `false` return suppresses the state
/// update, leaving the entry to be reconsidered next run").
#[derive(Clone)]
pub enum Hook {
    /// In-process callback. Only constructible by library embedders — the
    /// CLI binary has no way to produce a closure from argv.
    Callable(Arc<dyn Fn(&Entry) -> bool + Send + Sync>),
    /// A shell command template. `%s` is substituted with the entry's path,
    /// single-quoted and with embedded `'` escaped so the path is passed as
    /// one argument regardless of spaces or shell metacharacters. For a
    /// `PastLimit` event, `%a` is further substituted with the entry's age
    /// in days (`onEntryPastLimit(age)` per spec.md §4.6).
    Command(String),
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::Callable(_) => write!(f, "Hook::Callable(..)"),
            Hook::Command(cmd) => write!(f, "Hook::Command({cmd:?})"),
        }
    }
}

/// Single-quotes `path` for safe interpolation into a `/bin/sh -c` string,
/// escaping any embedded single quotes with the standard `'\''` idiom.
fn shell_quote(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    let mut quoted = String::with_capacity(lossy.len() + 2);
    quoted.push('\'');
    for ch in lossy.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

impl Hook {
    /// Runs the hook against `entry`. Returns whether the caller should
    /// commit the state update.
    ///
    /// `dryrun` short-circuits `Command` hooks: the command is never
    /// spawned, and the call is logged and reported as a successful commit,
    /// matching spec.md §4.7's dry-run semantics ("logged as if it
    /// succeeded").
    pub fn fire(&self, entry: &Entry, event: HookEvent, dryrun: bool) -> Result<bool, ActionError> {
        match self {
            Hook::Callable(f) => {
                if dryrun {
                    tracing::info!(
                        "dry-run: would invoke callback for {:?} on {}",
                        event,
                        entry.path.display()
                    );
                    return Ok(true);
                }
                Ok(f(entry))
            }
            Hook::Command(template) => {
                let mut command = template.replace("%s", &shell_quote(&entry.path));
                if let HookEvent::PastLimit { age_days } = event {
                    command = command.replace("%a", &format!("{age_days:.2}"));
                }
                if dryrun {
                    tracing::info!("dry-run: would run `{}`", command);
                    return Ok(true);
                }
                tracing::debug!("running hook command: {}", command);
                let status = std::process::Command::new("/bin/sh")
                    .arg("-c")
                    .arg(&command)
                    .status()
                    .map_err(ActionError::Spawn)?;
                Ok(status.success())
            }
        }
    }
}
