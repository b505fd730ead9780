//! Debug Channel
//!
//! A process-wide switch for lifecycle tracing. When enabled, every create,
//! read, write, execute, dispose and flush is emitted as a `tracing` event
//! under the `zenith_reactive` target. Install any subscriber to see them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::graph::NodeKind;

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Turn lifecycle tracing on or off for the whole process.
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

/// Whether lifecycle tracing is on.
pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// A lifecycle step of a reactive node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Create,
    Read,
    Write,
    Execute,
    Dispose,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Create => "create",
            Lifecycle::Read => "read",
            Lifecycle::Write => "write",
            Lifecycle::Execute => "execute",
            Lifecycle::Dispose => "dispose",
        })
    }
}

pub(crate) fn lifecycle(event: Lifecycle, kind: NodeKind, id: u64, name: Option<&str>) {
    if !is_debug() {
        return;
    }
    let name = name.unwrap_or("");
    // Reads are by far the most frequent event.
    if event == Lifecycle::Read {
        tracing::trace!(target: "zenith_reactive", %event, %kind, id, name);
    } else {
        tracing::debug!(target: "zenith_reactive", %event, %kind, id, name);
    }
}

pub(crate) fn flush_round(round: usize, dirty: usize, scheduled: usize) {
    if is_debug() {
        tracing::debug!(target: "zenith_reactive", round, dirty, scheduled, "flush round");
    }
}
