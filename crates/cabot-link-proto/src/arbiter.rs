//! Request-id arbitration across links.
//!
//! The robot may deliver the same request over BLE and TCP. One cursor per
//! message kind admits each request id at most once, in increasing order.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::message::{Message, MessageKind, RequestId};
use crate::mode::{ModeGate, OperatingMode};

/// The physical link a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    Ble,
    Tcp,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Link::Ble => "ble",
            Link::Tcp => "tcp",
        })
    }
}

/// Outcome of [`Arbiter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward to the application.
    Accepted,
    /// Id not greater than the last accepted one.
    Stale { last: RequestId },
    /// Same id as the last accepted one but a different payload.
    Conflict { last: RequestId },
    /// Not honored in the current operating mode.
    Gated { mode: OperatingMode },
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    last: RequestId,
    fingerprint: u64,
}

#[derive(Debug, Default)]
struct State {
    cursors: HashMap<MessageKind, Cursor>,
    mode: OperatingMode,
}

/// Mode gate plus one request-id cursor per message kind.
///
/// Shared by all links; cursors live as long as the arbiter.
#[derive(Debug)]
pub struct Arbiter {
    state: Mutex<State>,
    gate: ModeGate,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbiter {
    pub fn new() -> Self {
        Self::with_gate(ModeGate::default())
    }

    pub fn with_gate(gate: ModeGate) -> Self {
        Self {
            state: Mutex::new(State::default()),
            gate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> OperatingMode {
        self.lock().mode
    }

    pub fn set_mode(&self, mode: OperatingMode) {
        let mut state = self.lock();
        if state.mode != mode {
            debug!(from = %state.mode, to = %mode, "operating mode changed");
            state.mode = mode;
        }
    }

    /// Last accepted id for `kind`, if any.
    pub fn last_accepted(&self, kind: MessageKind) -> Option<RequestId> {
        self.lock().cursors.get(&kind).map(|c| c.last)
    }

    /// Decide whether `message` reaches the application.
    ///
    /// Messages without a request id are only subject to the mode gate.
    pub fn admit(&self, message: &Message, link: Link) -> Verdict {
        self.judge(&mut self.lock(), message, link)
    }

    /// Like [`admit`](Self::admit), but hands an accepted message to
    /// `forward` before the cursor is released.
    ///
    /// Links forwarding through this method reach their shared receiver in
    /// request-id order per kind, whichever thread admitted them.
    pub fn admit_then<F>(&self, message: Message, link: Link, forward: F) -> Verdict
    where
        F: FnOnce(Message),
    {
        let mut state = self.lock();
        let verdict = self.judge(&mut state, &message, link);
        if verdict.is_accepted() {
            forward(message);
        }
        verdict
    }

    fn judge(&self, state: &mut State, message: &Message, link: Link) -> Verdict {
        let kind = message.kind();

        if !self.gate.allows(state.mode, kind) {
            debug!(%kind, %link, mode = %state.mode, "message gated by operating mode");
            return Verdict::Gated { mode: state.mode };
        }

        let Some(id) = message.request_id() else {
            return Verdict::Accepted;
        };
        let fingerprint = fingerprint(message);

        match state.cursors.get(&kind).copied() {
            Some(cursor) if id == cursor.last && fingerprint != cursor.fingerprint => {
                warn!(
                    %kind,
                    %link,
                    request_id = id,
                    "same request id with a different payload; second copy dropped"
                );
                Verdict::Conflict { last: cursor.last }
            }
            Some(cursor) if id <= cursor.last => {
                debug!(%kind, %link, request_id = id, last = cursor.last, "stale request dropped");
                Verdict::Stale { last: cursor.last }
            }
            _ => {
                state.cursors.insert(kind, Cursor { last: id, fingerprint });
                Verdict::Accepted
            }
        }
    }
}

fn fingerprint(message: &Message) -> u64 {
    let mut hasher = DefaultHasher::new();
    match serde_json::to_vec(message) {
        Ok(bytes) => bytes.hash(&mut hasher),
        Err(_) => format!("{message:?}").hash(&mut hasher),
    }
    hasher.finish()
}
