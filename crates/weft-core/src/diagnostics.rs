// SPDX-License-Identifier: Apache-2.0
//! Diagnostics surfaced by inference, lowering, binding, scheduling, and the
//! runtime's health monitor.

use std::fmt;

use weft_types::StableStateId;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Explanatory only.
    Hint,
    /// Explanatory only.
    Info,
    /// Suspicious but runnable.
    Warn,
    /// User-fixable; blocks program output.
    Error,
    /// An invariant the pipeline must not violate.
    Fatal,
}

/// What a diagnostic is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// A whole block.
    Block {
        /// The block's patch-assigned identifier.
        block_id: String,
    },
    /// One port on a block.
    Port {
        /// The owning block's identifier.
        block_id: String,
        /// The port's identifier within that block.
        port_id: String,
    },
    /// An external event bus channel.
    Bus {
        /// The channel's name.
        channel: String,
    },
    /// A binding-pass state allocation.
    Binding {
        /// The state key implicated.
        state_key: StableStateId,
    },
    /// The time model root.
    TimeRoot,
    /// A span of the graph not reducible to a single block (e.g. a cycle).
    GraphSpan {
        /// The blocks implicated, in discovery order.
        block_ids: Vec<String>,
    },
    /// A composite block's expansion.
    Composite {
        /// The composite block's identifier.
        block_id: String,
    },
}

/// One diagnostic emitted during compilation or at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Unique within one compile/frame, assigned in emission order.
    pub id: u32,
    /// A short machine-stable code, e.g. `"UnresolvedPayloadVar"`.
    pub code: &'static str,
    /// Severity class.
    pub severity: Severity,
    /// Short human-readable title.
    pub title: String,
    /// Full explanatory message.
    pub message: String,
    /// What this diagnostic is about.
    pub primary_target: TargetRef,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.code, self.message)
    }
}

/// Accumulates diagnostics during one compile pass, assigning each a stable
/// sequential id.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    next_id: u32,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic, stamping it with the next sequential id.
    pub fn push(
        &mut self,
        code: &'static str,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        primary_target: TargetRef,
    ) {
        let id = self.next_id;
        self.next_id += 1;
        self.diagnostics.push(Diagnostic {
            id,
            code,
            severity,
            title: title.into(),
            message: message.into(),
            primary_target,
        });
    }

    /// Whether any diagnostic at or above [`Severity::Error`] was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity >= Severity::Error)
    }

    /// Consumes the sink, returning every diagnostic in emission order.
    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Every diagnostic recorded so far, in emission order.
    #[must_use]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
