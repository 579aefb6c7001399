//! Cabinet deliberation state
//!
//! A cabinet is a set of scholar endpoints plus one chair. Scholars draft in
//! parallel, optionally review each other's previous output for a number of
//! rounds, and the chair merges the final round.
//!
//! ```text
//! Drafting ──► Reviewing(1) ──► … ──► Reviewing(R) ──► Merging ──► Done
//!     └───────────────(R = 0)──────────────────────────┘
//! ```

use crate::core::error::DomainError;
use crate::endpoint::EndpointId;
use std::fmt;

/// Phase of the deliberation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CabinetPhase {
    Drafting,
    Reviewing { round: u8 },
    Merging,
    Done,
}

impl fmt::Display for CabinetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CabinetPhase::Drafting => write!(f, "drafting"),
            CabinetPhase::Reviewing { round } => write!(f, "reviewing({})", round),
            CabinetPhase::Merging => write!(f, "merging"),
            CabinetPhase::Done => write!(f, "done"),
        }
    }
}

/// A scholar taking part in the deliberation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetSeat {
    pub endpoint_id: EndpointId,
    pub label: String,
}

impl CabinetSeat {
    pub fn new(endpoint_id: impl Into<EndpointId>, label: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            label: label.into(),
        }
    }
}

/// Output of one scholar in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScholarOutput {
    pub endpoint_id: EndpointId,
    pub text: String,
    pub failed: bool,
}

impl ScholarOutput {
    pub fn success(endpoint_id: impl Into<EndpointId>, text: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            text: text.into(),
            failed: false,
        }
    }

    /// A failed call settles with embedded error text so the round still joins.
    pub fn failure(endpoint_id: impl Into<EndpointId>, reason: &str) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            text: format!("(no output: {})", reason),
            failed: true,
        }
    }
}

/// Deliberation state for one invocation.
#[derive(Debug, Clone)]
pub struct CabinetState {
    phase: CabinetPhase,
    total_rounds: u8,
    seats: Vec<CabinetSeat>,
    /// Outputs of the last completed round, in seat order.
    outputs: Vec<ScholarOutput>,
    merged: Option<String>,
}

impl CabinetState {
    pub fn new(seats: Vec<CabinetSeat>, total_rounds: u8) -> Self {
        Self {
            phase: CabinetPhase::Drafting,
            total_rounds,
            seats,
            outputs: Vec::new(),
            merged: None,
        }
    }

    pub fn phase(&self) -> CabinetPhase {
        self.phase
    }

    pub fn total_rounds(&self) -> u8 {
        self.total_rounds
    }

    pub fn seats(&self) -> &[CabinetSeat] {
        &self.seats
    }

    pub fn outputs(&self) -> &[ScholarOutput] {
        &self.outputs
    }

    pub fn merged(&self) -> Option<&str> {
        self.merged.as_deref()
    }

    /// Round number of the current phase (0 while drafting).
    pub fn round(&self) -> u8 {
        match self.phase {
            CabinetPhase::Reviewing { round } => round,
            CabinetPhase::Merging | CabinetPhase::Done => self.total_rounds,
            CabinetPhase::Drafting => 0,
        }
    }

    /// Store the settled outputs of the current drafting or review round and
    /// move to the next phase.
    pub fn complete_round(
        &mut self,
        outputs: Vec<ScholarOutput>,
    ) -> Result<CabinetPhase, DomainError> {
        if !matches!(
            self.phase,
            CabinetPhase::Drafting | CabinetPhase::Reviewing { .. }
        ) {
            return Err(self.invalid(CabinetPhase::Reviewing {
                round: self.round().saturating_add(1),
            }));
        }

        let mut ordered = Vec::with_capacity(self.seats.len());
        for seat in &self.seats {
            if let Some(output) = outputs.iter().find(|o| o.endpoint_id == seat.endpoint_id) {
                ordered.push(output.clone());
            }
        }
        self.outputs = ordered;

        self.phase = match self.phase {
            CabinetPhase::Drafting if self.total_rounds == 0 => CabinetPhase::Merging,
            CabinetPhase::Drafting => CabinetPhase::Reviewing { round: 1 },
            CabinetPhase::Reviewing { round } if round < self.total_rounds => {
                CabinetPhase::Reviewing { round: round + 1 }
            }
            _ => CabinetPhase::Merging,
        };
        Ok(self.phase)
    }

    /// Record the chair's merged text.
    pub fn finish(&mut self, merged: impl Into<String>) -> Result<(), DomainError> {
        if self.phase != CabinetPhase::Merging {
            return Err(self.invalid(CabinetPhase::Done));
        }
        self.merged = Some(merged.into());
        self.phase = CabinetPhase::Done;
        Ok(())
    }

    /// Peer outputs of the previous round for `endpoint_id`, excluding its own.
    pub fn peer_context(&self, endpoint_id: &EndpointId) -> String {
        self.format_outputs(|o| &o.endpoint_id != endpoint_id)
    }

    /// All final-round outputs, as handed to the chair.
    pub fn chair_context(&self) -> String {
        self.format_outputs(|_| true)
    }

    /// Unmerged scholar outputs surfaced when the chair call fails.
    /// Failed scholars are left out.
    pub fn unmerged_fallback(&self) -> String {
        self.format_outputs(|o| !o.failed)
    }

    fn format_outputs(&self, keep: impl Fn(&ScholarOutput) -> bool) -> String {
        self.outputs
            .iter()
            .filter(|o| keep(o))
            .map(|o| format!("--- {} ---\n{}", self.label_of(&o.endpoint_id), o.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn label_of<'a>(&'a self, endpoint_id: &'a EndpointId) -> &'a str {
        self.seats
            .iter()
            .find(|s| &s.endpoint_id == endpoint_id)
            .map(|s| s.label.as_str())
            .unwrap_or(endpoint_id.as_str())
    }

    fn invalid(&self, to: CabinetPhase) -> DomainError {
        DomainError::InvalidTransition {
            from: self.phase.to_string(),
            to: to.to_string(),
        }
    }
}
