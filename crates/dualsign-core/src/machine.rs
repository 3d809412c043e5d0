//! Contract lifecycle state machine.
//!
//! `PENDING -> CUSTOMER_SIGNED -> COMPLETED`. The customer may only act while the
//! contract is pending and the company only once the customer phase is done.
//! Whether a phase is complete is decided by the caller from freshly read
//! signatures; this module only owns the guards and the forward edges.

use crate::types::{ContractStatus, Party};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason a party's action is rejected in the current lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateViolation {
    /// The contract is already completed; nobody may sign.
    AlreadyCompleted,
    /// The company tried to sign before the customer phase finished.
    CustomerNotDone,
    /// The customer tried to sign after its phase was closed.
    CustomerAlreadySigned,
    /// Finalization was requested before the contract completed.
    NotCompleted,
}

impl StateViolation {
    pub fn message(self) -> &'static str {
        match self {
            Self::AlreadyCompleted => "contract is already completed",
            Self::CustomerNotDone => "customer has not finished signing yet",
            Self::CustomerAlreadySigned => {
                "customer signing is closed; the company phase is already in progress"
            }
            Self::NotCompleted => "contract is not completed yet",
        }
    }
}

impl fmt::Display for StateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Check whether `party` may submit signatures while the contract is in `status`.
pub fn check_guard(status: ContractStatus, party: Party) -> Result<(), StateViolation> {
    match (party, status) {
        (Party::Customer, ContractStatus::Pending) => Ok(()),
        (Party::Company, ContractStatus::CustomerSigned) => Ok(()),
        (_, ContractStatus::Completed) => Err(StateViolation::AlreadyCompleted),
        (Party::Customer, ContractStatus::CustomerSigned) => {
            Err(StateViolation::CustomerAlreadySigned)
        }
        (Party::Company, ContractStatus::Pending) => Err(StateViolation::CustomerNotDone),
    }
}

/// Status reached once `party` has covered its whole required role set.
pub fn phase_target(party: Party) -> ContractStatus {
    match party {
        Party::Customer => ContractStatus::CustomerSigned,
        Party::Company => ContractStatus::Completed,
    }
}

/// Close `party`'s phase: guard the current status and return the next one.
pub fn complete_phase(
    current: ContractStatus,
    party: Party,
) -> Result<ContractStatus, StateViolation> {
    check_guard(current, party)?;
    Ok(phase_target(party))
}

/// Guard used by finalization: only completed contracts may be finalized.
pub fn check_finalizable(status: ContractStatus) -> Result<(), StateViolation> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(StateViolation::NotCompleted)
    }
}
