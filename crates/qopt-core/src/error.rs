//! Error type shared by the optimizer and its components.
//!
//! Rule failures are recovered locally by the driver (a failing transform is
//! logged and produces nothing); only structural violations and cooperative
//! cancellation propagate. No partial plan is ever returned: the driver
//! yields either a fully physical, requirement-covering tree or no plan.

use crate::memo::GroupId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// An insertion or merge would make a group its own descendant. This
    /// indicates a broken rule and fails the optimization call.
    #[error("expression would make group {0} its own descendant")]
    CycleDetected(GroupId),

    /// The cooperative cancellation flag was raised. The driver unwinds and
    /// reports "no plan".
    #[error("optimization cancelled")]
    Cancelled,

    /// An internal invariant was violated.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type OptResult<T> = Result<T, OptimizerError>;
