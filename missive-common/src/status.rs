use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Where a delivery record sits in its lifecycle.
///
/// ```text
/// PENDING --success--> SENT
/// PENDING --failure--> FAILED
/// FAILED  --success--> SENT
/// FAILED  --failure--> FAILED
/// FAILED  --ceiling--> DEAD
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Recorded, first attempt not yet finished
    Pending,
    /// Handed to the mail transport successfully
    Sent,
    /// Last attempt failed, eligible for retry
    Failed,
    /// Abandoned after exhausting the attempt ceiling
    Dead,
}

impl DeliveryStatus {
    /// `SENT` and `DEAD` never change again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Dead)
    }

    /// Whether the state machine allows moving from `self` to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Failed, Self::Sent | Self::Failed) | (Self::Failed, Self::Dead)
        )
    }

    /// The persisted name of this status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Dead => "DEAD",
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}
