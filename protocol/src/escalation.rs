use serde::Deserialize;
use serde::Serialize;

/// Outcome of asking the user whether a permission failure should be retried
/// through a privileged console.
///
/// Dismissing the prompt without answering maps to `Decline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationDecision {
    /// Swap in a privileged console and resubmit the original command.
    Escalate,

    /// Treat the original failure as final.
    #[default]
    Decline,
}
