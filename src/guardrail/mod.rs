//! Content-safety guardrail: the remote classifier client and the local
//! policy that turns its verdicts into allow/block decisions.

pub mod evaluator;
pub mod scanner;
pub mod verdict;

pub use evaluator::{SafetyDecision, evaluate, humanize_signal};
pub use scanner::{AirsScanner, Scanner};
pub use verdict::{ScanAction, ScanVerdict};
