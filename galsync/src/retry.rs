//! Bounded retry policy
//!
//! Two fixed bounds govern remote retries:
//! - a search call may be attempted at most 4 times in total while the
//!   catalog keeps answering 401 (each 401 triggers a credential refresh)
//! - an organization may be looked up at most 3 times per run while its
//!   cached record stays incomplete
//!
//! Both are expressed as a [`RetryBudget`]; attempts are counted from 1.
//! There is no backoff between attempts.

/// Maximum number of attempts for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
}

impl RetryBudget {
    /// Total search attempts per call, counting the first
    pub const SEARCH_AUTH: RetryBudget = RetryBudget::new(4);

    /// Organization lookups per id while the record stays incomplete
    pub const ORG_LOOKUP: RetryBudget = RetryBudget::new(3);

    /// A budget of at least one attempt
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the 1-based `attempt` is within budget
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Whether `attempt` is the final one the budget allows
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt == self.max_attempts
    }

    /// Every allowed attempt number in order
    pub fn attempts(&self) -> impl Iterator<Item = u32> {
        1..=self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_budget_allows_four_attempts() {
        let budget = RetryBudget::SEARCH_AUTH;
        assert_eq!(budget.attempts().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(budget.is_last(4));
        assert!(!budget.allows(5));
    }

    #[test]
    fn test_org_budget_gate() {
        let budget = RetryBudget::ORG_LOOKUP;
        assert!(!budget.allows(0));
        assert!(budget.allows(1));
        assert!(budget.allows(3));
        assert!(!budget.allows(4));
    }

    #[test]
    fn test_zero_budget_still_allows_one_attempt() {
        let budget = RetryBudget::new(0);
        assert_eq!(budget.max_attempts(), 1);
        assert!(budget.allows(1));
    }
}
