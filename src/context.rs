//! Token-bounded conversation context with importance/recency eviction

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CompressionPolicy;
use crate::message::{ContextMessage, Role, TokenUsage, Turn};
use crate::retrieval::ContextBudget;
use crate::tokens::TokenCounter;

/// Guards the recency ratio when every turn shares one timestamp
const RECENCY_EPSILON: f64 = 1e-6;

/// Lifecycle of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    Empty,
    Accumulating,
    /// Only held while an eviction pass runs inside `add`
    Compressing,
    Cleared,
}

/// What an eviction pass did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionReport {
    pub evicted: usize,
    pub tokens_before: u64,
    pub tokens_after: u64,
}

/// Ordered turns of one conversation, kept under a token budget
#[derive(Debug)]
pub struct BoundedContext {
    max_tokens: u32,
    turns: Vec<Turn>,
    /// Wider than a single turn's count so no sequence of turns can overflow it
    total_tokens: u64,
    policy: CompressionPolicy,
    counter: TokenCounter,
    state: ContextState,
}

impl BoundedContext {
    /// Context with the default compression policy and heuristic counting
    pub fn new(max_tokens: u32) -> Self {
        Self::with_policy(max_tokens, CompressionPolicy::default())
    }

    pub fn with_policy(max_tokens: u32, policy: CompressionPolicy) -> Self {
        Self {
            max_tokens,
            turns: Vec::new(),
            total_tokens: 0,
            policy,
            counter: TokenCounter::default(),
            state: ContextState::Empty,
        }
    }

    /// Use `counter` for turns added without a token count
    pub fn with_counter(mut self, counter: TokenCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn stamped now, compressing if the budget is exceeded
    pub fn add(
        &mut self,
        role: Role,
        content: impl Into<String>,
        token_count: Option<u32>,
    ) -> Option<CompressionReport> {
        let content = content.into();
        let token_count = token_count.unwrap_or_else(|| self.counter.count(&content));
        let turn = Turn::new(role, content, token_count)
            .with_importance(self.policy.default_importance);
        self.add_turn(turn)
    }

    /// Append a pre-built turn (e.g. replayed with its original timestamp)
    pub fn add_turn(&mut self, mut turn: Turn) -> Option<CompressionReport> {
        turn.importance = self.policy.clamp_importance(turn.importance);
        self.total_tokens += u64::from(turn.token_count);
        self.turns.push(turn);
        self.state = ContextState::Accumulating;

        if self.total_tokens > u64::from(self.max_tokens) {
            Some(self.compress())
        } else {
            None
        }
    }

    /// Turns as role/content pairs, prioritised down to `max_tokens` if given
    pub fn get(&self, max_tokens: Option<u32>) -> Vec<ContextMessage> {
        match max_tokens {
            Some(cap) if u64::from(cap) < self.total_tokens => self.prioritized(cap),
            _ => self.turns.iter().map(Turn::to_message).collect(),
        }
    }

    pub fn token_count(&self) -> u64 {
        self.total_tokens
    }

    /// Budget used, as a percentage of `max_tokens`
    pub fn utilization(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.total_tokens as f64 / self.max_tokens as f64 * 100.0
    }

    /// Drop every turn
    pub fn clear(&mut self) {
        self.turns.clear();
        self.total_tokens = 0;
        self.state = ContextState::Cleared;
    }

    /// Set a turn's importance (clamped); `false` for NaN or an out-of-range index
    pub fn set_importance(&mut self, index: usize, value: f64) -> bool {
        if value.is_nan() {
            warn!(index, "Ignoring NaN importance");
            return false;
        }
        let clamped = self.policy.clamp_importance(value);
        match self.turns.get_mut(index) {
            Some(turn) => {
                turn.importance = clamped;
                true
            }
            None => false,
        }
    }

    /// Per-role token and turn counts
    pub fn usage(&self) -> TokenUsage {
        let mut usage = TokenUsage::new(self.max_tokens);
        for turn in &self.turns {
            usage.add(turn.role, turn.token_count);
        }
        usage
    }

    /// Budget status against warning/critical thresholds (fractions of max)
    pub fn budget(&self, warning_threshold: f32, critical_threshold: f32) -> ContextBudget {
        let mut budget = ContextBudget::new(self.max_tokens, warning_threshold, critical_threshold);
        budget.add(self.total_tokens);
        budget
    }

    /// Structural digest of the conversation
    pub fn summarize(&self) -> String {
        if self.turns.is_empty() {
            return "Empty conversation (0 tokens)".to_string();
        }
        let usage = self.usage();
        format!(
            "Conversation with {} turns ({} user, {} assistant, {} system), ~{} tokens ({:.1}% of {})",
            usage.turns(),
            usage.user_turns,
            usage.assistant_turns,
            usage.system_turns,
            usage.total,
            self.utilization(),
            self.max_tokens
        )
    }

    fn protected_mask(&self) -> Vec<bool> {
        let len = self.turns.len();
        let tail_start = len.saturating_sub(self.policy.protected_tail);
        (0..len)
            .map(|i| i < self.policy.protected_head || i >= tail_start)
            .collect()
    }

    /// `importance * (base + recency_weight * recency)` for every turn
    fn scores(&self) -> Vec<f64> {
        let (Some(first), Some(last)) = (self.turns.first(), self.turns.last()) else {
            return Vec::new();
        };
        let span = seconds_between(first, last) + RECENCY_EPSILON;
        let base = self.policy.base_weight();

        self.turns
            .iter()
            .map(|turn| {
                let recency = seconds_between(first, turn) / span;
                let score = turn.importance * (base + self.policy.recency_weight * recency);
                // -0.0 would order below 0.0 under total_cmp
                if score == 0.0 { 0.0 } else { score }
            })
            .collect()
    }

    fn compress(&mut self) -> CompressionReport {
        self.state = ContextState::Compressing;
        let tokens_before = self.total_tokens;
        let target = self.max_tokens as f64 * self.policy.target_ratio;

        let protected = self.protected_mask();
        let scores = self.scores();
        let mut candidates: Vec<usize> = (0..self.turns.len()).filter(|&i| !protected[i]).collect();
        // Stable: equal scores evict the older turn first
        candidates.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        let mut evict = vec![false; self.turns.len()];
        let mut remaining = self.turns.len();
        let mut evicted = 0;
        for i in candidates {
            if self.total_tokens as f64 <= target || remaining <= self.policy.min_retained {
                break;
            }
            evict[i] = true;
            self.total_tokens -= u64::from(self.turns[i].token_count);
            remaining -= 1;
            evicted += 1;
        }

        let mut position = 0;
        self.turns.retain(|_| {
            let keep = !evict[position];
            position += 1;
            keep
        });
        self.state = ContextState::Accumulating;

        if self.total_tokens as f64 > target {
            warn!(
                tokens = self.total_tokens,
                max_tokens = self.max_tokens,
                turns = self.turns.len(),
                "Context still above compression target after eviction"
            );
        }
        debug!(
            evicted,
            tokens_before,
            tokens_after = self.total_tokens,
            "Compressed context"
        );

        CompressionReport {
            evicted,
            tokens_before,
            tokens_after: self.total_tokens,
        }
    }

    fn prioritized(&self, cap: u32) -> Vec<ContextMessage> {
        let mut included = self.protected_mask();
        let used: u64 = self
            .turns
            .iter()
            .zip(&included)
            .filter(|(_, keep)| **keep)
            .map(|(turn, _)| u64::from(turn.token_count))
            .sum();
        let mut remaining = u64::from(cap).saturating_sub(used);

        let scores = self.scores();
        let mut candidates: Vec<usize> = (0..self.turns.len()).filter(|&i| !included[i]).collect();
        candidates.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        for i in candidates {
            let cost = u64::from(self.turns[i].token_count);
            if cost <= remaining {
                included[i] = true;
                remaining -= cost;
            }
        }

        self.turns
            .iter()
            .zip(included)
            .filter(|(_, keep)| *keep)
            .map(|(turn, _)| turn.to_message())
            .collect()
    }
}

fn seconds_between(from: &Turn, to: &Turn) -> f64 {
    let delta = to.created_at - from.created_at;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn turn_at(second: i64, role: Role, content: &str, tokens: u32) -> Turn {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Turn::new(role, content, tokens).at(base + Duration::seconds(second))
    }

    fn contents(messages: &[ContextMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_add_estimates_tokens() {
        let mut ctx = BoundedContext::new(1000);
        assert_eq!(ctx.state(), ContextState::Empty);

        ctx.add(Role::User, "abcdefgh", None);
        ctx.add(Role::Assistant, "ok", Some(7));

        assert_eq!(ctx.token_count(), 3 + 7);
        assert_eq!(ctx.turns()[0].importance, 1.0);
        assert_eq!(ctx.state(), ContextState::Accumulating);
        assert!((ctx.utilization() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_compression_hysteresis() {
        let mut ctx = BoundedContext::new(100);
        let mut report = None;
        for i in 0..9 {
            let role = if i == 0 { Role::System } else { Role::User };
            report = ctx.add_turn(turn_at(i, role, &format!("turn {}", i), 12));
        }

        let report = report.expect("ninth turn crosses the budget");
        assert_eq!(report.tokens_before, 108);
        assert_eq!(report.evicted, 3);
        assert_eq!(ctx.token_count(), 72);
        assert!(ctx.token_count() <= 80);

        let kept = ctx.get(None);
        assert_eq!(
            contents(&kept),
            vec!["turn 0", "turn 4", "turn 5", "turn 6", "turn 7", "turn 8"]
        );
        assert_eq!(ctx.state(), ContextState::Accumulating);
    }

    #[test]
    fn test_no_compression_at_exact_budget() {
        let mut ctx = BoundedContext::new(100);
        for i in 0..4 {
            assert!(ctx.add_turn(turn_at(i, Role::User, "x", 25)).is_none());
        }
        assert_eq!(ctx.token_count(), 100);
        assert_eq!(ctx.len(), 4);
    }

    #[test]
    fn test_compression_stops_at_min_retained() {
        let mut ctx = BoundedContext::new(100);
        ctx.add_turn(turn_at(0, Role::System, "system", 40));
        ctx.add_turn(turn_at(1, Role::User, "a", 5));
        ctx.add_turn(turn_at(2, Role::Assistant, "b", 5));
        ctx.add_turn(turn_at(3, Role::User, "c", 40));
        let report = ctx.add_turn(turn_at(4, Role::Assistant, "d", 40)).unwrap();

        assert_eq!(report.evicted, 1);
        assert_eq!(ctx.len(), 4);
        assert_eq!(ctx.token_count(), 125);
        assert_eq!(contents(&ctx.get(None)), vec!["system", "b", "c", "d"]);
    }

    #[test]
    fn test_importance_protects_old_turn() {
        let mut ctx = BoundedContext::new(1000);
        for i in 0..6 {
            ctx.add_turn(turn_at(i, Role::User, &format!("t{}", i), 10));
        }
        assert!(ctx.set_importance(1, 2.0));

        // t1 = 2.0 * (0.3 + 0.7 * 0.2) = 0.88, t3 = 0.3 + 0.7 * 0.6 = 0.72
        let slice = ctx.get(Some(40));
        assert_eq!(contents(&slice), vec!["t0", "t1", "t4", "t5"]);
    }

    #[test]
    fn test_prioritized_slice() {
        let mut ctx = BoundedContext::new(1000);
        for i in 0..6 {
            ctx.add_turn(turn_at(i, Role::User, &format!("t{}", i), 10));
        }

        let slice = ctx.get(Some(40));
        assert_eq!(contents(&slice), vec!["t0", "t3", "t4", "t5"]);

        // Repeated calls give the same answer
        for _ in 0..5 {
            assert_eq!(ctx.get(Some(40)), slice);
        }

        // Cap at or above the total returns everything
        assert_eq!(ctx.get(Some(60)).len(), 6);
        assert_eq!(ctx.get(Some(500)).len(), 6);
    }

    #[test]
    fn test_prioritized_slice_skips_turns_that_do_not_fit() {
        let mut ctx = BoundedContext::new(1000);
        ctx.add_turn(turn_at(0, Role::System, "sys", 10));
        ctx.add_turn(turn_at(1, Role::User, "small", 5));
        ctx.add_turn(turn_at(2, Role::User, "huge", 50));
        ctx.add_turn(turn_at(3, Role::User, "q", 10));
        ctx.add_turn(turn_at(4, Role::Assistant, "a", 10));

        let slice = ctx.get(Some(40));
        assert_eq!(contents(&slice), vec!["sys", "small", "q", "a"]);
    }

    #[test]
    fn test_protected_turns_exceeding_cap_are_still_returned() {
        let mut ctx = BoundedContext::new(1000);
        ctx.add_turn(turn_at(0, Role::System, "sys", 30));
        ctx.add_turn(turn_at(1, Role::User, "mid", 1));
        ctx.add_turn(turn_at(2, Role::User, "q", 30));
        ctx.add_turn(turn_at(3, Role::Assistant, "a", 30));

        assert_eq!(contents(&ctx.get(Some(10))), vec!["sys", "q", "a"]);
    }

    #[test]
    fn test_set_importance_bounds() {
        let mut ctx = BoundedContext::new(100);
        ctx.add(Role::User, "hello", None);

        assert!(ctx.set_importance(0, 9.0));
        assert_eq!(ctx.turns()[0].importance, 2.0);
        assert!(ctx.set_importance(0, -1.0));
        assert_eq!(ctx.turns()[0].importance, 0.0);
        assert!(!ctx.set_importance(5, 1.0));
    }

    #[test]
    fn test_nan_importance_is_rejected() {
        let mut ctx = BoundedContext::new(100);
        ctx.add(Role::User, "hello", None);
        assert!(ctx.set_importance(0, 1.5));

        assert!(!ctx.set_importance(0, f64::NAN));
        assert_eq!(ctx.turns()[0].importance, 1.5);

        let replayed = turn_at(1, Role::User, "replayed", 1).with_importance(f64::NAN);
        ctx.add_turn(replayed);
        assert_eq!(ctx.turns()[1].importance, 1.0);
        assert!(ctx.turns().iter().all(|t| t.importance.is_finite()));
    }

    #[test]
    fn test_huge_token_counts_do_not_overflow() {
        let mut ctx = BoundedContext::new(100);
        ctx.add(Role::System, "sys", Some(u32::MAX));
        ctx.add(Role::User, "hi", Some(1));

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.token_count(), u64::from(u32::MAX) + 1);
        assert_eq!(ctx.usage().total, u64::from(u32::MAX) + 1);
        assert_eq!(ctx.budget(0.8, 0.95).status(), "critical");
        assert_eq!(ctx.budget(0.8, 0.95).remaining(), 0);
        assert_eq!(contents(&ctx.get(Some(50))), vec!["sys", "hi"]);
        assert!(ctx.summarize().contains("4294967296"));
    }

    #[test]
    fn test_clear() {
        let mut ctx = BoundedContext::new(100);
        ctx.add(Role::User, "hello", Some(10));
        ctx.clear();

        assert!(ctx.is_empty());
        assert_eq!(ctx.token_count(), 0);
        assert_eq!(ctx.state(), ContextState::Cleared);

        ctx.add(Role::User, "again", Some(1));
        assert_eq!(ctx.state(), ContextState::Accumulating);
    }

    #[test]
    fn test_summarize_and_budget() {
        let mut ctx = BoundedContext::new(100);
        assert!(ctx.summarize().starts_with("Empty conversation"));

        ctx.add(Role::System, "be brief", Some(10));
        ctx.add(Role::User, "hi", Some(30));
        ctx.add(Role::Assistant, "hello", Some(45));

        let summary = ctx.summarize();
        assert!(summary.contains("3 turns"));
        assert!(summary.contains("1 user, 1 assistant, 1 system"));
        assert!(summary.contains("~85 tokens"));

        let budget = ctx.budget(0.8, 0.95);
        assert_eq!(budget.status(), "warning");
        assert_eq!(budget.remaining(), 15);
    }

    #[test]
    fn test_custom_policy() {
        let policy = CompressionPolicy {
            target_ratio: 0.5,
            protected_tail: 1,
            min_retained: 2,
            ..Default::default()
        };
        let mut ctx = BoundedContext::with_policy(100, policy);
        for i in 0..6 {
            ctx.add_turn(turn_at(i, Role::User, &format!("t{}", i), 20));
        }

        assert!(ctx.token_count() <= 50);
        let kept = ctx.get(None);
        assert_eq!(kept.first().unwrap().content, "t0");
        assert_eq!(kept.last().unwrap().content, "t5");
    }
}
