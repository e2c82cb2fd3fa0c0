//! Adaptive throttling driven by the upstream's rate-limit telemetry.
//!
//! Hard blocks come from `Retry-After` or an exhausted rule and only ever grow. Soft delays
//! space requests out when a rule nears its limit and are recomputed on every response.
//! All state lives in one struct behind one mutex so derived reads never mix fields from
//! different updates.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::config::GovernorConfig;

pub mod telemetry;

pub use telemetry::{parse_state_header, RuleState};

#[derive(Debug, Default)]
struct GovernorState {
    hard_block_until: Option<Instant>,
    soft_delay_until: Option<Instant>,
    last_rules: Vec<RuleState>,
}

impl GovernorState {
    fn hard_remaining(&self, now: Instant) -> Duration {
        self.hard_block_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    fn soft_remaining(&self, now: Instant) -> Duration {
        self.soft_delay_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    fn raise_hard_block(&mut self, until: Instant) -> bool {
        match self.hard_block_until {
            Some(current) if current >= until => false,
            _ => {
                self.hard_block_until = Some(until);
                true
            }
        }
    }
}

/// Observability view of the governor, taken under a single lock acquisition.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    pub blocked: bool,
    pub block_remaining: f64,
    pub soft_remaining: f64,
    pub rules: BTreeMap<String, Vec<RuleState>>,
}

/// Process-wide gate in front of every upstream call.
pub struct RateGovernor {
    config: GovernorConfig,
    state: Mutex<GovernorState>,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GovernorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Rate governor mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Wait until neither a hard block nor a soft delay is pending.
    ///
    /// Sleeps in slices of at most `poll_cap_secs` and re-reads the state after each one, so
    /// blocks raised or expired by concurrent responses are honoured promptly.
    pub async fn wait_before_request(&self) {
        let cap = Duration::from_secs_f64(self.config.poll_cap_secs);
        loop {
            let wait = {
                let state = self.lock();
                let now = Instant::now();
                state.hard_remaining(now).max(state.soft_remaining(now))
            };

            if wait.is_zero() {
                return;
            }

            debug!("Rate governor: waiting {:?} before next request", wait);
            tokio::time::sleep(wait.min(cap)).await;
        }
    }

    /// Update throttling state from the headers of an upstream response.
    pub fn on_response(&self, headers: &HeaderMap) {
        self.on_response_at(headers, Instant::now());
    }

    pub fn on_response_at(&self, headers: &HeaderMap, now: Instant) {
        let rules = telemetry::collect_rule_states(headers, &self.config.default_rules);
        let retry_after = telemetry::retry_after_secs(headers);

        let mut state = self.lock();
        state.soft_delay_until = None;

        if let Some(secs) = retry_after {
            match now.checked_add(Duration::from_secs(secs)) {
                Some(until) => {
                    if state.raise_hard_block(until) {
                        warn!("Upstream sent Retry-After {secs}s, blocking all requests");
                    }
                }
                None => debug!("Ignoring out-of-range Retry-After {secs}s"),
            }
        }

        for rule in rules.iter().filter(|rule| rule.is_exhausted()) {
            let Some(until) = now.checked_add(Duration::from_secs(rule.reset_secs.unsigned_abs()))
            else {
                debug!(
                    "Ignoring out-of-range reset of {}s for {} rule",
                    rule.reset_secs, rule.rule
                );
                continue;
            };
            if state.raise_hard_block(until) {
                warn!(
                    "Rate limit reached for {} rule: current={} limit={}, blocking {}s",
                    rule.rule, rule.current, rule.limit, rule.reset_secs
                );
            }
        }

        let soft = self.soft_delay_for(&rules);
        if !soft.is_zero() {
            state.soft_delay_until = Some(now + soft);
            info!(
                "Applying soft throttle of {:.2}s (utilisation >= {:.2})",
                soft.as_secs_f64(),
                self.config.soft_ratio
            );
        }

        state.last_rules = rules;
    }

    /// Largest soft delay across rules that are close to, but not at, their limit.
    fn soft_delay_for(&self, rules: &[RuleState]) -> Duration {
        let secs = rules
            .iter()
            .filter(|rule| rule.reset_secs > 0 && rule.limit > 0)
            .filter(|rule| rule.ratio() >= self.config.soft_ratio && rule.current < rule.limit)
            .map(|rule| {
                (rule.reset_secs as f64 * self.config.soft_sleep_factor)
                    .clamp(self.config.soft_min_secs, self.config.soft_max_secs)
            })
            .fold(0.0_f64, f64::max);
        Duration::from_secs_f64(secs)
    }

    pub fn blocked(&self) -> bool {
        self.blocked_at(Instant::now())
    }

    pub fn blocked_at(&self, now: Instant) -> bool {
        !self.lock().hard_remaining(now).is_zero()
    }

    pub fn block_remaining(&self) -> Duration {
        self.block_remaining_at(Instant::now())
    }

    pub fn block_remaining_at(&self, now: Instant) -> Duration {
        self.lock().hard_remaining(now)
    }

    pub fn soft_remaining(&self) -> Duration {
        self.lock().soft_remaining(Instant::now())
    }

    /// The longer of the hard block and the soft delay.
    pub fn throttled_remaining(&self) -> Duration {
        let state = self.lock();
        let now = Instant::now();
        state.hard_remaining(now).max(state.soft_remaining(now))
    }

    /// Last parsed rule triples grouped by rule name. Purely informational.
    pub fn debug_state(&self) -> BTreeMap<String, Vec<RuleState>> {
        group_rules(&self.lock().last_rules)
    }

    pub fn status(&self) -> GovernorStatus {
        let state = self.lock();
        let now = Instant::now();
        let hard = state.hard_remaining(now);
        GovernorStatus {
            blocked: !hard.is_zero(),
            block_remaining: round_millis(hard),
            soft_remaining: round_millis(state.soft_remaining(now)),
            rules: group_rules(&state.last_rules),
        }
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(GovernorConfig::default())
    }
}

fn group_rules(rules: &[RuleState]) -> BTreeMap<String, Vec<RuleState>> {
    let mut grouped: BTreeMap<String, Vec<RuleState>> = BTreeMap::new();
    for rule in rules {
        grouped.entry(rule.rule.clone()).or_default().push(rule.clone());
    }
    grouped
}

fn round_millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_bytes()).expect("valid header name");
            map.insert(name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn starts_unblocked() {
        let governor = RateGovernor::default();

        assert!(!governor.blocked());
        assert_eq!(governor.block_remaining(), Duration::ZERO);
        assert!(governor.debug_state().is_empty());
    }

    #[test]
    fn exhausted_rule_blocks_until_reset() {
        let governor = RateGovernor::default();
        let t0 = Instant::now();

        governor.on_response_at(
            &headers(&[
                ("X-Rate-Limit-Rules", "Ip,Account"),
                ("X-Rate-Limit-Ip-State", "45:45:3"),
            ]),
            t0,
        );

        assert!(governor.blocked_at(t0));
        let mut previous = governor.block_remaining_at(t0);
        assert_eq!(previous, Duration::from_secs(3));
        for millis in [500, 1000, 2000, 2999, 3000, 4000] {
            let remaining = governor.block_remaining_at(t0 + Duration::from_millis(millis));
            assert!(remaining <= previous);
            previous = remaining;
        }
        assert_eq!(
            governor.block_remaining_at(t0 + Duration::from_secs(3)),
            Duration::ZERO
        );
        assert!(!governor.blocked_at(t0 + Duration::from_secs(3)));
    }

    #[test]
    fn usage_below_limit_never_hard_blocks() {
        let governor = RateGovernor::default();
        let t0 = Instant::now();

        governor.on_response_at(&headers(&[("X-Rate-Limit-Ip-State", "45:300:3")]), t0);

        assert!(!governor.blocked_at(t0));
        assert_eq!(governor.debug_state()["Ip"].len(), 1);
    }

    #[test]
    fn hard_block_never_shrinks() {
        let governor = RateGovernor::default();
        let t0 = Instant::now();

        governor.on_response_at(&headers(&[("X-Rate-Limit-Ip-State", "15:15:60")]), t0);
        governor.on_response_at(&headers(&[("X-Rate-Limit-Ip-State", "15:15:5")]), t0);

        assert_eq!(governor.block_remaining_at(t0), Duration::from_secs(60));
    }

    #[test]
    fn retry_after_blocks_regardless_of_rules() {
        let governor = RateGovernor::default();
        let t0 = Instant::now();

        governor.on_response_at(
            &headers(&[("Retry-After", "2"), ("X-Rate-Limit-Ip-State", "1:15:60")]),
            t0,
        );

        assert!(governor.blocked_at(t0 + Duration::from_millis(1999)));
        assert!(!governor.blocked_at(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn soft_throttle_is_capped_and_never_blocks() {
        let governor = RateGovernor::default();

        governor.on_response(&headers(&[("X-Rate-Limit-Ip-State", "14:15:1800")]));

        assert!(!governor.blocked());
        let soft = governor.soft_remaining();
        assert!(soft > Duration::from_secs(2));
        assert!(soft <= Duration::from_secs(3));
        assert!(governor.throttled_remaining() <= Duration::from_secs(3));
    }

    #[test]
    fn soft_throttle_has_a_floor_and_resets_each_response() {
        let governor = RateGovernor::default();

        governor.on_response(&headers(&[("X-Rate-Limit-Ip-State", "12:15:1")]));
        let soft = governor.soft_remaining();
        assert!(soft > Duration::from_millis(150) && soft <= Duration::from_millis(200));

        governor.on_response(&headers(&[("X-Rate-Limit-Ip-State", "1:15:60")]));
        assert_eq!(governor.soft_remaining(), Duration::ZERO);
    }

    #[test]
    fn status_reports_rules_by_name() {
        let governor = RateGovernor::default();
        governor.on_response(&headers(&[
            ("X-Rate-Limit-Ip-State", "1:15:10,0:90:10"),
            ("X-Rate-Limit-Account-State", "1:5:10"),
        ]));

        let status = governor.status();
        assert!(!status.blocked);
        assert_eq!(status.rules["Ip"].len(), 2);
        assert_eq!(status.rules["Account"][0].limit, 5);
    }

    #[test]
    fn out_of_range_retry_after_is_ignored() {
        let governor = RateGovernor::default();
        let t0 = Instant::now();

        governor.on_response_at(&headers(&[("Retry-After", "18446744073709551615")]), t0);

        assert!(!governor.blocked_at(t0));
        assert_eq!(governor.block_remaining_at(t0), Duration::ZERO);
    }

    #[test]
    fn out_of_range_rule_reset_is_ignored() {
        let governor = RateGovernor::default();
        let t0 = Instant::now();

        governor.on_response_at(
            &headers(&[
                ("X-Rate-Limit-Ip-State", "5:5:9223372036854775807"),
                ("X-Rate-Limit-Account-State", "3:3:4"),
            ]),
            t0,
        );

        assert_eq!(governor.block_remaining_at(t0), Duration::from_secs(4));
        assert_eq!(governor.debug_state()["Ip"][0].limit, 5);
    }

    #[tokio::test]
    async fn wait_notices_a_concurrently_cleared_delay() {
        let governor = Arc::new(RateGovernor::new(GovernorConfig {
            poll_cap_secs: 0.05,
            ..GovernorConfig::default()
        }));
        governor.on_response(&headers(&[("X-Rate-Limit-Ip-State", "14:15:1800")]));
        assert!(governor.soft_remaining() > Duration::from_secs(2));

        let clearer = Arc::clone(&governor);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            clearer.on_response(&headers(&[("X-Rate-Limit-Ip-State", "1:15:60")]));
        });

        let start = Instant::now();
        governor.wait_before_request().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(governor.throttled_remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn wait_honours_soft_delay() {
        let governor = RateGovernor::default();
        governor.on_response(&headers(&[("X-Rate-Limit-Ip-State", "12:15:1")]));

        let start = Instant::now();
        governor.wait_before_request().await;

        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(governor.throttled_remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_clear() {
        let governor = RateGovernor::default();

        let start = Instant::now();
        governor.wait_before_request().await;

        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
