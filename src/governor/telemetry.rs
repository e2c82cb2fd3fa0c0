use reqwest::header::HeaderMap;
use serde::Serialize;

pub const RETRY_AFTER: &str = "retry-after";
pub const RULES_HEADER: &str = "x-rate-limit-rules";

/// One `current:limit:reset` triple reported for a named upstream rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleState {
    pub rule: String,
    pub current: i64,
    pub limit: i64,
    pub reset_secs: i64,
}

impl RuleState {
    pub fn ratio(&self) -> f64 {
        if self.limit <= 0 {
            return 0.0;
        }
        self.current as f64 / self.limit as f64
    }

    /// Whether further requests are rejected until the window resets.
    pub fn is_exhausted(&self) -> bool {
        self.current >= self.limit && self.reset_secs > 0
    }
}

/// Parse a `X-Rate-Limit-<Rule>-State` value, skipping malformed triples.
pub fn parse_state_header(rule: &str, raw: &str) -> Vec<RuleState> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let pieces: Vec<&str> = part.split(':').collect();
            let [current, limit, reset] = pieces.as_slice() else {
                return None;
            };
            Some(RuleState {
                rule: rule.to_string(),
                current: current.trim().parse().ok()?,
                limit: limit.trim().parse().ok()?,
                reset_secs: reset.trim().parse().ok()?,
            })
        })
        .collect()
}

/// Positive `Retry-After` seconds, if present and parseable.
pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
}

/// Rule names announced by the upstream, extended with the defaults it may omit.
pub fn rule_names(headers: &HeaderMap, defaults: &[String]) -> Vec<String> {
    let mut names: Vec<String> = headers
        .get(RULES_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for candidate in defaults {
        if !names.iter().any(|name| name.eq_ignore_ascii_case(candidate)) {
            names.push(candidate.clone());
        }
    }
    names
}

/// Collect every parseable rule triple from a response.
pub fn collect_rule_states(headers: &HeaderMap, defaults: &[String]) -> Vec<RuleState> {
    let mut states = Vec::new();
    for rule in rule_names(headers, defaults) {
        let header_name = format!("x-rate-limit-{}-state", rule.to_ascii_lowercase());
        let Some(raw) = headers
            .get(header_name.as_str())
            .and_then(|value| value.to_str().ok())
        else {
            continue;
        };
        let parsed = parse_state_header(&rule, raw);
        if parsed.is_empty() {
            log::debug!("Ignoring unparseable rate limit state for {rule}: {raw}");
        }
        states.extend(parsed);
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn defaults() -> Vec<String> {
        vec!["Ip".to_string(), "Account".to_string()]
    }

    #[test]
    fn parses_triples_and_skips_garbage() {
        let states = parse_state_header("Ip", "1:15:0, 0:90:14,bad,4:5,40:300:1555,x:1:2");

        assert_eq!(states.len(), 3);
        assert_eq!(
            states[2],
            RuleState {
                rule: "Ip".to_string(),
                current: 40,
                limit: 300,
                reset_secs: 1555,
            }
        );
    }

    #[test]
    fn falls_back_to_default_rules() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-rules", HeaderValue::from_static("Account"));
        headers.insert("x-rate-limit-ip-state", HeaderValue::from_static("2:10:5"));
        headers.insert("x-rate-limit-account-state", HeaderValue::from_static("1:5:10"));

        assert_eq!(rule_names(&headers, &defaults()), vec!["Account", "Ip"]);

        let states = collect_rule_states(&headers, &defaults());
        assert_eq!(states.len(), 2);
        assert!(states.iter().any(|state| state.rule == "Ip" && state.current == 2));
    }

    #[test]
    fn retry_after_must_be_positive_integer() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("0"));
        assert_eq!(retry_after_secs(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(retry_after_secs(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("12"));
        assert_eq!(retry_after_secs(&headers), Some(12));
    }

    #[test]
    fn exhausted_requires_positive_reset() {
        let state = |current, limit, reset_secs| RuleState {
            rule: "Ip".to_string(),
            current,
            limit,
            reset_secs,
        };

        assert!(state(15, 15, 60).is_exhausted());
        assert!(!state(15, 15, 0).is_exhausted());
        assert!(!state(45, 300, 3).is_exhausted());
        assert!((state(12, 15, 60).ratio() - 0.8).abs() < 1e-9);
    }
}
