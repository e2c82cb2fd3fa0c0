use std::collections::HashSet;

use crate::error::{AppError, Result};

use super::Config;

/// Validate a loaded configuration and surface every problem at once.
pub fn validate_config(config: &Config) -> Result<()> {
    let mut issues = Vec::new();

    validate_pairs(config, &mut issues);
    validate_governor(config, &mut issues);
    validate_windows(config, &mut issues);
    validate_fetch(config, &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::config(format!(
            "market `{}` config invalid:\n  - {}",
            config.market,
            issues.join("\n  - ")
        )))
    }
}

fn validate_pairs(config: &Config, issues: &mut Vec<String>) {
    if config.market.trim().is_empty() {
        issues.push("market must not be empty".to_string());
    }

    let mut seen = HashSet::new();
    for pair in &config.pairs {
        if pair.have.is_empty() || pair.want.is_empty() {
            issues.push("pairs must name both a have and a want currency".to_string());
            continue;
        }
        if pair.have == pair.want {
            issues.push(format!("pair `{}` trades a currency for itself", pair.have));
        }
        if !seen.insert((pair.have.as_str(), pair.want.as_str())) {
            issues.push(format!("pair `{}->{}` is listed twice", pair.have, pair.want));
        }
    }
}

fn validate_governor(config: &Config, issues: &mut Vec<String>) {
    let governor = &config.governor;
    if !(governor.soft_ratio > 0.0 && governor.soft_ratio <= 1.0) {
        issues.push(format!(
            "governor.soft_ratio must be within (0, 1], found {}",
            governor.soft_ratio
        ));
    }
    if governor.soft_sleep_factor < 0.0 {
        issues.push("governor.soft_sleep_factor must not be negative".to_string());
    }
    if governor.soft_min_secs < 0.0 || governor.soft_min_secs > governor.soft_max_secs {
        issues.push("governor soft sleep lower bound exceeds the upper bound".to_string());
    }
    if governor.poll_cap_secs <= 0.0 {
        issues.push("governor.poll_cap_secs must be positive".to_string());
    }
}

fn validate_windows(config: &Config, issues: &mut Vec<String>) {
    if config.cache.ttl_secs <= 0 {
        issues.push("cache.ttl_secs must be positive".to_string());
    }
    if config.history.retention_hours <= 0 {
        issues.push("history.retention_hours must be positive".to_string());
    }
    if config.history.dedup_window_secs < 0 {
        issues.push("history.dedup_window_secs must not be negative".to_string());
    }
    if config.history.sparkline_points < 2 {
        issues.push("history.sparkline_points must be at least 2".to_string());
    }
}

fn validate_fetch(config: &Config, issues: &mut Vec<String>) {
    let fetch = &config.fetch;
    if fetch.upstream_depth == 0 {
        issues.push("fetch.upstream_depth must be at least 1".to_string());
    }
    if fetch.default_top_n > fetch.upstream_depth {
        issues.push(format!(
            "fetch.default_top_n ({}) exceeds fetch.upstream_depth ({})",
            fetch.default_top_n, fetch.upstream_depth
        ));
    }
    if fetch.backoff_secs < 0.0 || fetch.stream_delay_secs < 0.0 {
        issues.push("fetch delays must not be negative".to_string());
    }
    if fetch.retries > 10 {
        issues.push("fetch.retries above 10 would hammer the upstream".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::TradePair;

    #[test]
    fn builtin_config_is_valid() {
        validate_config(&Config::builtin()).expect("builtin config should be valid");
    }

    #[test]
    fn rejects_self_pair() {
        let mut config = Config::builtin();
        config.pairs.push(TradePair::new("chaos", "chaos"));

        let err = validate_config(&config).expect_err("validation should fail");
        assert!(
            err.to_string().contains("for itself"),
            "unexpected error message: {err}"
        );
    }

    #[test]
    fn rejects_soft_ratio_out_of_range() {
        let mut config = Config::builtin();
        config.governor.soft_ratio = 1.5;

        let err = validate_config(&config).expect_err("validation should fail");
        assert!(
            err.to_string().contains("soft_ratio"),
            "unexpected error message: {err}"
        );
    }

    #[test]
    fn reports_all_issues_together() {
        let mut config = Config::builtin();
        config.cache.ttl_secs = 0;
        config.history.sparkline_points = 1;

        let message = validate_config(&config)
            .expect_err("validation should fail")
            .to_string();
        assert!(message.contains("ttl_secs"), "unexpected: {message}");
        assert!(message.contains("sparkline_points"), "unexpected: {message}");
    }
}
