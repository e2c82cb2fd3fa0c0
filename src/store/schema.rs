pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    market TEXT NOT NULL,
    have TEXT NOT NULL,
    want TEXT NOT NULL,
    listings_json TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (market, have, want)
);

CREATE INDEX IF NOT EXISTS idx_cache_expiry
ON cache_entries(expires_at);

CREATE TABLE IF NOT EXISTS price_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market TEXT NOT NULL,
    have TEXT NOT NULL,
    want TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    best_rate REAL NOT NULL,
    avg_rate REAL NOT NULL,
    median_rate REAL NOT NULL,
    listing_count INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_pair
ON price_snapshots(market, have, want, timestamp);

CREATE INDEX IF NOT EXISTS idx_snapshots_time
ON price_snapshots(timestamp);
"#;
