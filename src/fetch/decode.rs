use serde_json::Value;

use crate::market::Listing;

/// Turn an exchange search response into listings sorted by rate, keeping at most `depth`
/// (and at least one slot).
///
/// `result` may be an object keyed by listing id or a plain array. Entries without an offer, or
/// with a non-numeric or zero amount, are skipped.
pub fn summarize_exchange(data: &Value, depth: usize) -> Vec<Listing> {
    let nodes: Vec<&Value> = match data.get("result") {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(items)) => items.iter().collect(),
        _ => return Vec::new(),
    };

    let mut listings: Vec<Listing> = nodes.into_iter().filter_map(decode_listing).collect();
    listings.sort_by(|a, b| a.rate.total_cmp(&b.rate));
    listings.truncate(depth.max(1));
    listings
}

fn decode_listing(node: &Value) -> Option<Listing> {
    let listing = node.get("listing")?;
    let offer = listing.get("offers")?.as_array()?.first()?;
    let exchange = offer.get("exchange")?;
    let item = offer.get("item")?;

    let have_amount = exchange.get("amount")?.as_f64()?;
    let want_amount = match item.get("amount") {
        None | Some(Value::Null) => 1.0,
        Some(value) => value.as_f64()?,
    };
    if want_amount == 0.0 {
        return None;
    }
    let rate = round6(have_amount / want_amount);

    let account = listing.get("account");
    let seller = account
        .and_then(|account| non_empty_str(account, "lastCharacterName"))
        .or_else(|| account.and_then(|account| non_empty_str(account, "name")));

    Some(Listing {
        rate,
        have_currency: currency(exchange),
        have_amount,
        want_currency: currency(item),
        want_amount,
        stock: item.get("stock").and_then(Value::as_i64),
        seller,
        whisper: non_empty_str(listing, "whisper"),
        indexed: non_empty_str(listing, "indexed"),
    })
}

fn currency(side: &Value) -> String {
    match side.get("currency") {
        Some(Value::String(code)) => code.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
