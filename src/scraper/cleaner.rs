use chrono::NaiveDate;

const SOLD_PREFIX: &str = "Sold on ";

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse a sold-date label.
/// "Sold on 12 Mar 2024" → 2024-03-12 | "Sold on 3 September 2021" → 2021-09-03
pub fn parse_sold_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let s = s.strip_prefix(SOLD_PREFIX).unwrap_or(s).trim();
    if s.is_empty() {
        return None;
    }

    let joined = s.split_whitespace().collect::<Vec<_>>().join("-");

    if let Ok(d) = NaiveDate::parse_from_str(&joined, "%d-%b-%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&joined, "%d-%B-%Y") {
        return Some(d);
    }

    None
}

/// Parse a whole-dollar price: strip `$` and thousands separators.
/// "$1,250,000" → 1250000 | "Contact agent" → None
pub fn parse_price(s: &str) -> Option<i64> {
    let s = s.trim();
    let s = s.strip_prefix('$').unwrap_or(s);
    let cleaned = s.replace(',', "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Parse a bed/bath/car count. "3" → 3 | " 2 " → 2 | "-" → None
pub fn parse_count(s: &str) -> Option<u32> {
    s.trim().parse().ok()
}

/// Key used to deduplicate geocoding lookups.
pub fn address_key(s: &str) -> Option<String> {
    let key = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if key.is_empty() { None } else { Some(key) }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
