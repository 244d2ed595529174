// 🔢 Numeric Normalizer
// Currency ("1.234,56") and duration ("12:30hs") parsing for payroll exports.
// Every function here is total: bad input collapses to 0.0 / "00:00".

use std::collections::{BTreeMap, HashMap};

// ============================================================================
// PARSING
// ============================================================================

/// Parse a currency value written with "." thousands and "," decimals
///
/// "1.234,56" → 1234.56, "-80,00" → -80.0. Anything unparsable → 0.0.
pub fn parse_currency(text: &str) -> f64 {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Parse an "HH:MM" duration (optional "hs" suffix) into decimal hours
///
/// "12:30hs" → 12.5. Missing colon, extra colons or non-digits → 0.0.
pub fn parse_duration(text: &str) -> f64 {
    let lowered = text.trim().to_lowercase();
    let without_unit = lowered.strip_suffix("hs").unwrap_or(&lowered);
    let compact: String = without_unit.chars().filter(|c| !c.is_whitespace()).collect();

    let mut parts = compact.split(':');
    let (hours, minutes) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), None) => (h, m),
        _ => return 0.0,
    };

    match (hours.parse::<u32>(), minutes.parse::<u32>()) {
        (Ok(h), Ok(m)) => h as f64 + m as f64 / 60.0,
        _ => 0.0,
    }
}

/// Format decimal hours as "HH:MM", truncating to whole minutes
pub fn format_duration(decimal_hours: f64) -> String {
    if !decimal_hours.is_finite() || decimal_hours < 0.0 {
        return "00:00".to_string();
    }

    // Small epsilon so 7/60 * 60 = 6.9999.. still lands on minute 7
    let total_minutes = (decimal_hours * 60.0 + 1e-9).floor() as u64;
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}

// ============================================================================
// VALUE CACHE
// ============================================================================

/// Bounded least-recently-used cache from raw text to parsed value
///
/// The same currency/duration strings repeat thousands of times in one export,
/// so each parser instance keeps one of these per field kind.
#[derive(Debug, Clone)]
pub struct NumericCache {
    capacity: usize,
    entries: HashMap<String, (f64, u64)>,
    recency: BTreeMap<u64, String>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl NumericCache {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        NumericCache {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn get_or_insert_with(&mut self, key: &str, compute: impl FnOnce(&str) -> f64) -> f64 {
        self.tick += 1;
        let tick = self.tick;

        if let Some((value, last_used)) = self.entries.get_mut(key) {
            self.recency.remove(last_used);
            *last_used = tick;
            self.recency.insert(tick, key.to_string());
            self.hits += 1;
            return *value;
        }

        self.misses += 1;
        let value = compute(key);

        if self.entries.len() >= self.capacity {
            if let Some((_, oldest)) = self.recency.pop_first() {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(key.to_string(), (value, tick));
        self.recency.insert(tick, key.to_string());
        value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

// ============================================================================
// TESTS
// ============================================================================
