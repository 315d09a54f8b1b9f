use std::collections::HashMap;

/// Per-table usage counters.
///
/// One instance lives in the engine's local (delta since last flush) map
/// and one in the global (materialized) map. All counters are monotonic
/// within a request; only a flush resets the local side.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TableQueryStats {
    pub insert_queries: i64,
    pub select_queries: i64,
    pub update_queries: i64,

    /// Field name to number of queries restricting on that field.
    pub restrictions: HashMap<String, i64>,

    /// Field name to (value type to observation count).
    pub object_field_count: HashMap<String, HashMap<String, i64>>,

    /// Field name to (referenced table to observation count).
    pub foreign_key_count: HashMap<String, HashMap<String, i64>>,
}

impl TableQueryStats {
    pub fn record_restriction(&mut self, field: &str) {
        *self.restrictions.entry(field.to_string()).or_insert(0) += 1;
    }

    pub fn record_object_field(&mut self, field: &str, value_type: &str) {
        increment(&mut self.object_field_count, field, value_type);
    }

    pub fn record_foreign_key(&mut self, field: &str, table: &str) {
        increment(&mut self.foreign_key_count, field, table);
    }

    /// Element-wise addition of `other` into `self`.
    pub fn merge(&mut self, other: &TableQueryStats) {
        self.insert_queries += other.insert_queries;
        self.select_queries += other.select_queries;
        self.update_queries += other.update_queries;
        for (field, n) in &other.restrictions {
            *self.restrictions.entry(field.clone()).or_insert(0) += n;
        }
        merge_count_map(&mut self.object_field_count, &other.object_field_count);
        merge_count_map(&mut self.foreign_key_count, &other.foreign_key_count);
    }

    /// True when a flush would have nothing to write.
    pub fn is_empty(&self) -> bool {
        self.insert_queries == 0
            && self.select_queries == 0
            && self.update_queries == 0
            && self.restrictions.values().all(|n| *n == 0)
            && self
                .object_field_count
                .values()
                .all(|m| m.values().all(|n| *n == 0))
            && self
                .foreign_key_count
                .values()
                .all(|m| m.values().all(|n| *n == 0))
    }
}

/// Increments the count at `m[k1][k2]`, creating levels as needed.
pub fn increment(m: &mut HashMap<String, HashMap<String, i64>>, k1: &str, k2: &str) {
    *m.entry(k1.to_string())
        .or_default()
        .entry(k2.to_string())
        .or_insert(0) += 1;
}

fn merge_count_map(
    dst: &mut HashMap<String, HashMap<String, i64>>,
    src: &HashMap<String, HashMap<String, i64>>,
) {
    for (k1, inner) in src {
        let entry = dst.entry(k1.clone()).or_default();
        for (k2, n) in inner {
            *entry.entry(k2.clone()).or_insert(0) += n;
        }
    }
}

/// Returns the key with the greatest count, or the empty string when the
/// map is empty. Callers treat the empty string as "no inferred target".
pub fn max_key(m: &HashMap<String, i64>) -> String {
    let mut best_key = String::new();
    let mut best_value = i64::MIN;
    for (k, v) in m {
        if *v > best_value || (*v == best_value && k < &best_key) {
            best_value = *v;
            best_key = k.clone();
        }
    }
    best_key
}
