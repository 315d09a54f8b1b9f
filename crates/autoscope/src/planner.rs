use autoscope_core::{
    driver::{Prefixes, RelationPath},
    stats::{max_key, TableQueryStats},
    stmt::Formula,
};
use std::collections::HashMap;

/// Discovers the relational prefixes referenced by a selection.
///
/// Every identifier is split on `__`; for each strict prefix, the target
/// table is the argmax of the source table's foreign-key histogram for
/// that segment. An empty histogram infers no target, which downstream
/// planning routes through the unassigned table.
pub(crate) fn gen_prefixes(
    stats: &HashMap<String, TableQueryStats>,
    start_table: &str,
    selection: &Formula,
) -> Prefixes {
    let mut prefixes = Prefixes::new();

    for ident in selection.attrs() {
        if !ident.contains("__") {
            continue;
        }
        let parts: Vec<&str> = ident.split("__").collect();

        let mut current = start_table.to_lowercase();
        for depth in 0..parts.len() - 1 {
            let prefix = format!("__{}", parts[..=depth].join("__"));
            let from_prefix = if depth == 0 {
                "__root".to_string()
            } else {
                format!("__{}", parts[..depth].join("__"))
            };

            let target = stats
                .get(&current)
                .and_then(|ts| ts.foreign_key_count.get(parts[depth]))
                .map(max_key)
                .unwrap_or_default();

            prefixes.entry(prefix).or_insert_with(|| RelationPath {
                table: target.clone(),
                from_table: current.clone(),
                from_table_prefix: from_prefix,
                from_field: parts[depth].to_string(),
            });

            current = target;
        }
    }

    prefixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscope_core::stmt::AttrSelection;

    fn stats_linking(links: &[(&str, &str, &str)]) -> HashMap<String, TableQueryStats> {
        let mut stats: HashMap<String, TableQueryStats> = HashMap::new();
        for (table, field, target) in links {
            stats
                .entry(table.to_string())
                .or_default()
                .record_foreign_key(field, target);
        }
        stats
    }

    #[test]
    fn single_hop() {
        let stats = stats_linking(&[("rtest_1", "a", "rtest_2")]);
        let selection = Formula::Attr(AttrSelection::new("a__a", "=", "b"));

        let prefixes = gen_prefixes(&stats, "rtest_1", &selection);
        assert_eq!(prefixes.len(), 1);
        let path = &prefixes["__a"];
        assert_eq!(path.table, "rtest_2");
        assert_eq!(path.from_table, "rtest_1");
        assert_eq!(path.from_table_prefix, "__root");
        assert_eq!(path.from_field, "a");
    }

    #[test]
    fn chained_hops() {
        let stats = stats_linking(&[("rtest_1", "a", "rtest_2"), ("rtest_2", "b", "rtest_3")]);
        let selection = Formula::Attr(AttrSelection::new("a__b__a", "=", "b"));

        let prefixes = gen_prefixes(&stats, "rtest_1", &selection);
        assert_eq!(prefixes.len(), 2);
        assert_eq!(prefixes["__a"].table, "rtest_2");
        let hop = &prefixes["__a__b"];
        assert_eq!(hop.table, "rtest_3");
        assert_eq!(hop.from_table, "rtest_2");
        assert_eq!(hop.from_table_prefix, "__a");
        assert_eq!(hop.from_field, "b");
    }

    #[test]
    fn unknown_link_infers_no_target() {
        let stats = HashMap::new();
        let selection = Formula::Attr(AttrSelection::new("ghost__name", "=", "name"));

        let prefixes = gen_prefixes(&stats, "events", &selection);
        assert_eq!(prefixes["__ghost"].table, "");
    }

    #[test]
    fn argmax_picks_most_observed_target() {
        let mut stats = stats_linking(&[("events", "venue", "halls")]);
        for _ in 0..3 {
            stats
                .get_mut("events")
                .unwrap()
                .record_foreign_key("venue", "venues");
        }
        let selection = Formula::Attr(AttrSelection::new("venue__name", "=", "name"));

        let prefixes = gen_prefixes(&stats, "events", &selection);
        assert_eq!(prefixes["__venue"].table, "venues");
    }
}
