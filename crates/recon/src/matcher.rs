use std::collections::{BTreeMap, BTreeSet};

use crate::identity::{clean_id, TitleYearKey};
use crate::model::{CompareRow, MatchMethod, MatchedPair, PairMatchOutput};

/// Pair each A row, in date order, with the unused B row closest in date.
/// Ties go to the earlier B row. Returns `(a, b)` positions into the slices.
fn pair_closest(a: &[&CompareRow], b: &[&CompareRow]) -> Vec<(usize, usize)> {
    let mut a_order: Vec<usize> = (0..a.len()).collect();
    a_order.sort_by_key(|&i| (a[i].date, a[i].index));

    let mut b_used = vec![false; b.len()];
    let mut pairs = Vec::new();

    for ai in a_order {
        let best = b
            .iter()
            .enumerate()
            .filter(|(bi, _)| !b_used[*bi])
            .min_by_key(|(_, row)| ((a[ai].date - row.date).num_days().abs(), row.date, row.index))
            .map(|(bi, _)| bi);

        if let Some(bi) = best {
            b_used[bi] = true;
            pairs.push((ai, bi));
        }
    }
    pairs
}

fn pair(a: &CompareRow, b: &CompareRow, method: MatchMethod) -> MatchedPair {
    MatchedPair {
        a: a.clone(),
        b: b.clone(),
        method,
        date_offset_days: (a.date - b.date).num_days(),
    }
}

/// Title/year keys that resolve to two or more distinct identifiers across
/// both datasets.
fn ambiguous_keys(a: &[CompareRow], b: &[CompareRow]) -> BTreeSet<TitleYearKey> {
    let mut ids: BTreeMap<TitleYearKey, BTreeSet<String>> = BTreeMap::new();
    for row in a.iter().chain(b) {
        if let Some(id) = clean_id(row.content_id.as_deref()) {
            ids.entry(TitleYearKey::new(&row.title, row.year))
                .or_default()
                .insert(id);
        }
    }
    ids.into_iter()
        .filter(|(_, set)| set.len() > 1)
        .map(|(key, _)| key)
        .collect()
}

/// Match two datasets: exact identifier first, then normalized title/year.
/// Every row lands in exactly one of matched / only / ambiguous.
pub fn match_rows(a: &[CompareRow], b: &[CompareRow]) -> PairMatchOutput {
    let mut a_used = vec![false; a.len()];
    let mut b_used = vec![false; b.len()];
    let mut matched = Vec::new();

    // Identifier pass
    let mut by_id: BTreeMap<String, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, row) in a.iter().enumerate() {
        if let Some(id) = clean_id(row.content_id.as_deref()) {
            by_id.entry(id).or_default().0.push(i);
        }
    }
    for (i, row) in b.iter().enumerate() {
        if let Some(id) = clean_id(row.content_id.as_deref()) {
            by_id.entry(id).or_default().1.push(i);
        }
    }
    for (ai_list, bi_list) in by_id.values() {
        if ai_list.is_empty() || bi_list.is_empty() {
            continue;
        }
        let a_rows: Vec<&CompareRow> = ai_list.iter().map(|&i| &a[i]).collect();
        let b_rows: Vec<&CompareRow> = bi_list.iter().map(|&i| &b[i]).collect();
        for (x, y) in pair_closest(&a_rows, &b_rows) {
            a_used[ai_list[x]] = true;
            b_used[bi_list[y]] = true;
            matched.push(pair(a_rows[x], b_rows[y], MatchMethod::Identifier));
        }
    }

    // Title/year pass over what is left
    let ambiguous = ambiguous_keys(a, b);
    let mut ambiguous_a = Vec::new();
    let mut ambiguous_b = Vec::new();
    let mut by_key: BTreeMap<TitleYearKey, (Vec<usize>, Vec<usize>)> = BTreeMap::new();

    let free_a: Vec<usize> = (0..a.len()).filter(|&i| !a_used[i]).collect();
    for i in free_a {
        let row = &a[i];
        let key = TitleYearKey::new(&row.title, row.year);
        let has_id = clean_id(row.content_id.as_deref()).is_some();
        if ambiguous.contains(&key) {
            if !has_id {
                a_used[i] = true;
                ambiguous_a.push(row.clone());
            }
            continue;
        }
        by_key.entry(key).or_default().0.push(i);
    }
    let free_b: Vec<usize> = (0..b.len()).filter(|&i| !b_used[i]).collect();
    for i in free_b {
        let row = &b[i];
        let key = TitleYearKey::new(&row.title, row.year);
        let has_id = clean_id(row.content_id.as_deref()).is_some();
        if ambiguous.contains(&key) {
            if !has_id {
                b_used[i] = true;
                ambiguous_b.push(row.clone());
            }
            continue;
        }
        by_key.entry(key).or_default().1.push(i);
    }

    // A non-ambiguous key carries at most one identifier, so any pairing
    // inside it never joins two different ids.
    for (ai_list, bi_list) in by_key.values() {
        if ai_list.is_empty() || bi_list.is_empty() {
            continue;
        }
        let a_rows: Vec<&CompareRow> = ai_list.iter().map(|&i| &a[i]).collect();
        let b_rows: Vec<&CompareRow> = bi_list.iter().map(|&i| &b[i]).collect();
        for (x, y) in pair_closest(&a_rows, &b_rows) {
            a_used[ai_list[x]] = true;
            b_used[bi_list[y]] = true;
            matched.push(pair(a_rows[x], b_rows[y], MatchMethod::TitleYear));
        }
    }

    matched.sort_by_key(|p| (p.a.date, p.a.index));

    let a_only = a
        .iter()
        .enumerate()
        .filter(|(i, _)| !a_used[*i])
        .map(|(_, r)| r.clone())
        .collect();
    let b_only = b
        .iter()
        .enumerate()
        .filter(|(i, _)| !b_used[*i])
        .map(|(_, r)| r.clone())
        .collect();

    PairMatchOutput {
        matched,
        a_only,
        b_only,
        ambiguous_a,
        ambiguous_b,
    }
}
