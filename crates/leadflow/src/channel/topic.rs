/// Topic-pattern matching for routing keys.
///
/// Patterns are dot-separated words where `*` matches exactly one word and
/// `#` matches zero or more words, so `leadlist.*` matches
/// `leadlist.created` but not `leadlist.created.eu`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pat: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_from(&pat, &key)
}

fn matches_from(pat: &[&str], key: &[&str]) -> bool {
    match pat.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            // '#' may swallow any suffix of the key, including nothing.
            (0..=key.len()).any(|n| matches_from(rest, &key[n..]))
        }
        Some((&"*", rest)) => match key.split_first() {
            Some((_, key_rest)) => matches_from(rest, key_rest),
            None => false,
        },
        Some((word, rest)) => match key.split_first() {
            Some((k, key_rest)) if k == word => matches_from(rest, key_rest),
            _ => false,
        },
    }
}
