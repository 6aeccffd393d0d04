//! Natural ordering for path-like entry names.
//!
//! Comic pages are almost never zero-padded consistently: `page2.jpg` must sort
//! before `page10.jpg`, and `Chapter 9/01.jpg` before `Chapter 10/01.jpg`. A
//! plain string sort gets both wrong.
//!
//! [`natural_cmp`] compares two paths component by component (splitting on
//! `/` and `\`). Within a component, runs of ASCII digits are compared by
//! numeric value and everything else is compared case-insensitively:
//!
//! - `"page1.jpg"` < `"page2.jpg"` < `"page10.jpg"`
//! - `"vol 2/p1.jpg"` < `"vol 10/p1.jpg"`
//! - `"a.jpg"` < `"B.jpg"` < `"c.jpg"`
//!
//! Ties on numeric value (`"007"` vs `"7"`) and on case are broken so the order
//! stays total: fewer leading zeros first, then a byte-wise comparison.

use std::cmp::Ordering;

/// A run of characters within a single path component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(component: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (pos, ch) in component.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match in_digits {
            Some(current) if current != is_digit => {
                out.push(make_chunk(&component[start..pos], current));
                start = pos;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(current) = in_digits {
        out.push(make_chunk(&component[start..], current));
    }
    out
}

fn make_chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits { Chunk::Digits(s) } else { Chunk::Text(s) }
}

/// Compare two digit runs by numeric value without parsing (no overflow on
/// absurdly long runs).
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    let lower = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    lower.then_with(|| a.cmp(b))
}

fn cmp_component(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => cmp_text(x, y),
            // Numbers sort before words at the same position
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

/// Total order over path-like strings that treats embedded numbers numerically.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut pa = a.split(['/', '\\']).filter(|c| !c.is_empty());
    let mut pb = b.split(['/', '\\']).filter(|c| !c.is_empty());
    loop {
        match (pa.next(), pb.next()) {
            (Some(x), Some(y)) => {
                let ord = cmp_component(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            // Same components, possibly different separators
            (None, None) => return a.cmp(b),
        }
    }
}

/// Sort items in place by their name with [`natural_cmp`].
///
/// The sort is stable, so items with equal names keep their order.
pub fn sort_natural<T>(items: &mut [T], name: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| natural_cmp(name(a), name(b)));
}

/// Split an archive member or relative path into `(grouping path, file name)`.
///
/// The grouping path is the parent directory with separators normalized to
/// `/`; entries at the root get an empty grouping path.
pub fn split_member_path(path: &str) -> (String, String) {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(input: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = input.iter().map(|s| s.to_string()).collect();
        sort_natural(&mut v, |s| s.as_str());
        v
    }

    #[test]
    fn numeric_runs_sort_by_value() {
        assert_eq!(
            sorted(&["page1.jpg", "page10.jpg", "page2.jpg"]),
            vec!["page1.jpg", "page2.jpg", "page10.jpg"]
        );
    }

    #[test]
    fn directories_compare_numerically_too() {
        assert_eq!(
            sorted(&["vol 10/p1.jpg", "vol 2/p9.jpg", "vol 2/p10.jpg"]),
            vec!["vol 2/p9.jpg", "vol 2/p10.jpg", "vol 10/p1.jpg"]
        );
    }

    #[test]
    fn text_is_case_insensitive() {
        assert_eq!(
            sorted(&["c.jpg", "B.jpg", "a.jpg"]),
            vec!["a.jpg", "B.jpg", "c.jpg"]
        );
    }

    #[test]
    fn leading_zeros_tie_break() {
        assert_eq!(natural_cmp("007.jpg", "7.jpg"), Ordering::Greater);
        assert_eq!(natural_cmp("7.jpg", "007.jpg"), Ordering::Less);
        assert_eq!(natural_cmp("007.jpg", "008.jpg"), Ordering::Less);
    }

    #[test]
    fn parent_files_before_deeper_paths_with_same_prefix() {
        assert_eq!(natural_cmp("a", "a/b.jpg"), Ordering::Less);
    }

    #[test]
    fn huge_numbers_do_not_overflow() {
        let a = "p99999999999999999999999999.jpg";
        let b = "p100000000000000000000000000.jpg";
        assert_eq!(natural_cmp(a, b), Ordering::Less);
    }

    #[test]
    fn equal_strings_are_equal() {
        assert_eq!(natural_cmp("x/1.png", "x/1.png"), Ordering::Equal);
    }

    #[test]
    fn split_member_path_root_entry() {
        assert_eq!(
            split_member_path("001.jpg"),
            (String::new(), "001.jpg".to_string())
        );
    }

    #[test]
    fn split_member_path_nested_with_backslashes() {
        assert_eq!(
            split_member_path("Vol 1\\Ch 2\\003.png"),
            ("Vol 1/Ch 2".to_string(), "003.png".to_string())
        );
    }
}
