//! Search query composition
//!
//! Basic search is built from a minimum attachment size and an optional set
//! of labels; advanced search passes the user's text through untouched.

/// Build a basic search query
///
/// `has:attachment size:10m {label:"Work" label:"Receipts"}` matches
/// messages with an attachment, at least `min_size_mb` megabytes, carrying
/// any of `labels`. An empty label list searches every label.
pub fn compose_basic_query<S: AsRef<str>>(min_size_mb: u64, labels: &[S]) -> String {
    let mut query = format!("has:attachment size:{}m", min_size_mb);

    let labels: Vec<String> = labels
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .map(|l| format!("label:\"{}\"", l.replace('"', "")))
        .collect();
    if !labels.is_empty() {
        query.push_str(&format!(" {{{}}}", labels.join(" ")));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_only() {
        let labels: [&str; 0] = [];
        assert_eq!(compose_basic_query(10, &labels), "has:attachment size:10m");
    }

    #[test]
    fn test_labels_match_any() {
        assert_eq!(
            compose_basic_query(5, &["Work", "Old receipts"]),
            "has:attachment size:5m {label:\"Work\" label:\"Old receipts\"}"
        );
    }

    #[test]
    fn test_blank_labels_are_skipped() {
        let labels = vec!["  ".to_string(), "Work".to_string()];
        assert_eq!(
            compose_basic_query(1, &labels),
            "has:attachment size:1m {label:\"Work\"}"
        );
    }
}
