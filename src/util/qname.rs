//! `QName` (qualified name) handling.
//!
//! A `QName` is a name of the form `prefix:localname` or just `localname` (with
//! no prefix). This module provides utilities for splitting and working with
//! qualified names as defined by the Namespaces in XML 1.0 recommendation.
//!
//! See <https://www.w3.org/TR/xml-names/#NT-QName>

/// Splits a `QName` into its prefix and local name parts.
///
/// Returns `(Some(prefix), localname)` if the name contains a colon,
/// or `(None, localname)` if it does not.
///
/// # Examples
///
/// ```
/// use xmlstream::util::qname::split_qname;
///
/// assert_eq!(split_qname("svg:rect"), (Some("svg"), "rect"));
/// assert_eq!(split_qname("div"), (None, "div"));
/// ```
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(pos) => (Some(&qname[..pos]), &qname[pos + 1..]),
        None => (None, qname),
    }
}

/// Returns the prefix of a qualified name, or `""` when it has none.
///
/// Serializers key namespace bindings by prefix, with the empty string
/// standing for the default namespace.
#[must_use]
pub fn prefix_of(qname: &str) -> &str {
    split_qname(qname).0.unwrap_or("")
}

/// Joins a prefix and local name, omitting the colon for an empty prefix.
#[must_use]
pub fn join_qname(prefix: &str, local_name: &str) -> String {
    if prefix.is_empty() {
        local_name.to_string()
    } else {
        format!("{prefix}:{local_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname_with_prefix() {
        assert_eq!(split_qname("xml:lang"), (Some("xml"), "lang"));
    }

    #[test]
    fn test_split_qname_without_prefix() {
        assert_eq!(split_qname("div"), (None, "div"));
    }

    #[test]
    fn test_split_qname_empty() {
        assert_eq!(split_qname(""), (None, ""));
    }

    #[test]
    fn test_split_qname_colon_at_start() {
        assert_eq!(split_qname(":local"), (Some(""), "local"));
    }

    #[test]
    fn test_split_qname_colon_at_end() {
        assert_eq!(split_qname("prefix:"), (Some("prefix"), ""));
    }

    #[test]
    fn test_split_qname_multiple_colons() {
        // Only splits on first colon
        assert_eq!(split_qname("a:b:c"), (Some("a"), "b:c"));
    }

    #[test]
    fn test_prefix_of() {
        assert_eq!(prefix_of("svg:rect"), "svg");
        assert_eq!(prefix_of("rect"), "");
    }

    #[test]
    fn test_join_qname() {
        assert_eq!(join_qname("ns0", "id"), "ns0:id");
        assert_eq!(join_qname("", "id"), "id");
    }
}
