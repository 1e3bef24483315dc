//! Locating embedded `${...}` expression spans inside scalar text.

use crate::tree::Span;

/// A `${...}` span inside scalar text, end exclusive and including the
/// closing brace. Offsets are relative to the scanned text.
pub type ExpressionRange = Span;

/// Find all embedded expression spans in `text`.
///
/// A `$` escaped by an odd number of preceding backslashes does not open
/// an expression. Inside an expression, braces nested in single or double
/// quotes do not count toward the brace depth, and a backslash escapes the
/// next character uniformly. An unterminated expression produces no range
/// and ends the scan.
pub fn find_expression_ranges(text: &str) -> Vec<ExpressionRange> {
    let bytes = text.as_bytes();
    let n = bytes.len();
    let mut out = Vec::new();
    let mut i = 0;

    while i + 1 < n {
        let Some(start) = index_of_unescaped_open(bytes, i) else {
            break;
        };

        let mut j = start + 2;
        let mut depth = 1usize;
        let mut in_single = false;
        let mut in_double = false;
        let mut escape = false;
        let mut closed = false;

        while j < n {
            let c = bytes[j];

            if escape {
                escape = false;
                j += 1;
                continue;
            }
            if c == b'\\' {
                escape = true;
                j += 1;
                continue;
            }

            // quotes toggle only when the other kind is not active
            if c == b'\'' && !in_double {
                in_single = !in_single;
                j += 1;
                continue;
            }
            if c == b'"' && !in_single {
                in_double = !in_double;
                j += 1;
                continue;
            }

            if !in_single && !in_double {
                if c == b'{' {
                    depth += 1;
                } else if c == b'}' {
                    depth -= 1;
                    if depth == 0 {
                        out.push(Span::new(start, j + 1));
                        j += 1;
                        closed = true;
                        break;
                    }
                }
            }

            j += 1;
        }

        if !closed {
            // unterminated expression: stop scanning
            break;
        }
        i = j;
    }

    out
}

/// Whether `text` contains at least one complete embedded expression.
pub fn contains_expression(text: &str) -> bool {
    !find_expression_ranges(text).is_empty()
}

/// Next `${` whose `$` is not escaped by an odd run of backslashes.
fn index_of_unescaped_open(bytes: &[u8], from: usize) -> Option<usize> {
    let mut idx = from;
    while idx + 1 < bytes.len() {
        if bytes[idx] == b'$' && bytes[idx + 1] == b'{' {
            if !is_escaped(bytes, idx) {
                return Some(idx);
            }
            idx += 1;
        } else {
            idx += 1;
        }
    }
    None
}

fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    let mut backslashes = 0;
    let mut i = pos;
    while i > 0 && bytes[i - 1] == b'\\' {
        backslashes += 1;
        i -= 1;
    }
    backslashes % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_expression() {
        let ranges = find_expression_ranges("a ${x} b");
        assert_eq!(ranges, vec![Span::new(2, 6)]);
    }

    #[test]
    fn escaped_dollar_is_not_an_expression() {
        assert!(find_expression_ranges("a \\${x} b").is_empty());
        // double backslash: the backslash is escaped, not the dollar
        assert_eq!(find_expression_ranges("a \\\\${x} b").len(), 1);
    }

    #[test]
    fn nested_braces_do_not_split() {
        let text = "${foo({a:1})}";
        let ranges = find_expression_ranges(text);
        assert_eq!(ranges, vec![Span::new(0, text.len())]);
    }

    #[test]
    fn braces_inside_quotes_are_ignored() {
        let text = "${fn('}')}";
        let ranges = find_expression_ranges(text);
        assert_eq!(ranges, vec![Span::new(0, text.len())]);

        let text = "${fn(\"{'\")}";
        let ranges = find_expression_ranges(text);
        assert_eq!(ranges, vec![Span::new(0, text.len())]);
    }

    #[test]
    fn escape_applies_inside_quotes() {
        let text = "${fn('\\'}')}";
        let ranges = find_expression_ranges(text);
        assert_eq!(ranges, vec![Span::new(0, text.len())]);
    }

    #[test]
    fn unterminated_expression_produces_nothing() {
        assert!(find_expression_ranges("${x").is_empty());
        // a complete range before the unterminated one survives
        let ranges = find_expression_ranges("${a} ${b");
        assert_eq!(ranges, vec![Span::new(0, 4)]);
    }

    #[test]
    fn multiple_expressions() {
        let ranges = find_expression_ranges("${a}-${b}");
        assert_eq!(ranges, vec![Span::new(0, 4), Span::new(5, 9)]);
    }

    #[test]
    fn empty_and_plain_text() {
        assert!(find_expression_ranges("").is_empty());
        assert!(find_expression_ranges("plain").is_empty());
        assert!(find_expression_ranges("$").is_empty());
    }
}
