//! Cursor-based tokenizer for attribute value expressions.
//!
//! Every scan operation advances the cursor on success and is a no-op on
//! failure, so the evaluator can parse greedily without backtracking.

use std::fmt;

/// An unsigned integer run that does not fit in an `i64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericOverflow(pub String);

impl fmt::Display for NumericOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "integer literal '{}' out of range", self.0)
    }
}

impl std::error::Error for NumericOverflow {}

/// Cursor over a short expression string.
pub struct ExpressionScanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ExpressionScanner<'a> {
    pub fn new(input: &'a str) -> Self {
        ExpressionScanner { input, pos: 0 }
    }

    /// True when the cursor has consumed all input.
    pub fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Consume one literal character. Advances only on match.
    pub fn scan_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// Scan an identifier: a letter or underscore, then letters, digits,
    /// underscores, and dots. Returns `None` without advancing when the
    /// next character cannot start an identifier.
    pub fn scan_name(&mut self) -> Option<&'a str> {
        self.scan_word(|c| c == '.')
    }

    /// Scan a filter-argument identifier: the identifier rule plus hyphens
    /// after the first character.
    pub fn scan_filter_argument(&mut self) -> Option<&'a str> {
        self.scan_word(|c| c == '.' || c == '-')
    }

    fn scan_word(&mut self, extra: impl Fn(char) -> bool) -> Option<&'a str> {
        let start = self.pos;
        let first = self.peek()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        self.pos += first.len_utf8();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || extra(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        Some(&self.input[start..self.pos])
    }

    /// Scan a maximal run of decimal digits as an `i64`.
    ///
    /// Returns `Ok(None)` without advancing when the next character is not
    /// a digit, and a numeric-overflow error when the run does not fit.
    pub fn scan_long(&mut self) -> Result<Option<i64>, NumericOverflow> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Ok(None);
        }
        let digits = &self.input[start..self.pos];
        digits
            .parse::<i64>()
            .map(Some)
            .map_err(|_| NumericOverflow(digits.to_string()))
    }

    /// Scan one arithmetic operator.
    pub fn scan_operator(&mut self) -> Option<char> {
        match self.peek() {
            Some(op @ ('+' | '-' | '*' | '/')) => {
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_char_advances_only_on_match() {
        let mut s = ExpressionScanner::new("(x");
        assert!(!s.scan_char('x'));
        assert!(s.scan_char('('));
        assert!(s.scan_char('x'));
        assert!(s.at_end());
        assert!(!s.scan_char('x'));
    }

    #[test]
    fn scan_name_accepts_identifier_chars() {
        let mut s = ExpressionScanner::new("int.with.dots+0");
        assert_eq!(s.scan_name(), Some("int.with.dots"));
        assert_eq!(s.scan_operator(), Some('+'));

        let mut s = ExpressionScanner::new("_under_score9");
        assert_eq!(s.scan_name(), Some("_under_score9"));
        assert!(s.at_end());
    }

    #[test]
    fn scan_name_rejects_leading_digit_or_dot() {
        let mut s = ExpressionScanner::new("9abc");
        assert_eq!(s.scan_name(), None);
        // No-op on failure: the digit is still there.
        assert_eq!(s.scan_long(), Ok(Some(9)));

        let mut s = ExpressionScanner::new(".abc");
        assert_eq!(s.scan_name(), None);
    }

    #[test]
    fn scan_name_stops_at_whitespace() {
        let mut s = ExpressionScanner::new("abc def");
        assert_eq!(s.scan_name(), Some("abc"));
        assert!(!s.at_end());
    }

    #[test]
    fn scan_filter_argument_allows_hyphens_after_first() {
        let mut s = ExpressionScanner::new("my-service.pid");
        assert_eq!(s.scan_filter_argument(), Some("my-service.pid"));

        let mut s = ExpressionScanner::new("-leading");
        assert_eq!(s.scan_filter_argument(), None);
    }

    #[test]
    fn scan_long_parses_maximal_digit_run() {
        let mut s = ExpressionScanner::new("1024+1");
        assert_eq!(s.scan_long(), Ok(Some(1024)));
        assert_eq!(s.scan_operator(), Some('+'));
        assert_eq!(s.scan_long(), Ok(Some(1)));
        assert!(s.at_end());
    }

    #[test]
    fn scan_long_at_i64_boundary() {
        let mut s = ExpressionScanner::new("9223372036854775807");
        assert_eq!(s.scan_long(), Ok(Some(i64::MAX)));

        let mut s = ExpressionScanner::new("9223372036854775808");
        assert_eq!(
            s.scan_long(),
            Err(NumericOverflow("9223372036854775808".to_string()))
        );
    }

    #[test]
    fn scan_long_no_digits_is_none() {
        let mut s = ExpressionScanner::new("abc");
        assert_eq!(s.scan_long(), Ok(None));
        assert_eq!(s.scan_name(), Some("abc"));
    }

    #[test]
    fn scan_operator_recognizes_all_four() {
        for op in ['+', '-', '*', '/'] {
            let text = op.to_string();
            let mut s = ExpressionScanner::new(&text);
            assert_eq!(s.scan_operator(), Some(op));
            assert!(s.at_end());
        }
        let mut s = ExpressionScanner::new("%");
        assert_eq!(s.scan_operator(), None);
    }

    #[test]
    fn empty_input_is_at_end() {
        let mut s = ExpressionScanner::new("");
        assert!(s.at_end());
        assert_eq!(s.scan_name(), None);
        assert_eq!(s.scan_long(), Ok(None));
    }
}
