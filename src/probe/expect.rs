/// Collects expectation mismatches in the order they were checked.
#[derive(Debug, Default)]
pub struct Mismatches(Vec<String>);

impl Mismatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reason` unless `held` is true.
    pub fn check(&mut self, held: bool, reason: impl FnOnce() -> String) {
        if !held {
            self.0.push(reason());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The combined reason, or `None` when every expectation held.
    pub fn into_reason(self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join("; "))
        }
    }
}

/// Checks an HTTP response against the caller's declared expectations.
/// The substring is searched in the body bytes as read, before any decoding.
pub fn evaluate_http(
    actual_status: u16,
    body: &[u8],
    expect_status: Option<u16>,
    expect_contains: Option<&str>,
) -> Option<String> {
    let mut mismatches = Mismatches::new();
    if let Some(expected) = expect_status {
        mismatches.check(expected == actual_status, || {
            format!("expect status {expected}, got {actual_status}")
        });
    }
    if let Some(needle) = expect_contains {
        mismatches.check(contains_bytes(body, needle.as_bytes()), || {
            "response not contains expected substring".to_string()
        });
    }
    mismatches.into_reason()
}

/// Reachability check shared by ping and the path tracers.
pub fn check_reachable(mismatches: &mut Mismatches, expect: Option<bool>, reachable: bool) {
    if let Some(expected) = expect {
        mismatches.check(expected == reachable, || {
            format!(
                "expect {}, got {}",
                reachability(expected),
                reachability(reachable)
            )
        });
    }
}

/// Packet loss ceiling shared by ping and mtr.
pub fn check_max_loss(mismatches: &mut Mismatches, max_loss: Option<f64>, loss: f64) {
    if let Some(max) = max_loss {
        mismatches.check(loss <= max, || {
            format!("expect packet loss <= {max}%, got {loss}%")
        });
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

fn reachability(reachable: bool) -> &'static str {
    if reachable { "reachable" } else { "unreachable" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_expectations_always_pass() {
        assert_eq!(evaluate_http(500, b"", None, None), None);
    }

    #[test]
    fn test_status_mismatch() {
        assert_eq!(
            evaluate_http(200, b"hello", Some(404), None).as_deref(),
            Some("expect status 404, got 200")
        );
        assert_eq!(evaluate_http(404, b"hello", Some(404), None), None);
    }

    #[test]
    fn test_substring_mismatch() {
        assert_eq!(
            evaluate_http(200, b"hello", None, Some("missing-token")).as_deref(),
            Some("response not contains expected substring")
        );
        assert_eq!(evaluate_http(200, b"hello world", None, Some("world")), None);
    }

    #[test]
    fn test_substring_is_matched_on_raw_bytes() {
        let body = "prix: 10€".as_bytes();
        assert_eq!(evaluate_http(200, body, None, Some("10€")), None);

        // a cut multibyte character must not match its replacement glyph
        let cut = &"€".as_bytes()[..2];
        assert!(evaluate_http(200, cut, None, Some("\u{FFFD}")).is_some());
        assert!(evaluate_http(200, &[0xff, 0xfe, b'o', b'k'], None, Some("ok")).is_none());
    }

    #[test]
    fn test_both_mismatches_are_joined() {
        assert_eq!(
            evaluate_http(200, b"hello", Some(201), Some("nope")).as_deref(),
            Some("expect status 201, got 200; response not contains expected substring")
        );
    }

    #[test]
    fn test_reachability() {
        let mut m = Mismatches::new();
        check_reachable(&mut m, Some(true), false);
        check_reachable(&mut m, None, false);
        assert_eq!(m.into_reason().as_deref(), Some("expect reachable, got unreachable"));

        let mut m = Mismatches::new();
        check_reachable(&mut m, Some(false), true);
        assert_eq!(m.into_reason().as_deref(), Some("expect unreachable, got reachable"));
    }

    #[test]
    fn test_max_loss() {
        let mut m = Mismatches::new();
        check_max_loss(&mut m, Some(10.0), 10.0);
        assert!(m.is_empty());
        check_max_loss(&mut m, Some(10.0), 25.0);
        assert_eq!(m.into_reason().as_deref(), Some("expect packet loss <= 10%, got 25%"));
    }
}
