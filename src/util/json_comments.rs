//! Strips `//` and `/* ... */` comments from project description text before
//! it is handed to `serde_json`.
//!
//! This is a single forward scan over the bytes, string-literal aware so
//! that `"http://example.com"` is never mistaken for the start of a
//! comment. It does not validate JSON syntax; malformed input is passed
//! through unchanged and left for the JSON parser to reject.

/// Strip comments from `input`, returning a buffer `serde_json` can parse.
///
/// Comment bytes are replaced with spaces rather than removed outright, so
/// that every remaining byte offset in the returned buffer still lines up
/// with the corresponding offset in `input` — this keeps `jsonschema`
/// error spans and line/column reporting anchored to the original file.
pub fn strip_comments(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = vec![b' '; bytes.len()];
    let mut i = 0;
    let mut in_string = false;
    let mut escaped = false;

    while i < bytes.len() {
        let b = bytes[i];

        if in_string {
            out[i] = b;
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'"' => {
                in_string = true;
                out[i] = b;
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    if bytes[i] == b'\n' {
                        out[i] = b'\n';
                    }
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                out[i] = b;
                i += 1;
            }
        }
    }

    // Safety net: comment stripping only ever replaces ASCII comment bytes
    // with ASCII spaces, so UTF-8 validity of the original text is preserved.
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comments() {
        let src = "{\n  \"name\": \"app\", // trailing\n  \"version\": \"1.0\"\n}\n";
        let stripped = strip_comments(src);
        assert!(!stripped.contains("trailing"));
        let v: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(v["name"], "app");
    }

    #[test]
    fn strips_block_comments() {
        let src = "{ /* block\nspanning lines */ \"name\": \"app\" }";
        let stripped = strip_comments(src);
        let v: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(v["name"], "app");
    }

    #[test]
    fn preserves_slashes_in_strings() {
        let src = r#"{ "url": "http://example.com", "note": "a // b" }"#;
        let stripped = strip_comments(src);
        let v: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(v["url"], "http://example.com");
        assert_eq!(v["note"], "a // b");
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let src = r#"{ "note": "a \" // still in string" }"#;
        let stripped = strip_comments(src);
        let v: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(v["note"], "a \" // still in string");
    }
}
