//! Shell glob to regex translation for `Include` arguments

/// Characters that make a path component a pattern
const MAGIC: &[char] = &['*', '?', '[', ']', '\\'];

pub fn has_magic(s: &str) -> bool {
    s.contains(MAGIC)
}

/// Translate one glob component into a regex fragment (no anchors).
/// Wildcards never cross a `/`.
pub fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let n = chars.len();
    let mut out = String::new();
    let mut i = 0;

    while i < n {
        let c = chars[i];
        i += 1;
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut j = i;
                if j < n && chars[j] == '!' {
                    j += 1;
                }
                if j < n && chars[j] == ']' {
                    j += 1;
                }
                while j < n && chars[j] != ']' {
                    j += 1;
                }

                if j >= n {
                    out.push_str("\\[");
                } else {
                    let stuff: String = chars[i..j].iter().collect();
                    let stuff = stuff.replace('\\', "\\\\");
                    i = j + 1;
                    let class = match stuff.strip_prefix('!') {
                        Some(rest) => format!("^{}", rest),
                        None if stuff.starts_with('^') => format!("\\{}", stuff),
                        None => stuff,
                    };
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out
}

/// Anchored regex matching the same absolute paths as the glob `path`
pub fn path_regex(path: &str) -> String {
    let body = path
        .split('/')
        .map(|part| if has_magic(part) { translate(part) } else { regex::escape(part) })
        .collect::<Vec<_>>()
        .join("/");
    format!("^{}$", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_translate() {
        assert_eq!(translate("*.conf"), "[^/]*\\.conf");
        assert_eq!(translate("?x"), "[^/]x");
        assert_eq!(translate("[!a]b"), "[^a]b");
        assert_eq!(translate("[ab"), "\\[ab");
    }

    #[test]
    fn test_path_regex() {
        let re = Regex::new(&path_regex("/etc/apache2/sites-enabled/*.conf")).unwrap();
        assert!(re.is_match("/etc/apache2/sites-enabled/example.com.conf"));
        assert!(!re.is_match("/etc/apache2/sites-enabled/sub/example.com.conf"));
        assert!(!re.is_match("/etc/apache2/sites-enabled/example.com.conf.bak"));

        let re = Regex::new(&path_regex("/etc/httpd/conf.d/ssl.conf")).unwrap();
        assert!(re.is_match("/etc/httpd/conf.d/ssl.conf"));
        assert!(!re.is_match("/etc/httpd/conf.d/sslxconf"));
    }

    #[test]
    fn test_has_magic() {
        assert!(has_magic("mods-enabled/*.load"));
        assert!(!has_magic("/etc/apache2/ports.conf"));
    }
}
