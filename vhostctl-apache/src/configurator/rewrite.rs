//! Rewrite rule sanitizing for cloned SSL hosts
//!
//! A plaintext host usually redirects to https. Copied verbatim into the
//! SSL host, that redirect would loop, so such rules (and the
//! `RewriteCond` chain guarding them) are commented out.

fn is_rewrite_rule(line: &str) -> bool {
    line.trim_start().to_lowercase().starts_with("rewriterule")
}

fn is_rewrite_cond(line: &str) -> bool {
    line.trim_start().to_lowercase().starts_with("rewritecond")
}

/// A `RewriteRule` whose substitution is an `https://` URL
fn redirects_to_https(line: &str) -> bool {
    line.split_whitespace()
        .nth(2)
        .map(|target| {
            target
                .trim_matches(|c| c == '"' || c == '\'')
                .to_lowercase()
                .starts_with("https://")
        })
        .unwrap_or(false)
}

fn commented(lines: &[String]) -> impl Iterator<Item = String> + '_ {
    lines.iter().map(|l| format!("# {}", l))
}

/// Comment out https redirects. Returns the lines and whether anything was
/// commented. A `RewriteCond` chain with no rule after it is kept as is.
pub fn sanitize_rewrite_rules(lines: &[String]) -> (Vec<String>, bool) {
    let mut out = Vec::with_capacity(lines.len());
    let mut skipped = false;
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];

        if is_rewrite_rule(line) {
            if redirects_to_https(line) {
                out.push(format!("# {}", line));
                skipped = true;
            } else {
                out.push(line.clone());
            }
            i += 1;
            continue;
        }

        if is_rewrite_cond(line) {
            let Some(offset) = lines[i..].iter().position(|l| is_rewrite_rule(l)) else {
                out.extend_from_slice(&lines[i..]);
                break;
            };

            let chain = &lines[i..=i + offset];
            if redirects_to_https(&chain[chain.len() - 1]) {
                out.extend(commented(chain));
                skipped = true;
            } else {
                out.extend_from_slice(chain);
            }
            i += offset + 1;
            continue;
        }

        out.push(line.clone());
        i += 1;
    }

    (out, skipped)
}
