//! Title links fed to the CLI as the "rendered page".

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use url::Url;

use mdfilter_core::models::card::TITLE_LINK_PREFIX;

/// Read one link per line from `input`, or stdin when `None` or `-`.
pub fn read_links(input: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let raw = match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("reading links from {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading links from stdin")?;
            buf
        }
    };
    Ok(parse_links(&raw))
}

/// Normalise every non-blank, non-comment line with [`normalize_href`].
pub fn parse_links(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_href)
        .collect()
}

/// Turn a pasted link into the `href` the page would carry.
///
/// Absolute URLs keep only their path, bare ids become `/title/<id>`, and
/// anything else is passed through untouched.
pub fn normalize_href(line: &str) -> String {
    if let Ok(url) = Url::parse(line) {
        return url.path().to_string();
    }
    if !line.starts_with('/') && is_bare_id(line) {
        return format!("{TITLE_LINK_PREFIX}{line}");
    }
    line.to_string()
}

fn is_bare_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}
