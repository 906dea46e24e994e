//! Email and phone-number extraction.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::extractor::visible_text;

/// Contact details found on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Email addresses, deduplicated.
    pub emails: BTreeSet<String>,
    /// Phone numbers as written, deduplicated.
    pub phones: BTreeSet<String>,
}

impl ContactInfo {
    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.phones.is_empty()
    }
}

static AT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[\[(]\s*(?:at|アット)\s*[\])]\s*").expect("at token pattern")
});

static DOT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[\[(]\s*(?:dot|ドット)\s*[\])]\s*").expect("dot token pattern")
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email pattern")
});

/// Digit groups after the first share one separator, so a hyphenated number
/// ends at the next space.
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ \-]?)?(?:\(\d{1,5}\)[ \-]?)?\d+(?:(?:-\d+)+|(?: \d+)+)?")
        .expect("phone pattern")
});

/// File extensions that show up after `@` in asset names such as `logo@2x.png`.
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico", "avif", "tif", "tiff",
];

/// Scan the visible text and the `mailto:`/`tel:` links of `doc`.
pub fn extract_contacts(doc: &Document) -> ContactInfo {
    let mut info = ContactInfo::default();
    scan_text(&visible_text(doc), &mut info);

    for (_, node) in doc.nodes() {
        if node.tag() != Some("a") {
            continue;
        }
        if let Some(href) = node.attr("href") {
            scan_href(href, &mut info);
        }
    }

    info
}

/// Add every email and phone number found in `text`.
pub fn scan_text(text: &str, info: &mut ContactInfo) {
    let text = normalize(text);

    for m in EMAIL.find_iter(&text) {
        if is_isolated(&text, m.start(), m.end(), |c| c.is_ascii_alphanumeric()) {
            if let Some(email) = valid_email(m.as_str()) {
                info.emails.insert(email);
            }
        }
    }

    let mut pos = 0;
    while let Some(m) = PHONE.find_at(&text, pos) {
        pos = m.end();
        if text[..m.start()].chars().next_back().is_some_and(touches_number) {
            continue;
        }
        if let Some(end) = phone_end(&text, m.start(), m.end()) {
            info.phones.insert(text[m.start()..end].to_string());
            pos = end;
        }
    }
}

/// End of the longest phone number starting at `start`, cutting the match
/// back to a space when the whole run is not a number.
fn phone_end(text: &str, start: usize, end: usize) -> Option<usize> {
    std::iter::once(end)
        .chain(text[start..end].rmatch_indices(' ').map(|(i, _)| start + i))
        .find(|&cut| {
            let candidate = &text[start..cut];
            !text[cut..].chars().next().is_some_and(touches_number)
                && is_formatted(candidate)
                && has_phone_length(candidate)
        })
}

fn touches_number(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// `mailto:` and `tel:` targets are explicit; they skip the formatting rule
/// but are still validated.
fn scan_href(href: &str, info: &mut ContactInfo) {
    let href = href.trim();
    let Some((scheme, rest)) = href.split_once(':') else {
        return;
    };

    if scheme.eq_ignore_ascii_case("mailto") {
        let address = rest.split('?').next().unwrap_or_default().replace("%40", "@");
        let address = normalize(address.trim());
        if EMAIL
            .find(&address)
            .is_some_and(|m| m.start() == 0 && m.end() == address.len())
        {
            if let Some(email) = valid_email(&address) {
                info.emails.insert(email);
            }
        }
    } else if scheme.eq_ignore_ascii_case("tel") {
        let number = normalize(rest.trim()).replace("%20", " ");
        if !number.is_empty()
            && number
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
            && has_phone_length(&number)
        {
            info.phones.insert(number);
        }
    }
}

/// Fullwidth characters to ASCII, then de-obfuscate `[at]`/`(dot)` forms.
fn normalize(text: &str) -> String {
    let ascii: String = text
        .chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2212}' => '-',
            _ => c,
        })
        .collect();
    let ascii = AT_TOKEN.replace_all(&ascii, "@");
    DOT_TOKEN.replace_all(&ascii, ".").into_owned()
}

fn is_isolated(text: &str, start: usize, end: usize, touches: impl Fn(char) -> bool) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(&touches) && !after.is_some_and(&touches)
}

fn valid_email(candidate: &str) -> Option<String> {
    let candidate = candidate.trim_matches('.');
    let (local, domain) = candidate.split_once('@')?;
    if local.is_empty() || domain.starts_with('.') || domain.contains("..") {
        return None;
    }
    let domain = domain.to_ascii_lowercase();
    let tld = domain.rsplit('.').next()?;
    if IMAGE_EXTENSIONS.contains(&tld) {
        return None;
    }
    Some(format!("{local}@{domain}"))
}

fn is_formatted(candidate: &str) -> bool {
    candidate.contains(['-', ' ', '+', '('])
}

fn has_phone_length(candidate: &str) -> bool {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    (9..=15).contains(&digits)
}
