//! Text clean-up for mail bodies.
//!
//! Bodies go to two places: the extraction prompt, where markup is noise, and
//! operator notifications, where links and personal details should not be
//! echoed back.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static RE_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>").expect("valid regex")
});
#[allow(clippy::expect_used)]
static RE_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_SOFT_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\r?\n").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_ENTITIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#?[a-zA-Z0-9]+;").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[ \t]*\r?\n){2,}").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b[-a-zA-Z0-9()@:%_+.~#?&/=]*")
        .expect("valid regex")
});
#[allow(clippy::expect_used)]
static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid regex")
});
#[allow(clippy::expect_used)]
static RE_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:\+\d{1,2}\s)?\(?\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}$").expect("valid regex")
});

/// Remove markup from a body: scripts, styles, tags, entities and
/// quoted-printable soft line breaks. Runs of blank lines collapse to one.
#[must_use]
pub fn strip_html(text: &str) -> String {
    let text = RE_BLOCKS.replace_all(text, "");
    let text = RE_TAGS.replace_all(&text, "");
    let text = RE_SOFT_BREAK.replace_all(&text, "");
    let text = RE_ENTITIES.replace_all(&text, "");
    let text = RE_BLANK_LINES.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Replace every URL with its host name.
#[must_use]
pub fn reduce_links(text: &str) -> String {
    RE_URL
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let matched = &caps[0];
            url::Url::parse(matched)
                .ok()
                .and_then(|url| url.host_str().map(|host| format!(" {host} ")))
                .unwrap_or_else(|| matched.to_string())
        })
        .trim()
        .to_string()
}

/// Mask email addresses and phone numbers.
#[must_use]
pub fn redact_personal(text: &str) -> String {
    let text = RE_EMAIL.replace_all(text, "[EMAIL]");
    let text = RE_PHONE.replace_all(&text, "[PHONE]");
    text.trim().to_string()
}

/// Full clean-up for text shown to the operator.
#[must_use]
pub fn sanitize(text: &str) -> String {
    redact_personal(&reduce_links(&strip_html(text)))
}

/// Escape chat-template control sequences so mail content cannot pose as a
/// system or assistant turn.
#[must_use]
pub fn escape_prompt_tokens(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
        .replace("<<SYS>>", "< < SYS > >")
        .replace("<</SYS>>", "< < / SYS > >")
}

/// Truncate to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(idx, _)| &text[..idx])
}
