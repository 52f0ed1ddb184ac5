//! Percent-encoding helpers for form parameters that travel inside URLs.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters left unescaped in a query component: alphanumerics and `-_.~/`.
const QUERY_COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~').remove(b'/');

/// Escapes a value for use as a query component.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, QUERY_COMPONENT_SET).to_string()
}

/// Reverses [`encode_component`]. Invalid UTF-8 sequences are replaced.
pub fn decode_component(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Appends `key=value` pairs to `base`, escaping every value.
pub fn append_query_pairs<'a>(base: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut url = base.to_string();
    for (key, value) in pairs {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(&encode_component(value));
    }
    url
}
