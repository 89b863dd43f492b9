//! URL encoding filters

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;

use super::{Filter, Safety};
use crate::template::{Result, Value};

/// Characters `encodeURIComponent` leaves alone
pub(crate) const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// `encodeURI` additionally keeps URI delimiters
const URI: &AsciiSet = &COMPONENT
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'#');

pub(super) fn register(filters: &mut HashMap<String, Filter>) {
    filters.insert("encodeURI".into(), Filter::text(Safety::IfValue, encode_uri));
    filters.insert(
        "encodeURIComponent".into(),
        Filter::text(Safety::IfValue, encode_uri_component),
    );
}

/// Encode a full URI
pub fn encode_uri(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::String(utf8_percent_encode(s, URI).to_string()))
}

/// Encode a single URI component
pub fn encode_uri_component(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::String(utf8_percent_encode(s, COMPONENT).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uri_component() {
        let out = encode_uri_component("a b&c/d?é", None).unwrap();
        assert_eq!(out.to_output_string(), "a%20b%26c%2Fd%3F%C3%A9");
    }

    #[test]
    fn test_encode_uri() {
        let out = encode_uri("http://x.com/a b?q=1&r=(2)", None).unwrap();
        assert_eq!(out.to_output_string(), "http://x.com/a%20b?q=1&r=(2)");
    }
}
