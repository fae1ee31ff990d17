//! Bridge address encoding and decoding
//!
//! A call travels as a single navigable address:
//!
//! ```text
//! native://<component>/<operation>?<key>=<value>&...&_dummy_=<token>
//! ```
//!
//! Values are escaped the way `encodeURIComponent` escapes them, so a content
//! surface building the address by hand and this encoder agree byte for byte.
//! The trailing token defeats caching of identical addresses by the transport
//! and identifies the emission when the host acknowledges it.

use crate::config::BridgeConfig;
use crate::types::{BridgeError, CallRequest, CallbackId, Params, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left unescaped by `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Names and keys travel unescaped, so only characters that mean nothing to
/// an address parser are allowed in them
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Escape a parameter value for the query string
pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Build the cache-busting token for one emission
///
/// Wall-clock milliseconds keep the address unique across bridge lifetimes,
/// the sequence number keeps it unique within one millisecond.
pub fn emission_token(seq: u64) -> String {
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), seq)
}

/// A call recovered from an intercepted address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    /// The call, without the reserved callback and cache-buster keys
    pub request: CallRequest,
    /// Correlation id, if the caller expects a response
    pub callback: Option<CallbackId>,
    /// Emission token, used to acknowledge the dispatch slot
    pub token: Option<String>,
}

/// Encoder/decoder bound to one bridge configuration
#[derive(Debug, Clone)]
pub struct AddressCodec {
    config: BridgeConfig,
}

impl AddressCodec {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Reject requests whose names or keys cannot be carried by an address
    ///
    /// Caller parameters may not use the callback or cache-buster keys: the
    /// host would read them as correlation data.
    pub fn validate(&self, request: &CallRequest) -> Result<()> {
        check_name("component", &request.component)?;
        check_name("operation", &request.operation)?;
        for (key, _) in request.params.iter() {
            check_name("parameter key", key)?;
            if self.config.is_reserved_key(key) {
                return Err(BridgeError::EncodingViolation(format!(
                    "parameter key '{key}' is reserved"
                )));
            }
        }
        Ok(())
    }

    /// Encode a request into a bridge address
    ///
    /// # Example
    /// ```
    /// use native_bridge::{AddressCodec, BridgeConfig, CallRequest, Params};
    ///
    /// let codec = AddressCodec::new(&BridgeConfig::new());
    /// let request = CallRequest::new(
    ///     "SpeechSynthesizer",
    ///     "speak",
    ///     Params::new().with("text", "hello world").with("flush", true),
    /// );
    /// let address = codec.encode(&request, None, "1700000000000-1").unwrap();
    /// assert_eq!(
    ///     address,
    ///     "native://SpeechSynthesizer/speak?text=hello%20world&flush=true&_dummy_=1700000000000-1"
    /// );
    /// ```
    pub fn encode(
        &self,
        request: &CallRequest,
        callback: Option<CallbackId>,
        token: &str,
    ) -> Result<String> {
        self.validate(request)?;

        let mut address = format!(
            "{}://{}/{}?",
            self.config.scheme, request.component, request.operation
        );
        for (key, value) in request.params.iter() {
            address.push_str(key);
            address.push('=');
            address.push_str(&encode_uri_component(value));
            address.push('&');
        }
        if let Some(id) = callback {
            address.push_str(&self.config.callback_key);
            address.push('=');
            address.push_str(&id.to_string());
            address.push('&');
        }
        address.push_str(&self.config.cache_buster_key);
        address.push('=');
        address.push_str(&encode_uri_component(token));

        Ok(address)
    }

    /// Check whether an address uses the bridge scheme at all
    pub fn matches(&self, address: &str) -> bool {
        address
            .split_once("://")
            .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(&self.config.scheme))
    }

    /// Decode an intercepted address back into a call
    pub fn decode(&self, address: &str) -> Result<DecodedCall> {
        if !self.matches(address) {
            return Err(BridgeError::MalformedAddress(format!(
                "not a {}:// address: {address}",
                self.config.scheme
            )));
        }

        let url = Url::parse(address)
            .map_err(|e| BridgeError::MalformedAddress(format!("{address}: {e}")))?;

        let component = match url.host_str() {
            Some(host) if !host.is_empty() => decode_segment(host)?,
            _ => {
                return Err(BridgeError::MalformedAddress(format!(
                    "missing component: {address}"
                )))
            }
        };

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let operation = match segments.as_slice() {
            [operation] => decode_segment(operation)?,
            _ => {
                return Err(BridgeError::MalformedAddress(format!(
                    "expected exactly one operation segment: {address}"
                )))
            }
        };

        let mut params = Params::new();
        let mut token = None;
        let mut callback = None;
        let pairs = url.query().unwrap_or_default().split('&');
        for pair in pairs.filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_query_part(key)?;
            let value = decode_query_part(value)?;

            if key == self.config.cache_buster_key {
                token = Some(value);
            } else if key == self.config.callback_key {
                let id = value.parse::<CallbackId>().map_err(|_| {
                    BridgeError::MalformedAddress(format!("bad callback id {value:?}: {address}"))
                })?;
                callback = Some(id);
            } else {
                params.insert(key, value);
            }
        }

        Ok(DecodedCall {
            request: CallRequest {
                component,
                operation,
                params,
            },
            callback,
            token,
        })
    }
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BridgeError::EncodingViolation(format!("empty {what}")));
    }
    if name == "." || name == ".." {
        return Err(BridgeError::EncodingViolation(format!("{what} '{name}' is a dot segment")));
    }
    if let Some(c) = name.chars().find(|c| !is_name_char(*c)) {
        return Err(BridgeError::EncodingViolation(format!(
            "{what} '{name}' contains {c:?}"
        )));
    }
    Ok(())
}

fn decode_segment(segment: &str) -> Result<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| BridgeError::MalformedAddress(format!("{segment}: {e}")))
}

/// Query keys and values follow form rules: `+` is a space
fn decode_query_part(part: &str) -> Result<String> {
    decode_segment(&part.replace('+', " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> AddressCodec {
        AddressCodec::new(&BridgeConfig::new())
    }

    #[test]
    fn test_encode_speak() {
        let request = CallRequest::new(
            "SpeechSynthesizer",
            "speak",
            Params::new().with("text", "hello world").with("flush", "true"),
        );

        let address = codec().encode(&request, None, "17-1").unwrap();
        assert_eq!(
            address,
            "native://SpeechSynthesizer/speak?text=hello%20world&flush=true&_dummy_=17-1"
        );
    }

    #[test]
    fn test_encode_without_params() {
        let request = CallRequest::new("AudioServices", "vibrate", Params::new());

        let address = codec().encode(&request, None, "5-0").unwrap();
        assert_eq!(address, "native://AudioServices/vibrate?_dummy_=5-0");
    }

    #[test]
    fn test_encode_uri_component_matches_javascript() {
        assert_eq!(encode_uri_component("a+b=c&d"), "a%2Bb%3Dc%26d");
        assert_eq!(encode_uri_component("-_.!~*'()"), "-_.!~*'()");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
        assert_eq!(encode_uri_component("/?#"), "%2F%3F%23");
    }

    #[test]
    fn test_decode_round_trip() {
        let codec = codec();
        let params = Params::new()
            .with("text", "3F 展示室 & more?")
            .with("flush", "false")
            .with("lat", "35.6197")
            .with("empty", "");
        let request = CallRequest::new("SpeechSynthesizer", "speak", params);

        let decoded = codec.decode(&codec.encode(&request, None, "99-3").unwrap()).unwrap();

        assert_eq!(decoded.request, request);
        assert_eq!(decoded.token.as_deref(), Some("99-3"));
        assert_eq!(decoded.callback, None);
    }

    #[test]
    fn test_decode_extracts_callback() {
        let decoded = codec()
            .decode("native://SpeechSynthesizer/isSpeaking?callback=12&_dummy_=1-1")
            .unwrap();

        assert_eq!(decoded.callback, Some(CallbackId(12)));
        assert!(decoded.request.params.is_empty());
    }

    #[test]
    fn test_decode_preserves_component_case() {
        let decoded = codec().decode("native://STT/startRecognizer?callbackname=onText").unwrap();

        assert_eq!(decoded.request.component, "STT");
        assert_eq!(decoded.request.operation, "startRecognizer");
        assert_eq!(decoded.request.params.get("callbackname"), Some("onText"));
        assert_eq!(decoded.token, None);
    }

    #[test]
    fn test_decode_foreign_scheme() {
        let err = codec().decode("https://example.com/speak?text=x").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedAddress(_)));
        assert!(!codec().matches("about:blank"));
    }

    #[test]
    fn test_decode_bad_shape() {
        let codec = codec();
        assert!(codec.decode("native:///speak?x=1").is_err());
        assert!(codec.decode("native://System?x=1").is_err());
        assert!(codec.decode("native://System/log/extra?x=1").is_err());
    }

    #[test]
    fn test_validate_rejects_delimiters() {
        let codec = codec();

        let bad_component = CallRequest::new("Speech/Synth", "speak", Params::new());
        assert!(matches!(
            codec.encode(&bad_component, None, "1"),
            Err(BridgeError::EncodingViolation(_))
        ));

        let bad_key = CallRequest::new("System", "log", Params::new().with("a&b", "x"));
        assert!(codec.validate(&bad_key).is_err());

        let reserved = CallRequest::new("System", "log", Params::new().with("_dummy_", "x"));
        assert!(codec.validate(&reserved).is_err());
    }

    #[test]
    fn test_validate_rejects_callback_key_param() {
        let codec = codec();
        let request = CallRequest::new(
            "SpeechSynthesizer",
            "isSpeaking",
            Params::new().with("callback", "1"),
        );

        assert!(matches!(
            codec.validate(&request),
            Err(BridgeError::EncodingViolation(msg)) if msg.contains("reserved")
        ));
        assert!(codec.encode(&request, None, "1-1").is_err());
    }

    #[test]
    fn test_validate_rejects_authority_syntax() {
        let codec = codec();

        for component in ["Evil@System", "[System]", "Sys\\tem", "<System>", "Sys^tem", "Sys|tem"] {
            let request = CallRequest::new(component, "log", Params::new());
            assert!(
                matches!(codec.validate(&request), Err(BridgeError::EncodingViolation(_))),
                "accepted {component:?}"
            );
        }

        for operation in [".", ".."] {
            let request = CallRequest::new("System", operation, Params::new());
            assert!(codec.validate(&request).is_err());
        }

        let ok = CallRequest::new("Nav-View_2", "map.center", Params::new().with("x_1", "@[]"));
        assert!(codec.validate(&ok).is_ok());
    }

    #[test]
    fn test_encode_places_callback_before_token() {
        let codec = codec();
        let request = CallRequest::new("System", "log", Params::new().with("text", "hi"));

        let address = codec.encode(&request, Some(CallbackId(4)), "8-2").unwrap();
        assert_eq!(address, "native://System/log?text=hi&callback=4&_dummy_=8-2");

        let decoded = codec.decode(&address).unwrap();
        assert_eq!(decoded.callback, Some(CallbackId(4)));
        assert_eq!(decoded.request, request);
    }

    #[test]
    fn test_decode_rejects_invalid_utf8_value() {
        let err = codec()
            .decode("native://System/log?text=%FF&_dummy_=1-1")
            .unwrap_err();
        assert!(matches!(err, BridgeError::MalformedAddress(_)));
    }

    #[test]
    fn test_decode_rejects_non_numeric_callback() {
        let err = codec()
            .decode("native://Property/callback?callback=onChange&x=1")
            .unwrap_err();
        assert!(matches!(err, BridgeError::MalformedAddress(_)));
    }

    #[test]
    fn test_decode_plus_is_space() {
        let decoded = codec().decode("native://System/log?text=a+b%2Bc").unwrap();
        assert_eq!(decoded.request.params.get("text"), Some("a b+c"));
    }

    #[test]
    fn test_emission_tokens_differ() {
        assert_ne!(emission_token(1), emission_token(2));
    }
}
