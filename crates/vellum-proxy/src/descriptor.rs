//! Proxy descriptor file format.

use serde::{Deserialize, Serialize};

/// Declarative proxy rule as written in the API sources.
///
/// ```yaml
/// validateRequest: request.method == "GET"
/// configureCall: outbound_call.set_url("https://example.com/users")
/// configureResponse: json.decode(result.body).results
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDescriptor {
    /// Expression guarding the call; falsy rejects the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_request: Option<String>,
    /// Expression filling in `outbound_call`; its value is the body unless
    /// `makePayload` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configure_call: Option<String>,
    /// Template rendering the outbound body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make_payload: Option<String>,
    /// Expression producing the response body.
    pub configure_response: String,
    /// Template rendering the response body instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make_response: Option<String>,
}

impl ProxyDescriptor {
    /// Parse a descriptor from YAML.
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_full_descriptor() {
        let yaml = r#"
validateRequest: request.method == "GET"
configureCall: outbound_call.set_url("http://localhost/users")
makePayload: "{{ request.body }}"
configureResponse: result.body
makeResponse: "<p>{{ result.status }}</p>"
"#;

        let descriptor = ProxyDescriptor::from_yaml(yaml).unwrap();

        assert_eq!(
            descriptor.validate_request.as_deref(),
            Some(r#"request.method == "GET""#)
        );
        assert_eq!(descriptor.configure_response, "result.body");
        assert!(descriptor.make_payload.is_some());
        assert!(descriptor.make_response.is_some());
    }

    #[test]
    fn test_configure_response_is_required() {
        assert!(ProxyDescriptor::from_yaml("configureCall: x").is_err());
    }

    #[test]
    fn test_optional_stages_default_to_none() {
        let descriptor = ProxyDescriptor::from_yaml("configureResponse: '\"ok\"'").unwrap();

        assert_eq!(
            descriptor,
            ProxyDescriptor {
                configure_response: "\"ok\"".to_owned(),
                ..ProxyDescriptor::default()
            }
        );
    }
}
