use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} replied with a body we can't decode: {source}")]
    Decode {
        endpoint: String,
        source: serde_path_to_error::Error<serde_json::Error>,
    },

    #[error("{service} rejected the access token twice in a row")]
    TokenRejected { service: &'static str },

    #[error("{service} login failed: {message}")]
    Login {
        service: &'static str,
        message: String,
    },

    #[error("{endpoint} failed: {message}")]
    Api { endpoint: String, message: String },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("unknown order status code {0}")]
    UnknownStatus(i64),

    #[error("storage error: {0}")]
    Store(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl LocalError {
    pub fn api(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        LocalError::Api {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Decodes a JSON reply keeping the path of the offending field in the error.
pub fn decode<T>(endpoint: &str, reply: &str) -> Result<T, LocalError>
where
    T: serde::de::DeserializeOwned,
{
    let de = &mut serde_json::Deserializer::from_str(reply);
    serde_path_to_error::deserialize(de).map_err(|source| LocalError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde_derive::Deserialize)]
    struct Outer {
        #[allow(dead_code)]
        content: Inner,
    }

    #[derive(Debug, serde_derive::Deserialize)]
    struct Inner {
        #[allow(dead_code)]
        page_count: u32,
    }

    #[test]
    fn decode_error_names_the_field_path() {
        let err = decode::<Outer>("/orders/search", r#"{"content":{"page_count":"x"}}"#)
            .unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("/orders/search replied"), "{text}");
        assert!(text.contains("content.page_count"), "{text}");
    }
}
