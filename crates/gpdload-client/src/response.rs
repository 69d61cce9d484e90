use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// A fully read HTTP response.
///
/// Header names are lower-cased; repeated headers keep the last value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Body as untyped JSON, `Null` when empty.
    pub fn json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&self.body)
    }

    pub(crate) async fn read(resp: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.text().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> ApiResponse {
        let mut headers = BTreeMap::new();
        headers.insert("location".to_string(), "brokers/b/file/u/status".to_string());
        ApiResponse {
            status,
            headers,
            body: body.to_string(),
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let r = response(202, "");
        assert_eq!(r.header("Location"), Some("brokers/b/file/u/status"));
        assert_eq!(r.header("LOCATION"), Some("brokers/b/file/u/status"));
        assert_eq!(r.header("retry-after"), None);
    }

    #[test]
    fn success_is_2xx_only() {
        assert!(response(200, "").is_success());
        assert!(response(202, "").is_success());
        assert!(!response(302, "").is_success());
        assert!(!response(404, "").is_success());
    }

    #[test]
    fn empty_body_is_null_json() {
        assert_eq!(response(202, "  ").json_value().unwrap(), serde_json::Value::Null);
        assert!(response(200, "{").json_value().is_err());
    }

    #[test]
    fn typed_body() {
        let r = response(200, r#"{"processedItem":1,"submittedItem":2}"#);
        let status: gpdload_types::UploadStatus = r.json().unwrap();
        assert_eq!(status.submitted_item, 2);
    }
}
