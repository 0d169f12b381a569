use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::constants::REMOTE_FETCH_TIMEOUT_SECS;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::time::Duration;

pub struct ReqwestHttp {
    timeout: Duration,
}

impl Default for ReqwestHttp {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(REMOTE_FETCH_TIMEOUT_SECS),
        }
    }
}

impl ReqwestHttp {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl HttpClientPort for ReqwestHttp {
    fn get(&self, url: &str) -> Result<HttpGetResult, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| e.to_string())?;
        let resp = client.get(url).send().map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().map_err(|e| e.to_string())?.to_vec();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let content_length: u64 = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(bytes.len() as u64);
        Ok(HttpGetResult { status, bytes, content_type, content_length })
    }
}
