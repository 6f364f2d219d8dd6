//! Remote text-classification backend.
//!
//! Talks to any inference server speaking the common text-classification
//! contract: `POST {"inputs": "<text>"}` and a JSON body that is either a list
//! of `{label, score}` or a list containing one such list. The highest score
//! wins.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AnalysisError, Classification, Classifier};

pub struct RemoteClassifier {
    name: &'static str,
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct Req<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct Scored {
    label: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Resp {
    Nested(Vec<Vec<Scored>>),
    Flat(Vec<Scored>),
}

impl RemoteClassifier {
    pub fn new(
        name: &'static str,
        url: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chatwatch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            name,
            http,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, AnalysisError> {
        let mut req = self.http.post(&self.url).json(&Req { inputs: text });
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AnalysisError::Unavailable {
                backend: self.name,
                reason: format!("HTTP {status}"),
            });
        }

        let body: Resp = resp.json().await.map_err(|e| AnalysisError::Malformed {
            backend: self.name,
            reason: e.to_string(),
        })?;
        let candidates = match body {
            Resp::Nested(v) => v.into_iter().flatten().collect::<Vec<_>>(),
            Resp::Flat(v) => v,
        };

        candidates
            .into_iter()
            .filter(|s| s.score.is_finite())
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|best| Classification::new(best.label, best.score))
            .ok_or_else(|| AnalysisError::Malformed {
                backend: self.name,
                reason: "no labels in response".into(),
            })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
