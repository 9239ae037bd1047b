use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use super::job::{HttpMethod, Target};
use crate::config::SchedulerConfig;
use crate::jobs::Parameters;
use crate::outcome::Outcome;

/// Calls the target of a scheduled job when it fires.
pub trait TargetInvoker: Send + Sync + 'static {
    fn invoke(
        &self,
        target: &Target,
        job_data: &Parameters,
    ) -> impl Future<Output = Outcome<String>> + Send;
}

/// Calls targets over HTTP. POST sends the job data as a JSON body, GET as
/// query parameters.
pub struct HttpInvoker {
    client: Client,
    scheme: String,
}

impl HttpInvoker {
    pub fn new(timeout: Duration, scheme: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            scheme: scheme.into(),
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> reqwest::Result<Self> {
        Self::new(
            Duration::from_secs(config.http_timeout_secs),
            config.target_scheme.clone(),
        )
    }
}

impl TargetInvoker for HttpInvoker {
    async fn invoke(&self, target: &Target, job_data: &Parameters) -> Outcome<String> {
        let url = target.url(&self.scheme);
        let request = match target.method {
            HttpMethod::Get => {
                let query: Vec<(&str, String)> = job_data
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.to_string()))
                    .collect();
                self.client.get(&url).query(&query)
            }
            HttpMethod::Post => self.client.post(&url).json(job_data),
        };

        tracing::debug!(method = %target.method, %url, "invoking scheduled target");
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                Outcome::success(response.status().to_string())
            }
            Ok(response) => Outcome::failure(format!(
                "{} {url} returned status {}",
                target.method,
                response.status()
            )),
            Err(e) => Outcome::failure(format!("{} {url} failed: {e}", target.method)),
        }
    }
}
