use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

/// Identity of the user a summary job runs on behalf of. The phone number
/// feeds the video-URL signature; the account tags the stored summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub account: String,
    pub id: i64,
    pub phone: String,
    pub tenant_id: i64,
}

/// Resolves a bearer token to the user behind it.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_info(&self, token: &str) -> Result<UserInfo>;
}

pub struct UserClient {
    client: reqwest::Client,
    info_url: String,
}

impl UserClient {
    pub fn new(info_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build user info client")?;
        Ok(Self {
            client,
            info_url: info_url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InfoEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    msg: String,
    params: Option<InfoParams>,
}

#[derive(Debug, Deserialize)]
struct InfoParams {
    account: String,
    id: i64,
    phone: String,
    tenant_id: i64,
}

#[async_trait]
impl UserDirectory for UserClient {
    async fn user_info(&self, token: &str) -> Result<UserInfo> {
        let envelope: InfoEnvelope = self
            .client
            .get(&self.info_url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .context("user info request failed")?
            .error_for_status()
            .context("user info request rejected")?
            .json()
            .await
            .context("malformed user info response")?;

        if envelope.code != 200 {
            let reason = if envelope.message.is_empty() {
                envelope.msg
            } else {
                envelope.message
            };
            bail!("user info lookup failed with code {}: {reason}", envelope.code);
        }

        let params = envelope
            .params
            .context("user info response carries no params")?;
        Ok(UserInfo {
            account: params.account,
            id: params.id,
            phone: params.phone,
            tenant_id: params.tenant_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_token_to_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/info-simple"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "ok",
                "params": {
                    "account": "student42",
                    "id": 42,
                    "phone": "13812345678",
                    "tenant_id": 8
                }
            })))
            .mount(&server)
            .await;

        let client = UserClient::new(format!("{}/auth/info-simple", server.uri())).unwrap();
        let user = client.user_info("tok-1").await.unwrap();

        assert_eq!(
            user,
            UserInfo {
                account: "student42".to_string(),
                id: 42,
                phone: "13812345678".to_string(),
                tenant_id: 8,
            }
        );
    }

    #[tokio::test]
    async fn non_200_envelope_code_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 401,
                "msg": "token expired"
            })))
            .mount(&server)
            .await;

        let client = UserClient::new(server.uri()).unwrap();
        let error = client.user_info("stale").await.unwrap_err();
        assert!(error.to_string().contains("401"));
        assert!(error.to_string().contains("token expired"));
    }
}
