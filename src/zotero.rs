//! Zotero OAuth and Web API client.
//!
//! Links a Zotero account through the three-legged OAuth 1.0a flow and
//! reads the top-level items of the user's library.
//!
//! # OAuth flow
//!
//! 1. [`ZoteroClient::request_token`]: temporary credentials, with the
//!    configured callback URL.
//! 2. [`ZoteroClient::authorize_url`]: the browser is redirected here.
//! 3. Zotero redirects back with `oauth_token` and `oauth_verifier`;
//!    [`ZoteroClient::access_info`] exchanges them for an access token.
//!    Zotero returns the user's API key as the token secret, together with
//!    `userID` and `username`.
//!
//! # Signing
//!
//! Requests are signed with HMAC-SHA1 (`hmac` + `sha1` crates) as described
//! in RFC 5849 §3.4; the signature goes in an `Authorization: OAuth ...`
//! header.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::ZoteroConfig;
use crate::models::{StashItem, ZoteroItems};

type HmacSha1 = Hmac<Sha1>;

/// Temporary credentials held in the session between redirect and callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

/// Result of a successful access-token exchange.
#[derive(Debug, Clone)]
pub struct AccessInfo {
    pub token: String,
    pub api_key: String,
    pub userid: String,
    pub username: String,
}

// ============ OAuth 1.0a helpers ============

/// Percent-encode per RFC 3986 (unreserved characters pass through).
pub fn oauth_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Compute the HMAC-SHA1 signature of a request.
///
/// ```text
/// base = METHOD & enc(url) & enc(sorted "k=v" pairs joined by '&')
/// key  = enc(consumer_secret) & enc(token_secret)
/// ```
pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String> {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (oauth_encode(k), oauth_encode(v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        oauth_encode(url),
        oauth_encode(&normalized)
    );
    let key = format!(
        "{}&{}",
        oauth_encode(consumer_secret),
        oauth_encode(token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn authorization_header(params: &[(String, String)]) -> String {
    let fields = params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", oauth_encode(k), oauth_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {}", fields)
}

fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn required(fields: &HashMap<String, String>, key: &str) -> Result<String> {
    fields
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Zotero OAuth response missing '{}'", key))
}

// ============ Web API payloads ============

#[derive(Debug, Deserialize)]
struct ApiItem {
    data: ApiItemData,
}

#[derive(Debug, Deserialize)]
struct ApiItemData {
    #[serde(default)]
    title: String,
    #[serde(rename = "abstractNote", default)]
    abstract_note: String,
    #[serde(default)]
    creators: Vec<ApiCreator>,
}

#[derive(Debug, Deserialize)]
struct ApiCreator {
    #[serde(rename = "firstName", default)]
    first_name: String,
    #[serde(rename = "lastName", default)]
    last_name: String,
    #[serde(default)]
    name: String,
}

impl ApiCreator {
    fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Summarise an items response (Zotero API v3, `format=json`).
pub fn summarize_items(doc: &str) -> Result<ZoteroItems> {
    let items: Vec<ApiItem> =
        serde_json::from_str(doc).context("Malformed Zotero items response")?;

    let mut summary = ZoteroItems::default();
    for item in items {
        let data = item.data;
        let creators: Vec<String> = data
            .creators
            .iter()
            .map(ApiCreator::display_name)
            .filter(|n| !n.is_empty())
            .collect();

        if !data.title.is_empty() {
            summary.titles.push(data.title.clone());
        }
        if !data.abstract_note.is_empty() {
            summary.abstracts.push(data.abstract_note);
        }
        summary.creators.extend(creators.iter().cloned());
        summary.items.push(StashItem {
            title: data.title,
            creators,
        });
    }

    Ok(summary)
}

// ============ Client ============

#[derive(Clone)]
pub struct ZoteroClient {
    client: reqwest::Client,
    config: ZoteroConfig,
}

impl ZoteroClient {
    pub fn new(config: &ZoteroConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.oauth_base.trim_end_matches('/'), path)
    }

    fn oauth_params(&self, extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut params = vec![
            ("oauth_consumer_key".to_string(), self.config.client_key.clone()),
            (
                "oauth_nonce".to_string(),
                uuid::Uuid::new_v4().simple().to_string(),
            ),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            (
                "oauth_timestamp".to_string(),
                chrono::Utc::now().timestamp().to_string(),
            ),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        params
    }

    /// POST a signed OAuth request and parse the form-encoded reply.
    async fn oauth_post(
        &self,
        url: &str,
        mut params: Vec<(String, String)>,
        token_secret: &str,
    ) -> Result<HashMap<String, String>> {
        let signature = sign(
            "POST",
            url,
            &params,
            &self.config.client_secret,
            token_secret,
        )?;
        params.push(("oauth_signature".to_string(), signature));

        let resp = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization_header(&params))
            .send()
            .await
            .with_context(|| format!("Zotero OAuth request failed: {}", url))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Zotero OAuth {} returned {}: {}", url, status, body.trim());
        }

        Ok(parse_form(&body))
    }

    pub async fn request_token(&self) -> Result<RequestToken> {
        let url = self.endpoint("request");
        let params = self.oauth_params(&[("oauth_callback", &self.config.callback_url)]);
        let fields = self.oauth_post(&url, params, "").await?;

        Ok(RequestToken {
            token: required(&fields, "oauth_token")?,
            secret: required(&fields, "oauth_token_secret")?,
        })
    }

    pub fn authorize_url(&self, token: &RequestToken) -> Result<String> {
        let url = url::Url::parse_with_params(
            &self.endpoint("authorize"),
            &[("oauth_token", token.token.as_str())],
        )
        .context("Invalid zotero.oauth_base")?;
        Ok(url.to_string())
    }

    /// Exchange the verifier and request token for the user's credentials.
    pub async fn access_info(
        &self,
        verifier: &str,
        request_token: &RequestToken,
    ) -> Result<AccessInfo> {
        let url = self.endpoint("access");
        let params = self.oauth_params(&[
            ("oauth_token", &request_token.token),
            ("oauth_verifier", verifier),
        ]);
        let fields = self
            .oauth_post(&url, params, &request_token.secret)
            .await?;

        Ok(AccessInfo {
            token: required(&fields, "oauth_token")?,
            api_key: required(&fields, "oauth_token_secret")?,
            userid: required(&fields, "userID")?,
            username: fields.get("username").cloned().unwrap_or_default(),
        })
    }

    /// Fetch up to `num_items` top-level library items.
    pub async fn get_user_items(
        &self,
        userid: &str,
        api_key: &str,
        num_items: u32,
    ) -> Result<ZoteroItems> {
        let url = format!(
            "{}/users/{}/items/top",
            self.config.api_base.trim_end_matches('/'),
            userid
        );

        let resp = self
            .client
            .get(&url)
            .query(&[("limit", num_items.to_string()), ("format", "json".to_string())])
            .header("Zotero-API-Version", "3")
            .header("Zotero-API-Key", api_key)
            .send()
            .await
            .with_context(|| format!("Zotero items request failed: {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Zotero items request returned {}", status);
        }

        summarize_items(&resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_config(base: &str) -> ZoteroConfig {
        ZoteroConfig {
            client_key: "ckey".to_string(),
            client_secret: "csecret".to_string(),
            callback_url: "http://localhost:8000/auth/zotero/callback".to_string(),
            oauth_base: format!("{}/oauth", base),
            api_base: base.to_string(),
            num_items: 99,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_oauth_encode() {
        assert_eq!(oauth_encode("a b*~/é"), "a%20b%2A~%2F%C3%A9");
        assert_eq!(oauth_encode("Az09-._~"), "Az09-._~");
    }

    #[test]
    fn test_sign_known_vector() {
        let params = vec![
            ("oauth_consumer_key".to_string(), "ckey".to_string()),
            ("oauth_nonce".to_string(), "abc123".to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), "1700000000".to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
            (
                "oauth_callback".to_string(),
                "http://localhost:8000/auth/zotero/callback".to_string(),
            ),
        ];
        let sig = sign(
            "POST",
            "https://www.zotero.org/oauth/request",
            &params,
            "csecret",
            "",
        )
        .unwrap();
        assert_eq!(sig, "+DcgdhMQFWhjH+XnvgyEenuyZNM=");
    }

    #[test]
    fn test_authorization_header_quotes_values() {
        let header = authorization_header(&[
            ("oauth_token".to_string(), "t k".to_string()),
            ("oauth_signature".to_string(), "a+b=".to_string()),
        ]);
        assert_eq!(
            header,
            "OAuth oauth_token=\"t%20k\", oauth_signature=\"a%2Bb%3D\""
        );
    }

    #[test]
    fn test_summarize_items() {
        let doc = r#"[
            {"key": "A1", "data": {"itemType": "book", "title": "Moby Dick",
              "abstractNote": "A whale of a tale.",
              "creators": [{"creatorType": "author", "firstName": "Herman", "lastName": "Melville"}]}},
            {"key": "B2", "data": {"itemType": "report", "title": "Annual Report",
              "creators": [{"creatorType": "author", "name": "Library of Congress"}]}}
        ]"#;
        let items = summarize_items(doc).unwrap();
        assert_eq!(items.titles, vec!["Moby Dick", "Annual Report"]);
        assert_eq!(items.abstracts, vec!["A whale of a tale."]);
        assert_eq!(items.creators, vec!["Herman Melville", "Library of Congress"]);
        assert_eq!(items.items.len(), 2);
        assert_eq!(items.items[1].creators, vec!["Library of Congress"]);
    }

    #[test]
    fn test_summarize_items_malformed() {
        assert!(summarize_items("{\"not\": \"a list\"}").is_err());
    }

    #[tokio::test]
    async fn test_request_token_and_authorize_url() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/oauth/request")
            .match_header("authorization", Matcher::Regex("^OAuth .*oauth_signature=".into()))
            .with_body("oauth_token=req123&oauth_token_secret=sec456&oauth_callback_confirmed=true")
            .create_async()
            .await;

        let client = ZoteroClient::new(&test_config(&server.url())).unwrap();
        let token = client.request_token().await.unwrap();
        m.assert_async().await;
        assert_eq!(
            token,
            RequestToken {
                token: "req123".to_string(),
                secret: "sec456".to_string()
            }
        );

        let url = client.authorize_url(&token).unwrap();
        assert_eq!(url, format!("{}/oauth/authorize?oauth_token=req123", server.url()));
    }

    #[tokio::test]
    async fn test_access_info() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/oauth/access")
            .match_header("authorization", Matcher::Regex("oauth_verifier=\"ver789\"".into()))
            .with_body("oauth_token=acc&oauth_token_secret=apikey&userID=4242&username=melville")
            .create_async()
            .await;

        let client = ZoteroClient::new(&test_config(&server.url())).unwrap();
        let token = RequestToken {
            token: "req123".to_string(),
            secret: "sec456".to_string(),
        };
        let info = client.access_info("ver789", &token).await.unwrap();
        assert_eq!(info.api_key, "apikey");
        assert_eq!(info.userid, "4242");
        assert_eq!(info.username, "melville");
    }

    #[tokio::test]
    async fn test_access_info_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/oauth/access")
            .with_status(401)
            .with_body("Invalid verifier")
            .create_async()
            .await;

        let client = ZoteroClient::new(&test_config(&server.url())).unwrap();
        let token = RequestToken {
            token: "t".to_string(),
            secret: "s".to_string(),
        };
        let err = client.access_info("bad", &token).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_get_user_items() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/users/4242/items/top")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "99".into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .match_header("zotero-api-key", "apikey")
            .match_header("zotero-api-version", "3")
            .with_body(r#"[{"data": {"title": "Walden", "creators": []}}]"#)
            .create_async()
            .await;

        let client = ZoteroClient::new(&test_config(&server.url())).unwrap();
        let items = client.get_user_items("4242", "apikey", 99).await.unwrap();
        m.assert_async().await;
        assert_eq!(items.titles, vec!["Walden"]);
    }
}
