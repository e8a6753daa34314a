//! OK (Odnoklassniki) comment source.
//!
//! All calls go through the single `fb.do` endpoint as signed form POSTs:
//! `mediatopic.getTopics` for recent group topics, `discussions.getComments`
//! per topic, `users.getInfo` when the response entities lack an author.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use md5::{Digest, Md5};
use serde::Deserialize;

use groupwatch_common::error::AppError;
use groupwatch_common::types::{Comment, MonitoredGroup, Network};

use crate::{CommentSource, GroupInfo, normalize};

const API_URL: &str = "https://api.ok.ru/fb.do";

/// OK reports comment dates as local wall-clock time in this format.
const OK_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TOPICS_PER_PASS: &str = "50";
const COMMENTS_PER_TOPIC: &str = "100";

pub struct OkClient {
    access_token: String,
    public_key: String,
    secret_key: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OkGroup {
    uid: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OkTopicsResponse {
    #[serde(default)]
    media_topics: Vec<OkTopic>,
}

#[derive(Debug, Deserialize)]
struct OkTopic {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OkCommentsResponse {
    #[serde(default)]
    comments: Vec<OkRawComment>,
    #[serde(default)]
    entities: OkEntities,
}

#[derive(Debug, Default, Deserialize)]
struct OkEntities {
    #[serde(default)]
    users: Vec<OkUser>,
}

#[derive(Debug, Deserialize)]
struct OkRawComment {
    id: String,
    #[serde(default)]
    text: String,
    date: String,
    author_id: String,
}

#[derive(Debug, Deserialize)]
struct OkUser {
    uid: String,
    name: String,
}

impl OkClient {
    pub fn new(access_token: String, public_key: String, secret_key: String) -> Self {
        Self {
            access_token,
            public_key,
            secret_key,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// MD5 over the sorted `key=value` concatenation plus the secret key,
    /// lowercase hex. `sig` itself is excluded.
    fn sign(&self, params: &BTreeMap<&str, String>) -> String {
        let mut payload = String::new();
        for (key, value) in params {
            payload.push_str(key);
            payload.push('=');
            payload.push_str(value);
        }
        payload.push_str(&self.secret_key);

        let digest = Md5::digest(payload.as_bytes());
        hex::encode(digest)
    }

    async fn call(
        &self,
        method: &str,
        mut params: BTreeMap<&'static str, String>,
    ) -> Result<serde_json::Value, AppError> {
        params.insert("application_key", self.public_key.clone());
        params.insert("format", "json".to_string());
        params.insert("method", method.to_string());
        if !self.access_token.is_empty() {
            params.insert("access_token", self.access_token.clone());
        }

        let sig = self.sign(&params);
        params.insert("sig", sig);

        let value: serde_json::Value = self
            .http
            .post(API_URL)
            .form(&params)
            .send()
            .await?
            .json()
            .await?;

        // Errors come back in-band instead of a wrapper envelope.
        if let Some(code) = value.get("error_code") {
            let msg = value
                .get("error_msg")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(AppError::Api(format!("OK API error {code}: {msg}")));
        }

        Ok(value)
    }

    async fn group_info_by_id(&self, group_id: &str) -> Result<GroupInfo, AppError> {
        let mut params = BTreeMap::new();
        params.insert("uids", group_id.to_string());
        params.insert("fields", "name,description".to_string());

        let value = self.call("group.getInfo", params).await?;
        let groups: Vec<OkGroup> = serde_json::from_value(value)?;
        let group = groups
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("OK group not found: {group_id}")))?;

        Ok(GroupInfo {
            external_id: group_id.to_string(),
            name: group.name,
            screen_name: Some(group.uid),
        })
    }

    /// Resolve a short name to a numeric group id via `url.getInfo`.
    async fn resolve_group_id(&self, short_name: &str) -> Result<String, AppError> {
        let mut params = BTreeMap::new();
        params.insert("url", format!("https://ok.ru/group/{short_name}"));

        let value = self.call("url.getInfo", params).await?;

        #[derive(Deserialize)]
        struct UrlInfo {
            #[serde(rename = "objectId")]
            object_id: i64,
        }
        let info: UrlInfo = serde_json::from_value(value)?;
        Ok(info.object_id.to_string())
    }

    async fn group_topics(&self, group_id: &str) -> Result<Vec<OkTopic>, AppError> {
        let mut params = BTreeMap::new();
        params.insert("gid", group_id.to_string());
        params.insert("count", TOPICS_PER_PASS.to_string());

        let value = self.call("mediatopic.getTopics", params).await?;
        let response: OkTopicsResponse = serde_json::from_value(value)?;
        Ok(response.media_topics)
    }

    async fn topic_comments(&self, topic_id: &str) -> Result<OkCommentsResponse, AppError> {
        let mut params = BTreeMap::new();
        params.insert("discussionId", topic_id.to_string());
        params.insert("discussionType", "GROUP_TOPIC".to_string());
        params.insert("count", COMMENTS_PER_TOPIC.to_string());

        let value = self.call("discussions.getComments", params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn user_name(&self, user_id: &str) -> Result<String, AppError> {
        let mut params = BTreeMap::new();
        params.insert("uids", user_id.to_string());
        params.insert("fields", "name".to_string());

        let value = self.call("users.getInfo", params).await?;
        let users: Vec<OkUser> = serde_json::from_value(value)?;
        users
            .into_iter()
            .next()
            .filter(|u| !u.name.is_empty())
            .map(|u| u.name)
            .ok_or_else(|| AppError::NotFound(format!("OK user not found: {user_id}")))
    }
}

#[async_trait]
impl CommentSource for OkClient {
    fn network(&self) -> Network {
        Network::Ok
    }

    async fn fetch_group_info(&self, external_id: &str) -> Result<GroupInfo, AppError> {
        let id = external_id.trim();
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(AppError::Validation("invalid OK group identifier".to_string()));
        }

        match self.group_info_by_id(id).await {
            Ok(info) => Ok(info),
            Err(first_err) => {
                // Short names fail the direct lookup; resolve through the URL.
                if id.chars().all(|c| c.is_ascii_digit()) {
                    return Err(first_err);
                }
                let numeric = self.resolve_group_id(id).await?;
                self.group_info_by_id(&numeric).await
            }
        }
    }

    async fn fetch_new_comments(&self, group: &MonitoredGroup) -> Result<Vec<Comment>, AppError> {
        let topics = self.group_topics(&group.group_id).await?;
        let mut comments = Vec::new();

        for topic in topics {
            let response = match self.topic_comments(&topic.id).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        group_id = %group.group_id,
                        topic_id = %topic.id,
                        error = %e,
                        "Skipping OK topic with unreadable comments"
                    );
                    continue;
                }
            };

            let users: HashMap<String, String> = response
                .entities
                .users
                .into_iter()
                .map(|u| (u.uid, u.name))
                .collect();

            let post_url = post_url(&group.group_id, &topic.id);
            let now = Utc::now().timestamp();

            for c in response.comments {
                let Some(timestamp) = parse_ok_date(&c.date) else {
                    tracing::warn!(comment_id = %c.id, date = %c.date, "Unparseable OK comment date");
                    continue;
                };
                if !crate::is_newer_than_cursor(timestamp, group.last_check) {
                    continue;
                }

                let author = match users.get(&c.author_id) {
                    Some(name) if !name.is_empty() => name.clone(),
                    _ => self
                        .user_name(&c.author_id)
                        .await
                        .unwrap_or_else(|_| "Unknown".to_string()),
                };

                comments.push(Comment {
                    network: Network::Ok,
                    group_id: group.id,
                    comment_id: c.id,
                    author: normalize::normalize_author(&author),
                    body: normalize::normalize_body(&c.text),
                    timestamp,
                    post_url: post_url.clone(),
                    is_pending: false,
                    received_at: now,
                });
            }
        }

        Ok(comments)
    }
}

/// Parse an OK wall-clock date in the server's local timezone into Unix UTC
/// seconds. Returns `None` for malformed input or nonexistent local times.
fn parse_ok_date(date: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(date, OK_DATE_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(local.with_timezone(&Utc).timestamp())
}

fn post_url(group_id: &str, topic_id: &str) -> String {
    format!("https://ok.ru/group/{group_id}/topic/{topic_id}")
}
