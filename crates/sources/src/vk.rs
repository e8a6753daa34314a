//! VK comment source.
//!
//! Polls group walls through the VK REST API: `wall.get` for recent owner
//! posts, `wall.getComments` per post, `users.get` (cached) for author names.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use groupwatch_common::error::AppError;
use groupwatch_common::types::{Comment, MonitoredGroup, Network};

use crate::{CommentSource, GroupInfo, normalize};

const API_URL: &str = "https://api.vk.ru/method/";
const API_VERSION: &str = "5.131";

/// Recent posts fetched per polling pass.
const POSTS_PER_PASS: &str = "50";
/// Newest-first comments fetched per post.
const COMMENTS_PER_POST: &str = "100";
/// `users.get` accepts at most this many ids per call.
const USERS_BATCH: usize = 1000;

pub struct VkClient {
    token: String,
    http: reqwest::Client,
    // Author names are stable; cache them across polling passes.
    user_cache: Mutex<HashMap<i64, VkUser>>,
}

#[derive(Debug, Deserialize)]
struct VkEnvelope<T> {
    response: Option<T>,
    error: Option<VkApiError>,
}

#[derive(Debug, Deserialize)]
struct VkApiError {
    error_code: i64,
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct VkItems<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VkGroup {
    id: i64,
    name: String,
    #[serde(default)]
    screen_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VkWallPost {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct VkRawComment {
    id: i64,
    from_id: i64,
    #[serde(default)]
    text: String,
    date: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct VkUser {
    id: i64,
    first_name: String,
    last_name: String,
}

impl VkClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            user_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, AppError> {
        let envelope: VkEnvelope<T> = self
            .http
            .get(format!("{API_URL}{method}"))
            .query(params)
            .query(&[("access_token", self.token.as_str()), ("v", API_VERSION)])
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = envelope.error {
            return Err(AppError::Api(format!(
                "VK API error {}: {}",
                err.error_code, err.error_msg
            )));
        }
        envelope
            .response
            .ok_or_else(|| AppError::Api("VK API returned no response payload".to_string()))
    }

    async fn group_info(&self, identifier: &str) -> Result<GroupInfo, AppError> {
        let (normalized, is_numeric) = normalize_group_identifier(identifier)
            .ok_or_else(|| AppError::Validation("empty VK group identifier".to_string()))?;

        let id_param = if is_numeric { "group_id" } else { "group_ids" };
        let groups: Vec<VkGroup> = self
            .call(
                "groups.getById",
                &[
                    (id_param, normalized),
                    ("fields", "name,screen_name".to_string()),
                ],
            )
            .await?;

        let group = groups
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("VK group not found: {identifier}")))?;

        Ok(GroupInfo {
            external_id: group.id.to_string(),
            name: group.name,
            screen_name: group.screen_name,
        })
    }

    async fn wall_posts(&self, numeric_id: &str) -> Result<Vec<VkWallPost>, AppError> {
        let result: VkItems<VkWallPost> = self
            .call(
                "wall.get",
                &[
                    ("owner_id", format!("-{numeric_id}")),
                    ("count", POSTS_PER_PASS.to_string()),
                    ("filter", "owner".to_string()),
                ],
            )
            .await?;
        Ok(result.items)
    }

    async fn post_comments(
        &self,
        numeric_id: &str,
        post_id: i64,
    ) -> Result<Vec<VkRawComment>, AppError> {
        let result: VkItems<VkRawComment> = self
            .call(
                "wall.getComments",
                &[
                    ("owner_id", format!("-{numeric_id}")),
                    ("post_id", post_id.to_string()),
                    ("count", COMMENTS_PER_POST.to_string()),
                    ("sort", "desc".to_string()),
                ],
            )
            .await?;
        Ok(result.items)
    }

    /// Resolve author names, hitting the API only for cache misses.
    async fn user_names(&self, user_ids: &[i64]) -> Result<HashMap<i64, VkUser>, AppError> {
        let mut cache = self.user_cache.lock().await;

        let mut result = HashMap::new();
        let mut missing = Vec::new();
        for &id in user_ids {
            match cache.get(&id) {
                Some(user) => {
                    result.insert(id, user.clone());
                }
                None => missing.push(id),
            }
        }

        for batch in missing.chunks(USERS_BATCH) {
            let ids: Vec<String> = batch.iter().map(|id| id.to_string()).collect();
            let users: Vec<VkUser> = self
                .call(
                    "users.get",
                    &[
                        ("user_ids", ids.join(",")),
                        ("fields", "first_name,last_name".to_string()),
                    ],
                )
                .await?;
            for user in users {
                cache.insert(user.id, user.clone());
                result.insert(user.id, user);
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl CommentSource for VkClient {
    fn network(&self) -> Network {
        Network::Vk
    }

    async fn fetch_group_info(&self, external_id: &str) -> Result<GroupInfo, AppError> {
        self.group_info(external_id).await
    }

    async fn fetch_new_comments(&self, group: &MonitoredGroup) -> Result<Vec<Comment>, AppError> {
        let (mut numeric_id, is_numeric) = normalize_group_identifier(&group.group_id)
            .ok_or_else(|| AppError::Validation("empty VK group identifier".to_string()))?;
        if !is_numeric {
            numeric_id = self.group_info(&numeric_id).await?.external_id;
        }

        let posts = self.wall_posts(&numeric_id).await?;
        let mut comments = Vec::new();

        for post in posts {
            let raw = match self.post_comments(&numeric_id, post.id).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(
                        group_id = %group.group_id,
                        post_id = post.id,
                        error = %e,
                        "Skipping VK post with unreadable comments"
                    );
                    continue;
                }
            };

            let user_ids: Vec<i64> = raw
                .iter()
                .map(|c| c.from_id)
                .filter(|&id| id > 0) // negative ids are communities
                .collect();
            let users = self.user_names(&user_ids).await?;

            let post_url = post_url(&numeric_id, post.id);
            let now = Utc::now().timestamp();

            for c in raw {
                if !crate::is_newer_than_cursor(c.date, group.last_check) {
                    continue;
                }
                let author = match users.get(&c.from_id) {
                    Some(user) => format!("{} {}", user.first_name, user.last_name),
                    None => format!("User #{}", c.from_id),
                };
                comments.push(Comment {
                    network: Network::Vk,
                    group_id: group.id,
                    comment_id: c.id.to_string(),
                    author: normalize::normalize_author(&author),
                    body: normalize::normalize_body(&c.text),
                    timestamp: c.date,
                    post_url: post_url.clone(),
                    is_pending: false,
                    received_at: now,
                });
            }
        }

        Ok(comments)
    }
}

/// Strip a `club` prefix and classify the identifier as numeric id or short
/// name. Returns `None` for blank input.
fn normalize_group_identifier(input: &str) -> Option<(String, bool)> {
    let cleaned = input.trim();
    if cleaned.is_empty() {
        return None;
    }
    let stripped = cleaned.strip_prefix("club").unwrap_or(cleaned);
    if stripped.chars().all(|c| c.is_ascii_digit()) && !stripped.is_empty() {
        return Some((stripped.to_string(), true));
    }
    Some((cleaned.to_string(), false))
}

fn post_url(numeric_id: &str, post_id: i64) -> String {
    format!("https://vk.com/wall-{numeric_id}_{post_id}")
}
