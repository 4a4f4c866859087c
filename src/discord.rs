use crate::channel::{MembershipDirectory, MessageRef, NotificationChannel, UserId};
use crate::config::DiscordConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

const API_BASE: &str = "https://discord.com/api/v10";

/// Reaction user listings page at most this many entries per request.
const PAGE_SIZE: usize = 100;

/// REST adapter for the chat service. Covers the outbound surface the
/// controller needs; the gateway that produces inbound events is wired by
/// the deployment, not by this crate.
pub struct DiscordChannel {
    http: Client,
    token: String,
    guild_id: u64,
    excluded_role_id: Option<u64>,
    dm_channels: Mutex<HashMap<UserId, u64>>,
}

fn encode_symbol(symbol: &str) -> String {
    utf8_percent_encode(symbol, NON_ALPHANUMERIC).to_string()
}

fn parse_snowflake(value: &Value) -> Result<u64> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::BadResponse(format!("not a snowflake: {}", value)))
}

impl DiscordChannel {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(DiscordChannel {
            http,
            token: config.token.clone(),
            guild_id: config.guild_id,
            excluded_role_id: config.excluded_role_id,
            dm_channels: Mutex::new(HashMap::new()),
        })
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        debug!("discord <- {} {}", method, path);
        let mut request = self
            .http
            .request(method, format!("{}{}", API_BASE, path))
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Channel {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn dm_channel(&self, user: UserId) -> Result<u64> {
        let mut cache = self.dm_channels.lock().await;
        if let Some(id) = cache.get(&user) {
            return Ok(*id);
        }
        let created = self
            .request(
                Method::POST,
                "/users/@me/channels",
                Some(json!({ "recipient_id": user.to_string() })),
            )
            .await?;
        let id = parse_snowflake(&created["id"])?;
        cache.insert(user, id);
        Ok(id)
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    async fn post(&self, channel_id: u64, content: &str) -> Result<MessageRef> {
        let message = self
            .request(
                Method::POST,
                &format!("/channels/{}/messages", channel_id),
                Some(json!({ "content": content })),
            )
            .await?;
        Ok(MessageRef {
            channel_id,
            message_id: parse_snowflake(&message["id"])?,
        })
    }

    async fn edit(&self, message: &MessageRef, content: &str) -> Result<()> {
        self.request(
            Method::PATCH,
            &format!(
                "/channels/{}/messages/{}",
                message.channel_id, message.message_id
            ),
            Some(json!({ "content": content })),
        )
        .await?;
        Ok(())
    }

    async fn add_reaction(&self, message: &MessageRef, symbol: &str) -> Result<()> {
        self.request(
            Method::PUT,
            &format!(
                "/channels/{}/messages/{}/reactions/{}/@me",
                message.channel_id,
                message.message_id,
                encode_symbol(symbol)
            ),
            None,
        )
        .await?;
        Ok(())
    }

    async fn reaction_symbols(&self, message: &MessageRef) -> Result<Vec<String>> {
        let fetched = self
            .request(
                Method::GET,
                &format!(
                    "/channels/{}/messages/{}",
                    message.channel_id, message.message_id
                ),
                None,
            )
            .await?;

        let reactions = match fetched.get("reactions").and_then(Value::as_array) {
            None => return Ok(Vec::new()),
            Some(reactions) => reactions,
        };
        Ok(reactions
            .iter()
            .filter_map(|r| r.pointer("/emoji/name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn reaction_users(
        &self,
        message: &MessageRef,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<UserId>> {
        let mut users = Vec::new();
        let mut after: Option<u64> = None;
        while users.len() < limit {
            let page_size = PAGE_SIZE.min(limit - users.len());
            let mut path = format!(
                "/channels/{}/messages/{}/reactions/{}?limit={}",
                message.channel_id,
                message.message_id,
                encode_symbol(symbol),
                page_size
            );
            if let Some(after) = after {
                path.push_str(&format!("&after={}", after));
            }

            let page = self.request(Method::GET, &path, None).await?;
            let page = page
                .as_array()
                .ok_or_else(|| Error::BadResponse("reactions page is not an array".to_string()))?;
            if page.is_empty() {
                break;
            }

            let full_page = page.len() == page_size;
            for user in page {
                users.push(parse_snowflake(&user["id"])?);
            }
            if !full_page {
                break;
            }
            after = users.last().copied();
        }
        Ok(users)
    }

    async fn direct_message(&self, user: UserId, content: &str) -> Result<()> {
        let channel_id = self.dm_channel(user).await?;
        self.request(
            Method::POST,
            &format!("/channels/{}/messages", channel_id),
            Some(json!({ "content": content })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipDirectory for DiscordChannel {
    async fn is_excluded(&self, user: UserId) -> Result<bool> {
        let role_id = match self.excluded_role_id {
            None => return Ok(false),
            Some(role_id) => role_id,
        };
        let member = self
            .request(
                Method::GET,
                &format!("/guilds/{}/members/{}", self.guild_id, user),
                None,
            )
            .await?;

        let roles = member
            .get("roles")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::BadResponse("member has no roles field".to_string()))?;
        let role_id = role_id.to_string();
        Ok(roles.iter().any(|r| r.as_str() == Some(role_id.as_str())))
    }
}
