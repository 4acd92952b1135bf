//! Memory card browsing on the `avContent` service.
//!
//! Only usable while the camera function is `Contents Transfer`. Listings
//! come back wrapped one level deep:
//!
//! ```text
//! {"result": [[
//!   {"uri": "image:content?contentId=...", "contentKind": "still",
//!    "createdTime": "2024-03-01T12:30:45+0900",
//!    "content": {"original": [{"fileName": "DSC00042.JPG", "url": "http://..."}],
//!                "thumbnailUrl": "http://...", "largeUrl": "http://..."}},
//!   ...
//! ]]}
//! ```

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Value, json};

use super::CameraSession;
use crate::error::{CameraError, Result};
use crate::rpc::{RpcRequest, Service};

/// Largest page the camera serves per `getContentList` call.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Still,
    Video,
    Directory,
    Other(String),
}

impl ContentKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "still" => ContentKind::Still,
            "directory" => ContentKind::Directory,
            "video" => ContentKind::Video,
            k if k.starts_with("movie") => ContentKind::Video,
            other => ContentKind::Other(other.to_string()),
        }
    }
}

/// One memory card entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// Camera-assigned, opaque.
    pub uri: String,
    pub kind: ContentKind,
    pub thumbnail_url: Option<String>,
    pub original_url: Option<String>,
    pub file_name: Option<String>,
    /// Creation time in epoch millis; 0 when missing or unparseable.
    pub created_at_ms: i64,
    /// When this listing was fetched, epoch millis.
    pub fetched_at_ms: i64,
}

impl ContentItem {
    pub fn is_directory(&self) -> bool {
        self.kind == ContentKind::Directory
    }
}

/// Parse a `getContentList` result. Entries without a `uri` are skipped;
/// every other missing field gets a neutral default.
pub fn parse_content_list(result: &Value, fetched_at_ms: i64) -> Vec<ContentItem> {
    let entries = match result.get(0) {
        Some(Value::Array(entries)) => entries.as_slice(),
        _ => return Vec::new(),
    };
    entries
        .iter()
        .filter_map(|entry| parse_entry(entry, fetched_at_ms))
        .collect()
}

fn parse_entry(entry: &Value, fetched_at_ms: i64) -> Option<ContentItem> {
    let uri = entry.get("uri")?.as_str()?.to_string();
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    let content = entry.get("content");
    let original = content
        .and_then(|c| c.get("original"))
        .and_then(|o| o.get(0));

    Some(ContentItem {
        uri,
        kind: ContentKind::parse(
            entry
                .get("contentKind")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
        thumbnail_url: text(content.and_then(|c| c.get("thumbnailUrl"))),
        original_url: text(original.and_then(|o| o.get("url")))
            .or_else(|| text(content.and_then(|c| c.get("largeUrl")))),
        file_name: text(original.and_then(|o| o.get("fileName")))
            .or_else(|| text(entry.get("title"))),
        created_at_ms: entry
            .get("createdTime")
            .and_then(Value::as_str)
            .map(parse_created_time)
            .unwrap_or(0),
        fetched_at_ms,
    })
}

/// `2024-03-01T12:30:45+0900`, `2024-03-01T12:30:45Z`, or without any
/// offset (read as UTC). Anything else is 0.
pub fn parse_created_time(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return t.timestamp_millis();
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return t.timestamp_millis();
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|t| t.and_utc().timestamp_millis())
        .unwrap_or(0)
}

impl CameraSession {
    /// Storage roots, e.g. `storage:memoryCard1`.
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        let result = self
            .rpc
            .invoke(
                Service::AvContent,
                RpcRequest::new("getSourceList").param(json!({ "scheme": "storage" })),
            )
            .await?;
        let sources = result
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| CameraError::unexpected("getSourceList", result.to_string()))?;
        Ok(sources
            .iter()
            .filter_map(|s| s.get("source").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// One page of the date view under `uri`.
    ///
    /// The camera serves at most [`MAX_PAGE_SIZE`] items per call; a larger
    /// `count` is rejected locally so a full page is never mistaken for the
    /// last one.
    pub async fn get_content_list(&self, uri: &str, start: u32, count: u32) -> Result<Vec<ContentItem>> {
        if count > MAX_PAGE_SIZE {
            return Err(CameraError::Validation(format!(
                "page size {count} exceeds {MAX_PAGE_SIZE}"
            )));
        }
        self.content_page(uri, start, count, "date").await
    }

    async fn content_page(&self, uri: &str, start: u32, count: u32, view: &str) -> Result<Vec<ContentItem>> {
        let request = RpcRequest::new("getContentList")
            .param(json!({
                "uri": uri,
                "stIdx": start,
                "cnt": count,
                "view": view,
                "sort": "descending",
            }))
            .version(&self.config.content_version);
        let result = self.rpc.invoke(Service::AvContent, request).await?;
        let items = parse_content_list(&result, Utc::now().timestamp_millis());
        tracing::debug!(uri, start, view, items = items.len(), "content page");
        Ok(items)
    }

    /// Every direct child of `uri`, paging until a short page.
    pub async fn list_all(&self, uri: &str) -> Result<Vec<ContentItem>> {
        let mut items = Vec::new();
        let mut start = 0;
        loop {
            let page = self.get_content_list(uri, start, MAX_PAGE_SIZE).await?;
            let len = page.len() as u32;
            items.extend(page);
            if len < MAX_PAGE_SIZE {
                return Ok(items);
            }
            start += len;
        }
    }

    /// All non-directory items below `root`.
    ///
    /// Directories already in `visited` are skipped, and every directory
    /// listed is added to it, so repeated walks can share one set.
    pub async fn walk_content_tree(
        &self,
        root: &str,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<ContentItem>> {
        let mut pending = vec![root.to_string()];
        let mut found = Vec::new();

        while let Some(dir) = pending.pop() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            for item in self.list_all(&dir).await? {
                if item.is_directory() {
                    pending.push(item.uri);
                } else {
                    found.push(item);
                }
            }
        }
        Ok(found)
    }

    /// The `n` newest stills on the first storage source, newest first.
    pub async fn recent_stills(&self, n: u32) -> Result<Vec<ContentItem>> {
        let sources = self.list_sources().await?;
        let root = sources
            .first()
            .ok_or_else(|| CameraError::unexpected("getSourceList", "no storage source"))?;

        let mut stills = Vec::new();
        let mut start = 0;
        while (stills.len() as u32) < n {
            let page = self
                .content_page(root, start, MAX_PAGE_SIZE, "flat")
                .await?;
            let len = page.len() as u32;
            stills.extend(page.into_iter().filter(|i| i.kind == ContentKind::Still));
            if len < MAX_PAGE_SIZE {
                break;
            }
            start += len;
        }
        stills.truncate(n as usize);
        Ok(stills)
    }

    pub async fn delete_content(&self, uris: &[String]) -> Result<()> {
        if uris.is_empty() {
            return Ok(());
        }
        let _op = self.operation.lock().await;
        self.rpc
            .invoke(
                Service::AvContent,
                RpcRequest::new("deleteContent")
                    .param(json!({ "uri": uris }))
                    .version("1.1"),
            )
            .await?;
        tracing::info!(count = uris.len(), "content deleted");
        Ok(())
    }
}
