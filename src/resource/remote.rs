//! HTTP-backed resources and paginated feed collections.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::watch;

use super::{Author, CollectionItem, Resource, ResourceCollection, ResourceCursor};
use crate::io::{HttpRangeReader, ReadAt};

/// A sketch container behind an HTTP URL.
///
/// Construction is free; `open` performs the HEAD round trip and gives
/// back a Range reader, so a caller peeking at one member of a large
/// remote container only transfers the bytes involved.
pub struct RemoteResource {
    client: Client,
    name: String,
    uri: String,
    preview_uri: Option<String>,
    description: Option<String>,
    authors: Vec<Author>,
    license: Option<String>,
}

impl RemoteResource {
    pub fn new(client: Client, name: String, uri: String) -> Self {
        Self {
            client,
            name,
            uri,
            preview_uri: None,
            description: None,
            authors: Vec::new(),
            license: None,
        }
    }

    pub fn with_details(
        mut self,
        preview_uri: Option<String>,
        description: Option<String>,
        authors: Vec<Author>,
        license: Option<String>,
    ) -> Self {
        self.preview_uri = preview_uri;
        self.description = description;
        self.authors = authors;
        self.license = license;
        self
    }
}

#[async_trait]
impl Resource for RemoteResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn preview_uri(&self) -> Option<&str> {
        self.preview_uri.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn authors(&self) -> &[Author] {
        &self.authors
    }

    fn license(&self) -> Option<&str> {
        self.license.as_deref()
    }

    async fn load_preview(&self) -> Result<Option<Vec<u8>>> {
        let Some(preview_uri) = &self.preview_uri else {
            return Ok(None);
        };
        let resp = self.client.get(preview_uri).send().await?;
        if !resp.status().is_success() {
            debug!("preview fetch {} returned {}", preview_uri, resp.status());
            return Ok(None);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn open(&self) -> Result<Arc<dyn ReadAt>> {
        let reader = HttpRangeReader::with_client(self.client.clone(), self.uri.clone()).await?;
        Ok(Arc::new(reader))
    }
}

/// One entry of a feed page. Entries without a TILT format are not
/// sketches and get skipped.
#[derive(Debug, Deserialize)]
struct FeedSketch {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    ownername: Option<String>,
    #[serde(default)]
    ownerurl: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    formats: Vec<FeedFormat>,
}

#[derive(Debug, Deserialize)]
struct FeedFormat {
    url: String,
    format: String,
}

/// A paginated remote feed of sketches.
///
/// Traversal issues successive `?page=N` requests and translates each
/// page's entries into [`RemoteResource`]s. An erroring or empty page
/// terminates the sequence without raising; the error text, if any, is
/// recorded in `last_error`.
pub struct FeedCollection {
    client: Client,
    name: String,
    base_url: String,
    last_error: Arc<Mutex<Option<String>>>,
    changed: watch::Sender<u64>,
}

impl FeedCollection {
    /// `base_url` is the page endpoint without the `page` query, e.g.
    /// `https://api.example.com/assets`.
    pub fn new(client: Client, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            base_url: base_url.into(),
            last_error: Arc::new(Mutex::new(None)),
            changed: watch::Sender::new(0),
        }
    }
}

#[async_trait]
impl ResourceCollection for FeedCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.base_url
    }

    fn contents(&self) -> Box<dyn ResourceCursor> {
        Box::new(FeedCursor {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            page: 0,
            buffer: VecDeque::new(),
            done: false,
            last_error: self.last_error.clone(),
        })
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    fn refresh(&self) {
        *self.last_error.lock().unwrap() = None;
        self.changed.send_modify(|v| *v += 1);
    }

    fn changed(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }
}

struct FeedCursor {
    client: Client,
    base_url: String,
    page: usize,
    buffer: VecDeque<Arc<dyn Resource>>,
    done: bool,
    last_error: Arc<Mutex<Option<String>>>,
}

impl FeedCursor {
    /// Fetch and translate the next page into the buffer. Any failure
    /// marks the cursor done; the caller sees plain end-of-sequence.
    async fn fetch_page(&mut self) {
        let url = format!("{}?page={}", self.base_url, self.page);
        self.page += 1;

        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let msg = format!("feed request {} failed: {}", url, e);
                warn!("{}", msg);
                *self.last_error.lock().unwrap() = Some(msg);
                self.done = true;
                return;
            }
        };
        if resp.status() != reqwest::StatusCode::OK {
            let msg = format!("feed {} returned status {}", url, resp.status());
            warn!("{}", msg);
            *self.last_error.lock().unwrap() = Some(msg);
            self.done = true;
            return;
        }

        let sketches: Vec<FeedSketch> = match resp.json().await {
            Ok(sketches) => sketches,
            Err(e) => {
                let msg = format!("feed {} returned bad payload: {}", url, e);
                warn!("{}", msg);
                *self.last_error.lock().unwrap() = Some(msg);
                self.done = true;
                return;
            }
        };

        // An empty page is the feed's way of saying "no more".
        if sketches.is_empty() {
            self.done = true;
            return;
        }

        for sketch in sketches {
            let Some(tilt) = sketch.formats.iter().find(|f| f.format == "TILT") else {
                continue;
            };
            let authors = match sketch.ownername {
                Some(name) => vec![Author {
                    name,
                    url: sketch.ownerurl,
                }],
                None => Vec::new(),
            };
            let resource = RemoteResource::new(
                self.client.clone(),
                sketch.name,
                tilt.url.clone(),
            )
            .with_details(sketch.thumbnail, sketch.description, authors, sketch.license);
            self.buffer.push_back(Arc::new(resource));
        }
    }
}

#[async_trait]
impl ResourceCursor for FeedCursor {
    async fn next(&mut self) -> Option<CollectionItem> {
        while self.buffer.is_empty() && !self.done {
            self.fetch_page().await;
        }
        self.buffer.pop_front().map(CollectionItem::Sketch)
    }
}
