use crate::speaker::{Narration, Segment};
use crate::utils::clean_comment;
use anyhow::Context;
use regex::Regex;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use tracing::{debug, info};

const USER_AGENT_VALUE: &str = "threadcast/0.1";

#[derive(Debug, Deserialize)]
pub struct RedditListing {
    pub data: RedditListingData,
}

#[derive(Debug, Deserialize)]
pub struct RedditListingData {
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
pub struct RedditChild {
    pub kind: String,
    pub data: RedditThing,
}

/// Posts and comments share one shape here; fields absent on one kind are
/// optional.
#[derive(Debug, Deserialize)]
pub struct RedditThing {
    pub id: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
}

/// How many comments to keep. "No limit" is an explicit choice, not a
/// missing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentLimit {
    Unlimited,
    AtMost(usize),
}

impl CommentLimit {
    pub fn from_option(max: Option<usize>) -> Self {
        match max {
            Some(n) => CommentLimit::AtMost(n),
            None => CommentLimit::Unlimited,
        }
    }

    fn allows(&self, count: usize) -> bool {
        match self {
            CommentLimit::Unlimited => true,
            CommentLimit::AtMost(n) => count < *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub author: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadContent {
    pub id: String,
    pub title: String,
    pub intro_text: String,
    pub comments: Vec<Comment>,
}

impl ThreadContent {
    pub fn into_narration(self) -> Narration {
        let intro = (!self.intro_text.trim().is_empty()).then(|| Segment::new(self.intro_text));
        let comments = self
            .comments
            .into_iter()
            .map(|c| Segment::new(c.text))
            .collect();
        Narration::new(intro, comments)
    }
}

pub fn extract_thread_id(url: &str) -> anyhow::Result<String> {
    let re = Regex::new(r"(?:/comments/|redd\.it/)([a-z0-9]+)")?;
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .with_context(|| format!("No thread id in URL {}", url))
}

pub async fn fetch_thread(url: &str, limit: CommentLimit) -> anyhow::Result<ThreadContent> {
    let id = extract_thread_id(url)?;
    let api_url = format!("https://www.reddit.com/comments/{}.json?sort=top", id);
    info!("Fetching thread {} ({:?})", id, limit);
    let client = reqwest::Client::new();
    let res = client
        .get(&api_url)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_thread(&res, limit)
}

/// Parses the two-listing response: the post, then its comment tree. Only
/// top-level comments are kept, in the order served.
pub fn parse_thread(json: &str, limit: CommentLimit) -> anyhow::Result<ThreadContent> {
    let listings: Vec<RedditListing> = serde_json::from_str(json)?;
    let mut listings = listings.into_iter();
    let post = listings
        .next()
        .and_then(|l| l.data.children.into_iter().find(|c| c.kind == "t3"))
        .context("Thread response has no post")?
        .data;

    let title = post.title.unwrap_or_default().trim().to_string();
    let selftext = post.selftext.unwrap_or_default().trim().to_string();
    let intro_text = if selftext.is_empty() {
        title.clone()
    } else {
        format!("{}\n\n{}", title, selftext)
    };

    let mut comments = Vec::new();
    for child in listings.next().map(|l| l.data.children).unwrap_or_default() {
        if !limit.allows(comments.len()) {
            break;
        }
        if child.kind != "t1" {
            continue;
        }
        let Some(text) = child.data.body.as_deref().and_then(clean_comment) else {
            debug!("Skipping empty or removed comment {:?}", child.data.id);
            continue;
        };
        comments.push(Comment {
            author: child.data.author,
            text,
        });
    }
    info!("Thread '{}': {} comments kept", title, comments.len());

    Ok(ThreadContent {
        id: post.id.unwrap_or_default(),
        title,
        intro_text,
        comments,
    })
}
