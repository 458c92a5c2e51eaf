//! Plugins of the sample blog.

use async_trait::async_trait;
use folia::{BoxError, Plugin, Server};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub body: String,
}

/// Payload of `POST /posts/new`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("a post needs a non-empty title")]
    EmptyTitle,
    #[error("there are no posts yet")]
    Empty,
}

/// In-memory post storage, one instance per module that lists it.
pub struct PostStore {
    posts: Mutex<Vec<Post>>,
}

impl PostStore {
    pub fn with_welcome(site_name: &str) -> Self {
        Self {
            posts: Mutex::new(vec![Post {
                id: 1,
                title: format!("Welcome to {site_name}"),
                body: "This post was created when the blog booted.".to_string(),
            }]),
        }
    }

    pub fn list(&self) -> Vec<Post> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest(&self) -> Result<Post, PostError> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .ok_or(PostError::Empty)
    }

    pub fn create(&self, new: NewPost) -> Result<Post, PostError> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(PostError::EmptyTitle);
        }
        let mut posts = self.posts.lock().unwrap_or_else(PoisonError::into_inner);
        let post = Post {
            id: posts.last().map_or(1, |p| p.id + 1),
            title: title.to_string(),
            body: new.body,
        };
        posts.push(post.clone());
        debug!(id = post.id, "Post created");
        Ok(post)
    }
}

#[async_trait]
impl Plugin for PostStore {
    async fn init(server: &Server) -> Result<Self, BoxError> {
        let site_name = server
            .get::<String>(crate::extensions::SITE_NAME)
            .ok_or("the site-settings extension must load before plugins")?;
        Ok(PostStore::with_welcome(&site_name))
    }
}
