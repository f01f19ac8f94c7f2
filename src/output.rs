use crate::api::Post;
use crate::error::StorageError;
use crate::storage::write_atomically;
use crate::username::Username;
use chrono::SecondsFormat;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes `<username>_tweets.txt` files into one output directory
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, username: &Username) -> PathBuf {
        self.output_dir.join(format!("{username}_tweets.txt"))
    }

    /// Replace the user's file with `posts`; the directory is created on demand
    pub fn write_posts(&self, username: &Username, posts: &[Post]) -> Result<PathBuf, StorageError> {
        let path = self.path_for(username);
        write_atomically(&path, render_posts(posts).as_bytes())?;
        info!(
            "Tweets for {} saved to {} ({} posts)",
            username,
            path.display(),
            posts.len()
        );
        Ok(path)
    }
}

/// `<timestamp>: <text>` blocks, each followed by a blank line
pub fn render_posts(posts: &[Post]) -> String {
    let mut rendered = String::new();
    for post in posts {
        rendered.push_str(&post.created_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        rendered.push_str(": ");
        rendered.push_str(&post.text);
        rendered.push_str("\n\n");
    }
    rendered
}
