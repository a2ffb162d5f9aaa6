use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub body: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub views: Option<i64>,
}

impl UpdatePostRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.author.is_none()
            && self.status.is_none()
            && self.tags.is_none()
            && self.views.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated channel names.
    pub channels: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
    pub channels: Vec<ChannelInfo>,
    pub total_subscribers: usize,
}
