//! Feed item - one entry in the bounded recent-feedback list

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{LiveEvent, LivePayload};
use crate::value_objects::{Sentiment, SourceId};

/// Projection of a feedback live event into the dashboard feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub source_id: SourceId,
    pub text: String,
    /// None until the server has scored the item
    pub sentiment: Option<Sentiment>,
    pub source: String,
    pub location: Option<String>,
    pub username: String,
    /// False while the item is only a local optimistic echo
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl FeedItem {
    /// Project a live event into a feed item
    ///
    /// Returns None for non-feedback events.
    #[must_use]
    pub fn project(event: &LiveEvent) -> Option<Self> {
        let LivePayload::Feedback(body) = &event.payload else {
            return None;
        };

        Some(Self {
            source_id: event.source_id,
            text: body.text.clone(),
            sentiment: body.sentiment,
            source: body.source.clone(),
            location: body.location.clone(),
            username: body.username.clone(),
            confirmed: event.is_confirmed(),
            created_at: event.created_at,
        })
    }
}
