use serde::{Deserialize, Serialize};

/// Which adapter path a user query takes through the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Weather,
    News,
    General,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A chat message payload. Bot answers are either revealed text or a list
/// of news articles rendered as cards; the discriminant keeps the two apart
/// instead of an untyped union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MessagePayload {
    Text(String),
    Articles(Vec<NewsArticle>),
}

impl MessagePayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePayload::Text(t) => Some(t),
            MessagePayload::Articles(_) => None,
        }
    }
}

/// One entry in a chat session. Ids are monotonic within the session and
/// exist only so a rendering collaborator can reconcile updates; nothing is
/// persisted. Only the in-progress bot message is ever mutated, and only by
/// the reveal task extending its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: Sender,
    pub payload: MessagePayload,
}

impl Message {
    pub fn user(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::User,
            payload: MessagePayload::Text(text.into()),
        }
    }

    pub fn bot(id: u64, payload: MessagePayload) -> Self {
        Self {
            id,
            sender: Sender::Bot,
            payload,
        }
    }
}

/// A news article that survived the completeness filter. Every field the
/// renderer needs is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub source: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: String,
    pub published_at: chrono::DateTime<chrono::Utc>,
    pub category: String,
}

/// Current conditions for one location, as consumed from the weather
/// provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub description: String,
    pub icon: String,
    pub temp_c: f64,
    pub humidity: u8,
    pub wind_speed: f64,
}

impl WeatherReport {
    /// One-line summary embedded into completion prompts and shown in logs.
    pub fn summary(&self) -> String {
        format!(
            "Weather in {}: {}, Temp: {}°C, Humidity: {}%, Wind: {:.1} m/s.",
            self.city, self.description, self.temp_c, self.humidity, self.wind_speed
        )
    }
}

/// A geographic position from the locator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Observable state of a chat session. `Classifying`, `Fetching` and
/// `Generating` cover the in-flight stretch during which send controls are
/// disabled; `Revealing` is the typing effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Classifying,
    Fetching,
    Generating,
    Revealing,
}

/// Notifications a session pushes to its rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    StateChanged { state: SessionState },
    MessageAdded { message: Message },
    RevealDelta { id: u64, chunk: String },
    RevealDone { id: u64 },
    /// The conversation was reset back to the greeting.
    Reset,
}
