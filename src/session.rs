use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::classify::classify;
use crate::config::Config;
use crate::error::{AssistError, Result};
use crate::geo::Locator;
use crate::models::{
    Category, ChatEvent, Message, MessagePayload, SessionState,
};
use crate::news::NewsProvider;
use crate::reveal::{self, RevealHandle};
use crate::transport::Completion;
use crate::weather::WeatherProvider;

/// Shown when neither geolocation nor the weather fetch could produce a
/// current-conditions summary.
const WEATHER_APOLOGY: &str = "I couldn't get your location to check the weather. \
     Please make sure location access is enabled. I can still answer other questions.";

/// Shown when the news lookup failed or came back empty.
const NEWS_APOLOGY: &str = "Could not fetch disaster news at this moment. \
     The source may be unavailable or there are no recent articles.";

/// Shown when the completion provider failed.
const COMPLETION_FAILURE: &str = "API failed. Please try again.";

const NO_MARKDOWN_INSTRUCTION: &str = "Format your response as a natural, conversational \
     paragraph. Do not use markdown, bullet points, or asterisks.";

/// State a session shares with its reveal task: the message list, the id
/// counter and the observable machine state. Mutation is serialized through
/// the mutex; nothing else ever touches it concurrently.
pub(crate) struct SessionShared {
    pub(crate) messages: Vec<Message>,
    pub(crate) next_id: u64,
    pub(crate) state: SessionState,
}

/// What a processed submission turns into: a payload appended complete, or
/// completion text to be revealed tick by tick.
enum Outcome {
    Immediate(MessagePayload),
    Reveal(String),
}

/// One chat widget instance: the ordered message list, the per-category
/// response cache, and the classify → cache → fetch → complete → reveal
/// machine. At most one submission is in flight at a time; the reveal task
/// is the only background activity and is torn down with the session.
pub struct ChatSession {
    id: Uuid,
    shared: Arc<Mutex<SessionShared>>,
    cache: ResponseCache,
    completion: Arc<dyn Completion>,
    weather: Arc<dyn WeatherProvider>,
    news: Arc<dyn NewsProvider>,
    locator: Arc<dyn Locator>,
    events: UnboundedSender<ChatEvent>,
    reveal: Option<RevealHandle>,
    greeting: String,
    typing_speed: Duration,
    news_page_size: usize,
}

impl ChatSession {
    pub fn new(
        config: &Config,
        completion: Arc<dyn Completion>,
        weather: Arc<dyn WeatherProvider>,
        news: Arc<dyn NewsProvider>,
        locator: Arc<dyn Locator>,
    ) -> (Self, UnboundedReceiver<ChatEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let greeting = config.assistant.greeting.clone();
        let shared = Arc::new(Mutex::new(SessionShared {
            messages: vec![Message::bot(0, MessagePayload::Text(greeting.clone()))],
            next_id: 1,
            state: SessionState::Idle,
        }));

        let session = Self {
            id: Uuid::new_v4(),
            shared,
            cache: ResponseCache::new(config.cache.weather_ttl(), config.cache.news_ttl()),
            completion,
            weather,
            news,
            locator,
            events,
            reveal: None,
            greeting,
            typing_speed: config.typing_speed(),
            news_page_size: config.news.page_size,
        };
        (session, receiver)
    }

    /// Process one user submission through the full pipeline. Adapter
    /// failures never escape: each is folded into a user-visible chat
    /// message and the session lands back at `Idle` (or `Revealing`, which
    /// drains to `Idle` on its own).
    pub async fn submit(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        {
            let shared = self.shared.lock().expect("session state mutex poisoned");
            if shared.state != SessionState::Idle {
                return Err(AssistError::SessionBusy);
            }
        }

        self.append_message(|id| Message::user(id, text));
        self.set_state(SessionState::Classifying);

        let category = classify(text);
        tracing::info!(session = %self.id, ?category, "classified submission");
        self.set_state(SessionState::Fetching);

        let outcome = match category {
            Category::News => self.news_outcome(text).await,
            Category::Weather => match self.weather_prompt(text).await {
                Ok(prompt) => self.completion_outcome(&prompt).await,
                Err(apology) => Outcome::Immediate(MessagePayload::Text(apology)),
            },
            Category::General => {
                let prompt = format!(
                    "The user asked: \"{text}\". Please answer the question. \
                     {NO_MARKDOWN_INSTRUCTION}"
                );
                self.completion_outcome(&prompt).await
            }
        };

        match outcome {
            Outcome::Immediate(payload) => {
                self.append_message(|id| Message::bot(id, payload));
                self.set_state(SessionState::Idle);
            }
            Outcome::Reveal(answer) => {
                let id = self.append_message(|id| {
                    Message::bot(id, MessagePayload::Text(String::new()))
                });
                self.set_state(SessionState::Revealing);
                self.reveal = Some(reveal::start(
                    Arc::clone(&self.shared),
                    self.events.clone(),
                    id,
                    answer,
                    self.typing_speed,
                ));
            }
        }

        Ok(())
    }

    /// Cancel an in-flight reveal; the revealed prefix stays as the final
    /// message text.
    pub fn stop(&mut self) {
        if let Some(handle) = self.reveal.take() {
            handle.cancel();
        }
        let mut shared = self.shared.lock().expect("session state mutex poisoned");
        if shared.state == SessionState::Revealing {
            shared.state = SessionState::Idle;
            drop(shared);
            self.send(ChatEvent::StateChanged {
                state: SessionState::Idle,
            });
        }
    }

    /// Reset the conversation to the single greeting message. Safe to call
    /// at any time and idempotent.
    pub fn new_chat(&mut self) {
        self.stop();
        {
            let mut shared = self.shared.lock().expect("session state mutex poisoned");
            shared.messages =
                vec![Message::bot(0, MessagePayload::Text(self.greeting.clone()))];
            shared.next_id = 1;
            shared.state = SessionState::Idle;
        }
        tracing::info!(session = %self.id, "conversation reset");
        self.send(ChatEvent::Reset);
    }

    /// Snapshot of the conversation so far.
    pub fn messages(&self) -> Vec<Message> {
        self.shared
            .lock()
            .expect("session state mutex poisoned")
            .messages
            .clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared
            .lock()
            .expect("session state mutex poisoned")
            .state
    }

    pub fn is_idle(&self) -> bool {
        self.state() == SessionState::Idle
    }

    /// News path: fresh cache → cached articles; otherwise fetch, cache and
    /// answer. Empty results and failures soften into the news apology.
    /// News payloads never go through the completion provider.
    async fn news_outcome(&mut self, text: &str) -> Outcome {
        if let Some(articles) = self.cache.news.get() {
            tracing::debug!(session = %self.id, "serving news from cache");
            return Outcome::Immediate(MessagePayload::Articles(articles.clone()));
        }

        match self.news.fetch(text, self.news_page_size).await {
            Ok(articles) if !articles.is_empty() => {
                self.cache.news.put(articles.clone());
                Outcome::Immediate(MessagePayload::Articles(articles))
            }
            Ok(_) => Outcome::Immediate(MessagePayload::Text(NEWS_APOLOGY.to_string())),
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "news lookup failed");
                Outcome::Immediate(MessagePayload::Text(NEWS_APOLOGY.to_string()))
            }
        }
    }

    /// Weather path: build the completion prompt from the cached summary
    /// when fresh, otherwise locate and fetch. Returns the apology text as
    /// the error when the summary cannot be produced.
    async fn weather_prompt(&mut self, text: &str) -> std::result::Result<String, String> {
        if let Some(summary) = self.cache.weather.get() {
            tracing::debug!(session = %self.id, "serving weather from cache");
            return Ok(format!(
                "The user asked: \"{text}\". The current cached weather is: \"{summary}\". \
                 Please answer the user's question based on this weather data. \
                 {NO_MARKDOWN_INSTRUCTION}"
            ));
        }

        let position = match self.locator.locate().await {
            Ok(position) => position,
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "geolocation unavailable");
                return Err(WEATHER_APOLOGY.to_string());
            }
        };

        match self.weather.current(position).await {
            Ok(report) => {
                let summary = report.summary();
                self.cache.weather.put(summary.clone());
                Ok(format!(
                    "The user asked: \"{text}\". The current weather is: \"{summary}\". \
                     Please answer the user's question based on this weather data. \
                     {NO_MARKDOWN_INSTRUCTION}"
                ))
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "weather fetch failed");
                Err(WEATHER_APOLOGY.to_string())
            }
        }
    }

    async fn completion_outcome(&mut self, prompt: &str) -> Outcome {
        self.set_state(SessionState::Generating);
        match self.completion.generate(prompt).await {
            Ok(answer) => Outcome::Reveal(answer),
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "completion failed");
                Outcome::Immediate(MessagePayload::Text(COMPLETION_FAILURE.to_string()))
            }
        }
    }

    fn append_message(&mut self, build: impl FnOnce(u64) -> Message) -> u64 {
        let message = {
            let mut shared = self.shared.lock().expect("session state mutex poisoned");
            let id = shared.next_id;
            shared.next_id += 1;
            let message = build(id);
            shared.messages.push(message.clone());
            message
        };
        let id = message.id;
        self.send(ChatEvent::MessageAdded { message });
        id
    }

    fn set_state(&mut self, state: SessionState) {
        {
            let mut shared = self.shared.lock().expect("session state mutex poisoned");
            shared.state = state;
        }
        self.send(ChatEvent::StateChanged { state });
    }

    fn send(&self, event: ChatEvent) {
        // a detached renderer is not an error
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::MockLocator;
    use crate::models::{Coordinates, NewsArticle, Sender, WeatherReport};
    use crate::news::MockNewsProvider;
    use crate::weather::MockWeatherProvider;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;

    /// Scripted completion provider that records every prompt it is given.
    struct CapturingCompletion {
        prompts: StdMutex<Vec<String>>,
        responses: StdMutex<Vec<Result<String>>>,
    }

    impl CapturingCompletion {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                prompts: StdMutex::new(Vec::new()),
                responses: StdMutex::new(responses),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompt mutex").clone()
        }
    }

    #[async_trait]
    impl Completion for CapturingCompletion {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts
                .lock()
                .expect("prompt mutex")
                .push(prompt.to_string());
            self.responses
                .lock()
                .expect("response mutex")
                .pop()
                .unwrap_or_else(|| {
                    Err(AssistError::Upstream("no more mock responses".to_string()))
                })
        }
    }

    fn article(title: &str) -> NewsArticle {
        NewsArticle {
            source: "Example Wire".into(),
            title: title.into(),
            description: format!("{title} - details"),
            url: "https://example.com/story".into(),
            image_url: "https://example.com/story.jpg".into(),
            published_at: Utc::now(),
            category: "Flood".into(),
        }
    }

    fn report() -> WeatherReport {
        WeatherReport {
            city: "New York".into(),
            description: "broken clouds".into(),
            icon: "04d".into(),
            temp_c: 21.3,
            humidity: 64,
            wind_speed: 3.6,
        }
    }

    fn granted_locator() -> MockLocator {
        let mut locator = MockLocator::new();
        locator
            .expect_locate()
            .returning(|| Ok(Coordinates { lat: 40.7, lon: -74.0 }));
        locator
    }

    fn denied_locator() -> MockLocator {
        let mut locator = MockLocator::new();
        locator
            .expect_locate()
            .returning(|| Err(AssistError::Geolocation("permission denied".into())));
        locator
    }

    struct Harness {
        session: ChatSession,
        events: UnboundedReceiver<ChatEvent>,
        completion: Arc<CapturingCompletion>,
    }

    fn harness(
        completion_responses: Vec<Result<String>>,
        weather: MockWeatherProvider,
        news: MockNewsProvider,
        locator: MockLocator,
    ) -> Harness {
        let completion = Arc::new(CapturingCompletion::new(completion_responses));
        let (session, events) = ChatSession::new(
            &Config::default(),
            Arc::clone(&completion) as Arc<dyn Completion>,
            Arc::new(weather),
            Arc::new(news),
            Arc::new(locator),
        );
        Harness {
            session,
            events,
            completion,
        }
    }

    /// Drive the paused clock until the reveal finishes.
    async fn drain_reveal(session: &ChatSession) {
        tokio::task::yield_now().await;
        while session.state() == SessionState::Revealing {
            tokio::time::advance(Duration::from_millis(40)).await;
            tokio::task::yield_now().await;
        }
    }

    fn last_text(session: &ChatSession) -> String {
        let messages = session.messages();
        let last = messages.last().expect("at least one message");
        last.payload.as_text().expect("text payload").to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn general_query_is_answered_by_completion_and_revealed() {
        let mut h = harness(
            vec![Ok("Keep a torch handy.".to_string())],
            MockWeatherProvider::new(),
            MockNewsProvider::new(),
            MockLocator::new(),
        );

        h.session.submit("hello there").await.expect("submit ok");
        assert_eq!(h.session.state(), SessionState::Revealing);
        drain_reveal(&h.session).await;

        assert_eq!(last_text(&h.session), "Keep a torch handy.");
        assert!(h.session.is_idle());

        let prompts = h.completion.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("The user asked: \"hello there\""));
        assert!(prompts[0].contains("Do not use markdown"));
    }

    #[tokio::test(start_paused = true)]
    async fn weather_query_fetches_once_then_reuses_the_cache() {
        let mut weather = MockWeatherProvider::new();
        weather
            .expect_current()
            .times(1)
            .returning(|_| Ok(report()));

        let mut h = harness(
            vec![
                Ok("Still cloudy.".to_string()),
                Ok("Cloudy with light wind.".to_string()),
            ],
            weather,
            MockNewsProvider::new(),
            granted_locator(),
        );

        h.session.submit("weather today").await.expect("submit ok");
        drain_reveal(&h.session).await;
        assert_eq!(last_text(&h.session), "Cloudy with light wind.");

        h.session
            .submit("and the temperature now?")
            .await
            .expect("submit ok");
        drain_reveal(&h.session).await;
        assert_eq!(last_text(&h.session), "Still cloudy.");

        let prompts = h.completion.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("The current weather is"));
        assert!(prompts[0].contains("Weather in New York: broken clouds"));
        assert!(prompts[1].contains("The current cached weather is"));
        assert!(prompts[1].contains("Weather in New York: broken clouds"));
    }

    #[tokio::test(start_paused = true)]
    async fn denied_geolocation_becomes_an_apology_without_completion() {
        let mut h = harness(
            vec![],
            MockWeatherProvider::new(),
            MockNewsProvider::new(),
            denied_locator(),
        );

        h.session.submit("weather please").await.expect("submit ok");
        assert!(h.session.is_idle());
        assert_eq!(last_text(&h.session), WEATHER_APOLOGY);
        assert!(h.completion.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn weather_fetch_failure_becomes_an_apology_without_completion() {
        let mut weather = MockWeatherProvider::new();
        weather
            .expect_current()
            .times(1)
            .returning(|_| Err(AssistError::Upstream("status 500".into())));

        let mut h = harness(
            vec![],
            weather,
            MockNewsProvider::new(),
            granted_locator(),
        );

        h.session.submit("forecast for tonight").await.expect("submit ok");
        assert!(h.session.is_idle());
        assert_eq!(last_text(&h.session), WEATHER_APOLOGY);
        assert!(h.completion.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn news_query_returns_articles_immediately_and_caches_them() {
        let mut news = MockNewsProvider::new();
        news.expect_fetch()
            .times(1)
            .returning(|_, _| Ok(vec![article("Flood defences tested")]));

        let mut h = harness(
            vec![],
            MockWeatherProvider::new(),
            news,
            MockLocator::new(),
        );

        h.session.submit("latest flood news").await.expect("submit ok");
        // article payloads are appended complete, no reveal
        assert!(h.session.is_idle());
        let messages = h.session.messages();
        let last = messages.last().expect("bot message");
        assert_eq!(last.sender, Sender::Bot);
        assert!(matches!(
            &last.payload,
            MessagePayload::Articles(list) if list.len() == 1
        ));

        // second submission inside the freshness window is served from cache
        h.session.submit("any earthquake update?").await.expect("submit ok");
        assert!(h.session.is_idle());
        assert!(h.completion.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_news_result_becomes_an_apology() {
        let mut news = MockNewsProvider::new();
        news.expect_fetch().times(1).returning(|_, _| Ok(vec![]));

        let mut h = harness(
            vec![],
            MockWeatherProvider::new(),
            news,
            MockLocator::new(),
        );

        h.session.submit("disaster news").await.expect("submit ok");
        assert!(h.session.is_idle());
        assert_eq!(last_text(&h.session), NEWS_APOLOGY);
    }

    #[tokio::test(start_paused = true)]
    async fn news_failure_becomes_an_apology() {
        let mut news = MockNewsProvider::new();
        news.expect_fetch()
            .times(1)
            .returning(|_, _| Err(AssistError::Upstream("status 429".into())));

        let mut h = harness(
            vec![],
            MockWeatherProvider::new(),
            news,
            MockLocator::new(),
        );

        h.session.submit("storm update").await.expect("submit ok");
        assert!(h.session.is_idle());
        assert_eq!(last_text(&h.session), NEWS_APOLOGY);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_failure_is_reported_without_a_reveal() {
        let mut h = harness(
            vec![Err(AssistError::Upstream("boom".into()))],
            MockWeatherProvider::new(),
            MockNewsProvider::new(),
            MockLocator::new(),
        );

        h.session.submit("tell me something").await.expect("submit ok");
        assert!(h.session.is_idle());
        assert_eq!(last_text(&h.session), COMPLETION_FAILURE);
    }

    #[tokio::test(start_paused = true)]
    async fn submissions_are_rejected_while_revealing() {
        let mut h = harness(
            vec![Ok("A longer answer to reveal.".to_string())],
            MockWeatherProvider::new(),
            MockNewsProvider::new(),
            MockLocator::new(),
        );

        h.session.submit("hi").await.expect("submit ok");
        assert_eq!(h.session.state(), SessionState::Revealing);
        assert!(matches!(
            h.session.submit("again").await,
            Err(AssistError::SessionBusy)
        ));
        drain_reveal(&h.session).await;
        assert!(h.session.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_reveal_keeps_the_prefix_final() {
        let mut h = harness(
            vec![Ok("abcdef".to_string())],
            MockWeatherProvider::new(),
            MockNewsProvider::new(),
            MockLocator::new(),
        );

        h.session.submit("hi").await.expect("submit ok");
        tokio::task::yield_now().await;
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(40)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(last_text(&h.session), "abc");

        h.session.stop();
        assert!(h.session.is_idle());

        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert_eq!(last_text(&h.session), "abc");

        // the session accepts new submissions afterwards
        assert!(h.session.submit("").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn new_chat_is_idempotent() {
        let mut h = harness(
            vec![Ok("hello!".to_string())],
            MockWeatherProvider::new(),
            MockNewsProvider::new(),
            MockLocator::new(),
        );

        h.session.submit("hi").await.expect("submit ok");
        drain_reveal(&h.session).await;
        assert_eq!(h.session.messages().len(), 3);

        h.session.new_chat();
        h.session.new_chat();

        let messages = h.session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 0);
        assert_eq!(messages[0].sender, Sender::Bot);
        assert_eq!(
            messages[0].payload.as_text(),
            Some(Config::default().assistant.greeting.as_str())
        );
        assert!(h.session.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn message_ids_are_monotonic_within_the_session() {
        let mut news = MockNewsProvider::new();
        news.expect_fetch()
            .returning(|_, _| Ok(vec![article("Flood defences tested")]));

        let mut h = harness(
            vec![Ok("sure.".to_string())],
            MockWeatherProvider::new(),
            news,
            MockLocator::new(),
        );

        h.session.submit("hi").await.expect("submit ok");
        drain_reveal(&h.session).await;
        h.session.submit("flood news").await.expect("submit ok");

        let ids: Vec<u64> = h.session.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn events_narrate_the_lifecycle() {
        let mut h = harness(
            vec![Ok("ok".to_string())],
            MockWeatherProvider::new(),
            MockNewsProvider::new(),
            MockLocator::new(),
        );

        h.session.submit("hi").await.expect("submit ok");
        drain_reveal(&h.session).await;

        let mut saw_user_message = false;
        let mut saw_reveal_done = false;
        while let Ok(event) = h.events.try_recv() {
            match event {
                ChatEvent::MessageAdded { message } if message.sender == Sender::User => {
                    saw_user_message = true;
                }
                ChatEvent::RevealDone { .. } => saw_reveal_done = true,
                _ => {}
            }
        }
        assert!(saw_user_message);
        assert!(saw_reveal_done);
    }
}
