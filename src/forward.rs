use std::time::Duration;
use teloxide::{
    prelude::*,
    types::{ChatId, MessageId},
    ApiError, RequestError,
};

/// Сколько максимум ждать по 429 перед единственным повтором.
pub const DEFAULT_RATE_LIMIT_CAP: Duration = Duration::from_secs(5);

/// Почему не прошёл отдельный форвард.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("source post is gone or the id is invalid")]
    SourceMissing,
    #[error("bot is not allowed to post into the target chat")]
    Forbidden,
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("request failed: {0}")]
    Transport(String),
}

impl From<RequestError> for ForwardError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Api(ApiError::MessageToForwardNotFound | ApiError::MessageIdInvalid) => {
                Self::SourceMissing
            }
            RequestError::Api(
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::ChatNotFound
                | ApiError::UserDeactivated
                | ApiError::CantInitiateConversation
                | ApiError::NotEnoughRightsToPostMessages,
            ) => Self::Forbidden,
            RequestError::RetryAfter(secs) => Self::RateLimited { retry_after: secs.duration() },
            other => Self::Transport(other.to_string()),
        }
    }
}

pub trait Forwarder {
    async fn forward(&self, to: ChatId, from: ChatId, message: MessageId) -> Result<(), ForwardError>;
}

#[derive(Clone)]
pub struct TelegramForwarder {
    bot: Bot,
    /// Короткие ожидания (не длиннее cap) пережидаем и повторяем один раз.
    rate_limit_cap: Duration,
}

impl TelegramForwarder {
    pub fn new(bot: Bot, rate_limit_cap: Duration) -> Self {
        Self { bot, rate_limit_cap }
    }

    async fn forward_once(&self, to: ChatId, from: ChatId, message: MessageId) -> Result<(), ForwardError> {
        self.bot.forward_message(to, from, message).await?;
        Ok(())
    }
}

impl Forwarder for TelegramForwarder {
    async fn forward(&self, to: ChatId, from: ChatId, message: MessageId) -> Result<(), ForwardError> {
        match self.forward_once(to, from, message).await {
            Err(ForwardError::RateLimited { retry_after })
                if !retry_after.is_zero() && retry_after <= self.rate_limit_cap =>
            {
                tracing::debug!(?retry_after, message_id = message.0, "rate limited, waiting before retry");
                tokio::time::sleep(retry_after).await;
                self.forward_once(to, from, message).await
            }
            res => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    async fn forwarder_against(server: &MockServer) -> TelegramForwarder {
        forwarder_with_cap(server, Duration::ZERO)
    }

    fn forwarder_with_cap(server: &MockServer, cap: Duration) -> TelegramForwarder {
        let url = reqwest::Url::parse(&server.uri()).unwrap();
        let bot = Bot::new("123456:TEST").set_api_url(url);
        TelegramForwarder::new(bot, cap)
    }

    async fn respond_with(body: serde_json::Value, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn deleted_source_post_is_source_missing() {
        let server = respond_with(
            json!({"ok": false, "error_code": 400, "description": "Bad Request: message to forward not found"}),
            400,
        )
        .await;
        let fw = forwarder_against(&server).await;

        let res = fw.forward(ChatId(42), ChatId(-1001), MessageId(15)).await;
        assert_eq!(res, Err(ForwardError::SourceMissing));
    }

    #[tokio::test]
    async fn blocked_bot_is_forbidden() {
        let server = respond_with(
            json!({"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}),
            403,
        )
        .await;
        let fw = forwarder_against(&server).await;

        let res = fw.forward(ChatId(42), ChatId(-1001), MessageId(15)).await;
        assert_eq!(res, Err(ForwardError::Forbidden));
    }

    #[tokio::test]
    async fn rate_limit_over_cap_is_reported() {
        let server = respond_with(
            json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 3",
                "parameters": {"retry_after": 3}
            }),
            429,
        )
        .await;
        let fw = forwarder_against(&server).await;

        let res = fw.forward(ChatId(42), ChatId(-1001), MessageId(15)).await;
        assert_eq!(res, Err(ForwardError::RateLimited { retry_after: Duration::from_secs(3) }));
    }

    #[tokio::test]
    async fn short_rate_limit_is_waited_out_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 1",
                "parameters": {"retry_after": 1}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {
                    "message_id": 7,
                    "date": 1700000000,
                    "chat": {"id": 42, "type": "private", "first_name": "Ann"},
                    "from": {"id": 1, "is_bot": true, "first_name": "Relay"},
                    "text": "Avatar (2009)"
                }
            })))
            .mount(&server)
            .await;
        let fw = forwarder_with_cap(&server, DEFAULT_RATE_LIMIT_CAP);

        let res = fw.forward(ChatId(42), ChatId(-1001), MessageId(15)).await;
        assert_eq!(res, Ok(()));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[test]
    fn unknown_api_errors_are_transport() {
        let e = ForwardError::from(RequestError::Api(ApiError::Unknown("Bad Request: something new".into())));
        assert!(matches!(e, ForwardError::Transport(_)));
    }
}
