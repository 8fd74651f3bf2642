//! Логика бота без привязки к teloxide: индексация подписей канала,
//! поиск с пересылкой, /stats и /list. `tg` только доставляет события сюда.

use crate::forward::Forwarder;
use crate::matcher::{self, Lookup, MatchStrategy};
use crate::storage::{Storage, Upsert};
use std::sync::Arc;
use teloxide::types::{ChatId, MessageId};
use unicode_segmentation::UnicodeSegmentation;

/// Лимит ответа /list в UTF-16 единицах: так Telegram считает свои 4096.
pub const LIST_CHAR_BUDGET: usize = 3500;
/// Сколько графем ключевого слова показываем в ответе.
const KEYWORD_DISPLAY_LIMIT: usize = 64;

pub const USAGE: &str = "Usage: /movie <name>";
pub const EMPTY_INDEX: &str = "No movies saved yet.";
pub const NOT_FOUND: &str = "Movie not found!";
pub const FORWARD_FAILED: &str = "Found it, but couldn't forward it right now. Please try again later.";
pub const START: &str = "Send /movie <name> to get the movie!\n\
    /list [keyword] shows what is saved, /stats shows how many.";

pub struct App<F> {
    pub storage: Storage,
    pub forwarder: Arc<F>,
    pub channel_id: ChatId,
    pub strategy: MatchStrategy,
    pub forward_limit: usize,
}

// без bound `F: Clone`: форвардер лежит в Arc
impl<F> Clone for App<F> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            forwarder: Arc::clone(&self.forwarder),
            channel_id: self.channel_id,
            strategy: self.strategy,
            forward_limit: self.forward_limit,
        }
    }
}

impl<F: Forwarder> App<F> {
    /// Пост из канала-источника. Ошибки хранилища только логируются: пост теряется,
    /// следующий обрабатывается как обычно.
    pub async fn ingest(&self, caption: &str, message_id: MessageId) {
        match self.storage.upsert(caption, message_id.0).await {
            Ok(Upsert::Ignored) => {}
            Ok(outcome) => {
                tracing::info!(caption = caption.trim(), message_id = message_id.0, ?outcome, "indexed channel post");
            }
            Err(e) => {
                tracing::error!(caption = caption.trim(), message_id = message_id.0, error = %e, "failed to persist channel post, dropping it");
            }
        }
    }

    /// Поиск и пересылка найденного в `chat`. Возвращает текст ответа, если он нужен.
    pub async fn lookup(&self, chat: ChatId, query: &str) -> Option<String> {
        let entries = self.storage.all(None).await;
        let hits = match matcher::lookup(self.strategy, &entries, query) {
            Lookup::EmptyQuery => return Some(USAGE.to_string()),
            Lookup::EmptyIndex => return Some(EMPTY_INDEX.to_string()),
            Lookup::NotFound => return Some(NOT_FOUND.to_string()),
            Lookup::Found(hits) => hits,
        };

        let mut delivered = 0usize;
        let mut failed = 0usize;
        for entry in hits.iter().take(self.forward_limit) {
            let id = MessageId(entry.message_id);
            match self.forwarder.forward(chat, self.channel_id, id).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(chat = chat.0, message_id = id.0, caption = %entry.caption, error = %e, "forward failed");
                }
            }
        }

        if delivered == 0 && failed > 0 {
            return Some(FORWARD_FAILED.to_string());
        }
        if hits.len() > self.forward_limit {
            return Some(format!(
                "Showing the first {} of {} matches. Try a more specific name.",
                self.forward_limit,
                hits.len()
            ));
        }
        None
    }

    pub async fn stats(&self) -> String {
        format!("Movies saved: {}", self.storage.count().await)
    }

    pub async fn list(&self, keyword: &str) -> String {
        let keyword = keyword.trim();
        let total = self.storage.count().await;
        if total == 0 {
            return EMPTY_INDEX.to_string();
        }
        // `/list ()` и подобное считаем списком без фильтра
        if matcher::fold(keyword).is_empty() {
            let entries = self.storage.all(None).await;
            let captions: Vec<&str> = entries.iter().map(|e| e.caption.as_str()).collect();
            return render_listing(&format!("Saved movies: {total}"), &captions, LIST_CHAR_BUDGET);
        }

        let entries = self.storage.all(Some(keyword)).await;
        let shown_keyword = clip(keyword, KEYWORD_DISPLAY_LIMIT);
        if entries.is_empty() {
            return format!("No saved movies match \"{shown_keyword}\".");
        }
        let captions: Vec<&str> = entries.iter().map(|e| e.caption.as_str()).collect();
        let header = format!("Movies matching \"{shown_keyword}\": {} of {total}", entries.len());
        render_listing(&header, &captions, LIST_CHAR_BUDGET)
    }
}

/// Заголовок, затем `N. caption` построчно, пока влезает в `budget` UTF-16 единиц.
/// Если не всё влезло, в конце `…and K more`.
pub fn render_listing(header: &str, captions: &[&str], budget: usize) -> String {
    let mut out = header.to_string();
    let mut used = utf16_len(&out);
    let mut shown = 0usize;

    for (i, caption) in captions.iter().enumerate() {
        let line = format!("\n{}. {}", i + 1, caption);
        let rest = captions.len() - i - 1;
        // место под хвост «…and K more», если это не последняя строка
        let tail = if rest > 0 { utf16_len(&more_line(rest)) } else { 0 };
        if used + utf16_len(&line) + tail > budget {
            break;
        }
        used += utf16_len(&line);
        out.push_str(&line);
        shown += 1;
    }

    if shown < captions.len() {
        out.push_str(&more_line(captions.len() - shown));
    }
    out
}

fn more_line(rest: usize) -> String {
    format!("\n…and {rest} more")
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

fn clip(s: &str, max: usize) -> String {
    if s.graphemes(true).count() <= max {
        s.to_string()
    } else {
        s.graphemes(true).take(max).collect::<String>() + "…"
    }
}
