use crate::forward::TelegramForwarder;
use crate::handlers::{App, START};
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    error_handlers::LoggingErrorHandler,
    prelude::*,
    utils::command::BotCommands,
};

/* ====== Команды ====== */
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "how to use the bot")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "find a movie and get it forwarded: /movie <name>")]
    Movie(String),
    // старое имя /movie
    #[command(hide)]
    Dbmovie(String),
    #[command(description = "how many movies are saved")]
    Stats,
    #[command(description = "list saved movies: /list [keyword]")]
    List(String),
}

pub async fn run(bot: Bot, app: App<TelegramForwarder>) {
    let channel = app.channel_id;
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint({
                    let app = app.clone();
                    move |bot: Bot, msg: Message, cmd: Command| {
                        let app = app.clone();
                        async move { on_command(bot, msg, cmd, &app).await }
                    }
                }),
        )
        .branch(
            // посты только из канала-источника
            Update::filter_channel_post()
                .filter(move |msg: Message| msg.chat.id == channel)
                .endpoint({
                    let app = app.clone();
                    move |msg: Message| {
                        let app = app.clone();
                        async move { on_channel_post(msg, &app).await }
                    }
                }),
        );

    Dispatcher::builder(bot, handler)
        // остальные апдейты (обычный текст, чужие каналы) молча пропускаем
        .default_handler(|_| std::future::ready(()))
        .error_handler(LoggingErrorHandler::with_custom_text("An error occurred in a handler"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped");
}

async fn on_command(bot: Bot, msg: Message, cmd: Command, app: &App<TelegramForwarder>) -> ResponseResult<()> {
    let chat = msg.chat.id;
    match cmd {
        Command::Start => {
            bot.send_message(chat, START).await?;
        }
        Command::Help => {
            bot.send_message(chat, Command::descriptions().to_string()).await?;
        }
        Command::Movie(query) | Command::Dbmovie(query) => {
            if let Some(reply) = app.lookup(chat, &query).await {
                bot.send_message(chat, reply).await?;
            }
        }
        Command::Stats => {
            bot.send_message(chat, app.stats().await).await?;
        }
        Command::List(keyword) => {
            bot.send_message(chat, app.list(&keyword).await).await?;
        }
    }
    Ok(())
}

async fn on_channel_post(msg: Message, app: &App<TelegramForwarder>) -> ResponseResult<()> {
    match msg.caption() {
        Some(caption) => app.ingest(caption, msg.id).await,
        None => tracing::debug!(message_id = msg.id.0, "channel post without caption, skipped"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_query_keeps_all_words() {
        let cmd = Command::parse("/movie Inception 2010", "relay_bot").unwrap();
        assert_eq!(cmd, Command::Movie("Inception 2010".to_string()));
    }

    #[test]
    fn dbmovie_is_accepted() {
        let cmd = Command::parse("/dbmovie avatar", "relay_bot").unwrap();
        assert_eq!(cmd, Command::Dbmovie("avatar".to_string()));
    }

    #[test]
    fn list_without_keyword() {
        assert_eq!(Command::parse("/list", "relay_bot").unwrap(), Command::List(String::new()));
    }

    #[test]
    fn bot_mention_is_stripped() {
        assert_eq!(Command::parse("/stats@relay_bot", "relay_bot").unwrap(), Command::Stats);
    }

    #[test]
    fn help_hides_the_alias() {
        let text = Command::descriptions().to_string();
        assert!(text.contains("/movie"));
        assert!(text.contains("/list"));
        assert!(!text.contains("/dbmovie"));
    }
}
