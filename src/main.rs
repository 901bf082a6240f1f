use std::env;
use std::sync::Arc;

use poise::serenity_prelude::{self as serenity, GuildId, Http};
use serenity::GatewayIntents;
use tracing::{error, info};
use warden::config::Settings;
use warden::dashboard::{self, AppState};
use warden::moderation::SerenityPlatform;
use warden::{BOT_NAME, Data, Error, commands, handlers, logging};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let settings = Settings::load()?;
    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;
    let guild_id = GuildId::new(settings.guild_id.ok_or("GUILD_ID must be set")?);

    // Platform calls from the dashboard go through their own Http client
    let http = Arc::new(Http::new(&token));
    let platform = Arc::new(SerenityPlatform::new(http, guild_id));
    let data = Data::load(settings.clone(), platform).await;

    if settings.dashboard.enabled {
        let state = AppState::new(
            Arc::clone(&data.moderation),
            settings.dashboard.api_tokens.clone(),
        );
        let bind = settings.dashboard.bind.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(&bind, state).await {
                error!("Dashboard stopped: {e}");
            }
        });
    }

    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let Err(e) = poise::builtins::on_error(error).await {
                        error!("Failed to report command error: {e}");
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console(format!("Registering commands in guild {guild_id}"));
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                    .await?;
                Ok(framework_data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .type_map_insert::<Data>(data)
        .await?;

    info!("Starting {BOT_NAME}...");
    client.start().await?;

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start the runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
