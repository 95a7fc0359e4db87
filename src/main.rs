use poise::serenity_prelude::{self as serenity};
use rent_a_ra::{BotConfig, Data, Error, commands, handlers, logging, sweeper};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config = BotConfig::from_env()?;
    let token = config.token.clone();
    let data = Data::load(config).await;
    let framework_data = data.clone();

    // Configure the Poise framework
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
            on_error: |error| Box::pin(logging::on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands".to_string());
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                sweeper::start(
                    framework_data.clone(),
                    ctx.http.clone(),
                    sweeper::SWEEP_INTERVAL,
                );
                Ok(framework_data)
            })
        })
        .build();

    // Slash commands and components need no privileged intents
    let intents = GatewayIntents::non_privileged();
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler::new(data.clone()))
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    let shutdown_data = data.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            if let Err(e) = shutdown_data.save().await {
                error!(error = %e, "Failed to save data on shutdown");
            }
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    client.start().await?;

    data.save().await
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start the runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
