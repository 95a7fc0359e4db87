use crate::{Context, Error};

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let challenges = ctx.data().challenges.len();
    ctx.say(format!("Pong! {challenges} challenge(s) in play."))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_command_definition() {
        let cmd = ping();
        assert_eq!(cmd.name, "ping");
        assert!(cmd
            .description
            .as_deref()
            .unwrap_or_default()
            .contains("check if the bot is responsive"));
        assert!(cmd.create_as_slash_command().is_some());
    }
}
