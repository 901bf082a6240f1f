use crate::components;
use crate::moderation::MAX_TIMEOUT_MINUTES;
use crate::verify::VERIFY_HELP_URL;
use crate::stats::StatsReport;
use crate::store::Entry;
use crate::{Context, Error};
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateMessage, Mentionable};
use poise::{CreateReply, command};
use std::time::Duration;

/// Days shown by the stats command
const STATS_DAYS: usize = 7;

/// Only members holding a configured staff role pass
async fn is_staff(ctx: Context<'_>) -> Result<bool, Error> {
    let Some(member) = ctx.author_member().await else {
        return Ok(false);
    };
    let roles: Vec<u64> = member.roles.iter().map(|role| role.get()).collect();
    Ok(ctx.data().is_staff(&roles))
}

async fn reply(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content)).await?;
    Ok(())
}

async fn reply_ephemeral(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Render a numbered list of entries, or a placeholder when empty
fn format_entries(kind: &str, user: &str, entries: &[Entry]) -> String {
    if entries.is_empty() {
        return format!("{user} has no {kind}.");
    }
    let lines: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{}. {entry}", i + 1))
        .collect();
    format!("📋 {} {kind} for {user}:\n{}", entries.len(), lines.join("\n"))
}

/// Render the most recent `days` of a stats report
fn format_stats(report: &StatsReport, days: usize) -> String {
    if report.labels.is_empty() {
        return "No moderation actions recorded yet.".to_string();
    }
    let start = report.labels.len().saturating_sub(days);
    (start..report.labels.len())
        .map(|i| {
            format!(
                "`{}` ⚠️ {} warns · ⏳ {} timeouts · 🔨 {} bans",
                report.labels[i], report.warns[i], report.timeouts[i], report.bans[i]
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let latency = ctx.ping().await;
    reply(ctx, format!("🏓 Pong! Gateway latency: {}ms", latency.as_millis())).await
}

/// Ban a member from the server
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let service = &ctx.data().moderation;
    match service.ban(&user.id.to_string(), reason.as_deref()).await {
        Ok(()) => reply(ctx, format!("🔨 Banned {}", user.tag())).await,
        Err(e) => reply_ephemeral(ctx, format!("❌ Could not ban {}: {e}", user.tag())).await,
    }
}

/// Lift a ban by user id
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User ID"] user_id: String,
) -> Result<(), Error> {
    let service = &ctx.data().moderation;
    match service.unban(user_id.trim()).await {
        Ok(()) => reply(ctx, format!("✅ Unbanned {}", user_id.trim())).await,
        Err(e) => reply_ephemeral(ctx, format!("❌ Could not unban {user_id}: {e}")).await,
    }
}

/// Kick a member from the server
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "User to kick"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let service = &ctx.data().moderation;
    match service.kick(&user.id.to_string(), reason.as_deref()).await {
        Ok(()) => reply(ctx, format!("👢 Kicked {}", user.tag())).await,
        Err(e) => reply_ephemeral(ctx, format!("❌ Could not kick {}: {e}", user.tag())).await,
    }
}

/// Time a member out
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn timeout(
    ctx: Context<'_>,
    #[description = "User to time out"] user: serenity::User,
    #[description = "Length in minutes"]
    #[min = 1]
    #[max = 40320]
    minutes: Option<u64>,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let service = &ctx.data().moderation;
    let duration = minutes.map(|m| Duration::from_secs(m.min(MAX_TIMEOUT_MINUTES) * 60));
    match service
        .timeout(&user.id.to_string(), reason.as_deref(), duration)
        .await
    {
        Ok(applied) => {
            reply(
                ctx,
                format!("⏳ Timed out {} for {} minutes", user.tag(), applied.as_secs() / 60),
            )
            .await
        }
        Err(e) => reply_ephemeral(ctx, format!("❌ Could not time out {}: {e}", user.tag())).await,
    }
}

/// Remove a member's timeout
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn untimeout(
    ctx: Context<'_>,
    #[description = "User"] user: serenity::User,
) -> Result<(), Error> {
    let service = &ctx.data().moderation;
    match service.untimeout(&user.id.to_string()).await {
        Ok(()) => reply(ctx, format!("✅ Removed timeout from {}", user.tag())).await,
        Err(e) => {
            reply_ephemeral(ctx, format!("❌ Could not remove timeout from {}: {e}", user.tag()))
                .await
        }
    }
}

/// Warn a member and DM them the reason
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "User to warn"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let service = &ctx.data().moderation;
    let subject = user.id.to_string();
    let entry = service.warn(&subject, reason.as_deref()).await;
    service
        .notify(&subject, &format!("⚠️ You were warned: **{}**", entry.reason()))
        .await;
    reply(ctx, format!("⚠️ Warned {}: {}", user.tag(), entry.reason())).await
}

/// List a member's warnings
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "User"] user: serenity::User,
) -> Result<(), Error> {
    let entries = ctx.data().moderation.list_warnings(&user.id.to_string());
    reply_ephemeral(ctx, format_entries("warnings", &user.tag(), &entries)).await
}

/// Clear all of a member's warnings
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn unwarn(
    ctx: Context<'_>,
    #[description = "User"] user: serenity::User,
) -> Result<(), Error> {
    ctx.data()
        .moderation
        .clear_warnings(&user.id.to_string())
        .await;
    reply(ctx, format!("✅ Cleared warnings for {}", user.tag())).await
}

/// Record a strike against a member
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn strike(
    ctx: Context<'_>,
    #[description = "User to strike"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let outcome = ctx
        .data()
        .moderation
        .strike(&user.id.to_string(), reason.as_deref())
        .await;
    reply(
        ctx,
        format!(
            "🛑 Strike {} for {}: {}",
            outcome.total_count,
            user.tag(),
            outcome.entry.reason()
        ),
    )
    .await
}

/// List a member's strikes
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn strikes(
    ctx: Context<'_>,
    #[description = "User"] user: serenity::User,
) -> Result<(), Error> {
    let entries = ctx.data().moderation.list_strikes(&user.id.to_string());
    reply_ephemeral(ctx, format_entries("strikes", &user.tag(), &entries)).await
}

/// Daily moderation totals for the last week
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let report = ctx.data().moderation.stats_report();
    let embed = CreateEmbed::new()
        .title("📊 Moderation Stats")
        .description(format_stats(&report, STATS_DAYS));
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Post the ticket panel in this channel
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn ticket_panel(ctx: Context<'_>) -> Result<(), Error> {
    ctx.channel_id()
        .send_message(ctx.http(), components::ticket_panel())
        .await?;
    reply_ephemeral(ctx, "✅ Ticket panel posted.").await
}

/// Post the server rules dropdown in this channel
#[command(slash_command, guild_only, check = "is_staff")]
pub async fn rules_panel(ctx: Context<'_>) -> Result<(), Error> {
    ctx.channel_id()
        .send_message(
            ctx.http(),
            CreateMessage::new()
                .content("📜 **Check our rules to avoid moderation actions.**")
                .components(vec![components::rules_panel()]),
        )
        .await?;
    reply_ephemeral(ctx, format!("✅ Rules dropdown posted in {}.", ctx.channel_id().mention()))
        .await
}

fn not_verified_message() -> String {
    format!(
        "❌ You are **not verified** with Bloxlink.\n\nTo verify instantly, please use the Bloxlink website:\n🔗 **{VERIFY_HELP_URL}**"
    )
}

/// Link your Roblox account through Bloxlink
#[command(prefix_command, slash_command, guild_only)]
pub async fn verify(ctx: Context<'_>) -> Result<(), Error> {
    let Some(verifier) = ctx.data().verifier.as_ref() else {
        return reply_ephemeral(ctx, "❌ Verification is not set up on this server.").await;
    };
    ctx.defer().await?;

    let subject = ctx.author().id.to_string();
    match verifier.verify(&subject).await {
        Ok(Some(account)) => {
            let guild_name = ctx
                .guild()
                .map(|guild| guild.name.clone())
                .unwrap_or_default();
            let card = CreateReply::default()
                .embed(components::verify_embed(&account, &guild_name))
                .components(vec![components::verify_buttons(&account, &subject)]);
            ctx.send(card).await?;
            Ok(())
        }
        Ok(None) => reply(ctx, not_verified_message()).await,
        Err(e) => reply_ephemeral(ctx, format!("❌ Could not reach Bloxlink: {e}")).await,
    }
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        ping(),
        ban(),
        unban(),
        kick(),
        timeout(),
        untimeout(),
        warn(),
        warnings(),
        unwarn(),
        strike(),
        strikes(),
        stats(),
        ticket_panel(),
        rules_panel(),
        verify(),
    ]
}
