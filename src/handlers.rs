use crate::components::{self, AutomodAction, ComponentId, REASON_INPUT};
use crate::config::Settings;
use crate::moderation::{ModerationResult, ModerationService};
use crate::policy::{Rule, Verdict};
use crate::tickets::TicketKind;
use crate::verify::Verifier;
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, ActionRowComponent, ChannelId, ComponentInteraction,
    ComponentInteractionDataKind, Context, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, EventHandler, GuildId, Interaction, Member,
    Message, ModalInteraction, Ready,
};
use tracing::{debug, error, info, warn};

pub struct Handler;

/// Shared bot state stored in the client's type map
async fn bot_data(ctx: &Context) -> Option<Data> {
    let data = ctx.data.read().await.get::<Data>().cloned();
    if data.is_none() {
        error!(target: EVENT_TARGET, "Bot data missing from the type map");
    }
    data
}

fn role_ids(member: Option<&Member>) -> Vec<u64> {
    member.map_or_else(Vec::new, |member| {
        member.roles.iter().map(|role| role.get()).collect()
    })
}

/// Channel that gets a fresh ticket panel at startup, if configured
fn panel_channel(settings: &Settings) -> Option<ChannelId> {
    settings
        .tickets
        .panel_channel_id
        .filter(|id| *id != 0)
        .map(ChannelId::new)
}

fn ephemeral(content: impl Into<String>) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Pull the reason typed into a moderation modal
fn modal_reason(modal: &ModalInteraction) -> Option<String> {
    modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == REASON_INPUT => {
                input.value.clone()
            }
            _ => None,
        })
}

/// Reset the nickname of the member who pressed their own Unverify button
async fn unverify_response(
    verifier: Option<&Verifier>,
    subject: &str,
    presser: &str,
) -> CreateInteractionResponse {
    if subject != presser {
        return ephemeral("❌ You cannot use someone else’s buttons.");
    }
    let Some(verifier) = verifier else {
        return ephemeral("❌ Verification is not set up on this server.");
    };
    verifier.unverify(subject).await;
    CreateInteractionResponse::UpdateMessage(
        CreateInteractionResponseMessage::new()
            .content("❌ You have been unverified. You can now verify a new Roblox account.")
            .embeds(Vec::new())
            .components(Vec::new()),
    )
}

/// Carry out the staff follow-up chosen on an automod log entry
///
/// The subject must still be a guild member, as when the entry was logged.
pub async fn apply_automod_action(
    service: &ModerationService,
    action: AutomodAction,
    subject: &str,
    reason: &str,
) -> ModerationResult<String> {
    if action == AutomodAction::Ignore {
        return Ok("Ignored.".to_string());
    }

    let member = service.fetch_subject(subject).await?;
    let name = member.username;
    match action {
        AutomodAction::Ignore => Ok("Ignored.".to_string()),
        AutomodAction::Ban => {
            service.ban(subject, Some(reason)).await?;
            Ok(format!("🔨 Banned {name}"))
        }
        AutomodAction::Kick => {
            service.kick(subject, Some(reason)).await?;
            Ok(format!("👢 Kicked {name}"))
        }
        AutomodAction::Warn => {
            let entry = service.warn(subject, Some(reason)).await;
            service
                .notify(subject, &format!("⚠️ You were warned: **{}**", entry.reason()))
                .await;
            Ok(format!("⚠️ Warned {name}"))
        }
        AutomodAction::Timeout => {
            let duration = service.timeout(subject, Some(reason), None).await?;
            Ok(format!(
                "⏳ Timed out {name} for {} minutes",
                duration.as_secs() / 60
            ))
        }
    }
}

impl Handler {
    /// Delete the message, record the warning, DM the author and tell the mod log
    async fn handle_violation(
        &self,
        ctx: &Context,
        data: &Data,
        msg: &Message,
        rule: Rule,
        reason: &str,
    ) {
        let subject = msg.author.id.to_string();

        if let Err(e) = msg.delete(&ctx.http).await {
            warn!(target: EVENT_TARGET, message_id = %msg.id, error = %e, "Failed to delete flagged message");
        }

        data.moderation.auto_warn(&subject, reason).await;

        let notice = CreateMessage::new().embed(components::automod_notice(rule, reason));
        if let Err(e) = msg.author.direct_message(&ctx.http, notice).await {
            debug!(target: EVENT_TARGET, user_id = %subject, error = %e, "Automod DM not delivered");
        }

        let Some(channel_id) = data.settings.mod_log_channel_id else {
            return;
        };
        let log = CreateMessage::new()
            .embed(components::automod_log(rule, &subject, reason))
            .components(vec![components::automod_buttons(&subject)]);
        if let Err(e) = ChannelId::new(channel_id).send_message(&ctx.http, log).await {
            warn!(target: EVENT_TARGET, channel_id = channel_id, error = %e, "Failed to post automod log");
        }
    }

    async fn on_component(&self, ctx: &Context, data: &Data, component: ComponentInteraction) {
        let Some(id) = ComponentId::parse(&component.data.custom_id) else {
            return;
        };
        let user_id = component.user.id.to_string();
        let is_staff = data.is_staff(&role_ids(component.member.as_ref()));

        let response = match id {
            ComponentId::AutomodButton { .. } | ComponentId::TicketClaim if !is_staff => {
                ephemeral("❌ Staff only.")
            }
            ComponentId::AutomodButton {
                action: AutomodAction::Ignore,
                ..
            } => ephemeral("Ignored."),
            ComponentId::AutomodButton { action, subject } => {
                CreateInteractionResponse::Modal(components::reason_modal(action, &subject))
            }
            ComponentId::TicketSelect => self.open_ticket(ctx, data, &component, &user_id).await,
            ComponentId::TicketClose { opener } | ComponentId::TicketReopen { opener }
                if opener != user_id && !is_staff =>
            {
                ephemeral("❌ Only the ticket opener or staff can do that.")
            }
            ComponentId::TicketClose { opener } => {
                match data.tickets.close(component.channel_id.get(), &opener).await {
                    Ok(()) => ephemeral("🔒 Ticket closed!"),
                    Err(e) => ephemeral(format!("❌ Could not close ticket: {e}")),
                }
            }
            ComponentId::TicketReopen { opener } => {
                match data.tickets.reopen(component.channel_id.get(), &opener).await {
                    Ok(()) => ephemeral("✅ Ticket reopened!"),
                    Err(e) => ephemeral(format!("❌ Could not reopen ticket: {e}")),
                }
            }
            ComponentId::TicketClaim => {
                match data.tickets.claim(component.channel_id.get(), &user_id).await {
                    Ok(()) => CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content(format!("✅ Ticket claimed by <@{user_id}>"))
                            .embed(components::ticket_claimed(&user_id)),
                    ),
                    Err(e) => ephemeral(format!("❌ Could not claim ticket: {e}")),
                }
            }
            ComponentId::RulesSelect => {
                let guild_name = component
                    .guild_id
                    .and_then(|guild_id| guild_id.name(&ctx.cache))
                    .unwrap_or_else(|| "Server".to_string());
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .embed(components::rules_embed(&guild_name))
                        .ephemeral(true),
                )
            }
            ComponentId::Unverify { subject } => {
                unverify_response(data.verifier.as_ref(), &subject, &user_id).await
            }
            ComponentId::AutomodModal { .. } => return,
        };

        if let Err(e) = component.create_response(&ctx.http, response).await {
            warn!(
                target: EVENT_TARGET,
                custom_id = %component.data.custom_id,
                error = %e,
                "Failed to answer component interaction"
            );
        }
    }

    async fn open_ticket(
        &self,
        ctx: &Context,
        data: &Data,
        component: &ComponentInteraction,
        opener: &str,
    ) -> CreateInteractionResponse {
        let kind = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => {
                values.first().and_then(|value| value.parse::<TicketKind>().ok())
            }
            _ => None,
        };
        let Some(kind) = kind else {
            return ephemeral("❌ Unknown ticket type.");
        };

        let ticket = match data.tickets.open(kind, opener).await {
            Ok(ticket) => ticket,
            Err(e) => {
                error!(target: EVENT_TARGET, kind = %kind, error = %e, "Failed to open ticket");
                return ephemeral(format!("❌ Could not open ticket: {e}"));
            }
        };

        let mut ping = format!("<@{opener}>");
        if let Some(role) = ticket.support_role {
            ping.push_str(&format!(" | <@&{role}>"));
        }
        let welcome = CreateMessage::new()
            .content(ping)
            .embed(components::ticket_welcome(&ticket, opener))
            .components(vec![components::ticket_controls(opener)]);
        if let Err(e) = ChannelId::new(ticket.channel_id)
            .send_message(&ctx.http, welcome)
            .await
        {
            warn!(target: EVENT_TARGET, channel = %ticket.channel_name, error = %e, "Failed to greet ticket opener");
        }

        ephemeral(format!("✅ Ticket created: <#{}>", ticket.channel_id))
    }

    async fn on_modal(&self, ctx: &Context, data: &Data, modal: ModalInteraction) {
        let Some(ComponentId::AutomodModal { action, subject }) =
            ComponentId::parse(&modal.data.custom_id)
        else {
            return;
        };

        let response = if data.is_staff(&role_ids(modal.member.as_ref())) {
            let reason = modal_reason(&modal).unwrap_or_default();
            match apply_automod_action(&data.moderation, action, &subject, &reason).await {
                Ok(content) => ephemeral(content),
                Err(e) => ephemeral(format!("❌ {action} failed: {e}")),
            }
        } else {
            ephemeral("❌ Staff only.")
        };

        if let Err(e) = modal.create_response(&ctx.http, response).await {
            warn!(target: EVENT_TARGET, error = %e, "Failed to answer modal submission");
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");

        let Some(data) = bot_data(&ctx).await else {
            return;
        };
        if let Some(channel) = panel_channel(&data.settings) {
            match channel.send_message(&ctx.http, components::ticket_panel()).await {
                Ok(_) => info!(target: EVENT_TARGET, "Posted ticket panel in {channel}"),
                Err(e) => error!(target: EVENT_TARGET, "Failed to post ticket panel in {channel}: {e}"),
            }
        }
    }

    /// Run automod over guild messages from humans
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.guild_id.is_none() || msg.author.bot {
            return;
        }
        let Some(data) = bot_data(&ctx).await else {
            return;
        };
        if !data.settings.automod.enabled {
            return;
        }

        if let Verdict::Violation { rule, reason } = data.policy.evaluate(&msg.content) {
            info!(
                target: EVENT_TARGET,
                user_id = %msg.author.id,
                rule = %rule,
                "Automod violation"
            );
            self.handle_violation(&ctx, &data, &msg, rule, &reason).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(data) = bot_data(&ctx).await else {
            return;
        };
        match interaction {
            Interaction::Component(component) => self.on_component(&ctx, &data, component).await,
            Interaction::Modal(modal) => self.on_modal(&ctx, &data, modal).await,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{
        MemberSummary, MockPlatform, ModerationDefaults, ModerationError, Platform,
        PlatformError,
    };
    use crate::stats::StatsAggregator;
    use crate::store::RecordStore;
    use crate::verify::MockAccountLookup;
    use mockall::predicate::eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn service(platform: MockPlatform) -> ModerationService {
        let platform: Arc<dyn Platform> = Arc::new(platform);
        ModerationService::new(
            RecordStore::in_memory("warnings"),
            RecordStore::in_memory("strikes"),
            StatsAggregator::in_memory(),
            platform,
            ModerationDefaults::default(),
        )
    }

    fn expect_member(platform: &mut MockPlatform, id: &'static str, username: &'static str) {
        platform
            .expect_fetch_member()
            .with(eq(id))
            .returning(move |_| {
                Ok(MemberSummary {
                    id: id.to_string(),
                    username: username.to_string(),
                })
            });
    }

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[tokio::test]
    async fn test_ignore_touches_nothing() {
        let service = service(MockPlatform::new());
        let reply = apply_automod_action(&service, AutomodAction::Ignore, "1", "")
            .await
            .unwrap();
        assert_eq!(reply, "Ignored.");
        assert!(service.list_warnings("1").is_empty());
        assert!(service.stats_report().labels.is_empty());
    }

    #[tokio::test]
    async fn test_warn_records_and_notifies() {
        let mut platform = MockPlatform::new();
        expect_member(&mut platform, "9", "spammer");
        platform
            .expect_direct_message()
            .with(eq("9"), eq("⚠️ You were warned: **posting links**"))
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service(platform);

        let reply = apply_automod_action(&service, AutomodAction::Warn, "9", "posting links")
            .await
            .unwrap();
        assert_eq!(reply, "⚠️ Warned spammer");
        assert_eq!(service.list_warnings("9")[0].reason(), "posting links");
    }

    #[tokio::test]
    async fn test_timeout_uses_default_length() {
        let mut platform = MockPlatform::new();
        expect_member(&mut platform, "9", "spammer");
        platform
            .expect_timeout()
            .with(eq("9"), eq(Some(Duration::from_secs(600))), eq("spam"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = service(platform);

        let reply = apply_automod_action(&service, AutomodAction::Timeout, "9", "spam")
            .await
            .unwrap();
        assert_eq!(reply, "⏳ Timed out spammer for 10 minutes");
    }

    #[tokio::test]
    async fn test_ban_failure_is_reported() {
        let mut platform = MockPlatform::new();
        expect_member(&mut platform, "9", "spammer");
        platform
            .expect_ban()
            .returning(|_, _| Err(PlatformError::Other("Missing permissions".to_string())));
        let service = service(platform);

        let result = apply_automod_action(&service, AutomodAction::Ban, "9", "spam").await;
        assert!(matches!(result, Err(ModerationError::Platform(_))));
        assert!(service.stats_report().labels.is_empty());
    }

    #[tokio::test]
    async fn test_departed_member_is_not_found() {
        let mut platform = MockPlatform::new();
        platform
            .expect_fetch_member()
            .returning(|_| Err(PlatformError::Other("Unknown Member".to_string())));
        platform.expect_kick().never();
        let service = service(platform);

        let result = apply_automod_action(&service, AutomodAction::Kick, "9", "spam").await;
        assert!(matches!(result, Err(ModerationError::SubjectNotFound(id)) if id == "9"));
    }

    #[test]
    fn test_role_ids_without_member() {
        assert!(role_ids(None).is_empty());
    }

    #[tokio::test]
    async fn test_unverify_only_by_owner() {
        let mut platform = MockPlatform::new();
        platform
            .expect_set_nickname()
            .with(eq("42"), eq(""))
            .times(1)
            .returning(|_, _| Ok(()));
        let verifier = Verifier::new(Arc::new(MockAccountLookup::new()), Arc::new(platform));

        let denied = unverify_response(Some(&verifier), "42", "7").await;
        let raw = serde_json::to_string(&denied).unwrap();
        assert!(raw.contains("someone else"));

        let done = unverify_response(Some(&verifier), "42", "42").await;
        let raw = serde_json::to_string(&done).unwrap();
        assert!(raw.contains("You have been unverified"));
    }

    #[tokio::test]
    async fn test_unverify_without_verifier() {
        let response = unverify_response(None, "42", "42").await;
        let raw = serde_json::to_string(&response).unwrap();
        assert!(raw.contains("not set up"));
    }

    #[test]
    fn test_panel_channel_from_settings() {
        let mut settings = Settings::default();
        assert_eq!(panel_channel(&settings), None);

        settings.tickets.panel_channel_id = Some(4242);
        assert_eq!(panel_channel(&settings), Some(ChannelId::new(4242)));

        settings.tickets.panel_channel_id = Some(0);
        assert_eq!(panel_channel(&settings), None);
    }
}
