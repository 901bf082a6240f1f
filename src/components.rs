//! Message components: custom ids plus the buttons, menus, modals and embeds
//! shared by commands and the event handler.

use crate::policy::Rule;
use crate::tickets::{OpenedTicket, TicketKind};
use crate::verify::RobloxAccount;
use derive_more::Display;
use poise::serenity_prelude::{
    ButtonStyle, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter, CreateInputText,
    CreateMessage, CreateModal, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption,
    InputTextStyle, Timestamp,
};
use std::str::FromStr;

/// Name of the reason input inside moderation modals
pub const REASON_INPUT: &str = "reason";

const PANEL_COLOUR: u32 = 0x2b2d31;
const WELCOME_COLOUR: u32 = 0x00aaff;
const CLAIM_COLOUR: u32 = 0xffaa00;
const RULES_COLOUR: u32 = 0x5865f2;
const VERIFY_COLOUR: u32 = 0x00a2ff;

/// Server rules shown by the rules panel
pub const RULES: [&str; 5] = [
    "1️⃣ Be respectful",
    "2️⃣ No spam or advertising",
    "3️⃣ No NSFW content",
    "4️⃣ Follow Discord Terms of Service",
    "5️⃣ Staff decisions are final",
];

/// Staff responses offered on an automod log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AutomodAction {
    #[display("ignore")]
    Ignore,
    #[display("ban")]
    Ban,
    #[display("kick")]
    Kick,
    #[display("warn")]
    Warn,
    #[display("timeout")]
    Timeout,
}

impl AutomodAction {
    pub const ALL: [Self; 5] = [Self::Ignore, Self::Ban, Self::Kick, Self::Warn, Self::Timeout];

    fn label(self) -> &'static str {
        match self {
            Self::Ignore => "Ignore",
            Self::Ban => "Ban",
            Self::Kick => "Kick",
            Self::Warn => "Warn",
            Self::Timeout => "Timeout",
        }
    }

    fn style(self) -> ButtonStyle {
        match self {
            Self::Ignore | Self::Warn => ButtonStyle::Secondary,
            Self::Ban => ButtonStyle::Danger,
            Self::Kick => ButtonStyle::Primary,
            Self::Timeout => ButtonStyle::Success,
        }
    }
}

impl FromStr for AutomodAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.to_string() == s)
            .ok_or_else(|| format!("Unknown automod action: {s}"))
    }
}

/// Every custom id the bot puts on a component or modal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentId {
    AutomodButton { action: AutomodAction, subject: String },
    AutomodModal { action: AutomodAction, subject: String },
    TicketSelect,
    TicketClose { opener: String },
    TicketReopen { opener: String },
    TicketClaim,
    RulesSelect,
    /// Only the verified member may press it
    Unverify { subject: String },
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutomodButton { action, subject } => write!(f, "automod:{action}:{subject}"),
            Self::AutomodModal { action, subject } => write!(f, "automod-modal:{action}:{subject}"),
            Self::TicketSelect => f.write_str("ticket:select"),
            Self::TicketClose { opener } => write!(f, "ticket:close:{opener}"),
            Self::TicketReopen { opener } => write!(f, "ticket:reopen:{opener}"),
            Self::TicketClaim => f.write_str("ticket:claim"),
            Self::RulesSelect => f.write_str("rules:select"),
            Self::Unverify { subject } => write!(f, "verify:unverify:{subject}"),
        }
    }
}

impl ComponentId {
    /// Parse a custom id; ids from other bots or older panels yield `None`
    #[must_use]
    pub fn parse(custom_id: &str) -> Option<Self> {
        let parts: Vec<&str> = custom_id.split(':').collect();
        let subject = |s: &str| {
            (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())).then(|| s.to_string())
        };

        match parts.as_slice() {
            ["automod", action, id] => Some(Self::AutomodButton {
                action: action.parse().ok()?,
                subject: subject(id)?,
            }),
            ["automod-modal", action, id] => Some(Self::AutomodModal {
                action: action.parse().ok()?,
                subject: subject(id)?,
            }),
            ["ticket", "select"] => Some(Self::TicketSelect),
            ["ticket", "close", id] => Some(Self::TicketClose { opener: subject(id)? }),
            ["ticket", "reopen", id] => Some(Self::TicketReopen { opener: subject(id)? }),
            ["ticket", "claim"] => Some(Self::TicketClaim),
            ["rules", "select"] => Some(Self::RulesSelect),
            ["verify", "unverify", id] => Some(Self::Unverify { subject: subject(id)? }),
            _ => None,
        }
    }
}

/// DM sent to a member whose message automod removed
#[must_use]
pub fn automod_notice(rule: Rule, reason: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("⚠️ Auto Warning")
        .description(format!("You were warned for: **{reason}**"))
        .colour(rule.colour())
}

/// Mod-log entry for an automod violation
#[must_use]
pub fn automod_log(rule: Rule, subject: &str, reason: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("🚨 AutoMod Violation")
        .colour(rule.colour())
        .field("User", format!("<@{subject}>"), true)
        .field("Reason", reason, true)
        .field("Rule", rule.to_string(), true)
        .timestamp(Timestamp::now())
}

/// Ignore / Ban / Kick / Warn / Timeout buttons for one subject
#[must_use]
pub fn automod_buttons(subject: &str) -> CreateActionRow {
    CreateActionRow::Buttons(
        AutomodAction::ALL
            .into_iter()
            .map(|action| {
                let id = ComponentId::AutomodButton {
                    action,
                    subject: subject.to_string(),
                };
                CreateButton::new(id.to_string())
                    .label(action.label())
                    .style(action.style())
            })
            .collect(),
    )
}

/// Modal asking staff for the reason behind an automod follow-up
#[must_use]
pub fn reason_modal(action: AutomodAction, subject: &str) -> CreateModal {
    let id = ComponentId::AutomodModal {
        action,
        subject: subject.to_string(),
    };
    let input = CreateInputText::new(InputTextStyle::Paragraph, "Reason", REASON_INPUT).required(true);
    CreateModal::new(id.to_string(), format!("Confirm {}", action.label()))
        .components(vec![CreateActionRow::InputText(input)])
}

/// Ticket panel message: embed plus the ticket type select menu
#[must_use]
pub fn ticket_panel() -> CreateMessage {
    let embed = CreateEmbed::new()
        .title("🎫 Support Ticket System")
        .description(
            "Need help? Open a ticket using the dropdown below.\n\n📌 Choose the type of support you need.",
        )
        .colour(PANEL_COLOUR);

    let options = TicketKind::ALL
        .into_iter()
        .map(|kind| {
            CreateSelectMenuOption::new(kind.label(), kind.to_string()).emoji(kind.emoji())
        })
        .collect();
    let menu = CreateSelectMenu::new(
        ComponentId::TicketSelect.to_string(),
        CreateSelectMenuKind::String { options },
    )
    .placeholder("Select a ticket type");

    CreateMessage::new()
        .embed(embed)
        .components(vec![CreateActionRow::SelectMenu(menu)])
}

/// Greeting posted in a new ticket channel
#[must_use]
pub fn ticket_welcome(ticket: &OpenedTicket, opener: &str) -> CreateEmbed {
    let team = ticket
        .support_role
        .map_or_else(|| "support".to_string(), |role| format!("<@&{role}>"));
    CreateEmbed::new()
        .title("👋 Welcome to Your Ticket")
        .description(format!(
            "Hello <@{opener}>,\n\n🎟️ Thank you for opening a **{}** ticket.\n\nOur **{team}** team will be with you shortly. Please provide all details about your issue.",
            ticket.kind
        ))
        .colour(WELCOME_COLOUR)
}

/// Close / Re-Open / Claim buttons inside a ticket
#[must_use]
pub fn ticket_controls(opener: &str) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(ComponentId::TicketClose { opener: opener.to_string() }.to_string())
            .label("Close Ticket")
            .style(ButtonStyle::Danger),
        CreateButton::new(ComponentId::TicketReopen { opener: opener.to_string() }.to_string())
            .label("Re-Open Ticket")
            .style(ButtonStyle::Success),
        CreateButton::new(ComponentId::TicketClaim.to_string())
            .label("Claim Ticket")
            .style(ButtonStyle::Primary),
    ])
}

#[must_use]
pub fn ticket_claimed(claimer: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("🎟️ Ticket Claimed")
        .description(format!(
            "This ticket has been claimed by <@{claimer}>. Only the claimer and the opener can reply now."
        ))
        .colour(CLAIM_COLOUR)
}

/// Select menu for the rules panel
#[must_use]
pub fn rules_panel() -> CreateActionRow {
    let options = vec![CreateSelectMenuOption::new("View Rules", "view_rules")];
    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(
            ComponentId::RulesSelect.to_string(),
            CreateSelectMenuKind::String { options },
        )
        .placeholder("📜 View Server Rules"),
    )
}

#[must_use]
pub fn rules_embed(guild_name: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("📜 {guild_name} Server Rules"))
        .description(RULES.join("\n"))
        .colour(RULES_COLOUR)
        .footer(CreateEmbedFooter::new("Check our rules to avoid moderation"))
}

/// Verification result card for a linked Roblox account
#[must_use]
pub fn verify_embed(account: &RobloxAccount, guild_name: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("✅ Bloxlink Verification")
        .colour(VERIFY_COLOUR)
        .thumbnail(account.headshot_url())
        .image(account.avatar_url())
        .field("Roblox Username", &account.username, true)
        .field("Display Name", &account.display_name, true)
        .field("Roblox ID", &account.id, true)
        .footer(CreateEmbedFooter::new(format!("{guild_name} Verification")))
        .timestamp(Timestamp::now())
}

/// Profile link plus an Unverify button bound to `subject`
#[must_use]
pub fn verify_buttons(account: &RobloxAccount, subject: &str) -> CreateActionRow {
    let unverify = ComponentId::Unverify {
        subject: subject.to_string(),
    };
    CreateActionRow::Buttons(vec![
        CreateButton::new_link(account.profile_url()).label("View Profile"),
        CreateButton::new(unverify.to_string())
            .label("Unverify")
            .style(ButtonStyle::Danger),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automod_ids() {
        let id = ComponentId::AutomodButton {
            action: AutomodAction::Timeout,
            subject: "123".to_string(),
        };
        assert_eq!(id.to_string(), "automod:timeout:123");
        assert_eq!(ComponentId::parse("automod:timeout:123"), Some(id));

        assert_eq!(
            ComponentId::parse("automod-modal:ban:42"),
            Some(ComponentId::AutomodModal {
                action: AutomodAction::Ban,
                subject: "42".to_string(),
            })
        );
    }

    #[test]
    fn test_ticket_and_rules_ids() {
        assert_eq!(ComponentId::parse("ticket:select"), Some(ComponentId::TicketSelect));
        assert_eq!(ComponentId::parse("ticket:claim"), Some(ComponentId::TicketClaim));
        assert_eq!(ComponentId::parse("rules:select"), Some(ComponentId::RulesSelect));
        assert_eq!(
            ComponentId::parse("ticket:reopen:77"),
            Some(ComponentId::TicketReopen { opener: "77".to_string() })
        );
        assert_eq!(
            ComponentId::TicketClose { opener: "77".to_string() }.to_string(),
            "ticket:close:77"
        );
    }

    #[test]
    fn test_unknown_ids() {
        assert_eq!(ComponentId::parse(""), None);
        assert_eq!(ComponentId::parse("close_ticket"), None);
        assert_eq!(ComponentId::parse("automod:explode:1"), None);
        assert_eq!(ComponentId::parse("automod:ban:"), None);
        assert_eq!(ComponentId::parse("automod:ban:<@1>"), None);
        assert_eq!(ComponentId::parse("ticket:close:1:extra"), None);
    }

    #[test]
    fn test_action_parsing() {
        for action in AutomodAction::ALL {
            assert_eq!(action.to_string().parse::<AutomodAction>(), Ok(action));
        }
        assert!("mute".parse::<AutomodAction>().is_err());
    }

    #[test]
    fn test_automod_buttons_cover_every_action() {
        let CreateActionRow::Buttons(buttons) = automod_buttons("5") else {
            panic!("Expected a button row");
        };
        assert_eq!(buttons.len(), AutomodAction::ALL.len());
    }

    #[test]
    fn test_ticket_panel_message() {
        let panel = serde_json::to_value(ticket_panel()).unwrap();
        assert_eq!(panel["embeds"][0]["title"], "🎫 Support Ticket System");
        let raw = panel["components"].to_string();
        assert!(raw.contains("ticket:select"));
        for kind in TicketKind::ALL {
            assert!(raw.contains(&format!("\"{kind}\"")));
        }
    }

    #[test]
    fn test_unverify_id() {
        let id = ComponentId::Unverify { subject: "42".to_string() };
        assert_eq!(id.to_string(), "verify:unverify:42");
        assert_eq!(ComponentId::parse("verify:unverify:42"), Some(id));
        assert_eq!(ComponentId::parse("verify:unverify:"), None);
        assert_eq!(ComponentId::parse("unverify_42"), None);
    }

    #[test]
    fn test_verify_card() {
        let account = RobloxAccount {
            id: "261".to_string(),
            username: "builderman".to_string(),
            display_name: "Builder".to_string(),
        };
        let embed = serde_json::to_value(verify_embed(&account, "Warden HQ")).unwrap();
        assert_eq!(embed["title"], "✅ Bloxlink Verification");
        assert_eq!(embed["color"], VERIFY_COLOUR);
        assert_eq!(embed["footer"]["text"], "Warden HQ Verification");
        assert_eq!(embed["fields"][2]["value"], "261");

        let CreateActionRow::Buttons(buttons) = verify_buttons(&account, "42") else {
            panic!("Expected a button row");
        };
        assert_eq!(buttons.len(), 2);
        let raw = serde_json::to_string(&buttons).unwrap();
        assert!(raw.contains("https://www.roblox.com/users/261/profile"));
        assert!(raw.contains("verify:unverify:42"));
    }
}
