//! Automod content policy
//!
//! Pure checks over a single message's text. Link posting is checked before
//! emoji spam and the first rule that fires decides the verdict.

use derive_more::Display;
use regex::Regex;
use std::sync::LazyLock;

/// Minimum emoji count that counts as spam unless configured otherwise
pub const DEFAULT_EMOJI_THRESHOLD: usize = 8;

static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("valid link pattern"));

// The GIF exception applies to the end of the whole message, not to each link
static GIF_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.gif(\?.*)?$").expect("valid gif pattern"));

static EMOJI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<a?:\w+:\d+>|[\x{1F300}-\x{1FAFF}]").expect("valid emoji pattern")
});

/// Which rule a message broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Rule {
    #[display("Link")]
    Link,
    #[display("Emoji spam")]
    EmojiSpam,
}

impl Rule {
    /// Embed colour used when reporting this rule
    #[must_use]
    pub fn colour(self) -> u32 {
        match self {
            Self::Link => 0xff0000,
            Self::EmojiSpam => 0xff9900,
        }
    }
}

/// Outcome of evaluating a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Violation { rule: Rule, reason: String },
}

impl Verdict {
    #[must_use]
    pub fn violated(&self) -> bool {
        matches!(self, Self::Violation { .. })
    }

    /// The reason to record, empty when clean
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Clean => "",
            Self::Violation { reason, .. } => reason,
        }
    }

    #[must_use]
    pub fn rule(&self) -> Option<Rule> {
        match self {
            Self::Clean => None,
            Self::Violation { rule, .. } => Some(*rule),
        }
    }
}

/// Tunable policy parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub emoji_threshold: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            emoji_threshold: DEFAULT_EMOJI_THRESHOLD,
        }
    }
}

impl Policy {
    /// Evaluate a message against every rule, first match wins
    #[must_use]
    pub fn evaluate(&self, content: &str) -> Verdict {
        if let Some(verdict) = check_links(content) {
            return verdict;
        }
        if let Some(verdict) = check_emoji_spam(content, self.emoji_threshold) {
            return verdict;
        }
        Verdict::Clean
    }
}

fn check_links(content: &str) -> Option<Verdict> {
    (LINK_PATTERN.is_match(content) && !GIF_SUFFIX.is_match(content)).then(|| {
        Verdict::Violation {
            rule: Rule::Link,
            reason: "Posting non-approved links".to_string(),
        }
    })
}

fn check_emoji_spam(content: &str, threshold: usize) -> Option<Verdict> {
    let count = count_emojis(content);
    (count >= threshold).then(|| Verdict::Violation {
        rule: Rule::EmojiSpam,
        reason: format!("Emoji spam ({count} emojis)"),
    })
}

/// Count custom emoji tokens and pictographs in the emoji block
#[must_use]
pub fn count_emojis(content: &str) -> usize {
    EMOJI_PATTERN.find_iter(content).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_emojis(n: usize) -> String {
        (0..n)
            .map(|i| format!("<:pepe{i}:10{i}>"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_plain_link_is_violation() {
        let verdict = Policy::default().evaluate("check this out http://example.com/x");
        assert!(verdict.violated());
        assert!(verdict.reason().contains("link"));
        assert_eq!(verdict.rule(), Some(Rule::Link));
    }

    #[test]
    fn test_gif_link_is_allowed() {
        let verdict = Policy::default().evaluate("funny.gif here http://cdn.site/a.gif");
        assert_eq!(verdict, Verdict::Clean);

        let verdict = Policy::default().evaluate("https://media.tenor.com/x.GIF?width=200");
        assert!(!verdict.violated());
    }

    #[test]
    fn test_gif_must_end_the_message() {
        let verdict = Policy::default().evaluate("https://cdn.site/a.gif and more text");
        assert!(verdict.violated());
    }

    #[test]
    fn test_emoji_threshold() {
        let policy = Policy::default();

        let verdict = policy.evaluate(&custom_emojis(7));
        assert!(!verdict.violated());

        let verdict = policy.evaluate(&custom_emojis(8));
        assert!(verdict.violated());
        assert_eq!(verdict.reason(), "Emoji spam (8 emojis)");

        let verdict = policy.evaluate(&custom_emojis(11));
        assert_eq!(verdict.reason(), "Emoji spam (11 emojis)");
    }

    #[test]
    fn test_unicode_and_animated_emojis_count() {
        assert_eq!(count_emojis("🔥🔥🚀 <a:dance:123> <:ok:9>"), 5);
        // U+2764 (heavy heart) is outside the counted block
        assert_eq!(count_emojis("\u{2764}"), 0);
        assert_eq!(count_emojis("no emoji :smile: here"), 0);
    }

    #[test]
    fn test_link_takes_priority_over_emoji_spam() {
        let content = format!("{} https://spam.example", custom_emojis(10));
        let verdict = Policy::default().evaluate(&content);
        assert_eq!(verdict.rule(), Some(Rule::Link));
    }

    #[test]
    fn test_custom_threshold() {
        let policy = Policy { emoji_threshold: 3 };
        assert!(policy.evaluate("🎉🎉🎉").violated());
        assert!(!policy.evaluate("🎉🎉").violated());
    }

    #[test]
    fn test_clean_message() {
        let verdict = Policy::default().evaluate("hello everyone, see you at 8");
        assert_eq!(verdict, Verdict::Clean);
        assert_eq!(verdict.reason(), "");
        assert!(verdict.rule().is_none());
    }
}
