/// A chat command addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// All recorded totals.
    Totals,
    /// The session in progress, if any.
    Now,
    /// Total for one game; `None` when no name was given.
    Game(Option<String>),
}

impl Command {
    /// Parses `content` if it starts with `prefix` and names a known command.
    /// Names are matched case-insensitively; the game argument is kept as typed.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        if prefix.is_empty() {
            return None;
        }
        let rest = content.trim_start().strip_prefix(prefix)?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name.to_lowercase().as_str() {
            "totals" | "vertiempo" => Some(Self::Totals),
            "now" | "tiemporeal" => Some(Self::Now),
            "game" | "tiempo" => Some(Self::Game(
                (!arg.is_empty()).then(|| arg.to_string()),
            )),
            _ => None,
        }
    }
}

pub fn usage(prefix: &str) -> String {
    format!("ℹ️ Usage: `{}game <name>`", prefix)
}
