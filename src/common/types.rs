use serde_json::Value;

/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(u: u64) -> Self {
                Self(u)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>().map(Self)
            }
        }

        impl $name {
            /// Reads a Discord snowflake, which the API sends as a JSON string.
            pub fn from_json(v: &Value) -> Option<Self> {
                match v {
                    Value::String(s) => s.parse().ok(),
                    Value::Number(n) => n.as_u64().map(Self),
                    _ => None,
                }
            }
        }
    };
}

snowflake!(
    /// Discord user identifier.
    UserId
);
snowflake!(
    /// Discord guild identifier.
    GuildId
);
snowflake!(
    /// Discord channel identifier.
    ChannelId
);

/// Converts any `Display`-able value into the project's boxed error type.
#[inline]
pub fn map_boxed_err<E: std::fmt::Display>(e: E) -> AnyError {
    Box::new(std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflakes_parse_from_strings_and_numbers() {
        assert_eq!(
            UserId::from_json(&serde_json::json!("369975308767461378")),
            Some(UserId(369975308767461378))
        );
        assert_eq!(ChannelId::from_json(&serde_json::json!(42)), Some(ChannelId(42)));
        assert_eq!(GuildId::from_json(&serde_json::json!("nope")), None);
        assert_eq!(GuildId::from_json(&Value::Null), None);
    }
}
