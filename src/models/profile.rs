use serde::{Deserialize, Serialize};

/// The casting profile's visibility row - the one piece of content state
/// this core mutates. Rendering and editing live elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub visibility: Visibility,
    /// Whether the profile has passed moderation. Enforcement never
    /// re-publishes an unapproved profile.
    pub approved: bool,
    pub published_at: Option<i64>,
    /// Why the profile was last auto-unpublished, if it was.
    pub unpublished_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            _ => Err(()),
        }
    }
}
