use serde::{Deserialize, Serialize};

/// Logo shown for channels whose playlist entry carries no `tvg-logo`
pub const PLACEHOLDER_LOGO: &str =
    "https://upload.wikimedia.org/wikipedia/commons/thumb/0/05/Flag_of_Brazil.svg/1200px-Flag_of_Brazil.svg.png";

/// Display name for entries where neither `tvg-name` nor a title is present
pub const UNNAMED_CHANNEL: &str = "Canal Sem Nome";

/// Prefix of every channel id (`br_1`, `br_2`, ...)
pub const CHANNEL_ID_PREFIX: &str = "br_";

/// Single live channel published in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub logo_url: String,
    pub stream_url: String,
}

impl Channel {
    /// Build the id for the channel at 1-based `position` in parse order
    pub fn id_for_position(position: usize) -> String {
        format!("{}{}", CHANNEL_ID_PREFIX, position)
    }
}
