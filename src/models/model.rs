use serde::{Deserialize, Serialize};

/// Row of the `models` lookup table. Assistant messages point here by `id`
/// so a later rename of slug or display name does not orphan history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ModelRow {
    pub id: i32,
    pub slug: String,
    pub display_name: String,
    pub provider: String,
}
