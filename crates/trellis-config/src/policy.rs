use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How an explicit service override treats the entry it would replace.
///
/// Only consulted when overrides are allowed at all.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OverridePolicy {
    /// Replace the live entry and notify its owner.
    #[default]
    Replace,
    /// Refuse the override until the current owner relinquishes the key.
    RequireRelinquish,
}
