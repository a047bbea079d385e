//! Entity-kind tags and invalidation events.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Tag naming a kind of backend data, e.g. `match` or `player_stats`.
///
/// Tags are an open set: the well-known ones are provided as constants, and
/// any other string is a valid tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(Cow<'static, str>);

impl EntityKind {
    pub const MATCH: EntityKind = EntityKind::from_static("match");
    pub const CLUB: EntityKind = EntityKind::from_static("club");
    pub const PLAYER: EntityKind = EntityKind::from_static("player");
    pub const PLAYER_STATS: EntityKind = EntityKind::from_static("player_stats");
    pub const TRANSFER: EntityKind = EntityKind::from_static("transfer");
    pub const SEASON: EntityKind = EntityKind::from_static("season");
    pub const GOAL: EntityKind = EntityKind::from_static("goal");
    pub const CARD: EntityKind = EntityKind::from_static("card");
    pub const ASSIST: EntityKind = EntityKind::from_static("assist");
    pub const SUBSTITUTION: EntityKind = EntityKind::from_static("substitution");
    pub const STADIUM: EntityKind = EntityKind::from_static("stadium");
    pub const REFEREE: EntityKind = EntityKind::from_static("referee");
    pub const MANAGEMENT: EntityKind = EntityKind::from_static("management");
    pub const MEDIA: EntityKind = EntityKind::from_static("media");
    pub const PARTNER: EntityKind = EntityKind::from_static("partner");

    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Infer the entity kind an API path belongs to.
    ///
    /// Sub-collections win over their parent (`/players/transfers/3/` is a
    /// `transfer`, `/matches/stadiums/` a `stadium`); otherwise the first path
    /// segment decides (`/matches/42/add_goal/` is a `match`).
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split('?').next().unwrap_or_default();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let second = segments.next();

        let nested = match (first, second) {
            ("players", Some("transfers")) => Some(Self::TRANSFER),
            ("players", Some("stats" | "top_scorers")) => Some(Self::PLAYER_STATS),
            ("matches", Some("stadiums")) => Some(Self::STADIUM),
            ("matches", Some("goals")) => Some(Self::GOAL),
            ("matches", Some("cards")) => Some(Self::CARD),
            ("matches", Some("substitutions")) => Some(Self::SUBSTITUTION),
            _ => None,
        };
        if nested.is_some() {
            return nested;
        }

        let kind = match first {
            "matches" => Self::MATCH,
            "clubs" => Self::CLUB,
            "players" => Self::PLAYER,
            "seasons" => Self::SEASON,
            "referees" => Self::REFEREE,
            "management" => Self::MANAGEMENT,
            "media" => Self::MEDIA,
            "partners" => Self::PARTNER,
            "transfers" => Self::TRANSFER,
            "stats" => Self::PLAYER_STATS,
            _ => return None,
        };
        Some(kind)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EntityKind {
    fn from(tag: &'static str) -> Self {
        Self::from_static(tag)
    }
}

impl From<String> for EntityKind {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

/// "Data of this kind may have changed."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub kind: EntityKind,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(kind: impl Into<EntityKind>, occurred_at: OffsetDateTime) -> Self {
        Self {
            kind: kind.into(),
            occurred_at,
        }
    }

    pub fn now(kind: impl Into<EntityKind>) -> Self {
        Self::new(kind, OffsetDateTime::now_utc())
    }
}
