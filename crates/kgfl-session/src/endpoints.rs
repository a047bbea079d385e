//! League API paths and the read queries built on them.
//!
//! Each query pairs a request with the entity kinds whose invalidation should
//! make it re-fetch.

use crate::http::ApiRequest;
use crate::invalidation::EntityKind;

pub const SEASONS: &str = "/seasons/";
pub const ACTIVE_SEASON: &str = "/seasons/active/";
pub const PARTNERS: &str = "/partners/";
pub const CLUBS: &str = "/clubs/";
pub const TABLE: &str = "/clubs/table/";
pub const MATCHES: &str = "/matches/";
pub const UPCOMING_MATCHES: &str = "/matches/upcoming/";
pub const LATEST_MATCHES: &str = "/matches/latest/";
pub const STADIUMS: &str = "/matches/stadiums/";
pub const PLAYERS: &str = "/players/";
pub const TOP_SCORERS: &str = "/players/top_scorers/";
pub const TRANSFERS: &str = "/players/transfers/";
pub const REFEREES: &str = "/referees/";
pub const MANAGEMENT: &str = "/management/";
pub const MEDIA: &str = "/media/";

pub fn club(id: impl std::fmt::Display) -> String {
    format!("/clubs/{id}/")
}

pub fn player(id: impl std::fmt::Display) -> String {
    format!("/players/{id}/")
}

pub fn player_stats(id: impl std::fmt::Display) -> String {
    format!("/players/{id}/stats/")
}

pub fn match_detail(id: impl std::fmt::Display) -> String {
    format!("/matches/{id}/")
}

pub fn match_add_goal(id: impl std::fmt::Display) -> String {
    format!("/matches/{id}/add_goal/")
}

pub fn match_add_card(id: impl std::fmt::Display) -> String {
    format!("/matches/{id}/add_card/")
}

pub fn match_add_assist(id: impl std::fmt::Display) -> String {
    format!("/matches/{id}/add_assist/")
}

/// A read request plus the kinds that invalidate it.
#[derive(Debug, Clone)]
pub struct ConsumerQuery {
    pub request: ApiRequest,
    pub kinds: Vec<EntityKind>,
}

impl ConsumerQuery {
    pub fn new(request: ApiRequest, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        Self {
            request,
            kinds: kinds.into_iter().collect(),
        }
    }
}

pub fn clubs() -> ConsumerQuery {
    ConsumerQuery::new(ApiRequest::get(CLUBS).query("all", "1"), [EntityKind::CLUB])
}

pub fn league_table(season: Option<&str>) -> ConsumerQuery {
    let mut request = ApiRequest::get(TABLE);
    if let Some(season) = season {
        request = request.query("season", season);
    }
    ConsumerQuery::new(
        request,
        [EntityKind::MATCH, EntityKind::CLUB, EntityKind::SEASON],
    )
}

pub fn players() -> ConsumerQuery {
    ConsumerQuery::new(
        ApiRequest::get(PLAYERS),
        [EntityKind::PLAYER, EntityKind::TRANSFER],
    )
}

pub fn top_scorers() -> ConsumerQuery {
    ConsumerQuery::new(
        ApiRequest::get(TOP_SCORERS),
        [
            EntityKind::PLAYER_STATS,
            EntityKind::PLAYER,
            EntityKind::GOAL,
            EntityKind::ASSIST,
        ],
    )
}

pub fn matches() -> ConsumerQuery {
    ConsumerQuery::new(
        ApiRequest::get(MATCHES),
        [
            EntityKind::MATCH,
            EntityKind::GOAL,
            EntityKind::CARD,
            EntityKind::SUBSTITUTION,
        ],
    )
}

pub fn transfers() -> ConsumerQuery {
    ConsumerQuery::new(
        ApiRequest::get(TRANSFERS),
        [EntityKind::TRANSFER, EntityKind::PLAYER],
    )
}

pub fn seasons() -> ConsumerQuery {
    ConsumerQuery::new(ApiRequest::get(SEASONS), [EntityKind::SEASON])
}

pub fn referees() -> ConsumerQuery {
    ConsumerQuery::new(ApiRequest::get(REFEREES), [EntityKind::REFEREE])
}

pub fn management() -> ConsumerQuery {
    ConsumerQuery::new(ApiRequest::get(MANAGEMENT), [EntityKind::MANAGEMENT])
}

pub fn media() -> ConsumerQuery {
    ConsumerQuery::new(ApiRequest::get(MEDIA), [EntityKind::MEDIA])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(match_add_goal(42), "/matches/42/add_goal/");
        assert_eq!(player_stats("9"), "/players/9/stats/");
        assert_eq!(EntityKind::from_path(&match_add_card(1)), Some(EntityKind::MATCH));
    }

    #[test]
    fn test_clubs_query_ignores_match_events() {
        let query = clubs();
        assert!(query.kinds.contains(&EntityKind::CLUB));
        assert!(!query.kinds.contains(&EntityKind::MATCH));
        assert!(!query.kinds.contains(&EntityKind::PLAYER_STATS));
    }

    #[test]
    fn test_table_query_season_param() {
        let query = league_table(Some("2025"));
        assert_eq!(query.request.path(), TABLE);
        assert!(query.kinds.contains(&EntityKind::MATCH));
    }
}
