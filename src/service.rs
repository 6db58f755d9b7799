//! Game API access.
//!
//! The renderer only sees the [`WorldSource`] trait; [`ScreepsClient`] is
//! the blocking HTTP implementation used by the binary.

use std::cell::RefCell;

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Credentials, SourceConfig};
use crate::coords::{CellName, WorldSize};
use crate::error::MapError;
use crate::world::{RawMapStats, WorldState};

/// Everything the renderer needs from the outside world.
pub trait WorldSource {
    fn world_size(&self) -> Result<WorldSize, MapError>;

    /// Encoded image of the sector whose boundary cell is `sector`.
    fn sector_tile(&self, sector: &CellName) -> Result<Vec<u8>, MapError>;

    /// Validated state of the given cells, plus every owner's badge descriptor.
    fn cell_states(&self, cells: &[CellName]) -> Result<WorldState, MapError>;

    /// SVG document of a user's badge.
    fn badge_svg(&self, username: &str) -> Result<Vec<u8>, MapError>;
}

impl<T: WorldSource + ?Sized> WorldSource for &T {
    fn world_size(&self) -> Result<WorldSize, MapError> {
        (**self).world_size()
    }

    fn sector_tile(&self, sector: &CellName) -> Result<Vec<u8>, MapError> {
        (**self).sector_tile(sector)
    }

    fn cell_states(&self, cells: &[CellName]) -> Result<WorldState, MapError> {
        (**self).cell_states(cells)
    }

    fn badge_svg(&self, username: &str) -> Result<Vec<u8>, MapError> {
        (**self).badge_svg(username)
    }
}

#[derive(Serialize, Debug)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Debug)]
struct SignInResponse {
    token: String,
}

#[derive(Serialize, Debug)]
struct MapStatsRequest<'a> {
    rooms: Vec<String>,
    shard: &'a str,
    #[serde(rename = "statName")]
    stat_name: &'a str,
}

/// Blocking client for the official (or a private) game server.
pub struct ScreepsClient {
    config: SourceConfig,
    client: Client,
    token: RefCell<Option<String>>,
}

impl ScreepsClient {
    pub fn new(config: SourceConfig) -> Result<Self, MapError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let token = match &config.credentials {
            Some(Credentials::Token(token)) => Some(token.clone()),
            _ => None,
        };
        Ok(Self { config, client, token: RefCell::new(token) })
    }

    pub fn tile_url(&self, sector: &CellName) -> String {
        format!("{}/{}/zoom1/{}.png", self.config.tile_cdn, self.config.shard_name(), sector)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn check(response: Response) -> Result<Response, MapError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(MapError::Status { url: response.url().to_string(), status: status.as_u16() })
        }
    }

    /// Current auth token, signing in first when only a password is known.
    fn token(&self) -> Result<Option<String>, MapError> {
        if let Some(token) = self.token.borrow().clone() {
            return Ok(Some(token));
        }
        let Some(Credentials::Password { email, password }) = &self.config.credentials else {
            return Ok(None);
        };

        info!("signing in");
        let response = self
            .client
            .post(self.api_url("auth/signin"))
            .json(&SignInRequest { email, password })
            .send()?;
        let signed_in: SignInResponse = Self::check(response)?.json()?;
        *self.token.borrow_mut() = Some(signed_in.token.clone());
        Ok(Some(signed_in.token))
    }
}

impl WorldSource for ScreepsClient {
    fn world_size(&self) -> Result<WorldSize, MapError> {
        let response = self
            .client
            .get(self.api_url("game/world-size"))
            .query(&[("shard", self.config.shard_name())])
            .send()?;
        let size: WorldSize = Self::check(response)?.json()?;
        size.validate()?;
        info!(width = size.width, height = size.height, "world size loaded");
        Ok(size)
    }

    fn sector_tile(&self, sector: &CellName) -> Result<Vec<u8>, MapError> {
        let url = self.tile_url(sector);
        debug!(%url, "downloading sector");
        let response = self.client.get(&url).send()?;
        Ok(Self::check(response)?.bytes()?.to_vec())
    }

    fn cell_states(&self, cells: &[CellName]) -> Result<WorldState, MapError> {
        let shard = self.config.shard_name();
        let request = MapStatsRequest {
            rooms: cells.iter().map(CellName::to_string).collect(),
            shard: &shard,
            stat_name: "owner0",
        };

        let mut builder = self
            .client
            .post(self.api_url("game/map-stats"))
            .timeout(self.config.map_stats_timeout)
            .json(&request);
        if let Some(token) = self.token()? {
            builder = builder.header("X-Token", &token).header("X-Username", &token);
        }

        info!(cells = cells.len(), "loading world state");
        let response = Self::check(builder.send()?)?;
        if let Some(refreshed) = response.headers().get("X-Token").and_then(|v| v.to_str().ok()) {
            *self.token.borrow_mut() = Some(refreshed.to_string());
        }
        let raw: RawMapStats = response.json()?;
        WorldState::from_raw(raw, chrono::Utc::now().timestamp_millis())
    }

    fn badge_svg(&self, username: &str) -> Result<Vec<u8>, MapError> {
        let response = self
            .client
            .get(self.api_url("user/badge-svg"))
            .query(&[("username", username)])
            .send()?;
        Ok(Self::check(response)?.bytes()?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = ScreepsClient::new(SourceConfig {
            api_base: "http://localhost:21025/api/".to_string(),
            ..SourceConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.tile_url(&"W9N9".parse().unwrap()),
            "https://d3os7yery2usni.cloudfront.net/map/shard3/zoom1/W9N9.png"
        );
        assert_eq!(client.api_url("game/world-size"), "http://localhost:21025/api/game/world-size");
    }

    #[test]
    fn test_token_credentials_need_no_sign_in() {
        let client = ScreepsClient::new(SourceConfig {
            credentials: Some(Credentials::Token("abc".to_string())),
            ..SourceConfig::default()
        })
        .unwrap();
        assert_eq!(client.token().unwrap(), Some("abc".to_string()));
    }

    #[test]
    fn test_no_credentials_no_token() {
        let client = ScreepsClient::new(SourceConfig::default()).unwrap();
        assert_eq!(client.token().unwrap(), None);
    }

    #[test]
    fn test_map_stats_request_shape() {
        let shard = "shard1".to_string();
        let request = MapStatsRequest {
            rooms: vec!["W1N1".to_string()],
            shard: &shard,
            stat_name: "owner0",
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"rooms":["W1N1"],"shard":"shard1","statName":"owner0"}"#
        );
    }
}
