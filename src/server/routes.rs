//! Video and clip endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
    routing::get,
    Router,
};
use reelcache_common::{AudioSelector, Error, MediaQuery};
use serde::Deserialize;

use super::error::AppError;
use super::AppContext;
use crate::orchestrator::{ClipRequest, Delivery, VideoRequest};
use crate::streaming::serve_file;

/// Header naming where the streamed file came from.
pub const ORIGIN_HEADER: &str = "x-reelcache-origin";

pub fn media_routes() -> Router<AppContext> {
    Router::new()
        .route("/video/movie/:name", get(movie_video))
        .route("/video/show/:name/:season/:episode", get(episode_video))
        .route("/clip/movie/:name", get(movie_clip))
        .route("/clip/show/:name/:season/:episode", get(episode_clip))
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoParams {
    /// `stereo`, `max` or a track index.
    pub audio: Option<String>,
    /// Target video codec.
    pub video: Option<String>,
}

impl VideoParams {
    fn into_request(self) -> Result<VideoRequest, Error> {
        let audio = match self.audio {
            Some(raw) => raw.parse::<AudioSelector>()?,
            None => AudioSelector::default(),
        };
        Ok(VideoRequest {
            audio,
            codec: self.video.filter(|c| !c.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ClipParams {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl ClipParams {
    fn into_request(self) -> Result<ClipRequest, Error> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Ok(ClipRequest { start, end }),
            _ => Err(Error::invalid("clip requests need both start and end")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EpisodePath {
    pub name: String,
    pub season: u32,
    pub episode: u32,
}

impl From<EpisodePath> for MediaQuery {
    fn from(p: EpisodePath) -> Self {
        MediaQuery::Episode {
            show: p.name,
            season: p.season,
            episode: p.episode,
        }
    }
}

async fn respond(delivery: Delivery, headers: &HeaderMap) -> Result<Response, AppError> {
    let mut response = serve_file(&delivery.path, delivery.content_type, headers).await?;
    response
        .headers_mut()
        .insert(
            HeaderName::from_static(ORIGIN_HEADER),
            HeaderValue::from_static(delivery.origin.as_str()),
        );
    Ok(response)
}

async fn movie_video(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    Query(params): Query<VideoParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let query = MediaQuery::Movie { name };
    let delivery = ctx.media.video(&query, &params.into_request()?).await?;
    respond(delivery, &headers).await
}

async fn episode_video(
    State(ctx): State<AppContext>,
    Path(path): Path<EpisodePath>,
    Query(params): Query<VideoParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let query = MediaQuery::from(path);
    let delivery = ctx.media.video(&query, &params.into_request()?).await?;
    respond(delivery, &headers).await
}

async fn movie_clip(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    Query(params): Query<ClipParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let query = MediaQuery::Movie { name };
    let delivery = ctx.media.clip(&query, params.into_request()?).await?;
    respond(delivery, &headers).await
}

async fn episode_clip(
    State(ctx): State<AppContext>,
    Path(path): Path<EpisodePath>,
    Query(params): Query<ClipParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let query = MediaQuery::from(path);
    let delivery = ctx.media.clip(&query, params.into_request()?).await?;
    respond(delivery, &headers).await
}
