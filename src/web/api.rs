use crate::filter::CoinQuery;
use crate::metrics::Metrics;
use crate::models::{AssetQuote, HistoryEntry};
use crate::security::RateLimiter;
use crate::services::{HistoryService, PromotionMode};
use crate::utils::cache::{QuoteOrigin, RefreshCache};
use crate::web::reply::{
    error_reply, failure, handle_rejection, json_reply, BodyTooLarge, MalformedBody, RateLimited,
};
use futures::{Stream, StreamExt};
use log::{debug, error};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::hyper::body::{Buf, Bytes};
use warp::reply::Response;
use warp::{reject, Filter, Rejection, Reply};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: u64 = 1024 * 1024;

const STALE_MESSAGE: &str = "Serving cached data due to API error";

/// Everything the handlers need, cloned into each route.
#[derive(Clone)]
pub struct AppContext {
    pub cache: Arc<RefreshCache>,
    pub history: Arc<HistoryService>,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoinsBody<'a> {
    success: bool,
    count: usize,
    data: &'a [AssetQuote],
    from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct HistoryCreatedBody {
    success: bool,
    message: &'static str,
    inserted: usize,
}

#[derive(Debug, Serialize)]
struct HistoryBody<'a> {
    success: bool,
    count: usize,
    data: &'a [HistoryEntry],
}

/// The full route tree, with rejections already turned into JSON envelopes.
pub fn routes(ctx: AppContext) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(health_check);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .map(render_metrics);

    let coins = warp::path("coins")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<CoinQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(list_coins);

    let create_history = warp::path("history")
        .and(warp::path::end())
        .and(warp::post())
        .and(history_body())
        .and(with_ctx(ctx.clone()))
        .and_then(promote_history);

    let get_history = warp::path!("history" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(coin_history);

    let api = warp::path("api")
        .and(rate_limit(ctx))
        .and(coins.or(create_history).unify().or(get_history).unify());

    health
        .or(metrics)
        .unify()
        .or(api)
        .unify()
        .recover(handle_rejection)
        .unify()
}

fn with_ctx(ctx: AppContext) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn rate_limit(ctx: AppContext) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::addr::remote()
        .and(with_ctx(ctx))
        .and_then(check_rate_limit)
        .untuple_one()
}

async fn check_rate_limit(remote: Option<SocketAddr>, ctx: AppContext) -> Result<(), Rejection> {
    let key = remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if ctx.rate_limiter.check(&key).await {
        Ok(())
    } else {
        Err(reject::custom(RateLimited))
    }
}

/// The `data` member of the POST body. An empty body, a non-object body or a
/// missing member all mean "promote the snapshot".
fn history_body() -> impl Filter<Extract = (Option<Value>,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(check_body_length)
        .untuple_one()
        .and(warp::body::stream())
        .and_then(|body| read_limited(body, MAX_BODY_BYTES))
        .and_then(parse_history_body)
}

/// Buffers the body, giving up as soon as it grows past `limit`. Covers
/// chunked bodies that carry no `content-length`.
async fn read_limited<S, B>(body: S, limit: u64) -> Result<Bytes, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    futures::pin_mut!(body);
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        let mut chunk = chunk.map_err(|e| reject::custom(MalformedBody(e.to_string())))?;
        if (collected.len() + chunk.remaining()) as u64 > limit {
            return Err(reject::custom(BodyTooLarge));
        }
        while chunk.has_remaining() {
            let part = chunk.chunk();
            let read = part.len();
            collected.extend_from_slice(part);
            chunk.advance(read);
        }
    }
    Ok(Bytes::from(collected))
}

async fn check_body_length(length: Option<u64>) -> Result<(), Rejection> {
    match length {
        Some(length) if length > MAX_BODY_BYTES => Err(reject::custom(BodyTooLarge)),
        _ => Ok(()),
    }
}

async fn parse_history_body(bytes: Bytes) -> Result<Option<Value>, Rejection> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let body: Value = serde_json::from_slice(&bytes)
        .map_err(|e| reject::custom(MalformedBody(e.to_string())))?;
    Ok(match body {
        Value::Object(mut fields) => fields.remove("data"),
        _ => None,
    })
}

fn health_check() -> Response {
    json_reply(
        &serde_json::json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }),
        StatusCode::OK,
    )
}

fn render_metrics(ctx: AppContext) -> Response {
    match ctx.metrics.render() {
        Ok(text) => warp::reply::with_header(text, "content-type", prometheus::TEXT_FORMAT)
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            error_reply(&e)
        }
    }
}

async fn list_coins(query: CoinQuery, ctx: AppContext) -> Result<Response, Rejection> {
    let set = match ctx.cache.get_quotes().await {
        Ok(set) => set,
        Err(e) => {
            ctx.metrics.refresh_failures.inc();
            error!("Failed to load quotes: {}", e);
            return Ok(error_reply(&e));
        }
    };

    match &set.origin {
        QuoteOrigin::Upstream => ctx.metrics.upstream_refreshes.inc(),
        QuoteOrigin::Cache => ctx.metrics.cache_hits.inc(),
        QuoteOrigin::Stale { .. } => ctx.metrics.stale_serves.inc(),
    }

    let data = if query.is_empty() {
        set.quotes.to_vec()
    } else {
        debug!("Applying coin query {:?}", query);
        query.apply(&set.quotes)
    };
    let stale = set.is_stale();
    let body = CoinsBody {
        success: true,
        count: data.len(),
        data: &data,
        from_cache: set.from_cache(),
        message: stale.then_some(STALE_MESSAGE),
    };
    let status = if stale {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    Ok(json_reply(&body, status))
}

async fn promote_history(data: Option<Value>, ctx: AppContext) -> Result<Response, Rejection> {
    match ctx.history.promote(data.as_ref()).await {
        Ok(outcome) => {
            ctx.metrics.history_rows_appended.inc_by(outcome.inserted as u64);
            let message = match outcome.mode {
                PromotionMode::FromSnapshot => "History created from Current",
                PromotionMode::Explicit => "History data appended successfully",
            };
            Ok(json_reply(
                &HistoryCreatedBody {
                    success: true,
                    message,
                    inserted: outcome.inserted,
                },
                StatusCode::OK,
            ))
        }
        Err(e) => {
            error!("History promotion failed: {}", e);
            Ok(error_reply(&e))
        }
    }
}

/// Percent-decodes a path segment; `None` when it is not valid UTF-8.
fn decode_segment(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

async fn coin_history(raw_id: String, ctx: AppContext) -> Result<Response, Rejection> {
    let Some(coin_id) = decode_segment(&raw_id) else {
        return Ok(failure(StatusCode::BAD_REQUEST, "Invalid coinId", None));
    };
    match ctx.history.coin_history(&coin_id).await {
        Ok(entries) => Ok(json_reply(
            &HistoryBody {
                success: true,
                count: entries.len(),
                data: &entries,
            },
            StatusCode::OK,
        )),
        Err(e) => {
            debug!("History lookup for {} failed: {}", coin_id, e);
            Ok(error_reply(&e))
        }
    }
}
