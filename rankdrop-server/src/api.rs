//! HTTP/JSON API over a shared [`Rankdrop`] instance.
//!
//! Uses `std::net::TcpListener` with one thread per connection; no external
//! HTTP framework. Endpoints:
//!
//! - `GET /health`: liveness check
//! - `POST /api/v1/leaderboards/{slug}/scores`: submit a score
//! - `GET /api/v1/leaderboards/{slug}/top?limit=10`: top scores
//! - `GET /api/v1/leaderboards/{slug}/players/{alias}?surrounding=0&includeMetadata=false`
//! - `GET /api/v1/leaderboards/{slug}/combined?topLimit=10&playerAlias=..&surrounding=0`
//! - `GET|POST /api/v1/admin/leaderboards`, `PUT|DELETE /api/v1/admin/leaderboards/{slug}`
//! - `POST /api/v1/admin/leaderboards/{slug}/reset`
//! - `GET /api/v1/admin/leaderboards/{slug}/scores?page=0&size=100`
//! - `DELETE /api/v1/admin/scores/{id}`
//! - `GET /api/v1/admin/players/{alias}`, `POST|DELETE /api/v1/admin/players/{alias}/ban`
//! - `GET /api/v1/admin/archives?slug=`, `GET /api/v1/admin/archives/{slug}/{label}?limit=50`
//! - `POST /api/v1/admin/settings/webhook`

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rankdrop::entry::RankedEntry;
use rankdrop::query::PlayerWindow;
use rankdrop::{Leaderboard, RankError, Rankdrop};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Default number of rows for `top` and `combined`.
const DEFAULT_TOP_LIMIT: usize = 10;

/// Default number of rows for archived snapshots.
const DEFAULT_ARCHIVE_LIMIT: usize = 50;

/// Errors produced while serving a request.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// No route matches the path.
    #[error("not found")]
    NoRoute,

    /// The route exists but not for this method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The body exceeds [`MAX_BODY_BYTES`].
    #[error("request body too large")]
    PayloadTooLarge,

    /// The engine rejected the operation.
    #[error(transparent)]
    Rank(#[from] RankError),

    /// The body is not valid JSON for the endpoint.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::Json(_) => 400,
            Self::NoRoute => 404,
            Self::MethodNotAllowed => 405,
            Self::PayloadTooLarge => 413,
            Self::Rank(e) => e.kind().status_code(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Rank(e) => e.public_message(),
            other => other.to_string(),
        }
    }
}

/// A parsed HTTP request.
#[derive(Debug, Default)]
pub struct Request {
    /// Upper-case method.
    pub method: String,
    /// Percent-decoded path segments.
    pub segments: Vec<String>,
    /// Percent-decoded query parameters.
    pub query: HashMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Request {
    /// Builds a request from a method and a raw target such as
    /// `/api/v1/leaderboards/global/top?limit=5`.
    pub fn new(method: &str, target: &str, body: impl Into<Vec<u8>>) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.to_ascii_uppercase(),
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(percent_decode)
                .collect(),
            query: parse_query(query),
            body: body.into(),
        }
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    fn parse_param<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ApiError> {
        self.param(key)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid '{key}' parameter")))
            })
            .transpose()
    }

    fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// An HTTP response ready to be written.
#[derive(Debug, PartialEq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// JSON body; `None` for 204.
    pub body: Option<String>,
}

impl Response {
    fn json<T: Serialize>(status: u16, value: &T) -> Result<Self, ApiError> {
        Ok(Self {
            status,
            body: Some(serde_json::to_string(value)?),
        })
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    fn error(err: &ApiError) -> Self {
        let body = serde_json::json!({ "error": err.message() });
        Self {
            status: err.status(),
            body: Some(body.to_string()),
        }
    }
}

// Wire types

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    player_alias: String,
    score_value: f64,
    #[serde(default)]
    metadata: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse<'a> {
    rank: u64,
    score_value: f64,
    submitted_at: DateTime<Utc>,
    recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreRow<'a> {
    player_alias: &'a str,
    score_value: f64,
    rank: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a str>,
}

impl<'a> ScoreRow<'a> {
    fn from_ranked(row: &'a RankedEntry, with_metadata: bool) -> Self {
        Self {
            player_alias: &row.entry.player_alias,
            score_value: row.entry.score_value,
            rank: row.rank,
            metadata: if with_metadata {
                row.entry.metadata.as_deref()
            } else {
                None
            },
        }
    }
}

fn rows(entries: &[RankedEntry], with_metadata: bool) -> Vec<ScoreRow<'_>> {
    entries
        .iter()
        .map(|row| ScoreRow::from_ranked(row, with_metadata))
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerScores<'a> {
    start_rank: u64,
    scores: Vec<ScoreRow<'a>>,
}

impl<'a> PlayerScores<'a> {
    fn from_window(window: &'a PlayerWindow, with_metadata: bool) -> Self {
        Self {
            start_rank: window.start_rank,
            scores: rows(&window.entries, with_metadata),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CombinedResponse<'a> {
    top_scores: Vec<ScoreRow<'a>>,
    player_scores: PlayerScores<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequest {
    #[serde(default)]
    archive_scores: bool,
    #[serde(default)]
    reset_label: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest {
    display_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest {
    url: String,
    #[serde(default)]
    top_n: Option<u64>,
    #[serde(default)]
    cooldown_ms: Option<u64>,
}

/// Accepts connections until the listener fails, serving each on its own
/// thread (blocking; intended for the main thread).
pub fn run_api_server(listener: TcpListener, rankdrop: Arc<Rankdrop>) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("accept error: {e}");
                continue;
            }
        };

        // Set a short read timeout so we don't block forever on slow clients
        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));

        let rankdrop = Arc::clone(&rankdrop);
        let spawned = std::thread::Builder::new()
            .name("rankdrop-conn".to_string())
            .spawn(move || {
                if let Err(e) = handle_connection(&stream, &rankdrop) {
                    tracing::debug!("request error: {e}");
                }
            });
        if let Err(e) = spawned {
            tracing::error!("failed to spawn connection thread: {e}");
        }
    }
}

/// Reads one request from the stream, dispatches it and writes the response.
fn handle_connection(stream: &TcpStream, rankdrop: &Rankdrop) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Parse: "METHOD /path?query HTTP/1.x"
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return send_response(stream, &Response::error(&ApiError::BadRequest("malformed request line".into())));
    }

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    if content_length > MAX_BODY_BYTES {
        return send_response(stream, &Response::error(&ApiError::PayloadTooLarge));
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body)?;

    let request = Request::new(parts[0], parts[1], body);
    let response = dispatch(rankdrop, &request);
    tracing::debug!(method = %request.method, status = response.status, "request served");
    send_response(stream, &response)
}

/// Routes a request and converts failures into JSON error responses.
pub fn dispatch(rankdrop: &Rankdrop, request: &Request) -> Response {
    match route(rankdrop, request) {
        Ok(response) => response,
        Err(e) => {
            if e.status() >= 500 {
                tracing::error!(error = %e, "request failed");
            }
            Response::error(&e)
        }
    }
}

fn route(rankdrop: &Rankdrop, req: &Request) -> Result<Response, ApiError> {
    let segments: Vec<&str> = req.segments.iter().map(String::as_str).collect();
    let method = req.method.as_str();

    match segments.as_slice() {
        ["health"] => match method {
            "GET" => Response::json(200, &serde_json::json!({ "status": "ok" })),
            _ => Err(ApiError::MethodNotAllowed),
        },
        ["api", "v1", "leaderboards", slug, rest @ ..] => match (method, rest) {
            ("POST", ["scores"]) => submit_score(rankdrop, req, slug),
            ("GET", ["top"]) => top_scores(rankdrop, req, slug),
            ("GET", ["players", alias]) => player_scores(rankdrop, req, slug, alias),
            ("GET", ["combined"]) => combined(rankdrop, req, slug),
            (_, ["scores" | "top" | "combined"] | ["players", _]) => Err(ApiError::MethodNotAllowed),
            _ => Err(ApiError::NoRoute),
        },
        ["api", "v1", "admin", rest @ ..] => admin(rankdrop, req, rest),
        _ => Err(ApiError::NoRoute),
    }
}

fn admin(rankdrop: &Rankdrop, req: &Request, segments: &[&str]) -> Result<Response, ApiError> {
    let response = match (req.method.as_str(), segments) {
        ("GET", ["leaderboards"]) => return Response::json(200, &rankdrop.leaderboards()?),
        ("POST", ["leaderboards"]) => {
            let leaderboard: Leaderboard = req.json()?;
            Response::json(201, &rankdrop.create_leaderboard(leaderboard)?)?
        }
        ("PUT", ["leaderboards", slug]) => {
            let rename: RenameRequest = req.json()?;
            Response::json(200, &rankdrop.rename_leaderboard(slug, &rename.display_name)?)?
        }
        ("DELETE", ["leaderboards", slug]) => {
            rankdrop.delete_leaderboard(slug)?;
            Response::no_content()
        }
        ("POST", ["leaderboards", slug, "reset"]) => {
            let reset: ResetRequest = req.json()?;
            rankdrop
                .archive()
                .reset(slug, reset.archive_scores, reset.reset_label.as_deref())?;
            Response::no_content()
        }
        ("GET", ["leaderboards", slug, "scores"]) => {
            let page = req.parse_param("page")?.unwrap_or(0);
            let size = req.parse_param("size")?.unwrap_or(100);
            return Response::json(200, &rankdrop.query().page(slug, page, size)?);
        }
        ("DELETE", ["scores", id]) => {
            let id = id
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid score id '{id}'")))?;
            rankdrop.engine().remove_score(id)?;
            Response::no_content()
        }
        ("GET", ["players", alias]) => return Response::json(200, &rankdrop.player(alias)?),
        ("POST", ["players", alias, "ban"]) => {
            Response::json(200, &rankdrop.ban_player(alias, req.param("reason"))?)?
        }
        ("DELETE", ["players", alias, "ban"]) => Response::json(200, &rankdrop.unban_player(alias)?)?,
        ("GET", ["archives"]) => {
            return Response::json(200, &rankdrop.archive().archive_summaries(req.param("slug"))?);
        }
        ("GET", ["archives", slug, label]) => {
            let limit = req.parse_param("limit")?.unwrap_or(DEFAULT_ARCHIVE_LIMIT);
            if limit == 0 {
                return Err(ApiError::BadRequest("limit must be positive".into()));
            }
            return Response::json(200, &rankdrop.archive().archived_scores(slug, label, limit)?);
        }
        ("POST", ["settings", "webhook"]) => {
            let webhook: WebhookRequest = req.json()?;
            rankdrop.configure_webhook(&webhook.url, webhook.top_n, webhook.cooldown_ms)?;
            Response::no_content()
        }
        _ => return Err(ApiError::NoRoute),
    };

    // Only mutations reach this point
    rankdrop.flush()?;
    Ok(response)
}

/// `POST /api/v1/leaderboards/{slug}/scores`
fn submit_score(rankdrop: &Rankdrop, req: &Request, slug: &str) -> Result<Response, ApiError> {
    let body: SubmitRequest = req.json()?;
    let submission = rankdrop
        .engine()
        .submit(slug, &body.player_alias, body.score_value, body.metadata)?;
    if submission.recorded {
        rankdrop.flush()?;
    }

    Response::json(
        200,
        &SubmitResponse {
            rank: submission.rank,
            score_value: submission.entry.score_value,
            submitted_at: submission.entry.submitted_at,
            recorded: submission.recorded,
            metadata: submission.entry.metadata.as_deref(),
        },
    )
}

/// Validates a top-N limit against the configured maximum.
fn top_limit(rankdrop: &Rankdrop, raw: Option<usize>) -> Result<usize, ApiError> {
    let limit = raw.unwrap_or(DEFAULT_TOP_LIMIT);
    let max = rankdrop.config().max_top_limit;
    if limit == 0 || limit > max {
        return Err(ApiError::BadRequest(format!("limit must be between 1 and {max}")));
    }
    Ok(limit)
}

/// Parses `surrounding`; negative values are treated as zero and large ones
/// are capped at the page size limit.
fn surrounding(rankdrop: &Rankdrop, req: &Request) -> Result<usize, ApiError> {
    let raw: i64 = req.parse_param("surrounding")?.unwrap_or(0);
    let radius = usize::try_from(raw.max(0)).unwrap_or(usize::MAX);
    Ok(radius.min(rankdrop.config().max_page_size))
}

fn include_metadata(req: &Request) -> Result<bool, ApiError> {
    Ok(req.parse_param("includeMetadata")?.unwrap_or(false))
}

/// `GET /api/v1/leaderboards/{slug}/top`
fn top_scores(rankdrop: &Rankdrop, req: &Request, slug: &str) -> Result<Response, ApiError> {
    let limit = top_limit(rankdrop, req.parse_param("limit")?)?;
    let top = rankdrop.query().top_n(slug, limit)?;
    Response::json(200, &rows(&top, false))
}

/// `GET /api/v1/leaderboards/{slug}/players/{alias}`
fn player_scores(rankdrop: &Rankdrop, req: &Request, slug: &str, alias: &str) -> Result<Response, ApiError> {
    let radius = surrounding(rankdrop, req)?;
    let with_metadata = include_metadata(req)?;
    let window = rankdrop.query().player_window(slug, alias, radius)?;
    Response::json(200, &PlayerScores::from_window(&window, with_metadata))
}

/// `GET /api/v1/leaderboards/{slug}/combined`
fn combined(rankdrop: &Rankdrop, req: &Request, slug: &str) -> Result<Response, ApiError> {
    let limit = top_limit(rankdrop, req.parse_param("topLimit")?)?;
    let alias = req
        .param("playerAlias")
        .ok_or_else(|| ApiError::BadRequest("missing 'playerAlias' parameter".into()))?;
    let radius = surrounding(rankdrop, req)?;
    let with_metadata = include_metadata(req)?;

    let result = rankdrop.query().combined(slug, limit, alias, radius)?;
    Response::json(
        200,
        &CombinedResponse {
            top_scores: rows(&result.top, false),
            player_scores: PlayerScores::from_window(&result.player, with_metadata),
        },
    )
}

/// Writes a response and closes the exchange.
fn send_response(mut stream: &TcpStream, response: &Response) -> Result<(), Box<dyn std::error::Error>> {
    let status_text = match response.status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    let body = response.body.as_deref().unwrap_or("");

    write!(
        stream,
        "HTTP/1.1 {} {status_text}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        response.status,
        body.len(),
    )?;
    stream.flush()?;

    Ok(())
}

/// Parses a query string into percent-decoded key-value pairs.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

/// Decodes `%XX` escapes and `+` as space. Invalid escapes are kept verbatim.
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
