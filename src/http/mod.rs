mod bookings;
pub mod dto;
mod error;
mod events;
mod extract;
mod rooms;
mod state;
mod system;

pub use error::{ApiError, ApiResult};
pub use extract::ACTOR_HEADER;
pub use state::AppState;

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::observability::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the full application: routes plus the middleware stack.
///
/// ```text
/// /health                               GET
/// /rooms                                GET, POST
/// /rooms/available                      GET
/// /rooms/{id}                           GET, PUT, DELETE
/// /rooms/{id}/availability              GET
/// /rooms/{id}/events                    GET (SSE)
/// /bookings                             GET, POST
/// /bookings/check                       POST
/// /bookings/{id}                        GET, PUT
/// /bookings/{id}/{confirm,check-in,check-out,cancel,extend}   POST
/// /bookings/{id}/logs                   GET
/// /audit/overlaps                       GET
/// ```
pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let timeout = state.config.request_timeout();
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(system::health))
        .route("/rooms", get(rooms::list).post(rooms::create))
        .route("/rooms/available", get(rooms::available))
        .route(
            "/rooms/{id}",
            get(rooms::get).put(rooms::update).delete(rooms::delete),
        )
        .route("/rooms/{id}/availability", get(rooms::availability))
        .route("/rooms/{id}/events", get(events::room_events))
        .route("/bookings", get(bookings::list).post(bookings::create))
        .route("/bookings/check", post(bookings::check))
        .route("/bookings/{id}", get(bookings::get).put(bookings::update))
        .route("/bookings/{id}/confirm", post(bookings::confirm))
        .route("/bookings/{id}/check-in", post(bookings::check_in))
        .route("/bookings/{id}/check-out", post(bookings::check_out))
        .route("/bookings/{id}/cancel", post(bookings::cancel))
        .route("/bookings/{id}/extend", post(bookings::extend))
        .route("/bookings/{id}/logs", get(bookings::logs))
        .route("/audit/overlaps", get(system::overlaps))
        .route_layer(middleware::from_fn(track_metrics))
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(ACTOR_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ]);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {o:?}");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Count and time every routed request, labelled by route template.
async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".into());
    let method = req.method().to_string();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "route" => route)
        .record(start.elapsed().as_secs_f64());
    response
}
