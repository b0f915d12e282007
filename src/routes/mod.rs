pub mod categories;
pub mod feed;
pub mod health;
pub mod social;
pub mod uploads;
pub mod wishes;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full HTTP surface.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(categories::router())
        .merge(wishes::router())
        .merge(feed::router())
        .merge(social::router())
        .merge(uploads::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
