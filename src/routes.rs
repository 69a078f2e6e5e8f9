use crate::handlers;
use crate::state::AppState;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([HeaderValue::from_static("http://localhost:5173")])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/state", get(handlers::get_state))
        .route("/api/v1/bank", post(handlers::load_bank))
        .route("/api/v1/bank/sample", post(handlers::load_sample))
        .route("/api/v1/quiz/start", post(handlers::start_quiz))
        .route("/api/v1/quiz/question/:index", get(handlers::display_question))
        .route("/api/v1/quiz/select", post(handlers::select_option))
        .route("/api/v1/quiz/commit", post(handlers::commit))
        .route("/api/v1/quiz/mode", post(handlers::set_mode))
        .route("/api/v1/quiz/nav/:target", post(handlers::navigate))
        .route("/api/v1/quiz/jump", post(handlers::jump))
        .route("/api/v1/quiz/show-answer", post(handlers::toggle_show_answer))
        .route("/api/v1/quiz/key", post(handlers::press_key))
        .route("/api/v1/quiz/reset", post(handlers::reset))
        .route("/api/v1/settings", put(handlers::update_settings))
        .route("/ws", get(handlers::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
