use axum::{
    extract::Request,
    middleware,
    routing::{get, post, put},
    Router,
};
use log::{info, warn};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{
    admin_handlers::{get_cleanup_status, run_manual_cleanup},
    family_handlers::{
        create_family, get_my_family, invite_member, join_family, remove_member,
        resend_invitation,
    },
    join_request_handlers::{
        accept_join_request, cancel_join_request, get_own_pending_join_requests,
        reject_join_request, request_to_join, resend_join_request, resend_join_request_by_id,
    },
    user_handlers::register_push_token,
};
use crate::state::AppState;

// Import shared auth middleware
use famledger_shared::auth::auth_middleware;

/// Creates a router with the default DynamoDB-backed state
pub async fn create_router() -> Router {
    info!("Creating router with DynamoDB stores");

    let state = AppState::new_dynamo().await;

    // Check if we should remove the base path prefix
    let remove_base_path = std::env::var("REMOVE_BASE_PATH")
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false);

    // If REMOVE_BASE_PATH is set to true, don't add the /Prod prefix
    let prefix = if remove_base_path { "" } else { "/Prod" };
    info!("Using API route prefix: {}", prefix);

    create_router_with_state(state, prefix)
}

/// Creates a router with injected stores and dispatcher
pub fn create_router_with_state(state: AppState, prefix: &str) -> Router {
    info!("Setting up API routes with prefix: '{}'", prefix);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Logging middleware to trace all requests
    async fn logging_middleware(
        req: Request,
        next: axum::middleware::Next,
    ) -> impl axum::response::IntoResponse {
        info!(
            "Router received request: method={}, uri={}",
            req.method(),
            req.uri()
        );
        next.run(req).await
    }

    let api_routes = Router::new()
        .route("/families", post(create_family).get(get_my_family))
        .route("/families/join", post(join_family))
        .route("/families/invitations", post(invite_member))
        .route("/families/invitations/resend", post(resend_invitation))
        .route("/families/members/remove", post(remove_member))
        .route("/join-requests", post(request_to_join))
        .route("/join-requests/pending", get(get_own_pending_join_requests))
        .route("/join-requests/resend", post(resend_join_request))
        .route("/join-requests/:id/resend", post(resend_join_request_by_id))
        .route("/join-requests/:id/accept", post(accept_join_request))
        .route("/join-requests/:id/reject", post(reject_join_request))
        .route("/join-requests/cancel", post(cancel_join_request))
        .route("/users/push-token", put(register_push_token))
        .route("/admin/cleanup", post(run_manual_cleanup))
        .route("/admin/cleanup/status", get(get_cleanup_status))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(state);

    // Create the main router
    let router = if prefix.is_empty() {
        // For tests or when no prefix is needed, don't nest the routes
        api_routes
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    } else {
        // For production, nest the routes under the prefix
        Router::new()
            .nest(prefix, api_routes)
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    };

    info!(
        "Router configured with all routes and middleware under prefix: '{}'",
        prefix
    );

    // Add a fallback handler for 404s
    router.fallback(|req: Request| async move {
        warn!("No route matched for: {} {}", req.method(), req.uri());
        (
            axum::http::StatusCode::NOT_FOUND,
            "The requested resource was not found".to_string(),
        )
    })
}
