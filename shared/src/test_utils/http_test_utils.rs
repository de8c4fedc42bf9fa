use axum::response::Response;
use http_body_util::BodyExt;

/// Collects a response body and parses it as JSON.
pub async fn response_to_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body must be collectable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body must be JSON")
}
