use axum::response::IntoResponse;

// Undocumented landing route; health checks live at /health.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
