use std::sync::Arc;

use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use log::info;
use serde::Serialize;

use crate::context::SharedContext;
use crate::key_pool::KeyPool;

/// Handles the status endpoints read from.
#[derive(Clone)]
pub struct ApiState {
    pub context: Arc<SharedContext>,
    pub pool: KeyPool,
}

#[derive(Debug, Serialize)]
pub struct ContextStatus {
    pub context: String,
    pub stream_healthy: bool,
}

/// Public view of a credential. The secret is never serialized.
#[derive(Debug, Serialize)]
pub struct KeyStatus {
    pub id: i64,
    pub model: Option<String>,
    pub usage_count: u64,
}

/// Current stream context
///
/// # Example
/// ```shell
/// curl http://localhost:8080/context
/// ```
///
/// # Returns
/// ```json
/// {
///    "context": "The streamer is fighting a boss.",
///    "stream_healthy": true
/// }
/// ```
#[get("/context")]
pub async fn get_context(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(ContextStatus {
        context: state.context.snapshot(),
        stream_healthy: state.context.is_stream_healthy(),
    })
}

/// Usage of every key for one provider
///
/// # Example
/// ```shell
/// curl http://localhost:8080/providers/groq/keys
/// ```
///
/// # Returns
/// ```json
/// [{
///    "id": 1,
///    "model": null,
///    "usage_count": 42
/// }]
/// ```
#[get("/providers/{provider}/keys")]
pub async fn list_keys(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    match state.pool.list(&path).await {
        Ok(credentials) => {
            let keys: Vec<KeyStatus> = credentials
                .into_iter()
                .map(|c| KeyStatus {
                    id: c.id,
                    model: c.model,
                    usage_count: c.usage_count,
                })
                .collect();
            HttpResponse::Ok().json(keys)
        }
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

/// Run the status API server until it is stopped.
pub async fn run_api_server(bind: &str, state: ApiState) -> std::io::Result<()> {
    info!("Status API listening on {}", bind);
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(get_context)
            .service(list_keys)
    })
    .bind(bind)?
    .disable_signals()
    .run()
    .await
}
